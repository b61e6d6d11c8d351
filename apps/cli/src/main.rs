#![deny(warnings)]

//! Command line front end for running the marketing-mix simulation against an
//! on-disk dataset: register teams, take decision submissions, schedule
//! professor events and resolve turns.

use anyhow::{anyhow, bail, Context, Result};
use persistence::{DataStore, DatasetMode, FileStore, NewTeam, Registry, SubmitError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::{Event, MarketId, SubmittedDecisions};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: mktmix [--data-dir DIR] [--mode real|demo] [--seed N] <command> [args]

Commands:
  init                                    write default config to the dataset
  register <name> <password> <market>     register a team (moda|autos|casas)
  submit <team-id> <decisions.json>       submit a team's decisions for the turn
  process-turn                            resolve the current turn
  standings                               print per-market standings
  markets                                 print market occupancy and profiles
  events                                  list scheduled events
  add-event <turn> <coefficient> <delta> [--scope S] [--abs] [--name NAME]
  deadline [RFC3339 | --clear]            show or set the submission deadline
  reset [--full]                          rewind the round, or wipe the dataset
";

struct Options {
    data_dir: String,
    mode: DatasetMode,
    seed: Option<u64>,
    rest: Vec<String>,
}

fn parse_args() -> Result<Options> {
    let mut data_dir = "./data".to_string();
    let mut mode = DatasetMode::Real;
    let mut seed = None;
    let mut rest = Vec::new();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--data-dir" => {
                data_dir = it.next().ok_or_else(|| anyhow!("--data-dir needs a value"))?;
            }
            "--mode" => {
                let value = it.next().ok_or_else(|| anyhow!("--mode needs a value"))?;
                mode = value.parse().map_err(|e| anyhow!("{e}"))?;
            }
            "--seed" => {
                seed = Some(
                    it.next()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow!("--seed needs an integer"))?,
                );
            }
            "--help" | "-h" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            _ => rest.push(arg),
        }
    }
    Ok(Options {
        data_dir,
        mode,
        seed,
        rest,
    })
}

fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn cmd_register(reg: &mut Registry<FileStore>, args: &[String]) -> Result<()> {
    let [name, password, market] = args else {
        bail!("register needs <name> <password> <market>");
    };
    let market: MarketId = market.parse().map_err(|e| anyhow!("{e}"))?;
    let team = reg.create_team(&NewTeam {
        name: name.clone(),
        password: password.clone(),
        market,
        members: Vec::new(),
    })?;
    println!("registered {} as {} in {}", team.name, team.id, team.market);
    Ok(())
}

fn cmd_submit(reg: &mut Registry<FileStore>, args: &[String]) -> Result<()> {
    let [team_id, path] = args else {
        bail!("submit needs <team-id> <decisions.json>");
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let mut submission: SubmittedDecisions =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    submission.team_id = team_id.clone();

    match reg.submit_decisions(&submission) {
        Ok(team) => {
            println!("decisions accepted for {} ({})", team.id, team.name);
            Ok(())
        }
        Err(SubmitError::Invalid(issues)) => {
            eprintln!("submission rejected:");
            for issue in issues {
                eprintln!("  - {issue}");
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_process_turn(reg: &mut Registry<FileStore>, seed: Option<u64>) -> Result<()> {
    let mut rng = make_rng(seed);
    let summary = reg.run_turn(&mut rng)?;
    println!(
        "turn {} resolved for {} team(s)",
        summary.turn_processed, summary.processed_teams
    );
    Ok(())
}

fn cmd_standings(reg: &Registry<FileStore>) -> Result<()> {
    let config = reg.data().get_config();
    let mut teams = reg.data().get_teams();
    teams.sort_by(|a, b| {
        (a.market, std::cmp::Reverse(a.current_metrics.arr))
            .cmp(&(b.market, std::cmp::Reverse(b.current_metrics.arr)))
    });

    println!("turn: {} ({})", config.current_turn, config.current_turn_label);
    let mut current_market = None;
    for team in &teams {
        if current_market != Some(team.market) {
            println!("{}:", config.market_name(team.market));
            current_market = Some(team.market);
        }
        let m = &team.current_metrics;
        println!(
            "  {} {} [{}] | ARR {} | share {:.1}% | CAC {} | margin {}",
            team.id, team.name, team.segmento, m.arr, m.market_share, m.cac, m.avg_margin
        );
    }
    if teams.is_empty() {
        println!("no teams registered");
    }
    Ok(())
}

fn cmd_markets(reg: &Registry<FileStore>) -> Result<()> {
    let config = reg.data().get_config();
    let occupancy = reg.market_occupancy();
    for market in &config.main_markets {
        let profile = config.profile(market.id);
        println!(
            "{} ({}) | teams {}/{} | price {}..{} step {} | budget {}",
            market.name,
            market.id,
            occupancy.get(&market.id).copied().unwrap_or(0),
            config.max_teams_per_market,
            profile.price_min,
            profile.price_max,
            profile.price_step,
            profile.max_budget_per_turn
        );
    }
    Ok(())
}

fn cmd_events(reg: &Registry<FileStore>) -> Result<()> {
    let config = reg.data().get_config();
    if config.events.is_empty() {
        println!("no events scheduled");
        return Ok(());
    }
    for ev in &config.events {
        println!(
            "{} | turn {} | {} | {:?} | {} {:?} {}",
            ev.id, ev.turn, ev.name, ev.scope, ev.coefficient, ev.delta_mode, ev.delta_value
        );
    }
    Ok(())
}

fn cmd_add_event(reg: &mut Registry<FileStore>, args: &[String]) -> Result<()> {
    if args.len() < 3 {
        bail!("add-event needs <turn> <coefficient> <delta>");
    }
    let mut event = Event {
        turn: args[0].parse().context("turn must be a positive integer")?,
        coefficient: args[1].parse().map_err(|e| anyhow!("{e}"))?,
        delta_value: args[2].parse().context("delta must be a number")?,
        ..Event::default()
    };
    let mut it = args[3..].iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--abs" => event.delta_mode = sim_core::DeltaMode::Abs,
            "--scope" => {
                let value = it.next().ok_or_else(|| anyhow!("--scope needs a value"))?;
                event.scope = value.parse().map_err(|e| anyhow!("{e}"))?;
            }
            "--name" => {
                event.name = it.next().ok_or_else(|| anyhow!("--name needs a value"))?.clone();
            }
            other => bail!("unknown add-event flag: {other}"),
        }
    }
    let event = reg.add_event(event)?;
    println!("scheduled {} for turn {}", event.id, event.turn);
    Ok(())
}

fn cmd_deadline(reg: &mut Registry<FileStore>, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        None => match reg.submission_deadline() {
            Some(deadline) => println!("deadline: {}", deadline.to_rfc3339()),
            None => println!("no deadline set"),
        },
        Some("--clear") => {
            reg.set_submission_deadline(None)?;
            println!("deadline cleared");
        }
        Some(raw) => {
            let deadline = chrono::DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("parsing deadline {raw}"))?
                .with_timezone(&chrono::Utc);
            reg.set_submission_deadline(Some(deadline))?;
            println!("deadline set to {}", deadline.to_rfc3339());
        }
    }
    Ok(())
}

fn cmd_reset(reg: &mut Registry<FileStore>, args: &[String]) -> Result<()> {
    if args.iter().any(|a| a == "--full") {
        reg.full_reset()?;
        println!("dataset wiped");
    } else {
        reg.reset_round()?;
        println!("round rewound to turn 1");
    }
    Ok(())
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = parse_args()?;
    let store = FileStore::open(&opts.data_dir)?;
    let mut reg = Registry::new(DataStore::new(store, opts.mode));
    info!(data_dir = %opts.data_dir, mode = opts.mode.as_str(), "dataset opened");

    let Some((command, args)) = opts.rest.split_first() else {
        print!("{USAGE}");
        std::process::exit(2);
    };

    match command.as_str() {
        "init" => {
            let config = reg.data().get_config();
            reg.data_mut().save_config(&config)?;
            println!("dataset initialized at turn {}", config.current_turn);
            Ok(())
        }
        "register" => cmd_register(&mut reg, args),
        "submit" => cmd_submit(&mut reg, args),
        "process-turn" => cmd_process_turn(&mut reg, opts.seed),
        "standings" => cmd_standings(&reg),
        "markets" => cmd_markets(&reg),
        "events" => cmd_events(&reg),
        "add-event" => cmd_add_event(&mut reg, args),
        "deadline" => cmd_deadline(&mut reg, args),
        "reset" => cmd_reset(&mut reg, args),
        other => {
            eprintln!("unknown command: {other}");
            print!("{USAGE}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rngs_are_reproducible() {
        use rand::Rng;
        let mut a = make_rng(Some(7));
        let mut b = make_rng(Some(7));
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }
}
