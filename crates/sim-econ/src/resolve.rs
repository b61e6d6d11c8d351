//! Turn resolution: score every team's products, recompute market shares,
//! append history and advance the turn counter.
//!
//! Resolution is deterministic for a given RNG: the only random input is the
//! per-product demand noise, and a market profile with `demand_units_noise`
//! of zero removes even that.

use crate::factors::{build_factors, FactorBundle};
use crate::report::build_arbiter_report;
use rand::Rng;
use sim_core::num::{clamp, round1};
use sim_core::{
    classify_attributes, turn_key, turn_label, Event, EventStatus, HistoryEntry, MarketId,
    MarketProfile, MarketSensitivity, Product, ProductMetrics, ProductMetricsPair, RawDecision,
    Segment, SimConfig, Team,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from turn resolution. Nothing is mutated when one is returned.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("no teams registered; nothing to resolve")]
    NoTeams,
}

/// Outcome of one resolved turn.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnSummary {
    pub turn_processed: u32,
    pub processed_teams: usize,
}

/// Share of the market a channel count reaches.
pub fn channel_reach(channels: u8) -> f64 {
    match channels {
        1 => 0.50,
        2 => 0.75,
        3 => 0.90,
        4 => 1.00,
        _ => 0.50,
    }
}

fn price_target(profile: &MarketProfile, segment: Segment) -> f64 {
    let t = profile.target_price_by_segment.get(segment);
    if t.is_finite() && t != 0.0 {
        t
    } else {
        (profile.price_min + profile.price_max) / 2.0
    }
}

/// Scored state of one product within a turn.
struct ProductScore {
    metrics: ProductMetrics,
    margin_raw: f64,
    disc_price_raw: f64,
    power: f64,
    distance_ratio: f64,
    applied_event_ids: Vec<String>,
}

fn score_product(
    slot: &str,
    product: &Product,
    team_segment: Segment,
    profile: &MarketProfile,
    config: &SimConfig,
    active_events: &[Event],
    rng: &mut impl Rng,
) -> ProductScore {
    // Re-normalize against the stored product itself so a record written by
    // an older profile still lands in today's legal ranges.
    let p = sim_core::normalize_product(&RawDecision::from(product), profile, product);
    let segment = classify_attributes(p.quality as f64, p.design as f64, p.retail_price, profile);
    let factors = build_factors(profile, active_events, team_segment, Some(segment));

    let unit_cost = p.quality as f64 * factors.quality_cost_per_level
        + p.design as f64 * factors.design_cost_per_level;
    let disc_price = p.retail_price * (1.0 - p.discount_pct / 100.0);
    let margin = (disc_price - unit_cost) * factors.margin_multiplier;

    let target = price_target(profile, segment);
    let distance_ratio = (disc_price - target).abs() / target.max(1.0);
    let penalty = profile.sensitivity.price_distance_penalty * factors.sensitivity_multiplier;
    let alignment = clamp(
        1.0 - distance_ratio * penalty,
        profile.sensitivity.min_alignment,
        1.0,
    );

    let limits = &config.decision_limits;
    let quality_norm =
        (p.quality as f64 - limits.quality.min) / (limits.quality.max - limits.quality.min).max(1.0);
    let design_norm =
        (p.design as f64 - limits.design.min) / (limits.design.max - limits.design.min).max(1.0);
    let ad_factor = (p.ad_spend / profile.ad_spend_max.max(1.0)).min(1.0);
    let reach = channel_reach(p.channels);

    let power = clamp(
        0.36 * quality_norm + 0.24 * design_norm + 0.20 * ad_factor + 0.12 * reach
            + 0.08 * alignment,
        0.05,
        1.0,
    );

    let units_base = profile.demand_units_base * (0.55 + 0.95 * power) * alignment;
    // Noise is a uniform integer draw in [-n, n].
    let noise_bound = profile.demand_units_noise.round() as i64;
    let noise = if noise_bound > 0 {
        rng.gen_range(-noise_bound..=noise_bound) as f64
    } else {
        0.0
    };
    let units = (units_base + noise).round().max(profile.min_units);
    let arr = (units * disc_price * factors.arr_multiplier).round().max(1.0);

    debug!(
        product = slot,
        segment = %segment,
        units,
        arr,
        power,
        alignment,
        "scored product"
    );

    ProductScore {
        metrics: ProductMetrics {
            id: slot.to_string(),
            name: p.name.clone(),
            segmento: segment,
            retail_price: p.retail_price,
            unit_cost: unit_cost.round() as i64,
            disc_price: disc_price.round() as i64,
            margin: margin.round() as i64,
            arr: arr as i64,
            units: units as i64,
            channel_cost: (p.channels as f64 * factors.channel_cost_per_unit).round() as i64,
            price_target: target.round() as i64,
            price_distance_pct: (distance_ratio * 1000.0).round() / 10.0,
        },
        margin_raw: margin,
        disc_price_raw: disc_price,
        power,
        distance_ratio,
        applied_event_ids: factors.applied_event_ids,
    }
}

/// Per-team resolved numbers before market share is known.
struct TeamScore {
    arr: i64,
    cac: i64,
    avg_margin: i64,
    avg_disc_price: i64,
    products: ProductMetricsPair,
    applied_events: Vec<String>,
    sensitivity: MarketSensitivity,
}

fn score_team(
    team: &Team,
    profile: &MarketProfile,
    config: &SimConfig,
    active_events: &[Event],
    rng: &mut impl Rng,
) -> TeamScore {
    let a = score_product(
        "A",
        &team.products.a,
        team.segmento,
        profile,
        config,
        active_events,
        rng,
    );
    let b = score_product(
        "B",
        &team.products.b,
        team.segmento,
        profile,
        config,
        active_events,
        rng,
    );

    let arr = a.metrics.arr + b.metrics.arr;
    let avg_margin = ((a.margin_raw + b.margin_raw) / 2.0).round() as i64;
    let avg_disc_price = ((a.disc_price_raw + b.disc_price_raw) / 2.0).round() as i64;
    let avg_power = (a.power + b.power) / 2.0;
    let avg_distance = (a.distance_ratio + b.distance_ratio) / 2.0;

    let team_factors: FactorBundle = build_factors(profile, active_events, team.segmento, None);
    let cac = (profile.cac_base
        * (1.25 - 0.45 * avg_power)
        * (1.0 + avg_distance * profile.sensitivity.cac_distance_penalty)
        * team_factors.cac_multiplier)
        .round()
        .max(1.0) as i64;

    let mut applied_events = Vec::new();
    for id in a
        .applied_event_ids
        .iter()
        .chain(b.applied_event_ids.iter())
        .chain(team_factors.applied_event_ids.iter())
    {
        if !applied_events.contains(id) {
            applied_events.push(id.clone());
        }
    }

    TeamScore {
        arr,
        cac,
        avg_margin,
        avg_disc_price,
        products: ProductMetricsPair {
            a: a.metrics,
            b: b.metrics,
        },
        applied_events,
        sensitivity: MarketSensitivity {
            avg_price_distance_pct: round1(avg_distance * 100.0),
            penalty: profile.sensitivity.price_distance_penalty,
        },
    }
}

/// Percentage share of `arr` within a market whose ARR totals `total`.
pub fn market_share(arr: i64, total: i64) -> f64 {
    round1(100.0 * arr as f64 / total.max(1) as f64)
}

/// Resolve the current turn for every team, in place.
///
/// Scores both products per team, recomputes per-market shares, appends one
/// history entry and one arbiter report per team, marks due events executed
/// and advances the turn counter. With no teams nothing is mutated.
pub fn process_turn(
    teams: &mut [Team],
    config: &mut SimConfig,
    rng: &mut impl Rng,
) -> Result<TurnSummary, EngineError> {
    if teams.is_empty() {
        return Err(EngineError::NoTeams);
    }

    let turn = config.current_turn;
    let key = turn_key(turn);
    let label = if config.current_turn_label.is_empty() {
        turn_label(turn)
    } else {
        config.current_turn_label.clone()
    };
    let active_events = config.active_events(turn);
    info!(turn, teams = teams.len(), events = active_events.len(), "resolving turn");

    let mut scores = Vec::with_capacity(teams.len());
    for team in teams.iter_mut() {
        let profile = config.profile(team.market);
        team.normalize(&profile);
        scores.push(score_team(team, &profile, config, &active_events, rng));
    }

    // Market share is relative to every team competing in the same market.
    let mut by_market: BTreeMap<MarketId, Vec<usize>> = BTreeMap::new();
    for (i, team) in teams.iter().enumerate() {
        by_market.entry(team.market).or_default().push(i);
    }
    let mut shares = vec![0.0; teams.len()];
    for indices in by_market.values() {
        let total: i64 = indices.iter().map(|&i| scores[i].arr).sum();
        for &i in indices {
            shares[i] = market_share(scores[i].arr, total);
        }
    }

    for (i, team) in teams.iter_mut().enumerate() {
        let score = &scores[i];
        let submitted = team.submitted.get(&key).copied().unwrap_or(false);
        let entry = HistoryEntry {
            turn,
            turn_label: label.clone(),
            market: team.market,
            classification: team.segmento,
            arr: score.arr,
            market_share: shares[i],
            cac: score.cac,
            avg_margin: score.avg_margin,
            avg_disc_price: score.avg_disc_price,
            products: score.products.clone(),
            active_events: score.applied_events.clone(),
            market_sensitivity: score.sensitivity.clone(),
            submitted,
        };
        let report = build_arbiter_report(
            &entry,
            team.history.last(),
            &config.market_name(team.market),
            &active_events,
        );
        team.current_metrics.arr = entry.arr;
        team.current_metrics.market_share = entry.market_share;
        team.current_metrics.cac = entry.cac;
        team.current_metrics.avg_margin = entry.avg_margin;
        team.history.push(entry);
        team.arbiter_reports.insert(key.clone(), report);
    }

    for event in &mut config.events {
        event.status = if event.turn <= turn {
            EventStatus::Executed
        } else {
            EventStatus::Pending
        };
    }
    config.advance_turn();

    Ok(TurnSummary {
        turn_processed: turn,
        processed_teams: teams.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::{Coefficient, DeltaMode, EventScope, TeamId};

    fn quiet_config() -> SimConfig {
        let mut config = SimConfig::default();
        for profile in config.market_profiles.values_mut() {
            profile.demand_units_noise = 0.0;
        }
        config
    }

    fn team(id: &str, market: MarketId, config: &SimConfig) -> Team {
        Team::new(
            TeamId::from(id),
            id,
            "clave",
            market,
            &config.profile(market),
        )
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn empty_roster_is_an_error_and_leaves_config_untouched() {
        let mut config = quiet_config();
        let before = config.clone();
        let err = process_turn(&mut [], &mut config, &mut rng()).unwrap_err();
        assert_eq!(err, EngineError::NoTeams);
        assert_eq!(config, before);
    }

    #[test]
    fn product_economics_match_hand_computation() {
        let mut config = quiet_config();
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        teams[0].products.a.quality = 8;
        teams[0].products.a.design = 4;
        teams[0].products.a.retail_price = 180.0;
        teams[0].products.a.discount_pct = 5.0;

        process_turn(&mut teams, &mut config, &mut rng()).unwrap();

        let a = &teams[0].history[0].products.a;
        // unit cost 8 * 18 + 4 * 12 = 192, discounted price 180 * 0.95 = 171.
        assert_eq!(a.unit_cost, 192);
        assert_eq!(a.disc_price, 171);
        assert_eq!(a.margin, -21);
    }

    #[test]
    fn shares_within_a_market_sum_to_one_hundred() {
        let mut config = quiet_config();
        let mut teams = vec![
            team("T-01", MarketId::Moda, &config),
            team("T-02", MarketId::Moda, &config),
            team("T-03", MarketId::Autos, &config),
        ];
        teams[1].products.a.quality = 9;
        teams[1].products.a.ad_spend = 4_000_000.0;

        process_turn(&mut teams, &mut config, &mut rng()).unwrap();

        let moda_total: f64 = teams
            .iter()
            .filter(|t| t.market == MarketId::Moda)
            .map(|t| t.current_metrics.market_share)
            .sum();
        assert!((moda_total - 100.0).abs() < 0.2);
        // A team alone in its market owns all of it.
        assert_eq!(teams[2].current_metrics.market_share, 100.0);
    }

    #[test]
    fn market_share_is_rounded_to_one_decimal() {
        assert_eq!(market_share(4_000_000, 9_000_000), 44.4);
        assert_eq!(market_share(4_000_000, 5_000_000), 80.0);
        assert_eq!(market_share(0, 0), 0.0);
    }

    #[test]
    fn resolution_advances_the_turn_and_executes_due_events() {
        let mut config = quiet_config();
        config.events.push(Event {
            id: "EV-1".to_string(),
            turn: 1,
            ..Event::default()
        });
        config.events.push(Event {
            id: "EV-2".to_string(),
            turn: 3,
            ..Event::default()
        });
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];

        let summary = process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        assert_eq!(summary.turn_processed, 1);
        assert_eq!(summary.processed_teams, 1);
        assert_eq!(config.current_turn, 2);
        assert_eq!(config.current_turn_label, "Q2 2026");
        assert_eq!(config.events[0].status, EventStatus::Executed);
        assert_eq!(config.events[1].status, EventStatus::Pending);
    }

    #[test]
    fn scoped_event_leaves_other_segments_unscored() {
        let mut config = quiet_config();
        config.events.push(Event {
            id: "EV-1".to_string(),
            turn: 1,
            scope: EventScope::Lujo,
            coefficient: Coefficient::ArrMultiplier,
            delta_mode: DeltaMode::Pct,
            delta_value: 50.0,
            ..Event::default()
        });
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];

        let mut baseline_cfg = quiet_config();
        let mut baseline = vec![team("T-01", MarketId::Moda, &baseline_cfg)];
        process_turn(&mut baseline, &mut baseline_cfg, &mut rng()).unwrap();
        process_turn(&mut teams, &mut config, &mut rng()).unwrap();

        // Template products classify below lujo, so the boost never applies.
        assert_eq!(teams[0].history[0].arr, baseline[0].history[0].arr);
        assert!(teams[0].history[0].active_events.is_empty());
    }

    #[test]
    fn applied_event_ids_are_recorded_once() {
        let mut config = quiet_config();
        config.events.push(Event {
            id: "EV-1".to_string(),
            turn: 1,
            scope: EventScope::Todos,
            coefficient: Coefficient::CacMultiplier,
            delta_mode: DeltaMode::Pct,
            delta_value: 10.0,
            ..Event::default()
        });
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        assert_eq!(teams[0].history[0].active_events, vec!["EV-1"]);
    }

    #[test]
    fn zero_noise_makes_resolution_reproducible() {
        let mut config_a = quiet_config();
        let mut teams_a = vec![team("T-01", MarketId::Moda, &config_a)];
        let mut config_b = quiet_config();
        let mut teams_b = vec![team("T-01", MarketId::Moda, &config_b)];

        process_turn(&mut teams_a, &mut config_a, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        process_turn(&mut teams_b, &mut config_b, &mut ChaCha8Rng::seed_from_u64(999)).unwrap();

        assert_eq!(teams_a[0].history, teams_b[0].history);
    }

    #[test]
    fn units_never_drop_below_the_market_floor() {
        let mut config = quiet_config();
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        // Worst possible product: minimal everything, far from any target.
        teams[0].products.a.quality = 1;
        teams[0].products.a.design = 1;
        teams[0].products.a.retail_price = 1_000.0;
        teams[0].products.a.ad_spend = 0.0;
        teams[0].products.a.channels = 1;

        process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        assert!(teams[0].history[0].products.a.units >= 250);
    }

    #[test]
    fn history_echoes_the_price_distance_penalty() {
        let mut config = quiet_config();
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        assert_eq!(teams[0].history[0].market_sensitivity.penalty, 1.05);
    }

    #[test]
    fn demand_noise_is_an_integer_draw() {
        let seed = 5;
        let mut quiet_cfg = quiet_config();
        let mut quiet_teams = vec![team("T-01", MarketId::Moda, &quiet_cfg)];
        process_turn(&mut quiet_teams, &mut quiet_cfg, &mut ChaCha8Rng::seed_from_u64(seed))
            .unwrap();

        let mut config = SimConfig::default();
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        process_turn(&mut teams, &mut config, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();

        // Integer noise shifts the rounded unit count by exactly the draw.
        let mut draws = ChaCha8Rng::seed_from_u64(seed);
        let noise_a: i64 = draws.gen_range(-450..=450);
        let noise_b: i64 = draws.gen_range(-450..=450);
        let quiet = &quiet_teams[0].history[0].products;
        let noisy = &teams[0].history[0].products;
        assert_eq!(noisy.a.units, quiet.a.units + noise_a);
        assert_eq!(noisy.b.units, quiet.b.units + noise_b);
    }

    #[test]
    fn product_arr_is_floored_at_one() {
        let mut config = quiet_config();
        // Degenerate market: unit demand, unit prices, a collapsed revenue
        // multiplier. Per-product ARR rounds to zero before the floor.
        {
            let profile = config.market_profiles.get_mut(&MarketId::Moda).unwrap();
            profile.price_min = 1.0;
            profile.price_step = 1.0;
            profile.price_max = 3.0;
            profile.demand_units_base = 1.0;
            profile.min_units = 1.0;
        }
        config.events.push(Event {
            id: "EV-1".to_string(),
            turn: 1,
            coefficient: Coefficient::ArrMultiplier,
            delta_mode: DeltaMode::Pct,
            delta_value: -90.0,
            ..Event::default()
        });
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        let pair = &mut teams[0].products;
        for product in [&mut pair.a, &mut pair.b] {
            product.quality = 1;
            product.design = 1;
            product.retail_price = 1.0;
            product.discount_pct = 50.0;
            product.ad_spend = 0.0;
            product.channels = 1;
        }

        process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        let entry = &teams[0].history[0];
        assert_eq!(entry.products.a.arr, 1);
        assert_eq!(entry.products.b.arr, 1);
        assert_eq!(entry.arr, 2);
    }

    #[test]
    fn history_and_reports_accumulate_per_turn() {
        let mut config = quiet_config();
        let mut teams = vec![team("T-01", MarketId::Moda, &config)];
        process_turn(&mut teams, &mut config, &mut rng()).unwrap();
        process_turn(&mut teams, &mut config, &mut rng()).unwrap();

        assert_eq!(teams[0].history.len(), 2);
        assert_eq!(teams[0].history[0].turn, 1);
        assert_eq!(teams[0].history[1].turn, 2);
        assert!(teams[0].arbiter_reports.contains_key("Q1"));
        assert!(teams[0].arbiter_reports.contains_key("Q2"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn share_of_a_part_stays_within_bounds(arr in 0i64..1_000_000, extra in 0i64..1_000_000) {
                let share = market_share(arr, arr + extra);
                prop_assert!((0.0..=100.0).contains(&share));
            }

            #[test]
            fn resolved_metrics_respect_engine_floors(
                quality in 1u8..=10, design in 1u8..=5,
                price in 10.0f64..=1000.0, ad in 0.0f64..=4_000_000.0,
                channels in 1u8..=4, seed in 0u64..1000,
            ) {
                let mut config = SimConfig::default();
                let mut teams = vec![team("T-01", MarketId::Moda, &config)];
                teams[0].products.a.quality = quality;
                teams[0].products.a.design = design;
                teams[0].products.a.retail_price = price;
                teams[0].products.a.ad_spend = ad;
                teams[0].products.a.channels = channels;

                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                process_turn(&mut teams, &mut config, &mut rng).unwrap();

                let entry = &teams[0].history[0];
                prop_assert!(entry.products.a.units >= 250);
                prop_assert!(entry.cac >= 1);
                prop_assert!(entry.arr >= 2);
                prop_assert_eq!(entry.market_share, 100.0);
            }
        }
    }
}
