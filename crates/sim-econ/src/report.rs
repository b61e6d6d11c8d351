//! Narrative arbiter reports: turn-over-turn deltas plus a short verdict for
//! each team, written in the voice players see on their dashboard.

use sim_core::num::round1;
use sim_core::{
    ArbiterReport, DeltaDir, DeltaMode, Event, HistoryEntry, IncomingEvent, MetricDelta,
    ReportMetrics,
};

fn pct_delta(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(prev) => round1(100.0 * (current - prev) / prev.abs().max(1.0)),
        None => 0.0,
    }
}

fn metric(value: f64, delta: f64, lower_is_better: bool) -> MetricDelta {
    let favorable = if lower_is_better { delta <= 0.0 } else { delta >= 0.0 };
    MetricDelta {
        value,
        delta_dir: if favorable { DeltaDir::Up } else { DeltaDir::Down },
        delta_pct: format!("{}%", round1(delta)),
    }
}

fn incoming_event(active_events: &[Event], market_name: &str) -> IncomingEvent {
    match active_events.first() {
        Some(ev) => {
            let title = if ev.name.trim().is_empty() {
                "Evento de Mercado".to_string()
            } else {
                ev.name.clone()
            };
            let suffix = match ev.delta_mode {
                DeltaMode::Pct => "%",
                DeltaMode::Abs => "",
            };
            IncomingEvent {
                title,
                description: format!(
                    "Se aplico {} con variacion {}{}.",
                    ev.coefficient, ev.delta_value, suffix
                ),
            }
        }
        None => IncomingEvent {
            title: format!("Senal de Mercado {market_name}"),
            description: "El proximo periodo demandara mayor coherencia entre propuesta de valor \
                          y sensibilidad de precio."
                .to_string(),
        },
    }
}

/// Build the report for a just-resolved turn, comparing against the previous
/// history entry when one exists.
pub fn build_arbiter_report(
    entry: &HistoryEntry,
    previous: Option<&HistoryEntry>,
    market_name: &str,
    active_events: &[Event],
) -> ArbiterReport {
    let arr_delta = pct_delta(entry.arr as f64, previous.map(|p| p.arr as f64));
    let margin_delta = pct_delta(entry.avg_margin as f64, previous.map(|p| p.avg_margin as f64));
    let cac_delta = pct_delta(entry.cac as f64, previous.map(|p| p.cac as f64));
    // Share moves are reported in percentage points, not relative percent.
    let share_delta = match previous {
        Some(prev) => round1(entry.market_share - prev.market_share),
        None => 0.0,
    };

    let mut market_share = metric(entry.market_share, share_delta, false);
    market_share.delta_pct = format!("{share_delta}pp");

    ArbiterReport {
        turn: entry.turn,
        metrics: ReportMetrics {
            arr: metric(entry.arr as f64, arr_delta, false),
            market_share,
            avg_margin: metric(entry.avg_margin as f64, margin_delta, false),
            cac: metric(entry.cac as f64, cac_delta, true),
        },
        verdict: format!(
            "La empresa compitio en {market_name} con perfil {}. Revisa coherencia entre \
             calidad, diseno y precio para el proximo turno.",
            entry.classification
        ),
        incoming_event: incoming_event(active_events, market_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{Coefficient, Segment};

    fn entry(turn: u32, arr: i64, share: f64, cac: i64, margin: i64) -> HistoryEntry {
        HistoryEntry {
            turn,
            arr,
            market_share: share,
            cac,
            avg_margin: margin,
            classification: Segment::Medio,
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn first_turn_has_neutral_deltas() {
        let report = build_arbiter_report(&entry(1, 500_000, 50.0, 60, 40), None, "Moda", &[]);
        assert_eq!(report.metrics.arr.delta_pct, "0%");
        assert_eq!(report.metrics.arr.delta_dir, DeltaDir::Up);
        assert_eq!(report.metrics.market_share.delta_pct, "0pp");
    }

    #[test]
    fn deltas_compare_against_the_previous_turn() {
        let prev = entry(1, 400_000, 40.0, 60, 40);
        let report =
            build_arbiter_report(&entry(2, 500_000, 45.5, 66, 30), Some(&prev), "Moda", &[]);
        assert_eq!(report.metrics.arr.delta_pct, "25%");
        assert_eq!(report.metrics.arr.delta_dir, DeltaDir::Up);
        assert_eq!(report.metrics.market_share.delta_pct, "5.5pp");
        assert_eq!(report.metrics.avg_margin.delta_pct, "-25%");
        assert_eq!(report.metrics.avg_margin.delta_dir, DeltaDir::Down);
    }

    #[test]
    fn a_falling_cac_counts_as_improvement() {
        let prev = entry(1, 400_000, 40.0, 100, 40);
        let report =
            build_arbiter_report(&entry(2, 400_000, 40.0, 80, 40), Some(&prev), "Moda", &[]);
        assert_eq!(report.metrics.cac.delta_pct, "-20%");
        assert_eq!(report.metrics.cac.delta_dir, DeltaDir::Up);
    }

    #[test]
    fn verdict_names_market_and_segment() {
        let report = build_arbiter_report(&entry(1, 1, 100.0, 1, 1), None, "Autos", &[]);
        assert!(report.verdict.contains("Autos"));
        assert!(report.verdict.contains("medio"));
    }

    #[test]
    fn incoming_event_describes_the_first_active_event() {
        let ev = Event {
            id: "EV-1".to_string(),
            name: "Inflacion".to_string(),
            coefficient: Coefficient::CacMultiplier,
            delta_value: 15.0,
            ..Event::default()
        };
        let report = build_arbiter_report(&entry(1, 1, 100.0, 1, 1), None, "Moda", &[ev]);
        assert_eq!(report.incoming_event.title, "Inflacion");
        assert_eq!(
            report.incoming_event.description,
            "Se aplico cac_multiplier con variacion 15%."
        );
    }

    #[test]
    fn quiet_turn_falls_back_to_the_market_signal() {
        let report = build_arbiter_report(&entry(1, 1, 100.0, 1, 1), None, "Casas", &[]);
        assert_eq!(report.incoming_event.title, "Senal de Mercado Casas");
    }
}
