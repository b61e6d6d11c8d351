//! Event application: fold a turn's active events into an economic factor
//! bundle.
//!
//! Each bundle starts from a market profile's cost coefficients plus neutral
//! multipliers, then applies events in configuration order. Events scoped to
//! a segment only touch bundles whose target segment matches.

use sim_core::{Coefficient, DeltaMode, Event, MarketProfile, Segment};

/// The seven adjustable coefficients after all events for a turn have been
/// applied, plus the ids of the events that actually hit this bundle.
///
/// The price-sensitivity slot is a base-1.0 multiplier that scales the
/// profile's `price_distance_penalty` at read time, so pct and abs deltas
/// both act relative to neutral rather than the profile value.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorBundle {
    pub quality_cost_per_level: f64,
    pub design_cost_per_level: f64,
    pub channel_cost_per_unit: f64,
    pub arr_multiplier: f64,
    pub cac_multiplier: f64,
    pub margin_multiplier: f64,
    pub sensitivity_multiplier: f64,
    pub applied_event_ids: Vec<String>,
}

impl FactorBundle {
    fn base(profile: &MarketProfile) -> FactorBundle {
        FactorBundle {
            quality_cost_per_level: profile.quality_cost_per_level,
            design_cost_per_level: profile.design_cost_per_level,
            channel_cost_per_unit: profile.channel_cost_per_unit,
            arr_multiplier: 1.0,
            cac_multiplier: 1.0,
            margin_multiplier: 1.0,
            sensitivity_multiplier: 1.0,
            applied_event_ids: Vec::new(),
        }
    }

    fn slot(&mut self, coefficient: Coefficient) -> &mut f64 {
        match coefficient {
            Coefficient::QualityCostPerLevel => &mut self.quality_cost_per_level,
            Coefficient::DesignCostPerLevel => &mut self.design_cost_per_level,
            Coefficient::ChannelCostPerUnit => &mut self.channel_cost_per_unit,
            Coefficient::ArrMultiplier => &mut self.arr_multiplier,
            Coefficient::CacMultiplier => &mut self.cac_multiplier,
            Coefficient::MarginMultiplier => &mut self.margin_multiplier,
            Coefficient::PriceDistancePenalty => &mut self.sensitivity_multiplier,
        }
    }

    fn apply(&mut self, event: &Event) {
        if !event.delta_value.is_finite() {
            return;
        }
        let slot = self.slot(event.coefficient);
        *slot = match event.delta_mode {
            DeltaMode::Abs => *slot + event.delta_value,
            DeltaMode::Pct => *slot * (1.0 + event.delta_value / 100.0),
        };
        self.applied_event_ids.push(event.id.clone());
    }

    fn floor(mut self) -> FactorBundle {
        self.quality_cost_per_level = self.quality_cost_per_level.round().max(1.0);
        self.design_cost_per_level = self.design_cost_per_level.round().max(1.0);
        self.channel_cost_per_unit = self.channel_cost_per_unit.round().max(1.0);
        self.arr_multiplier = self.arr_multiplier.max(0.1);
        self.cac_multiplier = self.cac_multiplier.max(0.1);
        self.margin_multiplier = self.margin_multiplier.max(0.1);
        self.sensitivity_multiplier = self.sensitivity_multiplier.max(0.1);
        self
    }
}

/// Build the factor bundle for one scoring target.
///
/// Scoped events match against `product_segment` when given (product-level
/// scoring) and against `team_segment` otherwise (team-level CAC scoring).
pub fn build_factors(
    profile: &MarketProfile,
    active_events: &[Event],
    team_segment: Segment,
    product_segment: Option<Segment>,
) -> FactorBundle {
    let target = product_segment.unwrap_or(team_segment);
    let mut bundle = FactorBundle::base(profile);
    for event in active_events {
        if event.scope.applies_to(target) {
            bundle.apply(event);
        }
    }
    bundle.floor()
}
