//! Simulation configuration and the per-market economic profiles.
//!
//! The config is an explicit immutable value threaded through every call: it
//! is constructed from defaults, optionally overridden by professor-authored
//! data, and repaired back into sane numeric ranges on every read via
//! [`SimConfig::normalized`]. Nothing in the engine ever consults a global.

use crate::event::Event;
use crate::num::{clamp, round_to_step_bounded};
use crate::segment::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one of the three simulated markets.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum MarketId {
    #[default]
    Moda,
    // Older datasets stored this market as "vehiculos".
    #[serde(alias = "vehiculos")]
    Autos,
    Casas,
}

impl MarketId {
    pub const ALL: [MarketId; 3] = [MarketId::Moda, MarketId::Autos, MarketId::Casas];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketId::Moda => "moda",
            MarketId::Autos => "autos",
            MarketId::Casas => "casas",
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized enum-like configuration strings.
#[derive(Debug, Error, PartialEq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for MarketId {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moda" => Ok(MarketId::Moda),
            "autos" | "vehiculos" => Ok(MarketId::Autos),
            "casas" => Ok(MarketId::Casas),
            other => Err(UnknownName {
                kind: "market",
                value: other.to_string(),
            }),
        }
    }
}

/// Price-fit sensitivity parameters of a market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensitivity {
    /// How hard alignment drops per unit of relative price distance.
    pub price_distance_penalty: f64,
    /// How hard CAC inflates per unit of average price distance.
    pub cac_distance_penalty: f64,
    /// Floor of the alignment factor.
    pub min_alignment: f64,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self {
            price_distance_penalty: 1.0,
            cac_distance_penalty: 0.5,
            min_alignment: 0.2,
        }
    }
}

/// Segment-indexed price targets.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetPrices {
    pub economico: f64,
    pub medio: f64,
    pub lujo: f64,
}

impl TargetPrices {
    pub fn get(&self, segment: Segment) -> f64 {
        match segment {
            Segment::Economico => self.economico,
            Segment::Medio => self.medio,
            Segment::Lujo => self.lujo,
        }
    }
}

/// Per-market economic parameters, immutable within a turn.
///
/// Always obtained through [`SimConfig::profile`], which re-normalizes the
/// stored record so every consumer sees bounded values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketProfile {
    pub id: MarketId,
    pub price_min: f64,
    pub price_max: f64,
    pub price_step: f64,
    pub quality_cost_per_level: f64,
    pub design_cost_per_level: f64,
    pub channel_cost_per_unit: f64,
    pub ad_spend_max: f64,
    pub ad_spend_step: f64,
    pub default_price_a: f64,
    pub default_price_b: f64,
    pub default_ad_spend_a: f64,
    pub default_ad_spend_b: f64,
    pub max_budget_per_turn: f64,
    pub demand_units_base: f64,
    pub demand_units_noise: f64,
    pub min_units: f64,
    pub cac_base: f64,
    pub sensitivity: Sensitivity,
    pub target_price_by_segment: TargetPrices,
}

impl Default for MarketProfile {
    // All-zero skeleton: only meaningful as the serde fill-in before
    // `normalized_for` repairs every field from the market's base profile.
    fn default() -> Self {
        Self {
            id: MarketId::Moda,
            price_min: 0.0,
            price_max: 0.0,
            price_step: 0.0,
            quality_cost_per_level: 0.0,
            design_cost_per_level: 0.0,
            channel_cost_per_unit: 0.0,
            ad_spend_max: 0.0,
            ad_spend_step: 0.0,
            default_price_a: 0.0,
            default_price_b: 0.0,
            default_ad_spend_a: 0.0,
            default_ad_spend_b: 0.0,
            max_budget_per_turn: 0.0,
            demand_units_base: 0.0,
            demand_units_noise: -1.0,
            min_units: 0.0,
            cac_base: 0.0,
            sensitivity: Sensitivity::default(),
            target_price_by_segment: TargetPrices::default(),
        }
    }
}

// Missing or zero stored value falls back to the market's built-in default.
fn field(stored: f64, base: f64) -> f64 {
    if stored.is_finite() && stored != 0.0 {
        stored
    } else {
        base
    }
}

impl MarketProfile {
    /// Built-in default profile for a market. These are the authoritative
    /// baseline economics; professor overrides are merged on top of them.
    pub fn default_for(id: MarketId) -> MarketProfile {
        match id {
            MarketId::Moda => MarketProfile {
                id,
                price_min: 10.0,
                price_max: 1_000.0,
                price_step: 10.0,
                quality_cost_per_level: 18.0,
                design_cost_per_level: 12.0,
                channel_cost_per_unit: 95_000.0,
                ad_spend_max: 4_000_000.0,
                ad_spend_step: 50_000.0,
                default_price_a: 180.0,
                default_price_b: 90.0,
                default_ad_spend_a: 1_200_000.0,
                default_ad_spend_b: 700_000.0,
                max_budget_per_turn: 8_000_000.0,
                demand_units_base: 3_000.0,
                demand_units_noise: 450.0,
                min_units: 250.0,
                cac_base: 55.0,
                sensitivity: Sensitivity {
                    price_distance_penalty: 1.05,
                    cac_distance_penalty: 0.70,
                    min_alignment: 0.20,
                },
                target_price_by_segment: TargetPrices {
                    economico: 70.0,
                    medio: 280.0,
                    lujo: 760.0,
                },
            },
            MarketId::Autos => MarketProfile {
                id,
                price_min: 8_000.0,
                price_max: 150_000.0,
                price_step: 500.0,
                quality_cost_per_level: 1_800.0,
                design_cost_per_level: 900.0,
                channel_cost_per_unit: 1_500_000.0,
                ad_spend_max: 45_000_000.0,
                ad_spend_step: 250_000.0,
                default_price_a: 45_000.0,
                default_price_b: 32_000.0,
                default_ad_spend_a: 12_000_000.0,
                default_ad_spend_b: 8_000_000.0,
                max_budget_per_turn: 45_000_000.0,
                demand_units_base: 210.0,
                demand_units_noise: 45.0,
                min_units: 18.0,
                cac_base: 14_500.0,
                sensitivity: Sensitivity {
                    price_distance_penalty: 0.90,
                    cac_distance_penalty: 0.35,
                    min_alignment: 0.25,
                },
                target_price_by_segment: TargetPrices {
                    economico: 18_000.0,
                    medio: 52_000.0,
                    lujo: 115_000.0,
                },
            },
            MarketId::Casas => MarketProfile {
                id,
                price_min: 100_000.0,
                price_max: 3_000_000.0,
                price_step: 25_000.0,
                quality_cost_per_level: 40_000.0,
                design_cost_per_level: 22_000.0,
                channel_cost_per_unit: 6_500_000.0,
                ad_spend_max: 120_000_000.0,
                ad_spend_step: 1_000_000.0,
                default_price_a: 950_000.0,
                default_price_b: 700_000.0,
                default_ad_spend_a: 28_000_000.0,
                default_ad_spend_b: 20_000_000.0,
                max_budget_per_turn: 150_000_000.0,
                demand_units_base: 36.0,
                demand_units_noise: 9.0,
                min_units: 3.0,
                cac_base: 65_000.0,
                sensitivity: Sensitivity {
                    price_distance_penalty: 1.25,
                    cac_distance_penalty: 0.55,
                    min_alignment: 0.12,
                },
                target_price_by_segment: TargetPrices {
                    economico: 260_000.0,
                    medio: 950_000.0,
                    lujo: 2_400_000.0,
                },
            },
        }
    }

    /// Repair a stored profile for market `id`: missing (zero) fields fall
    /// back to the market's base defaults, and every field is clamped into a
    /// sane range.
    pub fn normalized_for(self, id: MarketId) -> MarketProfile {
        let base = MarketProfile::default_for(id);

        let price_min = field(self.price_min, base.price_min).max(1.0);
        let price_step = field(self.price_step, base.price_step).max(1.0);
        let price_max = field(self.price_max, base.price_max).max(price_min + price_step);

        let default_price_a = round_to_step_bounded(
            clamp(
                field(self.default_price_a, base.default_price_a),
                price_min,
                price_max,
            ),
            price_step,
            price_min,
            price_max,
        );
        let default_price_b = round_to_step_bounded(
            clamp(
                field(self.default_price_b, base.default_price_b),
                price_min,
                price_max,
            ),
            price_step,
            price_min,
            price_max,
        );

        // Zero is a legal noise level (fully deterministic demand), so only a
        // negative or non-finite value falls back to the base.
        let demand_units_noise =
            if self.demand_units_noise.is_finite() && self.demand_units_noise >= 0.0 {
                self.demand_units_noise
            } else {
                base.demand_units_noise
            };

        MarketProfile {
            id,
            price_min,
            price_max,
            price_step,
            quality_cost_per_level: field(self.quality_cost_per_level, base.quality_cost_per_level)
                .max(1.0),
            design_cost_per_level: field(self.design_cost_per_level, base.design_cost_per_level)
                .max(1.0),
            channel_cost_per_unit: field(self.channel_cost_per_unit, base.channel_cost_per_unit)
                .max(1.0),
            ad_spend_max: field(self.ad_spend_max, base.ad_spend_max).max(10_000.0),
            ad_spend_step: field(self.ad_spend_step, base.ad_spend_step).max(1_000.0),
            default_price_a,
            default_price_b,
            default_ad_spend_a: field(self.default_ad_spend_a, base.default_ad_spend_a).max(0.0),
            default_ad_spend_b: field(self.default_ad_spend_b, base.default_ad_spend_b).max(0.0),
            max_budget_per_turn: field(self.max_budget_per_turn, base.max_budget_per_turn)
                .max(1_000_000.0),
            demand_units_base: field(self.demand_units_base, base.demand_units_base).max(1.0),
            demand_units_noise,
            min_units: field(self.min_units, base.min_units).max(1.0),
            cac_base: field(self.cac_base, base.cac_base).max(1.0),
            sensitivity: Sensitivity {
                price_distance_penalty: clamp(
                    field(
                        self.sensitivity.price_distance_penalty,
                        base.sensitivity.price_distance_penalty,
                    ),
                    0.05,
                    3.0,
                ),
                cac_distance_penalty: clamp(
                    field(
                        self.sensitivity.cac_distance_penalty,
                        base.sensitivity.cac_distance_penalty,
                    ),
                    0.0,
                    3.0,
                ),
                min_alignment: clamp(
                    field(
                        self.sensitivity.min_alignment,
                        base.sensitivity.min_alignment,
                    ),
                    0.05,
                    1.0,
                ),
            },
            target_price_by_segment: TargetPrices {
                economico: clamp(
                    field(
                        self.target_price_by_segment.economico,
                        base.target_price_by_segment.economico,
                    ),
                    price_min,
                    price_max,
                ),
                medio: clamp(
                    field(
                        self.target_price_by_segment.medio,
                        base.target_price_by_segment.medio,
                    ),
                    price_min,
                    price_max,
                ),
                lujo: clamp(
                    field(
                        self.target_price_by_segment.lujo,
                        base.target_price_by_segment.lujo,
                    ),
                    price_min,
                    price_max,
                ),
            },
        }
    }
}

/// An inclusive [min, max] decision bound.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    pub min: f64,
    pub max: f64,
}

impl Default for Limit {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// A decision bound with a step increment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteppedLimit {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for SteppedLimit {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            step: 1.0,
        }
    }
}

/// Bounds for every submittable decision field. Market-independent; price and
/// ad-spend are narrowed further by each market's profile through
/// [`SimConfig::decision_profile`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionLimits {
    pub quality: Limit,
    pub design: Limit,
    pub retail_price: SteppedLimit,
    pub discount_pct: Limit,
    pub ad_spend: SteppedLimit,
    pub channels: Limit,
}

impl Default for DecisionLimits {
    fn default() -> Self {
        Self {
            quality: Limit {
                min: 1.0,
                max: 10.0,
            },
            design: Limit { min: 1.0, max: 5.0 },
            retail_price: SteppedLimit {
                min: 10.0,
                max: 3_000_000.0,
                step: 10.0,
            },
            discount_pct: Limit {
                min: 0.0,
                max: 50.0,
            },
            ad_spend: SteppedLimit {
                min: 0.0,
                max: 150_000_000.0,
                step: 50_000.0,
            },
            channels: Limit { min: 1.0, max: 4.0 },
        }
    }
}

impl DecisionLimits {
    fn normalized(mut self) -> Self {
        fn fix(l: &mut Limit, d: Limit) {
            if !l.min.is_finite() || !l.max.is_finite() {
                *l = d;
            }
            l.max = l.max.max(l.min);
        }
        fn fix_stepped(l: &mut SteppedLimit, d: SteppedLimit) {
            if !l.min.is_finite() || !l.max.is_finite() {
                *l = d;
            }
            l.max = l.max.max(l.min);
            l.step = if l.step.is_finite() { l.step.max(1.0) } else { d.step };
        }
        let d = DecisionLimits::default();
        fix(&mut self.quality, d.quality);
        fix(&mut self.design, d.design);
        fix_stepped(&mut self.retail_price, d.retail_price);
        fix(&mut self.discount_pct, d.discount_pct);
        fix_stepped(&mut self.ad_spend, d.ad_spend);
        fix(&mut self.channels, d.channels);
        self
    }
}

/// One of the three top-level markets as shown to players.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MainMarket {
    pub id: MarketId,
    pub name: String,
    pub total_market_size: f64,
    pub growth_rate: f64,
}

fn default_main_markets() -> Vec<MainMarket> {
    vec![
        MainMarket {
            id: MarketId::Moda,
            name: "Moda".to_string(),
            total_market_size: 18_500_000.0,
            growth_rate: 0.06,
        },
        MainMarket {
            id: MarketId::Autos,
            name: "Autos".to_string(),
            total_market_size: 26_000_000.0,
            growth_rate: 0.04,
        },
        MainMarket {
            id: MarketId::Casas,
            name: "Casas".to_string(),
            total_market_size: 21_000_000.0,
            growth_rate: 0.05,
        },
    ]
}

/// Whole-simulation configuration: turn counter, capacities, decision limits,
/// market profiles and the professor-authored event list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub current_turn: u32,
    pub current_turn_label: String,
    pub max_turns: u32,
    pub max_teams_per_market: u32,
    /// Fallback budget cap when a market profile has none of its own.
    pub max_budget: f64,
    pub registration_open: bool,
    pub main_markets: Vec<MainMarket>,
    pub market_profiles: BTreeMap<MarketId, MarketProfile>,
    pub decision_limits: DecisionLimits,
    pub events: Vec<Event>,
    pub submission_deadline: Option<DateTime<Utc>>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut market_profiles = BTreeMap::new();
        for id in MarketId::ALL {
            market_profiles.insert(id, MarketProfile::default_for(id));
        }
        Self {
            current_turn: 1,
            current_turn_label: turn_label(1),
            max_turns: 5,
            max_teams_per_market: 9,
            max_budget: 150_000_000.0,
            registration_open: true,
            main_markets: default_main_markets(),
            market_profiles,
            decision_limits: DecisionLimits::default(),
            events: Vec::new(),
            submission_deadline: None,
        }
    }
}

/// `"Q{n} 2026"`, the label attached to turn `n` everywhere it is displayed.
pub fn turn_label(turn: u32) -> String {
    format!("Q{turn} 2026")
}

/// `"Q{n}"`, the key under which turn `n` is recorded in history maps.
pub fn turn_key(turn: u32) -> String {
    format!("Q{turn}")
}

impl SimConfig {
    /// Repair a stored config: clamp counters, re-normalize limits, rebuild
    /// all three market profiles and re-normalize events. Invoked on every
    /// read from the store so downstream code never sees garbage.
    pub fn normalized(mut self) -> Self {
        self.current_turn = self.current_turn.max(1);
        if self.current_turn_label.is_empty() {
            self.current_turn_label = turn_label(self.current_turn);
        }
        self.max_turns = self.max_turns.max(1);
        self.max_teams_per_market = self.max_teams_per_market.max(1);
        self.max_budget = if self.max_budget.is_finite() && self.max_budget != 0.0 {
            self.max_budget.max(1_000_000.0)
        } else {
            150_000_000.0
        };
        if self.main_markets.len() < MarketId::ALL.len() {
            self.main_markets = default_main_markets();
        }
        self.decision_limits = self.decision_limits.normalized();

        let mut profiles = BTreeMap::new();
        for id in MarketId::ALL {
            let stored = self.market_profiles.remove(&id).unwrap_or_default();
            profiles.insert(id, stored.normalized_for(id));
        }
        self.market_profiles = profiles;

        for ev in &mut self.events {
            ev.normalize();
        }
        self
    }

    /// Normalized profile for a market (defaults when absent).
    pub fn profile(&self, id: MarketId) -> MarketProfile {
        self.market_profiles
            .get(&id)
            .cloned()
            .unwrap_or_default()
            .normalized_for(id)
    }

    /// Display name of a market.
    pub fn market_name(&self, id: MarketId) -> String {
        self.main_markets
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Merged per-market decision bounds: config-wide limits narrowed by the
    /// market profile's price/ad-spend ranges and budget cap.
    pub fn decision_profile(&self, id: MarketId) -> DecisionProfile {
        let p = self.profile(id);
        DecisionProfile {
            market_id: id,
            market_name: self.market_name(id),
            quality: self.decision_limits.quality,
            design: self.decision_limits.design,
            price: SteppedLimit {
                min: p.price_min,
                max: p.price_max,
                step: p.price_step,
            },
            discount_pct: SteppedLimit {
                min: self.decision_limits.discount_pct.min,
                max: self.decision_limits.discount_pct.max,
                step: 1.0,
            },
            ad_spend: SteppedLimit {
                min: 0.0,
                max: p.ad_spend_max,
                step: p.ad_spend_step,
            },
            channels: self.decision_limits.channels,
            quality_cost_per_level: p.quality_cost_per_level,
            design_cost_per_level: p.design_cost_per_level,
            channel_cost_per_unit: p.channel_cost_per_unit,
            sensitivity: p.sensitivity.clone(),
            target_price_by_segment: p.target_price_by_segment.clone(),
            max_budget: if p.max_budget_per_turn > 0.0 {
                p.max_budget_per_turn
            } else {
                self.max_budget
            },
        }
    }

    /// Events scheduled for `turn`, in configuration order.
    pub fn active_events(&self, turn: u32) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.turn == turn)
            .cloned()
            .collect()
    }

    /// Bump the turn counter and refresh its label.
    pub fn advance_turn(&mut self) {
        self.current_turn += 1;
        self.current_turn_label = turn_label(self.current_turn);
    }
}

/// Per-market view of everything a submission is validated against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionProfile {
    pub market_id: MarketId,
    pub market_name: String,
    pub quality: Limit,
    pub design: Limit,
    pub price: SteppedLimit,
    pub discount_pct: SteppedLimit,
    pub ad_spend: SteppedLimit,
    pub channels: Limit,
    pub quality_cost_per_level: f64,
    pub design_cost_per_level: f64,
    pub channel_cost_per_unit: f64,
    pub sensitivity: Sensitivity,
    pub target_price_by_segment: TargetPrices,
    pub max_budget: f64,
}
