//! Professor-authored market events.
//!
//! An event targets a single economic coefficient for one turn, scoped to the
//! whole market or to one segment. The set of adjustable coefficients is a
//! closed enum so an event can never reach outside the economic model.

use crate::segment::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::UnknownName;

/// The economic coefficients an event may adjust.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Coefficient {
    QualityCostPerLevel,
    DesignCostPerLevel,
    ChannelCostPerUnit,
    #[default]
    ArrMultiplier,
    CacMultiplier,
    MarginMultiplier,
    PriceDistancePenalty,
}

impl Coefficient {
    pub const ALL: [Coefficient; 7] = [
        Coefficient::QualityCostPerLevel,
        Coefficient::DesignCostPerLevel,
        Coefficient::ChannelCostPerUnit,
        Coefficient::ArrMultiplier,
        Coefficient::CacMultiplier,
        Coefficient::MarginMultiplier,
        Coefficient::PriceDistancePenalty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Coefficient::QualityCostPerLevel => "quality_cost_per_level",
            Coefficient::DesignCostPerLevel => "design_cost_per_level",
            Coefficient::ChannelCostPerUnit => "channel_cost_per_unit",
            Coefficient::ArrMultiplier => "arr_multiplier",
            Coefficient::CacMultiplier => "cac_multiplier",
            Coefficient::MarginMultiplier => "margin_multiplier",
            Coefficient::PriceDistancePenalty => "price_distance_penalty",
        }
    }
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Coefficient {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coefficient::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "coefficient",
                value: s.to_string(),
            })
    }
}

/// How an event's delta is applied to its coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    /// `base * (1 + delta / 100)`.
    #[default]
    Pct,
    /// `base + delta`.
    Abs,
}

/// Lifecycle of an event relative to the turn counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "ejecutado")]
    Executed,
}

/// Which teams and products an event reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    #[default]
    Todos,
    Economico,
    Medio,
    Lujo,
}

impl FromStr for EventScope {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todos" => Ok(EventScope::Todos),
            "economico" => Ok(EventScope::Economico),
            "medio" => Ok(EventScope::Medio),
            "lujo" => Ok(EventScope::Lujo),
            other => Err(UnknownName {
                kind: "event scope",
                value: other.to_string(),
            }),
        }
    }
}

impl EventScope {
    pub fn applies_to(&self, segment: Segment) -> bool {
        match self {
            EventScope::Todos => true,
            EventScope::Economico => segment == Segment::Economico,
            EventScope::Medio => segment == Segment::Medio,
            EventScope::Lujo => segment == Segment::Lujo,
        }
    }
}

/// A scheduled one-turn adjustment to a market coefficient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: String,
    pub turn: u32,
    pub name: String,
    #[serde(rename = "segmento")]
    pub scope: EventScope,
    pub coefficient: Coefficient,
    pub delta_mode: DeltaMode,
    pub delta_value: f64,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: String::new(),
            turn: 1,
            name: "Evento".to_string(),
            scope: EventScope::default(),
            coefficient: Coefficient::default(),
            delta_mode: DeltaMode::default(),
            delta_value: 0.0,
            status: EventStatus::default(),
            created_at: Utc::now(),
        }
    }
}

impl Event {
    /// Repair a stored event in place: clamp the turn, restore a display
    /// name, and neutralize a non-finite delta.
    pub fn normalize(&mut self) {
        self.turn = self.turn.max(1);
        if self.name.trim().is_empty() {
            self.name = "Evento".to_string();
        }
        if !self.delta_value.is_finite() {
            self.delta_value = 0.0;
        }
    }
}
