#![deny(warnings)]

//! Core domain model of the marketing-mix simulation.
//!
//! This crate holds everything that is true about the game regardless of how
//! a turn is resolved or where state is stored: markets and their economic
//! profiles, teams and their products, professor events, the segment
//! classifier, the decision normalizer and the submission validation gate.
//!
//! Two repair philosophies coexist and must not be confused:
//!
//! * **Repair on read**: stored state (configs, teams) is normalized into
//!   legal ranges every time it is loaded, so a hand-edited or legacy record
//!   never crashes the engine.
//! * **Reject on write**: a team's submitted decisions are validated strictly
//!   and refused with a full issue list when anything is off.

pub mod config;
pub mod event;
pub mod num;
pub mod segment;
pub mod team;
pub mod validate;

pub use config::{
    turn_key, turn_label, DecisionLimits, DecisionProfile, Limit, MainMarket, MarketId,
    MarketProfile, Sensitivity, SimConfig, SteppedLimit, TargetPrices, UnknownName,
};
pub use event::{Coefficient, DeltaMode, Event, EventScope, EventStatus};
pub use segment::{classify_attributes, classify_team, segment_score, Segment};
pub use team::{
    next_team_id, normalize_members, normalize_product, simple_hash, ArbiterReport,
    CurrentMetrics, DeltaDir, HistoryEntry, IncomingEvent, MarketSensitivity, MetricDelta,
    Product, ProductMetrics, ProductMetricsPair, ProductPair, RawDecision, ReportMetrics, Team,
    TeamId,
};
pub use validate::{BudgetSummary, ProductSlot, SubmittedDecisions, ValidationIssue};
