#![deny(warnings)]

//! Turn-resolution economics for the marketing-mix simulation.
//!
//! Given the teams and configuration from `sim-core`, this crate applies the
//! turn's active events to the market coefficients, scores every product's
//! demand, revenue and margin, derives team-level CAC and market share, and
//! writes history entries and arbiter reports back onto the teams.
//!
//! The RNG is injected by the caller; with a seeded generator (or a market
//! profile with zero demand noise) resolution is fully reproducible.

pub mod factors;
pub mod report;
pub mod resolve;

pub use factors::{build_factors, FactorBundle};
pub use report::build_arbiter_report;
pub use resolve::{channel_reach, market_share, process_turn, EngineError, TurnSummary};
