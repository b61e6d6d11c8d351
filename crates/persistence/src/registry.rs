//! Registry: every state-changing command of the simulation, from team
//! registration to turn resolution, built on the snapshot store.
//!
//! Commands load a full snapshot, validate, mutate a copy and write it back.
//! A command that returns an error has written nothing.

use crate::store::{DataStore, SnapshotStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use sim_core::{
    next_team_id, normalize_members, simple_hash, turn_key, Event, MarketId, SubmittedDecisions,
    Team, TeamId, ValidationIssue,
};
use sim_econ::{process_turn, EngineError, TurnSummary};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Failures of registry commands other than decision submission.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registration is closed")]
    RegistrationClosed,
    #[error("market {0} is full")]
    MarketFull(MarketId),
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("wrong password for team {0}")]
    BadPassword(TeamId),
    #[error("password must be at least 4 characters")]
    WeakPassword,
    #[error("event {0} not found")]
    EventNotFound(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Failures of decision submission, kept separate so callers can render the
/// full validation issue list.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("submission rejected with {} issue(s)", .0.len())]
    Invalid(Vec<ValidationIssue>),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Parameters for registering a new team.
#[derive(Clone, Debug)]
pub struct NewTeam {
    pub name: String,
    pub password: String,
    pub market: MarketId,
    pub members: Vec<String>,
}

/// The command surface over one dataset.
pub struct Registry<S> {
    data: DataStore<S>,
    event_seq: u32,
}

impl<S: SnapshotStore> Registry<S> {
    pub fn new(data: DataStore<S>) -> Self {
        Self { data, event_seq: 0 }
    }

    pub fn data(&self) -> &DataStore<S> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataStore<S> {
        &mut self.data
    }

    /// Teams per market, for capacity and standings displays.
    pub fn market_occupancy(&self) -> BTreeMap<MarketId, usize> {
        let mut occupancy: BTreeMap<MarketId, usize> =
            MarketId::ALL.iter().map(|&m| (m, 0)).collect();
        for team in self.data.get_teams() {
            *occupancy.entry(team.market).or_default() += 1;
        }
        occupancy
    }

    /// Register a new team in a market, with template products.
    pub fn create_team(&mut self, new: &NewTeam) -> Result<Team, RegistryError> {
        let config = self.data.get_config();
        if !config.registration_open {
            return Err(RegistryError::RegistrationClosed);
        }
        let teams = self.data.get_teams();
        let occupied = teams.iter().filter(|t| t.market == new.market).count();
        if occupied >= config.max_teams_per_market as usize {
            return Err(RegistryError::MarketFull(new.market));
        }
        if new.password.chars().count() < 4 {
            return Err(RegistryError::WeakPassword);
        }

        let id = next_team_id(&teams);
        let profile = config.profile(new.market);
        let mut team = Team::new(id, &new.name, &new.password, new.market, &profile);
        team.members = normalize_members(&new.members);
        info!(team = %team.id, market = %new.market, "team registered");
        self.data.upsert_team(team.clone())?;
        Ok(team)
    }

    pub fn delete_team(&mut self, id: &TeamId) -> Result<(), RegistryError> {
        let mut teams = self.data.get_teams();
        let before = teams.len();
        teams.retain(|t| &t.id != id);
        if teams.len() == before {
            return Err(RegistryError::TeamNotFound(id.clone()));
        }
        self.data.save_teams(&teams)?;
        if self.data.get_current_team().as_ref() == Some(id) {
            self.data.set_current_team(None)?;
        }
        Ok(())
    }

    /// Check a password and mark the team as the session's current team.
    pub fn login_team(&mut self, id: &TeamId, password: &str) -> Result<Team, RegistryError> {
        let teams = self.data.get_teams();
        let team = teams
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| RegistryError::TeamNotFound(id.clone()))?;
        if team.password_hash != simple_hash(password) {
            return Err(RegistryError::BadPassword(id.clone()));
        }
        self.data.set_current_team(Some(id))?;
        Ok(team.clone())
    }

    pub fn reset_password(&mut self, id: &TeamId, password: &str) -> Result<(), RegistryError> {
        if password.chars().count() < 4 {
            return Err(RegistryError::WeakPassword);
        }
        let mut team = self.require_team(id)?;
        team.password_hash = simple_hash(password);
        self.data.upsert_team(team)?;
        Ok(())
    }

    pub fn set_members(&mut self, id: &TeamId, members: &[String]) -> Result<Team, RegistryError> {
        let mut team = self.require_team(id)?;
        team.members = normalize_members(members);
        self.data.upsert_team(team.clone())?;
        Ok(team)
    }

    pub fn add_member(&mut self, id: &TeamId, member: &str) -> Result<Team, RegistryError> {
        let team = self.require_team(id)?;
        let mut members = team.members.clone();
        members.push(member.to_string());
        self.set_members(id, &members)
    }

    fn require_team(&self, id: &TeamId) -> Result<Team, RegistryError> {
        self.data
            .get_teams()
            .into_iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| RegistryError::TeamNotFound(id.clone()))
    }

    pub fn set_registration_open(&mut self, open: bool) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        config.registration_open = open;
        self.data.save_config(&config)?;
        Ok(())
    }

    pub fn submission_deadline(&self) -> Option<DateTime<Utc>> {
        self.data.get_config().submission_deadline
    }

    pub fn set_submission_deadline(
        &mut self,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        config.submission_deadline = deadline;
        self.data.save_config(&config)?;
        Ok(())
    }

    /// Validate and record a team's decisions for the current turn.
    ///
    /// Rejected submissions change nothing. Accepted ones are normalized over
    /// the team's stored products and flagged as submitted for the turn.
    pub fn submit_decisions(&mut self, submission: &SubmittedDecisions) -> Result<Team, SubmitError> {
        let config = self.data.get_config();
        let id = TeamId(submission.team_id.clone());
        let mut team = self
            .data
            .get_teams()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| SubmitError::TeamNotFound(id.clone()))?;

        let profile = config.decision_profile(team.market);
        submission
            .validate(&profile)
            .map_err(SubmitError::Invalid)?;

        let market_profile = config.profile(team.market);
        team.products.a =
            sim_core::normalize_product(&submission.a, &market_profile, &team.products.a);
        team.products.b =
            sim_core::normalize_product(&submission.b, &market_profile, &team.products.b);
        team.segmento = sim_core::classify_team(&team, &market_profile);
        team.submitted
            .insert(turn_key(config.current_turn), true);
        info!(team = %team.id, turn = config.current_turn, "decisions submitted");
        self.data.upsert_team(team.clone())?;
        Ok(team)
    }

    /// Schedule a professor event. Ids are time-based with a per-session
    /// sequence suffix to stay unique within a burst.
    pub fn add_event(&mut self, mut event: Event) -> Result<Event, RegistryError> {
        event.normalize();
        if event.id.is_empty() {
            self.event_seq += 1;
            event.id = format!("EV-{}-{:03}", Utc::now().timestamp_millis(), self.event_seq);
        }
        let mut config = self.data.get_config();
        config.events.push(event.clone());
        self.data.save_config(&config)?;
        Ok(event)
    }

    pub fn update_event(&mut self, event: Event) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        let slot = config
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| RegistryError::EventNotFound(event.id.clone()))?;
        *slot = event;
        slot.normalize();
        self.data.save_config(&config)?;
        Ok(())
    }

    pub fn delete_event(&mut self, id: &str) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        let before = config.events.len();
        config.events.retain(|e| e.id != id);
        if config.events.len() == before {
            return Err(RegistryError::EventNotFound(id.to_string()));
        }
        self.data.save_config(&config)?;
        Ok(())
    }

    pub fn clear_events(&mut self) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        config.events.clear();
        self.data.save_config(&config)?;
        Ok(())
    }

    /// Resolve the current turn for every registered team.
    pub fn run_turn<R: Rng>(&mut self, rng: &mut R) -> Result<TurnSummary, RegistryError> {
        let mut config = self.data.get_config();
        let mut teams = self.data.get_teams();
        let summary = process_turn(&mut teams, &mut config, rng)?;
        self.data.save_teams(&teams)?;
        self.data.save_config(&config)?;
        info!(
            turn = summary.turn_processed,
            teams = summary.processed_teams,
            "turn resolved"
        );
        Ok(summary)
    }

    /// Rewind to turn one keeping teams: wipe history, metrics and reports
    /// and put every team back on its market's template products.
    pub fn reset_round(&mut self) -> Result<(), RegistryError> {
        let mut config = self.data.get_config();
        config.current_turn = 1;
        config.current_turn_label = sim_core::turn_label(1);
        for event in &mut config.events {
            event.status = sim_core::EventStatus::Pending;
        }
        let mut teams = self.data.get_teams();
        for team in &mut teams {
            let profile = config.profile(team.market);
            team.products.a = sim_core::Product::template_a(&profile);
            team.products.b = sim_core::Product::template_b(&profile);
            team.segmento = sim_core::classify_team(team, &profile);
            team.history.clear();
            team.current_metrics = Default::default();
            team.submitted.clear();
            team.arbiter_reports.clear();
        }
        self.data.save_teams(&teams)?;
        self.data.save_config(&config)?;
        Ok(())
    }

    /// Wipe the whole dataset back to an empty state.
    pub fn full_reset(&mut self) -> Result<(), RegistryError> {
        self.data.clear_dataset()?;
        Ok(())
    }
}
