//! Snapshot storage: a small string key/value abstraction with in-memory and
//! on-disk backends, plus the typed facade the registry works through.
//!
//! Writes follow a copy-modify-replace discipline: callers deserialize a full
//! snapshot, mutate the copy, and write the whole value back. There is no
//! partial update, so a torn write can at worst lose the latest turn, never
//! corrupt structure.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use sim_core::{SimConfig, Team, TeamId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

const KEY_PREFIX: &str = "mktmix_v1";
const MODE_KEY: &str = "mktmix_v1_dataset_mode";

/// Which dataset a session operates on. Demo state is fully isolated from the
/// real course state and can be reset freely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DatasetMode {
    #[default]
    Real,
    Demo,
}

impl DatasetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetMode::Real => "real",
            DatasetMode::Demo => "demo",
        }
    }
}

impl FromStr for DatasetMode {
    type Err = sim_core::UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(DatasetMode::Real),
            "demo" => Ok(DatasetMode::Demo),
            other => Err(sim_core::UnknownName {
                kind: "dataset mode",
                value: other.to_string(),
            }),
        }
    }
}

fn dataset_key(base: &str, mode: DatasetMode) -> String {
    format!("{KEY_PREFIX}_{base}_{}", mode.as_str())
}

/// Whole-value string storage. Implementations only need get/put/delete;
/// everything typed lives in [`DataStore`].
pub trait SnapshotStore {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Volatile store for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<FileStore> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating data directory {}", root.display()))?;
        Ok(FileStore { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value).with_context(|| format!("writing {}", path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// Typed snapshot access over any [`SnapshotStore`], scoped to a dataset.
///
/// Reads are repair-on-read: a missing or unparseable snapshot degrades to
/// defaults with a warning instead of failing the whole session.
pub struct DataStore<S> {
    store: S,
    mode: DatasetMode,
}

impl<S: SnapshotStore> DataStore<S> {
    pub fn new(store: S, mode: DatasetMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    fn read_json<T: DeserializeOwned>(&self, base: &str) -> Option<T> {
        let key = dataset_key(base, self.mode);
        let raw = self.store.read(&key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding unparseable snapshot");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&mut self, base: &str, value: &T) -> Result<()> {
        let key = dataset_key(base, self.mode);
        let raw = serde_json::to_string(value).context("serializing snapshot")?;
        self.store.write(&key, &raw)
    }

    /// The simulation config, normalized; defaults when absent or corrupt.
    pub fn get_config(&self) -> SimConfig {
        self.read_json::<SimConfig>("ag_sim_config")
            .unwrap_or_default()
            .normalized()
    }

    pub fn save_config(&mut self, config: &SimConfig) -> Result<()> {
        self.write_json("ag_sim_config", config)
    }

    /// All registered teams, each normalized against its market profile.
    pub fn get_teams(&self) -> Vec<Team> {
        let config = self.get_config();
        let mut teams: Vec<Team> = self.read_json("ag_teams").unwrap_or_default();
        for team in &mut teams {
            let profile = config.profile(team.market);
            team.normalize(&profile);
        }
        teams
    }

    pub fn save_teams(&mut self, teams: &[Team]) -> Result<()> {
        self.write_json("ag_teams", &teams.to_vec())
    }

    /// Replace or append one team record.
    pub fn upsert_team(&mut self, team: Team) -> Result<()> {
        let mut teams = self.get_teams();
        match teams.iter_mut().find(|t| t.id == team.id) {
            Some(slot) => *slot = team,
            None => teams.push(team),
        }
        self.save_teams(&teams)
    }

    /// Id of the team the current session is logged in as, if any.
    pub fn get_current_team(&self) -> Option<TeamId> {
        let key = dataset_key("ag_current_team", self.mode);
        self.store.read(&key).map(TeamId)
    }

    pub fn set_current_team(&mut self, id: Option<&TeamId>) -> Result<()> {
        let key = dataset_key("ag_current_team", self.mode);
        match id {
            Some(id) => self.store.write(&key, id.as_str()),
            None => self.store.remove(&key),
        }
    }

    /// Drop every snapshot of the active dataset.
    pub fn clear_dataset(&mut self) -> Result<()> {
        for base in ["ag_teams", "ag_sim_config", "ag_current_team"] {
            self.store.remove(&dataset_key(base, self.mode))?;
        }
        Ok(())
    }
}

/// Read the persisted dataset mode selector, defaulting to real.
pub fn stored_mode(store: &impl SnapshotStore) -> DatasetMode {
    store
        .read(MODE_KEY)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Persist the dataset mode selector.
pub fn store_mode(store: &mut impl SnapshotStore, mode: DatasetMode) -> Result<()> {
    store.write(MODE_KEY, mode.as_str())
}
