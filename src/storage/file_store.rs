//! JSON file store: a `teams.json` snapshot and a `routes.jsonl` append log

use super::{RouteLogEntry, StoreResult, TeamStore};
use crate::directory::TeamRegistration;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const TEAMS_FILE: &str = "teams.json";
const ROUTES_FILE: &str = "routes.jsonl";

/// File-backed store under one data directory
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    // Serializes read-modify-write cycles on teams.json and appends on routes.jsonl
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create the data directory if needed
    pub async fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;
        debug!(data_dir = %data_dir.display(), "Opened JSON file store");
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn teams_path(&self) -> PathBuf {
        self.data_dir.join(TEAMS_FILE)
    }

    pub fn routes_path(&self) -> PathBuf {
        self.data_dir.join(ROUTES_FILE)
    }

    async fn read_teams(&self) -> StoreResult<BTreeMap<String, TeamRegistration>> {
        match fs::read(self.teams_path()).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the snapshot through a temp file and rename
    async fn write_teams(&self, teams: &BTreeMap<String, TeamRegistration>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(teams)?;
        let tmp_path = self.data_dir.join(format!("{TEAMS_FILE}.tmp"));
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, self.teams_path()).await?;
        Ok(())
    }

    /// Every logged routing decision, oldest first
    pub async fn read_route_log(&self) -> StoreResult<Vec<RouteLogEntry>> {
        let content = match fs::read_to_string(self.routes_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl TeamStore for JsonFileStore {
    async fn save_team(&self, registration: &TeamRegistration) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut teams = self.read_teams().await?;
        teams.insert(registration.team_id.clone(), registration.clone());
        self.write_teams(&teams).await
    }

    async fn delete_team(&self, team_id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut teams = self.read_teams().await?;
        if teams.remove(team_id).is_some() {
            self.write_teams(&teams).await?;
        }
        Ok(())
    }

    async fn log_route(&self, entry: &RouteLogEntry) -> StoreResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.routes_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_teams(&self) -> StoreResult<Vec<TeamRegistration>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.read_teams().await?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert!(store.load_teams().await.unwrap().is_empty());
        assert!(store.read_route_log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_by_id() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        store
            .save_team(&TeamRegistration::new("a", "First", "http://a:1", "x"))
            .await
            .unwrap();
        store
            .save_team(&TeamRegistration::new("a", "Second", "http://a:2", "x"))
            .await
            .unwrap();

        let teams = store.load_teams().await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].team_name, "Second");
    }

    #[tokio::test]
    async fn test_delete_missing_team_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.delete_team("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        std::fs::write(store.teams_path(), "{not json").unwrap();
        assert!(store.load_teams().await.is_err());
    }
}
