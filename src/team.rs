use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::error::HuntError;

/// Login credentials for one team, as configured at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCredentials {
    pub name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
struct Team {
    credentials: TeamCredentials,
    session_started_ms: Option<u64>,
    session_active: bool,
    finished: bool,
    result_recorded: bool,
}

impl Team {
    fn snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            name: self.credentials.name.clone(),
            username: self.credentials.username.clone(),
            session_started_ms: self.session_started_ms,
            session_active: self.session_active,
            finished: self.finished,
        }
    }
}

/// A copy of a team's state taken under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub name: String,
    pub username: String,
    pub session_started_ms: Option<u64>,
    pub session_active: bool,
    pub finished: bool,
}

impl TeamSnapshot {
    /// Time since the first login, zero before it.
    pub fn elapsed(&self, now_ms: u64) -> Duration {
        self.session_started_ms
            .map(|start| Duration::from_millis(now_ms.saturating_sub(start)))
            .unwrap_or_default()
    }
}

/// In-memory roster of teams and their stopwatches.
///
/// Every read-modify-write happens under a single mutex, which the game-end
/// sweeper shares, so a login starting a stopwatch can never interleave with
/// a sweep reading it.
#[derive(Clone, Debug)]
pub struct TeamRegistry {
    teams: Arc<Mutex<HashMap<String, Team>>>,
}

impl TeamRegistry {
    /// Team names are unique keys; a later entry with the same name replaces an earlier one.
    pub fn new(roster: impl IntoIterator<Item = TeamCredentials>) -> Self {
        let teams = roster
            .into_iter()
            .map(|credentials| {
                (credentials.name.clone(), Team {
                    credentials,
                    session_started_ms: None,
                    session_active: false,
                    finished: false,
                    result_recorded: false,
                })
            })
            .collect();
        TeamRegistry { teams: Arc::new(Mutex::new(teams)) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Team>>, HuntError> {
        self.teams.lock().map_err(|_| HuntError::LockError)
    }

    pub fn team_names(&self) -> Result<Vec<String>, HuntError> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Exact match of username and password against the configured credentials.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<TeamSnapshot, HuntError> {
        let teams = self.lock()?;
        find_by_credentials(&teams, username, password)
            .map(Team::snapshot)
            .ok_or(HuntError::InvalidCredentials)
    }

    /// Starts the team's stopwatch on its first login. Later calls are no-ops.
    pub fn start_session_if_needed(&self, team: &str, now_ms: u64) -> Result<TeamSnapshot, HuntError> {
        let mut teams = self.lock()?;
        let entry = teams.get_mut(team).ok_or_else(|| HuntError::UnknownTeam(team.to_string()))?;
        start_session(entry, now_ms);
        Ok(entry.snapshot())
    }

    /// Authenticate and start the stopwatch inside one critical section.
    pub fn login(&self, username: &str, password: &str, now_ms: u64) -> Result<TeamSnapshot, HuntError> {
        let mut teams = self.lock()?;
        let name = find_by_credentials(&teams, username, password)
            .map(|t| t.credentials.name.clone())
            .ok_or(HuntError::InvalidCredentials)?;
        let entry = teams.get_mut(&name).ok_or(HuntError::UnknownTeam(name))?;
        start_session(entry, now_ms);
        Ok(entry.snapshot())
    }

    pub fn snapshot(&self, team: &str) -> Result<TeamSnapshot, HuntError> {
        self.lock()?
            .get(team)
            .map(Team::snapshot)
            .ok_or_else(|| HuntError::UnknownTeam(team.to_string()))
    }

    /// Sets the finished flag. Returns true only for the call that flipped it.
    pub fn mark_finished(&self, team: &str) -> Result<bool, HuntError> {
        let mut teams = self.lock()?;
        let entry = teams.get_mut(team).ok_or_else(|| HuntError::UnknownTeam(team.to_string()))?;
        let newly = !entry.finished;
        entry.finished = true;
        Ok(newly)
    }

    /// Marks finished every active team whose elapsed session time has reached
    /// `game_duration`. Returns the names of the teams finished by this sweep.
    pub fn sweep_expired(&self, now_ms: u64, game_duration: Duration) -> Result<Vec<String>, HuntError> {
        let mut teams = self.lock()?;
        let mut ended = Vec::new();
        for team in teams.values_mut() {
            if !team.session_active || team.finished {
                continue;
            }
            if team.snapshot().elapsed(now_ms) >= game_duration {
                team.finished = true;
                ended.push(team.credentials.name.clone());
            }
        }
        ended.sort();
        Ok(ended)
    }

    /// Returns true the first time it is called for a team, false afterwards.
    pub fn claim_result_record(&self, team: &str) -> Result<bool, HuntError> {
        let mut teams = self.lock()?;
        let entry = teams.get_mut(team).ok_or_else(|| HuntError::UnknownTeam(team.to_string()))?;
        let first = !entry.result_recorded;
        entry.result_recorded = true;
        Ok(first)
    }
}

fn find_by_credentials<'a>(teams: &'a HashMap<String, Team>, username: &str, password: &str) -> Option<&'a Team> {
    teams
        .values()
        .find(|t| t.credentials.username == username && t.credentials.password == password)
}

fn start_session(team: &mut Team, now_ms: u64) {
    if !team.session_active {
        team.session_started_ms = Some(now_ms);
        team.session_active = true;
        tracing::info!(team = %team.credentials.name, "Team stopwatch started");
    }
}
