use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::answer::DEFAULT_SKIP_ANSWER;
use crate::team::TeamCredentials;
use crate::upload::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error: {var} must be a valid {expected}, got {value:?}.")]
    Invalid { var: String, expected: &'static str, value: String },
    #[error("Error: Missing credentials for team {team}: set {var}.")]
    MissingCredential { team: String, var: String },
    #[error("Error: Team {0} is listed more than once.")]
    DuplicateTeam(String),
    #[error("Error: Teams {first} and {second} share the same username and password.")]
    DuplicateCredentials { first: String, second: String },
    #[error("Error: No teams configured.")]
    NoTeams,
}

/// Server configuration loaded from environment variables.
///
/// | Env Var                    | Default              |
/// |----------------------------|----------------------|
/// | `HOST`                     | `0.0.0.0`            |
/// | `PORT`                     | `8080`               |
/// | `HUNT_DATABASE`            | `treasure_hunt.db`   |
/// | `HUNT_SEED_FILE`           | built-in roster      |
/// | `HUNT_UPLOAD_DIR`          | `uploads`            |
/// | `HUNT_MAX_UPLOAD_BYTES`    | `10485760`           |
/// | `HUNT_ACTION_LOG`          | `hunt_actions.log`   |
/// | `HUNT_RESULTS_LOG`         | `game_results.log`   |
/// | `HUNT_GAME_DURATION_SECS`  | `7200`               |
/// | `HUNT_SWEEP_INTERVAL_SECS` | `5`                  |
/// | `HUNT_SKIP_ANSWER`         | `skip` (empty disables) |
/// | `HUNT_SESSION_IDLE_MINS`   | `240`                |
/// | `HUNT_TEAMS`               | `TEAM1,TEAM2,TEAM3`  |
/// | `<TEAM>USER`, `<TEAM>PASS` | required per team    |
#[derive(Debug, Clone)]
pub struct HuntConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub seed_file: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub action_log: PathBuf,
    pub results_log: PathBuf,
    pub game_duration: Duration,
    pub sweep_interval: Duration,
    pub skip_answer: Option<String>,
    pub session_idle: Duration,
    pub teams: Vec<TeamCredentials>,
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            expected,
            value,
        }),
    }
}

fn minutes(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: u64) -> Result<Duration, ConfigError> {
    let mins = parse(lookup, var, default, "number of minutes")?;
    mins.checked_mul(60).map(Duration::from_secs).ok_or_else(|| ConfigError::Invalid {
        var: var.to_string(),
        expected: "number of minutes",
        value: mins.to_string(),
    })
}

impl HuntConfig {
    /// Load `.env` (if present) and then read the process environment.
    #[cfg(feature = "server")]
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse(&lookup, "PORT", 8080u16, "port number")?;
        let path = |var: &str, default: &str| PathBuf::from(lookup(var).unwrap_or_else(|| default.to_string()));

        let skip_answer = match lookup("HUNT_SKIP_ANSWER") {
            None => Some(DEFAULT_SKIP_ANSWER.to_string()),
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
        };

        Ok(HuntConfig {
            host,
            port,
            database_path: path("HUNT_DATABASE", "treasure_hunt.db"),
            seed_file: lookup("HUNT_SEED_FILE").filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            upload_dir: path("HUNT_UPLOAD_DIR", "uploads"),
            max_upload_bytes: parse(&lookup, "HUNT_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES, "byte count")?,
            action_log: path("HUNT_ACTION_LOG", "hunt_actions.log"),
            results_log: path("HUNT_RESULTS_LOG", "game_results.log"),
            game_duration: Duration::from_secs(parse(&lookup, "HUNT_GAME_DURATION_SECS", 7200u64, "number of seconds")?),
            sweep_interval: Duration::from_secs(parse(&lookup, "HUNT_SWEEP_INTERVAL_SECS", 5u64, "number of seconds")?.max(1)),
            skip_answer,
            session_idle: minutes(&lookup, "HUNT_SESSION_IDLE_MINS", 240)?,
            teams: load_teams(&lookup)?,
        })
    }
}

/// `HUNT_TEAMS` names the teams; each needs `<TEAM>USER` and `<TEAM>PASS`.
/// A login pair must identify exactly one team.
fn load_teams(lookup: &impl Fn(&str) -> Option<String>) -> Result<Vec<TeamCredentials>, ConfigError> {
    let names = lookup("HUNT_TEAMS").unwrap_or_else(|| "TEAM1,TEAM2,TEAM3".into());
    let mut seen = HashSet::new();
    let mut logins: HashMap<(String, String), String> = HashMap::new();
    let mut teams = Vec::new();

    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::DuplicateTeam(name.to_string()));
        }
        let credential = |suffix: &str| {
            let var = format!("{}{}", name, suffix);
            lookup(&var).ok_or(ConfigError::MissingCredential { team: name.to_string(), var })
        };
        let username = credential("USER")?;
        let password = credential("PASS")?;
        if let Some(first) = logins.insert((username.clone(), password.clone()), name.to_string()) {
            return Err(ConfigError::DuplicateCredentials { first, second: name.to_string() });
        }
        teams.push(TeamCredentials { name: name.to_string(), username, password });
    }

    if teams.is_empty() {
        return Err(ConfigError::NoTeams);
    }
    Ok(teams)
}
