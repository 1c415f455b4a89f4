use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use chrono::{DateTime, SecondsFormat, Utc};
use crate::progression::FinishedSummary;

/// Append-only logs of team actions and finished results.
///
/// Either log may be absent (for tests or embedded use), in which case only the
/// tracing event is emitted. Write failures are logged and never fail the caller.
#[derive(Clone, Default)]
pub struct Journal {
    actions: Option<Arc<Mutex<File>>>,
    results: Option<Arc<Mutex<File>>>,
}

fn open_append(path: &Path) -> io::Result<Arc<Mutex<File>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(Mutex::new(file)))
}

fn timestamp(now_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(now_ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn append(sink: &Option<Arc<Mutex<File>>>, line: &str) {
    let Some(sink) = sink else { return };
    let result = match sink.lock() {
        Ok(mut file) => writeln!(file, "{}", line).and_then(|_| file.flush()),
        Err(_) => Err(io::Error::other("journal lock poisoned")),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to append to journal");
    }
}

impl Journal {
    /// A journal that only emits tracing events.
    pub fn disabled() -> Self {
        Journal::default()
    }

    pub fn open(actions_path: impl AsRef<Path>, results_path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Journal {
            actions: Some(open_append(actions_path.as_ref())?),
            results: Some(open_append(results_path.as_ref())?),
        })
    }

    /// Record something a team did, e.g. "completed quest 2".
    pub fn record_action(&self, team: &str, action: &str, now_ms: u64) {
        tracing::info!(team, action, "Team action");
        append(&self.actions, &format!("{}\t{}\t{}", timestamp(now_ms), team, action));
    }

    pub fn record_result(&self, summary: &FinishedSummary, now_ms: u64) {
        tracing::info!(
            team = %summary.team,
            hint_count = summary.hint_count,
            skip_count = summary.skip_count,
            quests_completed = summary.quests_completed,
            total_quests = summary.total_quests,
            "Team finished"
        );
        append(
            &self.results,
            &format!(
                "{}\t{}\thints={}\tskips={}\tcompleted={}\ttotal={}",
                timestamp(now_ms),
                summary.team,
                summary.hint_count,
                summary.skip_count,
                summary.quests_completed,
                summary.total_quests
            ),
        );
    }
}
