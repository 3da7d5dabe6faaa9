//! Sync progress reporting.
//!
//! Reports observable progress during `blogsync sync` so users see which
//! phase is running and how many posts are left. Progress is emitted on
//! **stderr** so stdout (the run summary) remains parseable for scripts.
//!
//! | Mode    | Output                                               |
//! |---------|------------------------------------------------------|
//! | `human` | `sync feishu  applying  3 / 10 posts`                |
//! | `json`  | `{"event":"progress","phase":"applying","n":3,...}`  |
//! | `off`   | nothing                                              |

use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// The external exporter is running. Duration unknown.
    Exporting,
    /// Loading existing posts and staged documents.
    Reconciling { post_type: String },
    /// Delete phase: n posts removed out of total.
    Deleting {
        post_type: String,
        n: u64,
        total: u64,
    },
    /// Upsert phase: n staged documents processed out of total.
    Applying {
        post_type: String,
        n: u64,
        total: u64,
    },
}

impl SyncProgressEvent {
    fn phase(&self) -> &'static str {
        match self {
            SyncProgressEvent::Exporting => "exporting",
            SyncProgressEvent::Reconciling { .. } => "reconciling",
            SyncProgressEvent::Deleting { .. } => "deleting",
            SyncProgressEvent::Applying { .. } => "applying",
        }
    }
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the sync pipeline.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = human_line(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn human_line(event: &SyncProgressEvent) -> String {
    match event {
        SyncProgressEvent::Exporting => "sync  exporting...\n".to_string(),
        SyncProgressEvent::Reconciling { post_type } => {
            format!("sync {}  reconciling...\n", post_type)
        }
        SyncProgressEvent::Deleting {
            post_type,
            n,
            total,
        }
        | SyncProgressEvent::Applying {
            post_type,
            n,
            total,
        } => format!(
            "sync {}  {}  {} / {} posts\n",
            post_type,
            event.phase(),
            format_number(*n),
            format_number(*total)
        ),
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn json_event(event: &SyncProgressEvent) -> serde_json::Value {
    match event {
        SyncProgressEvent::Exporting => serde_json::json!({
            "event": "progress",
            "phase": event.phase()
        }),
        SyncProgressEvent::Reconciling { post_type } => serde_json::json!({
            "event": "progress",
            "type": post_type,
            "phase": event.phase()
        }),
        SyncProgressEvent::Deleting {
            post_type,
            n,
            total,
        }
        | SyncProgressEvent::Applying {
            post_type,
            n,
            total,
        } => serde_json::json!({
            "event": "progress",
            "type": post_type,
            "phase": event.phase(),
            "n": n,
            "total": total
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
