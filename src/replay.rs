//! Replay of a recorded lifecycle event stream.
//!
//! Hosts that cannot embed the watcher write their lifecycle callbacks as
//! JSON lines and pipe them to `bwatch record`. One object per line:
//!
//! ```json
//! {"kind":"session-started","session":{"projects":[{"group_id":"g","artifact_id":"a","version":"1"}],"goals":["verify"],"start_time":"2024-06-15T09:30:00Z"}}
//! {"kind":"plugin-started","project":{"group_id":"g","artifact_id":"a","version":"1"},"plugin":{"plugin":{"group_id":"org.apache.maven.plugins","artifact_id":"maven-compiler-plugin","version":"3.13.0"},"goal":"compile","execution_id":"default-compile"}}
//! {"kind":"session-ended","session":{...,"results":[...]}}
//! ```
//!
//! A line carrying `session` replaces the session snapshot seen by that
//! event and every later one. Blank lines are skipped.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::BufRead;
use std::sync::Arc;

use crate::events::{EventKind, ExecutionEvent, PluginInvocation, Session};
use crate::models::Artifact;
use crate::spy::BuildEventSpy;

#[derive(Debug, Deserialize)]
struct EventLine {
    kind: EventKind,
    #[serde(default)]
    project: Option<Artifact>,
    #[serde(default)]
    plugin: Option<PluginInvocation>,
    #[serde(default)]
    session: Option<Session>,
}

/// Summary of one replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub build_id: Option<i64>,
    pub saved: bool,
}

/// Parse a JSON-lines stream into events.
pub fn parse_events(reader: impl BufRead) -> Result<Vec<ExecutionEvent>> {
    let mut session: Option<Arc<Session>> = None;
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed: EventLine = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", line_no))?;

        if let Some(snapshot) = parsed.session {
            session = Some(Arc::new(snapshot));
        }
        let Some(current) = session.clone() else {
            bail!("line {}: event before any session snapshot", line_no);
        };

        events.push(ExecutionEvent {
            kind: parsed.kind,
            project: parsed.project,
            plugin: parsed.plugin,
            session: current,
        });
    }

    Ok(events)
}

/// Feed every event to the spy, in order.
pub async fn replay(spy: &mut BuildEventSpy, events: &[ExecutionEvent]) -> Result<ReplaySummary> {
    for event in events {
        spy.on_event(event).await?;
    }

    Ok(ReplaySummary {
        events: events.len(),
        build_id: spy.current_build().map(|build| build.id()),
        saved: spy.is_saved(),
    })
}
