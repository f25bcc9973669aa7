//! Replay command: feeds a JSON-lines event log through the recorder.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use super::CommandContext;
use runscribe::callback::{RunCallback, RunEvent, SharedRecorder};
use runscribe::recorder::RecorderState;

/// Arguments for the replay command
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    /// Event log, one JSON event per line
    pub events: PathBuf,

    /// Run folder name under the report root (default: start timestamp)
    #[arg(long)]
    pub run_folder: Option<String>,

    /// Skip lines that do not parse instead of aborting
    #[arg(long)]
    pub skip_invalid: bool,
}

impl ReplayArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let content = tokio::fs::read_to_string(&self.events)
            .await
            .with_context(|| format!("Failed to read event log {}", self.events.display()))?;
        let events = parse_events(&content, &self.events, self.skip_invalid)?;
        info!("Replaying {} events from {}", events.len(), self.events.display());

        let recorder = SharedRecorder::new(ctx.config.recorder.clone());
        replay(&recorder, &events, self.run_folder.as_deref()).await;

        let (run_dir, failures) = recorder.with(|r| {
            if r.state() == RecorderState::RunActive {
                warn!("Event log ended without run_end, closing the run");
                r.on_run_end();
            }
            (r.run_dir().map(Path::to_path_buf), r.render_failures())
        });

        if let Some(dir) = run_dir {
            println!("{}", dir.display());
        }
        if failures > 0 {
            warn!("{} artifacts failed to render", failures);
            return Ok(1);
        }
        Ok(0)
    }
}

/// Parses an event log. Blank lines and `#` comments are ignored.
pub fn parse_events(content: &str, source: &Path, skip_invalid: bool) -> Result<Vec<RunEvent>> {
    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<RunEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) if skip_invalid => {
                warn!("{}:{}: skipping invalid event: {}", source.display(), index + 1, e);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("{}:{}: invalid event", source.display(), index + 1)
                });
            }
        }
    }
    Ok(events)
}

/// Feeds events to the recorder. With an explicit run folder the run is
/// started there, and a leading `run_start` is absorbed.
pub async fn replay(recorder: &SharedRecorder, events: &[RunEvent], run_folder: Option<&str>) {
    let mut events = events.iter().peekable();
    if let Some(folder) = run_folder {
        recorder.with(|r| r.on_run_start_in(folder));
        if matches!(events.peek(), Some(RunEvent::RunStart)) {
            events.next();
        }
    }
    for event in events {
        recorder.on_event(event).await;
    }
}
