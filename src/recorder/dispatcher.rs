//! The recorder: turns lifecycle events into store mutations and re-renders.
//!
//! Every event that changes the store is followed by a render of each view
//! whose data it touched, so the tree on disk is never more than one event
//! behind. Render and write failures are logged and counted, never returned:
//! the run being observed must not be affected by its report.

use std::path::Path;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::names::sanitize;
use super::status::{HostStatus, OutcomeKind};
use super::store::AggregationStore;
use crate::callback::{RunEvent, TaskInfo};
use crate::config::RecorderConfig;
use crate::error::Result;
use crate::report::templates::{self, Template};
use crate::report::views::{PlayView, RunView, TaskView, TimelineView};
use crate::report::writer::{env_rel_path, ArtifactWriter};
use crate::report::{ReportRenderer, VariableBag};

/// Lifecycle state of a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    NotStarted,
    RunActive,
    RunEnded,
}

/// Records one run and keeps its report tree up to date.
#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    store: AggregationStore,
    renderer: ReportRenderer,
    writer: Option<ArtifactWriter>,
    state: RecorderState,
    render_failures: u64,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        let renderer = ReportRenderer::new(config.cache_key, config.undefined);
        let store = AggregationStore::new(config.activity_window);
        Self {
            config,
            store,
            renderer,
            writer: None,
            state: RecorderState::NotStarted,
            render_failures: 0,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn renderer(&self) -> &ReportRenderer {
        &self.renderer
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Folder of the current run, once started.
    pub fn run_dir(&self) -> Option<&Path> {
        self.writer.as_ref().map(ArtifactWriter::run_dir)
    }

    /// Number of renders or writes that failed and were skipped.
    pub fn render_failures(&self) -> u64 {
        self.render_failures
    }

    /// Dispatches one event.
    pub fn handle(&mut self, event: RunEvent) {
        debug!(event = event.kind(), "handling event");
        match event {
            RunEvent::RunStart => self.on_run_start(),
            RunEvent::PlayStart {
                name,
                key,
                serial_batch,
            } => self.on_play_start(&name, &key, serial_batch),
            RunEvent::TaskStart { task, has_rescue } => self.on_task_start(&task, has_rescue),
            RunEvent::HandlerNotify { task } => self.on_handler_notify(&task),
            RunEvent::HostResult {
                task_key,
                host,
                outcome,
                ignore_errors,
                payload,
            } => self.on_host_result(&task_key, &host, outcome, ignore_errors, payload),
            RunEvent::FileDiff {
                task_key,
                host,
                payload,
            } => self.on_file_diff(&task_key, &host, &payload),
            RunEvent::RunEnd => self.on_run_end(),
        }
    }

    /// Starts a run in a fresh timestamped folder.
    pub fn on_run_start(&mut self) {
        self.store.start_run();
        let writer =
            ArtifactWriter::with_timestamp(&self.config.log_folder, &self.config.run_folder_format);
        self.start_with_writer(writer);
    }

    /// Starts a run writing into an explicit run folder under the root.
    pub fn on_run_start_in(&mut self, run_folder: &str) {
        self.store.start_run();
        let writer = ArtifactWriter::new(&self.config.log_folder, run_folder);
        self.start_with_writer(writer);
    }

    fn start_with_writer(&mut self, writer: ArtifactWriter) {
        for (name, content) in [
            ("env.adoc", templates::ENV_ADOC),
            ("docinfo.html", templates::DOCINFO_HTML),
        ] {
            if let Err(e) = writer.write_static_once(name, content) {
                warn!("Failed to write shared asset {}: {}", name, e);
                self.render_failures += 1;
            }
        }
        info!("Recording run into {}", writer.run_dir().display());
        self.writer = Some(writer);
        self.state = RecorderState::RunActive;
        self.render_run_views();
    }

    fn ensure_started(&mut self) {
        if self.state == RecorderState::NotStarted {
            debug!("event before run start, starting implicitly");
            self.on_run_start();
        }
    }

    /// Closes the open play, if any, and opens the next one.
    pub fn on_play_start(&mut self, name: &str, key: &str, serial_batch: Option<u32>) {
        self.ensure_started();
        if let Some(previous) = self.store.close_play() {
            self.render_play_views(&previous);
        }
        let play_id = self.store.start_play(name, key, serial_batch);
        self.render_play_views(&play_id);
        self.render_run_views();
    }

    pub fn on_task_start(&mut self, task: &TaskInfo, has_rescue: bool) {
        self.register_task(task, has_rescue, false);
    }

    /// Handlers follow the task lifecycle; a handler notified twice is
    /// registered once.
    pub fn on_handler_notify(&mut self, task: &TaskInfo) {
        self.register_task(task, false, true);
    }

    fn register_task(&mut self, task: &TaskInfo, has_rescue: bool, is_handler: bool) {
        self.ensure_started();
        let Some(task_ref) = self.store.start_task(task, has_rescue, is_handler) else {
            debug!(task = %task.key, "no open play, task ignored");
            return;
        };
        self.render_task_view(&task_ref.task_id);
        self.render_play_views(&task_ref.play_id);
        self.render_run_views();
    }

    pub fn on_host_result(
        &mut self,
        task_key: &str,
        host: &str,
        outcome: OutcomeKind,
        ignore_errors: bool,
        payload: JsonValue,
    ) {
        let Some(recorded) = self
            .store
            .record_result(task_key, host, outcome, ignore_errors, payload)
        else {
            return;
        };
        self.render_task_view(&recorded.task_id);
        self.render_host_json(&recorded.play_id, &recorded.task_id, host);
        self.render_play_readme(&recorded.play_id);
        let view = RunView::build(&self.store);
        self.render_run_readme(&view);
        self.render_timeline();
    }

    /// Records a diff. Rendering waits for the host result unless the
    /// result already landed.
    pub fn on_file_diff(&mut self, task_key: &str, host: &str, payload: &JsonValue) {
        let Some(task_id) = self.store.record_diff(task_key, host, payload) else {
            return;
        };
        let landed = self
            .store
            .task(&task_id)
            .and_then(|t| t.hosts.get(host))
            .is_some_and(|r| r.status != HostStatus::Running);
        if landed {
            self.render_task_view(&task_id);
        }
    }

    /// Closes the open play and renders the run views one last time.
    pub fn on_run_end(&mut self) {
        if self.state != RecorderState::RunActive {
            debug!("run end without an active run");
            return;
        }
        if let Some(closed) = self.store.end_run() {
            self.render_play_views(&closed);
        }
        self.render_run_views();
        self.state = RecorderState::RunEnded;
        info!(
            failures = self.render_failures,
            "Run recorded ({} results)",
            self.store.run().timeline.len()
        );
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    fn render_run_views(&mut self) {
        let view = RunView::build(&self.store);
        self.render_run_readme(&view);
        self.render_run_charts(&view);
        self.render_timeline();
    }

    fn render_run_readme(&mut self, view: &RunView) {
        let bag = VariableBag::new()
            .plain("title", self.config.run_title.clone())
            .verbatim_serialize("run", view);
        self.emit(templates::RUN_README, "", "README.adoc", bag);
    }

    fn render_run_charts(&mut self, view: &RunView) {
        let bag = VariableBag::new()
            .verbatim("title", "run")
            .verbatim_serialize("charts", &view.charts);
        self.emit(templates::CHARTS, "", "charts.adoc", bag);
    }

    /// Live renders show the last `timeline_window` entries; the run end
    /// render lists every one.
    fn render_timeline(&mut self) {
        let window = match self.store.run().ended_at {
            Some(_) => None,
            None => Some(self.config.timeline_window),
        };
        let view = TimelineView::build(&self.store, window);
        let bag = VariableBag::new().verbatim_serialize("timeline", &view);
        self.emit(templates::TIMELINE, "", "timeline.adoc", bag);
    }

    fn render_play_views(&mut self, play_id: &str) {
        let Some(view) = PlayView::build(&self.store, play_id) else {
            return;
        };
        let relative = format!("plays/{play_id}");
        for (template, file_name) in [
            (templates::PLAY_README, "README.adoc"),
            (templates::PLAY_ALL, "all.adoc"),
        ] {
            let bag = VariableBag::new().verbatim_serialize("play", &view);
            self.emit(template, &relative, file_name, bag);
        }

        let charts_bag = VariableBag::new()
            .verbatim("title", view.display.clone())
            .verbatim_serialize("charts", &view.charts);
        self.emit(templates::CHARTS, &relative, "charts.adoc", charts_bag);
    }

    fn render_play_readme(&mut self, play_id: &str) {
        let Some(view) = PlayView::build(&self.store, play_id) else {
            return;
        };
        let bag = VariableBag::new().verbatim_serialize("play", &view);
        self.emit(
            templates::PLAY_README,
            &format!("plays/{play_id}"),
            "README.adoc",
            bag,
        );
    }

    fn render_task_view(&mut self, task_id: &str) {
        let (Some(play), Some(task)) = (self.store.current_play(), self.store.task(task_id)) else {
            return;
        };
        let view = TaskView::build(play, task);
        let relative = format!("plays/{}/{}", view.play_id, view.file_id);
        let bag = VariableBag::new().verbatim_serialize("task", &view);
        self.emit(templates::TASK_README, &relative, "README.adoc", bag);
    }

    fn render_host_json(&mut self, play_id: &str, task_id: &str, host: &str) {
        let Some(result) = self.store.task(task_id).and_then(|t| t.hosts.get(host)) else {
            return;
        };
        let bag = VariableBag::new().verbatim("result", result.payload.clone());
        let relative = format!("plays/{play_id}/{task_id}");
        let file_name = format!("{}.json", sanitize(host));
        self.emit(templates::HOST_JSON, &relative, &file_name, Ok(bag));
    }

    /// Renders and writes one artifact, logging failures.
    fn emit(&mut self, template: Template, relative: &str, file_name: &str, bag: Result<VariableBag>) {
        let Some(writer) = self.writer.as_ref() else {
            return;
        };
        let outcome = bag.and_then(|bag| {
            let bag = bag.verbatim("env_rel_path", env_rel_path(relative));
            let content = self.renderer.render(template.id, template.source, &bag)?;
            writer.write_artifact(relative, file_name, &content)
        });
        if let Err(e) = outcome {
            warn!(
                template = template.id,
                recoverable = e.is_recoverable(),
                "Failed to render {}/{}: {}",
                relative,
                file_name,
                e
            );
            self.render_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn recorder(temp: &TempDir) -> Recorder {
        let config = RecorderConfig {
            log_folder: temp.path().to_path_buf(),
            ..RecorderConfig::default()
        };
        let mut recorder = Recorder::new(config);
        recorder.on_run_start_in("run");
        recorder
    }

    #[test]
    fn test_run_start_writes_assets_and_readme() {
        let temp = TempDir::new().unwrap();
        let recorder = recorder(&temp);
        assert_eq!(recorder.state(), RecorderState::RunActive);
        assert!(temp.path().join("env.adoc").exists());
        assert!(temp.path().join("docinfo.html").exists());
        let readme = fs::read_to_string(temp.path().join("run/README.adoc")).unwrap();
        assert!(readme.contains("include::../env.adoc[]"));
        assert_eq!(recorder.render_failures(), 0);
    }

    #[test]
    fn test_result_renders_task_and_json() {
        let temp = TempDir::new().unwrap();
        let mut recorder = recorder(&temp);
        recorder.on_play_start("site", "p1", None);
        recorder.on_task_start(&TaskInfo::new("t1", "Install package", "pkg"), false);
        recorder.on_host_result("t1", "web1", OutcomeKind::Ok, false, json!({"changed": true}));

        let task_dir = temp.path().join("run/plays/site/Install_package-pkg");
        let readme = fs::read_to_string(task_dir.join("README.adoc")).unwrap();
        assert!(readme.contains("== 🟠 web1"));
        assert!(readme.contains("include::../../../../env.adoc[]"));
        let raw = fs::read_to_string(task_dir.join("web1.json")).unwrap();
        assert_eq!(raw, "{\n    \"changed\": true\n}\n");
        assert_eq!(recorder.render_failures(), 0);
    }

    #[test]
    fn test_diff_after_result_rerenders() {
        let temp = TempDir::new().unwrap();
        let mut recorder = recorder(&temp);
        recorder.on_play_start("site", "p1", None);
        recorder.on_task_start(&TaskInfo::new("t1", "conf", "template"), false);
        recorder.on_host_result("t1", "web1", OutcomeKind::Ok, false, json!({"changed": true}));
        recorder.on_file_diff("t1", "web1", &json!({"diff": {"prepared": "+line\n"}}));

        let readme =
            fs::read_to_string(temp.path().join("run/plays/site/conf-template/README.adoc")).unwrap();
        assert!(readme.contains("+line"));
    }

    #[test]
    fn test_events_before_start_and_after_end() {
        let temp = TempDir::new().unwrap();
        let config = RecorderConfig {
            log_folder: temp.path().to_path_buf(),
            ..RecorderConfig::default()
        };
        let mut recorder = Recorder::new(config);
        recorder.handle(RunEvent::PlayStart {
            name: "late".into(),
            key: "p".into(),
            serial_batch: None,
        });
        assert_eq!(recorder.state(), RecorderState::RunActive);
        recorder.handle(RunEvent::RunEnd);
        assert_eq!(recorder.state(), RecorderState::RunEnded);
        recorder.handle(RunEvent::RunEnd);
        assert_eq!(recorder.state(), RecorderState::RunEnded);
    }

    #[test]
    fn test_write_failure_is_counted_not_raised() {
        let temp = TempDir::new().unwrap();
        // a file where the root folder should be makes every write fail
        let blocked = temp.path().join("blocked");
        fs::write(&blocked, "x").unwrap();
        let config = RecorderConfig {
            log_folder: blocked,
            ..RecorderConfig::default()
        };
        let mut recorder = Recorder::new(config);
        recorder.on_run_start_in("run");
        recorder.on_play_start("site", "p1", None);
        assert!(recorder.render_failures() > 0);
        assert_eq!(recorder.store().run().plays.len(), 1);
    }
}
