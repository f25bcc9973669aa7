//! Feeding a JSON-lines event stream through the async callback surface.

use serde_json::json;
use tempfile::TempDir;

use runscribe::callback::{RunCallback, RunEvent, SharedRecorder};
use runscribe::config::RecorderConfig;
use runscribe::recorder::{HostStatus, RecorderState};

const EVENTS: &str = r#"{"event": "run_start"}
{"event": "play_start", "name": "web servers", "key": "play-web"}
{"event": "task_start", "task": {"key": "t1", "name": "template nginx.conf", "action": "template", "tags": ["nginx"]}}
{"event": "file_diff", "task_key": "t1", "host": "web1", "payload": {"diff": [{"before": "a\n", "after": "b\n"}]}}
{"event": "host_result", "task_key": "t1", "host": "web1", "outcome": "ok", "payload": {"changed": true}}
{"event": "host_result", "task_key": "t1", "host": "web2", "outcome": "skipped", "payload": {"skip_reason": "Conditional result was False"}}
{"event": "handler_notify", "task": {"key": "h1", "name": "restart nginx", "action": "service"}}
{"event": "host_result", "task_key": "h1", "host": "web1", "outcome": "something_new", "ignore_errors": true}
{"event": "run_end"}"#;

fn parse(stream: &str) -> Vec<RunEvent> {
    stream
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_stream_builds_report_tree() {
    let temp = TempDir::new().unwrap();
    let recorder = SharedRecorder::new(RecorderConfig {
        log_folder: temp.path().to_path_buf(),
        ..RecorderConfig::default()
    });

    for event in parse(EVENTS) {
        recorder.on_event(&event).await;
    }

    let run_dir = recorder.with(|r| {
        assert_eq!(r.state(), RecorderState::RunEnded);
        assert_eq!(r.render_failures(), 0);

        let counters = &r.store().run().counters;
        assert_eq!(counters.host("web1").changed, 1);
        assert_eq!(counters.host("web1").ignored_failed, 1);
        assert_eq!(counters.host("web1").ok, 2);
        assert_eq!(counters.host("web2").skipped, 1);
        assert_eq!(r.store().run().timeline.len(), 3);
        r.run_dir().unwrap().to_path_buf()
    });

    let task_dir = run_dir.join("plays/web_servers/template_nginx.conf-template");
    let readme = std::fs::read_to_string(task_dir.join("README.adoc")).unwrap();
    assert!(readme.contains("Conditional result was False"));
    assert!(readme.contains("+b"));
    assert!(task_dir.join("web1.json").exists());

    let handler = std::fs::read_to_string(
        run_dir.join("plays/web_servers/restart_nginx-service/README.adoc"),
    )
    .unwrap();
    assert!(handler.contains(HostStatus::IgnoredFailed.glyph()));
}

#[tokio::test]
async fn test_recorders_run_concurrently() {
    let temp = TempDir::new().unwrap();
    let mut handles = Vec::new();
    for i in 0..4 {
        let recorder = SharedRecorder::new(RecorderConfig {
            log_folder: temp.path().to_path_buf(),
            ..RecorderConfig::default()
        });
        handles.push(tokio::spawn(async move {
            recorder.with(|r| r.on_run_start_in(&format!("run-{i}")));
            recorder.on_play_start("site", "p1", None).await;
            recorder
                .on_host_result("missing", "web1", "ok".into(), false, &json!({}))
                .await;
            recorder.on_run_end().await;
            recorder.with(|r| r.render_failures())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 0);
    }
    for i in 0..4 {
        assert!(temp.path().join(format!("run-{i}/plays/site/README.adoc")).exists());
    }
}
