//! Property tests for naming, counting and the activity window.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use serde_json::json;

use runscribe::callback::TaskInfo;
use runscribe::recorder::{
    classify, ActivityWindow, AggregationStore, HostStatus, NameRegistry, OutcomeKind,
    TaskActivity,
};
use runscribe::report::{CacheKeyPolicy, ReportRenderer, UndefinedMode, VariableBag};

fn outcome() -> impl Strategy<Value = OutcomeKind> {
    prop_oneof![
        Just(OutcomeKind::Ok),
        Just(OutcomeKind::Failed),
        Just(OutcomeKind::Unreachable),
        Just(OutcomeKind::Skipped),
        Just(OutcomeKind::Unknown),
    ]
}

proptest! {
    #[test]
    fn identifiers_never_collide(names in prop::collection::vec("[ab -]{0,4}", 1..40)) {
        let mut registry = NameRegistry::new();
        let mut seen = HashSet::new();
        for name in &names {
            let resolved = registry.resolve_task(name, "x");
            prop_assert!(seen.insert(resolved.file_id.clone()), "duplicate {}", resolved.file_id);
            prop_assert!(resolved
                .file_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
        }
    }

    #[test]
    fn play_identifiers_never_collide(names in prop::collection::vec("(web|web-2|db)", 1..20)) {
        let mut registry = NameRegistry::new();
        let mut ids = HashSet::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for name in &names {
            let resolved = registry.resolve_play(name);
            prop_assert!(ids.insert(resolved.file_id));
            // the display counts occurrences of the name itself
            let n = seen.entry(name.as_str()).or_insert(0);
            *n += 1;
            let expected = if *n == 1 { name.clone() } else { format!("{name} ({n})") };
            prop_assert_eq!(resolved.display, expected);
        }
    }

    #[test]
    fn counters_are_conserved(
        results in prop::collection::vec(
            (0usize..3, 0usize..4, outcome(), any::<bool>(), any::<bool>()),
            0..60,
        ),
        rescue in any::<bool>(),
    ) {
        let hosts = ["web1", "web2", "db1", "db2"];
        let mut store = AggregationStore::new(20);
        store.start_run();
        store.start_play("site", "p1", None);
        for t in 0..3 {
            store.start_task(&TaskInfo::new(format!("t{t}"), format!("task {t}"), "cmd"), rescue, false);
        }
        for (task, host, outcome, ignore, changed) in results {
            store.record_result(
                &format!("t{task}"),
                hosts[host],
                outcome,
                ignore,
                json!({"changed": changed, "results": [{"changed": changed}]}),
            );
        }

        let play = store.play("site").unwrap();
        let run = &store.run().counters;
        for status in HostStatus::COUNTED {
            prop_assert_eq!(play.counters.sum_hosts(status), play.counters.all.get(status));
            prop_assert_eq!(run.sum_hosts(status), run.all.get(status));
            // a single play means run and play scopes agree
            prop_assert_eq!(run.all.get(status), play.counters.all.get(status));
        }
        // revisited hosts count once, by their final status
        let finals: Vec<HostStatus> = (0..3)
            .filter_map(|t| store.task(&format!("task_{t}-cmd")))
            .flat_map(|task| task.hosts.values().map(|r| r.status))
            .collect();
        for status in [HostStatus::Failed, HostStatus::Unreachable, HostStatus::Skipped, HostStatus::Rescued, HostStatus::IgnoredFailed] {
            let expected = finals.iter().filter(|s| **s == status).count() as u64;
            prop_assert_eq!(play.counters.all.get(status), expected);
        }
        if rescue {
            // only ignored failures can escape the rescue remap, and they are not failures
            prop_assert_eq!(play.counters.all.failed, 0);
        }
    }

    #[test]
    fn changed_and_ignored_also_count_ok(
        outcome in outcome(),
        ignore in any::<bool>(),
        rescue in any::<bool>(),
        changed in any::<bool>(),
    ) {
        let c = classify(outcome, ignore, rescue, &json!({"changed": changed}));
        if matches!(c.status, HostStatus::Changed | HostStatus::IgnoredFailed) {
            prop_assert_eq!(c.increments.iter().filter(|s| **s == HostStatus::Ok).count(), 1);
        } else {
            prop_assert_eq!(c.increments.clone(), vec![c.status]);
        }
        prop_assert!(!c.increments.contains(&HostStatus::Running));
    }

    #[test]
    fn activity_window_is_bounded(count in 0usize..80, capacity in 1usize..30) {
        let mut window = ActivityWindow::with_capacity(capacity);
        for i in 0..count {
            window.push(
                format!("task-{i}"),
                TaskActivity {
                    task_id: format!("task-{i}"),
                    task_name: format!("task {i}"),
                    play_id: "p".into(),
                    play_name: "p".into(),
                    counts: Default::default(),
                },
            );
        }
        prop_assert_eq!(window.len(), count.min(capacity));
        let expected: Vec<String> = (count.saturating_sub(capacity)..count)
            .map(|i| format!("task-{i}"))
            .collect();
        prop_assert_eq!(window.keys().map(str::to_string).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn rendering_is_idempotent(name in "[a-z{}% ]{0,12}", n in any::<i64>()) {
        let renderer = ReportRenderer::new(CacheKeyPolicy::IdentifierAndContent, UndefinedMode::PassThrough);
        let bag = VariableBag::new().verbatim("name", name).verbatim("n", n);
        let first = renderer.render("prop", "{{ name }}:{{ n }}\n", &bag);
        let second = renderer.render("prop", "{{ name }}:{{ n }}\n", &bag);
        prop_assert_eq!(first.ok(), second.ok());
    }
}
