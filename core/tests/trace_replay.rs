// core/tests/trace_replay.rs
//
// Replaying recorded traces through a full pipeline.
//
// Tests cover:
// - Parsing the bundled trace and driving the pipeline with it
// - Per-event dispositions, posted events and plans in the replay result
// - Replay results serialize to JSON for the replay tool

use libviet_core::clock::{Clock, ManualClock, RecordingSleeper};
use libviet_core::engine::EngineCall;
use libviet_core::platform::{AlwaysPermitted, NoAccessibility, NoOverlay};
use libviet_core::{
    parse_trace, replay, Config, Disposition, EventPipeline, Platform, ProcessTable,
    RecordingPoster, ScriptedEngine, SettingsHandle,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const CHAOF: &str = include_str!("data/chaof.jsonl");

struct Notes;

impl ProcessTable for Notes {
    fn bundle_id(&self, _pid: i32) -> Option<String> {
        Some("com.apple.Notes".to_string())
    }

    fn executable_path(&self, _pid: i32) -> Option<String> {
        None
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        Some("com.apple.Notes".to_string())
    }
}

#[test]
fn test_replay_bundled_trace() {
    let records = parse_trace(CHAOF).expect("trace parses");
    assert_eq!(records.len(), 7);

    let clock = Arc::new(ManualClock::starting_at_ms(1_000));
    let poster = Arc::new(RecordingPoster::new());
    let platform = Platform {
        processes: Arc::new(Notes),
        overlay: Arc::new(NoOverlay),
        accessibility: Arc::new(NoAccessibility),
        layout: None,
        tap: Arc::new(AlwaysPermitted),
        poster: poster.clone(),
        clock: clock.clone(),
        sleeper: Arc::new(RecordingSleeper::with_clock(clock.clone())),
    };
    let config = Config {
        fix_browser_autocomplete: false,
        ..Config::default()
    };
    let mut pipeline =
        EventPipeline::new(ScriptedEngine::new(), SettingsHandle::new(config), platform);

    let steps = replay(&mut pipeline, &clock, &poster, &records);
    let dispositions: Vec<Disposition> = steps.iter().map(|s| s.disposition).collect();
    assert_eq!(
        dispositions,
        vec![
            Disposition::PassThrough,
            Disposition::PassThrough,
            Disposition::PassThrough,
            Disposition::PassThrough,
            Disposition::Swallow,
            Disposition::PassThrough,
            Disposition::PassThrough,
        ]
    );

    let f = &steps[4];
    assert_eq!(f.line, 5);
    let plan = f.plan.expect("f produced a plan");
    assert_eq!(plan.sanitized_backspace_count, 2);
    assert!(!plan.use_step_by_step);
    let downs: Vec<_> = f.posted.iter().filter(|e| e.key_down).collect();
    assert_eq!(downs.len(), 3);
    assert_eq!(downs[2].text(), "ào");

    assert!(steps.iter().enumerate().all(|(i, s)| i == 4 || s.posted.is_empty()));
    assert!(steps[5].plan.is_none());
    assert_eq!(
        pipeline.engine().calls().last(),
        Some(&EngineCall::RequestNewSession)
    );
    assert_eq!(clock.now_ms(), 1_000 + 5 * 120 + 500);
}

#[test]
fn test_replay_steps_serialize() {
    let records = parse_trace(CHAOF).unwrap();
    let clock = Arc::new(ManualClock::new());
    let poster = Arc::new(RecordingPoster::new());
    let platform = Platform {
        processes: Arc::new(Notes),
        overlay: Arc::new(NoOverlay),
        accessibility: Arc::new(NoAccessibility),
        layout: None,
        tap: Arc::new(AlwaysPermitted),
        poster: poster.clone(),
        clock: clock.clone(),
        sleeper: Arc::new(RecordingSleeper::new()),
    };
    let mut pipeline =
        EventPipeline::new(ScriptedEngine::new(), SettingsHandle::new(Config::default()), platform);
    let steps = replay(&mut pipeline, &clock, &poster, &records[..5]);

    let json = serde_json::to_value(&steps).unwrap();
    assert_eq!(json.as_array().map(Vec::len), Some(5));
    assert_eq!(json[4]["disposition"], serde_json::json!("swallow"));
    assert!(json[0].get("plan").is_none());
    assert!(json[4]["plan"]["sanitized_backspace_count"].is_number());
}
