//! Recorded event traces.
//!
//! A trace is JSON lines, one intercepted event per line, optionally with
//! the signal the engine should answer for it:
//!
//! ```text
//! {"event":{"kind":"key_down","target_pid":7},"key":"o","advance_ms":120}
//! {"event":{"kind":"key_down","target_pid":7},"key":"f","signal":{"code":"will_process","backspace_count":3,"new_chars":[33554531,33554536,33554656]}}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Replaying a trace
//! drives a pipeline built on [`ScriptedEngine`] and a manual clock.

use crate::clock::ManualClock;
use crate::decision::OutputPlan;
use crate::engine::{EngineSignal, ScriptedEngine};
use crate::error::PipelineError;
use crate::event::{Disposition, KeyEvent};
use crate::injection::{RecordingPoster, SyntheticEvent};
use crate::keys;
use crate::pipeline::EventPipeline;
use serde::{Deserialize, Serialize};

/// One line of a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Clock advance before the event is delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance_ms: Option<u64>,
    pub event: KeyEvent,
    /// Key by name; overrides `event.key_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Engine answer for this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<EngineSignal>,
}

pub fn parse_trace(input: &str) -> Result<Vec<TraceRecord>, PipelineError> {
    let mut records = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut record: TraceRecord =
            serde_json::from_str(line).map_err(|source| PipelineError::Trace {
                line: index + 1,
                source,
            })?;
        if let Some(name) = &record.key {
            record.event.key_code = keys::key_from_name(name)?;
        }
        records.push(record);
    }
    Ok(records)
}

/// Outcome of one replayed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStep {
    pub line: usize,
    pub disposition: Disposition,
    /// Synthetic events posted while handling it.
    pub posted: Vec<SyntheticEvent>,
    /// Output plan, when the event produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<OutputPlan>,
}

/// Feed `records` through `pipeline`. `clock` and `poster` must be the ones
/// the pipeline's platform was built with.
pub fn replay(
    pipeline: &mut EventPipeline<ScriptedEngine>,
    clock: &ManualClock,
    poster: &RecordingPoster,
    records: &[TraceRecord],
) -> Vec<ReplayStep> {
    let mut steps = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if let Some(ms) = record.advance_ms {
            clock.advance_ms(ms);
        }
        if let Some(signal) = &record.signal {
            pipeline.engine_mut().push(signal.clone());
        }
        pipeline.take_last_plan();
        let disposition = pipeline.handle_event(&record.event);
        let plan = pipeline.take_last_plan();
        steps.push(ReplayStep {
            line: index + 1,
            disposition,
            posted: poster.take(),
            plan,
        });
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SignalCode;
    use crate::event::EventKind;

    #[test]
    fn test_parse_trace() {
        let input = r#"
# typing "có"
{"event":{"kind":"key_down","target_pid":7},"key":"c"}
{"event":{"kind":"key_down","target_pid":7},"key":"s","advance_ms":80,"signal":{"code":"will_process","backspace_count":1,"new_chars":[33554675]}}
{"event":{"kind":"pointer_down"}}
"#;
        let records = parse_trace(input).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].event.key_code, keys::C);
        assert_eq!(records[1].advance_ms, Some(80));
        let signal = records[1].signal.as_ref().unwrap();
        assert_eq!(signal.code, SignalCode::WillProcess);
        assert_eq!(signal.new_chars, EngineSignal::unicode_cells("ó"));
        assert_eq!(records[2].event.kind, EventKind::PointerDown);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_trace("{\"event\":{\"kind\":\"key_down\"}}\nnot json").unwrap_err();
        assert!(matches!(err, PipelineError::Trace { line: 2, .. }));

        let err = parse_trace(r#"{"event":{"kind":"key_down"},"key":"hyper"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownKey(_)));
    }
}
