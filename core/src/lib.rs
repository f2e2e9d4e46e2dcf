//! libviet-core
//!
//! Keyboard event interception, decision and re-injection pipeline for a
//! Vietnamese input method.
//!
//! Every key the user types passes through [`EventPipeline::handle_event`].
//! The pipeline asks the linguistic engine what the key means, decides how
//! the result must be delivered to the focused application, and either lets
//! the original event through or swallows it and types a replacement with
//! synthetic events.
//!
//! Public API:
//! - `EventPipeline` - The tap callback, generic over the engine
//! - `LinguisticEngine` - Boundary with the Telex/VNI state machine
//! - `ContextCache` - Process-wide application and overlay caches
//! - `OutputPlan` - Pure decision of how one signal is delivered
//! - `Injector` - Synthetic events, sync key stack and CLI pacing
//! - `Config` - Settings, loaded from TOML
//! - `Platform` - OS collaborators behind traits

// Keys, events and encodings
pub mod keys;
pub use keys::EventFlags;

pub mod event;
pub use event::{Disposition, EventKind, KeyEvent, INJECTION_MARKER};

pub mod code_table;
pub use code_table::{CodeTable, EncodedChar};

pub mod sync_stack;
pub use sync_stack::SyncKeyStack;

// Engine boundary
pub mod engine;
pub use engine::{
    CapsStatus, EngineSignal, LinguisticEngine, PackedCell, ScriptedEngine, SignalCode, MAX_BUFFER,
};

// Settings and errors
pub mod config;
pub use config::{CacheTimings, Config, InputLanguage, RestoreModifier, SettingsHandle};

pub mod error;
pub use error::PipelineError;

// OS collaborators
pub mod clock;
pub use clock::{Clock, ManualClock, MonotonicClock, RecordingSleeper, Sleeper, ThreadSleeper};

pub mod platform;
pub use platform::{
    Accessibility, LayoutMapper, OverlayProbe, OverlayState, Platform, ProcessTable,
    TapController, TapDisableReason,
};

// Target resolution
pub mod app_rules;
pub use app_rules::{AppRules, ApplicationCharacteristics, TerminalSpeed};

pub mod context;
pub use context::{ContextCache, TargetContext};

// Decisions
pub mod decision;
pub use decision::{BackspaceAdjustment, OutputPlan, PlanInput};

pub mod text_replacement;
pub use text_replacement::{ExternalDeleteTracker, TextReplacementDecision};

// Delivery
pub mod pacing;
pub use pacing::{CliProfileKind, CliTimingProfile, PacingController};

pub mod injection;
pub use injection::{EventPoster, Injector, PostTarget, RecordingPoster, SyntheticEvent};

pub mod output;

pub mod pipeline;
pub use pipeline::EventPipeline;

pub mod trace;
pub use trace::{parse_trace, replay, ReplayStep, TraceRecord};
