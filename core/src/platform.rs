//! Operating system collaborators.
//!
//! The pipeline never calls the OS directly. Each capability it needs sits
//! behind one of these traits so hosts can plug in the real system services
//! and tests can plug in fakes. Every probe is allowed to fail; failure is
//! reported as "no information" and never as an error.

use std::sync::Arc;

/// Running-process lookups.
pub trait ProcessTable: Send + Sync {
    /// Bundle identifier of a running process.
    fn bundle_id(&self, pid: i32) -> Option<String>;

    /// Executable path of a running process.
    fn executable_path(&self, pid: i32) -> Option<String>;

    /// Bundle identifier of the frontmost application.
    fn frontmost_bundle_id(&self) -> Option<String>;
}

/// State of the system search/launcher overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayState {
    pub active: bool,
    /// Process owning the focused element, `0` when unknown.
    pub focused_pid: i32,
    pub focused_app: Option<String>,
}

/// Probes whether a launcher overlay currently owns keyboard focus.
pub trait OverlayProbe: Send + Sync {
    fn probe(&self) -> OverlayState;
}

/// Accessibility-tree services.
pub trait Accessibility: Send + Sync {
    /// Delete `backspaces` characters before the caret in the focused
    /// element and insert `text`. With `verify`, confirm the edit landed.
    fn replace_focused_text(&self, backspaces: usize, text: &str, verify: bool) -> bool;

    fn is_address_bar_focused(&self) -> bool;

    fn is_notion_code_block(&self) -> bool;

    /// Whether the focused element is a terminal panel inside an editor.
    fn is_terminal_panel_focused(&self) -> bool;
}

/// Maps a physical key to the key the active keyboard layout produces.
///
/// Answers are cached per key. The host calls
/// [`EventPipeline::input_source_changed`](crate::EventPipeline::input_source_changed)
/// whenever the active input source changes.
pub trait LayoutMapper: Send + Sync {
    fn map(&self, key: u16) -> Option<u16>;
}

/// Why the OS disabled the event tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDisableReason {
    Timeout,
    UserInput,
}

/// The event tap itself.
pub trait TapController: Send + Sync {
    fn has_permission(&self) -> bool;

    fn reenable(&self, reason: TapDisableReason);
}

/// Accessibility stand-in for hosts without accessibility access.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAccessibility;

impl Accessibility for NoAccessibility {
    fn replace_focused_text(&self, _backspaces: usize, _text: &str, _verify: bool) -> bool {
        false
    }

    fn is_address_bar_focused(&self) -> bool {
        false
    }

    fn is_notion_code_block(&self) -> bool {
        false
    }

    fn is_terminal_panel_focused(&self) -> bool {
        false
    }
}

/// Overlay probe that never reports an overlay.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl OverlayProbe for NoOverlay {
    fn probe(&self) -> OverlayState {
        OverlayState::default()
    }
}

/// Tap controller for hosts that already hold the permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPermitted;

impl TapController for AlwaysPermitted {
    fn has_permission(&self) -> bool {
        true
    }

    fn reenable(&self, _reason: TapDisableReason) {}
}

/// Every OS collaborator the pipeline needs, bundled for construction.
#[derive(Clone)]
pub struct Platform {
    pub processes: Arc<dyn ProcessTable>,
    pub overlay: Arc<dyn OverlayProbe>,
    pub accessibility: Arc<dyn Accessibility>,
    pub layout: Option<Arc<dyn LayoutMapper>>,
    pub tap: Arc<dyn TapController>,
    pub poster: Arc<dyn crate::injection::EventPoster>,
    pub clock: Arc<dyn crate::clock::Clock>,
    pub sleeper: Arc<dyn crate::clock::Sleeper>,
}
