//! User settings and the snapshot handle read by the event callback.
//!
//! The callback reads one immutable [`Config`] snapshot per event. The UI
//! side publishes replacements through [`SettingsHandle::update`]; a change
//! becomes visible to the next event, never halfway through one.

use crate::app_rules::TerminalSpeed;
use crate::code_table::CodeTable;
use crate::error::PipelineError;
use crate::keys::EventFlags;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Active input language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputLanguage {
    #[default]
    Vietnamese,
    English,
}

/// Modifier that, tapped on its own, puts back the raw keys of the word
/// being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreModifier {
    /// Restoring is left to the engine's own Esc handling.
    #[default]
    None,
    Option,
    Control,
}

impl RestoreModifier {
    pub fn flag(self) -> Option<EventFlags> {
        match self {
            RestoreModifier::None => None,
            RestoreModifier::Option => Some(EventFlags::ALTERNATE),
            RestoreModifier::Control => Some(EventFlags::CONTROL),
        }
    }
}

/// Windows and lifetimes of the context caches, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTimings {
    /// How long a probed overlay/focused-application result stays valid.
    pub spotlight_cache_ms: u64,
    /// Repeated overlay invalidations inside this window are skipped.
    pub overlay_invalidation_dedup_ms: u64,
    /// Lifetime of the per-pid "disable Vietnamese" verdict.
    pub app_switch_cache_ms: u64,
    /// The characteristics cache is rebuilt at least this often.
    pub characteristics_max_age_ms: u64,
    /// The pid → application cache is flushed at this interval.
    pub pid_cache_clean_interval_ms: u64,
    /// A Space after an external delete inside this window is treated as
    /// part of a system text replacement.
    pub text_replacement_delete_window_ms: u64,
    /// The external delete counter restarts after this much silence.
    pub external_delete_reset_ms: u64,
}

impl Default for CacheTimings {
    fn default() -> Self {
        Self {
            spotlight_cache_ms: 150,
            overlay_invalidation_dedup_ms: 30,
            app_switch_cache_ms: 100,
            characteristics_max_age_ms: 10_000,
            pid_cache_clean_interval_ms: 60_000,
            text_replacement_delete_window_ms: 30_000,
            external_delete_reset_ms: 30_000,
        }
    }
}

/// Settings consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub language: InputLanguage,
    pub code_table: CodeTable,

    /// Never touch the accessibility API and skip overlay probing.
    pub safe_mode: bool,

    /// Deliver every replacement one key event at a time.
    pub send_key_step_by_step: bool,

    /// Work around autocomplete in browsers and similar text fields.
    pub fix_browser_autocomplete: bool,

    // Macros
    pub use_macro: bool,
    pub use_macro_in_english_mode: bool,

    /// Remap physical keys through the active keyboard layout.
    pub perform_layout_compat: bool,

    pub restore_modifier: RestoreModifier,

    // Per-application overrides
    /// Extra identifiers (exact or `prefix*`) that need step-by-step delivery.
    pub step_by_step_apps: Vec<String>,
    /// Terminal speed class per identifier; also marks the app as a terminal.
    pub terminal_speed_overrides: BTreeMap<String, TerminalSpeed>,

    pub timings: CacheTimings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: InputLanguage::Vietnamese,
            code_table: CodeTable::Unicode,
            safe_mode: false,
            send_key_step_by_step: false,
            fix_browser_autocomplete: true,
            use_macro: true,
            use_macro_in_english_mode: false,
            perform_layout_compat: false,
            restore_modifier: RestoreModifier::None,
            step_by_step_apps: Vec::new(),
            terminal_speed_overrides: BTreeMap::new(),
            timings: CacheTimings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| PipelineError::io(path, e))
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn is_vietnamese(&self) -> bool {
        self.language == InputLanguage::Vietnamese
    }
}

/// Shared, versioned settings snapshot.
///
/// Cloning the handle shares the same underlying settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Snapshot>>,
}

#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    config: Arc<Config>,
}

impl SettingsHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot {
                generation: 0,
                config: Arc::new(config),
            })),
        }
    }

    /// Current settings and their generation number.
    pub fn snapshot(&self) -> (u64, Arc<Config>) {
        let snap = self.inner.read();
        (snap.generation, snap.config.clone())
    }

    pub fn current(&self) -> Arc<Config> {
        self.inner.read().config.clone()
    }

    /// Publish a modified copy of the settings.
    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        let mut snap = self.inner.write();
        let mut next = (*snap.config).clone();
        f(&mut next);
        snap.config = Arc::new(next);
        snap.generation += 1;
    }

    pub fn replace(&self, config: Config) {
        self.update(|c| *c = config);
    }
}
