//! Identifier rules that classify target applications.
//!
//! Every rule set is matched case-insensitively against a trimmed bundle
//! identifier. Entries ending in `*` match by prefix. The static sets cover
//! the applications with known quirks; [`AppRules`] layers the user's
//! overrides from [`Config`] on top.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How quickly a terminal emulator consumes injected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSpeed {
    Fast,
    Medium,
    Slow,
}

/// Behavioural flags of one application, computed from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationCharacteristics {
    pub is_spotlight_like: bool,
    pub needs_precomposed_batched: bool,
    pub needs_step_by_step: bool,
    /// The app renders combining marks itself and mishandles some fixes.
    pub contains_unicode_compound: bool,
    pub is_browser: bool,
    pub is_terminal: bool,
    pub is_jetbrains_ide: bool,
    pub is_safari: bool,
}

/// Identifier of the Notion desktop app, which gets special treatment in the
/// backspace fixes.
pub const NOTION: &str = "notion.id";

/// Identifier of the Figma desktop app.
pub const FIGMA: &str = "com.figma.Desktop";

struct PatternSet {
    exact: phf::Set<&'static str>,
    prefixes: &'static [&'static str],
}

impl PatternSet {
    fn matches(&self, normalized: &str) -> bool {
        self.exact.contains(normalized) || self.prefixes.iter().any(|p| normalized.starts_with(p))
    }
}

static NICE_SPACE: PatternSet = PatternSet {
    exact: phf::phf_set! { "com.sublimetext.3", "com.sublimetext.2" },
    prefixes: &[],
};

static SAFARI: PatternSet = PatternSet {
    exact: phf::phf_set! { "com.apple.safari", "com.apple.safaritechnologypreview" },
    prefixes: &["com.apple.safari.webapp."],
};

static UNICODE_COMPOUND: PatternSet = PatternSet {
    exact: phf::phf_set! {
        "com.apple.safari",
        "com.apple.safaritechnologypreview",
        "com.google.chrome",
        "com.brave.browser",
        "com.microsoft.edgemac",
        "com.microsoft.edgemac.dev",
        "com.microsoft.edgemac.beta",
        "com.microsoft.edge",
        "com.microsoft.edge.dev",
        "com.thebrowser.browser",
        "company.thebrowser.dia",
        "org.chromium.chromium",
        "com.vivaldi.vivaldi",
        "com.operasoftware.opera",
        "notion.id",
    },
    prefixes: &[
        "com.apple.safari.webapp.",
        "com.google.chrome.app.",
        "com.brave.browser.app.",
        "com.microsoft.edgemac.app.",
        "com.microsoft.edgemac.dev.app.",
        "com.microsoft.edgemac.beta.app.",
        "com.microsoft.edge.app.",
        "com.microsoft.edge.dev.app.",
        "com.thebrowser.browser.app.",
        "org.chromium.chromium.app.",
        "com.vivaldi.vivaldi.app.",
        "com.operasoftware.opera.app.",
    ],
};

static BROWSERS: PatternSet = PatternSet {
    exact: phf::phf_set! {
        "com.apple.safari",
        "com.apple.safaritechnologypreview",
        "org.mozilla.firefox",
        "org.mozilla.firefoxdeveloperedition",
        "org.mozilla.nightly",
        "app.zen-browser.zen",
        "com.google.chrome",
        "com.google.chrome.canary",
        "com.google.chrome.dev",
        "com.google.chrome.beta",
        "org.chromium.chromium",
        "com.brave.browser",
        "com.brave.browser.beta",
        "com.brave.browser.nightly",
        "com.microsoft.edgemac",
        "com.microsoft.edgemac.dev",
        "com.microsoft.edgemac.beta",
        "com.microsoft.edgemac.canary",
        "com.microsoft.edge",
        "com.microsoft.edge.dev",
        "com.thebrowser.browser",
        "ai.perplexity.comet",
        "com.visualkit.browser",
        "com.coccoc.browser",
        "com.vivaldi.vivaldi",
        "com.operasoftware.opera",
        "com.operasoftware.operagx",
        "com.kagi.kagimacos",
        "com.duckduckgo.macos.browser",
        "com.sigmaos.sigmaos.macos",
        "com.pushplaylabs.sidekick",
        "com.bookry.wavebox",
        "com.mighty.app",
        "com.collovos.naver.whale",
        "ru.yandex.desktop.yandex-browser",
        // Chromium shells that behave like browsers.
        "com.tinyspeck.slackmacgap",
        "com.hnc.discord",
        "com.electron.discord",
        "com.github.githubclient",
        "com.figma.desktop",
        "com.linear",
        "com.logseq.logseq",
        "md.obsidian",
    },
    prefixes: &[
        "com.apple.safari.webapp.",
        "com.google.chrome.app.",
        "com.google.chrome.canary.app.",
        "com.google.chrome.dev.app.",
        "com.google.chrome.beta.app.",
        "org.chromium.chromium.app.",
        "com.brave.browser.app.",
        "com.brave.browser.beta.app.",
        "com.brave.browser.nightly.app.",
        "com.microsoft.edgemac.app.",
        "com.microsoft.edgemac.dev.app.",
        "com.microsoft.edgemac.beta.app.",
        "com.microsoft.edgemac.canary.app.",
        "com.microsoft.edge.app.",
        "com.microsoft.edge.dev.app.",
        "com.thebrowser.browser.app.",
        "com.vivaldi.vivaldi.app.",
        "com.operasoftware.opera.app.",
        "com.operasoftware.operagx.app.",
        "com.coccoc.browser.app.",
        "com.kagi.kagimacos.app.",
        "com.sigmaos.sigmaos.macos.app.",
        "com.pushplaylabs.sidekick.app.",
        "com.bookry.wavebox.app.",
        "com.collovos.naver.whale.app.",
        "ru.yandex.desktop.yandex-browser.app.",
    ],
};

static FAST_TERMINALS: PatternSet = PatternSet {
    exact: phf::phf_set! { "io.alacritty", "com.mitchellh.ghostty", "com.raphaelamorim.rio" },
    prefixes: &[],
};

static MEDIUM_TERMINALS: PatternSet = PatternSet {
    exact: phf::phf_set! {
        "com.apple.terminal",
        "net.kovidgoyal.kitty",
        "com.github.wez.wezterm",
        "com.googlecode.iterm2",
        "dev.warp.warp-stable",
        "co.zeit.hyper",
        "org.tabby",
        "com.termius-dmg.mac",
    },
    prefixes: &[],
};

static VSCODE_FAMILY: phf::Set<&'static str> = phf::phf_set! {
    "com.microsoft.vscode",
    "com.microsoft.vscodeinsiders",
    "com.visualstudio.code.oss",
    "com.vscodium",
    "com.vscodium.codium",
    "com.google.antigravity",
    "com.todesktop.cursor",
    "com.todesktop.230313mzl4w4u92",
};

static SPOTLIGHT_LIKE: PatternSet = PatternSet {
    exact: phf::phf_set! { "com.apple.spotlight", "com.apple.systemuiserver" },
    prefixes: &["com.raycast."],
};

static PRECOMPOSED_BATCHED: PatternSet = PatternSet {
    exact: phf::phf_set! { "net.whatsapp.whatsapp", "notion.id" },
    prefixes: &[],
};

static STEP_BY_STEP: PatternSet = PatternSet {
    exact: phf::phf_set! {
        "com.apple.loginwindow",
        "com.apple.securityagent",
        "com.alfredapp.alfred",
        "com.apple.launchpad",
        "notion.id",
        "com.apple.safari",
        "com.apple.safaritechnologypreview",
    },
    prefixes: &["com.apple.safari.webapp."],
};

static DISABLE_VIETNAMESE: PatternSet = PatternSet {
    exact: phf::phf_set! { "com.apple.apps.launcher", "com.apple.screencontinuity" },
    prefixes: &[],
};

const TERMINAL_KEYWORDS: &[&str] = &[
    "terminal",
    "xterm",
    "shell",
    "console",
    "vscode-terminal",
    "terminal.integrated",
    "xterm.js",
    "terminalview",
    "terminalpanel",
    "toolwindow terminal",
    "tool window: terminal",
    "terminal tool window",
    "command line",
    "pty",
    "tty",
];

/// Trimmed, lowercased identifier, or `None` when empty.
pub fn normalize(bundle_id: &str) -> Option<String> {
    let trimmed = bundle_id.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Whether an accessibility role/description names a terminal widget.
pub fn contains_terminal_keyword(value: &str) -> bool {
    let lower = value.to_lowercase();
    !lower.is_empty() && TERMINAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Dynamic pattern list from user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UserPatterns {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl UserPatterns {
    fn from_list<'a>(items: impl IntoIterator<Item = &'a String>) -> Self {
        let mut out = UserPatterns::default();
        for item in items {
            let Some(norm) = normalize(item) else { continue };
            match norm.strip_suffix('*') {
                Some(prefix) => out.prefixes.push(prefix.to_string()),
                None => out.exact.push(norm),
            }
        }
        out
    }

    fn matches(&self, normalized: &str) -> bool {
        self.exact.iter().any(|e| e == normalized)
            || self.prefixes.iter().any(|p| normalized.starts_with(p.as_str()))
    }
}

/// Application rules with the user's overrides applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppRules {
    extra_step_by_step: UserPatterns,
    terminal_speeds: BTreeMap<String, TerminalSpeed>,
}

impl AppRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let terminal_speeds = config
            .terminal_speed_overrides
            .iter()
            .filter_map(|(id, speed)| normalize(id).map(|n| (n, *speed)))
            .collect();
        Self {
            extra_step_by_step: UserPatterns::from_list(&config.step_by_step_apps),
            terminal_speeds,
        }
    }

    pub fn is_browser(&self, bundle_id: &str) -> bool {
        matches_static(&BROWSERS, bundle_id)
    }

    pub fn is_safari(&self, bundle_id: &str) -> bool {
        matches_static(&SAFARI, bundle_id)
    }

    pub fn contains_unicode_compound(&self, bundle_id: &str) -> bool {
        matches_static(&UNICODE_COMPOUND, bundle_id)
    }

    pub fn is_spotlight_like(&self, bundle_id: &str) -> bool {
        matches_static(&SPOTLIGHT_LIKE, bundle_id)
    }

    pub fn needs_precomposed_batched(&self, bundle_id: &str) -> bool {
        matches_static(&PRECOMPOSED_BATCHED, bundle_id)
    }

    pub fn needs_step_by_step(&self, bundle_id: &str) -> bool {
        let Some(norm) = normalize(bundle_id) else {
            return false;
        };
        STEP_BY_STEP.matches(&norm) || self.extra_step_by_step.matches(&norm)
    }

    pub fn should_disable_vietnamese(&self, bundle_id: &str) -> bool {
        matches_static(&DISABLE_VIETNAMESE, bundle_id)
    }

    pub fn needs_nice_space(&self, bundle_id: &str) -> bool {
        matches_static(&NICE_SPACE, bundle_id)
    }

    /// Speed class of a terminal emulator, `None` for non-terminals.
    /// User overrides take precedence and mark the app as a terminal.
    pub fn terminal_speed(&self, bundle_id: &str) -> Option<TerminalSpeed> {
        let norm = normalize(bundle_id)?;
        if let Some(speed) = self.terminal_speeds.get(&norm) {
            return Some(*speed);
        }
        if FAST_TERMINALS.matches(&norm) {
            Some(TerminalSpeed::Fast)
        } else if MEDIUM_TERMINALS.matches(&norm) {
            Some(TerminalSpeed::Medium)
        } else {
            None
        }
    }

    pub fn is_terminal(&self, bundle_id: &str) -> bool {
        self.terminal_speed(bundle_id).is_some()
    }

    pub fn is_vscode_family(&self, bundle_id: &str) -> bool {
        normalize(bundle_id).is_some_and(|n| VSCODE_FAMILY.contains(n.as_str()))
    }

    pub fn is_jetbrains(&self, bundle_id: &str) -> bool {
        normalize(bundle_id)
            .is_some_and(|n| n.starts_with("com.jetbrains.") || n == "com.google.android.studio")
    }

    pub fn is_ide(&self, bundle_id: &str) -> bool {
        self.is_vscode_family(bundle_id) || self.is_jetbrains(bundle_id)
    }

    pub fn characteristics(&self, bundle_id: &str) -> ApplicationCharacteristics {
        ApplicationCharacteristics {
            is_spotlight_like: self.is_spotlight_like(bundle_id),
            needs_precomposed_batched: self.needs_precomposed_batched(bundle_id),
            needs_step_by_step: self.needs_step_by_step(bundle_id),
            contains_unicode_compound: self.contains_unicode_compound(bundle_id),
            is_browser: self.is_browser(bundle_id),
            is_terminal: self.is_terminal(bundle_id),
            is_jetbrains_ide: self.is_jetbrains(bundle_id),
            is_safari: self.is_safari(bundle_id),
        }
    }
}

fn matches_static(set: &PatternSet, bundle_id: &str) -> bool {
    normalize(bundle_id).is_some_and(|n| set.matches(&n))
}
