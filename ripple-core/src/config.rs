//! Engine Configuration
//!
//! The engine is single-threaded: every thread owns one engine instance, and
//! configuration applies to the engine of the thread that installs it.
//!
//! All types here are `serde`-deserializable, so a host can keep the engine's
//! settings next to its own:
//!
//! ```rust,ignore
//! let config: ripple_core::Config = serde_json::from_str(r#"{
//!     "guard": { "write_in_effect": "discard" },
//!     "diagnostics": "warn"
//! }"#)?;
//! config.install();
//! ```

use serde::{Deserialize, Serialize};

use crate::guard::Mode;
use crate::reactive::Runtime;

/// What happens to a cell write attempted while a guarded mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// The write proceeds (and is reported).
    Allow,

    /// The write is dropped (and reported).
    Discard,
}

/// Per-mode write policy for the guard rail.
///
/// Creating or forking a cell always proceeds, and subscribing is always
/// replaced with a no-op; only the write policy is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardPolicy {
    /// Writes inside an explicitly marked tracked read.
    pub write_in_tracked_read: WritePolicy,

    /// Writes inside a derived cell's getter.
    pub write_in_memoized_read: WritePolicy,

    /// Writes inside an effect body.
    pub write_in_effect: WritePolicy,
}

impl GuardPolicy {
    /// Get the write policy for a mode.
    pub fn write_policy(&self, mode: Mode) -> WritePolicy {
        match mode {
            Mode::Untracked => WritePolicy::Allow,
            Mode::TrackedRead => self.write_in_tracked_read,
            Mode::MemoizedRead => self.write_in_memoized_read,
            Mode::Effect => self.write_in_effect,
        }
    }
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            write_in_tracked_read: WritePolicy::Allow,
            write_in_memoized_read: WritePolicy::Discard,
            write_in_effect: WritePolicy::Allow,
        }
    }
}

/// Which diagnostic sink [`Config::install`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsLevel {
    /// Discard diagnostics.
    Off,

    /// Emit diagnostics as `tracing` warnings.
    Warn,
}

impl Default for DiagnosticsLevel {
    /// `Warn` in debug builds or with the `diagnostics` feature, `Off` otherwise.
    fn default() -> Self {
        if cfg!(any(debug_assertions, feature = "diagnostics")) {
            Self::Warn
        } else {
            Self::Off
        }
    }
}

/// Configuration for the current thread's engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Guard-rail write policy.
    pub guard: GuardPolicy,

    /// Diagnostic sink selection.
    pub diagnostics: DiagnosticsLevel,
}

impl Config {
    /// Apply this configuration to the current thread's engine.
    ///
    /// This replaces the diagnostic sink with the one selected by
    /// `diagnostics`; install a custom sink afterwards with
    /// [`set_diagnostic_sink`](crate::guard::set_diagnostic_sink).
    pub fn install(self) {
        Runtime::with(|rt| rt.install_config(self));
    }
}

/// Get the configuration of the current thread's engine.
pub fn current() -> Config {
    Runtime::with(|rt| rt.config())
}
