//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

/// Smallest accepted probabilistic-check period.
pub const MIN_CHECK_INTERVAL_MS: u64 = 1_000;

/// Parameters of the probabilistic replay trigger.
///
/// Mutable at runtime with last-write-wins semantics: the scheduler reads
/// the latest value on every tick, and an interval change restarts the
/// probabilistic loop with a fresh period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Period of the probabilistic check loop in milliseconds.
    ///
    /// Values below [`MIN_CHECK_INTERVAL_MS`] are raised to the minimum.
    pub check_interval_ms: u64,
    /// Chance, per check, that a replay fires.  Clamped to `[0.0, 1.0]`.
    pub trigger_probability: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 10_000,
            trigger_probability: 0.05,
        }
    }
}

impl TriggerConfig {
    /// Return a copy with both fields forced into their valid ranges.
    ///
    /// A non-finite probability (TOML happily parses `nan`/`inf`) falls back
    /// to the default rather than clamping — `NaN.clamp()` stays NaN, and a
    /// NaN probability would make every roll comparison succeed.
    pub fn sanitized(self) -> Self {
        let trigger_probability = if self.trigger_probability.is_finite() {
            self.trigger_probability.clamp(0.0, 1.0)
        } else {
            Self::default().trigger_probability
        };
        Self {
            check_interval_ms: self.check_interval_ms.max(MIN_CHECK_INTERVAL_MS),
            trigger_probability,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplayConfig
// ---------------------------------------------------------------------------

/// Parameters of fragment selection and the replay processing chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Shortest replayed fragment in seconds.
    pub min_secs: f32,
    /// Longest replayed fragment in seconds.
    pub max_secs: f32,
    /// Segments captured within this many milliseconds of "now" are
    /// ineligible for selection, so a replay is always of *past* audio.
    pub exclude_recent_ms: u64,
    /// Fixed attenuation applied to every replay.
    pub replay_gain: f32,
    /// Lower bound of the random low-pass cutoff in Hz.
    pub cutoff_min_hz: f32,
    /// Upper bound of the random low-pass cutoff in Hz.
    pub cutoff_max_hz: f32,
    /// Smallest random pan magnitude (sign is drawn separately).
    pub pan_min: f32,
    /// Largest random pan magnitude.
    pub pan_max: f32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            min_secs: 2.0,
            max_secs: 5.0,
            exclude_recent_ms: 4_000,
            replay_gain: 0.9,
            cutoff_min_hz: 3_000.0,
            cutoff_max_hz: 4_000.0,
            pan_min: 0.2,
            pan_max: 0.8,
        }
    }
}

impl ReplayConfig {
    /// Return a copy with every randomization range usable.
    ///
    /// The file is hand-editable, so inverted bounds (`min > max`) and
    /// non-finite values must never reach the random draws — sampling an
    /// empty range panics and would unwind a scheduler task.  Non-finite
    /// fields fall back to their defaults, inverted pairs are swapped, and
    /// each value is clamped to its sensible domain.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();

        let (min_secs, max_secs) = ordered_pair(
            finite_or(self.min_secs, d.min_secs).max(0.0),
            finite_or(self.max_secs, d.max_secs).max(0.0),
        );
        let (cutoff_min_hz, cutoff_max_hz) = ordered_pair(
            finite_or(self.cutoff_min_hz, d.cutoff_min_hz).max(1.0),
            finite_or(self.cutoff_max_hz, d.cutoff_max_hz).max(1.0),
        );
        let (pan_min, pan_max) = ordered_pair(
            finite_or(self.pan_min, d.pan_min).clamp(0.0, 1.0),
            finite_or(self.pan_max, d.pan_max).clamp(0.0, 1.0),
        );

        Self {
            min_secs,
            max_secs,
            exclude_recent_ms: self.exclude_recent_ms,
            replay_gain: finite_or(self.replay_gain, d.replay_gain).clamp(0.0, 1.0),
            cutoff_min_hz,
            cutoff_max_hz,
            pan_min,
            pan_max,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn ordered_pair(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use mishear::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probabilistic trigger parameters.
    pub trigger: TriggerConfig,
    /// Fragment selection / processing-chain parameters.
    pub replay: ReplayConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ---- TriggerConfig::sanitized ------------------------------------------

    #[test]
    fn sanitized_raises_interval_to_minimum() {
        let cfg = TriggerConfig {
            check_interval_ms: 10,
            trigger_probability: 0.5,
        };
        assert_eq!(cfg.sanitized().check_interval_ms, MIN_CHECK_INTERVAL_MS);
    }

    #[test]
    fn sanitized_clamps_probability_into_unit_interval() {
        let high = TriggerConfig {
            check_interval_ms: 5_000,
            trigger_probability: 3.0,
        };
        let low = TriggerConfig {
            check_interval_ms: 5_000,
            trigger_probability: -1.0,
        };
        assert_eq!(high.sanitized().trigger_probability, 1.0);
        assert_eq!(low.sanitized().trigger_probability, 0.0);
    }

    #[test]
    fn sanitized_leaves_valid_values_alone() {
        let cfg = TriggerConfig::default();
        assert_eq!(cfg.sanitized(), cfg);
    }

    #[test]
    fn sanitized_replaces_non_finite_probability_with_default() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let cfg = TriggerConfig {
                check_interval_ms: 5_000,
                trigger_probability: bad,
            };
            assert_eq!(
                cfg.sanitized().trigger_probability,
                TriggerConfig::default().trigger_probability
            );
        }
    }

    // ---- ReplayConfig::sanitized -------------------------------------------

    #[test]
    fn replay_sanitized_swaps_inverted_ranges() {
        let cfg = ReplayConfig {
            min_secs: 5.0,
            max_secs: 2.0,
            cutoff_min_hz: 4_000.0,
            cutoff_max_hz: 3_000.0,
            pan_min: 0.8,
            pan_max: 0.2,
            ..ReplayConfig::default()
        };
        let fixed = cfg.sanitized();

        assert!(fixed.min_secs <= fixed.max_secs);
        assert_eq!((fixed.min_secs, fixed.max_secs), (2.0, 5.0));
        assert_eq!((fixed.cutoff_min_hz, fixed.cutoff_max_hz), (3_000.0, 4_000.0));
        assert_eq!((fixed.pan_min, fixed.pan_max), (0.2, 0.8));
    }

    #[test]
    fn replay_sanitized_replaces_non_finite_fields_with_defaults() {
        let cfg = ReplayConfig {
            min_secs: f32::NAN,
            max_secs: f32::INFINITY,
            replay_gain: f32::NAN,
            cutoff_min_hz: f32::NEG_INFINITY,
            ..ReplayConfig::default()
        };
        let fixed = cfg.sanitized();
        let d = ReplayConfig::default();

        assert_eq!(fixed.min_secs, d.min_secs);
        assert_eq!(fixed.max_secs, d.max_secs);
        assert_eq!(fixed.replay_gain, d.replay_gain);
        assert_eq!(fixed.cutoff_min_hz, d.cutoff_min_hz);
    }

    #[test]
    fn replay_sanitized_clamps_out_of_domain_values() {
        let cfg = ReplayConfig {
            min_secs: -1.0,
            pan_min: -0.5,
            pan_max: 2.0,
            replay_gain: 3.0,
            ..ReplayConfig::default()
        };
        let fixed = cfg.sanitized();

        assert_eq!(fixed.min_secs, 0.0);
        assert_eq!(fixed.pan_min, 0.0);
        assert_eq!(fixed.pan_max, 1.0);
        assert_eq!(fixed.replay_gain, 1.0);
    }

    #[test]
    fn replay_sanitized_leaves_valid_values_alone() {
        let cfg = ReplayConfig::default();
        assert_eq!(cfg.sanitized(), cfg);
    }

    // ---- Defaults ----------------------------------------------------------

    #[test]
    fn default_trigger_values() {
        let cfg = TriggerConfig::default();
        assert_eq!(cfg.check_interval_ms, 10_000);
        assert!((cfg.trigger_probability - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn default_replay_values() {
        let cfg = ReplayConfig::default();
        assert_eq!(cfg.min_secs, 2.0);
        assert_eq!(cfg.max_secs, 5.0);
        assert_eq!(cfg.exclude_recent_ms, 4_000);
        assert_eq!(cfg.replay_gain, 0.9);
        assert_eq!(cfg.cutoff_min_hz, 3_000.0);
        assert_eq!(cfg.cutoff_max_hz, 4_000.0);
        assert_eq!(cfg.pan_min, 0.2);
        assert_eq!(cfg.pan_max, 0.8);
    }

    // ---- Persistence -------------------------------------------------------

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original, loaded);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.trigger.check_interval_ms = 2_500;
        cfg.trigger.trigger_probability = 0.25;
        cfg.replay.min_secs = 1.0;
        cfg.replay.replay_gain = 0.5;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }
}
