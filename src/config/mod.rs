//! Configuration module for the mishearing engine.
//!
//! Provides `AppConfig` (top-level settings), `TriggerConfig` /
//! `ReplayConfig` for the two tunable subsystems, `AppPaths` for
//! cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, ReplayConfig, TriggerConfig, MIN_CHECK_INTERVAL_MS};
