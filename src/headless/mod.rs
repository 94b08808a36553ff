//! Headless mode for agentic testing
//!
//! Runs survival scenarios without any graphical output, suitable for
//! automated testing and balance analysis.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless scenario
//! cargo run --release -- --scenario scenario.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "player": { "position": [0, 0, 0], "abilities": ["Firebolt", "SecondWind"] },
//!   "mobs": [ { "kind": "Wolf", "position": [10, 0, 0] } ],
//!   "max_duration_secs": 60,
//!   "random_seed": 42,
//!   "script": [ { "at": 1.0, "action": { "TriggerAbility": { "slot": 0 } } } ]
//! }
//! ```
//!
//! Headless apps run at a fixed, deterministic 60 Hz virtual timestep: the
//! same config plus the same seed always produces the same combat log.

pub mod config;
pub mod runner;

pub use config::ScenarioConfig;
pub use runner::{build_scenario_app, run_headless_scenario, ScenarioResult};
