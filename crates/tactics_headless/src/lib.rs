//! Headless scenario runner for the hex tactics grid.
//!
//! Loads a RON scenario, plays its scripted actions against a
//! [`tactics_core::simulation::Simulation`] and reports:
//!
//! - **Board snapshots**: ASCII rendering before and after
//! - **Event log**: every [`tactics_core::events::GridEvent`], as text or JSON lines
//! - **State hash**: for comparing runs across machines
//!
//! # Example
//!
//! ```bash
//! # Run a scenario
//! cargo run -p tactics_headless -- run scenarios/chain_reaction.ron
//!
//! # Check a scenario without running it
//! cargo run -p tactics_headless -- validate scenarios/chain_reaction.ron
//! ```

pub mod ascii;
pub mod runner;
pub mod scenario;

pub use ascii::{render_board, AsciiConfig};
pub use runner::{HeadlessConfig, LoggedEvent, RunReport, ScenarioRunner};
pub use scenario::{Action, Scenario, ScenarioError};
