//! Scenario runner.
//!
//! Plays a [`Scenario`]'s actions against a fresh simulation and collects
//! the board before and after plus every event emitted on the way.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;
use tracing::{info, warn};

use tactics_core::events::{GridEvent, TickEvents};
use tactics_core::occupant::OccupantId;
use tactics_core::simulation::Simulation;

use crate::ascii::{render_board, AsciiConfig};
use crate::scenario::{tile_at, Action, Scenario, ScenarioError};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Tick cap for each `Settle` and for the final settle.
    pub max_settle_ticks: u64,
    /// Board rendering options.
    pub ascii: AsciiConfig,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            max_settle_ticks: 10_000,
            ascii: AsciiConfig::default(),
        }
    }
}

/// An event stamped with the tick that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedEvent {
    /// Tick number returned alongside the event.
    pub tick: u64,
    /// The event.
    pub event: GridEvent,
}

/// An action the grid refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedAction {
    /// Position in the action list.
    pub index: usize,
    /// Why it was refused.
    pub reason: String,
}

/// Outcome of running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Board before the first action.
    pub before: String,
    /// Board after everything settled.
    pub after: String,
    /// Ticks advanced.
    pub ticks: u64,
    /// Final state hash.
    pub state_hash: u64,
    /// Every event, in order.
    pub events: Vec<LoggedEvent>,
    /// Actions the grid refused.
    pub rejected: Vec<RejectedAction>,
}

impl RunReport {
    /// Write the report as text.
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "== {} ==", self.scenario)?;
        writeln!(out, "-- before --")?;
        write!(out, "{}", self.before)?;
        writeln!(out, "-- events --")?;
        for logged in &self.events {
            writeln!(out, "[{:>4}] {:?}", logged.tick, logged.event)?;
        }
        for rejected in &self.rejected {
            writeln!(out, "[skip] action {}: {}", rejected.index, rejected.reason)?;
        }
        writeln!(out, "-- after ({} ticks) --", self.ticks)?;
        write!(out, "{}", self.after)?;
        writeln!(out, "state hash: {:#018x}", self.state_hash)
    }

    /// Write the event log as JSON lines.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for logged in &self.events {
            serde_json::to_writer(&mut *out, logged)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Runs scenarios headlessly.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    config: HeadlessConfig,
}

impl ScenarioRunner {
    /// Create a runner with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner with custom configuration.
    #[must_use]
    pub fn with_config(config: HeadlessConfig) -> Self {
        Self { config }
    }

    /// Play every action, then settle.
    pub fn run(&self, scenario: &Scenario) -> Result<RunReport, ScenarioError> {
        let (mut sim, names) = scenario.build()?;
        let before = render_board(&sim, &self.config.ascii);
        let mut events = Vec::new();
        let mut rejected = Vec::new();

        info!(scenario = %scenario.name, actions = scenario.actions.len(), "Running scenario");

        for (index, action) in scenario.actions.iter().enumerate() {
            if let Err(reason) = self.apply(&mut sim, &names, action, &mut events) {
                warn!(index, %reason, "Action rejected");
                rejected.push(RejectedAction { index, reason });
            }
        }
        self.settle(&mut sim, &mut events);

        Ok(RunReport {
            scenario: scenario.name.clone(),
            before,
            after: render_board(&sim, &self.config.ascii),
            ticks: sim.current_tick(),
            state_hash: sim.state_hash(),
            events,
            rejected,
        })
    }

    fn apply(
        &self,
        sim: &mut Simulation,
        names: &BTreeMap<String, OccupantId>,
        action: &Action,
        events: &mut Vec<LoggedEvent>,
    ) -> Result<(), String> {
        let name = |n: &str| {
            names
                .get(n)
                .copied()
                .ok_or_else(|| format!("unknown occupant {n}"))
        };
        match action {
            Action::Push {
                target,
                source,
                distance,
                lethal,
            } => {
                let target = tile_at(sim, *target).map_err(|e| e.to_string())?;
                let source = tile_at(sim, *source).map_err(|e| e.to_string())?;
                sim.request_displacement(target, source, *distance, *lethal)
                    .map_err(|e| e.to_string())?;
            }
            Action::BatchPush {
                targets,
                source,
                distance,
                lethal,
            } => {
                let tiles = targets
                    .iter()
                    .map(|&t| tile_at(sim, t))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?;
                let source = tile_at(sim, *source).map_err(|e| e.to_string())?;
                let (_, results) = sim.request_batch(&tiles, source, *distance, *lethal, None);
                let refused: Vec<String> = results
                    .into_iter()
                    .filter_map(Result::err)
                    .map(|e| e.to_string())
                    .collect();
                if !refused.is_empty() {
                    return Err(refused.join("; "));
                }
            }
            Action::Move { occupant, to } => {
                let id = name(occupant.as_str())?;
                let goal = tile_at(sim, *to).map_err(|e| e.to_string())?;
                sim.move_to(id, goal).map_err(|e| e.to_string())?;
            }
            Action::Damage { occupant, amount } => {
                let id = name(occupant.as_str())?;
                sim.apply_damage(id, *amount).map_err(|e| e.to_string())?;
            }
            Action::Wait(ticks) => {
                for _ in 0..*ticks {
                    record(events, sim.tick());
                }
            }
            Action::Settle => self.settle(sim, events),
        }
        Ok(())
    }

    fn settle(&self, sim: &mut Simulation, events: &mut Vec<LoggedEvent>) {
        for tick in sim.run_until_idle(self.config.max_settle_ticks) {
            record(events, tick);
        }
        if !sim.is_idle() {
            warn!(
                cap = self.config.max_settle_ticks,
                "Simulation still moving at tick cap"
            );
        }
    }
}

fn record(events: &mut Vec<LoggedEvent>, tick: TickEvents) {
    events.extend(tick.events.into_iter().map(|event| LoggedEvent {
        tick: tick.tick,
        event,
    }));
}
