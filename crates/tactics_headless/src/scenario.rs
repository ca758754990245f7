//! Scenario loading and configuration.
//!
//! A scenario describes a board, what stands on it and an ordered list of
//! actions to play out. Occupants are referred to by name; board positions
//! are `(row, column)` pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tactics_core::board::BoardShape;
use tactics_core::config::GridConfig;
use tactics_core::error::GridError;
use tactics_core::math::Fixed;
use tactics_core::occupant::{OccupantId, OccupantSpec, TraversalRule};
use tactics_core::simulation::Simulation;
use tactics_core::tile::{GridCoord, TileId, TileKind};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A position is not on the board.
    #[error("No tile at ({row}, {column})")]
    OffBoard {
        /// Row.
        row: i32,
        /// Column.
        column: i32,
    },
    /// Two occupants share a name.
    #[error("Duplicate occupant name: {0}")]
    DuplicateName(String),
    /// An action names an occupant that was never placed.
    #[error("Unknown occupant: {0}")]
    UnknownName(String),
    /// The grid rejected a setup step.
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
}

/// `(row, column)` position on the board.
pub type Position = (i32, i32);

/// Kind of a placed occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementKind {
    /// Pushable unit with health.
    Unit {
        /// Starting health.
        health: u32,
    },
    /// Indestructible wall.
    Wall,
    /// Destructible hazard.
    Hazard {
        /// Starting health.
        health: u32,
    },
    /// Collectible.
    Pickup,
}

/// An occupant placed at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupantPlacement {
    /// Name used by actions.
    pub name: String,
    /// What to spawn.
    pub kind: PlacementKind,
    /// Where to spawn it.
    pub at: Position,
    /// Whether it can cross removed tiles.
    #[serde(default)]
    pub hovering: bool,
}

impl OccupantPlacement {
    fn spec(&self) -> OccupantSpec {
        let spec = match self.kind {
            PlacementKind::Unit { health } => OccupantSpec::unit(health),
            PlacementKind::Wall => OccupantSpec::wall(),
            PlacementKind::Hazard { health } => OccupantSpec::hazard(health),
            PlacementKind::Pickup => OccupantSpec::pickup(),
        };
        if self.hovering {
            spec.with_traversal(TraversalRule::Hovering)
        } else {
            spec
        }
    }
}

/// A tile whose kind or cost differs from a standard tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileOverride {
    /// Tile position.
    pub at: Position,
    /// New kind.
    pub kind: TileKind,
    /// Movement cost, when not 1.
    #[serde(default)]
    pub cost: Option<u32>,
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Knock the occupant at `target` away from `source`.
    Push {
        /// Pushed tile.
        target: Position,
        /// Tile the push comes from.
        source: Position,
        /// Tiles to travel.
        distance: u32,
        /// Kill the occupant when the push ends.
        #[serde(default)]
        lethal: bool,
    },
    /// Knock several occupants away from one source as a batch.
    BatchPush {
        /// Pushed tiles.
        targets: Vec<Position>,
        /// Tile the push comes from.
        source: Position,
        /// Tiles to travel.
        distance: u32,
        /// Kill the occupants when their pushes end.
        #[serde(default)]
        lethal: bool,
    },
    /// Walk a named occupant to a tile along the cheapest route.
    Move {
        /// Occupant name.
        occupant: String,
        /// Goal tile.
        to: Position,
    },
    /// Damage a named occupant.
    Damage {
        /// Occupant name.
        occupant: String,
        /// Damage amount.
        amount: u32,
    },
    /// Advance a fixed number of ticks.
    Wait(u64),
    /// Advance until nothing is moving.
    Settle,
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Board outline.
    pub board: BoardShape,
    /// Motion tuning.
    #[serde(default)]
    pub config: GridConfig,
    /// Special tiles.
    #[serde(default)]
    pub tiles: Vec<TileOverride>,
    /// Teleporter pairs.
    #[serde(default)]
    pub teleporters: Vec<(Position, Position)>,
    /// Starting occupants.
    #[serde(default)]
    pub occupants: Vec<OccupantPlacement>,
    /// Scripted steps, in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::chain_reaction()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Three units in a lane, pushed into each other.
    #[must_use]
    pub fn chain_reaction() -> Self {
        let unit = |name: &str, column: i32| OccupantPlacement {
            name: name.to_string(),
            kind: PlacementKind::Unit { health: 10 },
            at: (1, column),
            hovering: false,
        };
        Self {
            name: "Chain Reaction".to_string(),
            description: "A push that ripples down a line of units".to_string(),
            board: BoardShape::Rectangle {
                width: 8,
                height: 3,
            },
            config: GridConfig::default(),
            tiles: vec![TileOverride {
                at: (1, 7),
                kind: TileKind::Wall,
                cost: None,
            }],
            teleporters: Vec::new(),
            occupants: vec![unit("a", 2), unit("b", 3), unit("c", 4)],
            actions: vec![
                Action::Push {
                    target: (1, 2),
                    source: (1, 1),
                    distance: 3,
                    lethal: false,
                },
                Action::Settle,
            ],
        }
    }

    /// Check that every position is on the board and every name resolves,
    /// without running anything.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.config.displacement.speed <= Fixed::ZERO || self.config.movement.speed <= Fixed::ZERO
        {
            return Err(GridError::ConfigParse("speeds must be positive".into()).into());
        }

        let coords: BTreeSet<GridCoord> = self.board.coords().into_iter().collect();
        let on_board = |(row, column): Position| {
            if coords.contains(&GridCoord::new(row, column)) {
                Ok(())
            } else {
                Err(ScenarioError::OffBoard { row, column })
            }
        };

        for tile in &self.tiles {
            on_board(tile.at)?;
        }
        for &(a, b) in &self.teleporters {
            on_board(a)?;
            on_board(b)?;
        }

        let mut names = BTreeSet::new();
        for placement in &self.occupants {
            on_board(placement.at)?;
            if !names.insert(placement.name.as_str()) {
                return Err(ScenarioError::DuplicateName(placement.name.clone()));
            }
        }

        for action in &self.actions {
            match action {
                Action::Push { target, source, .. } => {
                    on_board(*target)?;
                    on_board(*source)?;
                }
                Action::BatchPush {
                    targets, source, ..
                } => {
                    for &target in targets {
                        on_board(target)?;
                    }
                    on_board(*source)?;
                }
                Action::Move { occupant, to } => {
                    if !names.contains(occupant.as_str()) {
                        return Err(ScenarioError::UnknownName(occupant.clone()));
                    }
                    on_board(*to)?;
                }
                Action::Damage { occupant, .. } => {
                    if !names.contains(occupant.as_str()) {
                        return Err(ScenarioError::UnknownName(occupant.clone()));
                    }
                }
                Action::Wait(_) | Action::Settle => {}
            }
        }
        Ok(())
    }

    /// Build the starting simulation and the name table.
    pub fn build(&self) -> Result<(Simulation, BTreeMap<String, OccupantId>), ScenarioError> {
        self.validate()?;
        let mut sim = Simulation::from_shape(self.board, self.config.clone())?;

        for tile in &self.tiles {
            let id = tile_at(&sim, tile.at)?;
            sim.world_mut().set_tile_kind(id, tile.kind)?;
            if let Some(cost) = tile.cost {
                sim.world_mut().set_movement_cost(id, cost)?;
            }
        }
        for &(a, b) in &self.teleporters {
            let (a, b) = (tile_at(&sim, a)?, tile_at(&sim, b)?);
            sim.world_mut().link_teleporters(a, b)?;
        }

        let mut names = BTreeMap::new();
        for placement in &self.occupants {
            let tile = tile_at(&sim, placement.at)?;
            let id = sim.spawn(&placement.spec(), tile)?;
            names.insert(placement.name.clone(), id);
        }

        debug!(
            scenario = %self.name,
            tiles = sim.graph().tile_count(),
            occupants = names.len(),
            "Built scenario"
        );
        Ok((sim, names))
    }
}

/// Tile at a scenario position.
pub fn tile_at(sim: &Simulation, (row, column): Position) -> Result<TileId, ScenarioError> {
    sim.graph()
        .tile_at(GridCoord::new(row, column))
        .ok_or(ScenarioError::OffBoard { row, column })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        Scenario(
            name: "Sample",
            board: Hexagon(radius: 2),
            tiles: [
                (at: (0, 1), kind: Hazard(entry_damage: 3)),
                (at: (1, 0), kind: Standard, cost: Some(3)),
            ],
            teleporters: [((0, -2), (0, 2))],
            occupants: [
                (name: "hero", kind: Unit(health: 12), at: (0, 0)),
                (name: "crate", kind: Pickup, at: (-1, 0)),
            ],
            actions: [
                Push(target: (0, 0), source: (0, -1), distance: 2),
                Wait(4),
                Move(occupant: "hero", to: (-1, 0)),
                Settle,
            ],
        )
    "#;

    #[test]
    fn test_parse_and_build_sample() {
        let scenario = Scenario::from_ron_str(SAMPLE).unwrap();
        assert_eq!(scenario.actions.len(), 4);
        assert_eq!(scenario.config, GridConfig::default());

        let (sim, names) = scenario.build().unwrap();
        assert_eq!(names.len(), 2);
        let hero = names["hero"];
        assert_eq!(sim.world().tile_of(hero), Some(tile_at(&sim, (0, 0)).unwrap()));
        let teleporter = tile_at(&sim, (0, -2)).unwrap();
        assert_eq!(
            sim.graph().tile(teleporter).unwrap().kind(),
            TileKind::Teleport
        );
    }

    #[test]
    fn test_validate_rejects_off_board_and_unknown_names() {
        let mut scenario = Scenario::chain_reaction();
        scenario.actions.push(Action::Damage {
            occupant: "nobody".into(),
            amount: 1,
        });
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownName(name)) if name == "nobody"
        ));

        let mut scenario = Scenario::chain_reaction();
        scenario.occupants[0].at = (9, 9);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::OffBoard { row: 9, column: 9 })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut scenario = Scenario::chain_reaction();
        scenario.occupants[1].name = "a".into();
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Scenario::load("/nonexistent/scenario.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
