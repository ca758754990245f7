//! ASCII board renderer.
//!
//! Draws a board row by row with north at the top. Odd rows are indented
//! by one column so the hex offset reads correctly in a terminal.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tactics_core::occupant::{Occupant, OccupantKind};
use tactics_core::simulation::Simulation;
use tactics_core::tile::GridCoord;

/// ASCII rendering configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Color occupants by remaining health (ANSI).
    pub use_color: bool,
    /// Append occupant counts below the board.
    pub show_legend: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            use_color: false,
            show_legend: true,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const GRAY: &str = "\x1b[90m";
}

fn health_color(occupant: &Occupant) -> &'static str {
    let Some(health) = occupant.health() else {
        return colors::GRAY;
    };
    // Thirds of max health, compared without division.
    let scaled = health.current.saturating_mul(3);
    if scaled > health.max.saturating_mul(2) {
        colors::GREEN
    } else if scaled > health.max {
        colors::YELLOW
    } else {
        colors::RED
    }
}

/// Render the board as text.
pub fn render_board(sim: &Simulation, config: &AsciiConfig) -> String {
    let graph = sim.graph();
    let world = sim.world();
    let mut output = String::new();

    let (mut rows, mut columns) = (None::<(i32, i32)>, None::<(i32, i32)>);
    for (_, tile) in graph.iter() {
        let c = tile.coord();
        rows = Some(rows.map_or((c.row, c.row), |(lo, hi)| (lo.min(c.row), hi.max(c.row))));
        columns = Some(columns.map_or((c.column, c.column), |(lo, hi)| {
            (lo.min(c.column), hi.max(c.column))
        }));
    }
    let (Some((bottom, top)), Some((left, right))) = (rows, columns) else {
        return "(empty board)\n".to_string();
    };

    for row in (bottom..=top).rev() {
        if row.rem_euclid(2) == 1 {
            output.push(' ');
        }
        for column in left..=right {
            let coord = GridCoord::new(row, column);
            let Some(tile) = graph.tile_at(coord).and_then(|id| graph.tile(id)) else {
                output.push_str("  ");
                continue;
            };
            match tile.occupant().and_then(|id| world.occupant(id)) {
                Some(occupant) if config.use_color => {
                    let _ = write!(
                        output,
                        "{}{}{} ",
                        health_color(occupant),
                        occupant.kind().glyph(),
                        colors::RESET
                    );
                }
                Some(occupant) => {
                    output.push(occupant.kind().glyph());
                    output.push(' ');
                }
                None => {
                    output.push(tile.kind().glyph());
                    output.push(' ');
                }
            }
        }
        let trimmed = output.trim_end_matches(' ').len();
        output.truncate(trimmed);
        output.push('\n');
    }

    if config.show_legend {
        let mut counts: BTreeMap<char, usize> = BTreeMap::new();
        for (_, occupant) in world.occupants().filter(|(_, o)| o.tile().is_some()) {
            *counts.entry(occupant.kind().glyph()).or_insert(0) += 1;
        }
        let legend: Vec<String> = [
            OccupantKind::Unit,
            OccupantKind::Wall,
            OccupantKind::Hazard,
            OccupantKind::Pickup,
        ]
        .iter()
        .filter_map(|kind| {
            counts
                .get(&kind.glyph())
                .map(|n| format!("{}={kind:?} x{n}", kind.glyph()))
        })
        .collect();
        if !legend.is_empty() {
            let _ = writeln!(output, "{}", legend.join("  "));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::board::BoardShape;
    use tactics_core::config::GridConfig;
    use tactics_core::occupant::OccupantSpec;

    #[test]
    fn test_render_rectangle_with_unit() {
        let mut sim = Simulation::from_shape(
            BoardShape::Rectangle {
                width: 3,
                height: 2,
            },
            GridConfig::default(),
        )
        .unwrap();
        let tile = sim.graph().tile_at(GridCoord::new(0, 1)).unwrap();
        sim.spawn(&OccupantSpec::unit(5), tile).unwrap();

        let text = render_board(&sim, &AsciiConfig::default());
        assert_eq!(text, " . . .\n. U .\nU=Unit x1\n");
    }

    #[test]
    fn test_render_empty_board() {
        let sim = Simulation::new(
            tactics_core::graph::TileGraph::new(),
            GridConfig::default(),
        );
        assert_eq!(
            render_board(&sim, &AsciiConfig::default()),
            "(empty board)\n"
        );
    }
}
