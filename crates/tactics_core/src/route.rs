//! Route validation and segmentation into straight runs.

use tracing::warn;

use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::graph::TileGraph;
use crate::tile::TileId;

/// Facing toward the next route tile and the index of the last tile of the
/// straight segment starting there.
///
/// With `current_index == None` the mover stands on `current_tile` before
/// `route[0]`; otherwise it stands on `route[current_index]`. Consecutive
/// hops sharing a spatial direction are merged. A Teleport hop is never
/// merged with anything.
pub fn next_facing(
    graph: &TileGraph,
    current_tile: TileId,
    route: &[TileId],
    current_index: Option<usize>,
) -> Result<(Direction, usize)> {
    let next = current_index.map_or(0, |i| i + 1);
    let Some(&target) = route.get(next) else {
        return Err(GridError::InvalidRoute(format!(
            "no route tile after index {current_index:?}"
        )));
    };

    let facing = graph.direction_between(current_tile, target)?;
    if !facing.is_spatial() {
        return Ok((facing, next));
    }

    let mut last = next;
    while let Some(&after) = route.get(last + 1) {
        match graph.direction_between(route[last], after) {
            Ok(dir) if dir == facing => last += 1,
            _ => break,
        }
    }
    Ok((facing, last))
}

/// Check that `route` is non-empty and every hop, starting from `start`, is
/// a linked edge.
pub fn validate_route(graph: &TileGraph, start: TileId, route: &[TileId]) -> Result<()> {
    if route.is_empty() {
        warn!(?start, "Rejected route: empty");
        return Err(GridError::InvalidRoute("route is empty".into()));
    }
    let mut previous = start;
    for (index, &tile) in route.iter().enumerate() {
        if !graph.contains(tile) {
            warn!(?tile, index, "Rejected route: unknown tile");
            return Err(GridError::UnknownTile(tile));
        }
        if graph.direction_between(previous, tile).is_err() {
            warn!(?previous, ?tile, index, "Rejected route: hop not adjacent");
            return Err(GridError::InvalidRoute(format!(
                "hop {index} is not adjacent to the previous tile"
            )));
        }
        previous = tile;
    }
    Ok(())
}

/// Split a whole route into `(facing, last index)` segments.
pub fn segments(
    graph: &TileGraph,
    start: TileId,
    route: &[TileId],
) -> Result<Vec<(Direction, usize)>> {
    validate_route(graph, start, route)?;
    let mut out = Vec::new();
    let mut current = start;
    let mut index = None;
    while index.map_or(0, |i| i + 1) < route.len() {
        let (facing, last) = next_facing(graph, current, route, index)?;
        out.push((facing, last));
        current = route[last];
        index = Some(last);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::board::BoardShape;
    use crate::tile::GridCoord;

    fn board() -> TileGraph {
        TileGraph::build(BoardShape::Rectangle {
            width: 5,
            height: 3,
        })
        .unwrap()
    }

    fn at(graph: &TileGraph, row: i32, column: i32) -> TileId {
        graph.tile_at(GridCoord::new(row, column)).unwrap()
    }

    #[test]
    fn test_straight_line_is_one_segment() {
        let graph = board();
        let start = at(&graph, 0, 0);
        let route = [at(&graph, 0, 1), at(&graph, 0, 2), at(&graph, 0, 3)];

        assert_eq!(
            next_facing(&graph, start, &route, None),
            Ok((Direction::East, 2))
        );
    }

    #[test]
    fn test_turn_splits_segment() {
        let graph = board();
        let start = at(&graph, 0, 0);
        // East, East, then north-east onto the odd row.
        let route = [at(&graph, 0, 1), at(&graph, 0, 2), at(&graph, 1, 2)];

        let segs = segments(&graph, start, &route).unwrap();
        assert_eq!(segs, vec![(Direction::East, 1), (Direction::NorthEast, 2)]);
    }

    #[test]
    fn test_teleport_hop_never_merged() {
        let mut graph = board();
        let a = at(&graph, 0, 1);
        let b = at(&graph, 0, 2);
        graph.set_neighbor(a, Direction::Teleport, Some(at(&graph, 2, 4))).unwrap();
        // Remove the spatial link so the teleport slot is the only edge.
        graph.set_neighbor(a, Direction::East, None).unwrap();
        let start = at(&graph, 0, 0);
        let route = [a, at(&graph, 2, 4), at(&graph, 2, 3)];

        let segs = segments(&graph, start, &route).unwrap();
        assert_eq!(
            segs,
            vec![
                (Direction::East, 0),
                (Direction::Teleport, 1),
                (Direction::West, 2)
            ]
        );
        assert!(graph.neighbor(b, Direction::West).is_none());
    }

    #[test]
    fn test_validate_route_rejects_gaps() {
        let graph = board();
        let start = at(&graph, 0, 0);
        assert!(matches!(
            validate_route(&graph, start, &[]),
            Err(GridError::InvalidRoute(_))
        ));
        assert!(matches!(
            validate_route(&graph, start, &[at(&graph, 0, 2)]),
            Err(GridError::InvalidRoute(_))
        ));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn warnings_during(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_adjacency_lookups_stay_quiet() {
        let graph = board();
        let start = at(&graph, 0, 0);
        let route = [at(&graph, 0, 1), at(&graph, 0, 2), at(&graph, 1, 2)];

        let logged = warnings_during(|| {
            assert!(graph.direction_between(start, at(&graph, 0, 3)).is_err());
            assert_eq!(segments(&graph, start, &route).unwrap().len(), 2);
        });
        assert!(logged.is_empty(), "unexpected warnings: {logged}");

        let logged = warnings_during(|| {
            assert!(validate_route(&graph, start, &[at(&graph, 0, 3)]).is_err());
        });
        assert!(logged.contains("hop not adjacent"));
    }

    #[test]
    fn test_next_facing_past_end() {
        let graph = board();
        let start = at(&graph, 0, 0);
        let route = [at(&graph, 0, 1)];
        assert!(next_facing(&graph, start, &route, Some(0)).is_err());
    }
}
