//! Route and range queries over the tile graph.
//!
//! Searches reuse one pooled [`PathCostNode`] per tile. Only nodes touched by
//! the previous search are reset when a new one starts. All costs are
//! integers and the open set breaks ties by insertion order, so results are
//! deterministic.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use slotmap::SecondaryMap;
use tracing::{trace, warn};

use crate::error::{GridError, Result};
use crate::graph::TileGraph;
use crate::occupant::OccupantId;
use crate::tile::{TileId, TileKind};
use crate::world::World;

/// Parent of a node, with the parent's costs captured when the link was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    /// Parent tile.
    pub tile: TileId,
    /// Parent's cost from the start.
    pub g_cost: u32,
    /// Parent's heuristic.
    pub h_cost: u32,
}

impl ParentLink {
    /// Parent's total estimated cost.
    #[must_use]
    pub const fn f_cost(&self) -> u32 {
        self.g_cost.saturating_add(self.h_cost)
    }
}

/// Search bookkeeping for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCostNode {
    tile: TileId,
    kind: TileKind,
    g_cost: u32,
    h_cost: u32,
    visited: bool,
    parent: Option<ParentLink>,
    touched: bool,
}

/// Sort key: f, then h, then parentless first, then parent f, then parent h.
type Priority = (u32, u32, Option<(u32, u32)>);

impl PathCostNode {
    /// Fresh node for `tile`.
    #[must_use]
    pub fn new(tile: TileId, kind: TileKind) -> Self {
        Self {
            tile,
            kind,
            g_cost: 0,
            h_cost: 0,
            visited: false,
            parent: None,
            touched: false,
        }
    }

    /// Tile this node belongs to.
    #[must_use]
    pub const fn tile(&self) -> TileId {
        self.tile
    }

    /// Tile category captured when the node was built or last reset.
    #[must_use]
    pub const fn kind(&self) -> TileKind {
        self.kind
    }

    /// Cost from the start.
    #[must_use]
    pub const fn g_cost(&self) -> u32 {
        self.g_cost
    }

    /// Heuristic estimate to the goal.
    #[must_use]
    pub const fn h_cost(&self) -> u32 {
        self.h_cost
    }

    /// `g + h`.
    #[must_use]
    pub const fn f_cost(&self) -> u32 {
        self.g_cost.saturating_add(self.h_cost)
    }

    /// Whether the node has been expanded.
    #[must_use]
    pub const fn visited(&self) -> bool {
        self.visited
    }

    /// Parent link, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<ParentLink> {
        self.parent
    }

    /// Set costs.
    pub fn set_costs(&mut self, g_cost: u32, h_cost: u32) {
        self.g_cost = g_cost;
        self.h_cost = h_cost;
    }

    /// Link to `parent`, snapshotting its current costs.
    pub fn set_parent(&mut self, parent: &PathCostNode) {
        self.parent = Some(ParentLink {
            tile: parent.tile,
            g_cost: parent.g_cost,
            h_cost: parent.h_cost,
        });
    }

    /// Clear parent, costs and visited flag.
    pub fn reset(&mut self, kind: TileKind) {
        self.kind = kind;
        self.g_cost = 0;
        self.h_cost = 0;
        self.visited = false;
        self.parent = None;
        self.touched = false;
    }

    fn priority(&self) -> Priority {
        (
            self.f_cost(),
            self.h_cost,
            self.parent.map(|p| (p.f_cost(), p.h_cost)),
        )
    }

    /// Search order between two nodes.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.priority().cmp(&other.priority())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenEntry {
    priority: Priority,
    seq: u64,
    g_cost: u32,
    tile: TileId,
}

/// Reusable search state.
#[derive(Debug, Default)]
pub struct Pathfinder {
    nodes: SecondaryMap<TileId, PathCostNode>,
    touched: Vec<TileId>,
    seq: u64,
}

impl Pathfinder {
    /// Empty pool. Nodes are created the first time a tile is searched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pooled node for `tile`, if it was ever searched.
    #[must_use]
    pub fn node(&self, tile: TileId) -> Option<&PathCostNode> {
        self.nodes.get(tile)
    }

    /// Number of nodes touched by the last search.
    #[must_use]
    pub fn touched_count(&self) -> usize {
        self.touched.len()
    }

    fn begin_search(&mut self, graph: &TileGraph) {
        for tile in self.touched.drain(..) {
            if let (Some(node), Some(t)) = (self.nodes.get_mut(tile), graph.tile(tile)) {
                node.reset(t.kind());
            }
        }
        self.seq = 0;
    }

    fn touch(&mut self, tile: TileId, kind: TileKind) -> Option<&mut PathCostNode> {
        if !self.nodes.contains_key(tile) {
            self.nodes.insert(tile, PathCostNode::new(tile, kind));
        }
        let node = self.nodes.get_mut(tile)?;
        if !node.touched {
            node.touched = true;
            self.touched.push(tile);
        }
        Some(node)
    }

    fn push(&mut self, open: &mut BinaryHeap<Reverse<OpenEntry>>, node: &PathCostNode) {
        self.seq += 1;
        open.push(Reverse(OpenEntry {
            priority: node.priority(),
            seq: self.seq,
            g_cost: node.g_cost,
            tile: node.tile,
        }));
    }

    /// Best-first search shared by range and route queries.
    ///
    /// Stops when `goal` is expanded. Returns the expanded tiles in order.
    fn search(
        &mut self,
        world: &World,
        start: TileId,
        goal: Option<TileId>,
        budget: u32,
        mover: OccupantId,
    ) -> Vec<TileId> {
        let graph = world.graph();
        self.begin_search(graph);
        let mut expanded = Vec::new();
        let Some(start_tile) = graph.tile(start) else {
            return expanded;
        };

        let heuristic = |tile: TileId| -> u32 {
            goal.and_then(|g| graph.hex_distance(tile, g)).unwrap_or(0)
        };

        let mut open = BinaryHeap::new();
        let Some(node) = self.touch(start, start_tile.kind()) else {
            return expanded;
        };
        node.set_costs(0, heuristic(start));
        let snapshot = node.clone();
        self.push(&mut open, &snapshot);

        while let Some(Reverse(entry)) = open.pop() {
            let Some(current) = self.nodes.get_mut(entry.tile) else {
                continue;
            };
            if current.visited || current.g_cost != entry.g_cost {
                continue;
            }
            current.visited = true;
            let current = current.clone();
            expanded.push(current.tile);
            if Some(current.tile) == goal {
                break;
            }

            for (_, next) in graph.edges(current.tile, true) {
                if next == start || !world.can_enter(next, mover) {
                    continue;
                }
                let Some(next_tile) = graph.tile(next) else {
                    continue;
                };
                let g = current.g_cost.saturating_add(next_tile.movement_cost());
                if g > budget {
                    continue;
                }
                let h = heuristic(next);
                let Some(node) = self.touch(next, next_tile.kind()) else {
                    continue;
                };
                if node.visited {
                    continue;
                }
                let undiscovered = node.parent.is_none();
                if undiscovered || g < node.g_cost {
                    node.set_costs(g, h);
                    node.set_parent(&current);
                    let snapshot = node.clone();
                    self.push(&mut open, &snapshot);
                }
            }
        }

        trace!(?start, ?goal, expanded = expanded.len(), "Search finished");
        expanded
    }

    /// Tiles `mover` can reach from `start` within `budget` movement cost,
    /// in ascending cost order, start excluded. Teleport edges are followed.
    pub fn reachable_tiles(
        &mut self,
        world: &World,
        start: TileId,
        budget: u32,
        mover: OccupantId,
    ) -> Vec<(TileId, u32)> {
        self.search(world, start, None, budget, mover)
            .into_iter()
            .filter(|&tile| tile != start)
            .filter_map(|tile| self.nodes.get(tile).map(|n| (tile, n.g_cost)))
            .collect()
    }

    /// Cheapest route from `start` to `goal`, start excluded.
    ///
    /// The hex-distance heuristic ignores teleporters, so a route through
    /// one may not be the cheapest.
    pub fn find_route(
        &mut self,
        world: &World,
        start: TileId,
        goal: TileId,
        mover: OccupantId,
    ) -> Result<Vec<TileId>> {
        let graph = world.graph();
        graph.try_tile(start)?;
        graph.try_tile(goal)?;
        if start == goal {
            return Ok(Vec::new());
        }

        let expanded = self.search(world, start, Some(goal), u32::MAX, mover);
        if expanded.last() != Some(&goal) {
            warn!(?start, ?goal, "No route");
            return Err(GridError::NoRoute {
                from: start,
                to: goal,
            });
        }

        let mut route = Vec::new();
        let mut cursor = goal;
        while cursor != start {
            route.push(cursor);
            let Some(parent) = self.nodes.get(cursor).and_then(PathCostNode::parent) else {
                return Err(GridError::NoRoute {
                    from: start,
                    to: goal,
                });
            };
            cursor = parent.tile;
        }
        route.reverse();
        Ok(route)
    }
}

/// Tiles within `range` spatial steps of `start`, ignoring occupancy and
/// cost. Removed tiles are neither returned nor crossed. Start excluded.
#[must_use]
pub fn tiles_in_range(graph: &TileGraph, start: TileId, range: u32) -> Vec<TileId> {
    let mut seen = SecondaryMap::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    if !graph.contains(start) {
        return out;
    }
    seen.insert(start, ());
    queue.push_back((start, 0_u32));

    while let Some((tile, depth)) = queue.pop_front() {
        if depth == range {
            continue;
        }
        for (_, next) in graph.edges(tile, false) {
            if seen.contains_key(next) {
                continue;
            }
            seen.insert(next, ());
            if graph
                .tile(next)
                .is_some_and(|t| t.kind() == TileKind::Removed)
            {
                continue;
            }
            out.push(next);
            queue.push_back((next, depth + 1));
        }
    }
    out
}

/// Hex distance between two tiles, `None` if either is unknown.
#[must_use]
pub fn hex_distance(graph: &TileGraph, a: TileId, b: TileId) -> Option<u32> {
    graph.hex_distance(a, b)
}
