//! Shared grid state.
//!
//! [`World`] owns the tile graph, the occupant roster, the outward event
//! buffer and the feedback port. The motion engines borrow it mutably one
//! step at a time; occupancy rules live in [`crate::occupancy`].

use std::fmt;

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::events::GridEvent;
use crate::feedback::{FeedbackPort, NullFeedback};
use crate::graph::TileGraph;
use crate::occupant::{Occupant, OccupantId, OccupantSpec};
use crate::tile::{TileId, TileKind};

/// Tile graph, occupants and pending events.
pub struct World {
    pub(crate) graph: TileGraph,
    pub(crate) occupants: SlotMap<OccupantId, Occupant>,
    pub(crate) events: Vec<GridEvent>,
    pub(crate) feedback: Box<dyn FeedbackPort>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("tiles", &self.graph.tile_count())
            .field("occupants", &self.occupants.len())
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Wrap a graph with no occupants and a no-op feedback port.
    #[must_use]
    pub fn new(graph: TileGraph) -> Self {
        Self::with_feedback(graph, Box::new(NullFeedback))
    }

    /// Wrap a graph with a custom feedback port.
    #[must_use]
    pub fn with_feedback(graph: TileGraph, feedback: Box<dyn FeedbackPort>) -> Self {
        Self {
            graph,
            occupants: SlotMap::with_key(),
            events: Vec::new(),
            feedback,
        }
    }

    /// The tile graph.
    #[must_use]
    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    /// Look up an occupant.
    #[must_use]
    pub fn occupant(&self, id: OccupantId) -> Option<&Occupant> {
        self.occupants.get(id)
    }

    pub(crate) fn try_occupant(&self, id: OccupantId) -> Result<&Occupant> {
        self.occupants.get(id).ok_or(GridError::UnknownOccupant(id))
    }

    pub(crate) fn occupant_mut(&mut self, id: OccupantId) -> Result<&mut Occupant> {
        self.occupants
            .get_mut(id)
            .ok_or(GridError::UnknownOccupant(id))
    }

    /// Occupants in handle order.
    pub fn occupants(&self) -> impl Iterator<Item = (OccupantId, &Occupant)> + '_ {
        self.occupants.iter()
    }

    /// Number of occupants in the roster, dead ones included until reaped.
    #[must_use]
    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    /// Tile an occupant currently stands on.
    #[must_use]
    pub fn tile_of(&self, occupant: OccupantId) -> Option<TileId> {
        self.occupants
            .get(occupant)
            .and_then(Occupant::tile)
            .filter(|&tile| self.graph.occupant(tile) == Some(occupant))
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events recorded since the last drain.
    #[must_use]
    pub fn pending_events(&self) -> &[GridEvent] {
        &self.events
    }

    pub(crate) fn emit(&mut self, event: GridEvent) {
        self.events.push(event);
    }

    /// Add an occupant and bind it to `tile`.
    pub fn spawn(&mut self, spec: &OccupantSpec, tile: TileId) -> Result<OccupantId> {
        if !self.graph.contains(tile) {
            warn!(?tile, "Rejected spawn: unknown tile");
            return Err(GridError::UnknownTile(tile));
        }
        if !self.can_occupy(tile) {
            warn!(?tile, "Rejected spawn: tile occupied");
            return Err(GridError::TileOccupied(tile));
        }
        let id = self.occupants.insert(Occupant::from_spec(spec));
        if let Err(err) = self.occupy(tile, id) {
            self.occupants.remove(id);
            return Err(err);
        }
        debug!(occupant = ?id, ?tile, kind = ?spec.kind, "Spawned occupant");
        Ok(id)
    }

    /// Unbind an occupant from its tile and drop it from the roster.
    pub fn despawn(&mut self, occupant: OccupantId) -> Result<()> {
        if !self.occupants.contains_key(occupant) {
            warn!(?occupant, "Rejected despawn: unknown occupant");
            return Err(GridError::UnknownOccupant(occupant));
        }
        if let Some(tile) = self.tile_of(occupant) {
            self.unoccupy(tile)?;
        }
        self.occupants.remove(occupant);
        debug!(?occupant, "Despawned occupant");
        Ok(())
    }

    /// Write an edge. See [`TileGraph::set_neighbor`].
    pub fn set_neighbor(
        &mut self,
        tile: TileId,
        direction: Direction,
        neighbor: Option<TileId>,
    ) -> Result<()> {
        self.graph.set_neighbor(tile, direction, neighbor)
    }

    /// Change a tile's category.
    pub fn set_tile_kind(&mut self, tile: TileId, kind: TileKind) -> Result<()> {
        self.graph.set_kind(tile, kind)
    }

    /// Change a tile's movement cost.
    pub fn set_movement_cost(&mut self, tile: TileId, cost: u32) -> Result<()> {
        self.graph.set_movement_cost(tile, cost)
    }

    /// Pair two teleporter tiles.
    pub fn link_teleporters(&mut self, a: TileId, b: TileId) -> Result<()> {
        self.graph.link_teleporters(a, b)
    }

    /// Append a row of tiles to the north edge.
    pub fn add_row_north(&mut self) -> Result<Vec<TileId>> {
        self.graph.add_row_north()
    }

    /// Append a column of tiles to the east edge.
    pub fn add_column_east(&mut self) -> Result<Vec<TileId>> {
        self.graph.add_column_east()
    }

    /// Remove a tile, unbinding its occupant first.
    ///
    /// The occupant stays in the roster without a tile.
    pub fn remove_tile(&mut self, tile: TileId) -> Result<Option<OccupantId>> {
        let evicted = if self.has_occupant(tile) {
            Some(self.unoccupy(tile)?)
        } else {
            None
        };
        self.graph.remove_tile(tile)?;
        Ok(evicted)
    }

    /// Remove every tile in `row`. Returns the evicted occupants.
    pub fn remove_row(&mut self, row: i32) -> Result<Vec<OccupantId>> {
        let tiles: Vec<_> = self
            .graph
            .iter()
            .filter(|(_, t)| t.coord().row == row)
            .map(|(id, _)| id)
            .collect();
        self.remove_tiles(tiles)
    }

    /// Remove every tile in `column`. Returns the evicted occupants.
    pub fn remove_column(&mut self, column: i32) -> Result<Vec<OccupantId>> {
        let tiles: Vec<_> = self
            .graph
            .iter()
            .filter(|(_, t)| t.coord().column == column)
            .map(|(id, _)| id)
            .collect();
        self.remove_tiles(tiles)
    }

    fn remove_tiles(&mut self, tiles: Vec<TileId>) -> Result<Vec<OccupantId>> {
        let mut evicted = Vec::new();
        for tile in tiles {
            evicted.extend(self.remove_tile(tile)?);
        }
        Ok(evicted)
    }

    pub(crate) fn feedback(&mut self) -> &mut dyn FeedbackPort {
        self.feedback.as_mut()
    }
}
