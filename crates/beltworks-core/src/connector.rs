//! Connectors: single-item relays between two neighbouring cells.
//!
//! A connector pulls from the entity in its front cell and pushes into the
//! entity in its back cell, holding at most one item in between. The front
//! target is cached and only rediscovered when the connector or one of its
//! neighbours is placed, removed or rotated; the back cell is looked up on
//! every push.

use crate::catalog::Catalogs;
use crate::entity::{Entity, EntityHeader, EntityKind, ItemSink, ItemSource};
use crate::grid::GridPosition;
use crate::item::{Item, ItemRef};

/// Access to the supply and delivery side of neighbouring cells.
///
/// Implemented by the chunk over its entity collections so a connector can
/// move items without knowing the concrete entity type on either side.
pub trait Neighborhood {
    fn source_at(&mut self, cell: GridPosition) -> Option<&mut dyn ItemSource>;

    fn sink_at(&mut self, cell: GridPosition) -> Option<&mut dyn ItemSink>;
}

/// The cached front-cell occupant a connector pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorTarget {
    pub position: GridPosition,
    pub kind: EntityKind,
}

impl ConnectorTarget {
    /// Whether a connector may pull from an entity of this kind.
    pub fn supports(kind: EntityKind) -> bool {
        matches!(
            kind,
            EntityKind::Machine | EntityKind::Miner | EntityKind::Belt | EntityKind::StorageBox
        )
    }
}

/// What a connector moved during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorTickResult {
    /// The item pulled in, and the cell it came from.
    pub pulled: Option<(GridPosition, ItemRef)>,
    /// The item pushed out, and the cell it went to.
    pub pushed: Option<(GridPosition, ItemRef)>,
}

#[derive(Debug, PartialEq)]
pub struct Connector {
    header: EntityHeader,
    held: Option<Item>,
    target: Option<ConnectorTarget>,
    connection_checks: u64,
}

impl Connector {
    pub fn new(header: EntityHeader) -> Self {
        Self {
            header,
            held: None,
            target: None,
            connection_checks: 0,
        }
    }

    pub fn held_item(&self) -> Option<ItemRef> {
        self.held.as_ref().map(Item::to_ref)
    }

    pub fn target(&self) -> Option<ConnectorTarget> {
        self.target
    }

    /// Number of connection checks run on this connector since placement.
    pub fn connection_checks(&self) -> u64 {
        self.connection_checks
    }

    /// Pull from the front target when empty, then push the held item to
    /// the back cell. Both halves may happen in the same tick. A failed pull
    /// or push leaves everything in place for the next tick.
    pub fn tick<N: Neighborhood + ?Sized>(
        &mut self,
        world: &mut N,
        catalogs: &Catalogs,
    ) -> ConnectorTickResult {
        let mut result = ConnectorTickResult::default();

        if self.held.is_none()
            && let Some(target) = self.target
            && let Some(source) = world.source_at(target.position)
            && source.can_supply()
            && let Some(item) = source.try_take()
        {
            result.pulled = Some((target.position, item.to_ref()));
            self.held = Some(item);
        }

        if let Some(item) = self.held.take() {
            let back = self.header.back_position();
            let item_ref = item.to_ref();
            let outcome = match world.sink_at(back) {
                Some(sink) if sink.can_accept(&item, catalogs) => sink.try_give(item, catalogs),
                _ => Err(item),
            };
            match outcome {
                Ok(()) => result.pushed = Some((back, item_ref)),
                Err(item) => self.held = Some(item),
            }
        }

        result
    }

    /// Record the outcome of a connection check. Returns whether the target
    /// changed.
    pub(crate) fn retarget(&mut self, target: Option<ConnectorTarget>) -> bool {
        self.connection_checks += 1;
        let changed = self.target != target;
        self.target = target;
        changed
    }

    pub(crate) fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    pub(crate) fn take_held(&mut self) -> Option<Item> {
        self.held.take()
    }
}

impl Entity for Connector {
    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Connector
    }
}
