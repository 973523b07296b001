//! Shared entity plumbing: identity and placement, entity kinds, and the two
//! capability traits that let connectors move items without knowing what
//! concrete entity sits in a neighbouring cell.

use crate::catalog::Catalogs;
use crate::grid::{GridPosition, Rotation};
use crate::id::EntityId;
use crate::item::Item;
use serde::{Deserialize, Serialize};

/// What kind of entity occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Machine,
    Miner,
    Belt,
    Connector,
    StorageBox,
}

/// Identity and placement common to every entity.
///
/// The id is fixed at construction. Position and rotation only change
/// through the owning chunk, which re-runs connection discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHeader {
    id: EntityId,
    pub(crate) position: GridPosition,
    pub(crate) rotation: Rotation,
}

impl EntityHeader {
    /// A header with a freshly allocated id.
    pub fn new(position: GridPosition, rotation: Rotation) -> Self {
        Self {
            id: EntityId::next(),
            position,
            rotation,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn position(&self) -> GridPosition {
        self.position
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// The cell this entity faces.
    pub fn front_position(&self) -> GridPosition {
        self.position.step(self.rotation.facing())
    }

    /// The cell behind this entity.
    pub fn back_position(&self) -> GridPosition {
        self.position.step(self.rotation.facing().opposite())
    }
}

/// Common read access to every entity kind.
pub trait Entity {
    fn header(&self) -> &EntityHeader;

    fn kind(&self) -> EntityKind;

    fn id(&self) -> EntityId {
        self.header().id()
    }

    fn position(&self) -> GridPosition {
        self.header().position()
    }

    fn rotation(&self) -> Rotation {
        self.header().rotation()
    }
}

/// Something a connector can pull items from.
pub trait ItemSource {
    /// Whether [`try_take`](Self::try_take) would return an item now.
    fn can_supply(&self) -> bool;

    fn try_take(&mut self) -> Option<Item>;
}

/// Something a connector (or a player) can push items into.
pub trait ItemSink {
    fn can_accept(&self, item: &Item, catalogs: &Catalogs) -> bool;

    /// Hand `item` over. A refused item comes back in `Err`.
    fn try_give(&mut self, item: Item, catalogs: &Catalogs) -> Result<(), Item>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_front_and_back_follow_rotation() {
        let mut header = EntityHeader::new(GridPosition::new(5, 5), Rotation::None);
        assert_eq!(header.front_position(), GridPosition::new(5, 6));
        assert_eq!(header.back_position(), GridPosition::new(5, 4));

        header.rotation = Rotation::Cw90;
        assert_eq!(header.front_position(), GridPosition::new(6, 5));
        assert_eq!(header.back_position(), GridPosition::new(4, 5));
    }

    #[test]
    fn headers_get_distinct_ids() {
        let a = EntityHeader::new(GridPosition::new(0, 0), Rotation::None);
        let b = EntityHeader::new(GridPosition::new(0, 0), Rotation::None);
        assert_ne!(a.id(), b.id());
    }
}
