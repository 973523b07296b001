//! Read-only snapshots of chunk contents.
//!
//! Renderers and UI read the world through these owned copies, never through
//! references into a chunk, so nothing they hold can observe a tick halfway
//! through.

use crate::belt::{Belt, BeltItemView};
use crate::catalog::Catalogs;
use crate::connector::Connector;
use crate::entity::Entity;
use crate::fixed::Fixed64;
use crate::grid::{ChunkCoord, GridPosition, Rotation};
use crate::id::{EntityId, ItemTypeId, RecipeId};
use crate::item::{InventorySlot, ItemRef};
use crate::machine::{Machine, MachineKind};
use crate::storage::StorageBox;

// ---------------------------------------------------------------------------
// Slot snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotSnapshot {
    /// Locked type; `None` while the slot is empty.
    pub item_type: Option<ItemTypeId>,
    pub count: usize,
    /// Zero while the slot is empty.
    pub capacity: u32,
}

impl From<&InventorySlot> for SlotSnapshot {
    fn from(slot: &InventorySlot) -> Self {
        Self {
            item_type: slot.item_type(),
            count: slot.len(),
            capacity: slot.capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeltSnapshot {
    pub id: EntityId,
    pub position: GridPosition,
    pub rotation: Rotation,
    /// Head first.
    pub items: Vec<BeltItemView>,
    pub next: Option<GridPosition>,
    pub previous: Option<GridPosition>,
}

impl From<&Belt> for BeltSnapshot {
    fn from(belt: &Belt) -> Self {
        Self {
            id: belt.id(),
            position: belt.position(),
            rotation: belt.rotation(),
            items: belt.items_with_progress(),
            next: belt.next_belt(),
            previous: belt.previous_belt(),
        }
    }
}

/// A machine or miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSnapshot {
    pub id: EntityId,
    pub kind: MachineKind,
    pub position: GridPosition,
    pub rotation: Rotation,
    pub recipe: Option<RecipeId>,
    /// Cycle progress as a 0..1 fraction of the recipe duration.
    pub progress: Fixed64,
    pub enabled: bool,
    pub input: SlotSnapshot,
    pub output: SlotSnapshot,
    pub completed_recipes: u64,
}

impl MachineSnapshot {
    pub fn new(machine: &Machine, catalogs: &Catalogs) -> Self {
        Self {
            id: machine.id(),
            kind: machine.machine_kind(),
            position: machine.position(),
            rotation: machine.rotation(),
            recipe: machine.recipe(),
            progress: machine.progress_fraction(catalogs),
            enabled: machine.is_enabled(),
            input: machine.input().into(),
            output: machine.output().into(),
            completed_recipes: machine.completed_recipes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSnapshot {
    pub id: EntityId,
    pub position: GridPosition,
    pub rotation: Rotation,
    pub held: Option<ItemRef>,
    /// Cell the connector pulls from, if anything is there.
    pub target: Option<GridPosition>,
}

impl From<&Connector> for ConnectorSnapshot {
    fn from(connector: &Connector) -> Self {
        Self {
            id: connector.id(),
            position: connector.position(),
            rotation: connector.rotation(),
            held: connector.held_item(),
            target: connector.target().map(|t| t.position),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSnapshot {
    pub id: EntityId,
    pub position: GridPosition,
    pub rotation: Rotation,
    pub slots: Vec<SlotSnapshot>,
}

impl From<&StorageBox> for StorageSnapshot {
    fn from(storage: &StorageBox) -> Self {
        Self {
            id: storage.id(),
            position: storage.position(),
            rotation: storage.rotation(),
            slots: storage.slots().iter().map(SlotSnapshot::from).collect(),
        }
    }
}

impl StorageSnapshot {
    pub fn item_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.count).sum()
    }
}

// ---------------------------------------------------------------------------
// Chunk snapshot
// ---------------------------------------------------------------------------

/// Everything in one chunk, each collection in cell order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pub coord: ChunkCoord,
    pub machines: Vec<MachineSnapshot>,
    pub belts: Vec<BeltSnapshot>,
    pub connectors: Vec<ConnectorSnapshot>,
    pub storage: Vec<StorageSnapshot>,
}

impl ChunkSnapshot {
    pub fn entity_count(&self) -> usize {
        self.machines.len() + self.belts.len() + self.connectors.len() + self.storage.len()
    }
}
