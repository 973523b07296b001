//! Chunks: the unit of ownership, ticking and dirtiness.
//!
//! A chunk owns every entity whose cell falls inside its
//! [`CHUNK_SIZE`](crate::grid::CHUNK_SIZE) square, in four cell-keyed
//! collections. A cell holds at most one entity across all four. Links
//! between entities (belt to belt, connector to target) are stored as cells
//! and resolved here on demand, so removing an entity can never leave a
//! dangling reference behind.
//!
//! Nothing in a chunk calls out to listeners. Changes are appended to an
//! outbox that the engine drains after the chunk is released.

use crate::belt::{Belt, BeltItemView, BeltParams};
use crate::catalog::Catalogs;
use crate::connector::{Connector, ConnectorTarget, Neighborhood};
use crate::entity::{Entity, EntityHeader, EntityKind, ItemSink, ItemSource};
use crate::event::Event;
use crate::fixed::Fixed64;
use crate::grid::{ChunkCoord, GridPosition, Rotation};
use crate::id::{EntityId, ItemTypeId, RecipeId};
use crate::item::{InventorySlot, Item};
use crate::machine::{Machine, RecipeSwap};
use crate::query::{
    BeltSnapshot, ChunkSnapshot, ConnectorSnapshot, MachineSnapshot, StorageSnapshot,
};
use crate::sim::StateHash;
use crate::storage::StorageBox;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an entity could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("cell {cell:?} is outside chunk {chunk:?}")]
    OutOfBounds { cell: GridPosition, chunk: ChunkCoord },
    #[error("cell {0:?} lies on the edge of the grid")]
    GridEdge(GridPosition),
    #[error("cell {cell:?} is already occupied by a {kind:?}")]
    Occupied { cell: GridPosition, kind: EntityKind },
    #[error("no extraction recipe produces {0:?}")]
    NoExtractionRecipe(ItemTypeId),
}

/// Why a command against a placed entity failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("no entity at {0:?}")]
    NoEntity(GridPosition),
    #[error("entity at {cell:?} is a {kind:?}, not a machine")]
    NotAMachine { cell: GridPosition, kind: EntityKind },
    #[error("unknown recipe {0:?}")]
    UnknownRecipe(RecipeId),
    #[error("miner at {0:?} can only run an extraction recipe")]
    MinerNeedsExtractionRecipe(GridPosition),
}

/// An entity taken out of a chunk together with everything it held.
#[derive(Debug, PartialEq)]
pub struct RemovedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: GridPosition,
    pub items: Vec<Item>,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    machines: BTreeMap<GridPosition, Machine>,
    belts: BTreeMap<GridPosition, Belt>,
    connectors: BTreeMap<GridPosition, Connector>,
    storage: BTreeMap<GridPosition, StorageBox>,
    /// Set by any change and by every processed tick; cleared by the clock
    /// when it picks the chunk up.
    dirty: bool,
    outbox: Vec<Event>,
    /// Adjacent chunks whose border with this one saw a placement or removal.
    changed_borders: BTreeSet<ChunkCoord>,
    belt_params: BeltParams,
    storage_slots: usize,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, belt_params: BeltParams, storage_slots: usize) -> Self {
        Self {
            coord,
            machines: BTreeMap::new(),
            belts: BTreeMap::new(),
            connectors: BTreeMap::new(),
            storage: BTreeMap::new(),
            dirty: false,
            outbox: Vec::new(),
            changed_borders: BTreeSet::new(),
            belt_params,
            storage_slots,
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    // -- Dirtiness and outbox ------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the dirty flag, returning its previous value.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Events raised since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Adjacent chunks whose shared border changed since the last call.
    /// Entities never link across chunks; this only tells observers which
    /// neighbours need redrawing.
    pub fn neighbors_that_changed(&mut self) -> Vec<ChunkCoord> {
        std::mem::take(&mut self.changed_borders).into_iter().collect()
    }

    // -- Lookup --------------------------------------------------------------

    /// Whether any entity occupies `cell`.
    pub fn is_occupied(&self, cell: GridPosition) -> bool {
        self.kind_at(cell).is_some()
    }

    /// Whether a new entity may be placed at `cell`.
    pub fn can_place_entity_at(&self, cell: GridPosition) -> bool {
        self.coord.contains(cell) && cell.is_interior() && !self.is_occupied(cell)
    }

    pub fn kind_at(&self, cell: GridPosition) -> Option<EntityKind> {
        if let Some(machine) = self.machines.get(&cell) {
            Some(machine.kind())
        } else if self.belts.contains_key(&cell) {
            Some(EntityKind::Belt)
        } else if self.connectors.contains_key(&cell) {
            Some(EntityKind::Connector)
        } else if self.storage.contains_key(&cell) {
            Some(EntityKind::StorageBox)
        } else {
            None
        }
    }

    pub fn entity_at(&self, cell: GridPosition) -> Option<&dyn Entity> {
        if let Some(machine) = self.machines.get(&cell) {
            Some(machine)
        } else if let Some(belt) = self.belts.get(&cell) {
            Some(belt)
        } else if let Some(connector) = self.connectors.get(&cell) {
            Some(connector)
        } else {
            self.storage.get(&cell).map(|storage| storage as &dyn Entity)
        }
    }

    /// Cell of the entity with this id.
    pub fn find(&self, id: EntityId) -> Option<GridPosition> {
        fn scan<E: Entity>(map: &BTreeMap<GridPosition, E>, id: EntityId) -> Option<GridPosition> {
            map.iter().find(|(_, e)| e.id() == id).map(|(&cell, _)| cell)
        }
        scan(&self.machines, id)
            .or_else(|| scan(&self.belts, id))
            .or_else(|| scan(&self.connectors, id))
            .or_else(|| scan(&self.storage, id))
    }

    pub fn machine_at(&self, cell: GridPosition) -> Option<&Machine> {
        self.machines.get(&cell)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn machine_mut(&mut self, cell: GridPosition) -> Option<&mut Machine> {
        self.machines.get_mut(&cell)
    }

    pub fn belt_at(&self, cell: GridPosition) -> Option<&Belt> {
        self.belts.get(&cell)
    }

    pub fn connector_at(&self, cell: GridPosition) -> Option<&Connector> {
        self.connectors.get(&cell)
    }

    pub fn storage_at(&self, cell: GridPosition) -> Option<&StorageBox> {
        self.storage.get(&cell)
    }

    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.values()
    }

    pub fn belts(&self) -> impl Iterator<Item = &Belt> {
        self.belts.values()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    pub fn storage_boxes(&self) -> impl Iterator<Item = &StorageBox> {
        self.storage.values()
    }

    pub fn entity_count(&self) -> usize {
        self.machines.len() + self.belts.len() + self.connectors.len() + self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Items on the belt at `cell`, head first.
    pub fn belt_items(&self, cell: GridPosition) -> Option<Vec<BeltItemView>> {
        self.belts.get(&cell).map(Belt::items_with_progress)
    }

    // -- Placement -----------------------------------------------------------

    fn admit(&self, cell: GridPosition) -> Result<(), PlacementError> {
        if !self.coord.contains(cell) {
            return Err(PlacementError::OutOfBounds {
                cell,
                chunk: self.coord,
            });
        }
        if !cell.is_interior() {
            return Err(PlacementError::GridEdge(cell));
        }
        if let Some(kind) = self.kind_at(cell) {
            return Err(PlacementError::Occupied { cell, kind });
        }
        Ok(())
    }

    fn placed(&mut self, id: EntityId, kind: EntityKind, cell: GridPosition) -> EntityId {
        debug!("placed {kind:?} {id:?} at {cell:?}");
        self.outbox.push(Event::EntityAdded {
            entity: id,
            kind,
            position: cell,
        });
        self.note_border(cell);
        self.dirty = true;
        self.refresh_around(cell);
        id
    }

    pub fn place_machine(
        &mut self,
        cell: GridPosition,
        rotation: Rotation,
        recipe: Option<RecipeId>,
    ) -> Result<EntityId, PlacementError> {
        self.admit(cell)?;
        let machine = Machine::assembler(EntityHeader::new(cell, rotation), recipe);
        let id = machine.id();
        self.machines.insert(cell, machine);
        Ok(self.placed(id, EntityKind::Machine, cell))
    }

    /// Place a miner running `recipe`, which must be an extraction recipe.
    pub fn place_miner(
        &mut self,
        cell: GridPosition,
        rotation: Rotation,
        recipe: RecipeId,
    ) -> Result<EntityId, PlacementError> {
        self.admit(cell)?;
        let miner = Machine::miner(EntityHeader::new(cell, rotation), recipe);
        let id = miner.id();
        self.machines.insert(cell, miner);
        Ok(self.placed(id, EntityKind::Miner, cell))
    }

    pub fn place_belt(&mut self, cell: GridPosition, rotation: Rotation) -> Result<EntityId, PlacementError> {
        self.admit(cell)?;
        let belt = Belt::new(EntityHeader::new(cell, rotation), self.belt_params);
        let id = belt.id();
        self.belts.insert(cell, belt);
        Ok(self.placed(id, EntityKind::Belt, cell))
    }

    pub fn place_connector(
        &mut self,
        cell: GridPosition,
        rotation: Rotation,
    ) -> Result<EntityId, PlacementError> {
        self.admit(cell)?;
        let connector = Connector::new(EntityHeader::new(cell, rotation));
        let id = connector.id();
        self.connectors.insert(cell, connector);
        Ok(self.placed(id, EntityKind::Connector, cell))
    }

    pub fn place_storage_box(
        &mut self,
        cell: GridPosition,
        rotation: Rotation,
    ) -> Result<EntityId, PlacementError> {
        self.admit(cell)?;
        let storage = StorageBox::new(EntityHeader::new(cell, rotation), self.storage_slots);
        let id = storage.id();
        self.storage.insert(cell, storage);
        Ok(self.placed(id, EntityKind::StorageBox, cell))
    }

    /// Take the entity at `cell` out of the chunk, with everything it held.
    pub fn remove(&mut self, cell: GridPosition) -> Option<RemovedEntity> {
        let (id, kind, items) = if let Some(mut machine) = self.machines.remove(&cell) {
            (machine.id(), machine.kind(), machine.drain_items())
        } else if let Some(mut belt) = self.belts.remove(&cell) {
            (belt.id(), EntityKind::Belt, belt.drain_items())
        } else if let Some(mut connector) = self.connectors.remove(&cell) {
            (
                connector.id(),
                EntityKind::Connector,
                connector.take_held().into_iter().collect(),
            )
        } else if let Some(mut storage) = self.storage.remove(&cell) {
            (storage.id(), EntityKind::StorageBox, storage.drain_items())
        } else {
            return None;
        };

        debug!("removed {kind:?} {id:?} at {cell:?}, returning {} items", items.len());
        self.outbox.push(Event::EntityRemoved {
            entity: id,
            kind,
            position: cell,
        });
        self.note_border(cell);
        self.dirty = true;
        self.refresh_around(cell);
        Some(RemovedEntity {
            id,
            kind,
            position: cell,
            items,
        })
    }

    fn note_border(&mut self, cell: GridPosition) {
        if !self.coord.is_border(cell) {
            return;
        }
        for neighbor in cell.neighbors_4() {
            if !self.coord.contains(neighbor) {
                self.changed_borders.insert(ChunkCoord::containing(neighbor));
            }
        }
    }

    // -- Rotation and connections -------------------------------------------

    /// Set the rotation of the entity at `cell`. Returns the previous
    /// rotation. The entity's connections are re-checked exactly once, then
    /// its neighbours'.
    pub fn rotate(&mut self, cell: GridPosition, rotation: Rotation) -> Result<Rotation, CommandError> {
        let header = if let Some(machine) = self.machines.get_mut(&cell) {
            machine.header_mut()
        } else if let Some(belt) = self.belts.get_mut(&cell) {
            belt.header_mut()
        } else if let Some(connector) = self.connectors.get_mut(&cell) {
            connector.header_mut()
        } else if let Some(storage) = self.storage.get_mut(&cell) {
            storage.header_mut()
        } else {
            return Err(CommandError::NoEntity(cell));
        };
        let previous = std::mem::replace(&mut header.rotation, rotation);
        let entity = header.id();

        if let Some(kind) = self.kind_at(cell) {
            debug!("rotated {kind:?} {entity:?} {previous:?} -> {rotation:?}");
            self.outbox.push(Event::EntityRotated {
                entity,
                kind,
                rotation,
            });
        }
        self.dirty = true;
        self.refresh_around(cell);
        Ok(previous)
    }

    fn refresh_around(&mut self, cell: GridPosition) {
        self.check_connections(cell);
        for neighbor in cell.neighbors_4() {
            self.check_connections(neighbor);
        }
    }

    /// Rediscover the links of the belt or connector at `cell`. Returns
    /// whether a link changed. Other entity kinds have no links.
    pub fn check_connections(&mut self, cell: GridPosition) -> bool {
        if let Some(belt) = self.belts.get(&cell) {
            let front = belt.header().front_position();
            let back = belt.header().back_position();
            let next = self.belts.contains_key(&front).then_some(front);
            let previous = self.belts.contains_key(&back).then_some(back);
            if let Some(belt) = self.belts.get_mut(&cell)
                && belt.relink(next, previous)
            {
                self.outbox.push(Event::BeltConnectionChanged {
                    belt: belt.id(),
                    next,
                    previous,
                });
                return true;
            }
            return false;
        }

        if let Some(connector) = self.connectors.get(&cell) {
            let front = connector.header().front_position();
            let target = self
                .kind_at(front)
                .filter(|&kind| ConnectorTarget::supports(kind))
                .map(|kind| ConnectorTarget {
                    position: front,
                    kind,
                });
            if let Some(connector) = self.connectors.get_mut(&cell)
                && connector.retarget(target)
            {
                self.outbox.push(Event::ConnectorConnectionChanged {
                    connector: connector.id(),
                    target: target.map(|t| t.position),
                });
                return true;
            }
        }
        false
    }

    // -- Machine commands ----------------------------------------------------

    fn command_target(&mut self, cell: GridPosition) -> Result<&mut Machine, CommandError> {
        if let Some(kind) = self.kind_at(cell)
            && !matches!(kind, EntityKind::Machine | EntityKind::Miner)
        {
            return Err(CommandError::NotAMachine { cell, kind });
        }
        self.machines.get_mut(&cell).ok_or(CommandError::NoEntity(cell))
    }

    /// Assign a recipe to the machine at `cell`. Returns `None` when the
    /// recipe was already assigned, otherwise the evacuated items.
    pub fn set_recipe(
        &mut self,
        cell: GridPosition,
        recipe: Option<RecipeId>,
        catalogs: &Catalogs,
    ) -> Result<Option<RecipeSwap>, CommandError> {
        let def = match recipe {
            Some(id) => Some(catalogs.recipes.get(id).ok_or(CommandError::UnknownRecipe(id))?),
            None => None,
        };
        let machine = self.command_target(cell)?;
        if machine.is_miner() && !def.is_some_and(|def| def.is_extraction()) {
            return Err(CommandError::MinerNeedsExtractionRecipe(cell));
        }
        let id = machine.id();
        let swap = machine.set_recipe(recipe);
        if let Some(swap) = &swap {
            self.outbox.push(Event::RecipeChanged {
                machine: id,
                previous: swap.previous,
                current: recipe,
            });
            self.dirty = true;
        }
        Ok(swap)
    }

    /// Returns whether the flag changed.
    pub fn set_enabled(&mut self, cell: GridPosition, enabled: bool) -> Result<bool, CommandError> {
        let machine = self.command_target(cell)?;
        let id = machine.id();
        let changed = machine.set_enabled(enabled);
        if changed {
            debug!("machine {id:?} enabled={enabled}");
            self.outbox.push(Event::EnabledChanged { machine: id, enabled });
            self.dirty = true;
        }
        Ok(changed)
    }

    // -- External hand-over --------------------------------------------------

    /// Deliver `item` into the entity at `cell`: a machine's input slot, a
    /// storage box, or the tail of a belt. A refused item comes back.
    #[must_use = "a rejected item is returned and must be kept somewhere"]
    pub fn give_item(&mut self, cell: GridPosition, item: Item, catalogs: &Catalogs) -> Result<(), Item> {
        let item_ref = item.to_ref();
        let event = if let Some(machine) = self.machines.get_mut(&cell) {
            machine.give_item(item, catalogs)?;
            None
        } else if let Some(belt) = self.belts.get_mut(&cell) {
            belt.accept_item(item)?;
            Some(Event::BeltItemAdded {
                belt: belt.id(),
                item: item_ref,
            })
        } else if let Some(storage) = self.storage.get_mut(&cell) {
            storage.give_item(item, catalogs)?;
            Some(Event::StorageItemAdded {
                storage: storage.id(),
                item: item_ref,
            })
        } else {
            return Err(item);
        };
        self.outbox.extend(event);
        self.dirty = true;
        Ok(())
    }

    /// Take one item out of the entity at `cell`: a machine's output slot,
    /// a storage box, the head of a belt (once near discharge), or whatever
    /// a connector holds.
    pub fn take_item(&mut self, cell: GridPosition) -> Option<Item> {
        let item = if let Some(machine) = self.machines.get_mut(&cell) {
            machine.take_item()
        } else if let Some(belt) = self.belts.get_mut(&cell) {
            let item = belt.take_item()?;
            self.outbox.push(Event::BeltItemRemoved {
                belt: belt.id(),
                item: item.to_ref(),
            });
            Some(item)
        } else if let Some(storage) = self.storage.get_mut(&cell) {
            let item = storage.take_item()?;
            self.outbox.push(Event::StorageItemRemoved {
                storage: storage.id(),
                item: item.to_ref(),
            });
            Some(item)
        } else {
            self.connectors.get_mut(&cell).and_then(Connector::take_held)
        }?;
        self.dirty = true;
        Some(item)
    }

    // -- Tick ----------------------------------------------------------------

    /// Advance everything in the chunk by `dt`: machines, then belts, then
    /// connectors, each in cell order. Always leaves the chunk dirty.
    pub fn process_tick(&mut self, dt: Fixed64, catalogs: &Catalogs) {
        self.tick_machines(dt, catalogs);
        self.tick_belts(dt);
        self.tick_connectors(catalogs);
        self.dirty = true;
    }

    fn tick_machines(&mut self, dt: Fixed64, catalogs: &Catalogs) {
        for machine in self.machines.values_mut() {
            let result = machine.tick(dt, catalogs);
            let id = machine.id();
            for item in result.consumed {
                self.outbox.push(Event::ItemConsumed { machine: id, item });
            }
            if let (Some(output), Some(recipe)) = (result.produced, machine.recipe()) {
                self.outbox.push(Event::RecipeCompleted {
                    machine: id,
                    recipe,
                    output,
                });
            }
        }
    }

    /// Readiness is read for every belt before any of them moves, and
    /// hand-offs land after all have moved, so transit time does not depend
    /// on which way a line faces. Each belt takes at most one hand-off per
    /// tick.
    fn tick_belts(&mut self, dt: Fixed64) {
        let mut claimed = BTreeSet::new();
        let plan: Vec<(GridPosition, Option<GridPosition>)> = self
            .belts
            .iter()
            .map(|(&cell, belt)| {
                let next = belt
                    .next_belt()
                    .filter(|n| self.belts.get(n).is_some_and(Belt::can_accept_item))
                    .filter(|&n| claimed.insert(n));
                (cell, next)
            })
            .collect();

        let mut handoffs = Vec::new();
        for (cell, next) in plan {
            let Some(belt) = self.belts.get_mut(&cell) else {
                continue;
            };
            if let Some(item) = belt.advance(dt, next.is_some()).handed_off
                && let Some(next) = next
            {
                handoffs.push((cell, belt.id(), next, item));
            }
        }

        for (cell, from, next, item) in handoffs {
            let item_ref = item.to_ref();
            let rejected = match self.belts.get_mut(&next) {
                Some(target) => match target.accept_item(item) {
                    Ok(()) => {
                        trace!("belt {from:?} handed {:?} to {:?}", item_ref.id, target.id());
                        self.outbox.push(Event::BeltItemRemoved {
                            belt: from,
                            item: item_ref,
                        });
                        self.outbox.push(Event::BeltItemAdded {
                            belt: target.id(),
                            item: item_ref,
                        });
                        None
                    }
                    Err(item) => Some(item),
                },
                None => Some(item),
            };
            if let Some(item) = rejected
                && let Some(belt) = self.belts.get_mut(&cell)
            {
                belt.restore_head(item);
            }
        }
    }

    fn tick_connectors(&mut self, catalogs: &Catalogs) {
        let Chunk {
            connectors,
            machines,
            belts,
            storage,
            outbox,
            ..
        } = self;
        let mut world = ChunkNeighborhood {
            machines,
            belts,
            storage,
        };

        for connector in connectors.values_mut() {
            let result = connector.tick(&mut world, catalogs);
            if let Some((cell, item)) = result.pulled {
                trace!("connector {:?} pulled {:?} from {cell:?}", connector.id(), item.id);
                if let Some(belt) = world.belts.get(&cell) {
                    outbox.push(Event::BeltItemRemoved {
                        belt: belt.id(),
                        item,
                    });
                } else if let Some(storage) = world.storage.get(&cell) {
                    outbox.push(Event::StorageItemRemoved {
                        storage: storage.id(),
                        item,
                    });
                }
            }
            if let Some((cell, item)) = result.pushed {
                trace!("connector {:?} pushed {:?} to {cell:?}", connector.id(), item.id);
                if let Some(belt) = world.belts.get(&cell) {
                    outbox.push(Event::BeltItemAdded {
                        belt: belt.id(),
                        item,
                    });
                } else if let Some(storage) = world.storage.get(&cell) {
                    outbox.push(Event::StorageItemAdded {
                        storage: storage.id(),
                        item,
                    });
                }
            }
        }
    }

    // -- Observation ---------------------------------------------------------

    pub fn snapshot(&self, catalogs: &Catalogs) -> ChunkSnapshot {
        ChunkSnapshot {
            coord: self.coord,
            machines: self
                .machines
                .values()
                .map(|machine| MachineSnapshot::new(machine, catalogs))
                .collect(),
            belts: self.belts.values().map(BeltSnapshot::from).collect(),
            connectors: self.connectors.values().map(ConnectorSnapshot::from).collect(),
            storage: self.storage.values().map(StorageSnapshot::from).collect(),
        }
    }

    /// Feed the chunk's observable state into `hash`. Entity and item ids
    /// are left out so two independently built worlds compare equal.
    pub fn hash_into(&self, hash: &mut StateHash) {
        fn slot(hash: &mut StateHash, slot: &InventorySlot) {
            hash.write_u32(slot.item_type().map_or(u32::MAX, |t| t.0));
            hash.write_u64(slot.len() as u64);
        }
        fn placement(hash: &mut StateHash, entity: &dyn Entity) {
            hash.write_i32(entity.position().x);
            hash.write_i32(entity.position().y);
            hash.write_i32(entity.rotation().degrees());
        }

        hash.write_i32(self.coord.x);
        hash.write_i32(self.coord.y);
        for machine in self.machines.values() {
            placement(hash, machine);
            hash.write_u32(machine.recipe().map_or(u32::MAX, |r| r.0));
            hash.write_fixed64(machine.progress());
            hash.write_u32(u32::from(machine.is_enabled()));
            hash.write_u64(machine.completed_recipes());
            slot(hash, machine.input());
            slot(hash, machine.output());
        }
        for belt in self.belts.values() {
            placement(hash, belt);
            for view in belt.items_with_progress() {
                hash.write_u32(view.item_type.0);
                hash.write_fixed64(view.progress);
            }
        }
        for connector in self.connectors.values() {
            placement(hash, connector);
            hash.write_u32(connector.held_item().map_or(u32::MAX, |i| i.item_type.0));
        }
        for storage in self.storage.values() {
            placement(hash, storage);
            for s in storage.slots() {
                slot(hash, s);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Neighbourhood view for connectors
// ---------------------------------------------------------------------------

/// The chunk's item-holding collections, borrowed apart from its connectors.
struct ChunkNeighborhood<'a> {
    machines: &'a mut BTreeMap<GridPosition, Machine>,
    belts: &'a mut BTreeMap<GridPosition, Belt>,
    storage: &'a mut BTreeMap<GridPosition, StorageBox>,
}

impl Neighborhood for ChunkNeighborhood<'_> {
    fn source_at(&mut self, cell: GridPosition) -> Option<&mut dyn ItemSource> {
        if let Some(machine) = self.machines.get_mut(&cell) {
            return Some(machine);
        }
        if let Some(belt) = self.belts.get_mut(&cell) {
            return Some(belt);
        }
        self.storage.get_mut(&cell).map(|s| s as &mut dyn ItemSource)
    }

    fn sink_at(&mut self, cell: GridPosition) -> Option<&mut dyn ItemSink> {
        if let Some(machine) = self.machines.get_mut(&cell) {
            return Some(machine);
        }
        if let Some(belt) = self.belts.get_mut(&cell) {
            return Some(belt);
        }
        self.storage.get_mut(&cell).map(|s| s as &mut dyn ItemSink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::fixed::f64_to_fixed64;
    use crate::test_utils;

    fn chunk() -> Chunk {
        Chunk::new(ChunkCoord::new(0, 0), BeltParams::default(), 4)
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(Event::kind).collect()
    }

    #[test]
    fn placement_rejects_occupied_and_out_of_bounds() {
        let mut chunk = chunk();
        let cell = GridPosition::new(3, 3);
        chunk.place_belt(cell, Rotation::None).unwrap();
        assert!(chunk.is_occupied(cell));
        assert!(!chunk.can_place_entity_at(cell));
        assert_eq!(
            chunk.place_storage_box(cell, Rotation::None),
            Err(PlacementError::Occupied {
                cell,
                kind: EntityKind::Belt
            })
        );
        assert!(matches!(
            chunk.place_belt(GridPosition::new(40, 0), Rotation::None),
            Err(PlacementError::OutOfBounds { .. })
        ));
        assert_eq!(chunk.entity_count(), 1);
    }

    #[test]
    fn placement_rejects_cells_on_the_grid_edge() {
        let edge = GridPosition::new(i32::MAX, 0);
        let mut chunk = Chunk::new(ChunkCoord::containing(edge), BeltParams::default(), 4);
        assert!(!chunk.can_place_entity_at(edge));
        assert_eq!(
            chunk.place_belt(edge, Rotation::Cw90),
            Err(PlacementError::GridEdge(edge))
        );
        assert!(chunk.take_events().is_empty());

        let inner = GridPosition::new(i32::MAX - 1, 0);
        chunk.place_belt(inner, Rotation::Cw90).unwrap();
        assert_eq!(chunk.belt_at(inner).unwrap().next_belt(), None);
        assert_eq!(chunk.entity_count(), 1);
    }

    #[test]
    fn placement_raises_added_and_dirties() {
        let mut chunk = chunk();
        assert!(!chunk.is_dirty());
        let id = chunk.place_connector(GridPosition::new(1, 1), Rotation::None).unwrap();
        assert!(chunk.is_dirty());
        let events = chunk.take_events();
        assert_eq!(
            events[0],
            Event::EntityAdded {
                entity: id,
                kind: EntityKind::Connector,
                position: GridPosition::new(1, 1),
            }
        );
        assert!(chunk.take_events().is_empty());
        assert_eq!(chunk.find(id), Some(GridPosition::new(1, 1)));
    }

    #[test]
    fn belts_link_in_both_directions() {
        let mut chunk = chunk();
        let a = GridPosition::new(1, 1);
        let b = GridPosition::new(2, 1);
        chunk.place_belt(a, Rotation::Cw90).unwrap();
        chunk.place_belt(b, Rotation::Cw90).unwrap();
        assert_eq!(chunk.belt_at(a).unwrap().next_belt(), Some(b));
        assert_eq!(chunk.belt_at(b).unwrap().previous_belt(), Some(a));
        assert!(kinds(&chunk.take_events()).contains(&EventKind::BeltConnectionChanged));

        chunk.remove(b).unwrap();
        assert_eq!(chunk.belt_at(a).unwrap().next_belt(), None);
    }

    #[test]
    fn rotation_rechecks_rotated_entity_once() {
        let mut chunk = chunk();
        let cell = GridPosition::new(5, 5);
        chunk.place_belt(cell, Rotation::None).unwrap();
        let before = chunk.belt_at(cell).unwrap().connection_checks();
        let mut rotation = Rotation::None;
        for _ in 0..4 {
            rotation = rotation.rotate_cw();
            chunk.rotate(cell, rotation).unwrap();
        }
        let belt = chunk.belt_at(cell).unwrap();
        assert_eq!(belt.rotation(), Rotation::None);
        assert_eq!(belt.connection_checks(), before + 4);
        assert_eq!(
            chunk.rotate(GridPosition::new(9, 9), Rotation::None),
            Err(CommandError::NoEntity(GridPosition::new(9, 9)))
        );
    }

    #[test]
    fn connector_targets_front_occupant() {
        let mut chunk = chunk();
        let connector = GridPosition::new(2, 2);
        chunk.place_connector(connector, Rotation::Cw90).unwrap();
        assert!(chunk.connector_at(connector).unwrap().target().is_none());

        chunk.place_storage_box(GridPosition::new(3, 2), Rotation::None).unwrap();
        let target = chunk.connector_at(connector).unwrap().target().unwrap();
        assert_eq!(target.position, GridPosition::new(3, 2));
        assert_eq!(target.kind, EntityKind::StorageBox);

        chunk.rotate(connector, Rotation::None).unwrap();
        assert!(chunk.connector_at(connector).unwrap().target().is_none());
    }

    #[test]
    fn tick_hands_items_between_belts() {
        let catalogs = test_utils::reference_catalogs();
        let mut chunk = chunk();
        let a = GridPosition::new(1, 1);
        let b = GridPosition::new(2, 1);
        chunk.place_belt(a, Rotation::Cw90).unwrap();
        chunk.place_belt(b, Rotation::Cw90).unwrap();
        let item = Item::new(test_utils::ore(&catalogs));
        let id = item.id();
        chunk.give_item(a, item, &catalogs).unwrap();
        chunk.take_events();

        let dt = f64_to_fixed64(0.25);
        for _ in 0..4 {
            chunk.process_tick(dt, &catalogs);
        }
        assert!(chunk.belt_at(a).unwrap().is_empty());
        assert!(chunk.belt_at(b).unwrap().contains_item(id));
        let events = kinds(&chunk.take_events());
        assert!(events.contains(&EventKind::BeltItemRemoved));
        assert!(events.contains(&EventKind::BeltItemAdded));
    }

    #[test]
    fn transit_time_is_the_same_in_both_directions() {
        let catalogs = test_utils::reference_catalogs();
        let mut chunk = chunk();
        let east: Vec<_> = (1..=3).map(|x| GridPosition::new(x, 1)).collect();
        let west: Vec<_> = (1..=3).rev().map(|x| GridPosition::new(x, 3)).collect();
        for &cell in &east {
            chunk.place_belt(cell, Rotation::Cw90).unwrap();
        }
        for &cell in &west {
            chunk.place_belt(cell, Rotation::Cw270).unwrap();
        }
        let ore = test_utils::ore(&catalogs);
        chunk.give_item(east[0], Item::new(ore), &catalogs).unwrap();
        chunk.give_item(west[0], Item::new(ore), &catalogs).unwrap();

        let dt = f64_to_fixed64(0.05);
        let (mut east_at, mut west_at) = (None, None);
        for tick in 1..=100 {
            chunk.process_tick(dt, &catalogs);
            if east_at.is_none() && chunk.take_item(east[2]).is_some() {
                east_at = Some(tick);
            }
            if west_at.is_none() && chunk.take_item(west[2]).is_some() {
                west_at = Some(tick);
            }
        }
        // Two hand-offs at 20 ticks each, then 0.9 of the last belt.
        assert_eq!(east_at, Some(58));
        assert_eq!(west_at, Some(58));
    }

    #[test]
    fn connector_moves_miner_output_into_storage() {
        let catalogs = test_utils::reference_catalogs();
        let recipe = test_utils::mine_recipe(&catalogs);
        let mut chunk = chunk();
        // Connector faces the miner (pull side) and has the box behind it.
        chunk.place_miner(GridPosition::new(3, 0), Rotation::None, recipe).unwrap();
        chunk.place_connector(GridPosition::new(2, 0), Rotation::Cw90).unwrap();
        chunk.place_storage_box(GridPosition::new(1, 0), Rotation::None).unwrap();

        let dt = f64_to_fixed64(0.5);
        for _ in 0..8 {
            chunk.process_tick(dt, &catalogs);
        }
        let stored = chunk.storage_at(GridPosition::new(1, 0)).unwrap().item_count();
        assert!(stored >= 3, "stored {stored}");
        assert!(kinds(&chunk.take_events()).contains(&EventKind::StorageItemAdded));
    }

    #[test]
    fn set_recipe_validates_and_evacuates() {
        let catalogs = test_utils::reference_catalogs();
        let smelt = catalogs.recipes.id_by_name("smelt_iron").unwrap();
        let mine = test_utils::mine_recipe(&catalogs);
        let mut chunk = chunk();
        let machine = GridPosition::new(4, 4);
        let miner = GridPosition::new(6, 4);
        chunk.place_machine(machine, Rotation::None, Some(smelt)).unwrap();
        chunk.place_miner(miner, Rotation::None, mine).unwrap();
        chunk.place_belt(GridPosition::new(8, 4), Rotation::None).unwrap();

        let ore = test_utils::ore(&catalogs);
        for _ in 0..3 {
            chunk.give_item(machine, Item::new(ore), &catalogs).unwrap();
        }
        let swap = chunk.set_recipe(machine, None, &catalogs).unwrap().unwrap();
        assert_eq!(swap.evacuated.len(), 3);
        assert_eq!(swap.previous, Some(smelt));
        assert_eq!(chunk.set_recipe(machine, None, &catalogs), Ok(None));

        assert_eq!(
            chunk.set_recipe(miner, Some(smelt), &catalogs),
            Err(CommandError::MinerNeedsExtractionRecipe(miner))
        );
        assert_eq!(
            chunk.set_recipe(machine, Some(RecipeId(999)), &catalogs),
            Err(CommandError::UnknownRecipe(RecipeId(999)))
        );
        assert!(matches!(
            chunk.set_enabled(GridPosition::new(8, 4), false),
            Err(CommandError::NotAMachine { .. })
        ));
        assert_eq!(chunk.set_enabled(machine, false), Ok(true));
        assert_eq!(chunk.set_enabled(machine, false), Ok(false));
    }

    #[test]
    fn remove_returns_held_items() {
        let catalogs = test_utils::reference_catalogs();
        let mut chunk = chunk();
        let cell = GridPosition::new(7, 7);
        chunk.place_storage_box(cell, Rotation::None).unwrap();
        let ore = test_utils::ore(&catalogs);
        chunk.give_item(cell, Item::new(ore), &catalogs).unwrap();
        chunk.give_item(cell, Item::new(ore), &catalogs).unwrap();

        let removed = chunk.remove(cell).unwrap();
        assert_eq!(removed.kind, EntityKind::StorageBox);
        assert_eq!(removed.items.len(), 2);
        assert!(chunk.remove(cell).is_none());
        assert!(chunk.can_place_entity_at(cell));
    }

    #[test]
    fn border_changes_report_neighbor_chunks() {
        let mut chunk = chunk();
        chunk.place_belt(GridPosition::new(5, 5), Rotation::None).unwrap();
        assert!(chunk.neighbors_that_changed().is_empty());

        chunk.place_belt(GridPosition::new(0, 31), Rotation::None).unwrap();
        assert_eq!(
            chunk.neighbors_that_changed(),
            vec![ChunkCoord::new(-1, 0), ChunkCoord::new(0, 1)]
        );
        assert!(chunk.neighbors_that_changed().is_empty());
    }

    #[test]
    fn process_tick_always_redirties() {
        let catalogs = test_utils::reference_catalogs();
        let mut chunk = chunk();
        assert!(!chunk.take_dirty());
        chunk.process_tick(f64_to_fixed64(0.05), &catalogs);
        assert!(chunk.take_dirty());
        assert!(!chunk.is_dirty());
    }
}
