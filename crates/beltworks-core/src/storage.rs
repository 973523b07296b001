//! Storage boxes: a fixed row of inventory slots with no processing.

use crate::catalog::Catalogs;
use crate::entity::{Entity, EntityHeader, EntityKind, ItemSink, ItemSource};
use crate::id::ItemTypeId;
use crate::item::{InventorySlot, Item, ItemRef};

#[derive(Debug, PartialEq)]
pub struct StorageBox {
    header: EntityHeader,
    slots: Vec<InventorySlot>,
}

impl StorageBox {
    pub fn new(header: EntityHeader, slot_count: usize) -> Self {
        Self {
            header,
            slots: (0..slot_count.max(1)).map(|_| InventorySlot::new()).collect(),
        }
    }

    pub fn slots(&self) -> &[InventorySlot] {
        &self.slots
    }

    /// The slot an item of this type would land in: the first locked slot of
    /// the same type with room, else the first empty slot.
    fn slot_for(&self, item_type: ItemTypeId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.item_type() == Some(item_type) && slot.can_accept_type(item_type))
            .or_else(|| self.slots.iter().position(InventorySlot::is_empty))
    }

    pub fn can_accept_item(&self, item: &Item) -> bool {
        self.slot_for(item.item_type()).is_some()
    }

    #[must_use = "a rejected item is returned and must be kept somewhere"]
    pub fn give_item(&mut self, item: Item, catalogs: &Catalogs) -> Result<(), Item> {
        match self.slot_for(item.item_type()) {
            Some(index) => self.slots[index].add(item, &catalogs.items),
            None => Err(item),
        }
    }

    /// Remove the most recently added item of the last non-empty slot.
    pub fn take_item(&mut self) -> Option<Item> {
        self.slots.iter_mut().rev().find_map(InventorySlot::take)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(InventorySlot::is_empty)
    }

    /// Total items across every slot.
    pub fn item_count(&self) -> usize {
        self.slots.iter().map(InventorySlot::len).sum()
    }

    pub fn count_of(&self, item_type: ItemTypeId) -> usize {
        self.slots.iter().map(|slot| slot.count_of(item_type)).sum()
    }

    /// Every held item, slot by slot.
    pub fn contents(&self) -> Vec<ItemRef> {
        self.slots
            .iter()
            .flat_map(|slot| slot.items().map(Item::to_ref))
            .collect()
    }

    pub(crate) fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    pub(crate) fn drain_items(&mut self) -> Vec<Item> {
        self.slots.iter_mut().flat_map(InventorySlot::drain).collect()
    }
}

impl Entity for StorageBox {
    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn kind(&self) -> EntityKind {
        EntityKind::StorageBox
    }
}

impl ItemSource for StorageBox {
    fn can_supply(&self) -> bool {
        !self.is_empty()
    }

    fn try_take(&mut self) -> Option<Item> {
        self.take_item()
    }
}

impl ItemSink for StorageBox {
    fn can_accept(&self, item: &Item, _catalogs: &Catalogs) -> bool {
        self.can_accept_item(item)
    }

    fn try_give(&mut self, item: Item, catalogs: &Catalogs) -> Result<(), Item> {
        self.give_item(item, catalogs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemCategory, ItemDef};
    use crate::grid::{GridPosition, Rotation};

    fn setup() -> (Catalogs, ItemTypeId, ItemTypeId) {
        let mut catalogs = Catalogs::default();
        let ore = catalogs
            .items
            .register(ItemDef::new("ore", "Ore", ItemCategory::Resource, 2))
            .unwrap();
        let coal = catalogs
            .items
            .register(ItemDef::new("coal", "Coal", ItemCategory::Resource, 2))
            .unwrap();
        (catalogs, ore, coal)
    }

    fn storage(slots: usize) -> StorageBox {
        StorageBox::new(EntityHeader::new(GridPosition::new(0, 0), Rotation::None), slots)
    }

    #[test]
    fn fills_matching_slot_before_empty_one() {
        let (catalogs, ore, coal) = setup();
        let mut storage = storage(3);
        storage.give_item(Item::new(ore), &catalogs).unwrap();
        storage.give_item(Item::new(coal), &catalogs).unwrap();
        storage.give_item(Item::new(ore), &catalogs).unwrap();
        assert_eq!(storage.slots()[0].len(), 2);
        assert_eq!(storage.slots()[1].count_of(coal), 1);
        assert!(storage.slots()[2].is_empty());

        // Slot 0 is full, so the next ore opens slot 2.
        storage.give_item(Item::new(ore), &catalogs).unwrap();
        assert_eq!(storage.slots()[2].count_of(ore), 1);
        assert_eq!(storage.count_of(ore), 3);
    }

    #[test]
    fn rejects_when_no_slot_fits() {
        let (catalogs, ore, coal) = setup();
        let mut storage = storage(1);
        storage.give_item(Item::new(ore), &catalogs).unwrap();
        assert!(!storage.can_accept_item(&Item::new(coal)));
        assert!(storage.give_item(Item::new(coal), &catalogs).is_err());
        assert_eq!(storage.item_count(), 1);
    }

    #[test]
    fn take_empties_last_slot_first() {
        let (catalogs, ore, coal) = setup();
        let mut storage = storage(2);
        storage.give_item(Item::new(ore), &catalogs).unwrap();
        storage.give_item(Item::new(coal), &catalogs).unwrap();
        assert_eq!(storage.take_item().map(|i| i.item_type()), Some(coal));
        assert_eq!(storage.take_item().map(|i| i.item_type()), Some(ore));
        assert!(storage.take_item().is_none());
        assert!(!storage.can_supply());
    }

    #[test]
    fn drain_returns_everything() {
        let (catalogs, ore, coal) = setup();
        let mut storage = storage(4);
        for item_type in [ore, coal, ore] {
            storage.give_item(Item::new(item_type), &catalogs).unwrap();
        }
        assert_eq!(storage.contents().len(), 3);
        assert_eq!(storage.drain_items().len(), 3);
        assert!(storage.is_empty());
    }
}
