use crate::catalog::ItemCatalog;
use crate::id::{ItemId, ItemTypeId};
use log::warn;
use serde::{Deserialize, Serialize};

/// A single item instance. Deliberately not `Clone`: an item exists in
/// exactly one place at a time and moves by value between holders.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Item {
    id: ItemId,
    item_type: ItemTypeId,
}

impl Item {
    /// Create a new item instance with a fresh id.
    pub fn new(item_type: ItemTypeId) -> Self {
        Self {
            id: ItemId::next(),
            item_type,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn item_type(&self) -> ItemTypeId {
        self.item_type
    }

    /// A copyable reference to this item for events and snapshots.
    pub fn to_ref(&self) -> ItemRef {
        ItemRef {
            id: self.id,
            item_type: self.item_type,
        }
    }
}

/// Identity and type of an item, without ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub item_type: ItemTypeId,
}

/// A single-type stack of items with a capacity.
///
/// An empty slot accepts any type. The first item accepted locks the slot's
/// type and resolves its capacity from the item catalog; the lock is released
/// when the slot empties again.
#[derive(Debug, Default, PartialEq)]
pub struct InventorySlot {
    item_type: Option<ItemTypeId>,
    items: Vec<Item>,
    max_stack: u32,
    stackable: bool,
}

impl InventorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `item` could be added right now.
    pub fn can_accept(&self, item: &Item) -> bool {
        self.can_accept_type(item.item_type())
    }

    /// Whether an item of `item_type` could be added right now.
    pub fn can_accept_type(&self, item_type: ItemTypeId) -> bool {
        match self.item_type {
            None => true,
            Some(locked) => locked == item_type && (self.items.len() as u32) < self.max_stack,
        }
    }

    /// Add an item, locking the slot's type on the first one. A rejected item
    /// is handed back unchanged.
    #[must_use = "a rejected item is returned and must be kept somewhere"]
    pub fn add(&mut self, item: Item, catalog: &ItemCatalog) -> Result<(), Item> {
        if !self.can_accept(&item) {
            return Err(item);
        }
        if self.item_type.is_none() {
            self.lock(item.item_type(), catalog);
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove the most recently added item.
    pub fn take(&mut self) -> Option<Item> {
        let item = self.items.pop()?;
        if self.items.is_empty() {
            self.unlock();
        }
        Some(item)
    }

    /// The item [`take`](Self::take) would return next.
    pub fn peek(&self) -> Option<&Item> {
        self.items.last()
    }

    /// Remove every item, oldest first, and release the type lock.
    pub fn drain(&mut self) -> Vec<Item> {
        let items = std::mem::take(&mut self.items);
        self.unlock();
        items
    }

    pub fn item_type(&self) -> Option<ItemTypeId> {
        self.item_type
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capacity locked from the catalog; zero while the slot is empty.
    pub fn capacity(&self) -> u32 {
        self.max_stack
    }

    pub fn is_stackable(&self) -> bool {
        self.stackable
    }

    /// A locked slot at capacity. An empty slot is never full.
    pub fn is_full(&self) -> bool {
        self.item_type.is_some() && self.items.len() as u32 >= self.max_stack
    }

    /// Count of items of `item_type` in this slot.
    pub fn count_of(&self, item_type: ItemTypeId) -> usize {
        if self.item_type == Some(item_type) {
            self.items.len()
        } else {
            0
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    fn lock(&mut self, item_type: ItemTypeId, catalog: &ItemCatalog) {
        let (max_stack, stackable) = match catalog.get(item_type) {
            Some(def) => (def.stack_limit(), def.stackable),
            None => {
                warn!("item type {item_type:?} is not in the catalog, slot holds a single item");
                (1, false)
            }
        };
        self.item_type = Some(item_type);
        self.max_stack = max_stack;
        self.stackable = stackable;
    }

    fn unlock(&mut self) {
        self.item_type = None;
        self.max_stack = 0;
        self.stackable = false;
    }
}
