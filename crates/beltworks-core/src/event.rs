//! Change notifications with per-kind ring buffers.
//!
//! Chunks never call listeners directly. While a tick or a mutation runs they
//! append [`Event`]s to an outbox; the engine moves those into the
//! [`EventBus`] and calls [`EventBus::deliver`] once the chunk is no longer
//! borrowed. Listeners therefore always observe a settled world.
//!
//! # Delivery order
//!
//! Kinds are delivered in [`EventKind`] declaration order. Within a kind,
//! subscribers run by `(priority, registration order)` and each sees events
//! oldest first.
//!
//! # Suppression
//!
//! [`EventBus::suppress`] stops a kind from being buffered at all, which is
//! what a headless run wants for the high-volume belt item events.

use crate::entity::EntityKind;
use crate::grid::{ChunkCoord, GridPosition, Rotation};
use crate::id::{EntityId, RecipeId};
use crate::item::ItemRef;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Chunk contents --
    EntityAdded {
        entity: EntityId,
        kind: EntityKind,
        position: GridPosition,
    },
    EntityRemoved {
        entity: EntityId,
        kind: EntityKind,
        position: GridPosition,
    },
    EntityRotated {
        entity: EntityId,
        kind: EntityKind,
        rotation: Rotation,
    },

    // -- Items --
    BeltItemAdded {
        belt: EntityId,
        item: ItemRef,
    },
    BeltItemRemoved {
        belt: EntityId,
        item: ItemRef,
    },
    StorageItemAdded {
        storage: EntityId,
        item: ItemRef,
    },
    StorageItemRemoved {
        storage: EntityId,
        item: ItemRef,
    },

    // -- Connections --
    BeltConnectionChanged {
        belt: EntityId,
        next: Option<GridPosition>,
        previous: Option<GridPosition>,
    },
    ConnectorConnectionChanged {
        connector: EntityId,
        target: Option<GridPosition>,
    },

    // -- Machines --
    RecipeCompleted {
        machine: EntityId,
        recipe: RecipeId,
        output: ItemRef,
    },
    ItemConsumed {
        machine: EntityId,
        item: ItemRef,
    },
    RecipeChanged {
        machine: EntityId,
        previous: Option<RecipeId>,
        current: Option<RecipeId>,
    },
    EnabledChanged {
        machine: EntityId,
        enabled: bool,
    },

    // -- Clock --
    ChunkDirty {
        chunk: ChunkCoord,
    },
}

/// Discriminant tag for event types, used for subscription and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    EntityAdded,
    EntityRemoved,
    EntityRotated,
    BeltItemAdded,
    BeltItemRemoved,
    StorageItemAdded,
    StorageItemRemoved,
    BeltConnectionChanged,
    ConnectorConnectionChanged,
    RecipeCompleted,
    ItemConsumed,
    RecipeChanged,
    EnabledChanged,
    ChunkDirty,
}

const EVENT_KIND_COUNT: usize = 14;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::EntityAdded { .. } => EventKind::EntityAdded,
            Event::EntityRemoved { .. } => EventKind::EntityRemoved,
            Event::EntityRotated { .. } => EventKind::EntityRotated,
            Event::BeltItemAdded { .. } => EventKind::BeltItemAdded,
            Event::BeltItemRemoved { .. } => EventKind::BeltItemRemoved,
            Event::StorageItemAdded { .. } => EventKind::StorageItemAdded,
            Event::StorageItemRemoved { .. } => EventKind::StorageItemRemoved,
            Event::BeltConnectionChanged { .. } => EventKind::BeltConnectionChanged,
            Event::ConnectorConnectionChanged { .. } => EventKind::ConnectorConnectionChanged,
            Event::RecipeCompleted { .. } => EventKind::RecipeCompleted,
            Event::ItemConsumed { .. } => EventKind::ItemConsumed,
            Event::RecipeChanged { .. } => EventKind::RecipeChanged,
            Event::EnabledChanged { .. } => EventKind::EnabledChanged,
            Event::ChunkDirty { .. } => EventKind::ChunkDirty,
        }
    }
}

impl EventKind {
    pub fn all() -> [EventKind; EVENT_KIND_COUNT] {
        [
            EventKind::EntityAdded,
            EventKind::EntityRemoved,
            EventKind::EntityRotated,
            EventKind::BeltItemAdded,
            EventKind::BeltItemRemoved,
            EventKind::StorageItemAdded,
            EventKind::StorageItemRemoved,
            EventKind::BeltConnectionChanged,
            EventKind::ConnectorConnectionChanged,
            EventKind::RecipeCompleted,
            EventKind::ItemConsumed,
            EventKind::RecipeChanged,
            EventKind::EnabledChanged,
            EventKind::ChunkDirty,
        ]
    }

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// A bounded FIFO of events. When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    total_written: u64,
    dropped: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events written since creation, including dropped ones.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events lost to overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A listener receives events read-only.
pub type Listener = Box<dyn FnMut(&Event)>;

/// Optional predicate that narrows which events reach a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Handle returned by registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SubscriberPriority {
    Pre = 0,
    #[default]
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    id: ListenerId,
    listener: Listener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// One ring buffer per event kind plus the subscriber lists.
pub struct EventBus {
    /// Allocated on first emit of each kind.
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    /// Kept sorted by `(priority, id)`.
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    next_listener: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// A bus whose per-kind buffers hold `default_capacity` events.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: std::array::from_fn(|_| Vec::new()),
            default_capacity,
            next_listener: 0,
        }
    }

    /// Stop buffering `kind`. Already-buffered events of that kind are dropped.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event for the next delivery. No-op for suppressed kinds.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Register a listener at normal priority with no filter.
    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.on_filtered(kind, SubscriberPriority::Normal, None, listener)
    }

    pub fn on_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        let list = &mut self.subscribers[kind.index()];
        list.push(SubscriberEntry {
            id,
            listener,
            priority,
            filter,
        });
        list.sort_by_key(|entry| (entry.priority, entry.id));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        for list in &mut self.subscribers {
            if let Some(pos) = list.iter().position(|entry| entry.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscribers[kind.index()].len()
    }

    /// Hand every buffered event to its subscribers, then clear the buffers.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }
            let events: Vec<Event> = buffer.events.drain(..).collect();

            for entry in &mut self.subscribers[idx] {
                for event in &events {
                    if let Some(filter) = &entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Events of `kind` waiting for delivery.
    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffer(kind).map_or(0, EventBuffer::len)
    }

    /// Events of `kind` ever emitted, including dropped ones.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffer(kind).map_or(0, EventBuffer::total_written)
    }

    /// Clear every buffer. Subscribers and suppression stay.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
