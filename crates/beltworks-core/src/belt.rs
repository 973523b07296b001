//! Conveyor belts.
//!
//! A belt carries an ordered run of items, each with a progress value from
//! 0 (just accepted at the tail) to 1 (at the discharge point). Index 0 of the
//! run is the head, the item nearest discharge. Adjacent items always keep at
//! least `min_spacing` between them and a belt never holds more than
//! `capacity` items.
//!
//! Links to the downstream and upstream belts are stored as grid cells and
//! resolved through the owning chunk, never as references.

use crate::catalog::Catalogs;
use crate::entity::{Entity, EntityHeader, EntityKind, ItemSink, ItemSource};
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::grid::GridPosition;
use crate::id::{ItemId, ItemTypeId};
use crate::item::Item;

/// Movement tuning shared by every belt in an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeltParams {
    /// Progress per second.
    pub speed: Fixed64,
    /// Minimum progress gap between adjacent items.
    pub min_spacing: Fixed64,
    /// Maximum items on one belt.
    pub capacity: usize,
    /// Head progress from which [`Belt::take_item`] releases the head item.
    pub take_threshold: Fixed64,
}

impl Default for BeltParams {
    fn default() -> Self {
        Self {
            speed: Fixed64::ONE,
            min_spacing: f64_to_fixed64(0.2),
            capacity: 5,
            take_threshold: f64_to_fixed64(0.9),
        }
    }
}

#[derive(Debug, PartialEq)]
struct BeltItem {
    item: Item,
    progress: Fixed64,
}

/// Read-only view of one item on a belt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeltItemView {
    pub item: ItemId,
    pub item_type: ItemTypeId,
    pub progress: Fixed64,
}

/// What happened during one [`Belt::advance`].
#[derive(Debug, Default, PartialEq)]
pub struct BeltAdvance {
    /// The head item, if it left for the downstream belt this tick.
    pub handed_off: Option<Item>,
    /// Whether any item changed progress or left.
    pub moved: bool,
}

#[derive(Debug, PartialEq)]
pub struct Belt {
    header: EntityHeader,
    items: Vec<BeltItem>,
    next: Option<GridPosition>,
    previous: Option<GridPosition>,
    params: BeltParams,
    connection_checks: u64,
}

impl Belt {
    pub fn new(header: EntityHeader, params: BeltParams) -> Self {
        Self {
            header,
            items: Vec::with_capacity(params.capacity),
            next: None,
            previous: None,
            params,
            connection_checks: 0,
        }
    }

    pub fn params(&self) -> &BeltParams {
        &self.params
    }

    /// True iff the belt has room and the last accepted item has moved at
    /// least `min_spacing` away from the tail.
    pub fn can_accept_item(&self) -> bool {
        self.items.len() < self.params.capacity
            && self
                .items
                .last()
                .is_none_or(|tail| tail.progress >= self.params.min_spacing)
    }

    /// Put `item` on the tail at progress 0.
    #[must_use = "a rejected item is returned and must be kept somewhere"]
    pub fn accept_item(&mut self, item: Item) -> Result<(), Item> {
        if !self.can_accept_item() {
            return Err(item);
        }
        self.items.push(BeltItem {
            item,
            progress: Fixed64::ZERO,
        });
        Ok(())
    }

    /// Remove the head item if it is within reach of the discharge point.
    pub fn take_item(&mut self) -> Option<Item> {
        if self.head_ready() {
            Some(self.items.remove(0).item)
        } else {
            None
        }
    }

    fn head_ready(&self) -> bool {
        self.items
            .first()
            .is_some_and(|head| head.progress >= self.params.take_threshold)
    }

    /// Advance every item by `speed * dt`, head first.
    ///
    /// The head leaves when it reaches 1.0 and `downstream_ready` is set;
    /// otherwise it stops at 1.0. Every other item is held `min_spacing`
    /// behind the already-updated item ahead of it. At most one item leaves
    /// per call.
    pub fn advance(&mut self, dt: Fixed64, downstream_ready: bool) -> BeltAdvance {
        let mut result = BeltAdvance::default();
        let step = self.params.speed * dt;
        let mut ahead: Option<Fixed64> = None;
        let mut i = 0;

        while i < self.items.len() {
            let current = self.items[i].progress;
            let mut progress = current + step;

            match ahead {
                None if progress >= Fixed64::ONE => {
                    if downstream_ready && result.handed_off.is_none() {
                        result.handed_off = Some(self.items.remove(i).item);
                        result.moved = true;
                        continue;
                    }
                    progress = Fixed64::ONE;
                }
                None => {}
                Some(ahead_progress) => {
                    progress = progress.min(ahead_progress - self.params.min_spacing);
                }
            }

            let progress = progress.max(current);
            if progress != current {
                result.moved = true;
            }
            self.items[i].progress = progress;
            ahead = Some(progress);
            i += 1;
        }

        result
    }

    /// Snapshot of every item with its progress, head first.
    pub fn items_with_progress(&self) -> Vec<BeltItemView> {
        self.items
            .iter()
            .map(|belt_item| BeltItemView {
                item: belt_item.item.id(),
                item_type: belt_item.item.item_type(),
                progress: belt_item.progress,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the belt holds the item with this id.
    pub fn contains_item(&self, id: ItemId) -> bool {
        self.items.iter().any(|belt_item| belt_item.item.id() == id)
    }

    /// Cell of the downstream belt, if linked.
    pub fn next_belt(&self) -> Option<GridPosition> {
        self.next
    }

    /// Cell of the upstream belt, if linked.
    pub fn previous_belt(&self) -> Option<GridPosition> {
        self.previous
    }

    /// Number of connection checks run on this belt since placement.
    pub fn connection_checks(&self) -> u64 {
        self.connection_checks
    }

    /// Record the outcome of a connection check. Returns whether either
    /// link changed.
    pub(crate) fn relink(&mut self, next: Option<GridPosition>, previous: Option<GridPosition>) -> bool {
        self.connection_checks += 1;
        let changed = self.next != next || self.previous != previous;
        self.next = next;
        self.previous = previous;
        changed
    }

    pub(crate) fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    /// Put an item that failed to hand off back at the head, at the
    /// discharge point.
    pub(crate) fn restore_head(&mut self, item: Item) {
        self.items.insert(
            0,
            BeltItem {
                item,
                progress: Fixed64::ONE,
            },
        );
    }

    /// Remove every carried item, head first.
    pub(crate) fn drain_items(&mut self) -> Vec<Item> {
        self.items.drain(..).map(|belt_item| belt_item.item).collect()
    }
}

impl Entity for Belt {
    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Belt
    }
}

impl ItemSource for Belt {
    fn can_supply(&self) -> bool {
        self.head_ready()
    }

    fn try_take(&mut self) -> Option<Item> {
        self.take_item()
    }
}

impl ItemSink for Belt {
    fn can_accept(&self, _item: &Item, _catalogs: &Catalogs) -> bool {
        self.can_accept_item()
    }

    fn try_give(&mut self, item: Item, _catalogs: &Catalogs) -> Result<(), Item> {
        self.accept_item(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::fixed64_to_f64;
    use crate::grid::Rotation;

    fn fixed(v: f64) -> Fixed64 {
        f64_to_fixed64(v)
    }

    fn ore() -> ItemTypeId {
        ItemTypeId(0)
    }

    fn belt() -> Belt {
        Belt::new(
            EntityHeader::new(GridPosition::new(0, 0), Rotation::Cw90),
            BeltParams::default(),
        )
    }

    fn assert_spacing(belt: &Belt) {
        let views = belt.items_with_progress();
        for pair in views.windows(2) {
            assert!(
                pair[1].progress <= pair[0].progress - belt.params().min_spacing,
                "spacing violated: {:?}",
                views
            );
        }
    }

    #[test]
    fn accept_places_item_at_zero() {
        let mut belt = belt();
        belt.accept_item(Item::new(ore())).unwrap();
        let views = belt.items_with_progress();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].progress, Fixed64::ZERO);
    }

    #[test]
    fn cannot_accept_until_tail_clears_spacing() {
        let mut belt = belt();
        belt.accept_item(Item::new(ore())).unwrap();
        assert!(!belt.can_accept_item());
        assert!(belt.accept_item(Item::new(ore())).is_err());

        belt.advance(fixed(0.1), false);
        assert!(!belt.can_accept_item());
        belt.advance(fixed(0.1), false);
        assert!(belt.can_accept_item());
    }

    #[test]
    fn capacity_is_bounded() {
        let mut belt = belt();
        for _ in 0..5 {
            belt.accept_item(Item::new(ore())).unwrap();
            belt.advance(fixed(0.2), false);
        }
        assert_eq!(belt.len(), 5);
        assert!(!belt.can_accept_item());
        assert!(belt.accept_item(Item::new(ore())).is_err());
    }

    #[test]
    fn head_clamps_at_one_without_downstream() {
        let mut belt = belt();
        belt.accept_item(Item::new(ore())).unwrap();
        for _ in 0..30 {
            let result = belt.advance(fixed(0.1), false);
            assert!(result.handed_off.is_none());
        }
        assert_eq!(belt.items_with_progress()[0].progress, Fixed64::ONE);
        assert!(!belt.advance(fixed(0.1), false).moved);
    }

    #[test]
    fn head_hands_off_when_downstream_ready() {
        let mut belt = belt();
        let item = Item::new(ore());
        let id = item.id();
        belt.accept_item(item).unwrap();
        belt.advance(fixed(0.9), true);
        assert_eq!(belt.len(), 1);
        let result = belt.advance(fixed(0.2), true);
        assert_eq!(result.handed_off.map(|i| i.id()), Some(id));
        assert!(belt.is_empty());
    }

    #[test]
    fn followers_queue_behind_blocked_head() {
        let mut belt = belt();
        for _ in 0..5 {
            if belt.can_accept_item() {
                belt.accept_item(Item::new(ore())).unwrap();
            }
            belt.advance(fixed(0.25), false);
            assert_spacing(&belt);
        }
        for _ in 0..20 {
            belt.advance(fixed(0.25), false);
            assert_spacing(&belt);
        }
        let progress: Vec<f64> = belt
            .items_with_progress()
            .iter()
            .map(|v| fixed64_to_f64(v.progress))
            .collect();
        assert_eq!(progress.len(), 5);
        assert!((progress[0] - 1.0).abs() < 1e-6);
        assert!((progress[4] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn take_requires_threshold() {
        let mut belt = belt();
        belt.accept_item(Item::new(ore())).unwrap();
        belt.advance(fixed(0.85), false);
        assert!(!belt.can_supply());
        assert!(belt.take_item().is_none());
        belt.advance(fixed(0.05), false);
        assert!(belt.can_supply());
        assert!(belt.take_item().is_some());
        assert!(belt.is_empty());
    }

    #[test]
    fn relink_reports_changes_and_counts_checks() {
        let mut belt = belt();
        let east = GridPosition::new(1, 0);
        assert!(belt.relink(Some(east), None));
        assert!(!belt.relink(Some(east), None));
        assert!(belt.relink(None, None));
        assert_eq!(belt.connection_checks(), 3);
        assert_eq!(belt.next_belt(), None);
    }

    #[test]
    fn drain_returns_items_head_first() {
        let mut belt = belt();
        let first = Item::new(ore());
        let first_id = first.id();
        belt.accept_item(first).unwrap();
        belt.advance(fixed(0.5), false);
        belt.accept_item(Item::new(ore())).unwrap();
        let drained = belt.drain_items();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id(), first_id);
        assert!(belt.is_empty());
    }
}
