//! Machines and miners.
//!
//! A machine owns one input slot and one output slot and runs a single
//! assigned recipe. Each tick it is either idle (`progress == 0`), waiting for
//! inputs and output room, or cooking (`progress > 0`). A miner is a machine
//! that only runs extraction recipes and refuses all deliveries.
//!
//! Output-full never drops items: a finished cycle holds at full progress
//! until the output slot has room again.

use crate::catalog::{Catalogs, RecipeDef};
use crate::entity::{Entity, EntityHeader, EntityKind, ItemSink, ItemSource};
use crate::fixed::{Fixed64, fraction};
use crate::id::RecipeId;
use crate::item::{InventorySlot, Item, ItemRef};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    /// Converts input items into output items.
    Assembler,
    /// Extracts items from nothing; has no input side.
    Miner,
}

// ---------------------------------------------------------------------------
// Tick result
// ---------------------------------------------------------------------------

/// The outcome of a single tick for a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineTickResult {
    /// Items consumed from the input slot this tick, in consumption order.
    pub consumed: Vec<ItemRef>,
    /// The item produced into the output slot this tick.
    pub produced: Option<ItemRef>,
}

/// What [`Machine::set_recipe`] displaced.
#[derive(Debug, Default, PartialEq)]
pub struct RecipeSwap {
    pub previous: Option<RecipeId>,
    /// Every item that sat in either slot, input slot first.
    pub evacuated: Vec<Item>,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct Machine {
    header: EntityHeader,
    kind: MachineKind,
    recipe: Option<RecipeId>,
    progress: Fixed64,
    enabled: bool,
    input: InventorySlot,
    output: InventorySlot,
    completed_recipes: u64,
}

impl Machine {
    /// An enabled assembler with an optional recipe.
    pub fn assembler(header: EntityHeader, recipe: Option<RecipeId>) -> Self {
        Self::with_kind(header, MachineKind::Assembler, recipe)
    }

    /// An enabled miner running `recipe`, which the caller has checked to be
    /// an extraction recipe.
    pub fn miner(header: EntityHeader, recipe: RecipeId) -> Self {
        Self::with_kind(header, MachineKind::Miner, Some(recipe))
    }

    fn with_kind(header: EntityHeader, kind: MachineKind, recipe: Option<RecipeId>) -> Self {
        Self {
            header,
            kind,
            recipe,
            progress: Fixed64::ZERO,
            enabled: true,
            input: InventorySlot::new(),
            output: InventorySlot::new(),
            completed_recipes: 0,
        }
    }

    pub fn machine_kind(&self) -> MachineKind {
        self.kind
    }

    pub fn is_miner(&self) -> bool {
        self.kind == MachineKind::Miner
    }

    pub fn recipe(&self) -> Option<RecipeId> {
        self.recipe
    }

    /// Seconds cooked in the current cycle.
    pub fn progress(&self) -> Fixed64 {
        self.progress
    }

    /// Current cycle progress as a `0..=1` fraction of the recipe duration.
    pub fn progress_fraction(&self, catalogs: &Catalogs) -> Fixed64 {
        self.recipe
            .and_then(|id| catalogs.recipes.get(id))
            .map_or(Fixed64::ZERO, |def| fraction(self.progress, def.duration))
    }

    pub fn is_cooking(&self) -> bool {
        self.progress > Fixed64::ZERO
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn completed_recipes(&self) -> u64 {
        self.completed_recipes
    }

    pub fn input(&self) -> &InventorySlot {
        &self.input
    }

    pub fn output(&self) -> &InventorySlot {
        &self.output
    }

    /// Advance the machine by `dt` seconds.
    pub fn tick(&mut self, dt: Fixed64, catalogs: &Catalogs) -> MachineTickResult {
        let mut result = MachineTickResult::default();
        if !self.enabled {
            return result;
        }
        let Some(recipe_id) = self.recipe else {
            return result;
        };
        let Some(def) = catalogs.recipes.get(recipe_id) else {
            warn!("machine {:?} runs unknown recipe {recipe_id:?}, skipping", self.header.id());
            return result;
        };

        if !self.is_cooking() {
            if !self.output.can_accept_type(def.output) {
                return result;
            }
            let Some(quantity) = self.ready_quantity(def) else {
                return result;
            };
            for _ in 0..quantity {
                if let Some(item) = self.input.take() {
                    result.consumed.push(item.to_ref());
                }
            }
        }

        self.progress += dt;

        if self.progress >= def.duration {
            if self.output.can_accept_type(def.output) {
                let item = Item::new(def.output);
                let produced = item.to_ref();
                match self.output.add(item, &catalogs.items) {
                    Ok(()) => {
                        result.produced = Some(produced);
                        self.completed_recipes += 1;
                        self.progress = Fixed64::ZERO;
                    }
                    Err(_) => self.progress = def.duration,
                }
            } else {
                self.progress = def.duration;
            }
        }

        result
    }

    /// How many input items a cycle of `def` would consume now, or `None`
    /// if the input slot cannot start one.
    fn ready_quantity(&self, def: &RecipeDef) -> Option<u32> {
        if def.is_extraction() {
            return Some(0);
        }
        if self.is_miner() {
            return None;
        }
        let held = self.input.item_type()?;
        let input = def.input_for(held)?;
        (self.input.len() >= input.quantity as usize).then_some(input.quantity)
    }

    /// Replace the recipe. Returns `None` when `recipe` is already assigned;
    /// otherwise both slots are emptied, progress resets, and the displaced
    /// items come back to the caller.
    pub fn set_recipe(&mut self, recipe: Option<RecipeId>) -> Option<RecipeSwap> {
        if self.recipe == recipe {
            return None;
        }
        let mut evacuated = self.input.drain();
        evacuated.extend(self.output.drain());
        debug!(
            "machine {:?} recipe {:?} -> {:?}, evacuated {} items",
            self.header.id(),
            self.recipe,
            recipe,
            evacuated.len()
        );
        let previous = std::mem::replace(&mut self.recipe, recipe);
        self.progress = Fixed64::ZERO;
        Some(RecipeSwap {
            previous,
            evacuated,
        })
    }

    /// Returns whether the flag changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// Whether `item` could be delivered into the input slot: the recipe
    /// must list its type and the slot must have room. Miners refuse all.
    pub fn can_accept_item(&self, item: &Item, catalogs: &Catalogs) -> bool {
        if self.is_miner() {
            return false;
        }
        self.recipe
            .and_then(|id| catalogs.recipes.get(id))
            .is_some_and(|def| def.accepts(item.item_type()))
            && self.input.can_accept(item)
    }

    #[must_use = "a rejected item is returned and must be kept somewhere"]
    pub fn give_item(&mut self, item: Item, catalogs: &Catalogs) -> Result<(), Item> {
        if !self.can_accept_item(&item, catalogs) {
            return Err(item);
        }
        self.input.add(item, &catalogs.items)
    }

    /// Remove one item from the output slot.
    pub fn take_item(&mut self) -> Option<Item> {
        self.output.take()
    }

    pub(crate) fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    /// Empty both slots, input first.
    pub(crate) fn drain_items(&mut self) -> Vec<Item> {
        let mut items = self.input.drain();
        items.extend(self.output.drain());
        items
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn slots_mut(&mut self) -> (&mut InventorySlot, &mut InventorySlot) {
        (&mut self.input, &mut self.output)
    }
}

impl Entity for Machine {
    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn kind(&self) -> EntityKind {
        match self.kind {
            MachineKind::Assembler => EntityKind::Machine,
            MachineKind::Miner => EntityKind::Miner,
        }
    }
}

impl ItemSource for Machine {
    fn can_supply(&self) -> bool {
        !self.output.is_empty()
    }

    fn try_take(&mut self) -> Option<Item> {
        self.take_item()
    }
}

impl ItemSink for Machine {
    fn can_accept(&self, item: &Item, catalogs: &Catalogs) -> bool {
        self.can_accept_item(item, catalogs)
    }

    fn try_give(&mut self, item: Item, catalogs: &Catalogs) -> Result<(), Item> {
        self.give_item(item, catalogs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemCategory, ItemDef, RecipeInput};
    use crate::fixed::f64_to_fixed64;
    use crate::grid::{GridPosition, Rotation};
    use crate::id::ItemTypeId;

    struct Fixture {
        catalogs: Catalogs,
        ore: ItemTypeId,
        plate: ItemTypeId,
        smelt: RecipeId,
        mine: RecipeId,
    }

    fn fixture(plate_stack: u32) -> Fixture {
        let mut catalogs = Catalogs::default();
        let ore = catalogs
            .items
            .register(ItemDef::new("ore", "Ore", ItemCategory::Resource, 50))
            .unwrap();
        let plate = catalogs
            .items
            .register(ItemDef::new("plate", "Plate", ItemCategory::Intermediate, plate_stack))
            .unwrap();
        let smelt = catalogs
            .recipes
            .register(RecipeDef::new(
                "smelt",
                Fixed64::ONE,
                plate,
                vec![RecipeInput {
                    item_type: ore,
                    quantity: 2,
                }],
            ))
            .unwrap();
        let mine = catalogs
            .recipes
            .register(RecipeDef::new("mine", f64_to_fixed64(0.5), ore, vec![]))
            .unwrap();
        Fixture {
            catalogs,
            ore,
            plate,
            smelt,
            mine,
        }
    }

    fn header() -> EntityHeader {
        EntityHeader::new(GridPosition::new(0, 0), Rotation::None)
    }

    #[test]
    fn idle_without_inputs() {
        let f = fixture(50);
        let mut machine = Machine::assembler(header(), Some(f.smelt));
        let result = machine.tick(f64_to_fixed64(0.5), &f.catalogs);
        assert_eq!(result, MachineTickResult::default());
        assert!(!machine.is_cooking());
    }

    #[test]
    fn consumes_inputs_then_produces() {
        let f = fixture(50);
        let mut machine = Machine::assembler(header(), Some(f.smelt));
        for _ in 0..3 {
            machine.give_item(Item::new(f.ore), &f.catalogs).unwrap();
        }
        let dt = f64_to_fixed64(0.5);

        let first = machine.tick(dt, &f.catalogs);
        assert_eq!(first.consumed.len(), 2);
        assert_eq!(machine.input().len(), 1);
        assert!(machine.is_cooking());

        let second = machine.tick(dt, &f.catalogs);
        assert_eq!(second.produced.map(|i| i.item_type), Some(f.plate));
        assert_eq!(machine.completed_recipes(), 1);
        assert!(!machine.is_cooking());

        // One ore left: not enough for another cycle.
        let third = machine.tick(dt, &f.catalogs);
        assert!(third.consumed.is_empty());
        assert_eq!(machine.output().len(), 1);
    }

    #[test]
    fn large_dt_starts_and_finishes_in_one_tick() {
        let f = fixture(50);
        let mut machine = Machine::miner(header(), f.mine);
        let result = machine.tick(Fixed64::ONE, &f.catalogs);
        assert!(result.produced.is_some());
        assert_eq!(machine.completed_recipes(), 1);
    }

    #[test]
    fn full_output_stalls_without_loss() {
        let f = fixture(1);
        let mut machine = Machine::assembler(header(), Some(f.smelt));
        for _ in 0..4 {
            machine.give_item(Item::new(f.ore), &f.catalogs).unwrap();
        }
        let dt = f64_to_fixed64(0.5);
        machine.tick(dt, &f.catalogs);
        machine.tick(dt, &f.catalogs);
        assert_eq!(machine.completed_recipes(), 1);
        assert!(machine.output().is_full());

        // Output full: no new cycle starts, inputs are untouched.
        for _ in 0..10 {
            let result = machine.tick(dt, &f.catalogs);
            assert!(result.consumed.is_empty());
        }
        assert_eq!(machine.input().len(), 2);
        assert_eq!(machine.completed_recipes(), 1);

        // Draining the output lets the next cycle run.
        assert!(machine.take_item().is_some());
        machine.tick(dt, &f.catalogs);
        machine.tick(dt, &f.catalogs);
        assert_eq!(machine.completed_recipes(), 2);
    }

    #[test]
    fn output_filling_mid_cycle_holds_progress() {
        let f = fixture(1);
        let mut machine = Machine::miner(header(), f.mine);
        machine.tick(f64_to_fixed64(0.25), &f.catalogs);
        assert!(machine.is_cooking());
        // Fill the output behind the machine's back.
        let (_, output) = machine.slots_mut();
        for _ in 0..50 {
            output.add(Item::new(f.ore), &f.catalogs.items).unwrap();
        }
        for _ in 0..5 {
            let result = machine.tick(f64_to_fixed64(0.25), &f.catalogs);
            assert!(result.produced.is_none());
        }
        assert_eq!(machine.progress(), f64_to_fixed64(0.5));
        assert_eq!(machine.completed_recipes(), 0);
    }

    #[test]
    fn disabled_machine_does_nothing() {
        let f = fixture(50);
        let mut machine = Machine::miner(header(), f.mine);
        assert!(machine.set_enabled(false));
        assert!(!machine.set_enabled(false));
        machine.tick(Fixed64::ONE, &f.catalogs);
        assert_eq!(machine.completed_recipes(), 0);
    }

    #[test]
    fn unknown_recipe_is_skipped() {
        let f = fixture(50);
        let mut machine = Machine::assembler(header(), Some(RecipeId(99)));
        assert_eq!(machine.tick(Fixed64::ONE, &f.catalogs), MachineTickResult::default());
    }

    #[test]
    fn accepts_only_recipe_inputs() {
        let f = fixture(50);
        let mut machine = Machine::assembler(header(), Some(f.smelt));
        assert!(machine.can_accept_item(&Item::new(f.ore), &f.catalogs));
        assert!(machine.give_item(Item::new(f.plate), &f.catalogs).is_err());

        let mut idle = Machine::assembler(header(), None);
        assert!(!idle.can_accept_item(&Item::new(f.ore), &f.catalogs));
        assert!(idle.give_item(Item::new(f.ore), &f.catalogs).is_err());
    }

    #[test]
    fn miner_refuses_deliveries() {
        let f = fixture(50);
        let mut miner = Machine::miner(header(), f.mine);
        assert_eq!(miner.kind(), EntityKind::Miner);
        assert!(miner.give_item(Item::new(f.ore), &f.catalogs).is_err());
    }

    #[test]
    fn set_recipe_evacuates_both_slots() {
        let f = fixture(50);
        let mut machine = Machine::assembler(header(), Some(f.smelt));
        for _ in 0..3 {
            machine.give_item(Item::new(f.ore), &f.catalogs).unwrap();
        }
        machine.tick(Fixed64::ONE, &f.catalogs);
        assert_eq!(machine.output().len(), 1);
        assert_eq!(machine.input().len(), 1);

        assert!(machine.set_recipe(Some(f.smelt)).is_none());

        let swap = machine.set_recipe(Some(f.mine)).unwrap();
        assert_eq!(swap.previous, Some(f.smelt));
        assert_eq!(swap.evacuated.len(), 2);
        assert!(machine.input().is_empty());
        assert!(machine.output().is_empty());
        assert_eq!(machine.progress(), Fixed64::ZERO);
    }
}
