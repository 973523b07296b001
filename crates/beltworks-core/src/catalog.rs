//! Item and recipe catalogs.
//!
//! Both catalogs are plain owned values: they are built at startup (from
//! [`Catalogs::with_defaults`] or the data crate), handed to the engine, and
//! read by everything that needs stacking rules or recipe definitions. Lookups
//! of unknown ids return `None`; callers log and carry on.

use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{ItemTypeId, RecipeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Broad grouping used by UI filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    #[default]
    Resource,
    Intermediate,
    Product,
}

/// An item type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    /// Unique key, e.g. `iron_ore`.
    pub name: String,
    pub display_name: String,
    pub category: ItemCategory,
    pub stackable: bool,
    pub max_stack_size: u32,
    /// RGBA tint used by renderers.
    pub tint: [u8; 4],
}

impl ItemDef {
    /// A stackable item with the given stack size and a white tint.
    pub fn new(name: &str, display_name: &str, category: ItemCategory, max_stack_size: u32) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            category,
            stackable: true,
            max_stack_size,
            tint: [255, 255, 255, 255],
        }
    }

    /// How many of this item a single slot may hold.
    pub fn stack_limit(&self) -> u32 {
        if self.stackable {
            self.max_stack_size.max(1)
        } else {
            1
        }
    }
}

/// Item type definitions keyed by [`ItemTypeId`], with a name index.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: BTreeMap<ItemTypeId, ItemDef>,
    by_name: HashMap<String, ItemTypeId>,
    next_id: u32,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new item type under a fresh id.
    pub fn register(&mut self, def: ItemDef) -> Result<ItemTypeId, CatalogError> {
        if self.by_name.contains_key(&def.name) {
            return Err(CatalogError::DuplicateName(def.name));
        }
        let id = ItemTypeId(self.next_id);
        self.insert(id, def);
        Ok(id)
    }

    /// Add or overwrite the definition stored under `id`. Returns the
    /// definition it replaced.
    pub fn insert(&mut self, id: ItemTypeId, def: ItemDef) -> Option<ItemDef> {
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        let name = def.name.clone();
        let previous = self.items.insert(id, def);
        if let Some(prev) = &previous
            && self.by_name.get(&prev.name) == Some(&id)
        {
            self.by_name.remove(&prev.name);
        }
        self.by_name.insert(name, id);
        previous
    }

    pub fn remove(&mut self, id: ItemTypeId) -> Option<ItemDef> {
        let def = self.items.remove(&id)?;
        self.by_name.remove(&def.name);
        Some(def)
    }

    pub fn get(&self, id: ItemTypeId) -> Option<&ItemDef> {
        self.items.get(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<ItemTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: ItemTypeId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemTypeId, &ItemDef)> {
        self.items.iter().map(|(&id, def)| (id, def))
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// One accepted input of a recipe and how many of it a cycle consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeInput {
    pub item_type: ItemTypeId,
    pub quantity: u32,
}

/// A production rule.
///
/// A machine has a single input slot, so the listed inputs are alternatives:
/// a cycle starts once the slot holds `quantity` of any one entry's type.
/// A recipe with no inputs is an extraction recipe, the kind a miner runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub name: String,
    /// Seconds per cycle.
    pub duration: Fixed64,
    pub output: ItemTypeId,
    pub inputs: Vec<RecipeInput>,
}

impl RecipeDef {
    pub fn new(name: &str, duration: Fixed64, output: ItemTypeId, inputs: Vec<RecipeInput>) -> Self {
        Self {
            name: name.to_string(),
            duration,
            output,
            inputs,
        }
    }

    /// Whether this recipe lists `item_type` as an input.
    pub fn accepts(&self, item_type: ItemTypeId) -> bool {
        self.inputs.iter().any(|input| input.item_type == item_type)
    }

    /// The input entry for `item_type`, if any.
    pub fn input_for(&self, item_type: ItemTypeId) -> Option<&RecipeInput> {
        self.inputs.iter().find(|input| input.item_type == item_type)
    }

    pub fn is_extraction(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Recipe definitions keyed by [`RecipeId`], with a name index.
#[derive(Debug, Clone, Default)]
pub struct RecipeCatalog {
    recipes: BTreeMap<RecipeId, RecipeDef>,
    by_name: HashMap<String, RecipeId>,
    next_id: u32,
}

impl RecipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new recipe under a fresh id.
    pub fn register(&mut self, def: RecipeDef) -> Result<RecipeId, CatalogError> {
        if self.by_name.contains_key(&def.name) {
            return Err(CatalogError::DuplicateName(def.name));
        }
        let id = RecipeId(self.next_id);
        self.insert(id, def);
        Ok(id)
    }

    /// Add or overwrite the recipe stored under `id`. Returns the recipe it
    /// replaced.
    pub fn insert(&mut self, id: RecipeId, def: RecipeDef) -> Option<RecipeDef> {
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        let name = def.name.clone();
        let previous = self.recipes.insert(id, def);
        if let Some(prev) = &previous
            && self.by_name.get(&prev.name) == Some(&id)
        {
            self.by_name.remove(&prev.name);
        }
        self.by_name.insert(name, id);
        previous
    }

    pub fn remove(&mut self, id: RecipeId) -> Option<RecipeDef> {
        let def = self.recipes.remove(&id)?;
        self.by_name.remove(&def.name);
        Some(def)
    }

    pub fn get(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<RecipeId> {
        self.by_name.get(name).copied()
    }

    /// The first extraction recipe producing `item_type`, in id order.
    pub fn extraction_recipe_for(&self, item_type: ItemTypeId) -> Option<RecipeId> {
        self.recipes
            .iter()
            .find(|(_, def)| def.is_extraction() && def.output == item_type)
            .map(|(&id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecipeId, &RecipeDef)> {
        self.recipes.iter().map(|(&id, def)| (id, def))
    }
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

/// The item and recipe catalogs, passed together into the engine.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub items: ItemCatalog,
    pub recipes: RecipeCatalog,
}

impl Catalogs {
    pub fn new(items: ItemCatalog, recipes: RecipeCatalog) -> Self {
        Self { items, recipes }
    }

    /// Built-in content: two ores with their miners' extraction recipes,
    /// coal and stone, smelting and a gear recipe.
    pub fn with_defaults() -> Self {
        let mut items = ItemCatalog::new();
        let mut recipes = RecipeCatalog::new();

        let defaults = [
            ("iron_ore", "Iron Ore", ItemCategory::Resource, [161, 157, 148, 255]),
            ("copper_ore", "Copper Ore", ItemCategory::Resource, [196, 112, 64, 255]),
            ("coal", "Coal", ItemCategory::Resource, [40, 40, 40, 255]),
            ("stone", "Stone", ItemCategory::Resource, [128, 128, 128, 255]),
            ("iron_plate", "Iron Plate", ItemCategory::Intermediate, [200, 200, 210, 255]),
            ("copper_plate", "Copper Plate", ItemCategory::Intermediate, [230, 140, 90, 255]),
            ("iron_gear", "Iron Gear", ItemCategory::Product, [170, 170, 180, 255]),
        ];
        for (name, display, category, tint) in defaults {
            let mut def = ItemDef::new(name, display, category, 50);
            def.tint = tint;
            items.insert(ItemTypeId(items.len() as u32), def);
        }

        let id = |name: &str| items.id_by_name(name).unwrap_or(ItemTypeId(u32::MAX));
        let one = |name: &str, quantity: u32| {
            vec![RecipeInput {
                item_type: id(name),
                quantity,
            }]
        };
        let table = [
            ("mine_iron_ore", 1.0, "iron_ore", Vec::new()),
            ("mine_copper_ore", 1.0, "copper_ore", Vec::new()),
            ("mine_coal", 1.0, "coal", Vec::new()),
            ("mine_stone", 1.0, "stone", Vec::new()),
            ("smelt_iron", 2.0, "iron_plate", one("iron_ore", 1)),
            ("smelt_copper", 2.0, "copper_plate", one("copper_ore", 1)),
            ("iron_gear", 1.5, "iron_gear", one("iron_plate", 2)),
        ];
        for (name, duration, output, inputs) in table {
            let def = RecipeDef::new(name, f64_to_fixed64(duration), id(output), inputs);
            recipes.insert(RecipeId(recipes.len() as u32), def);
        }

        Self { items, recipes }
    }

    /// Check that every recipe references known items, has a non-negative
    /// duration, and asks for an input quantity a single slot can hold.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (_, recipe) in self.recipes.iter() {
            if recipe.duration < Fixed64::ZERO {
                return Err(CatalogError::NegativeDuration(recipe.name.clone()));
            }
            let unknown = |item| CatalogError::UnknownItemRef {
                recipe: recipe.name.clone(),
                item,
            };
            if !self.items.contains(recipe.output) {
                return Err(unknown(recipe.output));
            }
            for input in &recipe.inputs {
                let def = self.items.get(input.item_type).ok_or_else(|| unknown(input.item_type))?;
                if input.quantity == 0 {
                    return Err(CatalogError::ZeroInputQuantity {
                        recipe: recipe.name.clone(),
                        item: input.item_type,
                    });
                }
                if input.quantity > def.stack_limit() {
                    return Err(CatalogError::InputExceedsStack {
                        recipe: recipe.name.clone(),
                        item: input.item_type,
                        quantity: input.quantity,
                        stack_limit: def.stack_limit(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("recipe {recipe} references unknown item {item:?}")]
    UnknownItemRef { recipe: String, item: ItemTypeId },
    #[error("recipe {0} has a negative duration")]
    NegativeDuration(String),
    #[error("recipe {recipe} consumes zero of {item:?}")]
    ZeroInputQuantity { recipe: String, item: ItemTypeId },
    #[error("recipe {recipe} needs {quantity} of {item:?} but a slot holds at most {stack_limit}")]
    InputExceedsStack {
        recipe: String,
        item: ItemTypeId,
        quantity: u32,
        stack_limit: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_sequential_ids() {
        let mut items = ItemCatalog::new();
        let a = items.register(ItemDef::new("a", "A", ItemCategory::Resource, 10)).unwrap();
        let b = items.register(ItemDef::new("b", "B", ItemCategory::Resource, 10)).unwrap();
        assert_eq!(a, ItemTypeId(0));
        assert_eq!(b, ItemTypeId(1));
        assert_eq!(items.id_by_name("b"), Some(b));
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut items = ItemCatalog::new();
        items.register(ItemDef::new("a", "A", ItemCategory::Resource, 10)).unwrap();
        let err = items
            .register(ItemDef::new("a", "Again", ItemCategory::Resource, 10))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn insert_overwrites_and_reindexes() {
        let mut items = ItemCatalog::new();
        let id = ItemTypeId(7);
        assert!(items.insert(id, ItemDef::new("old", "Old", ItemCategory::Resource, 5)).is_none());
        let prev = items.insert(id, ItemDef::new("new", "New", ItemCategory::Product, 9));
        assert_eq!(prev.unwrap().name, "old");
        assert_eq!(items.id_by_name("new"), Some(id));
        assert_eq!(items.id_by_name("old"), None);
        assert_eq!(items.get(id).unwrap().max_stack_size, 9);

        // Fresh registrations never collide with explicitly inserted ids.
        let next = items.register(ItemDef::new("x", "X", ItemCategory::Resource, 1)).unwrap();
        assert_eq!(next, ItemTypeId(8));
    }

    #[test]
    fn remove_drops_name_index() {
        let mut recipes = RecipeCatalog::new();
        let id = recipes
            .register(RecipeDef::new("r", Fixed64::ONE, ItemTypeId(0), vec![]))
            .unwrap();
        assert!(recipes.remove(id).is_some());
        assert!(recipes.get(id).is_none());
        assert!(recipes.id_by_name("r").is_none());
        assert!(recipes.remove(id).is_none());
    }

    #[test]
    fn non_stackable_limit_is_one() {
        let mut def = ItemDef::new("drill", "Drill", ItemCategory::Product, 20);
        assert_eq!(def.stack_limit(), 20);
        def.stackable = false;
        assert_eq!(def.stack_limit(), 1);
    }

    #[test]
    fn recipe_accepts_listed_inputs() {
        let recipe = RecipeDef::new(
            "smelt",
            Fixed64::ONE,
            ItemTypeId(1),
            vec![RecipeInput {
                item_type: ItemTypeId(0),
                quantity: 2,
            }],
        );
        assert!(recipe.accepts(ItemTypeId(0)));
        assert!(!recipe.accepts(ItemTypeId(1)));
        assert_eq!(recipe.input_for(ItemTypeId(0)).unwrap().quantity, 2);
        assert!(!recipe.is_extraction());
    }

    #[test]
    fn defaults_are_valid() {
        let catalogs = Catalogs::with_defaults();
        catalogs.validate().unwrap();
        let ore = catalogs.items.id_by_name("iron_ore").unwrap();
        let mine = catalogs.recipes.extraction_recipe_for(ore).unwrap();
        assert_eq!(catalogs.recipes.get(mine).unwrap().name, "mine_iron_ore");
        let plate = catalogs.items.id_by_name("iron_plate").unwrap();
        assert!(catalogs.recipes.extraction_recipe_for(plate).is_none());
    }

    #[test]
    fn validate_catches_unknown_item() {
        let mut catalogs = Catalogs::default();
        catalogs
            .recipes
            .register(RecipeDef::new("ghost", Fixed64::ONE, ItemTypeId(42), vec![]))
            .unwrap();
        assert!(matches!(
            catalogs.validate(),
            Err(CatalogError::UnknownItemRef { item: ItemTypeId(42), .. })
        ));
    }

    #[test]
    fn validate_catches_negative_duration() {
        let mut catalogs = Catalogs::default();
        let ore = catalogs
            .items
            .register(ItemDef::new("ore", "Ore", ItemCategory::Resource, 10))
            .unwrap();
        catalogs
            .recipes
            .register(RecipeDef::new("bad", -Fixed64::ONE, ore, vec![]))
            .unwrap();
        assert!(matches!(catalogs.validate(), Err(CatalogError::NegativeDuration(_))));
    }

    fn catalogs_with_input(stack: u32, quantity: u32) -> Catalogs {
        let mut catalogs = Catalogs::default();
        let ore = catalogs
            .items
            .register(ItemDef::new("ore", "Ore", ItemCategory::Resource, stack))
            .unwrap();
        let plate = catalogs
            .items
            .register(ItemDef::new("plate", "Plate", ItemCategory::Intermediate, stack))
            .unwrap();
        catalogs
            .recipes
            .register(RecipeDef::new(
                "big",
                Fixed64::ONE,
                plate,
                vec![RecipeInput {
                    item_type: ore,
                    quantity,
                }],
            ))
            .unwrap();
        catalogs
    }

    #[test]
    fn validate_catches_quantity_above_stack_limit() {
        assert!(matches!(
            catalogs_with_input(5, 10).validate(),
            Err(CatalogError::InputExceedsStack {
                quantity: 10,
                stack_limit: 5,
                ..
            })
        ));
        catalogs_with_input(5, 5).validate().unwrap();
    }

    #[test]
    fn validate_catches_zero_quantity_input() {
        assert!(matches!(
            catalogs_with_input(5, 0).validate(),
            Err(CatalogError::ZeroInputQuantity { .. })
        ));
    }
}
