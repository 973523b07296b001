//! Serde data file structs for game content definitions.
//!
//! These structs define the on-disk format for items and recipes. They are
//! deserialized from RON, JSON, or TOML data files and then resolved into
//! catalog types by the loader. The simulation config needs no separate
//! schema: [`beltworks_core::config::SimConfig`] deserializes directly.

use beltworks_core::catalog::ItemCategory;
use serde::Deserialize;

// ===========================================================================
// Items
// ===========================================================================

/// An item type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    /// Defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default = "default_stack_size")]
    pub stack_size: u32,
    #[serde(default = "default_true")]
    pub stackable: bool,
    /// RGBA; white when absent.
    #[serde(default)]
    pub tint: Option<[u8; 4]>,
}

fn default_stack_size() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe input entry, in short tuple form or full form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RecipeInputData {
    /// Short form: `("item_name", quantity)`.
    Short(String, u32),
    Full { item: String, quantity: u32 },
}

impl RecipeInputData {
    pub fn item(&self) -> &str {
        match self {
            RecipeInputData::Short(item, _) | RecipeInputData::Full { item, .. } => item,
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            RecipeInputData::Short(_, quantity) | RecipeInputData::Full { quantity, .. } => *quantity,
        }
    }
}

/// A recipe definition in a data file. No inputs makes it an extraction
/// recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<RecipeInputData>,
    pub output: String,
    /// Seconds per cycle.
    pub duration: f64,
}
