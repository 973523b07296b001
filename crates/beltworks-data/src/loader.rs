//! Resolution pipeline: reads data files, resolves names, builds catalogs.
//!
//! A data directory holds `items.*` (required), `recipes.*` and `config.*`
//! (both optional), each in RON, TOML or JSON. Exactly one format per base
//! name is allowed.

use crate::schema::{ItemData, RecipeData};
use beltworks_core::catalog::{CatalogError, Catalogs, ItemDef, RecipeDef, RecipeInput};
use beltworks_core::config::{ConfigError, SimConfig};
use beltworks_core::fixed::f64_to_fixed64;
use beltworks_core::id::ItemTypeId;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest recipe duration accepted, in seconds.
const MAX_RECIPE_SECONDS: f64 = 86_400.0;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error("recipe '{name}' in {file} has duration {duration}, expected 0..={max}", max = MAX_RECIPE_SECONDS)]
    BadDuration { file: PathBuf, name: String, duration: f64 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for `{base_name}.ron`, `.toml` or `.json`.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one exists.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }

    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    debug!("reading {} as {format:?}", path.display());

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. TOML files keep the array under
/// `toml_key` in a top-level table; RON and JSON hold the array directly.
pub fn deserialize_list<T: DeserializeOwned>(path: &Path, toml_key: &str) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let mut table: toml::Table = deserialize_file(path)?;
    table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Fail with `DuplicateName` if `name` is already in the map.
pub fn check_duplicate<V>(map: &HashMap<String, V>, name: &str, file: &Path) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything a data directory describes.
#[derive(Debug, Clone)]
pub struct GameData {
    pub catalogs: Catalogs,
    pub config: SimConfig,
}

/// Load and validate the item and recipe catalogs in `dir`.
pub fn load_catalogs(dir: &Path) -> Result<Catalogs, DataLoadError> {
    let mut catalogs = Catalogs::default();

    // Items first: recipes refer to them by name.
    let items_path = require_data_file(dir, "items")?;
    let items: Vec<ItemData> = deserialize_list(&items_path, "items")?;
    let mut item_ids: HashMap<String, ItemTypeId> = HashMap::with_capacity(items.len());
    for item in items {
        check_duplicate(&item_ids, &item.name, &items_path)?;
        let name = item.name.clone();
        let id = catalogs.items.register(item_def(item))?;
        item_ids.insert(name, id);
    }

    if let Some(recipes_path) = find_data_file(dir, "recipes")? {
        let recipes: Vec<RecipeData> = deserialize_list(&recipes_path, "recipes")?;
        let mut seen: HashMap<String, ()> = HashMap::with_capacity(recipes.len());
        for recipe in recipes {
            check_duplicate(&seen, &recipe.name, &recipes_path)?;
            seen.insert(recipe.name.clone(), ());
            let def = recipe_def(&recipe, &item_ids, &recipes_path)?;
            catalogs.recipes.register(def)?;
        }
    }

    catalogs.validate()?;
    Ok(catalogs)
}

fn item_def(data: ItemData) -> ItemDef {
    let display_name = data.display_name.as_deref().unwrap_or(&data.name);
    let mut def = ItemDef::new(&data.name, display_name, data.category, data.stack_size);
    def.stackable = data.stackable;
    if let Some(tint) = data.tint {
        def.tint = tint;
    }
    def
}

fn recipe_def(
    data: &RecipeData,
    item_ids: &HashMap<String, ItemTypeId>,
    file: &Path,
) -> Result<RecipeDef, DataLoadError> {
    if !(0.0..=MAX_RECIPE_SECONDS).contains(&data.duration) {
        return Err(DataLoadError::BadDuration {
            file: file.to_path_buf(),
            name: data.name.clone(),
            duration: data.duration,
        });
    }
    let output = *resolve_name(item_ids, &data.output, file, "item")?;
    let inputs = data
        .inputs
        .iter()
        .map(|input| {
            let item_type = *resolve_name(item_ids, input.item(), file, "item")?;
            Ok(RecipeInput {
                item_type,
                quantity: input.quantity(),
            })
        })
        .collect::<Result<Vec<_>, DataLoadError>>()?;
    Ok(RecipeDef::new(&data.name, f64_to_fixed64(data.duration), output, inputs))
}

/// Load `config.*` from `dir`, or the defaults when there is none.
pub fn load_config(dir: &Path) -> Result<SimConfig, DataLoadError> {
    let config = match find_data_file(dir, "config")? {
        Some(path) => deserialize_file(&path)?,
        None => {
            debug!("no config file in {}, using defaults", dir.display());
            SimConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load catalogs and config from a data directory.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    info!("loading game data from {}", dir.display());
    let catalogs = load_catalogs(dir)?;
    let config = load_config(dir)?;
    info!(
        "loaded {} items and {} recipes at {} tps",
        catalogs.items.len(),
        catalogs.recipes.len(),
        config.ticks_per_second
    );
    Ok(GameData { catalogs, config })
}

// ===========================================================================
// Tests
// ===========================================================================
