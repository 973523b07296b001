//! Data-driven content for Beltworks.
//!
//! Items, recipes and the simulation config are read from a directory of
//! RON, TOML or JSON files, names are resolved to catalog ids, and the
//! result is validated before an engine ever sees it.
//!
//! ```no_run
//! use beltworks_core::engine::Engine;
//! use std::path::Path;
//!
//! let data = beltworks_data::load_game_data(Path::new("assets/data"))?;
//! let engine = Engine::new(data.config, data.catalogs)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, GameData, load_catalogs, load_config, load_game_data};
