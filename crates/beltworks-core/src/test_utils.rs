//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::catalog::Catalogs;
use crate::config::SimConfig;
use crate::engine::Engine;
use crate::event::{Event, Listener};
use crate::fixed::Fixed64;
use crate::grid::{ChunkCoord, GridPosition, Rotation};
use crate::id::{ItemTypeId, RecipeId};
use crate::item::Item;
use std::cell::RefCell;
use std::rc::Rc;

// ===========================================================================
// Logging and numbers
// ===========================================================================

/// Route `log` output through `env_logger`; honours `RUST_LOG`. Safe to call
/// from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Catalogs
// ===========================================================================

pub fn reference_catalogs() -> Catalogs {
    Catalogs::with_defaults()
}

pub fn ore(catalogs: &Catalogs) -> ItemTypeId {
    catalogs.items.id_by_name("iron_ore").unwrap()
}

pub fn plate(catalogs: &Catalogs) -> ItemTypeId {
    catalogs.items.id_by_name("iron_plate").unwrap()
}

pub fn mine_recipe(catalogs: &Catalogs) -> RecipeId {
    catalogs.recipes.id_by_name("mine_iron_ore").unwrap()
}

pub fn smelt_recipe(catalogs: &Catalogs) -> RecipeId {
    catalogs.recipes.id_by_name("smelt_iron").unwrap()
}

pub fn engine() -> Engine {
    Engine::new(SimConfig::default(), reference_catalogs()).unwrap()
}

// ===========================================================================
// Events
// ===========================================================================

/// A listener that clones every event it sees into the returned vec.
pub fn recorder() -> (Rc<RefCell<Vec<Event>>>, Listener) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, Box::new(move |e: &Event| sink.borrow_mut().push(e.clone())))
}

// ===========================================================================
// Layouts
// ===========================================================================

/// Place `len` belts from `start` going east, each facing the next.
pub fn belt_line(engine: &mut Engine, start: GridPosition, len: i32) -> Vec<GridPosition> {
    (0..len)
        .map(|i| {
            let cell = start.offset(i, 0);
            engine.create_belt(cell, Rotation::Cw90).unwrap();
            cell
        })
        .collect()
}

/// Cells of a [`smelting_line`].
#[derive(Debug, Clone)]
pub struct SmeltingLine {
    pub miner: GridPosition,
    pub belts: Vec<GridPosition>,
    pub furnace: GridPosition,
    pub storage: GridPosition,
}

/// Miner -> connector -> three belts -> connector -> furnace -> connector ->
/// storage box, laid out east from `origin`. Connectors face west so they
/// pull from the west cell and push to the east one.
pub fn smelting_line(engine: &mut Engine, origin: GridPosition) -> SmeltingLine {
    let ore = ore(engine.catalogs());
    let smelt = smelt_recipe(engine.catalogs());
    let at = |dx| origin.offset(dx, 0);

    engine.create_miner(at(0), Rotation::None, ore).unwrap();
    engine.create_connector(at(1), Rotation::Cw270).unwrap();
    let belts = belt_line(engine, at(2), 3);
    engine.create_connector(at(5), Rotation::Cw270).unwrap();
    engine.create_machine(at(6), Rotation::None, Some(smelt)).unwrap();
    engine.create_connector(at(7), Rotation::Cw270).unwrap();
    engine.create_storage_box(at(8), Rotation::None).unwrap();

    SmeltingLine {
        miner: at(0),
        belts,
        furnace: at(6),
        storage: at(8),
    }
}

// ===========================================================================
// State setup
// ===========================================================================

/// Put `count` fresh items of `item_type` straight into the output slot of
/// the machine at `cell`. Returns how many fit.
pub fn fill_output(engine: &mut Engine, cell: GridPosition, item_type: ItemTypeId, count: usize) -> usize {
    let items = engine.catalogs().items.clone();
    let Some(machine) = engine
        .chunk_mut(ChunkCoord::containing(cell))
        .and_then(|chunk| chunk.machine_mut(cell))
    else {
        return 0;
    };
    let (_, output) = machine.slots_mut();
    (0..count)
        .take_while(|_| output.add(Item::new(item_type), &items).is_ok())
        .count()
}
