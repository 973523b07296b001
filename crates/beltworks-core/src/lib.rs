//! Beltworks Core -- the simulation engine for grid-based factory games.
//!
//! A world is a sparse map of 32×32 chunks. Each chunk owns the machines,
//! miners, belts, connectors and storage boxes placed on its cells and is
//! ticked as a unit by a fixed-timestep clock.
//!
//! # Step
//!
//! Each call to [`engine::Engine::step`] advances every dirty chunk by one
//! tick interval:
//!
//! 1. **Machines** -- idle machines start a cycle when their input slot holds
//!    enough of a recipe input and the output slot has room; cooking machines
//!    advance and finish into the output slot, or hold at full progress while
//!    it is full.
//! 2. **Belts** -- items advance head first, keeping their minimum spacing,
//!    and the head hands off to the downstream belt when it has room.
//! 3. **Connectors** -- pull one item from the cell in front when empty and
//!    push it into the cell behind.
//!
//! Chunk events are buffered and delivered to listeners after the step.
//!
//! # Placement
//!
//! ```rust
//! use beltworks_core::engine::Engine;
//! use beltworks_core::grid::{GridPosition, Rotation};
//!
//! let mut engine = Engine::with_defaults().unwrap();
//! let a = GridPosition::new(0, 0);
//! let b = GridPosition::new(1, 0);
//! engine.create_belt(a, Rotation::Cw90).unwrap();
//! engine.create_belt(b, Rotation::Cw90).unwrap();
//! assert_eq!(engine.next_belt(a), Some(b));
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- the clock, chunk map, event bus and boundary API.
//! - [`chunk::Chunk`] -- entity ownership, connection discovery, ticking.
//! - [`belt::Belt`], [`connector::Connector`], [`machine::Machine`],
//!   [`storage::StorageBox`] -- the entity kinds.
//! - [`entity::ItemSource`] / [`entity::ItemSink`] -- capabilities connectors
//!   move items through.
//! - [`catalog::Catalogs`] -- item and recipe definitions, passed in at
//!   construction.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventBus`] -- per-kind buffered events with listeners.
//! - [`query`] -- owned snapshots for renderers and UI.

pub mod belt;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod connector;
pub mod dirty;
pub mod engine;
pub mod entity;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod item;
pub mod machine;
pub mod query;
pub mod sim;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
