// src/config/mod.rs

//! Spawn profiles stored as TOML.
//!
//! - `model.rs`: the serde data model and its conversion to a `SpawnRequest`.
//! - `loader.rs`: reading profiles from disk.
//! - `validate.rs`: `RawSpawnConfig` → `SpawnConfig`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{EnvironmentSection, RawSpawnConfig, RemapConfig, SpawnConfig, StdioSection};
