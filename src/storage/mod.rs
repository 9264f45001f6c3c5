//! Storage mechanisms for the provider-hosted tables

pub mod memory;
pub mod models;
pub mod rest;
pub mod traits;

pub use memory::MemoryDataStore;
pub use rest::PostgrestStore;
pub use traits::{decode_first, decode_rows, DataStore, Filter, OnConflict, Order, Query, StoreAuth};
