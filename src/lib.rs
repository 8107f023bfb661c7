pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod network;
pub mod node;

pub use crate::error::ChordError;
