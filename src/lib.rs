//! Core library for the flash-arbitrage project.
//!
//! Each new block drives one decision cycle: both venues are quoted, the
//! settlement cost of each direction is estimated, and the more profitable
//! direction (if any) is executed through a flash-loan contract.

pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod models;
pub mod sources;
pub mod trigger;
pub mod utils;
