pub mod broker;
pub mod config;
pub mod data;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod types;

pub use engine::{CycleReport, TradingEngine};
pub use error::{Result, TradingError};
pub use types::*;
