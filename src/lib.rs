//! Generation-stepped projection of infections, discoveries and isolation
//! in a population split into meta-groups and contact levels, under
//! testing and isolation strategies.

pub mod arrival;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod groups;
pub mod isolation;
pub mod micro;
pub mod model;
pub mod scenario;
pub mod strategy;
pub mod units;
mod utils;

pub use error::ConfigError;
pub use scenario::{Scenario, SimOutput};
