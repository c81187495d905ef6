//! # alpyne
//!
//! Client for exported AnyLogic models served by the AlpyneServer, and the
//! driver for a single run of the ABCA (Activity Based Costing Analysis) model.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │   abca-single-run (run module)   │
//!        └────────────────┬─────────────────┘
//!                         │ Simulation trait
//!                         ▼
//!        ┌──────────────────────────────────┐
//!        │           AnyLogicSim            │
//!        │  (schema, reset, action, outputs)│
//!        └───────┬──────────────────┬───────┘
//!                │ HTTP/JSON        │ spawn / quit
//!                ▼                  ▼
//!        ┌─────────────────────────────────┐
//!        │   AlpyneServer (java, model.jar)│
//!        └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - `sim`: the client handle and the `Simulation` trait
//! - `server`: model resolution and the server process
//! - `http`: JSON transport with retry
//! - `data`, `outputs`, `units`, `constants`: wire types
//! - `run`: the single-run driver behind the binary

pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod http;
pub mod outputs;
pub mod run;
pub mod server;
pub mod sim;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SimConfig;
pub use error::ModelError;
pub use sim::{AnyLogicSim, SimOptions, Simulation};
