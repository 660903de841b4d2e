//! Simulation core of a smart water dispenser.
//!
//! A level that drains one percent per tick while dispensing, a usage ledger
//! holding the five most recent runs and refills, and low-water / empty /
//! refilled events for a notification collaborator. Rules are pure functions
//! in [`logic`]; [`engine::Dispenser`] applies them against a [`scheduler`]
//! and a [`notifier`], and [`service`] hosts the engine on tokio.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod invariants;
pub mod logic;
pub mod mbt;
pub mod notifier;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod simulator;
pub mod types;

pub use engine::Dispenser;
pub use error::{DispenserError, StoreError};
pub use types::{DispenserEvent, DispensingState, Settings, State, UsageHistoryItem};
