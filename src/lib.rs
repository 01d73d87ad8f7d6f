//! Control core for a polling-station ballot-marking device.
//!
//! The core issues one unique ballot to each authenticated voter, captures a
//! single-choice or ranked selection, and durably commits the resulting vote
//! exactly once. A ballot and a voter authorization token are each consumed
//! at most once, even across crashes.
//!
//! Screen layout, the printer wire protocol, the card block protocol and
//! provisioning tools all live outside this crate; they connect through the
//! traits in [`peripherals`] and [`hardware`].

pub mod config;
pub mod decrypt;
pub mod error;
pub mod hardware;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod peripherals;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
