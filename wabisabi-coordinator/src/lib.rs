//! A WabiSabi CoinJoin coordinator.
//!
//! The [`Arena`](arena::Arena) runs rounds of the protocol: participants
//! register inputs, confirm their connection, register outputs anonymously,
//! and sign the resulting transaction. Value and size are accounted with
//! anonymous credentials from [`wabisabi_crypto`], so the coordinator never
//! learns which input funded which output.
//!
//! Participants that stall a round are recorded in the [`Prison`](prison::Prison).
#![doc(html_root_url = "https://docs.rs/wabisabi-coordinator")]
// Standard lints
#![warn(missing_docs)]
#![allow(clippy::try_err)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate tracing;

pub mod alice;
pub mod arena;
pub mod coin;
pub mod coinjoin_state;
pub mod config;
pub mod error;
pub mod node;
pub mod ownership;
pub mod prison;
pub mod round;
pub mod witness;


pub use arena::Arena;
pub use config::Config;
pub use error::{BoxError, WabiSabiProtocolError, WabiSabiProtocolErrorCode};
