//! Participant-side drivers for WabiSabi coinjoin rounds.
//!
//! An [`ArenaClient`] builds credential requests from a round's published
//! state and checks every response. [`AliceClient`] drives one input through
//! registration, confirmation and signing. [`BobClient`] registers outputs
//! anonymously, paying with credentials from a [`CredentialPool`].
//!
//! Drivers never guess the coordinator's state: any mismatch with the
//! published round is an error.
#![doc(html_root_url = "https://docs.rs/wabisabi-client")]
// Standard lints
#![warn(missing_docs)]
#![allow(clippy::try_err)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

#[macro_use]
extern crate tracing;

pub mod alice_client;
pub mod arena_client;
pub mod bob_client;
pub mod credential_pool;
pub mod error;
pub mod signer;

pub use alice_client::AliceClient;
pub use arena_client::ArenaClient;
pub use bob_client::BobClient;
pub use credential_pool::CredentialPool;
pub use error::ClientError;
pub use signer::Signer;
