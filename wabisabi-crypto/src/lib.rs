//! Keyed-verification anonymous credentials for WabiSabi CoinJoin rounds.
//!
//! A [`CredentialIssuer`] certifies hidden amounts without learning them, and a
//! [`WabiSabiClient`] builds the matching requests. Every request moves value
//! between presented credentials and newly requested ones, and the issuer checks
//! a zero-knowledge proof that:
//!
//! - each presented credential carries a valid MAC and an unused serial number,
//! - each requested value is in range, and
//! - the public `delta` equals the presented value minus the requested value.
//!
//! The scheme is the algebraic MAC (MAC_GGM) over the Ristretto group, with
//! Fiat-Shamir sigma protocols bound to a `merlin` transcript.
#![doc(html_root_url = "https://docs.rs/wabisabi-crypto")]
// Standard lints
#![deny(missing_docs)]
#![allow(clippy::try_err)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

mod client;
mod credential;
mod error;
mod generators;
mod issuer;
mod keys;
mod mac;
mod requests;
mod statements;

pub mod proof_system;
pub mod transcript;


pub use client::{CredentialsResponseValidation, WabiSabiClient};
pub use credential::{Credential, CredentialPresentation};
pub use error::CryptoError;
pub use generators::{Generators, GENERATORS};
pub use issuer::{CredentialIssuer, PreparedIssuance};
pub use keys::{CredentialIssuerParameters, CredentialIssuerSecretKey};
pub use mac::Mac;
pub use requests::{CredentialsRequest, CredentialsResponse, IssuanceRequest};

/// The number of credentials requested by every request.
///
/// Requests always have the same shape, so the issuer can't tell a zero request
/// padded to this size from a request for real values.
pub const NUMBER_OF_CREDENTIALS: usize = 2;

/// Returns the number of bits needed to represent `max_value`.
///
/// Range proofs show that requested values are below `2^width`.
pub fn range_proof_width(max_value: u64) -> usize {
    (u64::BITS - max_value.leading_zeros()) as usize
}
