//! Credential request and response messages.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use serde::{Deserialize, Serialize};

use crate::{proof_system::Proof, CredentialPresentation, Mac};

/// One requested credential: the attribute commitment, and the bit commitments
/// of its range proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    /// `Ma = a·Gg + r·Gh`
    pub ma: RistrettoPoint,
    /// Empty in zero value requests.
    pub bit_commitments: Vec<RistrettoPoint>,
}

/// A request that presents credentials and asks for new ones.
///
/// A request that presents nothing is a zero value request: every requested
/// credential must have value zero, and `delta` must be zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRequest {
    /// Presented value minus requested value.
    ///
    /// Positive when value leaves the credential system, negative when the
    /// issuer certifies new value.
    pub delta: i64,
    /// The presented credentials.
    pub presented: Vec<CredentialPresentation>,
    /// The requested credentials.
    pub requested: Vec<IssuanceRequest>,
    /// Proofs for shows, then requests, then the balance.
    pub proofs: Vec<Proof>,
}

impl CredentialsRequest {
    /// Is this a zero value request?
    pub fn is_null_request(&self) -> bool {
        self.presented.is_empty()
    }

    /// The serial numbers of the presented credentials.
    pub fn serial_numbers(&self) -> impl Iterator<Item = CompressedRistretto> + '_ {
        self.presented.iter().map(CredentialPresentation::serial_number)
    }
}

/// The issuer's answer to a [`CredentialsRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsResponse {
    /// One MAC per requested credential, in request order.
    pub issued: Vec<Mac>,
    /// One issuance proof per MAC.
    pub proofs: Vec<Proof>,
}
