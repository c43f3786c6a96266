//! Errors for credential requests and responses.

use thiserror::Error;

/// A credential request or response was rejected.
///
/// Issuers return these errors before any serial number or balance is recorded.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CryptoError {
    #[error("expected {expected} requested credentials, got {actual}")]
    InvalidNumberOfRequestedCredentials { expected: usize, actual: usize },

    #[error("expected {expected} presented credentials, got {actual}")]
    InvalidNumberOfPresentedCredentials { expected: usize, actual: usize },

    #[error("expected {expected} bit commitments, got {actual}")]
    InvalidBitCommitment { expected: usize, actual: usize },

    #[error("credential value {value} is larger than the maximum {max}")]
    ValueOutOfRange { value: u64, max: u64 },

    #[error("request delta {delta} is outside the allowed range of +/- {bound}")]
    DeltaOutOfRange { delta: i64, bound: u64 },

    #[error("zero value requests must have a zero delta, got {0}")]
    NonZeroNullRequestDelta(i64),

    #[error("a serial number was presented twice in the same request")]
    SerialNumberDuplicated,

    #[error("a serial number was already used by an earlier request")]
    SerialNumberAlreadyUsed,

    #[error("coordinator received invalid proofs")]
    CoordinatorReceivedInvalidProofs,

    #[error("client received invalid issuance proofs")]
    ClientReceivedInvalidProofs,

    #[error("expected {expected} issued credentials, got {actual}")]
    IssuedCredentialNumberMismatch { expected: usize, actual: usize },

    #[error("the prepared issuance belongs to another issuer")]
    ForeignIssuance,
}
