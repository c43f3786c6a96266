//! Client errors.

use bitcoin::{Amount, OutPoint, TxOut};
use thiserror::Error;

use wabisabi_coordinator::{round, WabiSabiProtocolError};
use wabisabi_crypto::CryptoError;

/// A failed client operation.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ClientError {
    /// The coordinator rejected a request.
    #[error("coordinator rejected the request: {0}")]
    Protocol(#[from] WabiSabiProtocolError),

    /// A request couldn't be built, or the coordinator's credentials didn't
    /// verify.
    #[error("credential error: {0}")]
    Crypto(#[from] CryptoError),

    /// The coordinator answered with the wrong kind of response.
    #[error("unexpected response to {0} request")]
    UnexpectedResponse(&'static str),

    /// The round is no longer active or recently ended.
    #[error("round {0} is not published by the coordinator")]
    RoundNotPublished(round::Id),

    /// The round's published issuer parameters changed.
    #[error("round {0} changed its credential issuer parameters")]
    IssuerParametersChanged(round::Id),

    /// The round is in a phase that doesn't allow the operation.
    #[error("round is in {actual}, expected {expected}")]
    WrongPhase {
        /// The phase the operation needs.
        expected: round::Phase,
        /// The round's phase at the last refresh.
        actual: round::Phase,
    },

    /// The coin can't be registered in the round.
    #[error("coin {outpoint} can't be registered: {reason}")]
    CoinNotRegistrable {
        /// The coin's outpoint.
        outpoint: OutPoint,
        /// The round rule the coin breaks.
        reason: &'static str,
    },

    /// The output can't be registered in the round.
    #[error("output of {value} can't be registered: {reason}")]
    OutputNotRegistrable {
        /// The output's value.
        value: Amount,
        /// The round rule the output breaks.
        reason: &'static str,
    },

    /// Held credentials don't cover the requested spend.
    #[error("held credentials are worth {available}, but {needed} is needed")]
    InsufficientCredentials {
        /// The value the credentials can present.
        available: u64,
        /// The value the spend costs.
        needed: u64,
    },

    /// A value can't be held in one request's credentials.
    #[error("{value} does not fit in {count} credentials of at most {max}")]
    ValueTooLarge {
        /// The value to hold.
        value: u64,
        /// The number of credentials one request issues.
        count: usize,
        /// The largest value of one credential.
        max: u64,
    },

    /// A witness couldn't be created.
    #[error("could not sign: {0}")]
    Signing(&'static str),

    /// The coordinator's transaction doesn't spend this participant's input.
    #[error("the transaction does not spend {0}")]
    MissingInput(OutPoint),

    /// The coordinator's transaction is missing an output this participant
    /// registered.
    #[error("the transaction is missing an expected output: {0:?}")]
    MissingOutput(TxOut),
}
