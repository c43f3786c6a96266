//! Errors returned to protocol participants.

use thiserror::Error;

use wabisabi_crypto::CryptoError;

use crate::coinjoin_state;

/// A boxed [`std::error::Error`], used by collaborator services.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reason a participant request was rejected.
///
/// Every rejection leaves the round unchanged, and punishes nobody.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WabiSabiProtocolErrorCode {
    /// There is no active round with the requested id.
    RoundNotFound,
    /// The round is in a phase that doesn't accept this request.
    WrongPhase,
    /// The input is banned in every round.
    InputBanned,
    /// The round is a blame round, and the input isn't on its whitelist.
    InputNotWhitelisted,
    /// The input is already registered in this round.
    AliceAlreadyRegistered,
    /// The node doesn't know the input, or it is already spent.
    InputSpent,
    /// The script type isn't allowed in this round.
    ScriptNotAllowed,
    /// The input or output amount is below the allowed range.
    NotEnoughFunds,
    /// The input amount is above the allowed range.
    TooMuchFunds,
    /// The input is worth less than the fees needed to spend it.
    UneconomicalInput,
    /// The ownership proof doesn't verify for this round.
    WrongOwnershipProof,
    /// The round has its maximum number of inputs.
    RoundFull,
    /// A credential request was malformed, reused a serial number, or had invalid proofs.
    CredentialVerificationFailed,
    /// The round has no input with the requested id.
    AliceNotFound,
    /// The input already confirmed its connection.
    AliceAlreadyConfirmedConnection,
    /// The amount credential request moves the wrong amount.
    IncorrectRequestedAmountCredentials,
    /// The weight credential request moves the wrong weight.
    IncorrectRequestedWeightCredentials,
    /// The output amount is above the allowed range.
    OutputTooLarge,
    /// The output script is already registered in this round.
    AlreadyRegisteredScript,
    /// The transaction would exceed the maximum weight.
    TransactionTooLarge,
    /// A witness doesn't sign the round's transaction.
    InvalidWitness,
    /// A different witness was already accepted for the input.
    WitnessAlreadyProvided,
    /// The node couldn't answer a lookup needed by the request.
    NodeUnavailable,
}

/// A rejected participant request.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct WabiSabiProtocolError {
    /// The machine-readable reason.
    pub code: WabiSabiProtocolErrorCode,
    /// A human-readable description.
    pub message: String,
}

impl WabiSabiProtocolError {
    /// Create an error with `code` and `message`.
    pub fn new(code: WabiSabiProtocolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<WabiSabiProtocolErrorCode> for WabiSabiProtocolError {
    fn from(code: WabiSabiProtocolErrorCode) -> Self {
        Self::new(code, format!("{code:?}"))
    }
}

impl From<CryptoError> for WabiSabiProtocolError {
    fn from(error: CryptoError) -> Self {
        Self::new(
            WabiSabiProtocolErrorCode::CredentialVerificationFailed,
            error.to_string(),
        )
    }
}

impl From<coinjoin_state::Error> for WabiSabiProtocolError {
    fn from(error: coinjoin_state::Error) -> Self {
        use coinjoin_state::Error::*;
        use WabiSabiProtocolErrorCode as Code;

        let code = match error {
            TransactionTooLarge { .. } => Code::TransactionTooLarge,
            DuplicateInput(_) => Code::AliceAlreadyRegistered,
            DuplicateOutputScript => Code::AlreadyRegisteredScript,
            UnsupportedScript => Code::ScriptNotAllowed,
            WitnessAlreadyProvided(_) => Code::WitnessAlreadyProvided,
            InputIndexOutOfRange(_) => Code::InvalidWitness,
            WrongState { .. } => Code::WrongPhase,
        };

        Self::new(code, error.to_string())
    }
}
