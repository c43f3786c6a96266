//! Arena requests and responses.

use bitcoin::{OutPoint, ScriptBuf, Witness};

use wabisabi_crypto::CredentialsRequest;

use crate::{
    alice,
    ownership::OwnershipProof,
    round::{self, ConnectionConfirmation, InputRegistration, OutputRegistration, Reissuance, RoundState},
};

/// A participant request to the [`Arena`](super::Arena).
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Request {
    /// Register an input, and get zero credentials.
    RegisterInput {
        round_id: round::Id,
        outpoint: OutPoint,
        ownership_proof: OwnershipProof,
        zero_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
    },

    /// Confirm a registered input is still online, and get real credentials.
    ConfirmConnection {
        round_id: round::Id,
        alice_id: alice::Id,
        zero_amount_request: CredentialsRequest,
        real_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
        real_weight_request: CredentialsRequest,
    },

    /// Register an output, paid for with credentials.
    RegisterOutput {
        round_id: round::Id,
        script: ScriptBuf,
        amount_request: CredentialsRequest,
        weight_request: CredentialsRequest,
    },

    /// Signal that an input is done registering outputs.
    ReadyToSign {
        round_id: round::Id,
        alice_id: alice::Id,
    },

    /// Add witnesses for inputs of the round's transaction.
    SignTransaction {
        round_id: round::Id,
        witnesses: Vec<(usize, Witness)>,
    },

    /// Unregister an input during input registration.
    RemoveInput {
        round_id: round::Id,
        alice_id: alice::Id,
    },

    /// Exchange credentials for new ones of the same total value.
    ReissueCredentials {
        round_id: round::Id,
        amount_request: CredentialsRequest,
        weight_request: CredentialsRequest,
        zero_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
    },

    /// Get the state of every active and recently ended round.
    GetStatus,
}

/// A successful [`Arena`](super::Arena) response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Response to [`Request::RegisterInput`].
    InputRegistration(InputRegistration),

    /// Response to [`Request::ConfirmConnection`].
    ConnectionConfirmation(ConnectionConfirmation),

    /// Response to [`Request::RegisterOutput`].
    OutputRegistration(OutputRegistration),

    /// Response to [`Request::ReissueCredentials`].
    Reissuance(Reissuance),

    /// Response to [`Request::ReadyToSign`], [`Request::SignTransaction`] and
    /// [`Request::RemoveInput`].
    Done,

    /// Response to [`Request::GetStatus`].
    Status(Vec<RoundState>),
}

impl Request {
    /// The round this request is for, if any.
    pub fn round_id(&self) -> Option<round::Id> {
        match self {
            Request::RegisterInput { round_id, .. }
            | Request::ConfirmConnection { round_id, .. }
            | Request::RegisterOutput { round_id, .. }
            | Request::ReadyToSign { round_id, .. }
            | Request::SignTransaction { round_id, .. }
            | Request::RemoveInput { round_id, .. }
            | Request::ReissueCredentials { round_id, .. } => Some(*round_id),
            Request::GetStatus => None,
        }
    }

    /// A short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::RegisterInput { .. } => "register_input",
            Request::ConfirmConnection { .. } => "confirm_connection",
            Request::RegisterOutput { .. } => "register_output",
            Request::ReadyToSign { .. } => "ready_to_sign",
            Request::SignTransaction { .. } => "sign_transaction",
            Request::RemoveInput { .. } => "remove_input",
            Request::ReissueCredentials { .. } => "reissue_credentials",
            Request::GetStatus => "get_status",
        }
    }
}
