//! Coinjoin rounds and their phases.
//!
//! A [`Round`] owns the transaction being built, the two credential issuers
//! and the registered inputs. Participants change a round through the
//! operations in this module, and the arena moves it through its [`Phase`]s.

use std::{collections::BTreeSet, fmt, time::Duration};

use bitcoin::{OutPoint, Weight};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{CryptoRng, RngCore};

use wabisabi_crypto::{CredentialIssuer, CredentialIssuerParameters};

use crate::{
    alice::{self, Alice},
    coinjoin_state::{CoinjoinState, Construction},
};

mod operations;
mod parameters;
mod step;

#[cfg(test)]
mod tests;

pub use operations::{ConnectionConfirmation, InputRegistration, OutputRegistration, Reissuance};
pub use parameters::RoundParameters;
pub use step::StepOutcome;

/// A random round identifier, displayed as hex.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; 32]);

impl Id {
    /// Generate a fresh random id.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create an id from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("round::Id")
            .field(&hex::encode(self.0))
            .finish()
    }
}

/// The phases of a round, in the only order they can happen.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum Phase {
    /// Inputs are registered with zero credentials.
    InputRegistration,
    /// Registered inputs confirm they are still online, and get real credentials.
    ConnectionConfirmation,
    /// Outputs are registered anonymously with credentials.
    OutputRegistration,
    /// Inputs sign the transaction.
    TransactionSigning,
    /// The signed transaction is being broadcast.
    TransactionBroadcasting,
    /// The round is over, see its [`EndRoundState`].
    Ended,
}

impl Phase {
    /// A short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::InputRegistration => "input_registration",
            Phase::ConnectionConfirmation => "connection_confirmation",
            Phase::OutputRegistration => "output_registration",
            Phase::TransactionSigning => "transaction_signing",
            Phase::TransactionBroadcasting => "transaction_broadcasting",
            Phase::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a round ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum EndRoundState {
    /// The round hasn't ended.
    None,
    /// Too few inputs registered or confirmed.
    AbortedNotEnoughAlices,
    /// The coordinator couldn't build the next state.
    AbortedWithError,
    /// No outputs were registered.
    AbortedNoOutputs,
    /// Some inputs didn't sign in time.
    NotAllAlicesSign,
    /// The node rejected the signed transaction.
    TransactionBroadcastFailed,
    /// The node accepted the signed transaction.
    TransactionBroadcasted,
}

impl EndRoundState {
    /// Did the round produce a coinjoin?
    pub fn is_success(&self) -> bool {
        *self == EndRoundState::TransactionBroadcasted
    }

    /// A short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            EndRoundState::None => "none",
            EndRoundState::AbortedNotEnoughAlices => "aborted_not_enough_alices",
            EndRoundState::AbortedWithError => "aborted_with_error",
            EndRoundState::AbortedNoOutputs => "aborted_no_outputs",
            EndRoundState::NotAllAlicesSign => "not_all_alices_sign",
            EndRoundState::TransactionBroadcastFailed => "transaction_broadcast_failed",
            EndRoundState::TransactionBroadcasted => "transaction_broadcasted",
        }
    }
}

/// What makes a round a blame round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blame {
    /// The round whose signers this round retries.
    pub blame_of: Id,
    /// The only outpoints that may register.
    pub whitelist: BTreeSet<OutPoint>,
}

/// A published snapshot of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundState {
    /// The round's id.
    pub id: Id,
    /// The round this blame round retries, if it is one.
    pub blame_of: Option<Id>,
    /// The current phase.
    pub phase: Phase,
    /// How the round ended, or [`EndRoundState::None`].
    pub end_round_state: EndRoundState,
    /// When the current phase started.
    pub phase_started: DateTime<Utc>,
    /// The round's parameters.
    pub parameters: RoundParameters,
    /// The amount issuer's public parameters.
    pub amount_issuer_parameters: CredentialIssuerParameters,
    /// The weight issuer's public parameters.
    pub weight_issuer_parameters: CredentialIssuerParameters,
    /// The number of registered inputs.
    pub input_count: usize,
    /// The transaction as far as it is built.
    pub coinjoin_state: CoinjoinState,
}

impl RoundState {
    /// Is this a blame round?
    pub fn is_blame_round(&self) -> bool {
        self.blame_of.is_some()
    }
}

/// A coinjoin round.
#[derive(Debug)]
pub struct Round {
    id: Id,
    parameters: RoundParameters,
    phase: Phase,
    end_round_state: EndRoundState,
    phase_started: DateTime<Utc>,
    alices: Vec<Alice>,
    coinjoin_state: CoinjoinState,
    amount_issuer: CredentialIssuer,
    weight_issuer: CredentialIssuer,
    blame: Option<Blame>,
}

impl Round {
    /// Create a round in input registration, with fresh issuer keys.
    ///
    /// Blame rounds only accept the outpoints in `blame`'s whitelist.
    pub fn new<R: RngCore + CryptoRng>(
        parameters: RoundParameters,
        blame: Option<Blame>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let amount_issuer = CredentialIssuer::random(parameters.max_amount_credential_value, rng);
        let weight_issuer = CredentialIssuer::random(parameters.max_weight_credential_value, rng);
        let coinjoin_state =
            CoinjoinState::Construction(Construction::new(parameters.max_transaction_weight));

        Self {
            id: Id::random(rng),
            parameters,
            phase: Phase::InputRegistration,
            end_round_state: EndRoundState::None,
            phase_started: now,
            alices: Vec::new(),
            coinjoin_state,
            amount_issuer,
            weight_issuer,
            blame,
        }
    }

    /// The round's id.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The round's parameters.
    pub fn parameters(&self) -> &RoundParameters {
        &self.parameters
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// How the round ended.
    pub fn end_round_state(&self) -> EndRoundState {
        self.end_round_state
    }

    /// When the current phase started.
    pub fn phase_started(&self) -> DateTime<Utc> {
        self.phase_started
    }

    /// The registered inputs.
    pub fn alices(&self) -> &[Alice] {
        &self.alices
    }

    /// The transaction as far as it is built.
    pub fn coinjoin_state(&self) -> &CoinjoinState {
        &self.coinjoin_state
    }

    /// The blame details, if this is a blame round.
    pub fn blame(&self) -> Option<&Blame> {
        self.blame.as_ref()
    }

    /// Is this a blame round?
    pub fn is_blame_round(&self) -> bool {
        self.blame.is_some()
    }

    /// The amount credential issuer.
    pub fn amount_issuer(&self) -> &CredentialIssuer {
        &self.amount_issuer
    }

    /// The weight credential issuer.
    pub fn weight_issuer(&self) -> &CredentialIssuer {
        &self.weight_issuer
    }

    /// A snapshot for publishing.
    pub fn state(&self) -> RoundState {
        RoundState {
            id: self.id,
            blame_of: self.blame.as_ref().map(|blame| blame.blame_of),
            phase: self.phase,
            end_round_state: self.end_round_state,
            phase_started: self.phase_started,
            parameters: self.parameters.clone(),
            amount_issuer_parameters: *self.amount_issuer.parameters(),
            weight_issuer_parameters: *self.weight_issuer.parameters(),
            input_count: self.alices.len(),
            coinjoin_state: self.coinjoin_state.clone(),
        }
    }

    /// The timeout of the current phase, if it has one.
    pub fn phase_timeout(&self) -> Option<Duration> {
        let parameters = &self.parameters;

        match self.phase {
            Phase::InputRegistration if self.is_blame_round() => {
                Some(parameters.blame_input_registration_timeout)
            }
            Phase::InputRegistration => Some(parameters.standard_input_registration_timeout),
            Phase::ConnectionConfirmation => Some(parameters.connection_confirmation_timeout),
            Phase::OutputRegistration => Some(parameters.output_registration_timeout),
            Phase::TransactionSigning => Some(parameters.transaction_signing_timeout),
            Phase::TransactionBroadcasting | Phase::Ended => None,
        }
    }

    /// Has the current phase run out of time at `now`?
    pub fn is_phase_timed_out(&self, now: DateTime<Utc>) -> bool {
        match self.phase_timeout() {
            Some(timeout) => {
                let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
                now.signed_duration_since(self.phase_started) >= timeout
            }
            None => false,
        }
    }

    /// The registered input with `id`.
    pub fn alice(&self, id: &alice::Id) -> Option<&Alice> {
        self.alices.iter().find(|alice| alice.id == *id)
    }

    /// The weight each confirmed input is credited, net of its own input weight.
    pub(crate) fn weight_credit(&self, alice: &Alice) -> Option<Weight> {
        let input_weight = alice.coin.input_weight()?;
        self.parameters
            .max_weight_allocation_per_alice
            .checked_sub(input_weight)
    }

    /// Move to the next phase.
    ///
    /// # Panics
    ///
    /// If `phase` isn't after the current phase.
    fn set_phase(&mut self, phase: Phase, now: DateTime<Utc>) {
        assert!(
            phase > self.phase,
            "round phases only move forward: {} -> {}",
            self.phase,
            phase,
        );

        info!(round_id = %self.id, from = %self.phase, to = %phase, "round phase transition");
        metrics::counter!("wabisabi.round.phase.transitions", "phase" => phase.name()).increment(1);

        self.phase = phase;
        self.phase_started = now;
    }

    /// End the round with `end_round_state`.
    pub(crate) fn end(&mut self, end_round_state: EndRoundState, now: DateTime<Utc>) {
        self.set_phase(Phase::Ended, now);
        self.end_round_state = end_round_state;

        if end_round_state.is_success() {
            info!(round_id = %self.id, inputs = self.alices.len(), "round succeeded");
        } else {
            info!(round_id = %self.id, outcome = end_round_state.name(), "round failed");
        }
        metrics::counter!("wabisabi.round.ended", "outcome" => end_round_state.name())
            .increment(1);
    }
}
