//! Participant operations on a round.
//!
//! Every operation checks everything, including both issuers' credential
//! proofs, before it changes the round. A rejected operation leaves no trace.

use bitcoin::{ScriptBuf, TxOut, Witness};
use rand::{CryptoRng, RngCore};

use wabisabi_crypto::{CredentialIssuer, CredentialsRequest, CredentialsResponse, PreparedIssuance};

use crate::{
    alice::{self, Alice},
    coin::{fee, output_weight, Coin, ScriptType},
    coinjoin_state::CoinjoinState,
    ownership::OwnershipProof,
    witness::verify_input_witness,
    WabiSabiProtocolError, WabiSabiProtocolErrorCode as Code,
};

use super::{Phase, Round};

/// The result of a successful input registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRegistration {
    /// The new input's id.
    pub alice_id: alice::Id,
    /// Zero amount credentials.
    pub amount_credentials: CredentialsResponse,
    /// Zero weight credentials.
    pub weight_credentials: CredentialsResponse,
}

/// The result of a successful connection confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfirmation {
    /// Credentials for the input's effective value.
    pub real_amount_credentials: CredentialsResponse,
    /// Fresh zero amount credentials.
    pub zero_amount_credentials: CredentialsResponse,
    /// Credentials for the input's weight allocation.
    pub real_weight_credentials: CredentialsResponse,
    /// Fresh zero weight credentials.
    pub zero_weight_credentials: CredentialsResponse,
}

/// The result of a successful output registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRegistration {
    /// The change left in the amount request, usually zero credentials.
    pub amount_credentials: CredentialsResponse,
    /// The change left in the weight request.
    pub weight_credentials: CredentialsResponse,
}

/// The result of a successful credential reissuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reissuance {
    /// The reissued amount credentials.
    pub amount_credentials: CredentialsResponse,
    /// The reissued weight credentials.
    pub weight_credentials: CredentialsResponse,
    /// Fresh zero amount credentials.
    pub zero_amount_credentials: CredentialsResponse,
    /// Fresh zero weight credentials.
    pub zero_weight_credentials: CredentialsResponse,
}

impl Round {
    /// Check that the round is in one of `phases`.
    pub fn check_phase(&self, phases: &[Phase]) -> Result<(), WabiSabiProtocolError> {
        if !phases.contains(&self.phase) {
            Err(WabiSabiProtocolError::new(
                Code::WrongPhase,
                format!("round {} is in {}", self.id, self.phase),
            ))?;
        }

        Ok(())
    }

    /// Register `coin`, and issue zero credentials.
    ///
    /// The caller checks bans, and looks `coin` up on the node.
    pub fn register_input<R: RngCore + CryptoRng>(
        &mut self,
        coin: Coin,
        ownership_proof: OwnershipProof,
        zero_amount_request: &CredentialsRequest,
        zero_weight_request: &CredentialsRequest,
        rng: &mut R,
    ) -> Result<InputRegistration, WabiSabiProtocolError> {
        self.check_phase(&[Phase::InputRegistration])?;

        if let Some(blame) = &self.blame {
            if !blame.whitelist.contains(&coin.outpoint) {
                Err(WabiSabiProtocolError::new(
                    Code::InputNotWhitelisted,
                    format!("{} did not sign round {}", coin.outpoint, blame.blame_of),
                ))?;
            }
        }

        if self
            .alices
            .iter()
            .any(|alice| alice.coin.outpoint == coin.outpoint)
        {
            Err(WabiSabiProtocolError::new(
                Code::AliceAlreadyRegistered,
                format!("{} is already registered", coin.outpoint),
            ))?;
        }

        let parameters = &self.parameters;
        match coin.script_type() {
            Some(script_type) if parameters.is_input_type_allowed(script_type) => {}
            _ => Err(WabiSabiProtocolError::new(
                Code::ScriptNotAllowed,
                "input script type is not allowed",
            ))?,
        }

        let amount = coin.amount();
        if amount < *parameters.allowed_input_amounts.start() {
            Err(WabiSabiProtocolError::new(
                Code::NotEnoughFunds,
                format!("input amount {amount} is too small"),
            ))?;
        }
        if amount > *parameters.allowed_input_amounts.end() {
            Err(WabiSabiProtocolError::new(
                Code::TooMuchFunds,
                format!("input amount {amount} is too large"),
            ))?;
        }

        match coin.effective_value(parameters.mining_fee_rate) {
            Some(effective_value) if effective_value >= parameters.min_output_amount() => {}
            _ => Err(WabiSabiProtocolError::new(
                Code::UneconomicalInput,
                format!("input amount {amount} does not pay for its own fees and an output"),
            ))?,
        }

        if !ownership_proof.verify(coin.script_pubkey(), &self.id) {
            Err(WabiSabiProtocolError::new(
                Code::WrongOwnershipProof,
                "ownership proof does not verify for this round",
            ))?;
        }

        if self.alices.len() >= parameters.max_input_count {
            Err(WabiSabiProtocolError::new(
                Code::RoundFull,
                format!("round already has {} inputs", self.alices.len()),
            ))?;
        }

        expect_zero_request(zero_amount_request)?;
        expect_zero_request(zero_weight_request)?;
        let amount = self.amount_issuer.prepare(zero_amount_request)?;
        let weight = self.weight_issuer.prepare(zero_weight_request)?;

        let alice_id = alice::Id::random(rng);
        let amount_credentials = self.amount_issuer.commit(amount, rng)?;
        let weight_credentials = self.weight_issuer.commit(weight, rng)?;

        debug!(round_id = %self.id, %alice_id, outpoint = ?coin.outpoint, "registered input");
        self.alices.push(Alice::new(alice_id, coin, ownership_proof));

        Ok(InputRegistration {
            alice_id,
            amount_credentials,
            weight_credentials,
        })
    }

    /// Confirm that `alice_id` is still online, and issue credentials for its
    /// effective value and weight allocation.
    pub fn confirm_connection<R: RngCore + CryptoRng>(
        &mut self,
        alice_id: &alice::Id,
        zero_amount_request: &CredentialsRequest,
        real_amount_request: &CredentialsRequest,
        zero_weight_request: &CredentialsRequest,
        real_weight_request: &CredentialsRequest,
        rng: &mut R,
    ) -> Result<ConnectionConfirmation, WabiSabiProtocolError> {
        self.check_phase(&[Phase::ConnectionConfirmation])?;

        let alice = self.find_alice(alice_id)?;
        if alice.confirmed_connection {
            Err(WabiSabiProtocolError::new(
                Code::AliceAlreadyConfirmedConnection,
                format!("{alice_id} already confirmed its connection"),
            ))?;
        }

        // Registration checked that both exist.
        let effective_value = alice
            .coin
            .effective_value(self.parameters.mining_fee_rate)
            .ok_or_else(|| WabiSabiProtocolError::from(Code::UneconomicalInput))?;
        let weight_credit = self
            .weight_credit(alice)
            .ok_or_else(|| WabiSabiProtocolError::from(Code::ScriptNotAllowed))?;

        if real_amount_request.delta != -(effective_value.to_sat() as i64) {
            Err(WabiSabiProtocolError::new(
                Code::IncorrectRequestedAmountCredentials,
                format!("expected to issue {effective_value}"),
            ))?;
        }
        if real_weight_request.delta != -(weight_credit.to_wu() as i64) {
            Err(WabiSabiProtocolError::new(
                Code::IncorrectRequestedWeightCredentials,
                format!("expected to issue {weight_credit}"),
            ))?;
        }

        expect_zero_request(zero_amount_request)?;
        expect_zero_request(zero_weight_request)?;

        let [real_amount, zero_amount] =
            prepare(&self.amount_issuer, [real_amount_request, zero_amount_request])?;
        let [real_weight, zero_weight] =
            prepare(&self.weight_issuer, [real_weight_request, zero_weight_request])?;

        let [real_amount_credentials, zero_amount_credentials] =
            commit(&mut self.amount_issuer, [real_amount, zero_amount], rng)?;
        let [real_weight_credentials, zero_weight_credentials] =
            commit(&mut self.weight_issuer, [real_weight, zero_weight], rng)?;

        let alice = self
            .alices
            .iter_mut()
            .find(|alice| alice.id == *alice_id)
            .expect("alice was found above, and the round is exclusively borrowed");
        alice.confirmed_connection = true;
        alice.credit = Some((effective_value, weight_credit));

        debug!(round_id = %self.id, %alice_id, "confirmed connection");

        Ok(ConnectionConfirmation {
            real_amount_credentials,
            zero_amount_credentials,
            real_weight_credentials,
            zero_weight_credentials,
        })
    }

    /// Register an output to `script`, paid for by the value presented in
    /// `amount_request`.
    ///
    /// The output value is the request's delta minus the output's fee, and the
    /// weight request must present exactly the output's weight.
    pub fn register_output<R: RngCore + CryptoRng>(
        &mut self,
        script: ScriptBuf,
        amount_request: &CredentialsRequest,
        weight_request: &CredentialsRequest,
        rng: &mut R,
    ) -> Result<OutputRegistration, WabiSabiProtocolError> {
        self.check_phase(&[Phase::OutputRegistration])?;

        let parameters = &self.parameters;
        match ScriptType::from_script(&script) {
            Some(script_type) if parameters.is_output_type_allowed(script_type) => {}
            _ => Err(WabiSabiProtocolError::new(
                Code::ScriptNotAllowed,
                "output script type is not allowed",
            ))?,
        }

        let construction = self.coinjoin_state.as_construction()?;
        if construction
            .outputs()
            .iter()
            .any(|output| output.script_pubkey == script)
        {
            Err(WabiSabiProtocolError::new(
                Code::AlreadyRegisteredScript,
                "output script is already registered",
            ))?;
        }

        let weight = output_weight(&script);
        if weight_request.delta != weight.to_wu() as i64 {
            Err(WabiSabiProtocolError::new(
                Code::IncorrectRequestedWeightCredentials,
                format!("expected to present {weight}"),
            ))?;
        }

        let output_fee = fee(parameters.mining_fee_rate, weight).to_sat() as i64;
        let value = amount_request.delta.saturating_sub(output_fee);
        if value < parameters.min_output_amount().to_sat() as i64 {
            Err(WabiSabiProtocolError::new(
                Code::NotEnoughFunds,
                format!("output value {value} sat is too small"),
            ))?;
        }
        let value = bitcoin::Amount::from_sat(value as u64);
        if value > *parameters.allowed_output_amounts.end() {
            Err(WabiSabiProtocolError::new(
                Code::OutputTooLarge,
                format!("output value {value} is too large"),
            ))?;
        }

        let amount = self.amount_issuer.prepare(amount_request)?;
        let weight = self.weight_issuer.prepare(weight_request)?;

        let next = construction.add_output(TxOut {
            value,
            script_pubkey: script,
        })?;

        let amount_credentials = self.amount_issuer.commit(amount, rng)?;
        let weight_credentials = self.weight_issuer.commit(weight, rng)?;
        self.coinjoin_state = CoinjoinState::Construction(next);

        debug!(round_id = %self.id, %value, "registered output");

        Ok(OutputRegistration {
            amount_credentials,
            weight_credentials,
        })
    }

    /// Record that `alice_id` is done registering outputs. Repeating this is a
    /// no-op.
    pub fn ready_to_sign(&mut self, alice_id: &alice::Id) -> Result<(), WabiSabiProtocolError> {
        self.check_phase(&[Phase::OutputRegistration])?;

        let alice = self
            .alices
            .iter_mut()
            .find(|alice| alice.id == *alice_id)
            .ok_or_else(|| alice_not_found(alice_id))?;
        alice.ready_to_sign = true;

        Ok(())
    }

    /// Add witnesses for the round's transaction.
    ///
    /// Every witness is verified before any is added.
    pub fn sign_transaction(
        &mut self,
        witnesses: &[(usize, Witness)],
    ) -> Result<(), WabiSabiProtocolError> {
        self.check_phase(&[Phase::TransactionSigning])?;

        let signing = self.coinjoin_state.as_signing()?;
        let transaction = signing.create_unsigned_transaction();
        let prevouts = signing.prevouts();

        let mut next = signing.clone();
        for (index, witness) in witnesses {
            verify_input_witness(&transaction, &prevouts, *index, witness).map_err(|error| {
                WabiSabiProtocolError::new(
                    Code::InvalidWitness,
                    format!("input {index}: {error}"),
                )
            })?;

            next = next.add_witness(*index, witness.clone())?;
        }

        debug!(round_id = %self.id, count = witnesses.len(), "added witnesses");
        self.coinjoin_state = CoinjoinState::Signing(next);

        Ok(())
    }

    /// Unregister `alice_id` during input registration, without penalty.
    pub fn remove_input(&mut self, alice_id: &alice::Id) -> Result<Alice, WabiSabiProtocolError> {
        self.check_phase(&[Phase::InputRegistration])?;

        let position = self
            .alices
            .iter()
            .position(|alice| alice.id == *alice_id)
            .ok_or_else(|| alice_not_found(alice_id))?;

        debug!(round_id = %self.id, %alice_id, "removed input");

        Ok(self.alices.remove(position))
    }

    /// Exchange credentials for new ones with the same total value.
    pub fn reissue_credentials<R: RngCore + CryptoRng>(
        &mut self,
        amount_request: &CredentialsRequest,
        weight_request: &CredentialsRequest,
        zero_amount_request: &CredentialsRequest,
        zero_weight_request: &CredentialsRequest,
        rng: &mut R,
    ) -> Result<Reissuance, WabiSabiProtocolError> {
        self.check_phase(&[Phase::ConnectionConfirmation, Phase::OutputRegistration])?;

        if amount_request.delta != 0 {
            Err(WabiSabiProtocolError::new(
                Code::IncorrectRequestedAmountCredentials,
                "reissuance must keep the amount",
            ))?;
        }
        if weight_request.delta != 0 {
            Err(WabiSabiProtocolError::new(
                Code::IncorrectRequestedWeightCredentials,
                "reissuance must keep the weight",
            ))?;
        }

        expect_zero_request(zero_amount_request)?;
        expect_zero_request(zero_weight_request)?;

        let [amount, zero_amount] =
            prepare(&self.amount_issuer, [amount_request, zero_amount_request])?;
        let [weight, zero_weight] =
            prepare(&self.weight_issuer, [weight_request, zero_weight_request])?;

        let [amount_credentials, zero_amount_credentials] =
            commit(&mut self.amount_issuer, [amount, zero_amount], rng)?;
        let [weight_credentials, zero_weight_credentials] =
            commit(&mut self.weight_issuer, [weight, zero_weight], rng)?;

        Ok(Reissuance {
            amount_credentials,
            weight_credentials,
            zero_amount_credentials,
            zero_weight_credentials,
        })
    }

    fn find_alice(&self, alice_id: &alice::Id) -> Result<&Alice, WabiSabiProtocolError> {
        self.alice(alice_id)
            .ok_or_else(|| alice_not_found(alice_id))
    }
}

fn alice_not_found(alice_id: &alice::Id) -> WabiSabiProtocolError {
    WabiSabiProtocolError::new(Code::AliceNotFound, format!("{alice_id} is not registered"))
}

fn expect_zero_request(request: &CredentialsRequest) -> Result<(), WabiSabiProtocolError> {
    if !request.is_null_request() {
        Err(WabiSabiProtocolError::new(
            Code::CredentialVerificationFailed,
            "expected a zero value credential request",
        ))?;
    }

    Ok(())
}

/// Prepare several requests to one issuer, rejecting serial numbers shared
/// between them.
fn prepare<const N: usize>(
    issuer: &CredentialIssuer,
    requests: [&CredentialsRequest; N],
) -> Result<[PreparedIssuance; N], WabiSabiProtocolError> {
    let mut serial_numbers = std::collections::HashSet::new();
    for request in requests {
        for serial_number in request.serial_numbers() {
            if !serial_numbers.insert(serial_number) {
                Err(wabisabi_crypto::CryptoError::SerialNumberDuplicated)?;
            }
        }
    }

    let mut prepared = Vec::with_capacity(N);
    for request in requests {
        prepared.push(issuer.prepare(request)?);
    }

    Ok(prepared
        .try_into()
        .unwrap_or_else(|_| unreachable!("one prepared issuance per request")))
}

fn commit<const N: usize, R: RngCore + CryptoRng>(
    issuer: &mut CredentialIssuer,
    prepared: [PreparedIssuance; N],
    rng: &mut R,
) -> Result<[CredentialsResponse; N], WabiSabiProtocolError> {
    let mut responses = Vec::with_capacity(N);
    for prepared in prepared {
        responses.push(issuer.commit(prepared, rng)?);
    }

    Ok(responses
        .try_into()
        .unwrap_or_else(|_| unreachable!("one response per prepared issuance")))
}
