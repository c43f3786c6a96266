//! The input side of a participant.

use bitcoin::{TxOut, Witness};
use tower::Service;

use wabisabi_coordinator::{
    alice,
    arena::{Request, Response},
    coin::Coin,
    round::{Phase, RoundState},
    WabiSabiProtocolError,
};
use wabisabi_crypto::Credential;

use crate::{ArenaClient, ClientError, CredentialPool, Signer};

/// Drives one registered input through a round.
#[derive(Debug)]
pub struct AliceClient<S> {
    arena: ArenaClient<S>,
    alice_id: alice::Id,
    coin: Coin,
    signer: Signer,
    zero_amount_credentials: Vec<Credential>,
    zero_weight_credentials: Vec<Credential>,
    confirmed: bool,
}

impl<S> AliceClient<S>
where
    S: Service<Request, Response = Response, Error = WabiSabiProtocolError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Register `coin`, controlled by `signer`, in `arena`'s round.
    ///
    /// Checks the coin against the round's published parameters before
    /// contacting the coordinator.
    pub async fn register(
        arena: ArenaClient<S>,
        coin: Coin,
        signer: Signer,
    ) -> Result<Self, ClientError> {
        arena.expect_phase(Phase::InputRegistration)?;

        let parameters = arena.parameters();
        let not_registrable = |reason| ClientError::CoinNotRegistrable {
            outpoint: coin.outpoint,
            reason,
        };

        if signer.script_pubkey() != *coin.script_pubkey() {
            Err(not_registrable("the signer does not control the coin"))?;
        }
        match coin.script_type() {
            Some(script_type) if parameters.is_input_type_allowed(script_type) => {}
            _ => Err(not_registrable("the script type is not allowed"))?,
        }
        if !parameters.allowed_input_amounts.contains(&coin.amount()) {
            Err(not_registrable("the amount is out of range"))?;
        }
        match coin.effective_value(parameters.mining_fee_rate) {
            Some(value) if value >= parameters.min_output_amount() => {}
            _ => Err(not_registrable("the coin is uneconomical"))?,
        }

        let ownership_proof = signer.ownership_proof(&arena.round_id());
        let (alice_id, zero_amount_credentials, zero_weight_credentials) =
            arena.register_input(coin.outpoint, ownership_proof).await?;

        info!(round_id = %arena.round_id(), %alice_id, outpoint = ?coin.outpoint, "registered input");

        Ok(Self {
            arena,
            alice_id,
            coin,
            signer,
            zero_amount_credentials,
            zero_weight_credentials,
            confirmed: false,
        })
    }

    /// The input's id in the round.
    pub fn alice_id(&self) -> alice::Id {
        self.alice_id
    }

    /// The registered coin.
    pub fn coin(&self) -> &Coin {
        &self.coin
    }

    /// The round's state, as of the last refresh.
    pub fn round(&self) -> &RoundState {
        self.arena.round()
    }

    /// Fetch the round's latest state.
    pub async fn refresh(&mut self) -> Result<&RoundState, ClientError> {
        self.arena.refresh().await
    }

    /// The value the coordinator certifies for this input.
    pub fn effective_value(&self) -> u64 {
        self.coin
            .effective_value(self.arena.parameters().mining_fee_rate)
            .map_or(0, |value| value.to_sat())
    }

    /// The weight the coordinator certifies for this input.
    pub fn weight_credit(&self) -> u64 {
        let parameters = self.arena.parameters();

        self.coin
            .input_weight()
            .and_then(|weight| parameters.max_weight_allocation_per_alice.checked_sub(weight))
            .map_or(0, |weight| weight.to_wu())
    }

    /// Confirm the connection, and add the certified credentials to the pools.
    pub async fn confirm_connection(
        &mut self,
        amount_pool: &mut CredentialPool,
        weight_pool: &mut CredentialPool,
    ) -> Result<(), ClientError> {
        self.arena.expect_phase(Phase::ConnectionConfirmation)?;

        let (amount, weight) = self
            .arena
            .confirm_connection(
                self.alice_id,
                &self.zero_amount_credentials,
                self.effective_value(),
                &self.zero_weight_credentials,
                self.weight_credit(),
            )
            .await?;

        amount_pool.add(amount);
        weight_pool.add(weight);
        self.confirmed = true;

        debug!(alice_id = %self.alice_id, "confirmed connection");

        Ok(())
    }

    /// Has the connection been confirmed?
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Signal that this participant is done registering outputs.
    pub async fn ready_to_sign(&self) -> Result<(), ClientError> {
        self.arena.expect_phase(Phase::OutputRegistration)?;
        self.arena.ready_to_sign(self.alice_id).await
    }

    /// A witness for this input, if the round's transaction spends it and pays
    /// every output in `expected_outputs`.
    pub fn witness(&self, expected_outputs: &[TxOut]) -> Result<(usize, Witness), ClientError> {
        self.arena.expect_phase(Phase::TransactionSigning)?;

        let signing = self
            .arena
            .round()
            .coinjoin_state
            .as_signing()
            .map_err(|_| ClientError::WrongPhase {
                expected: Phase::TransactionSigning,
                actual: self.arena.round().phase,
            })?;

        let index = signing
            .input_index(&self.coin.outpoint)
            .ok_or(ClientError::MissingInput(self.coin.outpoint))?;
        if signing.inputs()[index].txout != self.coin.txout {
            Err(ClientError::MissingInput(self.coin.outpoint))?;
        }

        for expected in expected_outputs {
            if !signing.outputs().contains(expected) {
                Err(ClientError::MissingOutput(expected.clone()))?;
            }
        }

        let transaction = signing.create_unsigned_transaction();
        let witness = self.signer.sign(&transaction, &signing.prevouts(), index)?;

        Ok((index, witness))
    }

    /// Sign the round's transaction, if it pays every output in
    /// `expected_outputs`.
    pub async fn sign(&self, expected_outputs: &[TxOut]) -> Result<(), ClientError> {
        let witness = self.witness(expected_outputs)?;
        self.arena.sign_transaction(vec![witness]).await
    }

    /// Unregister this input during input registration.
    pub async fn remove(self) -> Result<(), ClientError> {
        self.arena.expect_phase(Phase::InputRegistration)?;
        self.arena.remove_input(self.alice_id).await
    }
}
