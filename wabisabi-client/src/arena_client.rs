//! Requests to the coordinator's arena, with credential bookkeeping.

use bitcoin::{OutPoint, ScriptBuf, Witness};
use rand::thread_rng;
use tower::{Service, ServiceExt};

use wabisabi_coordinator::{
    alice,
    arena::{Request, Response},
    ownership::OwnershipProof,
    round::{self, Phase, RoundParameters, RoundState},
    WabiSabiProtocolError,
};
use wabisabi_crypto::{Credential, CredentialsResponse, CredentialsResponseValidation, WabiSabiClient};

use crate::{credential_pool::split_value, ClientError};

/// A connection to the arena, for one round.
///
/// Requests are built from the round's published state, and every credential
/// response is checked against the published issuer parameters.
#[derive(Clone, Debug)]
pub struct ArenaClient<S> {
    service: S,
    round: RoundState,
    amount_client: WabiSabiClient,
    weight_client: WabiSabiClient,
}

impl<S> ArenaClient<S>
where
    S: Service<Request, Response = Response, Error = WabiSabiProtocolError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Fetch the states of every published round.
    pub async fn round_states(service: &S) -> Result<Vec<RoundState>, ClientError> {
        match service.clone().oneshot(Request::GetStatus).await? {
            Response::Status(states) => Ok(states),
            _ => Err(ClientError::UnexpectedResponse("get status")),
        }
    }

    /// Connect to the published round `round_id`.
    pub async fn for_round(service: S, round_id: round::Id) -> Result<Self, ClientError> {
        let round = Self::round_states(&service)
            .await?
            .into_iter()
            .find(|state| state.id == round_id)
            .ok_or(ClientError::RoundNotPublished(round_id))?;

        Ok(Self::new(service, round))
    }

    /// Connect to `round` through `service`.
    pub fn new(service: S, round: RoundState) -> Self {
        let amount_client = WabiSabiClient::new(
            round.amount_issuer_parameters,
            round.parameters.max_amount_credential_value,
        );
        let weight_client = WabiSabiClient::new(
            round.weight_issuer_parameters,
            round.parameters.max_weight_credential_value,
        );

        Self {
            service,
            round,
            amount_client,
            weight_client,
        }
    }

    /// The round's state, as of the last refresh.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// The round's id.
    pub fn round_id(&self) -> round::Id {
        self.round.id
    }

    /// The round's parameters.
    pub fn parameters(&self) -> &RoundParameters {
        &self.round.parameters
    }

    /// Fetch the round's latest state.
    ///
    /// Fails if the round disappeared, or its issuer parameters changed.
    pub async fn refresh(&mut self) -> Result<&RoundState, ClientError> {
        let round_id = self.round.id;
        let state = Self::round_states(&self.service)
            .await?
            .into_iter()
            .find(|state| state.id == round_id)
            .ok_or(ClientError::RoundNotPublished(round_id))?;

        if state.amount_issuer_parameters != self.round.amount_issuer_parameters
            || state.weight_issuer_parameters != self.round.weight_issuer_parameters
            || state.parameters != self.round.parameters
        {
            Err(ClientError::IssuerParametersChanged(round_id))?;
        }

        self.round = state;
        Ok(&self.round)
    }

    /// Check the round was in `phase` at the last refresh.
    pub fn expect_phase(&self, phase: Phase) -> Result<(), ClientError> {
        if self.round.phase != phase {
            Err(ClientError::WrongPhase {
                expected: phase,
                actual: self.round.phase,
            })?;
        }

        Ok(())
    }

    /// Register `outpoint`, returning its id, and zero amount and weight
    /// credentials.
    pub async fn register_input(
        &self,
        outpoint: OutPoint,
        ownership_proof: OwnershipProof,
    ) -> Result<(alice::Id, Vec<Credential>, Vec<Credential>), ClientError> {
        let (zero_amount_request, amount_validation) = self
            .amount_client
            .create_request_for_zero_amount(&mut thread_rng());
        let (zero_weight_request, weight_validation) = self
            .weight_client
            .create_request_for_zero_amount(&mut thread_rng());

        let registration = match self
            .call(Request::RegisterInput {
                round_id: self.round.id,
                outpoint,
                ownership_proof,
                zero_amount_request,
                zero_weight_request,
            })
            .await?
        {
            Response::InputRegistration(registration) => registration,
            _ => Err(ClientError::UnexpectedResponse("register input"))?,
        };

        let amount = self.handle_amount(&registration.amount_credentials, amount_validation)?;
        let weight = self.handle_weight(&registration.weight_credentials, weight_validation)?;

        Ok((registration.alice_id, amount, weight))
    }

    /// Confirm `alice_id`'s connection, exchanging its zero credentials for
    /// credentials worth `effective_value` and `weight_credit`.
    ///
    /// Returns the new amount and weight credentials, each including fresh
    /// zero credentials.
    pub async fn confirm_connection(
        &self,
        alice_id: alice::Id,
        zero_amount_credentials: &[Credential],
        effective_value: u64,
        zero_weight_credentials: &[Credential],
        weight_credit: u64,
    ) -> Result<(Vec<Credential>, Vec<Credential>), ClientError> {
        let (zero_amount_request, zero_amount_validation) =
            self.amount_client.create_request_for_zero_amount(&mut thread_rng());
        let (real_amount_request, real_amount_validation) = self.amount_client.create_request(
            &[effective_value],
            zero_amount_credentials,
            &mut thread_rng(),
        )?;
        let (zero_weight_request, zero_weight_validation) =
            self.weight_client.create_request_for_zero_amount(&mut thread_rng());
        let (real_weight_request, real_weight_validation) = self.weight_client.create_request(
            &[weight_credit],
            zero_weight_credentials,
            &mut thread_rng(),
        )?;

        let confirmation = match self
            .call(Request::ConfirmConnection {
                round_id: self.round.id,
                alice_id,
                zero_amount_request,
                real_amount_request,
                zero_weight_request,
                real_weight_request,
            })
            .await?
        {
            Response::ConnectionConfirmation(confirmation) => confirmation,
            _ => Err(ClientError::UnexpectedResponse("confirm connection"))?,
        };

        let mut amount =
            self.handle_amount(&confirmation.real_amount_credentials, real_amount_validation)?;
        amount.extend(
            self.handle_amount(&confirmation.zero_amount_credentials, zero_amount_validation)?,
        );
        let mut weight =
            self.handle_weight(&confirmation.real_weight_credentials, real_weight_validation)?;
        weight.extend(
            self.handle_weight(&confirmation.zero_weight_credentials, zero_weight_validation)?,
        );

        Ok((amount, weight))
    }

    /// Register an output to `script`, keeping `amount_change` and
    /// `weight_change` of the presented credentials.
    pub async fn register_output(
        &self,
        script: ScriptBuf,
        amount_presented: &[Credential],
        amount_change: u64,
        weight_presented: &[Credential],
        weight_change: u64,
    ) -> Result<(Vec<Credential>, Vec<Credential>), ClientError> {
        let (amount_request, amount_validation) = self.amount_client.create_request(
            &split_value(amount_change, self.round.parameters.max_amount_credential_value)?,
            amount_presented,
            &mut thread_rng(),
        )?;
        let (weight_request, weight_validation) = self.weight_client.create_request(
            &split_value(weight_change, self.round.parameters.max_weight_credential_value)?,
            weight_presented,
            &mut thread_rng(),
        )?;

        let registration = match self
            .call(Request::RegisterOutput {
                round_id: self.round.id,
                script,
                amount_request,
                weight_request,
            })
            .await?
        {
            Response::OutputRegistration(registration) => registration,
            _ => Err(ClientError::UnexpectedResponse("register output"))?,
        };

        Ok((
            self.handle_amount(&registration.amount_credentials, amount_validation)?,
            self.handle_weight(&registration.weight_credentials, weight_validation)?,
        ))
    }

    /// Exchange the presented credentials for new ones worth the requested
    /// values, which must have the same totals.
    ///
    /// Returns the new amount and weight credentials, each including fresh
    /// zero credentials.
    pub async fn reissue_credentials(
        &self,
        amount_presented: &[Credential],
        amount_requested: &[u64],
        weight_presented: &[Credential],
        weight_requested: &[u64],
    ) -> Result<(Vec<Credential>, Vec<Credential>), ClientError> {
        let (amount_request, amount_validation) =
            self.amount_client
                .create_request(amount_requested, amount_presented, &mut thread_rng())?;
        let (weight_request, weight_validation) =
            self.weight_client
                .create_request(weight_requested, weight_presented, &mut thread_rng())?;
        let (zero_amount_request, zero_amount_validation) =
            self.amount_client.create_request_for_zero_amount(&mut thread_rng());
        let (zero_weight_request, zero_weight_validation) =
            self.weight_client.create_request_for_zero_amount(&mut thread_rng());

        let reissuance = match self
            .call(Request::ReissueCredentials {
                round_id: self.round.id,
                amount_request,
                weight_request,
                zero_amount_request,
                zero_weight_request,
            })
            .await?
        {
            Response::Reissuance(reissuance) => reissuance,
            _ => Err(ClientError::UnexpectedResponse("reissue credentials"))?,
        };

        let mut amount = self.handle_amount(&reissuance.amount_credentials, amount_validation)?;
        amount.extend(
            self.handle_amount(&reissuance.zero_amount_credentials, zero_amount_validation)?,
        );
        let mut weight = self.handle_weight(&reissuance.weight_credentials, weight_validation)?;
        weight.extend(
            self.handle_weight(&reissuance.zero_weight_credentials, zero_weight_validation)?,
        );

        Ok((amount, weight))
    }

    /// Signal that `alice_id` is done registering outputs.
    pub async fn ready_to_sign(&self, alice_id: alice::Id) -> Result<(), ClientError> {
        self.call_done(
            Request::ReadyToSign {
                round_id: self.round.id,
                alice_id,
            },
            "ready to sign",
        )
        .await
    }

    /// Send `witnesses` for the round's transaction.
    pub async fn sign_transaction(&self, witnesses: Vec<(usize, Witness)>) -> Result<(), ClientError> {
        self.call_done(
            Request::SignTransaction {
                round_id: self.round.id,
                witnesses,
            },
            "sign transaction",
        )
        .await
    }

    /// Unregister `alice_id`.
    pub async fn remove_input(&self, alice_id: alice::Id) -> Result<(), ClientError> {
        self.call_done(
            Request::RemoveInput {
                round_id: self.round.id,
                alice_id,
            },
            "remove input",
        )
        .await
    }

    async fn call(&self, request: Request) -> Result<Response, ClientError> {
        let name = request.name();

        self.service
            .clone()
            .oneshot(request)
            .await
            .map_err(|error| {
                debug!(request = name, ?error, "coordinator rejected request");
                ClientError::from(error)
            })
    }

    async fn call_done(&self, request: Request, name: &'static str) -> Result<(), ClientError> {
        match self.call(request).await? {
            Response::Done => Ok(()),
            _ => Err(ClientError::UnexpectedResponse(name)),
        }
    }

    fn handle_amount(
        &self,
        response: &CredentialsResponse,
        validation: CredentialsResponseValidation,
    ) -> Result<Vec<Credential>, ClientError> {
        Ok(self.amount_client.handle_response(response, validation)?)
    }

    fn handle_weight(
        &self,
        response: &CredentialsResponse,
        validation: CredentialsResponseValidation,
    ) -> Result<Vec<Credential>, ClientError> {
        Ok(self.weight_client.handle_response(response, validation)?)
    }
}
