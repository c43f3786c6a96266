//! The arena: the coordinator's table of rounds and its only entry point.
//!
//! Participant requests go through [`Arena`]'s `tower::Service` impl, or its
//! methods. A periodic tick ([`Arena::step`]) moves rounds through their
//! phases, broadcasts finished transactions, creates blame rounds and new
//! standard rounds, and retires ended rounds.
//!
//! # Correctness
//!
//! Operations look up UTXOs on the node before they lock the round, so a
//! cancelled operation leaves no trace. Locks are taken in this order: the
//! round table, then a round, then the prison. No lock is held across an
//! `.await`.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
    task::{Context, Poll},
};

use bitcoin::{FeeRate, OutPoint, ScriptBuf, Transaction, Witness};
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use rand::thread_rng;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tower::{Service, ServiceExt};

use wabisabi_crypto::CredentialsRequest;

use crate::{
    alice::{self, Alice},
    coin::Coin,
    config::ConfigError,
    node::{self, BroadcastOutcome},
    ownership::OwnershipProof,
    prison::{Prison, Punishment},
    round::{
        self, ConnectionConfirmation, EndRoundState, InputRegistration, OutputRegistration, Phase,
        Reissuance, Round, RoundState,
    },
    BoxError, Config, WabiSabiProtocolError, WabiSabiProtocolErrorCode as Code,
};

mod request;


pub use request::{Request, Response};

/// A round, and the channel its snapshots are published on.
#[derive(Debug)]
struct RoundHandle {
    round: Mutex<Round>,
    state: watch::Sender<RoundState>,
}

impl RoundHandle {
    fn new(round: Round) -> Self {
        let (state, _) = watch::channel(round.state());

        Self {
            round: Mutex::new(round),
            state,
        }
    }

    /// The latest published snapshot.
    fn state(&self) -> RoundState {
        self.state.borrow().clone()
    }

    /// Run `operation` on the round, publishing a new snapshot if it succeeds.
    fn update<T>(
        &self,
        operation: impl FnOnce(&mut Round) -> Result<T, WabiSabiProtocolError>,
    ) -> Result<T, WabiSabiProtocolError> {
        let mut round = self.lock();

        match operation(&mut round) {
            Ok(result) => {
                self.state.send_replace(round.state());
                Ok(result)
            }
            Err(error) => {
                debug!(round_id = %round.id(), ?error, "rejected request");
                Err(error)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Round> {
        self.round
            .lock()
            .expect("round operations don't panic while holding the round lock")
    }
}

#[derive(Debug)]
struct Inner {
    config: Config,
    rounds: RwLock<HashMap<round::Id, Arc<RoundHandle>>>,
    /// Final states of ended rounds, and when they ended, oldest first.
    ended: RwLock<VecDeque<(DateTime<Utc>, RoundState)>>,
    prison: Mutex<Prison>,
    /// Serializes ticks, which are the only writers of the round table.
    tick: tokio::sync::Mutex<()>,
}

/// The coordinator's rounds, and the node they are built against.
///
/// Clones share the same rounds and prison.
#[derive(Clone, Debug)]
pub struct Arena<N> {
    inner: Arc<Inner>,
    node: N,
}

impl<N> Arena<N>
where
    N: Service<node::Request, Response = node::Response, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    N::Future: Send,
{
    /// Create an arena with no rounds.
    ///
    /// The first [`step`](Self::step) creates a standard round.
    pub fn new(config: Config, node: N) -> Result<Self, ConfigError> {
        config.validate()?;

        let prison = Prison::new(config.ban_duration, config.release_noted_after);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                rounds: RwLock::new(HashMap::new()),
                ended: RwLock::new(VecDeque::new()),
                prison: Mutex::new(prison),
                tick: tokio::sync::Mutex::new(()),
            }),
            node,
        })
    }

    /// Spawn a task that steps the arena every `round_step_interval`.
    pub fn spawn(self) -> JoinHandle<Result<(), BoxError>> {
        tokio::spawn(self.run())
    }

    /// Step the arena every `round_step_interval`, forever.
    pub async fn run(self) -> Result<(), BoxError> {
        let mut ticks = interval(self.inner.config.round_step_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.inner.config.round_step_interval,
            "starting coinjoin round scheduler"
        );

        loop {
            ticks.tick().await;
            self.step().await;
        }
    }

    /// The arena's configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// A copy of the prison.
    pub fn prison(&self) -> Prison {
        self.lock_prison().clone()
    }

    /// Snapshots of every active round, then every recently ended round.
    pub fn get_status(&self) -> Vec<RoundState> {
        let mut states: Vec<RoundState> = self
            .read_rounds()
            .values()
            .map(|handle| handle.state())
            .collect();
        states.sort_by_key(|state| (state.phase_started, state.id));

        let ended = self
            .inner
            .ended
            .read()
            .expect("ended round list lock is not poisoned");
        states.extend(ended.iter().map(|(_, state)| state.clone()));

        states
    }

    /// Subscribe to the snapshots of an active round.
    pub fn subscribe(&self, round_id: &round::Id) -> Option<watch::Receiver<RoundState>> {
        self.read_rounds()
            .get(round_id)
            .map(|handle| handle.state.subscribe())
    }

    /// Register `outpoint` in `round_id`.
    pub async fn register_input(
        &self,
        round_id: round::Id,
        outpoint: OutPoint,
        ownership_proof: OwnershipProof,
        zero_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
    ) -> Result<InputRegistration, WabiSabiProtocolError> {
        self.register_input_at(
            round_id,
            outpoint,
            ownership_proof,
            zero_amount_request,
            zero_weight_request,
            Utc::now(),
        )
        .await
    }

    /// Register `outpoint` in `round_id`, checking bans as if the time was
    /// `now`.
    #[instrument(skip(self, ownership_proof, zero_amount_request, zero_weight_request))]
    pub async fn register_input_at(
        &self,
        round_id: round::Id,
        outpoint: OutPoint,
        ownership_proof: OwnershipProof,
        zero_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
        now: DateTime<Utc>,
    ) -> Result<InputRegistration, WabiSabiProtocolError> {
        let handle = self.round_handle(&round_id)?;

        // Avoid node lookups for requests that can't succeed.
        let phase = handle.state().phase;
        if phase != Phase::InputRegistration {
            Err(WabiSabiProtocolError::new(
                Code::WrongPhase,
                format!("round {round_id} is in {phase}"),
            ))?;
        }
        self.check_not_banned(&outpoint, now)?;

        let txout = match self.node_request(node::Request::Utxo(outpoint)).await {
            Ok(node::Response::Utxo(Some(txout))) => txout,
            Ok(node::Response::Utxo(None)) => Err(WabiSabiProtocolError::new(
                Code::InputSpent,
                format!("{outpoint} is unknown or spent"),
            ))?,
            response => {
                warn!(?outpoint, ?response, "node failed to look up an input");
                Err(WabiSabiProtocolError::new(
                    Code::NodeUnavailable,
                    "could not look up the input",
                ))?
            }
        };

        // A tick may have banned the input or moved the round on during the
        // lookup, so both are checked again under the round lock.
        let coin = Coin::new(outpoint, txout);
        handle.update(|round| {
            self.check_not_banned(&outpoint, now)?;
            round.register_input(
                coin,
                ownership_proof,
                &zero_amount_request,
                &zero_weight_request,
                &mut thread_rng(),
            )
        })
    }

    fn check_not_banned(&self, outpoint: &OutPoint, now: DateTime<Utc>) -> Result<(), WabiSabiProtocolError> {
        if self.lock_prison().is_banned(outpoint, now) {
            debug!(?outpoint, "rejected banned input");
            Err(WabiSabiProtocolError::new(
                Code::InputBanned,
                format!("{outpoint} is banned"),
            ))?;
        }

        Ok(())
    }

    /// Confirm that `alice_id` is still online.
    #[instrument(skip(self, zero_amount_request, real_amount_request, zero_weight_request, real_weight_request))]
    pub fn confirm_connection(
        &self,
        round_id: round::Id,
        alice_id: alice::Id,
        zero_amount_request: CredentialsRequest,
        real_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
        real_weight_request: CredentialsRequest,
    ) -> Result<ConnectionConfirmation, WabiSabiProtocolError> {
        self.round_handle(&round_id)?.update(|round| {
            round.confirm_connection(
                &alice_id,
                &zero_amount_request,
                &real_amount_request,
                &zero_weight_request,
                &real_weight_request,
                &mut thread_rng(),
            )
        })
    }

    /// Register an output to `script`.
    #[instrument(skip(self, script, amount_request, weight_request))]
    pub fn register_output(
        &self,
        round_id: round::Id,
        script: ScriptBuf,
        amount_request: CredentialsRequest,
        weight_request: CredentialsRequest,
    ) -> Result<OutputRegistration, WabiSabiProtocolError> {
        self.round_handle(&round_id)?.update(|round| {
            round.register_output(script, &amount_request, &weight_request, &mut thread_rng())
        })
    }

    /// Signal that `alice_id` is done registering outputs.
    #[instrument(skip(self))]
    pub fn ready_to_sign(
        &self,
        round_id: round::Id,
        alice_id: alice::Id,
    ) -> Result<(), WabiSabiProtocolError> {
        self.round_handle(&round_id)?
            .update(|round| round.ready_to_sign(&alice_id))
    }

    /// Add `witnesses` to the round's transaction.
    #[instrument(skip(self, witnesses), fields(count = witnesses.len()))]
    pub fn sign_transaction(
        &self,
        round_id: round::Id,
        witnesses: Vec<(usize, Witness)>,
    ) -> Result<(), WabiSabiProtocolError> {
        self.round_handle(&round_id)?
            .update(|round| round.sign_transaction(&witnesses))
    }

    /// Unregister `alice_id` from a round in input registration.
    #[instrument(skip(self))]
    pub fn remove_input(
        &self,
        round_id: round::Id,
        alice_id: alice::Id,
    ) -> Result<Alice, WabiSabiProtocolError> {
        self.round_handle(&round_id)?
            .update(|round| round.remove_input(&alice_id))
    }

    /// Exchange credentials for new ones with the same total.
    #[instrument(skip(self, amount_request, weight_request, zero_amount_request, zero_weight_request))]
    pub fn reissue_credentials(
        &self,
        round_id: round::Id,
        amount_request: CredentialsRequest,
        weight_request: CredentialsRequest,
        zero_amount_request: CredentialsRequest,
        zero_weight_request: CredentialsRequest,
    ) -> Result<Reissuance, WabiSabiProtocolError> {
        self.round_handle(&round_id)?.update(|round| {
            round.reissue_credentials(
                &amount_request,
                &weight_request,
                &zero_amount_request,
                &zero_weight_request,
                &mut thread_rng(),
            )
        })
    }

    /// Run one scheduler tick now.
    pub async fn step(&self) {
        self.step_at(Utc::now()).await
    }

    /// Run one scheduler tick, as if the time was `now`.
    ///
    /// Each round makes at most one phase transition. Rounds that finished
    /// signing are broadcast and end in the same tick, and ended rounds are
    /// moved to the ended round list.
    pub async fn step_at(&self, now: DateTime<Utc>) {
        let _tick = self.inner.tick.lock().await;

        let handles: Vec<Arc<RoundHandle>> = self.read_rounds().values().cloned().collect();

        let mut broadcasts = Vec::new();
        let mut blame_rounds = Vec::new();

        for handle in handles {
            let (round_id, outcome) = {
                let mut round = handle.lock();
                let outcome = round.step(now, &mut thread_rng());
                handle.state.send_replace(round.state());

                (round.id(), outcome)
            };

            self.punish(round_id, &outcome.punishments, now);

            if let Some(transaction) = outcome.broadcast {
                broadcasts.push((handle.clone(), transaction));
            }
            if let Some(blame_round) = outcome.blame_round {
                blame_rounds.push(blame_round);
            }
        }

        for (handle, transaction) in broadcasts {
            let end_round_state = self.broadcast(transaction).await;

            {
                let mut round = handle.lock();
                round.end(end_round_state, now);
                handle.state.send_replace(round.state());
            }
        }

        {
            let mut rounds = self
                .inner
                .rounds
                .write()
                .expect("round table lock is not poisoned");
            for blame_round in blame_rounds {
                rounds.insert(blame_round.id(), Arc::new(RoundHandle::new(blame_round)));
            }
        }

        self.retire_ended_rounds(now);

        if !self.has_standard_round_in_input_registration() {
            match self.estimate_fee_rate().await {
                Some(fee_rate) => self.create_round(fee_rate, now),
                None => warn!("could not create a round without a fee rate estimate"),
            }
        }

        let released = self.lock_prison().release_eligible_inmates(now);
        if !released.is_empty() {
            debug!(count = released.len(), "released prison inmates");
        }

        metrics::gauge!("wabisabi.arena.rounds.active").set(self.read_rounds().len() as f64);
    }

    fn punish(&self, round_id: round::Id, punishments: &[(OutPoint, Punishment)], now: DateTime<Utc>) {
        if punishments.is_empty() {
            return;
        }

        let mut prison = self.lock_prison();
        for (outpoint, punishment) in punishments {
            match punishment {
                Punishment::Noted => prison.note(*outpoint, round_id, now),
                Punishment::Banned => prison.ban(*outpoint, round_id, now),
            }
        }
    }

    /// Broadcast a coinjoin, and return how its round ends.
    ///
    /// Rejections are never punished, because a double spend elsewhere can't
    /// be attributed to a participant.
    async fn broadcast(&self, transaction: Transaction) -> EndRoundState {
        let txid = transaction.compute_txid();

        let end_round_state = match self.node_request(node::Request::Broadcast(transaction)).await {
            Ok(node::Response::Broadcast(BroadcastOutcome::Accepted(txid))) => {
                info!(%txid, "broadcast coinjoin");
                EndRoundState::TransactionBroadcasted
            }
            Ok(node::Response::Broadcast(BroadcastOutcome::Rejected(rejection))) => {
                warn!(%txid, %rejection, "node rejected coinjoin");
                EndRoundState::TransactionBroadcastFailed
            }
            response => {
                warn!(%txid, ?response, "node failed to broadcast coinjoin");
                EndRoundState::TransactionBroadcastFailed
            }
        };

        metrics::counter!("wabisabi.arena.broadcasts", "outcome" => end_round_state.name())
            .increment(1);

        end_round_state
    }

    /// Move ended rounds out of the round table, and forget ended rounds
    /// older than the retention period.
    fn retire_ended_rounds(&self, now: DateTime<Utc>) {
        let retired: Vec<RoundState> = {
            let mut rounds = self
                .inner
                .rounds
                .write()
                .expect("round table lock is not poisoned");

            let ended_ids: Vec<round::Id> = rounds
                .iter()
                .filter(|(_, handle)| handle.state().phase == Phase::Ended)
                .map(|(id, _)| *id)
                .collect();

            ended_ids
                .iter()
                .filter_map(|id| rounds.remove(id))
                .map(|handle| handle.state())
                .collect()
        };

        let retention =
            TimeDelta::from_std(self.inner.config.ended_round_retention).unwrap_or(TimeDelta::MAX);

        let mut ended = self
            .inner
            .ended
            .write()
            .expect("ended round list lock is not poisoned");
        for state in retired {
            debug!(round_id = %state.id, outcome = state.end_round_state.name(), "retired round");
            ended.push_back((now, state));
        }
        while ended
            .front()
            .is_some_and(|(ended_at, _)| now.signed_duration_since(*ended_at) > retention)
        {
            ended.pop_front();
        }
    }

    fn has_standard_round_in_input_registration(&self) -> bool {
        self.read_rounds().values().any(|handle| {
            let state = handle.state();
            state.phase == Phase::InputRegistration && !state.is_blame_round()
        })
    }

    async fn estimate_fee_rate(&self) -> Option<FeeRate> {
        match self.node_request(node::Request::EstimateFeeRate).await {
            Ok(node::Response::FeeRate(fee_rate)) => Some(fee_rate),
            response => {
                warn!(?response, "node failed to estimate the fee rate");
                None
            }
        }
    }

    fn create_round(&self, fee_rate: FeeRate, now: DateTime<Utc>) {
        let parameters = self.inner.config.round_parameters(fee_rate);
        let round = Round::new(parameters, None, now, &mut thread_rng());

        info!(round_id = %round.id(), %fee_rate, "created round");
        metrics::counter!("wabisabi.arena.rounds.created").increment(1);

        self.inner
            .rounds
            .write()
            .expect("round table lock is not poisoned")
            .insert(round.id(), Arc::new(RoundHandle::new(round)));
    }

    async fn node_request(&self, request: node::Request) -> Result<node::Response, BoxError> {
        self.node.clone().oneshot(request).await
    }

    fn round_handle(&self, round_id: &round::Id) -> Result<Arc<RoundHandle>, WabiSabiProtocolError> {
        self.read_rounds().get(round_id).cloned().ok_or_else(|| {
            WabiSabiProtocolError::new(Code::RoundNotFound, format!("round {round_id} not found"))
        })
    }

    fn read_rounds(&self) -> std::sync::RwLockReadGuard<'_, HashMap<round::Id, Arc<RoundHandle>>> {
        self.inner
            .rounds
            .read()
            .expect("round table lock is not poisoned")
    }

    fn lock_prison(&self) -> std::sync::MutexGuard<'_, Prison> {
        self.inner
            .prison
            .lock()
            .expect("prison lock is not poisoned")
    }
}

impl<N> Service<Request> for Arena<N>
where
    N: Service<node::Request, Response = node::Response, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    N::Future: Send,
{
    type Response = Response;
    type Error = WabiSabiProtocolError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    #[instrument(name = "arena", skip(self, request), fields(request = request.name()))]
    fn call(&mut self, request: Request) -> Self::Future {
        let rsp = match request {
            Request::RegisterInput {
                round_id,
                outpoint,
                ownership_proof,
                zero_amount_request,
                zero_weight_request,
            } => {
                let arena = self.clone();
                return async move {
                    arena
                        .register_input(
                            round_id,
                            outpoint,
                            ownership_proof,
                            zero_amount_request,
                            zero_weight_request,
                        )
                        .await
                        .map(Response::InputRegistration)
                }
                .boxed();
            }
            Request::ConfirmConnection {
                round_id,
                alice_id,
                zero_amount_request,
                real_amount_request,
                zero_weight_request,
                real_weight_request,
            } => self
                .confirm_connection(
                    round_id,
                    alice_id,
                    zero_amount_request,
                    real_amount_request,
                    zero_weight_request,
                    real_weight_request,
                )
                .map(Response::ConnectionConfirmation),
            Request::RegisterOutput {
                round_id,
                script,
                amount_request,
                weight_request,
            } => self
                .register_output(round_id, script, amount_request, weight_request)
                .map(Response::OutputRegistration),
            Request::ReadyToSign { round_id, alice_id } => self
                .ready_to_sign(round_id, alice_id)
                .map(|()| Response::Done),
            Request::SignTransaction {
                round_id,
                witnesses,
            } => self
                .sign_transaction(round_id, witnesses)
                .map(|()| Response::Done),
            Request::RemoveInput { round_id, alice_id } => self
                .remove_input(round_id, alice_id)
                .map(|_| Response::Done),
            Request::ReissueCredentials {
                round_id,
                amount_request,
                weight_request,
                zero_amount_request,
                zero_weight_request,
            } => self
                .reissue_credentials(
                    round_id,
                    amount_request,
                    weight_request,
                    zero_amount_request,
                    zero_weight_request,
                )
                .map(Response::Reissuance),
            Request::GetStatus => Ok(Response::Status(self.get_status())),
        };

        async move { rsp }.boxed()
    }
}
