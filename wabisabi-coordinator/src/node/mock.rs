//! An in-memory node for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use bitcoin::{FeeRate, OutPoint, Transaction, TxOut};
use futures::future::{ready, Ready};
use tower::Service;

use super::{BroadcastOutcome, BroadcastRejection, Request, Response};
use crate::BoxError;

/// A node with a scripted UTXO set, fee rate, and broadcast outcome.
///
/// Clones share the same state, so tests can keep a handle after giving the
/// node to an arena.
#[derive(Clone, Debug)]
pub struct MockNode {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
struct MockState {
    utxos: HashMap<OutPoint, TxOut>,
    fee_rate: FeeRate,
    rejection: Option<BroadcastRejection>,
    unavailable: bool,
    requests: Vec<Request>,
    broadcasts: Vec<Transaction>,
}

impl MockNode {
    /// Create a node with no UTXOs that estimates `fee_rate`, and accepts
    /// every broadcast.
    pub fn new(fee_rate: FeeRate) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                utxos: HashMap::new(),
                fee_rate,
                rejection: None,
                unavailable: false,
                requests: Vec::new(),
                broadcasts: Vec::new(),
            })),
        }
    }

    /// Add an unspent output.
    pub fn add_utxo(&self, outpoint: OutPoint, txout: TxOut) {
        self.lock().utxos.insert(outpoint, txout);
    }

    /// Spend an output outside the coordinator.
    pub fn spend(&self, outpoint: &OutPoint) {
        self.lock().utxos.remove(outpoint);
    }

    /// Change the estimated fee rate.
    pub fn set_fee_rate(&self, fee_rate: FeeRate) {
        self.lock().fee_rate = fee_rate;
    }

    /// Reject every later broadcast with `rejection`, or accept them if `None`.
    pub fn set_broadcast_rejection(&self, rejection: impl Into<Option<BroadcastRejection>>) {
        self.lock().rejection = rejection.into();
    }

    /// Fail every later request.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Every transaction broadcast so far, accepted or not.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.lock().broadcasts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .expect("mock node panicked while holding its lock")
    }
}

impl Service<Request> for MockNode {
    type Response = Response;
    type Error = BoxError;
    type Future = Ready<Result<Response, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut state = self.lock();
        state.requests.push(request.clone());

        if state.unavailable {
            return ready(Err("mock node is unavailable".into()));
        }

        let response = match request {
            Request::EstimateFeeRate => Response::FeeRate(state.fee_rate),
            Request::Utxo(outpoint) => Response::Utxo(state.utxos.get(&outpoint).cloned()),
            Request::Broadcast(transaction) => {
                state.broadcasts.push(transaction.clone());

                let outcome = match state.rejection.clone() {
                    Some(rejection) => BroadcastOutcome::Rejected(rejection),
                    None => {
                        for input in &transaction.input {
                            state.utxos.remove(&input.previous_output);
                        }
                        BroadcastOutcome::Accepted(transaction.compute_txid())
                    }
                };

                Response::Broadcast(outcome)
            }
        };

        ready(Ok(response))
    }
}
