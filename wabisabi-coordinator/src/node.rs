//! Requests to the Bitcoin full node.
//!
//! The coordinator only needs fee estimates, UTXO lookups and broadcasts, so
//! any node backend can be wrapped in a `tower::Service<node::Request>`.

use std::fmt;

use bitcoin::{FeeRate, OutPoint, Transaction, TxOut, Txid};

#[cfg(any(test, feature = "proptest-impl"))]
pub mod mock;

#[cfg(any(test, feature = "proptest-impl"))]
pub use mock::MockNode;

/// A request to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Estimate the fee rate for timely confirmation.
    EstimateFeeRate,

    /// Look up an unspent output.
    Utxo(OutPoint),

    /// Broadcast a signed transaction.
    Broadcast(Transaction),
}

/// A response from the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Response to [`Request::EstimateFeeRate`].
    FeeRate(FeeRate),

    /// Response to [`Request::Utxo`]: `None` if the output is unknown or spent.
    Utxo(Option<TxOut>),

    /// Response to [`Request::Broadcast`].
    Broadcast(BroadcastOutcome),
}

/// The result of a broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The node accepted the transaction into its mempool.
    Accepted(Txid),

    /// The node refused the transaction.
    Rejected(BroadcastRejection),
}

/// Why a node refused a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastRejection {
    /// An input was spent by another transaction.
    DoubleSpend,

    /// The fee rate was too low.
    InsufficientFee,

    /// Any other reason reported by the node.
    Other(String),
}

impl fmt::Display for BroadcastRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastRejection::DoubleSpend => f.write_str("an input was already spent"),
            BroadcastRejection::InsufficientFee => f.write_str("the fee rate was too low"),
            BroadcastRejection::Other(reason) => f.write_str(reason),
        }
    }
}
