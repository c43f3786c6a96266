//! The transaction a round is building.
//!
//! A [`CoinjoinState`] is always a valid unsigned or partially signed
//! transaction. Every transition returns a new state, and the
//! [`Construction`] to [`Signing`] transition can't be undone.

use std::collections::BTreeMap;

use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, FeeRate, OutPoint, SignedAmount,
    Transaction, TxOut, Weight, Witness,
};
use thiserror::Error;

use crate::coin::{output_weight, transaction_overhead_weight, Coin, ScriptType};

#[cfg(test)]
mod tests;

/// A rejected state transition.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Error {
    #[error("input {0} is already in the transaction")]
    DuplicateInput(OutPoint),

    #[error("an output with this script is already in the transaction")]
    DuplicateOutputScript,

    #[error("the script type is not supported")]
    UnsupportedScript,

    #[error("transaction weight {weight} would exceed the maximum {max}")]
    TransactionTooLarge { weight: Weight, max: Weight },

    #[error("input {0} is not in the transaction")]
    InputIndexOutOfRange(usize),

    #[error("input {0} already has a different witness")]
    WitnessAlreadyProvided(usize),

    #[error("the transaction is not in the {expected} state")]
    WrongState { expected: &'static str },
}

/// The transaction of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoinjoinState {
    /// Inputs and outputs are still being added.
    Construction(Construction),
    /// The shape is fixed, and witnesses are being collected.
    Signing(Signing),
}

impl CoinjoinState {
    /// The inputs, in transaction order once signing has started.
    pub fn inputs(&self) -> &[Coin] {
        match self {
            CoinjoinState::Construction(construction) => &construction.inputs,
            CoinjoinState::Signing(signing) => &signing.inputs,
        }
    }

    /// The outputs, in transaction order once signing has started.
    pub fn outputs(&self) -> &[TxOut] {
        match self {
            CoinjoinState::Construction(construction) => &construction.outputs,
            CoinjoinState::Signing(signing) => &signing.outputs,
        }
    }

    /// The input amount minus the output amount, which is paid as fees.
    pub fn balance(&self) -> SignedAmount {
        balance(self.inputs(), self.outputs())
    }

    /// The weight of the transaction once every input is signed.
    pub fn estimated_weight(&self) -> Weight {
        estimated_weight(self.inputs(), self.outputs())
    }

    /// The fee rate the transaction pays, if its balance isn't negative.
    pub fn effective_fee_rate(&self) -> Option<FeeRate> {
        effective_fee_rate(self.balance(), self.estimated_weight())
    }

    /// The construction state, or an error if signing has started.
    pub fn as_construction(&self) -> Result<&Construction, Error> {
        match self {
            CoinjoinState::Construction(construction) => Ok(construction),
            CoinjoinState::Signing(_) => Err(Error::WrongState {
                expected: "construction",
            }),
        }
    }

    /// The signing state, or an error if signing hasn't started.
    pub fn as_signing(&self) -> Result<&Signing, Error> {
        match self {
            CoinjoinState::Signing(signing) => Ok(signing),
            CoinjoinState::Construction(_) => Err(Error::WrongState { expected: "signing" }),
        }
    }
}

/// An unsigned transaction that is still accepting inputs and outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Construction {
    max_weight: Weight,
    inputs: Vec<Coin>,
    outputs: Vec<TxOut>,
}

impl Construction {
    /// Create an empty transaction that can't grow beyond `max_weight`.
    pub fn new(max_weight: Weight) -> Self {
        Self {
            max_weight,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// The inputs, in insertion order.
    pub fn inputs(&self) -> &[Coin] {
        &self.inputs
    }

    /// The outputs, in insertion order.
    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// Returns a state with `coin` added.
    pub fn add_input(&self, coin: Coin) -> Result<Construction, Error> {
        if coin.script_type().is_none() {
            return Err(Error::UnsupportedScript);
        }
        if self.inputs.iter().any(|input| input.outpoint == coin.outpoint) {
            return Err(Error::DuplicateInput(coin.outpoint));
        }

        let mut next = self.clone();
        next.inputs.push(coin);
        next.check_weight()?;

        Ok(next)
    }

    /// Returns a state with `output` added.
    pub fn add_output(&self, output: TxOut) -> Result<Construction, Error> {
        if ScriptType::from_script(&output.script_pubkey).is_none() {
            return Err(Error::UnsupportedScript);
        }
        if self
            .outputs
            .iter()
            .any(|existing| existing.script_pubkey == output.script_pubkey)
        {
            return Err(Error::DuplicateOutputScript);
        }

        let mut next = self.clone();
        next.outputs.push(output);
        next.check_weight()?;

        Ok(next)
    }

    /// Fix the transaction's shape, and start collecting witnesses.
    ///
    /// Inputs are sorted by descending amount then outpoint, and outputs by
    /// descending value then script, so the order reveals nothing about
    /// registration order.
    pub fn finalize(&self) -> Signing {
        let mut inputs = self.inputs.clone();
        inputs.sort_by(|a, b| {
            b.amount()
                .cmp(&a.amount())
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });

        let mut outputs = self.outputs.clone();
        outputs.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.script_pubkey.cmp(&b.script_pubkey))
        });

        Signing {
            inputs,
            outputs,
            witnesses: BTreeMap::new(),
        }
    }

    /// The input amount minus the output amount.
    pub fn balance(&self) -> SignedAmount {
        balance(&self.inputs, &self.outputs)
    }

    /// The weight of the transaction once every input is signed.
    pub fn estimated_weight(&self) -> Weight {
        estimated_weight(&self.inputs, &self.outputs)
    }

    /// The fee rate the transaction pays, if its balance isn't negative.
    pub fn effective_fee_rate(&self) -> Option<FeeRate> {
        effective_fee_rate(self.balance(), self.estimated_weight())
    }

    fn check_weight(&self) -> Result<(), Error> {
        let weight = self.estimated_weight();
        if weight > self.max_weight {
            return Err(Error::TransactionTooLarge {
                weight,
                max: self.max_weight,
            });
        }

        Ok(())
    }
}

/// A transaction with a fixed shape, collecting witnesses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signing {
    inputs: Vec<Coin>,
    outputs: Vec<TxOut>,
    witnesses: BTreeMap<usize, Witness>,
}

impl Signing {
    /// The inputs, in transaction order.
    pub fn inputs(&self) -> &[Coin] {
        &self.inputs
    }

    /// The outputs, in transaction order.
    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// The position of `outpoint` in the transaction.
    pub fn input_index(&self, outpoint: &OutPoint) -> Option<usize> {
        self.inputs
            .iter()
            .position(|input| input.outpoint == *outpoint)
    }

    /// The outputs spent by the transaction, in input order.
    pub fn prevouts(&self) -> Vec<TxOut> {
        self.inputs.iter().map(|input| input.txout.clone()).collect()
    }

    /// Returns a state with `witness` for input `index`.
    ///
    /// Adding the same witness twice is a no-op, but a different witness for a
    /// signed input is an error.
    pub fn add_witness(&self, index: usize, witness: Witness) -> Result<Signing, Error> {
        if index >= self.inputs.len() {
            return Err(Error::InputIndexOutOfRange(index));
        }

        match self.witnesses.get(&index) {
            Some(existing) if *existing == witness => Ok(self.clone()),
            Some(_) => Err(Error::WitnessAlreadyProvided(index)),
            None => {
                let mut next = self.clone();
                next.witnesses.insert(index, witness);
                Ok(next)
            }
        }
    }

    /// Has input `index` been signed?
    pub fn is_input_signed(&self, index: usize) -> bool {
        self.witnesses.contains_key(&index)
    }

    /// Has every input been signed?
    pub fn is_fully_signed(&self) -> bool {
        self.witnesses.len() == self.inputs.len()
    }

    /// The transaction without witnesses, which every witness signs.
    pub fn create_unsigned_transaction(&self) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self.inputs.iter().map(Coin::unsigned_txin).collect(),
            output: self.outputs.clone(),
        }
    }

    /// The transaction with every witness collected so far.
    pub fn create_transaction(&self) -> Transaction {
        let mut transaction = self.create_unsigned_transaction();
        for (index, witness) in &self.witnesses {
            transaction.input[*index].witness = witness.clone();
        }

        transaction
    }

    /// The input amount minus the output amount.
    pub fn balance(&self) -> SignedAmount {
        balance(&self.inputs, &self.outputs)
    }

    /// The weight of the transaction once every input is signed.
    pub fn estimated_weight(&self) -> Weight {
        estimated_weight(&self.inputs, &self.outputs)
    }

    /// The fee rate the transaction pays, if its balance isn't negative.
    pub fn effective_fee_rate(&self) -> Option<FeeRate> {
        effective_fee_rate(self.balance(), self.estimated_weight())
    }
}

fn balance(inputs: &[Coin], outputs: &[TxOut]) -> SignedAmount {
    let input_sum: Amount = inputs.iter().map(Coin::amount).sum();
    let output_sum: Amount = outputs.iter().map(|output| output.value).sum();

    SignedAmount::from_sat(input_sum.to_sat() as i64 - output_sum.to_sat() as i64)
}

fn estimated_weight(inputs: &[Coin], outputs: &[TxOut]) -> Weight {
    let input_weight: Weight = inputs
        .iter()
        .filter_map(Coin::input_weight)
        .sum();
    let output_weight: Weight = outputs
        .iter()
        .map(|output| output_weight(&output.script_pubkey))
        .sum();

    transaction_overhead_weight(inputs.len(), outputs.len()) + input_weight + output_weight
}

fn effective_fee_rate(balance: SignedAmount, weight: Weight) -> Option<FeeRate> {
    let fee = u64::try_from(balance.to_sat()).ok()?;
    let weight = weight.to_wu();
    if weight == 0 {
        return None;
    }

    Some(FeeRate::from_sat_per_kwu(fee.saturating_mul(1000) / weight))
}
