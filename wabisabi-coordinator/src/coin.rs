//! Coins, script types and their weights.

use bitcoin::{Amount, FeeRate, OutPoint, Script, ScriptBuf, Sequence, TxIn, TxOut, Weight, Witness};

/// The weight of a P2WPKH input, including a maximum size signature.
pub const P2WPKH_INPUT_WEIGHT: Weight = Weight::from_wu(272);

/// The weight of a P2TR key path input.
pub const P2TR_INPUT_WEIGHT: Weight = Weight::from_wu(230);

/// The script types coordinated rounds can spend and create.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum ScriptType {
    /// Pay to witness public key hash.
    P2wpkh,
    /// Pay to taproot, spent with the key path.
    P2tr,
}

impl ScriptType {
    /// Classify `script`, returning `None` for unsupported script types.
    pub fn from_script(script: &Script) -> Option<Self> {
        if script.is_p2wpkh() {
            Some(ScriptType::P2wpkh)
        } else if script.is_p2tr() {
            Some(ScriptType::P2tr)
        } else {
            None
        }
    }

    /// The weight of an input spending this script type.
    pub fn input_weight(self) -> Weight {
        match self {
            ScriptType::P2wpkh => P2WPKH_INPUT_WEIGHT,
            ScriptType::P2tr => P2TR_INPUT_WEIGHT,
        }
    }
}

/// The weight of an output paying to `script`.
pub fn output_weight(script: &Script) -> Weight {
    let len = script.len() as u64;

    // value, script length, script
    Weight::from_non_witness_data_size(8 + compact_size_len(len) + len)
}

/// The weight of the version, lock time, counts and segwit marker of a
/// transaction with `inputs` inputs and `outputs` outputs.
pub fn transaction_overhead_weight(inputs: usize, outputs: usize) -> Weight {
    let non_witness = 4 + 4 + compact_size_len(inputs as u64) + compact_size_len(outputs as u64);

    // segwit marker and flag
    Weight::from_non_witness_data_size(non_witness) + Weight::from_wu(2)
}

/// The fee for `weight` at `fee_rate`, rounded up.
pub fn fee(fee_rate: FeeRate, weight: Weight) -> Amount {
    Amount::from_sat(
        fee_rate
            .to_sat_per_kwu()
            .saturating_mul(weight.to_wu())
            .div_ceil(1000),
    )
}

fn compact_size_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// An unspent output, as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coin {
    /// The outpoint that created this coin.
    pub outpoint: OutPoint,
    /// The amount and script of this coin.
    pub txout: TxOut,
}

impl Coin {
    /// Create a coin.
    pub fn new(outpoint: OutPoint, txout: TxOut) -> Self {
        Self { outpoint, txout }
    }

    /// The coin's amount.
    pub fn amount(&self) -> Amount {
        self.txout.value
    }

    /// The coin's script.
    pub fn script_pubkey(&self) -> &ScriptBuf {
        &self.txout.script_pubkey
    }

    /// The coin's script type, if it is supported.
    pub fn script_type(&self) -> Option<ScriptType> {
        ScriptType::from_script(&self.txout.script_pubkey)
    }

    /// The weight of an input spending this coin, if its script type is supported.
    pub fn input_weight(&self) -> Option<Weight> {
        self.script_type().map(ScriptType::input_weight)
    }

    /// The amount left after paying the fee for spending this coin.
    ///
    /// Returns `None` if the script type isn't supported, or the fee is larger
    /// than the amount.
    pub fn effective_value(&self, fee_rate: FeeRate) -> Option<Amount> {
        let weight = self.input_weight()?;
        self.amount().checked_sub(fee(fee_rate, weight))
    }

    /// An unsigned input spending this coin.
    pub(crate) fn unsigned_txin(&self) -> TxIn {
        TxIn {
            previous_output: self.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }
    }
}
