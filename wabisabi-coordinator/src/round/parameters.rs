//! Per-round parameters.

use std::{ops::RangeInclusive, time::Duration};

use bitcoin::{Amount, FeeRate, Network, ScriptBuf, Weight};

use crate::coin::ScriptType;

/// The rules a round enforces, fixed when the round is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundParameters {
    /// The network of every coin and output.
    pub network: Network,
    /// The fee rate inputs and outputs pay for their own weight.
    pub mining_fee_rate: FeeRate,
    /// The most inputs the round accepts.
    pub max_input_count: usize,
    /// The fewest inputs the round continues with after a timeout.
    pub min_input_count: usize,
    /// How long a standard round accepts inputs.
    pub standard_input_registration_timeout: Duration,
    /// How long a blame round accepts inputs.
    pub blame_input_registration_timeout: Duration,
    /// How long inputs have to confirm their connection.
    pub connection_confirmation_timeout: Duration,
    /// How long outputs can be registered.
    pub output_registration_timeout: Duration,
    /// How long inputs have to sign.
    pub transaction_signing_timeout: Duration,
    /// The accepted input amounts.
    pub allowed_input_amounts: RangeInclusive<Amount>,
    /// The accepted output amounts.
    pub allowed_output_amounts: RangeInclusive<Amount>,
    /// The accepted input script types.
    pub allowed_input_types: Vec<ScriptType>,
    /// The accepted output script types.
    pub allowed_output_types: Vec<ScriptType>,
    /// The maximum transaction weight.
    pub max_transaction_weight: Weight,
    /// The weight each input can spend on itself and its outputs.
    pub max_weight_allocation_per_alice: Weight,
    /// The largest value of a single amount credential.
    pub max_amount_credential_value: u64,
    /// The largest value of a single weight credential.
    pub max_weight_credential_value: u64,
    /// The script that receives unclaimed value, if any.
    pub blame_script: Option<ScriptBuf>,
}

impl RoundParameters {
    /// The smallest output the round accepts.
    pub fn min_output_amount(&self) -> Amount {
        *self.allowed_output_amounts.start()
    }

    /// Can a round with `count` inputs continue past a timeout?
    ///
    /// A round never continues without inputs, whatever `min_input_count` is.
    pub fn has_quorum(&self, count: usize) -> bool {
        count > 0 && count >= self.min_input_count
    }

    /// Is `script_type` accepted for inputs?
    pub fn is_input_type_allowed(&self, script_type: ScriptType) -> bool {
        self.allowed_input_types.contains(&script_type)
    }

    /// Is `script_type` accepted for outputs?
    pub fn is_output_type_allowed(&self, script_type: ScriptType) -> bool {
        self.allowed_output_types.contains(&script_type)
    }
}
