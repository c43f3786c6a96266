//! Coordinator configuration.

use std::{ops::RangeInclusive, time::Duration};

use bitcoin::{hashes::Hash, Amount, FeeRate, Network, ScriptBuf, WPubkeyHash, Weight};
use thiserror::Error;

use crate::{
    coin::{output_weight, transaction_overhead_weight, ScriptType, P2WPKH_INPUT_WEIGHT},
    round::RoundParameters,
};

/// Coordinator configuration section.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The Bitcoin network the coordinator works on.
    pub network: Network,

    /// The maximum number of inputs in a standard round.
    pub max_input_count_by_round: usize,

    /// The fraction of `max_input_count_by_round` a round needs to continue
    /// after input registration times out.
    pub min_input_count_by_round_multiplier: f64,

    /// The smallest input or output amount.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub min_registrable_amount: Amount,

    /// The largest input or output amount.
    ///
    /// This is also the largest value of a single amount credential.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub max_registrable_amount: Amount,

    /// How long standard rounds accept inputs.
    #[serde(with = "humantime_serde")]
    pub standard_input_registration_timeout: Duration,

    /// How long blame rounds wait for their whitelisted inputs.
    #[serde(with = "humantime_serde")]
    pub blame_input_registration_timeout: Duration,

    /// How long registered inputs have to confirm their connection.
    #[serde(with = "humantime_serde")]
    pub connection_confirmation_timeout: Duration,

    /// How long outputs can be registered.
    #[serde(with = "humantime_serde")]
    pub output_registration_timeout: Duration,

    /// How long inputs have to sign the transaction.
    #[serde(with = "humantime_serde")]
    pub transaction_signing_timeout: Duration,

    /// The interval between round state machine steps.
    #[serde(with = "humantime_serde")]
    pub round_step_interval: Duration,

    /// How long ended rounds stay visible in round status responses.
    #[serde(with = "humantime_serde")]
    pub ended_round_retention: Duration,

    /// How long an outpoint that didn't sign is banned from every round.
    #[serde(with = "humantime_serde")]
    pub ban_duration: Duration,

    /// How long notes for disruptive outpoints are remembered.
    #[serde(with = "humantime_serde")]
    pub release_noted_after: Duration,

    /// The maximum weight of a coinjoin transaction, in weight units.
    pub max_transaction_weight: u64,

    /// The weight each input can spend on itself and its outputs.
    pub max_weight_allocation_per_alice: u64,

    /// The script that receives value nobody registered an output for.
    ///
    /// If unset, unclaimed value is paid as mining fees.
    pub blame_script: Option<ScriptBuf>,

    /// Accept P2TR inputs.
    pub allow_p2tr_inputs: bool,

    /// Accept P2TR outputs.
    pub allow_p2tr_outputs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            max_input_count_by_round: 100,
            min_input_count_by_round_multiplier: 0.5,
            min_registrable_amount: Amount::from_sat(5_000),
            max_registrable_amount: Amount::from_int_btc(43_000),
            standard_input_registration_timeout: Duration::from_secs(60 * 60),
            blame_input_registration_timeout: Duration::from_secs(3 * 60),
            connection_confirmation_timeout: Duration::from_secs(60),
            output_registration_timeout: Duration::from_secs(60),
            transaction_signing_timeout: Duration::from_secs(60),
            round_step_interval: Duration::from_secs(1),
            ended_round_retention: Duration::from_secs(60),
            ban_duration: Duration::from_secs(30 * 24 * 60 * 60),
            release_noted_after: Duration::from_secs(60 * 60),
            max_transaction_weight: 400_000,
            max_weight_allocation_per_alice: 1_020,
            blame_script: None,
            allow_p2tr_inputs: true,
            allow_p2tr_outputs: true,
        }
    }
}

/// An inconsistent configuration.
#[derive(Error, Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("max_input_count_by_round must be at least 1")]
    NoInputs,

    #[error("min_input_count_by_round_multiplier must be in (0, 1], got {0}")]
    InvalidMultiplier(f64),

    #[error("the input quorum of a round rounds to zero")]
    NoQuorum,

    #[error(
        "blame_input_registration_timeout {blame:?} is longer than \
         standard_input_registration_timeout {standard:?}"
    )]
    BlameTimeoutTooLong { blame: Duration, standard: Duration },

    #[error("min_registrable_amount {min} is larger than max_registrable_amount {max}")]
    InvalidAmountRange { min: Amount, max: Amount },

    #[error("max_weight_allocation_per_alice {allocation} can't pay for an input and an output")]
    AllocationTooSmall { allocation: u64 },

    #[error("{inputs} full allocations of {allocation} WU exceed max_transaction_weight {max}")]
    TransactionWeightTooSmall {
        inputs: usize,
        allocation: u64,
        max: u64,
    },

    #[error("blame_script is not a supported output script type")]
    UnsupportedBlameScript,

    #[error("round_step_interval must not be zero")]
    ZeroStepInterval,
}

impl Config {
    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_input_count_by_round == 0 {
            return Err(ConfigError::NoInputs);
        }

        let multiplier = self.min_input_count_by_round_multiplier;
        if !(multiplier > 0.0 && multiplier <= 1.0) {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }

        if self.min_input_count_by_round() == 0 {
            return Err(ConfigError::NoQuorum);
        }

        if self.blame_input_registration_timeout > self.standard_input_registration_timeout {
            return Err(ConfigError::BlameTimeoutTooLong {
                blame: self.blame_input_registration_timeout,
                standard: self.standard_input_registration_timeout,
            });
        }

        if self.min_registrable_amount > self.max_registrable_amount {
            return Err(ConfigError::InvalidAmountRange {
                min: self.min_registrable_amount,
                max: self.max_registrable_amount,
            });
        }

        // The heaviest supported input, and the smallest supported output.
        let smallest_output = output_weight(&ScriptBuf::new_p2wpkh(&WPubkeyHash::all_zeros()));
        if self.max_weight_allocation_per_alice < (P2WPKH_INPUT_WEIGHT + smallest_output).to_wu() {
            return Err(ConfigError::AllocationTooSmall {
                allocation: self.max_weight_allocation_per_alice,
            });
        }

        let inputs = self.max_input_count_by_round;
        let needed = transaction_overhead_weight(inputs, inputs)
            .to_wu()
            .saturating_add(
                self.max_weight_allocation_per_alice
                    .saturating_mul(self.max_input_count_by_round as u64),
            );
        if needed > self.max_transaction_weight {
            return Err(ConfigError::TransactionWeightTooSmall {
                inputs: self.max_input_count_by_round,
                allocation: self.max_weight_allocation_per_alice,
                max: self.max_transaction_weight,
            });
        }

        if let Some(blame_script) = &self.blame_script {
            if ScriptType::from_script(blame_script).is_none() {
                return Err(ConfigError::UnsupportedBlameScript);
            }
        }

        if self.round_step_interval.is_zero() {
            return Err(ConfigError::ZeroStepInterval);
        }

        Ok(())
    }

    /// The minimum number of inputs a round needs after input registration
    /// times out.
    ///
    /// Rounds up, so a round never continues with fewer inputs than the
    /// multiplier asks for, and a valid config always needs at least one.
    pub fn min_input_count_by_round(&self) -> usize {
        let quorum =
            (self.max_input_count_by_round as f64) * self.min_input_count_by_round_multiplier;

        // Products like 10 * 0.7 land just above the integer they stand for.
        let nearest = quorum.round();
        if (quorum - nearest).abs() < 1e-9 {
            nearest as usize
        } else {
            quorum.ceil() as usize
        }
    }

    /// The parameters of a standard round with `mining_fee_rate`.
    pub fn round_parameters(&self, mining_fee_rate: FeeRate) -> RoundParameters {
        let amounts: RangeInclusive<Amount> =
            self.min_registrable_amount..=self.max_registrable_amount;

        let mut allowed_input_types = vec![ScriptType::P2wpkh];
        if self.allow_p2tr_inputs {
            allowed_input_types.push(ScriptType::P2tr);
        }
        let mut allowed_output_types = vec![ScriptType::P2wpkh];
        if self.allow_p2tr_outputs {
            allowed_output_types.push(ScriptType::P2tr);
        }

        RoundParameters {
            network: self.network,
            mining_fee_rate,
            max_input_count: self.max_input_count_by_round,
            min_input_count: self.min_input_count_by_round(),
            standard_input_registration_timeout: self.standard_input_registration_timeout,
            blame_input_registration_timeout: self.blame_input_registration_timeout,
            connection_confirmation_timeout: self.connection_confirmation_timeout,
            output_registration_timeout: self.output_registration_timeout,
            transaction_signing_timeout: self.transaction_signing_timeout,
            allowed_input_amounts: amounts.clone(),
            allowed_output_amounts: amounts,
            allowed_input_types,
            allowed_output_types,
            max_transaction_weight: Weight::from_wu(self.max_transaction_weight),
            max_weight_allocation_per_alice: Weight::from_wu(self.max_weight_allocation_per_alice),
            max_amount_credential_value: self.max_registrable_amount.to_sat(),
            max_weight_credential_value: self.max_weight_allocation_per_alice,
            blame_script: self.blame_script.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wabisabi_test::prelude::*;

    #[test]
    fn default_config_is_valid() -> Result<()> {
        wabisabi_test::init();

        let config = Config::default();
        config.validate()?;
        assert_eq!(config.min_input_count_by_round(), 50);

        let parameters = config.round_parameters(FeeRate::from_sat_per_vb(10).expect("valid fee rate"));
        assert_eq!(parameters.min_input_count, 50);
        assert_eq!(parameters.max_amount_credential_value, 4_300_000_000_000);
        assert_eq!(parameters.allowed_input_types.len(), 2);

        Ok(())
    }

    #[test]
    fn config_parses_from_toml() -> Result<()> {
        wabisabi_test::init();

        let config: Config = toml::from_str(
            r#"
            network = "regtest"
            max_input_count_by_round = 4
            min_input_count_by_round_multiplier = 0.5
            min_registrable_amount = 10000
            connection_confirmation_timeout = "30s"
            ban_duration = "7days"
            allow_p2tr_outputs = false
            "#,
        )?;

        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.max_input_count_by_round, 4);
        assert_eq!(config.min_input_count_by_round(), 2);
        assert_eq!(config.min_registrable_amount, Amount::from_sat(10_000));
        assert_eq!(config.connection_confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.ban_duration, Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(
            config.output_registration_timeout,
            Config::default().output_registration_timeout,
        );
        config.validate()?;

        let parameters = config.round_parameters(FeeRate::from_sat_per_vb(1).expect("valid fee rate"));
        assert_eq!(parameters.allowed_output_types, vec![ScriptType::P2wpkh]);

        assert!(toml::from_str::<Config>("unknown_field = 1").is_err());

        Ok(())
    }

    #[test]
    fn inconsistent_configs_are_rejected() {
        wabisabi_test::init();

        let config = Config {
            min_input_count_by_round_multiplier: 0.0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidMultiplier(0.0)));

        let config = Config {
            max_transaction_weight: 50_000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TransactionWeightTooSmall { .. }),
        ));

        let config = Config {
            max_weight_allocation_per_alice: 300,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AllocationTooSmall { allocation: 300 }),
        );

        let config = Config {
            standard_input_registration_timeout: Duration::from_secs(60),
            blame_input_registration_timeout: Duration::from_secs(120),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BlameTimeoutTooLong {
                blame: Duration::from_secs(120),
                standard: Duration::from_secs(60),
            }),
        );
    }

    #[test]
    fn input_quorum_rounds_up() {
        wabisabi_test::init();

        let quorum = |max_input_count_by_round, min_input_count_by_round_multiplier| {
            Config {
                max_input_count_by_round,
                min_input_count_by_round_multiplier,
                ..Config::default()
            }
            .min_input_count_by_round()
        };

        assert_eq!(quorum(1, 0.5), 1);
        assert_eq!(quorum(3, 0.5), 2);
        assert_eq!(quorum(4, 0.5), 2);
        assert_eq!(quorum(10, 0.7), 7);
        assert_eq!(quorum(100, 0.01), 1);
        assert_eq!(quorum(7, 1.0), 7);

        let config = Config {
            max_input_count_by_round: 1,
            min_input_count_by_round_multiplier: 1e-12,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoQuorum));

        let config = Config {
            max_input_count_by_round: 1,
            ..Config::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
