//! Phase transitions, driven by the arena's periodic tick.

use std::collections::BTreeSet;

use bitcoin::{Amount, OutPoint, Transaction, TxOut};
use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};

use crate::{
    coin::{fee, output_weight, transaction_overhead_weight},
    coinjoin_state::{CoinjoinState, Construction},
    prison::Punishment,
};

use super::{Blame, EndRoundState, Phase, Round};

/// The side effects of one step, which the arena applies.
#[derive(Debug, Default)]
pub struct StepOutcome {
    /// Outpoints to punish for disrupting this round.
    pub punishments: Vec<(OutPoint, Punishment)>,
    /// A fully signed transaction to broadcast.
    pub broadcast: Option<Transaction>,
    /// A blame round retrying this round with its signers.
    pub blame_round: Option<Round>,
}

impl Round {
    /// Evaluate at most one phase transition at `now`.
    pub fn step<R: RngCore + CryptoRng>(&mut self, now: DateTime<Utc>, rng: &mut R) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        match self.phase {
            Phase::InputRegistration => self.step_input_registration(now),
            Phase::ConnectionConfirmation => self.step_connection_confirmation(now, &mut outcome),
            Phase::OutputRegistration => self.step_output_registration(now),
            Phase::TransactionSigning => self.step_transaction_signing(now, &mut outcome, rng),
            Phase::TransactionBroadcasting | Phase::Ended => {}
        }

        outcome
    }

    fn step_input_registration(&mut self, now: DateTime<Utc>) {
        let count = self.alices.len();
        let parameters = &self.parameters;

        let whitelist_complete = self.blame.as_ref().is_some_and(|blame| {
            blame.whitelist.iter().all(|outpoint| {
                self.alices
                    .iter()
                    .any(|alice| alice.coin.outpoint == *outpoint)
            })
        });

        if count >= parameters.max_input_count || whitelist_complete {
            self.set_phase(Phase::ConnectionConfirmation, now);
        } else if self.is_phase_timed_out(now) {
            if parameters.has_quorum(count) {
                self.set_phase(Phase::ConnectionConfirmation, now);
            } else {
                debug!(round_id = %self.id, count, "not enough inputs registered");
                self.end(EndRoundState::AbortedNotEnoughAlices, now);
            }
        }
    }

    fn step_connection_confirmation(&mut self, now: DateTime<Utc>, outcome: &mut StepOutcome) {
        let all_confirmed = self.alices.iter().all(|alice| alice.confirmed_connection);

        if !all_confirmed {
            if !self.is_phase_timed_out(now) {
                return;
            }

            let (confirmed, unconfirmed) = std::mem::take(&mut self.alices)
                .into_iter()
                .partition(|alice| alice.confirmed_connection);
            self.alices = confirmed;

            for alice in unconfirmed {
                debug!(round_id = %self.id, alice_id = %alice.id, "input did not confirm its connection");
                outcome
                    .punishments
                    .push((alice.coin.outpoint, Punishment::Noted));
            }

            if !self.parameters.has_quorum(self.alices.len()) {
                self.end(EndRoundState::AbortedNotEnoughAlices, now);
                return;
            }
        }

        let mut construction = Construction::new(self.parameters.max_transaction_weight);
        for alice in &self.alices {
            construction = match construction.add_input(alice.coin.clone()) {
                Ok(construction) => construction,
                Err(error) => {
                    error!(round_id = %self.id, ?error, "could not add a confirmed input");
                    self.end(EndRoundState::AbortedWithError, now);
                    return;
                }
            };
        }

        self.coinjoin_state = CoinjoinState::Construction(construction);
        self.set_phase(Phase::OutputRegistration, now);
    }

    fn step_output_registration(&mut self, now: DateTime<Utc>) {
        let all_ready = self.alices.iter().all(|alice| alice.ready_to_sign);
        if !all_ready && !self.is_phase_timed_out(now) {
            return;
        }

        let construction = match self.coinjoin_state.as_construction() {
            Ok(construction) => construction,
            Err(error) => {
                error!(round_id = %self.id, ?error, "output registration without a construction");
                self.end(EndRoundState::AbortedWithError, now);
                return;
            }
        };

        if construction.outputs().is_empty() {
            self.end(EndRoundState::AbortedNoOutputs, now);
            return;
        }

        let construction = match self.redirect_leftover(construction) {
            Some(with_blame_output) => with_blame_output,
            None => construction.clone(),
        };

        self.coinjoin_state = CoinjoinState::Signing(construction.finalize());
        self.set_phase(Phase::TransactionSigning, now);
    }

    /// Pay the value nobody registered an output for to the blame script, if it
    /// is worth an output.
    fn redirect_leftover(&self, construction: &Construction) -> Option<Construction> {
        let parameters = &self.parameters;
        let script_pubkey = parameters.blame_script.clone()?;

        let leftover = u64::try_from(self.amount_issuer.balance()).ok()?;
        let fee_rate = parameters.mining_fee_rate;
        let overhead = transaction_overhead_weight(
            construction.inputs().len(),
            construction.outputs().len() + 1,
        );
        let costs = fee(fee_rate, output_weight(&script_pubkey)) + fee(fee_rate, overhead);
        let value = Amount::from_sat(leftover).checked_sub(costs)?;

        if !parameters.allowed_output_amounts.contains(&value) {
            trace!(round_id = %self.id, %value, "leftover is absorbed as fee");
            return None;
        }

        match construction.add_output(TxOut {
            value,
            script_pubkey,
        }) {
            Ok(construction) => {
                debug!(round_id = %self.id, %value, "redirected leftover to the blame script");
                Some(construction)
            }
            Err(error) => {
                debug!(round_id = %self.id, ?error, "leftover is absorbed as fee");
                None
            }
        }
    }

    fn step_transaction_signing<R: RngCore + CryptoRng>(
        &mut self,
        now: DateTime<Utc>,
        outcome: &mut StepOutcome,
        rng: &mut R,
    ) {
        let signing = match self.coinjoin_state.as_signing() {
            Ok(signing) => signing.clone(),
            Err(error) => {
                error!(round_id = %self.id, ?error, "transaction signing without a signing state");
                self.end(EndRoundState::AbortedWithError, now);
                return;
            }
        };

        if signing.is_fully_signed() {
            outcome.broadcast = Some(signing.create_transaction());
            self.set_phase(Phase::TransactionBroadcasting, now);
            return;
        }

        if !self.is_phase_timed_out(now) {
            return;
        }

        let mut signers = BTreeSet::new();
        for (index, coin) in signing.inputs().iter().enumerate() {
            if signing.is_input_signed(index) {
                signers.insert(coin.outpoint);
            } else {
                warn!(round_id = %self.id, outpoint = ?coin.outpoint, "input did not sign");
                outcome.punishments.push((coin.outpoint, Punishment::Banned));
            }
        }

        self.end(EndRoundState::NotAllAlicesSign, now);

        if self.parameters.has_quorum(signers.len()) {
            let blame = Blame {
                blame_of: self.id,
                whitelist: signers,
            };
            let blame_round = Round::new(self.parameters.clone(), Some(blame), now, rng);
            info!(round_id = %self.id, blame_round_id = %blame_round.id, "created blame round");
            outcome.blame_round = Some(blame_round);
        }
    }
}
