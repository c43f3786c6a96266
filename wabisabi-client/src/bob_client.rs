//! The output side of a participant.

use bitcoin::{Amount, ScriptBuf, TxOut};
use tower::Service;

use wabisabi_coordinator::{
    arena::{Request, Response},
    coin::{fee, output_weight, ScriptType},
    round::{Phase, RoundState},
    WabiSabiProtocolError,
};
use wabisabi_crypto::{Credential, NUMBER_OF_CREDENTIALS};

use crate::{credential_pool::split_value, ArenaClient, ClientError, CredentialPool};

/// Registers outputs, paying with pooled credentials.
///
/// Bobs should use a different connection from the participant's Alices, so
/// the coordinator can't link outputs to inputs.
#[derive(Clone, Debug)]
pub struct BobClient<S> {
    arena: ArenaClient<S>,
}

impl<S> BobClient<S>
where
    S: Service<Request, Response = Response, Error = WabiSabiProtocolError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Register outputs through `arena`.
    pub fn new(arena: ArenaClient<S>) -> Self {
        Self { arena }
    }

    /// The round's state, as of the last refresh.
    pub fn round(&self) -> &RoundState {
        self.arena.round()
    }

    /// Fetch the round's latest state.
    pub async fn refresh(&mut self) -> Result<&RoundState, ClientError> {
        self.arena.refresh().await
    }

    /// The amount and weight credential value an output of `value` to
    /// `script` costs.
    pub fn output_cost(&self, script: &ScriptBuf, value: Amount) -> (u64, u64) {
        let weight = output_weight(script);
        let fee = fee(self.arena.parameters().mining_fee_rate, weight);

        ((value + fee).to_sat(), weight.to_wu())
    }

    /// The largest output to `script` that `amount_pool` can pay for.
    pub fn max_output_value(&self, script: &ScriptBuf, amount_pool: &CredentialPool) -> Option<Amount> {
        let fee = fee(self.arena.parameters().mining_fee_rate, output_weight(script));
        Amount::from_sat(amount_pool.total()).checked_sub(fee)
    }

    /// Register an output of `value` to `script`, paying from the pools.
    ///
    /// Combines credentials with reissuance until one request can pay, and
    /// adds the change back to the pools. Returns the output the transaction
    /// must contain.
    pub async fn register_output(
        &self,
        script: ScriptBuf,
        value: Amount,
        amount_pool: &mut CredentialPool,
        weight_pool: &mut CredentialPool,
    ) -> Result<TxOut, ClientError> {
        self.arena.expect_phase(Phase::OutputRegistration)?;

        let parameters = self.arena.parameters();
        match ScriptType::from_script(&script) {
            Some(script_type) if parameters.is_output_type_allowed(script_type) => {}
            _ => Err(ClientError::OutputNotRegistrable {
                value,
                reason: "the script type is not allowed",
            })?,
        }
        if !parameters.allowed_output_amounts.contains(&value) {
            Err(ClientError::OutputNotRegistrable {
                value,
                reason: "the value is out of range",
            })?;
        }

        let (amount_cost, weight_cost) = self.output_cost(&script, value);
        check_sufficient(amount_pool, amount_cost)?;
        check_sufficient(weight_pool, weight_cost)?;

        self.consolidate(amount_pool, weight_pool, amount_cost, weight_cost)
            .await?;

        let (amount_presented, weight_presented) = take_presentable(amount_pool, weight_pool)?;
        let amount_change = credential_total(&amount_presented) - amount_cost;
        let weight_change = credential_total(&weight_presented) - weight_cost;

        let result = self
            .arena
            .register_output(
                script.clone(),
                &amount_presented,
                amount_change,
                &weight_presented,
                weight_change,
            )
            .await;

        match result {
            Ok((amount, weight)) => {
                amount_pool.add(amount);
                weight_pool.add(weight);

                debug!(%value, "registered output");

                Ok(TxOut {
                    value,
                    script_pubkey: script,
                })
            }
            Err(error) => {
                // Rejected requests don't spend their serial numbers.
                amount_pool.add(amount_presented);
                weight_pool.add(weight_presented);
                Err(error)
            }
        }
    }

    /// Merge credentials until one request can present `amount_cost` and
    /// `weight_cost`.
    ///
    /// Only the issuer whose credentials fall short is reissued; the other
    /// presents zero credentials.
    async fn consolidate(
        &self,
        amount_pool: &mut CredentialPool,
        weight_pool: &mut CredentialPool,
        amount_cost: u64,
        weight_cost: u64,
    ) -> Result<(), ClientError> {
        let parameters = self.arena.parameters();
        let max_amount = parameters.max_amount_credential_value;
        let max_weight = parameters.max_weight_credential_value;

        check_representable(amount_cost, max_amount)?;
        check_representable(weight_cost, max_weight)?;

        loop {
            let merge_amount = amount_pool.presentable_total() < amount_cost;
            let merge_weight = weight_pool.presentable_total() < weight_cost;
            if !merge_amount && !merge_weight {
                return Ok(());
            }

            let presentable = (amount_pool.presentable_total(), weight_pool.presentable_total());

            let (amount_presented, amount_requested) =
                take_for_reissue(amount_pool, merge_amount, max_amount, amount_cost)?;
            let (weight_presented, weight_requested) =
                match take_for_reissue(weight_pool, merge_weight, max_weight, weight_cost) {
                    Ok(taken) => taken,
                    Err(error) => {
                        amount_pool.add(amount_presented);
                        return Err(error);
                    }
                };

            trace!(?amount_requested, ?weight_requested, "combining credentials");

            let result = self
                .arena
                .reissue_credentials(
                    &amount_presented,
                    &amount_requested,
                    &weight_presented,
                    &weight_requested,
                )
                .await;

            match result {
                Ok((amount, weight)) => {
                    amount_pool.add(amount);
                    weight_pool.add(weight);
                }
                Err(error) => {
                    amount_pool.add(amount_presented);
                    weight_pool.add(weight_presented);
                    return Err(error);
                }
            }

            if amount_pool.presentable_total() <= presentable.0
                && weight_pool.presentable_total() <= presentable.1
            {
                Err(ClientError::InsufficientCredentials {
                    available: amount_pool.presentable_total(),
                    needed: amount_cost,
                })?;
            }
        }
    }
}

/// Take credentials from `pool` for one reissuance request, with the values to
/// request for them.
///
/// Merged credentials are requested back as values of at most `max`; an
/// untouched pool presents and requests nothing but zeros.
fn take_for_reissue(
    pool: &mut CredentialPool,
    merge: bool,
    max: u64,
    needed: u64,
) -> Result<(Vec<Credential>, Vec<u64>), ClientError> {
    let insufficient = |pool: &CredentialPool| ClientError::InsufficientCredentials {
        available: pool.presentable_total(),
        needed,
    };

    if !merge {
        let zeros = pool.take_zero().ok_or_else(|| insufficient(pool))?;
        return Ok((zeros, Vec::new()));
    }

    let presented = pool.take_mergeable(max).ok_or_else(|| insufficient(pool))?;
    match split_value(credential_total(&presented), max) {
        Ok(requested) => Ok((presented, requested)),
        Err(error) => {
            pool.add(presented);
            Err(error)
        }
    }
}

fn check_representable(cost: u64, max: u64) -> Result<(), ClientError> {
    if cost > max.saturating_mul(NUMBER_OF_CREDENTIALS as u64) {
        Err(ClientError::ValueTooLarge {
            value: cost,
            count: NUMBER_OF_CREDENTIALS,
            max,
        })?;
    }

    Ok(())
}

fn check_sufficient(pool: &CredentialPool, needed: u64) -> Result<(), ClientError> {
    if pool.total() < needed {
        Err(ClientError::InsufficientCredentials {
            available: pool.total(),
            needed,
        })?;
    }

    Ok(())
}

fn take_presentable(
    amount_pool: &mut CredentialPool,
    weight_pool: &mut CredentialPool,
) -> Result<(Vec<Credential>, Vec<Credential>), ClientError> {
    let amount = amount_pool
        .take_presentable()
        .ok_or(ClientError::InsufficientCredentials {
            available: amount_pool.total(),
            needed: 0,
        })?;
    let Some(weight) = weight_pool.take_presentable() else {
        let available = weight_pool.total();
        amount_pool.add(amount);
        return Err(ClientError::InsufficientCredentials {
            available,
            needed: 0,
        });
    };

    Ok((amount, weight))
}

fn credential_total(credentials: &[Credential]) -> u64 {
    credentials.iter().map(|credential| credential.value()).sum()
}
