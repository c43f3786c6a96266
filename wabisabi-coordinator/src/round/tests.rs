//! Tests for rounds, driven directly without an arena.

use bitcoin::{Amount, ScriptBuf};
use rand::thread_rng;

use crate::{
    tests::Participant,
    WabiSabiProtocolError,
};

use super::Round;


fn register(round: &mut Round, participant: &mut Participant) -> Result<(), WabiSabiProtocolError> {
    let (amount, amount_validation) = participant.zero_amount_request();
    let (weight, weight_validation) = participant.zero_weight_request();

    let registration = round.register_input(
        participant.coin.clone(),
        participant.ownership_proof(),
        &amount,
        &weight,
        &mut thread_rng(),
    )?;

    participant.alice_id = Some(registration.alice_id);
    participant.accept_amount(&registration.amount_credentials, amount_validation);
    participant.accept_weight(&registration.weight_credentials, weight_validation);

    Ok(())
}

fn confirm(round: &mut Round, participant: &mut Participant) -> Result<(), WabiSabiProtocolError> {
    let (zero_amount, _) = participant.zero_amount_request();
    let (real_amount, real_amount_validation) = participant.real_amount_request();
    let (zero_weight, _) = participant.zero_weight_request();
    let (real_weight, real_weight_validation) = participant.real_weight_request();

    let confirmation = round.confirm_connection(
        &participant.alice_id(),
        &zero_amount,
        &real_amount,
        &zero_weight,
        &real_weight,
        &mut thread_rng(),
    )?;

    participant.accept_amount(&confirmation.real_amount_credentials, real_amount_validation);
    participant.accept_weight(&confirmation.real_weight_credentials, real_weight_validation);

    Ok(())
}

/// Register an output to `script` with everything but `keep`, returning its
/// value.
fn register_output(
    round: &mut Round,
    participant: &mut Participant,
    script: ScriptBuf,
    keep: u64,
) -> Result<Amount, WabiSabiProtocolError> {
    let value = participant.output_value(&script, keep);
    let ((amount, amount_validation), (weight, weight_validation)) =
        participant.output_requests(&script, keep);

    let registration = round.register_output(script, &amount, &weight, &mut thread_rng())?;

    participant.accept_amount(&registration.amount_credentials, amount_validation);
    participant.accept_weight(&registration.weight_credentials, weight_validation);

    Ok(value)
}
