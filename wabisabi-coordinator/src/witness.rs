//! Checks that a witness signs the round's transaction.

use bitcoin::{
    ecdsa,
    hashes::Hash,
    secp256k1::Message,
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    taproot, CompressedPublicKey, ScriptBuf, Transaction, TxOut, Witness,
};
use thiserror::Error;

use crate::{coin::ScriptType, ownership::{p2tr_output_key, SECP}};

/// Why a witness was rejected.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum WitnessError {
    #[error("input {0} is not in the transaction")]
    InputIndexOutOfRange(usize),

    #[error("the spent script type is not supported")]
    UnsupportedScript,

    #[error("expected {expected} witness elements, got {actual}")]
    WrongElementCount { expected: usize, actual: usize },

    #[error("the witness public key does not match the spent script")]
    WrongPublicKey,

    #[error("the witness signature is malformed")]
    MalformedSignature,

    #[error("the witness signature commits to the wrong parts of the transaction")]
    WrongSighashType,

    #[error("the sighash could not be computed: {0}")]
    Sighash(String),

    #[error("the witness signature is invalid")]
    InvalidSignature,
}

/// Verify that `witness` validly spends input `input_index` of `transaction`.
///
/// `prevouts` are the outputs spent by every input, in input order.
/// P2WPKH witnesses must sign with `SIGHASH_ALL`, and P2TR key path witnesses
/// with the default or `SIGHASH_ALL` sighash type, so a signature commits to
/// the whole transaction.
pub fn verify_input_witness(
    transaction: &Transaction,
    prevouts: &[TxOut],
    input_index: usize,
    witness: &Witness,
) -> Result<(), WitnessError> {
    let spent = prevouts
        .get(input_index)
        .filter(|_| input_index < transaction.input.len())
        .ok_or(WitnessError::InputIndexOutOfRange(input_index))?;

    let mut cache = SighashCache::new(transaction);

    match ScriptType::from_script(&spent.script_pubkey) {
        Some(ScriptType::P2wpkh) => {
            expect_elements(witness, 2)?;

            let signature = witness
                .nth(0)
                .and_then(|bytes| ecdsa::Signature::from_slice(bytes).ok())
                .ok_or(WitnessError::MalformedSignature)?;
            let public_key = witness
                .nth(1)
                .and_then(|bytes| CompressedPublicKey::from_slice(bytes).ok())
                .ok_or(WitnessError::WrongPublicKey)?;

            if spent.script_pubkey != ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash()) {
                return Err(WitnessError::WrongPublicKey);
            }
            if signature.sighash_type != EcdsaSighashType::All {
                return Err(WitnessError::WrongSighashType);
            }

            let sighash = cache
                .p2wpkh_signature_hash(
                    input_index,
                    &spent.script_pubkey,
                    spent.value,
                    signature.sighash_type,
                )
                .map_err(|error| WitnessError::Sighash(error.to_string()))?;

            SECP.verify_ecdsa(
                &Message::from_digest(sighash.to_byte_array()),
                &signature.signature,
                &public_key.0,
            )
            .map_err(|_| WitnessError::InvalidSignature)
        }

        Some(ScriptType::P2tr) => {
            expect_elements(witness, 1)?;

            let signature = witness
                .nth(0)
                .and_then(|bytes| taproot::Signature::from_slice(bytes).ok())
                .ok_or(WitnessError::MalformedSignature)?;
            if !matches!(
                signature.sighash_type,
                TapSighashType::Default | TapSighashType::All
            ) {
                return Err(WitnessError::WrongSighashType);
            }

            let output_key =
                p2tr_output_key(&spent.script_pubkey).ok_or(WitnessError::UnsupportedScript)?;

            let sighash = cache
                .taproot_key_spend_signature_hash(
                    input_index,
                    &Prevouts::All(prevouts),
                    signature.sighash_type,
                )
                .map_err(|error| WitnessError::Sighash(error.to_string()))?;

            SECP.verify_schnorr(
                &signature.signature,
                &Message::from_digest(sighash.to_byte_array()),
                &output_key,
            )
            .map_err(|_| WitnessError::InvalidSignature)
        }

        None => Err(WitnessError::UnsupportedScript),
    }
}

fn expect_elements(witness: &Witness, expected: usize) -> Result<(), WitnessError> {
    if witness.len() != expected {
        return Err(WitnessError::WrongElementCount {
            expected,
            actual: witness.len(),
        });
    }

    Ok(())
}
