//! Keys that sign ownership proofs and witnesses.

use bitcoin::{
    hashes::Hash,
    key::{Keypair, TapTweak},
    secp256k1::{All, Message, Secp256k1, SecretKey},
    sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType},
    taproot, CompressedPublicKey, ScriptBuf, Transaction, TxOut, Witness,
};
use once_cell::sync::Lazy;

use wabisabi_coordinator::{ownership::OwnershipProof, round};

use crate::ClientError;

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// The key controlling one coin.
#[derive(Clone, Debug)]
pub enum Signer {
    /// A P2WPKH coin's key.
    P2wpkh(SecretKey),
    /// A P2TR coin's internal key, with no script tree.
    P2tr(Keypair),
}

impl Signer {
    /// The script of coins this key controls.
    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            Signer::P2wpkh(secret_key) => {
                let public_key = CompressedPublicKey(secret_key.public_key(&*SECP));
                ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash())
            }
            Signer::P2tr(keypair) => {
                let (internal_key, _parity) = keypair.x_only_public_key();
                ScriptBuf::new_p2tr(&*SECP, internal_key, None)
            }
        }
    }

    /// Prove to the coordinator of `round_id` that this key controls a coin.
    pub fn ownership_proof(&self, round_id: &round::Id) -> OwnershipProof {
        match self {
            Signer::P2wpkh(secret_key) => {
                OwnershipProof::generate_p2wpkh(&*SECP, secret_key, round_id)
            }
            Signer::P2tr(keypair) => OwnershipProof::generate_p2tr(&*SECP, keypair, round_id),
        }
    }

    /// Sign input `input_index` of `transaction`, which spends `prevouts`.
    pub fn sign(
        &self,
        transaction: &Transaction,
        prevouts: &[TxOut],
        input_index: usize,
    ) -> Result<Witness, ClientError> {
        let spent = prevouts
            .get(input_index)
            .ok_or(ClientError::Signing("input index out of range"))?;
        let mut cache = SighashCache::new(transaction);

        match self {
            Signer::P2wpkh(secret_key) => {
                let sighash = cache
                    .p2wpkh_signature_hash(
                        input_index,
                        &spent.script_pubkey,
                        spent.value,
                        EcdsaSighashType::All,
                    )
                    .map_err(|_| ClientError::Signing("spent script is not P2WPKH"))?;
                let message = Message::from_digest(sighash.to_byte_array());
                let signature = bitcoin::ecdsa::Signature::sighash_all(
                    SECP.sign_ecdsa(&message, secret_key),
                );

                Ok(Witness::p2wpkh(&signature, &secret_key.public_key(&*SECP)))
            }
            Signer::P2tr(keypair) => {
                let sighash = cache
                    .taproot_key_spend_signature_hash(
                        input_index,
                        &Prevouts::All(prevouts),
                        TapSighashType::Default,
                    )
                    .map_err(|_| ClientError::Signing("taproot sighash failed"))?;
                let message = Message::from_digest(sighash.to_byte_array());
                let tweaked = Keypair::from(keypair.tap_tweak(&*SECP, None));
                let signature = taproot::Signature {
                    signature: SECP.sign_schnorr_no_aux_rand(&message, &tweaked),
                    sighash_type: TapSighashType::Default,
                };

                Ok(Witness::p2tr_key_spend(&signature))
            }
        }
    }
}
