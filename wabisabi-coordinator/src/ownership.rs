//! Proofs that a participant controls the coin it registers.
//!
//! An ownership proof signs the round id under the coordinator identifier,
//! with the key that can spend the coin. Proofs for one round can't be
//! replayed in another.

use bitcoin::{
    hashes::{sha256, Hash},
    key::{Keypair, TapTweak, XOnlyPublicKey},
    secp256k1::{ecdsa, schnorr, All, Message, Secp256k1, SecretKey, Signing, Verification},
    CompressedPublicKey, Script, ScriptBuf,
};
use once_cell::sync::Lazy;

use crate::round;

/// The identifier signed by every ownership proof.
pub const COORDINATOR_IDENTIFIER: &[u8] = b"CoinJoinCoordinatorIdentifier";

/// A verification context shared by the coordinator.
pub(crate) static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// A signature over [`commitment_data`] with the coin's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnershipProof {
    /// An ECDSA signature, and the public key the P2WPKH script hashes.
    P2wpkh {
        /// The compressed public key.
        public_key: CompressedPublicKey,
        /// The signature.
        signature: ecdsa::Signature,
    },

    /// A BIP340 signature with the tweaked output key of a P2TR script.
    P2tr {
        /// The signature.
        signature: schnorr::Signature,
    },
}

/// The message signed by ownership proofs for `round_id`.
pub fn commitment_data(round_id: &round::Id) -> Message {
    let mut data = COORDINATOR_IDENTIFIER.to_vec();
    data.extend_from_slice(round_id.as_bytes());

    Message::from_digest(sha256::Hash::hash(&data).to_byte_array())
}

impl OwnershipProof {
    /// Prove ownership of the P2WPKH coin controlled by `secret_key`.
    pub fn generate_p2wpkh<C: Signing>(
        secp: &Secp256k1<C>,
        secret_key: &SecretKey,
        round_id: &round::Id,
    ) -> Self {
        let public_key = CompressedPublicKey(secret_key.public_key(secp));
        let signature = secp.sign_ecdsa(&commitment_data(round_id), secret_key);

        OwnershipProof::P2wpkh {
            public_key,
            signature,
        }
    }

    /// Prove ownership of the P2TR coin with internal key `keypair` and no
    /// script tree.
    pub fn generate_p2tr<C: Signing + Verification>(
        secp: &Secp256k1<C>,
        keypair: &Keypair,
        round_id: &round::Id,
    ) -> Self {
        let tweaked = Keypair::from(keypair.tap_tweak(secp, None));
        let signature = secp.sign_schnorr_no_aux_rand(&commitment_data(round_id), &tweaked);

        OwnershipProof::P2tr { signature }
    }

    /// Does this proof sign `round_id` with the key that controls `script_pubkey`?
    pub fn verify(&self, script_pubkey: &Script, round_id: &round::Id) -> bool {
        let message = commitment_data(round_id);

        match self {
            OwnershipProof::P2wpkh {
                public_key,
                signature,
            } => {
                *script_pubkey == ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash())
                    && SECP
                        .verify_ecdsa(&message, signature, &public_key.0)
                        .is_ok()
            }
            OwnershipProof::P2tr { signature } => match p2tr_output_key(script_pubkey) {
                Some(output_key) => SECP.verify_schnorr(signature, &message, &output_key).is_ok(),
                None => false,
            },
        }
    }
}

/// The output key of a P2TR script.
pub(crate) fn p2tr_output_key(script_pubkey: &Script) -> Option<XOnlyPublicKey> {
    if !script_pubkey.is_p2tr() {
        return None;
    }

    XOnlyPublicKey::from_slice(&script_pubkey.as_bytes()[2..34]).ok()
}
