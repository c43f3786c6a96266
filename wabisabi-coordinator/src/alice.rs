//! Registered inputs.

use std::fmt;

use bitcoin::{Amount, Weight};
use rand::{CryptoRng, RngCore};

use crate::{coin::Coin, ownership::OwnershipProof};

/// A random identifier for a registered input.
///
/// Only the participant that registered the input learns its id.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; 32]);

impl Id {
    /// Generate a fresh random id.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create an id from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("alice::Id")
            .field(&hex::encode(self.0))
            .finish()
    }
}

/// A registered input and its progress through the round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alice {
    /// The input's id.
    pub id: Id,
    /// The registered coin.
    pub coin: Coin,
    /// The proof that the participant controls the coin.
    pub ownership_proof: OwnershipProof,
    /// Has the participant confirmed its connection?
    pub confirmed_connection: bool,
    /// Is the participant done registering outputs?
    pub ready_to_sign: bool,
    /// The amount and weight certified at connection confirmation.
    pub credit: Option<(Amount, Weight)>,
}

impl Alice {
    /// A freshly registered input.
    pub fn new(id: Id, coin: Coin, ownership_proof: OwnershipProof) -> Self {
        Self {
            id,
            coin,
            ownership_proof,
            confirmed_connection: false,
            ready_to_sign: false,
            credit: None,
        }
    }
}
