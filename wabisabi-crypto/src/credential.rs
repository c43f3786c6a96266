//! Credentials held by clients, and their randomized presentations.

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{CredentialIssuerSecretKey, Mac, GENERATORS};

/// A MAC on a hidden value, known only to the client that requested it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    value: u64,
    randomness: Scalar,
    mac: Mac,
}

impl Credential {
    pub(crate) fn new(value: u64, randomness: Scalar, mac: Mac) -> Self {
        Self {
            value,
            randomness,
            mac,
        }
    }

    /// The certified value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The serial number this credential reveals when it is presented.
    pub fn serial_number(&self) -> CompressedRistretto {
        (self.randomness * GENERATORS.gs).compress()
    }

    pub(crate) fn randomness(&self) -> Scalar {
        self.randomness
    }

    pub(crate) fn mac(&self) -> &Mac {
        &self.mac
    }

    /// The attribute commitment `Ma = a·Gg + r·Gh`.
    pub(crate) fn ma(&self) -> RistrettoPoint {
        Scalar::from(self.value) * GENERATORS.gg + self.randomness * GENERATORS.gh
    }

    /// Randomize this credential with a fresh `z`, returning the presentation
    /// and `z`.
    pub(crate) fn present<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> (CredentialPresentation, Scalar) {
        let g = &*GENERATORS;
        let z = Scalar::random(rng);
        let u = self.mac.u();

        let presentation = CredentialPresentation {
            ca: z * g.ga + self.ma(),
            cx0: z * g.gx0 + u,
            cx1: z * g.gx1 + self.mac.t * u,
            cv: z * g.gv + self.mac.v,
            s: self.randomness * g.gs,
        };

        (presentation, z)
    }
}

/// A presented credential: commitments that can't be linked to the issued
/// MAC, plus the serial number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPresentation {
    /// `Ca = z·Ga + Ma`
    pub ca: RistrettoPoint,
    /// `Cx0 = z·Gx0 + U`
    pub cx0: RistrettoPoint,
    /// `Cx1 = z·Gx1 + t·U`
    pub cx1: RistrettoPoint,
    /// `CV = z·GV + V`
    pub cv: RistrettoPoint,
    /// The serial number `S = r·Gs`.
    pub s: RistrettoPoint,
}

impl CredentialPresentation {
    /// The serial number, in the form issuers record.
    pub fn serial_number(&self) -> CompressedRistretto {
        self.s.compress()
    }

    /// Recompute `Z = CV − (w·Gw + x0·Cx0 + x1·Cx1 + ya·Ca)`.
    pub(crate) fn compute_z(&self, sk: &CredentialIssuerSecretKey) -> RistrettoPoint {
        self.cv - (sk.w * GENERATORS.gw + sk.x0 * self.cx0 + sk.x1 * self.cx1 + sk.ya * self.ca)
    }
}
