//! Issuer key material.

use std::fmt;

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::GENERATORS;

/// The issuer's secret MAC key `(w, w', x0, x1, ya)`.
#[derive(Clone)]
pub struct CredentialIssuerSecretKey {
    pub(crate) w: Scalar,
    pub(crate) wp: Scalar,
    pub(crate) x0: Scalar,
    pub(crate) x1: Scalar,
    pub(crate) ya: Scalar,
}

impl fmt::Debug for CredentialIssuerSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIssuerSecretKey").finish_non_exhaustive()
    }
}

impl CredentialIssuerSecretKey {
    /// Generate a fresh random secret key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            w: Scalar::random(rng),
            wp: Scalar::random(rng),
            x0: Scalar::random(rng),
            x1: Scalar::random(rng),
            ya: Scalar::random(rng),
        }
    }

    /// Compute the public parameters that commit to this key.
    pub fn compute_parameters(&self) -> CredentialIssuerParameters {
        let g = &*GENERATORS;

        CredentialIssuerParameters {
            cw: self.w * g.gw + self.wp * g.gwp,
            i: g.gv - (self.x0 * g.gx0 + self.x1 * g.gx1 + self.ya * g.ga),
        }
    }
}

/// Public issuer parameters `(Cw, I)`.
///
/// Clients verify issuance proofs against these parameters, which stops the
/// issuer from tagging individual clients with different keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialIssuerParameters {
    /// `Cw = w·Gw + w'·Gwp`
    pub cw: RistrettoPoint,
    /// `I = GV − (x0·Gx0 + x1·Gx1 + ya·Ga)`
    pub i: RistrettoPoint,
}
