//! Algebraic MACs over attribute commitments.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use serde::{Deserialize, Serialize};

use crate::{generators::hash_to_u, CredentialIssuerSecretKey, GENERATORS};

/// A MAC `(t, V)` on an attribute commitment `Ma`, where
/// `V = w·Gw + (x0 + x1·t)·U + ya·Ma` and `U = H(t)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mac {
    /// The random MAC nonce.
    pub t: Scalar,
    /// The MAC value.
    pub v: RistrettoPoint,
}

impl Mac {
    /// Compute the MAC of `ma` with nonce `t`.
    pub(crate) fn compute(sk: &CredentialIssuerSecretKey, ma: &RistrettoPoint, t: Scalar) -> Self {
        let u = hash_to_u(t.as_bytes());
        let v = sk.w * GENERATORS.gw + (sk.x0 + sk.x1 * t) * u + sk.ya * ma;

        Mac { t, v }
    }

    /// The point `U = H(t)`.
    pub(crate) fn u(&self) -> RistrettoPoint {
        hash_to_u(self.t.as_bytes())
    }

    /// Check this MAC directly with the secret key.
    #[cfg(test)]
    pub(crate) fn verify(&self, sk: &CredentialIssuerSecretKey, ma: &RistrettoPoint) -> bool {
        *self == Mac::compute(sk, ma, self.t)
    }
}
