//! Fiat-Shamir transcripts for credential proofs.
//!
//! Wraps a [`merlin::Transcript`], so the challenge binds the protocol label,
//! the issuer parameters, every statement and every public nonce.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand_core::{CryptoRng, RngCore};

use crate::{proof_system::Statement, CredentialIssuerParameters};

const DOMAIN_SEPARATOR: &[u8] = b"WabiSabi_v1.0";

/// A proof transcript.
#[derive(Clone)]
pub struct Transcript {
    inner: merlin::Transcript,
}

impl Transcript {
    /// Start a transcript for the protocol step named by `label`.
    pub fn new(label: &[u8]) -> Self {
        let mut inner = merlin::Transcript::new(DOMAIN_SEPARATOR);
        inner.append_message(b"protocol", label);

        Self { inner }
    }

    /// Bind the proofs to the issuer's public parameters.
    pub fn commit_parameters(&mut self, parameters: &CredentialIssuerParameters) {
        self.append_point(b"issuer-cw", &parameters.cw);
        self.append_point(b"issuer-i", &parameters.i);
    }

    /// Append a statement's public points and generators.
    pub fn commit_statement(&mut self, statement: &Statement) {
        self.inner
            .append_u64(b"equations", statement.equations.len() as u64);

        for equation in &statement.equations {
            self.append_point(b"public-point", &equation.public_point);
            for generator in &equation.generators {
                self.append_point(b"generator", generator);
            }
        }
    }

    /// Append the public nonces of one proof.
    pub fn commit_public_nonces(&mut self, public_nonces: &[RistrettoPoint]) {
        self.inner
            .append_u64(b"nonces", public_nonces.len() as u64);

        for nonce in public_nonces {
            self.append_point(b"public-nonce", nonce);
        }
    }

    /// Derive secret nonces from the transcript state, the witness and `rng`.
    ///
    /// A broken `rng` can't leak the witness, because the transcript and the
    /// witness are mixed into the nonce generator.
    pub fn generate_secret_nonces<R: RngCore + CryptoRng>(
        &self,
        witness: &[Scalar],
        rng: &mut R,
    ) -> Vec<Scalar> {
        let mut builder = self.inner.build_rng();
        for scalar in witness {
            builder = builder.rekey_with_witness_bytes(b"witness", scalar.as_bytes());
        }
        let mut nonce_rng = builder.finalize(rng);

        witness
            .iter()
            .map(|_| Scalar::random(&mut nonce_rng))
            .collect()
    }

    /// Derive the Fiat-Shamir challenge.
    pub fn generate_challenge(&mut self) -> Scalar {
        let mut bytes = [0u8; 64];
        self.inner.challenge_bytes(b"challenge", &mut bytes);

        Scalar::from_bytes_mod_order_wide(&bytes)
    }

    fn append_point(&mut self, label: &'static [u8], point: &RistrettoPoint) {
        self.inner
            .append_message(label, point.compress().as_bytes());
    }
}
