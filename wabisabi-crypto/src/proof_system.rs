//! A generic sigma protocol for linear relations between Ristretto points.
//!
//! A [`Statement`] is a set of [`Equation`]s that share one witness vector:
//! each equation claims `public_point = Σ witness[i]·generators[i]`. All the
//! proofs of a request are answered with a single Fiat-Shamir challenge.

use curve25519_dalek::{
    ristretto::RistrettoPoint,
    scalar::Scalar,
    traits::{IsIdentity, MultiscalarMul, VartimeMultiscalarMul},
};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;

/// One linear relation: `public_point = Σ witness[i]·generators[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Equation {
    /// The left hand side.
    pub public_point: RistrettoPoint,
    /// One generator per witness scalar; unused positions hold the identity.
    pub generators: Vec<RistrettoPoint>,
}

impl Equation {
    /// Create an equation.
    pub fn new(public_point: RistrettoPoint, generators: Vec<RistrettoPoint>) -> Self {
        Self {
            public_point,
            generators,
        }
    }

    fn public_nonce(&self, secret_nonces: &[Scalar]) -> RistrettoPoint {
        RistrettoPoint::multiscalar_mul(secret_nonces, &self.generators)
    }

    /// Checks `Σ responses[i]·generators[i] == nonce + challenge·public_point`.
    fn verify(&self, public_nonce: &RistrettoPoint, challenge: &Scalar, responses: &[Scalar]) -> bool {
        let scalars = responses
            .iter()
            .copied()
            .chain([-challenge, -Scalar::ONE]);
        let points = self
            .generators
            .iter()
            .copied()
            .chain([self.public_point, *public_nonce]);

        RistrettoPoint::vartime_multiscalar_mul(scalars, points).is_identity()
    }
}

/// A conjunction of equations over the same witness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    /// The equations, which all have `witness_len()` generators.
    pub equations: Vec<Equation>,
}

impl Statement {
    /// Create a statement.
    ///
    /// # Panics
    ///
    /// If the equations have different numbers of generators.
    pub fn new(equations: Vec<Equation>) -> Self {
        let witness_len = equations.first().map_or(0, |e| e.generators.len());
        assert!(
            equations.iter().all(|e| e.generators.len() == witness_len),
            "every equation of a statement has one generator per witness scalar",
        );

        Self { equations }
    }

    /// The number of witness scalars.
    pub fn witness_len(&self) -> usize {
        self.equations.first().map_or(0, |e| e.generators.len())
    }

    /// Returns true if `witness` satisfies every equation.
    pub fn is_satisfied_by(&self, witness: &[Scalar]) -> bool {
        witness.len() == self.witness_len()
            && self.equations.iter().all(|equation| {
                RistrettoPoint::multiscalar_mul(witness, &equation.generators)
                    == equation.public_point
            })
    }
}

/// A statement together with a witness that satisfies it.
#[derive(Clone, Debug)]
pub struct Knowledge {
    /// The public statement.
    pub statement: Statement,
    /// The secret witness.
    pub witness: Vec<Scalar>,
}

impl Knowledge {
    /// Create a knowledge pair.
    pub fn new(statement: Statement, witness: Vec<Scalar>) -> Self {
        debug_assert!(
            statement.is_satisfied_by(&witness),
            "knowledge witnesses satisfy their statements",
        );

        Self { statement, witness }
    }
}

/// A non-interactive proof of one statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// One public nonce per equation.
    pub public_nonces: Vec<RistrettoPoint>,
    /// One response per witness scalar.
    pub responses: Vec<Scalar>,
}

/// Prove every item of `knowledge` under a single challenge.
pub fn prove<R: RngCore + CryptoRng>(
    transcript: &mut Transcript,
    knowledge: &[Knowledge],
    rng: &mut R,
) -> Vec<Proof> {
    for item in knowledge {
        transcript.commit_statement(&item.statement);
    }

    let secret_nonces: Vec<Vec<Scalar>> = knowledge
        .iter()
        .map(|item| transcript.generate_secret_nonces(&item.witness, rng))
        .collect();

    let public_nonces: Vec<Vec<RistrettoPoint>> = knowledge
        .iter()
        .zip(&secret_nonces)
        .map(|(item, nonces)| {
            item.statement
                .equations
                .iter()
                .map(|equation| equation.public_nonce(nonces))
                .collect()
        })
        .collect();

    for nonces in &public_nonces {
        transcript.commit_public_nonces(nonces);
    }

    let challenge = transcript.generate_challenge();

    knowledge
        .iter()
        .zip(secret_nonces)
        .zip(public_nonces)
        .map(|((item, secret_nonces), public_nonces)| Proof {
            public_nonces,
            responses: secret_nonces
                .iter()
                .zip(&item.witness)
                .map(|(nonce, witness)| nonce + challenge * witness)
                .collect(),
        })
        .collect()
}

/// Verify `proofs` against `statements` under a single challenge.
///
/// Returns false if the shapes don't match.
pub fn verify(transcript: &mut Transcript, statements: &[Statement], proofs: &[Proof]) -> bool {
    if statements.len() != proofs.len() {
        return false;
    }

    let well_formed = statements.iter().zip(proofs).all(|(statement, proof)| {
        proof.public_nonces.len() == statement.equations.len()
            && proof.responses.len() == statement.witness_len()
    });
    if !well_formed {
        return false;
    }

    for statement in statements {
        transcript.commit_statement(statement);
    }
    for proof in proofs {
        transcript.commit_public_nonces(&proof.public_nonces);
    }

    let challenge = transcript.generate_challenge();

    statements.iter().zip(proofs).all(|(statement, proof)| {
        statement
            .equations
            .iter()
            .zip(&proof.public_nonces)
            .all(|(equation, nonce)| equation.verify(nonce, &challenge, &proof.responses))
    })
}
