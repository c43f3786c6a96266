//! The credential issuer.

use std::collections::HashSet;

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand_core::{CryptoRng, RngCore};

use crate::{
    proof_system::{self, Statement},
    range_proof_width,
    statements::{
        balance_commitment, balance_statement, issuer_parameters_knowledge,
        range_proof_statement, show_credential_statement, zero_statement,
    },
    transcript::Transcript,
    CredentialIssuerParameters, CredentialIssuerSecretKey, CredentialsRequest,
    CredentialsResponse, CryptoError, Mac, NUMBER_OF_CREDENTIALS,
};

/// Issues credentials for one kind of value (amount or weight) in one round.
///
/// The issuer only sees the public `delta` of each request, so its running
/// [`balance`](Self::balance) is the total value it has certified, minus the
/// total value presented back to it.
#[derive(Debug)]
pub struct CredentialIssuer {
    secret_key: CredentialIssuerSecretKey,
    parameters: CredentialIssuerParameters,
    max_amount: u64,
    range_proof_width: usize,
    serial_numbers: HashSet<CompressedRistretto>,
    balance: i64,
}

/// A request that passed every check, waiting to be [committed](CredentialIssuer::commit).
#[derive(Clone, Debug)]
#[must_use = "prepared issuances do nothing until they are committed"]
pub struct PreparedIssuance {
    parameters: CredentialIssuerParameters,
    delta: i64,
    serial_numbers: Vec<CompressedRistretto>,
    requested: Vec<RistrettoPoint>,
}

impl PreparedIssuance {
    /// The checked request delta.
    pub fn delta(&self) -> i64 {
        self.delta
    }
}

impl CredentialIssuer {
    /// Create an issuer that certifies values up to `max_amount`.
    pub fn new(secret_key: CredentialIssuerSecretKey, max_amount: u64) -> Self {
        let parameters = secret_key.compute_parameters();

        Self {
            secret_key,
            parameters,
            max_amount,
            range_proof_width: range_proof_width(max_amount),
            serial_numbers: HashSet::new(),
            balance: 0,
        }
    }

    /// Create an issuer with a fresh random key.
    pub fn random<R: RngCore + CryptoRng>(max_amount: u64, rng: &mut R) -> Self {
        Self::new(CredentialIssuerSecretKey::random(rng), max_amount)
    }

    /// The public parameters clients verify issuance against.
    pub fn parameters(&self) -> &CredentialIssuerParameters {
        &self.parameters
    }

    /// The largest value a single request can move.
    pub fn max_amount(&self) -> u64 {
        self.max_amount
    }

    /// The number of bits in each range proof.
    pub fn range_proof_width(&self) -> usize {
        self.range_proof_width
    }

    /// The value certified and not yet presented back.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// The number of serial numbers spent so far.
    pub fn serial_number_count(&self) -> usize {
        self.serial_numbers.len()
    }

    #[cfg(test)]
    pub(crate) fn secret_key(&self) -> &CredentialIssuerSecretKey {
        &self.secret_key
    }

    /// Check `request` without changing the issuer.
    pub fn prepare(&self, request: &CredentialsRequest) -> Result<PreparedIssuance, CryptoError> {
        let requested_count = request.requested.len();
        if requested_count != NUMBER_OF_CREDENTIALS {
            Err(CryptoError::InvalidNumberOfRequestedCredentials {
                expected: NUMBER_OF_CREDENTIALS,
                actual: requested_count,
            })?;
        }

        let is_null = request.is_null_request();
        if is_null {
            if request.delta != 0 {
                Err(CryptoError::NonZeroNullRequestDelta(request.delta))?;
            }
        } else if request.presented.len() != NUMBER_OF_CREDENTIALS {
            Err(CryptoError::InvalidNumberOfPresentedCredentials {
                expected: NUMBER_OF_CREDENTIALS,
                actual: request.presented.len(),
            })?;
        }

        let bound = self
            .max_amount
            .saturating_mul(NUMBER_OF_CREDENTIALS as u64);
        if request.delta.unsigned_abs() > bound {
            Err(CryptoError::DeltaOutOfRange {
                delta: request.delta,
                bound,
            })?;
        }

        let serial_numbers: Vec<CompressedRistretto> = request.serial_numbers().collect();
        let unique: HashSet<&CompressedRistretto> = serial_numbers.iter().collect();
        if unique.len() != serial_numbers.len() {
            Err(CryptoError::SerialNumberDuplicated)?;
        }
        if serial_numbers
            .iter()
            .any(|serial_number| self.serial_numbers.contains(serial_number))
        {
            Err(CryptoError::SerialNumberAlreadyUsed)?;
        }

        let expected_bits = if is_null { 0 } else { self.range_proof_width };
        for issuance in &request.requested {
            if issuance.bit_commitments.len() != expected_bits {
                Err(CryptoError::InvalidBitCommitment {
                    expected: expected_bits,
                    actual: issuance.bit_commitments.len(),
                })?;
            }
        }

        let requested: Vec<RistrettoPoint> = request.requested.iter().map(|r| r.ma).collect();

        let mut statements: Vec<Statement> = request
            .presented
            .iter()
            .map(|presentation| {
                let z = presentation.compute_z(&self.secret_key);
                show_credential_statement(presentation, z, &self.parameters)
            })
            .collect();

        statements.extend(request.requested.iter().map(|issuance| {
            if is_null {
                zero_statement(&issuance.ma)
            } else {
                range_proof_statement(&issuance.ma, &issuance.bit_commitments)
            }
        }));

        if !is_null {
            statements.push(balance_statement(balance_commitment(
                request.delta,
                &request.presented,
                &requested,
            )));
        }

        let mut transcript = request_transcript(&self.parameters);
        if !proof_system::verify(&mut transcript, &statements, &request.proofs) {
            Err(CryptoError::CoordinatorReceivedInvalidProofs)?;
        }

        Ok(PreparedIssuance {
            parameters: self.parameters,
            delta: request.delta,
            serial_numbers,
            requested,
        })
    }

    /// Record a prepared request, and issue its MACs with issuance proofs.
    ///
    /// Serial numbers are checked again, so a prepared request can't be
    /// committed twice.
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        prepared: PreparedIssuance,
        rng: &mut R,
    ) -> Result<CredentialsResponse, CryptoError> {
        if prepared.parameters != self.parameters {
            Err(CryptoError::ForeignIssuance)?;
        }
        if prepared
            .serial_numbers
            .iter()
            .any(|serial_number| self.serial_numbers.contains(serial_number))
        {
            Err(CryptoError::SerialNumberAlreadyUsed)?;
        }

        self.serial_numbers.extend(prepared.serial_numbers);
        self.balance -= prepared.delta;

        let (issued, knowledge): (Vec<Mac>, Vec<_>) = prepared
            .requested
            .iter()
            .map(|ma| {
                let mac = Mac::compute(&self.secret_key, ma, Scalar::random(rng));
                let knowledge =
                    issuer_parameters_knowledge(&self.parameters, &mac, ma, &self.secret_key);
                (mac, knowledge)
            })
            .unzip();

        let mut transcript = issuance_transcript(&self.parameters);
        let proofs = proof_system::prove(&mut transcript, &knowledge, rng);

        Ok(CredentialsResponse { issued, proofs })
    }

    /// Check and commit `request` in one step.
    pub fn handle_request<R: RngCore + CryptoRng>(
        &mut self,
        request: &CredentialsRequest,
        rng: &mut R,
    ) -> Result<CredentialsResponse, CryptoError> {
        let prepared = self.prepare(request)?;
        self.commit(prepared, rng)
    }
}

pub(crate) fn request_transcript(parameters: &CredentialIssuerParameters) -> Transcript {
    let mut transcript = Transcript::new(b"credential request");
    transcript.commit_parameters(parameters);
    transcript
}

pub(crate) fn issuance_transcript(parameters: &CredentialIssuerParameters) -> Transcript {
    let mut transcript = Transcript::new(b"credential issuance");
    transcript.commit_parameters(parameters);
    transcript
}
