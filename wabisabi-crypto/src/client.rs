//! The client side of credential requests.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand_core::{CryptoRng, RngCore};

use crate::{
    issuer::{issuance_transcript, request_transcript},
    proof_system::{self, Knowledge},
    range_proof_width,
    statements::{
        balance_commitment, balance_knowledge, issuer_parameters_statement,
        range_proof_knowledge, show_credential_knowledge, zero_knowledge,
    },
    Credential, CredentialIssuerParameters, CredentialsRequest, CredentialsResponse,
    CryptoError, IssuanceRequest, GENERATORS, NUMBER_OF_CREDENTIALS,
};

/// Builds credential requests for one issuer, and checks its responses.
#[derive(Clone, Debug)]
pub struct WabiSabiClient {
    parameters: CredentialIssuerParameters,
    max_amount: u64,
    range_proof_width: usize,
}

/// The secrets needed to turn a [`CredentialsResponse`] into credentials.
///
/// Only valid for the response to the request it was created with.
#[derive(Clone, Debug)]
#[must_use = "responses can't be turned into credentials without their validation data"]
pub struct CredentialsResponseValidation {
    requested: Vec<RequestedCredential>,
}

impl CredentialsResponseValidation {
    /// The values that were requested, in request order.
    pub fn requested_values(&self) -> impl Iterator<Item = u64> + '_ {
        self.requested.iter().map(|r| r.value)
    }
}

#[derive(Clone, Debug)]
struct RequestedCredential {
    ma: RistrettoPoint,
    value: u64,
    randomness: Scalar,
}

impl WabiSabiClient {
    /// Create a client for an issuer with `parameters` and `max_amount`.
    pub fn new(parameters: CredentialIssuerParameters, max_amount: u64) -> Self {
        Self {
            parameters,
            max_amount,
            range_proof_width: range_proof_width(max_amount),
        }
    }

    /// The issuer parameters this client verifies against.
    pub fn parameters(&self) -> &CredentialIssuerParameters {
        &self.parameters
    }

    /// The largest value of a single credential.
    pub fn max_amount(&self) -> u64 {
        self.max_amount
    }

    /// Request [`NUMBER_OF_CREDENTIALS`] zero value credentials.
    pub fn create_request_for_zero_amount<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> (CredentialsRequest, CredentialsResponseValidation) {
        let mut requested = Vec::with_capacity(NUMBER_OF_CREDENTIALS);
        let mut issuance_requests = Vec::with_capacity(NUMBER_OF_CREDENTIALS);
        let mut knowledge = Vec::with_capacity(NUMBER_OF_CREDENTIALS);

        for _ in 0..NUMBER_OF_CREDENTIALS {
            let randomness = Scalar::random(rng);
            let ma = randomness * GENERATORS.gh;

            knowledge.push(zero_knowledge(&ma, randomness));
            issuance_requests.push(IssuanceRequest {
                ma,
                bit_commitments: Vec::new(),
            });
            requested.push(RequestedCredential {
                ma,
                value: 0,
                randomness,
            });
        }

        let mut transcript = request_transcript(&self.parameters);
        let proofs = proof_system::prove(&mut transcript, &knowledge, rng);

        (
            CredentialsRequest {
                delta: 0,
                presented: Vec::new(),
                requested: issuance_requests,
                proofs,
            },
            CredentialsResponseValidation { requested },
        )
    }

    /// Present `credentials_to_present`, and request `amounts_to_request`.
    ///
    /// Requested amounts are padded with zeros to [`NUMBER_OF_CREDENTIALS`].
    /// Exactly [`NUMBER_OF_CREDENTIALS`] credentials must be presented; use
    /// zero value credentials as padding.
    pub fn create_request<R: RngCore + CryptoRng>(
        &self,
        amounts_to_request: &[u64],
        credentials_to_present: &[Credential],
        rng: &mut R,
    ) -> Result<(CredentialsRequest, CredentialsResponseValidation), CryptoError> {
        if amounts_to_request.len() > NUMBER_OF_CREDENTIALS {
            Err(CryptoError::InvalidNumberOfRequestedCredentials {
                expected: NUMBER_OF_CREDENTIALS,
                actual: amounts_to_request.len(),
            })?;
        }
        if credentials_to_present.len() != NUMBER_OF_CREDENTIALS {
            Err(CryptoError::InvalidNumberOfPresentedCredentials {
                expected: NUMBER_OF_CREDENTIALS,
                actual: credentials_to_present.len(),
            })?;
        }
        if let Some(&value) = amounts_to_request.iter().find(|&&a| a > self.max_amount) {
            Err(CryptoError::ValueOutOfRange {
                value,
                max: self.max_amount,
            })?;
        }

        let presented_sum: i128 = credentials_to_present
            .iter()
            .map(|c| i128::from(c.value()))
            .sum();
        let requested_sum: i128 = amounts_to_request.iter().map(|&a| i128::from(a)).sum();
        let delta = i64::try_from(presented_sum - requested_sum).map_err(|_| {
            CryptoError::DeltaOutOfRange {
                delta: i64::MIN,
                bound: self.max_amount.saturating_mul(NUMBER_OF_CREDENTIALS as u64),
            }
        })?;

        let mut knowledge: Vec<Knowledge> = Vec::with_capacity(2 * NUMBER_OF_CREDENTIALS + 1);
        let mut presented = Vec::with_capacity(NUMBER_OF_CREDENTIALS);
        let mut z_sum = Scalar::ZERO;
        let mut randomness_delta = Scalar::ZERO;

        for credential in credentials_to_present {
            let (presentation, z) = credential.present(rng);

            knowledge.push(show_credential_knowledge(
                &presentation,
                z,
                credential.mac().t,
                credential.value(),
                credential.randomness(),
                &self.parameters,
            ));
            presented.push(presentation);
            z_sum += z;
            randomness_delta += credential.randomness();
        }

        let padded_amounts = amounts_to_request
            .iter()
            .copied()
            .chain(std::iter::repeat(0))
            .take(NUMBER_OF_CREDENTIALS);

        let mut requested = Vec::with_capacity(NUMBER_OF_CREDENTIALS);
        let mut issuance_requests = Vec::with_capacity(NUMBER_OF_CREDENTIALS);

        for value in padded_amounts {
            let randomness = Scalar::random(rng);
            let ma = Scalar::from(value) * GENERATORS.gg + randomness * GENERATORS.gh;
            let (bit_commitments, range_knowledge) =
                range_proof_knowledge(&ma, value, randomness, self.range_proof_width, rng);

            knowledge.push(range_knowledge);
            issuance_requests.push(IssuanceRequest {
                ma,
                bit_commitments,
            });
            requested.push(RequestedCredential {
                ma,
                value,
                randomness,
            });
            randomness_delta -= randomness;
        }

        let requested_points: Vec<RistrettoPoint> = requested.iter().map(|r| r.ma).collect();
        knowledge.push(balance_knowledge(
            balance_commitment(delta, &presented, &requested_points),
            z_sum,
            randomness_delta,
        ));

        let mut transcript = request_transcript(&self.parameters);
        let proofs = proof_system::prove(&mut transcript, &knowledge, rng);

        Ok((
            CredentialsRequest {
                delta,
                presented,
                requested: issuance_requests,
                proofs,
            },
            CredentialsResponseValidation { requested },
        ))
    }

    /// Check the issuer's proofs, and return the new credentials.
    pub fn handle_response(
        &self,
        response: &CredentialsResponse,
        validation: CredentialsResponseValidation,
    ) -> Result<Vec<Credential>, CryptoError> {
        let expected = validation.requested.len();
        if response.issued.len() != expected {
            Err(CryptoError::IssuedCredentialNumberMismatch {
                expected,
                actual: response.issued.len(),
            })?;
        }

        let statements: Vec<_> = response
            .issued
            .iter()
            .zip(&validation.requested)
            .map(|(mac, requested)| issuer_parameters_statement(&self.parameters, mac, &requested.ma))
            .collect();

        let mut transcript = issuance_transcript(&self.parameters);
        if !proof_system::verify(&mut transcript, &statements, &response.proofs) {
            Err(CryptoError::ClientReceivedInvalidProofs)?;
        }

        Ok(response
            .issued
            .iter()
            .zip(validation.requested)
            .map(|(mac, requested)| Credential::new(requested.value, requested.randomness, *mac))
            .collect())
    }
}
