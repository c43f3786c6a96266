//! Fixed scenarios for credential issuance.

use rand::thread_rng;

use wabisabi_test::prelude::*;

use crate::{
    Credential, CredentialIssuer, CredentialsRequest, CryptoError, WabiSabiClient,
    NUMBER_OF_CREDENTIALS,
};

/// 43,000 BTC in satoshis.
const MAX_AMOUNT: u64 = 4_300_000_000_000;

fn issuer_and_client() -> (CredentialIssuer, WabiSabiClient) {
    let issuer = CredentialIssuer::random(MAX_AMOUNT, &mut thread_rng());
    let client = WabiSabiClient::new(*issuer.parameters(), MAX_AMOUNT);
    (issuer, client)
}

fn zero_credentials(issuer: &mut CredentialIssuer, client: &WabiSabiClient) -> Result<Vec<Credential>> {
    let mut rng = thread_rng();
    let (request, validation) = client.create_request_for_zero_amount(&mut rng);
    let response = issuer.handle_request(&request, &mut rng)?;

    Ok(client.handle_response(&response, validation)?)
}

#[test]
fn zero_request_issues_zero_credentials() -> Result<()> {
    wabisabi_test::init();

    let (mut issuer, client) = issuer_and_client();
    let credentials = zero_credentials(&mut issuer, &client)?;

    assert_eq!(credentials.len(), NUMBER_OF_CREDENTIALS);
    for credential in &credentials {
        assert_eq!(credential.value(), 0);
        assert!(credential.mac().verify(issuer.secret_key(), &credential.ma()));
    }
    assert_eq!(issuer.balance(), 0);
    assert_eq!(issuer.serial_number_count(), 0);

    Ok(())
}

#[test]
fn real_request_certifies_new_value() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, validation) = client.create_request(&[100_000_000], &zero, &mut rng)?;
    assert_eq!(request.delta, -100_000_000);
    assert_eq!(request.requested.len(), NUMBER_OF_CREDENTIALS);

    let response = issuer.handle_request(&request, &mut rng)?;
    let credentials = client.handle_response(&response, validation)?;

    let values: Vec<u64> = credentials.iter().map(Credential::value).collect();
    assert_eq!(values, vec![100_000_000, 0]);
    assert_eq!(issuer.balance(), 100_000_000);
    assert_eq!(issuer.serial_number_count(), NUMBER_OF_CREDENTIALS);

    Ok(())
}

#[test]
fn reissuance_keeps_balance() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, validation) = client.create_request(&[70_000, 30_000], &zero, &mut rng)?;
    let response = issuer.handle_request(&request, &mut rng)?;
    let credentials = client.handle_response(&response, validation)?;

    let (request, validation) = client.create_request(&[45_000, 55_000], &credentials, &mut rng)?;
    assert_eq!(request.delta, 0);
    let response = issuer.handle_request(&request, &mut rng)?;
    let split = client.handle_response(&response, validation)?;

    assert_eq!(split.iter().map(Credential::value).sum::<u64>(), 100_000);
    assert_eq!(issuer.balance(), 100_000);

    // Spend everything: value leaves the credential system.
    let (request, _validation) = client.create_request(&[], &split, &mut rng)?;
    assert_eq!(request.delta, 100_000);
    issuer.handle_request(&request, &mut rng)?;
    assert_eq!(issuer.balance(), 0);

    Ok(())
}

#[test]
fn serial_number_reuse_is_rejected_without_mutation() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, validation) = client.create_request(&[5_000], &zero, &mut rng)?;
    let response = issuer.handle_request(&request, &mut rng)?;
    client.handle_response(&response, validation)?;

    let balance = issuer.balance();
    let serial_numbers = issuer.serial_number_count();

    // Presenting the same zero credentials again is a double spend.
    let (replay, _validation) = client.create_request(&[5_000], &zero, &mut rng)?;
    assert_eq!(
        issuer.handle_request(&replay, &mut rng),
        Err(CryptoError::SerialNumberAlreadyUsed),
    );
    assert_eq!(issuer.balance(), balance);
    assert_eq!(issuer.serial_number_count(), serial_numbers);

    Ok(())
}

#[test]
fn duplicated_serial_numbers_are_rejected() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, validation) = client.create_request(&[1_000], &zero, &mut rng)?;
    let response = issuer.handle_request(&request, &mut rng)?;
    let credentials = client.handle_response(&response, validation)?;

    // Present the 1000 sat credential twice, trying to request 2000.
    let twice = vec![credentials[0].clone(), credentials[0].clone()];
    let (request, _validation) = client.create_request(&[2_000], &twice, &mut rng)?;
    assert_eq!(
        issuer.prepare(&request).map(|_| ()),
        Err(CryptoError::SerialNumberDuplicated),
    );

    Ok(())
}

#[test]
fn committing_twice_is_rejected() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, _validation) = client.create_request(&[1_000], &zero, &mut rng)?;
    let first = issuer.prepare(&request)?;
    let second = issuer.prepare(&request)?;

    issuer.commit(first, &mut rng)?;
    assert_eq!(
        issuer.commit(second, &mut rng).map(|_| ()),
        Err(CryptoError::SerialNumberAlreadyUsed),
    );
    assert_eq!(issuer.balance(), 1_000);

    Ok(())
}

#[test]
fn tampered_requests_are_rejected() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    let (request, _validation) = client.create_request(&[1_000], &zero, &mut rng)?;

    // Claim a larger issuance than the proofs cover.
    let mut inflated = request.clone();
    inflated.delta = -2_000;
    assert_eq!(
        issuer.prepare(&inflated).map(|_| ()),
        Err(CryptoError::CoordinatorReceivedInvalidProofs),
    );

    let mut truncated = request.clone();
    truncated.requested[0].bit_commitments.pop();
    assert!(matches!(
        issuer.prepare(&truncated),
        Err(CryptoError::InvalidBitCommitment { .. }),
    ));

    let mut short = request.clone();
    short.requested.pop();
    assert!(matches!(
        issuer.prepare(&short),
        Err(CryptoError::InvalidNumberOfRequestedCredentials { .. }),
    ));

    let mut half_presented = request;
    half_presented.presented.pop();
    assert!(matches!(
        issuer.prepare(&half_presented),
        Err(CryptoError::InvalidNumberOfPresentedCredentials { .. }),
    ));

    Ok(())
}

#[test]
fn zero_requests_cannot_move_value() -> Result<()> {
    wabisabi_test::init();

    let (issuer, client) = issuer_and_client();
    let (mut request, _validation) = client.create_request_for_zero_amount(&mut thread_rng());
    request.delta = -1;

    assert_eq!(
        issuer.prepare(&request).map(|_| ()),
        Err(CryptoError::NonZeroNullRequestDelta(-1)),
    );

    Ok(())
}

#[test]
fn out_of_range_values_are_rejected() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;

    assert_eq!(
        client.create_request(&[MAX_AMOUNT + 1], &zero, &mut rng).map(|_| ()),
        Err(CryptoError::ValueOutOfRange {
            value: MAX_AMOUNT + 1,
            max: MAX_AMOUNT,
        }),
    );
    assert!(matches!(
        client.create_request(&[1, 2, 3], &zero, &mut rng),
        Err(CryptoError::InvalidNumberOfRequestedCredentials { .. }),
    ));

    Ok(())
}

#[test]
fn credentials_are_bound_to_their_issuer() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut amount_issuer, amount_client) = issuer_and_client();
    let (mut other_issuer, other_client) = issuer_and_client();

    let zero = zero_credentials(&mut amount_issuer, &amount_client)?;

    // Credentials from one issuer can't be presented to another.
    let (request, _validation) = other_client.create_request(&[1_000], &zero, &mut rng)?;
    assert_eq!(
        other_issuer.prepare(&request).map(|_| ()),
        Err(CryptoError::CoordinatorReceivedInvalidProofs),
    );

    // Clients reject responses signed with another key.
    let (request, validation) = amount_client.create_request_for_zero_amount(&mut rng);
    let (other_request, _) = other_client.create_request_for_zero_amount(&mut rng);
    let mut response = amount_issuer.handle_request(&request, &mut rng)?;
    let other_response = other_issuer.handle_request(&other_request, &mut rng)?;
    response.issued = other_response.issued;
    assert_eq!(
        amount_client.handle_response(&response, validation),
        Err(CryptoError::ClientReceivedInvalidProofs),
    );

    Ok(())
}

#[test]
fn missing_issued_credentials_are_rejected() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let (request, validation) = client.create_request_for_zero_amount(&mut rng);
    let mut response = issuer.handle_request(&request, &mut rng)?;
    response.issued.pop();

    assert_eq!(
        client.handle_response(&response, validation),
        Err(CryptoError::IssuedCredentialNumberMismatch {
            expected: NUMBER_OF_CREDENTIALS,
            actual: NUMBER_OF_CREDENTIALS - 1,
        }),
    );

    Ok(())
}

#[test]
fn requests_survive_serde() -> Result<()> {
    wabisabi_test::init();

    let mut rng = thread_rng();
    let (mut issuer, client) = issuer_and_client();
    let zero = zero_credentials(&mut issuer, &client)?;
    let (request, _validation) = client.create_request(&[42], &zero, &mut rng)?;

    let json = serde_json::to_string(&request)?;
    let decoded: CredentialsRequest = serde_json::from_str(&json)?;
    assert_eq!(decoded, request);
    issuer.prepare(&decoded)?;

    Ok(())
}
