//! Participants driving whole rounds against an in-process arena.

use bitcoin::{
    hashes::Hash,
    key::Keypair,
    secp256k1::{Secp256k1, SecretKey},
    Amount, FeeRate, OutPoint, ScriptBuf, TxOut, Txid,
};
use chrono::{DateTime, Utc};

use wabisabi_client::{AliceClient, ArenaClient, BobClient, ClientError, CredentialPool, Signer};
use wabisabi_coordinator::{
    coin::Coin,
    node::MockNode,
    round::{self, EndRoundState, Phase},
    Arena, Config,
};
use wabisabi_test::prelude::*;

const COIN_VALUE: u64 = 1_000_000;

type Alice = AliceClient<Arena<MockNode>>;

fn config(max_input_count: usize) -> Config {
    Config {
        max_input_count_by_round: max_input_count,
        max_registrable_amount: Amount::from_int_btc(1),
        ..Config::default()
    }
}

/// An arena with one fresh round in input registration.
async fn arena(max_input_count: usize, now: DateTime<Utc>) -> Result<(Arena<MockNode>, MockNode, round::Id)> {
    arena_with(config(max_input_count), now).await
}

async fn arena_with(config: Config, now: DateTime<Utc>) -> Result<(Arena<MockNode>, MockNode, round::Id)> {
    let fee_rate = FeeRate::from_sat_per_vb(2).ok_or_else(|| eyre::eyre!("valid fee rate"))?;
    let node = MockNode::new(fee_rate);
    let arena = Arena::new(config, node.clone())?;
    arena.step_at(now).await;

    let round_id = ArenaClient::round_states(&arena)
        .await?
        .first()
        .map(|state| state.id)
        .ok_or_else(|| eyre::eyre!("the first tick creates a round"))?;

    Ok((arena, node, round_id))
}

fn secret_key(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).expect("non-zero seeds are valid secret keys")
}

fn p2wpkh_signer(seed: u8) -> Signer {
    Signer::P2wpkh(secret_key(seed))
}

fn p2tr_signer(seed: u8) -> Signer {
    Signer::P2tr(Keypair::from_secret_key(&Secp256k1::new(), &secret_key(seed)))
}

/// A coin controlled by `signer`, known to `node`.
fn coin(node: &MockNode, seed: u8, signer: &Signer) -> Coin {
    coin_worth(node, seed, signer, COIN_VALUE)
}

fn coin_worth(node: &MockNode, seed: u8, signer: &Signer, sats: u64) -> Coin {
    let coin = Coin::new(
        OutPoint::new(Txid::from_byte_array([seed; 32]), 0),
        TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: signer.script_pubkey(),
        },
    );
    node.add_utxo(coin.outpoint, coin.txout.clone());
    coin
}

async fn connect(arena: &Arena<MockNode>, round_id: round::Id) -> Result<ArenaClient<Arena<MockNode>>> {
    Ok(ArenaClient::for_round(arena.clone(), round_id).await?)
}

async fn refresh_all(alices: &mut [Alice]) -> Result<()> {
    for alice in alices {
        alice.refresh().await?;
    }

    Ok(())
}

#[tokio::test]
async fn p2wpkh_and_p2tr_participants_complete_a_round() -> Result<()> {
    wabisabi_test::init();

    let now = Utc::now();
    let (arena, node, round_id) = arena(2, now).await?;

    let signers = [p2wpkh_signer(1), p2tr_signer(2)];
    let mut alices = Vec::new();
    for (seed, signer) in (1..).zip(signers) {
        let coin = coin(&node, seed, &signer);
        alices.push(AliceClient::register(connect(&arena, round_id).await?, coin, signer).await?);
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;
    assert_eq!(alices[0].round().phase, Phase::ConnectionConfirmation);

    let mut pools = vec![(CredentialPool::new(), CredentialPool::new()); alices.len()];
    for (alice, (amount_pool, weight_pool)) in alices.iter_mut().zip(&mut pools) {
        alice.confirm_connection(amount_pool, weight_pool).await?;
        assert_eq!(amount_pool.total(), alice.effective_value());
        assert_eq!(weight_pool.total(), alice.weight_credit());
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;
    assert_eq!(alices[0].round().phase, Phase::OutputRegistration);

    let mut expected_outputs = Vec::new();
    for (seed, (amount_pool, weight_pool)) in (101..).zip(&mut pools) {
        let bob = BobClient::new(connect(&arena, round_id).await?);
        let script = p2wpkh_signer(seed).script_pubkey();
        let value = bob
            .max_output_value(&script, amount_pool)
            .ok_or_else(|| eyre::eyre!("credentials pay for the output fee"))?;

        let too_much = bob
            .register_output(script.clone(), value + Amount::ONE_SAT, amount_pool, weight_pool)
            .await;
        assert!(matches!(too_much, Err(ClientError::InsufficientCredentials { .. })));

        let output = bob
            .register_output(script, value, amount_pool, weight_pool)
            .await?;
        assert_eq!(amount_pool.total(), 0);
        expected_outputs.push(output);
    }

    for alice in &alices {
        alice.ready_to_sign().await?;
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;
    assert_eq!(alices[0].round().phase, Phase::TransactionSigning);

    let missing = TxOut {
        value: Amount::from_sat(COIN_VALUE),
        script_pubkey: p2wpkh_signer(99).script_pubkey(),
    };
    assert_eq!(
        alices[0].witness(&[missing.clone()]),
        Err(ClientError::MissingOutput(missing)),
    );

    for (alice, output) in alices.iter().zip(&expected_outputs) {
        alice.sign(std::slice::from_ref(output)).await?;
    }

    arena.step_at(now).await;

    let broadcasts = node.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].input.len(), 2);
    for output in &expected_outputs {
        assert!(broadcasts[0].output.contains(output));
    }

    let ended = ArenaClient::round_states(&arena)
        .await?
        .into_iter()
        .find(|state| state.id == round_id)
        .ok_or_else(|| eyre::eyre!("ended rounds stay published"))?;
    assert_eq!(ended.phase, Phase::Ended);
    assert_eq!(ended.end_round_state, EndRoundState::TransactionBroadcasted);

    Ok(())
}

#[tokio::test]
async fn three_inputs_combine_into_one_output() -> Result<()> {
    wabisabi_test::init();

    let now = Utc::now();
    let (arena, node, round_id) = arena(3, now).await?;

    let mut alices = Vec::new();
    for seed in 1..=3 {
        let signer = p2wpkh_signer(seed);
        let coin = coin(&node, seed, &signer);
        alices.push(AliceClient::register(connect(&arena, round_id).await?, coin, signer).await?);
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;

    let mut amount_pool = CredentialPool::new();
    let mut weight_pool = CredentialPool::new();
    for alice in &mut alices {
        alice
            .confirm_connection(&mut amount_pool, &mut weight_pool)
            .await?;
    }
    assert_eq!(amount_pool.non_zero_count(), 3);
    assert!(amount_pool.presentable_total() < amount_pool.total());

    arena.step_at(now).await;

    let bob = BobClient::new(connect(&arena, round_id).await?);
    let script = p2wpkh_signer(101).script_pubkey();
    let value = bob
        .max_output_value(&script, &amount_pool)
        .ok_or_else(|| eyre::eyre!("credentials pay for the output fee"))?;
    let output = bob
        .register_output(script, value, &mut amount_pool, &mut weight_pool)
        .await?;
    assert_eq!(amount_pool.total(), 0);

    refresh_all(&mut alices).await?;
    for alice in &alices {
        alice.ready_to_sign().await?;
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;
    for alice in &alices {
        alice.sign(std::slice::from_ref(&output)).await?;
    }

    arena.step_at(now).await;

    let broadcasts = node.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].output, vec![output]);

    Ok(())
}

#[tokio::test]
async fn small_inputs_combine_into_an_output_near_the_credential_maximum() -> Result<()> {
    wabisabi_test::init();

    let max_amount = Amount::from_sat(1_500_000);
    let config = Config {
        max_registrable_amount: max_amount,
        ..config(4)
    };
    let now = Utc::now();
    let (arena, node, round_id) = arena_with(config, now).await?;

    let mut alices = Vec::new();
    for seed in 1..=4 {
        let signer = p2wpkh_signer(seed);
        let coin = coin_worth(&node, seed, &signer, 400_000);
        alices.push(AliceClient::register(connect(&arena, round_id).await?, coin, signer).await?);
    }

    arena.step_at(now).await;
    refresh_all(&mut alices).await?;

    let mut amount_pool = CredentialPool::new();
    let mut weight_pool = CredentialPool::new();
    for alice in &mut alices {
        alice
            .confirm_connection(&mut amount_pool, &mut weight_pool)
            .await?;
    }
    let weight_total = weight_pool.total();

    arena.step_at(now).await;

    // Two merges are needed before one request can pay for the output.
    let bob = BobClient::new(connect(&arena, round_id).await?);
    let script = p2wpkh_signer(101).script_pubkey();
    let (amount_cost, weight_cost) = bob.output_cost(&script, max_amount);
    assert!(amount_pool.presentable_total() < amount_cost);

    let output = bob
        .register_output(script, max_amount, &mut amount_pool, &mut weight_pool)
        .await?;
    assert_eq!(output.value, max_amount);
    assert_eq!(amount_pool.non_zero_count(), 1);
    assert_eq!(weight_pool.total(), weight_total - weight_cost);

    Ok(())
}

#[tokio::test]
async fn coins_are_checked_before_registration() -> Result<()> {
    wabisabi_test::init();

    let now = Utc::now();
    let (arena, node, round_id) = arena(2, now).await?;

    let coin = coin(&node, 1, &p2wpkh_signer(1));
    let wrong_signer = AliceClient::register(connect(&arena, round_id).await?, coin.clone(), p2wpkh_signer(2)).await;
    assert!(matches!(
        wrong_signer,
        Err(ClientError::CoinNotRegistrable { outpoint, .. }) if outpoint == coin.outpoint
    ));

    let dust = Coin::new(
        OutPoint::new(Txid::from_byte_array([3; 32]), 0),
        TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: p2wpkh_signer(3).script_pubkey(),
        },
    );
    let dust = AliceClient::register(connect(&arena, round_id).await?, dust, p2wpkh_signer(3)).await;
    assert!(matches!(dust, Err(ClientError::CoinNotRegistrable { .. })));

    // Neither attempt reached the round.
    let state = connect(&arena, round_id).await?;
    assert_eq!(state.round().input_count, 0);

    let alice = AliceClient::register(connect(&arena, round_id).await?, coin, p2wpkh_signer(1)).await?;
    let mut client = connect(&arena, round_id).await?;
    assert_eq!(client.refresh().await?.input_count, 1);

    alice.remove().await?;
    assert_eq!(client.refresh().await?.input_count, 0);

    Ok(())
}

#[tokio::test]
async fn outputs_need_the_right_phase_and_script() -> Result<()> {
    wabisabi_test::init();

    let now = Utc::now();
    let (arena, _node, round_id) = arena(2, now).await?;

    let bob = BobClient::new(connect(&arena, round_id).await?);
    let mut amount_pool = CredentialPool::new();
    let mut weight_pool = CredentialPool::new();

    let early = bob
        .register_output(
            p2wpkh_signer(101).script_pubkey(),
            Amount::from_sat(10_000),
            &mut amount_pool,
            &mut weight_pool,
        )
        .await;
    assert_eq!(
        early,
        Err(ClientError::WrongPhase {
            expected: Phase::OutputRegistration,
            actual: Phase::InputRegistration,
        })
    );

    let unknown_script = ScriptBuf::from_bytes(vec![0x6a, 0x01, 0x01]);
    assert!(bob.output_cost(&unknown_script, Amount::ZERO).0 > 0);

    Ok(())
}
