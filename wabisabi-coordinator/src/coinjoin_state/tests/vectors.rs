//! Fixed coinjoin state transitions.

use bitcoin::{Amount, ScriptBuf, SignedAmount, Weight, Witness};

use wabisabi_test::prelude::*;

use super::{coin, output};
use crate::coinjoin_state::{CoinjoinState, Construction, Error};

#[test]
fn duplicate_inputs_and_scripts_are_rejected() -> Result<()> {
    wabisabi_test::init();

    let construction = Construction::new(Weight::from_wu(400_000)).add_input(coin(1, 0, 50_000))?;

    assert_eq!(
        construction.add_input(coin(1, 0, 50_000)),
        Err(Error::DuplicateInput(coin(1, 0, 50_000).outpoint)),
    );
    // Same transaction, different output index.
    construction.add_input(coin(1, 1, 50_000))?;

    let construction = construction.add_output(output(2, 10_000))?;
    assert_eq!(
        construction.add_output(output(2, 20_000)),
        Err(Error::DuplicateOutputScript),
    );

    let bare = bitcoin::TxOut {
        value: Amount::from_sat(10_000),
        script_pubkey: ScriptBuf::new(),
    };
    assert_eq!(construction.add_output(bare), Err(Error::UnsupportedScript));

    Ok(())
}

#[test]
fn transitions_leave_the_original_state_unchanged() -> Result<()> {
    wabisabi_test::init();

    let empty = Construction::new(Weight::from_wu(400_000));
    let one = empty.add_input(coin(1, 0, 50_000))?;

    assert!(empty.inputs().is_empty());
    assert_eq!(one.inputs().len(), 1);

    Ok(())
}

#[test]
fn weight_limit_is_enforced() -> Result<()> {
    wabisabi_test::init();

    // Room for the overhead and one input, but not two.
    let construction = Construction::new(Weight::from_wu(42 + 272 + 100));
    let construction = construction.add_input(coin(1, 0, 50_000))?;

    assert!(matches!(
        construction.add_input(coin(2, 0, 50_000)),
        Err(Error::TransactionTooLarge { .. }),
    ));

    Ok(())
}

#[test]
fn finalize_sorts_inputs_and_outputs() -> Result<()> {
    wabisabi_test::init();

    let construction = Construction::new(Weight::from_wu(400_000))
        .add_input(coin(3, 0, 10_000))?
        .add_input(coin(2, 0, 30_000))?
        .add_input(coin(1, 0, 30_000))?
        .add_output(output(9, 5_000))?
        .add_output(output(7, 20_000))?
        .add_output(output(8, 20_000))?;

    let signing = construction.finalize();

    let inputs: Vec<_> = signing.inputs().iter().map(|c| (c.amount().to_sat(), c.outpoint)).collect();
    assert_eq!(
        inputs,
        vec![
            (30_000, coin(1, 0, 0).outpoint),
            (30_000, coin(2, 0, 0).outpoint),
            (10_000, coin(3, 0, 0).outpoint),
        ],
    );

    let outputs: Vec<_> = signing.outputs().iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(outputs, vec![20_000, 20_000, 5_000]);
    assert!(signing.outputs()[0].script_pubkey < signing.outputs()[1].script_pubkey);

    assert_eq!(signing.balance(), construction.balance());
    assert_eq!(signing.balance(), SignedAmount::from_sat(70_000 - 45_000));
    assert_eq!(signing.estimated_weight(), construction.estimated_weight());

    Ok(())
}

#[test]
fn witnesses_are_idempotent() -> Result<()> {
    wabisabi_test::init();

    let signing = Construction::new(Weight::from_wu(400_000))
        .add_input(coin(1, 0, 30_000))?
        .add_input(coin(2, 0, 20_000))?
        .add_output(output(9, 40_000))?
        .finalize();

    let witness = Witness::from_slice(&[vec![1u8; 71], vec![2u8; 33]]);
    let other = Witness::from_slice(&[vec![3u8; 71], vec![2u8; 33]]);

    let signed = signing.add_witness(0, witness.clone())?;
    assert!(signed.is_input_signed(0));
    assert!(!signed.is_fully_signed());

    assert_eq!(signed.add_witness(0, witness.clone())?, signed);
    assert_eq!(
        signed.add_witness(0, other),
        Err(Error::WitnessAlreadyProvided(0)),
    );
    assert_eq!(
        signed.add_witness(2, witness.clone()),
        Err(Error::InputIndexOutOfRange(2)),
    );

    let signed = signed.add_witness(1, witness.clone())?;
    assert!(signed.is_fully_signed());

    let transaction = signed.create_transaction();
    assert!(transaction.input.iter().all(|input| input.witness == witness));
    assert!(signed
        .create_unsigned_transaction()
        .input
        .iter()
        .all(|input| input.witness.is_empty()));

    Ok(())
}

#[test]
fn wrong_variant_operations_are_typed_errors() -> Result<()> {
    wabisabi_test::init();

    let construction = Construction::new(Weight::from_wu(400_000));
    let state = CoinjoinState::Construction(construction.clone());
    assert!(state.as_signing().is_err());

    let state = CoinjoinState::Signing(construction.finalize());
    assert_eq!(
        state.as_construction().map(|_| ()),
        Err(Error::WrongState {
            expected: "construction"
        }),
    );

    Ok(())
}
