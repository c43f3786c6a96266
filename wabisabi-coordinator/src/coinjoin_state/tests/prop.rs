//! Randomised coinjoin state properties.

use bitcoin::Weight;

use wabisabi_test::prelude::*;

use super::{coin, output};
use crate::coinjoin_state::Construction;

proptest! {
    /// Finalizing only reorders inputs and outputs, and keeps the balance.
    #[test]
    fn finalize_is_a_sorted_permutation(
        input_amounts in prop::collection::vec(1_000u64..1_000_000, 1..20),
        output_amounts in prop::collection::vec(1_000u64..1_000_000, 1..20),
    ) {
        wabisabi_test::init();

        let mut construction = Construction::new(Weight::from_wu(400_000));
        for (i, amount) in input_amounts.iter().enumerate() {
            construction = construction.add_input(coin(i as u8, 0, *amount))?;
        }
        for (i, amount) in output_amounts.iter().enumerate() {
            construction = construction.add_output(output(100 + i as u8, *amount))?;
        }

        let signing = construction.finalize();

        prop_assert_eq!(signing.inputs().len(), input_amounts.len());
        prop_assert_eq!(signing.outputs().len(), output_amounts.len());
        prop_assert_eq!(signing.balance(), construction.balance());

        for pair in signing.inputs().windows(2) {
            prop_assert!(pair[0].amount() >= pair[1].amount());
        }
        for pair in signing.outputs().windows(2) {
            prop_assert!(pair[0].value >= pair[1].value);
        }

        for input in construction.inputs() {
            prop_assert!(signing.input_index(&input.outpoint).is_some());
        }
    }
}
