//! Tests for coinjoin transaction states.

use bitcoin::{hashes::Hash, Amount, OutPoint, ScriptBuf, TxOut, Txid, WPubkeyHash};

use crate::coin::Coin;

mod prop;
mod vectors;

/// A P2WPKH script unique to `seed`.
fn p2wpkh_script(seed: u8) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([seed; 20]))
}

/// A P2WPKH coin worth `sats`, with an outpoint unique to `seed` and `vout`.
fn coin(seed: u8, vout: u32, sats: u64) -> Coin {
    Coin::new(
        OutPoint::new(Txid::from_byte_array([seed; 32]), vout),
        TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: p2wpkh_script(seed),
        },
    )
}

fn output(seed: u8, sats: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(sats),
        script_pubkey: p2wpkh_script(seed),
    }
}
