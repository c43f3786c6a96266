//! Prison punishment and release tests.

use std::time::Duration;

use bitcoin::{hashes::Hash, OutPoint, Txid};
use chrono::{TimeDelta, TimeZone, Utc};

use super::{Prison, Punishment};
use crate::round;

const BAN: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const NOTE: Duration = Duration::from_secs(60 * 60);

fn outpoint(seed: u8) -> OutPoint {
    OutPoint::new(Txid::from_byte_array([seed; 32]), 0)
}

fn round_id(seed: u8) -> round::Id {
    round::Id::from_bytes([seed; 32])
}

#[test]
fn notes_do_not_block_registration_and_expire() {
    wabisabi_test::init();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prison = Prison::new(BAN, NOTE);

    prison.note(outpoint(1), round_id(1), start);
    assert!(!prison.is_banned(&outpoint(1), start));
    assert_eq!(prison.count_inmates(), (1, 0));

    let almost = start + TimeDelta::minutes(59);
    assert!(prison.release_eligible_inmates(almost).is_empty());

    let released = prison.release_eligible_inmates(start + TimeDelta::hours(1));
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].punishment, Punishment::Noted);
    assert!(prison.inmates().is_empty());
}

#[test]
fn bans_block_until_they_expire() {
    wabisabi_test::init();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prison = Prison::new(BAN, NOTE);

    prison.ban(outpoint(1), round_id(1), start);
    assert!(prison.is_banned(&outpoint(1), start));
    assert!(prison.is_banned(&outpoint(1), start + TimeDelta::days(29)));
    assert!(!prison.is_banned(&outpoint(2), start));

    // Notes expire long before bans.
    assert!(prison
        .release_eligible_inmates(start + TimeDelta::days(1))
        .is_empty());

    let end = start + TimeDelta::days(30);
    assert!(!prison.is_banned(&outpoint(1), end));
    assert_eq!(prison.release_eligible_inmates(end).len(), 1);
    assert_eq!(prison.count_inmates(), (0, 0));
}

#[test]
fn bans_replace_notes_but_notes_never_downgrade_bans() {
    wabisabi_test::init();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prison = Prison::new(BAN, NOTE);

    prison.note(outpoint(1), round_id(1), start);
    prison.ban(outpoint(1), round_id(2), start + TimeDelta::minutes(1));

    let inmate = prison.get(&outpoint(1)).cloned().expect("inmate was banned");
    assert_eq!(inmate.punishment, Punishment::Banned);
    assert_eq!(inmate.last_disruptive_round, round_id(2));

    prison.note(outpoint(1), round_id(3), start + TimeDelta::minutes(2));
    assert_eq!(prison.get(&outpoint(1)), Some(&inmate));
    assert_eq!(prison.count_inmates(), (0, 1));
}

#[test]
fn inmates_are_ordered_by_outpoint() {
    wabisabi_test::init();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prison = Prison::new(BAN, NOTE);

    prison.ban(outpoint(3), round_id(1), start);
    prison.note(outpoint(1), round_id(1), start);
    prison.note(outpoint(2), round_id(1), start);

    let outpoints: Vec<_> = prison.inmates().iter().map(|i| i.outpoint).collect();
    assert_eq!(outpoints, vec![outpoint(1), outpoint(2), outpoint(3)]);
    assert_eq!(prison.count_inmates(), (2, 1));
}
