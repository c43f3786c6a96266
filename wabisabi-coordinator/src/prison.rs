//! The misbehavior ledger.
//!
//! [`Prison`] remembers outpoints that disrupted rounds. A note records
//! ambiguous behavior, like failing to confirm a connection, and never stops
//! the outpoint from registering. A ban stops the outpoint from registering in
//! every round until it expires.
//!
//! Inmates are only released when their punishment expires.

use std::{collections::HashMap, time::Duration};

use bitcoin::OutPoint;
use chrono::{DateTime, TimeDelta, Utc};

use crate::round;

#[cfg(test)]
mod tests;

/// The severity of a punishment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum Punishment {
    /// Recorded, but registration is still allowed.
    Noted,
    /// Registration is refused until the ban expires.
    Banned,
}

/// A punished outpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inmate {
    /// The punished outpoint.
    pub outpoint: OutPoint,
    /// The current punishment.
    pub punishment: Punishment,
    /// When the current punishment started.
    pub started: DateTime<Utc>,
    /// The round the outpoint last disrupted.
    pub last_disruptive_round: round::Id,
    /// When a ban ends, or `None` for notes.
    pub banned_until: Option<DateTime<Utc>>,
}

/// The set of punished outpoints.
#[derive(Clone, Debug)]
pub struct Prison {
    inmates: HashMap<OutPoint, Inmate>,
    ban_duration: TimeDelta,
    release_noted_after: TimeDelta,
}

impl Prison {
    /// Create an empty prison.
    pub fn new(ban_duration: Duration, release_noted_after: Duration) -> Self {
        Self {
            inmates: HashMap::new(),
            ban_duration: TimeDelta::from_std(ban_duration).unwrap_or(TimeDelta::MAX),
            release_noted_after: TimeDelta::from_std(release_noted_after)
                .unwrap_or(TimeDelta::MAX),
        }
    }

    /// Note `outpoint` for disrupting `round_id`.
    ///
    /// A note never replaces an active ban.
    pub fn note(&mut self, outpoint: OutPoint, round_id: round::Id, now: DateTime<Utc>) {
        if self.is_banned(&outpoint, now) {
            debug!(?outpoint, %round_id, "ignoring note for an already banned outpoint");
            return;
        }

        info!(?outpoint, %round_id, "noting outpoint");
        self.inmates.insert(
            outpoint,
            Inmate {
                outpoint,
                punishment: Punishment::Noted,
                started: now,
                last_disruptive_round: round_id,
                banned_until: None,
            },
        );
        self.update_metrics();
    }

    /// Ban `outpoint` for disrupting `round_id`, replacing any earlier punishment.
    pub fn ban(&mut self, outpoint: OutPoint, round_id: round::Id, now: DateTime<Utc>) {
        let banned_until = after(now, self.ban_duration);

        info!(?outpoint, %round_id, %banned_until, "banning outpoint");
        self.inmates.insert(
            outpoint,
            Inmate {
                outpoint,
                punishment: Punishment::Banned,
                started: now,
                last_disruptive_round: round_id,
                banned_until: Some(banned_until),
            },
        );
        self.update_metrics();
    }

    /// Is `outpoint` banned at `now`?
    pub fn is_banned(&self, outpoint: &OutPoint, now: DateTime<Utc>) -> bool {
        self.inmates
            .get(outpoint)
            .and_then(|inmate| inmate.banned_until)
            .is_some_and(|banned_until| now < banned_until)
    }

    /// The inmate record for `outpoint`, if any.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Inmate> {
        self.inmates.get(outpoint)
    }

    /// The number of `(noted, banned)` inmates.
    pub fn count_inmates(&self) -> (usize, usize) {
        let banned = self
            .inmates
            .values()
            .filter(|inmate| inmate.punishment == Punishment::Banned)
            .count();

        (self.inmates.len() - banned, banned)
    }

    /// Every inmate, ordered by outpoint.
    pub fn inmates(&self) -> Vec<Inmate> {
        let mut inmates: Vec<Inmate> = self.inmates.values().cloned().collect();
        inmates.sort_by_key(|inmate| inmate.outpoint);
        inmates
    }

    /// Release every inmate whose punishment has expired at `now`, and return them.
    pub fn release_eligible_inmates(&mut self, now: DateTime<Utc>) -> Vec<Inmate> {
        let release_noted_after = self.release_noted_after;
        let mut released = Vec::new();

        self.inmates.retain(|_, inmate| {
            let release_at = match inmate.banned_until {
                Some(banned_until) => banned_until,
                None => after(inmate.started, release_noted_after),
            };

            if now >= release_at {
                released.push(inmate.clone());
                false
            } else {
                true
            }
        });

        if !released.is_empty() {
            debug!(count = released.len(), "released prison inmates");
            self.update_metrics();
        }

        released.sort_by_key(|inmate| inmate.outpoint);
        released
    }

    fn update_metrics(&self) {
        let (noted, banned) = self.count_inmates();

        metrics::gauge!("wabisabi.prison.noted").set(noted as f64);
        metrics::gauge!("wabisabi.prison.banned").set(banned as f64);
    }
}

/// `start + delta`, saturating at the latest representable time.
fn after(start: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    start
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
