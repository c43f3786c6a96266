//! Credentials held by a participant.

use wabisabi_crypto::{Credential, NUMBER_OF_CREDENTIALS};

use crate::ClientError;

/// The credentials a participant holds for one issuer of one round.
///
/// Every request presents exactly [`NUMBER_OF_CREDENTIALS`] credentials, so
/// the pool keeps that many zero value credentials for padding, and drops any
/// more.
#[derive(Clone, Debug, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `credentials` to the pool.
    pub fn add(&mut self, credentials: impl IntoIterator<Item = Credential>) {
        self.credentials.extend(credentials);
        self.credentials
            .sort_by_key(|credential| std::cmp::Reverse(credential.value()));

        let non_zero = self.non_zero_count();
        self.credentials.truncate(non_zero + NUMBER_OF_CREDENTIALS);
    }

    /// The total value of the pool.
    pub fn total(&self) -> u64 {
        self.credentials.iter().map(Credential::value).sum()
    }

    /// The number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Is the pool empty?
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// The number of credentials with a non-zero value.
    pub fn non_zero_count(&self) -> usize {
        self.credentials
            .iter()
            .filter(|credential| credential.value() > 0)
            .count()
    }

    /// The value one request can present.
    pub fn presentable_total(&self) -> u64 {
        self.credentials
            .iter()
            .take(NUMBER_OF_CREDENTIALS)
            .map(Credential::value)
            .sum()
    }

    /// Remove the most valuable credentials one request can present.
    ///
    /// Returns `None` if the pool can't fill a request.
    pub fn take_presentable(&mut self) -> Option<Vec<Credential>> {
        if self.credentials.len() < NUMBER_OF_CREDENTIALS {
            return None;
        }

        Some(self.credentials.drain(..NUMBER_OF_CREDENTIALS).collect())
    }

    /// Remove the two most valuable credentials that are worth more than zero
    /// but less than `max`, so merging them gains presentable value.
    ///
    /// Returns `None` if the pool holds fewer than two such credentials.
    pub fn take_mergeable(&mut self, max: u64) -> Option<Vec<Credential>> {
        let indexes: Vec<usize> = self
            .credentials
            .iter()
            .enumerate()
            .filter(|(_, credential)| credential.value() > 0 && credential.value() < max)
            .map(|(index, _)| index)
            .take(NUMBER_OF_CREDENTIALS)
            .collect();

        if indexes.len() < NUMBER_OF_CREDENTIALS {
            return None;
        }

        // Later indexes first, so earlier ones stay valid.
        let mut taken: Vec<Credential> = indexes
            .iter()
            .rev()
            .map(|&index| self.credentials.remove(index))
            .collect();
        taken.reverse();

        Some(taken)
    }

    /// Remove zero value credentials for a request that moves no value.
    ///
    /// Returns `None` if the pool holds fewer than one request needs.
    pub fn take_zero(&mut self) -> Option<Vec<Credential>> {
        let non_zero = self.non_zero_count();
        if self.credentials.len() - non_zero < NUMBER_OF_CREDENTIALS {
            return None;
        }

        Some(self.credentials.drain(non_zero..non_zero + NUMBER_OF_CREDENTIALS).collect())
    }

    /// The credentials in the pool, most valuable first.
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }
}

/// Split `value` into the values of one request's credentials, each at most
/// `max`.
pub(crate) fn split_value(value: u64, max: u64) -> Result<Vec<u64>, ClientError> {
    let mut values = Vec::with_capacity(NUMBER_OF_CREDENTIALS);
    let mut remaining = value;

    for _ in 0..NUMBER_OF_CREDENTIALS {
        let next = remaining.min(max);
        values.push(next);
        remaining -= next;
    }

    if remaining > 0 {
        Err(ClientError::ValueTooLarge {
            value,
            count: NUMBER_OF_CREDENTIALS,
            max,
        })?;
    }

    Ok(values)
}
