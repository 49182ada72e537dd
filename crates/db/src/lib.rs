#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use alloc::{string::ToString, vec::Vec};
use core::future::Future;
use serde::{de::DeserializeOwned, Serialize};

pub use model::{Poll, Uuid};
pub use tokio_postgres::{tls::NoTls, Client, Config};

/// Durable key-value storage with store-enforced expiration.
pub trait Store: Send + Sync {
    /// Fetches the record at `key`. Records whose expiration is at or before
    /// `now` are reported as absent.
    fn get(&self, key: &str, now: u64) -> impl Future<Output = error::Result<Option<Vec<u8>>>> + Send;

    /// Inserts or replaces the record at `key`.
    fn put(&self, key: &str, value: &[u8], expiration: u64) -> impl Future<Output = error::Result<()>> + Send;

    /// Deletes every record that has expired as of `now`. Returns the number of records removed.
    fn purge(&self, now: u64) -> impl Future<Output = error::Result<u64>> + Send;
}

pub struct Database(Client);

impl From<Client> for Database {
    fn from(client: Client) -> Self {
        Self(client)
    }
}

impl Database {
    /// Creates the `poll` table if it does not exist yet.
    pub async fn init_schema(&self) -> error::Result<()> {
        self.0.batch_execute(include_str!("../schema.sql")).await?;
        Ok(())
    }
}

/// Postgres has no unsigned integers, so far-future timestamps are clamped.
fn to_timestamp(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

impl Store for Database {
    async fn get(&self, key: &str, now: u64) -> error::Result<Option<Vec<u8>>> {
        let now = to_timestamp(now);
        let Some(row) = self.0.query_opt("SELECT data FROM poll WHERE id = $1 AND expiration > $2", &[&key, &now]).await?
        else {
            return Ok(None);
        };
        let data = row.try_get("data").map_err(|_| error::Error::Corrupted)?;
        Ok(Some(data))
    }

    async fn put(&self, key: &str, value: &[u8], expiration: u64) -> error::Result<()> {
        let expiration = to_timestamp(expiration);
        let count = self
            .0
            .execute(
                "INSERT INTO poll (id, data, expiration) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, expiration = EXCLUDED.expiration",
                &[&key, &value, &expiration],
            )
            .await?;
        if count == 1 {
            Ok(())
        } else {
            Err(error::Error::Unavailable)
        }
    }

    async fn purge(&self, now: u64) -> error::Result<u64> {
        let now = to_timestamp(now);
        Ok(self.0.execute("DELETE FROM poll WHERE expiration <= $1", &[&now]).await?)
    }
}

/// Loads and saves [`Poll`]s as JSON records keyed by their ID.
///
/// Each call is an independent read or write; nothing is cached in between.
/// Two concurrent load-vote-save cycles on the same poll race, and the later
/// save wins.
pub struct Polls<S> {
    store: S,
}

impl<S> From<S> for Polls<S> {
    fn from(store: S) -> Self {
        Self { store }
    }
}

impl<S: Store> Polls<S> {
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Persists the poll. The record expires alongside the poll itself.
    pub async fn save<T: Serialize + Sync>(&self, poll: &Poll<T>) -> error::Result<()> {
        let id = poll.id();
        let bytes = serde_json::to_vec(poll).map_err(|err| {
            log::error!("failed to encode poll {id}: {err}");
            error::Error::Corrupted
        })?;
        self.store.put(&id.to_string(), &bytes, poll.expiration()).await
    }

    /// Fetches a poll that has not yet expired. Returns `Ok(None)` once the
    /// poll is gone, which callers should treat as voting being closed.
    pub async fn load<T: DeserializeOwned>(&self, id: Uuid, now: u64) -> error::Result<Option<Poll<T>>> {
        let key = id.to_string();
        let Some(bytes) = self.store.get(&key, now).await? else {
            return Ok(None);
        };

        let poll: Poll<T> = serde_json::from_slice(&bytes).map_err(|err| {
            log::error!("failed to decode poll {key}: {err}");
            error::Error::Corrupted
        })?;

        if poll.id() != id {
            log::error!("record {key} holds poll {}", poll.id());
            return Err(error::Error::Corrupted);
        }

        Ok(Some(poll))
    }

    /// Removes expired polls from the store.
    pub async fn purge(&self, now: u64) -> error::Result<u64> {
        self.store.purge(now).await
    }
}
