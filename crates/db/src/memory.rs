use crate::{error, Store};
use alloc::{boxed::Box, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};
use dashmap::DashMap;

struct Record {
    data: Box<[u8]>,
    expiration: u64,
}

/// In-process key-value store with the same expiration semantics as the
/// database. Each instance is independent; nothing is shared between them.
#[derive(Default)]
pub struct Memory {
    records: DashMap<Box<str>, Record>,
    offline: AtomicBool,
}

impl Memory {
    /// Simulates an outage: every subsequent operation fails with
    /// [`Unavailable`](error::Error::Unavailable) until brought back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Number of records held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrites the raw bytes of a record without touching its expiration.
    pub fn tamper(&self, key: &str, data: &[u8]) -> bool {
        match self.records.get_mut(key) {
            Some(mut record) => {
                record.data = data.into();
                true
            }
            None => false,
        }
    }

    fn check(&self) -> error::Result<()> {
        if self.offline.load(Ordering::Acquire) {
            Err(error::Error::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl Store for Memory {
    async fn get(&self, key: &str, now: u64) -> error::Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.records.get(key).filter(|record| record.expiration > now).map(|record| record.data.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8], expiration: u64) -> error::Result<()> {
        self.check()?;
        self.records.insert(key.into(), Record { data: value.into(), expiration });
        Ok(())
    }

    async fn purge(&self, now: u64) -> error::Result<u64> {
        self.check()?;
        let before = self.records.len();
        self.records.retain(|_, record| record.expiration > now);
        Ok((before - self.records.len()) as u64)
    }
}
