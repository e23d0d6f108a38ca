//! In-memory secret store.
//!
//! Reference implementation of [`SecretStore`], suitable for tests and
//! single-process deployments. All operations run under one `RwLock`, which
//! makes the conditional decrement trivially linearizable. Public methods
//! recover from lock poisoning rather than panicking.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{CreateOptions, CreateOutcome, SecretStore, UrlRecord};
use crate::{Params, Result, Tag};

/// In-memory [`SecretStore`] backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, UrlRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn create(
        &self,
        hash: &str,
        tag: &Tag,
        params: &Params,
        options: &CreateOptions,
    ) -> Result<CreateOutcome> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(hash) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let now = Utc::now();
        records.insert(
            hash.to_string(),
            UrlRecord {
                hash: hash.to_string(),
                tag: tag.clone(),
                params: params.clone(),
                api_key_id: options.api_key_id.clone(),
                initial_uses: options.uses,
                remaining_uses: options.uses,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn exists(&self, hash: &str) -> Result<bool> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.contains_key(hash))
    }

    async fn fetch(&self, hash: &str) -> Result<Option<UrlRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(hash).cloned())
    }

    async fn use_once(&self, hash: &str) -> Result<bool> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(hash) else {
            return Ok(false);
        };
        if record.is_unlimited() {
            return Ok(true);
        }
        if record.remaining_uses == 0 {
            return Ok(false);
        }
        record.remaining_uses -= 1;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn unuse(&self, hash: &str) -> Result<bool> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(hash) else {
            return Ok(false);
        };
        if record.is_unlimited() || record.remaining_uses >= record.initial_uses {
            return Ok(false);
        }
        record.remaining_uses += 1;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
