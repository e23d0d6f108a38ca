//! Secret store contract.
//!
//! A [`SecretStore`] is the durable record of issued URLs and their remaining
//! uses. The engine never deletes records; retention is the store's own
//! business. The one operation every implementation must get exactly right is
//! [`SecretStore::use_once`]: a linearizable conditional decrement per hash
//! (SQL stores: `UPDATE ... WHERE remaining_uses > 0`; in-memory stores: a
//! lock or single-writer task per map).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Params, Result, Tag};

pub mod memory;

pub use memory::MemoryStore;

/// A stored URL record, keyed by the SHA-256 of its secret.
///
/// The secret itself is never persisted. `remaining_uses` never exceeds
/// `initial_uses` unless `initial_uses == 0`, the unlimited sentinel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// SHA-256 of the secret, lowercase hex.
    pub hash: String,
    /// The subprotocol this URL resolves to.
    pub tag: Tag,
    /// Creation-time subprotocol parameters.
    pub params: Params,
    /// The API key that authorized creation, if the URL was created remotely.
    pub api_key_id: Option<String>,
    /// Use limit at creation; 0 means unlimited.
    pub initial_uses: u32,
    /// Uses left. Only decremented by a successful action, only incremented by
    /// an explicit compensation after a downstream failure.
    pub remaining_uses: u32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Whether this record has the unlimited-use sentinel.
    pub fn is_unlimited(&self) -> bool {
        self.initial_uses == 0
    }
}

/// Options for creating a URL record.
#[derive(Clone, Debug)]
pub struct CreateOptions {
    /// The API key that authorized creation, if any.
    pub api_key_id: Option<String>,
    /// Use limit; 0 means unlimited.
    pub uses: u32,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            api_key_id: None,
            uses: 1,
        }
    }
}

/// Outcome of [`SecretStore::create`].
///
/// "Already exists" is a distinguished outcome rather than an error so the
/// signed-creation path can treat idempotent retries as success without
/// sniffing store-specific error text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new record was written.
    Created,
    /// A record with this hash already exists; nothing was written.
    AlreadyExists,
}

/// Durable store of URL records.
///
/// Implemented by the host application for its database of choice; the crate
/// ships [`MemoryStore`] as the reference implementation.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a record for `hash`. Never overwrites an existing record.
    async fn create(
        &self,
        hash: &str,
        tag: &Tag,
        params: &Params,
        options: &CreateOptions,
    ) -> Result<CreateOutcome>;

    /// Whether a record exists for `hash`.
    async fn exists(&self, hash: &str) -> Result<bool>;

    /// Fetch the record for `hash`, if any.
    async fn fetch(&self, hash: &str) -> Result<Option<UrlRecord>>;

    /// Atomically consume one use.
    ///
    /// Returns `true` if a use was available (or the record is unlimited, in
    /// which case nothing is mutated), `false` if the record is missing or
    /// exhausted. N concurrent callers against `remaining_uses = k` must see
    /// exactly `min(N, k)` successes and the record must never go negative.
    async fn use_once(&self, hash: &str) -> Result<bool>;

    /// Return one use after a downstream failure.
    ///
    /// Clamped at `initial_uses`; returns `true` if the count changed.
    async fn unuse(&self, hash: &str) -> Result<bool>;

    /// Release any resources held by the store.
    async fn close(&self) -> Result<()>;
}
