//! The store a gate protects, and a wrapper that only touches it under a permit.
//!
//! [`ProtectedStore`] is the minimal interface the gate's call sites need.
//! [`GuardedStore`] pairs a store with its own [`AccessGate`] and checks that
//! every access presents a permit issued by that gate.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

use crate::config::GateConfig;
use crate::cx::Cx;
use crate::error::StoreError;
use crate::gate::{AccessGate, GateId, PermitKind, ReadPermit, WritePermit};

/// A key/value store with no synchronization of its own.
pub trait ProtectedStore {
    /// Key type.
    type Key;
    /// Value type.
    type Value;

    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&mut self, key: Self::Key, value: Self::Value);
}

/// `HashMap`-backed [`ProtectedStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore<K, V> {
    data: HashMap<K, V>,
}

impl<K, V> MemoryStore<K, V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> ProtectedStore for MemoryStore<K, V> {
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<V> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) {
        self.data.insert(key, value);
    }
}

/// A store that can only be reached with a permit from its own gate.
///
/// The inner lock is never contended: the gate has already decided who may
/// enter by the time it is taken.
///
/// ```
/// use accessgate::{Cx, GuardedStore, MemoryStore};
///
/// let db = GuardedStore::new(MemoryStore::new(), 4);
/// let cx = Cx::for_testing();
///
/// db.write_blocking(&cx, "k".to_string(), 1).unwrap();
/// assert_eq!(db.read_blocking(&cx, &"k".to_string()).unwrap(), Some(1));
/// ```
#[derive(Debug)]
pub struct GuardedStore<S> {
    gate: AccessGate,
    store: RwLock<S>,
}

impl<S: ProtectedStore> GuardedStore<S> {
    /// Wraps `store` behind a new gate admitting `max_readers` readers.
    #[must_use]
    pub fn new(store: S, max_readers: usize) -> Self {
        Self {
            gate: AccessGate::new(max_readers),
            store: RwLock::new(store),
        }
    }

    /// Wraps `store` behind a gate built from `config`.
    #[must_use]
    pub fn from_config(store: S, config: &GateConfig) -> Self {
        Self {
            gate: AccessGate::from_config(config),
            store: RwLock::new(store),
        }
    }

    /// The gate guarding this store.
    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Reads `key` under a read permit from this store's gate.
    ///
    /// # Errors
    ///
    /// [`StoreError::ForeignPermit`] if the permit came from another gate.
    pub fn get(
        &self,
        permit: &ReadPermit<'_>,
        key: &S::Key,
    ) -> Result<Option<S::Value>, StoreError> {
        if !self.gate.holds_read(permit) {
            return Err(self.foreign(PermitKind::Read, permit.gate_id()));
        }
        Ok(self.store.read().get(key))
    }

    /// Writes `key` under the write permit of this store's gate.
    ///
    /// # Errors
    ///
    /// [`StoreError::ForeignPermit`] if the permit came from another gate.
    pub fn put(
        &self,
        permit: &WritePermit<'_>,
        key: S::Key,
        value: S::Value,
    ) -> Result<(), StoreError> {
        if !self.gate.holds_write(permit) {
            return Err(self.foreign(PermitKind::Write, permit.gate_id()));
        }
        self.store.write().put(key, value);
        Ok(())
    }

    /// Acquires a read permit, reads `key`, and releases the permit.
    ///
    /// # Errors
    ///
    /// [`StoreError::Cancelled`] if `cx` is cancelled while waiting.
    pub async fn read(&self, cx: &Cx, key: &S::Key) -> Result<Option<S::Value>, StoreError> {
        let permit = self.gate.acquire_read(cx).await?;
        let value = self.get(&permit, key);
        self.gate.release_read(permit)?;
        value
    }

    /// Acquires the write permit, writes `key`, and releases the permit.
    ///
    /// # Errors
    ///
    /// [`StoreError::Cancelled`] if `cx` is cancelled while waiting.
    pub async fn write(&self, cx: &Cx, key: S::Key, value: S::Value) -> Result<(), StoreError> {
        let permit = self.gate.acquire_write(cx).await?;
        let result = self.put(&permit, key, value);
        self.gate.release_write(permit)?;
        result
    }

    /// Blocking form of [`read`](Self::read).
    ///
    /// # Errors
    ///
    /// [`StoreError::Cancelled`] if `cx` is cancelled while waiting.
    pub fn read_blocking(&self, cx: &Cx, key: &S::Key) -> Result<Option<S::Value>, StoreError> {
        let permit = self.gate.acquire_read_blocking(cx)?;
        let value = self.get(&permit, key);
        self.gate.release_read(permit)?;
        value
    }

    /// Blocking form of [`write`](Self::write).
    ///
    /// # Errors
    ///
    /// [`StoreError::Cancelled`] if `cx` is cancelled while waiting.
    pub fn write_blocking(
        &self,
        cx: &Cx,
        key: S::Key,
        value: S::Value,
    ) -> Result<(), StoreError> {
        let permit = self.gate.acquire_write_blocking(cx)?;
        let result = self.put(&permit, key, value);
        self.gate.release_write(permit)?;
        result
    }

    /// Consumes the wrapper and returns the store.
    pub fn into_inner(self) -> S {
        self.store.into_inner()
    }

    fn foreign(&self, kind: PermitKind, actual: GateId) -> StoreError {
        StoreError::ForeignPermit {
            kind,
            expected: self.gate.id(),
            actual,
        }
    }
}
