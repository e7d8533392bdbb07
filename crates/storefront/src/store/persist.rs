//! Whole-state persistence for shopper stores.
//!
//! A [`PersistentSlot`] owns one key in a [`StorageArea`]. The full store
//! state is written under that key after every mutation, wrapped in a
//! versioned envelope:
//!
//! ```json
//! {"state": {"items": []}, "version": 0}
//! ```
//!
//! Loading never fails. Absent, unreadable, corrupt, or wrong-version data
//! all fall back to the default (empty) state, logged at `warn`.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{StorageArea, StorageError};

/// Envelope version written by this build.
pub const STATE_VERSION: u32 = 0;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    state: &'a T,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    state: T,
    version: u32,
}

/// Why a persisted value could not be used.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("malformed state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state version {0}")]
    Version(u32),
}

/// One persisted store state, bound to a storage key.
pub struct PersistentSlot<T> {
    area: StorageArea,
    key: &'static str,
    _state: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for PersistentSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSlot")
            .field("area", &self.area)
            .field("key", &self.key)
            .finish()
    }
}

impl<T> PersistentSlot<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Bind a slot to `key` in `area`.
    #[must_use]
    pub const fn new(area: StorageArea, key: &'static str) -> Self {
        Self {
            area,
            key,
            _state: PhantomData,
        }
    }

    /// Storage key of this slot.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Storage area this slot writes to.
    #[must_use]
    pub const fn area(&self) -> &StorageArea {
        &self.area
    }

    /// Decode a raw persisted value.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the version is unknown.
    pub fn decode(raw: &str) -> Result<T, DecodeError> {
        let envelope: Envelope<T> = serde_json::from_str(raw)?;
        if envelope.version != STATE_VERSION {
            return Err(DecodeError::Version(envelope.version));
        }
        Ok(envelope.state)
    }

    fn try_load(&self) -> Result<Option<T>, DecodeError> {
        self.area
            .get(self.key)?
            .map(|raw| Self::decode(&raw))
            .transpose()
    }

    /// Rehydrate state, or return the default state.
    #[must_use]
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(
                    key = self.key,
                    partition = self.area.partition(),
                    error = %e,
                    "discarding unusable persisted state"
                );
                T::default()
            }
        }
    }

    /// Serialize and write the full state.
    ///
    /// Failures are logged and swallowed; the in-memory state stays
    /// authoritative for the rest of the request.
    pub fn save(&self, state: &T) {
        let envelope = EnvelopeRef {
            state,
            version: STATE_VERSION,
        };
        let result = serde_json::to_string(&envelope)
            .map_err(DecodeError::from)
            .and_then(|raw| self.area.set(self.key, &raw).map_err(DecodeError::from));

        if let Err(e) = result {
            tracing::error!(
                key = self.key,
                partition = self.area.partition(),
                error = %e,
                "failed to persist store state"
            );
        }
    }
}
