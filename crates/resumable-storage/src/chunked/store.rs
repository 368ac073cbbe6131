//! Concurrency-safe registry of in-progress upload sessions.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

use resumable_core::error::AppError;
use resumable_core::result::AppResult;

use super::session::UploadSession;

/// Shared handle to one session. The mutex serializes every request that
/// touches the session, including writes to its temporary file.
pub type SessionHandle = Arc<Mutex<UploadSession>>;

/// Result of claiming a session id for a first chunk.
#[derive(Debug)]
pub enum Claim {
    /// No session existed; a new one was registered and is returned already
    /// locked, so concurrent requests wait until the creator is done.
    Created {
        /// Handle now stored under the id.
        handle: SessionHandle,
        /// Lock held by the creator.
        guard: OwnedMutexGuard<UploadSession>,
    },
    /// A session is already registered under the id.
    Existing(SessionHandle),
}

/// Maps session ids to session handles.
///
/// Every operation is atomic with respect to the others. The map never
/// holds a shard lock across an await point.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace a session, returning the previous handle.
    pub fn put(&self, id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.insert(id.to_string(), handle)
    }

    /// Remove a session, returning its handle.
    pub fn delete(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    /// Remove the session only if `id` still maps to `handle`.
    ///
    /// Returns `true` when the entry was removed.
    pub fn delete_if_current(&self, id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Whether `id` still maps to `handle`. A request that waited for a
    /// session lock uses this to detect that the session was completed,
    /// expired or abandoned in the meantime.
    pub fn is_current(&self, id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), handle))
    }

    /// Atomically look up `id`, registering the session built by `init`
    /// when absent. `init` runs under the map's shard lock and must not
    /// block; when it fails nothing is registered.
    pub fn claim<F>(&self, id: &str, init: F) -> AppResult<Claim>
    where
        F: FnOnce() -> AppResult<UploadSession>,
    {
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(entry) => Ok(Claim::Existing(Arc::clone(entry.get()))),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(init()?));
                let guard = Arc::clone(&handle)
                    .try_lock_owned()
                    .map_err(|_| AppError::internal("Fresh session lock is already held"))?;
                entry.insert(Arc::clone(&handle));
                Ok(Claim::Created { handle, guard })
            }
        }
    }

    /// Whether a session is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all registered sessions.
    pub fn entries(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
