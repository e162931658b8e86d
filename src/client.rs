//! Top-level client wiring.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use crate::api::{CommentsApi, HttpGateway};
use crate::auth::{SessionShared, SessionStore};
use crate::cache::{CourseCache, ProgressCache, Storage};
use crate::cart::CartSyncStore;
use crate::config::Config;

/// The assembled client: one gateway, one session, and the stores that
/// UI collaborators call into.
pub struct Client {
    pub session: SessionStore,
    pub courses: CourseCache,
    pub cart: CartSyncStore,
    pub progress: ProgressCache,
    pub comments: CommentsApi,
    gateway: HttpGateway,
}

impl Client {
    /// Build the full store graph from configuration, restoring any
    /// persisted session without a network call.
    pub fn new(config: &Config) -> Result<Self> {
        let storage = Storage::new(config.resolve_storage_dir()?)?;
        let shared = Arc::new(SessionShared::new(storage.clone()));
        let gateway = HttpGateway::new(&config.api_base_url, Arc::clone(&shared))?;

        Ok(Self {
            session: SessionStore::new(gateway.clone(), Arc::clone(&shared)),
            courses: CourseCache::new(gateway.clone(), storage.clone()),
            cart: CartSyncStore::new(gateway.clone(), Arc::clone(&shared), storage.clone()),
            progress: ProgressCache::new(gateway.clone(), shared, storage),
            comments: CommentsApi::new(gateway.clone()),
            gateway,
        })
    }

    /// Process-wide loading signal: true while any request is in flight.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.gateway.loading()
    }
}
