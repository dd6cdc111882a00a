//! Everything a token needs from its environment.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use time::OffsetDateTime;

use crate::backend::TokenBackend;
use crate::clock::Clock;
use crate::config::{AuthSettings, ConfigError};
use crate::storage::RevocationStore;

/// An immutable snapshot of settings plus the collaborators built from them.
///
/// Cloning is cheap. Tokens keep the context they were created with, so a
/// settings reload never changes a token already in flight.
#[derive(Clone)]
pub struct TokenContext {
    settings: Arc<AuthSettings>,
    backend: Arc<TokenBackend>,
    clock: Arc<dyn Clock>,
    revocation: Option<Arc<dyn RevocationStore>>,
}

impl TokenContext {
    /// Validates `settings` and builds the signing backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the key material
    /// cannot be parsed.
    pub fn new(settings: AuthSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        settings.validate()?;
        let backend = TokenBackend::new(&settings, clock.clone())?;

        Ok(Self {
            settings: Arc::new(settings),
            backend: Arc::new(backend),
            clock,
            revocation: None,
        })
    }

    /// Enables revocation for refresh tokens.
    #[must_use]
    pub fn with_revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocation = Some(store);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    #[must_use]
    pub fn backend(&self) -> &TokenBackend {
        &self.backend
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the revocation store, if revocation is enabled.
    #[must_use]
    pub fn revocation_store(&self) -> Option<&Arc<dyn RevocationStore>> {
        self.revocation.as_ref()
    }

    /// Current time according to the configured clock.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

impl fmt::Debug for TokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenContext")
            .field("backend", &self.backend)
            .field("clock", &self.clock)
            .field("revocation", &self.revocation.is_some())
            .finish_non_exhaustive()
    }
}

/// A [`TokenContext`] that can be replaced at runtime.
///
/// Readers take a snapshot with [`load`](Self::load); a reload only affects
/// snapshots taken afterwards.
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<ArcSwap<TokenContext>>,
}

impl SharedContext {
    #[must_use]
    pub fn new(context: TokenContext) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(context)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<TokenContext> {
        self.inner.load_full()
    }

    /// Rebuilds the context from new settings, keeping the clock and the
    /// revocation store.
    ///
    /// # Errors
    ///
    /// Returns an error, and keeps the current snapshot, if the new settings
    /// are invalid.
    pub fn reload(&self, settings: AuthSettings) -> Result<(), ConfigError> {
        let current = self.load();
        let mut next = TokenContext::new(settings, current.clock.clone())?;
        next.revocation = current.revocation.clone();

        self.inner.store(Arc::new(next));
        tracing::info!("Token settings reloaded");
        Ok(())
    }
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedContext").field(&self.load()).finish()
    }
}
