//! Call-scoped write authorization.
//!
//! The guard issues an [`AuthorizationScope`] per coordinated call. While the
//! scope is alive its token is registered; any future run through
//! [`AuthorizationScope::run`] carries the token in a task-local, so store
//! writes made from inside that future are recognized as authorized. Dropping
//! the scope deregisters the token on every exit path, including panics and
//! cancelled futures.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

tokio::task_local! {
    static ACTIVE_TOKEN: TokenId;
}

/// Token ids are unique across every guard in the process.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of an issued authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenId(u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auth-{}", self.0)
    }
}

/// Tokens currently in force for one guard.
#[derive(Debug, Default)]
pub(crate) struct TokenRegistry {
    active: Mutex<HashSet<TokenId>>,
}

impl TokenRegistry {
    pub(crate) fn issue(self: &Arc<Self>) -> AuthorizationScope {
        let id = TokenId(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        self.active().insert(id);
        AuthorizationScope {
            id,
            registry: Arc::clone(self),
        }
    }

    pub(crate) fn is_active(&self, id: TokenId) -> bool {
        self.active().contains(&id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active().len()
    }

    fn revoke(&self, id: TokenId) {
        self.active().remove(&id);
    }

    // A poisoned set is still consistent: every mutation is a single insert or remove.
    fn active(&self) -> MutexGuard<'_, HashSet<TokenId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII authorization handed out by the guard.
#[derive(Debug)]
pub struct AuthorizationScope {
    id: TokenId,
    registry: Arc<TokenRegistry>,
}

impl AuthorizationScope {
    pub fn token(&self) -> TokenId {
        self.id
    }

    /// Runs `future` with this scope's token visible to the guard.
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        ACTIVE_TOKEN.scope(self.id, future).await
    }
}

impl Drop for AuthorizationScope {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
        tracing::trace!(token = %self.id, "authorization scope closed");
    }
}

/// Token of the innermost scope the current task runs in, if any.
pub fn current_token() -> Option<TokenId> {
    ACTIVE_TOKEN.try_with(|token| *token).ok()
}
