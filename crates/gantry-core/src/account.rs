//! Account lookup.
//!
//! Reviewer and CC options carry email addresses; intake resolves them to
//! registered accounts through this trait. An unresolvable address is never
//! fatal to a push, so the trait reports absence rather than erroring.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::model::AccountId;

/// Resolves user-supplied addresses to registered accounts.
pub trait Directory: Send + Sync {
    /// The account registered under `email`, if any.
    fn resolve_email(&self, email: &str) -> Option<AccountId>;
}

/// In-memory directory, for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemDirectory {
    inner: Mutex<MemDirectoryInner>,
}

#[derive(Debug, Default)]
struct MemDirectoryInner {
    by_email: HashMap<String, AccountId>,
    next_id: u32,
}

impl MemDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an email, assigning the next free account id. Registering an
    /// existing email returns the id already assigned.
    pub fn add(&self, email: &str) -> AccountId {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = inner.by_email.get(email) {
            return *id;
        }
        inner.next_id += 1;
        let id = AccountId(1_000_000 + inner.next_id);
        inner.by_email.insert(email.to_owned(), id);
        id
    }
}

impl Directory for MemDirectory {
    fn resolve_email(&self, email: &str) -> Option<AccountId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_email
            .get(email)
            .copied()
    }
}
