use std::sync::Arc;
use std::time::SystemTime;

use crate::{Clock, IdGenerator, Role};

/// The authenticated caller of a service operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Collaborators shared by the application services.
///
/// Services stay generic over the repository type `R` (which may be a trait
/// object such as `dyn Store`) and take time and ids from injected sources so
/// they remain testable without IO.
pub struct ServiceContext<R: ?Sized> {
    pub repo: Arc<R>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl<R: ?Sized> Clone for ServiceContext<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<R: ?Sized> ServiceContext<R> {
    pub fn new(repo: Arc<R>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { repo, clock, ids }
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::ServiceContext;
    use crate::adapters::memory_repo::InMemoryStore;
    use crate::{Clock, CoreError, IdGenerator, PasswordHasher};

    /// Clock that advances one second per reading, so ordering by time is stable.
    pub struct TickingClock(AtomicU64);

    impl Clock for TickingClock {
        fn now(&self) -> SystemTime {
            UNIX_EPOCH + Duration::from_secs(self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    pub struct SeqIds(AtomicU64);

    impl IdGenerator for SeqIds {
        fn next_id(&self) -> String {
            format!("id{}", self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    /// Reversible "hash" so tests do not pay for bcrypt.
    pub struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, plain: &str) -> Result<String, CoreError> {
            Ok(format!("plain:{}", plain))
        }

        fn verify(&self, plain: &str, hash: &str) -> bool {
            hash.strip_prefix("plain:") == Some(plain)
        }
    }

    pub fn context() -> ServiceContext<InMemoryStore> {
        ServiceContext::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TickingClock(AtomicU64::new(1_700_000_000))),
            Arc::new(SeqIds(AtomicU64::new(1))),
        )
    }
}
