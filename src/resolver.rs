use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::api::TimeTrackingApi;
use crate::error::{ClockodoError, EntityKind};
use crate::matching::{NameIndex, Named, Resolved, normalize};
use crate::models::{CustomerId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: EntityKind,
    scope: Option<u64>,
    name: String,
}

impl CacheKey {
    pub fn new(kind: EntityKind, scope: Option<u64>, name: &str) -> Result<Self, ClockodoError> {
        let name = normalize(name);
        if name.is_empty() {
            return Err(ClockodoError::validation(format!("{kind} name must not be empty")));
        }
        Ok(Self { kind, scope, name })
    }
}

#[derive(Debug, Clone)]
struct CachedResolution {
    resolved: Resolved,
    stored_at: Instant,
}

/// Turns names into Clockodo IDs, remembering answers for a short time.
///
/// The cache lock is only taken for map access and never across a call to
/// the API.
pub struct Resolver {
    api: Arc<dyn TimeTrackingApi>,
    email: String,
    ttl: Duration,
    cache: Mutex<HashMap<CacheKey, CachedResolution>>,
}

impl Resolver {
    pub fn new(api: Arc<dyn TimeTrackingApi>, email: impl Into<String>, ttl: Duration) -> Self {
        Self {
            api,
            email: email.into(),
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve_customer(&self, name: &str) -> Result<Resolved, ClockodoError> {
        let key = CacheKey::new(EntityKind::Customer, None, name)?;
        self.resolve(key, name, self.api.list_customers()).await
    }

    pub async fn resolve_project(&self, customer_id: CustomerId, name: &str) -> Result<Resolved, ClockodoError> {
        let key = CacheKey::new(EntityKind::Project, Some(customer_id), name)?;
        self.resolve(key, name, self.api.list_projects(Some(customer_id))).await
    }

    pub async fn resolve_service(&self, name: &str) -> Result<Resolved, ClockodoError> {
        let key = CacheKey::new(EntityKind::Service, None, name)?;
        self.resolve(key, name, self.api.list_services()).await
    }

    /// The user the credentials belong to, matched by email.
    pub async fn current_user(&self) -> Result<UserId, ClockodoError> {
        let key = CacheKey::new(EntityKind::User, None, &self.email)?;
        if let Some(hit) = self.cached(&key) {
            return Ok(hit.id);
        }
        let users = self.api.list_users().await?;
        let wanted = normalize(&self.email);
        let user = users
            .iter()
            .find(|user| normalize(&user.email) == wanted)
            .ok_or_else(|| ClockodoError::NotFound(format!("User with email {} not found", self.email)))?;
        self.store(
            key,
            Resolved {
                id: user.id,
                name: user.name.clone(),
            },
        );
        Ok(user.id)
    }

    pub fn invalidate(&self, kind: EntityKind, scope: Option<u64>, name: &str) {
        if let Ok(key) = CacheKey::new(kind, scope, name) {
            if self.lock().remove(&key).is_some() {
                debug!(kind = %kind, name, "Evicted cached resolution");
            }
        }
    }

    async fn resolve<T, F>(&self, key: CacheKey, name: &str, listing: F) -> Result<Resolved, ClockodoError>
    where
        T: Named,
        F: Future<Output = Result<Vec<T>, ClockodoError>>,
    {
        if let Some(hit) = self.cached(&key) {
            debug!(kind = %key.kind, name, id = hit.id, "Resolved from cache");
            return Ok(hit);
        }

        let items = listing.await?;
        let resolved = NameIndex::new(key.kind, &items).lookup(name)?;
        debug!(kind = %key.kind, name, id = resolved.id, "Resolved from listing");
        self.store(key, resolved.clone());
        Ok(resolved)
    }

    fn cached(&self, key: &CacheKey) -> Option<Resolved> {
        let mut cache = self.lock();
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.resolved.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    // Expired entries are dropped on every write so names looked up once do
    // not stay in the map forever.
    fn store(&self, key: CacheKey, resolved: Resolved) {
        let mut cache = self.lock();
        let before = cache.len();
        cache.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        if cache.len() < before {
            debug!(swept = before - cache.len(), "Dropped expired resolutions");
        }
        cache.insert(
            key,
            CachedResolution {
                resolved,
                stored_at: Instant::now(),
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CachedResolution>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
