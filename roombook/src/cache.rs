//! Short-lived cache of service responses.
//!
//! Entries are grouped by [`ResourceKind`]; a mutation invalidates every entry of the affected
//! kinds instead of tracking individual keys. The cache only saves round trips for reads: the
//! booking service re-checks conflicts on every submission regardless of what was cached.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use tracing::trace;

use crate::config::CacheConfig;
use crate::models::bookings::Booking;
use crate::models::pagination::Page;
use crate::models::rooms::Room;
use crate::models::users::User;
use crate::types::ResourceKind;

#[derive(Debug, Clone)]
pub enum Cached {
    Rooms(Arc<Vec<Room>>),
    Room(Arc<Room>),
    Bookings(Arc<Page<Booking>>),
    Booking(Arc<Booking>),
    Users(Arc<Vec<User>>),
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, kind: ResourceKind, key: &str) -> Option<Cached>;

    async fn insert(&self, kind: ResourceKind, key: String, value: Cached);

    /// Drop every entry of `kind`.
    async fn invalidate(&self, kind: ResourceKind);
}

/// [`ResourceStore`] backed by one `moka` cache per resource kind.
#[derive(Clone)]
pub struct MokaStore {
    rooms: Cache<String, Cached>,
    bookings: Cache<String, Cached>,
    users: Cache<String, Cached>,
    availability: Cache<String, Cached>,
}

impl MokaStore {
    pub fn new(config: &CacheConfig) -> Self {
        let build = || Cache::builder().max_capacity(config.max_capacity).time_to_live(config.ttl).build();
        Self {
            rooms: build(),
            bookings: build(),
            users: build(),
            availability: build(),
        }
    }

    fn cache(&self, kind: ResourceKind) -> &Cache<String, Cached> {
        match kind {
            ResourceKind::Rooms => &self.rooms,
            ResourceKind::Bookings => &self.bookings,
            ResourceKind::Users => &self.users,
            ResourceKind::Availability => &self.availability,
        }
    }
}

#[async_trait]
impl ResourceStore for MokaStore {
    async fn get(&self, kind: ResourceKind, key: &str) -> Option<Cached> {
        let hit = self.cache(kind).get(key).await;
        trace!(%kind, key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    async fn insert(&self, kind: ResourceKind, key: String, value: Cached) {
        self.cache(kind).insert(key, value).await;
    }

    async fn invalidate(&self, kind: ResourceKind) {
        trace!(%kind, "Invalidating cache");
        self.cache(kind).invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn room(id: i64) -> Room {
        Room {
            id,
            name: format!("R{id}"),
            location: "1F".to_string(),
            capacity: 4,
            equipment: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_get_after_insert() {
        let store = MokaStore::new(&CacheConfig::default());
        store
            .insert(ResourceKind::Rooms, "101".to_string(), Cached::Room(Arc::new(room(101))))
            .await;

        match store.get(ResourceKind::Rooms, "101").await {
            Some(Cached::Room(r)) => assert_eq!(r.id, 101),
            other => panic!("unexpected cache entry: {other:?}"),
        }
        // Keys are scoped per kind
        assert!(store.get(ResourceKind::Availability, "101").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_one_kind() {
        let store = MokaStore::new(&CacheConfig::default());
        store
            .insert(ResourceKind::Rooms, "all".to_string(), Cached::Rooms(Arc::new(vec![room(1)])))
            .await;
        store
            .insert(ResourceKind::Availability, "w".to_string(), Cached::Rooms(Arc::new(vec![room(1)])))
            .await;

        store.invalidate(ResourceKind::Availability).await;

        assert!(store.get(ResourceKind::Availability, "w").await.is_none());
        assert!(store.get(ResourceKind::Rooms, "all").await.is_some());
    }
}
