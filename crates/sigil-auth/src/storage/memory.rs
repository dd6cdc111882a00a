//! In-process storage backends.
//!
//! Both stores are lock-sharded `DashMap`s. Create-or-get operations go
//! through the entry API so the check and the insert happen under one shard
//! lock.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::hash_password;
use crate::types::{
    AuthUser, BlacklistedToken, NewOutstandingToken, OutstandingToken, User, UserId,
};

use super::{RevocationStore, UserStore};

// =============================================================================
// Revocation Store
// =============================================================================

/// In-memory [`RevocationStore`].
#[derive(Debug)]
pub struct InMemoryRevocationStore {
    /// Outstanding records keyed by jti.
    outstanding: DashMap<String, OutstandingToken>,
    /// Outstanding record id to jti.
    jti_by_id: DashMap<i64, String>,
    /// Blacklist records keyed by outstanding record id.
    blacklisted: DashMap<i64, BlacklistedToken>,
    next_id: AtomicI64,
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRevocationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outstanding: DashMap::new(),
            jti_by_id: DashMap::new(),
            blacklisted: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of outstanding records.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of blacklist records.
    #[must_use]
    pub fn blacklisted_count(&self) -> usize {
        self.blacklisted.len()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn create_outstanding(&self, token: NewOutstandingToken) -> AuthResult<OutstandingToken> {
        match self.outstanding.entry(token.jti.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "Outstanding token with jti '{}' already exists",
                token.jti
            ))),
            Entry::Vacant(entry) => {
                let record = token.into_record(self.next_id());
                self.jti_by_id.insert(record.id, record.jti.clone());
                Ok(entry.insert(record).clone())
            }
        }
    }

    async fn get_or_create_outstanding(
        &self,
        token: NewOutstandingToken,
    ) -> AuthResult<OutstandingToken> {
        let record = self
            .outstanding
            .entry(token.jti.clone())
            .or_insert_with(|| {
                let record = token.into_record(self.next_id());
                self.jti_by_id.insert(record.id, record.jti.clone());
                record
            })
            .clone();
        Ok(record)
    }

    async fn find_outstanding(&self, jti: &str) -> AuthResult<Option<OutstandingToken>> {
        Ok(self.outstanding.get(jti).map(|r| r.value().clone()))
    }

    async fn list_outstanding_for_user(&self, user_id: &UserId) -> AuthResult<Vec<OutstandingToken>> {
        let mut records: Vec<OutstandingToken> = self
            .outstanding
            .iter()
            .filter(|r| r.user_id.as_ref() == Some(user_id))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn get_or_create_blacklisted(
        &self,
        outstanding_id: i64,
        blacklisted_at: OffsetDateTime,
    ) -> AuthResult<BlacklistedToken> {
        if !self.jti_by_id.contains_key(&outstanding_id) {
            return Err(AuthError::storage(format!(
                "Outstanding token {outstanding_id} not found"
            )));
        }

        let record = self
            .blacklisted
            .entry(outstanding_id)
            .or_insert_with(|| BlacklistedToken {
                id: self.next_id(),
                token_id: outstanding_id,
                blacklisted_at,
            })
            .clone();
        Ok(record)
    }

    async fn is_blacklisted(&self, jti: &str) -> AuthResult<bool> {
        let Some(id) = self.outstanding.get(jti).map(|r| r.id) else {
            return Ok(false);
        };
        Ok(self.blacklisted.contains_key(&id))
    }

    async fn flush_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut removed = Vec::new();
        self.outstanding.retain(|_, record| {
            if record.is_expired_at(now) {
                removed.push(record.id);
                false
            } else {
                true
            }
        });

        for id in &removed {
            self.jti_by_id.remove(id);
            self.blacklisted.remove(id);
        }

        Ok(removed.len() as u64)
    }
}

// =============================================================================
// User Store
// =============================================================================

/// In-memory [`UserStore`].
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: DashMap<i64, User>,
    next_id: AtomicI64,
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Inserts or replaces a user.
    pub fn insert(&self, user: User) {
        self.next_id.fetch_max(user.id + 1, Ordering::SeqCst);
        self.users.insert(user.id, user);
    }

    /// Creates an active user with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns an error if the username is taken or hashing fails.
    pub fn create_user(&self, username: &str, password: &str) -> AuthResult<User> {
        if self.users.iter().any(|u| u.username == username) {
            return Err(AuthError::storage(format!(
                "User '{username}' already exists"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User::new(id, username).with_password_hash(hash_password(password)?);
        self.users.insert(id, user.clone());
        Ok(user)
    }

    /// Returns a user by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identifier(&self, field: &str, value: &UserId) -> AuthResult<Option<User>> {
        if field == "id" {
            if let UserId::Int(id) = value {
                return Ok(self.get(*id));
            }
        }

        let wanted = value.to_string();
        Ok(self
            .users
            .iter()
            .find(|u| u.identifier(field).is_some_and(|id| id.to_string() == wanted))
            .map(|u| u.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.value().clone()))
    }

    async fn update_last_login(&self, user_id: i64, at: OffsetDateTime) -> AuthResult<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::Duration;
    use time::macros::datetime;

    fn new_token(jti: &str, expires_at: OffsetDateTime) -> NewOutstandingToken {
        NewOutstandingToken::new(jti, "signed", Some(UserId::Int(1)), None, expires_at)
    }

    const T0: OffsetDateTime = datetime!(2024-01-01 0:00 UTC);

    #[tokio::test]
    async fn test_create_outstanding_rejects_duplicate_jti() {
        let store = InMemoryRevocationStore::new();
        store.create_outstanding(new_token("a", T0)).await.unwrap();
        assert!(store.create_outstanding(new_token("a", T0)).await.is_err());
        assert_eq!(store.outstanding_count(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_outstanding_returns_existing() {
        let store = InMemoryRevocationStore::new();
        let first = store.get_or_create_outstanding(new_token("a", T0)).await.unwrap();
        let second = store
            .get_or_create_outstanding(new_token("a", T0 + Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_blacklist_is_idempotent() {
        let store = InMemoryRevocationStore::new();
        let outstanding = store.create_outstanding(new_token("a", T0)).await.unwrap();

        let first = store.get_or_create_blacklisted(outstanding.id, T0).await.unwrap();
        let second = store
            .get_or_create_blacklisted(outstanding.id, T0 + Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.blacklisted_count(), 1);
        assert!(store.is_blacklisted("a").await.unwrap());
        assert!(!store.is_blacklisted("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_blacklist_requires_outstanding_record() {
        let store = InMemoryRevocationStore::new();
        assert!(store.get_or_create_blacklisted(99, T0).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_blacklist_converges() {
        let store = Arc::new(InMemoryRevocationStore::new());
        let outstanding = store.create_outstanding(new_token("a", T0)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.get_or_create_blacklisted(outstanding.id, T0).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.blacklisted_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_expired_cascades() {
        let store = InMemoryRevocationStore::new();
        let expired = store.create_outstanding(new_token("old", T0)).await.unwrap();
        store
            .create_outstanding(new_token("live", T0 + Duration::days(1)))
            .await
            .unwrap();
        store.get_or_create_blacklisted(expired.id, T0).await.unwrap();

        let removed = store.flush_expired(T0).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.outstanding_count(), 1);
        assert_eq!(store.blacklisted_count(), 0);
        assert!(store.find_outstanding("old").await.unwrap().is_none());
        assert!(store.find_outstanding("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_outstanding_for_user() {
        let store = InMemoryRevocationStore::new();
        store.create_outstanding(new_token("a", T0)).await.unwrap();
        store.create_outstanding(new_token("b", T0)).await.unwrap();
        store
            .create_outstanding(NewOutstandingToken::new("c", "t", None, None, T0))
            .await
            .unwrap();

        let records = store.list_outstanding_for_user(&UserId::Int(1)).await.unwrap();
        let jtis: Vec<_> = records.iter().map(|r| r.jti.as_str()).collect();
        assert_eq!(jtis, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_user_store_lookup() {
        let store = InMemoryUserStore::new();
        let alice = store.create_user("alice", "wonderland").unwrap();
        store.insert(User::new(42, "bob"));

        assert!(store.create_user("alice", "again").is_err());

        let found = store
            .find_by_identifier("id", &UserId::Int(alice.id))
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.username), Some("alice".to_string()));

        let found = store
            .find_by_identifier("id", &UserId::from("42"))
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(42));

        let found = store
            .find_by_identifier("username", &UserId::from("bob"))
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(42));

        assert!(store.find_by_username("carol").await.unwrap().is_none());

        let next = store.create_user("carol", "pw").unwrap();
        assert_eq!(next.id, 43);
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let store = InMemoryUserStore::new();
        store.insert(User::new(1, "alice"));
        store.update_last_login(1, T0).await.unwrap();
        assert_eq!(store.get(1).unwrap().last_login, Some(T0));
    }
}
