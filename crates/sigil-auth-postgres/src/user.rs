//! User storage for PostgreSQL.

use sigil_auth::types::{User, UserId};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::{PgPool, StorageResult, conflict_on_unique};

type UserTuple = (i64, String, Option<String>, bool, Option<OffsetDateTime>);

const COLUMNS: &str = "id, username, password_hash, is_active, last_login";

fn from_tuple(row: UserTuple) -> User {
    let (id, username, password_hash, is_active, last_login) = row;
    User {
        id,
        username,
        password_hash,
        is_active,
        last_login,
    }
}

/// Column and bind value for looking a user up by an identifying field.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum IdentifierFilter {
    Id(i64),
    Username(String),
}

impl IdentifierFilter {
    /// Maps `field = value` onto a column. Identifiers compare by their
    /// string form, so `"42"` finds user 42. Unknown fields and
    /// non-numeric ids match nothing.
    pub(crate) fn new(field: &str, value: &UserId) -> Option<Self> {
        match field {
            "id" => match value {
                UserId::Int(id) => Some(Self::Id(*id)),
                UserId::Str(s) => s.parse().ok().map(Self::Id),
            },
            "username" => Some(Self::Username(value.to_string())),
            _ => None,
        }
    }
}

// =============================================================================
// User Storage
// =============================================================================

/// User operations on `sigil_user`.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        let row: Option<UserTuple> =
            query_as(&format!("SELECT {COLUMNS} FROM sigil_user WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(from_tuple))
    }

    /// Find a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let row: Option<UserTuple> =
            query_as(&format!("SELECT {COLUMNS} FROM sigil_user WHERE username = $1"))
                .bind(username)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(from_tuple))
    }

    /// Find a user by an identifying field.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_identifier(&self, field: &str, value: &UserId) -> StorageResult<Option<User>> {
        match IdentifierFilter::new(field, value) {
            Some(IdentifierFilter::Id(id)) => self.find_by_id(id).await,
            Some(IdentifierFilter::Username(username)) => self.find_by_username(&username).await,
            None => Ok(None),
        }
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the username is taken, or a database error.
    pub async fn create(
        &self,
        username: &str,
        password_hash: Option<&str>,
        is_active: bool,
    ) -> StorageResult<User> {
        let row: UserTuple = query_as(&format!(
            r#"
            INSERT INTO sigil_user (username, password_hash, is_active)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(username)
        .bind(password_hash)
        .bind(is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("User {username} already exists")))?;

        Ok(from_tuple(row))
    }

    /// Record a login time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn update_last_login(&self, id: i64, at: OffsetDateTime) -> StorageResult<()> {
        query("UPDATE sigil_user SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}
