//! User identity as seen by the token layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A user identifier as carried in a token claim.
///
/// Integer identifiers stay integers in the claim set; every other identifier
/// is stored as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// Numeric identifier.
    Int(i64),
    /// Any other identifier, in its string form.
    Str(String),
}

impl UserId {
    /// Converts the identifier to a claim value.
    #[must_use]
    pub fn to_claim(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Str(id) => Value::String(id.clone()),
        }
    }

    /// Reads an identifier from a claim value.
    ///
    /// Returns `None` for `null`. Values that are neither integers nor
    /// strings are kept in their JSON string form.
    #[must_use]
    pub fn from_claim(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => Some(
                n.as_i64()
                    .map_or_else(|| Self::Str(n.to_string()), Self::Int),
            ),
            other => Some(Self::Str(other.to_string())),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Anything tokens can be issued for.
pub trait AuthUser: Send + Sync {
    /// Returns the value of the identifying field `field`, if the user has it.
    fn identifier(&self, field: &str) -> Option<UserId>;

    /// Returns `true` if the user may authenticate.
    fn is_active(&self) -> bool;
}

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub id: i64,

    /// Login name, unique.
    pub username: String,

    /// Argon2 PHC string. `None` means password login is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Inactive users cannot obtain or use tokens.
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Last successful token pair issuance.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Creates an active user without a password.
    #[must_use]
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: None,
            is_active: true,
            last_login: None,
        }
    }

    /// Sets the stored password hash.
    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Marks the user inactive.
    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

impl AuthUser for User {
    fn identifier(&self, field: &str) -> Option<UserId> {
        match field {
            "id" => Some(UserId::Int(self.id)),
            "username" => Some(UserId::Str(self.username.clone())),
            _ => None,
        }
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_claim_conversion() {
        assert_eq!(UserId::Int(42).to_claim(), json!(42));
        assert_eq!(UserId::from("abc").to_claim(), json!("abc"));

        assert_eq!(UserId::from_claim(&json!(42)), Some(UserId::Int(42)));
        assert_eq!(
            UserId::from_claim(&json!("42")),
            Some(UserId::Str("42".to_string()))
        );
        assert_eq!(
            UserId::from_claim(&json!(1.5)),
            Some(UserId::Str("1.5".to_string()))
        );
        assert_eq!(UserId::from_claim(&Value::Null), None);
    }

    #[test]
    fn test_user_id_serde_untagged() {
        let ids: Vec<UserId> = serde_json::from_value(json!([7, "seven"])).unwrap();
        assert_eq!(ids, vec![UserId::Int(7), UserId::from("seven")]);
        assert_eq!(UserId::Int(7).to_string(), "7");
    }

    #[test]
    fn test_user_identifier_fields() {
        let user = User::new(42, "alice");
        assert_eq!(user.identifier("id"), Some(UserId::Int(42)));
        assert_eq!(user.identifier("username"), Some(UserId::from("alice")));
        assert_eq!(user.identifier("email"), None);
        assert!(AuthUser::is_active(&user));
        assert!(!AuthUser::is_active(&user.deactivated()));
    }

    #[test]
    fn test_user_deserialize_defaults() {
        let user: User = serde_json::from_value(json!({"id": 1, "username": "bob"})).unwrap();
        assert!(user.is_active);
        assert!(user.password_hash.is_none());
        assert!(user.last_login.is_none());
    }
}
