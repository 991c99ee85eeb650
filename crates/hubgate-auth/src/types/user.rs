//! User domain types and role-based permissions.
//!
//! Users are owned by an external collaborator and reach this crate
//! read-only through the [`UserRepository`](crate::storage::UserRepository)
//! capability. The role table maps each role to its permission set;
//! permission checks support `*` and `prefix:*` wildcards.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// =============================================================================
// Roles and Permissions
// =============================================================================

/// User roles, least privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to campaigns and analytics.
    Viewer,
    /// Read and write access to campaigns.
    Editor,
    /// Read everything, write analytics.
    Analyst,
    /// Read everything, write campaigns and analytics.
    Manager,
    /// Full access.
    Admin,
}

impl Role {
    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Analyst => "analyst",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Permissions granted to this role.
    #[must_use]
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Self::Admin => &["*"],
            Self::Manager => &["read:*", "write:campaigns", "write:analytics"],
            Self::Analyst => &["read:*", "write:analytics"],
            Self::Editor => &["read:campaigns", "write:campaigns"],
            Self::Viewer => &["read:campaigns", "read:analytics"],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checks whether a permission set grants `required`.
///
/// `*` grants everything; a trailing `*` grants by prefix, so
/// `read:*` covers `read:analytics`.
#[must_use]
pub fn has_permission(permissions: &[String], required: &str) -> bool {
    permissions.iter().any(|permission| {
        if permission == "*" || permission == required {
            return true;
        }
        permission
            .strip_suffix('*')
            .is_some_and(|prefix| required.starts_with(prefix))
    })
}

// =============================================================================
// User
// =============================================================================

/// A user record as provided by the external user store.
///
/// Read-only here: this crate never creates or mutates users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user id.
    pub id: String,

    /// Login email.
    pub email: String,

    /// Argon2 password hash.
    pub password_hash: String,

    /// Assigned role.
    pub role: Role,

    /// Whether TOTP MFA is required at login.
    pub mfa_enabled: bool,

    /// Base32 TOTP secret, when MFA is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_secret: Option<String>,
}

impl User {
    /// Verifies a password against the stored Argon2 hash.
    ///
    /// A malformed stored hash verifies as `false` rather than erroring:
    /// the caller must see the same generic failure either way.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    /// Projection safe to return to clients: no password hash, no MFA
    /// secret.
    #[must_use]
    pub fn sanitize(&self) -> SafeUser {
        SafeUser {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            mfa_enabled: self.mfa_enabled,
        }
    }
}

/// Client-safe user projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeUser {
    /// Unique user id.
    pub id: String,
    /// Login email.
    pub email: String,
    /// Assigned role.
    pub role: Role,
    /// Whether MFA is enabled.
    pub mfa_enabled: bool,
}

/// Hashes a password with Argon2id and a random salt.
///
/// # Errors
///
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_role_permissions() {
        assert_eq!(Role::Admin.permissions(), &["*"]);
        assert!(Role::Viewer.permissions().contains(&"read:campaigns"));
        assert!(!Role::Viewer.permissions().contains(&"write:campaigns"));
    }

    #[test]
    fn test_has_permission_exact_and_wildcard() {
        let admin = strings(&["*"]);
        assert!(has_permission(&admin, "write:users"));

        let analyst = strings(&["read:*", "write:analytics"]);
        assert!(has_permission(&analyst, "read:campaigns"));
        assert!(has_permission(&analyst, "read:users"));
        assert!(has_permission(&analyst, "write:analytics"));
        assert!(!has_permission(&analyst, "write:campaigns"));

        let viewer = strings(&["read:campaigns"]);
        assert!(has_permission(&viewer, "read:campaigns"));
        assert!(!has_permission(&viewer, "read:analytics"));
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        let user = User {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            password_hash: hash,
            role: Role::Viewer,
            mfa_enabled: false,
            mfa_secret: None,
        };

        assert!(user.verify_password("correct horse battery staple"));
        assert!(!user.verify_password("wrong"));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        let user = User {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            password_hash: "not-a-hash".to_string(),
            role: Role::Viewer,
            mfa_enabled: false,
            mfa_secret: None,
        };
        assert!(!user.verify_password("anything"));
    }

    #[test]
    fn test_sanitize_strips_secrets() {
        let user = User {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Admin,
            mfa_enabled: true,
            mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
        };

        let safe = serde_json::to_string(&user.sanitize()).unwrap();
        assert!(!safe.contains("hash"));
        assert!(!safe.contains("JBSWY3DPEHPK3PXP"));
        assert!(safe.contains(r#""role":"admin""#));
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), r#""manager""#);
        let role: Role = serde_json::from_str(r#""editor""#).unwrap();
        assert_eq!(role, Role::Editor);
    }
}
