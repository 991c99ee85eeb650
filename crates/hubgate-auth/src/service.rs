//! The JWT authentication service.
//!
//! Login with optional TOTP MFA, token pair issuance, verification,
//! refresh, and revocation. All cross-process state (sessions, the
//! blacklist, rate-limiter counters) lives in the shared key-value
//! store; the service itself is stateless.
//!
//! Failure messages returned to clients are deliberately generic; the
//! audit log carries the precise cause.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use hubgate_core::{AuditEvent, ClientInfo};
use hubgate_store::{KeyValueStore, RateLimiter};

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mfa::{self, MfaEnrollment};
use crate::storage::{
    RevocationKeying, RevocationStore, SessionStore, UserRepository,
};
use crate::token::JwtSigner;
use crate::types::claims::{TokenClaims, TokenType};
use crate::types::session::Session;
use crate::types::user::{SafeUser, User};

/// An issued access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Signed access token (HS512).
    pub access_token: String,

    /// Signed refresh token (HS512, distinct secret).
    pub refresh_token: String,

    /// Access token lifetime in seconds.
    pub access_token_expires_in: u64,

    /// Refresh token lifetime in seconds.
    pub refresh_token_expires_in: u64,

    /// Always `Bearer`.
    pub token_type: String,
}

/// A refreshed access token (the refresh token is not rotated).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedAccessToken {
    /// The new access token.
    pub access_token: String,

    /// Access token lifetime in seconds.
    pub access_token_expires_in: u64,

    /// Always `Bearer`.
    pub token_type: String,
}

/// Outcome of an authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Credentials were valid but the account requires an MFA code.
    MfaRequired {
        /// Correlation id for the pending challenge (audit trail).
        auth_id: String,
    },
    /// Fully authenticated.
    Authenticated {
        /// Client-safe user projection.
        user: SafeUser,
        /// The issued token pair.
        tokens: TokenPair,
    },
}

/// The JWT authentication service.
pub struct JwtAuthService {
    config: AuthConfig,
    users: Arc<dyn UserRepository>,
    sessions: SessionStore,
    revocations: RevocationStore,
    signer: JwtSigner,
    login_limiter: RateLimiter,
    mfa_limiter: RateLimiter,
}

impl JwtAuthService {
    /// Creates the service over an injected user repository and shared
    /// store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        store: Arc<dyn KeyValueStore>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let signer = JwtSigner::new(&config);
        let sessions = SessionStore::new(store.clone(), config.refresh_token_ttl);
        let revocations = RevocationStore::new(store.clone(), RevocationKeying::TokenId);
        let login_limiter = RateLimiter::new(store.clone(), "login", config.login_limit);
        let mfa_limiter = RateLimiter::new(store, "mfa", config.mfa_limit);

        Ok(Self {
            config,
            users,
            sessions,
            revocations,
            signer,
            login_limiter,
            mfa_limiter,
        })
    }

    /// Authenticates a user with email/password and an optional MFA
    /// code.
    ///
    /// Login attempts are rate limited per IP before any credential
    /// work. If the account has MFA enabled and no code is supplied, an
    /// [`AuthOutcome::MfaRequired`] challenge is returned instead of
    /// tokens; MFA verification itself is rate limited per (ip, user).
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` when over the attempt allowance, a generic
    /// `AuthenticationFailed` for any credential problem (the audit log
    /// records whether the user was unknown or the password wrong), or
    /// `Validation` for empty inputs.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        mfa_code: Option<&str>,
        client: &ClientInfo,
    ) -> AuthResult<AuthOutcome> {
        let auth_id = Uuid::new_v4().to_string();

        if let Err(err) = self.login_limiter.check(&format!("ip:{}", client.ip)).await {
            AuditEvent::new("rate_limit_exceeded")
                .client(client)
                .details(json!({ "authId": auth_id, "limit": "login" }))
                .emit();
            return Err(err.into());
        }

        if email.is_empty() || password.is_empty() {
            return Err(AuthError::validation("email and password are required"));
        }

        let Some(user) = self.users.find_by_email(email).await? else {
            AuditEvent::new("authentication_failed")
                .client(client)
                .details(json!({
                    "authId": auth_id,
                    "email": email,
                    "reason": "user_not_found"
                }))
                .emit();
            return Err(AuthError::authentication_failed("Invalid credentials"));
        };

        if !user.verify_password(password) {
            AuditEvent::new("authentication_failed")
                .actor(&user.id)
                .client(client)
                .details(json!({ "authId": auth_id, "reason": "invalid_password" }))
                .emit();
            return Err(AuthError::authentication_failed("Invalid credentials"));
        }

        if user.mfa_enabled {
            let Some(code) = mfa_code else {
                AuditEvent::new("mfa_required")
                    .actor(&user.id)
                    .client(client)
                    .details(json!({ "authId": auth_id }))
                    .emit();
                return Ok(AuthOutcome::MfaRequired { auth_id });
            };

            self.mfa_limiter
                .check(&format!("{}:{}", client.ip, user.id))
                .await?;

            let secret = user
                .mfa_secret
                .as_deref()
                .ok_or_else(|| AuthError::internal("MFA enabled but no secret on record"))?;

            if !mfa::verify_code(secret, code)? {
                AuditEvent::new("mfa_failed")
                    .actor(&user.id)
                    .client(client)
                    .details(json!({ "authId": auth_id }))
                    .emit();
                return Err(AuthError::authentication_failed("Invalid MFA code"));
            }
        }

        let tokens = self.generate_token_pair(&user, client).await?;

        AuditEvent::new("authentication_success")
            .actor(&user.id)
            .client(client)
            .details(json!({ "authId": auth_id }))
            .emit();

        Ok(AuthOutcome::Authenticated {
            user: user.sanitize(),
            tokens,
        })
    }

    /// Mints an access/refresh pair sharing one session and token id,
    /// and persists the session with TTL equal to the refresh lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or session persistence fails.
    pub async fn generate_token_pair(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> AuthResult<TokenPair> {
        let token_id = Uuid::new_v4().to_string();
        let session = Session::new(&user.id, &token_id, client, self.config.refresh_token_ttl);

        let access = TokenClaims::access(
            user,
            &session.session_id,
            &token_id,
            &self.config.issuer,
            &self.config.audience,
            self.config.access_token_ttl,
        );
        let refresh = TokenClaims::refresh(
            user,
            &session.session_id,
            &token_id,
            &self.config.issuer,
            &self.config.audience,
            self.config.refresh_token_ttl,
        );

        let access_token = self.signer.encode(&access)?;
        let refresh_token = self.signer.encode(&refresh)?;

        self.sessions.create(&session).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_in: self.config.access_token_ttl.as_secs(),
            refresh_token_expires_in: self.config.refresh_token_ttl.as_secs(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Verifies a token: signature, issuer/audience, type claim,
    /// blacklist absence, and session liveness. On success the session's
    /// `last_used` is updated (expiry is not extended).
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` on any failure; the specific cause goes to
    /// the audit log only.
    pub async fn verify_token(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> AuthResult<TokenClaims> {
        match self.verify_token_inner(token, token_type).await {
            Ok(claims) => Ok(claims),
            Err(err) => {
                AuditEvent::new("token_verification_failed")
                    .details(json!({
                        "tokenType": token_type.as_str(),
                        "reason": format!("{err:?}")
                    }))
                    .emit();
                Err(err)
            }
        }
    }

    async fn verify_token_inner(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> AuthResult<TokenClaims> {
        let claims = self.signer.decode(token, token_type)?;

        if self.revocations.is_revoked(&claims.token_id).await? {
            return Err(AuthError::token_invalid("token has been revoked"));
        }

        let session = self
            .sessions
            .get(&claims.session_id)
            .await?
            .ok_or_else(|| AuthError::token_invalid("session not found"))?;
        if !session.is_active {
            return Err(AuthError::token_invalid("session is deactivated"));
        }

        self.sessions.touch(&claims.session_id).await?;

        Ok(claims)
    }

    /// Issues a new access token from a valid refresh token.
    ///
    /// The new access token stays on the same session lineage with a
    /// fresh token id; the refresh token itself is **not** rotated.
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` if the refresh token fails verification,
    /// or `AuthenticationFailed` if the user no longer exists.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> AuthResult<RefreshedAccessToken> {
        let claims = self.verify_token(refresh_token, TokenType::Refresh).await?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::authentication_failed("Invalid credentials"))?;

        let token_id = Uuid::new_v4().to_string();
        let access = TokenClaims::access(
            &user,
            &claims.session_id,
            &token_id,
            &self.config.issuer,
            &self.config.audience,
            self.config.access_token_ttl,
        );
        let access_token = self.signer.encode(&access)?;

        AuditEvent::new("token_refreshed")
            .actor(&user.id)
            .client(client)
            .details(json!({ "sessionId": claims.session_id }))
            .emit();

        Ok(RefreshedAccessToken {
            access_token,
            access_token_expires_in: self.config.access_token_ttl.as_secs(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Revokes a token by blacklisting its token id for its remaining
    /// lifetime. Revoking a refresh token also deactivates the session,
    /// which invalidates every access token on that session even if its
    /// own signature and expiry are still good.
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` if the token fails verification.
    pub async fn revoke_token(&self, token: &str, token_type: TokenType) -> AuthResult<()> {
        let claims = self.verify_token(token, token_type).await?;

        self.revocations
            .revoke(&claims.token_id, claims.remaining_ttl())
            .await?;

        if token_type == TokenType::Refresh {
            self.sessions.deactivate(&claims.session_id).await?;
        }

        AuditEvent::new("token_revoked")
            .actor(&claims.sub)
            .details(json!({
                "tokenId": claims.token_id,
                "sessionId": claims.session_id,
                "tokenType": token_type.as_str()
            }))
            .emit();

        Ok(())
    }

    /// Enrolls a user in TOTP MFA.
    ///
    /// Returns the base32 secret, provisioning URI, and backup codes.
    /// Persisting the secret and consuming backup codes is the user
    /// store's responsibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or TOTP setup fails.
    pub async fn setup_mfa(&self, user_id: &str) -> AuthResult<MfaEnrollment> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::authentication_failed("Invalid credentials"))?;

        let enrollment = mfa::generate_enrollment(&self.config.mfa_issuer, &user.email)?;

        AuditEvent::new("mfa_enrolled").actor(&user.id).emit();
        Ok(enrollment)
    }

    /// The configured access token lifetime.
    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.config.access_token_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryUserRepository;
    use crate::types::user::{Role, hash_password};
    use hubgate_store::MemoryStore;

    const PASSWORD: &str = "correct horse battery staple";

    fn make_user(id: &str, email: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: hash_password(PASSWORD).unwrap(),
            role,
            mfa_enabled: false,
            mfa_secret: None,
        }
    }

    fn service_with_users(users: Vec<User>) -> JwtAuthService {
        let repo = InMemoryUserRepository::new();
        for user in users {
            repo.insert(user);
        }
        JwtAuthService::new(
            AuthConfig::default(),
            Arc::new(repo),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    fn client() -> ClientInfo {
        ClientInfo::from_ip("203.0.113.10").with_user_agent("tests")
    }

    async fn login(service: &JwtAuthService) -> (SafeUser, TokenPair) {
        match service
            .authenticate("ada@example.com", PASSWORD, None, &client())
            .await
            .unwrap()
        {
            AuthOutcome::Authenticated { user, tokens } => (user, tokens),
            AuthOutcome::MfaRequired { .. } => panic!("unexpected MFA challenge"),
        }
    }

    fn default_users() -> Vec<User> {
        vec![make_user("u-ada", "ada@example.com", Role::Manager)]
    }

    #[tokio::test]
    async fn test_authenticate_issues_pair_sharing_one_session() {
        let service = service_with_users(default_users());
        let (user, tokens) = login(&service).await;

        assert_eq!(user.id, "u-ada");
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.access_token_expires_in, 900);
        assert_eq!(tokens.refresh_token_expires_in, 604_800);

        let access = service
            .verify_token(&tokens.access_token, TokenType::Access)
            .await
            .unwrap();
        let refresh = service
            .verify_token(&tokens.refresh_token, TokenType::Refresh)
            .await
            .unwrap();

        assert_eq!(access.session_id, refresh.session_id);
        assert_eq!(access.token_id, refresh.token_id);
        assert_eq!(access.role, Some(Role::Manager));
    }

    #[tokio::test]
    async fn test_failures_are_generic() {
        let service = service_with_users(default_users());

        // Unknown user and wrong password produce the identical error,
        // so callers cannot enumerate accounts.
        let unknown = service
            .authenticate("nobody@example.com", PASSWORD, None, &client())
            .await
            .unwrap_err();
        let wrong = service
            .authenticate("ada@example.com", "wrong", None, &client())
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, AuthError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_sixth_login_attempt_is_rate_limited() {
        let service = service_with_users(default_users());

        for _ in 0..5 {
            let _ = service
                .authenticate("ada@example.com", "wrong", None, &client())
                .await;
        }

        // Correct credentials no longer matter.
        let err = service
            .authenticate("ada@example.com", PASSWORD, None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
        assert_eq!(
            err.retry_after(),
            Some(Duration::from_secs(900)),
            "block duration should be surfaced"
        );

        // A different IP is unaffected.
        let other = ClientInfo::from_ip("198.51.100.99");
        assert!(
            service
                .authenticate("ada@example.com", PASSWORD, None, &other)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_mfa_challenge_and_verification() {
        let enrollment = mfa::generate_enrollment("Hubgate", "ada@example.com").unwrap();
        let mut user = make_user("u-ada", "ada@example.com", Role::Admin);
        user.mfa_enabled = true;
        user.mfa_secret = Some(enrollment.secret.clone());
        let service = service_with_users(vec![user]);

        // No code: challenge, not tokens.
        let outcome = service
            .authenticate("ada@example.com", PASSWORD, None, &client())
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::MfaRequired { .. }));

        // Wrong code: generic failure.
        let err = service
            .authenticate("ada@example.com", PASSWORD, Some("000000"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));

        // Current code: authenticated.
        let secret = totp_rs::Secret::Encoded(enrollment.secret.clone())
            .to_bytes()
            .unwrap();
        let totp = totp_rs::TOTP::new(
            totp_rs::Algorithm::SHA1,
            6,
            2,
            30,
            secret,
            None,
            String::new(),
        )
        .unwrap();
        let code = totp.generate_current().unwrap();

        let outcome = service
            .authenticate("ada@example.com", PASSWORD, Some(&code), &client())
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_mfa_attempts_are_rate_limited_per_ip_and_user() {
        let enrollment = mfa::generate_enrollment("Hubgate", "ada@example.com").unwrap();
        let mut user = make_user("u-ada", "ada@example.com", Role::Admin);
        user.mfa_enabled = true;
        user.mfa_secret = Some(enrollment.secret);
        let service = service_with_users(vec![user]);

        for _ in 0..3 {
            let _ = service
                .authenticate("ada@example.com", PASSWORD, Some("000000"), &client())
                .await;
        }

        let err = service
            .authenticate("ada@example.com", PASSWORD, Some("000000"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1800)));
    }

    #[tokio::test]
    async fn test_refresh_keeps_session_and_does_not_rotate() {
        let service = service_with_users(default_users());
        let (_, tokens) = login(&service).await;

        let refreshed = service
            .refresh_access_token(&tokens.refresh_token, &client())
            .await
            .unwrap();

        let original = service
            .verify_token(&tokens.access_token, TokenType::Access)
            .await
            .unwrap();
        let new = service
            .verify_token(&refreshed.access_token, TokenType::Access)
            .await
            .unwrap();

        // Same session lineage, fresh token id.
        assert_eq!(new.session_id, original.session_id);
        assert_ne!(new.token_id, original.token_id);

        // The refresh token is still usable afterwards (no rotation in
        // this flow).
        assert!(
            service
                .refresh_access_token(&tokens.refresh_token, &client())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_revoking_refresh_cascades_to_access() {
        let service = service_with_users(default_users());
        let (_, tokens) = login(&service).await;

        // The access token is valid before revocation.
        assert!(
            service
                .verify_token(&tokens.access_token, TokenType::Access)
                .await
                .is_ok()
        );

        service
            .revoke_token(&tokens.refresh_token, TokenType::Refresh)
            .await
            .unwrap();

        // Session is deactivated, so the access token fails even though
        // its own signature and expiry are still valid.
        assert!(matches!(
            service
                .verify_token(&tokens.access_token, TokenType::Access)
                .await,
            Err(AuthError::TokenInvalid { .. })
        ));
        assert!(
            service
                .verify_token(&tokens.refresh_token, TokenType::Refresh)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_revoking_access_blacklists_pair_token_id() {
        let service = service_with_users(default_users());
        let (_, tokens) = login(&service).await;

        service
            .revoke_token(&tokens.access_token, TokenType::Access)
            .await
            .unwrap();

        assert!(
            service
                .verify_token(&tokens.access_token, TokenType::Access)
                .await
                .is_err()
        );
        // The pair shares one token id, so the blacklist catches the
        // refresh token too.
        assert!(
            service
                .verify_token(&tokens.refresh_token, TokenType::Refresh)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_garbage_token_collapses_to_token_invalid() {
        let service = service_with_users(default_users());
        let err = service
            .verify_token("not.a.jwt", TokenType::Access)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid { .. }));
        assert_eq!(err.to_string(), "Token is invalid");
    }

    #[tokio::test]
    async fn test_setup_mfa_returns_enrollment() {
        let service = service_with_users(default_users());
        let enrollment = service.setup_mfa("u-ada").await.unwrap();
        assert_eq!(enrollment.backup_codes.len(), 10);
        assert!(enrollment.provisioning_uri.contains("Hubgate"));

        assert!(service.setup_mfa("missing").await.is_err());
    }
}
