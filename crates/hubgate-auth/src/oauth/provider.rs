//! The OAuth 2.0 provider.
//!
//! Client registration, the authorization-code flow with PKCE, the
//! client-credentials and refresh-token grants, introspection, and
//! revocation. All records live in the shared store; authorization
//! codes are redeemed with an atomic consume-and-delete so concurrent
//! redemption of one code yields at most one success.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use hubgate_core::AuditEvent;
use hubgate_store::{KeyValueStore, KeyValueStoreExt, RateLimiter};

use crate::AuthResult;
use crate::config::OAuth2Config;
use crate::error::AuthError;
use crate::oauth::client::{
    ClientRegistration, GrantType, OAuth2Client, RegisteredClient, generate_client_id,
    generate_client_secret,
};
use crate::oauth::pkce;
use crate::oauth::records::{
    AuthorizationCode, AuthorizationRequest, StoredRefreshToken, generate_opaque_token,
};
use crate::oauth::scopes;
use crate::oauth::token::{
    AuthorizeRequest, ClientSummary, ConsentPayload, IntrospectionResponse, ScopeDescription,
    TokenRequest, TokenResponse,
};
use crate::storage::{RevocationKeying, RevocationStore};

/// Claims of an OAuth2 access token (HS256).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OAuthAccessClaims {
    /// User id, or the client id for client-credentials tokens.
    sub: String,
    client_id: String,
    scope: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Outcome of a consent decision.
#[derive(Debug, Clone)]
pub enum ConsentOutcome {
    /// The user approved; deliver the code via redirect.
    Granted {
        /// The single-use authorization code.
        code: String,
        /// Echoed client state.
        state: Option<String>,
        /// Redirect URI to deliver the code to.
        redirect_uri: String,
    },
    /// The user denied the request.
    Denied {
        /// Always `access_denied`.
        error: &'static str,
        /// Human-readable description.
        error_description: &'static str,
    },
}

/// The OAuth 2.0 authorization server.
pub struct OAuth2Provider {
    config: OAuth2Config,
    store: Arc<dyn KeyValueStore>,
    revocations: RevocationStore,
    authorize_limiter: RateLimiter,
    token_limiter: RateLimiter,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl OAuth2Provider {
    /// Creates the provider over the shared store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: OAuth2Config, store: Arc<dyn KeyValueStore>) -> AuthResult<Self> {
        config.validate()?;

        let revocations = RevocationStore::new(store.clone(), RevocationKeying::RawToken);
        let authorize_limiter = RateLimiter::new(
            store.clone(),
            "oauth:authorize",
            config.authorize_limit,
        );
        let token_limiter =
            RateLimiter::new(store.clone(), "oauth:token", config.token_limit);
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Ok(Self {
            config,
            store,
            revocations,
            authorize_limiter,
            token_limiter,
            encoding_key,
            decoding_key,
        })
    }

    fn client_key(client_id: &str) -> String {
        format!("oauth:client:{client_id}")
    }

    fn request_key(auth_request_id: &str) -> String {
        format!("oauth:authreq:{auth_request_id}")
    }

    fn code_key(code: &str) -> String {
        format!("oauth:code:{code}")
    }

    fn refresh_key(token: &str) -> String {
        // Refresh tokens are stored under a digest, never the raw value.
        format!("oauth:refresh:{}", hex::encode(Sha256::digest(token.as_bytes())))
    }

    // =========================================================================
    // Client Registration
    // =========================================================================

    /// Registers a new OAuth2 client.
    ///
    /// The secret is returned here once and never expires.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the registration is malformed.
    pub async fn register_client(
        &self,
        registration: &ClientRegistration,
    ) -> AuthResult<RegisteredClient> {
        registration.validate()?;

        let client_id = generate_client_id();
        let client_secret = generate_client_secret();

        let client = OAuth2Client {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            client_name: registration.client_name.clone(),
            redirect_uris: registration.redirect_uris.clone(),
            grant_types: registration
                .grant_types
                .clone()
                .unwrap_or_else(|| vec![GrantType::AuthorizationCode]),
            response_types: registration
                .response_types
                .clone()
                .unwrap_or_else(|| vec!["code".to_string()]),
            scope: registration
                .scope
                .clone()
                .unwrap_or_else(|| scopes::DEFAULT_SCOPE.to_string()),
            created_at: OffsetDateTime::now_utc(),
            is_active: true,
        };

        self.store
            .put_json(&Self::client_key(&client_id), &client, None)
            .await?;

        AuditEvent::new("oauth_client_registered")
            .details(json!({
                "clientId": client_id,
                "clientName": client.client_name,
                "grantTypes": client.grant_types
            }))
            .emit();

        Ok(RegisteredClient {
            client_id,
            client_secret,
            client_id_issued_at: OffsetDateTime::now_utc().unix_timestamp(),
            client_secret_expires_at: 0,
        })
    }

    /// Looks up a client registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_client(&self, client_id: &str) -> AuthResult<Option<OAuth2Client>> {
        Ok(self.store.get_json(&Self::client_key(client_id)).await?)
    }

    async fn authenticate_client(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> AuthResult<OAuth2Client> {
        let client_id = client_id.ok_or_else(|| AuthError::invalid_client("missing client_id"))?;
        let client_secret =
            client_secret.ok_or_else(|| AuthError::invalid_client("missing client_secret"))?;

        let client = self
            .get_client(client_id)
            .await?
            .filter(|client| client.is_active)
            .ok_or_else(|| AuthError::invalid_client("unknown or inactive client"))?;

        if client.client_secret != client_secret {
            return Err(AuthError::invalid_client("invalid client credentials"));
        }

        Ok(client)
    }

    // =========================================================================
    // Authorization Endpoint
    // =========================================================================

    /// Validates an authorization request and stores it pending consent.
    ///
    /// No code is issued yet; the returned payload drives the consent
    /// screen. Unknown scopes are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` (10/min/ip), `Validation` for missing
    /// parameters or a bad PKCE method, `InvalidClient` for unknown or
    /// inactive clients, `InvalidGrant` for a redirect URI mismatch, or
    /// `UnsupportedResponseType`.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        ip: &str,
    ) -> AuthResult<ConsentPayload> {
        self.authorize_limiter.check(ip).await?;

        if request.client_id.is_empty()
            || request.redirect_uri.is_empty()
            || request.response_type.is_empty()
        {
            return Err(AuthError::validation(
                "client_id, redirect_uri and response_type are required",
            ));
        }

        let client = self
            .get_client(&request.client_id)
            .await?
            .filter(|client| client.is_active)
            .ok_or_else(|| AuthError::invalid_client("unknown or inactive client"))?;

        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_grant("redirect_uri is not registered"));
        }

        if request.response_type != "code" {
            return Err(AuthError::unsupported_response_type(&request.response_type));
        }

        if request.code_challenge.is_some() {
            let method = request
                .code_challenge_method
                .as_deref()
                .ok_or_else(|| AuthError::validation("code_challenge_method is required"))?;
            pkce::validate_method(method)?;
        }

        let granted = scopes::filter(request.scope.as_deref().unwrap_or_default());

        let auth_request_id = Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc();
        let record = AuthorizationRequest {
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            response_type: request.response_type.clone(),
            scope: granted.join(" "),
            state: request.state.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            created_at: now,
            expires_at: now + self.config.authorization_code_ttl,
        };

        self.store
            .put_json(
                &Self::request_key(&auth_request_id),
                &record,
                Some(self.config.authorization_code_ttl),
            )
            .await?;

        Ok(ConsentPayload {
            auth_request_id,
            client: ClientSummary {
                name: client.client_name,
                id: client.client_id,
            },
            scopes: granted
                .iter()
                .map(|scope| ScopeDescription {
                    name: scope.clone(),
                    description: scopes::describe(scope).unwrap_or(scope).to_string(),
                })
                .collect(),
            redirect_uri: request.redirect_uri.clone(),
            state: request.state.clone(),
        })
    }

    /// Applies the user's consent decision to a pending authorization
    /// request. The pending request is deleted either way; approval
    /// mints a single-use authorization code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` if the request is unknown or expired.
    pub async fn handle_consent(
        &self,
        auth_request_id: &str,
        user_id: &str,
        approved: bool,
    ) -> AuthResult<ConsentOutcome> {
        // take() removes the pending request whatever the decision is.
        let request: AuthorizationRequest = self
            .store
            .take_json(&Self::request_key(auth_request_id))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("unknown or expired authorization request"))?;

        if request.is_expired() {
            return Err(AuthError::invalid_grant("authorization request expired"));
        }

        if !approved {
            AuditEvent::new("oauth_consent_denied")
                .actor(user_id)
                .details(json!({ "clientId": request.client_id }))
                .emit();
            return Ok(ConsentOutcome::Denied {
                error: "access_denied",
                error_description: "User denied the request",
            });
        }

        let code = generate_opaque_token();
        let now = OffsetDateTime::now_utc();
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: request.client_id.clone(),
            user_id: user_id.to_string(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            code_challenge: request.code_challenge.clone(),
            created_at: now,
            expires_at: now + self.config.authorization_code_ttl,
        };

        self.store
            .put_json(
                &Self::code_key(&code),
                &record,
                Some(self.config.authorization_code_ttl),
            )
            .await?;

        AuditEvent::new("oauth_code_issued")
            .actor(user_id)
            .details(json!({
                "clientId": request.client_id,
                "scope": request.scope
            }))
            .emit();

        Ok(ConsentOutcome::Granted {
            code,
            state: request.state,
            redirect_uri: request.redirect_uri,
        })
    }

    // =========================================================================
    // Token Endpoint
    // =========================================================================

    /// Handles a token request for any supported grant type.
    ///
    /// The client is authenticated with `client_id` + `client_secret`
    /// regardless of grant.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` (30/min/ip), `UnsupportedGrantType`,
    /// `InvalidClient`, `InvalidGrant`, or `Validation` per RFC 6749.
    pub async fn token(&self, request: &TokenRequest, ip: &str) -> AuthResult<TokenResponse> {
        self.token_limiter.check(ip).await?;

        let grant = GrantType::parse(&request.grant_type)?;
        let client = self
            .authenticate_client(request.client_id.as_deref(), request.client_secret.as_deref())
            .await?;

        let response = match grant {
            GrantType::AuthorizationCode => {
                self.authorization_code_grant(request, &client).await?
            }
            GrantType::ClientCredentials => {
                self.client_credentials_grant(request, &client).await?
            }
            GrantType::RefreshToken => self.refresh_token_grant(request, &client).await?,
        };

        AuditEvent::new("oauth_token_issued")
            .ip(ip)
            .details(json!({
                "grantType": grant.as_str(),
                "clientId": client.client_id,
                "scope": response.scope
            }))
            .emit();

        Ok(response)
    }

    async fn authorization_code_grant(
        &self,
        request: &TokenRequest,
        client: &OAuth2Client,
    ) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::validation("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| AuthError::validation("redirect_uri is required"))?;

        // Atomic consume-and-delete: under concurrent redemption of the
        // same code, at most one caller gets the record.
        let record: AuthorizationCode = self
            .store
            .take_json(&Self::code_key(code))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("invalid authorization code"))?;

        if record.is_expired() {
            return Err(AuthError::invalid_grant("authorization code expired"));
        }
        if record.client_id != client.client_id {
            return Err(AuthError::invalid_grant("code was issued to another client"));
        }
        if record.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_grant("redirect_uri mismatch"));
        }

        if let Some(challenge) = &record.code_challenge {
            let verifier = request
                .code_verifier
                .as_deref()
                .ok_or_else(|| AuthError::invalid_grant("code_verifier is required"))?;
            if !pkce::verify(challenge, verifier) {
                return Err(AuthError::invalid_grant("invalid code_verifier"));
            }
        }

        self.issue_token_pair(&client.client_id, Some(&record.user_id), &record.scope)
            .await
    }

    async fn client_credentials_grant(
        &self,
        request: &TokenRequest,
        client: &OAuth2Client,
    ) -> AuthResult<TokenResponse> {
        if !client.is_grant_allowed(GrantType::ClientCredentials) {
            return Err(AuthError::invalid_grant(
                "client is not registered for client_credentials",
            ));
        }

        let requested = request.scope.as_deref().unwrap_or(scopes::DEFAULT_SCOPE);
        let granted = scopes::filter(requested).join(" ");

        // No user binding and no refresh token for machine tokens.
        let access_token = self.mint_access_token(&client.client_id, None, &granted)?;
        Ok(TokenResponse::new(
            access_token,
            self.config.access_token_ttl.as_secs(),
            granted,
        ))
    }

    async fn refresh_token_grant(
        &self,
        request: &TokenRequest,
        client: &OAuth2Client,
    ) -> AuthResult<TokenResponse> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::validation("refresh_token is required"))?;

        let key = Self::refresh_key(refresh_token);
        let record: StoredRefreshToken = self
            .store
            .get_json(&key)
            .await?
            .filter(|record: &StoredRefreshToken| record.client_id == client.client_id)
            .ok_or_else(|| AuthError::invalid_grant("invalid refresh token"))?;

        // Rotation is enforced in this flow: the old record dies with
        // the exchange.
        self.store.delete(&key).await?;

        self.issue_token_pair(&client.client_id, record.user_id.as_deref(), &record.scope)
            .await
    }

    async fn issue_token_pair(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        scope: &str,
    ) -> AuthResult<TokenResponse> {
        let access_token = self.mint_access_token(client_id, user_id, scope)?;
        let refresh_token = generate_opaque_token();

        let now = OffsetDateTime::now_utc();
        let record = StoredRefreshToken {
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            scope: scope.to_string(),
            created_at: now,
            expires_at: now + self.config.refresh_token_ttl,
        };
        self.store
            .put_json(
                &Self::refresh_key(&refresh_token),
                &record,
                Some(self.config.refresh_token_ttl),
            )
            .await?;

        Ok(TokenResponse::new(
            access_token,
            self.config.access_token_ttl.as_secs(),
            scope.to_string(),
        )
        .with_refresh_token(refresh_token))
    }

    fn mint_access_token(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        scope: &str,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = OAuthAccessClaims {
            sub: user_id.unwrap_or(client_id).to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now,
            exp: now + self.config.access_token_ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("token encoding failed: {e}")))
    }

    // =========================================================================
    // Introspection and Revocation
    // =========================================================================

    /// Introspects an access token (RFC 7662).
    ///
    /// Never raises to the caller: any failure (unknown client, bad
    /// signature, expiry, revocation) yields `{active: false}`.
    pub async fn introspect(&self, token: &str, client_id: &str) -> IntrospectionResponse {
        let Ok(Some(_client)) = self.get_client(client_id).await else {
            return IntrospectionResponse::inactive();
        };

        if self.revocations.is_revoked(token).await.unwrap_or(true) {
            return IntrospectionResponse::inactive();
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        match decode::<OAuthAccessClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => IntrospectionResponse {
                active: true,
                sub: Some(data.claims.sub),
                client_id: Some(data.claims.client_id),
                scope: Some(data.claims.scope),
                exp: Some(data.claims.exp),
                iat: Some(data.claims.iat),
            },
            Err(_) => IntrospectionResponse::inactive(),
        }
    }

    /// Revokes a token (RFC 7009).
    ///
    /// Refresh tokens are deleted from the store; access tokens are
    /// blacklisted by raw token for their remaining lifetime. Unknown or
    /// malformed tokens succeed silently so revocation never reveals
    /// token existence.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn revoke(
        &self,
        token: &str,
        token_type_hint: Option<crate::oauth::token::TokenTypeHint>,
    ) -> AuthResult<()> {
        use crate::oauth::token::TokenTypeHint;

        match token_type_hint {
            Some(TokenTypeHint::RefreshToken) => {
                self.store.delete(&Self::refresh_key(token)).await?;
            }
            _ => {
                // Signature must match (we minted it); expiry may not.
                let mut validation = Validation::new(Algorithm::HS256);
                validation.set_issuer(&[&self.config.issuer]);
                validation.set_audience(&[&self.config.audience]);
                validation.validate_exp = false;

                if let Ok(data) =
                    decode::<OAuthAccessClaims>(token, &self.decoding_key, &validation)
                {
                    let remaining = data.claims.exp - OffsetDateTime::now_utc().unix_timestamp();
                    if remaining > 0 {
                        self.revocations
                            .revoke(token, std::time::Duration::from_secs(remaining as u64))
                            .await?;
                    }
                }
            }
        }

        AuditEvent::new("oauth_token_revoked")
            .details(json!({
                "tokenTypeHint": token_type_hint.map(|hint| hint.as_str())
            }))
            .emit();

        Ok(())
    }
}
