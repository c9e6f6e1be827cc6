/// JWT Token Issuance and Validation
///
/// Both tokens of a pair are HS256-signed with the single process-wide secret.
/// Validation is a pure function of the token, the current time and the key.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use crate::auth::claims::{Claims, TokenIdentity, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Why a presented token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailure {
    Invalid,
    Expired,
}

impl TokenFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            TokenFailure::Invalid => "invalid token",
            TokenFailure::Expired => "expired token",
        }
    }
}

impl std::fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<TokenFailure> for AuthError {
    fn from(failure: TokenFailure) -> Self {
        match failure {
            TokenFailure::Invalid => AuthError::TokenInvalid,
            TokenFailure::Expired => AuthError::TokenExpired,
        }
    }
}

impl From<TokenFailure> for AppError {
    fn from(failure: TokenFailure) -> Self {
        AppError::Auth(failure.into())
    }
}

/// Signs and verifies session tokens
///
/// Built once at startup from `JwtSettings` and shared read-only by every
/// worker.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenIssuer {
    /// # Errors
    /// Returns `AppError::Config` when the secret is empty
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.trim().is_empty() {
            return Err(AppError::Config("JWT secret must not be empty".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
        })
    }

    /// Issue an access/refresh pair for `identity`, valid from now
    pub fn issue_token_pair(&self, identity: &TokenIdentity) -> Result<TokenPair, AppError> {
        self.issue_token_pair_at(identity, Utc::now())
    }

    /// Issue a pair as of `issued_at`
    ///
    /// # Errors
    /// Returns `AppError::Signing` if either token cannot be signed; no partial
    /// pair is ever returned.
    pub fn issue_token_pair_at(
        &self,
        identity: &TokenIdentity,
        issued_at: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let access_claims = Claims::new(
            identity,
            TokenKind::Access,
            issued_at,
            self.access_token_expiry,
            &self.issuer,
        );
        let refresh_claims = Claims::new(
            identity,
            TokenKind::Refresh,
            issued_at,
            self.refresh_token_expiry,
            &self.issuer,
        );

        let access_token = self.sign(&access_claims)?;
        let refresh_token = self.sign(&refresh_claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(user_id = %claims.sub, kind = ?claims.kind, "Token signing failed: {}", e);
            AppError::Signing(e.to_string())
        })
    }

    /// Validate a token against the current time
    pub fn validate(&self, token: &str) -> Result<Claims, TokenFailure> {
        self.validate_at(token, Utc::now())
    }

    /// Verify signature and issuer, then check expiry against `now`
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenFailure> {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked below against the supplied instant
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                TokenFailure::Invalid
            })?;

        if claims.is_expired_at(now) {
            return Err(TokenFailure::Expired);
        }

        Ok(claims)
    }

    /// Validate a token and require it to be of `kind`
    pub fn validate_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenFailure> {
        let claims = self.validate(token)?;
        if claims.kind != kind {
            tracing::warn!(user_id = %claims.sub, expected = ?kind, "Token presented for the wrong purpose");
            return Err(TokenFailure::Invalid);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use chrono::Duration;

    const WEEK: i64 = 604800;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: WEEK,
            refresh_token_expiry: WEEK,
            issuer: "test".to_string(),
        }
    }

    fn identity() -> TokenIdentity {
        TokenIdentity {
            user_id: "64b7f1c2".to_string(),
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_issue_and_validate_pair() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let pair = issuer.issue_token_pair(&identity()).expect("Failed to issue tokens");

        let access = issuer.validate(&pair.access_token).expect("access token is valid");
        assert_eq!(access.email, "a@x.com");
        assert_eq!(access.role, Role::Admin);
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.exp - access.iat, WEEK);

        let refresh = issuer.validate(&pair.refresh_token).expect("refresh token is valid");
        assert_eq!(refresh.sub, "64b7f1c2");
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_both_tokens_use_hs256() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let pair = issuer.issue_token_pair(&identity()).unwrap();

        for token in [&pair.access_token, &pair.refresh_token] {
            let header = jsonwebtoken::decode_header(token).unwrap();
            assert_eq!(header.alg, Algorithm::HS256);
        }
    }

    #[test]
    fn test_expiry_window() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let issued_at = Utc::now() - Duration::days(3);
        let pair = issuer.issue_token_pair_at(&identity(), issued_at).unwrap();

        let before = issued_at + Duration::seconds(WEEK - 1);
        assert!(issuer.validate_at(&pair.access_token, before).is_ok());

        let after = issued_at + Duration::seconds(WEEK + 1);
        assert_eq!(
            issuer.validate_at(&pair.access_token, after).unwrap_err(),
            TokenFailure::Expired
        );
    }

    #[test]
    fn test_expired_token_is_rejected_now() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let pair = issuer
            .issue_token_pair_at(&identity(), Utc::now() - Duration::days(8))
            .unwrap();

        assert_eq!(issuer.validate(&pair.access_token).unwrap_err(), TokenFailure::Expired);
        assert_eq!(TokenFailure::Expired.reason(), "expired token");
    }

    #[test]
    fn test_invalid_token() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        assert_eq!(
            issuer.validate("invalid.token.here").unwrap_err(),
            TokenFailure::Invalid
        );
        assert_eq!(issuer.validate("").unwrap_err(), TokenFailure::Invalid);
    }

    #[test]
    fn test_tampered_token() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let pair = issuer.issue_token_pair(&identity()).unwrap();

        let tampered = format!("{}X", pair.access_token);
        assert_eq!(issuer.validate(&tampered).unwrap_err(), TokenFailure::Invalid);
    }

    #[test]
    fn test_token_signed_with_other_secret() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let mut other_config = get_test_config();
        other_config.secret = "a-completely-different-signing-secret".to_string();
        let other = TokenIssuer::new(&other_config).unwrap();

        let pair = other.issue_token_pair(&identity()).unwrap();
        let failure = issuer.validate(&pair.access_token).unwrap_err();
        assert_eq!(failure, TokenFailure::Invalid);
        assert_eq!(failure.to_string(), "invalid token");
    }

    #[test]
    fn test_wrong_issuer() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let mut config = get_test_config();
        config.issuer = "wrong-issuer".to_string();
        let other = TokenIssuer::new(&config).unwrap();

        let pair = issuer.issue_token_pair(&identity()).unwrap();
        assert_eq!(other.validate(&pair.access_token).unwrap_err(), TokenFailure::Invalid);
    }

    #[test]
    fn test_validate_kind() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let pair = issuer.issue_token_pair(&identity()).unwrap();

        assert!(issuer.validate_kind(&pair.access_token, TokenKind::Access).is_ok());
        assert!(issuer.validate_kind(&pair.refresh_token, TokenKind::Refresh).is_ok());
        assert_eq!(
            issuer.validate_kind(&pair.refresh_token, TokenKind::Access).unwrap_err(),
            TokenFailure::Invalid
        );
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut config = get_test_config();
        config.secret = String::new();
        assert!(matches!(TokenIssuer::new(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_consecutive_pairs_differ() {
        let issuer = TokenIssuer::new(&get_test_config()).unwrap();
        let now = Utc::now();
        let first = issuer.issue_token_pair_at(&identity(), now).unwrap();
        let second = issuer.issue_token_pair_at(&identity(), now).unwrap();
        assert_ne!(first, second);
    }
}
