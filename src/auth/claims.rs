// Token decoding

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use super::types::{SessionToken, TokenPair, TokenPayload, TokenType};
use crate::error::ApiError;

/// Decodes and verifies tokens signed with the shared `SECRET_KEY`
#[derive(Clone)]
pub struct TokenDecoder {
    key: DecodingKey,
    validation: Validation,
}

impl TokenDecoder {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify signature and expiry, then check the token kind
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<TokenPayload, ApiError> {
        let data = decode::<TokenPayload>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::InvalidToken(e.to_string()))?;

        if data.claims.token_type != expected {
            return Err(ApiError::InvalidToken(format!(
                "expected {:?}, got {:?}",
                expected, data.claims.token_type
            )));
        }

        Ok(data.claims)
    }

    /// Build the session that a freshly issued token pair represents
    ///
    /// The access token must decode; the refresh token only contributes its
    /// expiry when it does.
    pub fn session_from_pair(&self, pair: TokenPair) -> Result<SessionToken, ApiError> {
        let access = self.decode(&pair.access_token, TokenType::AccessToken)?;

        let refresh_expires_at = match self.decode(&pair.refresh_token, TokenType::RefreshToken) {
            Ok(claims) => Some(claims.expires_at()),
            Err(e) => {
                tracing::debug!(error = %e, "Refresh token did not decode, using access expiry");
                None
            }
        };

        Ok(SessionToken {
            expires_at: access.expires_at(),
            user_id: access.user_id,
            access_token: pair.access_token,
            refresh_token: Some(pair.refresh_token),
            refresh_expires_at,
        })
    }
}
