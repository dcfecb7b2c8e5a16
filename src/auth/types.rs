// Session token types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Kind of token issued by the resume API
///
/// Encoded as a small integer in the `token_type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TokenType {
    AccessToken,
    RefreshToken,
    TableToken,
    EmailVerifyToken,
    ForgotPasswordToken,
}

impl TryFrom<u8> for TokenType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TokenType::AccessToken),
            1 => Ok(TokenType::RefreshToken),
            2 => Ok(TokenType::TableToken),
            3 => Ok(TokenType::EmailVerifyToken),
            4 => Ok(TokenType::ForgotPasswordToken),
            other => Err(format!("unknown token_type {}", other)),
        }
    }
}

impl From<TokenType> for u8 {
    fn from(value: TokenType) -> Self {
        match value {
            TokenType::AccessToken => 0,
            TokenType::RefreshToken => 1,
            TokenType::TableToken => 2,
            TokenType::EmailVerifyToken => 3,
            TokenType::ForgotPasswordToken => 4,
        }
    }
}

/// Decoded token claims
///
/// Recomputed from the token string whenever needed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub user_id: i64,
    pub token_type: TokenType,
    pub verify: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenPayload {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// Token pair as returned by the upstream login, signup and refresh endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Current session credentials, held in the HTTP-only cookie store
#[derive(Debug, Clone, PartialEq)]
pub struct SessionToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Expiry of the refresh token, when it could be decoded
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub user_id: i64,
}

impl SessionToken {
    /// Non-secret facts about the session, safe to hand to the client
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            user_id: self.user_id,
            expires_at: self.expires_at,
        }
    }
}

/// Session facts mirrored on the client side
///
/// The raw tokens stay in the cookie; only identity and expiry are exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}
