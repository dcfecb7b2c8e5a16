// Session cookie reading and writing

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

use super::types::SessionToken;
use crate::error::ApiError;

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Attributes shared by every session cookie
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CookieOptions {
    /// Add the `Secure` attribute (own origin is https)
    pub secure: bool,
}

/// Find a cookie value in the request headers
///
/// Empty values are treated as absent.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Render one `Set-Cookie` value
fn render(name: &str, value: &str, max_age: i64, options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.max(0)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

/// `Set-Cookie` values that store a session
///
/// Both cookies go out in the same response so the pair is replaced as a unit.
pub fn session_cookies(
    session: &SessionToken,
    options: CookieOptions,
    now: DateTime<Utc>,
) -> Result<Vec<HeaderValue>, ApiError> {
    let mut cookies = vec![render(
        ACCESS_COOKIE_NAME,
        &session.access_token,
        seconds_until(session.expires_at, now),
        options,
    )];

    if let Some(ref refresh_token) = session.refresh_token {
        let refresh_expiry = session.refresh_expires_at.unwrap_or(session.expires_at);
        cookies.push(render(
            REFRESH_COOKIE_NAME,
            refresh_token,
            seconds_until(refresh_expiry, now),
            options,
        ));
    }

    cookies
        .into_iter()
        .map(|c| {
            HeaderValue::from_str(&c)
                .map_err(|e| ApiError::InvalidToken(format!("token is not cookie-safe: {}", e)))
        })
        .collect()
}

/// `Set-Cookie` values that delete the session
pub fn clear_cookies(options: CookieOptions) -> Vec<HeaderValue> {
    [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME]
        .iter()
        .map(|name| HeaderValue::from_str(&render(name, "", 0, options)))
        .filter_map(Result::ok)
        .collect()
}

/// Append `Set-Cookie` values to a response header map
pub fn append_set_cookies(headers: &mut HeaderMap, cookies: Vec<HeaderValue>) {
    for cookie in cookies {
        headers.append(header::SET_COOKIE, cookie);
    }
}
