// Authentication module
// Token decoding and the HTTP-only session cookie store

mod claims;
mod cookie;
mod types;

pub use claims::TokenDecoder;
pub use cookie::{
    append_set_cookies, clear_cookies, get_cookie, session_cookies, CookieOptions,
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME,
};
pub use types::{SessionInfo, SessionToken, TokenPair, TokenPayload, TokenType};
