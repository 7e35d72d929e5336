//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides helpers for working with
//! connection strings that embed credentials.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Render a connection URL for logs with the password replaced.
///
/// `postgres://koala:ko4la@db:5432/koala` becomes
/// `postgres://koala:***@db:5432/koala`. URLs without credentials are
/// returned unchanged.
pub fn redacted_url(url: &SecretString) -> String {
    let raw = url.expose_secret();
    let Some((scheme, rest)) = raw.split_once("://") else {
        return "***".to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => raw.to_string(),
    }
}
