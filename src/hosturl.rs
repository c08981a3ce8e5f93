//! URL rewriting for containers that need to reach services on the host.
//!
//! A localhost URL is unreachable from inside a container; Docker exposes
//! the host machine as `host.docker.internal` instead.

use reqwest::Url;

/// Whether `url` points at localhost or 127.x.x.x.
pub fn is_localhost_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(
            parsed.host_str(),
            Some(host) if host == "localhost" || host.starts_with("127.")
        ),
        Err(_) => false,
    }
}

/// Rewrite a localhost URL to use `host.docker.internal`. Non-localhost
/// URLs (and unparseable ones) pass through untouched.
pub fn to_container_host_url(url: &str) -> String {
    if !is_localhost_url(url) {
        return url.to_string();
    }

    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.set_host(Some("host.docker.internal")).is_err() {
                return url.to_string();
            }
            parsed.to_string().trim_end_matches('/').to_string()
        }
        Err(_) => url.to_string(),
    }
}
