//! Request-side helpers: who is calling, and where we may send or fetch from.

use axum::http::HeaderMap;
use url::Url;

pub const UNKNOWN_CLIENT: &str = "unknown";

const DEFAULT_REDIRECT_HOSTS: &[&str] = &["localhost:3000"];

const DEFAULT_IMAGE_HOSTS: &[&str] = &[
    "lh3.googleusercontent.com",
    "graph.facebook.com",
    "avatars.githubusercontent.com",
    "secure.gravatar.com",
];

/// Identifier used to key rate limits: the first `x-forwarded-for` hop,
/// then `x-real-ip`, then [`UNKNOWN_CLIENT`].
#[must_use]
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), str::to_string)
}

/// Allowlists for post-login redirects and proxied profile pictures.
///
/// A redirect entry containing `:` must match `host:port` exactly; otherwise
/// only the host is compared. Image entries always compare the host.
#[derive(Clone, Debug)]
pub struct UrlPolicy {
    redirect_hosts: Vec<String>,
    image_hosts: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            redirect_hosts: DEFAULT_REDIRECT_HOSTS.iter().map(|h| (*h).to_string()).collect(),
            image_hosts: DEFAULT_IMAGE_HOSTS.iter().map(|h| (*h).to_string()).collect(),
        }
    }
}

impl UrlPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_redirect_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redirect_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_image_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn redirect_hosts(&self) -> &[String] {
        &self.redirect_hosts
    }

    #[must_use]
    pub fn image_hosts(&self) -> &[String] {
        &self.image_hosts
    }

    #[must_use]
    pub fn is_valid_redirect(&self, url: &str) -> bool {
        let Some(parsed) = parse_web_url(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host_with_port = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        self.redirect_hosts.iter().any(|allowed| {
            if allowed.contains(':') {
                *allowed == host_with_port
            } else {
                allowed == host
            }
        })
    }

    #[must_use]
    pub fn is_trusted_image(&self, url: &str) -> bool {
        parse_web_url(url)
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .is_some_and(|host| self.image_hosts.iter().any(|allowed| *allowed == host))
    }
}

fn parse_web_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}
