use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::Result;

/// Request content type, as named by block-list options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Script,
    Image,
    Stylesheet,
    Object,
    ObjectSubrequest,
    Subdocument,
    XmlHttpRequest,
    Media,
    Font,
    Ping,
    WebSocket,
    Popup,
    Document,
    Other,
}

impl ContentType {
    /// Look up a content type by its option name (e.g. "script", "xmlhttprequest")
    pub fn from_option(name: &str) -> Option<Self> {
        let ty = match name {
            "script" => ContentType::Script,
            "image" => ContentType::Image,
            "stylesheet" => ContentType::Stylesheet,
            "object" => ContentType::Object,
            "object-subrequest" | "object_subrequest" => ContentType::ObjectSubrequest,
            "subdocument" => ContentType::Subdocument,
            "xmlhttprequest" | "xhr" => ContentType::XmlHttpRequest,
            "media" => ContentType::Media,
            "font" => ContentType::Font,
            "ping" => ContentType::Ping,
            "websocket" => ContentType::WebSocket,
            "popup" => ContentType::Popup,
            "document" => ContentType::Document,
            "other" => ContentType::Other,
            _ => return None,
        };
        Some(ty)
    }
}

/// Projection of an inbound HTTP request used for a single allow check
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Full request URL
    pub url: String,
    /// Request host, lowercased and without port
    pub domain: String,
    /// Host of the `Origin` header, lowercased and without port
    pub origin_domain: Option<String>,
    /// Content type, when the caller knows it
    pub content_type: Option<ContentType>,
}

impl Request {
    /// Create a request from an absolute URL. The host is taken from the URL.
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let domain = parsed.host_str().map(normalize_host).unwrap_or_default();
        Ok(Self {
            url: parsed.to_string(),
            domain,
            origin_domain: None,
            content_type: None,
        })
    }

    /// Create a request from an already-split host header, URL and optional
    /// `Origin` header value.
    pub fn from_parts(host: &str, url: impl Into<String>, origin: Option<&str>) -> Self {
        Self {
            url: url.into(),
            domain: normalize_host(host),
            origin_domain: origin.and_then(domain_from_origin),
            content_type: None,
        }
    }

    /// Set the `Origin` header. Unparsable or empty origins are treated as absent.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin_domain = domain_from_origin(origin);
        self
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

/// Counters for one refresh cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStats {
    /// Rules inserted into a domain bucket or the fallback matcher
    pub added: usize,
    /// Rules dropped by classification or rejected by the matcher
    pub skipped: usize,
    /// Distinct anchor domains in the published index
    pub domains: usize,
    /// Rules held by the fallback matcher
    pub fallback_rules: usize,
}

/// Lowercase a host, strip any port and trailing dot. Internationalized
/// names are converted to their punycode form, as URL parsing does.
pub fn normalize_host(host: &str) -> String {
    let host = without_port(host.trim()).trim_end_matches('.');
    if host.is_ascii() {
        return host.to_ascii_lowercase();
    }
    match Host::parse(host) {
        Ok(Host::Domain(domain)) => domain,
        _ => host.to_lowercase(),
    }
}

/// Strip the port from a `host:port` string. IPv6 literals keep their address
/// without brackets; a bare IPv6 address is returned unchanged.
pub fn without_port(hostport: &str) -> &str {
    if let Some(rest) = hostport.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => hostport,
        };
    }
    match hostport.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => hostport,
    }
}

/// Extract the normalized host from an `Origin` header value such as
/// `https://example.com:8443`.
pub fn domain_from_origin(origin: &str) -> Option<String> {
    let origin = origin.trim();
    if origin.is_empty() || origin == "null" {
        return None;
    }
    let parsed = Url::parse(origin).ok()?;
    let host = parsed.host_str()?;
    let host = normalize_host(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
