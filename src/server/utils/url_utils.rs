use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::error;

use crate::server::error::{AppResult, Error};

/// encode an absolute URL into the token carried by the `url` query
/// parameter: base64url over the UTF-8 bytes, no padding
pub fn encode_url(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// decode a `url` token; padded variants are tolerated
pub fn decode_url(token: &str) -> AppResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| {
            error!("Failed to decode base64 url token: {}", e);
            Error::BadRequest("Invalid URL encoding".to_string())
        })?;

    String::from_utf8(bytes).map_err(|e| {
        error!("Failed to parse url token as UTF-8: {}", e);
        Error::BadRequest("Invalid URL encoding".to_string())
    })
}

/// scheme + authority of an absolute URL, no trailing slash
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    let mut origin = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    Some(origin)
}

/// directory of a playlist URL: query stripped first, then cut after the
/// last `/` past the authority, keeping the trailing slash
pub fn base_directory(base: &str) -> String {
    let without_query = base.split('?').next().unwrap_or(base);

    if let (Ok(parsed), Some(origin)) = (url::Url::parse(without_query), origin_of(without_query))
    {
        let path = parsed.path();
        let dir = &path[..path.rfind('/').map(|i| i + 1).unwrap_or(0)];

        return if dir.is_empty() {
            format!("{}/", origin)
        } else {
            format!("{}{}", origin, dir)
        };
    }

    // unparseable base: best-effort string surgery, never fail the request
    let after_scheme = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    match without_query[after_scheme..].rfind('/') {
        Some(i) => without_query[..after_scheme + i + 1].to_string(),
        None => format!("{}/", without_query),
    }
}

/// resolve a playlist-embedded URI against the playlist's own URL
///
/// absolute URIs pass through, protocol-relative ones get https, rooted
/// paths keep the base's authority, everything else joins onto the base
/// directory; an unparseable base degrades to concatenation rather than
/// failing the request
pub fn resolve_url(uri: &str, base: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    if let Some(rest) = uri.strip_prefix("//") {
        return format!("https://{}", rest);
    }

    if uri.starts_with('/') {
        if let Some(origin) = origin_of(base) {
            return format!("{}{}", origin, uri);
        }

        let after_scheme = base.find("://").map(|i| i + 3).unwrap_or(0);
        let authority_end = base[after_scheme..]
            .find('/')
            .map(|i| after_scheme + i)
            .unwrap_or(base.len());
        return format!("{}{}", &base[..authority_end], uri);
    }

    format!("{}{}", base_directory(base), uri)
}

/// serialize a channel's custom headers into the `h` query token:
/// a JSON object, percent-encoded so it survives the query string
pub fn encode_headers(headers: &HashMap<String, String>) -> Option<String> {
    if headers.is_empty() {
        return None;
    }

    let json = serde_json::to_string(headers).ok()?;
    Some(urlencoding::encode(&json).into_owned())
}

/// decode an `h` token as it appeared on the wire; malformed tokens mean
/// "no custom headers", the descendant fetch still proceeds
pub fn decode_headers(token: &str) -> HashMap<String, String> {
    let Ok(decoded) = urlencoding::decode(token) else {
        return HashMap::new();
    };

    serde_json::from_str(&decoded).unwrap_or_default()
}
