use once_cell::sync::Lazy;
use regex::Regex;

use super::url_utils;

/// matches `URI="..."` attributes inside tag lines, tolerant of attribute
/// case and optional whitespace around `=`
static RE_URI_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)URI\s*=\s*"([^"]*)""#).expect("valid URI attribute regex"));

/// everything the rewriter needs besides the playlist body itself
pub struct RewriteContext<'a> {
    /// URL the playlist bytes were actually fetched from (after any
    /// redirects); relative URIs resolve against it
    pub base_url: &'a str,
    /// scheme://authority of the proxy as the client sees it
    pub proxy_origin: &'a str,
    /// percent-encoded headers token, re-emitted verbatim on every
    /// rewritten URL so descendants fetch with the same header set
    pub headers_token: Option<&'a str>,
}

/// the encoded-resource URL for one target URI
pub fn proxied_url(target: &str, ctx: &RewriteContext) -> String {
    let resolved = url_utils::resolve_url(target, ctx.base_url);

    let mut out = format!(
        "{}/api/proxy/s?url={}",
        ctx.proxy_origin,
        url_utils::encode_url(&resolved)
    );

    if let Some(token) = ctx.headers_token {
        out.push_str("&h=");
        out.push_str(token);
    }

    out
}

/// rewrite a playlist so every URI it references routes back through the
/// proxy
///
/// strictly line-oriented: bare URI lines and quoted `URI="…"` attributes
/// are the only places HLS puts URIs, every other line passes through
/// untouched, which keeps this independent of the tag grammar
pub fn rewrite_playlist(body: &str, ctx: &RewriteContext) -> String {
    body.split('\n')
        .map(|line| {
            let trimmed = line.trim_end();

            if trimmed.starts_with('#') {
                if RE_URI_ATTR.is_match(trimmed) {
                    return RE_URI_ATTR
                        .replace_all(trimmed, |caps: &regex::Captures| {
                            format!(r#"URI="{}""#, proxied_url(&caps[1], ctx))
                        })
                        .into_owned();
                }
                return line.to_string();
            }

            if trimmed.is_empty() {
                return line.to_string();
            }

            proxied_url(trimmed.trim(), ctx)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(headers_token: Option<&'a str>) -> RewriteContext<'a> {
        RewriteContext {
            base_url: "https://cdn.example.com/a/b/live.m3u8",
            proxy_origin: "http://p",
            headers_token,
        }
    }

    #[test]
    fn bare_uri_lines_are_proxied() {
        let body = "#EXTM3U\n#EXTINF:6,\nseg1.ts\n";
        let out = rewrite_playlist(body, &ctx(None));

        let expected_token = url_utils::encode_url("https://cdn.example.com/a/b/seg1.ts");
        assert_eq!(
            out,
            format!("#EXTM3U\n#EXTINF:6,\nhttp://p/api/proxy/s?url={expected_token}\n")
        );
    }

    #[test]
    fn key_uri_attributes_are_proxied_in_place() {
        let body = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x01";
        let out = rewrite_playlist(body, &ctx(None));

        let expected_token = url_utils::encode_url("https://cdn.example.com/a/b/key.bin");
        assert_eq!(
            out,
            format!("#EXT-X-KEY:METHOD=AES-128,URI=\"http://p/api/proxy/s?url={expected_token}\",IV=0x01")
        );
    }

    #[test]
    fn every_uri_attribute_on_a_line_is_rewritten_once() {
        let body = "#EXT-X-CUSTOM:URI=\"a.ts\",OTHER-URI=\"b.ts\"";
        let out = rewrite_playlist(body, &ctx(None));

        assert_eq!(out.matches("URI=\"http://p/api/proxy/s?url=").count(), 2);
    }

    #[test]
    fn uri_attribute_matching_ignores_case_and_spacing() {
        let body = "#EXT-X-MEDIA:TYPE=AUDIO,uri = \"audio/en.m3u8\"";
        let out = rewrite_playlist(body, &ctx(None));

        assert!(out.contains("URI=\"http://p/api/proxy/s?url="));
        assert!(!out.contains("audio/en.m3u8\""));
    }

    #[test]
    fn comments_and_blank_lines_pass_through() {
        let body = "#EXTM3U\n\n#EXT-X-VERSION:3\n# just a comment\n";
        assert_eq!(rewrite_playlist(body, &ctx(None)), body);
    }

    #[test]
    fn headers_token_is_appended_to_every_rewritten_url() {
        let body = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\nseg1.ts";
        let out = rewrite_playlist(body, &ctx(Some("%7B%22a%22%3A%22b%22%7D")));

        assert_eq!(out.matches("&h=%7B%22a%22%3A%22b%22%7D").count(), 2);
    }

    #[test]
    fn rewritten_bare_lines_decode_back_to_absolute_urls() {
        let body = "#EXTM3U\nseg1.ts\n../c/seg2.ts\n/root/seg3.ts\n//cdn2.example.com/seg4.ts\nhttps://cdn3.example.com/seg5.ts";
        let out = rewrite_playlist(body, &ctx(None));

        for line in out.lines().filter(|l| !l.starts_with('#') && !l.is_empty()) {
            let token = line
                .strip_prefix("http://p/api/proxy/s?url=")
                .expect("rewritten line should hit the encoded-resource route");
            let decoded = url_utils::decode_url(token).expect("token should decode");
            assert!(
                decoded.starts_with("http://") || decoded.starts_with("https://"),
                "decoded target should be absolute: {decoded}"
            );
        }
    }

    #[test]
    fn trailing_whitespace_on_uri_lines_is_trimmed() {
        let body = "seg1.ts   ";
        let out = rewrite_playlist(body, &ctx(None));
        assert!(out.ends_with(&url_utils::encode_url("https://cdn.example.com/a/b/seg1.ts")));
    }
}
