/// suffix -> canonical MIME for everything an HLS playlist commonly
/// references
const MEDIA_TYPES: [(&str, &str); 20] = [
    (".ts", "video/mp2t"),
    (".aac", "audio/aac"),
    (".mp4", "video/mp4"),
    (".m4s", "video/mp4"),
    (".fmp4", "video/mp4"),
    (".m4a", "audio/mp4"),
    (".mp3", "audio/mpeg"),
    (".vtt", "text/vtt"),
    (".webvtt", "text/vtt"),
    (".srt", "text/plain"),
    (".key", "application/octet-stream"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".webp", "image/webp"),
    (".gif", "image/gif"),
    (".woff", "font/woff"),
    (".woff2", "font/woff2"),
];

fn path_of(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_ascii_lowercase()
}

/// decide whether a fetched body is an HLS playlist
///
/// any of content-type, URL suffix, or (for entry fetches, where the body
/// is already in hand) a body sniff is enough; upstreams are sloppy about
/// all three
pub fn is_playlist(content_type: &str, url: &str, body: Option<&str>) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("mpegurl") || content_type.contains("m3u") {
        return true;
    }

    let path = path_of(url);
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return true;
    }

    match body {
        Some(body) => body.trim_start().starts_with("#EXTM3U") || body.contains("#EXT-X-"),
        None => false,
    }
}

/// MIME for a proxied media resource, keyed off the URL suffix; unknown
/// suffixes fall back to whatever the upstream claimed
pub fn media_mime(url: &str, fallback: Option<&str>) -> String {
    let path = path_of(url);

    for (suffix, mime) in MEDIA_TYPES {
        if path.ends_with(suffix) {
            return mime.to_string();
        }
    }

    match fallback {
        Some(content_type) if !content_type.is_empty() => content_type.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
