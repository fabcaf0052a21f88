// end-to-end coverage: a local fixture upstream plus the real proxy app,
// both on ephemeral listeners, driven over plain HTTP
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderMap, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use hls_relay::{AppConfig, ApplicationServer, Channel, MemoryChannelsRepository, ProxyServices};

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MEDIA_PLAYLIST: &str = "#EXTM3U\n#EXTINF:6,\nseg1.ts\n";
const KEYED_PLAYLIST: &str = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:6,\nseg1.ts\n";

fn segment_payload() -> Vec<u8> {
    // ~300 KB of patterned bytes, enough to span several body chunks
    (0..300_000usize).map(|i| (i % 251) as u8).collect()
}

fn guarded_token_ok(headers: &HeaderMap) -> bool {
    headers
        .get("x-stream-token")
        .and_then(|v| v.to_str().ok())
        == Some("tok123")
}

fn upstream_router() -> Router {
    Router::new()
        .route(
            "/a/b/live.m3u8",
            get(|| async {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, HLS_CONTENT_TYPE)],
                    MEDIA_PLAYLIST,
                )
            }),
        )
        .route(
            "/a/b/keyed.m3u8",
            get(|| async {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, HLS_CONTENT_TYPE)],
                    KEYED_PLAYLIST,
                )
            }),
        )
        .route(
            "/a/b/seg1.ts",
            get(|| async {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "video/mp2t")],
                    segment_payload(),
                )
            }),
        )
        .route(
            "/redirect.m3u8",
            get(|| async {
                (
                    StatusCode::FOUND,
                    [(header::LOCATION, "/a/b/live.m3u8")],
                    "",
                )
            }),
        )
        .route(
            "/raw.mp4",
            get(|| async {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "video/mp4")],
                    b"mp4 payload, close enough".to_vec(),
                )
            }),
        )
        .route(
            "/guarded/stream.m3u8",
            get(|headers: HeaderMap| async move {
                if guarded_token_ok(&headers) {
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, HLS_CONTENT_TYPE)],
                        MEDIA_PLAYLIST,
                    )
                        .into_response()
                } else {
                    (StatusCode::FORBIDDEN, "missing token").into_response()
                }
            }),
        )
        .route(
            "/guarded/seg1.ts",
            get(|headers: HeaderMap| async move {
                if guarded_token_ok(&headers) {
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "video/mp2t")],
                        segment_payload(),
                    )
                        .into_response()
                } else {
                    (StatusCode::FORBIDDEN, "missing token").into_response()
                }
            }),
        )
        .route(
            "/branded/stream.m3u8",
            get(|headers: HeaderMap| async move {
                // the channel overrides must arrive as the only value for
                // their header, not appended next to the browser defaults
                let referers: Vec<_> = headers.get_all(header::REFERER).iter().collect();
                let agents: Vec<_> = headers.get_all(header::USER_AGENT).iter().collect();

                if referers.len() == 1
                    && referers[0] == "https://embed.example/"
                    && agents.len() == 1
                    && agents[0] == "CustomPlayer/2.1"
                {
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, HLS_CONTENT_TYPE)],
                        MEDIA_PLAYLIST,
                    )
                        .into_response()
                } else {
                    (StatusCode::FORBIDDEN, "wrong browser fingerprint").into_response()
                }
            }),
        )
}

/// bind on 127.0.0.1:0, serve in the background, hand back the base URL
async fn serve(app: Router) -> String {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
    listener
        .set_nonblocking(true)
        .expect("failed to set nonblocking on test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::from_std(listener)
            .expect("failed to convert test listener");
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn channel(id: &str, url: String, headers: Option<HashMap<String, String>>) -> Channel {
    Channel {
        id: id.to_string(),
        name: id.to_string(),
        url,
        headers,
    }
}

/// fixture upstream + proxy wired to an in-memory registry
async fn start_stack() -> (String, String) {
    let upstream = serve(upstream_router()).await;

    let mut guard_headers = HashMap::new();
    guard_headers.insert("X-Stream-Token".to_string(), "tok123".to_string());

    let mut brand_headers = HashMap::new();
    brand_headers.insert("Referer".to_string(), "https://embed.example/".to_string());
    brand_headers.insert("User-Agent".to_string(), "CustomPlayer/2.1".to_string());

    let channels = vec![
        channel("demo", format!("{upstream}/a/b/live.m3u8"), None),
        channel("keyed", format!("{upstream}/a/b/keyed.m3u8"), None),
        channel("redirected", format!("{upstream}/redirect.m3u8"), None),
        channel("raw", format!("{upstream}/raw.mp4"), None),
        channel(
            "guarded",
            format!("{upstream}/guarded/stream.m3u8"),
            Some(guard_headers),
        ),
        channel(
            "branded",
            format!("{upstream}/branded/stream.m3u8"),
            Some(brand_headers),
        ),
        channel("dead", format!("{upstream}/nope.m3u8"), None),
    ];

    let services = ProxyServices::new(
        Arc::new(MemoryChannelsRepository::new(channels)),
        None,
        Arc::new(AppConfig::default()),
    );

    let proxy = serve(ApplicationServer::router(services)).await;
    (upstream, proxy)
}

fn encode(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

#[tokio::test]
async fn test_channel_playlist_is_rewritten() {
    let (upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/demo.m3u8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        HLS_CONTENT_TYPE
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );

    let token = encode(&format!("{upstream}/a/b/seg1.ts"));
    assert_eq!(
        response.text().await.unwrap(),
        format!("#EXTM3U\n#EXTINF:6,\n{proxy}/api/proxy/s?url={token}\n")
    );
}

#[tokio::test]
async fn test_key_uri_is_rewritten_inside_the_tag() {
    let (upstream, proxy) = start_stack().await;

    let body = reqwest::get(format!("{proxy}/api/proxy/keyed.m3u8"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let key_token = encode(&format!("{upstream}/a/b/key.bin"));
    assert!(body.contains(&format!(
        "#EXT-X-KEY:METHOD=AES-128,URI=\"{proxy}/api/proxy/s?url={key_token}\""
    )));
}

#[tokio::test]
async fn test_segments_stream_through_byte_for_byte() {
    let (upstream, proxy) = start_stack().await;

    let token = encode(&format!("{upstream}/a/b/seg1.ts"));
    let response = reqwest::get(format!("{proxy}/api/proxy/s?url={token}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/mp2t"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=600, immutable"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );

    assert_eq!(response.bytes().await.unwrap().to_vec(), segment_payload());
}

#[tokio::test]
async fn test_unknown_channel_is_an_hls_shaped_404() {
    let (_upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/unknown.m3u8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        HLS_CONTENT_TYPE
    );
    // errors carry CORS too, players on foreign origins must see them
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
    assert_eq!(
        response.text().await.unwrap(),
        "#EXTM3U\n#EXT-X-ERROR:Channel not found"
    );
}

#[tokio::test]
async fn test_non_http_targets_are_rejected() {
    let (_upstream, proxy) = start_stack().await;

    // decodes to "not-a-url"
    let response = reqwest::get(format!("{proxy}/api/proxy/s?url=bm90LWEtdXJs"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Invalid URL scheme");
}

#[tokio::test]
async fn test_undecodable_tokens_are_rejected() {
    let (_upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/s?url=!!!"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Invalid URL encoding");
}

#[tokio::test]
async fn test_missing_url_parameter_is_a_400() {
    let (_upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/s")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Missing url parameter");
}

#[tokio::test]
async fn test_non_hls_channel_gets_a_master_wrapper() {
    let (upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/raw.m3u8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        HLS_CONTENT_TYPE
    );

    let token = encode(&format!("{upstream}/raw.mp4"));
    assert_eq!(
        response.text().await.unwrap(),
        format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\n{proxy}/api/proxy/s?url={token}")
    );
}

#[tokio::test]
async fn test_relative_uris_resolve_against_the_post_redirect_url() {
    let (upstream, proxy) = start_stack().await;

    let body = reqwest::get(format!("{proxy}/api/proxy/redirected.m3u8"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    // seg1.ts sits next to the playlist the redirect landed on, not next
    // to the channel's configured URL
    let token = encode(&format!("{upstream}/a/b/seg1.ts"));
    assert!(body.contains(&token), "body was: {body}");
}

#[tokio::test]
async fn test_channel_headers_flow_to_descendant_fetches() {
    let (_upstream, proxy) = start_stack().await;

    // the channel fetch itself needs the custom header to get past the
    // fixture's token check
    let body = reqwest::get(format!("{proxy}/api/proxy/guarded.m3u8"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let segment_url = body
        .lines()
        .find(|line| !line.starts_with('#') && !line.is_empty())
        .expect("rewritten playlist should list a segment")
        .to_string();

    assert!(segment_url.contains("&h="), "headers token missing: {segment_url}");

    // and the rewritten segment URL has to carry the same header set
    let response = reqwest::get(&segment_url).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().to_vec(), segment_payload());
}

#[tokio::test]
async fn test_colliding_channel_headers_replace_the_defaults() {
    let (_upstream, proxy) = start_stack().await;

    // the fixture 403s if Referer or User-Agent shows up twice or still
    // holds the default browser values
    let response = reqwest::get(format!("{proxy}/api/proxy/branded.m3u8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        HLS_CONTENT_TYPE
    );
}

#[tokio::test]
async fn test_channel_upstream_error_is_a_502_hls_error() {
    let (_upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/dead.m3u8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text().await.unwrap(),
        "#EXTM3U\n#EXT-X-ERROR:Upstream 404"
    );
}

#[tokio::test]
async fn test_upstream_4xx_is_mirrored_on_the_resource_route() {
    let (upstream, proxy) = start_stack().await;

    let token = encode(&format!("{upstream}/nope.bin"));
    let response = reqwest::get(format!("{proxy}/api/proxy/s?url={token}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_502_after_retries() {
    let (_upstream, proxy) = start_stack().await;

    // nothing listens on the discard port, every attempt gets refused
    let token = encode("http://127.0.0.1:9/seg1.ts");
    let response = reqwest::get(format!("{proxy}/api/proxy/s?url={token}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(
        response
            .text()
            .await
            .unwrap()
            .starts_with("Upstream unreachable")
    );
}

#[tokio::test]
async fn test_options_preflight_is_a_204_with_cors() {
    let (_upstream, proxy) = start_stack().await;

    let client = reqwest::Client::new();
    let response = client
        .request(Method::OPTIONS, format!("{proxy}/api/proxy/demo.m3u8"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "GET, HEAD, OPTIONS"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(),
        "86400"
    );
}

#[tokio::test]
async fn test_head_resolves_like_get_with_an_empty_body() {
    let (_upstream, proxy) = start_stack().await;

    let client = reqwest::Client::new();
    let response = client
        .head(format!("{proxy}/api/proxy/demo.m3u8"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        HLS_CONTENT_TYPE
    );
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_sub_routes_are_404() {
    let (_upstream, proxy) = start_stack().await;

    let response = reqwest::get(format!("{proxy}/api/proxy/some/where"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Unknown proxy route");

    // a single segment without the playlist suffix is not a channel either
    let response = reqwest::get(format!("{proxy}/api/proxy/demo")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Unknown proxy route");
}
