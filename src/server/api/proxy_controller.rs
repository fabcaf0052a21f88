// the two proxy handlers are pretty independent of everything else so they
// live here as controller methods instead of another service layer
use axum::{
    Extension, Router,
    body::Body,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::server::{
    error::{AppResult, Error},
    services::proxy_services::ProxyServices,
    utils::{
        content_utils,
        playlist_utils::{self, RewriteContext},
        url_utils,
    },
};

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// live playlists change every few seconds, nothing downstream may cache
/// them
const PLAYLIST_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

/// segments are immutable once published
const MEDIA_CACHE_CONTROL: &str = "public, max-age=600, immutable";

#[derive(Deserialize)]
struct ResourceQuery {
    url: Option<String>,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route("/s", get(Self::resource_get))
            .route("/{channel}", get(Self::channel_get))
            .fallback(Self::unknown_route)
    }

    async fn unknown_route() -> Error {
        Error::NotFound("Unknown proxy route".to_string())
    }

    /// GET /{id}.m3u8 - the stable per-channel entry point
    async fn channel_get(
        Extension(services): Extension<ProxyServices>,
        Path(resource): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        // the channel id is the path segment minus its playlist suffix
        let Some(channel_id) = resource.strip_suffix(".m3u8") else {
            return Self::unknown_route().await.into_response();
        };

        let proxy_origin = Self::request_origin(&services, &headers);

        let channel = match services.channels.get_by_id(channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                debug!("channel {} not found", channel_id);
                return Self::hls_error(StatusCode::NOT_FOUND, "Channel not found");
            }
            Err(e) => {
                error!("channel lookup failed for {}: {}", channel_id, e);
                return Self::hls_error(StatusCode::BAD_GATEWAY, "Registry unavailable");
            }
        };

        let custom_headers = channel.headers.clone().unwrap_or_default();

        // computed once; every descendant URL in the rewritten playlist
        // carries the same token
        let headers_token = url_utils::encode_headers(&custom_headers);

        debug!("channel {} -> fetching {}", channel_id, channel.url);

        let response = match services.fetch.fetch(&channel.url, &custom_headers).await {
            Ok(response) => response,
            Err(e) => {
                error!("channel {} upstream fetch failed: {}", channel_id, e);
                return Self::hls_error(StatusCode::BAD_GATEWAY, "Upstream unreachable");
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("channel {} upstream returned {}", channel_id, status);
            return Self::hls_error(
                StatusCode::BAD_GATEWAY,
                &format!("Upstream {}", status.as_u16()),
            );
        }

        // the URL that actually delivered the bytes, after any redirects;
        // relative URIs in the playlist resolve against this one
        let final_url = response.url().to_string();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!("channel {} upstream body read failed: {}", channel_id, e);
                return Self::hls_error(StatusCode::BAD_GATEWAY, "Upstream read failed");
            }
        };

        let ctx = RewriteContext {
            base_url: &final_url,
            proxy_origin: &proxy_origin,
            headers_token: headers_token.as_deref(),
        };

        if content_utils::is_playlist(&content_type, &final_url, Some(&body)) {
            debug!("channel {} rewriting playlist from {}", channel_id, final_url);
            return Self::playlist_response(playlist_utils::rewrite_playlist(&body, &ctx));
        }

        // non-HLS source: hand the player a one-variant master pointing at
        // the encoded-resource route, so any plain HTTP resource stays
        // reachable through the .m3u8 entry point
        debug!(
            "channel {} source is not a playlist, wrapping {}",
            channel_id, channel.url
        );
        let wrapper = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\n{}",
            playlist_utils::proxied_url(&channel.url, &ctx)
        );
        Self::playlist_response(wrapper)
    }

    /// GET /s?url=<token>[&h=<headers>] - one proxied upstream resource
    async fn resource_get(
        Extension(services): Extension<ProxyServices>,
        Query(params): Query<ResourceQuery>,
        uri: Uri,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let Some(token) = params.url else {
            return Err(Error::BadRequest("Missing url parameter".to_string()));
        };

        let target_url = url_utils::decode_url(&token)?;

        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(Error::BadRequest("Invalid URL scheme".to_string()));
        }

        // the raw token gets re-emitted verbatim into rewritten
        // descendants, so read it off the query string before any
        // percent-decoding happens
        let headers_token = raw_query_param(&uri, "h");
        let custom_headers = headers_token
            .as_deref()
            .map(url_utils::decode_headers)
            .unwrap_or_default();

        let proxy_origin = Self::request_origin(&services, &headers);

        debug!("proxying resource: {}", target_url);

        let response = services.fetch.fetch(&target_url, &custom_headers).await?;

        let status = response.status();
        if !status.is_success() {
            warn!("upstream returned {} for {}", status, target_url);
            return Err(if status.is_client_error() {
                Error::UpstreamClient(status)
            } else {
                Error::UpstreamServer(status)
            });
        }

        let final_url = response.url().to_string();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_utils::is_playlist(&content_type, &final_url, None) {
            let body = response.text().await.map_err(|e| {
                error!("upstream playlist read failed for {}: {}", target_url, e);
                Error::UpstreamUnreachable(format!("Upstream read failed: {}", e))
            })?;

            let ctx = RewriteContext {
                base_url: &final_url,
                proxy_origin: &proxy_origin,
                headers_token: headers_token.as_deref(),
            };

            return Ok(Self::playlist_response(playlist_utils::rewrite_playlist(
                &body, &ctx,
            )));
        }

        // media: forward progressively, the first bytes reach the player
        // while the rest is still arriving from upstream
        let mime = content_utils::media_mime(&final_url, Some(&content_type));

        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime)
            .header(header::CACHE_CONTROL, MEDIA_CACHE_CONTROL);

        if let Some(len) = content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }

        builder
            .body(Body::from_stream(response.bytes_stream()))
            .map_err(|e| {
                error!("response assembly failed: {}", e);
                Error::InternalServerErrorWithContext("Response assembly failed".to_string())
            })
    }

    /// scheme://authority the client reached us on; rewritten URLs must
    /// point back here or the player escapes the proxy
    fn request_origin(services: &ProxyServices, headers: &HeaderMap) -> String {
        if let Some(origin) = &services.config.public_origin {
            return origin.trim_end_matches('/').to_string();
        }

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get("x-forwarded-host")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "localhost".to_string());

        format!("{}://{}", scheme, host)
    }

    fn playlist_response(body: String) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HLS_CONTENT_TYPE),
                (header::CACHE_CONTROL, PLAYLIST_CACHE_CONTROL),
                (header::PRAGMA, "no-cache"),
                (header::EXPIRES, "0"),
            ],
            body,
        )
            .into_response()
    }

    /// media players parse this instead of showing a bare HTTP failure
    fn hls_error(status: StatusCode, reason: &str) -> Response {
        let body = format!("#EXTM3U\n#EXT-X-ERROR:{}", reason);

        (
            status,
            [
                (header::CONTENT_TYPE, HLS_CONTENT_TYPE),
                (header::CACHE_CONTROL, PLAYLIST_CACHE_CONTROL),
                (header::PRAGMA, "no-cache"),
                (header::EXPIRES, "0"),
            ],
            body,
        )
            .into_response()
    }
}

/// a query parameter exactly as it appeared on the wire, no
/// percent-decoding
fn raw_query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    let prefix = format!("{}=", name);

    query
        .split('&')
        .find(|param| param.starts_with(&prefix))
        .and_then(|param| param.strip_prefix(&prefix))
        .map(|value| value.to_string())
}
