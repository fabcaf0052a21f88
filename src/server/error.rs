use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

pub type AppResult<T> = Result<T, Error>;

/// error taxonomy for the proxy surface
///
/// the channel playlist endpoint does not render these directly, it emits
/// HLS-shaped error bodies instead so media players surface something
/// structured; the plain-text mapping below covers the encoded-resource
/// route and anything unexpected
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// upstream 4xx, mirrored so auth/geo failures stay visible to the caller
    #[error("Upstream returned {0}")]
    UpstreamClient(StatusCode),

    #[error("Upstream returned {0}")]
    UpstreamServer(StatusCode),

    #[error("{0}")]
    UpstreamUnreachable(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamClient(status) => *status,
            Self::UpstreamServer(_) | Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.to_string();

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
