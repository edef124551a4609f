use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pulumi_cloud::ApiError;
use stackpolicy_core::PolicyError;

// ---------------------------------------------------------------------------
// Internal sentinels for explicit status codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(PolicyError::Config(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<NotFoundError>().is_some() {
            StatusCode::NOT_FOUND
        } else if self.0.downcast_ref::<UnauthorizedError>().is_some() {
            StatusCode::UNAUTHORIZED
        } else if let Some(e) = self.0.downcast_ref::<PolicyError>() {
            match e {
                PolicyError::InvalidIdentity(_) | PolicyError::Config(_) => {
                    StatusCode::BAD_REQUEST
                }
                PolicyError::NotInitialized(_)
                | PolicyError::Store(_)
                | PolicyError::Io(_)
                | PolicyError::Yaml(_)
                | PolicyError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(e) = self.0.downcast_ref::<ApiError>() {
            match e {
                ApiError::Auth { .. } => StatusCode::UNAUTHORIZED,
                ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
                ApiError::UpstreamUnavailable { .. } | ApiError::Transport { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                ApiError::Decode { .. } | ApiError::InvalidUrl(_) | ApiError::Client(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": format!("{:#}", self.0) });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_identity_maps_to_400() {
        let err = AppError(PolicyError::InvalidIdentity("a/b".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_error_maps_to_500() {
        let err = AppError(PolicyError::Store("disk full".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_maps_to_502() {
        let err = AppError(
            ApiError::UpstreamUnavailable {
                identity: "acme/widgets/dev".into(),
                status: 503,
                body: String::new(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn constructors_map_to_their_status() {
        assert_eq!(
            AppError::not_found("no such stack").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::unauthorized("bad signature").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::bad_request("bad payload").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
