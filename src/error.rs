use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("认证失败: {0}")]
    Unauthorized(String),

    #[error("登录尝试过于频繁，请 {retry_after_seconds} 秒后重试")]
    LoginThrottled {
        retry_after_ms: u64,
        retry_after_seconds: u64,
    },

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::LoginThrottled {
                retry_after_ms,
                retry_after_seconds,
            } => {
                let body = Json(json!({
                    "error": {
                        "code": "login_throttled",
                        "message": format!("登录尝试过于频繁，请 {} 秒后重试", retry_after_seconds),
                        "retry_after_seconds": retry_after_seconds,
                        "retry_after_ms": retry_after_ms
                    }
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                return response;
            }
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

// anyhow::Error 统一转换为 InternalError，并记录完整错误链
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let error_chain = err
            .chain()
            .enumerate()
            .map(|(i, e)| format!("  [{}] {}", i, e))
            .collect::<Vec<_>>()
            .join("\n");

        tracing::error!(error = %err, chain = %error_chain, "anyhow::Error 被转换为 InternalError");

        AppError::InternalError("服务器内部错误".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_sets_retry_after_header() {
        let response = AppError::LoginThrottled {
            retry_after_ms: 1_500,
            retry_after_seconds: 2,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "2"
        );
    }

    #[test]
    fn test_anyhow_maps_to_internal_error() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::InternalError(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
