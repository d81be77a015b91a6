use crate::{error::AppError, AppState};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

/// Bearer token 验证中间件，通过后把 Claims 放入 request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("缺少 Authorization header".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Authorization 格式错误".to_string()))?;

    let claims = state
        .jwt_service
        .validate(token)
        .map_err(|e| AppError::Unauthorized(format!("Token 无效: {}", e)))?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
