use crate::{
    auth::{client_ip, Claims, LoginIdentity, ThrottleStatus},
    error::AppError,
    metrics::METRICS,
    AppState,
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// 请求体未带 client_id 时从这个头部读取
const CLIENT_ID_HEADER: &str = "x-client-id";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
}

fn throttled(status: ThrottleStatus) -> AppError {
    AppError::LoginThrottled {
        retry_after_ms: status.retry_after_ms,
        retry_after_seconds: status.retry_after_seconds,
    }
}

/// 登录：先查限流，密码错误记一次失败，成功则清除失败记录
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let ip = client_ip(&headers, peer, state.config.server.trust_proxy);
    let client_id = req
        .client_id
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| headers.get(CLIENT_ID_HEADER).and_then(|h| h.to_str().ok()));
    let identity = LoginIdentity::new(ip.as_deref(), client_id, Some(&req.username));

    let status = state.throttle.status(&identity);
    if status.blocked {
        METRICS.record_login("throttled");
        tracing::warn!(
            ip = identity.ip(),
            username = identity.username(),
            retry_after_seconds = status.retry_after_seconds,
            "登录被限流拒绝"
        );
        return Err(throttled(status));
    }

    let user = state
        .config
        .auth
        .users
        .iter()
        .find(|u| u.username == req.username && u.password == req.password);

    let Some(user) = user else {
        METRICS.record_login("failure");
        let status = state.throttle.record_failure(&identity);
        if status.blocked {
            METRICS.login_bruteforce_blocked.inc();
            tracing::warn!(
                ip = identity.ip(),
                username = identity.username(),
                "登录失败次数过多，已封禁 {} 秒",
                status.retry_after_seconds
            );
            return Err(throttled(status));
        }
        tracing::info!(ip = identity.ip(), username = identity.username(), "登录失败：用户名或密码错误");
        return Err(AppError::Unauthorized("用户名或密码错误".to_string()));
    };

    state.throttle.clear(&identity);
    let token = state.jwt_service.issue(&user.username, identity.client_id())?;

    METRICS.record_login("success");
    tracing::info!("用户 {} 登录成功，客户端: {}", user.username, identity.client_id());

    Ok(Json(LoginResponse {
        token,
        expires_in: state.jwt_service.ttl_seconds(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub username: String,
    pub client_id: String,
    pub expires_at: String,
}

/// 查询当前会话（需要 Bearer token）
pub async fn session(Extension(claims): Extension<Claims>) -> Result<Json<SessionResponse>, AppError> {
    let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| AppError::Unauthorized("Token 过期时间无效".to_string()))?
        .to_rfc3339();

    Ok(Json(SessionResponse {
        username: claims.sub,
        client_id: claims.cid,
        expires_at,
    }))
}
