use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

/// 中间件：管理接口只允许本机访问（按 socket 对端地址判断，不看转发头）
pub async fn localhost_only(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if !addr.ip().to_canonical().is_loopback() {
        tracing::warn!("拒绝非 localhost 的管理请求，来源: {}", addr);
        return Err((StatusCode::FORBIDDEN, "Admin API only accessible from localhost").into_response());
    }

    Ok(next.run(request).await)
}
