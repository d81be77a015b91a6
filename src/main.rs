mod admin;
mod auth;
mod clock;
mod config;
mod error;
mod logger;
mod metrics;

use crate::auth::{auth_middleware, login, session, JwtService, LoginThrottle};
use crate::clock::SystemClock;
use crate::config::Config;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// 统一的应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt_service: Arc<JwtService>,
    pub throttle: Arc<LoginThrottle>, // 进程内唯一的登录限流实例
}

/// 构建路由
pub fn app(state: AppState) -> Router {
    // 公开路由（无需认证）
    let public_routes = Router::new().route("/api/auth/login", post(login));

    // 受保护路由（需要 Token）
    let protected_routes = Router::new()
        .route("/api/auth/session", get(session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // 管理路由（只允许 localhost 访问）
    let admin_routes = Router::new()
        .route("/admin/throttle", get(admin::throttle_stats))
        .route("/metrics", get(admin::metrics))
        .layer(middleware::from_fn(admin::localhost_only));

    public_routes
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    logger::init_logger(&config.logging)?;

    tracing::info!("配置加载成功");
    tracing::info!("服务器地址: {}:{}", config.server.host, config.server.port);
    if config.auth.users.is_empty() {
        tracing::warn!("未配置任何用户，所有登录都会失败");
    }
    if config.server.trust_proxy {
        tracing::info!("trust_proxy 已开启，客户端 IP 取自 X-Forwarded-For / X-Real-IP");
    }

    let jwt_service = Arc::new(
        JwtService::new(&config.auth.jwt_secret, config.auth.token_ttl_seconds)
            .map_err(|e| anyhow::anyhow!("JWT服务初始化失败: {}", e))?,
    );

    let throttle = Arc::new(LoginThrottle::new(config.throttle.clone(), Arc::new(SystemClock)));
    let limits = throttle.config();
    tracing::info!(
        "登录限流: 窗口 {} 秒, 封禁 {} 秒, 每用户 {} 次, 每 IP {} 次, 最多跟踪 {} 个 key",
        limits.window_ms / 1000,
        limits.block_ms / 1000,
        limits.max_attempts_per_user,
        limits.max_attempts_per_ip,
        limits.max_tracked_keys
    );

    let config = Arc::new(config);
    let app_state = AppState {
        config: config.clone(),
        jwt_service,
        throttle,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Smart Sauna 认证服务启动成功: http://{}", addr);
    tracing::info!("📝 登录接口: POST http://{}/api/auth/login", addr);
    tracing::info!("🔧 管理接口: GET http://{}/admin/throttle (仅localhost)", addr);

    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("服务已停止");
    Ok(())
}

/// 优雅关闭信号处理，限流状态只在内存中，退出时直接丢弃
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("无法监听 Ctrl+C 信号: {}", e);
        return;
    }

    tracing::info!("收到关闭信号，正在停止服务...");
}
