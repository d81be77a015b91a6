use crate::{auth::ThrottleStats, error::AppError, metrics::METRICS, AppState};
use axum::{extract::State, Json};

/// 管理接口：登录限流当前状态
pub async fn throttle_stats(State(state): State<AppState>) -> Json<ThrottleStats> {
    Json(state.throttle.stats())
}

/// Prometheus 指标（文本格式），顺带刷新限流相关的 gauge
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    let stats = state.throttle.stats();
    METRICS.throttle_tracked_keys.set(stats.tracked_keys as i64);
    METRICS.throttle_blocked_keys.set(stats.blocked_keys as i64);

    METRICS
        .render()
        .map_err(|e| AppError::InternalError(format!("指标导出失败: {}", e)))
}
