use crate::metrics::METRICS;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// 管理接口：prometheus 文本格式的指标
pub async fn metrics() -> Response {
    match METRICS.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("指标渲染失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
