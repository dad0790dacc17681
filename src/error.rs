use crate::gate::render::{login_response, INTERNAL_ERROR_MESSAGE};
use crate::gate::store::StoreError;
use axum::{http::StatusCode, response::Response};

/// 闸门内部错误；用户看到的是登录页上的通用 500 提示
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("失败记录存储错误: {0}")]
    Store(#[from] StoreError),

    #[error("密码哈希失败: {0}")]
    Hash(String),

    #[error("哈希任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl GateError {
    /// 渲染为 500 登录页，表单提交到 `login_path`
    pub fn render(self, login_path: &str) -> Response {
        // 记录详细原因，响应中不暴露
        tracing::error!(error = %self, "闸门内部错误");
        crate::metrics::METRICS.internal_errors.inc();

        login_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            login_path,
            Some(INTERNAL_ERROR_MESSAGE),
        )
    }
}
