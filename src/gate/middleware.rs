use super::decision::GateRequest;
use super::path::normalize_path;
use super::render::{login_response, respond};
use crate::AppState;
use axum::{
    body::{self, Body, Bytes},
    extract::{Form, FromRequest, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}

/// 解析登录表单；格式不对时按空密码处理
async fn parse_login_form(headers: &HeaderMap, bytes: Bytes) -> LoginForm {
    let mut form_request = Request::new(Body::from(bytes));
    *form_request.method_mut() = Method::POST;
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        form_request
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }
    match Form::<LoginForm>::from_request(form_request, &()).await {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!("登录表单解析失败: {}", rejection);
            LoginForm::default()
        }
    }
}

/// 闸门中间件：拦截受保护前缀下的请求
pub async fn gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let gate = state.gate.clone();

    // 与静态文件服务看到的路径保持一致，避免编码或多余的段绕过闸门
    let path = match normalize_path(request.uri().path()) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("拒绝请求路径 {}: {}", request.uri().path(), e);
            return (StatusCode::BAD_REQUEST, "Invalid request path").into_response();
        }
    };
    if !gate.guards(&path) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();

    // 只有登录提交需要读取表单；读取后用同一份字节重建请求体
    let (password, body) = if gate.is_login_submission(&parts.method, &path) {
        let bytes = match body::to_bytes(body, state.config.server.max_form_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("读取登录表单失败: {}", e);
                return login_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &gate.settings().login_path,
                    Some("Ongeldig formulier."),
                );
            }
        };
        let password = parse_login_form(&parts.headers, bytes.clone()).await.password;
        (Some(password), Body::from(bytes))
    } else {
        (None, body)
    };

    let decision = gate
        .evaluate(GateRequest {
            method: &parts.method,
            path: &path,
            headers: &parts.headers,
            password: password.as_deref(),
        })
        .await;

    match decision {
        Ok(decision) => match respond(decision, gate.settings()) {
            Some(response) => response,
            None => next.run(Request::from_parts(parts, body)).await,
        },
        Err(e) => e.render(&gate.settings().login_path),
    }
}
