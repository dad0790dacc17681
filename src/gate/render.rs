//! 将闸门判定渲染为 HTML 响应

use super::decision::{GateDecision, GateSettings, Misconfiguration};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};

const LOGIN_TEMPLATE: &str = include_str!("login.html");

const REQUIREMENTS_INFO: &str = "ℹ️ Wachtwoord vereisten: minimaal 8 tekens, hoofdletters, kleine letters, cijfers en symbolen";

/// 通用内部错误提示
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Er is een interne fout opgetreden. Probeer het later opnieuw.";

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 登录页；有错误信息时显示错误横幅，否则显示密码要求
pub fn login_page(login_path: &str, error: Option<&str>) -> String {
    let banner = match error {
        Some(message) => format!(r#"<div class="error">❌ {}</div>"#, escape_html(message)),
        None => format!(r#"<div class="info">{}</div>"#, REQUIREMENTS_INFO),
    };
    LOGIN_TEMPLATE
        .replace("{{banner}}", &banner)
        .replace("{{action}}", &escape_html(login_path))
}

pub fn rate_limited_message(minutes: u64) -> String {
    format!("Te veel mislukte pogingen. Probeer het over {minutes} minuten opnieuw.")
}

pub fn auth_failed_message(remaining: u32) -> String {
    if remaining > 0 {
        format!("Onjuist wachtwoord. {remaining} pogingen over.")
    } else {
        "Onjuist wachtwoord. Geen pogingen meer over.".to_string()
    }
}

pub fn misconfiguration_message(reason: Misconfiguration) -> &'static str {
    match reason {
        Misconfiguration::MissingSecret => {
            "Server configuration error: KEYSTATIC_SECRET not configured. Set KEYSTATIC_SECRET in the server environment and restart the service."
        }
        Misconfiguration::MissingPasswordHash => {
            "Server configuration error: KEYSTATIC_PASSWORD_HASH not configured. Generate one with `keystatic_gate hash-password`, or enable setup mode for the first login."
        }
        Misconfiguration::MalformedPasswordHash => {
            "Server configuration error: KEYSTATIC_PASSWORD_HASH is not a valid password hash. Generate a new one with `keystatic_gate hash-password`."
        }
    }
}

/// 带状态码的登录页
pub fn login_response(status: StatusCode, login_path: &str, error: Option<&str>) -> Response {
    (status, Html(login_page(login_path, error))).into_response()
}

/// 渲染判定结果；`PassThrough` 返回 None，由调用方放行
pub fn respond(decision: GateDecision, settings: &GateSettings) -> Option<Response> {
    let login_path = settings.login_path.as_str();
    let response = match decision {
        GateDecision::PassThrough => return None,
        GateDecision::ShowLogin => login_response(StatusCode::UNAUTHORIZED, login_path, None),
        GateDecision::RateLimited { minutes } => login_response(
            StatusCode::TOO_MANY_REQUESTS,
            login_path,
            Some(&rate_limited_message(minutes)),
        ),
        GateDecision::BadFormat(violation) => {
            login_response(StatusCode::BAD_REQUEST, login_path, Some(violation.message()))
        }
        GateDecision::ServerMisconfigured(reason) => login_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            login_path,
            Some(misconfiguration_message(reason)),
        ),
        GateDecision::AuthFailed { remaining } => login_response(
            StatusCode::UNAUTHORIZED,
            login_path,
            Some(&auth_failed_message(remaining)),
        ),
        GateDecision::AuthSucceeded(token) => {
            let cookie = token.to_cookie(&settings.cookie_name, settings.session_ttl_seconds);
            let mut response = StatusCode::FOUND.into_response();
            let headers = response.headers_mut();
            if let Ok(location) = HeaderValue::from_str(&settings.protected_prefix) {
                headers.insert(header::LOCATION, location);
            }
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.insert(header::SET_COOKIE, value);
                }
                Err(e) => {
                    tracing::error!("会话 cookie 无法写入响应头: {}", e);
                    return Some(login_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        login_path,
                        Some(INTERNAL_ERROR_MESSAGE),
                    ));
                }
            }
            response
        }
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::decision::testing::settings;
    use crate::gate::password::FormatViolation;
    use crate::gate::session::SessionToken;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_auth_failed_wording() {
        assert_eq!(auth_failed_message(4), "Onjuist wachtwoord. 4 pogingen over.");
        assert_eq!(auth_failed_message(1), "Onjuist wachtwoord. 1 pogingen over.");
        assert_eq!(auth_failed_message(0), "Onjuist wachtwoord. Geen pogingen meer over.");
    }

    #[test]
    fn test_login_page_banner() {
        let page = login_page("/keystatic/login", None);
        assert!(page.contains(r#"<div class="info">"#));
        assert!(!page.contains(r#"<div class="error">"#));
        assert!(page.contains(r#"action="/keystatic/login""#));

        let page = login_page("/keystatic/login", Some("<b>kapot</b>"));
        assert!(page.contains("&lt;b&gt;kapot&lt;/b&gt;"));
        assert!(!page.contains(r#"<div class="info">"#));
    }

    #[test]
    fn test_pass_through_renders_nothing() {
        assert!(respond(GateDecision::PassThrough, &settings()).is_none());
    }

    #[tokio::test]
    async fn test_status_codes() {
        let s = settings();
        let cases = [
            (GateDecision::ShowLogin, StatusCode::UNAUTHORIZED),
            (GateDecision::RateLimited { minutes: 15 }, StatusCode::TOO_MANY_REQUESTS),
            (
                GateDecision::BadFormat(FormatViolation::MissingDigit),
                StatusCode::BAD_REQUEST,
            ),
            (
                GateDecision::ServerMisconfigured(Misconfiguration::MissingSecret),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (GateDecision::AuthFailed { remaining: 2 }, StatusCode::UNAUTHORIZED),
        ];
        for (decision, status) in cases {
            let response = respond(decision, &s).unwrap();
            assert_eq!(response.status(), status);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "text/html; charset=utf-8"
            );
        }
    }

    #[tokio::test]
    async fn test_messages_in_body() {
        let s = settings();
        let body = body_text(respond(GateDecision::RateLimited { minutes: 7 }, &s).unwrap()).await;
        assert!(body.contains("Probeer het over 7 minuten opnieuw."));

        let body = body_text(
            respond(GateDecision::BadFormat(FormatViolation::TooShort), &s).unwrap(),
        )
        .await;
        assert!(body.contains("minimaal 8 tekens lang"));

        let body = body_text(
            respond(
                GateDecision::ServerMisconfigured(Misconfiguration::MissingSecret),
                &s,
            )
            .unwrap(),
        )
        .await;
        assert!(body.contains("KEYSTATIC_SECRET not configured"));
    }

    #[test]
    fn test_success_redirects_with_cookie() {
        let token = SessionToken::issue(1_700_000_000_000, 86_400);
        let response = respond(GateDecision::AuthSucceeded(token), &settings()).unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/keystatic");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("keystatic-auth=authenticated.1700086400000"));
        assert!(cookie.contains("Max-Age=86400"));
    }
}
