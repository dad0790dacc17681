use super::client::client_id;
use super::credentials::{CredentialHasher, CredentialSource, Verification};
use super::limiter::{check_rate_limit, register_failure, LockoutPolicy, RateLimit};
use super::password::{validate_format, FormatViolation};
use super::session::{is_authenticated, SessionToken};
use super::store::AttemptStore;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::GateError;
use crate::metrics::METRICS;
use axum::http::{HeaderMap, Method};
use std::sync::Arc;

/// 闸门的路径与会话参数
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub protected_prefix: String,
    pub login_path: String,
    pub cookie_name: String,
    pub session_ttl_seconds: u64,
    pub setup_mode: bool,
    pub policy: LockoutPolicy,
}

impl From<&AuthConfig> for GateSettings {
    fn from(cfg: &AuthConfig) -> Self {
        Self {
            protected_prefix: cfg.protected_prefix.clone(),
            login_path: cfg.login_path.clone(),
            cookie_name: cfg.cookie_name.clone(),
            session_ttl_seconds: cfg.session_ttl_seconds,
            setup_mode: cfg.setup_mode,
            policy: LockoutPolicy {
                max_attempts: cfg.max_attempts,
                lockout_minutes: cfg.lockout_minutes,
            },
        }
    }
}

/// 服务端配置问题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misconfiguration {
    MissingSecret,
    /// 未保存密码哈希且未开启初始化模式
    MissingPasswordHash,
    MalformedPasswordHash,
}

/// 一次请求的判定结果，由渲染层转换为响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    PassThrough,
    ShowLogin,
    RateLimited { minutes: u64 },
    BadFormat(FormatViolation),
    ServerMisconfigured(Misconfiguration),
    AuthFailed { remaining: u32 },
    AuthSucceeded(SessionToken),
}

/// 闸门所需的请求信息
#[derive(Debug)]
pub struct GateRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// 登录表单中的密码，仅登录提交时存在
    pub password: Option<&'a str>,
}

pub struct Gate {
    settings: GateSettings,
    store: Arc<dyn AttemptStore>,
    credentials: Arc<dyn CredentialSource>,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
}

impl Gate {
    pub fn new(
        settings: GateSettings,
        store: Arc<dyn AttemptStore>,
        credentials: Arc<dyn CredentialSource>,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            store,
            credentials,
            hasher,
            clock,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn AttemptStore> {
        self.store.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// 路径是否在受保护前缀下（按路径段匹配）
    pub fn guards(&self, path: &str) -> bool {
        let prefix = self.settings.protected_prefix.as_str();
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    pub fn is_login_submission(&self, method: &Method, path: &str) -> bool {
        *method == Method::POST && path == self.settings.login_path
    }

    /// 判定一次请求
    pub async fn evaluate(&self, req: GateRequest<'_>) -> Result<GateDecision, GateError> {
        if !self.guards(req.path) {
            return Ok(GateDecision::PassThrough);
        }

        let now = self.clock.now_millis();
        if is_authenticated(req.headers, &self.settings.cookie_name, now) {
            return Ok(GateDecision::PassThrough);
        }

        if !self.is_login_submission(req.method, req.path) {
            return Ok(GateDecision::ShowLogin);
        }

        let client = client_id(req.headers);
        self.evaluate_login(&client, req.password.unwrap_or_default())
            .await
    }

    async fn evaluate_login(&self, client: &str, password: &str) -> Result<GateDecision, GateError> {
        let policy = &self.settings.policy;
        let now = self.clock.now_millis();

        if let RateLimit::Locked { minutes_left } =
            check_rate_limit(self.store.as_ref(), client, now, policy).await?
        {
            tracing::warn!("客户端 {} 处于锁定期，剩余 {} 分钟", client, minutes_left);
            METRICS.rate_limited.inc();
            return Ok(GateDecision::RateLimited {
                minutes: minutes_left,
            });
        }

        let Some(secret) = self.credentials.secret() else {
            METRICS.misconfigured.inc();
            return Ok(GateDecision::ServerMisconfigured(
                Misconfiguration::MissingSecret,
            ));
        };

        if let Err(violation) = validate_format(password) {
            tracing::info!("客户端 {} 提交的密码格式不符: {:?}", client, violation);
            METRICS.login_attempts.with_label_values(&["bad_format"]).inc();
            return Ok(GateDecision::BadFormat(violation));
        }

        let Some(stored_hash) = self.credentials.password_hash() else {
            return self.bootstrap(client, password, &secret).await;
        };

        match self.hasher.verify(password, &secret, &stored_hash).await? {
            Verification::Match => {
                self.store.reset(client).await?;
                tracing::info!("客户端 {} 登录成功", client);
                METRICS.login_attempts.with_label_values(&["success"]).inc();
                Ok(GateDecision::AuthSucceeded(self.issue_session()))
            }
            Verification::Mismatch => {
                let now = self.clock.now_millis();
                let attempts = register_failure(self.store.as_ref(), client, now, policy).await?;
                METRICS.login_attempts.with_label_values(&["failure"]).inc();
                if attempts >= policy.max_attempts {
                    METRICS.rate_limited.inc();
                    return Ok(GateDecision::RateLimited {
                        minutes: u64::from(policy.lockout_minutes),
                    });
                }
                let remaining = policy.remaining_after(attempts);
                tracing::warn!("客户端 {} 密码错误，剩余 {} 次尝试", client, remaining);
                Ok(GateDecision::AuthFailed { remaining })
            }
            Verification::MalformedHash => {
                tracing::error!("保存的密码哈希无法解析，请重新生成");
                METRICS.misconfigured.inc();
                Ok(GateDecision::ServerMisconfigured(
                    Misconfiguration::MalformedPasswordHash,
                ))
            }
        }
    }

    /// 尚未保存密码哈希：仅在初始化模式下接受本次密码
    async fn bootstrap(
        &self,
        client: &str,
        password: &str,
        secret: &secrecy::SecretString,
    ) -> Result<GateDecision, GateError> {
        if !self.settings.setup_mode {
            tracing::error!("未设置密码哈希，且初始化模式未开启，拒绝登录");
            METRICS.misconfigured.inc();
            return Ok(GateDecision::ServerMisconfigured(
                Misconfiguration::MissingPasswordHash,
            ));
        }

        let hash = self.hasher.hash(password, secret).await?;
        tracing::warn!("🔐 初始化模式 - 请将以下哈希保存为密码哈希环境变量: {}", hash);
        tracing::warn!("🔐 保存后关闭初始化模式并重启服务");

        self.store.reset(client).await?;
        METRICS.login_attempts.with_label_values(&["bootstrap"]).inc();
        Ok(GateDecision::AuthSucceeded(self.issue_session()))
    }

    fn issue_session(&self) -> SessionToken {
        SessionToken::issue(self.clock.now_millis(), self.settings.session_ttl_seconds)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::gate::credentials::testing::StaticCredentials;
    use axum::http::{header::COOKIE, HeaderValue};

    fn client_headers(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    async fn submit(gate: &Gate, headers: &HeaderMap, password: &str) -> GateDecision {
        gate.evaluate(GateRequest {
            method: &Method::POST,
            path: "/keystatic/login",
            headers,
            password: Some(password),
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_guards_is_segment_aware() {
        let f = fixture(settings(), StaticCredentials::default());
        assert!(f.gate.guards("/keystatic"));
        assert!(f.gate.guards("/keystatic/"));
        assert!(f.gate.guards("/keystatic/collection/posts"));
        assert!(!f.gate.guards("/keystatic-docs"));
        assert!(!f.gate.guards("/"));
        assert!(!f.gate.guards("/blog/keystatic"));
    }

    #[tokio::test]
    async fn test_unprotected_path_passes_through() {
        let f = configured_fixture().await;
        let headers = HeaderMap::new();
        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::POST,
                path: "/contact",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::PassThrough);
    }

    #[tokio::test]
    async fn test_unauthenticated_request_shows_login_without_side_effects() {
        let f = fixture(
            GateSettings {
                protected_prefix: "/admin".to_string(),
                login_path: "/admin/login".to_string(),
                ..settings()
            },
            StaticCredentials::default(),
        );
        let headers = client_headers("203.0.113.7");
        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::GET,
                path: "/admin/anything",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::ShowLogin);
        assert_eq!(f.store.len().await.unwrap(), 0);

        // 登录路径的 GET 也只是展示登录页
        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::GET,
                path: "/admin/login",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::ShowLogin);
    }

    #[tokio::test]
    async fn test_valid_session_passes_through() {
        let f = configured_fixture().await;
        let token = SessionToken::issue(NOW, 60);
        let mut headers = HeaderMap::new();
        let cookie = format!("keystatic-auth={}", token.encode());
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());

        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::GET,
                path: "/keystatic/branch/main",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::PassThrough);

        f.clock.advance_minutes(2);
        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::GET,
                path: "/keystatic/branch/main",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::ShowLogin);
    }

    #[tokio::test]
    async fn test_correct_password_succeeds() {
        let f = configured_fixture().await;
        let headers = client_headers("203.0.113.7");
        let decision = submit(&f.gate, &headers, PASSWORD).await;
        assert_eq!(
            decision,
            GateDecision::AuthSucceeded(SessionToken::issue(NOW, 86_400))
        );
    }

    #[tokio::test]
    async fn test_bad_format_not_counted() {
        let f = configured_fixture().await;
        let headers = client_headers("203.0.113.7");
        for _ in 0..10 {
            assert_eq!(
                submit(&f.gate, &headers, "abc").await,
                GateDecision::BadFormat(FormatViolation::TooShort)
            );
        }
        assert_eq!(f.store.get("203.0.113.7").await.unwrap(), None);
        // 缺少密码字段按空密码处理
        let decision = f
            .gate
            .evaluate(GateRequest {
                method: &Method::POST,
                path: "/keystatic/login",
                headers: &headers,
                password: None,
            })
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::BadFormat(FormatViolation::TooShort));
    }

    #[tokio::test]
    async fn test_five_wrong_passwords_lock_out() {
        let f = configured_fixture().await;
        let headers = client_headers("203.0.113.7");

        for remaining in [4, 3, 2, 1] {
            assert_eq!(
                submit(&f.gate, &headers, "WrongPass1!").await,
                GateDecision::AuthFailed { remaining }
            );
        }
        assert_eq!(
            submit(&f.gate, &headers, "WrongPass1!").await,
            GateDecision::RateLimited { minutes: 15 }
        );

        // 锁定期内正确密码也被拒绝，且计数不变
        f.clock.advance_minutes(5);
        assert_eq!(
            submit(&f.gate, &headers, PASSWORD).await,
            GateDecision::RateLimited { minutes: 10 }
        );
        assert_eq!(f.store.get("203.0.113.7").await.unwrap().unwrap().attempts, 5);

        // 其他客户端不受影响
        let other = client_headers("198.51.100.2");
        assert!(matches!(
            submit(&f.gate, &other, PASSWORD).await,
            GateDecision::AuthSucceeded(_)
        ));
    }

    #[tokio::test]
    async fn test_success_after_lockout_window() {
        let f = configured_fixture().await;
        let headers = client_headers("203.0.113.7");
        for _ in 0..5 {
            submit(&f.gate, &headers, "WrongPass1!").await;
        }

        f.clock.advance_minutes(16);
        assert!(matches!(
            submit(&f.gate, &headers, PASSWORD).await,
            GateDecision::AuthSucceeded(_)
        ));
        assert_eq!(f.store.get("203.0.113.7").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let f = configured_fixture().await;
        let headers = client_headers("203.0.113.7");
        for _ in 0..3 {
            submit(&f.gate, &headers, "WrongPass1!").await;
        }
        assert!(matches!(
            submit(&f.gate, &headers, PASSWORD).await,
            GateDecision::AuthSucceeded(_)
        ));
        assert_eq!(f.store.get("203.0.113.7").await.unwrap(), None);

        // 重新获得完整的尝试次数
        assert_eq!(
            submit(&f.gate, &headers, "WrongPass1!").await,
            GateDecision::AuthFailed { remaining: 4 }
        );
    }

    #[tokio::test]
    async fn test_missing_secret_is_server_error() {
        let f = fixture(
            settings(),
            StaticCredentials {
                secret: Some("  ".to_string()),
                password_hash: Some(stored_hash().await),
            },
        );
        let headers = client_headers("203.0.113.7");
        for password in [PASSWORD, "abc", "WrongPass1!"] {
            assert_eq!(
                submit(&f.gate, &headers, password).await,
                GateDecision::ServerMisconfigured(Misconfiguration::MissingSecret)
            );
        }
        assert_eq!(f.store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_hash_without_setup_mode() {
        let f = fixture(
            settings(),
            StaticCredentials {
                secret: Some(SECRET.to_string()),
                password_hash: None,
            },
        );
        let headers = client_headers("203.0.113.7");
        assert_eq!(
            submit(&f.gate, &headers, PASSWORD).await,
            GateDecision::ServerMisconfigured(Misconfiguration::MissingPasswordHash)
        );
    }

    #[tokio::test]
    async fn test_bootstrap_in_setup_mode() {
        let f = fixture(
            GateSettings {
                setup_mode: true,
                ..settings()
            },
            StaticCredentials {
                secret: Some(SECRET.to_string()),
                password_hash: None,
            },
        );
        let headers = client_headers("203.0.113.7");
        for _ in 0..2 {
            f.store.record_failure("203.0.113.7").await.unwrap();
        }

        assert!(matches!(
            submit(&f.gate, &headers, "AnyValid9$").await,
            GateDecision::AuthSucceeded(_)
        ));
        assert_eq!(f.store.get("203.0.113.7").await.unwrap(), None);

        // 格式校验在初始化模式下依然生效
        assert_eq!(
            submit(&f.gate, &headers, "weak").await,
            GateDecision::BadFormat(FormatViolation::TooShort)
        );
    }

    #[tokio::test]
    async fn test_malformed_stored_hash() {
        let f = fixture(
            settings(),
            StaticCredentials {
                secret: Some(SECRET.to_string()),
                password_hash: Some("not-a-phc-string".to_string()),
            },
        );
        let headers = client_headers("203.0.113.7");
        assert_eq!(
            submit(&f.gate, &headers, PASSWORD).await,
            GateDecision::ServerMisconfigured(Misconfiguration::MalformedPasswordHash)
        );
        assert_eq!(f.store.len().await.unwrap(), 0);
    }
}
