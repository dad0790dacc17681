use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// 会话令牌中的固定标记
pub const SESSION_MARKER: &str = "authenticated";

/// 会话令牌：`<marker>.<过期时间毫秒>`
///
/// 无状态，服务端不保存，过期即失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    expires_at: i64,
}

impl SessionToken {
    /// 签发一个 `ttl_seconds` 秒后过期的令牌
    pub fn issue(now_millis: i64, ttl_seconds: u64) -> Self {
        let ttl_millis = i64::try_from(ttl_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Self {
            expires_at: now_millis.saturating_add(ttl_millis),
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn encode(&self) -> String {
        format!("{}.{}", SESSION_MARKER, self.expires_at)
    }

    /// 解析令牌；格式不对返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        let (marker, expires) = raw.split_once('.')?;
        if marker != SESSION_MARKER {
            return None;
        }
        let expires_at = expires.parse::<i64>().ok()?;
        Some(Self { expires_at })
    }

    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        self.expires_at > now_millis
    }

    /// 构造写回客户端的 cookie
    pub fn to_cookie(&self, name: &str, ttl_seconds: u64) -> Cookie<'static> {
        let max_age = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        Cookie::build((name.to_string(), self.encode()))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .build()
    }
}

/// 校验原始令牌字符串；任何格式问题都视为未登录
pub fn validate_token(raw: &str, now_millis: i64) -> bool {
    SessionToken::parse(raw).is_some_and(|token| token.is_valid_at(now_millis))
}

/// 从请求头里的 cookie 判断是否已登录
pub fn is_authenticated(headers: &HeaderMap, cookie_name: &str, now_millis: i64) -> bool {
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .is_some_and(|cookie| validate_token(cookie.value(), now_millis))
}
