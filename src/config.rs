use serde::Deserialize;

pub const DEFAULT_PROTECTED_PREFIX: &str = "/keystatic";
pub const DEFAULT_LOGIN_PATH: &str = "/keystatic/login";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 静态站点构建产物目录
    pub site_dir: String,
    /// 登录表单最大字节数
    pub max_form_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            site_dir: "dist".to_string(),
            max_form_bytes: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub protected_prefix: String,
    pub login_path: String,
    pub cookie_name: String,
    pub max_attempts: u32,
    pub lockout_minutes: u32,
    pub session_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// 初始化模式：未保存密码哈希时接受第一次提交的密码
    pub setup_mode: bool,
    /// 服务端密钥所在的环境变量
    pub secret_env: String,
    /// 密码哈希所在的环境变量
    pub password_hash_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            protected_prefix: DEFAULT_PROTECTED_PREFIX.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            cookie_name: "keystatic-auth".to_string(),
            max_attempts: 5,
            lockout_minutes: 15,
            session_ttl_seconds: 24 * 60 * 60,
            sweep_interval_seconds: 5 * 60,
            setup_mode: false,
            secret_env: "KEYSTATIC_SECRET".to_string(),
            password_hash_env: "KEYSTATIC_PASSWORD_HASH".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 是否同时写入文件
    pub file_output: bool,
    pub dir: String,
    pub file_prefix: String,
    /// 保留的日志文件数量
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_output: true,
            dir: "logs".to_string(),
            file_prefix: "keystatic_gate".to_string(),
            max_files: 7,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // 加载 .env 文件 (如果存在)
        let _ = dotenvy::dotenv();

        // config.toml 可选，环境变量优先，例如 GATE_AUTH__SETUP_MODE=true
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("GATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let auth = &self.auth;

        if !auth.protected_prefix.starts_with('/') || auth.protected_prefix.ends_with('/') {
            anyhow::bail!(
                "auth.protected_prefix 必须以 / 开头且不以 / 结尾: {}",
                auth.protected_prefix
            );
        }
        let under_prefix = auth
            .login_path
            .strip_prefix(&auth.protected_prefix)
            .is_some_and(|rest| rest.starts_with('/'));
        if !under_prefix {
            anyhow::bail!(
                "auth.login_path ({}) 必须位于 auth.protected_prefix ({}) 之下",
                auth.login_path,
                auth.protected_prefix
            );
        }
        if auth.max_attempts == 0 {
            anyhow::bail!("auth.max_attempts 必须大于 0");
        }
        if auth.lockout_minutes == 0 {
            anyhow::bail!("auth.lockout_minutes 必须大于 0");
        }
        if auth.session_ttl_seconds == 0 {
            anyhow::bail!("auth.session_ttl_seconds 必须大于 0");
        }
        if auth.sweep_interval_seconds == 0 {
            anyhow::bail!("auth.sweep_interval_seconds 必须大于 0");
        }
        if auth.cookie_name.trim().is_empty() {
            anyhow::bail!("auth.cookie_name 不能为空");
        }

        Ok(())
    }
}
