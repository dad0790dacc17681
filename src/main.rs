mod admin;
mod clock;
mod config;
mod error;
mod gate;
mod logger;
mod metrics;

use axum::{middleware, routing::get, Router};
use clap::{Parser, Subcommand};
use clock::SystemClock;
use config::Config;
use gate::{
    credentials::hash_blocking, password::validate_format, spawn_sweeper, CredentialHasher,
    EnvCredentials, Gate, GateSettings, MemoryAttemptStore,
};
use secrecy::SecretString;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{services::ServeDir, trace::TraceLayer};

// 统一的应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: Arc<Gate>,
}

#[derive(Debug, Parser)]
#[command(name = "keystatic_gate", version, about = "Password gate for the Keystatic admin area")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 启动服务（默认）
    Serve,
    /// 生成 KEYSTATIC_PASSWORD_HASH，密码从标准输入读取
    HashPassword {
        #[arg(long, env = "KEYSTATIC_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::HashPassword { secret } => hash_password(secret),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::load()?;
    logger::init_logger(&config.logging)?;

    tracing::info!("配置加载成功");
    tracing::info!("服务器地址: {}:{}", config.server.host, config.server.port);
    tracing::info!("静态站点目录: {}", config.server.site_dir);
    tracing::info!(
        "受保护路径: {}，登录: POST {}",
        config.auth.protected_prefix,
        config.auth.login_path
    );
    tracing::info!(
        "锁定策略: {} 次失败后锁定 {} 分钟，会话有效期 {} 秒",
        config.auth.max_attempts,
        config.auth.lockout_minutes,
        config.auth.session_ttl_seconds
    );
    if config.auth.setup_mode {
        tracing::warn!("⚠️ 初始化模式已开启：未设置密码哈希时将接受第一次提交的密码");
    }

    let credentials = Arc::new(EnvCredentials::new(
        config.auth.secret_env.clone(),
        config.auth.password_hash_env.clone(),
    ));

    let gate = Arc::new(Gate::new(
        GateSettings::from(&config.auth),
        Arc::new(MemoryAttemptStore::new()),
        credentials,
        CredentialHasher::default(),
        Arc::new(SystemClock),
    ));

    // 定期清理过期的失败记录
    let sweeper = spawn_sweeper(
        gate.store(),
        gate.clock(),
        Duration::from_secs(config.auth.sweep_interval_seconds),
    );

    let config = Arc::new(config);
    let app_state = AppState {
        config: config.clone(),
        gate,
    };

    // 管理路由（只允许 localhost 访问）
    let admin_routes: Router<AppState> = Router::new()
        .route("/metrics", get(admin::metrics))
        .layer(middleware::from_fn(admin::loopback_only));

    let app = Router::new()
        .merge(admin_routes)
        .fallback_service(ServeDir::new(&config.server.site_dir))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            gate::gate_middleware,
        ))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 服务启动成功: http://{}", addr);
    tracing::info!("📈 指标接口: GET http://{}/metrics (仅localhost)", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("服务已停止");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("无法监听 Ctrl+C 信号: {}", e);
        return;
    }
    tracing::info!("收到关闭信号，正在停止服务");
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// 命令行：生成密码哈希
fn hash_password(secret: Option<String>) -> anyhow::Result<()> {
    println!("🔐 Keystatic Password Hash Generator\n");

    let password = read_line("Enter your password: ")?;
    let secret = match secret.filter(|s| !s.trim().is_empty()) {
        Some(secret) => secret,
        None => read_line("Enter KEYSTATIC_SECRET value: ")?,
    };

    if password.is_empty() || secret.trim().is_empty() {
        anyhow::bail!("Both password and secret are required");
    }
    if let Err(violation) = validate_format(&password) {
        anyhow::bail!("{}", violation.operator_message());
    }

    let hash = hash_blocking(&password, &SecretString::from(secret))?;

    println!("\n✅ Success! Generated password hash:\n");
    println!("{hash}");
    println!("\n📋 Set it in the server environment as:");
    println!("   KEYSTATIC_PASSWORD_HASH=<the hash above>");
    Ok(())
}
