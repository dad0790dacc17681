use crate::config::LoggingConfig;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "keystatic_gate=info,tower_http=info";

/// 初始化日志系统
///
/// - 控制台输出，RFC3339 时间戳
/// - 可选按日期滚动的日志文件，后台任务清理旧文件
/// - 过滤规则取自 `RUST_LOG`，未设置时使用 [`DEFAULT_FILTER`]
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        time::UtcOffset::UTC,
        time::format_description::well_known::Rfc3339,
    );

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer.clone())
        .with_target(true)
        .with_thread_ids(false);

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.dir)?;
        // 文件名形如 keystatic_gate.2024-05-01.log
        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(&config.dir)?;

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_timer(timer)
                .with_ansi(false) // 文件中不使用颜色代码
                .with_target(true)
                .with_thread_ids(true),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    if config.file_output {
        tokio::spawn(log_rotation_task(config.clone()));
    }

    Ok(())
}

/// 后台任务：每小时清理一次旧日志文件
async fn log_rotation_task(config: LoggingConfig) {
    use tokio::time::{interval, Duration};

    let mut interval = interval(Duration::from_secs(60 * 60));

    loop {
        interval.tick().await;

        match prune_log_files(Path::new(&config.dir), &config.file_prefix, config.max_files).await {
            Ok(removed) => {
                for path in removed {
                    tracing::info!("删除旧日志文件: {:?}", path);
                }
            }
            Err(e) => tracing::warn!("日志文件管理失败: {}", e),
        }
    }
}

/// 只保留最新的 `max_files` 个日志文件，返回被删除的路径
async fn prune_log_files(dir: &Path, prefix: &str, max_files: usize) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut target_files = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name.starts_with(prefix) && file_name.ends_with(".log") {
            let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
            target_files.push((path, modified));
        }
    }

    // 按修改时间排序（最新的在前）
    target_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = Vec::new();
    for (path, _) in target_files.into_iter().skip(max_files) {
        tokio::fs::remove_file(&path).await?;
        removed.push(path);
    }

    Ok(removed)
}
