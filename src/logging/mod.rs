//! 日志初始化: 控制台 + 按日滚动文件.
//!
//! 库 crate 通过 `log` 宏输出, 由 tracing-subscriber 的 `tracing-log` 桥接进入
//! 同一个订阅器. `targets` 可为单个解析模块单独设置级别, 例如
//! `{"liu_codec::parsers::annexb": "trace"}`.
//!
//! 文件名为 `<file_prefix>.<YYYY-MM-DD>.log`, 日期取 UTC (与 tracing-appender 的滚动一致).

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod retention;

use retention::RetentionPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 文件层默认级别
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_true")]
    pub compress_history: bool,
    /// 是否输出到控制台
    #[serde(default = "default_true")]
    pub console: bool,
    /// 按 target 覆盖级别, 键为模块路径
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    30
}

impl LoggingConfig {
    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取日志配置失败, path={}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("解析日志配置失败, path={}", path.display()))
    }

    /// 组合 EnvFilter 指令: `<base>,<target>=<level>,...`
    pub fn filter_directives(&self, base: &str) -> String {
        let mut directives = base.to_string();
        for (target, level) in &self.targets {
            directives.push_str(&format!(",{}={}", target, level));
        }
        directives
    }

    /// 指定日期的日志文件路径
    pub fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        Path::new(&self.directory).join(format!(
            "{}.{}.log",
            self.file_prefix,
            date.format("%Y-%m-%d")
        ))
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub fn init(config: LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    // 先整理历史文件, 避免压缩到当天正在写入的文件
    let today = Utc::now().date_naive();
    let sweep = RetentionPolicy::from_config(&config).sweep(today);

    let file_filter = EnvFilter::try_new(config.filter_directives(&config.level))
        .with_context(|| format!("日志级别配置非法, level={}", config.level))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| format!("打开日志文件失败, path={}", config.log_path_for(today).display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LineFormatter::FILE)
        .with_filter(file_filter);

    let console_layer = if config.console {
        let console_filter = EnvFilter::try_new(config.filter_directives("debug"))
            .context("控制台日志级别配置非法")?;
        Some(
            fmt::Layer::default()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .event_format(LineFormatter::CONSOLE)
                .with_filter(console_filter),
        )
    } else {
        None
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("安装日志订阅器失败")?;
    LOG_GUARD.set(guard).ok();

    match sweep {
        Ok(report) => tracing::debug!(
            "历史日志整理完成, compressed={}, removed={}, failed={}",
            report.compressed,
            report.removed,
            report.failed
        ),
        Err(err) => tracing::warn!("历史日志整理失败: {:#}", err),
    }
    Ok(())
}

/// `[时间] LEVEL target > 消息`
struct LineFormatter {
    timestamp: &'static str,
    ansi: bool,
}

impl LineFormatter {
    const CONSOLE: Self = Self {
        timestamp: "%m-%d %H:%M:%S%.3f",
        ansi: true,
    };
    const FILE: Self = Self {
        timestamp: "%Y-%m-%d %H:%M:%S%.3f",
        ansi: false,
    };
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(writer, "[{}] ", Local::now().format(self.timestamp))?;
        let level = format!("{:5}", meta.level().as_str());
        if self.ansi {
            let color = match *meta.level() {
                tracing::Level::ERROR => "31",
                tracing::Level::WARN => "33",
                tracing::Level::INFO => "32",
                _ => "34",
            };
            write!(writer, "\x1b[{}m{}\x1b[0m", color, level)?;
        } else {
            write!(writer, "{}", level)?;
        }
        write!(writer, " {} > ", meta.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
