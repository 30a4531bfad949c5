//! 历史日志整理: 压缩今天以前的 `.log`, 删除超出保留天数的文件.
//!
//! 只在 `init` 时执行一次, 单个文件失败计入 `failed` 后继续.

use super::LoggingConfig;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFileKind {
    Plain,
    Gzip,
}

/// 一次整理的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct SweepReport {
    pub compressed: usize,
    pub removed: usize,
    pub failed: usize,
}

pub(super) struct RetentionPolicy<'a> {
    directory: &'a Path,
    prefix: &'a str,
    keep_days: i64,
    compress: bool,
}

impl<'a> RetentionPolicy<'a> {
    pub(super) fn from_config(config: &'a LoggingConfig) -> Self {
        Self {
            directory: Path::new(&config.directory),
            prefix: &config.file_prefix,
            keep_days: config.retention_days.max(0),
            compress: config.compress_history,
        }
    }

    /// 以 `today` 为基准整理目录
    pub(super) fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if !self.directory.exists() {
            return Ok(report);
        }
        let cutoff = today - ChronoDuration::days(self.keep_days);

        let entries = fs::read_dir(self.directory)
            .with_context(|| format!("读取日志目录失败, path={}", self.directory.display()))?;
        for entry in entries {
            let path = entry?.path();
            let Some((date, kind)) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| classify(name, self.prefix))
            else {
                continue;
            };

            let outcome = if date < cutoff {
                fs::remove_file(&path).map(|()| report.removed += 1)
            } else if self.compress && kind == LogFileKind::Plain && date < today {
                gzip_in_place(&path).map(|()| report.compressed += 1)
            } else {
                Ok(())
            };
            if outcome.is_err() {
                report.failed += 1;
            }
        }
        Ok(report)
    }
}

/// 识别 `<prefix>.<YYYY-MM-DD>.log[.gz]`
fn classify(file_name: &str, prefix: &str) -> Option<(NaiveDate, LogFileKind)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, kind) = match rest.strip_suffix(".log.gz") {
        Some(date_part) => (date_part, LogFileKind::Gzip),
        None => (rest.strip_suffix(".log")?, LogFileKind::Plain),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, kind))
}

/// 压缩为同名 `.gz` 并删除原文件; 已存在 `.gz` 时保留原文件不动
fn gzip_in_place(path: &Path) -> io::Result<()> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);
    if gz_path.exists() {
        return Ok(());
    }

    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)
}
