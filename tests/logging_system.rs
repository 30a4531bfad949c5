use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use liu::logging::{LoggingConfig, init};

// 注意: 由于 tracing 的全局订阅器只能初始化一次,
// 涉及 init() 的测试必须单独运行或使用 #[ignore] 标记

fn temp_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("创建临时目录失败: {}", err),
    }
}

fn config_for(directory: &Path, level: &str, prefix: &str) -> LoggingConfig {
    LoggingConfig {
        level: level.to_string(),
        directory: directory.to_string_lossy().to_string(),
        file_prefix: prefix.to_string(),
        retention_days: 7,
        compress_history: false,
        console: false,
        targets: Default::default(),
    }
}

/// 获取当前日期的日志文件路径 (文件按 UTC 日期滚动)
fn today_log_path(directory: &Path, prefix: &str) -> PathBuf {
    config_for(directory, "info", prefix).log_path_for(chrono::Utc::now().date_naive())
}

fn read_log(path: &Path) -> String {
    // 文件层为非阻塞写入, 给后台线程留出时间
    std::thread::sleep(Duration::from_millis(200));
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => panic!("读取日志文件失败: {:?}, 错误: {}", path, err),
    }
}

#[test]
#[ignore] // 需要单独运行: cargo test --test logging_system test_logging_file_content -- --ignored
fn test_logging_file_content() {
    let dir = temp_dir();
    let log_dir = dir.path().join("nested").join("logs");
    assert!(!log_dir.exists(), "测试前日志目录不应该存在");

    let mut config = config_for(&log_dir, "info", "liu-test");
    config
        .targets
        .insert("liu_codec::parsers::annexb".to_string(), "trace".to_string());
    let result = init(config);
    assert!(result.is_ok(), "日志系统初始化应该成功: {:?}", result.err());
    assert!(log_dir.exists(), "嵌套日志目录应该被创建");

    tracing::error!("错误日志_ERROR_MSG");
    tracing::warn!("文件打开失败: 路径={}", "/测试/路径.h264");
    tracing::info!("信息日志_INFO_MSG");
    tracing::debug!("调试日志_DEBUG_MSG"); // 应该被过滤掉
    // 库 crate 使用 log 宏, 经桥接后写入同一文件
    log::info!(target: "liu_codec::parsers::h264", "桥接日志_LOG_MSG");
    // 按模块覆盖的级别
    log::trace!(target: "liu_codec::parsers::annexb", "扫描日志_TRACE_MSG");
    log::trace!(target: "liu_codec::parsers::h264", "切片日志_TRACE_MSG");

    let content = read_log(&today_log_path(&log_dir, "liu-test"));
    assert!(content.contains("错误日志_ERROR_MSG"), "应该包含错误日志");
    assert!(content.contains("/测试/路径.h264"), "应该包含中文路径");
    assert!(content.contains("信息日志_INFO_MSG"), "应该包含信息日志");
    assert!(content.contains("INFO"), "日志应该包含 INFO 级别标记");
    assert!(
        !content.contains("调试日志_DEBUG_MSG"),
        "debug 日志应该被过滤掉, 文件内容:\n{}",
        content
    );
    assert!(content.contains("桥接日志_LOG_MSG"), "log 宏输出应该被桥接");
    assert!(content.contains("扫描日志_TRACE_MSG"), "annexb 模块应该输出 trace 日志");
    assert!(!content.contains("切片日志_TRACE_MSG"), "h264 模块应该沿用默认级别");
    assert!(
        content.contains("liu_codec::parsers::h264"),
        "日志行应该包含 target"
    );

    // 再次初始化应返回错误而不是 panic
    assert!(init(config_for(&log_dir, "info", "liu-test")).is_err());
}

#[test]
fn test_logging_file_naming_format() {
    for prefix in ["liu", "liu-scan", "liu-mux"] {
        let path = today_log_path(Path::new("logs"), prefix);
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            panic!("日志路径缺少文件名");
        };
        let today = chrono::Utc::now().date_naive();

        assert!(file_name.starts_with(prefix), "文件名应该以前缀 {} 开头", prefix);
        assert!(file_name.ends_with(".log"), "文件名应该以 .log 结尾");
        assert!(
            file_name.contains(&today.year().to_string()),
            "文件名应该包含年份"
        );
    }
}

#[test]
fn test_logging_config_from_json_file() {
    let dir = temp_dir();
    let path = dir.path().join("logging.json");
    let json = r#"{"level": "debug", "directory": "logs", "file_prefix": "liu"}"#;
    if let Err(err) = fs::write(&path, json) {
        panic!("写入配置文件失败: {}", err);
    }

    let config = match LoggingConfig::from_json_file(&path) {
        Ok(config) => config,
        Err(err) => panic!("加载日志配置失败: {}", err),
    };
    assert_eq!(config.level, "debug");
    assert_eq!(config.file_prefix, "liu");
    assert_eq!(config.retention_days, 30, "默认保留天数应该是 30");
    assert!(config.compress_history, "默认应该开启压缩");
    assert!(config.console, "默认应该输出到控制台");
}

#[test]
fn test_logging_config_from_missing_file() {
    let dir = temp_dir();
    let result = LoggingConfig::from_json_file(dir.path().join("missing.json"));
    let err = match result {
        Err(err) => err,
        Ok(config) => panic!("不存在的配置文件应返回错误: {:?}", config),
    };
    assert!(format!("{err}").contains("读取日志配置失败"), "err={}", err);
}
