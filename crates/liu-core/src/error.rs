//! 统一错误类型定义.
//!
//! 所有 Liu crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Liu 统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 码流语法非法 (参数集越界, 引用的 SPS/PPS 缺失等)
    #[error("格式非法: {0}")]
    InvalidFormat(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 调用方式错误 (如流结束后继续送入数据)
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 比特读取越过缓冲区末尾
    #[error("已到达数据末尾")]
    Eof,
}

/// Liu 统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;
