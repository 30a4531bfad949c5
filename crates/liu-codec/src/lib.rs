//! # liu-codec
//!
//! Liu 视频基本流解析库.
//!
//! - Annex B 起始码扫描与防竞争字节处理
//! - H.264 参数集 / 切片头解析, 访问单元组装, POC 与显示顺序计算
//! - avcC 解码器配置记录
//! - H.265 NAL 头分类
//!
//! ## 使用示例
//!
//! ```rust
//! use liu_codec::parsers::h264::AvcFrameParser;
//!
//! let mut parser = AvcFrameParser::new();
//! let units = parser.feed_all(&[0x00, 0x00, 0x01, 0x09, 0xF0], true).unwrap();
//! assert!(units.is_empty());
//! ```

pub mod parsers;

// 重导出常用类型
pub use parsers::annexb::NalScanner;
pub use parsers::h264::{
    AccessUnit, AccessUnitReader, AvcDecoderConfig, AvcFrameParser, AvcParserConfig,
};
