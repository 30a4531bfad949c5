//! # Liu (流)
//!
//! 纯 Rust 实现的 H.264 基本流解析工具.
//!
//! - **起始码扫描**: 任意分块输入, 去除防竞争字节
//! - **参数集与切片头**: SPS / PPS / 切片头完整语法
//! - **访问单元组装**: 按 7.4.1.2.4 检测图像边界
//! - **显示顺序**: 三种 POC 类型, 解码序到显示序重排与 MP4 合成时间
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use liu::codec::parsers::h264::AccessUnitReader;
//!
//! let file = std::fs::File::open("input.h264").unwrap();
//! for au in AccessUnitReader::new(file) {
//!     let au = au.unwrap();
//!     println!("decode={} display={} idr={}", au.decode_order, au.display_order, au.is_idr);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 错误类型, 比特读写, 有理数 |
//! | `liu-codec` | Annex B 扫描, H.264 解析, H.265 NAL 分类 |
//! | `liu-format` | MP4 样本重排与时间戳 |

pub mod logging;

/// 核心类型与工具
pub use liu_core as core;

/// 基本流解析
pub use liu_codec as codec;

/// MP4 样本整理
pub use liu_format as format;

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
