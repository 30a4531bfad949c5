//! H.265/HEVC NAL 单元分类.
//!
//! 复用 [`annexb`](crate::parsers::annexb) 的起始码扫描, 仅解析 2 字节 NAL 头.
//!
//! # HEVC NAL 头部 (2 字节)
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ forbidden(1) | type(6) | layer_id(6) | tid(3) │
//! └───────────────────────────────────────────────┘
//! ```

pub mod nal;

pub use nal::{HevcNalUnit, HevcNalUnitType, split_hevc_annex_b};
