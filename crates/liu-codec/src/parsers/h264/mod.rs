//! H.264/AVC 码流解析器.
//!
//! - NAL 单元类型识别
//! - SPS / PPS / 切片头解析
//! - 访问单元组装与 POC 计算
//! - avcC 解码器配置记录

pub mod access_unit;
pub mod avcc;
pub mod nal;
pub mod poc;
pub mod pps;
pub mod reader;
pub mod slice;
pub mod sps;

#[cfg(any(test, feature = "test-util"))]
pub mod test_streams;

pub use access_unit::{AccessUnit, AvcFrameParser, AvcParserConfig, SliceContext, same_frame};
pub use avcc::{AvcDecoderConfig, AvcHighProfileExt};
pub use nal::{NalUnit, NalUnitType, split_length_prefixed};
pub use poc::{PictureOrder, PictureStructure, PocConfig, PocState};
pub use pps::{Pps, decode_pps};
pub use reader::AccessUnitReader;
pub use slice::{DecRefPicMarking, SliceHeader, SliceType, decode_slice_header};
pub use sps::{ConstraintFlags, FrameCropping, Sps, VuiParameters, decode_sps};

/// 参数集 ID 上限 (不含)
pub const MAX_PARAMETER_SET_COUNT: usize = 256;

/// 按 sps_id 索引的 SPS 表
pub type SpsTable = [Option<Sps>; MAX_PARAMETER_SET_COUNT];

/// 按 pps_id 索引的 PPS 表
pub type PpsTable = [Option<Pps>; MAX_PARAMETER_SET_COUNT];

/// 创建空 SPS 表
pub fn empty_sps_table() -> Box<SpsTable> {
    Box::new(std::array::from_fn(|_| None))
}

/// 创建空 PPS 表
pub fn empty_pps_table() -> Box<PpsTable> {
    Box::new(std::array::from_fn(|_| None))
}
