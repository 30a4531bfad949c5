//! 视频基本流解析器.

pub mod annexb;
pub mod h264;
pub mod h265;
