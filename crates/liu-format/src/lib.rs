//! # liu-format
//!
//! Liu 容器侧工具库: 将 H.264 访问单元整理为 MP4 视频样本.
//!
//! - 解码顺序 → 显示顺序重排, 合成时间偏移 (ctts)
//! - 长度前缀样本数据, 无漂移时间戳, 同步样本标记
//! - avcC 解码器配置

pub mod mp4;

// 重导出常用类型
pub use mp4::{AvcSampleBuilder, AvcTrackConfig, SampleOrderTable, SampleTiming, VideoSample};
