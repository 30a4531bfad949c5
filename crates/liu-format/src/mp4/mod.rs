//! MP4 视频轨道的样本构建.
//!
//! Box 树序列化不在本模块范围内, 这里只产出样本数据、时间戳与
//! stts / ctts / stss 表项.

pub mod avc_sample;
pub mod sample_order;

pub use avc_sample::{AvcSampleBuilder, AvcTrackConfig, SampleTables, SampleTiming, VideoSample};
pub use sample_order::{CompositionSchedule, SampleOrder, SampleOrderTable, rle_cts_offsets};
