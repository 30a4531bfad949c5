//! H.264 访问单元到 MP4 视频样本的转换.
//!
//! - 样本数据: 4 字节大端长度前缀, NAL 负载重新插入防竞争字节
//! - 时间戳: 由时间刻度与帧率推算, 按帧号取整避免累积漂移
//! - 同步样本: IDR 访问单元
//! - 合成时间: 由 [`SampleOrderTable`] 重排得到

use bytes::Bytes;
use liu_codec::parsers::h264::{AccessUnit, AvcDecoderConfig, AvcFrameParser, Sps};
use liu_core::{LiuError, LiuResult, Rational};
use log::debug;

use super::sample_order::{SampleOrderTable, rle_cts_offsets};

/// NAL 长度前缀字节数
pub const NAL_LENGTH_SIZE: usize = 4;

/// 样本时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTiming {
    /// 轨道时间刻度 (每秒刻度数)
    pub timescale: u32,
    /// 帧率 (帧/秒)
    pub frame_rate: Rational,
}

impl SampleTiming {
    pub fn new(timescale: u32, frame_rate: Rational) -> LiuResult<Self> {
        if timescale == 0 || !frame_rate.is_valid() {
            return Err(LiuError::InvalidArgument(format!(
                "MP4: 样本时间参数非法, timescale={}, frame_rate={}",
                timescale, frame_rate
            )));
        }
        Ok(Self {
            timescale,
            frame_rate,
        })
    }

    /// 优先使用 SPS VUI 中的帧率, 缺失时使用 `fallback`
    pub fn from_sps(sps: &Sps, timescale: u32, fallback: Rational) -> LiuResult<Self> {
        Self::new(timescale, sps.frame_rate().unwrap_or(fallback))
    }

    /// 第 `frame` 帧的起始时间 (时间刻度单位)
    pub fn time_of(&self, frame: u64) -> LiuResult<u64> {
        u64::from(self.timescale)
            .checked_mul(frame)
            .and_then(|ticks| self.frame_rate.mul_inverse(ticks))
            .ok_or_else(|| {
                LiuError::InvalidArgument(format!(
                    "MP4: 时间戳溢出, frame={}, timescale={}",
                    frame, self.timescale
                ))
            })
    }
}

/// 一个 MP4 视频样本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSample {
    /// 长度前缀格式的样本数据
    pub data: Bytes,
    /// 解码时间戳
    pub dts: u64,
    pub duration: u32,
    /// CTS - DTS
    pub cts_offset: i32,
    /// 同步样本 (IDR)
    pub is_sync: bool,
}

/// 访问单元 → 视频样本
///
/// 样本按段输出: [`push`](Self::push) 累积访问单元, [`finish_segment`](Self::finish_segment)
/// 以段内首个样本重新编号解码序号后重排, 回填合成时间偏移. 整条流只调用一次
/// `finish_segment` 即为非分段输出.
#[derive(Debug)]
pub struct AvcSampleBuilder {
    timing: SampleTiming,
    samples: Vec<VideoSample>,
    orders: SampleOrderTable,
    /// 当前段首个样本的全局帧号
    segment_start: u64,
}

impl AvcSampleBuilder {
    pub fn new(timing: SampleTiming) -> Self {
        Self {
            timing,
            samples: Vec::new(),
            orders: SampleOrderTable::new(),
            segment_start: 0,
        }
    }

    pub fn timing(&self) -> SampleTiming {
        self.timing
    }

    /// 当前段中待输出的样本数
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// 已输出的样本总数
    pub fn samples_emitted(&self) -> u64 {
        self.segment_start
    }

    pub fn push(&mut self, au: &AccessUnit) -> LiuResult<()> {
        let frame = self.segment_start + self.samples.len() as u64;
        let dts = self.timing.time_of(frame)?;
        let next = self.timing.time_of(frame + 1)?;
        let duration = u32::try_from(next - dts).map_err(|_| {
            LiuError::InvalidArgument(format!("MP4: 样本时长超出 32 位范围, frame={}", frame))
        })?;

        self.samples.push(VideoSample {
            data: au.to_length_prefixed()?,
            dts,
            duration,
            cts_offset: 0,
            is_sync: au.is_idr,
        });
        self.orders.push_access_unit(au);
        Ok(())
    }

    /// 重排当前段并取出其样本
    pub fn finish_segment(&mut self) -> LiuResult<Vec<VideoSample>> {
        let schedule = self.orders.take_segment();
        let base = self.segment_start;
        for (sample, &slot) in self.samples.iter_mut().zip(&schedule.slots) {
            let cts = self.timing.time_of(base + slot)?;
            let offset = i128::from(cts) - i128::from(sample.dts);
            sample.cts_offset = i32::try_from(offset).map_err(|_| {
                LiuError::InvalidArgument(format!(
                    "MP4: 合成时间偏移超出 32 位范围, dts={}, cts={}",
                    sample.dts, cts
                ))
            })?;
        }

        let samples = std::mem::take(&mut self.samples);
        self.segment_start += samples.len() as u64;
        debug!(
            "MP4: 输出段, 样本数={}, max_delta={}, 累计={}",
            samples.len(),
            schedule.max_delta,
            self.segment_start
        );
        Ok(samples)
    }
}

/// 视频轨道的解码器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcTrackConfig {
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    pub decoder_config: AvcDecoderConfig,
}

impl AvcTrackConfig {
    /// 由解析器已收集的参数集构建
    ///
    /// 从未出现 SPS 或 PPS 时返回 `InvalidFormat`, 此时无法封装.
    pub fn from_parser(parser: &AvcFrameParser) -> LiuResult<Self> {
        let sps_table = parser.sequence_parameter_sets();
        let decoder_config = AvcDecoderConfig::from_parameter_sets(
            sps_table,
            parser.picture_parameter_sets(),
            NAL_LENGTH_SIZE,
        )?;
        let Some(sps) = sps_table.iter().flatten().next() else {
            return Err(LiuError::InvalidFormat("MP4: 缺少 SPS".into()));
        };
        Ok(Self {
            width: sps.width,
            height: sps.height,
            sample_aspect_ratio: sps.sample_aspect_ratio(),
            decoder_config,
        })
    }

    /// avcC box 内容
    pub fn avcc(&self) -> LiuResult<Vec<u8>> {
        self.decoder_config.build()
    }
}

/// stts / ctts / stss 表项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTables {
    /// `(sample_count, sample_delta)`
    pub stts: Vec<(u32, u32)>,
    /// `(sample_count, sample_offset)`, 全部偏移为 0 时为空
    pub ctts: Vec<(u32, i32)>,
    /// 同步样本序号 (从 1 开始)
    pub stss: Vec<u32>,
}

impl SampleTables {
    pub fn from_samples(samples: &[VideoSample]) -> Self {
        let offsets: Vec<i32> = samples.iter().map(|s| s.cts_offset).collect();
        let ctts = if offsets.iter().any(|&offset| offset != 0) {
            rle_cts_offsets(&offsets)
        } else {
            Vec::new()
        };
        Self {
            stts: rle_durations(samples),
            ctts,
            stss: samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_sync)
                .map(|(i, _)| i as u32 + 1)
                .collect(),
        }
    }
}

/// RLE 压缩 duration 列表
fn rle_durations(samples: &[VideoSample]) -> Vec<(u32, u32)> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for sample in samples {
        if let Some((count, duration)) = entries.last_mut() {
            if *duration == sample.duration {
                *count += 1;
                continue;
            }
        }
        entries.push((1, sample.duration));
    }
    entries
}
