//! 解码顺序到显示顺序的重排, 计算 MP4 合成时间 (CTS).
//!
//! 每个 GOP 以 IDR 或 POC 为 0 的样本开始 (首个样本总是开始一个 GOP), GOP 内按
//! 有符号 POC 稳定排序, 排序后第 i 个位置的样本获得合成时间槽 `i + max_delta`,
//! 其中 `max_delta = max(decode_order[i] - i)` 为整条流共用的重排延迟.
//!
//! 开放 GOP 的前导图像 POC 为负, 按有符号值排在 I 帧之前, 不会开始新的 GOP.

use liu_codec::parsers::h264::AccessUnit;
use liu_core::{LiuError, LiuResult};
use log::{debug, warn};

/// 单个样本的解码序号与显示序号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOrder {
    pub decode_order: u32,
    /// 有符号显示序号 (POC)
    pub display_order: i32,
    pub starts_gop: bool,
}

/// 样本顺序记录
#[derive(Debug, Clone, Default)]
pub struct SampleOrderTable {
    orders: Vec<SampleOrder>,
}

impl SampleOrderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录无符号显示序号, 显示序号 0 开始新的 GOP
    pub fn push(&mut self, decode_order: u32, display_order: u32) {
        self.orders.push(SampleOrder {
            decode_order,
            display_order: i32::try_from(display_order).unwrap_or(i32::MAX),
            starts_gop: display_order == 0,
        });
    }

    pub fn push_access_unit(&mut self, au: &AccessUnit) {
        self.orders.push(SampleOrder {
            decode_order: au.decode_order,
            display_order: au.picture_order_count,
            starts_gop: au.is_idr || au.picture_order_count == 0,
        });
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> &[SampleOrder] {
        &self.orders
    }

    /// 以首个样本的解码序号为基准重新编号 (分段输出)
    ///
    /// 小于基准的序号保持不变.
    pub fn rebase(&mut self) {
        let Some(base) = self.orders.first().map(|order| order.decode_order) else {
            return;
        };
        for order in &mut self.orders {
            if order.decode_order >= base {
                order.decode_order -= base;
            }
        }
    }

    /// 按 GOP 排序后的显示顺序
    pub fn display_sequence(&self) -> Vec<SampleOrder> {
        let mut sorted = self.orders.clone();
        let mut start = 0;
        for i in 1..=sorted.len() {
            if i == sorted.len() || sorted[i].starts_gop {
                sorted[start..i].sort_by_key(|order| order.display_order);
                start = i;
            }
        }
        sorted
    }

    /// 计算合成时间槽
    pub fn resolve(&self) -> CompositionSchedule {
        let sorted = self.display_sequence();
        let max_delta = sorted
            .iter()
            .enumerate()
            .filter_map(|(i, order)| {
                let position = i as u64;
                let decode = u64::from(order.decode_order);
                (decode > position).then(|| decode - position)
            })
            .max()
            .unwrap_or(0);

        let count = sorted.len();
        // 未被覆盖的槽位退化为解码位置 (偏移 0)
        let mut slots: Vec<u64> = (0..count as u64).collect();
        for (i, order) in sorted.iter().enumerate() {
            let decode = order.decode_order as usize;
            match slots.get_mut(decode) {
                Some(slot) => *slot = i as u64 + max_delta,
                None => warn!(
                    "重排: 解码序号超出样本数, decode_order={}, count={}",
                    order.decode_order, count
                ),
            }
        }
        debug!("重排: 样本数={}, max_delta={}", count, max_delta);
        CompositionSchedule { max_delta, slots }
    }

    /// 重排当前记录并清空, 用于逐段输出
    pub fn take_segment(&mut self) -> CompositionSchedule {
        self.rebase();
        let schedule = self.resolve();
        self.orders.clear();
        schedule
    }
}

/// 按解码顺序排列的合成时间槽 (单位: 帧)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionSchedule {
    /// 重排延迟 (帧)
    pub max_delta: u64,
    /// `slots[k]` 为第 k 个解码样本的合成时间槽
    pub slots: Vec<u64>,
}

impl CompositionSchedule {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 以固定帧时长计算各样本 CTS
    pub fn composition_times(&self, frame_duration: u64) -> Vec<u64> {
        self.slots.iter().map(|slot| slot * frame_duration).collect()
    }

    /// 各样本 CTS - DTS, 其中 DTS = `frame_duration * 解码位置`
    pub fn composition_offsets(&self, frame_duration: u64) -> LiuResult<Vec<i32>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, &slot)| {
                let delta = i128::from(slot) - index as i128;
                let offset = delta * i128::from(frame_duration);
                i32::try_from(offset).map_err(|_| {
                    LiuError::InvalidArgument(format!(
                        "重排: 合成时间偏移超出 32 位范围, index={}, offset={}",
                        index, offset
                    ))
                })
            })
            .collect()
    }
}

/// RLE 压缩 CTS 偏移, 得到 ctts 表项 `(sample_count, sample_offset)`
pub fn rle_cts_offsets(offsets: &[i32]) -> Vec<(u32, i32)> {
    let mut entries: Vec<(u32, i32)> = Vec::new();
    for &offset in offsets {
        if let Some((count, last)) = entries.last_mut() {
            if *last == offset {
                *count += 1;
                continue;
            }
        }
        entries.push((1, offset));
    }
    entries
}
