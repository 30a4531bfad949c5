//! 图像顺序计数 (Picture Order Count) 计算.
//!
//! 实现 ITU-T H.264 8.2.1 中的三种 POC 类型. 跨图像状态 (前一参考图像的
//! POC msb/lsb, frame_num 与 FrameNumOffset) 保存在 [`PocState`] 中.

use super::slice::SliceHeader;
use super::sps::Sps;

/// POC 计算所需的 SPS 字段快照
///
/// 访问单元闭合时使用切片解码时刻的 SPS, 之后到达的同 ID SPS 不影响结果.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PocConfig {
    pub pic_order_cnt_type: u32,
    pub max_frame_num: u32,
    pub max_pic_order_cnt_lsb: u32,
    pub frame_mbs_only_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,
}

impl From<&Sps> for PocConfig {
    fn from(sps: &Sps) -> Self {
        Self {
            pic_order_cnt_type: sps.pic_order_cnt_type,
            max_frame_num: sps.max_frame_num(),
            max_pic_order_cnt_lsb: sps.max_pic_order_cnt_lsb(),
            frame_mbs_only_flag: sps.frame_mbs_only_flag,
            offset_for_non_ref_pic: sps.offset_for_non_ref_pic,
            offset_for_top_to_bottom_field: sps.offset_for_top_to_bottom_field,
            offset_for_ref_frame: sps.offset_for_ref_frame.clone(),
        }
    }
}

/// 图像结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureStructure {
    Frame,
    TopField,
    BottomField,
}

impl PictureStructure {
    /// 由 frame_mbs_only_flag 与 field_pic_flag / bottom_field_flag 判定
    ///
    /// frame_mbs_only_flag 为 1 时码流中不存在场编码, 场标志被忽略.
    pub fn derive(frame_mbs_only_flag: bool, sh: &SliceHeader) -> Self {
        match (frame_mbs_only_flag, sh.field_pic_flag, sh.bottom_field_flag) {
            (true, _, _) | (false, false, _) => Self::Frame,
            (false, true, false) => Self::TopField,
            (false, true, true) => Self::BottomField,
        }
    }
}

/// 单幅图像的 POC 计算结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureOrder {
    pub structure: PictureStructure,
    pub top_field_order_cnt: i32,
    pub bottom_field_order_cnt: i32,
}

impl PictureOrder {
    /// 图像 POC: 帧取两场的较小值, 场取自身的值
    pub fn picture_order_count(&self) -> i32 {
        match self.structure {
            PictureStructure::Frame => self.top_field_order_cnt.min(self.bottom_field_order_cnt),
            PictureStructure::TopField => self.top_field_order_cnt,
            PictureStructure::BottomField => self.bottom_field_order_cnt,
        }
    }
}

/// 跨图像 POC 状态
///
/// 初始状态等同于紧跟在一幅 IDR 图像之后.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PocState {
    prev_frame_num: u32,
    prev_frame_num_offset: i64,
    prev_pic_order_cnt_msb: i64,
    prev_pic_order_cnt_lsb: i64,
}

impl PocState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算一幅图像的 POC 并更新状态
    ///
    /// `sh` 为该图像最后一个切片的切片头.
    pub fn compute(
        &mut self,
        config: &PocConfig,
        sh: &SliceHeader,
        is_idr: bool,
        nal_ref_idc: u8,
    ) -> PictureOrder {
        let structure = PictureStructure::derive(config.frame_mbs_only_flag, sh);
        let frame_num = i64::from(sh.frame_num);
        let frame_num_offset = if is_idr {
            0
        } else if self.prev_frame_num > sh.frame_num {
            self.prev_frame_num_offset + i64::from(config.max_frame_num)
        } else {
            self.prev_frame_num_offset
        };

        let (top, bottom) = match config.pic_order_cnt_type {
            0 => self.lsb_based_order(config, sh, structure, is_idr, nal_ref_idc),
            1 => cycle_based_order(config, sh, structure, frame_num_offset + frame_num, nal_ref_idc),
            _ => {
                let order = if is_idr {
                    0
                } else if nal_ref_idc == 0 {
                    2 * (frame_num_offset + frame_num) - 1
                } else {
                    2 * (frame_num_offset + frame_num)
                };
                (order, order)
            }
        };

        self.prev_frame_num = sh.frame_num;
        self.prev_frame_num_offset = frame_num_offset;
        if nal_ref_idc != 0 && sh.has_mmco5() {
            // memory_management_control_operation 5 之后按 frame_num = 0 处理
            self.prev_frame_num = 0;
            self.prev_frame_num_offset = 0;
            if config.pic_order_cnt_type == 0 {
                self.prev_pic_order_cnt_msb = 0;
                self.prev_pic_order_cnt_lsb = match structure {
                    PictureStructure::Frame => top - top.min(bottom),
                    _ => 0,
                };
            }
        }

        PictureOrder {
            structure,
            top_field_order_cnt: saturate(top),
            bottom_field_order_cnt: saturate(bottom),
        }
    }

    fn lsb_based_order(
        &mut self,
        config: &PocConfig,
        sh: &SliceHeader,
        structure: PictureStructure,
        is_idr: bool,
        nal_ref_idc: u8,
    ) -> (i64, i64) {
        if is_idr {
            self.prev_pic_order_cnt_msb = 0;
            self.prev_pic_order_cnt_lsb = 0;
        }
        let max_lsb = i64::from(config.max_pic_order_cnt_lsb);
        let lsb = i64::from(sh.pic_order_cnt_lsb);
        let prev_lsb = self.prev_pic_order_cnt_lsb;
        let msb = if lsb < prev_lsb && prev_lsb - lsb >= max_lsb / 2 {
            self.prev_pic_order_cnt_msb + max_lsb
        } else if lsb > prev_lsb && lsb - prev_lsb > max_lsb / 2 {
            self.prev_pic_order_cnt_msb - max_lsb
        } else {
            self.prev_pic_order_cnt_msb
        };

        let top = msb + lsb;
        let bottom = match structure {
            PictureStructure::Frame => top + i64::from(sh.delta_pic_order_cnt[0]),
            _ => top,
        };
        if nal_ref_idc != 0 {
            self.prev_pic_order_cnt_msb = msb;
            self.prev_pic_order_cnt_lsb = lsb;
        }
        (top, bottom)
    }
}

fn cycle_based_order(
    config: &PocConfig,
    sh: &SliceHeader,
    structure: PictureStructure,
    frame_num_total: i64,
    nal_ref_idc: u8,
) -> (i64, i64) {
    let cycle = &config.offset_for_ref_frame;
    let cycle_len = cycle.len() as i64;
    let mut abs_frame_num = if cycle_len != 0 { frame_num_total } else { 0 };
    if nal_ref_idc == 0 && abs_frame_num > 0 {
        abs_frame_num -= 1;
    }

    let mut expected = 0i64;
    if abs_frame_num > 0 {
        let cycle_cnt = (abs_frame_num - 1) / cycle_len;
        let frame_num_in_cycle = ((abs_frame_num - 1) % cycle_len) as usize;
        let delta_per_cycle: i64 = cycle.iter().map(|&v| i64::from(v)).sum();
        expected = cycle_cnt * delta_per_cycle
            + cycle[..=frame_num_in_cycle]
                .iter()
                .map(|&v| i64::from(v))
                .sum::<i64>();
    }
    if nal_ref_idc == 0 {
        expected += i64::from(config.offset_for_non_ref_pic);
    }

    let delta0 = i64::from(sh.delta_pic_order_cnt[0]);
    let top_to_bottom = i64::from(config.offset_for_top_to_bottom_field);
    match structure {
        PictureStructure::Frame => {
            let top = expected + delta0;
            (top, top + top_to_bottom + i64::from(sh.delta_pic_order_cnt[1]))
        }
        PictureStructure::TopField => {
            let top = expected + delta0;
            (top, top)
        }
        PictureStructure::BottomField => {
            let bottom = expected + top_to_bottom + delta0;
            (bottom, bottom)
        }
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
