//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! SPS 包含编码视频序列的全局参数:
//! - Profile / Level 与 constraint_set 标志
//! - 图像宽高 (宏块单位, 应用 cropping 后换算为像素)
//! - frame_num 与 POC 计算所需的字段
//! - VUI 中的像素宽高比与帧率

use bitflags::bitflags;
use liu_core::bitreader::BitReader;
use liu_core::{LiuError, LiuResult, Rational};
use log::warn;

use super::nal::{NalUnit, NalUnitType};

bitflags! {
    /// constraint_set0..5 标志位 (与码流中的字节位序一致)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConstraintFlags: u8 {
        const SET0 = 0x80;
        const SET1 = 0x40;
        const SET2 = 0x20;
        const SET3 = 0x10;
        const SET4 = 0x08;
        const SET5 = 0x04;
    }
}

/// 帧裁剪偏移 (单位: cropping unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// VUI 中本库关心的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuiParameters {
    /// 像素宽高比, 未指定时为 1:1
    pub sar: Rational,
    /// 帧率 = time_scale / (2 * num_units_in_tick)
    pub frame_rate: Option<Rational>,
    /// fixed_frame_rate_flag
    pub fixed_frame_rate: bool,
}

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// profile_idc (66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    pub constraint_flags: ConstraintFlags,
    /// level_idc (30=3.0, 41=4.1)
    pub level_idc: u8,
    /// seq_parameter_set_id (0..=255)
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    /// 量化矩阵仅记录是否存在, 内容被跳过
    pub seq_scaling_matrix_present_flag: bool,
    pub log2_max_frame_num_minus4: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    /// 长度即 num_ref_frames_in_pic_order_cnt_cycle
    pub offset_for_ref_frame: Vec<i32>,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
    /// 像素宽度 (已应用 cropping)
    pub width: u32,
    /// 像素高度 (已应用 cropping)
    pub height: u32,
    pub vui: Option<VuiParameters>,
    /// 含头部与防竞争字节的原始 NAL 数据, 用于 avcC
    pub raw_bytes: Vec<u8>,
}

impl Sps {
    /// MaxFrameNum = 2^(log2_max_frame_num_minus4 + 4)
    pub fn max_frame_num(&self) -> u32 {
        1 << (self.log2_max_frame_num_minus4 + 4)
    }

    /// frame_num 字段的位数
    pub fn frame_num_bits(&self) -> u32 {
        self.log2_max_frame_num_minus4 + 4
    }

    /// MaxPicOrderCntLsb = 2^(log2_max_pic_order_cnt_lsb_minus4 + 4)
    pub fn max_pic_order_cnt_lsb(&self) -> u32 {
        1 << (self.log2_max_pic_order_cnt_lsb_minus4 + 4)
    }

    /// pic_order_cnt_lsb 字段的位数
    pub fn pic_order_cnt_lsb_bits(&self) -> u32 {
        self.log2_max_pic_order_cnt_lsb_minus4 + 4
    }

    /// PicSizeInMapUnits
    pub fn pic_size_in_map_units(&self) -> u32 {
        (self.pic_width_in_mbs_minus1 + 1).saturating_mul(self.pic_height_in_map_units_minus1 + 1)
    }

    /// ChromaArrayType
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        }
    }

    /// VUI 中的帧率
    pub fn frame_rate(&self) -> Option<Rational> {
        self.vui.and_then(|vui| vui.frame_rate)
    }

    /// 像素宽高比, 无 VUI 时为 1:1
    pub fn sample_aspect_ratio(&self) -> Rational {
        self.vui.map_or(Rational::ONE, |vui| vui.sar)
    }
}

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1)
const SAR_TABLE: [(u32, u32); 17] = [
    (0, 1),    // 0: 未指定
    (1, 1),    // 1: 1:1
    (12, 11),  // 2: 12:11
    (10, 11),  // 3: 10:11
    (16, 11),  // 4: 16:11
    (40, 33),  // 5: 40:33
    (24, 11),  // 6: 24:11
    (20, 11),  // 7: 20:11
    (32, 11),  // 8: 32:11
    (80, 33),  // 9: 80:33
    (18, 11),  // 10: 18:11
    (15, 11),  // 11: 15:11
    (64, 33),  // 12: 64:33
    (160, 99), // 13: 160:99
    (4, 3),    // 14: 4:3
    (3, 2),    // 15: 3:2
    (2, 1),    // 16: 2:1
];

const EXTENDED_SAR: u32 = 255;

/// 解码码流中的 SPS NAL 单元 (含头部字节与防竞争字节)
pub fn decode_sps(nal: &[u8]) -> LiuResult<Sps> {
    let nalu = NalUnit::parse(nal)?;
    if nalu.nal_type != NalUnitType::Sps {
        return Err(LiuError::InvalidArgument(format!(
            "H.264: 期望 SPS, 实际 NAL 类型={}",
            nalu.nal_type
        )));
    }
    parse_sps(&nalu)
}

/// 从已拆分的 NAL 单元解析 SPS
pub fn parse_sps(nalu: &NalUnit) -> LiuResult<Sps> {
    let mut sps = parse_sps_rbsp(nalu.payload())?;
    sps.raw_bytes = nalu.escaped();
    Ok(sps)
}

/// 从 RBSP (不含 NAL 头部) 解析 SPS, `raw_bytes` 留空
pub fn parse_sps_rbsp(rbsp: &[u8]) -> LiuResult<Sps> {
    if rbsp.len() < 3 {
        return Err(LiuError::InvalidFormat("H.264: SPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_flags = ConstraintFlags::from_bits_truncate(br.read_bits(8)? as u8);
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = br.read_ue()?;
    if sps_id > 255 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane_flag = false;
    let mut bit_depth_luma_minus8 = 0;
    let mut bit_depth_chroma_minus8 = 0;
    let mut qpprime_y_zero_transform_bypass_flag = false;
    let mut seq_scaling_matrix_present_flag = false;

    if is_high_profile(profile_idc) {
        chroma_format_idc = br.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = br.read_flag()?;
        }
        bit_depth_luma_minus8 = br.read_ue()?;
        bit_depth_chroma_minus8 = br.read_ue()?;
        if bit_depth_luma_minus8 > 6 || bit_depth_chroma_minus8 > 6 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: 位深非法, luma_minus8={}, chroma_minus8={}",
                bit_depth_luma_minus8, bit_depth_chroma_minus8
            )));
        }
        qpprime_y_zero_transform_bypass_flag = br.read_flag()?;
        seq_scaling_matrix_present_flag = br.read_flag()?;
        if seq_scaling_matrix_present_flag {
            let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
            skip_scaling_lists(&mut br, list_count)?;
        }
    }

    let log2_max_frame_num_minus4 = br.read_ue()?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }

    let pic_order_cnt_type = br.read_ue()?;
    if pic_order_cnt_type > 2 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: pic_order_cnt_type 非法, value={}",
            pic_order_cnt_type
        )));
    }
    let mut log2_max_pic_order_cnt_lsb_minus4 = 0;
    let mut delta_pic_order_always_zero_flag = false;
    let mut offset_for_non_ref_pic = 0;
    let mut offset_for_top_to_bottom_field = 0;
    let mut offset_for_ref_frame = Vec::new();
    match pic_order_cnt_type {
        0 => {
            log2_max_pic_order_cnt_lsb_minus4 = br.read_ue()?;
            if log2_max_pic_order_cnt_lsb_minus4 > 12 {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_pic_order_cnt_lsb_minus4
                )));
            }
        }
        1 => {
            delta_pic_order_always_zero_flag = br.read_flag()?;
            offset_for_non_ref_pic = br.read_se()?;
            offset_for_top_to_bottom_field = br.read_se()?;
            let num_ref_frames_in_cycle = br.read_ue()?;
            if num_ref_frames_in_cycle > 255 {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_frames_in_cycle
                )));
            }
            offset_for_ref_frame = (0..num_ref_frames_in_cycle)
                .map(|_| br.read_se())
                .collect::<LiuResult<Vec<_>>>()?;
        }
        _ => {}
    }

    let max_num_ref_frames = br.read_ue()?;
    let gaps_in_frame_num_value_allowed_flag = br.read_flag()?;
    let pic_width_in_mbs_minus1 = br.read_ue()?;
    let pic_height_in_map_units_minus1 = br.read_ue()?;
    let frame_mbs_only_flag = br.read_flag()?;
    let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
        false
    } else {
        br.read_flag()?
    };
    let direct_8x8_inference_flag = br.read_flag()?;

    let frame_cropping = if br.read_flag()? {
        Some(FrameCropping {
            left: br.read_ue()?,
            right: br.read_ue()?,
            top: br.read_ue()?,
            bottom: br.read_ue()?,
        })
    } else {
        None
    };

    let chroma_array_type = if separate_colour_plane_flag {
        0
    } else {
        chroma_format_idc
    };
    let (width, height) = picture_size(
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        chroma_array_type,
        frame_cropping.unwrap_or_default(),
    )?;

    // VUI 位于 POC 相关字段之后, 损坏时仅丢弃 VUI
    let vui = if br.read_flag().unwrap_or(false) {
        match parse_vui(&mut br) {
            Ok(vui) => Some(vui),
            Err(err) => {
                warn!("H.264: 忽略无法解析的 VUI, sps_id={}, err={}", sps_id, err);
                None
            }
        }
    } else {
        None
    };

    Ok(Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane_flag,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        qpprime_y_zero_transform_bypass_flag,
        seq_scaling_matrix_present_flag,
        log2_max_frame_num_minus4,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb_minus4,
        delta_pic_order_always_zero_flag,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        direct_8x8_inference_flag,
        frame_cropping,
        width,
        height,
        vui,
        raw_bytes: Vec::new(),
    })
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为携带 chroma_format_idc 等扩展字段的 profile
pub(crate) fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

/// 获取 cropping 单位 (CropUnitX, CropUnitY)
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        0 | 3 => 1,
        _ => 2,
    };
    let sub_height = match chroma_array_type {
        1 => 2,
        _ => 1,
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };
    (sub_width, sub_height * height_mult)
}

fn picture_size(
    width_in_mbs_minus1: u32,
    height_in_map_units_minus1: u32,
    frame_mbs_only: bool,
    chroma_array_type: u32,
    crop: FrameCropping,
) -> LiuResult<(u32, u32)> {
    let overflow = || LiuError::InvalidFormat("H.264: 计算图像尺寸时发生溢出".into());
    let raw_width = width_in_mbs_minus1
        .checked_add(1)
        .and_then(|v| v.checked_mul(16))
        .ok_or_else(overflow)?;
    let raw_height = height_in_map_units_minus1
        .checked_add(1)
        .and_then(|v| v.checked_mul(if frame_mbs_only { 16 } else { 32 }))
        .ok_or_else(overflow)?;

    let (unit_x, unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let crop_x = crop
        .left
        .checked_add(crop.right)
        .and_then(|v| v.checked_mul(unit_x))
        .ok_or_else(overflow)?;
    let crop_y = crop
        .top
        .checked_add(crop.bottom)
        .and_then(|v| v.checked_mul(unit_y))
        .ok_or_else(overflow)?;
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    Ok((raw_width - crop_x, raw_height - crop_y))
}

/// 跳过 scaling_list 语法, 仅消耗比特
pub(crate) fn skip_scaling_lists(br: &mut BitReader, list_count: usize) -> LiuResult<()> {
    for idx in 0..list_count {
        if !br.read_flag()? {
            continue;
        }
        let size = if idx < 6 { 16 } else { 64 };
        let mut last_scale = 8i64;
        let mut next_scale = 8i64;
        for _ in 0..size {
            if next_scale != 0 {
                let delta_scale = i64::from(br.read_se()?);
                next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
            }
            if next_scale != 0 {
                last_scale = next_scale;
            }
        }
    }
    Ok(())
}

/// 解析 VUI 参数, 读取到 timing_info 为止
fn parse_vui(br: &mut BitReader) -> LiuResult<VuiParameters> {
    let mut sar = Rational::ONE;

    // aspect_ratio_info_present_flag
    if br.read_flag()? {
        let ar_idc = br.read_bits(8)?;
        if ar_idc == EXTENDED_SAR {
            let sar_w = br.read_bits(16)?;
            let sar_h = br.read_bits(16)?;
            if sar_w == 0 || sar_h == 0 {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: VUI Extended_SAR 非法, sar_w={}, sar_h={}",
                    sar_w, sar_h
                )));
            }
            sar = Rational::new(sar_w, sar_h);
        } else if let Some(&(w, h)) = SAR_TABLE.get(ar_idc as usize) {
            if w > 0 {
                sar = Rational::new(w, h);
            }
        } else {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: VUI aspect_ratio_idc 非法, value={}",
                ar_idc
            )));
        }
    }

    // overscan_info_present_flag
    if br.read_flag()? {
        br.skip_bits(1)?;
    }

    // video_signal_type_present_flag
    if br.read_flag()? {
        br.skip_bits(4)?; // video_format + video_full_range_flag
        if br.read_flag()? {
            br.skip_bits(24)?; // colour_primaries, transfer, matrix
        }
    }

    // chroma_loc_info_present_flag
    if br.read_flag()? {
        br.read_ue()?;
        br.read_ue()?;
    }

    let mut frame_rate = None;
    let mut fixed_frame_rate = false;
    if br.read_flag()? {
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        fixed_frame_rate = br.read_flag()?;
        if num_units_in_tick == 0 || time_scale == 0 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: VUI timing_info 非法, num_units_in_tick={}, time_scale={}",
                num_units_in_tick, time_scale
            )));
        }
        frame_rate = Some(match num_units_in_tick.checked_mul(2) {
            Some(den) => Rational::new(time_scale, den).reduce(),
            None => Rational::new(time_scale / 2, num_units_in_tick).reduce(),
        });
    }

    Ok(VuiParameters {
        sar,
        frame_rate,
        fixed_frame_rate,
    })
}
