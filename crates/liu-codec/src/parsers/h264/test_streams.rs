//! 测试用的 H.264 码流构造工具.
//!
//! 单元测试直接使用; 集成测试与基准测试通过 `test-util` 特性引用.

use liu_core::BitWriter;

use crate::parsers::annexb::add_emulation_prevention;

#[derive(Debug, Clone)]
pub struct SpsParams {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub log2_max_frame_num_minus4: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb_minus4: u32,
    pub delta_pic_order_always_zero: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,
    pub width_in_mbs_minus1: u32,
    pub height_in_map_units_minus1: u32,
    pub frame_mbs_only: bool,
    /// left, right, top, bottom
    pub crop: Option<[u32; 4]>,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
}

impl Default for SpsParams {
    fn default() -> Self {
        Self {
            profile_idc: 66,
            constraint_flags: 0,
            level_idc: 30,
            sps_id: 0,
            chroma_format_idc: 1,
            log2_max_frame_num_minus4: 0,
            poc_type: 0,
            log2_max_poc_lsb_minus4: 2,
            delta_pic_order_always_zero: false,
            offset_for_non_ref_pic: 0,
            offset_for_top_to_bottom_field: 0,
            offset_for_ref_frame: Vec::new(),
            width_in_mbs_minus1: 79,
            height_in_map_units_minus1: 44,
            frame_mbs_only: true,
            crop: None,
            timing: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PpsParams {
    pub pps_id: u32,
    pub sps_id: u32,
    pub entropy_coding: bool,
    pub pic_order_present: bool,
    pub redundant_pic_cnt_present: bool,
    pub deblocking_control: bool,
    /// Some 时写入 transform_8x8_mode_flag 等扩展字段
    pub transform_8x8: Option<bool>,
    /// 扩展字段中写入全部缺省的缩放矩阵
    pub scaling_matrix: bool,
    /// 仅用于确定缩放矩阵数目, 应与引用的 SPS 一致
    pub chroma_format_idc: u32,
    pub second_chroma_qp_offset: i32,
}

impl Default for PpsParams {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            entropy_coding: false,
            pic_order_present: false,
            redundant_pic_cnt_present: false,
            deblocking_control: true,
            transform_8x8: None,
            scaling_matrix: false,
            chroma_format_idc: 1,
            second_chroma_qp_offset: -2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SliceParams {
    pub first_mb: u32,
    pub slice_type: u32,
    pub pps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub idr_pic_id: u32,
    pub poc_lsb: u32,
    pub delta_pic_order_cnt: [i32; 2],
    pub mmco5: bool,
    pub qp_delta: i32,
}

impl Default for SliceParams {
    fn default() -> Self {
        Self {
            first_mb: 0,
            slice_type: 7,
            pps_id: 0,
            frame_num: 0,
            field_pic: false,
            bottom_field: false,
            idr_pic_id: 0,
            poc_lsb: 0,
            delta_pic_order_cnt: [0, 0],
            mmco5: false,
            qp_delta: 0,
        }
    }
}

fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

pub fn sps_rbsp(p: &SpsParams) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(u32::from(p.profile_idc), 8);
    bw.write_bits(u32::from(p.constraint_flags), 8);
    bw.write_bits(u32::from(p.level_idc), 8);
    bw.write_ue(p.sps_id);
    if is_high_profile(p.profile_idc) {
        bw.write_ue(p.chroma_format_idc);
        if p.chroma_format_idc == 3 {
            bw.write_flag(false);
        }
        bw.write_ue(0); // bit_depth_luma_minus8
        bw.write_ue(0); // bit_depth_chroma_minus8
        bw.write_flag(false);
        bw.write_flag(false);
    }
    bw.write_ue(p.log2_max_frame_num_minus4);
    bw.write_ue(p.poc_type);
    match p.poc_type {
        0 => bw.write_ue(p.log2_max_poc_lsb_minus4),
        1 => {
            bw.write_flag(p.delta_pic_order_always_zero);
            bw.write_se(p.offset_for_non_ref_pic);
            bw.write_se(p.offset_for_top_to_bottom_field);
            bw.write_ue(p.offset_for_ref_frame.len() as u32);
            for &offset in &p.offset_for_ref_frame {
                bw.write_se(offset);
            }
        }
        _ => {}
    }
    bw.write_ue(1); // max_num_ref_frames
    bw.write_flag(false);
    bw.write_ue(p.width_in_mbs_minus1);
    bw.write_ue(p.height_in_map_units_minus1);
    bw.write_flag(p.frame_mbs_only);
    if !p.frame_mbs_only {
        bw.write_flag(false);
    }
    bw.write_flag(true); // direct_8x8_inference_flag
    match p.crop {
        Some(crop) => {
            bw.write_flag(true);
            for offset in crop {
                bw.write_ue(offset);
            }
        }
        None => bw.write_flag(false),
    }
    match p.timing {
        Some((num_units_in_tick, time_scale)) => {
            bw.write_flag(true);
            bw.write_flag(false); // aspect_ratio_info_present_flag
            bw.write_flag(false); // overscan_info_present_flag
            bw.write_flag(false); // video_signal_type_present_flag
            bw.write_flag(false); // chroma_loc_info_present_flag
            bw.write_flag(true); // timing_info_present_flag
            bw.write_bits(num_units_in_tick, 32);
            bw.write_bits(time_scale, 32);
            bw.write_flag(true);
            bw.write_flag(false); // nal_hrd
            bw.write_flag(false); // vcl_hrd
            bw.write_flag(false); // pic_struct_present_flag
            bw.write_flag(false); // bitstream_restriction_flag
        }
        None => bw.write_flag(false),
    }
    bw.write_rbsp_trailing_bits();
    bw.finish()
}

pub fn sps_nal(p: &SpsParams) -> Vec<u8> {
    with_header(0x67, sps_rbsp(p))
}

pub fn pps_rbsp(p: &PpsParams) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(p.pps_id);
    bw.write_ue(p.sps_id);
    bw.write_flag(p.entropy_coding);
    bw.write_flag(p.pic_order_present);
    bw.write_ue(0); // num_slice_groups_minus1
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(false); // weighted_pred_flag
    bw.write_bits(0, 2);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_flag(p.deblocking_control);
    bw.write_flag(false);
    bw.write_flag(p.redundant_pic_cnt_present);
    if let Some(transform_8x8) = p.transform_8x8 {
        bw.write_flag(transform_8x8);
        bw.write_flag(p.scaling_matrix);
        if p.scaling_matrix {
            let lists_8x8 = match (transform_8x8, p.chroma_format_idc) {
                (false, _) => 0,
                (true, 3) => 6,
                (true, _) => 2,
            };
            for _ in 0..6 + lists_8x8 {
                bw.write_flag(false); // pic_scaling_list_present_flag
            }
        }
        bw.write_se(p.second_chroma_qp_offset);
    }
    bw.write_rbsp_trailing_bits();
    bw.finish()
}

pub fn pps_nal(p: &PpsParams) -> Vec<u8> {
    with_header(0x68, pps_rbsp(p))
}

/// 构造切片 RBSP (切片头 + 一段伪宏块数据)
pub fn slice_rbsp(
    sps: &SpsParams,
    pps: &PpsParams,
    s: &SliceParams,
    nal_unit_type: u8,
    nal_ref_idc: u8,
) -> Vec<u8> {
    let kind = s.slice_type % 5;
    let mut bw = BitWriter::new();
    bw.write_ue(s.first_mb);
    bw.write_ue(s.slice_type);
    bw.write_ue(s.pps_id);
    bw.write_bits(s.frame_num, sps.log2_max_frame_num_minus4 + 4);
    if !sps.frame_mbs_only {
        bw.write_flag(s.field_pic);
        if s.field_pic {
            bw.write_flag(s.bottom_field);
        }
    }
    if nal_unit_type == 5 {
        bw.write_ue(s.idr_pic_id);
    }
    match sps.poc_type {
        0 => {
            bw.write_bits(s.poc_lsb, sps.log2_max_poc_lsb_minus4 + 4);
            if pps.pic_order_present && !s.field_pic {
                bw.write_se(s.delta_pic_order_cnt[0]);
            }
        }
        1 if !sps.delta_pic_order_always_zero => {
            bw.write_se(s.delta_pic_order_cnt[0]);
            if pps.pic_order_present && !s.field_pic {
                bw.write_se(s.delta_pic_order_cnt[1]);
            }
        }
        _ => {}
    }
    if pps.redundant_pic_cnt_present {
        bw.write_ue(0);
    }
    if kind == 1 {
        bw.write_flag(true); // direct_spatial_mv_pred_flag
    }
    if matches!(kind, 0 | 1 | 3) {
        bw.write_flag(false); // num_ref_idx_active_override_flag
    }
    if kind != 2 && kind != 4 {
        bw.write_flag(false); // ref_pic_list_modification_flag_l0
    }
    if kind == 1 {
        bw.write_flag(false); // ref_pic_list_modification_flag_l1
    }
    if nal_ref_idc != 0 {
        if nal_unit_type == 5 {
            bw.write_flag(false);
            bw.write_flag(false);
        } else if s.mmco5 {
            bw.write_flag(true);
            bw.write_ue(5);
            bw.write_ue(0);
        } else {
            bw.write_flag(false);
        }
    }
    if pps.entropy_coding && kind != 2 && kind != 4 {
        bw.write_ue(0); // cabac_init_idc
    }
    bw.write_se(s.qp_delta);
    if pps.deblocking_control {
        bw.write_ue(0);
        bw.write_se(0);
        bw.write_se(0);
    }
    // 伪宏块数据: 对齐后写入需要防竞争的字节序列
    while !bw.is_byte_aligned() {
        bw.write_bit(1);
    }
    bw.write_bits(0x0000_01AB, 32);
    bw.write_bits(0x0000, 16);
    bw.write_bits(0x02, 8);
    bw.write_rbsp_trailing_bits();
    bw.finish()
}

pub fn slice_nal(
    sps: &SpsParams,
    pps: &PpsParams,
    s: &SliceParams,
    nal_unit_type: u8,
    nal_ref_idc: u8,
) -> Vec<u8> {
    let header = (nal_ref_idc << 5) | nal_unit_type;
    with_header(header, slice_rbsp(sps, pps, s, nal_unit_type, nal_ref_idc))
}

/// 带 NAL 类型与 nal_ref_idc 的切片
#[derive(Debug, Clone)]
pub struct CodedSlice {
    pub nal_unit_type: u8,
    pub nal_ref_idc: u8,
    pub params: SliceParams,
}

impl CodedSlice {
    pub fn idr() -> Self {
        Self {
            nal_unit_type: 5,
            nal_ref_idc: 3,
            params: SliceParams::default(),
        }
    }

    /// 参考 P 切片
    pub fn p(frame_num: u32, poc_lsb: u32) -> Self {
        Self {
            nal_unit_type: 1,
            nal_ref_idc: 2,
            params: SliceParams {
                slice_type: 5,
                frame_num,
                poc_lsb,
                ..SliceParams::default()
            },
        }
    }

    /// 非参考 B 切片
    pub fn b(frame_num: u32, poc_lsb: u32) -> Self {
        Self {
            nal_unit_type: 1,
            nal_ref_idc: 0,
            params: SliceParams {
                slice_type: 6,
                frame_num,
                poc_lsb,
                ..SliceParams::default()
            },
        }
    }

    /// 同一图像中起始于 `first_mb` 的后续切片
    pub fn at_mb(mut self, first_mb: u32) -> Self {
        self.params.first_mb = first_mb;
        self
    }

    pub fn nal(&self, sps: &SpsParams, pps: &PpsParams) -> Vec<u8> {
        slice_nal(sps, pps, &self.params, self.nal_unit_type, self.nal_ref_idc)
    }
}

pub fn aud_nal() -> Vec<u8> {
    vec![0x09, 0xF0]
}

/// 以 4 字节起始码拼接 (已含防竞争字节的) NAL 单元
pub fn annex_b(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(nal);
    }
    out
}

/// 交替使用 4 字节与 3 字节起始码拼接
pub fn annex_b_mixed(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, nal) in nals.iter().enumerate() {
        if i % 2 == 0 {
            out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        } else {
            out.extend_from_slice(&[0x00, 0x00, 0x01]);
        }
        out.extend_from_slice(nal);
    }
    out
}

fn with_header(header: u8, rbsp: Vec<u8>) -> Vec<u8> {
    let mut nal = Vec::with_capacity(rbsp.len() + 1);
    nal.push(header);
    nal.extend_from_slice(&rbsp);
    add_emulation_prevention(&nal)
}
