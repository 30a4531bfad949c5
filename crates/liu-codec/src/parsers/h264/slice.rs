//! H.264 切片头解析.
//!
//! 完整读取 slice_header() 语法, 供访问单元边界检测与 POC 计算使用.
//! 宏块数据不解析.

use liu_core::bitreader::BitReader;
use liu_core::{LiuError, LiuResult};

use super::pps::Pps;
use super::sps::Sps;
use super::{PpsTable, SpsTable};
use crate::parsers::annexb::remove_emulation_prevention;

const NAL_TYPE_SLICE_IDR: u8 = 5;

/// 切片类型 (slice_type % 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 从 slice_type 语法值创建 (5..=9 表示整幅图像同类型)
    pub fn from_raw(slice_type: u32) -> Self {
        match slice_type % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::Sp,
            _ => Self::Si,
        }
    }

    /// 是否为帧内类型 (I/SI)
    pub fn is_intra(self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

/// dec_ref_pic_marking() 语法
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecRefPicMarking {
    /// 仅 IDR
    pub no_output_of_prior_pics_flag: bool,
    /// 仅 IDR
    pub long_term_reference_flag: bool,
    /// 仅非 IDR
    pub adaptive_ref_pic_marking_mode_flag: bool,
    /// memory_management_control_operation 序列 (不含结尾的 0)
    pub operations: Vec<u32>,
}

impl DecRefPicMarking {
    /// 是否包含 memory_management_control_operation 5
    pub fn has_mmco5(&self) -> bool {
        self.operations.contains(&5)
    }
}

/// 切片头
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    /// 原始 slice_type 语法值 (0..=9)
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
    pub colour_plane_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    /// POC 类型 0 时 [0] 为 delta_pic_order_cnt_bottom; 类型 1 时为 delta_pic_order_cnt[0..1]
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: u32,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification_flag_l0: bool,
    pub ref_pic_list_modification_flag_l1: bool,
    pub pred_weight_table_present: bool,
    /// nal_ref_idc 为 0 时不存在
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: u32,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: bool,
    pub slice_qs_delta: i32,
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
    pub slice_group_change_cycle: u32,
    /// 切片头占用的位数
    pub size_in_bits: usize,
}

impl SliceHeader {
    pub fn kind(&self) -> SliceType {
        SliceType::from_raw(self.slice_type)
    }

    /// 是否包含 memory_management_control_operation 5
    pub fn has_mmco5(&self) -> bool {
        self.dec_ref_pic_marking
            .as_ref()
            .is_some_and(DecRefPicMarking::has_mmco5)
    }
}

/// 解码切片头
///
/// `nal_payload` 为码流中 NAL 头部之后的数据 (含防竞争字节). PPS 或其引用的
/// SPS 不存在时返回 `InvalidFormat`.
pub fn decode_slice_header(
    nal_payload: &[u8],
    nal_unit_type: u8,
    nal_ref_idc: u8,
    sps_table: &SpsTable,
    pps_table: &PpsTable,
) -> LiuResult<SliceHeader> {
    let rbsp = remove_emulation_prevention(nal_payload);
    parse_slice_header_rbsp(&rbsp, nal_unit_type, nal_ref_idc, sps_table, pps_table)
}

/// 查找切片引用的 PPS 与 SPS
pub fn active_parameter_sets<'a>(
    pps_id: u32,
    sps_table: &'a SpsTable,
    pps_table: &'a PpsTable,
) -> LiuResult<(&'a Pps, &'a Sps)> {
    let pps = pps_table
        .get(pps_id as usize)
        .and_then(Option::as_ref)
        .ok_or_else(|| {
            LiuError::InvalidFormat(format!("H.264: 切片引用的 PPS 不存在, pps_id={}", pps_id))
        })?;
    let sps = sps_table
        .get(pps.sps_id as usize)
        .and_then(Option::as_ref)
        .ok_or_else(|| {
            LiuError::InvalidFormat(format!(
                "H.264: PPS 引用的 SPS 不存在, pps_id={}, sps_id={}",
                pps_id, pps.sps_id
            ))
        })?;
    Ok((pps, sps))
}

/// 从 RBSP (NAL 头部之后, 已去除防竞争字节) 解析切片头
pub fn parse_slice_header_rbsp(
    rbsp: &[u8],
    nal_unit_type: u8,
    nal_ref_idc: u8,
    sps_table: &SpsTable,
    pps_table: &PpsTable,
) -> LiuResult<SliceHeader> {
    let mut br = BitReader::new(rbsp);
    let mut sh = SliceHeader {
        first_mb_in_slice: br.read_ue()?,
        slice_type: br.read_ue()?,
        pic_parameter_set_id: br.read_ue()?,
        ..SliceHeader::default()
    };
    if sh.slice_type > 9 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: slice_type 非法, value={}",
            sh.slice_type
        )));
    }
    if sh.pic_parameter_set_id > 255 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: pic_parameter_set_id 超出范围, value={}",
            sh.pic_parameter_set_id
        )));
    }
    let (pps, sps) = active_parameter_sets(sh.pic_parameter_set_id, sps_table, pps_table)?;
    let is_idr = nal_unit_type == NAL_TYPE_SLICE_IDR;
    let kind = sh.kind();

    if sps.separate_colour_plane_flag {
        sh.colour_plane_id = br.read_bits(2)? as u8;
    }
    sh.frame_num = br.read_bits(sps.frame_num_bits())?;
    if !sps.frame_mbs_only_flag {
        sh.field_pic_flag = br.read_flag()?;
        if sh.field_pic_flag {
            sh.bottom_field_flag = br.read_flag()?;
        }
    }
    if is_idr {
        sh.idr_pic_id = br.read_ue()?;
    }
    match sps.pic_order_cnt_type {
        0 => {
            sh.pic_order_cnt_lsb = br.read_bits(sps.pic_order_cnt_lsb_bits())?;
            if pps.pic_order_present_flag && !sh.field_pic_flag {
                sh.delta_pic_order_cnt[0] = br.read_se()?;
            }
        }
        1 if !sps.delta_pic_order_always_zero_flag => {
            sh.delta_pic_order_cnt[0] = br.read_se()?;
            if pps.pic_order_present_flag && !sh.field_pic_flag {
                sh.delta_pic_order_cnt[1] = br.read_se()?;
            }
        }
        _ => {}
    }
    if pps.redundant_pic_cnt_present_flag {
        sh.redundant_pic_cnt = br.read_ue()?;
    }
    if kind == SliceType::B {
        sh.direct_spatial_mv_pred_flag = br.read_flag()?;
    }

    sh.num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
    sh.num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
    if matches!(kind, SliceType::P | SliceType::Sp | SliceType::B) {
        sh.num_ref_idx_active_override_flag = br.read_flag()?;
        if sh.num_ref_idx_active_override_flag {
            sh.num_ref_idx_l0_active_minus1 = br.read_ue()?;
            if kind == SliceType::B {
                sh.num_ref_idx_l1_active_minus1 = br.read_ue()?;
            }
        }
    }
    if sh.num_ref_idx_l0_active_minus1 > 31 || sh.num_ref_idx_l1_active_minus1 > 31 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: num_ref_idx_active_minus1 超出范围, l0={}, l1={}",
            sh.num_ref_idx_l0_active_minus1, sh.num_ref_idx_l1_active_minus1
        )));
    }

    // ref_pic_list_modification()
    if !kind.is_intra() {
        sh.ref_pic_list_modification_flag_l0 = br.read_flag()?;
        if sh.ref_pic_list_modification_flag_l0 {
            skip_ref_pic_list_modification(&mut br)?;
        }
    }
    if kind == SliceType::B {
        sh.ref_pic_list_modification_flag_l1 = br.read_flag()?;
        if sh.ref_pic_list_modification_flag_l1 {
            skip_ref_pic_list_modification(&mut br)?;
        }
    }

    let weighted_p = pps.weighted_pred_flag && matches!(kind, SliceType::P | SliceType::Sp);
    let weighted_b = pps.weighted_bipred_idc == 1 && kind == SliceType::B;
    if weighted_p || weighted_b {
        sh.pred_weight_table_present = true;
        skip_pred_weight_table(&mut br, &sh, sps.chroma_array_type())?;
    }

    if nal_ref_idc != 0 {
        sh.dec_ref_pic_marking = Some(read_dec_ref_pic_marking(&mut br, is_idr)?);
    }
    if pps.entropy_coding_mode_flag && !kind.is_intra() {
        sh.cabac_init_idc = br.read_ue()?;
        if sh.cabac_init_idc > 2 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: cabac_init_idc 非法, value={}",
                sh.cabac_init_idc
            )));
        }
    }
    sh.slice_qp_delta = br.read_se()?;
    if matches!(kind, SliceType::Sp | SliceType::Si) {
        if kind == SliceType::Sp {
            sh.sp_for_switch_flag = br.read_flag()?;
        }
        sh.slice_qs_delta = br.read_se()?;
    }
    if pps.deblocking_filter_control_present_flag {
        sh.disable_deblocking_filter_idc = br.read_ue()?;
        if sh.disable_deblocking_filter_idc != 1 {
            sh.slice_alpha_c0_offset_div2 = br.read_se()?;
            sh.slice_beta_offset_div2 = br.read_se()?;
        }
    }
    if pps.num_slice_groups_minus1 > 0 && (3..=5).contains(&pps.slice_group_map_type) {
        let bits = slice_group_change_cycle_bits(
            sps.pic_size_in_map_units(),
            pps.slice_group_change_rate(),
        );
        sh.slice_group_change_cycle = br.read_bits(bits)?;
    }

    sh.size_in_bits = br.bits_read();
    Ok(sh)
}

fn skip_ref_pic_list_modification(br: &mut BitReader) -> LiuResult<()> {
    loop {
        match br.read_ue()? {
            0 | 1 => {
                br.read_ue()?; // abs_diff_pic_num_minus1
            }
            2 => {
                br.read_ue()?; // long_term_pic_num
            }
            3 => return Ok(()),
            // MVC 扩展 (4, 5): abs_diff_view_idx_minus1
            4 | 5 => {
                br.read_ue()?;
            }
            idc => {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: modification_of_pic_nums_idc 非法, value={}",
                    idc
                )));
            }
        }
    }
}

fn skip_pred_weight_table(
    br: &mut BitReader,
    sh: &SliceHeader,
    chroma_array_type: u32,
) -> LiuResult<()> {
    br.read_ue()?; // luma_log2_weight_denom
    if chroma_array_type != 0 {
        br.read_ue()?; // chroma_log2_weight_denom
    }
    let mut lists = vec![sh.num_ref_idx_l0_active_minus1];
    if sh.kind() == SliceType::B {
        lists.push(sh.num_ref_idx_l1_active_minus1);
    }
    for num_minus1 in lists {
        for _ in 0..=num_minus1 {
            if br.read_flag()? {
                br.read_se()?; // luma_weight
                br.read_se()?; // luma_offset
            }
            if chroma_array_type != 0 && br.read_flag()? {
                for _ in 0..2 {
                    br.read_se()?; // chroma_weight
                    br.read_se()?; // chroma_offset
                }
            }
        }
    }
    Ok(())
}

fn read_dec_ref_pic_marking(br: &mut BitReader, is_idr: bool) -> LiuResult<DecRefPicMarking> {
    let mut marking = DecRefPicMarking::default();
    if is_idr {
        marking.no_output_of_prior_pics_flag = br.read_flag()?;
        marking.long_term_reference_flag = br.read_flag()?;
        return Ok(marking);
    }
    marking.adaptive_ref_pic_marking_mode_flag = br.read_flag()?;
    if !marking.adaptive_ref_pic_marking_mode_flag {
        return Ok(marking);
    }
    loop {
        let op = br.read_ue()?;
        match op {
            0 => break,
            1 => {
                br.read_ue()?; // difference_of_pic_nums_minus1
            }
            2 => {
                br.read_ue()?; // long_term_pic_num
            }
            3 => {
                br.read_ue()?; // difference_of_pic_nums_minus1
                br.read_ue()?; // long_term_frame_idx
            }
            4 => {
                br.read_ue()?; // max_long_term_frame_idx_plus1
            }
            5 => {}
            6 => {
                br.read_ue()?; // long_term_frame_idx
            }
            _ => {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: memory_management_control_operation 非法, value={}",
                    op
                )));
            }
        }
        marking.operations.push(op);
    }
    Ok(marking)
}

/// Ceil(Log2(PicSizeInMapUnits ÷ SliceGroupChangeRate + 1))
fn slice_group_change_cycle_bits(pic_size_in_map_units: u32, change_rate: u32) -> u32 {
    let rate = u64::from(change_rate.max(1));
    let target = u64::from(pic_size_in_map_units) + rate;
    let mut bits = 0;
    while (rate << bits) < target {
        bits += 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::test_streams::{
        PpsParams, SliceParams, SpsParams, pps_rbsp, slice_nal, slice_rbsp, sps_rbsp,
    };
    use crate::parsers::h264::{empty_pps_table, empty_sps_table};
    use crate::parsers::h264::{pps::parse_pps_rbsp, sps::parse_sps_rbsp};

    fn tables(sps: &SpsParams, pps: &PpsParams) -> (Box<SpsTable>, Box<PpsTable>) {
        let mut sps_table = empty_sps_table();
        let mut pps_table = empty_pps_table();
        let parsed_sps = parse_sps_rbsp(&sps_rbsp(sps)).unwrap();
        let parsed_pps = parse_pps_rbsp(&pps_rbsp(pps), None).unwrap();
        let sps_id = parsed_sps.sps_id as usize;
        let pps_id = parsed_pps.pps_id as usize;
        sps_table[sps_id] = Some(parsed_sps);
        pps_table[pps_id] = Some(parsed_pps);
        (sps_table, pps_table)
    }

    #[test]
    fn test_slice_header_idr_poc_type0() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 7,
            idr_pic_id: 3,
            poc_lsb: 0,
            ..SliceParams::default()
        };
        let rbsp = slice_rbsp(&sps, &pps, &params, 5, 3);
        let sh = parse_slice_header_rbsp(&rbsp, 5, 3, &sps_table, &pps_table).unwrap();
        assert_eq!(sh.kind(), SliceType::I);
        assert_eq!(sh.slice_type, 7);
        assert_eq!(sh.idr_pic_id, 3);
        assert_eq!(sh.frame_num, 0);
        let marking = sh.dec_ref_pic_marking.as_ref().unwrap();
        assert!(!marking.no_output_of_prior_pics_flag);
        assert!(!sh.has_mmco5());
        assert!(sh.size_in_bits > 0 && sh.size_in_bits < rbsp.len() * 8);
    }

    #[test]
    fn test_slice_header_fields_p_slice() {
        let sps = SpsParams::default();
        let pps = PpsParams {
            pic_order_present: true,
            ..PpsParams::default()
        };
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 0,
            frame_num: 9,
            poc_lsb: 18,
            delta_pic_order_cnt: [-1, 0],
            qp_delta: -4,
            ..SliceParams::default()
        };
        let nal = slice_nal(&sps, &pps, &params, 1, 2);
        let sh = decode_slice_header(&nal[1..], 1, 2, &sps_table, &pps_table).unwrap();
        assert_eq!(sh.kind(), SliceType::P);
        assert_eq!(sh.frame_num, 9);
        assert_eq!(sh.pic_order_cnt_lsb, 18);
        assert_eq!(sh.delta_pic_order_cnt[0], -1);
        assert_eq!(sh.slice_qp_delta, -4);
        assert!(!sh.ref_pic_list_modification_flag_l0);
    }

    #[test]
    fn test_slice_header_b_slice_cabac() {
        let sps = SpsParams {
            profile_idc: 77,
            ..SpsParams::default()
        };
        let pps = PpsParams {
            entropy_coding: true,
            ..PpsParams::default()
        };
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 1,
            frame_num: 2,
            poc_lsb: 2,
            qp_delta: 3,
            ..SliceParams::default()
        };
        let rbsp = slice_rbsp(&sps, &pps, &params, 1, 0);
        let sh = parse_slice_header_rbsp(&rbsp, 1, 0, &sps_table, &pps_table).unwrap();
        assert_eq!(sh.kind(), SliceType::B);
        assert!(sh.direct_spatial_mv_pred_flag);
        assert!(sh.dec_ref_pic_marking.is_none());
        assert_eq!(sh.cabac_init_idc, 0);
        assert_eq!(sh.slice_qp_delta, 3);
    }

    #[test]
    fn test_slice_header_field_flags() {
        let sps = SpsParams {
            frame_mbs_only: false,
            ..SpsParams::default()
        };
        let pps = PpsParams::default();
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 0,
            frame_num: 1,
            field_pic: true,
            bottom_field: true,
            poc_lsb: 5,
            ..SliceParams::default()
        };
        let rbsp = slice_rbsp(&sps, &pps, &params, 1, 1);
        let sh = parse_slice_header_rbsp(&rbsp, 1, 1, &sps_table, &pps_table).unwrap();
        assert!(sh.field_pic_flag);
        assert!(sh.bottom_field_flag);
        assert_eq!(sh.pic_order_cnt_lsb, 5);
    }

    #[test]
    fn test_slice_header_poc_type1_deltas() {
        let sps = SpsParams {
            poc_type: 1,
            offset_for_ref_frame: vec![2],
            ..SpsParams::default()
        };
        let pps = PpsParams {
            pic_order_present: true,
            ..PpsParams::default()
        };
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 0,
            frame_num: 1,
            delta_pic_order_cnt: [4, -2],
            ..SliceParams::default()
        };
        let rbsp = slice_rbsp(&sps, &pps, &params, 1, 1);
        let sh = parse_slice_header_rbsp(&rbsp, 1, 1, &sps_table, &pps_table).unwrap();
        assert_eq!(sh.delta_pic_order_cnt, [4, -2]);
    }

    #[test]
    fn test_slice_header_mmco5() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let (sps_table, pps_table) = tables(&sps, &pps);
        let params = SliceParams {
            slice_type: 0,
            frame_num: 3,
            mmco5: true,
            ..SliceParams::default()
        };
        let rbsp = slice_rbsp(&sps, &pps, &params, 1, 1);
        let sh = parse_slice_header_rbsp(&rbsp, 1, 1, &sps_table, &pps_table).unwrap();
        assert!(sh.has_mmco5());
        assert_eq!(sh.dec_ref_pic_marking.unwrap().operations, vec![5]);
    }

    #[test]
    fn test_slice_header_missing_pps_or_sps() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let rbsp = slice_rbsp(&sps, &pps, &SliceParams::default(), 5, 3);

        let sps_table = empty_sps_table();
        let pps_table = empty_pps_table();
        let err = parse_slice_header_rbsp(&rbsp, 5, 3, &sps_table, &pps_table).unwrap_err();
        assert!(format!("{err}").contains("PPS"), "err={}", err);

        let (_, pps_table) = tables(&sps, &pps);
        let err = parse_slice_header_rbsp(&rbsp, 5, 3, &sps_table, &pps_table).unwrap_err();
        assert!(format!("{err}").contains("SPS"), "err={}", err);
    }

    #[test]
    fn test_slice_header_truncated() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let (sps_table, pps_table) = tables(&sps, &pps);
        let rbsp = slice_rbsp(&sps, &pps, &SliceParams::default(), 5, 3);
        let err = parse_slice_header_rbsp(&rbsp[..1], 5, 3, &sps_table, &pps_table).unwrap_err();
        assert!(matches!(err, LiuError::Eof), "err={:?}", err);
    }

    #[test]
    fn test_slice_group_change_cycle_bits() {
        // 396 个映射单元, 变化率 1: Ceil(Log2(397)) = 9
        assert_eq!(slice_group_change_cycle_bits(396, 1), 9);
        // 396 / 4 + 1 = 100 → 7
        assert_eq!(slice_group_change_cycle_bits(396, 4), 7);
        assert_eq!(slice_group_change_cycle_bits(1, 1), 1);
    }
}
