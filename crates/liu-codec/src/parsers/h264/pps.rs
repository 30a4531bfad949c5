//! H.264 PPS (Picture Parameter Set) 解析器.

use liu_core::bitreader::BitReader;
use liu_core::{LiuError, LiuResult};
use log::warn;

use super::SpsTable;
use super::nal::{NalUnit, NalUnitType};
use super::sps::skip_scaling_lists;

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// pic_parameter_set_id (0..=255)
    pub pps_id: u32,
    /// 引用的 seq_parameter_set_id (0..=255)
    pub sps_id: u32,
    /// 0=CAVLC, 1=CABAC
    pub entropy_coding_mode_flag: bool,
    /// bottom_field_pic_order_in_frame_present_flag
    pub pic_order_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    /// 仅 num_slice_groups_minus1 > 0 时有效
    pub slice_group_map_type: u32,
    /// 仅 slice_group_map_type 为 3..=5 时有效
    pub slice_group_change_rate_minus1: u32,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    /// 缺省时等于 chroma_qp_index_offset
    pub second_chroma_qp_index_offset: i32,
    /// 含头部与防竞争字节的原始 NAL 数据, 用于 avcC
    pub raw_bytes: Vec<u8>,
}

impl Pps {
    /// 切片组数目
    pub fn num_slice_groups(&self) -> u32 {
        self.num_slice_groups_minus1 + 1
    }

    /// SliceGroupChangeRate
    pub fn slice_group_change_rate(&self) -> u32 {
        self.slice_group_change_rate_minus1 + 1
    }
}

/// 解码码流中的 PPS NAL 单元 (含头部字节与防竞争字节)
///
/// 不参考 SPS, 4:4:4 码流的扩展字段可能按缺省值处理, 见 [`parse_pps_rbsp`].
pub fn decode_pps(nal: &[u8]) -> LiuResult<Pps> {
    let nalu = NalUnit::parse(nal)?;
    if nalu.nal_type != NalUnitType::Pps {
        return Err(LiuError::InvalidArgument(format!(
            "H.264: 期望 PPS, 实际 NAL 类型={}",
            nalu.nal_type
        )));
    }
    parse_pps(&nalu, None)
}

/// 从已拆分的 NAL 单元解析 PPS
pub fn parse_pps(nalu: &NalUnit, sps_table: Option<&SpsTable>) -> LiuResult<Pps> {
    let mut pps = parse_pps_rbsp(nalu.payload(), sps_table)?;
    pps.raw_bytes = nalu.escaped();
    Ok(pps)
}

/// 从 RBSP (不含 NAL 头部) 解析 PPS, `raw_bytes` 留空
///
/// 扩展字段 (transform_8x8_mode_flag 起) 中缩放矩阵的数目取决于所引用 SPS 的
/// chroma_format_idc; `sps_table` 中找不到该 SPS 时按非 4:4:4 读取.
/// 扩展字段解析失败不影响 PPS 本身, 各字段取缺省值.
pub fn parse_pps_rbsp(rbsp: &[u8], sps_table: Option<&SpsTable>) -> LiuResult<Pps> {
    if rbsp.is_empty() {
        return Err(LiuError::InvalidFormat("H.264: PPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);
    let pps_id = br.read_ue()?;
    if pps_id > 255 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }
    let sps_id = br.read_ue()?;
    if sps_id > 255 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let entropy_coding_mode_flag = br.read_flag()?;
    let pic_order_present_flag = br.read_flag()?;

    let num_slice_groups_minus1 = br.read_ue()?;
    if num_slice_groups_minus1 > 7 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: num_slice_groups_minus1 超出范围, value={}",
            num_slice_groups_minus1
        )));
    }
    let mut slice_group_map_type = 0;
    let mut slice_group_change_rate_minus1 = 0;
    if num_slice_groups_minus1 > 0 {
        (slice_group_map_type, slice_group_change_rate_minus1) =
            read_slice_group_map(&mut br, num_slice_groups_minus1)?;
    }

    let num_ref_idx_l0_default_active_minus1 = br.read_ue()?;
    let num_ref_idx_l1_default_active_minus1 = br.read_ue()?;
    if num_ref_idx_l0_default_active_minus1 > 31 || num_ref_idx_l1_default_active_minus1 > 31 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: num_ref_idx_default_active_minus1 超出范围, l0={}, l1={}",
            num_ref_idx_l0_default_active_minus1, num_ref_idx_l1_default_active_minus1
        )));
    }

    let weighted_pred_flag = br.read_flag()?;
    let weighted_bipred_idc = br.read_bits(2)?;
    if weighted_bipred_idc > 2 {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: weighted_bipred_idc 非法, value={}",
            weighted_bipred_idc
        )));
    }

    let pic_init_qp_minus26 = br.read_se()?;
    let pic_init_qs_minus26 = br.read_se()?;
    let chroma_qp_index_offset = br.read_se()?;
    validate_chroma_offset("chroma_qp_index_offset", chroma_qp_index_offset)?;

    let deblocking_filter_control_present_flag = br.read_flag()?;
    let constrained_intra_pred_flag = br.read_flag()?;
    let redundant_pic_cnt_present_flag = br.read_flag()?;

    let chroma_format_idc = sps_table
        .and_then(|table| table[sps_id as usize].as_ref())
        .map(|sps| sps.chroma_format_idc);
    let mut extension = PpsExtension::absent(chroma_qp_index_offset);
    if br.more_rbsp_data() {
        match read_extension(&mut br, chroma_format_idc) {
            Ok(parsed) => extension = parsed,
            Err(err) => warn!(
                "H.264: PPS 扩展字段解析失败, 按缺省值处理, pps_id={}, chroma_format_idc={:?}, err={}",
                pps_id, chroma_format_idc, err
            ),
        }
    }
    let PpsExtension {
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        second_chroma_qp_index_offset,
    } = extension;

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode_flag,
        pic_order_present_flag,
        num_slice_groups_minus1,
        slice_group_map_type,
        slice_group_change_rate_minus1,
        num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        second_chroma_qp_index_offset,
        raw_bytes: Vec::new(),
    })
}

/// PPS 扩展字段
struct PpsExtension {
    transform_8x8_mode_flag: bool,
    pic_scaling_matrix_present_flag: bool,
    second_chroma_qp_index_offset: i32,
}

impl PpsExtension {
    fn absent(chroma_qp_index_offset: i32) -> Self {
        Self {
            transform_8x8_mode_flag: false,
            pic_scaling_matrix_present_flag: false,
            second_chroma_qp_index_offset: chroma_qp_index_offset,
        }
    }
}

fn read_extension(br: &mut BitReader, chroma_format_idc: Option<u32>) -> LiuResult<PpsExtension> {
    let transform_8x8_mode_flag = br.read_flag()?;
    let pic_scaling_matrix_present_flag = br.read_flag()?;
    if pic_scaling_matrix_present_flag {
        // 6 个 4x4 列表, 8x8 列表 4:4:4 为 6 个, 其余为 2 个
        let lists_8x8 = match (transform_8x8_mode_flag, chroma_format_idc) {
            (false, _) => 0,
            (true, Some(3)) => 6,
            (true, _) => 2,
        };
        skip_scaling_lists(br, 6 + lists_8x8)?;
    }
    let second_chroma_qp_index_offset = br.read_se()?;
    validate_chroma_offset("second_chroma_qp_index_offset", second_chroma_qp_index_offset)?;
    Ok(PpsExtension {
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        second_chroma_qp_index_offset,
    })
}

fn validate_chroma_offset(field: &str, value: i32) -> LiuResult<()> {
    if !(-12..=12).contains(&value) {
        return Err(LiuError::InvalidFormat(format!(
            "H.264: {} 超出范围, value={}",
            field, value
        )));
    }
    Ok(())
}

/// 读取切片组映射语法, 返回 (slice_group_map_type, slice_group_change_rate_minus1)
fn read_slice_group_map(br: &mut BitReader, num_slice_groups_minus1: u32) -> LiuResult<(u32, u32)> {
    let slice_group_map_type = br.read_ue()?;
    let mut change_rate_minus1 = 0;
    match slice_group_map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                br.read_ue()?; // run_length_minus1
            }
        }
        1 => {}
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                br.read_ue()?; // top_left
                br.read_ue()?; // bottom_right
            }
        }
        3..=5 => {
            br.skip_bits(1)?; // slice_group_change_direction_flag
            change_rate_minus1 = br.read_ue()?;
        }
        6 => {
            let pic_size_in_map_units_minus1 = br.read_ue()?;
            if pic_size_in_map_units_minus1 >= 65536 {
                return Err(LiuError::InvalidFormat(format!(
                    "H.264: pic_size_in_map_units_minus1 超出范围, value={}",
                    pic_size_in_map_units_minus1
                )));
            }
            let bits_per_id = ceil_log2(num_slice_groups_minus1 + 1);
            for _ in 0..=pic_size_in_map_units_minus1 {
                br.skip_bits(bits_per_id)?; // slice_group_id
            }
        }
        _ => {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: slice_group_map_type 非法, value={}",
                slice_group_map_type
            )));
        }
    }
    Ok((slice_group_map_type, change_rate_minus1))
}

/// Ceil(Log2(value)), value >= 1
pub(crate) fn ceil_log2(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        u32::BITS - (value - 1).leading_zeros()
    }
}
