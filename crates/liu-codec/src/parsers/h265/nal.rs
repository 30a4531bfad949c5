//! H.265/HEVC NAL 单元头分类.
//!
//! HEVC NAL 头部为 2 字节:
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)

use std::fmt;

use liu_core::{LiuError, LiuResult};

use crate::parsers::annexb::{add_emulation_prevention, split_nal_units};

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HevcNalUnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    Vps,
    Sps,
    Pps,
    Aud,
    Eos,
    Eob,
    FillerData,
    PrefixSei,
    SuffixSei,
    /// 保留或未定义类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Unknown(id) => *id,
        }
    }

    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// IRAP 图像, 含保留类型 22, 23
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=23)
    }

    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 出现在首个 VCL 之前时开启新访问单元的非 VCL 类型 (7.4.2.4.4)
    pub fn starts_access_unit(&self) -> bool {
        matches!(self.type_id(), 32..=35 | 39 | 41..=44 | 48..=55)
    }
}

impl fmt::Display for HevcNalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            other => write!(f, "{:?}", other),
        }
    }
}

/// HEVC NAL 单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcNalUnit {
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id
    pub layer_id: u8,
    /// TemporalId (nuh_temporal_id_plus1 - 1)
    pub temporal_id: u8,
    /// 含 2 字节头, 已去除防竞争字节
    pub data: Vec<u8>,
}

impl HevcNalUnit {
    /// 从已去除防竞争字节的数据 (含 2 字节头) 创建
    pub fn from_rbsp(data: Vec<u8>) -> LiuResult<Self> {
        if data.len() < 2 {
            return Err(LiuError::InvalidFormat(format!(
                "H.265: NAL 数据太短, len={}",
                data.len()
            )));
        }
        if data[0] & 0x80 != 0 {
            return Err(LiuError::InvalidFormat(
                "H.265: forbidden_zero_bit 非零".into(),
            ));
        }
        let temporal_id_plus1 = data[1] & 0x07;
        if temporal_id_plus1 == 0 {
            return Err(LiuError::InvalidFormat(
                "H.265: nuh_temporal_id_plus1 非法, value=0".into(),
            ));
        }
        Ok(Self {
            nal_type: HevcNalUnitType::from_type_id((data[0] >> 1) & 0x3F),
            layer_id: ((data[0] & 0x01) << 5) | (data[1] >> 3),
            temporal_id: temporal_id_plus1 - 1,
            data,
        })
    }

    /// NAL 头之后的负载
    pub fn payload(&self) -> &[u8] {
        &self.data[2..]
    }

    /// 切片段的 first_slice_segment_in_pic_flag, 非 VCL 返回 `None`
    pub fn first_slice_segment_in_pic(&self) -> Option<bool> {
        if !self.nal_type.is_vcl() {
            return None;
        }
        self.payload().first().map(|byte| byte & 0x80 != 0)
    }

    /// 重新插入防竞争字节
    pub fn escaped(&self) -> Vec<u8> {
        add_emulation_prevention(&self.data)
    }
}

/// 切分 Annex B 数据并解析 HEVC NAL 头
///
/// 头部非法的单元被跳过.
pub fn split_hevc_annex_b(data: &[u8]) -> Vec<HevcNalUnit> {
    split_nal_units(data)
        .into_iter()
        .filter_map(|unit| match HevcNalUnit::from_rbsp(unit) {
            Ok(nalu) => Some(nalu),
            Err(err) => {
                log::warn!("{}", err);
                None
            }
        })
        .collect()
}
