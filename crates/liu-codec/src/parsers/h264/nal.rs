//! H.264 NAL (Network Abstraction Layer) 单元.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! [`NalUnit::data`] 保存去除防竞争字节后的数据 (含头部字节), 写入 MP4 样本前
//! 通过 [`NalUnit::escaped`] 恢复.
//!
//! # 长度前缀格式
//! ```text
//! [length: N bytes BE] [NAL data: length bytes]
//! ```

use liu_core::{LiuError, LiuResult};

use crate::parsers::annexb::{add_emulation_prevention, remove_emulation_prevention_in_place};

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片
    Slice,
    /// 数据分区 A
    SliceDpa,
    /// 数据分区 B
    SliceDpb,
    /// 数据分区 C
    SliceDpc,
    /// IDR 图像切片
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 前缀 NAL (SVC/MVC)
    PrefixNal,
    /// 子集 SPS (SVC/MVC)
    SubsetSps,
    /// 深度参数集 (3D-AVC)
    DepthParameterSet,
    /// 辅助图像切片
    SliceAuxiliary,
    /// 扩展切片 (SVC/MVC)
    SliceExtension,
    /// 保留或未指定类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNal,
            15 => Self::SubsetSps,
            16 => Self::DepthParameterSet,
            19 => Self::SliceAuxiliary,
            20 => Self::SliceExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::PrefixNal => 14,
            Self::SubsetSps => 15,
            Self::DepthParameterSet => 16,
            Self::SliceAuxiliary => 19,
            Self::SliceExtension => 20,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }

    /// 是否携带可解析的切片头 (类型 1, 2, 5)
    pub fn has_slice_header(&self) -> bool {
        matches!(self, Self::Slice | Self::SliceDpa | Self::SliceIdr)
    }

    /// 类型 14..=18: 出现即意味着新访问单元开始
    pub fn starts_access_unit(&self) -> bool {
        (14..=18).contains(&self.type_id())
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::PrefixNal => write!(f, "Prefix"),
            Self::SubsetSps => write!(f, "SubsetSPS"),
            Self::DepthParameterSet => write!(f, "DPS"),
            Self::SliceAuxiliary => write!(f, "SliceAux"),
            Self::SliceExtension => write!(f, "SliceExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// 去除防竞争字节后的数据 (不含起始码, 含头部字节)
    pub data: Vec<u8>,
}

impl NalUnit {
    /// 从已去除防竞争字节的数据 (含头部字节) 构建
    pub fn from_rbsp(data: Vec<u8>) -> LiuResult<Self> {
        let Some(&header) = data.first() else {
            return Err(LiuError::InvalidFormat("H.264: NAL 单元数据为空".into()));
        };
        let forbidden = header >> 7;
        if forbidden != 0 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: forbidden_zero_bit 非法, value={}",
                forbidden
            )));
        }
        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// 从码流中的原始数据 (含防竞争字节) 解析
    pub fn parse(escaped: &[u8]) -> LiuResult<Self> {
        let mut data = escaped.to_vec();
        remove_emulation_prevention_in_place(&mut data);
        Self::from_rbsp(data)
    }

    /// 头部字节
    pub fn header(&self) -> u8 {
        self.data[0]
    }

    /// 头部之后的 RBSP 数据
    pub fn payload(&self) -> &[u8] {
        &self.data[1..]
    }

    /// 重新插入防竞争字节, 得到可写入码流的形式
    pub fn escaped(&self) -> Vec<u8> {
        add_emulation_prevention(&self.data)
    }
}

/// 从长度前缀格式数据中提取 NAL 单元
///
/// `length_size` 取值 1..=4 (来自 avcC 的 lengthSizeMinusOne + 1).
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> LiuResult<Vec<NalUnit>> {
    if !(1..=4).contains(&length_size) {
        return Err(LiuError::InvalidArgument(format!(
            "H.264: 长度前缀字节数非法, length_size={}",
            length_size
        )));
    }

    let mut units = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + length_size > data.len() {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: 长度前缀截断, offset={}",
                pos
            )));
        }
        let nal_len = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        pos += length_size;
        if pos + nal_len > data.len() {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: NAL 数据截断, declared_len={}, remain={}",
                nal_len,
                data.len() - pos
            )));
        }
        units.push(NalUnit::parse(&data[pos..pos + nal_len])?);
        pos += nal_len;
    }
    Ok(units)
}
