//! AVCDecoderConfigurationRecord (MP4 avcC box 内容).
//!
//! ```text
//! configurationVersion(8) profile(8) compat(8) level(8)
//! 111111 lengthSizeMinusOne(2)
//! 111 numOfSPS(5) { len(16) sps }...
//! numOfPPS(8)     { len(16) pps }...
//! [high profile] 111111 chroma_format(2) 11111 luma_minus8(3) 11111 chroma_minus8(3) numSpsExt(8)
//! ```

use liu_core::{LiuError, LiuResult};

use super::sps::{Sps, is_high_profile};
use super::{PpsTable, SpsTable};

/// avcC 中 high profile 附加字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcHighProfileExt {
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
}

/// AVC 解码器配置记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    /// NAL 长度前缀字节数 (1, 2 或 4)
    pub length_size: usize,
    /// 含防竞争字节的 SPS NAL 单元
    pub sps_list: Vec<Vec<u8>>,
    /// 含防竞争字节的 PPS NAL 单元
    pub pps_list: Vec<Vec<u8>>,
    pub high_profile_ext: Option<AvcHighProfileExt>,
}

impl AvcDecoderConfig {
    /// 由参数集表构建, profile/level 取自 ID 最小的 SPS
    ///
    /// 表中没有任何 SPS 或 PPS 时返回 `InvalidFormat`.
    pub fn from_parameter_sets(
        sps_table: &SpsTable,
        pps_table: &PpsTable,
        length_size: usize,
    ) -> LiuResult<Self> {
        validate_length_size(length_size)?;
        let sps_all: Vec<&Sps> = sps_table.iter().flatten().collect();
        let Some(first) = sps_all.first() else {
            return Err(LiuError::InvalidFormat(
                "H.264: 构建 avcC 需要至少一个 SPS".into(),
            ));
        };
        let pps_list: Vec<Vec<u8>> = pps_table
            .iter()
            .flatten()
            .map(|pps| pps.raw_bytes.clone())
            .collect();
        if pps_list.is_empty() {
            return Err(LiuError::InvalidFormat(
                "H.264: 构建 avcC 需要至少一个 PPS".into(),
            ));
        }

        let high_profile_ext = is_high_profile(first.profile_idc).then(|| AvcHighProfileExt {
            chroma_format_idc: first.chroma_format_idc as u8,
            bit_depth_luma_minus8: first.bit_depth_luma_minus8 as u8,
            bit_depth_chroma_minus8: first.bit_depth_chroma_minus8 as u8,
        });

        Ok(Self {
            profile_idc: first.profile_idc,
            profile_compatibility: first.constraint_flags.bits(),
            level_idc: first.level_idc,
            length_size,
            sps_list: sps_all.iter().map(|sps| sps.raw_bytes.clone()).collect(),
            pps_list,
            high_profile_ext,
        })
    }

    /// 序列化为 avcC box 内容
    pub fn build(&self) -> LiuResult<Vec<u8>> {
        validate_length_size(self.length_size)?;
        if self.sps_list.is_empty() {
            return Err(LiuError::InvalidFormat(
                "H.264: 构建 avcC 需要至少一个 SPS".into(),
            ));
        }
        if self.sps_list.len() > 31 || self.pps_list.len() > 255 {
            return Err(LiuError::InvalidArgument(format!(
                "H.264: avcC 参数集数目超出范围, sps={}, pps={}",
                self.sps_list.len(),
                self.pps_list.len()
            )));
        }

        let mut out = vec![
            1, // configurationVersion
            self.profile_idc,
            self.profile_compatibility,
            self.level_idc,
            0xFC | (self.length_size as u8 - 1),
            0xE0 | self.sps_list.len() as u8,
        ];
        for sps in &self.sps_list {
            push_parameter_set(&mut out, sps)?;
        }
        out.push(self.pps_list.len() as u8);
        for pps in &self.pps_list {
            push_parameter_set(&mut out, pps)?;
        }
        if let Some(ext) = self.high_profile_ext {
            out.push(0xFC | (ext.chroma_format_idc & 0x03));
            out.push(0xF8 | (ext.bit_depth_luma_minus8 & 0x07));
            out.push(0xF8 | (ext.bit_depth_chroma_minus8 & 0x07));
            out.push(0); // numOfSequenceParameterSetExt
        }
        Ok(out)
    }

    /// 解析 avcC box 内容
    pub fn parse(data: &[u8]) -> LiuResult<Self> {
        if data.len() < 7 {
            return Err(LiuError::InvalidFormat("H.264: avcC 数据太短".into()));
        }
        if data[0] != 1 {
            return Err(LiuError::Unsupported(format!(
                "H.264: avcC configurationVersion 不支持, value={}",
                data[0]
            )));
        }
        let profile_idc = data[1];
        let length_size = usize::from(data[4] & 0x03) + 1;
        if length_size == 3 {
            return Err(LiuError::InvalidFormat(
                "H.264: avcC lengthSizeMinusOne 非法, value=2".into(),
            ));
        }

        let mut pos = 5;
        let num_sps = usize::from(data[pos] & 0x1F);
        pos += 1;
        let sps_list = read_parameter_sets(data, &mut pos, num_sps, "SPS")?;
        let Some(&num_pps) = data.get(pos) else {
            return Err(LiuError::InvalidFormat(
                "H.264: avcC 缺少 numOfPictureParameterSets 字段".into(),
            ));
        };
        pos += 1;
        let pps_list = read_parameter_sets(data, &mut pos, usize::from(num_pps), "PPS")?;

        let high_profile_ext = match data.get(pos..pos + 3) {
            Some(ext) if is_high_profile(profile_idc) => Some(AvcHighProfileExt {
                chroma_format_idc: ext[0] & 0x03,
                bit_depth_luma_minus8: ext[1] & 0x07,
                bit_depth_chroma_minus8: ext[2] & 0x07,
            }),
            _ => None,
        };

        Ok(Self {
            profile_idc,
            profile_compatibility: data[2],
            level_idc: data[3],
            length_size,
            sps_list,
            pps_list,
            high_profile_ext,
        })
    }
}

fn validate_length_size(length_size: usize) -> LiuResult<()> {
    if !matches!(length_size, 1 | 2 | 4) {
        return Err(LiuError::InvalidArgument(format!(
            "H.264: avcC 长度前缀字节数非法, length_size={}",
            length_size
        )));
    }
    Ok(())
}

fn push_parameter_set(out: &mut Vec<u8>, nal: &[u8]) -> LiuResult<()> {
    let len = u16::try_from(nal.len()).map_err(|_| {
        LiuError::InvalidArgument(format!("H.264: 参数集过长, len={}", nal.len()))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(nal);
    Ok(())
}

fn read_parameter_sets(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    kind: &str,
) -> LiuResult<Vec<Vec<u8>>> {
    let mut list = Vec::with_capacity(count);
    for index in 0..count {
        let Some(len_bytes) = data.get(*pos..*pos + 2) else {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: avcC {} 长度字段截断, index={}",
                kind, index
            )));
        };
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        *pos += 2;
        if len == 0 {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: avcC {} 长度非法, index={}, len=0",
                kind, index
            )));
        }
        let Some(body) = data.get(*pos..*pos + len) else {
            return Err(LiuError::InvalidFormat(format!(
                "H.264: avcC {} 数据截断, index={}, declared_len={}, remain={}",
                kind,
                index,
                len,
                data.len().saturating_sub(*pos)
            )));
        };
        list.push(body.to_vec());
        *pos += len;
    }
    Ok(list)
}
