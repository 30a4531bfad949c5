//! H.264 访问单元 (Access Unit) 组装.
//!
//! [`AvcFrameParser`] 接收任意切分的 Annex B 字节块, 按 ITU-T H.264 7.4.1.2.3 /
//! 7.4.1.2.4 检测访问单元边界, 在访问单元闭合时计算 POC, 输出带解码序号与
//! 显示序号的 [`AccessUnit`].
//!
//! # 边界规则
//! - AUD / SPS / PPS / SEI / 类型 14..=18 之前闭合当前访问单元
//! - 相邻两个切片的 [`same_frame`] 为 false 时闭合
//! - 流结束且队列清空后闭合

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::nal::{NalUnit, NalUnitType};
use super::poc::{PictureStructure, PocConfig, PocState};
use super::pps::parse_pps;
use super::slice::{SliceHeader, active_parameter_sets, parse_slice_header_rbsp};
use super::sps::parse_sps;
use super::{PpsTable, SpsTable, empty_pps_table, empty_sps_table};
use crate::parsers::annexb::{DEFAULT_MAX_NAL_UNIT_SIZE, NalScanner};

/// 解析器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvcParserConfig {
    /// PPS 是否写入下一个访问单元
    pub keep_pps_in_access_unit: bool,
    /// SEI 是否写入下一个访问单元
    pub keep_sei_in_access_unit: bool,
    /// 单个 NAL 单元最大字节数, 超出部分被丢弃
    pub max_nal_unit_size: usize,
    /// [`AccessUnitReader`](super::reader::AccessUnitReader) 每次读取的字节数
    pub reader_chunk_size: usize,
}

impl Default for AvcParserConfig {
    fn default() -> Self {
        Self {
            keep_pps_in_access_unit: true,
            keep_sei_in_access_unit: true,
            max_nal_unit_size: DEFAULT_MAX_NAL_UNIT_SIZE,
            reader_chunk_size: 4096,
        }
    }
}

/// 一幅完整图像的 NAL 单元集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// 码流顺序的 NAL 单元 (已去除防竞争字节)
    pub nal_units: Vec<NalUnit>,
    /// 首个切片是否为 IDR
    pub is_idr: bool,
    /// 解码序号, 从 0 开始连续递增
    pub decode_order: u32,
    /// 显示序号 (POC, 负值截断为 0); 重排与 GOP 划分使用 `picture_order_count`
    pub display_order: u32,
    /// 有符号 POC
    pub picture_order_count: i32,
    pub structure: PictureStructure,
}

impl AccessUnit {
    /// VCL NAL 单元数目
    pub fn vcl_count(&self) -> usize {
        self.nal_units
            .iter()
            .filter(|nalu| nalu.nal_type.is_vcl())
            .count()
    }

    /// 转换为 4 字节大端长度前缀格式, 重新插入防竞争字节
    pub fn to_length_prefixed(&self) -> LiuResult<Bytes> {
        let escaped: Vec<Vec<u8>> = self.nal_units.iter().map(NalUnit::escaped).collect();
        let total: usize = escaped.iter().map(|nal| nal.len() + 4).sum();
        let mut out = BytesMut::with_capacity(total);
        for nal in &escaped {
            let len = u32::try_from(nal.len()).map_err(|_| {
                LiuError::InvalidArgument(format!(
                    "H.264: NAL 单元过大, 无法写入 4 字节长度, len={}",
                    nal.len()
                ))
            })?;
            out.put_u32(len);
            out.put_slice(nal);
        }
        Ok(out.freeze())
    }
}

/// 已解码切片的上下文, 用于边界检测与 POC 计算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceContext {
    pub header: SliceHeader,
    pub nal_unit_type: NalUnitType,
    pub nal_ref_idc: u8,
    /// 切片解码时所用 SPS 的 POC 字段
    pub poc_config: PocConfig,
}

impl SliceContext {
    pub fn is_idr(&self) -> bool {
        self.nal_unit_type.is_idr()
    }
}

/// 判断两个切片是否属于同一幅图像 (7.4.1.2.4)
///
/// POC 类型取自 `first` 的 SPS 快照.
pub fn same_frame(first: &SliceContext, second: &SliceContext) -> bool {
    let sh1 = &first.header;
    let sh2 = &second.header;
    if sh1.frame_num != sh2.frame_num
        || sh1.pic_parameter_set_id != sh2.pic_parameter_set_id
        || sh1.field_pic_flag != sh2.field_pic_flag
    {
        return false;
    }
    if sh1.field_pic_flag && sh1.bottom_field_flag != sh2.bottom_field_flag {
        return false;
    }
    if (first.nal_ref_idc == 0) != (second.nal_ref_idc == 0) {
        return false;
    }
    match first.poc_config.pic_order_cnt_type {
        0 => {
            if sh1.pic_order_cnt_lsb != sh2.pic_order_cnt_lsb
                || sh1.delta_pic_order_cnt[0] != sh2.delta_pic_order_cnt[0]
            {
                return false;
            }
        }
        1 => {
            if sh1.delta_pic_order_cnt != sh2.delta_pic_order_cnt {
                return false;
            }
        }
        _ => {}
    }
    if first.is_idr() != second.is_idr() {
        return false;
    }
    if first.is_idr() && sh1.idr_pic_id != sh2.idr_pic_id {
        return false;
    }
    true
}

/// H.264 Annex B 访问单元解析器
///
/// 每次 [`feed`](Self::feed) 至多返回一个访问单元; 同一输入块产生的其余访问单元
/// 保留在内部队列中, 通过 `feed(&[], is_eos)` 取出.
pub struct AvcFrameParser {
    config: AvcParserConfig,
    scanner: NalScanner,
    /// 已切分但尚未处理的 NAL 单元
    pending: VecDeque<Vec<u8>>,
    /// 已闭合但尚未交付的访问单元
    ready: VecDeque<AccessUnit>,
    sps_table: Box<SpsTable>,
    pps_table: Box<PpsTable>,
    previous_slice: Option<SliceContext>,
    access_unit_nals: Vec<NalUnit>,
    /// 当前访问单元中已解析切片头的 VCL 数目
    vcl_count: usize,
    poc: PocState,
    next_decode_order: u32,
    eos_received: bool,
    eos_flushed: bool,
}

impl Default for AvcFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AvcFrameParser {
    pub fn new() -> Self {
        Self::with_config(AvcParserConfig::default())
    }

    pub fn with_config(config: AvcParserConfig) -> Self {
        Self {
            scanner: NalScanner::with_max_nal_unit_size(config.max_nal_unit_size),
            config,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            sps_table: empty_sps_table(),
            pps_table: empty_pps_table(),
            previous_slice: None,
            access_unit_nals: Vec::new(),
            vcl_count: 0,
            poc: PocState::new(),
            next_decode_order: 0,
            eos_received: false,
            eos_flushed: false,
        }
    }

    pub fn config(&self) -> &AvcParserConfig {
        &self.config
    }

    /// 按 sps_id 索引的 SPS 表
    pub fn sequence_parameter_sets(&self) -> &SpsTable {
        &self.sps_table
    }

    /// 按 pps_id 索引的 PPS 表
    pub fn picture_parameter_sets(&self) -> &PpsTable {
        &self.pps_table
    }

    /// 已交付的访问单元数目
    pub fn access_units_emitted(&self) -> u32 {
        self.next_decode_order - self.ready.len() as u32
    }

    /// 送入一段 Annex B 数据
    ///
    /// 返回 `Ok(Some(au))` 时可能还有更多访问单元排队, 调用方应以空输入继续调用
    /// 直到返回 `Ok(None)`. NAL 单元解析失败时返回错误, 该单元被丢弃, 下次调用
    /// 从下一个单元继续.
    pub fn feed(&mut self, data: &[u8], is_eos: bool) -> LiuResult<Option<AccessUnit>> {
        if self.eos_received && !data.is_empty() {
            return Err(LiuError::InvalidState(
                "H.264: 流结束后不能继续送入数据".into(),
            ));
        }

        let mut units = Vec::new();
        self.scanner.push(data, &mut units);
        if is_eos && !self.eos_received {
            self.scanner.finish(&mut units);
            self.eos_received = true;
        }
        self.pending.extend(units);

        loop {
            if let Some(au) = self.ready.pop_front() {
                return Ok(Some(au));
            }
            let Some(unit) = self.pending.pop_front() else {
                break;
            };
            self.process_nal_unit(unit)?;
        }

        if self.eos_received && !self.eos_flushed {
            self.eos_flushed = true;
            self.close_access_unit();
            return Ok(self.ready.pop_front());
        }
        Ok(None)
    }

    /// 送入一段数据并取出其产生的所有访问单元
    ///
    /// 解析失败的 NAL 单元记录警告后跳过.
    pub fn feed_all(&mut self, data: &[u8], is_eos: bool) -> LiuResult<Vec<AccessUnit>> {
        let mut units = Vec::new();
        let mut chunk = data;
        loop {
            match self.feed(chunk, is_eos) {
                Ok(Some(au)) => units.push(au),
                Ok(None) => break,
                Err(LiuError::InvalidState(msg)) => return Err(LiuError::InvalidState(msg)),
                Err(err) => warn!("H.264: 丢弃无法解析的 NAL 单元, err={}", err),
            }
            chunk = &[];
        }
        Ok(units)
    }

    fn process_nal_unit(&mut self, data: Vec<u8>) -> LiuResult<()> {
        let nalu = NalUnit::from_rbsp(data)?;
        debug!(
            "H.264: NAL type={}, ref_idc={}, size={}",
            nalu.nal_type,
            nalu.ref_idc,
            nalu.data.len()
        );

        match nalu.nal_type {
            NalUnitType::Aud => self.close_access_unit(),
            NalUnitType::Slice | NalUnitType::SliceDpa | NalUnitType::SliceIdr => {
                self.process_slice(nalu)?;
            }
            NalUnitType::SliceDpb | NalUnitType::SliceDpc => {
                self.access_unit_nals.push(nalu);
            }
            NalUnitType::Sps => {
                self.close_access_unit();
                let sps = parse_sps(&nalu)?;
                debug!(
                    "H.264: SPS id={}, profile={}, {}x{}, poc_type={}",
                    sps.sps_id, sps.profile_idc, sps.width, sps.height, sps.pic_order_cnt_type
                );
                let id = sps.sps_id as usize;
                self.sps_table[id] = Some(sps);
            }
            NalUnitType::Pps => {
                self.close_access_unit();
                let pps = parse_pps(&nalu, Some(self.sps_table.as_ref()))?;
                debug!("H.264: PPS id={}, sps_id={}", pps.pps_id, pps.sps_id);
                let id = pps.pps_id as usize;
                self.pps_table[id] = Some(pps);
                if self.config.keep_pps_in_access_unit {
                    self.access_unit_nals.push(nalu);
                }
            }
            NalUnitType::Sei => {
                self.close_access_unit();
                if self.config.keep_sei_in_access_unit {
                    self.access_unit_nals.push(nalu);
                }
            }
            other if other.starts_access_unit() => self.close_access_unit(),
            _ => self.access_unit_nals.push(nalu),
        }
        Ok(())
    }

    fn process_slice(&mut self, nalu: NalUnit) -> LiuResult<()> {
        let header = parse_slice_header_rbsp(
            nalu.payload(),
            nalu.nal_type.type_id(),
            nalu.ref_idc,
            &self.sps_table,
            &self.pps_table,
        )?;
        let (_, sps) =
            active_parameter_sets(header.pic_parameter_set_id, &self.sps_table, &self.pps_table)?;
        let context = SliceContext {
            header,
            nal_unit_type: nalu.nal_type,
            nal_ref_idc: nalu.ref_idc,
            poc_config: PocConfig::from(sps),
        };

        let starts_new_picture = self
            .previous_slice
            .as_ref()
            .is_some_and(|previous| !same_frame(previous, &context));
        if starts_new_picture {
            self.close_access_unit();
        }

        self.access_unit_nals.push(nalu);
        self.vcl_count += 1;
        self.previous_slice = Some(context);
        Ok(())
    }

    /// 闭合当前访问单元; 尚无切片时保留已缓存的非 VCL 单元
    fn close_access_unit(&mut self) {
        if self.vcl_count == 0 {
            return;
        }
        let Some(context) = self.previous_slice.as_ref() else {
            return;
        };

        let order = self.poc.compute(
            &context.poc_config,
            &context.header,
            context.is_idr(),
            context.nal_ref_idc,
        );
        let picture_order_count = order.picture_order_count();
        let nal_units = std::mem::take(&mut self.access_unit_nals);
        let is_idr = nal_units
            .iter()
            .find(|nalu| nalu.nal_type.has_slice_header())
            .is_some_and(|nalu| nalu.nal_type.is_idr());

        let au = AccessUnit {
            nal_units,
            is_idr,
            decode_order: self.next_decode_order,
            display_order: u32::try_from(picture_order_count).unwrap_or(0),
            picture_order_count,
            structure: order.structure,
        };
        debug!(
            "H.264: 访问单元完成, decode_order={}, poc={}, idr={}, nal_count={}",
            au.decode_order,
            au.picture_order_count,
            au.is_idr,
            au.nal_units.len()
        );

        self.next_decode_order += 1;
        self.vcl_count = 0;
        self.ready.push_back(au);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::test_streams::{
        CodedSlice, PpsParams, SliceParams, SpsParams, annex_b, aud_nal, pps_nal, slice_nal,
        sps_nal,
    };

    fn poc_type2_stream() -> Vec<u8> {
        let sps = SpsParams {
            poc_type: 2,
            ..SpsParams::default()
        };
        let pps = PpsParams::default();
        let idr = SliceParams {
            slice_type: 7,
            ..SliceParams::default()
        };
        let p1 = SliceParams {
            slice_type: 5,
            frame_num: 1,
            ..SliceParams::default()
        };
        let p2 = SliceParams {
            slice_type: 5,
            frame_num: 2,
            ..SliceParams::default()
        };
        annex_b(&[
            aud_nal(),
            sps_nal(&sps),
            pps_nal(&pps),
            slice_nal(&sps, &pps, &idr, 5, 3),
            slice_nal(&sps, &pps, &p1, 1, 2),
            slice_nal(&sps, &pps, &p2, 1, 2),
        ])
    }

    fn drain(parser: &mut AvcFrameParser, data: &[u8], is_eos: bool) -> Vec<AccessUnit> {
        parser.feed_all(data, is_eos).unwrap()
    }

    fn context(frame_num: u32, lsb: u32, nal_type: NalUnitType, ref_idc: u8) -> SliceContext {
        SliceContext {
            header: SliceHeader {
                frame_num,
                pic_order_cnt_lsb: lsb,
                ..SliceHeader::default()
            },
            nal_unit_type: nal_type,
            nal_ref_idc: ref_idc,
            poc_config: PocConfig {
                pic_order_cnt_type: 0,
                max_frame_num: 16,
                max_pic_order_cnt_lsb: 64,
                frame_mbs_only_flag: true,
                offset_for_non_ref_pic: 0,
                offset_for_top_to_bottom_field: 0,
                offset_for_ref_frame: Vec::new(),
            },
        }
    }

    #[test]
    fn test_end_to_end_poc_type2() {
        let mut parser = AvcFrameParser::new();
        let units = drain(&mut parser, &poc_type2_stream(), true);
        assert_eq!(units.len(), 3);
        assert_eq!(
            units.iter().map(|au| au.is_idr).collect::<Vec<_>>(),
            vec![true, false, false]
        );
        assert_eq!(
            units.iter().map(|au| au.decode_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            units.iter().map(|au| au.display_order).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );
        // 首个访问单元: PPS + IDR (SPS 与 AUD 不缓存)
        let first_types: Vec<_> = units[0].nal_units.iter().map(|n| n.nal_type).collect();
        assert_eq!(first_types, vec![NalUnitType::Pps, NalUnitType::SliceIdr]);
        assert!(parser.sequence_parameter_sets()[0].is_some());
        assert!(parser.picture_parameter_sets()[0].is_some());
    }

    #[test]
    fn test_feed_returns_one_unit_per_call() {
        let mut parser = AvcFrameParser::new();
        let first = parser.feed(&poc_type2_stream(), true).unwrap();
        assert_eq!(first.map(|au| au.decode_order), Some(0));
        assert_eq!(parser.feed(&[], true).unwrap().map(|au| au.decode_order), Some(1));
        assert_eq!(parser.feed(&[], true).unwrap().map(|au| au.decode_order), Some(2));
        assert!(parser.feed(&[], true).unwrap().is_none());
        assert_eq!(parser.access_units_emitted(), 3);
    }

    #[test]
    fn test_no_unit_without_eos() {
        let mut parser = AvcFrameParser::new();
        let units = drain(&mut parser, &poc_type2_stream(), false);
        // 最后一个切片仍在扫描器中, 第二个切片所在访问单元尚未闭合
        assert_eq!(units.len(), 1);
        let rest = drain(&mut parser, &[], true);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_chunking_invariance() {
        let stream = poc_type2_stream();
        let mut whole_parser = AvcFrameParser::new();
        let whole = drain(&mut whole_parser, &stream, true);
        for chunk_size in [1, 3, 17] {
            let mut parser = AvcFrameParser::new();
            let mut units = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                units.extend(drain(&mut parser, chunk, false));
            }
            units.extend(drain(&mut parser, &[], true));
            assert_eq!(units, whole, "chunk_size={}", chunk_size);
        }
    }

    #[test]
    fn test_data_after_eos_is_rejected() {
        let mut parser = AvcFrameParser::new();
        drain(&mut parser, &poc_type2_stream(), true);
        let err = parser.feed(&[0x00, 0x00, 0x01, 0x09, 0xF0], false).unwrap_err();
        assert!(matches!(err, LiuError::InvalidState(_)), "err={:?}", err);
        assert!(parser.feed(&[], true).unwrap().is_none());
    }

    #[test]
    fn test_slice_without_parameter_sets_is_discarded() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let idr = SliceParams::default();
        let stream = annex_b(&[slice_nal(&sps, &pps, &idr, 5, 3)]);
        let mut parser = AvcFrameParser::new();
        let err = parser.feed(&stream, true).unwrap_err();
        assert!(matches!(err, LiuError::InvalidFormat(_)), "err={:?}", err);
        assert!(parser.feed(&[], true).unwrap().is_none());
    }

    #[test]
    fn test_pps_and_sei_join_next_unit() {
        let sps = SpsParams {
            poc_type: 2,
            ..SpsParams::default()
        };
        let pps = PpsParams::default();
        let idr = SliceParams::default();
        let p1 = SliceParams {
            slice_type: 5,
            frame_num: 1,
            ..SliceParams::default()
        };
        let sei = vec![0x06, 0x05, 0x01, 0xAA, 0x80];
        let stream = annex_b(&[
            sps_nal(&sps),
            pps_nal(&pps),
            slice_nal(&sps, &pps, &idr, 5, 3),
            sei.clone(),
            slice_nal(&sps, &pps, &p1, 1, 2),
        ]);
        let mut parser = AvcFrameParser::new();
        let units = drain(&mut parser, &stream, true);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nal_units.len(), 2);
        assert_eq!(units[1].nal_units[0].data, sei);
        assert_eq!(units[1].nal_units[1].nal_type, NalUnitType::Slice);
    }

    #[test]
    fn test_pps_dropped_when_configured() {
        let config = AvcParserConfig {
            keep_pps_in_access_unit: false,
            ..AvcParserConfig::default()
        };
        let mut parser = AvcFrameParser::with_config(config);
        let units = drain(&mut parser, &poc_type2_stream(), true);
        assert_eq!(units[0].nal_units.len(), 1);
        assert!(units[0].is_idr);
    }

    #[test]
    fn test_multi_slice_picture() {
        let sps = SpsParams::default();
        let pps = PpsParams::default();
        let first = SliceParams {
            poc_lsb: 0,
            ..SliceParams::default()
        };
        let second = SliceParams {
            first_mb: 1800,
            ..first.clone()
        };
        let next = SliceParams {
            slice_type: 5,
            frame_num: 1,
            poc_lsb: 4,
            ..SliceParams::default()
        };
        let stream = annex_b(&[
            sps_nal(&sps),
            pps_nal(&pps),
            slice_nal(&sps, &pps, &first, 5, 3),
            slice_nal(&sps, &pps, &second, 5, 3),
            slice_nal(&sps, &pps, &next, 1, 2),
        ]);
        let mut parser = AvcFrameParser::new();
        let units = drain(&mut parser, &stream, true);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].vcl_count(), 2);
        assert_eq!(units[1].display_order, 4);
    }

    #[test]
    fn test_prefix_and_subset_sps_close_unit() {
        let sps = SpsParams {
            poc_type: 2,
            ..SpsParams::default()
        };
        let pps = PpsParams::default();
        // 同一 IDR 图像的三个切片
        let slices: Vec<Vec<u8>> = [0, 1200, 2400]
            .into_iter()
            .map(|mb| CodedSlice::idr().at_mb(mb).nal(&sps, &pps))
            .collect();
        let prefix_nal = vec![0x6E, 0xC0, 0x80];
        let subset_sps = vec![0x6F, 0x53, 0x80];

        let mut parser = AvcFrameParser::new();
        let mut nals = vec![sps_nal(&sps), pps_nal(&pps)];
        nals.extend(slices.iter().cloned());
        let units = drain(&mut parser, &annex_b(&nals), true);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].vcl_count(), 3);

        let mut parser = AvcFrameParser::new();
        let stream = annex_b(&[
            sps_nal(&sps),
            pps_nal(&pps),
            slices[0].clone(),
            prefix_nal,
            slices[1].clone(),
            subset_sps,
            slices[2].clone(),
        ]);
        let units = drain(&mut parser, &stream, true);
        assert_eq!(units.len(), 3, "类型 14/15 应闭合当前访问单元");
        assert_eq!(
            units.iter().map(|au| au.decode_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(units.iter().all(|au| au.is_idr && au.vcl_count() == 1));
        assert!(
            units
                .iter()
                .flat_map(|au| &au.nal_units)
                .all(|nalu| !nalu.nal_type.starts_access_unit()),
            "类型 14..=18 不写入访问单元"
        );
    }

    #[test]
    fn test_high_444_stream_with_scaling_matrix() {
        let sps = SpsParams {
            profile_idc: 244,
            chroma_format_idc: 3,
            poc_type: 2,
            ..SpsParams::default()
        };
        let pps = PpsParams {
            transform_8x8: Some(true),
            scaling_matrix: true,
            chroma_format_idc: 3,
            second_chroma_qp_offset: -3,
            ..PpsParams::default()
        };
        let stream = annex_b(&[
            sps_nal(&sps),
            pps_nal(&pps),
            CodedSlice::idr().nal(&sps, &pps),
            CodedSlice::p(1, 0).nal(&sps, &pps),
        ]);
        let mut parser = AvcFrameParser::new();
        let units = drain(&mut parser, &stream, true);
        assert_eq!(units.len(), 2);
        assert_eq!(
            units.iter().map(|au| au.display_order).collect::<Vec<_>>(),
            vec![0, 2]
        );
        let Some(parsed) = parser.picture_parameter_sets()[0].as_ref() else {
            panic!("PPS 应已记录");
        };
        assert!(parsed.transform_8x8_mode_flag);
        assert!(parsed.pic_scaling_matrix_present_flag);
        assert_eq!(parsed.second_chroma_qp_index_offset, -3);
    }

    #[test]
    fn test_same_frame_rules() {
        let base = context(3, 8, NalUnitType::Slice, 1);
        assert!(same_frame(&base, &base.clone()));

        let mut other = base.clone();
        other.header.frame_num = 4;
        assert!(!same_frame(&base, &other));

        let mut other = base.clone();
        other.header.pic_parameter_set_id = 1;
        assert!(!same_frame(&base, &other));

        let other = context(3, 8, NalUnitType::Slice, 0);
        assert!(!same_frame(&base, &other));

        let other = context(3, 10, NalUnitType::Slice, 2);
        assert!(!same_frame(&base, &other));

        let mut other = base.clone();
        other.header.delta_pic_order_cnt[0] = 1;
        assert!(!same_frame(&base, &other));

        let mut other = base.clone();
        other.header.field_pic_flag = true;
        assert!(!same_frame(&base, &other));

        let idr = context(3, 8, NalUnitType::SliceIdr, 1);
        assert!(!same_frame(&base, &idr));
        let mut idr2 = idr.clone();
        idr2.header.idr_pic_id = 1;
        assert!(!same_frame(&idr, &idr2));

        // first_mb_in_slice / slice_type 不参与判断
        let mut other = base.clone();
        other.header.first_mb_in_slice = 99;
        other.header.slice_type = 2;
        assert!(same_frame(&base, &other));
    }

    #[test]
    fn test_to_length_prefixed_restores_escape() {
        let au = AccessUnit {
            nal_units: vec![NalUnit::from_rbsp(vec![0x65, 0x00, 0x00, 0x01]).unwrap()],
            is_idr: true,
            decode_order: 0,
            display_order: 0,
            picture_order_count: 0,
            structure: PictureStructure::Frame,
        };
        let sample = au.to_length_prefixed().unwrap();
        assert_eq!(
            sample.as_ref(),
            &[0x00, 0x00, 0x00, 0x05, 0x65, 0x00, 0x00, 0x03, 0x01]
        );
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: AvcParserConfig =
            serde_json::from_str(r#"{ "keep_sei_in_access_unit": false }"#).unwrap();
        assert!(config.keep_pps_in_access_unit);
        assert!(!config.keep_sei_in_access_unit);
        assert_eq!(config.reader_chunk_size, 4096);
    }
}
