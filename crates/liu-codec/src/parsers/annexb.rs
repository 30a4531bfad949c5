//! Annex B 字节流扫描器.
//!
//! 以起始码 `00 00 01` / `00 00 00 01` 分隔 NAL 单元. 扫描器为逐字节状态机,
//! 支持任意切分的输入块, 并在流结束时输出仍未闭合的 NAL 单元.
//!
//! ```text
//! Idle --00--> SeenZero --00--> SeenZeroZero --01--> InNalUnit
//!                                  |  ^ 00                | 00 00 01
//!                                  +--+                   v
//!                                                  输出并开始新 NAL
//! ```
//!
//! 输出的 NAL 单元已去除防竞争字节 (emulation prevention), 且不含起始码与
//! 起始码之前的零字节. H.264 与 H.265 共用此扫描器.

use log::warn;

/// 单个 NAL 单元默认最大字节数
pub const DEFAULT_MAX_NAL_UNIT_SIZE: usize = 16 * 1024 * 1024;

/// 扫描器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 等待起始码
    Idle,
    /// 已见 1 个零字节
    SeenZero,
    /// 已见至少 2 个零字节
    SeenZeroZero,
    /// 位于 NAL 单元内部
    InNalUnit,
}

/// Annex B NAL 单元扫描器
///
/// # 示例
/// ```
/// use liu_codec::parsers::annexb::NalScanner;
///
/// let mut scanner = NalScanner::new();
/// let mut units = Vec::new();
/// scanner.push(&[0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00], &mut units);
/// scanner.push(&[0x01, 0x67, 0x42], &mut units);
/// assert_eq!(units, vec![vec![0x09, 0xF0]]);
/// scanner.finish(&mut units);
/// assert_eq!(units[1], vec![0x67, 0x42]);
/// ```
#[derive(Debug)]
pub struct NalScanner {
    state: ScanState,
    /// 当前 NAL 内尚未确认归属的连续零字节数
    zero_trail: usize,
    /// 当前 NAL 缓冲区
    buffer: Vec<u8>,
    max_nal_unit_size: usize,
    /// 当前 NAL 超出上限, 丢弃直到下一个起始码
    oversized: bool,
}

impl Default for NalScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl NalScanner {
    /// 创建扫描器
    pub fn new() -> Self {
        Self::with_max_nal_unit_size(DEFAULT_MAX_NAL_UNIT_SIZE)
    }

    /// 创建扫描器, 指定单个 NAL 单元最大字节数
    pub fn with_max_nal_unit_size(max_nal_unit_size: usize) -> Self {
        Self {
            state: ScanState::Idle,
            zero_trail: 0,
            buffer: Vec::new(),
            max_nal_unit_size: max_nal_unit_size.max(1),
            oversized: false,
        }
    }

    /// 是否位于 NAL 单元内部
    pub fn in_nal_unit(&self) -> bool {
        self.state == ScanState::InNalUnit
    }

    /// 送入一段字节, 已完成的 NAL 单元追加到 `out`
    pub fn push(&mut self, data: &[u8], out: &mut Vec<Vec<u8>>) {
        for &byte in data {
            match self.state {
                ScanState::Idle => {
                    if byte == 0 {
                        self.state = ScanState::SeenZero;
                    }
                }
                ScanState::SeenZero => {
                    self.state = if byte == 0 {
                        ScanState::SeenZeroZero
                    } else {
                        ScanState::Idle
                    };
                }
                ScanState::SeenZeroZero => match byte {
                    0x00 => {}
                    0x01 => self.begin_nal_unit(),
                    _ => self.state = ScanState::Idle,
                },
                ScanState::InNalUnit => self.push_payload_byte(byte, out),
            }
        }
    }

    /// 流结束: 输出仍未闭合的 NAL 单元并复位
    pub fn finish(&mut self, out: &mut Vec<Vec<u8>>) {
        if self.state == ScanState::InNalUnit {
            self.emit(out);
        }
        self.reset();
    }

    /// 丢弃所有内部状态
    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.zero_trail = 0;
        self.buffer.clear();
        self.oversized = false;
    }

    fn begin_nal_unit(&mut self) {
        self.buffer.clear();
        self.zero_trail = 0;
        self.oversized = false;
        self.state = ScanState::InNalUnit;
    }

    fn push_payload_byte(&mut self, byte: u8, out: &mut Vec<Vec<u8>>) {
        if byte == 0 {
            self.zero_trail += 1;
            return;
        }
        if byte == 0x01 && self.zero_trail >= 2 {
            self.emit(out);
            self.begin_nal_unit();
            return;
        }
        if !self.oversized {
            self.buffer.resize(self.buffer.len() + self.zero_trail, 0);
            self.buffer.push(byte);
            if self.buffer.len() > self.max_nal_unit_size {
                warn!(
                    "Annex B: NAL 单元超过上限, 丢弃至下一起始码, limit={}",
                    self.max_nal_unit_size
                );
                self.oversized = true;
                self.buffer = Vec::new();
            }
        }
        self.zero_trail = 0;
    }

    fn emit(&mut self, out: &mut Vec<Vec<u8>>) {
        self.zero_trail = 0;
        if self.oversized || self.buffer.is_empty() {
            self.buffer.clear();
            return;
        }
        let mut unit = std::mem::take(&mut self.buffer);
        remove_emulation_prevention_in_place(&mut unit);
        out.push(unit);
    }
}

/// 一次性拆分完整的 Annex B 缓冲区 (末尾视为流结束)
pub fn split_nal_units(data: &[u8]) -> Vec<Vec<u8>> {
    let mut scanner = NalScanner::new();
    let mut units = Vec::new();
    scanner.push(data, &mut units);
    scanner.finish(&mut units);
    units
}

/// 原地移除防竞争字节
///
/// `00 00 03 xx` (xx <= 0x03) 中的 0x03 被删除; 位于末尾的 `00 00 03` 同样删除.
/// 写游标跟随读游标单趟完成, 对同一 NAL 单元只能执行一次.
pub fn remove_emulation_prevention_in_place(data: &mut Vec<u8>) {
    let len = data.len();
    let mut write = 0;
    let mut zeros = 0usize;
    for read in 0..len {
        let byte = data[read];
        if zeros >= 2 && byte == 0x03 && data.get(read + 1).is_none_or(|&next| next <= 0x03) {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        data[write] = byte;
        write += 1;
    }
    data.truncate(write);
}

/// 移除防竞争字节, 返回新缓冲区
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    remove_emulation_prevention_in_place(&mut out);
    out
}

/// 插入防竞争字节, 将 RBSP 形式的 NAL 单元恢复为可写入码流的形式
pub fn add_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 1);
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    if zeros >= 2 {
        out.push(0x03);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_chunked(data: &[u8], chunk: usize) -> Vec<Vec<u8>> {
        let mut scanner = NalScanner::new();
        let mut units = Vec::new();
        for part in data.chunks(chunk) {
            scanner.push(part, &mut units);
        }
        scanner.finish(&mut units);
        units
    }

    #[test]
    fn test_split_3_and_4_byte_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, 0xBB, // SPS (4 字节起始码)
            0x00, 0x00, 0x01, 0x68, 0xCC, // PPS (3 字节起始码)
            0x00, 0x00, 0x01, 0x65, 0xDD, 0xEE, 0xFF, // IDR
        ];
        let units = split_nal_units(&data);
        assert_eq!(
            units,
            vec![
                vec![0x67, 0xAA, 0xBB],
                vec![0x68, 0xCC],
                vec![0x65, 0xDD, 0xEE, 0xFF],
            ]
        );
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let data = [0xFF, 0x00, 0x12, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01, 0x09, 0x10];
        assert_eq!(split_nal_units(&data), vec![vec![0x09, 0x10]]);
    }

    #[test]
    fn test_trailing_zeros_not_in_payload() {
        let data = [
            0x00, 0x00, 0x01, 0x09, 0x10, 0x00, 0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x00, 0x00,
        ];
        let units = split_nal_units(&data);
        assert_eq!(units, vec![vec![0x09, 0x10], vec![0x41, 0x9A]]);
    }

    #[test]
    fn test_no_output_without_eos() {
        let mut scanner = NalScanner::new();
        let mut units = Vec::new();
        scanner.push(&[0x00, 0x00, 0x01, 0x09, 0x10], &mut units);
        assert!(units.is_empty());
        assert!(scanner.in_nal_unit());
        scanner.finish(&mut units);
        assert_eq!(units.len(), 1);
        assert!(!scanner.in_nal_unit());
    }

    #[test]
    fn test_adjacent_start_codes_skip_empty_unit() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x09, 0x10];
        assert_eq!(split_nal_units(&data), vec![vec![0x09, 0x10]]);
    }

    #[test]
    fn test_unescape_on_emit() {
        let data = [0x00, 0x00, 0x01, 0x06, 0x00, 0x00, 0x03, 0x01, 0x80];
        assert_eq!(split_nal_units(&data), vec![vec![0x06, 0x00, 0x00, 0x01, 0x80]]);
    }

    #[test]
    fn test_chunking_invariance() {
        let mut data = Vec::new();
        let payloads: [&[u8]; 4] = [
            &[0x67, 0x42, 0x00, 0x00, 0x03, 0x00, 0x1E],
            &[0x68, 0xCE, 0x38, 0x80],
            &[0x65, 0x88, 0x00, 0x00, 0x03, 0x02, 0xFF, 0x00, 0x00, 0x03],
            &[0x41, 0x9A, 0x01],
        ];
        for payload in payloads {
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
            data.extend_from_slice(payload);
        }
        let whole = split_nal_units(&data);
        assert_eq!(whole.len(), 4);
        for chunk in [1, 2, 3, 5, 7, 64] {
            assert_eq!(scan_chunked(&data, chunk), whole, "chunk={}", chunk);
        }
    }

    #[test]
    fn test_oversized_unit_is_dropped() {
        let mut scanner = NalScanner::with_max_nal_unit_size(4);
        let mut units = Vec::new();
        scanner.push(
            &[0x00, 0x00, 0x01, 0x65, 1, 2, 3, 4, 5, 0x00, 0x00, 0x01, 0x09, 0x10],
            &mut units,
        );
        scanner.finish(&mut units);
        assert_eq!(units, vec![vec![0x09, 0x10]]);
    }

    #[test]
    fn test_emulation_prevention_remove() {
        let data = [0x01, 0x00, 0x00, 0x03, 0x02, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x01, 0x00, 0x00, 0x02, 0x03]
        );
    }

    #[test]
    fn test_emulation_prevention_consecutive() {
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_emulation_prevention_keeps_03_before_large_byte() {
        let data = [0x11, 0x00, 0x00, 0x03, 0x04, 0x22];
        assert_eq!(remove_emulation_prevention(&data), data.to_vec());
    }

    #[test]
    fn test_emulation_prevention_trailing() {
        let data = [0x65, 0x00, 0x00, 0x03];
        assert_eq!(remove_emulation_prevention(&data), vec![0x65, 0x00, 0x00]);
    }

    #[test]
    fn test_unescape_idempotent_on_clean_input() {
        let escaped = [0x67, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x7F];
        let once = remove_emulation_prevention(&escaped);
        let twice = remove_emulation_prevention(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_escape_round_trip() {
        let rbsp = [0x65, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03, 0x04, 0x00, 0x00];
        let escaped = add_emulation_prevention(&rbsp);
        assert_eq!(
            escaped,
            vec![
                0x65, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x03, 0x04, 0x00,
                0x00, 0x03
            ]
        );
        assert_eq!(remove_emulation_prevention(&escaped), rbsp.to_vec());
    }
}
