//! 比特流写入器.
//!
//! 与 [`BitReader`](crate::bitreader::BitReader) 对应, 按大端位序写入定长字段与
//! Exp-Golomb 字段, 用于构造参数集/切片头等测试码流.

/// 比特流写入器
///
/// # 示例
/// ```
/// use liu_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_ue(0);
/// bw.write_rbsp_trailing_bits();
/// assert_eq!(bw.finish(), vec![0b1011_1100]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 是否位于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志位
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位), 值的低 N 位有效, 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for shift in (0..n.min(32)).rev() {
            self.write_bit(value >> shift);
        }
    }

    /// 写入无符号 Exp-Golomb 编码 ue(v)
    pub fn write_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        for _ in 1..len {
            self.write_bit(0);
        }
        for shift in (0..len).rev() {
            self.write_bit((code >> shift) as u32);
        }
    }

    /// 写入有符号 Exp-Golomb 编码 se(v)
    pub fn write_se(&mut self, value: i32) {
        let code = if value > 0 {
            (i64::from(value) * 2 - 1) as u32
        } else {
            (-i64::from(value) * 2) as u32
        };
        self.write_ue(code);
    }

    /// 写入 rbsp_trailing_bits (stop bit + 对齐零位)
    pub fn write_rbsp_trailing_bits(&mut self) {
        self.write_bit(1);
        while !self.is_byte_aligned() {
            self.write_bit(0);
        }
    }

    /// 结束写入, 不足一字节的部分低位补零
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.data.push(self.current_byte);
        }
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4);
        bw.write_bits(0b0001, 4);
        bw.write_bits(0b0101_0101, 8);
        assert_eq!(bw.bits_written(), 16);
        assert_eq!(bw.finish(), vec![0b1011_0001, 0b0101_0101]);
    }

    #[test]
    fn test_write_bits_32() {
        let mut bw = BitWriter::new();
        bw.write_bit(1);
        bw.write_bits(0xDEAD_BEEF, 32);
        assert_eq!(bw.finish(), vec![0xEF, 0x56, 0xDF, 0x77, 0x80]);
    }

    #[test]
    fn test_write_ue_patterns() {
        let mut bw = BitWriter::new();
        bw.write_ue(0); // 1
        bw.write_ue(1); // 010
        bw.write_ue(2); // 011
        bw.write_ue(3); // 00100
        assert_eq!(bw.bits_written(), 12);
        assert_eq!(bw.finish(), vec![0b1010_0110, 0b0100_0000]);
    }

    #[test]
    fn test_write_se_patterns() {
        let mut bw = BitWriter::new();
        bw.write_se(1); // ue 1 → 010
        bw.write_se(-1); // ue 2 → 011
        bw.write_rbsp_trailing_bits();
        assert_eq!(bw.finish(), vec![0b0100_1110]);
    }

    #[test]
    fn test_finish_pads_partial_byte() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        assert!(!bw.is_byte_aligned());
        assert_eq!(bw.finish(), vec![0b1010_0000]);
    }
}
