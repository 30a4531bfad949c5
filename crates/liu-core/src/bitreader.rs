//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区中读取定长字段与 Exp-Golomb 变长字段,
//! 是 NAL 参数集与切片头解析的基础设施.
//!
//! 读取越过缓冲区末尾一律返回 [`LiuError::Eof`], 不做补零.

use crate::{LiuError, LiuResult};

/// Exp-Golomb 前导零数量上限
const MAX_GOLOMB_LEADING_ZEROS: u32 = 32;

/// 比特流读取器
///
/// # 示例
/// ```
/// use liu_core::bitreader::BitReader;
///
/// let data = [0b1011_0001, 0b0101_0101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b0101_0101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> LiuResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(LiuError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔值
    pub fn read_flag(&mut self) -> LiuResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    pub fn read_bits(&mut self, n: u32) -> LiuResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(LiuError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(LiuError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    ///
    /// 前导零达到 32 个时视为损坏数据, 直接返回 0, 不再读取后缀.
    pub fn read_ue(&mut self) -> LiuResult<u32> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros >= MAX_GOLOMB_LEADING_ZEROS {
                return Ok(0);
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros)?;
        let value = (1u64 << leading_zeros) - 1 + u64::from(suffix);
        Ok(value as u32)
    }

    /// 读取有符号 Exp-Golomb 编码值 se(v)
    ///
    /// 映射: 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
    pub fn read_se(&mut self) -> LiuResult<i32> {
        let code = i64::from(self.read_ue()?);
        let value = if code & 1 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Ok(value as i32)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> LiuResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(LiuError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 判断 RBSP 中是否仍有语法数据
    ///
    /// 末尾的 rbsp_stop_one_bit 及其后的对齐零位 (以及 cabac_zero_word)
    /// 不计为语法数据.
    pub fn more_rbsp_data(&self) -> bool {
        let Some(last_index) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let stop_bit_offset = 7 - self.data[last_index].trailing_zeros() as usize;
        let stop_bit_pos = last_index * 8 + stop_bit_offset;
        self.bits_read() < stop_bit_pos
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
