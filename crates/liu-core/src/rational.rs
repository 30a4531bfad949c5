//! 有理数类型, 用于帧率与像素宽高比.

use std::fmt;

/// 无符号有理数
///
/// 帧率 30000/1001 表示 29.97fps, 宽高比 4/3 表示像素宽:高.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: u32,
    /// 分母
    pub den: u32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 1:1
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// 判断是否有效 (分子分母均不为 0)
    pub const fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// 约分
    pub fn reduce(self) -> Self {
        let g = gcd(self.num, self.den);
        if g == 0 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// 计算 `value * den / num` (向下取整)
    ///
    /// 以帧率为参数时, 即 `value` 帧对应的时长 (单位: 1/value 的时间刻度).
    pub fn mul_inverse(self, value: u64) -> Option<u64> {
        if self.num == 0 {
            return None;
        }
        let scaled = u128::from(value) * u128::from(self.den) / u128::from(self.num);
        u64::try_from(scaled).ok()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
