//! # liu-core
//!
//! Liu 核心库, 提供错误类型、比特流读写器与有理数等基础设施.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod rational;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{LiuError, LiuResult};
pub use rational::Rational;
