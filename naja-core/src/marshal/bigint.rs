//! 任意精度整数的定基数字编解码
//!
//! 线上格式：带符号的 32 位数字个数（符号即整数符号），随后是
//! 该数量的 16 位小端数字，基数 2^15 —— 每个 16 位槽只有低 15
//! 位有效。这是历史性的跨运行时可移植约束，必须逐位保持。
//! 零不走这条路径（由调用方特判为 32 位整数 0）。

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

/// 每个数字的有效位数
pub const DIGIT_BITS: u32 = 15;

/// 数字掩码（低 15 位）
pub const DIGIT_MASK: u16 = 0x7FFF;

/// 把大整数的绝对值拆成 base 2^15 数字（小端序，无前导零数字）
pub fn to_digits(value: &BigInt) -> Vec<u16> {
    let bytes = value.magnitude().to_bytes_le();
    let mut digits = Vec::new();
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in &bytes {
        acc |= (byte as u32) << bits;
        bits += 8;
        while bits >= DIGIT_BITS {
            digits.push((acc & DIGIT_MASK as u32) as u16);
            acc >>= DIGIT_BITS;
            bits -= DIGIT_BITS;
        }
    }
    if acc != 0 {
        digits.push(acc as u16);
    }

    digits
}

/// 从 base 2^15 数字重建大整数
///
/// 按 `digit * (2^15)^i` 累加出绝对值，再根据符号取负。
/// 空数字序列重建为零（编码器从不产生，但解码端宽容接受）。
pub fn from_digits(digits: &[u16], negative: bool) -> BigInt {
    let mut magnitude = BigUint::zero();
    for &digit in digits.iter().rev() {
        magnitude <<= DIGIT_BITS as usize;
        magnitude += BigUint::from(digit as u32);
    }

    if magnitude.is_zero() {
        return BigInt::zero();
    }
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    BigInt::from_biguint(sign, magnitude)
}
