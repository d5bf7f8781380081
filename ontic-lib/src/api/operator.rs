/*!

The primitive numeric operators and their machine-word semantics.

Values are unsigned 32-bit machine words. Division, modulo, and exponentiation are computed on
doubles and truncated back to a word the way a `>>> 0` coercion would: a non-finite result
becomes `0`, a finite one is truncated toward zero and wrapped at 2³². The shift operators mask
their right operand modulo the word width.

Operator codes are shared between the term language, the equality engine, and both runtimes
(the interaction-net runtime stores them in its 16-bit node kinds).

*/

use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum BinOp {
  Add = 0,
  Sub = 1,
  Mul = 2,
  Div = 3,
  Mod = 4,
  Pow = 5,
  And = 6,
  Or  = 7,
  Xor = 8,
  Not = 9,
  Shr = 10,
  Shl = 11,
  Gtn = 12,
  Ltn = 13,
  Eql = 14,
}

/// Truncates a double to word semantics: non-finite to zero, otherwise toward zero mod 2³².
/// The wrap happens in the float domain; a cast through an integer type saturates once the
/// double exceeds that type's range.
#[inline(always)]
fn word_of_f64(x: f64) -> u32 {
  if !x.is_finite() {
    return 0;
  }
  x.trunc().rem_euclid(4_294_967_296.0) as u32
}

impl BinOp {
  pub const COUNT: usize = 15;

  /// The operator code used by the runtimes.
  #[inline(always)]
  pub fn code(self) -> u8 {
    self as u8
  }

  /// The surface token of the operator.
  pub fn token(self) -> &'static str {
    match self {
      BinOp::Add => ".+.",
      BinOp::Sub => ".-.",
      BinOp::Mul => ".*.",
      BinOp::Div => "./.",
      BinOp::Mod => ".%.",
      BinOp::Pow => ".**.",
      BinOp::And => ".&.",
      BinOp::Or  => ".|.",
      BinOp::Xor => ".^.",
      BinOp::Not => ".~.",
      BinOp::Shr => ".>>>.",
      BinOp::Shl => ".<<.",
      BinOp::Gtn => ".>.",
      BinOp::Ltn => ".<.",
      BinOp::Eql => ".==.",
    }
  }

  /// Computes `a <op> b` in machine-word semantics.
  pub fn eval(self, a: u32, b: u32) -> u32 {
    match self {
      BinOp::Add => a.wrapping_add(b),
      BinOp::Sub => a.wrapping_sub(b),
      BinOp::Mul => a.wrapping_mul(b),
      BinOp::Div => word_of_f64(a as f64 / b as f64),
      BinOp::Mod => word_of_f64(a as f64 % b as f64),
      BinOp::Pow => word_of_f64((a as f64).powf(b as f64)),
      BinOp::And => a & b,
      BinOp::Or  => a | b,
      BinOp::Xor => a ^ b,
      BinOp::Not => !b,
      BinOp::Shr => a.wrapping_shr(b),
      BinOp::Shl => a.wrapping_shl(b),
      BinOp::Gtn => (a > b) as u32,
      BinOp::Ltn => (a < b) as u32,
      BinOp::Eql => (a == b) as u32,
    }
  }
}

impl TryFrom<u16> for BinOp {
  type Error = u16;

  fn try_from(value: u16) -> Result<Self, Self::Error> {
    match value {
      0  => Ok(BinOp::Add),
      1  => Ok(BinOp::Sub),
      2  => Ok(BinOp::Mul),
      3  => Ok(BinOp::Div),
      4  => Ok(BinOp::Mod),
      5  => Ok(BinOp::Pow),
      6  => Ok(BinOp::And),
      7  => Ok(BinOp::Or),
      8  => Ok(BinOp::Xor),
      9  => Ok(BinOp::Not),
      10 => Ok(BinOp::Shr),
      11 => Ok(BinOp::Shl),
      12 => Ok(BinOp::Gtn),
      13 => Ok(BinOp::Ltn),
      14 => Ok(BinOp::Eql),
      _  => Err(value),
    }
  }
}

impl Display for BinOp {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.token())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapping_arithmetic() {
    assert_eq!(BinOp::Add.eval(u32::MAX, 1), 0);
    assert_eq!(BinOp::Sub.eval(0, 1), u32::MAX);
    assert_eq!(BinOp::Mul.eval(1 << 31, 2), 0);
  }

  #[test]
  fn division_on_doubles() {
    assert_eq!(BinOp::Div.eval(7, 2), 3);
    // x / 0 is infinite as a double and coerces to zero as a word.
    assert_eq!(BinOp::Div.eval(7, 0), 0);
    assert_eq!(BinOp::Mod.eval(7, 0), 0);
  }

  #[test]
  fn power_wraps_at_word_width() {
    assert_eq!(BinOp::Pow.eval(2, 10), 1024);
    assert_eq!(BinOp::Pow.eval(2, 40), 0);
    // The wrap must hold past the i64 range as well.
    assert_eq!(BinOp::Pow.eval(2, 64), 0);
    assert_eq!(BinOp::Pow.eval(2, 100), 0);
  }

  #[test]
  fn shifts_mask_their_count() {
    assert_eq!(BinOp::Shl.eval(1, 3), 8);
    assert_eq!(BinOp::Shr.eval(8, 3), 1);
    assert_eq!(BinOp::Shr.eval(8, 35), 1);
  }

  #[test]
  fn comparisons_return_words() {
    assert_eq!(BinOp::Gtn.eval(3, 2), 1);
    assert_eq!(BinOp::Ltn.eval(3, 2), 0);
    assert_eq!(BinOp::Eql.eval(5, 5), 1);
  }

  #[test]
  fn complement_ignores_left_operand() {
    assert_eq!(BinOp::Not.eval(77, 0), u32::MAX);
  }

  #[test]
  fn codes_round_trip() {
    for code in 0..BinOp::COUNT as u16 {
      let op = BinOp::try_from(code).unwrap();
      assert_eq!(op.code() as u16, code);
    }
    assert!(BinOp::try_from(BinOp::COUNT as u16).is_err());
  }
}
