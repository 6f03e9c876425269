//! Machine word-size models.
//!
//! The front end decides which data model the analyzed program targets; the
//! consistency checker uses the model to validate that integer and character
//! literals embedded in edge payloads actually fit their declared types.

use crate::cfa::ast::IntKind;

/// The machine word-size model of the analyzed program.
///
/// Determines the byte width, and thus the value range, of every integer
/// kind. The model travels with the automaton from the front end through
/// sealing, so downstream analyses agree on arithmetic semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineModel {
    /// 32-bit model: `int` and `long` are 4 bytes.
    Ilp32,
    /// 64-bit model: `int` is 4 bytes, `long` is 8 bytes.
    Lp64,
}

impl MachineModel {
    /// Returns the size in bytes of the given integer kind.
    #[must_use]
    pub const fn size_of(self, kind: IntKind) -> u32 {
        match kind {
            IntKind::Char => 1,
            IntKind::Short => 2,
            IntKind::Int => 4,
            IntKind::Long => match self {
                MachineModel::Ilp32 => 4,
                MachineModel::Lp64 => 8,
            },
            IntKind::LongLong => 8,
        }
    }

    /// Returns the inclusive value range of an integer kind under this model.
    #[must_use]
    pub const fn int_range(self, kind: IntKind, signed: bool) -> (i128, i128) {
        let bits = (self.size_of(kind) * 8) as u32;
        if signed {
            let max = (1i128 << (bits - 1)) - 1;
            (-max - 1, max)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    /// Returns `true` if `value` fits the given integer kind under this model.
    #[must_use]
    pub const fn value_fits(self, kind: IntKind, signed: bool, value: i128) -> bool {
        let (min, max) = self.int_range(kind, signed);
        min <= value && value <= max
    }

    /// Returns `true` if `value` is a valid (signed) character literal.
    ///
    /// `char` is 8 bits and signed in both models.
    #[must_use]
    pub const fn char_fits(self, value: i64) -> bool {
        -128 <= value && value <= 127
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_width_depends_on_model() {
        assert_eq!(MachineModel::Ilp32.size_of(IntKind::Long), 4);
        assert_eq!(MachineModel::Lp64.size_of(IntKind::Long), 8);
    }

    #[test]
    fn test_int_range_signed() {
        let (min, max) = MachineModel::Lp64.int_range(IntKind::Int, true);
        assert_eq!(min, i128::from(i32::MIN));
        assert_eq!(max, i128::from(i32::MAX));
    }

    #[test]
    fn test_int_range_unsigned() {
        let (min, max) = MachineModel::Lp64.int_range(IntKind::Char, false);
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_value_fits() {
        let m = MachineModel::Ilp32;
        assert!(m.value_fits(IntKind::Long, true, i128::from(i32::MAX)));
        assert!(!m.value_fits(IntKind::Long, true, i128::from(i32::MAX) + 1));
        assert!(MachineModel::Lp64.value_fits(IntKind::Long, true, i128::from(i32::MAX) + 1));
    }

    #[test]
    fn test_char_fits() {
        assert!(MachineModel::Lp64.char_fits(-128));
        assert!(MachineModel::Lp64.char_fits(127));
        assert!(!MachineModel::Lp64.char_fits(200));
    }
}
