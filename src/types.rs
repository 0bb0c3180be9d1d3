//! Core type definitions for the circuit simulator.
//!
//! Runtime structures address components, nets, ports and phases by array
//! index. These aliases keep the different index spaces apart at a glance.

/// Simulation time in clock ticks.
pub type Tick = u64;

/// The value carried by a port or net. Widths up to [`MAX_WIDTH`] bits fit.
pub type Word = u64;

/// Index of an executable component within an `ExeSystem`.
pub type CompIdx = usize;

/// Index of an executable net within an `ExeSystem`.
pub type NetIdx = usize;

/// Index of a runtime port within its owning component.
pub type PortIdx = usize;

/// Index of a phase within its owning component.
pub type PhaseIdx = usize;

/// Widest supported port/net width in bits.
pub const MAX_WIDTH: u32 = 64;

/// Width used for ports and nets that declare none.
pub const DEFAULT_WIDTH: u32 = 32;

/// Value a net takes when no driver is enabled, or when drivers contend.
pub const FLOATING: Word = 0;

/// Returns the bit mask for a value of `width` bits.
///
/// Widths of zero yield an empty mask, widths of [`MAX_WIDTH`] or more the
/// full word.
#[inline]
pub fn mask(width: u32) -> Word {
    if width >= MAX_WIDTH {
        Word::MAX
    } else {
        (1 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(1), 1);
        assert_eq!(mask(8), 0xff);
        assert_eq!(mask(32), 0xffff_ffff);
        assert_eq!(mask(64), u64::MAX);
        assert_eq!(mask(80), u64::MAX);
    }

    #[test]
    fn test_floating_is_zero() {
        assert_eq!(FLOATING, 0);
    }
}
