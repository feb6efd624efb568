//! Sentinel-based skipfield index types.
//!
//! The skipfield and the in-slot free list store indices as small unsigned
//! integers. A reserved sentinel value (the type's maximum) stands in for
//! "no index", saving the space an `Option` discriminant would cost in
//! per-slot storage.

/// The skipfield counter / slot index type of a hive.
///
/// Two widths are provided:
///
/// - [`u16`] (the default) allows block capacities up to 65535 and favors
///   fewer, larger blocks.
/// - [`u8`] halves the per-slot skipfield overhead and caps block
///   capacities at 255, for memory-constrained element types.
///
/// The choice affects per-block overhead and the maximum block capacity,
/// never algorithmic behavior.
///
/// # Safety
///
/// Implementors must guarantee that `NONE` is the type's maximum value,
/// that `as_usize`/`from_usize` round-trip all values in
/// `0..=NONE.as_usize()`, and that the all-zero bit pattern is the zero
/// value. Block storage is zero-initialized through raw writes on this
/// basis.
pub unsafe trait SkipIndex: Copy + Eq + Ord + core::fmt::Debug + 'static {
    /// Sentinel value representing "no index" / null.
    const NONE: Self;

    /// The zero counter value.
    const ZERO: Self;

    /// Largest representable block capacity (the sentinel's numeric value).
    const MAX_CAPACITY: usize;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is not the sentinel value.
    #[inline]
    fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Widens to `usize`.
    fn as_usize(self) -> usize;

    /// Narrows from `usize`. Debug-asserts the value is representable.
    fn from_usize(val: usize) -> Self;
}

macro_rules! impl_skip_index_for_unsigned {
    ($($ty:ty),*) => {
        $(
            unsafe impl SkipIndex for $ty {
                const NONE: Self = <$ty>::MAX;
                const ZERO: Self = 0;
                const MAX_CAPACITY: usize = <$ty>::MAX as usize;

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(val: usize) -> Self {
                    debug_assert!(val <= <$ty>::MAX as usize);
                    val as Self
                }
            }
        )*
    };
}

impl_skip_index_for_unsigned!(u8, u16);

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_skip_index_sentinel {
        ($($ty:ty => $name:ident),*) => {
            $(
                #[test]
                fn $name() {
                    assert!(<$ty>::NONE.is_none());
                    assert!(!<$ty>::NONE.is_some());
                    assert!((0 as $ty).is_some());
                    assert!((<$ty>::MAX - 1).is_some());
                    assert_eq!(<$ty>::from_usize(<$ty>::MAX as usize), <$ty>::NONE);
                    assert_eq!(<$ty>::ZERO.as_usize(), 0);
                }
            )*
        };
    }

    test_skip_index_sentinel!(
        u8 => u8_sentinel,
        u16 => u16_sentinel
    );
}
