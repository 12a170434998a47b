//! Window arithmetic shared by the transmitter and the receiver.
//!
//! Both halves must agree exactly on how a payload is cut and how a window's
//! acknowledgement mask is laid out, so the computations live here as pure
//! functions.

use std::ops::Range;

/// Mask value meaning every slot of the current window is accounted for.
pub const FULL_MASK: u8 = u8::MAX;

/// Number of fragments needed to carry `length` bytes.
///
/// An empty payload still travels as one empty fragment.
///
/// # Examples
///
/// ```
/// use meshfrag::window::fragment_count;
/// assert_eq!(fragment_count(250, 100), 3);
/// assert_eq!(fragment_count(100, 100), 1);
/// assert_eq!(fragment_count(0, 100), 1);
/// ```
#[must_use]
pub fn fragment_count(length: usize, fragment_size: usize) -> usize {
    if fragment_size == 0 {
        return usize::MAX;
    }
    length.div_ceil(fragment_size).max(1)
}

/// Byte range of fragment `index` within a `length`-byte payload.
#[must_use]
pub fn fragment_range(index: usize, length: usize, fragment_size: usize) -> Range<usize> {
    let start = index.saturating_mul(fragment_size).min(length);
    let end = start.saturating_add(fragment_size).min(length);
    start..end
}

/// Fragment indices belonging to the window starting at `base`.
///
/// The range is clipped to `count`, so it is empty once `base >= count`.
#[must_use]
pub fn window_indices(base: usize, window_size: u8, count: usize) -> Range<usize> {
    let end = base.saturating_add(usize::from(window_size)).min(count);
    base.min(end)..end
}

/// Initial mask for the window starting at `base`.
///
/// Bits for slots the window will never fill (beyond the window size, or
/// beyond the last fragment when `expected` is known) start set, so the
/// window is complete exactly when the mask equals [`FULL_MASK`]. Pass
/// `None` for `expected` while the fragment count is still unknown.
///
/// # Examples
///
/// ```
/// use meshfrag::window::mask_baseline;
/// assert_eq!(mask_baseline(0, 4, None), 0b1111_0000);
/// assert_eq!(mask_baseline(4, 4, Some(6)), 0b1111_1100);
/// assert_eq!(mask_baseline(0, 8, Some(8)), 0);
/// ```
#[must_use]
pub fn mask_baseline(base: u8, window_size: u8, expected: Option<u8>) -> u8 {
    let remaining = expected.map_or(window_size, |expected| expected.saturating_sub(base));
    let slots = remaining.min(window_size);
    u8::MAX.checked_shl(u32::from(slots)).unwrap_or(0)
}

/// Bit representing fragment `index` in the window starting at `base`.
#[must_use]
pub fn mask_bit(index: u8, base: u8) -> u8 {
    1_u8.checked_shl(u32::from(index.wrapping_sub(base))).unwrap_or(0)
}
