//! Cursors: stable positions into a hive.
//!
//! A cursor is the (block, element, skipfield) pointer triple. The element
//! and skipfield pointers move in lockstep, so a single skipfield load per
//! step is enough to jump any run of erased slots. The trailing skipfield
//! sentinel lets a forward step run without a bounds test: stepping past
//! the last live slot of a block lands exactly on `last_endpoint`, and only
//! then is the next block consulted.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::block::Block;
use crate::index::SkipIndex;

/// Internal untyped position. Null in all three fields for the empty hive.
pub(crate) struct RawCursor<T, S: SkipIndex> {
    pub(crate) block: *mut Block<T, S>,
    pub(crate) elem: *mut u8,
    pub(crate) skip: *mut S,
}

impl<T, S: SkipIndex> Clone for RawCursor<T, S> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S: SkipIndex> Copy for RawCursor<T, S> {}

impl<T, S: SkipIndex> PartialEq for RawCursor<T, S> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.elem == other.elem
    }
}

impl<T, S: SkipIndex> Eq for RawCursor<T, S> {}

impl<T, S: SkipIndex> RawCursor<T, S> {
    pub(crate) const NULL: Self = RawCursor {
        block: ptr::null_mut(),
        elem: ptr::null_mut(),
        skip: ptr::null_mut(),
    };

    const STRIDE: usize = Block::<T, S>::STRIDE;

    /// Position at slot `index` of `block`.
    ///
    /// # Safety
    ///
    /// `block` must be live and `index <= capacity`.
    #[inline]
    pub(crate) unsafe fn at(block: *mut Block<T, S>, index: usize) -> Self {
        unsafe {
            RawCursor {
                block,
                elem: (*block).slot_ptr(index),
                skip: (*block).skip_ptr(index),
            }
        }
    }

    /// Position of the first live slot of `block` (skipping a leading
    /// erased run).
    ///
    /// # Safety
    ///
    /// `block` must be live and hold at least one live element.
    #[inline]
    pub(crate) unsafe fn first_live(block: *mut Block<T, S>) -> Self {
        unsafe { Self::at(block, (*block).skip_at(0)) }
    }

    /// The end position of `block`: at `last_endpoint`.
    ///
    /// # Safety
    ///
    /// `block` must be live.
    #[inline]
    pub(crate) unsafe fn endpoint(block: *mut Block<T, S>) -> Self {
        unsafe {
            RawCursor {
                block,
                elem: (*block).last_endpoint,
                skip: (*block).skip_ptr((*block).endpoint_index()),
            }
        }
    }

    #[inline]
    pub(crate) fn is_null(&self) -> bool {
        self.block.is_null()
    }

    #[inline]
    pub(crate) fn elem_ptr(&self) -> *mut T {
        self.elem.cast::<T>()
    }

    /// Slot index of this position within its block.
    ///
    /// # Safety
    ///
    /// The cursor must be non-null and within its block.
    #[inline]
    pub(crate) unsafe fn index(&self) -> usize {
        unsafe { (*self.block).index_of(self.elem) }
    }

    // -------------------------------------------------------------------------
    // Single steps
    // -------------------------------------------------------------------------

    /// Advances to the next live slot, hopping to the next block when the
    /// step lands on `last_endpoint`.
    ///
    /// # Safety
    ///
    /// The cursor must point at a live slot or at a skipped position whose
    /// skipfield run is intact, and must not be the hive's end position.
    pub(crate) unsafe fn bump(&mut self) {
        unsafe {
            self.skip = self.skip.add(1);
            let skip = (*self.skip).as_usize();
            self.elem = self.elem.add((skip + 1) * Self::STRIDE);
            self.skip = self.skip.add(skip);

            if self.elem == (*self.block).last_endpoint && !(*self.block).next.is_null() {
                *self = Self::first_live((*self.block).next);
            }
        }
    }

    /// Advances to the next live position without ever hopping blocks;
    /// lands on `last_endpoint` after the block's last live slot.
    ///
    /// # Safety
    ///
    /// The cursor must point at a live slot of a live block.
    #[inline]
    pub(crate) unsafe fn step_within_block(&mut self) {
        unsafe {
            self.skip = self.skip.add(1);
            let skip = (*self.skip).as_usize();
            self.elem = self.elem.add((skip + 1) * Self::STRIDE);
            self.skip = self.skip.add(skip);
        }
    }

    /// Retreats to the previous live slot, hopping to the previous block
    /// when the step leaves the slot region.
    ///
    /// # Safety
    ///
    /// The cursor must be a valid position and not the hive's begin.
    pub(crate) unsafe fn retreat(&mut self) {
        unsafe {
            let b = self.block;
            if self.elem != (*b).slots() {
                let idx = (*b).index_of(self.elem);
                let skip = (*b).skip_at(idx - 1);
                // A leading erased run of length == idx would step out of
                // the block; anything shorter lands on a live slot.
                if idx != skip {
                    let target = idx - 1 - skip;
                    self.elem = (*b).slot_ptr(target);
                    self.skip = (*b).skip_ptr(target);
                    return;
                }
            }

            let prev = (*b).prev;
            debug_assert!(!prev.is_null(), "retreat past the first live element");
            // Non-tail blocks are always saturated, so the last live slot
            // is found from the capacity end.
            let cap = (*prev).capacity;
            let skip = (*prev).skip_at(cap - 1);
            let target = cap - 1 - skip;
            self.block = prev;
            self.elem = (*prev).slot_ptr(target);
            self.skip = (*prev).skip_ptr(target);
        }
    }

    // -------------------------------------------------------------------------
    // Multi-step navigation
    // -------------------------------------------------------------------------

    /// Advances `n` live positions forward, bounding at the end position,
    /// skipping whole blocks through their live counts.
    ///
    /// # Safety
    ///
    /// The cursor must be a valid live-slot or end position of a hive.
    pub(crate) unsafe fn advance_forward(&mut self, mut n: usize) {
        unsafe {
            if n == 0 {
                return;
            }
            let mut b = self.block;
            if self.elem == (*b).last_endpoint && (*b).next.is_null() {
                // Already at end.
                return;
            }

            // Leading partial block: from the current position to the
            // block's end.
            if self.elem != (*b).slot_ptr((*b).skip_at(0)) {
                if (*b).free_list_head.is_none() {
                    // No holes: plain pointer arithmetic.
                    let dist_to_end = (*b).endpoint_index() - (*b).index_of(self.elem);
                    if n < dist_to_end {
                        *self = Self::at(b, (*b).index_of(self.elem) + n);
                        return;
                    }
                    if (*b).next.is_null() {
                        *self = Self::endpoint(b);
                        return;
                    }
                    n -= dist_to_end;
                } else {
                    // Walk live positions until the block is exhausted.
                    let endpoint = (*b).skip_ptr((*b).endpoint_index());
                    let mut sp = self.skip;
                    loop {
                        sp = sp.add(1);
                        sp = sp.add((*sp).as_usize());
                        n -= 1;
                        if sp == endpoint {
                            break;
                        }
                        if n == 0 {
                            *self = Self::at(b, sp.offset_from((*b).skipfield()) as usize);
                            return;
                        }
                    }
                    if (*b).next.is_null() {
                        *self = Self::endpoint(b);
                        return;
                    }
                }
                b = (*b).next;
                if n == 0 {
                    *self = Self::first_live(b);
                    return;
                }
            }

            // Whole blocks: consume each block's live count outright.
            while n >= (*b).size {
                if (*b).next.is_null() {
                    *self = Self::endpoint(b);
                    return;
                }
                n -= (*b).size;
                b = (*b).next;
                if n == 0 {
                    *self = Self::first_live(b);
                    return;
                }
            }

            // Trailing partial block, entered at its first live position.
            if (*b).free_list_head.is_none() {
                *self = Self::at(b, n);
            } else {
                let mut sp = (*b).skip_ptr((*b).skip_at(0));
                while n != 0 {
                    sp = sp.add(1);
                    sp = sp.add((*sp).as_usize());
                    n -= 1;
                }
                *self = Self::at(b, sp.offset_from((*b).skipfield()) as usize);
            }
        }
    }

    /// Advances `n` live positions backward, bounding at the begin
    /// position.
    ///
    /// # Safety
    ///
    /// The cursor must be a valid live-slot or end position of a hive.
    pub(crate) unsafe fn advance_backward(&mut self, mut n: usize) {
        unsafe {
            if n == 0 {
                return;
            }
            let mut b = self.block;

            // Leading partial block: anything but an endpoint position
            // steps back within its own block first.
            if self.elem != (*b).last_endpoint {
                if (*b).free_list_head.is_none() {
                    let idx = (*b).index_of(self.elem);
                    if n <= idx {
                        *self = Self::at(b, idx - n);
                        return;
                    }
                    if (*b).prev.is_null() {
                        *self = Self::at(b, 0);
                        return;
                    }
                    n -= idx;
                } else {
                    let begin_sp = (*b).skip_ptr((*b).skip_at(0));
                    let mut sp = self.skip;
                    while sp != begin_sp {
                        sp = sp.sub(1);
                        sp = sp.sub((*sp).as_usize());
                        n -= 1;
                        if n == 0 {
                            *self = Self::at(b, sp.offset_from((*b).skipfield()) as usize);
                            return;
                        }
                    }
                    if (*b).prev.is_null() {
                        *self = Self::at(b, (*b).skip_at(0));
                        return;
                    }
                }
                b = (*b).prev;
                // Position is now conceptually one-past `b`'s last live
                // element; n live steps remain.
            }

            // Whole blocks.
            while n > (*b).size {
                if (*b).prev.is_null() {
                    *self = Self::first_live(b);
                    return;
                }
                n -= (*b).size;
                b = (*b).prev;
            }

            // Trailing partial block, entered one-past its last live slot.
            if n == (*b).size {
                *self = Self::first_live(b);
            } else if (*b).free_list_head.is_none() {
                *self = Self::at(b, (*b).endpoint_index() - n);
            } else {
                let mut sp = (*b).skip_ptr((*b).endpoint_index());
                while n != 0 {
                    sp = sp.sub(1);
                    sp = sp.sub((*sp).as_usize());
                    n -= 1;
                }
                *self = Self::at(b, sp.offset_from((*b).skipfield()) as usize);
            }
        }
    }

    /// Number of live positions from `self` to `other` (negative when
    /// `other` precedes `self`).
    ///
    /// # Safety
    ///
    /// Both cursors must be valid positions of the same hive.
    pub(crate) unsafe fn distance(&self, other: &Self) -> isize {
        unsafe {
            if self.elem == other.elem {
                return 0;
            }
            let (first, last, negate) = if self.precedes(other) {
                (*self, *other, false)
            } else {
                (*other, *self, true)
            };

            let mut count: usize = 0;
            let mut b = first.block;
            let mut sp = first.skip;

            if b != last.block {
                // Count from `first` to the end of its block.
                if (*b).free_list_head.is_none() {
                    count += (*b).endpoint_index() - (*b).index_of(first.elem);
                } else if first.elem == (*b).slot_ptr((*b).skip_at(0)) {
                    count += (*b).size;
                } else {
                    let endpoint = (*b).skip_ptr((*b).endpoint_index());
                    while sp != endpoint {
                        sp = sp.add(1);
                        sp = sp.add((*sp).as_usize());
                        count += 1;
                    }
                }

                b = (*b).next;
                while b != last.block {
                    count += (*b).size;
                    b = (*b).next;
                }
                sp = (*b).skip_ptr((*b).skip_at(0));
            }

            // Count from the entry position of `last`'s block to `last`.
            if (*b).free_list_head.is_none() {
                count += last.skip.offset_from(sp) as usize;
            } else {
                while sp != last.skip {
                    sp = sp.add(1);
                    sp = sp.add((*sp).as_usize());
                    count += 1;
                }
            }

            if negate { -(count as isize) } else { count as isize }
        }
    }

    /// Forward-iteration order: block rank first, slot address within a
    /// block second.
    ///
    /// # Safety
    ///
    /// Both cursors must belong to the same live hive.
    #[inline]
    pub(crate) unsafe fn precedes(&self, other: &Self) -> bool {
        if self.block == other.block {
            self.elem < other.elem
        } else {
            unsafe { (*self.block).number < (*other.block).number }
        }
    }
}

/// A stable, copyable handle to a hive position.
///
/// A cursor refers to a live element (or the end position) and stays valid
/// across unrelated insertions and erasures. Erasing the slot a cursor
/// refers to invalidates that cursor; using an invalidated cursor with any
/// `unsafe` operation is undefined behavior. The safe way to recover a
/// cursor from an element reference is [`Hive::cursor_of`].
///
/// Equality compares positions; two cursors of the same hive are equal iff
/// they refer to the same slot.
///
/// [`Hive::cursor_of`]: crate::Hive::cursor_of
pub struct Cursor<T, S: SkipIndex = u16> {
    pub(crate) raw: RawCursor<T, S>,
    pub(crate) _marker: PhantomData<*const T>,
}

impl<T, S: SkipIndex> Clone for Cursor<T, S> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S: SkipIndex> Copy for Cursor<T, S> {}

impl<T, S: SkipIndex> PartialEq for Cursor<T, S> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T, S: SkipIndex> Eq for Cursor<T, S> {}

impl<T, S: SkipIndex> fmt::Debug for Cursor<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("slot", &self.raw.elem)
            .finish_non_exhaustive()
    }
}

impl<T, S: SkipIndex> Cursor<T, S> {
    #[inline]
    pub(crate) fn from_raw(raw: RawCursor<T, S>) -> Self {
        Cursor { raw, _marker: PhantomData }
    }

    /// Raw pointer to the element this cursor refers to.
    ///
    /// The pointer is only meaningful while the slot stays live; it is
    /// suitable for identity checks and for [`Hive::cursor_of`].
    ///
    /// [`Hive::cursor_of`]: crate::Hive::cursor_of
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.raw.elem_ptr()
    }

    /// The position `n` live steps forward, bounded at the hive's end.
    ///
    /// # Safety
    ///
    /// `self` must be a valid live-element or end position of a live hive,
    /// and the hive must not have been structurally mutated since the
    /// cursor was obtained.
    #[inline]
    pub unsafe fn next(mut self, n: usize) -> Self {
        unsafe {
            self.raw.advance_forward(n);
        }
        self
    }

    /// The position `n` live steps backward, bounded at the hive's begin.
    ///
    /// # Safety
    ///
    /// As for [`Cursor::next`].
    #[inline]
    pub unsafe fn prev(mut self, n: usize) -> Self {
        unsafe {
            self.raw.advance_backward(n);
        }
        self
    }

    /// Signed step count: moves forward for positive `n`, backward for
    /// negative.
    ///
    /// # Safety
    ///
    /// As for [`Cursor::next`].
    #[inline]
    pub unsafe fn advance(self, n: isize) -> Self {
        unsafe {
            if n >= 0 {
                self.next(n as usize)
            } else {
                self.prev(n.unsigned_abs())
            }
        }
    }

    /// Number of live positions from `self` to `other`; negative when
    /// `other` precedes `self`.
    ///
    /// # Safety
    ///
    /// Both cursors must be valid positions of the same live hive.
    #[inline]
    pub unsafe fn distance(&self, other: &Self) -> isize {
        unsafe { self.raw.distance(&other.raw) }
    }

    /// Whether `self` comes before `other` in iteration order.
    ///
    /// # Safety
    ///
    /// Both cursors must be valid positions of the same live hive.
    #[inline]
    pub unsafe fn precedes(&self, other: &Self) -> bool {
        unsafe { self.raw.precedes(&other.raw) }
    }
}
