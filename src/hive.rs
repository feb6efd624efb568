//! The hive container.
//!
//! A hive is a doubly-linked chain of [`Block`]s plus three auxiliary
//! lists: the blocks-with-erasures list (singly linked through
//! `erasures_next`, feeding slot reuse), the in-block free lists of
//! skipblock heads (threaded through erased slots' storage), and the
//! unused-blocks stack (empty blocks parked for later refill).
//!
//! Insertion priority:
//!
//! 1. **Reuse** the head skipblock of the head block on the erasures list
//! 2. **Bump** into the end block's trailing capacity (sequential)
//! 3. **Recycle** a parked unused block
//! 4. **Grow** a new block of capacity `min(len, max)`

use core::fmt;
use core::mem;
use core::ptr;

use crate::block::{Block, FreeNode};
use crate::cursor::{Cursor, RawCursor};
use crate::index::SkipIndex;
use crate::iter::{Iter, IterMut};

// =============================================================================
// Limits
// =============================================================================

/// Soft bounds on per-block element capacity.
///
/// Every block the hive allocates has a capacity in `min..=max`. The hard
/// bounds are `3..=S::MAX_CAPACITY` (255 for `u8` skip indices, 65535 for
/// `u16`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Smallest allowed block capacity.
    pub min: usize,
    /// Largest allowed block capacity.
    pub max: usize,
}

impl Limits {
    /// Creates a limits value. Validation happens at the point of use.
    #[inline]
    pub const fn new(min: usize, max: usize) -> Self {
        Limits { min, max }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Returned by [`Hive::reshape`] when the requested limits fall outside
/// the hard bounds `3..=S::MAX_CAPACITY` or are inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsError {
    /// The rejected limits.
    pub limits: Limits,
}

impl fmt::Display for LimitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block capacity limits {}..={} are outside the allowable range",
            self.limits.min, self.limits.max
        )
    }
}

impl std::error::Error for LimitsError {}

/// Returned by [`Hive::splice`] when a source block's capacity lies
/// outside the destination's configured limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceError {
    /// Capacity of the offending source block.
    pub block_capacity: usize,
}

impl fmt::Display for SpliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source block capacity {} is outside the destination's block capacity limits",
            self.block_capacity
        )
    }
}

impl std::error::Error for SpliceError {}

// =============================================================================
// Hive
// =============================================================================

/// A bucketed sequence container with O(1) insert and erase and stable
/// element positions.
///
/// Elements live in a chain of fixed-capacity blocks. Erased slots are
/// recorded in a per-block jump-counting skipfield, so iteration steps
/// over any run of holes in O(1) and never inspects element storage.
/// Erased slots are reused by later insertions in LIFO order per block,
/// most-recently-erased block first.
///
/// Pointers and cursors to live elements stay valid across insertions and
/// unrelated erasures; there is no reallocation and elements never move.
///
/// `S` selects the skipfield width: `u16` (default) or `u8` via the
/// [`SkipIndex`] trait.
pub struct Hive<T, S: SkipIndex = u16> {
    pub(crate) end_: RawCursor<T, S>,
    pub(crate) begin_: RawCursor<T, S>,
    /// Head of the singly-linked list of blocks with reusable erased
    /// slots.
    erasures_head: *mut Block<T, S>,
    /// Head of the singly-linked stack of empty blocks retained for
    /// later refill.
    unused_head: *mut Block<T, S>,
    pub(crate) size_: usize,
    capacity_: usize,
    min_cap: usize,
    max_cap: usize,
}

// Safety: the hive exclusively owns its blocks and elements.
unsafe impl<T: Send, S: SkipIndex> Send for Hive<T, S> {}
unsafe impl<T: Sync, S: SkipIndex> Sync for Hive<T, S> {}

impl<T, S: SkipIndex> Hive<T, S> {
    const STRIDE: usize = Block::<T, S>::STRIDE;

    /// Hard bounds on block capacity for this skip-index width.
    pub const fn hard_limits() -> Limits {
        Limits { min: 3, max: S::MAX_CAPACITY }
    }

    // An adaptive minimum based around the slot, block, and hive sizes:
    // at least 8 elements, or enough that one block's storage is twice
    // the bookkeeping overhead, whichever is more.
    fn default_min_capacity() -> usize {
        let overhead = (size_of::<Self>() + size_of::<Block<T, S>>()) * 2;
        let n = if Self::STRIDE * 8 > overhead {
            8
        } else {
            overhead / Self::STRIDE
        };
        n.clamp(3, S::MAX_CAPACITY)
    }

    fn limits_valid(limits: Limits) -> bool {
        let hard = Self::hard_limits();
        hard.min <= limits.min && limits.min <= limits.max && limits.max <= hard.max
    }

    /// Creates an empty hive with default block capacity limits.
    ///
    /// No memory is allocated until the first insertion.
    pub fn new() -> Self {
        Hive {
            end_: RawCursor::NULL,
            begin_: RawCursor::NULL,
            erasures_head: ptr::null_mut(),
            unused_head: ptr::null_mut(),
            size_: 0,
            capacity_: 0,
            min_cap: Self::default_min_capacity(),
            max_cap: S::MAX_CAPACITY,
        }
    }

    /// Creates an empty hive with the given block capacity limits.
    ///
    /// # Panics
    ///
    /// Panics if the limits fall outside [`Hive::hard_limits`] or are
    /// inverted.
    pub fn with_limits(limits: Limits) -> Self {
        assert!(
            Self::limits_valid(limits),
            "block capacity limits are outside the allowable range"
        );
        let mut hive = Self::new();
        hive.min_cap = limits.min;
        hive.max_cap = limits.max;
        hive
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.size_
    }

    /// Returns `true` if the hive holds no live elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size_ == 0
    }

    /// Total element capacity across live, parked, and reserved blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity_
    }

    /// The configured block capacity limits.
    #[inline]
    pub fn limits(&self) -> Limits {
        Limits { min: self.min_cap, max: self.max_cap }
    }

    /// Largest number of elements the hive can theoretically hold.
    #[inline]
    pub fn max_len(&self) -> usize {
        isize::MAX as usize / Self::STRIDE
    }

    /// Borrowing iterator over live elements in position order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T, S> {
        Iter::new(self.begin_, self.end_, self.size_)
    }

    /// Mutable iterator over live elements in position order.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T, S> {
        IterMut::new(self.begin_, self.end_, self.size_)
    }

    /// Cursor at the first live element (equals [`Hive::end_cursor`] when
    /// empty).
    #[inline]
    pub fn begin_cursor(&self) -> Cursor<T, S> {
        Cursor::from_raw(self.begin_)
    }

    /// Cursor one-past the last live element.
    #[inline]
    pub fn end_cursor(&self) -> Cursor<T, S> {
        Cursor::from_raw(self.end_)
    }

    /// Recovers a cursor from a reference to a live element of this hive.
    ///
    /// O(blocks) reverse search. Returns `None` if the address does not
    /// belong to this hive's slots or the slot is erased.
    pub fn cursor_of(&self, elem: &T) -> Option<Cursor<T, S>> {
        let p = (elem as *const T).cast::<u8>();
        if self.size_ == 0 {
            return None;
        }
        unsafe {
            // Last block first: usually the largest.
            let mut b = self.end_.block;
            while !b.is_null() {
                if p >= (*b).slots() && p < (*b).slots_end() {
                    let offset = p as usize - (*b).slots() as usize;
                    if offset % Self::STRIDE != 0 {
                        return None;
                    }
                    let index = offset / Self::STRIDE;
                    if (*b).skip_at(index) == 0 && (*b).slot_ptr(index) < (*b).last_endpoint {
                        return Some(Cursor::from_raw(RawCursor::at(b, index)));
                    }
                    return None;
                }
                b = (*b).prev;
            }
        }
        None
    }

    /// Reference to the element at `cursor`.
    ///
    /// # Safety
    ///
    /// `cursor` must refer to a live slot of this hive.
    #[inline]
    pub unsafe fn get(&self, cursor: Cursor<T, S>) -> &T {
        unsafe { &*cursor.raw.elem_ptr() }
    }

    /// Mutable reference to the element at `cursor`.
    ///
    /// # Safety
    ///
    /// `cursor` must refer to a live slot of this hive.
    #[inline]
    pub unsafe fn get_mut(&mut self, cursor: Cursor<T, S>) -> &mut T {
        unsafe { &mut *cursor.raw.elem_ptr() }
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Inserts `value`, returning a cursor to its slot.
    ///
    /// Amortized O(1). The slot is chosen by the allocation priority
    /// (reuse, then bump, then recycle, then grow); reuse takes the head
    /// skipblock's first slot of the most recently listed block with
    /// erasures.
    pub fn insert(&mut self, value: T) -> Cursor<T, S> {
        unsafe {
            if !self.end_.is_null() {
                if self.erasures_head.is_null() {
                    if self.end_.elem != (*self.end_.block).slots_end() {
                        // Bump into trailing capacity.
                        let result = self.end_;
                        ptr::write(self.end_.elem_ptr(), value);
                        self.end_.elem = self.end_.elem.add(Self::STRIDE);
                        self.end_.skip = self.end_.skip.add(1);
                        (*self.end_.block).last_endpoint = self.end_.elem;
                        (*self.end_.block).size += 1;
                        self.size_ += 1;
                        return Cursor::from_raw(result);
                    }

                    // End block saturated: recycle a parked block or grow.
                    let next: *mut Block<T, S>;
                    if self.unused_head.is_null() {
                        let cap = self.size_.min(self.max_cap);
                        let nb = Block::create(cap, self.end_.block).as_ptr();
                        ptr::write((*nb).elem_ptr(0), value);
                        self.capacity_ += cap;
                        next = nb;
                    } else {
                        let nb = self.unused_head;
                        self.unused_head = (*nb).next;
                        ptr::write((*nb).elem_ptr(0), value);
                        (*nb).reset(
                            1,
                            ptr::null_mut(),
                            self.end_.block,
                            (*self.end_.block).number + 1,
                        );
                        next = nb;
                    }
                    (*self.end_.block).next = next;
                    self.end_ = RawCursor::at(next, 1);
                    self.size_ += 1;
                    Cursor::from_raw(RawCursor::at(next, 0))
                } else {
                    // Reuse the head skipblock of the erasures-list head.
                    let b = self.erasures_head;
                    let index = (*b).free_list_head.as_usize();
                    let loc = RawCursor::at(b, index);
                    let prev_idx = (*b).read_node(index).prev;
                    ptr::write(loc.elem_ptr(), value);
                    self.update_skipblock(loc, prev_idx);
                    Cursor::from_raw(loc)
                }
            } else {
                // First insertion: allocate the initial block.
                self.initialize(self.min_cap);
                ptr::write(self.end_.elem_ptr(), value);
                self.end_ = RawCursor::at(self.end_.block, 1);
                self.size_ = 1;
                Cursor::from_raw(self.begin_)
            }
        }
    }

    /// Shrinks the just-reused head skipblock and maintains the free and
    /// erasures lists. `loc` is the former skipblock head (now live),
    /// `prev_idx` the node's older neighbor saved before the element
    /// write overlaid it.
    unsafe fn update_skipblock(&mut self, loc: RawCursor<T, S>, prev_idx: S) {
        unsafe {
            let b = loc.block;
            let remaining = (*loc.skip).as_usize() - 1;

            if remaining != 0 {
                // Shrink the run to start one slot later; the free-list
                // node moves with it.
                *loc.skip.add(remaining) = S::from_usize(remaining);
                *loc.skip.add(1) = S::from_usize(remaining);

                let new_head = (*b).free_list_head.as_usize() + 1;
                (*b).free_list_head = S::from_usize(new_head);
                if prev_idx.is_some() {
                    (*(*b).node_ptr(prev_idx.as_usize())).next = S::from_usize(new_head);
                }
                (*b).write_node(new_head, FreeNode { prev: prev_idx, next: S::NONE });
            } else {
                // Single-slot skipblock consumed entirely.
                (*b).free_list_head = prev_idx;
                if prev_idx.is_some() {
                    (*(*b).node_ptr(prev_idx.as_usize())).next = S::NONE;
                } else {
                    self.erasures_head = (*b).erasures_next;
                }
            }

            *loc.skip = S::ZERO;
            (*b).size += 1;
            self.size_ += 1;

            if b == self.begin_.block && loc.elem < self.begin_.elem {
                self.begin_ = loc;
            }
        }
    }

    /// Inserts `n` clones of `value`.
    ///
    /// Whole skipblocks are refilled first (splitting the last one if it
    /// is larger than the remainder), then the end block's trailing
    /// capacity, then parked blocks, growing as needed. If a clone
    /// panics, the hive keeps the elements constructed so far and all
    /// counters stay honest.
    pub fn insert_fill(&mut self, n: usize, value: T)
    where
        T: Clone,
    {
        if n == 0 {
            return;
        }
        if n == 1 {
            self.insert(value);
            return;
        }
        if self.size_ == 0 {
            self.assign_fill(n, value);
            return;
        }
        self.reserve(self.size_ + n);
        unsafe {
            self.bulk_fill(n, &mut || value.clone());
        }
    }

    unsafe fn bulk_fill(&mut self, mut n: usize, make: &mut impl FnMut() -> T) {
        unsafe {
            self.fill_skipblocks(&mut n, make);
            if n == 0 {
                return;
            }

            // Trailing capacity of the end block.
            let b = self.end_.block;
            let trailing = ((*b).slots_end() as usize - self.end_.elem as usize) / Self::STRIDE;
            let take = trailing.min(n);
            if take != 0 {
                self.fill_at_end(make, take);
                if n == take {
                    return;
                }
                n -= take;
            }

            // Parked blocks, reserved by the caller to cover the rest.
            (*self.end_.block).next = self.unused_head;
            let number = (*self.end_.block).number + 1;
            let prev = self.end_.block;
            let first = self.unused_head;
            self.fill_unused_blocks(n, make, number, prev, first);
        }
    }

    /// Drains whole skipblocks in erasures-list order until `n` is
    /// exhausted or no reusable slots remain.
    unsafe fn fill_skipblocks(&mut self, n: &mut usize, make: &mut impl FnMut() -> T) {
        unsafe {
            while !self.erasures_head.is_null() {
                let b = self.erasures_head;
                let head = (*b).free_list_head.as_usize();
                let loc = RawCursor::at(b, head);
                let run_len = (*b).skip_at(head);
                let prev_idx = (*b).read_node(head).prev;

                if run_len <= *n {
                    (*b).free_list_head = prev_idx;
                    self.fill_skipblock(make, loc, run_len, run_len, prev_idx);
                    *n -= run_len;

                    if (*b).free_list_head.is_some() {
                        // More skipblocks in this block; the new head is
                        // now the newest node.
                        (*(*b).node_ptr((*b).free_list_head.as_usize())).next = S::NONE;
                    } else {
                        self.erasures_head = (*b).erasures_next;
                    }
                    if *n == 0 {
                        return;
                    }
                } else {
                    // Skipblock larger than the remainder: fill a prefix
                    // and keep the suffix as a shorter skipblock.
                    self.fill_skipblock(make, loc, *n, run_len, prev_idx);
                    let new_head = head + *n;
                    let rem = run_len - *n;
                    *(*b).skip_ptr(new_head) = S::from_usize(rem);
                    *(*b).skip_ptr(head + run_len - 1) = S::from_usize(rem);
                    (*b).free_list_head = S::from_usize(new_head);
                    (*b).write_node(new_head, FreeNode { prev: prev_idx, next: S::NONE });
                    if prev_idx.is_some() {
                        (*(*b).node_ptr(prev_idx.as_usize())).next = S::from_usize(new_head);
                    }
                    *n = 0;
                    return;
                }
            }
        }
    }

    /// Constructs `len` elements into the erased run starting at `loc`
    /// and zeroes the covered skipfield cells. On a constructor panic the
    /// suffix is restored as a valid, listed skipblock.
    unsafe fn fill_skipblock(
        &mut self,
        make: &mut impl FnMut() -> T,
        loc: RawCursor<T, S>,
        len: usize,
        run_len: usize,
        prev_idx: S,
    ) {
        unsafe {
            let head = loc.index();
            let mut guard = SkipblockFillGuard {
                hive: self as *mut Self,
                block: loc.block,
                head,
                run_len,
                prev_idx,
                count: 0,
            };
            let mut elem = loc.elem;
            for _ in 0..len {
                ptr::write(elem.cast::<T>(), make());
                elem = elem.add(Self::STRIDE);
                guard.count += 1;
            }
            mem::forget(guard);

            let b = loc.block;
            ptr::write_bytes((*b).skip_ptr(head), 0, len);
            (*b).size += len;
            self.size_ += len;
            if b == self.begin_.block && loc.elem < self.begin_.elem {
                self.begin_ = loc;
            }
        }
    }

    /// Constructs `n` elements at consecutive end positions, committing
    /// `last_endpoint`, block and container sizes, and the end cursor.
    /// If a constructor panics, the same commit happens for the
    /// constructed prefix.
    unsafe fn fill_at_end(&mut self, make: &mut impl FnMut() -> T, n: usize) {
        unsafe {
            let mut guard = EndFillGuard { hive: self as *mut Self, count: 0 };
            for _ in 0..n {
                let h = &mut *guard.hive;
                ptr::write(h.end_.elem_ptr(), make());
                h.end_.elem = h.end_.elem.add(Self::STRIDE);
                guard.count += 1;
            }
            mem::forget(guard);

            let b = self.end_.block;
            (*b).last_endpoint = self.end_.elem;
            (*b).size += n;
            self.size_ += n;
            self.end_.skip = (*b).skip_ptr((*b).index_of(self.end_.elem));
        }
    }

    /// Fills the block chain starting at `first` (linked through `next`),
    /// resetting each block as it goes; the final, partially-filled block
    /// becomes the new end block and the rest of the chain returns to the
    /// unused stack.
    unsafe fn fill_unused_blocks(
        &mut self,
        mut n: usize,
        make: &mut impl FnMut() -> T,
        mut number: usize,
        mut prev: *mut Block<T, S>,
        first: *mut Block<T, S>,
    ) {
        unsafe {
            let mut b = first;
            loop {
                let cap = (*b).capacity;
                if cap < n {
                    (*b).reset(0, (*b).next, prev, number);
                    self.end_ = RawCursor::at(b, 0);
                    self.fill_at_end(make, cap);
                    n -= cap;
                    number += 1;
                    prev = b;
                    b = (*b).next;
                } else {
                    self.unused_head = (*b).next;
                    (*b).reset(0, ptr::null_mut(), prev, number);
                    self.end_ = RawCursor::at(b, 0);
                    self.fill_at_end(make, n);
                    return;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Erasure
    // -------------------------------------------------------------------------

    /// Erases the element at `cursor`, returning a cursor to the next
    /// live position (or the end cursor).
    ///
    /// O(1) except when the erasure empties a non-tail block, which costs
    /// O(blocks) for renumbering.
    ///
    /// # Safety
    ///
    /// `cursor` must refer to a live slot of this hive; it (and any copy
    /// of it) is invalidated.
    pub unsafe fn erase(&mut self, cursor: Cursor<T, S>) -> Cursor<T, S> {
        unsafe { Cursor::from_raw(self.erase_raw(cursor.raw)) }
    }

    unsafe fn erase_raw(&mut self, it: RawCursor<T, S>) -> RawCursor<T, S> {
        unsafe {
            debug_assert!(self.size_ != 0);
            debug_assert!(!it.is_null());
            debug_assert!(it.elem != (*it.block).last_endpoint);
            debug_assert!((*it.skip).as_usize() == 0, "slot already erased");

            ptr::drop_in_place(it.elem_ptr());
            self.size_ -= 1;

            let b = it.block;
            (*b).size -= 1;
            if (*b).size != 0 {
                let index = it.index();
                let left = if index == 0 { 0 } else { (*b).skip_at(index - 1) };
                let right = (*b).skip_at(index + 1);
                let jump;

                if left == 0 && right == 0 {
                    // Isolated erasure: new single-slot skipblock.
                    *it.skip = S::from_usize(1);
                    let old_head = (*b).free_list_head;
                    if old_head.is_some() {
                        (*(*b).node_ptr(old_head.as_usize())).next = S::from_usize(index);
                    } else {
                        (*b).erasures_next = self.erasures_head;
                        self.erasures_head = b;
                    }
                    (*b).write_node(index, FreeNode { prev: old_head, next: S::NONE });
                    (*b).free_list_head = S::from_usize(index);
                    jump = 1;
                } else if left != 0 && right == 0 {
                    // Extend the left run; its head node is unchanged.
                    let len = left + 1;
                    *(*b).skip_ptr(index - left) = S::from_usize(len);
                    *it.skip = S::from_usize(len);
                    jump = 1;
                } else if left == 0 && right != 0 {
                    // Prepend to the right run; its node moves here.
                    let len = right + 1;
                    *it.skip = S::from_usize(len);
                    *(*b).skip_ptr(index + right) = S::from_usize(len);

                    let node = (*b).read_node(index + 1);
                    (*b).write_node(index, node);
                    if node.next.is_some() {
                        (*(*b).node_ptr(node.next.as_usize())).prev = S::from_usize(index);
                    } else {
                        (*b).free_list_head = S::from_usize(index);
                    }
                    if node.prev.is_some() {
                        (*(*b).node_ptr(node.prev.as_usize())).next = S::from_usize(index);
                    }
                    jump = len;
                } else {
                    // Merge both runs; the right run's node is removed.
                    let len = left + right + 1;
                    *(*b).skip_ptr(index - left) = S::from_usize(len);
                    *(*b).skip_ptr(index + right) = S::from_usize(len);

                    let node = (*b).read_node(index + 1);
                    if node.next.is_some() {
                        (*(*b).node_ptr(node.next.as_usize())).prev = node.prev;
                    } else {
                        (*b).free_list_head = node.prev;
                    }
                    if node.prev.is_some() {
                        (*(*b).node_ptr(node.prev.as_usize())).next = node.next;
                    }
                    jump = right + 1;
                }

                let mut ret = RawCursor::at(b, index + jump);
                if ret.elem == (*b).last_endpoint && !(*b).next.is_null() {
                    ret = RawCursor::first_live((*b).next);
                }
                if it.elem == self.begin_.elem {
                    self.begin_ = ret;
                }
                return ret;
            }

            // Block is now empty: consolidate the chain.
            let in_back = (*b).next.is_null();
            let in_front = b == self.begin_.block;

            if in_back && in_front {
                // Sole block: reset in place, cheaper than freeing.
                self.reset_sole_block();
                self.end_
            } else if in_front {
                // Head block: free it, the next block becomes the head.
                let next = (*b).next;
                (*next).prev = ptr::null_mut();
                self.begin_.block = next;
                self.renumber_from(next);
                if (*b).free_list_head.is_some() {
                    self.remove_from_erasures_list(b);
                }
                self.capacity_ -= (*b).capacity;
                Block::destroy(b);
                self.begin_ = RawCursor::first_live(next);
                self.begin_
            } else if !in_back {
                // Middle block: unlink; park only when adjacent to the
                // end block, free otherwise.
                let next = (*b).next;
                (*next).prev = (*b).prev;
                (*(*b).prev).next = next;
                self.renumber_from(next);
                if (*b).free_list_head.is_some() {
                    self.remove_from_erasures_list(b);
                }
                if next == self.end_.block {
                    self.park_unused(b);
                } else {
                    self.capacity_ -= (*b).capacity;
                    Block::destroy(b);
                }
                RawCursor::first_live(next)
            } else {
                // Tail block: park it, the previous block becomes the
                // tail.
                if (*b).free_list_head.is_some() {
                    self.remove_from_erasures_list(b);
                }
                let prev = (*b).prev;
                (*prev).next = ptr::null_mut();
                self.end_ = RawCursor::endpoint(prev);
                self.park_unused(b);
                self.end_
            }
        }
    }

    /// Erases every live element in `[first, last)`, returning a cursor
    /// to `last`'s position (or the end cursor when the erasure reaches
    /// it).
    ///
    /// # Safety
    ///
    /// `first` and `last` must be valid positions of this hive with
    /// `first` not after `last`; cursors into the erased range are
    /// invalidated.
    pub unsafe fn erase_range(&mut self, first: Cursor<T, S>, last: Cursor<T, S>) -> Cursor<T, S> {
        unsafe { Cursor::from_raw(self.erase_range_raw(first.raw, last.raw)) }
    }

    unsafe fn erase_range_raw(
        &mut self,
        first: RawCursor<T, S>,
        last: RawCursor<T, S>,
    ) -> RawCursor<T, S> {
        unsafe {
            let mut cur = first;
            if first.block != last.block {
                let mut removed_blocks = false;

                // Leading partial block, when `first` is not its block's
                // first live element.
                if cur.elem != (*cur.block).slot_ptr((*cur.block).skip_at(0)) {
                    let b = cur.block;
                    let end_ptr = (*b).last_endpoint;
                    let erased = self.destroy_and_unlink_span(&mut cur, end_ptr);

                    // The erased suffix becomes (part of) one skipblock.
                    let first_idx = (*b).index_of(first.elem);
                    let end_idx = (*b).endpoint_index();
                    let span = end_idx - first_idx;
                    let left = (*b).skip_at(first_idx - 1);
                    if left == 0 {
                        *(*b).skip_ptr(first_idx) = S::from_usize(span);
                        *(*b).skip_ptr(end_idx - 1) = S::from_usize(span);
                        self.push_free_node(b, first_idx);
                    } else {
                        let len = left + span;
                        *(*b).skip_ptr(first_idx - left) = S::from_usize(len);
                        *(*b).skip_ptr(end_idx - 1) = S::from_usize(len);
                    }

                    (*b).size -= erased;
                    self.size_ -= erased;
                    cur.block = (*b).next;
                }

                // Whole intermediate blocks.
                let prev_surviving = (*cur.block).prev;
                while cur.block != last.block {
                    let b = cur.block;
                    if mem::needs_drop::<T>() && (*b).size != 0 {
                        let mut walk = RawCursor::first_live(b);
                        let endp = (*b).last_endpoint;
                        while walk.elem != endp {
                            ptr::drop_in_place(walk.elem_ptr());
                            walk.step_within_block();
                        }
                    }
                    if (*b).free_list_head.is_some() {
                        self.remove_from_erasures_list(b);
                    }
                    self.size_ -= (*b).size;
                    cur.block = (*b).next;
                    if (*b).next == self.end_.block {
                        self.park_unused(b);
                    } else {
                        self.capacity_ -= (*b).capacity;
                        Block::destroy(b);
                    }
                    removed_blocks = true;
                }

                cur = RawCursor::first_live(last.block);
                (*last.block).prev = prev_surviving;
                if !prev_surviving.is_null() {
                    (*prev_surviving).next = last.block;
                } else {
                    self.begin_ = last;
                }
                if removed_blocks {
                    self.renumber_from(last.block);
                }
            }

            // Empty remainder (also covers the empty-range case).
            if cur.elem == last.elem {
                return last;
            }

            let b = cur.block;
            if last.elem != self.end_.elem || cur.elem != (*b).slot_ptr((*b).skip_at(0)) {
                // Partial final block.
                let saved = cur;
                let erased = self.destroy_and_unlink_span(&mut cur, last.elem);

                let saved_idx = (*b).index_of(saved.elem);
                let last_idx = (*b).index_of(last.elem);
                let span = last_idx - saved_idx;
                if saved_idx == 0 || (*b).skip_at(saved_idx - 1) == 0 {
                    *(*b).skip_ptr(saved_idx) = S::from_usize(span);
                    *(*b).skip_ptr(last_idx - 1) = S::from_usize(span);
                    self.push_free_node(b, saved_idx);
                } else {
                    let left = (*b).skip_at(saved_idx - 1);
                    let len = left + span;
                    *(*b).skip_ptr(saved_idx - left) = S::from_usize(len);
                    *(*b).skip_ptr(last_idx - 1) = S::from_usize(len);
                }

                if first.elem == self.begin_.elem {
                    self.begin_ = last;
                }
                (*b).size -= erased;
                self.size_ -= erased;
                last
            } else {
                // Entire final block erased; `last` is the end position,
                // so this is the end block.
                if mem::needs_drop::<T>() {
                    let mut walk = cur;
                    while walk.elem != last.elem {
                        ptr::drop_in_place(walk.elem_ptr());
                        walk.step_within_block();
                    }
                }
                self.size_ -= (*b).size;
                if self.size_ == 0 {
                    self.reset_sole_block();
                    return self.end_;
                }
                if (*b).free_list_head.is_some() {
                    self.remove_from_erasures_list(b);
                }
                let prev = (*b).prev;
                (*prev).next = ptr::null_mut();
                self.end_ = RawCursor::endpoint(prev);
                self.park_unused(b);
                self.end_
            }
        }
    }

    /// Walks `[cur, stop)` destroying live elements and unlinking every
    /// crossed free-list node; returns the number of live elements
    /// destroyed. `cur` ends at `stop`.
    unsafe fn destroy_and_unlink_span(
        &mut self,
        cur: &mut RawCursor<T, S>,
        stop: *mut u8,
    ) -> usize {
        unsafe {
            let b = cur.block;
            let mut erased = 0;

            if !mem::needs_drop::<T>() && (*b).free_list_head.is_none() {
                let span = (stop as usize - cur.elem as usize) / Self::STRIDE;
                cur.elem = stop;
                cur.skip = cur.skip.add(span);
                return span;
            }

            while cur.elem != stop {
                if (*cur.skip).as_usize() == 0 {
                    ptr::drop_in_place(cur.elem_ptr());
                    erased += 1;
                    cur.elem = cur.elem.add(Self::STRIDE);
                    cur.skip = cur.skip.add(1);
                } else {
                    // Crossing a skipblock: unlink its node.
                    let node = (*b).read_node(cur.index());
                    let run = (*cur.skip).as_usize();
                    cur.elem = cur.elem.add(run * Self::STRIDE);
                    cur.skip = cur.skip.add(run);

                    if node.prev.is_none() && node.next.is_none() {
                        // Sole node: everything from here to `stop` is
                        // live.
                        self.remove_from_erasures_list(b);
                        (*b).free_list_head = S::NONE;
                        let span = (stop as usize - cur.elem as usize) / Self::STRIDE;
                        erased += span;
                        if mem::needs_drop::<T>() {
                            while cur.elem != stop {
                                ptr::drop_in_place(cur.elem_ptr());
                                cur.elem = cur.elem.add(Self::STRIDE);
                            }
                        } else {
                            cur.elem = stop;
                        }
                        cur.skip = cur.skip.add(span);
                        break;
                    } else if node.next.is_none() {
                        // List head.
                        (*b).free_list_head = node.prev;
                        (*(*b).node_ptr(node.prev.as_usize())).next = S::NONE;
                    } else {
                        (*(*b).node_ptr(node.next.as_usize())).prev = node.prev;
                        if node.prev.is_some() {
                            (*(*b).node_ptr(node.prev.as_usize())).next = node.next;
                        }
                    }
                }
            }
            erased
        }
    }

    /// Retains only the elements for which `pred` returns `true`.
    pub fn retain(&mut self, mut pred: impl FnMut(&T) -> bool) {
        unsafe {
            let mut cur = self.begin_;
            while cur != self.end_ {
                if pred(&*cur.elem_ptr()) {
                    cur.bump();
                } else {
                    cur = self.erase_raw(cur);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Whole-container operations
    // -------------------------------------------------------------------------

    /// Destroys all live elements, keeping one reset block for cheap
    /// refill and parking the rest on the unused stack.
    ///
    /// Idempotent; follow with [`Hive::trim`] to release memory.
    pub fn clear(&mut self) {
        if self.size_ == 0 {
            return;
        }
        unsafe {
            self.drop_all_elements();
            if self.begin_.block != self.end_.block {
                (*self.end_.block).next = self.unused_head;
                self.unused_head = (*self.begin_.block).next;
                self.end_.block = self.begin_.block;
            }
            self.reset_sole_block();
            self.size_ = 0;
        }
    }

    /// Ensures total capacity of at least `n` elements, allocating any
    /// shortfall as parked blocks (`maxCap`-sized plus one clamped
    /// remainder). Live elements are untouched.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`Hive::max_len`].
    pub fn reserve(&mut self, n: usize) {
        if n <= self.capacity_ {
            return;
        }
        assert!(n <= self.max_len(), "reserve amount exceeds maximum capacity");

        let shortfall = n - self.capacity_;
        let mut full_blocks = shortfall / self.max_cap;
        let mut remainder = shortfall - full_blocks * self.max_cap;
        if remainder == 0 {
            remainder = self.max_cap;
            full_blocks -= 1;
        } else if remainder < self.min_cap {
            remainder = self.min_cap;
        }

        unsafe {
            let first: *mut Block<T, S>;
            let mut current: *mut Block<T, S>;

            if self.begin_.is_null() {
                // Allocate the initial live block, rewound to empty.
                self.initialize(remainder);
                let b = self.begin_.block;
                (*b).last_endpoint = (*b).slots();
                (*b).size = 0;
                if full_blocks == 0 {
                    return;
                }
                first = Block::create(self.max_cap, b).as_ptr();
                self.capacity_ += self.max_cap;
                full_blocks -= 1;
                current = first;
            } else {
                first = Block::create(remainder, self.end_.block).as_ptr();
                self.capacity_ += remainder;
                current = first;
            }

            while full_blocks != 0 {
                let nb = Block::create(self.max_cap, current).as_ptr();
                (*current).next = nb;
                self.capacity_ += self.max_cap;
                current = nb;
                full_blocks -= 1;
            }
            (*current).next = self.unused_head;
            self.unused_head = first;
        }
    }

    /// Frees all parked unused blocks. Never moves elements.
    pub fn trim(&mut self) {
        unsafe {
            while !self.unused_head.is_null() {
                let next = (*self.unused_head).next;
                self.capacity_ -= (*self.unused_head).capacity;
                Block::destroy(self.unused_head);
                self.unused_head = next;
            }
        }
    }

    /// Reduces capacity to fit `len`, consolidating storage if needed.
    /// Invalidates all cursors and element pointers.
    pub fn shrink_to_fit(&mut self) {
        if self.size_ == 0 {
            self.reset();
        } else if self.size_ != self.capacity_ {
            unsafe {
                self.consolidate();
            }
        }
    }

    /// Changes the block capacity limits. If any live block violates the
    /// new limits, all elements are moved into fresh conforming blocks
    /// (invalidating cursors and element pointers).
    pub fn reshape(&mut self, limits: Limits) -> Result<(), LimitsError> {
        if !Self::limits_valid(limits) {
            return Err(LimitsError { limits });
        }
        self.min_cap = limits.min;
        self.max_cap = limits.max;
        unsafe {
            let mut b = self.begin_.block;
            while !b.is_null() {
                if (*b).capacity < self.min_cap || (*b).capacity > self.max_cap {
                    self.consolidate();
                    break;
                }
                b = (*b).next;
            }
        }
        Ok(())
    }

    /// Appends all of `other`'s elements by transferring its blocks; no
    /// element is moved or copied. `other` is left empty. The
    /// destination's limits are kept.
    ///
    /// Fails without mutating either hive if any of `other`'s blocks has
    /// a capacity outside `self`'s limits.
    pub fn splice(&mut self, other: &mut Self) -> Result<(), SpliceError> {
        unsafe {
            if other.size_ == 0 {
                return Ok(());
            }
            if other.min_cap < self.min_cap || other.max_cap > self.max_cap {
                let mut b = other.begin_.block;
                while !b.is_null() {
                    if (*b).capacity < self.min_cap || (*b).capacity > self.max_cap {
                        return Err(SpliceError { block_capacity: (*b).capacity });
                    }
                    b = (*b).next;
                }
            }

            let own_limits = (self.min_cap, self.max_cap);
            if self.size_ == 0 {
                // Adopt the source's storage wholesale, keeping our
                // limits.
                self.free_all_blocks();
                self.end_ = other.end_;
                self.begin_ = other.begin_;
                self.erasures_head = other.erasures_head;
                self.unused_head = other.unused_head;
                self.size_ = other.size_;
                self.capacity_ = other.capacity_;
                other.blank();
                return Ok(());
            }

            // If our end block has the larger trailing gap, splice in the
            // other direction: fewer slots get converted to a skipblock.
            let self_gap = (*self.end_.block).slots_end() as usize - self.end_.elem as usize;
            let other_gap = (*other.end_.block).slots_end() as usize - other.end_.elem as usize;
            if self_gap > other_gap {
                let other_limits = (other.min_cap, other.max_cap);
                mem::swap(self, other);
                self.min_cap = own_limits.0;
                self.max_cap = own_limits.1;
                other.min_cap = other_limits.0;
                other.max_cap = other_limits.1;
            }

            // Merge the erasures lists.
            if !other.erasures_head.is_null() {
                if !self.erasures_head.is_null() {
                    let mut tail = self.erasures_head;
                    while !(*tail).erasures_next.is_null() {
                        tail = (*tail).erasures_next;
                    }
                    (*tail).erasures_next = other.erasures_head;
                } else {
                    self.erasures_head = other.erasures_head;
                }
            }

            // Convert our end block's trailing gap into a skipblock so
            // only `last_endpoint` bounds the live region.
            let b = self.end_.block;
            let gap = ((*b).slots_end() as usize - self.end_.elem as usize) / Self::STRIDE;
            if gap != 0 {
                let end_idx = (*b).endpoint_index();
                let left = (*b).skip_at(end_idx - 1);
                (*b).last_endpoint = (*b).slots_end();
                if left == 0 {
                    *(*b).skip_ptr(end_idx) = S::from_usize(gap);
                    *(*b).skip_ptr((*b).capacity - 1) = S::from_usize(gap);
                    self.push_free_node(b, end_idx);
                } else {
                    let len = left + gap;
                    *(*b).skip_ptr(end_idx - left) = S::from_usize(len);
                    *(*b).skip_ptr((*b).capacity - 1) = S::from_usize(len);
                }
            }

            // Renumber the source chain to continue after our tail, then
            // join.
            let mut number = (*self.end_.block).number;
            let mut ob = other.begin_.block;
            while !ob.is_null() {
                number += 1;
                (*ob).number = number;
                ob = (*ob).next;
            }
            (*self.end_.block).next = other.begin_.block;
            (*other.begin_.block).prev = self.end_.block;
            self.end_ = other.end_;
            self.size_ += other.size_;

            other.trim();
            self.capacity_ += other.capacity_;
            other.blank();
            Ok(())
        }
    }

    /// Replaces the contents with `n` clones of `value`, recycling
    /// existing blocks through the bulk-fill path. A clone panic leaves
    /// the hive empty and valid.
    pub fn assign_fill(&mut self, n: usize, value: T)
    where
        T: Clone,
    {
        if n == 0 {
            self.reset();
            return;
        }
        unsafe {
            self.prepare_blocks_for_assign(n);
            let guard = AssignGuard { hive: self as *mut Self };
            self.fill_unused_blocks(n, &mut || value.clone(), 0, ptr::null_mut(), self.begin_.block);
            mem::forget(guard);
        }
    }

    /// Replaces the contents with the iterator's elements. A panicking
    /// source or constructor leaves the hive empty and valid.
    pub fn assign_iter<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut it = iter.into_iter();
        let n = it.len();
        if n == 0 {
            self.reset();
            return;
        }
        unsafe {
            self.prepare_blocks_for_assign(n);
            let guard = AssignGuard { hive: self as *mut Self };
            self.fill_unused_blocks(
                n,
                &mut || it.next().expect("iterator shorter than its reported length"),
                0,
                ptr::null_mut(),
                self.begin_.block,
            );
            mem::forget(guard);
        }
    }

    /// Destroys all elements, frees blocks smaller than the capacity
    /// surplus, reserves up to `n`, and joins every block into one chain
    /// ready for [`Hive::fill_unused_blocks`].
    unsafe fn prepare_blocks_for_assign(&mut self, n: usize) {
        unsafe {
            self.drop_all_elements();

            if self.begin_.is_null() {
                self.reserve(n);
                (*self.end_.block).next = self.unused_head;
            } else if n < self.capacity_ && self.capacity_ - n >= self.min_cap {
                // Free surplus blocks up to the difference margin.
                let mut difference = self.capacity_ - n;
                (*self.end_.block).next = self.unused_head;

                let mut b = self.begin_.block;
                let mut kept: *mut Block<T, S> = ptr::null_mut();
                while !b.is_null() {
                    let next = (*b).next;
                    if (*b).capacity <= difference {
                        difference -= (*b).capacity;
                        self.capacity_ -= (*b).capacity;
                        if b == self.begin_.block {
                            self.begin_.block = next;
                        }
                        Block::destroy(b);
                    } else {
                        if !kept.is_null() {
                            (*kept).next = b;
                        }
                        kept = b;
                    }
                    b = next;
                }
                (*kept).next = ptr::null_mut();
            } else {
                if n > self.capacity_ {
                    self.reserve(n);
                }
                (*self.end_.block).next = self.unused_head;
            }

            self.begin_ = RawCursor::at(self.begin_.block, 0);
            self.erasures_head = ptr::null_mut();
            self.size_ = 0;
        }
    }

    // -------------------------------------------------------------------------
    // Internal: chain and list maintenance
    // -------------------------------------------------------------------------

    unsafe fn initialize(&mut self, capacity: usize) {
        let b = Block::create(capacity, ptr::null_mut()).as_ptr();
        unsafe {
            self.begin_ = RawCursor::at(b, 0);
        }
        self.end_ = self.begin_;
        self.capacity_ = capacity;
    }

    /// Pushes a new free-list node for the skipblock starting at `index`
    /// and puts the block on the erasures list if it was not there.
    unsafe fn push_free_node(&mut self, b: *mut Block<T, S>, index: usize) {
        unsafe {
            let old_head = (*b).free_list_head;
            if old_head.is_some() {
                (*(*b).node_ptr(old_head.as_usize())).next = S::from_usize(index);
            } else {
                (*b).erasures_next = self.erasures_head;
                self.erasures_head = b;
            }
            (*b).write_node(index, FreeNode { prev: old_head, next: S::NONE });
            (*b).free_list_head = S::from_usize(index);
        }
    }

    unsafe fn remove_from_erasures_list(&mut self, b: *mut Block<T, S>) {
        unsafe {
            if b == self.erasures_head {
                self.erasures_head = (*b).erasures_next;
                return;
            }
            let mut prev = self.erasures_head;
            let mut cur = (*prev).erasures_next;
            while cur != b {
                prev = cur;
                cur = (*cur).erasures_next;
            }
            (*prev).erasures_next = (*cur).erasures_next;
        }
    }

    unsafe fn park_unused(&mut self, b: *mut Block<T, S>) {
        unsafe {
            (*b).next = self.unused_head;
        }
        self.unused_head = b;
    }

    /// Reassigns contiguous block numbers along the chain from `b`.
    unsafe fn renumber_from(&mut self, mut b: *mut Block<T, S>) {
        unsafe {
            let mut number = if (*b).prev.is_null() { 0 } else { (*(*b).prev).number + 1 };
            while !b.is_null() {
                (*b).number = number;
                number += 1;
                b = (*b).next;
            }
        }
    }

    /// Rewinds the sole remaining block in place instead of freeing it.
    unsafe fn reset_sole_block(&mut self) {
        unsafe {
            let b = self.end_.block;
            debug_assert!(b == self.begin_.block);
            self.erasures_head = ptr::null_mut();
            (*b).reset(0, ptr::null_mut(), ptr::null_mut(), 0);
            self.begin_ = RawCursor::at(b, 0);
            self.end_ = self.begin_;
        }
    }

    /// Drops every live element. Leaves all structure (blocks, cursors,
    /// sizes) untouched; callers rebuild or free afterwards.
    unsafe fn drop_all_elements(&mut self) {
        if !mem::needs_drop::<T>() || self.size_ == 0 {
            return;
        }
        unsafe {
            let mut cur = self.begin_;
            loop {
                let endp = (*cur.block).last_endpoint;
                while cur.elem != endp {
                    ptr::drop_in_place(cur.elem_ptr());
                    cur.step_within_block();
                }
                if cur.block == self.end_.block {
                    break;
                }
                cur = RawCursor::first_live((*cur.block).next);
            }
        }
    }

    /// Frees every block (live chain and unused stack). Elements must
    /// already be dropped or moved out.
    unsafe fn free_all_blocks(&mut self) {
        unsafe {
            if self.begin_.is_null() {
                debug_assert!(self.unused_head.is_null());
                return;
            }
            (*self.end_.block).next = self.unused_head;
            let mut b = self.begin_.block;
            while !b.is_null() {
                let next = (*b).next;
                Block::destroy(b);
                b = next;
            }
        }
    }

    fn blank(&mut self) {
        self.end_ = RawCursor::NULL;
        self.begin_ = RawCursor::NULL;
        self.erasures_head = ptr::null_mut();
        self.unused_head = ptr::null_mut();
        self.size_ = 0;
        self.capacity_ = 0;
    }

    /// Full release: destroys elements, frees all blocks, and returns to
    /// the never-allocated state.
    fn reset(&mut self) {
        unsafe {
            self.drop_all_elements();
            self.free_all_blocks();
        }
        self.blank();
    }

    /// Moves every element into a fresh hive with the current limits and
    /// replaces `self` with it. Capacity shrinks to fit; all cursors are
    /// invalidated.
    unsafe fn consolidate(&mut self) {
        let mut temp = Hive::<T, S> {
            end_: RawCursor::NULL,
            begin_: RawCursor::NULL,
            erasures_head: ptr::null_mut(),
            unused_head: ptr::null_mut(),
            size_: 0,
            capacity_: 0,
            min_cap: self.size_.clamp(self.min_cap, self.max_cap),
            max_cap: self.max_cap,
        };
        temp.reserve(self.size_);
        unsafe {
            let n = self.size_;
            let mut cur = self.begin_;
            for _ in 0..n {
                temp.insert(ptr::read(cur.elem_ptr()));
                cur.bump();
            }
        }
        temp.min_cap = self.min_cap;
        // The old storage's elements were moved out; drop blocks only.
        self.size_ = 0;
        mem::swap(self, &mut temp);
    }
}

// =============================================================================
// Panic rollback guards
// =============================================================================

/// Restores honest counters when a constructor panics during an
/// end-position fill, and returns any pre-linked unused chain.
struct EndFillGuard<T, S: SkipIndex> {
    hive: *mut Hive<T, S>,
    count: usize,
}

impl<T, S: SkipIndex> Drop for EndFillGuard<T, S> {
    fn drop(&mut self) {
        unsafe {
            let h = &mut *self.hive;
            let b = h.end_.block;
            (*b).last_endpoint = h.end_.elem;
            (*b).size += self.count;
            h.size_ += self.count;
            h.end_.skip = (*b).skip_ptr((*b).index_of(h.end_.elem));
            if !(*b).next.is_null() {
                h.unused_head = (*b).next;
                (*b).next = ptr::null_mut();
            }
        }
    }
}

/// Restores a partially-refilled skipblock: the constructed prefix
/// becomes live, the suffix becomes a valid skipblock relinked as the
/// free-list head.
struct SkipblockFillGuard<T, S: SkipIndex> {
    hive: *mut Hive<T, S>,
    block: *mut Block<T, S>,
    head: usize,
    run_len: usize,
    prev_idx: S,
    count: usize,
}

impl<T, S: SkipIndex> Drop for SkipblockFillGuard<T, S> {
    fn drop(&mut self) {
        unsafe {
            let h = &mut *self.hive;
            let b = self.block;
            ptr::write_bytes((*b).skip_ptr(self.head), 0, self.count);
            (*b).size += self.count;
            h.size_ += self.count;

            let new_head = self.head + self.count;
            let rem = self.run_len - self.count;
            *(*b).skip_ptr(new_head) = S::from_usize(rem);
            *(*b).skip_ptr(self.head + self.run_len - 1) = S::from_usize(rem);
            (*b).write_node(new_head, FreeNode { prev: self.prev_idx, next: S::NONE });
            (*b).free_list_head = S::from_usize(new_head);
            if self.prev_idx.is_some() {
                (*(*b).node_ptr(self.prev_idx.as_usize())).next = S::from_usize(new_head);
            }

            if self.count != 0 && b == h.begin_.block {
                let loc = RawCursor::at(b, self.head);
                if loc.elem < h.begin_.elem {
                    h.begin_ = loc;
                }
            }
        }
    }
}

/// Empties the hive when a whole-container assign fails partway.
struct AssignGuard<T, S: SkipIndex> {
    hive: *mut Hive<T, S>,
}

impl<T, S: SkipIndex> Drop for AssignGuard<T, S> {
    fn drop(&mut self) {
        unsafe {
            (*self.hive).clear();
        }
    }
}

// =============================================================================
// Std trait impls
// =============================================================================

impl<T, S: SkipIndex> Default for Hive<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: SkipIndex> Drop for Hive<T, S> {
    fn drop(&mut self) {
        unsafe {
            self.drop_all_elements();
            self.free_all_blocks();
        }
    }
}

impl<T: Clone, S: SkipIndex> Clone for Hive<T, S> {
    fn clone(&self) -> Self {
        // Raise the minimum toward the element count while cloning so no
        // undersized blocks are created, then restore it.
        let mut new = Hive::<T, S> {
            end_: RawCursor::NULL,
            begin_: RawCursor::NULL,
            erasures_head: ptr::null_mut(),
            unused_head: ptr::null_mut(),
            size_: 0,
            capacity_: 0,
            min_cap: self.size_.clamp(self.min_cap, self.max_cap),
            max_cap: self.max_cap,
        };
        new.reserve(self.size_);
        for v in self.iter() {
            new.insert(v.clone());
        }
        new.min_cap = self.min_cap;
        new
    }
}

impl<T: fmt::Debug, S: SkipIndex> fmt::Debug for Hive<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, S: SkipIndex> PartialEq for Hive<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.size_ == other.size_ && self.iter().eq(other.iter())
    }
}

impl<T: Eq, S: SkipIndex> Eq for Hive<T, S> {}

impl<T, S: SkipIndex> Extend<T> for Hive<T, S> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        if lower != 0 {
            self.reserve(self.size_ + lower);
        }
        for v in iter {
            self.insert(v);
        }
    }
}

impl<T, S: SkipIndex> FromIterator<T> for Hive<T, S> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut hive = Hive::new();
        hive.extend(iter);
        hive
    }
}

impl<'a, T, S: SkipIndex> IntoIterator for &'a Hive<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, S: SkipIndex> IntoIterator for &'a mut Hive<T, S> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, S: SkipIndex> IntoIterator for Hive<T, S> {
    type Item = T;
    type IntoIter = crate::iter::IntoIter<T, S>;

    fn into_iter(self) -> Self::IntoIter {
        crate::iter::IntoIter::new(self)
    }
}

// =============================================================================
// Test-only invariant checking
// =============================================================================

#[cfg(test)]
impl<T, S: SkipIndex> Hive<T, S> {
    /// Walks every block, skipfield, free list, and auxiliary list and
    /// asserts the container's structural invariants.
    pub(crate) fn validate(&self) {
        unsafe {
            if self.begin_.is_null() {
                assert_eq!(self.size_, 0);
                assert_eq!(self.capacity_, 0);
                assert!(self.end_.is_null());
                assert!(self.erasures_head.is_null());
                assert!(self.unused_head.is_null());
                return;
            }
            assert!((*self.begin_.block).prev.is_null());

            let mut total_size = 0usize;
            let mut total_cap = 0usize;
            let mut with_erasures: Vec<*mut Block<T, S>> = Vec::new();
            let mut prev: *mut Block<T, S> = ptr::null_mut();
            let mut last_number: Option<usize> = None;
            let mut b = self.begin_.block;
            while !b.is_null() {
                assert_eq!((*b).prev, prev);
                if let Some(n) = last_number {
                    assert!((*b).number > n, "block numbers must increase");
                }
                last_number = Some((*b).number);

                assert_eq!((*b).skip_at((*b).capacity), 0, "skipfield sentinel");
                if (*b).next.is_null() {
                    assert_eq!(b, self.end_.block, "chain tail is the end block");
                } else {
                    assert!((*b).is_saturated(), "non-tail blocks are saturated");
                }

                let endpoint = (*b).endpoint_index();
                let mut i = 0;
                let mut live = 0usize;
                while i < endpoint {
                    let v = (*b).skip_at(i);
                    if v == 0 {
                        live += 1;
                        i += 1;
                    } else {
                        assert!(i + v <= endpoint, "run stays within the block");
                        assert_eq!((*b).skip_at(i + v - 1), v, "run end counter");
                        i += v;
                    }
                }
                assert_eq!(live, (*b).size, "block live count");

                let mut holes = 0usize;
                let mut idx = (*b).free_list_head;
                let mut newer = S::NONE;
                while idx.is_some() {
                    assert!((*b).skip_at(idx.as_usize()) > 0, "listed node is a run head");
                    let node = (*b).read_node(idx.as_usize());
                    assert_eq!(node.next, newer, "free list back-link");
                    holes += (*b).skip_at(idx.as_usize());
                    newer = idx;
                    idx = node.prev;
                }
                assert_eq!(live + holes, endpoint, "every hole belongs to a listed run");
                if (*b).free_list_head.is_some() {
                    with_erasures.push(b);
                }

                total_size += live;
                total_cap += (*b).capacity;
                prev = b;
                b = (*b).next;
            }
            assert_eq!(total_size, self.size_);

            let mut u = self.unused_head;
            while !u.is_null() {
                total_cap += (*u).capacity;
                u = (*u).next;
            }
            assert_eq!(total_cap, self.capacity_);

            let mut listed: Vec<*mut Block<T, S>> = Vec::new();
            let mut e = self.erasures_head;
            while !e.is_null() {
                assert!(!listed.contains(&e), "block on the erasures list twice");
                assert!((*e).free_list_head.is_some());
                listed.push(e);
                e = (*e).erasures_next;
            }
            for b in &with_erasures {
                assert!(listed.contains(b), "block with erasures not listed");
            }
            assert_eq!(listed.len(), with_erasures.len());

            let bb = self.begin_.block;
            assert_eq!(self.begin_.elem, (*bb).slot_ptr((*bb).skip_at(0)));
            assert_eq!(self.end_.elem, (*self.end_.block).last_endpoint);
            if self.size_ == 0 {
                assert_eq!(self.begin_.elem, self.end_.elem);
            }
        }
    }
}
