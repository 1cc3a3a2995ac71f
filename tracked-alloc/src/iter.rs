use core::{
    cmp::Ordering,
    fmt::Debug,
    iter::FusedIterator,
    marker::PhantomData,
};

/// A cursor over the half-open address range `[begin, end)` of one tracked allocation.
///
/// Obtained from [`Handle::begin`][`crate::Handle::begin`] and
/// [`Handle::end`][`crate::Handle::end`]. Iterators compare by position, which is only meaningful
/// for iterators over the same allocation.
pub struct RangeIter<'a, T> {
    current: *const T,
    begin: *const T,
    end: *const T,
    phantom: PhantomData<&'a T>,
}

impl<'a, T> RangeIter<'a, T> {
    /// Creates a new cursor.
    ///
    /// SAFETY: `begin` and `end` must delimit initialized elements of one allocation that outlives
    /// `'a` (or both be null), and `current` must lie within `[begin, end]`.
    pub(crate) unsafe fn new(current: *const T, begin: *const T, end: *const T) -> Self {
        Self {
            current,
            begin,
            end,
            phantom: PhantomData,
        }
    }

    /// Returns the element under the cursor, or [`None`] at the end of the range.
    pub fn current(&self) -> Option<&'a T> {
        if self.is_exhausted() {
            None
        } else {
            Some(unsafe { &*self.current })
        }
    }

    /// Returns the offset of the cursor from the beginning of the range.
    pub fn position(&self) -> usize {
        Self::distance(self.begin, self.current)
    }

    /// Returns a cursor over the same range, positioned at its beginning.
    pub fn restart(&self) -> Self {
        unsafe { Self::new(self.begin, self.begin, self.end) }
    }

    /// Checks if the cursor reached the end of the range.
    pub fn is_exhausted(&self) -> bool {
        self.current == self.end
    }

    fn distance(from: *const T, to: *const T) -> usize {
        if from == to {
            0
        } else {
            // Both pointers are within the same allocation, in order.
            unsafe { to.offset_from(from) as usize }
        }
    }
}

impl<'a, T> Iterator for RangeIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.current()?;
        self.current = unsafe { self.current.add(1) };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = Self::distance(self.current, self.end);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for RangeIter<'_, T> {}

impl<T> FusedIterator for RangeIter<'_, T> {}

impl<T> Clone for RangeIter<'_, T> {
    fn clone(&self) -> Self {
        unsafe { Self::new(self.current, self.begin, self.end) }
    }
}

impl<T> PartialEq for RangeIter<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl<T> Eq for RangeIter<'_, T> {}

impl<T> PartialOrd for RangeIter<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RangeIter<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.current.cmp(&other.current)
    }
}

impl<T> Debug for RangeIter<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RangeIter")
            .field("current", &self.current)
            .field("begin", &self.begin)
            .field("end", &self.end)
            .finish()
    }
}
