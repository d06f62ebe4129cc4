use crate::{Error, Result, Tensor, MAX_VIEW_RANK};

const STORAGE_RANK: usize = MAX_VIEW_RANK;

/// A borrowed strided view over a contiguous buffer.
///
/// The view addresses element `(i_0, .., i_{r-1})` at `offset + sum(i_k * stride_k)`; strides
/// are signed, so a view may iterate any axis in reverse. Construction validates that every
/// addressable element of a non-empty view lands inside the backing slice, which keeps all
/// accessors safe.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    data: &'a [T],
    offset: usize,
    rank: usize,
    extents: [usize; STORAGE_RANK],
    strides: [isize; STORAGE_RANK],
}

impl<'a, T> TensorView<'a, T> {
    /// Create a view from a buffer, a base offset, and per-axis extents and element strides.
    pub fn from_parts(
        data: &'a [T],
        offset: usize,
        extents: &[usize],
        strides: &[isize],
    ) -> Result<Self> {
        if extents.len() != strides.len() {
            return Err(Error::AxisCountMismatch {
                extents: extents.len(),
                strides: strides.len(),
            });
        }

        let rank = extents.len();
        if rank > MAX_VIEW_RANK {
            return Err(Error::RankTooLarge {
                rank,
                max: MAX_VIEW_RANK,
            });
        }

        let len: usize = extents.iter().product();
        if len > 0 {
            let mut lo = offset as isize;
            let mut hi = offset as isize;
            for (&e, &s) in extents.iter().zip(strides) {
                let span = (e - 1) as isize * s;
                if s >= 0 {
                    hi += span;
                } else {
                    lo += span;
                }
            }
            if lo < 0 || hi as usize >= data.len() {
                let offset = if lo < 0 { lo } else { hi };
                return Err(Error::OutOfBounds {
                    offset,
                    len: data.len(),
                });
            }
        }

        let mut owned_extents = [0usize; STORAGE_RANK];
        let mut owned_strides = [0isize; STORAGE_RANK];
        owned_extents[..rank].copy_from_slice(extents);
        owned_strides[..rank].copy_from_slice(strides);

        Ok(Self {
            data,
            offset,
            rank,
            extents: owned_extents,
            strides: owned_strides,
        })
    }

    /// Create a contiguous row-major view over the whole buffer.
    pub fn from_slice(data: &'a [T], extents: &[usize]) -> Result<Self> {
        if extents.len() > MAX_VIEW_RANK {
            return Err(Error::RankTooLarge {
                rank: extents.len(),
                max: MAX_VIEW_RANK,
            });
        }

        let expected: usize = extents.iter().product();
        if expected != data.len() {
            return Err(Error::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut strides = [0isize; STORAGE_RANK];
        let mut acc = 1isize;
        for (axis, &e) in extents.iter().enumerate().rev() {
            strides[axis] = acc;
            acc *= e.max(1) as isize;
        }
        Self::from_parts(data, 0, extents, &strides[..extents.len()])
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn extents(&self) -> &[usize] {
        &self.extents[..self.rank]
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides[..self.rank]
    }

    /// Number of addressable elements; 1 for a rank-0 view.
    #[inline]
    pub fn len(&self) -> usize {
        self.extents[..self.rank].iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn element_offset(&self, index: &[usize; STORAGE_RANK]) -> usize {
        let mut off = self.offset as isize;
        for axis in 0..self.rank {
            off += index[axis] as isize * self.strides[axis];
        }
        off as usize
    }

    /// A view with one axis iterated in reverse. The view covers the same elements.
    pub fn reversed(mut self, axis: usize) -> Self {
        assert!(
            axis < self.rank,
            "axis {} out of range for rank {}",
            axis,
            self.rank
        );

        let e = self.extents[axis];
        if e > 0 {
            let mut off = self.offset as isize;
            off += (e - 1) as isize * self.strides[axis];
            self.offset = off as usize;
            self.strides[axis] = -self.strides[axis];
        }
        self
    }

    /// Restrict one axis to `start..end`, keeping strides.
    ///
    /// # Panics
    /// Panics if the axis or range is out of bounds.
    pub fn narrowed(mut self, axis: usize, start: usize, end: usize) -> Self {
        assert!(axis < self.rank);
        assert!(start <= end && end <= self.extents[axis]);

        if start > 0 {
            let off = self.offset as isize + start as isize * self.strides[axis];
            self.offset = off as usize;
        }
        self.extents[axis] = end - start;
        self
    }
}

impl<'a, T: Copy> TensorView<'a, T> {
    /// Element at `index`.
    ///
    /// # Panics
    /// Panics if `index` does not match the view's rank or extents.
    pub fn get(&self, index: &[usize]) -> T {
        assert_eq!(index.len(), self.rank, "index rank mismatch");
        for (axis, (&i, &e)) in index.iter().zip(self.extents()).enumerate() {
            assert!(i < e, "index {} out of range {} on axis {}", i, e, axis);
        }

        let mut full = [0usize; STORAGE_RANK];
        full[..self.rank].copy_from_slice(index);
        self.data[self.element_offset(&full)]
    }

    /// Unvalidated rank-2 access; the backing slice still bounds-checks.
    #[inline]
    pub fn get2(&self, i0: usize, i1: usize) -> T {
        debug_assert_eq!(self.rank, 2);
        debug_assert!(i0 < self.extents[0] && i1 < self.extents[1]);
        let off = self.offset as isize
            + i0 as isize * self.strides[0]
            + i1 as isize * self.strides[1];
        self.data[off as usize]
    }

    /// Copy the viewed elements into an owned row-major tensor of the same extents.
    pub fn to_tensor(&self) -> Tensor<T> {
        self.map(|v| v)
    }

    /// Row-major copy with a per-element conversion.
    pub fn map<U, M: Fn(T) -> U>(&self, convert: M) -> Tensor<U> {
        let n = self.len();
        let mut buf = Vec::with_capacity(n);
        let mut index = [0usize; STORAGE_RANK];
        for _ in 0..n {
            buf.push(convert(self.data[self.element_offset(&index)]));
            for axis in (0..self.rank).rev() {
                index[axis] += 1;
                if index[axis] < self.extents[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Tensor::from_vec(buf, self.extents()).expect("extents match the copied length")
    }
}
