use crate::{ElementType, Error, Result, TensorView, MAX_RANK};

/// An owned tensor, contiguous in raster (row-major) order.
#[derive(Clone, PartialEq)]
pub struct Tensor<T> {
    rank: usize,
    extents: [usize; MAX_RANK],
    buf: Vec<T>,
}

impl<T> std::fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("extents", &self.extents())
            .finish_non_exhaustive()
    }
}

impl<T: Default + Clone> Tensor<T> {
    /// Create a tensor of the given extents filled with the default element.
    ///
    /// # Panics
    /// Panics if more than [`MAX_RANK`] extents are given.
    pub fn zeros(extents: &[usize]) -> Self {
        assert!(
            extents.len() <= MAX_RANK,
            "rank {} exceeds the supported maximum of {}",
            extents.len(),
            MAX_RANK
        );

        let len = extents.iter().product();
        let mut ext = [0usize; MAX_RANK];
        ext[..extents.len()].copy_from_slice(extents);
        Self {
            rank: extents.len(),
            extents: ext,
            buf: vec![T::default(); len],
        }
    }
}

impl<T> Tensor<T> {
    /// Wrap a raster-order buffer. The buffer length must match the extents.
    pub fn from_vec(buf: Vec<T>, extents: &[usize]) -> Result<Self> {
        if extents.len() > MAX_RANK {
            return Err(Error::RankTooLarge {
                rank: extents.len(),
                max: MAX_RANK,
            });
        }

        let expected: usize = extents.iter().product();
        if expected != buf.len() {
            return Err(Error::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let mut ext = [0usize; MAX_RANK];
        ext[..extents.len()].copy_from_slice(extents);
        Ok(Self {
            rank: extents.len(),
            extents: ext,
            buf,
        })
    }

    /// Reinterpret the buffer under new extents of the same total length.
    pub fn into_shape(self, extents: &[usize]) -> Result<Self> {
        Self::from_vec(self.buf, extents)
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
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Get the immutable slice to the underlying buffer.
    #[inline]
    pub fn buf(&self) -> &[T] {
        &self.buf
    }

    /// Get the mutable slice to the underlying buffer.
    #[inline]
    pub fn buf_mut(&mut self) -> &mut [T] {
        &mut self.buf
    }

    #[inline]
    fn index_of(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.rank, "index rank mismatch");
        let mut off = 0usize;
        for (axis, (&i, &e)) in index.iter().zip(self.extents()).enumerate() {
            assert!(i < e, "index {} out of range {} on axis {}", i, e, axis);
            off = off * e + i;
        }
        off
    }

    #[inline]
    pub fn get(&self, index: &[usize]) -> &T {
        &self.buf[self.index_of(index)]
    }

    #[inline]
    pub fn get_mut(&mut self, index: &[usize]) -> &mut T {
        let off = self.index_of(index);
        &mut self.buf[off]
    }
}

impl<T: Copy> Tensor<T> {
    /// A contiguous row-major view of the whole tensor.
    ///
    /// # Panics
    /// Panics if the tensor's rank exceeds what borrowed views support.
    pub fn view(&self) -> TensorView<'_, T> {
        TensorView::from_slice(&self.buf, self.extents()).expect("owned tensors are consistent")
    }
}

/// An owned float tensor tagged with its element width.
///
/// Computed state is either `f32` (for `f32` images) or `f64` (everything else); this carries
/// that choice across the untyped public surface.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyTensor {
    F32(Tensor<f32>),
    F64(Tensor<f64>),
}

impl AnyTensor {
    #[inline]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::F32(_) => ElementType::F32,
            Self::F64(_) => ElementType::F64,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        match self {
            Self::F32(t) => t.rank(),
            Self::F64(t) => t.rank(),
        }
    }

    #[inline]
    pub fn extents(&self) -> &[usize] {
        match self {
            Self::F32(t) => t.extents(),
            Self::F64(t) => t.extents(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(t) => t.len(),
            Self::F64(t) => t.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_f32(&self) -> Option<&Tensor<f32>> {
        match self {
            Self::F32(t) => Some(t),
            Self::F64(_) => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<&Tensor<f64>> {
        match self {
            Self::F64(t) => Some(t),
            Self::F32(_) => None,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> AnyTensorRef<'_> {
        match self {
            Self::F32(t) => AnyTensorRef::F32(t),
            Self::F64(t) => AnyTensorRef::F64(t),
        }
    }
}

/// A borrowed counterpart of [`AnyTensor`], used by state accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnyTensorRef<'a> {
    F32(&'a Tensor<f32>),
    F64(&'a Tensor<f64>),
}

impl<'a> AnyTensorRef<'a> {
    #[inline]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::F32(_) => ElementType::F32,
            Self::F64(_) => ElementType::F64,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        match self {
            Self::F32(t) => t.rank(),
            Self::F64(t) => t.rank(),
        }
    }

    #[inline]
    pub fn extents(&self) -> &'a [usize] {
        match self {
            Self::F32(t) => t.extents(),
            Self::F64(t) => t.extents(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(t) => t.len(),
            Self::F64(t) => t.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_f32(&self) -> Option<&'a Tensor<f32>> {
        match self {
            Self::F32(t) => Some(t),
            Self::F64(_) => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<&'a Tensor<f64>> {
        match self {
            Self::F64(t) => Some(t),
            Self::F32(_) => None,
        }
    }

    pub fn to_owned(&self) -> AnyTensor {
        match self {
            Self::F32(t) => AnyTensor::F32((*t).clone()),
            Self::F64(t) => AnyTensor::F64((*t).clone()),
        }
    }
}
