//! This crate provides [`TensorView`] and [`Tensor`], the strided-array layer shared by the
//! gradient, histogram and descriptor crates.
//!
//! A [`TensorView`] borrows an externally owned buffer and describes it with per-axis extents
//! and *signed* element strides, so row-major, column-major and reverse-iterated layouts are
//! all addressed the same way. A [`Tensor`] owns its buffer and is always contiguous in raster
//! (row-major) order; every computed output of the pipeline is a `Tensor`.
mod element;
mod tensor;
mod view;

pub use element::{Element, ElementType, Real};
pub use tensor::{AnyTensor, AnyTensorRef, Tensor};
pub use view::TensorView;

/// Largest rank handled by owned tensors. Borrowed input views stop one short of this; the
/// extra axis exists only for batched query output.
pub const MAX_RANK: usize = 6;

/// Largest rank accepted for borrowed input views.
pub const MAX_VIEW_RANK: usize = 5;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    RankTooLarge { rank: usize, max: usize },
    AxisCountMismatch { extents: usize, strides: usize },
    OutOfBounds { offset: isize, len: usize },
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RankTooLarge { rank, max } => {
                write!(f, "rank {rank} exceeds the supported maximum of {max}")
            }
            Self::AxisCountMismatch { extents, strides } => {
                write!(f, "{extents} extent(s) given with {strides} stride(s)")
            }
            Self::OutOfBounds { offset, len } => {
                write!(
                    f,
                    "strides address element {offset} outside a buffer of {len} element(s)"
                )
            }
            Self::LengthMismatch { expected, actual } => {
                write!(f, "buffer holds {actual} element(s), extents require {expected}")
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
