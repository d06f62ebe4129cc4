//! Orientation vote splatting and the integral histogram volume.
//!
//! Votes are deposited per pixel into a `(height + 1, width + 1, bins)` volume and turned into
//! prefix sums, so any rectangular region's histogram comes out of four corner reads. Cell and
//! block geometry is deliberately absent here; it emerges when the descriptor engine sums
//! cell-sized rectangles.
use std::ops::Range;

use ihog_tensor::{Real, Tensor};

mod integral;
pub use integral::{build, integrate, rect_sum};

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    InvalidBounds {
        rows: (usize, usize),
        cols: (usize, usize),
        height: usize,
        width: usize,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBounds {
                rows,
                cols,
                height,
                width,
            } => write!(
                f,
                "rows {}..{} cols {}..{} do not form a rectangle inside {}x{}",
                rows.0, rows.1, cols.0, cols.1, height, width
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Angular domain of the orientation bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binning {
    /// Orientations folded into `[0, pi)`; opposite gradients share a bin.
    Unsigned,
    /// Full `[0, 2*pi)` orientations.
    Signed,
}

impl Binning {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned",
            Self::Signed => "signed",
        }
    }
}

impl std::fmt::Display for Binning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight applied to the gradient magnitude before voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magnitude {
    Identity,
    Square,
    Sqrt,
}

impl Magnitude {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Square => "square",
            Self::Sqrt => "sqrt",
        }
    }
}

impl std::fmt::Display for Magnitude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated rectangle bounds used by [`rect_sum`].
pub(crate) fn check_bounds<F: Real>(
    hist: &Tensor<F>,
    rows: &Range<usize>,
    cols: &Range<usize>,
) -> Result<()> {
    let height = hist.extents()[0] - 1;
    let width = hist.extents()[1] - 1;
    if rows.start < rows.end && rows.end <= height && cols.start < cols.end && cols.end <= width
    {
        Ok(())
    } else {
        Err(Error::InvalidBounds {
            rows: (rows.start, rows.end),
            cols: (cols.start, cols.end),
            height,
            width,
        })
    }
}
