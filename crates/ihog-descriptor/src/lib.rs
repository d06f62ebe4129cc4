//! The integral-histogram HOG descriptor engine.
//!
//! [`IntegralHogDescriptor`] ties the pipeline together: it validates its configuration once
//! at construction, turns an image (or a precomputed derivative pair) into an integral
//! histogram, and synthesizes normalized block descriptors for the whole image or for
//! arbitrary windows. Computed state is replaced atomically by each successful
//! [`compute`][IntegralHogDescriptor::compute]; a failed compute leaves the previous state
//! untouched.
use ihog_tensor::{AnyTensor, AnyTensorRef, Element, ElementType, Tensor, TensorView};

mod config;
mod engine;
mod normalize;
mod serialize;

pub use config::{BlockNorm, DescriptorBuilder};
pub use ihog_gradient::{DenseMask, Gradients, Mask};
pub use ihog_hist::{Binning, Magnitude};
pub use serialize::CodecError;

use config::DescriptorConfig;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Tensor(ihog_tensor::Error),
    Gradient(ihog_gradient::Error),
    Histogram(ihog_hist::Error),
    Codec(CodecError),
    InvalidBinCount { n_bins: usize },
    InvalidCellSize { size: (usize, usize) },
    InvalidBlockSize { size: (usize, usize) },
    InvalidBlockStride { stride: (usize, usize) },
    BlockCellMismatch { block: (usize, usize), cell: (usize, usize) },
    StrideCellMismatch { stride: (usize, usize), cell: (usize, usize) },
    InvalidEpsilon { epsilon: f64 },
    InvalidClipNorm { clip_norm: f64 },
    UnknownBinning(String),
    UnknownMagnitude(String),
    UnknownBlockNorm(String),
    UnknownOption(String),
    InvalidRepr { message: String },
    RoiOutOfBounds { bounds: Bounds, image: (usize, usize) },
    HeterogeneousBatch,
}

/// Coarse classification of an [`Error`], mirroring the host-language taxonomy the original
/// interface promises: misuse of types, out-of-range values, and malformed array shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Value,
    Shape,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Tensor(_) => ErrorKind::Type,
            Self::Gradient(err) => match err {
                ihog_gradient::Error::InvalidRank { .. }
                | ihog_gradient::Error::InvalidChannelCount { .. } => ErrorKind::Shape,
                ihog_gradient::Error::Tensor(_) => ErrorKind::Type,
                _ => ErrorKind::Value,
            },
            Self::Histogram(_) => ErrorKind::Value,
            Self::Codec(_) => ErrorKind::Value,
            Self::UnknownBinning(_)
            | Self::UnknownMagnitude(_)
            | Self::UnknownBlockNorm(_)
            | Self::UnknownOption(_)
            | Self::InvalidRepr { .. } => ErrorKind::Type,
            _ => ErrorKind::Value,
        }
    }
}

impl From<ihog_tensor::Error> for Error {
    fn from(err: ihog_tensor::Error) -> Self {
        Self::Tensor(err)
    }
}

impl From<ihog_gradient::Error> for Error {
    fn from(err: ihog_gradient::Error) -> Self {
        Self::Gradient(err)
    }
}

impl From<ihog_hist::Error> for Error {
    fn from(err: ihog_hist::Error) -> Self {
        Self::Histogram(err)
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tensor(err) => write!(f, "tensor error: {}", err),
            Self::Gradient(err) => write!(f, "gradient error: {}", err),
            Self::Histogram(err) => write!(f, "histogram error: {}", err),
            Self::Codec(err) => write!(f, "serialized state error: {}", err),
            Self::InvalidBinCount { n_bins } => {
                write!(f, "number of bins must be positive, got {n_bins}")
            }
            Self::InvalidCellSize { size } => {
                write!(f, "cell size must be positive, got ({}, {})", size.0, size.1)
            }
            Self::InvalidBlockSize { size } => {
                write!(f, "block size must be positive, got ({}, {})", size.0, size.1)
            }
            Self::InvalidBlockStride { stride } => write!(
                f,
                "block stride must be positive, got ({}, {})",
                stride.0, stride.1
            ),
            Self::BlockCellMismatch { block, cell } => write!(
                f,
                "block size ({}, {}) is not a multiple of cell size ({}, {})",
                block.0, block.1, cell.0, cell.1
            ),
            Self::StrideCellMismatch { stride, cell } => write!(
                f,
                "block stride ({}, {}) is not a multiple of cell size ({}, {})",
                stride.0, stride.1, cell.0, cell.1
            ),
            Self::InvalidEpsilon { epsilon } => {
                write!(f, "epsilon must be non-negative, got {epsilon}")
            }
            Self::InvalidClipNorm { clip_norm } => {
                write!(f, "clip norm must be positive, got {clip_norm}")
            }
            Self::UnknownBinning(value) => write!(f, "unknown binning `{value}`"),
            Self::UnknownMagnitude(value) => write!(f, "unknown magnitude `{value}`"),
            Self::UnknownBlockNorm(value) => write!(f, "unknown block norm `{value}`"),
            Self::UnknownOption(value) => write!(f, "unknown option `{value}`"),
            Self::InvalidRepr { message } => write!(f, "malformed representation: {message}"),
            Self::RoiOutOfBounds { bounds, image } => write!(
                f,
                "window {:?} lies outside the {}x{} image",
                bounds, image.0, image.1
            ),
            Self::HeterogeneousBatch => {
                write!(f, "batched windows must share one width and height")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tensor(err) => Some(err),
            Self::Gradient(err) => Some(err),
            Self::Histogram(err) => Some(err),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A query window in image coordinates: `x`/`width` run along columns, `y`/`height` along
/// rows. Signed so that out-of-range requests are reported instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    #[inline]
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<(i64, i64, i64, i64)> for Bounds {
    fn from((x, y, width, height): (i64, i64, i64, i64)) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<[i64; 4]> for Bounds {
    fn from([x, y, width, height]: [i64; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Computed<F> {
    pub(crate) histogram: Tensor<F>,
    pub(crate) features: Tensor<F>,
    pub(crate) image_shape: (usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum State {
    F32(Computed<f32>),
    F64(Computed<f64>),
}

/// HOG descriptor over an integral orientation histogram.
///
/// Configure with [`builder`][Self::builder], feed images with [`compute`][Self::compute],
/// and read windows back with [`query`][Self::query]. All operations are synchronous and
/// deterministic; two computes over the same input produce bit-identical tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralHogDescriptor {
    config: DescriptorConfig,
    state: Option<State>,
}

impl Default for IntegralHogDescriptor {
    fn default() -> Self {
        Self::with_config(DescriptorConfig::default())
    }
}

impl IntegralHogDescriptor {
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    pub(crate) fn with_config(config: DescriptorConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Compute the integral histogram and the full-image feature tensor.
    ///
    /// The image is `(height, width)` or `(height, width, channels)` with 1, 3 or 4
    /// channels, of any supported element type; `f32` images are processed in `f32`,
    /// everything else in `f64`. A mask, when given, suppresses votes where truthy.
    pub fn compute<T: Element>(
        &mut self,
        image: &TensorView<'_, T>,
        mask: Option<&Mask<'_>>,
    ) -> Result<()> {
        tracing::debug!(shape = ?image.extents(), dtype = ?T::TYPE, "computing descriptor");
        let state = match T::TYPE {
            ElementType::F32 => {
                State::F32(engine::compute_image::<T, f32>(&self.config, image, mask)?)
            }
            _ => State::F64(engine::compute_image::<T, f64>(&self.config, image, mask)?),
        };
        self.state = Some(state);
        Ok(())
    }

    /// Like [`compute`][Self::compute], but with a precomputed `(d/dy, d/dx)` pair instead
    /// of an image. Both tensors must have the image's shape.
    pub fn compute_gradients<T: Element>(
        &mut self,
        dy: &TensorView<'_, T>,
        dx: &TensorView<'_, T>,
        mask: Option<&Mask<'_>>,
    ) -> Result<()> {
        tracing::debug!(shape = ?dy.extents(), dtype = ?T::TYPE, "computing descriptor from gradients");
        let state = match T::TYPE {
            ElementType::F32 => {
                State::F32(engine::compute_pair::<T, f32>(&self.config, dy, dx, mask)?)
            }
            _ => State::F64(engine::compute_pair::<T, f64>(&self.config, dy, dx, mask)?),
        };
        self.state = Some(state);
        Ok(())
    }

    /// Block descriptors of one window, `None` before the first successful compute.
    ///
    /// The result has shape `(blocks_y, blocks_x, cells_y, cells_x, n_bins)`; windows too
    /// small to hold a single block produce an empty tensor.
    pub fn query(&self, bounds: Bounds) -> Result<Option<AnyTensor>> {
        let Some(state) = &self.state else {
            return Ok(None);
        };

        Ok(Some(match state {
            State::F32(computed) => {
                AnyTensor::F32(engine::query_one(&self.config, computed, bounds)?)
            }
            State::F64(computed) => {
                AnyTensor::F64(engine::query_one(&self.config, computed, bounds)?)
            }
        }))
    }

    /// Block descriptors of a batch of equally sized windows, stacked along a leading axis.
    ///
    /// An empty batch (and any batch before the first compute) yields the empty rank-6
    /// tensor `(0, 0, 0, 0, 0, 0)`.
    pub fn query_batch(&self, bounds: &[Bounds]) -> Result<AnyTensor> {
        let Some(state) = &self.state else {
            return Ok(AnyTensor::F64(Tensor::zeros(&[0; 6])));
        };

        if bounds.is_empty() {
            return Ok(match state {
                State::F32(_) => AnyTensor::F32(Tensor::zeros(&[0; 6])),
                State::F64(_) => AnyTensor::F64(Tensor::zeros(&[0; 6])),
            });
        }

        let size = (bounds[0].width, bounds[0].height);
        if bounds.iter().any(|b| (b.width, b.height) != size) {
            return Err(Error::HeterogeneousBatch);
        }

        Ok(match state {
            State::F32(computed) => {
                AnyTensor::F32(engine::query_many(&self.config, computed, bounds)?)
            }
            State::F64(computed) => {
                AnyTensor::F64(engine::query_many(&self.config, computed, bounds)?)
            }
        })
    }

    /// Full-image feature tensor, `None` before the first successful compute.
    pub fn features(&self) -> Option<AnyTensorRef<'_>> {
        self.state.as_ref().map(|state| match state {
            State::F32(computed) => AnyTensorRef::F32(&computed.features),
            State::F64(computed) => AnyTensorRef::F64(&computed.features),
        })
    }

    /// Integral histogram of shape `(height + 1, width + 1, n_bins)`.
    pub fn histogram(&self) -> Option<AnyTensorRef<'_>> {
        self.state.as_ref().map(|state| match state {
            State::F32(computed) => AnyTensorRef::F32(&computed.histogram),
            State::F64(computed) => AnyTensorRef::F64(&computed.histogram),
        })
    }

    /// `(height, width)` of the most recently computed image.
    pub fn image_shape(&self) -> Option<(usize, usize)> {
        self.state.as_ref().map(|state| match state {
            State::F32(computed) => computed.image_shape,
            State::F64(computed) => computed.image_shape,
        })
    }

    /// Whether a compute has succeeded since construction.
    #[inline]
    pub fn is_computed(&self) -> bool {
        self.state.is_some()
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.config.n_bins
    }

    /// Cell size as `(width, height)`.
    #[inline]
    pub fn cell_size(&self) -> (usize, usize) {
        self.config.cell_size
    }

    /// Block size in pixels as `(width, height)`.
    #[inline]
    pub fn block_size(&self) -> (usize, usize) {
        self.config.block_size
    }

    /// Block stride in pixels as `(width, height)`.
    #[inline]
    pub fn block_stride(&self) -> (usize, usize) {
        self.config.block_stride
    }

    #[inline]
    pub fn binning(&self) -> Binning {
        self.config.binning
    }

    #[inline]
    pub fn magnitude(&self) -> Magnitude {
        self.config.magnitude
    }

    #[inline]
    pub fn block_norm(&self) -> BlockNorm {
        self.config.block_norm
    }

    /// Configured clipping threshold; hysteresis norms fall back to 0.2 when unset.
    #[inline]
    pub fn clip_norm(&self) -> Option<f64> {
        self.config.clip_norm
    }

    #[inline]
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    /// Encode configuration and computed state into the versioned binary layout.
    pub fn serialize(&self) -> Vec<u8> {
        serialize::encode(self)
    }

    /// Decode a descriptor previously written by [`serialize`][Self::serialize].
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        serialize::decode(bytes)
    }

    /// Rebuild an un-computed descriptor from its [`Display`][std::fmt::Display] form.
    pub fn parse_repr(text: &str) -> Result<Self> {
        config::parse_repr(text)
    }
}

impl std::fmt::Display for IntegralHogDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        config::format_repr(&self.config, f)
    }
}

impl std::str::FromStr for IntegralHogDescriptor {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        config::parse_repr(text)
    }
}
