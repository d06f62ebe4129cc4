//! ihog computes histogram-of-oriented-gradients descriptors over an integral histogram. It's
//! internally organized into a few small crates; this crate acts as a blanket and provides a
//! simple interface made from those crates.
//!
//! Per-pixel orientation votes are accumulated once into a prefix-sum volume, after which the
//! descriptor of *any* cell-aligned window comes out of a handful of rectangle sums, with no
//! per-window rescan of the image.
//!
//! # Computing a descriptor
//!
//! Build an [`IntegralHogDescriptor`], feed it an image, and read the feature tensor back:
//!
//! ```
//! use ihog::{IntegralHogDescriptor, TensorView};
//!
//! # fn main() -> ihog::Result<()> {
//! let pixels = vec![0.0f32; 128 * 64];
//! let image = TensorView::from_slice(&pixels, &[128, 64])?;
//!
//! let mut descriptor = IntegralHogDescriptor::builder().n_bins(9).build()?;
//! descriptor.compute(&image, None)?;
//!
//! let features = descriptor.features().expect("computed above");
//! assert_eq!(features.extents(), &[15, 7, 2, 2, 9]);
//! # Ok(())
//! # }
//! ```
//!
//! Images may be strided views of any supported scalar type; integer and `bool` images are
//! promoted to `f64`, while `f32` images are processed in `f32` end to end. Windows are
//! fetched with [`IntegralHogDescriptor::query`] and
//! [`IntegralHogDescriptor::query_batch`], votes can be suppressed with a [`Mask`], and a
//! descriptor round-trips through [`IntegralHogDescriptor::serialize`] bit-exactly.

pub use ihog_descriptor::{
    Binning, BlockNorm, Bounds, CodecError, DenseMask, DescriptorBuilder, Error, ErrorKind,
    Gradients, IntegralHogDescriptor, Magnitude, Mask, Result,
};
pub use ihog_tensor::{
    AnyTensor, AnyTensorRef, Element, ElementType, Real, Tensor, TensorView,
};
