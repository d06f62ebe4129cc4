//! Gradient estimation for the descriptor pipeline.
//!
//! Images enter as strided views of any supported element type, are promoted into a contiguous
//! `(height, width, channels)` float tensor, and leave as a per-pixel [`Gradients`] pair. For
//! multi-channel images only the channel with the strongest gradient votes at each pixel.
use ihog_tensor::{Element, Real, Tensor, TensorView};

mod mask;
pub use mask::{DenseMask, Mask};

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Tensor(ihog_tensor::Error),
    InvalidRank { rank: usize },
    InvalidChannelCount { channels: usize },
    PairShapeMismatch,
    MaskRank { rank: usize },
    MaskShapeMismatch { expected: (usize, usize) },
}

impl From<ihog_tensor::Error> for Error {
    fn from(err: ihog_tensor::Error) -> Self {
        Self::Tensor(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tensor(err) => write!(f, "{}", err),
            Self::InvalidRank { rank } => {
                write!(f, "image rank must be 2 or 3, got {rank}")
            }
            Self::InvalidChannelCount { channels } => {
                write!(f, "channel count must be 1, 3 or 4, got {channels}")
            }
            Self::PairShapeMismatch => {
                write!(f, "gradient pair tensors have mismatching shapes")
            }
            Self::MaskRank { rank } => {
                write!(f, "mask rank must be 2, got {rank}")
            }
            Self::MaskShapeMismatch { expected } => {
                write!(
                    f,
                    "mask extents must match the image's spatial extents {}x{}",
                    expected.0, expected.1
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tensor(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-pixel gradients after channel selection, one `(height, width)` tensor per direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients<F> {
    pub dy: Tensor<F>,
    pub dx: Tensor<F>,
}

impl<F: Real> Gradients<F> {
    #[inline]
    pub fn height(&self) -> usize {
        self.dy.extents()[0]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.dy.extents()[1]
    }
}

/// Promote an image view into a contiguous `(height, width, channels)` float tensor.
///
/// Rank-2 images become single-channel; rank-3 images must carry 1, 3 or 4 channels.
pub fn promote_image<T: Element, F: Real>(image: &TensorView<'_, T>) -> Result<Tensor<F>> {
    match image.rank() {
        2 => {
            let extents = [image.extents()[0], image.extents()[1], 1];
            Ok(image.map(F::from_element).into_shape(&extents)?)
        }
        3 => {
            let channels = image.extents()[2];
            if !matches!(channels, 1 | 3 | 4) {
                return Err(Error::InvalidChannelCount { channels });
            }
            Ok(image.map(F::from_element))
        }
        rank => Err(Error::InvalidRank { rank }),
    }
}

/// Central-difference derivative along one axis of a sample line.
///
/// Interior samples use `(next - prev) / 2`, the two borders fall back to first differences,
/// and a single-sample axis has no slope at all.
#[inline]
fn central<F: Real>(at: impl Fn(usize) -> F, i: usize, len: usize) -> F {
    if len < 2 {
        F::zero()
    } else if i == 0 {
        at(1) - at(0)
    } else if i == len - 1 {
        at(len - 1) - at(len - 2)
    } else {
        (at(i + 1) - at(i - 1)) / F::from_f64(2.0)
    }
}

/// Estimate gradients of a promoted `(height, width, channels)` image.
///
/// At each pixel the channel with the largest `gx^2 + gy^2` wins; ties keep the lowest
/// channel index.
pub fn estimate<F: Real>(image: &Tensor<F>) -> Gradients<F> {
    let [height, width, channels] = [
        image.extents()[0],
        image.extents()[1],
        image.extents()[2],
    ];
    tracing::trace!(height, width, channels, "estimating image gradients");

    let buf = image.buf();
    let mut dy = Tensor::zeros(&[height, width]);
    let mut dx = Tensor::zeros(&[height, width]);
    let out_dy = dy.buf_mut();
    let out_dx = dx.buf_mut();

    for y in 0..height {
        for x in 0..width {
            let mut best = (F::zero(), F::zero());
            let mut best_norm = F::neg_infinity();
            for c in 0..channels {
                let gy = central(|yy| buf[(yy * width + x) * channels + c], y, height);
                let gx = central(|xx| buf[(y * width + xx) * channels + c], x, width);
                let norm = gx * gx + gy * gy;
                if norm > best_norm {
                    best_norm = norm;
                    best = (gy, gx);
                }
            }
            out_dy[y * width + x] = best.0;
            out_dx[y * width + x] = best.1;
        }
    }

    Gradients { dy, dx }
}

/// Build [`Gradients`] from a precomputed derivative pair.
///
/// Both tensors must be promoted to the same `(height, width, channels)` extents; channel
/// selection is identical to the estimated path.
pub fn from_pair<F: Real>(dy: &Tensor<F>, dx: &Tensor<F>) -> Result<Gradients<F>> {
    if dy.extents() != dx.extents() {
        return Err(Error::PairShapeMismatch);
    }

    let [height, width, channels] = [dy.extents()[0], dy.extents()[1], dy.extents()[2]];
    let src_dy = dy.buf();
    let src_dx = dx.buf();
    let mut out_dy = Tensor::zeros(&[height, width]);
    let mut out_dx = Tensor::zeros(&[height, width]);
    let buf_dy = out_dy.buf_mut();
    let buf_dx = out_dx.buf_mut();

    for y in 0..height {
        for x in 0..width {
            let base = (y * width + x) * channels;
            let mut best = (src_dy[base], src_dx[base]);
            let mut best_norm = best.0 * best.0 + best.1 * best.1;
            for c in 1..channels {
                let gy = src_dy[base + c];
                let gx = src_dx[base + c];
                let norm = gx * gx + gy * gy;
                if norm > best_norm {
                    best_norm = norm;
                    best = (gy, gx);
                }
            }
            buf_dy[y * width + x] = best.0;
            buf_dx[y * width + x] = best.1;
        }
    }

    Ok(Gradients {
        dy: out_dy,
        dx: out_dx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promoted(data: &[f64], extents: &[usize]) -> Tensor<f64> {
        let view = TensorView::from_slice(data, extents).unwrap();
        promote_image(&view).unwrap()
    }

    #[test]
    fn central_differences_and_borders() {
        // One row: 0 1 4 9 16
        let image = promoted(&[0.0, 1.0, 4.0, 9.0, 16.0], &[1, 5]);
        let grads = estimate(&image);
        assert_eq!(grads.dy.buf(), &[0.0; 5]);
        assert_eq!(grads.dx.buf(), &[1.0, 2.0, 4.0, 6.0, 7.0]);
    }

    #[test]
    fn vertical_axis_matches_horizontal() {
        let image = promoted(&[0.0, 1.0, 4.0, 9.0, 16.0], &[5, 1]);
        let grads = estimate(&image);
        assert_eq!(grads.dx.buf(), &[0.0; 5]);
        assert_eq!(grads.dy.buf(), &[1.0, 2.0, 4.0, 6.0, 7.0]);
    }

    #[test]
    fn strongest_channel_wins() {
        // Two pixels, three channels; channel 2 ramps steeply along x.
        let data = [
            0.0, 0.0, 0.0, //
            0.0, 1.0, 10.0,
        ];
        let image = promoted(&data, &[1, 2, 3]);
        let grads = estimate(&image);
        assert_eq!(grads.dx.buf(), &[10.0, 10.0]);
        assert_eq!(grads.dy.buf(), &[0.0, 0.0]);
    }

    #[test]
    fn ties_keep_the_lowest_channel() {
        let dy = Tensor::from_vec(vec![2.0f64, -2.0, 1.0], &[1, 1, 3]).unwrap();
        let dx = Tensor::from_vec(vec![0.0f64, 0.0, 0.0], &[1, 1, 3]).unwrap();
        let grads = from_pair(&dy, &dx).unwrap();
        assert_eq!(grads.dy.buf(), &[2.0]);
    }

    #[test]
    fn pair_shapes_must_match() {
        let dy = Tensor::<f64>::zeros(&[2, 2, 1]);
        let dx = Tensor::<f64>::zeros(&[2, 3, 1]);
        assert!(matches!(
            from_pair(&dy, &dx),
            Err(Error::PairShapeMismatch)
        ));
    }

    #[test]
    fn rejects_bad_ranks_and_channel_counts() {
        let data = [0.0f64; 8];
        let rank1 = TensorView::from_slice(&data, &[8]).unwrap();
        assert!(matches!(
            promote_image::<_, f64>(&rank1),
            Err(Error::InvalidRank { rank: 1 })
        ));

        let rank4 = TensorView::from_slice(&data, &[2, 2, 2, 1]).unwrap();
        assert!(matches!(
            promote_image::<_, f64>(&rank4),
            Err(Error::InvalidRank { rank: 4 })
        ));

        let two_channels = TensorView::from_slice(&data, &[2, 2, 2]).unwrap();
        assert!(matches!(
            promote_image::<_, f64>(&two_channels),
            Err(Error::InvalidChannelCount { channels: 2 })
        ));
    }

    #[test]
    fn integer_images_promote_to_f64() {
        let data = [0u8, 255, 0, 255];
        let view = TensorView::from_slice(&data, &[2, 2]).unwrap();
        let image: Tensor<f64> = promote_image(&view).unwrap();
        assert_eq!(image.extents(), &[2, 2, 1]);
        assert_eq!(image.buf(), &[0.0, 255.0, 0.0, 255.0]);
    }

    #[test]
    fn single_pixel_has_no_slope() {
        let image = promoted(&[5.0], &[1, 1]);
        let grads = estimate(&image);
        assert_eq!(grads.dy.buf(), &[0.0]);
        assert_eq!(grads.dx.buf(), &[0.0]);
    }
}
