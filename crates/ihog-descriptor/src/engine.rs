use ihog_gradient::{Gradients, Mask};
use ihog_tensor::{Element, Real, Tensor, TensorView};

use crate::config::DescriptorConfig;
use crate::normalize::normalize_block;
use crate::{Bounds, Computed, Error, Result};

/// Number of block positions along one axis.
#[inline]
fn block_count(dim: usize, block: usize, stride: usize) -> usize {
    if dim < block {
        0
    } else {
        (dim - block) / stride + 1
    }
}

pub(crate) fn compute_image<T: Element, F: Real>(
    config: &DescriptorConfig,
    image: &TensorView<'_, T>,
    mask: Option<&Mask<'_>>,
) -> Result<Computed<F>> {
    let image: Tensor<F> = ihog_gradient::promote_image(image)?;
    let gradients = ihog_gradient::estimate(&image);
    finish(config, gradients, mask)
}

pub(crate) fn compute_pair<T: Element, F: Real>(
    config: &DescriptorConfig,
    dy: &TensorView<'_, T>,
    dx: &TensorView<'_, T>,
    mask: Option<&Mask<'_>>,
) -> Result<Computed<F>> {
    let dy: Tensor<F> = ihog_gradient::promote_image(dy)?;
    let dx: Tensor<F> = ihog_gradient::promote_image(dx)?;
    let gradients = ihog_gradient::from_pair(&dy, &dx)?;
    finish(config, gradients, mask)
}

fn finish<F: Real>(
    config: &DescriptorConfig,
    gradients: Gradients<F>,
    mask: Option<&Mask<'_>>,
) -> Result<Computed<F>> {
    let height = gradients.height();
    let width = gradients.width();

    if let Some(mask) = mask {
        mask.validate(height, width)?;
    }

    let n_bins = config.n_bins;
    let histogram = match mask {
        None => ihog_hist::build(
            &gradients.dy,
            &gradients.dx,
            n_bins,
            config.binning,
            config.magnitude,
            |_, _| false,
        ),
        Some(Mask::Dense(dense)) => ihog_hist::build(
            &gradients.dy,
            &gradients.dx,
            n_bins,
            config.binning,
            config.magnitude,
            |y, x| dense.is_set(y, x),
        ),
        Some(Mask::Predicate(predicate)) => ihog_hist::build(
            &gradients.dy,
            &gradients.dx,
            n_bins,
            config.binning,
            config.magnitude,
            |y, x| predicate(y, x),
        ),
    };

    let features = extract_blocks(config, &histogram, 0, 0, height, width)?;
    Ok(Computed {
        histogram,
        features,
        image_shape: (height, width),
    })
}

/// Tile normalized block descriptors over a window of the integral histogram.
///
/// Blocks start at the window origin and advance by the configured stride; each block is the
/// concatenation of its cell histograms, normalized as one vector.
fn extract_blocks<F: Real>(
    config: &DescriptorConfig,
    histogram: &Tensor<F>,
    y0: usize,
    x0: usize,
    window_h: usize,
    window_w: usize,
) -> Result<Tensor<F>> {
    let (cell_w, cell_h) = config.cell_size;
    let (block_w, block_h) = config.block_size;
    let (stride_w, stride_h) = config.block_stride;
    let (cells_x, cells_y) = config.cells_per_block();
    let n_bins = config.n_bins;

    let blocks_y = block_count(window_h, block_h, stride_h);
    let blocks_x = block_count(window_w, block_w, stride_w);

    let mut out = Tensor::zeros(&[blocks_y, blocks_x, cells_y, cells_x, n_bins]);
    let block_len = cells_y * cells_x * n_bins;
    let epsilon = F::from_f64(config.epsilon);
    let clip = F::from_f64(config.effective_clip_norm());
    let buf = out.buf_mut();

    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let base_y = y0 + by * stride_h;
            let base_x = x0 + bx * stride_w;
            let block = &mut buf[(by * blocks_x + bx) * block_len..][..block_len];
            for cy in 0..cells_y {
                for cx in 0..cells_x {
                    let row = base_y + cy * cell_h;
                    let col = base_x + cx * cell_w;
                    ihog_hist::rect_sum(
                        histogram,
                        row..row + cell_h,
                        col..col + cell_w,
                        &mut block[(cy * cells_x + cx) * n_bins..][..n_bins],
                    )?;
                }
            }
            normalize_block(block, config.block_norm, epsilon, clip);
        }
    }

    Ok(out)
}

/// Validate a window against the image and return `(y0, x0, height, width)`.
fn checked_window(bounds: Bounds, image: (usize, usize)) -> Result<(usize, usize, usize, usize)> {
    let oob = || Error::RoiOutOfBounds { bounds, image };
    let (height, width) = (image.0 as i64, image.1 as i64);

    if bounds.x < 0 || bounds.y < 0 || bounds.width < 0 || bounds.height < 0 {
        return Err(oob());
    }
    let right = bounds.x.checked_add(bounds.width).ok_or_else(oob)?;
    let bottom = bounds.y.checked_add(bounds.height).ok_or_else(oob)?;
    if right > width || bottom > height {
        return Err(oob());
    }

    Ok((
        bounds.y as usize,
        bounds.x as usize,
        bounds.height as usize,
        bounds.width as usize,
    ))
}

pub(crate) fn query_one<F: Real>(
    config: &DescriptorConfig,
    computed: &Computed<F>,
    bounds: Bounds,
) -> Result<Tensor<F>> {
    let (y0, x0, window_h, window_w) = checked_window(bounds, computed.image_shape)?;
    extract_blocks(config, &computed.histogram, y0, x0, window_h, window_w)
}

/// Stack the block tensors of equally sized windows along a leading batch axis.
pub(crate) fn query_many<F: Real>(
    config: &DescriptorConfig,
    computed: &Computed<F>,
    bounds: &[Bounds],
) -> Result<Tensor<F>> {
    let first = query_one(config, computed, bounds[0])?;
    let mut extents = [bounds.len(), 0, 0, 0, 0, 0];
    extents[1..].copy_from_slice(first.extents());

    let item_len = first.len();
    let mut out = Tensor::zeros(&extents);
    out.buf_mut()[..item_len].copy_from_slice(first.buf());
    for (i, &window) in bounds.iter().enumerate().skip(1) {
        let item = query_one(config, computed, window)?;
        out.buf_mut()[i * item_len..][..item_len].copy_from_slice(item.buf());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_counts() {
        assert_eq!(block_count(128, 16, 8), 15);
        assert_eq!(block_count(64, 16, 8), 7);
        assert_eq!(block_count(16, 16, 8), 1);
        assert_eq!(block_count(15, 16, 8), 0);
        assert_eq!(block_count(0, 16, 8), 0);
    }

    #[test]
    fn window_validation() {
        let image = (128, 64);
        assert!(checked_window(Bounds::new(0, 0, 64, 128), image).is_ok());
        assert!(checked_window(Bounds::new(32, 64, 32, 32), image).is_ok());
        assert!(checked_window(Bounds::new(0, 0, 0, 0), image).is_ok());
        assert!(checked_window(Bounds::new(-1, 0, 8, 8), image).is_err());
        assert!(checked_window(Bounds::new(0, -1, 8, 8), image).is_err());
        assert!(checked_window(Bounds::new(0, 0, -1, 8), image).is_err());
        assert!(checked_window(Bounds::new(0, 0, 8, -1), image).is_err());
        assert!(checked_window(Bounds::new(0, 0, 65, 2), image).is_err());
        assert!(checked_window(Bounds::new(0, 0, 2, 129), image).is_err());
        assert!(checked_window(Bounds::new(i64::MAX, 0, 1, 1), image).is_err());
    }
}
