use std::ops::Range;

use ihog_tensor::{Real, Tensor};

use crate::{check_bounds, Binning, Magnitude, Result};

/// Build the integral histogram of a gradient field.
///
/// `dy` and `dx` are `(height, width)` tensors; the result has shape
/// `(height + 1, width + 1, n_bins)` with the prefix sums already applied. `masked` is
/// consulted once per pixel and suppresses the vote where it returns `true`.
pub fn build<F: Real, M: Fn(usize, usize) -> bool>(
    dy: &Tensor<F>,
    dx: &Tensor<F>,
    n_bins: usize,
    binning: Binning,
    magnitude: Magnitude,
    masked: M,
) -> Tensor<F> {
    let height = dy.extents()[0];
    let width = dy.extents()[1];
    tracing::trace!(height, width, n_bins, "accumulating orientation votes");

    let mut hist = Tensor::zeros(&[height + 1, width + 1, n_bins]);

    // Hoist the enum dispatch so the pixel loop stays monomorphic.
    match (binning, magnitude) {
        (Binning::Unsigned, Magnitude::Identity) => {
            deposit::<F, _, _, false>(&mut hist, dy, dx, masked, |m| m)
        }
        (Binning::Unsigned, Magnitude::Square) => {
            deposit::<F, _, _, false>(&mut hist, dy, dx, masked, |m| m * m)
        }
        (Binning::Unsigned, Magnitude::Sqrt) => {
            deposit::<F, _, _, false>(&mut hist, dy, dx, masked, |m| m.sqrt())
        }
        (Binning::Signed, Magnitude::Identity) => {
            deposit::<F, _, _, true>(&mut hist, dy, dx, masked, |m| m)
        }
        (Binning::Signed, Magnitude::Square) => {
            deposit::<F, _, _, true>(&mut hist, dy, dx, masked, |m| m * m)
        }
        (Binning::Signed, Magnitude::Sqrt) => {
            deposit::<F, _, _, true>(&mut hist, dy, dx, masked, |m| m.sqrt())
        }
    }

    integrate(&mut hist);
    hist
}

/// Splat one linear-interpolated vote per unmasked pixel.
///
/// The orientation is `atan2(gx, gy)` folded into the binning's angular domain, and the vote
/// is split between the two nearest bin centers. Over the full circle (`WRAP`) the bins are
/// genuinely circular; over the half circle the two boundary bins absorb their outer halves.
fn deposit<F: Real, M: Fn(usize, usize) -> bool, W: Fn(F) -> F, const WRAP: bool>(
    hist: &mut Tensor<F>,
    dy: &Tensor<F>,
    dx: &Tensor<F>,
    masked: M,
    weight: W,
) {
    let height = dy.extents()[0];
    let width = dy.extents()[1];
    let n_bins = hist.extents()[2];
    let row_len = (width + 1) * n_bins;

    let extent = if WRAP { F::PI() + F::PI() } else { F::PI() };
    let delta = extent / F::from_f64(n_bins as f64);
    let half = F::from_f64(0.5);

    let buf = hist.buf_mut();
    let src_dy = dy.buf();
    let src_dx = dx.buf();

    for y in 0..height {
        for x in 0..width {
            if masked(y, x) {
                continue;
            }

            let gy = src_dy[y * width + x];
            let gx = src_dx[y * width + x];
            let norm = gx * gx + gy * gy;
            if norm == F::zero() {
                continue;
            }
            let vote = weight(norm.sqrt());

            let mut theta = gx.atan2(gy);
            if theta < F::zero() {
                theta += extent;
            }
            if theta >= extent {
                theta -= extent;
            }

            let position = theta / delta - half;
            let low = position.floor();
            let alpha = position - low;
            // theta < extent keeps this in [-1, n_bins - 1].
            let low = low.to_isize().expect("bin position is finite");

            let (k0, k1) = if WRAP {
                let k0 = low.rem_euclid(n_bins as isize) as usize;
                (k0, (k0 + 1) % n_bins)
            } else {
                (
                    low.max(0) as usize,
                    ((low + 1) as usize).min(n_bins - 1),
                )
            };

            let bins = &mut buf[(y + 1) * row_len + (x + 1) * n_bins..][..n_bins];
            bins[k0] += (F::one() - alpha) * vote;
            bins[k1] += alpha * vote;
        }
    }
}

/// Turn a freshly deposited vote volume into prefix sums, rows first, then columns.
pub fn integrate<F: Real>(hist: &mut Tensor<F>) {
    let rows = hist.extents()[0];
    let cols = hist.extents()[1];
    let n_bins = hist.extents()[2];
    let row_len = cols * n_bins;
    let buf = hist.buf_mut();

    for y in 1..rows {
        let row = &mut buf[y * row_len..][..row_len];
        for x in 1..cols {
            let (prev, cur) = row.split_at_mut(x * n_bins);
            let prev = &prev[(x - 1) * n_bins..];
            for (c, p) in cur[..n_bins].iter_mut().zip(prev) {
                *c += *p;
            }
        }
    }

    for y in 1..rows {
        let (prev, cur) = buf.split_at_mut(y * row_len);
        let prev = &prev[(y - 1) * row_len..];
        for (c, p) in cur[..row_len].iter_mut().zip(prev) {
            *c += *p;
        }
    }
}

/// Per-bin sum of votes over `rows x cols`, written into `out`.
///
/// Uses the four-corner identity of the integral volume; the rectangle must be non-empty and
/// lie inside the voted area.
pub fn rect_sum<F: Real>(
    hist: &Tensor<F>,
    rows: Range<usize>,
    cols: Range<usize>,
    out: &mut [F],
) -> Result<()> {
    check_bounds(hist, &rows, &cols)?;

    let n_bins = hist.extents()[2];
    assert_eq!(out.len(), n_bins);

    let row_len = hist.extents()[1] * n_bins;
    let buf = hist.buf();
    let corner = |y: usize, x: usize| &buf[y * row_len + x * n_bins..][..n_bins];

    let tl = corner(rows.start, cols.start);
    let tr = corner(rows.start, cols.end);
    let bl = corner(rows.end, cols.start);
    let br = corner(rows.end, cols.end);
    for k in 0..n_bins {
        out[k] = br[k] - tr[k] - bl[k] + tl[k];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn field(dy: &[f64], dx: &[f64], height: usize, width: usize) -> (Tensor<f64>, Tensor<f64>) {
        (
            Tensor::from_vec(dy.to_vec(), &[height, width]).unwrap(),
            Tensor::from_vec(dx.to_vec(), &[height, width]).unwrap(),
        )
    }

    fn pixel_bins(hist: &Tensor<f64>, y: usize, x: usize) -> Vec<f64> {
        let n_bins = hist.extents()[2];
        let mut out = vec![0.0; n_bins];
        rect_sum(hist, y..y + 1, x..x + 1, &mut out).unwrap();
        out
    }

    #[test]
    fn horizontal_gradient_votes_in_the_middle_bin() {
        // Gradient along x only: orientation is orthogonal to the row axis.
        let (dy, dx) = field(&[0.0], &[-0.5], 1, 1);
        let hist = build(&dy, &dx, 9, Binning::Unsigned, Magnitude::Identity, |_, _| false);
        let bins = pixel_bins(&hist, 0, 0);
        assert_eq!(bins[4], 0.5);
        assert_eq!(bins.iter().sum::<f64>(), 0.5);
    }

    #[test]
    fn vertical_gradient_votes_in_the_first_bin() {
        // A pure row-axis gradient folds onto orientation zero, which the half-open domain
        // assigns entirely to bin 0.
        let (dy, dx) = field(&[-0.5], &[0.0], 1, 1);
        let hist = build(&dy, &dx, 9, Binning::Unsigned, Magnitude::Identity, |_, _| false);
        let bins = pixel_bins(&hist, 0, 0);
        assert_eq!(bins[0], 0.5);
        assert_eq!(bins.iter().skip(1).sum::<f64>(), 0.0);
    }

    #[test]
    fn unsigned_boundaries_clamp() {
        // Orientation just above zero splits between the out-of-range virtual bin -1 and
        // bin 0; the whole vote must stay in bin 0.
        let theta = 0.05f64;
        let (dy, dx) = field(&[theta.cos()], &[theta.sin()], 1, 1);
        let hist = build(&dy, &dx, 9, Binning::Unsigned, Magnitude::Identity, |_, _| false);
        let bins = pixel_bins(&hist, 0, 0);
        assert!((bins[0] - 1.0).abs() < 1e-12);
        assert_eq!(bins[8], 0.0);
    }

    #[test]
    fn signed_boundaries_wrap() {
        // Same near-zero orientation over the full circle shares the vote with the last bin.
        let theta = 0.05f64;
        let (dy, dx) = field(&[theta.cos()], &[theta.sin()], 1, 1);
        let hist = build(&dy, &dx, 9, Binning::Signed, Magnitude::Identity, |_, _| false);
        let bins = pixel_bins(&hist, 0, 0);
        assert!(bins[0] > 0.0);
        assert!(bins[8] > 0.0);
        assert!((bins[0] + bins[8] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn interpolation_splits_between_adjacent_bins() {
        // Orientation exactly between the centers of bins 4 and 5.
        let delta = std::f64::consts::PI / 9.0;
        let theta = 5.0 * delta;
        let (dy, dx) = field(&[theta.cos()], &[theta.sin()], 1, 1);
        let hist = build(&dy, &dx, 9, Binning::Unsigned, Magnitude::Identity, |_, _| false);
        let bins = pixel_bins(&hist, 0, 0);
        assert!((bins[4] - 0.5).abs() < 1e-12);
        assert!((bins[5] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn magnitude_weighting() {
        let (dy, dx) = field(&[0.0], &[-4.0], 1, 1);
        for (magnitude, expected) in [
            (Magnitude::Identity, 4.0),
            (Magnitude::Square, 16.0),
            (Magnitude::Sqrt, 2.0),
        ] {
            let hist = build(&dy, &dx, 9, Binning::Unsigned, magnitude, |_, _| false);
            assert_eq!(pixel_bins(&hist, 0, 0)[4], expected);
        }
    }

    #[test]
    fn masked_pixels_do_not_vote() {
        let (dy, dx) = field(&[0.0, 0.0], &[-1.0, -1.0], 1, 2);
        let hist = build(&dy, &dx, 9, Binning::Unsigned, Magnitude::Identity, |_, x| {
            x == 0
        });
        assert_eq!(pixel_bins(&hist, 0, 0).iter().sum::<f64>(), 0.0);
        assert_eq!(pixel_bins(&hist, 0, 1).iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn prefix_sums_match_brute_force() {
        let dy = [0.3, -0.7, 0.0, 1.2, -0.1, 0.4];
        let dx = [-1.0, 0.2, 0.8, -0.5, 0.9, 0.0];
        let (dy, dx) = field(&dy, &dx, 2, 3);
        let hist = build(&dy, &dx, 5, Binning::Signed, Magnitude::Identity, |_, _| false);

        // Sum of the per-pixel rectangles must equal the full rectangle.
        let mut total = vec![0.0; 5];
        rect_sum(&hist, 0..2, 0..3, &mut total).unwrap();
        let mut acc = vec![0.0; 5];
        let mut cell = vec![0.0; 5];
        for y in 0..2 {
            for x in 0..3 {
                rect_sum(&hist, y..y + 1, x..x + 1, &mut cell).unwrap();
                for k in 0..5 {
                    acc[k] += cell[k];
                }
            }
        }
        for k in 0..5 {
            assert!((total[k] - acc[k]).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_rectangles_are_rejected() {
        let (dy, dx) = field(&[0.0], &[1.0], 1, 1);
        let hist = build(&dy, &dx, 3, Binning::Unsigned, Magnitude::Identity, |_, _| false);
        let mut out = vec![0.0; 3];
        assert!(matches!(
            rect_sum(&hist, 0..0, 0..1, &mut out),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(matches!(
            rect_sum(&hist, 0..2, 0..1, &mut out),
            Err(Error::InvalidBounds { .. })
        ));
    }
}
