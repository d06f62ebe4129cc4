use ihog_tensor::Real;

use crate::BlockNorm;

/// Normalize one block descriptor in place.
///
/// All norms guard the denominator with `epsilon`; a block with no votes and `epsilon == 0`
/// is left at exact zeros instead of dividing by zero. `clip` only matters for the
/// hysteresis variants.
pub(crate) fn normalize_block<F: Real>(block: &mut [F], norm: BlockNorm, epsilon: F, clip: F) {
    match norm {
        BlockNorm::L1 => l1(block, epsilon),
        BlockNorm::L1Sqrt => {
            l1(block, epsilon);
            for value in block.iter_mut() {
                // Four-corner sums may cancel a hair below zero; keep the root real.
                *value = value.max(F::zero()).sqrt();
            }
        }
        BlockNorm::L1Hys => {
            l1(block, epsilon);
            clamp(block, clip);
            l1(block, epsilon);
        }
        BlockNorm::L2 => l2(block, epsilon),
        BlockNorm::L2Hys => {
            l2(block, epsilon);
            clamp(block, clip);
            l2(block, epsilon);
        }
    }
}

fn l1<F: Real>(block: &mut [F], epsilon: F) {
    let mut sum = F::zero();
    for &value in block.iter() {
        sum += value.abs();
    }
    let denom = sum + epsilon;
    if denom > F::zero() {
        for value in block.iter_mut() {
            *value /= denom;
        }
    }
}

fn l2<F: Real>(block: &mut [F], epsilon: F) {
    let mut sum = F::zero();
    for &value in block.iter() {
        sum += value * value;
    }
    let denom = (sum + epsilon * epsilon).sqrt();
    if denom > F::zero() {
        for value in block.iter_mut() {
            *value /= denom;
        }
    }
}

fn clamp<F: Real>(block: &mut [F], limit: F) {
    for value in block.iter_mut() {
        if *value > limit {
            *value = limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm1(v: &[f64]) -> f64 {
        v.iter().map(|x| x.abs()).sum()
    }

    fn norm2(v: &[f64]) -> f64 {
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    #[test]
    fn l1_sums_to_one_without_epsilon() {
        let mut v = [1.0, 2.0, 3.0, 4.0];
        normalize_block(&mut v, BlockNorm::L1, 0.0, 0.2);
        assert!((norm1(&v) - 1.0).abs() < 1e-12);
        assert_eq!(v[3], 0.4);
    }

    #[test]
    fn l2_has_unit_length_without_epsilon() {
        let mut v = [3.0, 4.0];
        normalize_block(&mut v, BlockNorm::L2, 0.0, 0.2);
        assert!((norm2(&v) - 1.0).abs() < 1e-12);
        assert_eq!(v, [0.6, 0.8]);
    }

    #[test]
    fn l1_sqrt_takes_the_root_of_the_normalized_vector() {
        let mut v = [1.0, 3.0];
        normalize_block(&mut v, BlockNorm::L1Sqrt, 0.0, 0.2);
        assert!((v[0] - 0.25f64.sqrt()).abs() < 1e-12);
        assert!((v[1] - 0.75f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn hysteresis_clips_and_renormalizes() {
        // One dominant component gets capped, then the vector is normalized again.
        let mut v = [10.0, 1.0, 1.0, 1.0];
        normalize_block(&mut v, BlockNorm::L2Hys, 0.0, 0.2);
        assert!((norm2(&v) - 1.0).abs() < 1e-12);
        // The clipped component keeps the 0.2 : 1/sqrt(103) ratio against the others.
        assert!((v[0] / v[1] - 0.2 * 103f64.sqrt()).abs() < 1e-12);
        assert!(v[0] < 10.0 / 103f64.sqrt());
        assert_eq!(v[1], v[2]);
        assert_eq!(v[2], v[3]);
    }

    #[test]
    fn uniform_vectors_stay_uniform_under_l2_hys() {
        let mut v = [1.0; 9];
        normalize_block(&mut v, BlockNorm::L2Hys, 0.0, 0.2);
        for &x in &v {
            assert_eq!(x, v[0]);
        }
        assert!((norm2(&v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_blocks_stay_finite_zero() {
        for norm in [
            BlockNorm::L1,
            BlockNorm::L1Sqrt,
            BlockNorm::L1Hys,
            BlockNorm::L2,
            BlockNorm::L2Hys,
        ] {
            let mut v = [0.0f64; 8];
            normalize_block(&mut v, norm, 0.0, 0.2);
            assert_eq!(v, [0.0; 8], "{norm}");
        }
    }

    #[test]
    fn epsilon_damps_the_result() {
        let mut damped = [1.0, 1.0];
        normalize_block(&mut damped, BlockNorm::L1, 2.0, 0.2);
        assert_eq!(damped, [0.25, 0.25]);
    }
}
