use ihog_tensor::TensorView;

use crate::{Error, Result};

/// A dense vote mask; truthy entries suppress the vote of the matching pixel.
#[derive(Debug, Clone, Copy)]
pub enum DenseMask<'a> {
    Bool(TensorView<'a, bool>),
    U8(TensorView<'a, u8>),
}

impl<'a> DenseMask<'a> {
    #[inline]
    fn rank(&self) -> usize {
        match self {
            Self::Bool(view) => view.rank(),
            Self::U8(view) => view.rank(),
        }
    }

    #[inline]
    fn extents(&self) -> &[usize] {
        match self {
            Self::Bool(view) => view.extents(),
            Self::U8(view) => view.extents(),
        }
    }

    /// Whether the pixel at `(y, x)` is masked out.
    #[inline]
    pub fn is_set(&self, y: usize, x: usize) -> bool {
        match self {
            Self::Bool(view) => view.get2(y, x),
            Self::U8(view) => view.get2(y, x) != 0,
        }
    }
}

/// A vote mask, either dense over the image's spatial extents or a per-pixel predicate.
///
/// The dense form is the fast path; the predicate form calls back into the host once per
/// pixel. Either way a truthy result drops the vote.
pub enum Mask<'a> {
    Dense(DenseMask<'a>),
    Predicate(&'a dyn Fn(usize, usize) -> bool),
}

impl<'a> Mask<'a> {
    pub fn from_bool(view: TensorView<'a, bool>) -> Self {
        Self::Dense(DenseMask::Bool(view))
    }

    pub fn from_u8(view: TensorView<'a, u8>) -> Self {
        Self::Dense(DenseMask::U8(view))
    }

    pub fn predicate(callback: &'a dyn Fn(usize, usize) -> bool) -> Self {
        Self::Predicate(callback)
    }

    /// Check a dense mask against the image's spatial extents. Predicates are unconstrained.
    pub fn validate(&self, height: usize, width: usize) -> Result<()> {
        let Self::Dense(dense) = self else {
            return Ok(());
        };

        if dense.rank() != 2 {
            return Err(Error::MaskRank { rank: dense.rank() });
        }
        if dense.extents() != &[height, width] {
            return Err(Error::MaskShapeMismatch {
                expected: (height, width),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Mask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dense(dense) => f.debug_tuple("Dense").field(dense).finish(),
            Self::Predicate(_) => f.debug_tuple("Predicate").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_masks_validate_their_extents() {
        let data = [true, false, true, false, true, false];
        let mask = Mask::from_bool(TensorView::from_slice(&data, &[2, 3]).unwrap());
        assert!(mask.validate(2, 3).is_ok());
        assert!(matches!(
            mask.validate(3, 2),
            Err(Error::MaskShapeMismatch { expected: (3, 2) })
        ));

        let scalar = [true];
        let mask = Mask::from_bool(TensorView::from_slice(&scalar, &[]).unwrap());
        assert!(matches!(mask.validate(2, 3), Err(Error::MaskRank { rank: 0 })));
    }

    #[test]
    fn u8_masks_are_truthy_when_nonzero() {
        let data = [0u8, 1, 2, 0];
        let Mask::Dense(dense) = Mask::from_u8(TensorView::from_slice(&data, &[2, 2]).unwrap())
        else {
            unreachable!()
        };
        assert!(!dense.is_set(0, 0));
        assert!(dense.is_set(0, 1));
        assert!(dense.is_set(1, 0));
    }

    #[test]
    fn predicates_skip_validation() {
        let reject_top = |y: usize, _: usize| y == 0;
        let mask = Mask::predicate(&reject_top);
        assert!(mask.validate(100, 100).is_ok());
        let Mask::Predicate(p) = mask else { unreachable!() };
        assert!(p(0, 5));
        assert!(!p(1, 5));
    }
}
