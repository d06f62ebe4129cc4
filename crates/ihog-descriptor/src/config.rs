use ihog_hist::{Binning, Magnitude};

use crate::{Error, IntegralHogDescriptor, Result};

/// Clipping threshold the hysteresis norms use when none is configured.
pub(crate) const DEFAULT_CLIP_NORM: f64 = 0.2;
pub(crate) const DEFAULT_EPSILON: f64 = 1e-5;

/// Normalization applied to each block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockNorm {
    L1,
    L1Sqrt,
    L1Hys,
    L2,
    L2Hys,
}

impl BlockNorm {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L1Sqrt => "l1-sqrt",
            Self::L1Hys => "l1-hys",
            Self::L2 => "l2",
            Self::L2Hys => "l2-hys",
        }
    }

    /// Whether this norm clips and renormalizes.
    #[inline]
    pub fn is_hysteresis(self) -> bool {
        matches!(self, Self::L1Hys | Self::L2Hys)
    }
}

impl std::fmt::Display for BlockNorm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DescriptorConfig {
    pub(crate) n_bins: usize,
    pub(crate) cell_size: (usize, usize),
    pub(crate) block_size: (usize, usize),
    pub(crate) block_stride: (usize, usize),
    pub(crate) binning: Binning,
    pub(crate) magnitude: Magnitude,
    pub(crate) block_norm: BlockNorm,
    pub(crate) clip_norm: Option<f64>,
    pub(crate) epsilon: f64,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            n_bins: 9,
            cell_size: (8, 8),
            block_size: (16, 16),
            block_stride: (8, 8),
            binning: Binning::Unsigned,
            magnitude: Magnitude::Identity,
            block_norm: BlockNorm::L2Hys,
            clip_norm: None,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl DescriptorConfig {
    /// Cells per block as `(cells_x, cells_y)`.
    #[inline]
    pub(crate) fn cells_per_block(&self) -> (usize, usize) {
        (
            self.block_size.0 / self.cell_size.0,
            self.block_size.1 / self.cell_size.1,
        )
    }

    /// Clipping threshold effective for hysteresis normalization.
    #[inline]
    pub(crate) fn effective_clip_norm(&self) -> f64 {
        self.clip_norm.unwrap_or(DEFAULT_CLIP_NORM)
    }

    fn validate(&self) -> Result<()> {
        fn positive(size: (usize, usize)) -> bool {
            size.0 > 0 && size.1 > 0
        }

        if self.n_bins == 0 {
            return Err(Error::InvalidBinCount { n_bins: self.n_bins });
        }
        if !positive(self.cell_size) {
            return Err(Error::InvalidCellSize {
                size: self.cell_size,
            });
        }
        if !positive(self.block_size) {
            return Err(Error::InvalidBlockSize {
                size: self.block_size,
            });
        }
        if !positive(self.block_stride) {
            return Err(Error::InvalidBlockStride {
                stride: self.block_stride,
            });
        }
        if self.block_size.0 % self.cell_size.0 != 0 || self.block_size.1 % self.cell_size.1 != 0
        {
            return Err(Error::BlockCellMismatch {
                block: self.block_size,
                cell: self.cell_size,
            });
        }
        if self.block_stride.0 % self.cell_size.0 != 0
            || self.block_stride.1 % self.cell_size.1 != 0
        {
            return Err(Error::StrideCellMismatch {
                stride: self.block_stride,
                cell: self.cell_size,
            });
        }
        if !(self.epsilon >= 0.0) {
            return Err(Error::InvalidEpsilon {
                epsilon: self.epsilon,
            });
        }
        if let Some(clip_norm) = self.clip_norm {
            if !(clip_norm > 0.0) {
                return Err(Error::InvalidClipNorm { clip_norm });
            }
        }
        Ok(())
    }
}

/// Configures and validates an [`IntegralHogDescriptor`].
///
/// Unset options take the usual HOG defaults: 9 unsigned bins, 8x8 cells, 16x16 blocks at an
/// 8x8 stride, identity magnitude, `l2-hys` normalization.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    n_bins: Option<usize>,
    cell_size: Option<(usize, usize)>,
    block_size: Option<(usize, usize)>,
    block_stride: Option<(usize, usize)>,
    binning: Option<Binning>,
    magnitude: Option<Magnitude>,
    block_norm: Option<BlockNorm>,
    clip_norm: Option<f64>,
    epsilon: Option<f64>,
}

impl DescriptorBuilder {
    pub fn n_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = Some(n_bins);
        self
    }

    /// Cell size in pixels as `(width, height)`.
    pub fn cell_size(mut self, width: usize, height: usize) -> Self {
        self.cell_size = Some((width, height));
        self
    }

    /// Block size in pixels as `(width, height)`; must be a multiple of the cell size.
    pub fn block_size(mut self, width: usize, height: usize) -> Self {
        self.block_size = Some((width, height));
        self
    }

    /// Block stride in pixels as `(width, height)`; must be a multiple of the cell size.
    pub fn block_stride(mut self, width: usize, height: usize) -> Self {
        self.block_stride = Some((width, height));
        self
    }

    pub fn binning(mut self, binning: Binning) -> Self {
        self.binning = Some(binning);
        self
    }

    pub fn magnitude(mut self, magnitude: Magnitude) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn block_norm(mut self, block_norm: BlockNorm) -> Self {
        self.block_norm = Some(block_norm);
        self
    }

    /// Clipping threshold for the hysteresis norms; ignored by the others.
    pub fn clip_norm(mut self, clip_norm: f64) -> Self {
        self.clip_norm = Some(clip_norm);
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }

    /// Validate the configuration and produce a fresh descriptor.
    pub fn build(self) -> Result<IntegralHogDescriptor> {
        let defaults = DescriptorConfig::default();
        let config = DescriptorConfig {
            n_bins: self.n_bins.unwrap_or(defaults.n_bins),
            cell_size: self.cell_size.unwrap_or(defaults.cell_size),
            block_size: self.block_size.unwrap_or(defaults.block_size),
            block_stride: self.block_stride.unwrap_or(defaults.block_stride),
            binning: self.binning.unwrap_or(defaults.binning),
            magnitude: self.magnitude.unwrap_or(defaults.magnitude),
            block_norm: self.block_norm.unwrap_or(defaults.block_norm),
            clip_norm: self.clip_norm,
            epsilon: self.epsilon.unwrap_or(defaults.epsilon),
        };
        config.validate()?;
        Ok(IntegralHogDescriptor::with_config(config))
    }
}

pub(crate) fn parse_binning(value: &str) -> Result<Binning> {
    match value {
        "unsigned" => Ok(Binning::Unsigned),
        "signed" => Ok(Binning::Signed),
        _ => Err(Error::UnknownBinning(value.into())),
    }
}

pub(crate) fn parse_magnitude(value: &str) -> Result<Magnitude> {
    match value {
        "identity" => Ok(Magnitude::Identity),
        "square" => Ok(Magnitude::Square),
        "sqrt" => Ok(Magnitude::Sqrt),
        _ => Err(Error::UnknownMagnitude(value.into())),
    }
}

pub(crate) fn parse_block_norm(value: &str) -> Result<BlockNorm> {
    match value {
        "l1" => Ok(BlockNorm::L1),
        "l1-sqrt" => Ok(BlockNorm::L1Sqrt),
        "l1-hys" => Ok(BlockNorm::L1Hys),
        "l2" => Ok(BlockNorm::L2),
        "l2-hys" => Ok(BlockNorm::L2Hys),
        _ => Err(Error::UnknownBlockNorm(value.into())),
    }
}

/// Render the constructor-style representation of a configuration.
pub(crate) fn format_repr(
    config: &DescriptorConfig,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    write!(
        f,
        "IntegralHogDescriptor(n_bins={}, cell_size=({}, {}), block_size=({}, {}), \
         block_stride=({}, {}), binning={}, magnitude={}, block_norm={}, clip_norm=",
        config.n_bins,
        config.cell_size.0,
        config.cell_size.1,
        config.block_size.0,
        config.block_size.1,
        config.block_stride.0,
        config.block_stride.1,
        config.binning,
        config.magnitude,
        config.block_norm,
    )?;
    match config.clip_norm {
        Some(clip_norm) => write!(f, "{clip_norm}")?,
        None => f.write_str("None")?,
    }
    write!(f, ", epsilon={})", config.epsilon)
}

/// Parse the representation emitted by [`format_repr`] back into a fresh descriptor.
pub(crate) fn parse_repr(text: &str) -> Result<IntegralHogDescriptor> {
    let inner = text
        .trim()
        .strip_prefix("IntegralHogDescriptor(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| Error::InvalidRepr {
            message: "expected `IntegralHogDescriptor(..)`".into(),
        })?;

    let mut builder = DescriptorBuilder::default();
    for field in split_fields(inner) {
        let (key, value) = field.split_once('=').ok_or_else(|| Error::InvalidRepr {
            message: format!("expected `key=value`, got `{}`", field.trim()),
        })?;
        let key = key.trim();
        let value = value.trim();
        builder = match key {
            "n_bins" => builder.n_bins(parse_usize(value)?),
            "cell_size" => {
                let (w, h) = parse_pair(value)?;
                builder.cell_size(w, h)
            }
            "block_size" => {
                let (w, h) = parse_pair(value)?;
                builder.block_size(w, h)
            }
            "block_stride" => {
                let (w, h) = parse_pair(value)?;
                builder.block_stride(w, h)
            }
            "binning" => builder.binning(parse_binning(value)?),
            "magnitude" => builder.magnitude(parse_magnitude(value)?),
            "block_norm" => builder.block_norm(parse_block_norm(value)?),
            "clip_norm" => {
                if value == "None" {
                    builder
                } else {
                    builder.clip_norm(parse_f64(value)?)
                }
            }
            "epsilon" => builder.epsilon(parse_f64(value)?),
            _ => return Err(Error::UnknownOption(key.into())),
        };
    }
    builder.build()
}

/// Split on top-level commas, leaving parenthesized pairs intact.
fn split_fields(text: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                fields.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !text[start..].trim().is_empty() {
        fields.push(&text[start..]);
    }
    fields
}

fn parse_usize(value: &str) -> Result<usize> {
    value.parse().map_err(|_| Error::InvalidRepr {
        message: format!("invalid integer `{value}`"),
    })
}

fn parse_f64(value: &str) -> Result<f64> {
    value.parse().map_err(|_| Error::InvalidRepr {
        message: format!("invalid number `{value}`"),
    })
}

fn parse_pair(value: &str) -> Result<(usize, usize)> {
    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| Error::InvalidRepr {
            message: format!("expected `(w, h)`, got `{value}`"),
        })?;
    let (a, b) = inner.split_once(',').ok_or_else(|| Error::InvalidRepr {
        message: format!("expected `(w, h)`, got `{value}`"),
    })?;
    Ok((parse_usize(a.trim())?, parse_usize(b.trim())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let desc = IntegralHogDescriptor::default();
        assert_eq!(desc.n_bins(), 9);
        assert_eq!(desc.cell_size(), (8, 8));
        assert_eq!(desc.block_size(), (16, 16));
        assert_eq!(desc.block_stride(), (8, 8));
        assert_eq!(desc.binning(), Binning::Unsigned);
        assert_eq!(desc.magnitude(), Magnitude::Identity);
        assert_eq!(desc.block_norm(), BlockNorm::L2Hys);
        assert_eq!(desc.clip_norm(), None);
        assert_eq!(desc.epsilon(), 1e-5);
        assert!(!desc.is_computed());
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(matches!(
            IntegralHogDescriptor::builder().n_bins(0).build(),
            Err(Error::InvalidBinCount { n_bins: 0 })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().cell_size(0, 8).build(),
            Err(Error::InvalidCellSize { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().block_size(8, 0).build(),
            Err(Error::InvalidBlockSize { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().block_stride(0, 0).build(),
            Err(Error::InvalidBlockStride { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().block_size(12, 16).build(),
            Err(Error::BlockCellMismatch { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().block_stride(8, 12).build(),
            Err(Error::StrideCellMismatch { .. })
        ));
    }

    #[test]
    fn rejects_bad_scalars() {
        assert!(matches!(
            IntegralHogDescriptor::builder().epsilon(-1.0).build(),
            Err(Error::InvalidEpsilon { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().clip_norm(0.0).build(),
            Err(Error::InvalidClipNorm { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::builder().clip_norm(-2.0).build(),
            Err(Error::InvalidClipNorm { .. })
        ));
        assert!(IntegralHogDescriptor::builder().epsilon(0.0).build().is_ok());
    }

    #[test]
    fn error_kinds_follow_the_taxonomy() {
        let value = IntegralHogDescriptor::builder().n_bins(0).build().unwrap_err();
        assert_eq!(value.kind(), crate::ErrorKind::Value);
        assert_eq!(parse_binning("signed1").unwrap_err().kind(), crate::ErrorKind::Type);
        assert_eq!(
            parse_block_norm("l11").unwrap_err().kind(),
            crate::ErrorKind::Type
        );
    }

    #[test]
    fn repr_round_trips() {
        let configs = [
            IntegralHogDescriptor::default(),
            IntegralHogDescriptor::builder()
                .block_norm(BlockNorm::L1Hys)
                .clip_norm(1.0)
                .build()
                .unwrap(),
            IntegralHogDescriptor::builder()
                .binning(Binning::Signed)
                .clip_norm(1e-2)
                .build()
                .unwrap(),
            IntegralHogDescriptor::builder()
                .magnitude(Magnitude::Sqrt)
                .epsilon(1e-3)
                .build()
                .unwrap(),
            IntegralHogDescriptor::builder()
                .cell_size(2, 2)
                .block_size(2, 4)
                .block_stride(2, 2)
                .n_bins(7)
                .build()
                .unwrap(),
        ];

        for desc in configs {
            let text = desc.to_string();
            let parsed = IntegralHogDescriptor::parse_repr(&text).unwrap();
            assert_eq!(parsed, desc, "{text}");
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn repr_parsing_rejects_junk() {
        assert!(matches!(
            IntegralHogDescriptor::parse_repr("HogDescriptor()"),
            Err(Error::InvalidRepr { .. })
        ));
        assert!(matches!(
            IntegralHogDescriptor::parse_repr("IntegralHogDescriptor(frobnicate=1)"),
            Err(Error::UnknownOption(_))
        ));
        assert!(matches!(
            IntegralHogDescriptor::parse_repr("IntegralHogDescriptor(binning=diagonal)"),
            Err(Error::UnknownBinning(_))
        ));
        assert!(matches!(
            IntegralHogDescriptor::parse_repr("IntegralHogDescriptor(n_bins=many)"),
            Err(Error::InvalidRepr { .. })
        ));

        // An empty option list is the default descriptor.
        let parsed = IntegralHogDescriptor::parse_repr("IntegralHogDescriptor()").unwrap();
        assert_eq!(parsed, IntegralHogDescriptor::default());
    }
}
