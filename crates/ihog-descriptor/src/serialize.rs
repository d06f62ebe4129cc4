//! Versioned binary persistence of a descriptor.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic    b"IHOG"
//! version  u16 (currently 1)
//! config   n_bins u32; cell w/h, block w/h, stride w/h as u32 each;
//!          binning u8; magnitude u8; block norm u8;
//!          clip norm flag u8 (+ f64 bits when 1); epsilon f64 bits
//! state    u8: 0 none, 1 f32 tensors, 2 f64 tensors
//!          image height u64, width u64 (when computed)
//!          histogram tensor, features tensor
//! tensor   rank u8; extents u64 each; element payload
//! ```
//!
//! Float payloads are written bit for bit, so a round trip reproduces computed state
//! exactly.
use ihog_tensor::Tensor;

use crate::config::{DescriptorBuilder, DescriptorConfig};
use crate::{Binning, BlockNorm, Computed, IntegralHogDescriptor, Magnitude, Result, State};

const MAGIC: [u8; 4] = *b"IHOG";
const VERSION: u16 = 1;

#[derive(Debug)]
#[non_exhaustive]
pub enum CodecError {
    UnexpectedEnd,
    BadMagic,
    UnsupportedVersion(u16),
    InvalidTag { field: &'static str, value: u8 },
    Inconsistent { field: &'static str },
    TrailingBytes { count: usize },
    Overflow,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of data"),
            Self::BadMagic => write!(f, "missing descriptor signature"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported layout version {version}")
            }
            Self::InvalidTag { field, value } => {
                write!(f, "invalid {field} tag {value}")
            }
            Self::Inconsistent { field } => {
                write!(f, "{field} does not match the encoded configuration")
            }
            Self::TrailingBytes { count } => {
                write!(f, "{count} trailing byte(s) after descriptor state")
            }
            Self::Overflow => write!(f, "encoded extents overflow this platform"),
        }
    }
}

impl std::error::Error for CodecError {}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn binning_tag(binning: Binning) -> u8 {
    match binning {
        Binning::Unsigned => 0,
        Binning::Signed => 1,
    }
}

fn magnitude_tag(magnitude: Magnitude) -> u8 {
    match magnitude {
        Magnitude::Identity => 0,
        Magnitude::Square => 1,
        Magnitude::Sqrt => 2,
    }
}

fn block_norm_tag(norm: BlockNorm) -> u8 {
    match norm {
        BlockNorm::L1 => 0,
        BlockNorm::L1Sqrt => 1,
        BlockNorm::L1Hys => 2,
        BlockNorm::L2 => 3,
        BlockNorm::L2Hys => 4,
    }
}

fn put_tensor_f32(out: &mut Vec<u8>, tensor: &Tensor<f32>) {
    out.push(tensor.rank() as u8);
    for &extent in tensor.extents() {
        put_u64(out, extent as u64);
    }
    #[cfg(target_endian = "little")]
    {
        out.extend_from_slice(bytemuck::cast_slice(tensor.buf()));
    }
    #[cfg(not(target_endian = "little"))]
    {
        for &value in tensor.buf() {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn put_tensor_f64(out: &mut Vec<u8>, tensor: &Tensor<f64>) {
    out.push(tensor.rank() as u8);
    for &extent in tensor.extents() {
        put_u64(out, extent as u64);
    }
    #[cfg(target_endian = "little")]
    {
        out.extend_from_slice(bytemuck::cast_slice(tensor.buf()));
    }
    #[cfg(not(target_endian = "little"))]
    {
        for &value in tensor.buf() {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub(crate) fn encode(descriptor: &IntegralHogDescriptor) -> Vec<u8> {
    let config = &descriptor.config;
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    put_u16(&mut out, VERSION);

    put_u32(&mut out, config.n_bins as u32);
    for value in [
        config.cell_size.0,
        config.cell_size.1,
        config.block_size.0,
        config.block_size.1,
        config.block_stride.0,
        config.block_stride.1,
    ] {
        put_u32(&mut out, value as u32);
    }
    out.push(binning_tag(config.binning));
    out.push(magnitude_tag(config.magnitude));
    out.push(block_norm_tag(config.block_norm));
    match config.clip_norm {
        Some(clip_norm) => {
            out.push(1);
            put_f64(&mut out, clip_norm);
        }
        None => out.push(0),
    }
    put_f64(&mut out, config.epsilon);

    match &descriptor.state {
        None => out.push(0),
        Some(State::F32(computed)) => {
            out.push(1);
            put_u64(&mut out, computed.image_shape.0 as u64);
            put_u64(&mut out, computed.image_shape.1 as u64);
            put_tensor_f32(&mut out, &computed.histogram);
            put_tensor_f32(&mut out, &computed.features);
        }
        Some(State::F64(computed)) => {
            out.push(2);
            put_u64(&mut out, computed.image_shape.0 as u64);
            put_u64(&mut out, computed.image_shape.1 as u64);
            put_tensor_f64(&mut out, &computed.histogram);
            put_tensor_f64(&mut out, &computed.features);
        }
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, count: usize) -> std::result::Result<&'a [u8], CodecError> {
        if self.bytes.len() < count {
            return Err(CodecError::UnexpectedEnd);
        }
        let (head, rest) = self.bytes.split_at(count);
        self.bytes = rest;
        Ok(head)
    }

    fn u8(&mut self) -> std::result::Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> std::result::Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> std::result::Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> std::result::Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> std::result::Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn extent(&mut self) -> std::result::Result<usize, CodecError> {
        usize::try_from(self.u64()?).map_err(|_| CodecError::Overflow)
    }
}

fn read_extents(reader: &mut Reader<'_>) -> Result<(Vec<usize>, usize)> {
    let rank = reader.u8()? as usize;
    if rank > ihog_tensor::MAX_RANK {
        return Err(CodecError::InvalidTag {
            field: "tensor rank",
            value: rank as u8,
        }
        .into());
    }
    let mut extents = Vec::with_capacity(rank);
    for _ in 0..rank {
        extents.push(reader.extent()?);
    }
    let len = extents
        .iter()
        .try_fold(1usize, |acc, &e| acc.checked_mul(e))
        .ok_or(CodecError::Overflow)?;
    Ok((extents, len))
}

fn read_tensor_f32(reader: &mut Reader<'_>) -> Result<Tensor<f32>> {
    let (extents, len) = read_extents(reader)?;
    let payload = reader.take(len.checked_mul(4).ok_or(CodecError::Overflow)?)?;
    let buf = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Ok(Tensor::from_vec(buf, &extents)?)
}

fn read_tensor_f64(reader: &mut Reader<'_>) -> Result<Tensor<f64>> {
    let (extents, len) = read_extents(reader)?;
    let payload = reader.take(len.checked_mul(8).ok_or(CodecError::Overflow)?)?;
    let buf = payload
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Ok(Tensor::from_vec(buf, &extents)?)
}

/// Reject state tensors whose shapes disagree with the configuration.
fn check_state_shape(
    config: &DescriptorConfig,
    image_shape: (usize, usize),
    histogram: &[usize],
    features: &[usize],
) -> std::result::Result<(), CodecError> {
    let (height, width) = image_shape;
    if histogram != [height + 1, width + 1, config.n_bins] {
        return Err(CodecError::Inconsistent { field: "histogram shape" });
    }

    let (cells_x, cells_y) = config.cells_per_block();
    let count = |dim: usize, block: usize, stride: usize| {
        if dim < block {
            0
        } else {
            (dim - block) / stride + 1
        }
    };
    let expected = [
        count(height, config.block_size.1, config.block_stride.1),
        count(width, config.block_size.0, config.block_stride.0),
        cells_y,
        cells_x,
        config.n_bins,
    ];
    if features != expected {
        return Err(CodecError::Inconsistent { field: "feature shape" });
    }
    Ok(())
}

pub(crate) fn decode(bytes: &[u8]) -> Result<IntegralHogDescriptor> {
    let mut reader = Reader { bytes };

    if reader.take(4)? != MAGIC {
        return Err(CodecError::BadMagic.into());
    }
    let version = reader.u16()?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version).into());
    }

    let n_bins = reader.u32()? as usize;
    let cell_size = (reader.u32()? as usize, reader.u32()? as usize);
    let block_size = (reader.u32()? as usize, reader.u32()? as usize);
    let block_stride = (reader.u32()? as usize, reader.u32()? as usize);

    let binning = match reader.u8()? {
        0 => Binning::Unsigned,
        1 => Binning::Signed,
        value => return Err(CodecError::InvalidTag { field: "binning", value }.into()),
    };
    let magnitude = match reader.u8()? {
        0 => Magnitude::Identity,
        1 => Magnitude::Square,
        2 => Magnitude::Sqrt,
        value => return Err(CodecError::InvalidTag { field: "magnitude", value }.into()),
    };
    let block_norm = match reader.u8()? {
        0 => BlockNorm::L1,
        1 => BlockNorm::L1Sqrt,
        2 => BlockNorm::L1Hys,
        3 => BlockNorm::L2,
        4 => BlockNorm::L2Hys,
        value => return Err(CodecError::InvalidTag { field: "block norm", value }.into()),
    };
    let clip_norm = match reader.u8()? {
        0 => None,
        1 => Some(reader.f64()?),
        value => return Err(CodecError::InvalidTag { field: "clip norm", value }.into()),
    };
    let epsilon = reader.f64()?;

    let mut builder = DescriptorBuilder::default()
        .n_bins(n_bins)
        .cell_size(cell_size.0, cell_size.1)
        .block_size(block_size.0, block_size.1)
        .block_stride(block_stride.0, block_stride.1)
        .binning(binning)
        .magnitude(magnitude)
        .block_norm(block_norm)
        .epsilon(epsilon);
    if let Some(clip_norm) = clip_norm {
        builder = builder.clip_norm(clip_norm);
    }
    let mut descriptor = builder.build()?;

    match reader.u8()? {
        0 => {}
        1 => {
            let image_shape = (reader.extent()?, reader.extent()?);
            let histogram = read_tensor_f32(&mut reader)?;
            let features = read_tensor_f32(&mut reader)?;
            check_state_shape(
                &descriptor.config,
                image_shape,
                histogram.extents(),
                features.extents(),
            )?;
            descriptor.state = Some(State::F32(Computed {
                histogram,
                features,
                image_shape,
            }));
        }
        2 => {
            let image_shape = (reader.extent()?, reader.extent()?);
            let histogram = read_tensor_f64(&mut reader)?;
            let features = read_tensor_f64(&mut reader)?;
            check_state_shape(
                &descriptor.config,
                image_shape,
                histogram.extents(),
                features.extents(),
            )?;
            descriptor.state = Some(State::F64(Computed {
                histogram,
                features,
                image_shape,
            }));
        }
        value => return Err(CodecError::InvalidTag { field: "state", value }.into()),
    }

    if !reader.bytes.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.bytes.len(),
        }
        .into());
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn fresh_descriptors_round_trip() {
        let descriptor = IntegralHogDescriptor::builder()
            .n_bins(7)
            .cell_size(4, 4)
            .block_size(8, 8)
            .block_stride(4, 4)
            .binning(Binning::Signed)
            .magnitude(Magnitude::Square)
            .block_norm(BlockNorm::L1Hys)
            .clip_norm(0.5)
            .epsilon(0.0)
            .build()
            .unwrap();

        let bytes = descriptor.serialize();
        let restored = IntegralHogDescriptor::deserialize(&bytes).unwrap();
        assert_eq!(restored, descriptor);
        assert!(!restored.is_computed());
    }

    #[test]
    fn corrupt_input_is_rejected() {
        let descriptor = IntegralHogDescriptor::default();
        let bytes = descriptor.serialize();

        assert!(matches!(
            IntegralHogDescriptor::deserialize(&bytes[..bytes.len() - 1]),
            Err(Error::Codec(CodecError::UnexpectedEnd))
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'J';
        assert!(matches!(
            IntegralHogDescriptor::deserialize(&bad_magic),
            Err(Error::Codec(CodecError::BadMagic))
        ));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(matches!(
            IntegralHogDescriptor::deserialize(&bad_version),
            Err(Error::Codec(CodecError::UnsupportedVersion(9)))
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            IntegralHogDescriptor::deserialize(&trailing),
            Err(Error::Codec(CodecError::TrailingBytes { count: 1 }))
        ));

        // Binning tag lives right after the seven u32 config fields.
        let mut bad_tag = bytes;
        bad_tag[4 + 2 + 7 * 4] = 7;
        assert!(matches!(
            IntegralHogDescriptor::deserialize(&bad_tag),
            Err(Error::Codec(CodecError::InvalidTag { field: "binning", value: 7 }))
        ));
    }

    #[test]
    fn corrupt_configurations_fail_validation() {
        let descriptor = IntegralHogDescriptor::default();
        let mut bytes = descriptor.serialize();
        // Zero out n_bins.
        bytes[6..10].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            IntegralHogDescriptor::deserialize(&bytes),
            Err(Error::InvalidBinCount { n_bins: 0 })
        ));
    }
}
