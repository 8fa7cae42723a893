//! Sample records exchanged between datasets and transforms.

use crate::metadata::SampleMetadata;
use ndarray::ArrayD;

/// One image plane or volume in the pipeline's native representation.
///
/// Input channels stay floating point end to end. Ground-truth and
/// region-of-interest masks are quantized to 8 bits when a 2D slice is
/// materialized (a deliberate bit-depth reduction, exact for binary masks)
/// and scaled back to `[0, 1]` floats by [`crate::transforms::ToTensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    F32(ArrayD<f32>),
    U8(ArrayD<u8>),
}

impl Image {
    /// Spatial shape of the underlying array.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::U8(a) => a.shape(),
        }
    }

    /// Number of spatial dimensions.
    pub fn ndim(&self) -> usize {
        match self {
            Self::F32(a) => a.ndim(),
            Self::U8(a) => a.ndim(),
        }
    }

    /// Materialize as `f32`, mapping 8-bit data onto `[0, 1]`.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Self::F32(a) => a.clone(),
            Self::U8(a) => a.mapv(|v| f32::from(v) / 255.0),
        }
    }

    /// Quantize a mask plane to 8 bits by linear `value * 255` scaling.
    pub fn from_mask(plane: ArrayD<f32>) -> Self {
        Self::U8(plane.mapv(|v| (v * 255.0) as u8))
    }
}

/// A training sample: channel-aligned images plus their metadata.
///
/// `gt` and `roi` are `None` when no ground truth or region of interest was
/// supplied for the whole pair (inference-time data); individual channels
/// inside them are `None` when that single channel is missing. Consumers
/// must check these markers before applying label-only operations.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Input channels, one per modality, order significant.
    pub input: Vec<Image>,
    /// Ground-truth channels, aligned with `input`.
    pub gt: Option<Vec<Option<Image>>>,
    /// Region-of-interest channels, aligned with `input`.
    pub roi: Option<Vec<Option<Image>>>,
    /// Per-channel input metadata.
    pub input_metadata: Vec<SampleMetadata>,
    /// Per-channel ground-truth metadata.
    pub gt_metadata: Option<Vec<SampleMetadata>>,
    /// Per-channel region-of-interest metadata.
    pub roi_metadata: Option<Vec<SampleMetadata>>,
}

impl Sample {
    /// Build an unlabeled sample from input channels and their metadata.
    pub fn unlabeled(input: Vec<Image>, input_metadata: Vec<SampleMetadata>) -> Self {
        Self {
            input,
            input_metadata,
            ..Self::default()
        }
    }

    /// Number of input channels.
    pub fn channels(&self) -> usize {
        self.input.len()
    }

    /// Whether any ground-truth channel is present.
    pub fn is_labeled(&self) -> bool {
        self.gt
            .as_ref()
            .is_some_and(|gt| gt.iter().any(Option::is_some))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_mask_quantization_roundtrip() {
        let plane = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let mask = Image::from_mask(plane.clone());
        assert!(matches!(mask, Image::U8(_)));
        assert_eq!(mask.to_f32(), plane);
    }

    #[test]
    fn test_labeled_flag() {
        let plane = ArrayD::zeros(IxDyn(&[2, 2]));
        let mut sample = Sample::unlabeled(vec![Image::F32(plane)], vec![SampleMetadata::new()]);
        assert!(!sample.is_labeled());

        sample.gt = Some(vec![None]);
        assert!(!sample.is_labeled());

        sample.gt = Some(vec![Some(Image::U8(ArrayD::zeros(IxDyn(&[2, 2]))))]);
        assert!(sample.is_labeled());
    }
}
