//! Canonical tensor conversion.

use crate::error::Result;
use crate::sample::{Image, Sample};
use crate::transforms::SampleTransform;

/// Convert every plane to floating point, mapping 8-bit mask data onto
/// `[0, 1]`.
///
/// This is the canonical conversion stage: datasets substitute it for the
/// configured pipeline while computing intensity statistics so the numbers
/// describe unaugmented data.
#[derive(Debug, Clone)]
pub struct ToTensor {
    labeled: bool,
}

impl ToTensor {
    /// Convert input and ground-truth channels.
    pub fn new() -> Self {
        Self { labeled: true }
    }

    /// Convert input channels only.
    pub fn unlabeled() -> Self {
        Self { labeled: false }
    }
}

impl Default for ToTensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleTransform for ToTensor {
    fn name(&self) -> &'static str {
        "ToTensor"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        for image in &mut sample.input {
            *image = Image::F32(image.to_f32());
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    *channel = Image::F32(channel.to_f32());
                }
            }
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SampleMetadata;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_masks_scale_to_unit_range() {
        let gt = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![0u8, 255]).unwrap();
        let mut sample = Sample::unlabeled(
            vec![Image::F32(ArrayD::zeros(IxDyn(&[1, 2])))],
            vec![SampleMetadata::new()],
        );
        sample.gt = Some(vec![Some(Image::U8(gt))]);

        let out = ToTensor::new().apply(sample).unwrap();
        let gt = out.gt.unwrap().remove(0).unwrap();
        assert_eq!(gt.to_f32().as_slice().unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn test_unlabeled_leaves_gt_untouched() {
        let gt = ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![255u8]).unwrap();
        let mut sample = Sample::unlabeled(
            vec![Image::F32(ArrayD::zeros(IxDyn(&[1, 1])))],
            vec![SampleMetadata::new()],
        );
        sample.gt = Some(vec![Some(Image::U8(gt.clone()))]);

        let out = ToTensor::unlabeled().apply(sample).unwrap();
        assert_eq!(out.gt.unwrap().remove(0).unwrap(), Image::U8(gt));
    }
}
