//! Intensity transforms.
//!
//! These touch input channels only; masks carry labels, not intensities.

use crate::error::{Error, Result};
use crate::sample::{Image, Sample};
use crate::transforms::{get_rng, SampleTransform};
use ndarray::ArrayD;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Mutex, MutexGuard};

fn lock_rng(rng: &Mutex<ChaCha8Rng>) -> MutexGuard<'_, ChaCha8Rng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Additive constant shift of the first input channel only.
///
/// The asymmetry is deliberate: the first channel carries the primary
/// contrast, the remaining channels are left untouched.
pub struct RandomChannelShift {
    shift_range: (f32, f32),
    rng: Mutex<ChaCha8Rng>,
}

impl RandomChannelShift {
    /// Shift sampled uniformly from `shift_range`.
    pub fn new(shift_range: (f32, f32)) -> Result<Self> {
        if !shift_range.0.is_finite() || !shift_range.1.is_finite() || shift_range.0 > shift_range.1
        {
            return Err(Error::Configuration(format!(
                "shift range must be an ordered finite range (got {:?})",
                shift_range
            )));
        }
        Ok(Self {
            shift_range,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }
}

impl SampleTransform for RandomChannelShift {
    fn name(&self) -> &'static str {
        "RandomChannelShift"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let shift = lock_rng(&self.rng).gen_range(self.shift_range.0..=self.shift_range.1);
        if let Some(first) = sample.input.first_mut() {
            *first = Image::F32(first.to_f32().mapv_into(|v| v + shift));
        }
        Ok(sample)
    }
}

/// Additive Gaussian noise on every input channel.
pub struct AdditiveGaussianNoise {
    mean: f32,
    std: f32,
    rng: Mutex<ChaCha8Rng>,
}

impl AdditiveGaussianNoise {
    pub fn new(mean: f32, std: f32) -> Result<Self> {
        if !std.is_finite() || std < 0.0 {
            return Err(Error::Configuration(format!(
                "noise standard deviation must be non-negative and finite (got {})",
                std
            )));
        }
        Ok(Self {
            mean,
            std,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }
}

impl SampleTransform for AdditiveGaussianNoise {
    fn name(&self) -> &'static str {
        "AdditiveGaussianNoise"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let mut rng = lock_rng(&self.rng);
        for image in &mut sample.input {
            let mut data = image.to_f32();
            for value in data.iter_mut() {
                let u1: f32 = rng.gen::<f32>().max(1e-10);
                let u2: f32 = rng.gen();
                let noise =
                    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * self.std;
                *value += self.mean + noise;
            }
            *image = Image::F32(data);
        }
        Ok(sample)
    }
}

/// Standardize input channels with fixed per-channel statistics.
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    /// One `(mean, std)` per input channel, typically the output of
    /// [`crate::dataset::SliceDataset::compute_mean_std`].
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(Error::Configuration(format!(
                "{} means supplied for {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|&s| !s.is_finite() || s == 0.0) {
            return Err(Error::Configuration(
                "standard deviations must be finite and non-zero".to_string(),
            ));
        }
        Ok(Self { mean, std })
    }
}

impl SampleTransform for Normalize {
    fn name(&self) -> &'static str {
        "Normalize"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        if sample.input.len() != self.mean.len() {
            return Err(Error::transform(
                self.name(),
                format!(
                    "statistics cover {} channels but the sample has {}",
                    self.mean.len(),
                    sample.input.len()
                ),
            ));
        }
        for (i, image) in sample.input.iter_mut().enumerate() {
            let (mean, std) = (self.mean[i], self.std[i]);
            *image = Image::F32(image.to_f32().mapv_into(|v| (v - mean) / std));
        }
        Ok(sample)
    }
}

/// Standardize each input channel with statistics estimated from the sample
/// itself. Channels with zero variance are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct NormalizeInstance;

impl NormalizeInstance {
    pub fn new() -> Self {
        Self
    }
}

fn channel_stats(data: &ArrayD<f32>) -> (f32, f32) {
    let n = data.len().max(1) as f64;
    let mean = data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = data
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}

impl SampleTransform for NormalizeInstance {
    fn name(&self) -> &'static str {
        "NormalizeInstance"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        for image in &mut sample.input {
            let data = image.to_f32();
            let (mean, std) = channel_stats(&data);
            if std > 0.0 {
                *image = Image::F32(data.mapv_into(|v| (v - mean) / std));
            }
        }
        Ok(sample)
    }
}

/// Clamp input intensities to a percentile window.
pub struct HistogramClipping {
    min_percentile: f32,
    max_percentile: f32,
}

impl HistogramClipping {
    /// Clamp to `[min_percentile, max_percentile]`, both in `[0, 100]`.
    pub fn new(min_percentile: f32, max_percentile: f32) -> Result<Self> {
        if !(0.0..=100.0).contains(&min_percentile)
            || !(0.0..=100.0).contains(&max_percentile)
            || min_percentile >= max_percentile
        {
            return Err(Error::Configuration(format!(
                "percentiles must satisfy 0 <= min < max <= 100 (got {} and {})",
                min_percentile, max_percentile
            )));
        }
        Ok(Self {
            min_percentile,
            max_percentile,
        })
    }
}

/// Linear-interpolated percentile of a sorted slice.
fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl SampleTransform for HistogramClipping {
    fn name(&self) -> &'static str {
        "HistogramClipping"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        for image in &mut sample.input {
            let data = image.to_f32();
            let mut sorted: Vec<f32> = data.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let lo = percentile(&sorted, self.min_percentile);
            let hi = percentile(&sorted, self.max_percentile);
            *image = Image::F32(data.mapv_into(|v| v.clamp(lo, hi)));
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SampleMetadata;
    use ndarray::IxDyn;

    fn two_channel_sample() -> Sample {
        let a = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        Sample::unlabeled(
            vec![Image::F32(a), Image::F32(b)],
            vec![SampleMetadata::new(), SampleMetadata::new()],
        )
    }

    #[test]
    fn test_channel_shift_touches_first_channel_only() {
        let shift = RandomChannelShift::new((5.0, 5.0)).unwrap().seed(1);
        let out = shift.apply(two_channel_sample()).unwrap();
        assert_eq!(
            out.input[0].to_f32().as_slice().unwrap(),
            &[6.0, 7.0, 8.0, 9.0]
        );
        assert_eq!(
            out.input[1].to_f32().as_slice().unwrap(),
            &[5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_gaussian_noise_changes_values() {
        let noise = AdditiveGaussianNoise::new(0.0, 0.5).unwrap().seed(3);
        let out = noise.apply(two_channel_sample()).unwrap();
        let data = out.input[0].to_f32();
        assert!(data.iter().zip([1.0, 2.0, 3.0, 4.0]).any(|(a, b)| (a - b).abs() > 1e-4));
    }

    #[test]
    fn test_normalize_per_channel() {
        let normalize = Normalize::new(vec![2.5, 6.5], vec![1.0, 2.0]).unwrap();
        let out = normalize.apply(two_channel_sample()).unwrap();
        assert_eq!(
            out.input[0].to_f32().as_slice().unwrap(),
            &[-1.5, -0.5, 0.5, 1.5]
        );
        assert_eq!(
            out.input[1].to_f32().as_slice().unwrap(),
            &[-0.75, -0.25, 0.25, 0.75]
        );
    }

    #[test]
    fn test_normalize_rejects_channel_mismatch() {
        let normalize = Normalize::new(vec![0.0], vec![1.0]).unwrap();
        assert!(normalize.apply(two_channel_sample()).is_err());
    }

    #[test]
    fn test_normalize_instance_zero_variance_is_identity() {
        let flat = ArrayD::from_elem(IxDyn(&[2, 2]), 3.0f32);
        let sample = Sample::unlabeled(
            vec![Image::F32(flat.clone())],
            vec![SampleMetadata::new()],
        );
        let out = NormalizeInstance::new().apply(sample).unwrap();
        assert_eq!(out.input[0].to_f32(), flat);
    }

    #[test]
    fn test_histogram_clipping_clamps_tails() {
        let data = ArrayD::from_shape_vec(
            IxDyn(&[1, 11]),
            (0..11).map(|i| i as f32).collect(),
        )
        .unwrap();
        let sample = Sample::unlabeled(vec![Image::F32(data)], vec![SampleMetadata::new()]);

        let clip = HistogramClipping::new(10.0, 90.0).unwrap();
        let out = clip.apply(sample).unwrap();
        let clipped = out.input[0].to_f32();
        assert_eq!(clipped[[0, 0]], 1.0);
        assert_eq!(clipped[[0, 10]], 9.0);
    }

    #[test]
    fn test_histogram_clipping_validates_percentiles() {
        assert!(HistogramClipping::new(90.0, 10.0).is_err());
        assert!(HistogramClipping::new(-1.0, 50.0).is_err());
    }
}
