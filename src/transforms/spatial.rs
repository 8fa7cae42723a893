//! Randomized geometric transforms.
//!
//! Every transform samples its parameters once per invocation and applies
//! the identical draw to all paired channels so input and ground truth stay
//! co-registered. Warped ground-truth masks are re-binarized at 0.5 where
//! interpolation could introduce soft values (affine and elastic).

use crate::error::{Error, Result};
use crate::sample::{Image, Sample};
use crate::transforms::{get_rng, warp, SampleTransform};
use ndarray::{Array2, ArrayD, Axis, Ix2, Ix3};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Mutex, MutexGuard};

fn lock_rng(rng: &Mutex<ChaCha8Rng>) -> MutexGuard<'_, ChaCha8Rng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Turn a symmetric maximum into a `(-d, d)` range, rejecting negatives.
fn symmetric_range(degrees: f32, what: &str) -> Result<(f32, f32)> {
    if degrees < 0.0 || !degrees.is_finite() {
        return Err(Error::Configuration(format!(
            "{} must be a non-negative finite number (got {})",
            what, degrees
        )));
    }
    Ok((-degrees, degrees))
}

fn validate_range(range: (f32, f32), what: &str) -> Result<(f32, f32)> {
    if !range.0.is_finite() || !range.1.is_finite() || range.0 > range.1 {
        return Err(Error::Configuration(format!(
            "{} must be an ordered finite range (got {:?})",
            what, range
        )));
    }
    Ok(range)
}

fn as_plane(data: ArrayD<f32>, op: &str) -> Result<Array2<f32>> {
    data.into_dimensionality::<Ix2>()
        .map_err(|_| Error::transform(op, "expected 2D planes"))
}

fn binarize(data: &mut Array2<f32>) {
    data.mapv_inplace(|v| if v >= 0.5 { 1.0 } else { 0.0 });
}

/// Flip a copy of `data` along the given axes.
fn flip_array<T: Clone>(data: &ArrayD<T>, axes: &[usize]) -> ArrayD<T> {
    let mut view = data.view();
    for &axis in axes {
        view.invert_axis(Axis(axis));
    }
    view.as_standard_layout().to_owned()
}

/// Rotate input and ground-truth planes by one uniformly sampled angle.
pub struct RandomRotation {
    degrees: (f32, f32),
    labeled: bool,
    rng: Mutex<ChaCha8Rng>,
}

impl RandomRotation {
    /// Sample angles uniformly from `(-degrees, degrees)`.
    pub fn new(degrees: f32) -> Result<Self> {
        Ok(Self {
            degrees: symmetric_range(degrees, "rotation degrees")?,
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Sample angles uniformly from an explicit `(min, max)` range.
    pub fn from_range(range: (f32, f32)) -> Result<Self> {
        Ok(Self {
            degrees: validate_range(range, "rotation degrees")?,
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Whether ground-truth channels are rotated too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }
}

impl SampleTransform for RandomRotation {
    fn name(&self) -> &'static str {
        "RandomRotation"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let angle = lock_rng(&self.rng).gen_range(self.degrees.0..=self.degrees.1);

        for image in &mut sample.input {
            let plane = as_plane(image.to_f32(), self.name())?;
            *image = Image::F32(warp::rotate(&plane, angle)?.into_dyn());
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    let plane = as_plane(channel.to_f32(), self.name())?;
                    *channel = Image::F32(warp::rotate(&plane, angle)?.into_dyn());
                }
            }
        }
        Ok(sample)
    }
}

/// Rotate a 3D volume slice-wise along one axis by a shared sampled angle.
pub struct RandomRotation3D {
    degrees: (f32, f32),
    axis: usize,
    labeled: bool,
    rng: Mutex<ChaCha8Rng>,
}

impl RandomRotation3D {
    /// Sample angles uniformly from `(-degrees, degrees)` and rotate the
    /// planes perpendicular to `axis`.
    pub fn new(degrees: f32, axis: usize) -> Result<Self> {
        if axis > 2 {
            return Err(Error::InvalidAxis { axis });
        }
        Ok(Self {
            degrees: symmetric_range(degrees, "rotation degrees")?,
            axis,
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Whether ground-truth channels are rotated too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }

    fn rotate_volume(&self, data: ArrayD<f32>, angle: f32) -> Result<ArrayD<f32>> {
        let volume = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| Error::transform(self.name(), "expected 3D volumes"))?;
        let mut out = ndarray::Array3::<f32>::zeros(volume.dim());
        for i in 0..volume.shape()[self.axis] {
            let plane = volume.index_axis(Axis(self.axis), i).to_owned();
            let rotated = warp::rotate(&plane, angle)?;
            out.index_axis_mut(Axis(self.axis), i).assign(&rotated);
        }
        Ok(out.into_dyn())
    }
}

impl SampleTransform for RandomRotation3D {
    fn name(&self) -> &'static str {
        "RandomRotation3D"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let angle = lock_rng(&self.rng).gen_range(self.degrees.0..=self.degrees.1);

        for image in &mut sample.input {
            *image = Image::F32(self.rotate_volume(image.to_f32(), angle)?);
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    *channel = Image::F32(self.rotate_volume(channel.to_f32(), angle)?);
                }
            }
        }
        Ok(sample)
    }
}

/// Flip each axis of a 3D volume independently with probability one half.
pub struct RandomReverse3D {
    labeled: bool,
    rng: Mutex<ChaCha8Rng>,
}

impl RandomReverse3D {
    pub fn new() -> Self {
        Self {
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        }
    }

    /// Whether ground-truth channels are flipped too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }
}

impl Default for RandomReverse3D {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleTransform for RandomReverse3D {
    fn name(&self) -> &'static str {
        "RandomReverse3D"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let axes: Vec<usize> = {
            let mut rng = lock_rng(&self.rng);
            (0..3).filter(|_| rng.gen_bool(0.5)).collect()
        };
        if axes.is_empty() {
            return Ok(sample);
        }

        for image in &mut sample.input {
            if image.ndim() != 3 {
                return Err(Error::transform(self.name(), "expected 3D volumes"));
            }
            *image = match image {
                Image::F32(a) => Image::F32(flip_array(a, &axes)),
                Image::U8(a) => Image::U8(flip_array(a, &axes)),
            };
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    *channel = match channel {
                        Image::F32(a) => Image::F32(flip_array(a, &axes)),
                        Image::U8(a) => Image::U8(flip_array(a, &axes)),
                    };
                }
            }
        }
        Ok(sample)
    }
}

/// Random affine warp: rotation, translation, isotropic scale and shear
/// sampled independently per call, ground truth binarized after the warp.
pub struct RandomAffine {
    degrees: (f32, f32),
    translate: Option<(f32, f32)>,
    scale: Option<(f32, f32)>,
    shear: Option<(f32, f32)>,
    labeled: bool,
    rng: Mutex<ChaCha8Rng>,
}

impl RandomAffine {
    /// Sample angles uniformly from `(-degrees, degrees)`; translation,
    /// scale and shear stay disabled until configured.
    pub fn new(degrees: f32) -> Result<Self> {
        Ok(Self {
            degrees: symmetric_range(degrees, "affine degrees")?,
            translate: None,
            scale: None,
            shear: None,
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Maximum translation as a fraction of the plane size per axis, each in
    /// `[0, 1]`.
    pub fn translate(mut self, fractions: (f32, f32)) -> Result<Self> {
        for f in [fractions.0, fractions.1] {
            if !(0.0..=1.0).contains(&f) {
                return Err(Error::Configuration(format!(
                    "translation fractions should be between 0 and 1 (got {})",
                    f
                )));
            }
        }
        self.translate = Some(fractions);
        Ok(self)
    }

    /// Scale range with strictly positive bounds.
    pub fn scale(mut self, range: (f32, f32)) -> Result<Self> {
        let range = validate_range(range, "affine scale")?;
        if range.0 <= 0.0 {
            return Err(Error::Configuration(
                "scale values should be positive".to_string(),
            ));
        }
        self.scale = Some(range);
        Ok(self)
    }

    /// Shear sampled from `(-shear, shear)` degrees.
    pub fn shear(mut self, shear: f32) -> Result<Self> {
        self.shear = Some(symmetric_range(shear, "affine shear")?);
        Ok(self)
    }

    /// Whether ground-truth channels are warped too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }
}

impl SampleTransform for RandomAffine {
    fn name(&self) -> &'static str {
        "RandomAffine"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let first = sample
            .input
            .first()
            .ok_or_else(|| Error::transform(self.name(), "sample has no input channels"))?;
        let shape = first.shape();
        if shape.len() != 2 {
            return Err(Error::transform(self.name(), "expected 2D planes"));
        }
        let (h, w) = (shape[0], shape[1]);

        let (angle, translation, scale, shear) = {
            let mut rng = lock_rng(&self.rng);
            let angle = rng.gen_range(self.degrees.0..=self.degrees.1);
            let translation = match self.translate {
                Some((fx, fy)) => {
                    let max_dx = fx * w as f32;
                    let max_dy = fy * h as f32;
                    (
                        rng.gen_range(-max_dx..=max_dx).round(),
                        rng.gen_range(-max_dy..=max_dy).round(),
                    )
                }
                None => (0.0, 0.0),
            };
            let scale = match self.scale {
                Some((lo, hi)) => rng.gen_range(lo..=hi),
                None => 1.0,
            };
            let shear = match self.shear {
                Some((lo, hi)) => rng.gen_range(lo..=hi),
                None => 0.0,
            };
            (angle, translation, scale, shear)
        };

        for image in &mut sample.input {
            let plane = as_plane(image.to_f32(), self.name())?;
            *image = Image::F32(warp::affine_warp(&plane, angle, translation, scale, shear)?.into_dyn());
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    let plane = as_plane(channel.to_f32(), self.name())?;
                    let mut warped = warp::affine_warp(&plane, angle, translation, scale, shear)?;
                    binarize(&mut warped);
                    *channel = Image::F32(warped.into_dyn());
                }
            }
        }
        Ok(sample)
    }
}

/// Elastic deformation by a shared Gaussian-smoothed random displacement
/// field, gated by a per-call application probability.
pub struct ElasticTransform {
    alpha_range: (f32, f32),
    sigma_range: (f32, f32),
    probability: f32,
    labeled: bool,
    rng: Mutex<ChaCha8Rng>,
}

impl ElasticTransform {
    /// Displacement amplitude sampled from `alpha_range`, field smoothness
    /// from `sigma_range`; applied with probability 0.5 by default.
    pub fn new(alpha_range: (f32, f32), sigma_range: (f32, f32)) -> Result<Self> {
        let sigma_range = validate_range(sigma_range, "elastic sigma range")?;
        if sigma_range.0 <= 0.0 {
            return Err(Error::Configuration(
                "elastic sigma values should be positive".to_string(),
            ));
        }
        Ok(Self {
            alpha_range: validate_range(alpha_range, "elastic alpha range")?,
            sigma_range,
            probability: 0.5,
            labeled: true,
            rng: Mutex::new(get_rng(None)),
        })
    }

    /// Per-call application probability in `[0, 1]`.
    pub fn probability(mut self, p: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Configuration(format!(
                "probability must be between 0.0 and 1.0 (got {})",
                p
            )));
        }
        self.probability = p;
        Ok(self)
    }

    /// Whether ground-truth channels are deformed too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    /// Seed the internal generator for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(get_rng(Some(seed)));
        self
    }

    fn displacement_field(
        &self,
        rng: &mut ChaCha8Rng,
        h: usize,
        w: usize,
        alpha: f32,
        sigma: f32,
    ) -> Result<Array2<f32>> {
        let noise: Vec<f32> = (0..h * w).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
        let noise = Array2::from_shape_vec((h, w), noise)
            .map_err(|e| Error::transform(self.name(), e.to_string()))?;
        Ok(warp::gaussian_filter(&noise, sigma)?.mapv_into(|v| v * alpha))
    }
}

impl SampleTransform for ElasticTransform {
    fn name(&self) -> &'static str {
        "ElasticTransform"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let first = sample
            .input
            .first()
            .ok_or_else(|| Error::transform(self.name(), "sample has no input channels"))?;
        let shape = first.shape();
        if shape.len() != 2 {
            return Err(Error::transform(self.name(), "expected 2D planes"));
        }
        let (h, w) = (shape[0], shape[1]);

        let (rows, cols) = {
            let mut rng = lock_rng(&self.rng);
            if rng.gen::<f32>() >= self.probability {
                return Ok(sample);
            }
            let alpha = rng.gen_range(self.alpha_range.0..=self.alpha_range.1);
            let sigma = rng.gen_range(self.sigma_range.0..=self.sigma_range.1);

            // One field for every channel keeps the pair co-registered.
            let drow = self.displacement_field(&mut rng, h, w, alpha, sigma)?;
            let dcol = self.displacement_field(&mut rng, h, w, alpha, sigma)?;
            let rows = Array2::from_shape_fn((h, w), |(r, c)| r as f32 + drow[[r, c]]);
            let cols = Array2::from_shape_fn((h, w), |(r, c)| c as f32 + dcol[[r, c]]);
            (rows, cols)
        };

        for image in &mut sample.input {
            let plane = as_plane(image.to_f32(), self.name())?;
            *image = Image::F32(warp::map_coordinates(&plane, &rows, &cols)?.into_dyn());
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    let plane = as_plane(channel.to_f32(), self.name())?;
                    let mut warped = warp::map_coordinates(&plane, &rows, &cols)?;
                    binarize(&mut warped);
                    *channel = Image::F32(warped.into_dyn());
                }
            }
        }
        Ok(sample)
    }
}

/// Resample planes to a target physical spacing using the `zooms` metadata.
///
/// Ground truth is re-binarized at 0.5 after interpolation and the region of
/// interest at 0 (any positive response counts).
pub struct Resample {
    wspace: f32,
    hspace: f32,
    labeled: bool,
}

impl Resample {
    /// Target in-plane spacing `(width, height)` in millimetres.
    pub fn new(wspace: f32, hspace: f32) -> Result<Self> {
        for s in [wspace, hspace] {
            if !s.is_finite() || s <= 0.0 {
                return Err(Error::Configuration(format!(
                    "target spacing must be positive and finite (got {})",
                    s
                )));
            }
        }
        Ok(Self {
            wspace,
            hspace,
            labeled: true,
        })
    }

    /// Whether ground-truth channels are resampled too (default true).
    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    fn target_shape(&self, meta: &crate::metadata::SampleMetadata, shape: &[usize]) -> Result<(usize, usize)> {
        let zooms = meta
            .zooms()
            .ok_or_else(|| Error::transform(self.name(), "sample carries no zooms metadata"))?;
        if zooms.len() != 2 {
            return Err(Error::transform(self.name(), "expected in-plane zooms"));
        }
        let (hzoom, wzoom) = (zooms[0], zooms[1]);
        let new_h = ((shape[0] as f32) * (hzoom / self.hspace)) as usize;
        let new_w = ((shape[1] as f32) * (wzoom / self.wspace)) as usize;
        if new_h == 0 || new_w == 0 {
            return Err(Error::transform(self.name(), "resampled shape collapsed to zero"));
        }
        Ok((new_h, new_w))
    }

    fn resample_bin(&self, image: &Image, new_h: usize, new_w: usize, threshold: f32) -> Result<Image> {
        let plane = as_plane(image.to_f32(), self.name())?;
        let mut out = warp::resize_bilinear(&plane, new_h, new_w)?;
        out.mapv_inplace(|v| if v > threshold { 1.0 } else { 0.0 });
        Ok(Image::F32(out.into_dyn()))
    }
}

impl SampleTransform for Resample {
    fn name(&self) -> &'static str {
        "Resample"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let channels = sample.input.len();
        let mut shapes = Vec::with_capacity(channels);
        for i in 0..channels {
            let meta = sample
                .input_metadata
                .get(i)
                .ok_or_else(|| Error::transform(self.name(), "missing input metadata"))?;
            let plane_shape = sample.input[i].shape().to_vec();
            if plane_shape.len() != 2 {
                return Err(Error::transform(self.name(), "expected 2D planes"));
            }
            shapes.push(self.target_shape(meta, &plane_shape)?);
        }

        for (image, &(new_h, new_w)) in sample.input.iter_mut().zip(&shapes) {
            let plane = as_plane(image.to_f32(), self.name())?;
            *image = Image::F32(warp::resize_bilinear(&plane, new_h, new_w)?.into_dyn());
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for (channel, &(new_h, new_w)) in gt.iter_mut().zip(&shapes) {
                    if let Some(image) = channel {
                        *image = self.resample_bin(image, new_h, new_w, 0.5)?;
                    }
                }
            }
        }
        if let Some(roi) = &mut sample.roi {
            for (channel, &(new_h, new_w)) in roi.iter_mut().zip(&shapes) {
                if let Some(image) = channel {
                    *image = self.resample_bin(image, new_h, new_w, 0.0)?;
                }
            }
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetaValue, SampleMetadata, ZOOMS_KEY};
    use ndarray::IxDyn;

    fn plane_sample(h: usize, w: usize, labeled: bool) -> Sample {
        let input = ArrayD::from_shape_fn(IxDyn(&[h, w]), |idx| (idx[0] + idx[1]) as f32 / 8.0);
        let mut sample = Sample::unlabeled(
            vec![Image::F32(input)],
            vec![SampleMetadata::new()],
        );
        if labeled {
            let mut gt = ArrayD::zeros(IxDyn(&[h, w]));
            for r in 2..(h - 2) {
                for c in 2..(w - 2) {
                    gt[[r, c]] = 1.0;
                }
            }
            sample.gt = Some(vec![Some(Image::F32(gt))]);
            sample.gt_metadata = Some(vec![SampleMetadata::new()]);
        }
        sample
    }

    fn volume_sample(shape: [usize; 3]) -> Sample {
        let numel: usize = shape.iter().product();
        let input =
            ArrayD::from_shape_vec(IxDyn(&shape), (0..numel).map(|i| i as f32).collect()).unwrap();
        let mut sample = Sample::unlabeled(
            vec![Image::F32(input.clone())],
            vec![SampleMetadata::new()],
        );
        sample.gt = Some(vec![Some(Image::F32(input.mapv(|v| {
            if v as usize % 2 == 0 {
                1.0
            } else {
                0.0
            }
        })))]);
        sample.gt_metadata = Some(vec![SampleMetadata::new()]);
        sample
    }

    #[test]
    fn test_affine_binarizes_ground_truth() {
        let affine = RandomAffine::new(20.0)
            .unwrap()
            .translate((0.1, 0.1))
            .unwrap()
            .scale((0.9, 1.1))
            .unwrap()
            .shear(5.0)
            .unwrap()
            .seed(7);
        let out = affine.apply(plane_sample(16, 16, true)).unwrap();
        let gt = out.gt.unwrap().remove(0).unwrap().to_f32();
        assert!(gt.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_reverse3d_same_seed_is_self_inverse() {
        let sample = volume_sample([4, 4, 4]);
        let original = sample.input[0].to_f32();

        let once = RandomReverse3D::new().seed(11).apply(sample).unwrap();
        let twice = RandomReverse3D::new().seed(11).apply(once).unwrap();
        assert_eq!(twice.input[0].to_f32(), original);
    }

    #[test]
    fn test_reverse3d_keeps_pair_aligned() {
        let sample = volume_sample([4, 4, 4]);
        let out = RandomReverse3D::new().seed(3).apply(sample).unwrap();
        let input_after = out.input[0].to_f32();
        let gt_after = out.gt.unwrap().remove(0).unwrap().to_f32();

        // The mask was built as the parity of the input voxel value, so the
        // alignment survives any combination of flips.
        for (&v, &g) in input_after.iter().zip(gt_after.iter()) {
            let expected = if (v as usize) % 2 == 0 { 1.0 } else { 0.0 };
            assert_eq!(g, expected);
        }
    }

    #[test]
    fn test_elastic_probability_zero_is_identity() {
        let elastic = ElasticTransform::new((10.0, 20.0), (3.0, 4.0))
            .unwrap()
            .probability(0.0)
            .unwrap()
            .seed(5);
        let sample = plane_sample(12, 12, true);
        let before = sample.input[0].to_f32();
        let out = elastic.apply(sample).unwrap();
        assert_eq!(out.input[0].to_f32(), before);
    }

    #[test]
    fn test_elastic_binarizes_ground_truth() {
        let elastic = ElasticTransform::new((15.0, 15.0), (3.0, 3.0))
            .unwrap()
            .probability(1.0)
            .unwrap()
            .seed(5);
        let out = elastic.apply(plane_sample(16, 16, true)).unwrap();
        let gt = out.gt.unwrap().remove(0).unwrap().to_f32();
        assert!(gt.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_rotation3d_zero_degrees_is_identity() {
        let rotation = RandomRotation3D::new(0.0, 0).unwrap().seed(1);
        let sample = volume_sample([3, 5, 5]);
        let before = sample.input[0].to_f32();
        let out = rotation.apply(sample).unwrap();
        let after = out.input[0].to_f32();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotation_rejects_negative_degrees() {
        assert!(RandomRotation::new(-5.0).is_err());
        assert!(RandomRotation::from_range((10.0, -10.0)).is_err());
    }

    #[test]
    fn test_resample_scales_by_spacing_ratio() {
        let mut sample = plane_sample(8, 8, true);
        sample.input_metadata[0].insert(ZOOMS_KEY, MetaValue::Spacing(vec![2.0, 2.0]));

        // 2 mm voxels resampled to 1 mm double the plane.
        let resample = Resample::new(1.0, 1.0).unwrap();
        let out = resample.apply(sample).unwrap();
        assert_eq!(out.input[0].shape(), &[16, 16]);
        let gt = out.gt.unwrap().remove(0).unwrap().to_f32();
        assert_eq!(gt.shape(), &[16, 16]);
        assert!(gt.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_resample_requires_zooms() {
        let resample = Resample::new(1.0, 1.0).unwrap();
        assert!(resample.apply(plane_sample(8, 8, false)).is_err());
    }
}
