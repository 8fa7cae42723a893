//! Sample transforms and pipeline composition.
//!
//! A transform receives the whole [`Sample`] by value and returns a new one,
//! so every metadata change is an explicit insert on the owned record. Crop
//! transforms additionally implement [`SampleTransform::invert`] and
//! advertise it through [`SampleTransform::invertible`]; transforms that
//! always produce a fixed spatial size advertise that through
//! [`SampleTransform::fixed_output_shape`] so index builders can query it
//! without inspecting concrete types.

mod convert;
mod crop;
mod intensity;
mod spatial;
pub(crate) mod warp;

pub use convert::ToTensor;
pub use crop::{CenterCrop2D, CenterCrop3D, ROICrop2D};
pub use intensity::{
    AdditiveGaussianNoise, HistogramClipping, Normalize, NormalizeInstance, RandomChannelShift,
};
pub use spatial::{
    ElasticTransform, RandomAffine, RandomReverse3D, RandomRotation, RandomRotation3D, Resample,
};

use crate::error::{Error, Result};
use crate::sample::Sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Random number generator with optional seeding for reproducibility.
pub(crate) fn get_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// A single stage of the sample pipeline.
pub trait SampleTransform: Send + Sync {
    /// Short name for diagnostics and error messages.
    fn name(&self) -> &'static str;

    /// Apply the transform, consuming and returning the sample.
    fn apply(&self, sample: Sample) -> Result<Sample>;

    /// Whether [`SampleTransform::invert`] is implemented.
    fn invertible(&self) -> bool {
        false
    }

    /// Undo a previously applied transform using state recorded on the
    /// sample's metadata.
    fn invert(&self, sample: Sample) -> Result<Sample> {
        let _ = sample;
        Err(Error::transform(
            self.name(),
            "no inverse defined for this transform",
        ))
    }

    /// The fixed spatial size this transform always produces, when it has
    /// one (crop-type stages).
    fn fixed_output_shape(&self) -> Option<Vec<usize>> {
        None
    }
}

/// A sequential chain of transforms applied in order.
#[derive(Clone, Default)]
pub struct Compose {
    stages: Vec<Arc<dyn SampleTransform>>,
}

impl Compose {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage, consuming and returning the pipeline for chaining.
    pub fn add<T: SampleTransform + 'static>(mut self, stage: T) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Build from already-shared stages.
    pub fn from_stages(stages: Vec<Arc<dyn SampleTransform>>) -> Self {
        Self { stages }
    }

    /// The configured stages, in application order.
    pub fn stages(&self) -> &[Arc<dyn SampleTransform>] {
        &self.stages
    }
}

impl SampleTransform for Compose {
    fn name(&self) -> &'static str {
        "Compose"
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        self.stages
            .iter()
            .try_fold(sample, |sample, stage| stage.apply(sample))
    }

    fn invertible(&self) -> bool {
        self.stages.iter().any(|stage| stage.invertible())
    }

    /// Undo the invertible stages in reverse application order.
    fn invert(&self, sample: Sample) -> Result<Sample> {
        self.stages
            .iter()
            .rev()
            .filter(|stage| stage.invertible())
            .try_fold(sample, |sample, stage| stage.invert(sample))
    }

    fn fixed_output_shape(&self) -> Option<Vec<usize>> {
        self.stages
            .iter()
            .find_map(|stage| stage.fixed_output_shape())
    }
}

/// Adapter whose forward pass undoes a previously applied pipeline.
#[derive(Clone)]
pub struct UndoCompose {
    inner: Arc<Compose>,
}

impl UndoCompose {
    /// Wrap a pipeline whose invertible stages should be undone.
    pub fn new(inner: Arc<Compose>) -> Self {
        Self { inner }
    }
}

impl SampleTransform for UndoCompose {
    fn name(&self) -> &'static str {
        "UndoCompose"
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        self.inner.invert(sample)
    }
}
