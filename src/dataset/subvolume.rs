//! 3D whole-volume and subvolume datasets.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::metadata::{MetaValue, SampleMetadata, DATA_SHAPE_KEY, ZOOMS_KEY};
use crate::pair::VolumePair;
use crate::sample::{Image, Sample};
use crate::transforms::SampleTransform;
use crate::volume::VolumeSource;
use ndarray::{s, ArrayD, Ix3};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// One subject's worth of sources for the 3D datasets.
pub struct VolumeGroup {
    inputs: Vec<Arc<dyn VolumeSource>>,
    ground_truths: Option<Vec<Option<Arc<dyn VolumeSource>>>>,
    metadata: Option<Vec<SampleMetadata>>,
}

impl VolumeGroup {
    /// A group with input channels only.
    pub fn new(inputs: Vec<Arc<dyn VolumeSource>>) -> Self {
        Self {
            inputs,
            ground_truths: None,
            metadata: None,
        }
    }

    /// Attach per-channel ground-truth sources (entries individually
    /// nullable).
    pub fn ground_truths(mut self, sources: Vec<Option<Arc<dyn VolumeSource>>>) -> Self {
        self.ground_truths = Some(sources);
        self
    }

    /// Attach per-channel metadata records.
    pub fn metadata(mut self, records: Vec<SampleMetadata>) -> Self {
        self.metadata = Some(records);
        self
    }

    fn into_pair(self, cache: bool, canonical: bool) -> Result<VolumePair> {
        VolumePair::new(
            self.inputs,
            self.ground_truths,
            self.metadata,
            cache,
            canonical,
        )
    }
}

/// Materialize one pair's full volumes as a sample, with per-channel
/// spacing and shape metadata attached.
fn volume_sample(pair: &VolumePair) -> Result<Sample> {
    let (input_shape, gt_shape) = pair.shapes()?;
    let (input_data, gt_data) = pair.full_data()?;
    let meta_shape = gt_shape.unwrap_or(input_shape);

    let input_metadata = pair
        .input_handles()
        .iter()
        .map(|handle| {
            let mut record = SampleMetadata::new();
            record.insert(ZOOMS_KEY, MetaValue::Spacing(handle.spacing()));
            record.insert(DATA_SHAPE_KEY, MetaValue::Shape(meta_shape.clone()));
            record
        })
        .collect();

    Ok(Sample {
        input: input_data.into_iter().map(Image::F32).collect(),
        gt: gt_data.map(|channels| {
            channels
                .into_iter()
                .map(|volume| Some(Image::F32(volume)))
                .collect()
        }),
        roi: None,
        input_metadata,
        gt_metadata: None,
        roi_metadata: None,
    })
}

/// A whole-volume 3D segmentation dataset, one sample per subject.
pub struct VolumeDataset {
    handlers: Vec<VolumePair>,
    transform: RwLock<Option<Arc<dyn SampleTransform>>>,
}

impl VolumeDataset {
    /// Build the dataset, constructing one volume pair per group.
    pub fn new(
        groups: Vec<VolumeGroup>,
        cache: bool,
        canonical: bool,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::Configuration(
                "at least one volume group is required".to_string(),
            ));
        }
        let handlers = groups
            .into_iter()
            .map(|group| group.into_pair(cache, canonical))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            handlers,
            transform: RwLock::new(transform),
        })
    }

    /// Replace the active transform pipeline.
    pub fn set_transform(&self, transform: Option<Arc<dyn SampleTransform>>) {
        if let Ok(mut slot) = self.transform.write() {
            *slot = transform;
        }
    }

    fn transform(&self) -> Option<Arc<dyn SampleTransform>> {
        self.transform.read().ok().and_then(|slot| slot.clone())
    }
}

impl Dataset for VolumeDataset {
    fn len(&self) -> usize {
        self.handlers.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let pair = self.handlers.get(index).ok_or_else(|| {
            Error::Configuration(format!(
                "sample index {} out of range for dataset of length {}",
                index,
                self.handlers.len()
            ))
        })?;
        let sample = volume_sample(pair)?;
        match self.transform() {
            Some(transform) => transform.apply(sample),
            None => Ok(sample),
        }
    }
}

/// Core size and halo padding of the subvolume tiling.
///
/// Each extracted window spans `length + 2 * padding` voxels per axis;
/// adjacent windows share their halo but never their core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubvolumeConfig {
    /// Non-overlapping core size per axis.
    pub length: [usize; 3],
    /// Context voxels carried on every side of the core.
    pub padding: usize,
}

impl Default for SubvolumeConfig {
    fn default() -> Self {
        Self {
            length: [64, 64, 64],
            padding: 0,
        }
    }
}

/// Half-open window bounds per axis plus the owning pair.
#[derive(Debug, Clone, Copy)]
struct SubvolumeEntry {
    bounds: [(usize, usize); 3],
    handler: usize,
}

/// A 3D dataset of overlapping subvolumes tiled over whole volumes.
///
/// Construction validates, per volume and axis, that
/// `(shape - 2 * padding)` is a multiple of the core length and that the
/// shape is a multiple of 16; violations are fatal configuration errors
/// rather than partial tiles. When the transform pipeline contains a stage
/// with a fixed output shape (a 3D center crop), the validation runs
/// against that shape instead of the raw volume shape.
pub struct SubvolumeDataset {
    handlers: Vec<VolumePair>,
    entries: Vec<SubvolumeEntry>,
    config: SubvolumeConfig,
    transform: RwLock<Option<Arc<dyn SampleTransform>>>,
}

impl SubvolumeDataset {
    /// Build the tiling index over every group.
    pub fn new(
        groups: Vec<VolumeGroup>,
        config: SubvolumeConfig,
        cache: bool,
        canonical: bool,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::Configuration(
                "at least one volume group is required".to_string(),
            ));
        }
        if config.length.contains(&0) {
            return Err(Error::Configuration(
                "subvolume core length must be positive on every axis".to_string(),
            ));
        }

        let crop_shape = match transform.as_ref().and_then(|t| t.fixed_output_shape()) {
            Some(shape) if shape.len() == 3 => Some(shape),
            Some(shape) => {
                return Err(Error::Configuration(format!(
                    "crop stage declares a {}-dimensional output shape for a 3D tiling",
                    shape.len()
                )))
            }
            None => None,
        };

        let handlers = groups
            .into_iter()
            .map(|group| group.into_pair(cache, canonical))
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::new();
        for (handler, pair) in handlers.iter().enumerate() {
            let (input_shape, _) = pair.shapes()?;
            if input_shape.len() != 3 {
                return Err(Error::Configuration(format!(
                    "subvolume tiling requires 3-dimensional volumes (got shape {:?})",
                    input_shape
                )));
            }
            let shape = crop_shape.clone().unwrap_or(input_shape);

            let padding = config.padding;
            for axis in 0..3 {
                let extent = shape[axis];
                if extent < 2 * padding
                    || (extent - 2 * padding) % config.length[axis] != 0
                    || extent % 16 != 0
                {
                    return Err(Error::Configuration(
                        "input shape of each dimension should be a multiple of length plus \
                         2 * padding and a multiple of 16"
                            .to_string(),
                    ));
                }
            }

            for x in ((config.length[0] + padding)..=(shape[0] - padding))
                .step_by(config.length[0])
            {
                for y in ((config.length[1] + padding)..=(shape[1] - padding))
                    .step_by(config.length[1])
                {
                    for z in ((config.length[2] + padding)..=(shape[2] - padding))
                        .step_by(config.length[2])
                    {
                        entries.push(SubvolumeEntry {
                            bounds: [
                                (x - config.length[0] - padding, x + padding),
                                (y - config.length[1] - padding, y + padding),
                                (z - config.length[2] - padding, z + padding),
                            ],
                            handler,
                        });
                    }
                }
            }
        }

        debug!(
            volumes = handlers.len(),
            subvolumes = entries.len(),
            ?config,
            "built subvolume index"
        );

        Ok(Self {
            handlers,
            entries,
            config,
            transform: RwLock::new(transform),
        })
    }

    /// The configured core size and padding.
    pub fn config(&self) -> SubvolumeConfig {
        self.config
    }

    /// Replace the active transform pipeline.
    pub fn set_transform(&self, transform: Option<Arc<dyn SampleTransform>>) {
        if let Ok(mut slot) = self.transform.write() {
            *slot = transform;
        }
    }

    fn transform(&self) -> Option<Arc<dyn SampleTransform>> {
        self.transform.read().ok().and_then(|slot| slot.clone())
    }

    fn window(&self, data: &ArrayD<f32>, bounds: &[(usize, usize); 3]) -> Result<ArrayD<f32>> {
        let view = data
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| Error::Configuration("subvolume extraction expects 3D data".to_string()))?;
        for (axis, &(start, end)) in bounds.iter().enumerate() {
            if end > view.shape()[axis] {
                return Err(Error::Configuration(format!(
                    "subvolume window {}..{} exceeds volume extent {} on axis {}",
                    start,
                    end,
                    view.shape()[axis],
                    axis
                )));
            }
        }
        Ok(view
            .slice(s![
                bounds[0].0..bounds[0].1,
                bounds[1].0..bounds[1].1,
                bounds[2].0..bounds[2].1
            ])
            .to_owned()
            .into_dyn())
    }
}

impl Dataset for SubvolumeDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let entry = self.entries.get(index).ok_or_else(|| {
            Error::Configuration(format!(
                "sample index {} out of range for dataset of length {}",
                index,
                self.entries.len()
            ))
        })?;
        let pair = &self.handlers[entry.handler];
        let mut sample = volume_sample(pair)?;

        for image in &mut sample.input {
            *image = Image::F32(self.window(&image.to_f32(), &entry.bounds)?);
        }
        if let Some(gt) = &mut sample.gt {
            for channel in gt.iter_mut().flatten() {
                *channel = Image::F32(self.window(&channel.to_f32(), &entry.bounds)?);
            }
        }

        match self.transform() {
            Some(transform) => transform.apply(sample),
            None => Ok(sample),
        }
    }
}
