//! Co-registered volume pairs.
//!
//! A [`VolumePair`] owns the input-channel volumes of one subject together
//! with optional per-channel ground-truth volumes and per-channel metadata.
//! Shape agreement across every present channel is validated once at
//! construction; extraction then yields either full volumes or single 2D
//! planes with consistent metadata.

use crate::error::{Error, Result};
use crate::metadata::{MetaValue, SampleMetadata, DATA_SHAPE_KEY, GT_SOURCES_KEY, INPUT_SOURCES_KEY, SLICE_INDEX_KEY, ZOOMS_KEY};
use crate::volume::{VolumeHandle, VolumeSource};
use ndarray::{ArrayD, Axis, IxDyn};
use std::sync::{Arc, RwLock};

/// One 2D plane per channel extracted from a pair, plus metadata.
#[derive(Debug)]
pub struct PairSlice {
    /// Input planes, one per modality.
    pub input: Vec<ArrayD<f32>>,
    /// Ground-truth planes; `None` when the pair is unlabeled, per-channel
    /// `None` when that single channel has no ground truth.
    pub gt: Option<Vec<Option<ArrayD<f32>>>>,
    /// Per-channel input metadata (spacing and in-plane shape, merged with
    /// any externally supplied record).
    pub input_metadata: Vec<SampleMetadata>,
    /// Per-channel ground-truth metadata; empty records mark missing
    /// channels.
    pub gt_metadata: Option<Vec<SampleMetadata>>,
}

/// A set of co-registered volumes for one subject.
pub struct VolumePair {
    inputs: Vec<VolumeHandle>,
    ground_truths: Option<Vec<Option<VolumeHandle>>>,
    metadata: Option<RwLock<Vec<SampleMetadata>>>,
}

impl VolumePair {
    /// Build a pair from input sources and parallel nullable ground-truth
    /// sources.
    ///
    /// `cache` memoizes decoded voxel data inside each volume handle;
    /// `canonical` reorients every channel to the canonical axis order
    /// before any shape check.
    ///
    /// Fails with [`Error::InvalidDimensions`] for volumes above three
    /// dimensions and [`Error::ShapeMismatch`] when input and ground-truth
    /// shapes disagree.
    pub fn new(
        inputs: Vec<Arc<dyn VolumeSource>>,
        ground_truths: Option<Vec<Option<Arc<dyn VolumeSource>>>>,
        metadata: Option<Vec<SampleMetadata>>,
        cache: bool,
        canonical: bool,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::Configuration(
                "at least one input volume is required".to_string(),
            ));
        }

        let input_handles: Vec<VolumeHandle> = inputs
            .iter()
            .map(|source| VolumeHandle::new(source.clone(), cache, canonical))
            .collect();

        for handle in &input_handles {
            if handle.ndim() > 3 {
                return Err(Error::InvalidDimensions(format!(
                    "{}-dimensional volumes not supported",
                    handle.ndim()
                )));
            }
        }

        let gt_handles = match ground_truths {
            Some(sources) => {
                if sources.len() != input_handles.len() {
                    return Err(Error::Configuration(format!(
                        "{} ground-truth channels supplied for {} input channels",
                        sources.len(),
                        input_handles.len()
                    )));
                }
                Some(
                    sources
                        .iter()
                        .map(|source| {
                            source
                                .as_ref()
                                .map(|s| VolumeHandle::new(s.clone(), cache, canonical))
                        })
                        .collect::<Vec<_>>(),
                )
            }
            None => None,
        };

        let metadata = match metadata {
            Some(mut records) => {
                if records.len() != input_handles.len() {
                    return Err(Error::Configuration(format!(
                        "{} metadata records supplied for {} input channels",
                        records.len(),
                        input_handles.len()
                    )));
                }
                let gt_ids: Vec<String> = gt_handles
                    .iter()
                    .flatten()
                    .flatten()
                    .map(|h| h.identifier().to_string())
                    .collect();
                for (record, handle) in records.iter_mut().zip(&input_handles) {
                    record.insert(
                        INPUT_SOURCES_KEY,
                        MetaValue::Text(handle.identifier().to_string()),
                    );
                    if gt_handles.is_some() {
                        record.insert(GT_SOURCES_KEY, MetaValue::TextList(gt_ids.clone()));
                    }
                }
                Some(RwLock::new(records))
            }
            None => None,
        };

        let pair = Self {
            inputs: input_handles,
            ground_truths: gt_handles,
            metadata,
        };
        pair.shapes()?;
        Ok(pair)
    }

    /// Number of input channels.
    pub fn channels(&self) -> usize {
        self.inputs.len()
    }

    /// Whether any ground-truth channel was supplied.
    pub fn is_labeled(&self) -> bool {
        self.ground_truths
            .as_ref()
            .is_some_and(|gts| gts.iter().any(Option::is_some))
    }

    /// Input volume handles, one per channel.
    pub fn input_handles(&self) -> &[VolumeHandle] {
        &self.inputs
    }

    /// A snapshot of the stored per-channel metadata, if any.
    pub fn metadata_snapshot(&self) -> Option<Vec<SampleMetadata>> {
        self.metadata
            .as_ref()
            .and_then(|stored| stored.read().ok().map(|records| records.clone()))
    }

    /// The `(input shape, ground-truth shape)` of the pair, validating that
    /// all input channels agree on one shape and all present ground-truth
    /// channels agree on one shape.
    pub fn shapes(&self) -> Result<(Vec<usize>, Option<Vec<usize>>)> {
        let input_shape = self.inputs[0].shape();
        for handle in &self.inputs[1..] {
            if handle.shape() != input_shape {
                return Err(Error::ShapeMismatch(format!(
                    "inputs have different dimensions ({:?} vs {:?})",
                    input_shape,
                    handle.shape()
                )));
            }
        }

        let mut gt_shape = None;
        if let Some(gts) = &self.ground_truths {
            for handle in gts.iter().flatten() {
                let shape = handle.shape();
                match &gt_shape {
                    None => gt_shape = Some(shape),
                    Some(first) => {
                        if *first != shape {
                            return Err(Error::ShapeMismatch(format!(
                                "labels have different dimensions ({:?} vs {:?})",
                                first, shape
                            )));
                        }
                    }
                }
            }
            if let Some(shape) = &gt_shape {
                if *shape != input_shape {
                    return Err(Error::ShapeMismatch(format!(
                        "input and ground truth with different dimensions ({:?} vs {:?})",
                        input_shape, shape
                    )));
                }
            }
        }

        Ok((input_shape, gt_shape))
    }

    /// Decoded arrays for every channel.
    ///
    /// Ground-truth channels without data are replaced by zero-filled
    /// volumes of the input shape so downstream code can index positionally;
    /// when no ground truth was supplied at all the second element is
    /// `None`.
    pub fn full_data(&self) -> Result<(Vec<ArrayD<f32>>, Option<Vec<ArrayD<f32>>>)> {
        let input_data = self
            .inputs
            .iter()
            .map(|handle| handle.data().map(|arc| arc.as_ref().clone()))
            .collect::<Result<Vec<_>>>()?;

        let gt_data = match &self.ground_truths {
            None => None,
            Some(gts) => {
                let zero_shape = input_data[0].shape().to_vec();
                Some(
                    gts.iter()
                        .map(|gt| match gt {
                            Some(handle) => handle.data().map(|arc| arc.as_ref().clone()),
                            None => Ok(ArrayD::zeros(IxDyn(&zero_shape))),
                        })
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        };

        Ok((input_data, gt_data))
    }

    /// Extract the 2D plane at `slice_index` along `slice_axis` from every
    /// channel.
    ///
    /// Each returned input metadata record carries the in-plane spacing and
    /// shape of its channel; ground-truth records additionally carry the
    /// ground-truth source identifiers. When the pair was built with
    /// external metadata, every call stamps `slice_index` on the stored
    /// records and merges their keys into the returned input metadata. The
    /// write to the stored records is a documented side effect of this
    /// method.
    pub fn slice_at(&self, slice_index: usize, slice_axis: usize) -> Result<PairSlice> {
        if slice_axis > 2 {
            return Err(Error::InvalidAxis { axis: slice_axis });
        }
        let (input_shape, _) = self.shapes()?;
        if slice_axis >= input_shape.len() || slice_index >= input_shape[slice_axis] {
            return Err(Error::Configuration(format!(
                "slice {} out of range for axis {} with extent {}",
                slice_index,
                slice_axis,
                input_shape.get(slice_axis).copied().unwrap_or(0)
            )));
        }
        let plane_axes: Vec<usize> = (0..input_shape.len()).filter(|&a| a != slice_axis).collect();

        let mut input_planes = Vec::with_capacity(self.inputs.len());
        let mut input_metadata = Vec::with_capacity(self.inputs.len());
        for handle in &self.inputs {
            let data = handle.data()?;
            input_planes.push(data.index_axis(Axis(slice_axis), slice_index).to_owned());

            let spacing = handle.spacing();
            let shape = handle.shape();
            let mut record = SampleMetadata::new();
            record.insert(
                ZOOMS_KEY,
                MetaValue::Spacing(plane_axes.iter().map(|&a| spacing[a]).collect()),
            );
            record.insert(
                DATA_SHAPE_KEY,
                MetaValue::Shape(plane_axes.iter().map(|&a| shape[a]).collect()),
            );
            input_metadata.push(record);
        }

        let (gt_planes, gt_metadata) = match &self.ground_truths {
            None => (None, None),
            Some(gts) => {
                let gt_ids: Vec<String> = gts
                    .iter()
                    .flatten()
                    .map(|h| h.identifier().to_string())
                    .collect();
                let mut planes = Vec::with_capacity(gts.len());
                let mut records = Vec::with_capacity(gts.len());
                for gt in gts {
                    match gt {
                        Some(handle) => {
                            let data = handle.data()?;
                            planes.push(Some(
                                data.index_axis(Axis(slice_axis), slice_index).to_owned(),
                            ));

                            let spacing = handle.spacing();
                            let shape = handle.shape();
                            let mut record = SampleMetadata::new();
                            record.insert(
                                ZOOMS_KEY,
                                MetaValue::Spacing(
                                    plane_axes.iter().map(|&a| spacing[a]).collect(),
                                ),
                            );
                            record.insert(
                                DATA_SHAPE_KEY,
                                MetaValue::Shape(plane_axes.iter().map(|&a| shape[a]).collect()),
                            );
                            record.insert(GT_SOURCES_KEY, MetaValue::TextList(gt_ids.clone()));
                            records.push(record);
                        }
                        None => {
                            planes.push(None);
                            records.push(SampleMetadata::new());
                        }
                    }
                }
                (Some(planes), Some(records))
            }
        };

        if let Some(stored) = &self.metadata {
            if let Ok(mut records) = stored.write() {
                for (idx, record) in records.iter_mut().enumerate() {
                    record.insert(SLICE_INDEX_KEY, MetaValue::Index(slice_index));
                    input_metadata[idx].merge_from(record);
                }
            }
        }

        Ok(PairSlice {
            input: input_planes,
            gt: gt_planes,
            input_metadata,
            gt_metadata,
        })
    }
}
