//! 2D slice-wise segmentation dataset.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::metadata::SampleMetadata;
use crate::pair::{PairSlice, VolumePair};
use crate::sample::{Image, Sample};
use crate::transforms::{SampleTransform, ToTensor};
use crate::volume::VolumeSource;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Per-slice inclusion predicate, given the fully materialized ground-truth
/// slice sample. Returning `false` excludes the slice permanently.
pub type SliceFilter = Arc<dyn Fn(&Sample) -> bool + Send + Sync>;

/// One subject's worth of sources for the 2D dataset.
pub struct SliceGroup {
    inputs: Vec<Arc<dyn VolumeSource>>,
    ground_truths: Option<Vec<Option<Arc<dyn VolumeSource>>>>,
    rois: Option<Vec<Option<Arc<dyn VolumeSource>>>>,
    metadata: Option<Vec<SampleMetadata>>,
}

impl SliceGroup {
    /// A group with input channels only (inference-time data).
    pub fn new(inputs: Vec<Arc<dyn VolumeSource>>) -> Self {
        Self {
            inputs,
            ground_truths: None,
            rois: None,
            metadata: None,
        }
    }

    /// Attach per-channel ground-truth sources (entries individually
    /// nullable).
    pub fn ground_truths(mut self, sources: Vec<Option<Arc<dyn VolumeSource>>>) -> Self {
        self.ground_truths = Some(sources);
        self
    }

    /// Attach per-channel region-of-interest sources.
    pub fn rois(mut self, sources: Vec<Option<Arc<dyn VolumeSource>>>) -> Self {
        self.rois = Some(sources);
        self
    }

    /// Attach per-channel metadata records.
    pub fn metadata(mut self, records: Vec<SampleMetadata>) -> Self {
        self.metadata = Some(records);
        self
    }
}

/// Builder for [`SliceDataset`].
pub struct SliceDatasetBuilder {
    groups: Vec<SliceGroup>,
    slice_axis: usize,
    cache: bool,
    canonical: bool,
    transform: Option<Arc<dyn SampleTransform>>,
    filter: Option<SliceFilter>,
}

impl SliceDatasetBuilder {
    /// Axis to slice along (default 2, axial).
    pub fn slice_axis(mut self, axis: usize) -> Self {
        self.slice_axis = axis;
        self
    }

    /// Whether decoded volumes are memoized (default true).
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Whether volumes are reoriented to the canonical axis order
    /// (default false).
    pub fn canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    /// Transform pipeline applied to every materialized sample.
    pub fn transform(mut self, transform: Arc<dyn SampleTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Per-slice inclusion predicate.
    pub fn filter(mut self, filter: SliceFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Validate the groups and enumerate every surviving slice position.
    pub fn build(self) -> Result<SliceDataset> {
        if self.groups.is_empty() {
            return Err(Error::Configuration(
                "at least one volume group is required".to_string(),
            ));
        }
        if self.slice_axis > 2 {
            return Err(Error::InvalidAxis {
                axis: self.slice_axis,
            });
        }
        let n_channels = self.groups[0].inputs.len();

        let mut seg_pairs = Vec::with_capacity(self.groups.len());
        let mut roi_pairs = Vec::with_capacity(self.groups.len());
        let mut entries = Vec::new();
        let mut excluded = 0usize;

        for group in self.groups {
            let roi_pair = VolumePair::new(
                group.inputs.clone(),
                group.rois,
                group.metadata.clone(),
                self.cache,
                self.canonical,
            )?;
            let seg_pair = VolumePair::new(
                group.inputs,
                group.ground_truths,
                group.metadata,
                self.cache,
                self.canonical,
            )?;

            let (input_shape, _) = seg_pair.shapes()?;
            if input_shape.len() != 3 {
                return Err(Error::Configuration(format!(
                    "slice indexing requires 3-dimensional volumes (got shape {:?})",
                    input_shape
                )));
            }

            let pair_index = seg_pairs.len();
            for position in 0..input_shape[self.slice_axis] {
                if let Some(filter) = &self.filter {
                    let candidate =
                        raw_sample(seg_pair.slice_at(position, self.slice_axis)?);
                    if !filter(&candidate) {
                        excluded += 1;
                        continue;
                    }
                }
                entries.push((pair_index, position));
            }

            seg_pairs.push(seg_pair);
            roi_pairs.push(roi_pair);
        }

        debug!(
            groups = seg_pairs.len(),
            slices = entries.len(),
            excluded,
            axis = self.slice_axis,
            "built 2D slice index"
        );

        Ok(SliceDataset {
            seg_pairs,
            roi_pairs,
            entries,
            slice_axis: self.slice_axis,
            n_channels,
            transform: RwLock::new(self.transform),
        })
    }
}

/// Build the unquantized sample handed to the slice filter.
fn raw_sample(slice: PairSlice) -> Sample {
    Sample {
        input: slice.input.into_iter().map(Image::F32).collect(),
        gt: slice
            .gt
            .map(|channels| channels.into_iter().map(|c| c.map(Image::F32)).collect()),
        roi: None,
        input_metadata: slice.input_metadata,
        gt_metadata: slice.gt_metadata,
        roi_metadata: None,
    }
}

/// Quantize mask planes to 8 bits, keeping per-channel absence markers.
fn mask_channels(channels: Option<Vec<Option<ndarray::ArrayD<f32>>>>) -> Option<Vec<Option<Image>>> {
    channels.map(|planes| {
        planes
            .into_iter()
            .map(|plane| plane.map(Image::from_mask))
            .collect()
    })
}

/// A slice-wise 2D segmentation dataset over a collection of volume groups.
///
/// Every group contributes one ground-truth pair and one region-of-interest
/// pair; the index enumerates each surviving `(pair, slice position)` along
/// the configured axis.
pub struct SliceDataset {
    seg_pairs: Vec<VolumePair>,
    roi_pairs: Vec<VolumePair>,
    entries: Vec<(usize, usize)>,
    slice_axis: usize,
    n_channels: usize,
    transform: RwLock<Option<Arc<dyn SampleTransform>>>,
}

impl SliceDataset {
    /// Start building a dataset from subject groups.
    pub fn builder(groups: Vec<SliceGroup>) -> SliceDatasetBuilder {
        SliceDatasetBuilder {
            groups,
            slice_axis: 2,
            cache: true,
            canonical: false,
            transform: None,
            filter: None,
        }
    }

    /// Number of input channels per sample.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// The axis slices are taken along.
    pub fn slice_axis(&self) -> usize {
        self.slice_axis
    }

    /// Replace the active transform pipeline.
    pub fn set_transform(&self, transform: Option<Arc<dyn SampleTransform>>) {
        if let Ok(mut slot) = self.transform.write() {
            *slot = transform;
        }
    }

    /// The active transform pipeline.
    pub fn transform(&self) -> Option<Arc<dyn SampleTransform>> {
        self.transform.read().ok().and_then(|slot| slot.clone())
    }

    /// Per-channel mean and standard deviation over the entire collection.
    ///
    /// Streams every sample twice (mean, then variance) with the active
    /// transform temporarily replaced by the canonical [`ToTensor`]
    /// conversion so the statistics describe unaugmented intensities. The
    /// previous transform is restored on every exit path, including errors.
    pub fn compute_mean_std(&self) -> Result<(Vec<f32>, Vec<f32>)> {
        if self.entries.is_empty() {
            return Err(Error::Configuration(
                "cannot compute statistics of an empty dataset".to_string(),
            ));
        }
        let _override = TransformOverride::new(&self.transform, Arc::new(ToTensor::new()));

        let n = self.n_channels;
        let mut sums = vec![0.0f64; n];
        let mut counts = vec![0u64; n];
        for index in 0..self.len() {
            let sample = self.get(index)?;
            for (channel, image) in sample.input.iter().enumerate().take(n) {
                let data = image.to_f32();
                sums[channel] += data.iter().map(|&v| f64::from(v)).sum::<f64>();
                counts[channel] += data.len() as u64;
            }
        }
        let means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| s / c.max(1) as f64)
            .collect();
        debug!(?means, "dataset mean pass complete");

        let mut var_sums = vec![0.0f64; n];
        for index in 0..self.len() {
            let sample = self.get(index)?;
            for (channel, image) in sample.input.iter().enumerate().take(n) {
                let data = image.to_f32();
                var_sums[channel] += data
                    .iter()
                    .map(|&v| (f64::from(v) - means[channel]).powi(2))
                    .sum::<f64>();
            }
        }
        let stds: Vec<f32> = var_sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| (s / c.max(1) as f64).sqrt() as f32)
            .collect();
        debug!(?stds, "dataset standard-deviation pass complete");

        Ok((means.into_iter().map(|m| m as f32).collect(), stds))
    }
}

impl Dataset for SliceDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let &(pair_index, position) = self.entries.get(index).ok_or_else(|| {
            Error::Configuration(format!(
                "sample index {} out of range for dataset of length {}",
                index,
                self.entries.len()
            ))
        })?;

        let seg = self.seg_pairs[pair_index].slice_at(position, self.slice_axis)?;
        let roi = self.roi_pairs[pair_index].slice_at(position, self.slice_axis)?;

        let sample = Sample {
            input: seg.input.into_iter().map(Image::F32).collect(),
            gt: mask_channels(seg.gt),
            roi: mask_channels(roi.gt),
            input_metadata: seg.input_metadata,
            gt_metadata: seg.gt_metadata,
            roi_metadata: roi.gt_metadata,
        };

        match self.transform() {
            Some(transform) => transform.apply(sample),
            None => Ok(sample),
        }
    }
}

/// Drop guard that swaps the dataset's transform slot and restores the
/// previous value on every exit path.
struct TransformOverride<'a> {
    slot: &'a RwLock<Option<Arc<dyn SampleTransform>>>,
    saved: Option<Option<Arc<dyn SampleTransform>>>,
}

impl<'a> TransformOverride<'a> {
    fn new(
        slot: &'a RwLock<Option<Arc<dyn SampleTransform>>>,
        replacement: Arc<dyn SampleTransform>,
    ) -> Self {
        let saved = slot
            .write()
            .ok()
            .map(|mut guard| std::mem::replace(&mut *guard, Some(replacement)));
        Self { slot, saved }
    }
}

impl Drop for TransformOverride<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Ok(mut guard) = self.slot.write() {
                *guard = saved;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Image;
    use crate::volume::ArrayVolume;
    use ndarray::{ArrayD, IxDyn};

    fn source(id: &str, shape: &[usize], fill: impl Fn(usize) -> f32) -> Arc<dyn VolumeSource> {
        let numel: usize = shape.iter().product();
        let data = ArrayD::from_shape_vec(IxDyn(shape), (0..numel).map(fill).collect()).unwrap();
        Arc::new(ArrayVolume::new(id, data, vec![1.0; shape.len()]).unwrap())
    }

    fn labeled_group(shape: &[usize]) -> SliceGroup {
        SliceGroup::new(vec![source("img", shape, |i| i as f32)])
            .ground_truths(vec![Some(source("gt", shape, |i| (i % 2) as f32))])
    }

    #[test]
    fn test_len_counts_every_slice_without_filter() {
        let dataset = SliceDataset::builder(vec![labeled_group(&[4, 4, 5])])
            .slice_axis(2)
            .build()
            .unwrap();
        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn test_filter_excludes_slices() {
        // Ground truth is zero only on slice 0 along axis 2.
        let gt = source("gt", &[2, 2, 3], |i| if i % 3 == 0 { 0.0 } else { 1.0 });
        let group = SliceGroup::new(vec![source("img", &[2, 2, 3], |i| i as f32)])
            .ground_truths(vec![Some(gt)]);

        let filter: SliceFilter = Arc::new(|sample: &Sample| {
            sample
                .gt
                .as_ref()
                .and_then(|gt| gt[0].as_ref())
                .map(|mask| mask.to_f32().iter().any(|&v| v > 0.0))
                .unwrap_or(false)
        });

        let dataset = SliceDataset::builder(vec![group])
            .slice_axis(2)
            .filter(filter)
            .build()
            .unwrap();
        assert!(dataset.len() < 3);
    }

    #[test]
    fn test_get_quantizes_masks() {
        let dataset = SliceDataset::builder(vec![labeled_group(&[4, 4, 2])])
            .build()
            .unwrap();
        let sample = dataset.get(0).unwrap();
        let gt = sample.gt.unwrap().remove(0).unwrap();
        assert!(matches!(gt, Image::U8(_)));
    }

    #[test]
    fn test_mean_std_restores_transform() {
        struct Failing;
        impl SampleTransform for Failing {
            fn name(&self) -> &'static str {
                "Failing"
            }
            fn apply(&self, _sample: Sample) -> Result<Sample> {
                Err(Error::transform("Failing", "always fails"))
            }
        }

        let dataset = SliceDataset::builder(vec![labeled_group(&[2, 2, 2])])
            .build()
            .unwrap();
        let marker: Arc<dyn SampleTransform> = Arc::new(Failing);
        dataset.set_transform(Some(marker.clone()));

        // Statistics bypass the failing transform entirely and still
        // restore it afterwards.
        let (mean, std) = dataset.compute_mean_std().unwrap();
        assert_eq!(mean.len(), 1);
        assert_eq!(std.len(), 1);
        assert!(dataset.transform().is_some());
        assert!(dataset.get(0).is_err());
    }
}
