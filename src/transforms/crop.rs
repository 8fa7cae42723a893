//! Crop transforms and their undo contract.
//!
//! Both 2D crops record `(top, left, original_width, original_height)` on
//! the input and ground-truth metadata under
//! [`crate::metadata::CROP_PARAMS_KEY`]. Their inverse pads the cropped
//! content back onto a zero canvas of the original size, so a forward plus
//! inverse pass restores the shape exactly while border content is lost.

use crate::error::{Error, Result};
use crate::metadata::{CropParams, MetaValue, SampleMetadata, CROP_PARAMS_KEY};
use crate::sample::{Image, Sample};
use crate::transforms::{warp, SampleTransform};
use ndarray::{ArrayD, Ix2, IxDyn};

/// Copy the `[th, tw]` window at `(top, left)` out of a 2D plane; reads
/// outside the canvas yield zero.
fn crop_array<T: Copy + Default>(
    data: &ArrayD<T>,
    top: i64,
    left: i64,
    th: usize,
    tw: usize,
    op: &str,
) -> Result<ArrayD<T>> {
    if data.ndim() != 2 {
        return Err(Error::transform(op, "expected a 2D plane"));
    }
    let (h, w) = (data.shape()[0] as i64, data.shape()[1] as i64);
    let mut out = ArrayD::<T>::default(IxDyn(&[th, tw]));
    for r in 0..th {
        let sr = top + r as i64;
        if sr < 0 || sr >= h {
            continue;
        }
        for c in 0..tw {
            let sc = left + c as i64;
            if sc < 0 || sc >= w {
                continue;
            }
            out[[r, c]] = data[[sr as usize, sc as usize]];
        }
    }
    Ok(out)
}

/// Place a cropped plane back onto a zero canvas of the recorded original
/// size.
fn pad_array<T: Copy + Default>(data: &ArrayD<T>, params: CropParams, op: &str) -> Result<ArrayD<T>> {
    if data.ndim() != 2 {
        return Err(Error::transform(op, "expected a 2D plane"));
    }
    let (ch, cw) = (data.shape()[0], data.shape()[1]);
    let (height, width) = (params.height as i64, params.width as i64);
    let mut out = ArrayD::<T>::default(IxDyn(&[params.height, params.width]));
    for r in 0..ch {
        let dr = params.top + r as i64;
        if dr < 0 || dr >= height {
            continue;
        }
        for c in 0..cw {
            let dc = params.left + c as i64;
            if dc < 0 || dc >= width {
                continue;
            }
            out[[dr as usize, dc as usize]] = data[[r, c]];
        }
    }
    Ok(out)
}

fn crop_image(image: &Image, top: i64, left: i64, size: [usize; 2], op: &str) -> Result<Image> {
    Ok(match image {
        Image::F32(a) => Image::F32(crop_array(a, top, left, size[0], size[1], op)?),
        Image::U8(a) => Image::U8(crop_array(a, top, left, size[0], size[1], op)?),
    })
}

fn pad_image(image: &Image, params: CropParams, op: &str) -> Result<Image> {
    Ok(match image {
        Image::F32(a) => Image::F32(pad_array(a, params, op)?),
        Image::U8(a) => Image::U8(pad_array(a, params, op)?),
    })
}

/// Crop input and (when labeled) ground-truth channels identically and
/// record the undo parameters on both metadata lists.
fn crop_sample(
    mut sample: Sample,
    top: i64,
    left: i64,
    size: [usize; 2],
    labeled: bool,
    op: &str,
) -> Result<Sample> {
    let first = sample
        .input
        .first()
        .ok_or_else(|| Error::transform(op, "sample has no input channels"))?;
    let shape = first.shape();
    if shape.len() != 2 {
        return Err(Error::transform(op, "expected 2D input planes"));
    }
    let params = CropParams {
        top,
        left,
        width: shape[1],
        height: shape[0],
    };

    for image in &mut sample.input {
        *image = crop_image(image, top, left, size, op)?;
    }
    for record in &mut sample.input_metadata {
        record.insert(CROP_PARAMS_KEY, MetaValue::Crop(params));
    }

    if labeled {
        if let Some(gt) = &mut sample.gt {
            for channel in gt.iter_mut().flatten() {
                *channel = crop_image(channel, top, left, size, op)?;
            }
        }
        if let Some(records) = &mut sample.gt_metadata {
            for record in records.iter_mut() {
                record.insert(CROP_PARAMS_KEY, MetaValue::Crop(params));
            }
        }
    }

    Ok(sample)
}

/// Undo a crop using the parameters recorded by [`crop_sample`].
fn undo_crop(mut sample: Sample, labeled: bool, op: &str) -> Result<Sample> {
    let params = sample
        .input_metadata
        .first()
        .and_then(SampleMetadata::crop_params)
        .ok_or_else(|| Error::transform(op, "sample carries no recorded crop parameters"))?;

    for image in &mut sample.input {
        *image = pad_image(image, params, op)?;
    }
    if labeled {
        if let Some(gt) = &mut sample.gt {
            for channel in gt.iter_mut().flatten() {
                *channel = pad_image(channel, params, op)?;
            }
        }
    }
    Ok(sample)
}

/// Deterministic centered crop of a fixed `[height, width]` output size.
#[derive(Debug, Clone)]
pub struct CenterCrop2D {
    size: [usize; 2],
    labeled: bool,
}

impl CenterCrop2D {
    /// Crop input and ground truth to `[height, width]`.
    pub fn new(size: [usize; 2]) -> Self {
        Self {
            size,
            labeled: true,
        }
    }

    /// Crop input channels only.
    pub fn unlabeled(size: [usize; 2]) -> Self {
        Self {
            size,
            labeled: false,
        }
    }
}

impl SampleTransform for CenterCrop2D {
    fn name(&self) -> &'static str {
        "CenterCrop2D"
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let first = sample
            .input
            .first()
            .ok_or_else(|| Error::transform(self.name(), "sample has no input channels"))?;
        let shape = first.shape();
        if shape.len() != 2 {
            return Err(Error::transform(self.name(), "expected 2D input planes"));
        }
        let [th, tw] = self.size;
        let top = ((shape[0] as i64 - th as i64) as f64 / 2.0).round() as i64;
        let left = ((shape[1] as i64 - tw as i64) as f64 / 2.0).round() as i64;
        crop_sample(sample, top, left, self.size, self.labeled, self.name())
    }

    fn invertible(&self) -> bool {
        true
    }

    fn invert(&self, sample: Sample) -> Result<Sample> {
        undo_crop(sample, self.labeled, self.name())
    }

    fn fixed_output_shape(&self) -> Option<Vec<usize>> {
        Some(self.size.to_vec())
    }
}

/// Crop of a fixed size centered on the integer-rounded center of mass of
/// the sample's region-of-interest mask.
///
/// Reads outside the canvas (a region of interest near a border) come back
/// as zero, and the recorded offsets may be negative; the undo contract is
/// unchanged.
#[derive(Debug, Clone)]
pub struct ROICrop2D {
    size: [usize; 2],
    labeled: bool,
}

impl ROICrop2D {
    /// Crop input and ground truth to `[height, width]` around the ROI.
    pub fn new(size: [usize; 2]) -> Self {
        Self {
            size,
            labeled: true,
        }
    }

    /// Crop input channels only.
    pub fn unlabeled(size: [usize; 2]) -> Self {
        Self {
            size,
            labeled: false,
        }
    }
}

impl SampleTransform for ROICrop2D {
    fn name(&self) -> &'static str {
        "ROICrop2D"
    }

    fn apply(&self, sample: Sample) -> Result<Sample> {
        let roi = sample
            .roi
            .as_ref()
            .and_then(|channels| channels.first())
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::transform(self.name(), "sample carries no region-of-interest mask")
            })?;
        let mask = roi
            .to_f32()
            .into_dimensionality::<Ix2>()
            .map_err(|_| Error::transform(self.name(), "expected a 2D region-of-interest mask"))?;
        let (cy, cx) = warp::center_of_mass(&mask)
            .ok_or_else(|| Error::transform(self.name(), "region-of-interest mask is empty"))?;

        let [th, tw] = self.size;
        let th_half = (th as f64 / 2.0).round() as i64;
        let tw_half = (tw as f64 / 2.0).round() as i64;
        let top = cy.round() as i64 - th_half;
        let left = cx.round() as i64 - tw_half;
        crop_sample(sample, top, left, self.size, self.labeled, self.name())
    }

    fn invertible(&self) -> bool {
        true
    }

    fn invert(&self, sample: Sample) -> Result<Sample> {
        undo_crop(sample, self.labeled, self.name())
    }

    fn fixed_output_shape(&self) -> Option<Vec<usize>> {
        Some(self.size.to_vec())
    }
}

/// Deterministic centered crop of a 3D volume to a fixed
/// `[depth, height, width]` size.
///
/// Declares its output size through
/// [`SampleTransform::fixed_output_shape`] so subvolume index builders can
/// validate tiling against the cropped shape.
#[derive(Debug, Clone)]
pub struct CenterCrop3D {
    size: [usize; 3],
    labeled: bool,
}

impl CenterCrop3D {
    /// Crop input and ground truth to `[depth, height, width]`.
    pub fn new(size: [usize; 3]) -> Self {
        Self {
            size,
            labeled: true,
        }
    }

    /// Crop input channels only.
    pub fn unlabeled(size: [usize; 3]) -> Self {
        Self {
            size,
            labeled: false,
        }
    }

    fn crop_volume<T: Copy + Default>(&self, data: &ArrayD<T>) -> Result<ArrayD<T>> {
        if data.ndim() != 3 {
            return Err(Error::transform(self.name(), "expected 3D input volumes"));
        }
        let shape = data.shape().to_vec();
        let offsets: Vec<i64> = (0..3)
            .map(|a| ((shape[a] as i64 - self.size[a] as i64) as f64 / 2.0).round() as i64)
            .collect();

        let mut out = ArrayD::<T>::default(IxDyn(&self.size));
        for z in 0..self.size[0] {
            let sz = offsets[0] + z as i64;
            if sz < 0 || sz >= shape[0] as i64 {
                continue;
            }
            for y in 0..self.size[1] {
                let sy = offsets[1] + y as i64;
                if sy < 0 || sy >= shape[1] as i64 {
                    continue;
                }
                for x in 0..self.size[2] {
                    let sx = offsets[2] + x as i64;
                    if sx < 0 || sx >= shape[2] as i64 {
                        continue;
                    }
                    out[[z, y, x]] = data[[sz as usize, sy as usize, sx as usize]];
                }
            }
        }
        Ok(out)
    }

    fn crop_image(&self, image: &Image) -> Result<Image> {
        Ok(match image {
            Image::F32(a) => Image::F32(self.crop_volume(a)?),
            Image::U8(a) => Image::U8(self.crop_volume(a)?),
        })
    }
}

impl SampleTransform for CenterCrop3D {
    fn name(&self) -> &'static str {
        "CenterCrop3D"
    }

    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        for image in &mut sample.input {
            *image = self.crop_image(image)?;
        }
        if self.labeled {
            if let Some(gt) = &mut sample.gt {
                for channel in gt.iter_mut().flatten() {
                    *channel = self.crop_image(channel)?;
                }
            }
        }
        Ok(sample)
    }

    fn fixed_output_shape(&self) -> Option<Vec<usize>> {
        Some(self.size.to_vec())
    }
}
