//! Volume sources and decode handles.
//!
//! File-format parsing lives outside this crate. A volumetric-image loader
//! plugs in through the [`VolumeSource`] trait, exposing the only operations
//! this crate needs: an identifier, shape, physical spacing, a full `f32`
//! decode and the axis layout needed for canonical reorientation.
//! [`ArrayVolume`] is the in-memory implementation used when data is already
//! decoded (and by the tests).

use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis, IxDyn};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Axis layout of stored voxel data relative to the canonical order.
///
/// `permutation[i]` names the source axis that becomes canonical axis `i`;
/// `flipped[i]` states whether that axis runs opposite to the canonical
/// direction. Applying an orientation permutes and flips data, shape and
/// spacing consistently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orientation {
    permutation: Vec<usize>,
    flipped: Vec<bool>,
}

impl Orientation {
    /// The identity orientation for `ndim` axes.
    pub fn canonical(ndim: usize) -> Self {
        Self {
            permutation: (0..ndim).collect(),
            flipped: vec![false; ndim],
        }
    }

    /// Build an orientation from an axis permutation and per-axis flips.
    pub fn new(permutation: Vec<usize>, flipped: Vec<bool>) -> Result<Self> {
        let ndim = permutation.len();
        if flipped.len() != ndim {
            return Err(Error::Configuration(format!(
                "orientation permutation has {} axes but {} flip flags",
                ndim,
                flipped.len()
            )));
        }
        let mut seen = vec![false; ndim];
        for &axis in &permutation {
            if axis >= ndim || seen[axis] {
                return Err(Error::Configuration(format!(
                    "invalid axis permutation {:?}",
                    permutation
                )));
            }
            seen[axis] = true;
        }
        Ok(Self {
            permutation,
            flipped,
        })
    }

    /// Whether this orientation is already canonical.
    pub fn is_canonical(&self) -> bool {
        self.permutation.iter().enumerate().all(|(i, &a)| i == a)
            && self.flipped.iter().all(|&f| !f)
    }

    /// Reorder voxel data into the canonical axis order.
    pub fn apply(&self, data: ArrayD<f32>) -> ArrayD<f32> {
        if self.is_canonical() {
            return data;
        }
        let mut view = data.permuted_axes(IxDyn(&self.permutation));
        for (axis, &flip) in self.flipped.iter().enumerate() {
            if flip {
                view.invert_axis(Axis(axis));
            }
        }
        view.as_standard_layout().to_owned()
    }

    /// Shape after reorientation.
    pub fn apply_shape(&self, shape: &[usize]) -> Vec<usize> {
        self.permutation.iter().map(|&a| shape[a]).collect()
    }

    /// Spacing after reorientation.
    pub fn apply_spacing(&self, spacing: &[f32]) -> Vec<f32> {
        self.permutation.iter().map(|&a| spacing[a]).collect()
    }
}

/// External loader boundary for one stored volume.
pub trait VolumeSource: Send + Sync {
    /// Opaque identifier used in metadata and diagnostics (e.g. a path).
    fn identifier(&self) -> &str;

    /// Spatial shape in stored axis order.
    fn shape(&self) -> &[usize];

    /// Physical voxel size per stored axis, in millimetres.
    fn spacing(&self) -> &[f32];

    /// Stored axis layout relative to the canonical order.
    fn orientation(&self) -> Orientation {
        Orientation::canonical(self.shape().len())
    }

    /// Decode the full volume as `f32`.
    fn read_f32(&self) -> Result<ArrayD<f32>>;
}

/// An already-decoded in-memory volume.
#[derive(Debug, Clone)]
pub struct ArrayVolume {
    id: String,
    data: ArrayD<f32>,
    spacing: Vec<f32>,
    orientation: Orientation,
}

impl ArrayVolume {
    /// Wrap decoded voxel data with its physical spacing.
    pub fn new(id: impl Into<String>, data: ArrayD<f32>, spacing: Vec<f32>) -> Result<Self> {
        if spacing.len() != data.ndim() {
            return Err(Error::Configuration(format!(
                "spacing has {} entries for a {}-dimensional volume",
                spacing.len(),
                data.ndim()
            )));
        }
        for (i, &s) in spacing.iter().enumerate() {
            if !s.is_finite() || s <= 0.0 {
                return Err(Error::Configuration(format!(
                    "spacing dimension {} must be positive and finite (got {})",
                    i, s
                )));
            }
        }
        let ndim = data.ndim();
        Ok(Self {
            id: id.into(),
            data,
            spacing,
            orientation: Orientation::canonical(ndim),
        })
    }

    /// Declare the stored axis layout (defaults to canonical).
    pub fn with_orientation(mut self, orientation: Orientation) -> Result<Self> {
        if orientation.permutation.len() != self.data.ndim() {
            return Err(Error::Configuration(format!(
                "orientation covers {} axes for a {}-dimensional volume",
                orientation.permutation.len(),
                self.data.ndim()
            )));
        }
        self.orientation = orientation;
        Ok(self)
    }
}

impl VolumeSource for ArrayVolume {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    fn spacing(&self) -> &[f32] {
        &self.spacing
    }

    fn orientation(&self) -> Orientation {
        self.orientation.clone()
    }

    fn read_f32(&self) -> Result<ArrayD<f32>> {
        Ok(self.data.clone())
    }
}

/// A source plus decode policy: optional canonical reorientation and
/// optional memoization of the decoded array.
///
/// With caching enabled the first decode is kept for the lifetime of the
/// handle and repeated access is free; with caching disabled every call
/// decodes again, trading time for footprint. The memoized slot is safe to
/// read concurrently once populated; callers that share one handle across
/// workers should populate it once up front.
#[derive(Clone)]
pub struct VolumeHandle {
    source: Arc<dyn VolumeSource>,
    cache: bool,
    canonical: bool,
    decoded: OnceLock<Arc<ArrayD<f32>>>,
}

impl VolumeHandle {
    /// Wrap a source with the given decode policy.
    pub fn new(source: Arc<dyn VolumeSource>, cache: bool, canonical: bool) -> Self {
        Self {
            source,
            cache,
            canonical,
            decoded: OnceLock::new(),
        }
    }

    /// Identifier of the underlying source.
    pub fn identifier(&self) -> &str {
        self.source.identifier()
    }

    /// Shape, accounting for canonical reorientation when requested.
    pub fn shape(&self) -> Vec<usize> {
        if self.canonical {
            self.source.orientation().apply_shape(self.source.shape())
        } else {
            self.source.shape().to_vec()
        }
    }

    /// Spacing, accounting for canonical reorientation when requested.
    pub fn spacing(&self) -> Vec<f32> {
        if self.canonical {
            self.source.orientation().apply_spacing(self.source.spacing())
        } else {
            self.source.spacing().to_vec()
        }
    }

    /// Number of spatial dimensions.
    pub fn ndim(&self) -> usize {
        self.source.shape().len()
    }

    /// Decoded voxel data, canonicalized when requested and memoized when
    /// caching is enabled.
    pub fn data(&self) -> Result<Arc<ArrayD<f32>>> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded.clone());
        }
        let mut data = self.source.read_f32()?;
        if self.canonical {
            data = self.source.orientation().apply(data);
        }
        let data = Arc::new(data);
        if self.cache {
            let _ = self.decoded.set(data.clone());
        }
        Ok(data)
    }
}

impl fmt::Debug for VolumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeHandle")
            .field("identifier", &self.identifier())
            .field("cache", &self.cache)
            .field("canonical", &self.canonical)
            .field("decoded", &self.decoded.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(shape: &[usize]) -> ArrayD<f32> {
        let numel: usize = shape.iter().product();
        ArrayD::from_shape_vec(IxDyn(shape), (0..numel).map(|i| i as f32).collect()).unwrap()
    }

    #[test]
    fn test_orientation_permutes_shape_and_spacing() {
        let orient = Orientation::new(vec![2, 0, 1], vec![false, false, false]).unwrap();
        assert_eq!(orient.apply_shape(&[4, 5, 6]), vec![6, 4, 5]);
        assert_eq!(orient.apply_spacing(&[1.0, 2.0, 3.0]), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_orientation_flip_roundtrip() {
        let orient = Orientation::new(vec![0, 1], vec![true, false]).unwrap();
        let data = volume(&[2, 3]);
        let once = orient.apply(data.clone());
        let twice = orient.apply(once);
        assert_eq!(twice, data);
    }

    #[test]
    fn test_orientation_rejects_bad_permutation() {
        assert!(Orientation::new(vec![0, 0, 1], vec![false; 3]).is_err());
        assert!(Orientation::new(vec![0, 1], vec![false; 3]).is_err());
    }

    #[test]
    fn test_array_volume_validates_spacing() {
        assert!(ArrayVolume::new("v", volume(&[2, 2]), vec![1.0]).is_err());
        assert!(ArrayVolume::new("v", volume(&[2, 2]), vec![1.0, -1.0]).is_err());
        assert!(ArrayVolume::new("v", volume(&[2, 2]), vec![1.0, 1.0]).is_ok());
    }

    #[test]
    fn test_handle_caches_decode() {
        let source = Arc::new(ArrayVolume::new("v", volume(&[2, 2, 2]), vec![1.0; 3]).unwrap());
        let handle = VolumeHandle::new(source, true, false);
        let first = handle.data().unwrap();
        let second = handle.data().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_handle_canonicalizes() {
        let orient = Orientation::new(vec![1, 0], vec![false, false]).unwrap();
        let source = Arc::new(
            ArrayVolume::new("v", volume(&[2, 3]), vec![1.0, 2.0])
                .unwrap()
                .with_orientation(orient)
                .unwrap(),
        );
        let handle = VolumeHandle::new(source, false, true);
        assert_eq!(handle.shape(), vec![3, 2]);
        assert_eq!(handle.spacing(), vec![2.0, 1.0]);
        assert_eq!(handle.data().unwrap().shape(), &[3, 2]);
    }
}
