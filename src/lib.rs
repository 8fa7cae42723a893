//! medset: dataset and augmentation primitives for volumetric medical
//! image segmentation.
//!
//! The crate turns collections of co-registered volumes (input modalities,
//! ground-truth masks, region-of-interest masks) into randomly accessible
//! sample collections for a training loop:
//!
//! - [`pair::VolumePair`] validates shape agreement across a subject's
//!   channels and extracts full volumes or single 2D planes;
//! - [`dataset::SliceDataset`] enumerates 2D slices along one axis, with
//!   optional content-based filtering and whole-dataset intensity
//!   statistics;
//! - [`dataset::SubvolumeDataset`] tiles 3D volumes into overlapping
//!   subvolumes with a halo of shared context;
//! - [`transforms`] provides the randomized augmentation stages and the
//!   crop transforms whose effect can be undone at inference time;
//! - [`collate`] merges per-sample records into batches.
//!
//! Volumetric file parsing stays outside the crate: loaders plug in through
//! [`volume::VolumeSource`], and [`volume::ArrayVolume`] covers data that is
//! already in memory.
//!
//! # Example
//!
//! ```
//! use medset::dataset::{Dataset, SliceDataset, SliceGroup};
//! use medset::volume::ArrayVolume;
//! use ndarray::ArrayD;
//! use std::sync::Arc;
//!
//! # fn main() -> medset::Result<()> {
//! let image = ArrayD::zeros(ndarray::IxDyn(&[64, 64, 20]));
//! let mask = ArrayD::zeros(ndarray::IxDyn(&[64, 64, 20]));
//!
//! let group = SliceGroup::new(vec![Arc::new(ArrayVolume::new(
//!     "subject1-image",
//!     image,
//!     vec![1.0, 1.0, 3.0],
//! )?)])
//! .ground_truths(vec![Some(Arc::new(ArrayVolume::new(
//!     "subject1-mask",
//!     mask,
//!     vec![1.0, 1.0, 3.0],
//! )?))]);
//!
//! let dataset = SliceDataset::builder(vec![group]).slice_axis(2).build()?;
//! assert_eq!(dataset.len(), 20);
//! let sample = dataset.get(10)?;
//! assert_eq!(sample.input[0].shape(), &[64, 64]);
//! # Ok(())
//! # }
//! ```

pub mod collate;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod pair;
pub mod sample;
pub mod transforms;
pub mod volume;

pub use error::{Error, Result};
pub use metadata::{CropParams, MetaValue, SampleMetadata};
pub use sample::{Image, Sample};
