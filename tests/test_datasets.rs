//! Integration tests for the slice and subvolume datasets.

use medset::collate::{collate_samples, Batch};
use medset::dataset::{Dataset, SliceDataset, SliceFilter, SliceGroup, SubvolumeConfig, SubvolumeDataset, VolumeGroup};
use medset::volume::{ArrayVolume, Orientation, VolumeSource};
use medset::{Error, Sample};
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

fn source_with(id: &str, shape: &[usize], fill: impl Fn(usize) -> f32) -> Arc<dyn VolumeSource> {
    let numel: usize = shape.iter().product();
    let data = ArrayD::from_shape_vec(IxDyn(shape), (0..numel).map(fill).collect()).unwrap();
    Arc::new(ArrayVolume::new(id, data, vec![1.0; shape.len()]).unwrap())
}

fn source(id: &str, shape: &[usize]) -> Arc<dyn VolumeSource> {
    source_with(id, shape, |i| i as f32)
}

#[test]
fn test_slice_index_length_without_filter() {
    // Two channels, ground truth shape (64, 64, 20), axial slicing.
    let group = SliceGroup::new(vec![
        source("t1", &[64, 64, 20]),
        source("t2", &[64, 64, 20]),
    ])
    .ground_truths(vec![
        Some(source("gt1", &[64, 64, 20])),
        Some(source("gt2", &[64, 64, 20])),
    ]);

    let dataset = SliceDataset::builder(vec![group])
        .slice_axis(2)
        .build()
        .unwrap();

    assert_eq!(dataset.len(), 20);
    assert_eq!(dataset.n_channels(), 2);

    let sample = dataset.get(10).unwrap();
    assert_eq!(sample.input.len(), 2);
    for plane in &sample.input {
        assert_eq!(plane.shape(), &[64, 64]);
    }
}

#[test]
fn test_slice_index_length_sums_over_groups() {
    let groups = vec![
        SliceGroup::new(vec![source("a", &[8, 8, 4])])
            .ground_truths(vec![Some(source("ga", &[8, 8, 4]))]),
        SliceGroup::new(vec![source("b", &[8, 8, 6])])
            .ground_truths(vec![Some(source("gb", &[8, 8, 6]))]),
    ];
    let dataset = SliceDataset::builder(groups).build().unwrap();
    assert_eq!(dataset.len(), 4 + 6);
}

#[test]
fn test_filter_excludes_empty_slices_permanently() {
    // The mask is non-zero only on the last slice along axis 2.
    let gt = source_with("gt", &[4, 4, 5], |i| if i % 5 == 4 { 1.0 } else { 0.0 });
    let group = SliceGroup::new(vec![source("img", &[4, 4, 5])]).ground_truths(vec![Some(gt)]);

    let filter: SliceFilter = Arc::new(|sample: &Sample| {
        sample
            .gt
            .as_ref()
            .and_then(|channels| channels[0].as_ref())
            .map(|mask| mask.to_f32().iter().any(|&v| v > 0.0))
            .unwrap_or(false)
    });

    let dataset = SliceDataset::builder(vec![group])
        .filter(filter)
        .build()
        .unwrap();
    assert_eq!(dataset.len(), 1);

    let sample = dataset.get(0).unwrap();
    let mask = sample.gt.unwrap().remove(0).unwrap().to_f32();
    assert!(mask.iter().any(|&v| v > 0.0));
}

#[test]
fn test_data_shape_metadata_matches_in_plane_shape() {
    let group = SliceGroup::new(vec![source("img", &[6, 8, 3])])
        .ground_truths(vec![Some(source("gt", &[6, 8, 3]))]);
    let dataset = SliceDataset::builder(vec![group])
        .slice_axis(2)
        .build()
        .unwrap();

    let sample = dataset.get(0).unwrap();
    assert_eq!(
        sample.input_metadata[0].data_shape(),
        Some(&[6, 8][..])
    );
    let gt_meta = sample.gt_metadata.unwrap();
    assert_eq!(gt_meta[0].data_shape(), Some(&[6, 8][..]));
}

#[test]
fn test_unlabeled_groups_produce_no_gt() {
    let dataset = SliceDataset::builder(vec![SliceGroup::new(vec![source("img", &[4, 4, 2])])])
        .build()
        .unwrap();
    let sample = dataset.get(0).unwrap();
    assert!(sample.gt.is_none());
    assert!(sample.roi.is_none());
    assert!(!sample.is_labeled());
}

#[test]
fn test_invalid_axis_is_rejected_at_build() {
    let result = SliceDataset::builder(vec![SliceGroup::new(vec![source("img", &[4, 4, 2])])])
        .slice_axis(3)
        .build();
    assert!(matches!(result, Err(Error::InvalidAxis { axis: 3 })));
}

#[test]
fn test_canonical_reorientation_applies_to_every_channel() {
    // Source stored with the slice axis first; canonicalization restores
    // the (row, col, slice) order for input and ground truth alike.
    let orient = Orientation::new(vec![1, 2, 0], vec![false; 3]).unwrap();
    let make = |id: &str| -> Arc<dyn VolumeSource> {
        let data = ArrayD::zeros(IxDyn(&[5, 8, 6]));
        Arc::new(
            ArrayVolume::new(id, data, vec![2.0, 1.0, 1.0])
                .unwrap()
                .with_orientation(orient.clone())
                .unwrap(),
        )
    };
    let group = SliceGroup::new(vec![make("img")]).ground_truths(vec![Some(make("gt"))]);

    let dataset = SliceDataset::builder(vec![group])
        .canonical(true)
        .slice_axis(2)
        .build()
        .unwrap();
    assert_eq!(dataset.len(), 5);
    let sample = dataset.get(0).unwrap();
    assert_eq!(sample.input[0].shape(), &[8, 6]);
}

#[test]
fn test_compute_mean_std_streams_whole_dataset() {
    // Slice 0 is all ones, slice 1 all threes: mean 2, standard deviation 1.
    let img = source_with("img", &[2, 2, 2], |i| if i % 2 == 0 { 1.0 } else { 3.0 });
    let group = SliceGroup::new(vec![img]).ground_truths(vec![Some(source("gt", &[2, 2, 2]))]);

    let dataset = SliceDataset::builder(vec![group]).build().unwrap();
    let (mean, std) = dataset.compute_mean_std().unwrap();
    assert!((mean[0] - 2.0).abs() < 1e-5);
    assert!((std[0] - 1.0).abs() < 1e-5);
}

#[test]
fn test_subvolume_example_tiling() {
    // Volume 96^3, core 32^3, padding 16: divisibility holds and the index
    // carries (96 - 32) / 32 = 2 windows per axis.
    let group = VolumeGroup::new(vec![source("img", &[96, 96, 96])])
        .ground_truths(vec![Some(source("gt", &[96, 96, 96]))]);
    let config = SubvolumeConfig {
        length: [32, 32, 32],
        padding: 16,
    };
    let dataset = SubvolumeDataset::new(vec![group], config, true, false, None).unwrap();

    assert_eq!(dataset.len(), 8);
    for index in 0..dataset.len() {
        let sample = dataset.get(index).unwrap();
        assert_eq!(sample.input[0].shape(), &[64, 64, 64]);
        let gt = sample.gt.as_ref().unwrap()[0].as_ref().unwrap();
        assert_eq!(gt.shape(), &[64, 64, 64]);
    }
}

#[test]
fn test_subvolume_divisibility_errors_are_fatal() {
    let group = |shape: &[usize]| {
        VolumeGroup::new(vec![source("img", shape)])
            .ground_truths(vec![Some(source("gt", shape))])
    };

    // 96 is a multiple of 16 but (96 - 0) % 40 != 0.
    let config = SubvolumeConfig {
        length: [40, 40, 40],
        padding: 0,
    };
    assert!(matches!(
        SubvolumeDataset::new(vec![group(&[96, 96, 96])], config, true, false, None),
        Err(Error::Configuration(_))
    ));

    // (72 - 2*4) % 32 == 0 but 72 % 16 != 0.
    let config = SubvolumeConfig {
        length: [32, 32, 32],
        padding: 4,
    };
    assert!(matches!(
        SubvolumeDataset::new(vec![group(&[72, 72, 72])], config, true, false, None),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_subvolume_metadata_carries_full_shape() {
    let group = VolumeGroup::new(vec![source("img", &[32, 32, 32])])
        .ground_truths(vec![Some(source("gt", &[32, 32, 32]))]);
    let config = SubvolumeConfig {
        length: [16, 16, 16],
        padding: 0,
    };
    let dataset = SubvolumeDataset::new(vec![group], config, true, false, None).unwrap();
    let sample = dataset.get(0).unwrap();
    assert_eq!(
        sample.input_metadata[0].data_shape(),
        Some(&[32, 32, 32][..])
    );
}

#[test]
fn test_collate_stacks_sample_batch() {
    let group = SliceGroup::new(vec![source("img", &[4, 4, 3])])
        .ground_truths(vec![Some(source("gt", &[4, 4, 3]))]);
    let dataset = SliceDataset::builder(vec![group]).build().unwrap();

    let samples: Vec<Sample> = (0..dataset.len())
        .map(|i| dataset.get(i).unwrap())
        .collect();
    let batch = collate_samples(&samples).unwrap();

    match batch {
        Batch::Map(entries) => {
            let input = entries
                .iter()
                .find_map(|(k, v)| (k == "input").then_some(v))
                .unwrap();
            match input {
                Batch::Seq(channels) => match &channels[0] {
                    Batch::F32(stacked) => assert_eq!(stacked.shape(), &[3, 4, 4]),
                    other => panic!("expected stacked planes, got {:?}", other),
                },
                other => panic!("expected per-channel sequence, got {:?}", other),
            }
        }
        other => panic!("expected map batch, got {:?}", other),
    }
}
