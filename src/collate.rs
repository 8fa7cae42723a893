//! Batch collation.
//!
//! [`collate`] recursively merges per-sample field trees into batched
//! values: arrays stack along a new leading axis, numeric scalars collect
//! into vectors, strings pass through as lists, maps recurse per key and
//! sequences recurse per position. Element kinds and array dtypes must be
//! homogeneous across the batch; anything else is a collation error, never
//! a silent promotion.

use crate::error::{Error, Result};
use crate::metadata::{MetaValue, SampleMetadata};
use crate::sample::{Image, Sample};
use ndarray::{ArrayD, Axis, IxDyn};

/// One collatable value extracted from a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Array(Image),
    Float(f64),
    Int(i64),
    Text(String),
    /// Ordered key/value mapping.
    Map(Vec<(String, Field)>),
    /// Ordered sequence, e.g. per-channel lists.
    Seq(Vec<Field>),
}

/// A batched value produced by [`collate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// Stacked floating-point arrays, leading axis is the batch.
    F32(ArrayD<f32>),
    /// Stacked 8-bit arrays, leading axis is the batch.
    U8(ArrayD<u8>),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
    Texts(Vec<String>),
    Map(Vec<(String, Batch)>),
    Seq(Vec<Batch>),
}

fn stack_f32(arrays: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| Error::Collation(format!("cannot stack arrays: {}", e)))
}

fn stack_u8(arrays: &[&ArrayD<u8>]) -> Result<ArrayD<u8>> {
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| Error::Collation(format!("cannot stack arrays: {}", e)))
}

fn collate_arrays(images: &[&Image]) -> Result<Batch> {
    match images[0] {
        Image::F32(_) => {
            let arrays = images
                .iter()
                .map(|image| match image {
                    Image::F32(a) => Ok(a),
                    Image::U8(_) => Err(Error::Collation(
                        "batch mixes f32 and u8 arrays".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Batch::F32(stack_f32(&arrays)?))
        }
        Image::U8(_) => {
            let arrays = images
                .iter()
                .map(|image| match image {
                    Image::U8(a) => Ok(a),
                    Image::F32(_) => Err(Error::Collation(
                        "batch mixes f32 and u8 arrays".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Batch::U8(stack_u8(&arrays)?))
        }
    }
}

fn kind(field: &Field) -> &'static str {
    match field {
        Field::Array(_) => "array",
        Field::Float(_) => "float",
        Field::Int(_) => "int",
        Field::Text(_) => "text",
        Field::Map(_) => "map",
        Field::Seq(_) => "sequence",
    }
}

fn collate_refs(items: &[&Field]) -> Result<Batch> {
    let first = items
        .first()
        .ok_or_else(|| Error::Collation("cannot collate an empty batch".to_string()))?;
    if let Some(other) = items.iter().find(|f| kind(f) != kind(first)) {
        return Err(Error::Collation(format!(
            "batch mixes element kinds ({} and {})",
            kind(first),
            kind(other)
        )));
    }

    match first {
        Field::Array(_) => {
            let images: Vec<&Image> = items
                .iter()
                .map(|f| match f {
                    Field::Array(image) => image,
                    _ => unreachable!("kinds checked above"),
                })
                .collect();
            collate_arrays(&images)
        }
        Field::Float(_) => Ok(Batch::Floats(
            items
                .iter()
                .map(|f| match f {
                    Field::Float(v) => *v,
                    _ => unreachable!("kinds checked above"),
                })
                .collect(),
        )),
        Field::Int(_) => Ok(Batch::Ints(
            items
                .iter()
                .map(|f| match f {
                    Field::Int(v) => *v,
                    _ => unreachable!("kinds checked above"),
                })
                .collect(),
        )),
        Field::Text(_) => Ok(Batch::Texts(
            items
                .iter()
                .map(|f| match f {
                    Field::Text(v) => v.clone(),
                    _ => unreachable!("kinds checked above"),
                })
                .collect(),
        )),
        Field::Map(template) => {
            let mut out = Vec::with_capacity(template.len());
            for (key, _) in template {
                let values = items
                    .iter()
                    .map(|f| match f {
                        Field::Map(entries) => entries
                            .iter()
                            .find_map(|(k, v)| (k == key).then_some(v))
                            .ok_or_else(|| {
                                Error::Collation(format!("batch maps disagree on key '{}'", key))
                            }),
                        _ => unreachable!("kinds checked above"),
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.push((key.clone(), collate_refs(&values)?));
            }
            Ok(Batch::Map(out))
        }
        Field::Seq(template) => {
            let len = template.len();
            let mut out = Vec::with_capacity(len);
            for position in 0..len {
                let values = items
                    .iter()
                    .map(|f| match f {
                        Field::Seq(entries) => entries.get(position).ok_or_else(|| {
                            Error::Collation(format!(
                                "batch sequences disagree on length ({} vs {})",
                                len,
                                entries.len()
                            ))
                        }),
                        _ => unreachable!("kinds checked above"),
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.push(collate_refs(&values)?);
            }
            Ok(Batch::Seq(out))
        }
    }
}

/// Merge a batch of field trees into batched values.
pub fn collate(batch: &[Field]) -> Result<Batch> {
    let refs: Vec<&Field> = batch.iter().collect();
    collate_refs(&refs)
}

/// Collate whole samples into one batched map.
pub fn collate_samples(samples: &[Sample]) -> Result<Batch> {
    let fields: Vec<Field> = samples.iter().map(Field::from).collect();
    collate(&fields)
}

fn meta_field(record: &SampleMetadata) -> Field {
    let entries = record
        .iter()
        .map(|(key, value)| {
            let field = match value {
                MetaValue::Index(v) => Field::Int(*v as i64),
                MetaValue::Float(v) => Field::Float(*v),
                MetaValue::Spacing(v) => Field::Array(Image::F32(
                    ArrayD::from_shape_vec(IxDyn(&[v.len()]), v.clone())
                        .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
                )),
                MetaValue::Shape(v) => {
                    Field::Seq(v.iter().map(|&d| Field::Int(d as i64)).collect())
                }
                MetaValue::Text(v) => Field::Text(v.clone()),
                MetaValue::TextList(v) => {
                    Field::Seq(v.iter().cloned().map(Field::Text).collect())
                }
                MetaValue::Crop(params) => Field::Seq(vec![
                    Field::Int(params.top),
                    Field::Int(params.left),
                    Field::Int(params.width as i64),
                    Field::Int(params.height as i64),
                ]),
            };
            (key.to_string(), field)
        })
        .collect();
    Field::Map(entries)
}

fn channel_seq(channels: &[Option<Image>]) -> Option<Field> {
    // Channels with absent data cannot be represented in a batch; the key
    // is only emitted when every channel is present.
    let images: Option<Vec<Field>> = channels
        .iter()
        .map(|channel| channel.as_ref().map(|image| Field::Array(image.clone())))
        .collect();
    images.map(Field::Seq)
}

impl From<&Sample> for Field {
    fn from(sample: &Sample) -> Self {
        let mut entries = vec![(
            "input".to_string(),
            Field::Seq(
                sample
                    .input
                    .iter()
                    .map(|image| Field::Array(image.clone()))
                    .collect(),
            ),
        )];

        if let Some(field) = sample.gt.as_deref().and_then(channel_seq) {
            entries.push(("gt".to_string(), field));
        }
        if let Some(field) = sample.roi.as_deref().and_then(channel_seq) {
            entries.push(("roi".to_string(), field));
        }

        entries.push((
            "input_metadata".to_string(),
            Field::Seq(sample.input_metadata.iter().map(meta_field).collect()),
        ));
        if let Some(records) = &sample.gt_metadata {
            entries.push((
                "gt_metadata".to_string(),
                Field::Seq(records.iter().map(meta_field).collect()),
            ));
        }
        if let Some(records) = &sample.roi_metadata {
            entries.push((
                "roi_metadata".to_string(),
                Field::Seq(records.iter().map(meta_field).collect()),
            ));
        }

        Field::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(fill: f32) -> Image {
        Image::F32(ArrayD::from_elem(IxDyn(&[2, 3]), fill))
    }

    #[test]
    fn test_arrays_stack_along_new_axis() {
        let batch = collate(&[
            Field::Array(plane(1.0)),
            Field::Array(plane(2.0)),
        ])
        .unwrap();
        match batch {
            Batch::F32(stacked) => {
                assert_eq!(stacked.shape(), &[2, 2, 3]);
                assert_eq!(stacked[[0, 0, 0]], 1.0);
                assert_eq!(stacked[[1, 0, 0]], 2.0);
            }
            other => panic!("expected stacked f32 batch, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_dtypes_are_rejected() {
        let result = collate(&[
            Field::Array(plane(1.0)),
            Field::Array(Image::U8(ArrayD::zeros(IxDyn(&[2, 3])))),
        ]);
        assert!(matches!(result, Err(Error::Collation(_))));
    }

    #[test]
    fn test_mixed_kinds_are_rejected() {
        let result = collate(&[Field::Float(1.0), Field::Text("x".to_string())]);
        assert!(matches!(result, Err(Error::Collation(_))));
    }

    #[test]
    fn test_strings_pass_through_as_list() {
        let batch = collate(&[
            Field::Text("a".to_string()),
            Field::Text("b".to_string()),
        ])
        .unwrap();
        assert_eq!(batch, Batch::Texts(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_maps_recurse_per_key() {
        let item = |v: f64| {
            Field::Map(vec![
                ("value".to_string(), Field::Float(v)),
                ("name".to_string(), Field::Text("s".to_string())),
            ])
        };
        let batch = collate(&[item(1.0), item(2.0)]).unwrap();
        match batch {
            Batch::Map(entries) => {
                assert_eq!(entries[0].0, "value");
                assert_eq!(entries[0].1, Batch::Floats(vec![1.0, 2.0]));
            }
            other => panic!("expected map batch, got {:?}", other),
        }
    }

    #[test]
    fn test_sequences_transpose_then_recurse() {
        let item = |a: f64, b: f64| Field::Seq(vec![Field::Float(a), Field::Float(b)]);
        let batch = collate(&[item(1.0, 10.0), item(2.0, 20.0)]).unwrap();
        assert_eq!(
            batch,
            Batch::Seq(vec![
                Batch::Floats(vec![1.0, 2.0]),
                Batch::Floats(vec![10.0, 20.0])
            ])
        );
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(collate(&[]).is_err());
    }
}
