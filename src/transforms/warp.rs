//! Low-level raster operations shared by the geometric transforms.
//!
//! Everything here works on 2D planes with bilinear (order-1) interpolation
//! and constant-zero handling outside the canvas.

use crate::error::{Error, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Bilinear lookup at fractional `(row, col)`; reads outside the canvas
/// contribute zero.
#[inline]
fn sample_bilinear(src: &Array2<f32>, row: f32, col: f32) -> f32 {
    let (h, w) = src.dim();
    let r0f = row.floor();
    let c0f = col.floor();
    let dr = row - r0f;
    let dc = col - c0f;
    let r0 = r0f as i64;
    let c0 = c0f as i64;

    let mut acc = 0.0;
    for (ri, wr) in [(r0, 1.0 - dr), (r0 + 1, dr)] {
        if ri < 0 || ri >= h as i64 {
            continue;
        }
        for (ci, wc) in [(c0, 1.0 - dc), (c0 + 1, dc)] {
            if ci < 0 || ci >= w as i64 {
                continue;
            }
            acc += wr * wc * src[[ri as usize, ci as usize]];
        }
    }
    acc
}

fn from_buffer(h: usize, w: usize, buf: Vec<f32>) -> Result<Array2<f32>> {
    Array2::from_shape_vec((h, w), buf)
        .map_err(|e| Error::transform("warp", format!("failed to shape output: {}", e)))
}

/// Resample `src` at the given fractional coordinates, one `(row, col)`
/// lookup per output pixel.
pub(crate) fn map_coordinates(
    src: &Array2<f32>,
    rows: &Array2<f32>,
    cols: &Array2<f32>,
) -> Result<Array2<f32>> {
    let (h, w) = rows.dim();
    let mut out = vec![0.0f32; h * w];
    out.par_chunks_mut(w).enumerate().for_each(|(r, out_row)| {
        for (c, value) in out_row.iter_mut().enumerate() {
            *value = sample_bilinear(src, rows[[r, c]], cols[[r, c]]);
        }
    });
    from_buffer(h, w, out)
}

/// Warp `src` by an affine transform about the plane center: rotation by
/// `angle_deg`, pixel translation `(tx, ty)` in (col, row) order, isotropic
/// `scale` and x-axis `shear_deg`.
pub(crate) fn affine_warp(
    src: &Array2<f32>,
    angle_deg: f32,
    translate: (f32, f32),
    scale: f32,
    shear_deg: f32,
) -> Result<Array2<f32>> {
    let (h, w) = src.dim();
    let theta = angle_deg.to_radians();
    let shear = shear_deg.to_radians();
    let (sin, cos) = theta.sin_cos();

    // Forward 2x2 matrix R(theta) * Shear(x) * scale, acting on (x, y).
    let a = scale * cos;
    let b = scale * (cos * shear.tan() - sin);
    let c = scale * sin;
    let d = scale * (sin * shear.tan() + cos);

    let det = a * d - b * c;
    if det.abs() < 1e-12 {
        return Err(Error::transform("affine_warp", "singular transform matrix"));
    }
    let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);

    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let (tx, ty) = translate;

    let mut out = vec![0.0f32; h * w];
    out.par_chunks_mut(w).enumerate().for_each(|(r, out_row)| {
        let y = r as f32 - cy - ty;
        for (col, value) in out_row.iter_mut().enumerate() {
            let x = col as f32 - cx - tx;
            let src_x = ia * x + ib * y + cx;
            let src_y = ic * x + id * y + cy;
            *value = sample_bilinear(src, src_y, src_x);
        }
    });
    from_buffer(h, w, out)
}

/// Rotate `src` by `angle_deg` about the plane center.
pub(crate) fn rotate(src: &Array2<f32>, angle_deg: f32) -> Result<Array2<f32>> {
    affine_warp(src, angle_deg, (0.0, 0.0), 1.0, 0.0)
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (4.0 * sigma + 0.5).max(1.0) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / denom).exp()
        })
        .collect();
    let total: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= total;
    }
    kernel
}

fn smooth_rows(src: &Array2<f32>, kernel: &[f32]) -> Result<Array2<f32>> {
    let (h, w) = src.dim();
    let standard = src.as_standard_layout();
    let data = standard
        .as_slice()
        .ok_or_else(|| Error::transform("gaussian_filter", "non-contiguous plane"))?;
    let radius = kernel.len() / 2;

    let mut out = vec![0.0f32; h * w];
    out.par_chunks_mut(w).enumerate().for_each(|(row, out_row)| {
        let in_row = &data[row * w..(row + 1) * w];
        for (c, value) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                let ci = c as i64 + k as i64 - radius as i64;
                if ci >= 0 && (ci as usize) < w {
                    acc += weight * in_row[ci as usize];
                }
            }
            *value = acc;
        }
    });
    from_buffer(h, w, out)
}

/// Separable Gaussian smoothing with a 4-sigma kernel and constant-zero
/// boundary handling.
pub(crate) fn gaussian_filter(src: &Array2<f32>, sigma: f32) -> Result<Array2<f32>> {
    let kernel = gaussian_kernel(sigma);
    let horizontal = smooth_rows(src, &kernel)?;
    let vertical = smooth_rows(&horizontal.reversed_axes(), &kernel)?;
    Ok(vertical.reversed_axes())
}

/// Bilinear resize to `(new_h, new_w)`.
pub(crate) fn resize_bilinear(src: &Array2<f32>, new_h: usize, new_w: usize) -> Result<Array2<f32>> {
    let (old_h, old_w) = src.dim();
    if new_h == 0 || new_w == 0 {
        return Err(Error::transform("resize", "target shape must be positive"));
    }
    let scale_h = old_h as f32 / new_h as f32;
    let scale_w = old_w as f32 / new_w as f32;

    let mut out = vec![0.0f32; new_h * new_w];
    out.par_chunks_mut(new_w).enumerate().for_each(|(r, out_row)| {
        let src_r = (r as f32 * scale_h).min(old_h as f32 - 1.0);
        for (c, value) in out_row.iter_mut().enumerate() {
            let src_c = (c as f32 * scale_w).min(old_w as f32 - 1.0);
            *value = sample_bilinear(src, src_r, src_c);
        }
    });
    from_buffer(new_h, new_w, out)
}

/// Intensity-weighted centroid as `(row, col)`, or `None` for an all-zero
/// mask.
pub(crate) fn center_of_mass(src: &Array2<f32>) -> Option<(f64, f64)> {
    let mut total = 0.0f64;
    let mut row_acc = 0.0f64;
    let mut col_acc = 0.0f64;
    for ((r, c), &v) in src.indexed_iter() {
        let v = f64::from(v);
        total += v;
        row_acc += v * r as f64;
        col_acc += v * c as f64;
    }
    if total == 0.0 {
        None
    } else {
        Some((row_acc / total, col_acc / total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_zero_angle_is_identity() {
        let src = Array2::from_shape_fn((5, 7), |(r, c)| (r * 7 + c) as f32);
        let out = rotate(&src, 0.0).unwrap();
        for (a, b) in src.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotate_360_matches_identity() {
        let src = Array2::from_shape_fn((6, 6), |(r, c)| ((r + 2 * c) % 5) as f32);
        let out = rotate(&src, 360.0).unwrap();
        for (a, b) in src.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_gaussian_filter_preserves_constant_interior() {
        let src = Array2::from_elem((32, 32), 2.0f32);
        let out = gaussian_filter(&src, 1.0).unwrap();
        // Away from the zero boundary the response to a constant field is
        // the constant itself.
        assert!((out[[16, 16]] - 2.0).abs() < 1e-4);
        // Near the border the constant-zero padding bleeds in.
        assert!(out[[0, 0]] < 2.0);
    }

    #[test]
    fn test_map_coordinates_identity() {
        let src = Array2::from_shape_fn((4, 3), |(r, c)| (r * 3 + c) as f32);
        let rows = Array2::from_shape_fn((4, 3), |(r, _)| r as f32);
        let cols = Array2::from_shape_fn((4, 3), |(_, c)| c as f32);
        let out = map_coordinates(&src, &rows, &cols).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_center_of_mass() {
        let mut mask = Array2::zeros((9, 9));
        mask[[2, 6]] = 1.0;
        assert_eq!(center_of_mass(&mask), Some((2.0, 6.0)));

        let empty: Array2<f32> = Array2::zeros((3, 3));
        assert_eq!(center_of_mass(&empty), None);
    }

    #[test]
    fn test_resize_doubles_shape() {
        let src = Array2::from_shape_fn((4, 4), |(r, c)| (r + c) as f32);
        let out = resize_bilinear(&src, 8, 8).unwrap();
        assert_eq!(out.dim(), (8, 8));
        assert!((out[[0, 0]] - src[[0, 0]]).abs() < 1e-6);
    }
}
