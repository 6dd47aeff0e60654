//! Derives the animation key from a parsed SVG frame and the key bytes.
//!
//! This reproduces the browser routine: one frame row drives a color and a
//! rotation interpolation along a cubic-bezier timing curve, and the
//! resulting numbers are hex-packed into an opaque lowercase string.

use crate::error::Error;
use crate::numeric::{
    Cubic, float_to_hex, interpolate, js_round, lerp, odd_coefficient, rotation_matrix, solve,
};

/// Divisor mapping the frame-time product onto the curve's time axis.
const TOTAL_ANIMATION_TIME: f64 = 4096.0;
/// Row selectors and frame-time factors are taken modulo 16.
const ROW_MODULUS: u8 = 16;
/// Rows shorter than this are right-padded with zeros.
const ROW_WIDTH: usize = 15;

/// Computes the animation key for one set of signing material.
pub fn compute_animation_key(
    frames: &[Vec<i32>],
    key_bytes: &[u8],
    row_index: usize,
    key_bytes_indices: &[usize],
) -> Result<String, Error> {
    if key_bytes.is_empty() {
        return Err(Error::Parse("no key bytes for row selection".into()));
    }
    if frames.is_empty() {
        return Err(Error::Extraction("no frame rows to animate".into()));
    }

    let actual_row_index = row_index.min(key_bytes.len() - 1);
    let row_selector = usize::from(key_bytes[actual_row_index] % ROW_MODULUS);

    let frame_time = key_bytes_indices
        .iter()
        .filter_map(|&index| key_bytes.get(index))
        .map(|&byte| f64::from(byte % ROW_MODULUS))
        .product::<f64>();
    let frame_time = js_round(frame_time / 10.0) * 10.0;

    // Out-of-range selectors fall back to the first row, matching the
    // browser's behavior.
    let frame_row = frames.get(row_selector).unwrap_or(&frames[0]);

    let target_time = frame_time / TOTAL_ANIMATION_TIME;
    Ok(animate(frame_row, target_time))
}

/// Runs the interpolation for one frame row at one point in time.
#[expect(
    clippy::cast_possible_truncation,
    reason = "color components are clamped to [0, 255] before truncation"
)]
fn animate(frame_row: &[i32], target_time: f64) -> String {
    let mut row = frame_row.iter().map(|&v| f64::from(v)).collect::<Vec<_>>();
    row.resize(ROW_WIDTH.max(row.len()), 0.0);

    let from_color = [row[0], row[1], row[2], 1.0];
    let to_color = [row[3], row[4], row[5], 1.0];

    let from_rotation = 0.0;
    let to_rotation = solve(row[6], 60.0, 360.0, true);

    let curves = row[7..]
        .iter()
        .enumerate()
        .map(|(idx, &value)| solve(value, odd_coefficient(idx), 1.0, false))
        .collect::<Vec<_>>();

    let factor = Cubic::new(curves).value(target_time);

    let color = interpolate(&from_color, &to_color, factor)
        .into_iter()
        .map(|component| component.clamp(0.0, 255.0))
        .collect::<Vec<_>>();
    let rotation = lerp(from_rotation, to_rotation, factor);
    let matrix = rotation_matrix(rotation);

    let mut parts = Vec::with_capacity(9);

    for component in &color[..3] {
        parts.push(format!("{:x}", component.round() as i64));
    }

    for value in matrix {
        let rounded = ((value * 100.0).round() / 100.0).abs();
        let hex = float_to_hex(rounded);
        if hex.starts_with('.') {
            parts.push(format!("0{hex}"));
        } else if hex.is_empty() {
            parts.push("0".to_owned());
        } else {
            parts.push(hex);
        }
    }

    parts.push("0".to_owned());
    parts.push("0".to_owned());

    parts.join("").replace(['.', '-'], "").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_row(head: &[i32]) -> Vec<i32> {
        let mut row = head.to_vec();
        row.resize(15, 0);
        row
    }

    #[test]
    fn test_animate_at_curve_end() {
        // row[6] = 26 solves to a 90-degree rotation; at the end of the
        // curve the color lands on to_color and the matrix is
        // [cos 90, sin 90, -sin 90, cos 90] -> 0 1 1 0 after abs.
        let row = padded_row(&[0, 0, 0, 255, 255, 255, 26]);
        assert_eq!(animate(&row, 1.0), "ffffff011000");
    }

    #[test]
    fn test_animate_at_curve_start() {
        // At time zero nothing has moved: from_color black, identity matrix.
        let row = padded_row(&[0, 0, 0, 255, 255, 255, 26]);
        assert_eq!(animate(&row, 0.0), "000100100");
    }

    #[test]
    fn test_animate_pads_short_rows() {
        let short = vec![10, 20, 30];
        let padded = padded_row(&[10, 20, 30]);
        assert_eq!(animate(&short, 0.25), animate(&padded, 0.25));
    }

    #[test]
    fn test_animation_key_deterministic() {
        let frames = vec![
            padded_row(&[12, 34, 56, 78, 90, 110, 130, 150, 170, 190, 210, 230]),
            padded_row(&[200, 100, 50, 25, 12, 6, 3, 250, 125, 60, 30, 15]),
        ];
        let key_bytes = [7, 3, 9, 1, 4, 6, 2, 8];
        let indices = [1, 2, 4];

        let first = compute_animation_key(&frames, &key_bytes, 0, &indices).unwrap();
        let second = compute_animation_key(&frames, &key_bytes, 0, &indices).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_row_index_clamped_to_key_length() {
        let frames = vec![padded_row(&[1, 2, 3, 4, 5, 6, 7])];
        let key_bytes = [9, 9, 9, 9, 9, 9];
        // A row index far past the key length clamps to the last byte.
        let clamped = compute_animation_key(&frames, &key_bytes, 100, &[1]).unwrap();
        let last = compute_animation_key(&frames, &key_bytes, 5, &[1]).unwrap();
        assert_eq!(clamped, last);
    }

    #[test]
    fn test_out_of_range_selector_falls_back_to_first_row() {
        let frames = vec![padded_row(&[50, 60, 70, 80, 90, 100, 110])];
        // key_bytes[0] % 16 = 9, beyond the single row.
        let key_bytes = [9, 0, 0, 0, 0, 0];
        let fallback = compute_animation_key(&frames, &key_bytes, 0, &[]).unwrap();
        // key_bytes[0] % 16 = 0 hits the first row directly.
        let direct = compute_animation_key(&frames, &[0, 0, 0, 0, 0, 0], 0, &[]).unwrap();
        assert_eq!(fallback, direct);
    }

    #[test]
    fn test_out_of_range_indices_skipped_in_frame_time() {
        let frames = vec![padded_row(&[1, 2, 3, 4, 5, 6, 7])];
        let key_bytes = [3, 5, 0, 0, 0, 0];
        let with_stray = compute_animation_key(&frames, &key_bytes, 0, &[1, 99]).unwrap();
        let without = compute_animation_key(&frames, &key_bytes, 0, &[1]).unwrap();
        assert_eq!(with_stray, without);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let frames = vec![padded_row(&[1, 2, 3])];
        assert!(matches!(
            compute_animation_key(&frames, &[], 0, &[]),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            compute_animation_key(&[], &[1, 2, 3, 4, 5, 6], 0, &[]),
            Err(Error::Extraction(_))
        ));
    }
}
