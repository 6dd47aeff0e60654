//! Bezier, matrix, and float-encoding math behind the animation key.
//!
//! Every routine here must match the browser-side originals bit-for-bit;
//! the `sin` sign in the rotation matrix and the bezier boundary gradients
//! are the spots that historically broke signing.

/// Cubic bezier timing curve, like CSS `cubic-bezier(x1, y1, x2, y2)`.
///
/// Holds the full solved control-point sequence; only the first four values
/// participate in evaluation. Fewer than four degenerates to identity.
pub struct Cubic {
    curves: Vec<f64>,
}

impl Cubic {
    pub const fn new(curves: Vec<f64>) -> Self {
        Self { curves }
    }

    /// Returns the Y value for a target X (time), solving by bisection.
    ///
    /// Outside `[0, 1]` the curve extends linearly along its boundary
    /// gradient. A degenerate horizontal start/end axis falls back to the
    /// opposite control point, or to a flat gradient.
    #[expect(clippy::float_cmp, reason = "boundary conditions are exact")]
    pub fn value(&self, time: f64) -> f64 {
        if self.curves.len() < 4 {
            return time;
        }
        let (x1, y1, x2, y2) = (self.curves[0], self.curves[1], self.curves[2], self.curves[3]);

        if time <= 0.0 {
            let start_gradient = if x1 > 0.0 {
                y1 / x1
            } else if y1 == 0.0 && x2 > 0.0 {
                y2 / x2
            } else {
                0.0
            };
            return start_gradient * time;
        }

        if time >= 1.0 {
            let end_gradient = if x2 < 1.0 {
                (y2 - 1.0) / (x2 - 1.0)
            } else if x2 == 1.0 && x1 < 1.0 {
                (y1 - 1.0) / (x1 - 1.0)
            } else {
                0.0
            };
            return 1.0 + end_gradient * (time - 1.0);
        }

        let mut low = 0.0_f64;
        let mut high = 1.0_f64;
        let mut mid = 0.0_f64;

        while low < high {
            mid = (low + high) / 2.0;
            let x_estimate = bezier(x1, x2, mid);
            if (time - x_estimate).abs() < 1e-5 {
                return bezier(y1, y2, mid);
            }
            if (high - low).abs() < f64::EPSILON {
                break;
            }
            if x_estimate < time {
                low = mid;
            } else {
                high = mid;
            }
        }

        bezier(y1, y2, mid)
    }
}

/// One-dimensional cubic bezier with implicit endpoints 0 and 1:
/// `3·p1·(1−m)²·m + 3·p2·(1−m)·m² + m³`.
fn bezier(p1: f64, p2: f64, m: f64) -> f64 {
    let complement = 1.0 - m;
    3.0 * p1 * complement * complement * m + 3.0 * p2 * complement * m * m + m * m * m
}

/// Converts a rotation in degrees to the flattened 2x2 matrix
/// `[cos, sin, -sin, cos]`, the ordering `getComputedStyle()` reports.
pub fn rotation_matrix(degrees: f64) -> [f64; 4] {
    let radians = degrees.to_radians();
    let cos = radians.cos();
    let sin = radians.sin();
    [cos, sin, -sin, cos]
}

/// Element-wise linear interpolation of `from` toward `to`.
///
/// The slices must be the same length; the caller guarantees it here since
/// both sides always come from the same frame row.
pub fn interpolate(from: &[f64], to: &[f64], factor: f64) -> Vec<f64> {
    from.iter()
        .zip(to.iter())
        .map(|(&from_val, &to_val)| lerp(from_val, to_val, factor))
        .collect()
}

pub fn lerp(from: f64, to: f64, factor: f64) -> f64 {
    from + (to - from) * factor
}

/// Scales a raw byte value into `[min_val, max_val]`.
///
/// With `rounding` the result is floored (rotation); otherwise it is
/// rounded to two decimals (curve control points).
pub fn solve(value: f64, min_val: f64, max_val: f64, rounding: bool) -> f64 {
    let result = value * (max_val - min_val) / 255.0 + min_val;
    if rounding {
        result.floor()
    } else {
        (result * 100.0).round() / 100.0
    }
}

/// -1.0 for odd indices, 0.0 for even; the lower bound of each curve
/// control point.
pub const fn odd_coefficient(num: usize) -> f64 {
    if num % 2 == 1 { -1.0 } else { 0.0 }
}

/// Rounds with JavaScript `Math.round()` semantics: exactly -0.5 maps to 0
/// (toward positive infinity), unlike Rust's away-from-zero rounding.
#[expect(clippy::float_cmp, reason = "checking the exact -0.5 tie")]
pub fn js_round(num: f64) -> f64 {
    let decimal_part = num - num.trunc();
    if decimal_part == -0.5 { num.ceil() } else { num.round() }
}

/// Converts a non-negative float to hex with true base-16 division for the
/// integer part and up to 19 fractional digits (e.g. `10.0` -> `"A"`,
/// `0.5` -> `"0.8"`).
///
/// Digits above 9 come out uppercase; the animation assembly lowercases.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "inputs are small rounded magnitudes"
)]
pub fn float_to_hex(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }

    let digit_to_char = |digit: u32| -> char {
        if digit > 9 {
            char::from_u32(digit + 55).unwrap_or('?')
        } else {
            char::from_digit(digit, 10).unwrap_or('?')
        }
    };

    let mut result = String::new();
    let mut quotient = value.floor() as u64;
    let mut fraction = value - value.floor();

    if quotient == 0 {
        result.push('0');
    } else {
        let mut digits = Vec::new();
        while quotient > 0 {
            digits.push(digit_to_char((quotient % 16) as u32));
            quotient /= 16;
        }
        result.extend(digits.into_iter().rev());
    }

    if fraction > 0.0 {
        result.push('.');
        let mut emitted = 0;
        while fraction > 0.0 && emitted < 19 {
            fraction *= 16.0;
            let integer_part = fraction.floor() as u32;
            fraction -= f64::from(integer_part);
            result.push(digit_to_char(integer_part));
            emitted += 1;
        }
    }

    result
}
