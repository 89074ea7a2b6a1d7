#![allow(unexpected_cfgs)]

use nalgebra::DVector;

cfg_if::cfg_if! {
    if #[cfg(feature = "RUSTC_IS_NIGHTLY")] {
        pub use core::intrinsics::{likely, unlikely};
    } else {
        #[inline]
        pub fn likely(b: bool) -> bool {
            b
        }

        #[inline]
        pub fn unlikely(b: bool) -> bool {
            b
        }
    }
}

/// Robust euclidean norm of a vector.
///
/// Accumulates large, mid-range and small components separately so that the
/// result neither overflows nor underflows for extreme inputs. We need only
/// f64 in this crate, so no generics here.
#[inline]
pub fn enorm(v: &DVector<f64>) -> f64 {
    let mut s1 = 0.0_f64;
    let mut s2 = 0.0_f64;
    let mut s3 = 0.0_f64;
    let mut x1max = 0.0_f64;
    let mut x3max = 0.0_f64;
    let agiant = f64::MAX.sqrt() / (v.nrows().max(1) as f64);
    let rdwarf = f64::MIN_POSITIVE.sqrt();
    for xi in v.iter() {
        let xabs = xi.abs();
        if unlikely(xabs.is_nan()) {
            return xabs;
        }
        if unlikely(xabs >= agiant || xabs <= rdwarf) {
            if xabs > rdwarf {
                // sum for large components
                if xabs > x1max {
                    s1 = 1.0 + s1 * (x1max / xabs).powi(2);
                    x1max = xabs;
                } else {
                    s1 += (xabs / x1max).powi(2);
                }
            } else {
                // sum for small components
                if xabs > x3max {
                    s3 = 1.0 + s3 * (x3max / xabs).powi(2);
                    x3max = xabs;
                } else if xabs != 0.0 {
                    s3 += (xabs / x3max).powi(2);
                }
            }
        } else {
            s2 += xabs * xabs;
        }
    }

    if unlikely(s1 != 0.0) {
        x1max * (s1 + (s2 / x1max) / x1max).sqrt()
    } else if likely(s2 != 0.0) {
        if likely(s2 >= x3max) {
            (s2 * (1.0 + (x3max / s2) * (x3max * s3))).sqrt()
        } else {
            (x3max * ((s2 / x3max) + (x3max * s3))).sqrt()
        }
    } else {
        x3max * s3.sqrt()
    }
}

/// Sum of squared residuals.
#[inline]
pub fn chi_squared(residuals: &DVector<f64>) -> f64 {
    let norm = enorm(residuals);
    norm * norm
}
