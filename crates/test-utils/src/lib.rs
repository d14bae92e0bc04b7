//! Shared test utilities for the binning workspace.
//!
//! This crate provides:
//! - Synthetic observation generators (slices, tiles, products)
//! - Fixture configurations covering every aggregator kind
//! - Approximate-equality assertions for feature vectors
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! ```ignore
//! use test_utils::{fixtures, create_global_product, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Approximate floating-point equality.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.632_993_f32, 1.633, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Element-wise approximate equality of two feature vectors. NaN only
/// matches NaN.
///
/// ```ignore
/// use test_utils::assert_features_approx_eq;
///
/// assert_features_approx_eq!(bin.output(), [0.2, 0.6, 4.0, 1.633], 1e-3);
/// ```
#[macro_export]
macro_rules! assert_features_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let actual: Vec<f64> = $actual.iter().map(|&v| v as f64).collect();
        let expected: Vec<f64> = $expected.iter().map(|&v| v as f64).collect();
        assert_eq!(
            actual.len(),
            expected.len(),
            "feature count differs: {:?} vs {:?}",
            actual,
            expected
        );
        for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
            let matches = if e.is_nan() {
                a.is_nan()
            } else {
                (a - e).abs() <= $epsilon as f64
            };
            if !matches {
                panic!(
                    "assertion failed: feature {} differs\n  actual: `{:?}`,\nexpected: `{:?}`",
                    i, actual, expected
                );
            }
        }
    }};
}
