//! The parameter vector exchanged between tiers: an ordered list of numeric arrays.

use ndarray::ArrayD;

/// An ordered list of numeric arrays, one per model tensor.
pub type Parameters = Vec<ArrayD<f32>>;

/// Returns the shape signature of a parameter vector.
///
/// # Arguments
/// * `params` - The parameter vector.
///
/// # Returns
/// The shape of every array, in order.
pub fn shapes(params: &[ArrayD<f32>]) -> Vec<Vec<usize>> {
    params.iter().map(|arr| arr.shape().to_vec()).collect()
}

/// Returns the total amount of scalars held by a parameter vector.
pub fn num_elements(params: &[ArrayD<f32>]) -> usize {
    params.iter().map(ArrayD::len).sum()
}
