//! Sample-weighted averaging of parameter vectors and evaluation losses.

use comms::{Parameters, params};
use ndarray::ArrayD;

use crate::{AggregationErr, EvaluateRes, FitRes, Result};

/// Computes the sample-weighted arithmetic mean of a round's contributions.
///
/// For every array position the result is `sum(samples_i * value_i) / sum(samples_i)`.
///
/// # Arguments
/// * `round` - The round being aggregated, used for error reporting.
/// * `results` - The successful contributions of the round.
///
/// # Returns
/// `None` if there is nothing to average (no contributions or no samples at all),
/// or a `ShapeMismatch` error if the contributions with samples don't share the same shapes.
pub fn weighted_average(round: u64, results: &[FitRes]) -> Result<Option<Parameters>> {
    // Contributions without samples carry no weight, whatever their shapes.
    let contributing: Vec<_> = results
        .iter()
        .enumerate()
        .filter(|(_, res)| res.samples > 0)
        .collect();

    let Some((_, first)) = contributing.first() else {
        return Ok(None);
    };

    let expected = params::shapes(&first.params);
    for &(contribution, res) in &contributing[1..] {
        let got = params::shapes(&res.params);
        if got != expected {
            return Err(AggregationErr::ShapeMismatch {
                round,
                contribution,
                expected,
                got,
            });
        }
    }

    let mut acc: Parameters = first
        .params
        .iter()
        .map(|arr| ArrayD::zeros(arr.raw_dim()))
        .collect();

    let mut total = 0;
    for (_, res) in &contributing {
        let weight = res.samples as f32;
        for (sum, arr) in acc.iter_mut().zip(&res.params) {
            sum.scaled_add(weight, arr);
        }
        total += res.samples;
    }

    let total = total as f32;
    for sum in &mut acc {
        sum.mapv_inplace(|x| x / total);
    }

    Ok(Some(acc))
}

/// Computes the sample-weighted mean loss of an evaluation round.
///
/// # Returns
/// `None` if no samples took part in the evaluation.
pub fn weighted_loss(results: &[EvaluateRes]) -> Option<f32> {
    let total: u64 = results.iter().map(|res| res.samples).sum();
    if total == 0 {
        return None;
    }

    let weighted: f64 = results
        .iter()
        .map(|res| res.loss as f64 * res.samples as f64)
        .sum();

    Some((weighted / total as f64) as f32)
}
