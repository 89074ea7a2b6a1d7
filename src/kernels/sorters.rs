use crate::errors::FitError;

/// Returns the indices of `scores` ordered by descending score.
///
/// The sort is stable: equal scores keep their prior relative order, which
/// the genetic optimizer relies on for deterministic tie-breaking. A score
/// that cannot be ordered (NaN) is a `SortError`.
pub fn sort_indices_desc(scores: &[f64]) -> Result<Vec<usize>, FitError> {
    if let Some(pos) = scores.iter().position(|s| s.is_nan()) {
        return Err(FitError::sort_error(format!(
            "score {} is NaN and cannot be ordered",
            pos
        )));
    }
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .expect("NaN scores were rejected above")
    });
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn orders_indices_by_descending_score() {
        let scores = [0.1, 5.0, -2.0, 3.0];
        assert_eq!(sort_indices_desc(&scores).unwrap(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn ties_preserve_prior_relative_order() {
        let scores = [1.0, 3.0, 1.0, 3.0, 1.0];
        assert_eq!(sort_indices_desc(&scores).unwrap(), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn nan_scores_are_a_sort_error() {
        let scores = [1.0, f64::NAN, 2.0];
        assert_eq!(
            sort_indices_desc(&scores).unwrap_err().kind(),
            ErrorKind::SortError
        );
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(sort_indices_desc(&[]).unwrap().is_empty());
    }
}
