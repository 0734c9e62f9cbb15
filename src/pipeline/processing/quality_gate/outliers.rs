//! Robust outlier scoring (modified z-score).

use crate::common::constants::MIN_SERIES_FOR_OUTLIERS;

/// 1 / 0.6745: scales MAD to a standard deviation for normal data.
const MAD_SCALE: f64 = 1.4826;
/// sqrt(pi / 2): scales mean absolute deviation the same way.
const MEAN_AD_SCALE: f64 = 1.2533;

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median and robust spread of a series, or `None` when the series is too
/// short or has no spread at all.
pub fn center_and_spread(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < MIN_SERIES_FOR_OUTLIERS {
        return None;
    }
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&deviations)?;
    let spread = if mad > 0.0 {
        MAD_SCALE * mad
    } else {
        let mean_ad = deviations.iter().sum::<f64>() / deviations.len() as f64;
        MEAN_AD_SCALE * mean_ad
    };
    (spread > 0.0).then_some((center, spread))
}

/// Modified z-score of every value, in input order.
pub fn modified_z_scores(values: &[f64]) -> Option<Vec<f64>> {
    let (center, spread) = center_and_spread(values)?;
    Some(values.iter().map(|v| (v - center).abs() / spread).collect())
}

/// Indices whose score exceeds `threshold`.
pub fn flag_outliers(values: &[f64], threshold: f64) -> Vec<(usize, f64)> {
    modified_z_scores(values)
        .map(|scores| {
            scores
                .into_iter()
                .enumerate()
                .filter(|(_, score)| *score > threshold)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_median_of_even_series_averages_middle() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_single_spike_is_flagged() {
        let values = [20.0, 21.0, 19.5, 20.5, 20.0, 21.5, 45.0];
        let flagged = flag_outliers(&values, 3.5);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, 6);
    }

    #[test]
    fn test_short_or_flat_series_flags_nothing() {
        assert!(flag_outliers(&[1.0, 100.0], 3.5).is_empty());
        assert!(flag_outliers(&[5.0, 5.0, 5.0, 5.0], 3.5).is_empty());
    }

    #[test]
    fn test_zero_mad_falls_back_to_mean_deviation() {
        // MAD is 0 because most values equal the median
        let values = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 50.0];
        let (center, spread) = center_and_spread(&values).unwrap();
        assert_eq!(center, 10.0);
        assert!((spread - MEAN_AD_SCALE * 4.0).abs() < 1e-9);
        assert_eq!(flag_outliers(&values, 3.5).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_pushing_an_extreme_value_further_keeps_its_flag(
            base in proptest::collection::vec(0.0..100.0f64, 4..20),
            start in 0.0..500.0f64,
            extra in 0.0..1000.0f64,
            threshold in 1.0..6.0f64,
        ) {
            let max = base.iter().cloned().fold(f64::MIN, f64::max);
            let mut near = base.clone();
            near.push(max + start);
            let mut far = base.clone();
            far.push(max + start + extra);

            let idx = base.len();
            let flagged_near = flag_outliers(&near, threshold).iter().any(|(i, _)| *i == idx);
            let flagged_far = flag_outliers(&far, threshold).iter().any(|(i, _)| *i == idx);
            prop_assert!(!flagged_near || flagged_far);
        }

        #[test]
        fn prop_flagged_scores_exceed_threshold(
            values in proptest::collection::vec(-50.0..50.0f64, 3..30),
            threshold in 1.0..6.0f64,
        ) {
            for (_, score) in flag_outliers(&values, threshold) {
                prop_assert!(score > threshold);
            }
        }
    }
}
