//! Pure aggregation math for C11 (spec §4.11): median + MAD outlier
//! filter, then a weighted median over the survivors. No I/O, so this is
//! unit-tested directly rather than through the async fetch/publish loop.

/// Survivors are kept within `median ± OUTLIER_FACTOR * MAD` of the raw
/// sample set. Spec §4.11 names the shape of the filter but not this
/// constant; 3.0 is the usual robust-statistics default (about 2 standard
/// deviations under a normal approximation) and is recorded here, not
/// buried in the loop.
pub const OUTLIER_FACTOR: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub source_id: uuid::Uuid,
    pub weight: f64,
    pub price: f64,
}

fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    // Sources are external price feeds; a malformed NaN must not panic the
    // aggregator, so this orders by total order rather than partial_cmp.
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median absolute deviation, unscaled (no 1.4826 normalization -- the
/// `OUTLIER_FACTOR` constant already absorbs that).
fn mad(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Drops samples outside `median ± OUTLIER_FACTOR * MAD`. When MAD is zero
/// (all samples identical, or too few to disagree) every sample survives.
pub fn filter_outliers(samples: &[Sample]) -> Vec<Sample> {
    let prices: Vec<f64> = samples.iter().map(|s| s.price).collect();
    let center = median(&prices);
    let spread = mad(&prices, center);
    if spread == 0.0 {
        return samples.to_vec();
    }
    let bound = OUTLIER_FACTOR * spread;
    samples
        .iter()
        .copied()
        .filter(|s| (s.price - center).abs() <= bound)
        .collect()
}

/// Weighted median: sorts by price, then walks the cumulative weight until
/// it crosses half the total, per spec §4.11's "Compute weighted median on
/// remaining".
pub fn weighted_median(samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<Sample> = samples.to_vec();
    sorted.sort_by(|a, b| a.price.total_cmp(&b.price));
    let total_weight: f64 = sorted.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return Some(median(&sorted.iter().map(|s| s.price).collect::<Vec<_>>()));
    }
    let half = total_weight / 2.0;
    let mut cumulative = 0.0;
    for sample in &sorted {
        cumulative += sample.weight;
        if cumulative >= half {
            return Some(sample.price);
        }
    }
    sorted.last().map(|s| s.price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(price: f64, weight: f64) -> Sample {
        Sample { source_id: uuid::Uuid::new_v4(), weight, price }
    }

    #[test]
    fn filters_single_outlier() {
        let samples = vec![sample(10.0, 1.0), sample(10.1, 1.0), sample(10.05, 1.0), sample(50.0, 1.0)];
        let survivors = filter_outliers(&samples);
        assert_eq!(survivors.len(), 3);
        assert!(survivors.iter().all(|s| s.price < 20.0));
    }

    #[test]
    fn weighted_median_favors_heavier_source() {
        let samples = vec![sample(10.0, 1.0), sample(10.5, 1.0), sample(9.0, 10.0)];
        let result = weighted_median(&samples).unwrap();
        assert_eq!(result, 9.0);
    }

    #[test]
    fn identical_samples_have_zero_spread_and_all_survive() {
        let samples = vec![sample(10.0, 1.0), sample(10.0, 1.0), sample(10.0, 1.0)];
        assert_eq!(filter_outliers(&samples).len(), 3);
    }
}
