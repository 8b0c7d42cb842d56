//! Descriptive statistics over observed values

/// Sort a copy of the values ascending, in IEEE total order.
///
/// Loaders turn NaN cells into missing values, so none should reach here;
/// if one does it sorts to the end instead of scrambling the order.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quantile with linear interpolation between closest ranks.
///
/// `q` is in `[0, 1]`. Returns `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    Some(quantile_sorted(&sorted, q))
}

pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties resolve to the smallest value.
pub fn mode(values: &[f64]) -> Option<f64> {
    let sorted = sorted(values);
    let mut best: Option<(f64, usize)> = None;
    let mut idx = 0;
    while idx < sorted.len() {
        let value = sorted[idx];
        let run = sorted[idx..].iter().take_while(|&&v| v == value).count();
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((value, run));
        }
        idx += run;
    }
    best.map(|(value, _)| value)
}

/// Pearson correlation; `None` when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x)?;
    let mean_y = mean(y)?;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&values, 0.75), Some(3.25));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_sorted_puts_nan_last() {
        assert_eq!(sorted(&[3.0, f64::NAN, 1.0])[..2], [1.0, 3.0]);
        assert!(sorted(&[f64::NAN, 2.0])[1].is_nan());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert_eq!(mode(&[5.0, 1.0, 5.0, 1.0, 3.0]), Some(1.0));
        assert_eq!(mode(&[2.0, 7.0, 7.0]), Some(7.0));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[1.0, 1.0, 1.0, 1.0]), None);
    }
}
