/*!
 * # Statistics helpers
 *
 * Small numeric routines shared by the analytical components. Empty input
 * yields `None` instead of NaN.
 */

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// `σ / μ`; `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    if mu.abs() < f64::EPSILON {
        return None;
    }
    Some(std_dev(values)? / mu.abs())
}

/// Weighted mean with linear-decay weights: the last value gets weight `n`,
/// the first gets weight 1.
pub fn linear_decay_weighted_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let (weighted, total) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(weighted, total), (i, v)| {
            let w = (i + 1) as f64;
            (weighted + w * v, total + w)
        });
    Some(weighted / total)
}

/// Ordinary least squares fit of `values` against their index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// OLS over `(0, v0), (1, v1), ...`; needs at least two points.
pub fn linear_regression(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = mean(values)?;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    Some(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
    })
}

pub fn slope(values: &[f64]) -> Option<f64> {
    linear_regression(values).map(|fit| fit.slope)
}

/// Theil-Sen fit: the slope is the median of all pairwise slopes and the
/// intercept the median of `v - slope × i`. A single outlying point cannot
/// move either median. Needs at least two points.
pub fn theil_sen(values: &[f64]) -> Option<LinearFit> {
    if values.len() < 2 {
        return None;
    }
    let mut slopes = Vec::with_capacity(values.len() * (values.len() - 1) / 2);
    for (i, a) in values.iter().enumerate() {
        for (j, b) in values.iter().enumerate().skip(i + 1) {
            slopes.push((b - a) / (j - i) as f64);
        }
    }
    let slope = median(&slopes)?;
    let offsets: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| v - slope * i as f64)
        .collect();
    Some(LinearFit {
        slope,
        intercept: median(&offsets)?,
    })
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Linearly interpolated quantile; NaN entries are ignored.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let frac = position - lower as f64;
    Some(sorted[lower] * (1.0 - frac) + sorted[upper] * frac)
}

/// Tukey fences `(q1 - k·iqr, q3 + k·iqr)`.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert_eq!(linear_decay_weighted_mean(&[]), None);
        assert_eq!(linear_regression(&[1.0]), None);
    }

    #[test]
    fn population_std_dev() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(approx(sd, 2.0));
    }

    #[test]
    fn coefficient_of_variation_guards_zero_mean() {
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
        assert!(approx(coefficient_of_variation(&[5.0, 5.0]).unwrap(), 0.0));
    }

    #[test]
    fn recent_values_weigh_more() {
        // weights 1, 2, 3
        let wm = linear_decay_weighted_mean(&[0.0, 0.0, 6.0]).unwrap();
        assert!(approx(wm, 3.0));
    }

    #[test]
    fn regression_recovers_a_line() {
        let fit = linear_regression(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!(approx(fit.slope, 2.0));
        assert!(approx(fit.intercept, 1.0));
        assert!(approx(fit.at(4.0), 9.0));
        assert!(approx(slope(&[5.0, 5.0, 5.0]).unwrap(), 0.0));
    }

    #[test]
    fn theil_sen_ignores_a_single_outlier() {
        let fit = theil_sen(&[50.0, 200.0, 50.0, 50.0, 50.0, 50.0, 50.0]).unwrap();
        assert!(approx(fit.slope, 0.0));
        assert!(approx(fit.intercept, 50.0));
        // OLS is dragged down by the same point
        assert!(slope(&[50.0, 200.0, 50.0, 50.0, 50.0, 50.0, 50.0]).unwrap() < -5.0);

        let line = theil_sen(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!(approx(line.slope, 2.0));
        assert!(approx(line.intercept, 1.0));
        assert_eq!(theil_sen(&[1.0]), None);
    }

    #[test]
    fn quantiles_interpolate() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!(approx(median(&values).unwrap(), 2.5));
        assert!(approx(quantile(&values, 0.25).unwrap(), 1.75));
        assert!(approx(quantile(&values, 1.0).unwrap(), 4.0));
        assert_eq!(quantile(&values, 1.5), None);
        assert_eq!(median(&[]), None);

        let (low, high) = iqr_bounds(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.5).unwrap();
        assert!(approx(low, -1.0));
        assert!(approx(high, 7.0));
    }
}
