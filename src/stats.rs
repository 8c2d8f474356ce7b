//! Numeric kernels shared by the metrics calculator.
//!
//! Every function returns `NaN` for inputs that are too short to define the
//! statistic instead of panicking.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample covariance (`n - 1` denominator).
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_a = mean(&a[..n]);
    let mean_b = mean(&b[..n]);
    let sum: f64 = a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    sum / (n as f64 - 1.0)
}

pub fn sample_variance(values: &[f64]) -> f64 {
    covariance(values, values)
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Sample covariance matrix of equally long columns.
pub fn covariance_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = covariance(&columns[i], &columns[j]);
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    cov
}

/// `wᵀ Σ w`.
pub fn quadratic_form(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

/// Quantile with linear interpolation between closest ranks
/// (`(len - 1) * q` positioning).
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Running product of `1 + r`.
pub fn cumulative_growth(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

/// Most negative `value / running_peak - 1` along the path; `0` for a
/// non-decreasing path.
pub fn max_drawdown(path: &[f64]) -> f64 {
    if path.is_empty() {
        return f64::NAN;
    }
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for &value in path {
        peak = peak.max(value);
        let dd = value / peak - 1.0;
        if dd < worst {
            worst = dd;
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&v) - 2.5).abs() < 1e-12);
        assert!((sample_variance(&v) - 5.0 / 3.0).abs() < 1e-12);
        assert!(mean(&[]).is_nan());
        assert!(sample_variance(&[1.0]).is_nan());
    }

    #[test]
    fn test_covariance_matrix_symmetry() {
        let cols = vec![
            vec![0.01, -0.02, 0.03, 0.00, 0.015],
            vec![0.02, -0.01, 0.01, 0.005, -0.01],
            vec![-0.01, 0.02, -0.02, 0.01, 0.0],
        ];
        let cov = covariance_matrix(&cols);
        for i in 0..3 {
            assert!(cov[i][i] > 0.0, "Variance should be positive");
            for j in 0..3 {
                assert!((cov[i][j] - cov[j][i]).abs() < 1e-15);
            }
        }
        assert!((cov[0][0] - sample_variance(&cols[0])).abs() < 1e-15);
    }

    #[test]
    fn test_quadratic_form_equal_weights() {
        let cov = vec![vec![0.04, 0.01], vec![0.01, 0.09]];
        let w = [0.5, 0.5];
        // 0.25*0.04 + 2*0.25*0.01 + 0.25*0.09
        assert!((quadratic_form(&w, &cov) - 0.0375).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_interpolates() {
        let v: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        assert!((quantile(&v, 0.5) - 5.5).abs() < 1e-12);
        assert!((quantile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&v, 1.0) - 10.0).abs() < 1e-12);
        assert!((quantile(&v, 0.05) - 1.45).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
        assert_eq!(quantile(&[3.0], 0.05), 3.0);
    }

    #[test]
    fn test_cumulative_growth() {
        let path = cumulative_growth(&[0.1, -0.5, 1.0]);
        assert!((path[0] - 1.1).abs() < 1e-12);
        assert!((path[1] - 0.55).abs() < 1e-12);
        assert!((path[2] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown() {
        assert_eq!(max_drawdown(&[1.0, 1.0, 1.2, 1.3]), 0.0);
        let dd = max_drawdown(&[1.0, 1.5, 0.75, 1.2, 0.9]);
        assert!((dd + 0.5).abs() < 1e-12);
        assert!(max_drawdown(&[]).is_nan());
    }
}
