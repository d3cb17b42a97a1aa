//! Descriptive statistics for a numeric column.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1); NaN with fewer than two points.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Summarize the present values; `None` when there are none.
pub fn describe(values: &[Option<f64>]) -> Option<Summary> {
    let mut xs: Vec<f64> = values.iter().flatten().copied().filter(|x| x.is_finite()).collect();
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(|a, b| a.total_cmp(b));

    let n = xs.len();
    let mean = xs.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        f64::NAN
    };

    Some(Summary {
        count: n,
        mean,
        std,
        min: xs[0],
        q25: quantile(&xs, 0.25),
        median: quantile(&xs, 0.5),
        q75: quantile(&xs, 0.75),
        max: xs[n - 1],
    })
}

// linear interpolation between closest ranks; `sorted` must be non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matches_textbook_values() {
        let s = describe(&[Some(4.0), None, Some(1.0), Some(3.0), Some(2.0)]).unwrap();
        assert_eq!(s.count, 4);
        assert_relative_eq!(s.mean, 2.5);
        assert_relative_eq!(s.std, 1.2909944487358056, epsilon = 1e-12);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.q25, 1.75);
        assert_relative_eq!(s.median, 2.5);
        assert_relative_eq!(s.q75, 3.25);
        assert_relative_eq!(s.max, 4.0);
    }

    #[test]
    fn single_value_has_undefined_std() {
        let s = describe(&[Some(7.0)]).unwrap();
        assert!(s.std.is_nan());
        assert_relative_eq!(s.median, 7.0);
    }

    #[test]
    fn nothing_to_describe() {
        assert!(describe(&[]).is_none());
        assert!(describe(&[None, Some(f64::NAN)]).is_none());
    }
}
