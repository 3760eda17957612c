#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceComparison {
    pub abs_diff: f64,
    pub rel_diff: f64,
    pub passes: bool,
}

pub fn compare_with_tolerance(
    expected: f64,
    actual: f64,
    abs_tol: f64,
    rel_tol: f64,
) -> ToleranceComparison {
    let abs_diff = (actual - expected).abs();
    let rel_denominator = expected.abs().max(f64::MIN_POSITIVE);
    let rel_diff = abs_diff / rel_denominator;
    let passes = abs_diff <= abs_tol || abs_diff <= rel_tol * expected.abs();

    ToleranceComparison {
        abs_diff,
        rel_diff,
        passes,
    }
}

/// `start, start/f, start/f², …` with `count` terms. Each term divides the
/// previous one so chained ranges stay bit-identical to a single chain.
pub fn geometric_decay(start: f64, factor: f64, count: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        values.push(current);
        current /= factor;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::{compare_with_tolerance, geometric_decay};

    #[test]
    fn decay_divides_each_term_by_the_factor() {
        assert_eq!(geometric_decay(8.0, 2.0, 4), vec![8.0, 4.0, 2.0, 1.0]);
        assert!(geometric_decay(1.0, 10.0, 0).is_empty());
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        assert!(compare_with_tolerance(1.0e-3, 1.0e-3 + 1.0e-13, 0.0, 1.0e-9).passes);
        assert!(!compare_with_tolerance(1.0e-3, 1.001e-3, 0.0, 1.0e-9).passes);

        let comparison = compare_with_tolerance(2.0, 2.5, 1.0, 0.0);
        assert!(comparison.passes);
        assert_eq!(comparison.abs_diff, 0.5);
        assert_eq!(comparison.rel_diff, 0.25);
    }
}
