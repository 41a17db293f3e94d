//! Threshold filtering of attempt counts

use super::AttemptCounts;

/// Keep the entries whose count is at least `threshold`
///
/// A threshold of zero or below keeps every IP. Order is preserved.
pub fn filter(counts: &AttemptCounts, threshold: i64) -> AttemptCounts {
    counts
        .iter()
        .filter(|&(_, count)| meets_threshold(count, threshold))
        .map(|(ip, count)| (ip.to_string(), count))
        .collect()
}

fn meets_threshold(count: u64, threshold: i64) -> bool {
    match u64::try_from(threshold) {
        Ok(t) => count >= t,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttemptCounts {
        vec![
            ("10.0.0.5".to_string(), 4),
            ("10.0.0.9".to_string(), 2),
            ("192.168.1.1".to_string(), 1),
            ("172.16.0.3".to_string(), 3),
        ]
        .into_iter()
        .collect()
    }

    fn expected(counts: &AttemptCounts, threshold: i64) -> Vec<(String, u64)> {
        counts
            .iter()
            .filter(|&(_, c)| threshold <= 0 || c as i64 >= threshold)
            .map(|(ip, c)| (ip.to_string(), c))
            .collect()
    }

    #[test]
    fn test_matches_comprehension_for_all_thresholds() {
        let counts = sample();
        for threshold in [-3, 0, 1, 2, 3, 4, 5, 100] {
            let filtered: Vec<(String, u64)> = filter(&counts, threshold)
                .iter()
                .map(|(ip, c)| (ip.to_string(), c))
                .collect();
            assert_eq!(filtered, expected(&counts, threshold), "threshold {}", threshold);
        }
    }

    #[test]
    fn test_example_scenario() {
        let counts: AttemptCounts = vec![
            ("10.0.0.5".to_string(), 4),
            ("10.0.0.9".to_string(), 2),
        ]
        .into_iter()
        .collect();

        let filtered = filter(&counts, 3);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("10.0.0.5"), Some(4));
        assert_eq!(filtered.get("10.0.0.9"), None);
    }

    #[test]
    fn test_zero_and_negative_keep_all() {
        let counts = sample();
        assert_eq!(filter(&counts, 0), counts);
        assert_eq!(filter(&counts, -10), counts);
    }

    #[test]
    fn test_threshold_above_every_count() {
        assert!(filter(&sample(), 5).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let counts = sample();
        assert_eq!(filter(&counts, 2), filter(&counts, 2));
    }
}
