//! Per-IP failed attempt tally
//!
//! Keeps IPs in order of first occurrence so reports come out in the
//! same order the offending lines appeared in the log.

use std::collections::HashMap;

/// Ordered mapping of IP address -> failed attempt count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptCounts {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl AttemptCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failed attempt for `ip`
    pub fn record(&mut self, ip: &str) {
        match self.index.get(ip) {
            Some(&pos) => self.entries[pos].1 += 1,
            None => self.insert(ip.to_string(), 1),
        }
    }

    fn insert(&mut self, ip: String, count: u64) {
        self.index.insert(ip.clone(), self.entries.len());
        self.entries.push((ip, count));
    }

    pub fn get(&self, ip: &str) -> Option<u64> {
        self.index.get(ip).map(|&pos| self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(ip, c)| (ip.as_str(), *c))
    }
}

impl FromIterator<(String, u64)> for AttemptCounts {
    /// Later duplicates overwrite the earlier count but keep the first position
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut counts = AttemptCounts::new();
        for (ip, count) in iter {
            match counts.index.get(&ip) {
                Some(&pos) => counts.entries[pos].1 = count,
                None => counts.insert(ip, count),
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let mut counts = AttemptCounts::new();
        counts.record("10.0.0.5");
        counts.record("10.0.0.9");
        counts.record("10.0.0.5");

        assert_eq!(counts.get("10.0.0.5"), Some(2));
        assert_eq!(counts.get("10.0.0.9"), Some(1));
        assert_eq!(counts.get("10.0.0.1"), None);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_first_occurrence_order() {
        let mut counts = AttemptCounts::new();
        for ip in ["3.3.3.3", "1.1.1.1", "3.3.3.3", "2.2.2.2", "1.1.1.1"] {
            counts.record(ip);
        }

        let order: Vec<&str> = counts.iter().map(|(ip, _)| ip).collect();
        assert_eq!(order, vec!["3.3.3.3", "1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_no_normalization() {
        let mut counts = AttemptCounts::new();
        counts.record("010.0.0.1");
        counts.record("10.0.0.1");
        assert_eq!(counts.len(), 2);
    }
}
