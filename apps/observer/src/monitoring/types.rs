use std::collections::BTreeMap;
use std::collections::btree_map;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// A single endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub location: Url,
    pub method: Method,
}

impl Job {
    pub fn new(location: Url, method: Method) -> Self {
        Self { location, method }
    }
}

/// Outcome of one probe, as persisted by the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Endpoint that was probed
    pub location: Url,

    /// HTTP status code, `0` when the endpoint could not be reached
    pub status: u16,

    /// Whether a response came back at all
    pub reachable: bool,

    /// When the probe finished
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Status recorded for probes that never got a response.
    pub const UNREACHABLE_STATUS: u16 = 0;

    pub fn reachable(location: Url, status: u16, timestamp: DateTime<Utc>) -> Self {
        Self { location, status, reachable: true, timestamp }
    }

    pub fn unreachable(location: Url, timestamp: DateTime<Utc>) -> Self {
        Self { location, status: Self::UNREACHABLE_STATUS, reachable: false, timestamp }
    }
}

/// Jobs bucketed by polling interval.
///
/// Each interval is one frequency tier. Jobs inside a tier keep the order in
/// which they were added, and tiers iterate from the shortest interval up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyGroups {
    groups: BTreeMap<Duration, Vec<Job>>,
}

impl FrequencyGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tier for `interval`, creating the tier if needed.
    pub fn insert(&mut self, interval: Duration, job: Job) {
        self.groups.entry(interval).or_default().push(job);
    }

    pub fn get(&self, interval: Duration) -> Option<&[Job]> {
        self.groups.get(&interval).map(Vec::as_slice)
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of jobs across every tier.
    pub fn job_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Duration, &[Job])> {
        self.groups.iter().map(|(interval, jobs)| (*interval, jobs.as_slice()))
    }
}

impl IntoIterator for FrequencyGroups {
    type Item = (Duration, Vec<Job>);
    type IntoIter = btree_map::IntoIter<Duration, Vec<Job>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

impl FromIterator<(Duration, Job)> for FrequencyGroups {
    fn from_iter<I: IntoIterator<Item = (Duration, Job)>>(iter: I) -> Self {
        let mut groups = Self::new();
        for (interval, job) in iter {
            groups.insert(interval, job);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(location: &str) -> Job {
        Job::new(Url::parse(location).unwrap(), Method::GET)
    }

    #[test]
    fn test_groups_keep_insertion_order_per_tier() {
        let groups: FrequencyGroups = [
            (Duration::from_secs(5), job("https://a.example/")),
            (Duration::from_secs(1), job("https://b.example/")),
            (Duration::from_secs(5), job("https://c.example/")),
        ]
        .into_iter()
        .collect();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups.job_count(), 3);

        let slow: Vec<&str> = groups
            .get(Duration::from_secs(5))
            .unwrap()
            .iter()
            .map(|job| job.location.as_str())
            .collect();
        assert_eq!(slow, vec!["https://a.example/", "https://c.example/"]);

        let intervals: Vec<Duration> = groups.iter().map(|(interval, _)| interval).collect();
        assert_eq!(intervals, vec![Duration::from_secs(1), Duration::from_secs(5)]);
    }

    #[test]
    fn test_result_serializes_as_flat_record() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let result = ProbeResult::unreachable(Url::parse("http://127.0.0.1:9/").unwrap(), timestamp);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "location": "http://127.0.0.1:9/",
                "status": 0,
                "reachable": false,
                "timestamp": "2024-03-01T12:00:00Z",
            })
        );
    }
}
