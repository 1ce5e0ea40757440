//! Snapshot storage.
//!
//! A snapshot is the raw upstream records from one fetch, grouped by
//! publication. Normalization happens on read, so a cached snapshot can be
//! re-derived after the pipeline changes.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Raw records fetched for one publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicationBundle {
    pub publication: Value,
    pub posts: Vec<Value>,
    pub subscribers: Vec<Value>,
    pub segments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub fetch_duration_ms: u64,
    #[serde(default)]
    pub publications: Vec<PublicationBundle>,
}

impl Snapshot {
    pub fn is_stale(&self, refresh_interval_hours: f64, now: DateTime<Utc>) -> bool {
        is_stale(Some(self.fetched_at), refresh_interval_hours, now)
    }

    pub fn record_counts(&self) -> (usize, usize, usize) {
        self.publications.iter().fold((0, 0, 0), |(p, s, g), bundle| {
            (
                p + bundle.posts.len(),
                s + bundle.subscribers.len(),
                g + bundle.segments.len(),
            )
        })
    }
}

/// Storage for the most recent snapshot.
pub trait SnapshotCache: Send + Sync {
    fn name(&self) -> &'static str;

    /// Latest stored snapshot, `None` when nothing usable is stored.
    fn get(&self) -> impl Future<Output = Result<Option<Snapshot>>> + Send;

    fn put(&self, snapshot: &Snapshot) -> impl Future<Output = Result<()>> + Send;
}

/// Pretty-printed JSON file holding one snapshot.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotCache for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self) -> Result<Option<Snapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cache file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable cache file"
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(snapshot)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "cache file written");
        Ok(())
    }
}

fn refresh_interval(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// A missing fetch time is always stale.
pub fn is_stale(fetched_at: Option<DateTime<Utc>>, refresh_interval_hours: f64, now: DateTime<Utc>) -> bool {
    match fetched_at {
        Some(at) => now - at > refresh_interval(refresh_interval_hours),
        None => true,
    }
}

/// Time to wait before the next scheduled refresh, never less than a minute.
pub fn next_refresh_delay(
    fetched_at: Option<DateTime<Utc>>,
    refresh_interval_hours: f64,
    now: DateTime<Utc>,
) -> Duration {
    let interval = refresh_interval(refresh_interval_hours);
    match fetched_at {
        Some(at) => (interval - (now - at)).max(Duration::minutes(1)),
        None => interval.max(Duration::minutes(1)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub has_cached_data: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age_minutes: Option<i64>,
    pub is_stale: bool,
    pub refresh_interval_hours: f64,
    pub next_refresh: Option<DateTime<Utc>>,
}

impl CacheStatus {
    pub fn new(snapshot: Option<&Snapshot>, refresh_interval_hours: f64, now: DateTime<Utc>) -> Self {
        let fetched_at = snapshot.map(|s| s.fetched_at);
        Self {
            has_cached_data: snapshot.is_some(),
            fetched_at,
            age_minutes: fetched_at
                .map(|at| ((now - at).num_seconds() as f64 / 60.0).round() as i64),
            is_stale: is_stale(fetched_at, refresh_interval_hours, now),
            refresh_interval_hours,
            next_refresh: fetched_at.map(|at| at + refresh_interval(refresh_interval_hours)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn snapshot(fetched_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            fetched_at,
            fetch_duration_ms: 1200,
            publications: vec![PublicationBundle {
                publication: json!({"id": "pub_1", "name": "Main"}),
                posts: vec![json!({"id": "post_1"})],
                subscribers: vec![json!({"id": "sub_1"}), json!({"id": "sub_2"})],
                segments: Vec::new(),
            }],
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn file_cache_round_trips_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested").join("cache.json"));

        assert!(cache.get().await.unwrap().is_none());
        let stored = snapshot(noon());
        cache.put(&stored).await.unwrap();
        assert_eq!(cache.get().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn unreadable_cache_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileCache::new(&path).get().await.unwrap().is_none());
    }

    #[test]
    fn staleness_against_refresh_interval() {
        let fetched = noon();
        assert!(!is_stale(Some(fetched), 2.0, fetched + Duration::minutes(119)));
        assert!(is_stale(Some(fetched), 2.0, fetched + Duration::minutes(121)));
        assert!(is_stale(None, 2.0, fetched));
    }

    #[test]
    fn refresh_delay_has_one_minute_floor() {
        let fetched = noon();
        assert_eq!(
            next_refresh_delay(Some(fetched), 2.0, fetched + Duration::minutes(30)),
            Duration::minutes(90)
        );
        assert_eq!(
            next_refresh_delay(Some(fetched), 2.0, fetched + Duration::hours(5)),
            Duration::minutes(1)
        );
        assert_eq!(next_refresh_delay(None, 2.0, fetched), Duration::hours(2));
    }

    #[test]
    fn status_reports_age_and_next_refresh() {
        let stored = snapshot(noon());
        let status = CacheStatus::new(Some(&stored), 2.0, noon() + Duration::minutes(45));
        assert!(status.has_cached_data);
        assert_eq!(status.age_minutes, Some(45));
        assert!(!status.is_stale);
        assert_eq!(status.next_refresh, Some(noon() + Duration::hours(2)));

        let empty = CacheStatus::new(None, 2.0, noon());
        assert!(!empty.has_cached_data);
        assert!(empty.is_stale);
        assert_eq!(empty.next_refresh, None);
    }

    #[test]
    fn record_counts_sum_bundles() {
        assert_eq!(snapshot(noon()).record_counts(), (1, 2, 0));
    }
}
