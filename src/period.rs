//! Reporting windows and record filters.
//!
//! Windows anchor on the most recent post rather than the wall clock, so a
//! stale snapshot still shows its last full week or month.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::models::{Post, Publication, Subscriber};

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(AnalyticsError::InvalidDateRange(
                "end must not precede start".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Whole days from the start of `from` to the end of `to`.
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        Self::new(start_of_day(from), end_of_day(to))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Same window widened to start-of-day / end-of-day.
    pub fn whole_days(&self) -> Self {
        Self {
            start: start_of_day(self.start.date_naive()),
            end: end_of_day(self.end.date_naive()),
        }
    }

    /// Length rounded up to whole days, at least one.
    pub fn length_days(&self) -> i64 {
        const DAY_MS: i64 = 86_400_000;
        let ms = (self.end - self.start).num_milliseconds();
        ((ms + DAY_MS - 1) / DAY_MS).max(1)
    }

    /// Both bounds moved back by `days`.
    pub fn shifted_back(&self, days: i64) -> Self {
        Self {
            start: self.start - Duration::days(days),
            end: self.end - Duration::days(days),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Yesterday,
    #[serde(rename = "7day")]
    SevenDay,
    #[serde(rename = "30day")]
    ThirtyDay,
    Monthly,
    #[serde(rename = "90day")]
    NinetyDay,
    #[serde(rename = "alltime")]
    AllTime,
    Custom,
}

impl TimePeriod {
    /// Window length used for the lookback and for the prior comparison window.
    /// Custom windows measure their own length.
    pub fn days(&self) -> Option<i64> {
        match self {
            TimePeriod::Yesterday => Some(1),
            TimePeriod::SevenDay => Some(7),
            TimePeriod::ThirtyDay | TimePeriod::Monthly => Some(30),
            TimePeriod::NinetyDay => Some(90),
            TimePeriod::AllTime => Some(365),
            TimePeriod::Custom => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimePeriod::Yesterday => "yesterday",
            TimePeriod::SevenDay => "7day",
            TimePeriod::ThirtyDay => "30day",
            TimePeriod::Monthly => "monthly",
            TimePeriod::NinetyDay => "90day",
            TimePeriod::AllTime => "alltime",
            TimePeriod::Custom => "custom",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimePeriod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yesterday" => Ok(TimePeriod::Yesterday),
            "7day" | "7d" | "week" => Ok(TimePeriod::SevenDay),
            "30day" | "30d" => Ok(TimePeriod::ThirtyDay),
            "monthly" | "month" => Ok(TimePeriod::Monthly),
            "90day" | "90d" => Ok(TimePeriod::NinetyDay),
            "alltime" | "all" => Ok(TimePeriod::AllTime),
            "custom" => Ok(TimePeriod::Custom),
            other => Err(AnalyticsError::InvalidPeriod(other.to_string())),
        }
    }
}

/// A resolved reporting window and the equally long window before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodWindow {
    pub period: TimePeriod,
    pub current: DateRange,
    pub prior: DateRange,
    pub length_days: i64,
}

impl PeriodWindow {
    /// Resolve `period` against the posts on hand.
    ///
    /// `custom` bounds are required for [`TimePeriod::Custom`]; `now` is only
    /// used when no post carries a publish date.
    pub fn resolve(
        period: TimePeriod,
        posts: &[Post],
        custom: Option<(NaiveDate, NaiveDate)>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if period == TimePeriod::Custom {
            let (from, to) = custom.ok_or_else(|| {
                AnalyticsError::InvalidPeriod("custom period needs --from and --to".to_string())
            })?;
            let current = DateRange::from_dates(from, to)?;
            let length_days = current.length_days();
            return Ok(Self {
                period,
                current,
                prior: current.shifted_back(length_days),
                length_days,
            });
        }

        let length_days = period.days().unwrap_or(30);
        let current = match latest_publish_date(posts) {
            Some(latest) => anchored_range(period, latest.date_naive()),
            None => DateRange {
                start: now - Duration::days(30),
                end: end_of_day(now.date_naive()),
            },
        };

        Ok(Self {
            period,
            current,
            prior: current.shifted_back(length_days),
            length_days,
        })
    }
}

fn anchored_range(period: TimePeriod, anchor: NaiveDate) -> DateRange {
    let end = end_of_day(anchor);
    match period {
        TimePeriod::Yesterday => {
            let day = anchor - Duration::days(1);
            DateRange {
                start: start_of_day(day),
                end: end_of_day(day),
            }
        }
        _ => {
            let days = period.days().unwrap_or(7);
            DateRange {
                start: start_of_day(anchor - Duration::days(days)),
                end,
            }
        }
    }
}

pub fn latest_publish_date(posts: &[Post]) -> Option<DateTime<Utc>> {
    posts.iter().filter_map(|p| p.publish_date).max()
}

/// Posts published inside the range. Undated posts are excluded.
pub fn filter_posts(posts: &[Post], range: &DateRange) -> Vec<Post> {
    posts
        .iter()
        .filter(|p| p.publish_date.is_some_and(|d| range.contains(d)))
        .cloned()
        .collect()
}

/// Subscribers who signed up on any day touched by the range.
pub fn filter_subscribers(subscribers: &[Subscriber], range: &DateRange) -> Vec<Subscriber> {
    let range = range.whole_days();
    subscribers
        .iter()
        .filter(|s| s.created.is_some_and(|d| range.contains(d)))
        .cloned()
        .collect()
}

pub fn count_subscribers_in(subscribers: &[Subscriber], range: &DateRange) -> u64 {
    let range = range.whole_days();
    subscribers
        .iter()
        .filter(|s| s.created.is_some_and(|d| range.contains(d)))
        .count() as u64
}

/// Records that belong to a single publication.
pub trait PublicationScoped {
    fn publication_name(&self) -> &str;
}

impl PublicationScoped for Post {
    fn publication_name(&self) -> &str {
        &self.publication_name
    }
}

impl PublicationScoped for Subscriber {
    fn publication_name(&self) -> &str {
        &self.publication_name
    }
}

impl PublicationScoped for crate::models::Segment {
    fn publication_name(&self) -> &str {
        &self.publication_name
    }
}

/// Which publication a view covers. `overall` selects everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PublicationFilter {
    #[default]
    Overall,
    Named(String),
}

impl PublicationFilter {
    /// Map a selector (publication id or name) onto a publication name.
    pub fn resolve(selector: &str, publications: &[Publication]) -> Self {
        let selector = selector.trim();
        if selector.is_empty() || selector.eq_ignore_ascii_case("overall") {
            return PublicationFilter::Overall;
        }
        let name = publications
            .iter()
            .find(|p| p.id == selector || p.name == selector)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| selector.to_string());
        PublicationFilter::Named(name)
    }

    pub fn matches<T: PublicationScoped>(&self, record: &T) -> bool {
        match self {
            PublicationFilter::Overall => true,
            PublicationFilter::Named(name) => record.publication_name().eq_ignore_ascii_case(name),
        }
    }

    pub fn apply<T: PublicationScoped + Clone>(&self, records: &[T]) -> Vec<T> {
        records.iter().filter(|r| self.matches(*r)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post_on(year: i32, month: u32, day: u32) -> Post {
        Post {
            publish_date: Some(Utc.with_ymd_and_hms(year, month, day, 14, 30, 0).unwrap()),
            ..Post::default()
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn seven_day_window_anchors_on_latest_post() {
        let posts = vec![post_on(2026, 1, 3), post_on(2026, 1, 20), Post::default()];
        let window =
            PeriodWindow::resolve(TimePeriod::SevenDay, &posts, None, Utc::now()).unwrap();

        assert_eq!(window.current.start, start_of_day(date(2026, 1, 13)));
        assert_eq!(window.current.end, end_of_day(date(2026, 1, 20)));
        assert_eq!(window.prior.start, start_of_day(date(2026, 1, 6)));
        assert_eq!(window.prior.end, end_of_day(date(2026, 1, 13)));
    }

    #[test]
    fn yesterday_is_the_day_before_the_anchor() {
        let posts = vec![post_on(2026, 2, 10)];
        let window =
            PeriodWindow::resolve(TimePeriod::Yesterday, &posts, None, Utc::now()).unwrap();
        assert_eq!(window.current, DateRange::from_dates(date(2026, 2, 9), date(2026, 2, 9)).unwrap());
        assert_eq!(window.length_days, 1);
    }

    #[test]
    fn no_dated_posts_falls_back_to_last_thirty_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let window = PeriodWindow::resolve(TimePeriod::NinetyDay, &[], None, now).unwrap();
        assert_eq!(window.current.start, now - Duration::days(30));
        assert_eq!(window.current.end, end_of_day(date(2026, 3, 1)));
        assert_eq!(window.length_days, 90);
    }

    #[test]
    fn custom_window_measures_its_length() {
        let window = PeriodWindow::resolve(
            TimePeriod::Custom,
            &[],
            Some((date(2026, 1, 1), date(2026, 1, 15))),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(window.length_days, 15);
        assert_eq!(window.prior.start, start_of_day(date(2025, 12, 17)));

        let missing = PeriodWindow::resolve(TimePeriod::Custom, &[], None, Utc::now());
        assert!(missing.is_err());
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        assert!(DateRange::from_dates(date(2026, 1, 2), date(2026, 1, 1)).is_err());
    }

    #[test]
    fn periods_parse_from_labels() {
        assert_eq!("7day".parse::<TimePeriod>().unwrap(), TimePeriod::SevenDay);
        assert_eq!("ALLTIME".parse::<TimePeriod>().unwrap(), TimePeriod::AllTime);
        assert!("fortnight".parse::<TimePeriod>().is_err());
    }

    #[test]
    fn post_filter_is_inclusive_and_skips_undated() {
        let range = DateRange::from_dates(date(2026, 1, 1), date(2026, 1, 2)).unwrap();
        let posts = vec![
            post_on(2026, 1, 1),
            post_on(2026, 1, 2),
            post_on(2026, 1, 3),
            Post::default(),
        ];
        assert_eq!(filter_posts(&posts, &range).len(), 2);
    }

    #[test]
    fn subscriber_filter_widens_to_whole_days() {
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 13, 0, 0).unwrap(),
        )
        .unwrap();
        let early = Subscriber {
            created: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap()),
            ..Subscriber::default()
        };
        let undated = Subscriber::default();
        assert_eq!(filter_subscribers(&[early, undated], &range).len(), 1);
    }

    #[test]
    fn publication_filter_matches_name_or_id() {
        let publications = vec![Publication {
            id: "pub_1".to_string(),
            name: "Inquisitr Main".to_string(),
            ..Publication::default()
        }];
        let filter = PublicationFilter::resolve("pub_1", &publications);
        assert_eq!(filter, PublicationFilter::Named("Inquisitr Main".to_string()));

        let posts = vec![
            Post {
                publication_name: "inquisitr main".to_string(),
                ..Post::default()
            },
            Post {
                publication_name: "Inquisitr Ads".to_string(),
                ..Post::default()
            },
        ];
        assert_eq!(filter.apply(&posts).len(), 1);
        assert_eq!(PublicationFilter::resolve("overall", &publications).apply(&posts).len(), 2);
    }
}
