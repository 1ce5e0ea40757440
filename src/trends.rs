//! Day-by-day series for charts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metrics::PostTotals;
use crate::models::{Post, Subscriber, TrendPoint};
use crate::period::DateRange;

/// Factor applied to the current series when no comparison data exists.
pub const SYNTHETIC_COMPARISON_FACTOR: f64 = 0.95;

/// Posts grouped by UTC publish day, oldest first. Undated posts are skipped.
pub fn daily_trend(posts: &[Post]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<NaiveDate, PostTotals> = BTreeMap::new();
    for post in posts {
        let Some(day) = post.publish_day() else {
            continue;
        };
        let totals = days.entry(day).or_default();
        totals.add(post);
        if post.recipients == 0 {
            totals.recipients = totals.recipients.saturating_add(post.delivered);
        }
    }

    days.into_iter()
        .map(|(date, totals)| TrendPoint {
            date,
            posts: totals.posts,
            delivered: totals.delivered,
            recipients: totals.recipients,
            unique_opens: totals.unique_opens,
            unique_clicks: totals.unique_clicks,
            clicks: totals.clicks,
            unsubscribes: totals.unsubscribes,
            open_rate: totals.open_rate(),
            ctr: totals.ctr(),
            ctor: totals.ctor(),
            unsubscribe_rate: totals.unsubscribe_rate(),
            bounce_rate: totals.bounce_rate(),
            traffic_sent: totals.traffic_sent,
            new_subscribers: 0,
        })
        .collect()
}

/// Signups per UTC day, optionally limited to a range.
pub fn daily_new_subscribers(
    subscribers: &[Subscriber],
    range: Option<&DateRange>,
) -> BTreeMap<NaiveDate, u64> {
    let range = range.map(DateRange::whole_days);
    let mut counts = BTreeMap::new();
    for created in subscribers.iter().filter_map(|s| s.created) {
        if range.is_some_and(|r| !r.contains(created)) {
            continue;
        }
        *counts.entry(created.date_naive()).or_insert(0) += 1;
    }
    counts
}

/// Fill `new_subscribers` on each point; days without signups get 0.
pub fn join_new_subscribers(points: &mut [TrendPoint], signups: &BTreeMap<NaiveDate, u64>) {
    for point in points {
        point.new_subscribers = signups.get(&point.date).copied().unwrap_or(0);
    }
}

/// Daily trend for `posts` with signups in `range` joined in.
pub fn trend_with_signups(
    posts: &[Post],
    subscribers: &[Subscriber],
    range: &DateRange,
) -> Vec<TrendPoint> {
    let mut points = daily_trend(posts);
    join_new_subscribers(&mut points, &daily_new_subscribers(subscribers, Some(range)));
    points
}

/// A trend point field that can be charted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendField {
    OpenRate,
    Ctr,
    Ctor,
    UnsubscribeRate,
    BounceRate,
    Delivered,
    Recipients,
    TrafficSent,
    NewSubscribers,
}

impl TrendField {
    pub fn value(&self, point: &TrendPoint) -> f64 {
        match self {
            TrendField::OpenRate => point.open_rate,
            TrendField::Ctr => point.ctr,
            TrendField::Ctor => point.ctor,
            TrendField::UnsubscribeRate => point.unsubscribe_rate,
            TrendField::BounceRate => point.bounce_rate,
            TrendField::Delivered => point.delivered as f64,
            TrendField::Recipients => point.recipients as f64,
            TrendField::TrafficSent => point.traffic_sent as f64,
            TrendField::NewSubscribers => point.new_subscribers as f64,
        }
    }
}

/// Whether a comparison value was observed or filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sample {
    Real,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    pub current: f64,
    pub comparison: f64,
    pub sample: Sample,
}

/// Pair each current point with the comparison point at the same position.
///
/// Positions past the end of `comparison` are synthesized from the current
/// value and tagged [`Sample::Synthetic`].
pub fn comparison_series(
    current: &[TrendPoint],
    comparison: &[TrendPoint],
    field: TrendField,
) -> Vec<ComparisonPoint> {
    current
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let value = field.value(point);
            match comparison.get(index) {
                Some(prior) => ComparisonPoint {
                    date: point.date,
                    current: value,
                    comparison: field.value(prior),
                    sample: Sample::Real,
                },
                None => ComparisonPoint {
                    date: point.date,
                    current: value,
                    comparison: value * SYNTHETIC_COMPARISON_FACTOR,
                    sample: Sample::Synthetic,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post_at(day: u32, hour: u32, delivered: u64) -> Post {
        Post {
            publish_date: Some(Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()),
            recipients: delivered,
            delivered,
            unique_opens: delivered / 4,
            ..Post::default()
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn same_day_posts_merge_into_one_point() {
        let points = daily_trend(&[post_at(3, 6, 100), post_at(3, 20, 200)]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].delivered, 300);
        assert_eq!(points[0].posts, 2);
        assert_eq!(points[0].open_rate, 25.0);
    }

    #[test]
    fn points_are_sorted_and_undated_posts_skipped() {
        let points = daily_trend(&[post_at(9, 8, 100), Post::default(), post_at(2, 8, 100)]);
        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2), day(9)]);
    }

    #[test]
    fn recipients_fall_back_to_delivered() {
        let mut sent = post_at(4, 8, 500);
        sent.recipients = 0;
        let points = daily_trend(&[sent]);
        assert_eq!(points[0].recipients, 500);
        assert_eq!(points[0].bounce_rate, 0.0);
    }

    #[test]
    fn signups_join_by_day() {
        let range = DateRange::from_dates(day(1), day(5)).unwrap();
        let subscribers = vec![
            Subscriber {
                created: Some(Utc.with_ymd_and_hms(2026, 1, 3, 1, 0, 0).unwrap()),
                ..Subscriber::default()
            },
            Subscriber {
                created: Some(Utc.with_ymd_and_hms(2026, 1, 20, 1, 0, 0).unwrap()),
                ..Subscriber::default()
            },
            Subscriber::default(),
        ];
        let points = trend_with_signups(
            &[post_at(3, 8, 10), post_at(4, 8, 10)],
            &subscribers,
            &range,
        );
        assert_eq!(points[0].new_subscribers, 1);
        assert_eq!(points[1].new_subscribers, 0);
        assert_eq!(daily_new_subscribers(&subscribers, None).len(), 2);
    }

    #[test]
    fn comparison_series_tags_synthetic_fill() {
        let current = daily_trend(&[post_at(8, 8, 100), post_at(9, 8, 200)]);
        let prior = daily_trend(&[post_at(1, 8, 80)]);
        let series = comparison_series(&current, &prior, TrendField::Delivered);

        assert_eq!(series[0].sample, Sample::Real);
        assert_eq!(series[0].comparison, 80.0);
        assert_eq!(series[1].sample, Sample::Synthetic);
        assert_eq!(series[1].comparison, 200.0 * SYNTHETIC_COMPARISON_FACTOR);
    }
}
