//! Goal tracking: linear projection toward a deadline and the target report
//! built on top of it.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{RateTarget, TargetConfig};
use crate::models::{Post, Subscriber};
use crate::metrics::PostTotals;
use crate::rates::{mean, percent, ratio, saturating_sum};
use crate::trends::daily_trend;

/// Trailing window used to measure the observed daily rate.
pub const OBSERVATION_DAYS: i64 = 30;
const MAX_RECOMMENDATIONS: usize = 3;
const HISTORY_MONTHS: i32 = 3;

/// Whole days between `now` and `deadline`, truncated; negative once passed.
pub fn days_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_days()
}

/// Events in the trailing observation window, per day.
pub fn observed_daily_rate<I>(events: I, now: DateTime<Utc>) -> f64
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let cutoff = now - Duration::days(OBSERVATION_DAYS);
    let recent = events
        .into_iter()
        .filter(|at| *at >= cutoff && *at <= now)
        .count();
    recent as f64 / OBSERVATION_DAYS as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrajectoryStatus {
    #[serde(rename = "AHEAD")]
    Ahead,
    #[serde(rename = "ON TRACK")]
    OnTrack,
    #[serde(rename = "BEHIND")]
    Behind,
}

impl TrajectoryStatus {
    /// Ahead means beating the target by at least 5%.
    pub fn classify(projected: f64, target: f64) -> Self {
        if projected >= target * 1.05 {
            TrajectoryStatus::Ahead
        } else if projected >= target {
            TrajectoryStatus::OnTrack
        } else {
            TrajectoryStatus::Behind
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrajectoryStatus::Ahead => "AHEAD",
            TrajectoryStatus::OnTrack => "ON TRACK",
            TrajectoryStatus::Behind => "BEHIND",
        }
    }
}

impl fmt::Display for TrajectoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GaugeStatus {
    OnTrack,
    AtRisk,
    Behind,
}

impl GaugeStatus {
    /// Status of a gauge from its distance to target and, when known, the
    /// daily rate needed versus the rate observed.
    pub fn classify(current: f64, target: f64, rates: Option<(f64, f64)>) -> Self {
        let distance_percent = percent(target - current, target);
        if distance_percent <= 0.0 {
            return GaugeStatus::OnTrack;
        }
        if let Some((required, observed)) = rates.filter(|(required, _)| *required != 0.0) {
            return Self::from_ratio(observed / required);
        }
        if distance_percent <= 10.0 {
            GaugeStatus::OnTrack
        } else if distance_percent <= 30.0 {
            GaugeStatus::AtRisk
        } else {
            GaugeStatus::Behind
        }
    }

    /// Progress against required progress, both in percent.
    pub fn from_progress(progress: f64, required_progress: f64) -> Self {
        Self::from_ratio(ratio(progress, required_progress))
    }

    fn from_ratio(value: f64) -> Self {
        if value >= 1.0 {
            GaugeStatus::OnTrack
        } else if value >= 0.8 {
            GaugeStatus::AtRisk
        } else {
            GaugeStatus::Behind
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GaugeStatus::OnTrack => "On Track",
            GaugeStatus::AtRisk => "At Risk",
            GaugeStatus::Behind => "Behind",
        }
    }
}

impl fmt::Display for GaugeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub current: f64,
    pub target: f64,
    pub needed: f64,
    pub days_remaining: i64,
    pub observed_daily_rate: f64,
    pub required_daily_rate: f64,
    pub projected: f64,
    pub status: TrajectoryStatus,
    pub gauge: GaugeStatus,
}

/// Linear projection of `current` at `observed_daily_rate` until the deadline.
///
/// Past the deadline no further growth is projected.
pub fn project(current: f64, target: f64, observed_daily_rate: f64, days_remaining: i64) -> Projection {
    let needed = target - current;
    let required_daily_rate = if days_remaining > 0 {
        needed / days_remaining as f64
    } else {
        0.0
    };
    let projected = current + observed_daily_rate * days_remaining.max(0) as f64;

    Projection {
        current,
        target,
        needed,
        days_remaining,
        observed_daily_rate,
        required_daily_rate,
        projected,
        status: TrajectoryStatus::classify(projected, target),
        gauge: GaugeStatus::classify(
            current,
            target,
            Some((required_daily_rate, observed_daily_rate)),
        ),
    }
}

/// Where a measured value sits relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStatus {
    Below,
    OnTarget,
    Above,
}

impl TargetStatus {
    pub fn within(value: f64, band: RateTarget) -> Self {
        if value < band.min {
            TargetStatus::Below
        } else if value > band.max {
            TargetStatus::Above
        } else {
            TargetStatus::OnTarget
        }
    }

    pub fn at_least(value: f64, min: f64) -> Self {
        if value < min {
            TargetStatus::Below
        } else {
            TargetStatus::OnTarget
        }
    }
}

/// Weighted engagement rates across a set of posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSnapshot {
    pub posts: usize,
    pub open_rate: f64,
    pub ctr: f64,
    pub ctor: f64,
    pub traffic_per_send: f64,
}

impl EngagementSnapshot {
    pub fn from_posts(posts: &[Post]) -> Self {
        if posts.is_empty() {
            return Self::default();
        }
        let mut totals = PostTotals::from_posts(posts);
        // Posts without a delivered count are weighted by recipients.
        totals.delivered = saturating_sum(
            posts
                .iter()
                .map(|p| if p.delivered > 0 { p.delivered } else { p.recipients }),
        );

        Self {
            posts: posts.len(),
            open_rate: totals.open_rate(),
            ctr: totals.ctr(),
            ctor: totals.ctor(),
            traffic_per_send: totals.traffic_per_send(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapRow {
    pub name: String,
    pub description: Option<String>,
    pub current: f64,
    pub target: f64,
    pub gap: f64,
    pub daily_required: Option<f64>,
    pub daily_actual: Option<f64>,
    pub status: GaugeStatus,
}

impl GapRow {
    fn rate(name: &str, current: f64, band: RateTarget) -> Self {
        Self {
            name: name.to_string(),
            description: Some(format!("Target: {}-{}%", band.min, band.max)),
            current,
            target: band.min,
            gap: band.min - current,
            daily_required: None,
            daily_actual: None,
            status: GaugeStatus::from_progress(percent(current, band.min), 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub month: NaiveDate,
    pub label: String,
    pub historical: Option<f64>,
    pub required: Option<f64>,
    pub projected: Option<f64>,
}

/// Three months of back-computed history, then one point per 30 days until
/// the deadline.
pub fn trajectory(projection: &Projection, now: DateTime<Utc>) -> Vec<TrajectoryPoint> {
    let Some(this_month) = NaiveDate::from_ymd_opt(now.year(), now.month(), 1) else {
        return Vec::new();
    };
    let month_offset = |offset: i32| -> Option<NaiveDate> {
        if offset >= 0 {
            this_month.checked_add_months(Months::new(offset as u32))
        } else {
            this_month.checked_sub_months(Months::new(offset.unsigned_abs()))
        }
    };
    let point = |month: NaiveDate, historical, required, projected| TrajectoryPoint {
        month,
        label: month.format("%b %y").to_string(),
        historical,
        required,
        projected,
    };

    let rate = projection.observed_daily_rate;
    let mut points = Vec::new();
    for offset in -HISTORY_MONTHS..=0 {
        if let Some(month) = month_offset(offset) {
            let back = rate * f64::from(offset.abs()) * 30.0;
            points.push(point(month, Some((projection.current - back).max(0.0)), None, None));
        }
    }

    let future_months = if projection.days_remaining > 0 {
        (projection.days_remaining + 29) / 30
    } else {
        0
    };
    for offset in 1..=future_months {
        let Some(month) = month_offset(offset as i32) else {
            break;
        };
        let days = offset as f64 * 30.0;
        points.push(point(
            month,
            None,
            Some(projection.current + projection.required_daily_rate * days),
            Some(projection.current + rate * days),
        ));
    }
    points
}

pub fn recommendations(
    projection: &Projection,
    engagement: &EngagementSnapshot,
    targets: &TargetConfig,
) -> Vec<String> {
    let mut out = Vec::new();
    if projection.status == TrajectoryStatus::Behind {
        out.push(format!(
            "Subscriber growth needs to increase by {:.1} subs/day. Consider: referral programs, cross-promotions, or paid acquisition.",
            projection.required_daily_rate - projection.observed_daily_rate
        ));
    }
    if engagement.open_rate < targets.open_rate.min {
        out.push(format!(
            "Open rate ({:.1}%) is below target ({}%). Test subject lines, optimize send times, and clean inactive subscribers.",
            engagement.open_rate, targets.open_rate.min
        ));
    }
    if engagement.ctor < targets.ctor.min {
        out.push(format!(
            "CTOR ({:.1}%) is below target ({}%). Improve CTA placement, use more compelling link text, and ensure content matches subject promises.",
            engagement.ctor, targets.ctor.min
        ));
    }
    if engagement.traffic_per_send < targets.traffic_per_send {
        out.push(format!(
            "Traffic per send ({:.0}) is below target ({}). Add more article links, use curiosity-driven teasers, and test link positioning.",
            engagement.traffic_per_send, targets.traffic_per_send
        ));
    }
    if out.is_empty() {
        out.push(
            "All metrics are on track! Maintain current strategies and continue monitoring."
                .to_string(),
        );
    }
    out.truncate(MAX_RECOMMENDATIONS);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
            Trend::InsufficientData => "insufficient data",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Compare the mean of the later half of `values` (oldest first) to the
/// earlier half. Moves beyond 5% either way count as a trend.
pub fn classify_trend(values: &[f64]) -> Trend {
    if values.len() < 4 {
        return Trend::InsufficientData;
    }
    let (first, second) = values.split_at(values.len() / 2);
    let first = mean(first);
    let second = mean(second);
    let change = if first > 0.0 {
        (second - first) / first * 100.0
    } else {
        0.0
    };

    if change > 5.0 {
        Trend::Improving
    } else if change < -5.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub generated_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub subscribers: Projection,
    pub engagement: EngagementSnapshot,
    pub open_rate_status: TargetStatus,
    pub ctr_status: TargetStatus,
    pub ctor_status: TargetStatus,
    pub traffic_status: TargetStatus,
    pub open_rate_trend: Trend,
    pub ctor_trend: Trend,
    pub gaps: Vec<GapRow>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub recommendations: Vec<String>,
}

/// Build the goal report for one publication's records (or all of them).
pub fn target_report(
    posts: &[Post],
    subscribers: &[Subscriber],
    targets: &TargetConfig,
    now: DateTime<Utc>,
) -> TargetReport {
    let active = subscribers.iter().filter(|s| s.is_active()).count() as f64;
    let rate = observed_daily_rate(subscribers.iter().filter_map(|s| s.created), now);
    let remaining = days_remaining(targets.deadline, now);
    let subscribers_projection = project(active, targets.subscribers as f64, rate, remaining);
    let engagement = EngagementSnapshot::from_posts(posts);

    let daily = daily_trend(posts);
    let open_rates: Vec<f64> = daily.iter().map(|p| p.open_rate).collect();
    let ctors: Vec<f64> = daily.iter().map(|p| p.ctor).collect();

    let required_progress = if subscribers_projection.required_daily_rate > 0.0 {
        percent(rate, subscribers_projection.required_daily_rate)
    } else {
        100.0
    };
    let gaps = vec![
        GapRow {
            name: "Subscribers".to_string(),
            description: None,
            current: active,
            target: targets.subscribers as f64,
            gap: subscribers_projection.needed,
            daily_required: Some(subscribers_projection.required_daily_rate),
            daily_actual: Some(rate),
            status: GaugeStatus::from_progress(
                percent(active, targets.subscribers as f64),
                required_progress,
            ),
        },
        GapRow::rate("Open Rate", engagement.open_rate, targets.open_rate),
        GapRow::rate("CTR", engagement.ctr, targets.ctr),
        GapRow::rate("CTOR", engagement.ctor, targets.ctor),
    ];

    TargetReport {
        generated_at: now,
        deadline: targets.deadline,
        subscribers: subscribers_projection,
        engagement,
        open_rate_status: TargetStatus::within(engagement.open_rate, targets.open_rate),
        ctr_status: TargetStatus::within(engagement.ctr, targets.ctr),
        ctor_status: TargetStatus::at_least(engagement.ctor, targets.ctor.min),
        traffic_status: TargetStatus::at_least(engagement.traffic_per_send, targets.traffic_per_send),
        open_rate_trend: classify_trend(&open_rates),
        ctor_trend: classify_trend(&ctors),
        gaps,
        trajectory: trajectory(&subscribers_projection, now),
        recommendations: recommendations(&subscribers_projection, &engagement, targets),
    }
}
