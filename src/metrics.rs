use serde::{Deserialize, Serialize};

use crate::models::{MetricValue, PeriodMetrics, Post, Subscriber};
use crate::period::{count_subscribers_in, DateRange};
use crate::rates::{percent, ratio, saturating_sum};

/// Summed send counters for a set of posts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PostTotals {
    pub posts: u64,
    pub recipients: u64,
    pub delivered: u64,
    pub opens: u64,
    pub unique_opens: u64,
    pub clicks: u64,
    pub unique_clicks: u64,
    pub unsubscribes: u64,
    pub traffic_sent: u64,
}

impl PostTotals {
    pub fn from_posts<'a, I>(posts: I) -> Self
    where
        I: IntoIterator<Item = &'a Post>,
    {
        posts.into_iter().fold(Self::default(), |mut totals, post| {
            totals.add(post);
            totals
        })
    }

    /// Counters saturate rather than overflow on absurd upstream values.
    pub fn add(&mut self, post: &Post) {
        self.posts = self.posts.saturating_add(1);
        self.recipients = self.recipients.saturating_add(post.recipients);
        self.delivered = self.delivered.saturating_add(post.delivered);
        self.opens = self.opens.saturating_add(post.opens);
        self.unique_opens = self.unique_opens.saturating_add(post.unique_opens);
        self.clicks = self.clicks.saturating_add(post.clicks);
        self.unique_clicks = self.unique_clicks.saturating_add(post.unique_clicks);
        self.unsubscribes = self.unsubscribes.saturating_add(post.unsubscribes);
        self.traffic_sent = self.traffic_sent.saturating_add(post.traffic_sent());
    }

    pub fn open_rate(&self) -> f64 {
        percent(self.unique_opens as f64, self.delivered as f64)
    }

    pub fn ctr(&self) -> f64 {
        percent(self.unique_clicks as f64, self.delivered as f64)
    }

    /// Click-to-open rate on unique counters.
    pub fn ctor(&self) -> f64 {
        percent(self.unique_clicks as f64, self.unique_opens as f64)
    }

    pub fn unsubscribe_rate(&self) -> f64 {
        percent(self.unsubscribes as f64, self.delivered as f64)
    }

    pub fn bounce_rate(&self) -> f64 {
        let bounced = self.recipients.saturating_sub(self.delivered);
        percent(bounced as f64, self.recipients as f64)
    }

    pub fn traffic_per_send(&self) -> f64 {
        ratio(self.traffic_sent as f64, self.posts as f64)
    }
}

fn growth_rate(new: i64, starting: i64) -> f64 {
    if starting > 0 {
        new as f64 * 100.0 / starting as f64
    } else if new > 0 {
        100.0
    } else {
        0.0
    }
}

/// KPIs for the current window with their change against the prior window.
///
/// `subscribers` is the full list; signups are bucketed by the two ranges.
pub fn calculate_metrics(
    current: &[Post],
    prior: &[Post],
    subscribers: &[Subscriber],
    range: &DateRange,
    prior_range: &DateRange,
) -> PeriodMetrics {
    let now = PostTotals::from_posts(current);
    let before = PostTotals::from_posts(prior);

    let active: Vec<&Subscriber> = subscribers.iter().filter(|s| s.is_active()).collect();
    let active_count = active.len() as i64;
    let new_in_period = count_subscribers_in(subscribers, range) as i64;
    let new_in_prior = count_subscribers_in(subscribers, prior_range) as i64;

    let starting = active_count - new_in_period;
    let starting_prior = starting - new_in_prior;
    let growth = growth_rate(new_in_period, starting);
    let prior_growth = growth_rate(new_in_prior, starting_prior);

    let engaged = active
        .iter()
        .filter(|s| s.engagement_tier.is_engaged())
        .count();
    let active_rate = percent(engaged as f64, active_count as f64);

    PeriodMetrics {
        total_subs: MetricValue::new(active_count as f64, new_in_period as f64),
        new_subscribers: MetricValue::delta(new_in_period as f64, new_in_prior as f64),
        subs_growth_rate: MetricValue::delta(growth, prior_growth),
        open_rate: MetricValue::delta(now.open_rate(), before.open_rate()),
        ctr: MetricValue::delta(now.ctr(), before.ctr()),
        traffic_sent: MetricValue::delta(now.traffic_sent as f64, before.traffic_sent as f64),
        ctor: MetricValue::delta(now.ctor(), before.ctor()),
        unsubscribe_rate: MetricValue::delta(now.unsubscribe_rate(), before.unsubscribe_rate()),
        // Tier history is not retained, so there is nothing to compare against.
        active_rate: MetricValue::new(active_rate, 0.0),
        bounce_rate: MetricValue::delta(now.bounce_rate(), before.bounce_rate()),
        total_unsubscribes: MetricValue::delta(now.unsubscribes as f64, before.unsubscribes as f64),
    }
}

/// Comparison window offered next to the selected period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonPeriod {
    Week,
    Month,
}

impl ComparisonPeriod {
    pub fn days(&self) -> i64 {
        match self {
            ComparisonPeriod::Week => 7,
            ComparisonPeriod::Month => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComparisonPeriod::Week => "Prev Week Avg",
            ComparisonPeriod::Month => "Prev Month Avg",
        }
    }
}

impl std::str::FromStr for ComparisonPeriod {
    type Err = crate::error::AnalyticsError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "week" | "weekly" => Ok(ComparisonPeriod::Week),
            "month" | "monthly" => Ok(ComparisonPeriod::Month),
            other => Err(crate::error::AnalyticsError::InvalidPeriod(other.to_string())),
        }
    }
}

/// Weighted averages over the comparison window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonAverages {
    pub open_rate: f64,
    pub ctr: f64,
    /// Total clicks over total opens, not the unique-counter ctor.
    pub ctor: f64,
    pub subscribers: u64,
    pub unsubscribe_rate: f64,
    pub bounce_rate: f64,
}

/// `None` when the window holds no posts.
pub fn comparison_averages(posts: &[Post]) -> Option<ComparisonAverages> {
    if posts.is_empty() {
        return None;
    }
    let mut totals = PostTotals::from_posts(posts);
    // Recipients fall back to delivered for posts that report none.
    totals.recipients = saturating_sum(
        posts
            .iter()
            .map(|p| if p.recipients > 0 { p.recipients } else { p.delivered }),
    );

    Some(ComparisonAverages {
        open_rate: totals.open_rate(),
        ctr: totals.ctr(),
        ctor: percent(totals.clicks as f64, totals.opens as f64),
        subscribers: totals.delivered,
        unsubscribe_rate: totals.unsubscribe_rate(),
        bounce_rate: totals.bounce_rate(),
    })
}
