//! Unit economics: what subscribers and clicks cost, and what the article
//! traffic they produce is estimated to earn.
//!
//! Revenue is an estimate. Article clicks are converted to page views at a
//! fixed ratio and priced at a fixed RPM, both taken from [`EconomicsConfig`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::EconomicsConfig;
use crate::metrics::PostTotals;
use crate::models::{Post, Subscriber, TrendPoint};
use crate::period::{filter_posts, filter_subscribers, DateRange, PeriodWindow};
use crate::rates::{percent, ratio};

/// Used to turn the monthly platform fee into a weekly one.
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Platform fee charged against a window of `days`.
pub fn platform_cost(monthly: f64, days: i64) -> f64 {
    match days {
        7 => monthly / WEEKS_PER_MONTH,
        30 => monthly,
        _ => monthly / 30.0 * days.max(0) as f64,
    }
}

pub fn is_paid_source(source: &str, paid_sources: &[String]) -> bool {
    let source = source.to_lowercase();
    paid_sources
        .iter()
        .any(|paid| !paid.is_empty() && source.contains(&paid.to_lowercase()))
}

/// Estimated ad revenue for a number of article clicks.
pub fn estimated_revenue(article_clicks: u64, config: &EconomicsConfig) -> f64 {
    article_clicks as f64 * config.page_views_per_click / 1000.0 * config.rpm
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitEconomics {
    pub posts: u64,
    pub delivered: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub article_clicks: u64,
    pub new_subscribers: u64,
    pub paid_subscribers: u64,
    pub organic_subscribers: u64,
    pub platform_cost: f64,
    pub acquisition_cost: f64,
    pub total_cost: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub ctor: f64,
    /// Total cost per new subscriber.
    pub cost_per_subscriber: f64,
    /// Unique clickers are approximated by unique clicks.
    pub cost_per_clicker: f64,
    pub clicks_per_clicker: f64,
    pub estimated_page_views: f64,
    pub estimated_revenue: f64,
    pub profit: f64,
    pub revenue_per_clicker: f64,
    pub revenue_per_click: f64,
    pub rpm: f64,
    /// Percent; 0 when there is no cost.
    pub roi: f64,
}

impl UnitEconomics {
    /// `new_subscribers` are the signups attributed to the same window as `posts`.
    pub fn calculate(
        posts: &[Post],
        new_subscribers: &[Subscriber],
        platform_cost: f64,
        config: &EconomicsConfig,
    ) -> Self {
        let totals = PostTotals::from_posts(posts);
        let new_count = new_subscribers.len() as u64;
        let paid = new_subscribers
            .iter()
            .filter(|s| is_paid_source(&s.utm_source, &config.paid_sources))
            .count() as u64;

        let acquisition_cost = paid as f64 * config.cost_per_paid_subscriber;
        let total_cost = acquisition_cost + platform_cost;

        let clickers = totals.unique_clicks as f64;
        let article_clicks = totals.traffic_sent;
        let page_views = article_clicks as f64 * config.page_views_per_click;
        let revenue = estimated_revenue(article_clicks, config);

        Self {
            posts: totals.posts,
            delivered: totals.delivered,
            unique_opens: totals.unique_opens,
            unique_clicks: totals.unique_clicks,
            article_clicks,
            new_subscribers: new_count,
            paid_subscribers: paid,
            organic_subscribers: new_count - paid,
            platform_cost,
            acquisition_cost,
            total_cost,
            open_rate: totals.open_rate(),
            click_rate: totals.ctr(),
            ctor: totals.ctor(),
            cost_per_subscriber: ratio(total_cost, new_count as f64),
            cost_per_clicker: ratio(total_cost, clickers),
            clicks_per_clicker: ratio(article_clicks as f64, clickers),
            estimated_page_views: page_views,
            estimated_revenue: revenue,
            profit: revenue - total_cost,
            revenue_per_clicker: ratio(revenue, clickers),
            revenue_per_click: ratio(revenue, article_clicks as f64),
            rpm: ratio(revenue * 1000.0, page_views),
            roi: percent(revenue - total_cost, total_cost),
        }
    }
}

/// `(current - prior) / prior` in percent, 0 without a positive prior.
pub fn percent_change(current: f64, prior: f64) -> f64 {
    if prior > 0.0 {
        (current - prior) * 100.0 / prior
    } else {
        0.0
    }
}

/// Movement of the financial headline figures against the prior window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicsChange {
    /// Percent.
    pub revenue: f64,
    /// Percent.
    pub total_cost: f64,
    /// Percent of the prior profit's magnitude, so a shrinking loss is positive.
    pub profit: f64,
    /// Percentage points.
    pub roi: f64,
    pub rpm: f64,
}

impl EconomicsChange {
    pub fn between(current: &UnitEconomics, prior: &UnitEconomics) -> Self {
        let profit = if prior.profit != 0.0 {
            (current.profit - prior.profit) * 100.0 / prior.profit.abs()
        } else {
            0.0
        };
        Self {
            revenue: percent_change(current.estimated_revenue, prior.estimated_revenue),
            total_cost: percent_change(current.total_cost, prior.total_cost),
            profit,
            roi: current.roi - prior.roi,
            rpm: current.rpm - prior.rpm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub date: NaiveDate,
    pub article_clicks: u64,
    pub revenue: f64,
}

pub fn revenue_trend(trend: &[TrendPoint], config: &EconomicsConfig) -> Vec<RevenuePoint> {
    trend
        .iter()
        .map(|point| RevenuePoint {
            date: point.date,
            article_clicks: point.traffic_sent,
            revenue: estimated_revenue(point.traffic_sent, config),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicsComparison {
    pub range: DateRange,
    pub prior_range: DateRange,
    pub active_subscribers: u64,
    pub current: UnitEconomics,
    pub prior: UnitEconomics,
    pub change: EconomicsChange,
    pub revenue_trend: Vec<RevenuePoint>,
}

/// Unit economics for a resolved window and the window before it.
///
/// Both windows are charged the platform fee for the current window's length.
pub fn compare(
    posts: &[Post],
    subscribers: &[Subscriber],
    window: &PeriodWindow,
    config: &EconomicsConfig,
) -> EconomicsComparison {
    let fee = platform_cost(config.platform_monthly_cost, window.length_days);
    let current_posts = filter_posts(posts, &window.current);
    let prior_posts = filter_posts(posts, &window.prior);

    let current = UnitEconomics::calculate(
        &current_posts,
        &filter_subscribers(subscribers, &window.current),
        fee,
        config,
    );
    let prior = UnitEconomics::calculate(
        &prior_posts,
        &filter_subscribers(subscribers, &window.prior),
        fee,
        config,
    );

    EconomicsComparison {
        range: window.current,
        prior_range: window.prior,
        active_subscribers: subscribers.iter().filter(|s| s.is_active()).count() as u64,
        change: EconomicsChange::between(&current, &prior),
        revenue_trend: revenue_trend(&crate::trends::daily_trend(&current_posts), config),
        current,
        prior,
    }
}
