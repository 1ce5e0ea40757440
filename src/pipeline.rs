//! Snapshot to dashboard, and dashboard to per-period views.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::aggregate::{self, PostRanking, TOP_ARTICLES_LIMIT, TOP_VIEW_LIMIT};
use crate::cache::Snapshot;
use crate::config::EconomicsConfig;
use crate::content::{content_performance, ContentPerformance, FormatClassifier};
use crate::economics::{self, EconomicsComparison};
use crate::error::Result;
use crate::lenient;
use crate::metrics::{calculate_metrics, comparison_averages, ComparisonAverages, ComparisonPeriod};
use crate::models::{
    Dashboard, PeriodMetrics, Post, SourceGrowth, Subscriber, TopArticle, TopPost, TrendPoint,
};
use crate::normalize::{normalize_batch, Normalizer};
use crate::period::{filter_posts, DateRange, PeriodWindow, PublicationFilter, TimePeriod};
use crate::sources::growth_by_source;
use crate::trends::{comparison_series, daily_trend, trend_with_signups, ComparisonPoint, TrendField};

/// Normalize every bundle in `snapshot` and derive the account-wide rollups.
pub fn build_dashboard(snapshot: &Snapshot, normalizer: &Normalizer) -> Dashboard {
    let mut publications = Vec::new();
    let mut posts = Vec::new();
    let mut subscribers = Vec::new();
    let mut segments = Vec::new();

    for bundle in &snapshot.publications {
        let name = bundle
            .publication
            .get("name")
            .and_then(lenient::as_string)
            .unwrap_or_else(|| "Unknown".to_string());
        publications.extend(normalize_batch(
            "publication",
            std::slice::from_ref(&bundle.publication),
            |raw| normalizer.publication(raw),
        ));
        posts.extend(normalize_batch("post", &bundle.posts, |raw| {
            normalizer.post(raw, &name)
        }));
        subscribers.extend(normalize_batch("subscriber", &bundle.subscribers, |raw| {
            normalizer.subscriber(raw, &name)
        }));
        segments.extend(normalize_batch("segment", &bundle.segments, |raw| {
            normalizer.segment(raw, &name)
        }));
    }

    info!(
        publications = publications.len(),
        posts = posts.len(),
        subscribers = subscribers.len(),
        segments = segments.len(),
        "snapshot normalized"
    );

    let overview = aggregate::overview(&posts, &subscribers);
    let top_articles = aggregate::top_articles(&posts, TOP_ARTICLES_LIMIT);

    Dashboard {
        publications,
        overview: Some(overview),
        posts,
        subscribers,
        segments,
        top_articles,
        fetched_at: Some(snapshot.fetched_at),
    }
}

/// Fill in derived parts a stored document may lack.
pub fn complete_dashboard(mut dashboard: Dashboard) -> Dashboard {
    if dashboard.overview.is_none() {
        dashboard.overview = Some(aggregate::overview(&dashboard.posts, &dashboard.subscribers));
    }
    dashboard.top_articles = if dashboard.top_articles.is_empty() {
        aggregate::top_articles(&dashboard.posts, TOP_ARTICLES_LIMIT)
    } else {
        aggregate::rank_articles(&dashboard.top_articles, TOP_ARTICLES_LIMIT)
    };
    dashboard
}

/// Parse a dashboard document. Canonical and legacy field names are both accepted.
pub fn dashboard_from_value(value: Value) -> Result<Dashboard> {
    let dashboard: Dashboard = serde_json::from_value(value)?;
    Ok(complete_dashboard(dashboard))
}

pub fn load_dashboard(path: &Path) -> Result<Dashboard> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "dashboard document loaded");
    dashboard_from_value(value)
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub period: TimePeriod,
    pub custom: Option<(NaiveDate, NaiveDate)>,
    /// Publication id or name, or `overall`.
    pub publication: String,
    pub comparison: Option<ComparisonPeriod>,
    pub ranking: PostRanking,
    pub limit: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            period: TimePeriod::SevenDay,
            custom: None,
            publication: "overall".to_string(),
            comparison: None,
            ranking: PostRanking::default(),
            limit: TOP_VIEW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonView {
    pub label: String,
    pub range: DateRange,
    pub averages: Option<ComparisonAverages>,
    pub trend: Vec<TrendPoint>,
}

/// Everything shown for one publication over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodView {
    pub publication: String,
    pub window: PeriodWindow,
    pub metrics: PeriodMetrics,
    pub trend: Vec<TrendPoint>,
    pub source_growth: SourceGrowth,
    pub top_articles: Vec<TopArticle>,
    pub top_posts: Vec<TopPost>,
    pub comparison: Option<ComparisonView>,
}

impl PeriodView {
    /// Current trend against the comparison window, if one was requested.
    pub fn comparison_series(&self, field: TrendField) -> Option<Vec<ComparisonPoint>> {
        self.comparison
            .as_ref()
            .map(|comparison| comparison_series(&self.trend, &comparison.trend, field))
    }
}

/// Records narrowed to one publication.
#[derive(Debug, Clone, Default)]
pub struct Scoped {
    pub label: String,
    pub posts: Vec<Post>,
    pub subscribers: Vec<Subscriber>,
}

pub fn scope(dashboard: &Dashboard, selector: &str) -> Scoped {
    let filter = PublicationFilter::resolve(selector, &dashboard.publications);
    let label = match &filter {
        PublicationFilter::Overall => "overall".to_string(),
        PublicationFilter::Named(name) => name.clone(),
    };
    Scoped {
        label,
        posts: filter.apply(&dashboard.posts),
        subscribers: filter.apply(&dashboard.subscribers),
    }
}

pub fn analyze(dashboard: &Dashboard, options: &ViewOptions, now: DateTime<Utc>) -> Result<PeriodView> {
    let scoped = scope(dashboard, &options.publication);
    let window = PeriodWindow::resolve(options.period, &scoped.posts, options.custom, now)?;

    let current = filter_posts(&scoped.posts, &window.current);
    let prior = filter_posts(&scoped.posts, &window.prior);
    debug!(
        publication = %scoped.label,
        period = %options.period,
        current = current.len(),
        prior = prior.len(),
        "period resolved"
    );

    let metrics = calculate_metrics(
        &current,
        &prior,
        &scoped.subscribers,
        &window.current,
        &window.prior,
    );

    let comparison = options.comparison.map(|period| {
        let range = window.current.shifted_back(period.days());
        let posts = filter_posts(&scoped.posts, &range);
        ComparisonView {
            label: period.label().to_string(),
            range,
            averages: comparison_averages(&posts),
            trend: daily_trend(&posts),
        }
    });

    Ok(PeriodView {
        publication: scoped.label,
        window,
        metrics,
        trend: trend_with_signups(&current, &scoped.subscribers, &window.current),
        source_growth: growth_by_source(&scoped.subscribers, Some(&window.current)),
        top_articles: aggregate::top_articles(&current, options.limit),
        top_posts: aggregate::top_posts(&current, options.ranking, options.limit),
        comparison,
    })
}

/// Unit economics for the selected window against the one before it.
pub fn economics_view(
    dashboard: &Dashboard,
    options: &ViewOptions,
    config: &EconomicsConfig,
    now: DateTime<Utc>,
) -> Result<EconomicsComparison> {
    let scoped = scope(dashboard, &options.publication);
    let window = PeriodWindow::resolve(options.period, &scoped.posts, options.custom, now)?;
    Ok(economics::compare(&scoped.posts, &scoped.subscribers, &window, config))
}

/// Headline format performance for posts in the selected window.
pub fn content_view(
    dashboard: &Dashboard,
    options: &ViewOptions,
    now: DateTime<Utc>,
) -> Result<ContentPerformance> {
    let scoped = scope(dashboard, &options.publication);
    let window = PeriodWindow::resolve(options.period, &scoped.posts, options.custom, now)?;
    let classifier = FormatClassifier::new()?;
    Ok(content_performance(&filter_posts(&scoped.posts, &window.current), &classifier))
}
