use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::rates::saturating_sum;

// Entity field names are camelCase. The aliases accept older cache documents
// that used Title-Case-with-spaces or snake_case names for the same fields.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub active_subscribers: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub premium_subscribers: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub free_subscribers: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub avg_open_rate: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub avg_click_rate: f64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_sent: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_opened: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_clicked: u64,
}

/// An outbound link inside a post that points at one of our content domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleClick {
    #[serde(default, alias = "Article URL", deserialize_with = "lenient::text")]
    pub url: String,
    #[serde(
        default,
        alias = "Total Clicks",
        alias = "total_clicks",
        deserialize_with = "lenient::count"
    )]
    pub total_clicks: u64,
    #[serde(
        default,
        alias = "Unique Clicks",
        alias = "unique_clicks",
        deserialize_with = "lenient::count"
    )]
    pub unique_clicks: u64,
    #[serde(default, alias = "email_clicks", deserialize_with = "lenient::count")]
    pub email_clicks: u64,
}

/// One newsletter send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default, alias = "Post ID", deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, alias = "Title", deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, alias = "Subtitle", deserialize_with = "lenient::text")]
    pub subtitle: String,
    /// Email subject line; empty when unknown.
    #[serde(
        default,
        alias = "Subject",
        alias = "subject_line",
        deserialize_with = "lenient::text"
    )]
    pub subject_line: String,
    #[serde(
        default,
        alias = "Publish Date",
        alias = "publish_date",
        deserialize_with = "lenient::timestamp"
    )]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "Status", deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(default, alias = "web_url", deserialize_with = "lenient::text")]
    pub web_url: String,
    #[serde(
        default,
        alias = "Publication Name",
        alias = "publication_name",
        deserialize_with = "lenient::text"
    )]
    pub publication_name: String,
    #[serde(default, alias = "Recipients", deserialize_with = "lenient::count")]
    pub recipients: u64,
    #[serde(default, alias = "Delivered", deserialize_with = "lenient::count")]
    pub delivered: u64,
    #[serde(default, alias = "Opens", deserialize_with = "lenient::count")]
    pub opens: u64,
    #[serde(
        default,
        alias = "Unique Opens",
        alias = "unique_opens",
        deserialize_with = "lenient::count"
    )]
    pub unique_opens: u64,
    #[serde(
        default,
        alias = "Open Rate %",
        alias = "open_rate",
        deserialize_with = "lenient::float"
    )]
    pub open_rate: f64,
    #[serde(default, alias = "Clicks", deserialize_with = "lenient::count")]
    pub clicks: u64,
    #[serde(
        default,
        alias = "Unique Clicks",
        alias = "unique_clicks",
        deserialize_with = "lenient::count"
    )]
    pub unique_clicks: u64,
    #[serde(
        default,
        alias = "Click Rate %",
        alias = "click_rate",
        deserialize_with = "lenient::float"
    )]
    pub click_rate: f64,
    #[serde(default, alias = "Unsubscribes", deserialize_with = "lenient::count")]
    pub unsubscribes: u64,
    #[serde(
        default,
        alias = "Spam Reports",
        alias = "spam_reports",
        deserialize_with = "lenient::count"
    )]
    pub spam_reports: u64,
    #[serde(default, alias = "Article Clicks", alias = "article_clicks")]
    pub article_clicks: Vec<ArticleClick>,
}

impl Post {
    /// Total clicks on article links in this post.
    pub fn traffic_sent(&self) -> u64 {
        saturating_sum(self.article_clicks.iter().map(|a| a.total_clicks))
    }

    pub fn publish_day(&self) -> Option<NaiveDate> {
        self.publish_date.map(|d| d.date_naive())
    }
}

/// Coarse engagement bucket derived from a subscriber's open rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngagementTier {
    High,
    Medium,
    Low,
    VeryLow,
    #[default]
    NoData,
}

impl EngagementTier {
    pub const ALL: [EngagementTier; 5] = [
        EngagementTier::High,
        EngagementTier::Medium,
        EngagementTier::Low,
        EngagementTier::VeryLow,
        EngagementTier::NoData,
    ];

    /// Lower bounds are inclusive: 50 is High, 49.999 is Medium.
    pub fn from_open_rate(open_rate: f64) -> Self {
        if open_rate >= 50.0 {
            EngagementTier::High
        } else if open_rate >= 20.0 {
            EngagementTier::Medium
        } else if open_rate >= 5.0 {
            EngagementTier::Low
        } else if open_rate > 0.0 {
            EngagementTier::VeryLow
        } else {
            EngagementTier::NoData
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementTier::High => "High",
            EngagementTier::Medium => "Medium",
            EngagementTier::Low => "Low",
            EngagementTier::VeryLow => "Very Low",
            EngagementTier::NoData => "No Data",
        }
    }

    pub fn is_engaged(&self) -> bool {
        !matches!(self, EngagementTier::VeryLow | EngagementTier::NoData)
    }
}

impl fmt::Display for EngagementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EngagementTier {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => EngagementTier::High,
            "medium" => EngagementTier::Medium,
            "low" => EngagementTier::Low,
            "very low" | "very_low" | "verylow" => EngagementTier::VeryLow,
            _ => EngagementTier::NoData,
        }
    }
}

impl From<EngagementTier> for String {
    fn from(value: EngagementTier) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, alias = "Email", deserialize_with = "lenient::text")]
    pub email: String,
    #[serde(default, alias = "Status", deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(default, alias = "Tier", deserialize_with = "lenient::text")]
    pub tier: String,
    #[serde(
        default,
        alias = "Subscribe Date",
        alias = "created_at",
        deserialize_with = "lenient::timestamp"
    )]
    pub created: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "Publication Name",
        alias = "publication_name",
        deserialize_with = "lenient::text"
    )]
    pub publication_name: String,
    #[serde(
        default,
        alias = "UTM Source",
        alias = "utm_source",
        deserialize_with = "lenient::text"
    )]
    pub utm_source: String,
    #[serde(default, alias = "utm_medium", deserialize_with = "lenient::text")]
    pub utm_medium: String,
    #[serde(default, alias = "utm_campaign", deserialize_with = "lenient::text")]
    pub utm_campaign: String,
    #[serde(default, alias = "emails_received", deserialize_with = "lenient::count")]
    pub emails_received: u64,
    #[serde(
        default,
        alias = "Open Rate %",
        alias = "open_rate",
        deserialize_with = "lenient::float"
    )]
    pub open_rate: f64,
    #[serde(
        default,
        alias = "Click Rate %",
        alias = "click_rate",
        deserialize_with = "lenient::float"
    )]
    pub click_rate: f64,
    #[serde(
        default,
        alias = "Engagement Tier",
        alias = "engagement_tier",
        deserialize_with = "lenient_tier"
    )]
    pub engagement_tier: EngagementTier,
}

fn lenient_tier<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<EngagementTier, D::Error> {
    Ok(lenient::string(deserializer)?
        .map(EngagementTier::from)
        .unwrap_or_default())
}

impl Subscriber {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    /// Direct and website signups count as organic acquisition.
    pub fn is_organic(&self) -> bool {
        let source = self.utm_source.as_str();
        source.is_empty() || source == "direct" || source == "website"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub segment_type: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(default, alias = "publication_name", deserialize_with = "lenient::text")]
    pub publication_name: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_subscribers: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub open_rate: f64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub click_rate: f64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_sent: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_delivered: u64,
}

/// Account-wide rollup across every publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverviewAggregate {
    pub total_subscribers: u64,
    pub organic_users: u64,
    pub inorganic_users: u64,
    pub total_unsubscribes: u64,
    pub total_spam_reports: u64,
    pub total_newsletter_sends: u64,
    pub avg_open_rate: f64,
    pub avg_click_rate: f64,
    pub unsubscribe_rate: f64,
    pub spam_rate: f64,
    pub engagement_distribution: BTreeMap<EngagementTier, u64>,
    pub utm_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopArticle {
    #[serde(default, alias = "Article URL", deserialize_with = "lenient::text")]
    pub url: String,
    #[serde(default, alias = "Post Title", deserialize_with = "lenient::text")]
    pub post_title: String,
    #[serde(default, alias = "Publish Date", deserialize_with = "lenient::timestamp")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "Total Clicks", deserialize_with = "lenient::count")]
    pub total_clicks: u64,
    #[serde(default, alias = "Unique Clicks", deserialize_with = "lenient::count")]
    pub unique_clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPost {
    pub title: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub open_rate: f64,
    pub click_rate: f64,
    pub recipients: u64,
    pub unique_clicks: u64,
    pub traffic_sent: u64,
}

/// Totals and derived rates for one calendar day of sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub posts: u64,
    pub delivered: u64,
    pub recipients: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub clicks: u64,
    pub unsubscribes: u64,
    pub open_rate: f64,
    pub ctr: f64,
    pub ctor: f64,
    pub unsubscribe_rate: f64,
    pub bounce_rate: f64,
    pub traffic_sent: u64,
    pub new_subscribers: u64,
}

/// Daily signups per normalized acquisition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGrowthPoint {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGrowth {
    pub data: Vec<SourceGrowthPoint>,
    /// `"total"` followed by every source, sorted.
    pub sources: Vec<String>,
}

/// A KPI for the selected period and its change against the prior period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub change: f64,
}

impl MetricValue {
    pub fn new(value: f64, change: f64) -> Self {
        Self { value, change }
    }

    /// Value with its change computed as `current - prior`.
    pub fn delta(current: f64, prior: f64) -> Self {
        Self {
            value: current,
            change: current - prior,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub total_subs: MetricValue,
    pub new_subscribers: MetricValue,
    pub subs_growth_rate: MetricValue,
    pub open_rate: MetricValue,
    pub ctr: MetricValue,
    pub traffic_sent: MetricValue,
    pub ctor: MetricValue,
    pub unsubscribe_rate: MetricValue,
    pub active_rate: MetricValue,
    pub bounce_rate: MetricValue,
    pub total_unsubscribes: MetricValue,
}

/// The normalized, derived document handed to dashboard consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub overview: Option<OverviewAggregate>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, alias = "articleClicks")]
    pub top_articles: Vec<TopArticle>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub fetched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn engagement_tier_boundaries() {
        assert_eq!(EngagementTier::from_open_rate(50.0), EngagementTier::High);
        assert_eq!(EngagementTier::from_open_rate(49.999), EngagementTier::Medium);
        assert_eq!(EngagementTier::from_open_rate(20.0), EngagementTier::Medium);
        assert_eq!(EngagementTier::from_open_rate(5.0), EngagementTier::Low);
        assert_eq!(EngagementTier::from_open_rate(0.01), EngagementTier::VeryLow);
        assert_eq!(EngagementTier::from_open_rate(0.0), EngagementTier::NoData);
    }

    #[test]
    fn tiers_serialize_with_display_names() {
        let encoded = serde_json::to_string(&EngagementTier::VeryLow).unwrap();
        assert_eq!(encoded, "\"Very Low\"");
        let decoded: EngagementTier = serde_json::from_str("\"No Data\"").unwrap();
        assert_eq!(decoded, EngagementTier::NoData);
    }

    #[test]
    fn legacy_post_names_map_onto_canonical_fields() {
        let legacy = json!({
            "Title": "Morning Brief",
            "Publish Date": "2026-01-05T08:00:00.000Z",
            "Publication Name": "Main",
            "Recipients": 1200,
            "Delivered": 1180,
            "Unique Opens": 400,
            "Open Rate %": 33.9,
            "Unique Clicks": null,
            "Article Clicks": [{"url": "https://example.com/a", "totalClicks": 12}]
        });

        let post: Post = serde_json::from_value(legacy).unwrap();
        assert_eq!(post.title, "Morning Brief");
        assert_eq!(post.publication_name, "Main");
        assert_eq!(post.delivered, 1180);
        assert_eq!(post.unique_opens, 400);
        assert_eq!(post.unique_clicks, 0);
        assert_eq!(post.traffic_sent(), 12);
        assert_eq!(post.publish_day(), NaiveDate::from_ymd_opt(2026, 1, 5));
    }

    #[test]
    fn snake_case_and_camel_case_subscribers_agree() {
        let camel: Subscriber = serde_json::from_value(json!({
            "status": "active",
            "created": "2026-01-02T00:00:00Z",
            "utmSource": "ml2",
            "engagementTier": "High"
        }))
        .unwrap();
        let snake: Subscriber = serde_json::from_value(json!({
            "Status": "active",
            "Subscribe Date": "2026-01-02T00:00:00Z",
            "utm_source": "ml2",
            "engagement_tier": "High"
        }))
        .unwrap();
        assert_eq!(camel, snake);
        assert!(camel.is_active());
        assert!(!camel.is_organic());
    }

    #[test]
    fn malformed_dates_deserialize_as_missing() {
        let post: Post = serde_json::from_value(json!({"publishDate": "soon"})).unwrap();
        assert!(post.publish_date.is_none());
    }

    #[test]
    fn source_growth_points_flatten_counts() {
        let mut counts = BTreeMap::new();
        counts.insert("direct".to_string(), 1);
        let point = SourceGrowthPoint {
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            counts,
            total: 1,
        };
        let encoded = serde_json::to_value(&point).unwrap();
        assert_eq!(encoded, json!({"date": "2026-01-01", "direct": 1, "total": 1}));
    }
}
