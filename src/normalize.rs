use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{AnalyticsError, Result};
use crate::models::{ArticleClick, EngagementTier, Post, Publication, Segment, Subscriber};
use crate::raw::{RawPost, RawPublication, RawSegment, RawSubscriber};
use crate::rates::{extract_rate, percent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlCategory {
    Unknown,
    Article,
    Social,
    Beehiiv,
    Other,
}

/// Classify a link destination. The first matching rule wins and every
/// comparison is a case-insensitive substring test.
pub fn categorize_url(url: Option<&str>, content_domains: &[String]) -> UrlCategory {
    let url = match url {
        Some(url) if !url.is_empty() => url.to_lowercase(),
        _ => return UrlCategory::Unknown,
    };

    if content_domains
        .iter()
        .any(|domain| !domain.is_empty() && url.contains(&domain.to_lowercase()))
    {
        return UrlCategory::Article;
    }
    if url.contains("facebook.com/sharer") || url.contains("twitter.com/intent") {
        return UrlCategory::Social;
    }
    if url.contains("beehiiv.com") {
        return UrlCategory::Beehiiv;
    }
    UrlCategory::Other
}

/// Maps raw API records onto pipeline entities.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    content_domains: Vec<String>,
}

impl Normalizer {
    pub fn new(content_domains: Vec<String>) -> Self {
        Self { content_domains }
    }

    pub fn publication(&self, raw: &Value) -> Result<Publication> {
        let record: RawPublication = parse_record("publication", raw)?;
        let id = require_id("publication", record.id)?;
        let stats = record.stats.unwrap_or_default();

        Ok(Publication {
            id,
            name: record.name.unwrap_or_else(|| "Unknown".to_string()),
            active_subscribers: stats.active_subscriptions,
            premium_subscribers: stats.active_premium_subscriptions,
            free_subscribers: stats.active_free_subscriptions,
            avg_open_rate: extract_rate(stats.average_open_rate),
            avg_click_rate: extract_rate(stats.average_click_rate),
            total_sent: stats.total_sent,
            total_opened: stats.total_unique_opened,
            total_clicked: stats.total_clicked,
        })
    }

    pub fn post(&self, raw: &Value, publication_name: &str) -> Result<Post> {
        let record: RawPost = parse_record("post", raw)?;
        let id = require_id("post", record.id)?;
        let stats = record.stats.unwrap_or_default();
        let email = stats.email.unwrap_or_default();

        let article_clicks = stats
            .clicks
            .into_iter()
            .filter(|click| {
                categorize_url(click.url.as_deref(), &self.content_domains) == UrlCategory::Article
            })
            .map(|click| ArticleClick {
                url: click.url.unwrap_or_default(),
                total_clicks: click.total_clicks,
                unique_clicks: click.total_unique_clicks,
                email_clicks: click.email.map(|e| e.clicks).unwrap_or(0),
            })
            .collect();

        // Some payloads omit the precomputed rates; derive them from the counters.
        let open_rate = match email.open_rate {
            Some(rate) => extract_rate(Some(rate)),
            None => percent(email.unique_opens as f64, email.delivered as f64),
        };
        let click_rate = match email.click_rate {
            Some(rate) => extract_rate(Some(rate)),
            None => percent(email.unique_clicks as f64, email.delivered as f64),
        };

        Ok(Post {
            id,
            title: record.title.unwrap_or_else(|| "Untitled".to_string()),
            subtitle: record.subtitle.unwrap_or_default(),
            subject_line: record.subject_line.unwrap_or_default(),
            publish_date: record.publish_date,
            status: record.status.unwrap_or_default(),
            web_url: record.web_url.unwrap_or_default(),
            publication_name: publication_name.to_string(),
            recipients: email.recipients,
            delivered: email.delivered,
            opens: email.opens,
            unique_opens: email.unique_opens,
            open_rate,
            clicks: email.clicks,
            unique_clicks: email.unique_clicks,
            click_rate,
            unsubscribes: email.unsubscribes,
            spam_reports: email.spam_reports,
            article_clicks,
        })
    }

    pub fn subscriber(&self, raw: &Value, publication_name: &str) -> Result<Subscriber> {
        let record: RawSubscriber = parse_record("subscriber", raw)?;
        let id = require_id("subscriber", record.id)?;
        let stats = record.stats.unwrap_or_default();
        let open_rate = extract_rate(stats.open_rate);

        let emails_received = if stats.emails_received > 0 {
            stats.emails_received
        } else {
            stats.total_emails
        };

        Ok(Subscriber {
            id,
            email: record.email.unwrap_or_default(),
            status: record.status.unwrap_or_default(),
            tier: record.subscription_tier.unwrap_or_else(|| "free".to_string()),
            created: record.created,
            publication_name: publication_name.to_string(),
            utm_source: record.utm_source.unwrap_or_else(|| "direct".to_string()),
            utm_medium: record.utm_medium.unwrap_or_default(),
            utm_campaign: record.utm_campaign.unwrap_or_default(),
            emails_received,
            open_rate,
            click_rate: extract_rate(stats.click_through_rate.or(stats.click_rate)),
            engagement_tier: EngagementTier::from_open_rate(open_rate),
        })
    }

    pub fn segment(&self, raw: &Value, publication_name: &str) -> Result<Segment> {
        let record: RawSegment = parse_record("segment", raw)?;
        let id = require_id("segment", record.id)?;
        let stats = record.stats.unwrap_or_default();

        let total_subscribers = if record.total_results > 0 {
            record.total_results
        } else {
            stats.total_subscribers
        };

        Ok(Segment {
            id,
            name: record.name.unwrap_or_default(),
            segment_type: record.segment_type.unwrap_or_default(),
            status: record.status.unwrap_or_default(),
            publication_name: publication_name.to_string(),
            total_subscribers,
            open_rate: extract_rate(stats.open_rate),
            click_rate: extract_rate(stats.clickthrough_rate),
            total_sent: stats.total_sent,
            total_delivered: stats.total_delivered,
        })
    }
}

fn parse_record<T: DeserializeOwned>(kind: &'static str, raw: &Value) -> Result<T> {
    if !raw.is_object() {
        return Err(AnalyticsError::invalid_record(kind, "not a JSON object"));
    }
    T::deserialize(raw).map_err(|e| AnalyticsError::invalid_record(kind, e.to_string()))
}

fn require_id(kind: &'static str, id: Option<String>) -> Result<String> {
    id.ok_or_else(|| AnalyticsError::invalid_record(kind, "missing id"))
}

/// Normalize a batch, skipping (and logging) records that cannot be read.
pub fn normalize_batch<T, F>(kind: &str, records: &[Value], mut normalize: F) -> Vec<T>
where
    F: FnMut(&Value) -> Result<T>,
{
    let mut normalized = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for (index, record) in records.iter().enumerate() {
        match normalize(record) {
            Ok(entity) => normalized.push(entity),
            Err(e) => {
                skipped += 1;
                warn!(kind, index, error = %e, "skipping record");
            }
        }
    }

    if skipped > 0 {
        warn!(kind, skipped, kept = normalized.len(), "some records were skipped");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn domains() -> Vec<String> {
        vec!["inquisitr.com".to_string(), "www.inquisitr.com".to_string()]
    }

    #[test]
    fn urls_are_categorized_in_rule_order() {
        let domains = domains();
        assert_eq!(categorize_url(None, &domains), UrlCategory::Unknown);
        assert_eq!(categorize_url(Some(""), &domains), UrlCategory::Unknown);
        assert_eq!(
            categorize_url(Some("https://WWW.Inquisitr.com/story"), &domains),
            UrlCategory::Article
        );
        assert_eq!(
            categorize_url(Some("https://facebook.com/sharer?u=x"), &domains),
            UrlCategory::Social
        );
        assert_eq!(
            categorize_url(Some("https://twitter.com/intent/tweet"), &domains),
            UrlCategory::Social
        );
        assert_eq!(
            categorize_url(Some("https://app.beehiiv.com/manage"), &domains),
            UrlCategory::Beehiiv
        );
        assert_eq!(
            categorize_url(Some("https://example.org"), &domains),
            UrlCategory::Other
        );
    }

    #[test]
    fn content_domain_wins_over_later_rules() {
        let share = "https://facebook.com/sharer?u=https://inquisitr.com/a";
        assert_eq!(categorize_url(Some(share), &domains()), UrlCategory::Article);
    }

    #[test]
    fn post_keeps_only_article_clicks() {
        let normalizer = Normalizer::new(domains());
        let raw = json!({
            "id": "post_1",
            "title": "Daily",
            "subject_line": "Is this the end?",
            "publish_date": 1_767_225_600,
            "status": "confirmed",
            "stats": {
                "email": {
                    "recipients": 1000, "delivered": 990, "opens": 500,
                    "unique_opens": 400, "open_rate": 0.4,
                    "clicks": 90, "unique_clicks": 60, "click_rate": "6.06",
                    "unsubscribes": 3, "spam_reports": 1
                },
                "clicks": [
                    {"url": "https://inquisitr.com/a", "total_clicks": 40, "total_unique_clicks": 30, "email": {"clicks": 38}},
                    {"url": "https://beehiiv.com/upgrade", "total_clicks": 10},
                    {"url": null, "total_clicks": 2},
                    "garbage"
                ]
            }
        });

        let post = normalizer.post(&raw, "Main").unwrap();
        assert_eq!(post.publication_name, "Main");
        assert_eq!(post.subject_line, "Is this the end?");
        assert_eq!(post.recipients, 1000);
        assert_eq!(post.open_rate, 40.0);
        assert_eq!(post.click_rate, 6.06);
        assert_eq!(post.article_clicks.len(), 1);
        assert_eq!(post.article_clicks[0].email_clicks, 38);
        assert_eq!(post.traffic_sent(), 40);
        assert_eq!(
            post.publish_date.map(|d| d.to_rfc3339()),
            Some("2026-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn post_defaults_missing_fields() {
        let normalizer = Normalizer::new(domains());
        let post = normalizer.post(&json!({"id": "p"}), "Main").unwrap();
        assert_eq!(post.title, "Untitled");
        assert_eq!(post.subtitle, "");
        assert!(post.publish_date.is_none());
        assert_eq!(post.delivered, 0);
        assert_eq!(post.open_rate, 0.0);
        assert!(post.article_clicks.is_empty());
    }

    #[test]
    fn post_rates_fall_back_to_counters() {
        let normalizer = Normalizer::new(domains());
        let raw = json!({
            "id": "p",
            "stats": {"email": {"delivered": 1000, "unique_opens": 300, "unique_clicks": 50}}
        });
        let post = normalizer.post(&raw, "Main").unwrap();
        assert_eq!(post.open_rate, 30.0);
        assert_eq!(post.click_rate, 5.0);
    }

    #[test]
    fn subscriber_defaults_and_tier() {
        let normalizer = Normalizer::new(domains());
        let raw = json!({
            "id": "sub_1",
            "email": "reader@example.com",
            "status": "active",
            "created": 1_767_225_600,
            "stats": {"total_emails": 12, "open_rate": 0.55, "click_rate": 0.1}
        });

        let sub = normalizer.subscriber(&raw, "Main").unwrap();
        assert_eq!(sub.utm_source, "direct");
        assert_eq!(sub.tier, "free");
        assert_eq!(sub.emails_received, 12);
        assert_eq!(sub.engagement_tier, EngagementTier::High);
        assert!((sub.click_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn segment_prefers_total_results() {
        let normalizer = Normalizer::new(domains());
        let detailed = json!({
            "id": "seg_1", "name": "Engaged", "type": "dynamic", "status": "completed",
            "total_results": 250,
            "stats": {"total_subscribers": 240, "open_rate": 45, "clickthrough_rate": 0.08}
        });
        let summary = json!({"id": "seg_2", "stats": {"total_subscribers": 90}});

        let seg = normalizer.segment(&detailed, "Main").unwrap();
        assert_eq!(seg.total_subscribers, 250);
        assert_eq!(seg.open_rate, 45.0);
        assert_eq!(seg.segment_type, "dynamic");

        let seg = normalizer.segment(&summary, "Main").unwrap();
        assert_eq!(seg.total_subscribers, 90);
    }

    #[test]
    fn malformed_records_are_rejected() {
        let normalizer = Normalizer::new(domains());
        assert!(normalizer.post(&json!("post"), "Main").is_err());
        assert!(normalizer.subscriber(&json!({"email": "x@y.z"}), "Main").is_err());
        assert!(normalizer.publication(&json!([1, 2])).is_err());
    }

    #[test]
    fn batches_skip_invalid_records() {
        let normalizer = Normalizer::new(domains());
        let records = vec![json!({"id": "a"}), json!(42), json!({"id": "b"}), json!({})];
        let posts = normalize_batch("post", &records, |raw| normalizer.post(raw, "Main"));
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
