//! Record shapes returned by the Beehiiv v2 API.
//!
//! Only the fields the pipeline reads are declared. Every field is optional
//! and read through [`crate::lenient`], so a record deserializes as long as it
//! is a JSON object.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::lenient;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPublication {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub name: Option<String>,
    pub stats: Option<RawPublicationStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPublicationStats {
    #[serde(deserialize_with = "lenient::count")]
    pub active_subscriptions: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub active_premium_subscriptions: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub active_free_subscriptions: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub average_open_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub average_click_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::count")]
    pub total_sent: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_unique_opened: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_clicked: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPost {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub subtitle: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub subject_line: Option<String>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub web_url: Option<String>,
    pub stats: Option<RawPostStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPostStats {
    pub email: Option<RawEmailStats>,
    #[serde(deserialize_with = "click_list")]
    pub clicks: Vec<RawClick>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawEmailStats {
    #[serde(deserialize_with = "lenient::count")]
    pub recipients: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub delivered: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub opens: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub unique_opens: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub open_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::count")]
    pub clicks: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub unique_clicks: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub click_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::count")]
    pub unsubscribes: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub spam_reports: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawClick {
    #[serde(deserialize_with = "lenient::string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient::count")]
    pub total_clicks: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_unique_clicks: u64,
    pub email: Option<RawClickEmail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawClickEmail {
    #[serde(deserialize_with = "lenient::count")]
    pub clicks: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSubscriber {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub subscription_tier: Option<String>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::string")]
    pub utm_source: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub utm_medium: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub utm_campaign: Option<String>,
    pub stats: Option<RawSubscriberStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSubscriberStats {
    #[serde(deserialize_with = "lenient::count")]
    pub emails_received: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_emails: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub open_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub click_through_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub click_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSegment {
    #[serde(deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub segment_type: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::count")]
    pub total_results: u64,
    pub stats: Option<RawSegmentStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSegmentStats {
    #[serde(deserialize_with = "lenient::count")]
    pub total_subscribers: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub open_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub clickthrough_rate: Option<f64>,
    #[serde(deserialize_with = "lenient::count")]
    pub total_sent: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_delivered: u64,
}

/// Click lists tolerate `null` and drop entries that are not objects.
fn click_list<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<RawClick>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let entries = match value {
        Some(Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };
    Ok(entries
        .iter()
        .filter(|entry| entry.is_object())
        .filter_map(|entry| RawClick::deserialize(entry).ok())
        .collect())
}
