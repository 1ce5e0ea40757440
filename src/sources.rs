use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{SourceGrowth, SourceGrowthPoint, Subscriber};
use crate::period::DateRange;

const MAX_SOURCE_LEN: usize = 15;
/// Column names carried by every growth point next to the per-source counts.
const RESERVED_NAMES: [&str; 2] = ["date", "total"];

/// Collapse UTM source spellings onto a small set of channel names.
pub fn normalize_source_name(source: &str) -> String {
    let normalized = source.trim().to_lowercase();
    if normalized.is_empty() || normalized == "null" || normalized == "undefined" {
        return "direct".to_string();
    }

    // Order matters: "website-ml2" is ml2, not website.
    let channel = if normalized.contains("ml2") || normalized.contains("mailerlite2") {
        "ml2"
    } else if normalized.contains("ml3") || normalized.contains("mailerlite3") {
        "ml3"
    } else if normalized.contains("website") || normalized.contains("web") {
        "website"
    } else if normalized.contains("referral") || normalized.contains("refer") {
        "referral"
    } else if normalized.contains("organic") || normalized.contains("search") {
        "organic"
    } else if normalized.contains("direct") || normalized == "none" {
        "direct"
    } else {
        let name: String = normalized.chars().take(MAX_SOURCE_LEN).collect();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return format!("{name}-src");
        }
        return name;
    };
    channel.to_string()
}

/// Daily signups per normalized source.
///
/// Every point carries a count for every source seen, zero when absent.
pub fn growth_by_source(subscribers: &[Subscriber], range: Option<&DateRange>) -> SourceGrowth {
    let range = range.map(DateRange::whole_days);
    let mut daily: BTreeMap<NaiveDate, BTreeMap<String, u64>> = BTreeMap::new();
    let mut seen = BTreeSet::new();

    for subscriber in subscribers {
        let Some(created) = subscriber.created else {
            continue;
        };
        if range.is_some_and(|r| !r.contains(created)) {
            continue;
        }
        let source = normalize_source_name(&subscriber.utm_source);
        *daily
            .entry(created.date_naive())
            .or_default()
            .entry(source.clone())
            .or_insert(0) += 1;
        seen.insert(source);
    }

    if daily.is_empty() {
        return SourceGrowth::default();
    }

    let data = daily
        .into_iter()
        .map(|(date, found)| {
            let counts: BTreeMap<String, u64> = seen
                .iter()
                .map(|source| (source.clone(), found.get(source).copied().unwrap_or(0)))
                .collect();
            let total = counts.values().sum();
            SourceGrowthPoint { date, counts, total }
        })
        .collect();

    let mut sources = Vec::with_capacity(seen.len() + 1);
    sources.push("total".to_string());
    sources.extend(seen);

    SourceGrowth { data, sources }
}
