//! Content performance by headline style.
//!
//! Subject lines are grouped by format and ranked by open rate. Titles are
//! grouped the same way and ranked by CTOR, since the title is what readers
//! click on once the email is open.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::PostTotals;
use crate::models::Post;
use crate::rates::percent;

pub const STANDARD_FORMAT: &str = "Standard";

const SUBJECT_FORMATS: &[(&str, &str)] = &[
    (r"^\d+\s+(ways?|things?|reasons?|tips?|secrets?|facts?|signs?)", "Numbered List"),
    (r"^(top|best|worst)\s+\d+", "Top X List"),
    (r"\?$", "Question"),
    (r"^(how\s+to|here'?s?\s+how|the\s+way\s+to)", "How-To"),
    (r"^(breaking|just\s+in|urgent|alert)", "Breaking News"),
    (r"^(exclusive|revealed|exposed|leaked|inside)", "Exclusive/Reveal"),
    (r"(you\s+won'?t\s+believe|shocking|unbelievable|jaw-?dropping)", "Shock/Surprise"),
    (r"(finally|at\s+last|it'?s?\s+official)", "Resolution"),
    (r"^(why|what|who|when|where|which)", "WH-Question"),
    (r"(vs\.?|versus|compared|battle|showdown)", "Comparison/Battle"),
    (r"(update|latest|new|just\s+announced)", "Update/Latest"),
    (r"(warning|danger|avoid|don'?t|never|stop)", "Warning/Negative"),
    (r"(\$\d|million|billion|worth|paid|cost|price)", "Money/Financial"),
    (r"(secret|hidden|unknown|nobody\s+knows)", "Secret/Mystery"),
    (r"(first\s+look|preview|sneak\s+peek|teaser)", "Preview/Teaser"),
];

const TITLE_FORMATS: &[(&str, &str)] = &[
    (r"^\d+\s+(ways?|things?|reasons?|tips?|secrets?|facts?|signs?)", "Numbered List"),
    (r"^(top|best|worst)\s+\d+", "Top X List"),
    (r"\?$", "Question"),
    (r"^(how\s+to|here'?s?\s+how)", "How-To"),
    (r"(photo|pic|image|video|watch|see)", "Visual Content"),
    (r"(revealed|exposed|leaked|confirmed)", "Reveal"),
    (r"(responds?|reacts?|slams?|fires\s+back|claps\s+back)", "Response/Clap Back"),
    (r"(breaks?\s+silence|speaks?\s+out|opens?\s+up|admits?)", "Speaking Out"),
    (r"(spotted|seen|caught|photographed)", "Sighting"),
    (r"(before\s+and\s+after|then\s+and\s+now|transformation)", "Before/After"),
    (r"(vs\.?|versus|compared|battle)", "Comparison"),
    (r"(everything\s+(you\s+need\s+)?to\s+know|complete\s+guide|explained)", "Explainer"),
    (r"(net\s+worth|\$\d|million|billion|salary|paid)", "Money/Worth"),
    (r"(timeline|history|story\s+of)", "Timeline/History"),
    (r"(rumor|report|allegedly|supposedly|source)", "Rumor/Report"),
];

/// Ordered, case-insensitive headline patterns. The first match wins.
pub struct FormatClassifier {
    subject: Vec<(Regex, &'static str)>,
    title: Vec<(Regex, &'static str)>,
}

fn compile(patterns: &[(&str, &'static str)]) -> Result<Vec<(Regex, &'static str)>> {
    patterns
        .iter()
        .map(|(pattern, format)| Ok((Regex::new(&format!("(?i){pattern}"))?, *format)))
        .collect()
}

fn first_match(patterns: &[(Regex, &'static str)], text: &str) -> &'static str {
    let text = text.trim();
    if text.is_empty() {
        return STANDARD_FORMAT;
    }
    patterns
        .iter()
        .find(|(regex, _)| regex.is_match(text))
        .map(|(_, format)| *format)
        .unwrap_or(STANDARD_FORMAT)
}

impl FormatClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            subject: compile(SUBJECT_FORMATS)?,
            title: compile(TITLE_FORMATS)?,
        })
    }

    pub fn subject_format(&self, subject: &str) -> &'static str {
        first_match(&self.subject, subject)
    }

    pub fn title_format(&self, title: &str) -> &'static str {
        first_match(&self.title, title)
    }
}

/// Subject line of a post, falling back to its title.
pub fn subject_of(post: &Post) -> &str {
    if post.subject_line.trim().is_empty() {
        &post.title
    } else {
        &post.subject_line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatPerformance {
    pub format: String,
    pub posts: u64,
    pub delivered: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub open_rate: f64,
    pub ctor: f64,
}

/// Group posts by `format_of` and rank the groups by `rank` (descending).
///
/// Posts without a delivered count are weighted by recipients.
fn group_by_format<F, R>(posts: &[Post], format_of: F, rank: R) -> Vec<FormatPerformance>
where
    F: Fn(&Post) -> &'static str,
    R: Fn(&FormatPerformance) -> f64,
{
    let mut groups: HashMap<&'static str, PostTotals> = HashMap::new();
    for post in posts {
        let totals = groups.entry(format_of(post)).or_default();
        totals.add(post);
        if post.delivered == 0 {
            totals.delivered = totals.delivered.saturating_add(post.recipients);
        }
    }

    let mut rows: Vec<FormatPerformance> = groups
        .into_iter()
        .map(|(format, totals)| FormatPerformance {
            format: format.to_string(),
            posts: totals.posts,
            delivered: totals.delivered,
            unique_opens: totals.unique_opens,
            unique_clicks: totals.unique_clicks,
            open_rate: percent(totals.unique_opens as f64, totals.delivered as f64),
            ctor: totals.ctor(),
        })
        .collect();

    rows.sort_by(|a, b| {
        rank(b)
            .total_cmp(&rank(a))
            .then_with(|| b.posts.cmp(&a.posts))
            .then_with(|| a.format.cmp(&b.format))
    });
    rows
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPerformance {
    /// Ranked by open rate.
    pub subject_formats: Vec<FormatPerformance>,
    /// Ranked by CTOR.
    pub title_formats: Vec<FormatPerformance>,
}

pub fn content_performance(posts: &[Post], classifier: &FormatClassifier) -> ContentPerformance {
    ContentPerformance {
        subject_formats: group_by_format(
            posts,
            |post| classifier.subject_format(subject_of(post)),
            |row| row.open_rate,
        ),
        title_formats: group_by_format(
            posts,
            |post| classifier.title_format(&post.title),
            |row| row.ctor,
        ),
    }
}
