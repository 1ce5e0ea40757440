use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::models::{MetricValue, OverviewAggregate, Segment};
use crate::pipeline::PeriodView;
use crate::projection::TargetReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentTypeSummary {
    pub segment_type: String,
    pub count: usize,
    pub subscribers: u64,
    pub avg_open_rate: f64,
}

pub fn summarize_segments(segments: &[Segment]) -> Vec<SegmentTypeSummary> {
    let mut map: HashMap<String, (usize, u64, f64)> = HashMap::new();

    for segment in segments {
        let key = if segment.segment_type.is_empty() {
            "unknown".to_string()
        } else {
            segment.segment_type.clone()
        };
        let entry = map.entry(key).or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += segment.total_subscribers;
        entry.2 += segment.open_rate;
    }

    let mut summaries: Vec<SegmentTypeSummary> = map
        .into_iter()
        .map(|(segment_type, (count, subscribers, total_open_rate))| SegmentTypeSummary {
            segment_type,
            count,
            subscribers,
            avg_open_rate: if count == 0 {
                0.0
            } else {
                total_open_rate / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.segment_type.cmp(&b.segment_type))
    });
    summaries
}

fn metric_line(output: &mut String, label: &str, metric: MetricValue, suffix: &str) {
    let _ = writeln!(
        output,
        "- {}: {:.2}{} ({:+.2} vs prior period)",
        label, metric.value, suffix, metric.change
    );
}

pub fn build_report(
    overview: Option<&OverviewAggregate>,
    view: &PeriodView,
    targets: &TargetReport,
    segments: &[Segment],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Newsletter Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}: {})",
        view.publication, view.window.period, view.window.current
    );
    let _ = writeln!(output);

    if let Some(overview) = overview {
        let _ = writeln!(output, "## Account Overview");
        let _ = writeln!(
            output,
            "- Active subscribers: {} ({} organic, {} inorganic)",
            overview.total_subscribers, overview.organic_users, overview.inorganic_users
        );
        let _ = writeln!(
            output,
            "- Newsletter sends: {} (avg open rate {:.1}%, avg click rate {:.1}%)",
            overview.total_newsletter_sends, overview.avg_open_rate, overview.avg_click_rate
        );
        let _ = writeln!(
            output,
            "- Unsubscribe rate {:.2}%, spam rate {:.3}%",
            overview.unsubscribe_rate, overview.spam_rate
        );
        let _ = writeln!(output);
    }

    let metrics = &view.metrics;
    let _ = writeln!(output, "## Period Metrics");
    metric_line(&mut output, "Total subscribers", metrics.total_subs, "");
    metric_line(&mut output, "New subscribers", metrics.new_subscribers, "");
    metric_line(&mut output, "Subscriber growth", metrics.subs_growth_rate, "%");
    metric_line(&mut output, "Open rate", metrics.open_rate, "%");
    metric_line(&mut output, "CTR", metrics.ctr, "%");
    metric_line(&mut output, "CTOR", metrics.ctor, "%");
    metric_line(&mut output, "Traffic sent", metrics.traffic_sent, "");
    metric_line(&mut output, "Unsubscribe rate", metrics.unsubscribe_rate, "%");
    metric_line(&mut output, "Bounce rate", metrics.bounce_rate, "%");
    metric_line(&mut output, "Engaged subscribers", metrics.active_rate, "%");

    if let Some(comparison) = &view.comparison {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {} ({})", comparison.label, comparison.range);
        match &comparison.averages {
            Some(averages) => {
                let _ = writeln!(
                    output,
                    "- Open rate {:.2}%, CTR {:.2}%, CTOR {:.2}%, delivered {}",
                    averages.open_rate, averages.ctr, averages.ctor, averages.subscribers
                );
            }
            None => {
                let _ = writeln!(output, "No sends in the comparison window.");
            }
        }
    }

    let projection = &targets.subscribers;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Target Tracking");
    let _ = writeln!(
        output,
        "{} days until {} | {:.1} subs/day needed, {:.1} subs/day observed | {}",
        projection.days_remaining,
        targets.deadline.format("%b %-d, %Y"),
        projection.required_daily_rate,
        projection.observed_daily_rate,
        projection.status
    );
    let _ = writeln!(
        output,
        "Projected subscribers: {:.0} of {:.0}",
        projection.projected, projection.target
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Metric | Current | Target | Gap | Status |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: | --- |");
    for row in &targets.gaps {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} | {:.2} | {} |",
            row.name, row.current, row.target, row.gap, row.status
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Open rate trend: {}. CTOR trend: {}.",
        targets.open_rate_trend, targets.ctor_trend
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for (idx, recommendation) in targets.recommendations.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", idx + 1, recommendation);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Articles");
    if view.top_articles.is_empty() {
        let _ = writeln!(output, "No article clicks in this window.");
    } else {
        for article in &view.top_articles {
            let _ = writeln!(
                output,
                "- {} ({} clicks, {} unique) from \"{}\"",
                article.url, article.total_clicks, article.unique_clicks, article.post_title
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Newsletters");
    if view.top_posts.is_empty() {
        let _ = writeln!(output, "No sends in this window.");
    } else {
        for post in &view.top_posts {
            let date = post
                .publish_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".to_string());
            let _ = writeln!(
                output,
                "- {} on {}: open {:.1}%, click {:.1}%, {} recipients",
                post.title, date, post.open_rate, post.click_rate, post.recipients
            );
        }
    }

    let summaries = summarize_segments(segments);
    if !summaries.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Segment Mix");
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} segments, {} subscribers (avg open rate {:.1}%)",
                summary.segment_type, summary.count, summary.subscribers, summary.avg_open_rate
            );
        }
    }

    output
}
