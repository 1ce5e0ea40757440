use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::AnalyticsError;
use crate::models::{EngagementTier, OverviewAggregate, Post, Subscriber, TopArticle, TopPost};
use crate::rates::{mean, percent, saturating_sum};

/// Posts with fewer recipients are test sends and excluded from averages.
pub const MIN_RECIPIENTS: u64 = 100;
pub const TOP_ARTICLES_LIMIT: usize = 15;
pub const TOP_VIEW_LIMIT: usize = 10;

pub fn is_qualifying_send(post: &Post) -> bool {
    post.status == "confirmed" && post.recipients >= MIN_RECIPIENTS
}

/// Build the account-wide overview.
///
/// `avg_open_rate` and `avg_click_rate` are unweighted means of the per-post
/// percentages, unlike the period metrics which divide summed counters.
pub fn overview(posts: &[Post], subscribers: &[Subscriber]) -> OverviewAggregate {
    let active: Vec<&Subscriber> = subscribers.iter().filter(|s| s.is_active()).collect();
    let organic = active.iter().filter(|s| s.is_organic()).count() as u64;

    let sends: Vec<&Post> = posts.iter().filter(|p| is_qualifying_send(p)).collect();
    let total_recipients = saturating_sum(sends.iter().map(|p| p.recipients));
    let total_unsubscribes = saturating_sum(sends.iter().map(|p| p.unsubscribes));
    let total_spam = saturating_sum(sends.iter().map(|p| p.spam_reports));
    let open_rates: Vec<f64> = sends.iter().map(|p| p.open_rate).collect();
    let click_rates: Vec<f64> = sends.iter().map(|p| p.click_rate).collect();

    let mut engagement_distribution: BTreeMap<EngagementTier, u64> =
        EngagementTier::ALL.iter().map(|tier| (*tier, 0)).collect();
    let mut utm_distribution: BTreeMap<String, u64> = BTreeMap::new();

    for sub in active.iter() {
        *engagement_distribution.entry(sub.engagement_tier).or_insert(0) += 1;

        let source = if sub.utm_source.is_empty() {
            "direct"
        } else {
            sub.utm_source.as_str()
        };
        *utm_distribution.entry(source.to_string()).or_insert(0) += 1;
    }

    OverviewAggregate {
        total_subscribers: active.len() as u64,
        organic_users: organic,
        inorganic_users: active.len() as u64 - organic,
        total_unsubscribes,
        total_spam_reports: total_spam,
        total_newsletter_sends: sends.len() as u64,
        avg_open_rate: mean(&open_rates),
        avg_click_rate: mean(&click_rates),
        unsubscribe_rate: percent(total_unsubscribes as f64, total_recipients as f64),
        spam_rate: percent(total_spam as f64, total_recipients as f64),
        engagement_distribution,
        utm_distribution,
    }
}

/// Merge article clicks across posts by URL and rank by total clicks.
///
/// The first post linking an article keeps the attribution. Ties are broken by
/// publish date (newest first), then by first appearance.
pub fn top_articles(posts: &[Post], limit: usize) -> Vec<TopArticle> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut articles: Vec<TopArticle> = Vec::new();

    for post in posts {
        for article in &post.article_clicks {
            match index.get(article.url.as_str()) {
                Some(&slot) => {
                    let existing = &mut articles[slot];
                    existing.total_clicks = existing.total_clicks.saturating_add(article.total_clicks);
                    existing.unique_clicks = existing.unique_clicks.saturating_add(article.unique_clicks);
                }
                None => {
                    index.insert(article.url.as_str(), articles.len());
                    articles.push(TopArticle {
                        url: article.url.clone(),
                        post_title: post.title.clone(),
                        publish_date: post.publish_date,
                        total_clicks: article.total_clicks,
                        unique_clicks: article.unique_clicks,
                    });
                }
            }
        }
    }

    // sort_by is stable, so equal keys keep first-seen order.
    articles.sort_by(|a, b| {
        b.total_clicks
            .cmp(&a.total_clicks)
            .then_with(|| b.publish_date.cmp(&a.publish_date))
    });
    articles.truncate(limit);
    articles
}

/// Re-rank an already merged article list, e.g. one loaded from a cache document.
pub fn rank_articles(articles: &[TopArticle], limit: usize) -> Vec<TopArticle> {
    let mut ranked = articles.to_vec();
    ranked.sort_by(|a, b| {
        b.total_clicks
            .cmp(&a.total_clicks)
            .then_with(|| b.publish_date.cmp(&a.publish_date))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRankField {
    OpenRate,
    ClickRate,
    Recipients,
    UniqueClicks,
    TrafficSent,
}

impl PostRankField {
    fn value(&self, post: &Post) -> f64 {
        match self {
            PostRankField::OpenRate => post.open_rate,
            PostRankField::ClickRate => post.click_rate,
            PostRankField::Recipients => post.recipients as f64,
            PostRankField::UniqueClicks => post.unique_clicks as f64,
            PostRankField::TrafficSent => post.traffic_sent() as f64,
        }
    }
}

impl FromStr for PostRankField {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "openrate" => Ok(PostRankField::OpenRate),
            "clickrate" => Ok(PostRankField::ClickRate),
            "recipients" => Ok(PostRankField::Recipients),
            "uniqueclicks" => Ok(PostRankField::UniqueClicks),
            "trafficsent" | "traffic" => Ok(PostRankField::TrafficSent),
            other => Err(AnalyticsError::Config(format!("unknown ranking field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Descending,
    Ascending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRanking {
    pub field: PostRankField,
    pub direction: SortDirection,
}

impl Default for PostRanking {
    fn default() -> Self {
        Self {
            field: PostRankField::OpenRate,
            direction: SortDirection::Descending,
        }
    }
}

/// Rank posts for "top newsletters" views.
pub fn top_posts(posts: &[Post], ranking: PostRanking, limit: usize) -> Vec<TopPost> {
    let mut ranked: Vec<&Post> = posts.iter().collect();
    ranked.sort_by(|a, b| {
        let (a_value, b_value) = (ranking.field.value(a), ranking.field.value(b));
        let by_value = match ranking.direction {
            SortDirection::Descending => b_value.partial_cmp(&a_value),
            SortDirection::Ascending => a_value.partial_cmp(&b_value),
        }
        .unwrap_or(Ordering::Equal);
        by_value.then_with(|| b.publish_date.cmp(&a.publish_date))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|post| TopPost {
            title: post.title.clone(),
            publish_date: post.publish_date,
            open_rate: post.open_rate,
            click_rate: post.click_rate,
            recipients: post.recipients,
            unique_clicks: post.unique_clicks,
            traffic_sent: post.traffic_sent(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleClick;
    use chrono::{Duration, TimeZone, Utc};

    fn post(title: &str, recipients: u64, open_rate: f64, click_rate: f64) -> Post {
        Post {
            id: title.to_string(),
            title: title.to_string(),
            status: "confirmed".to_string(),
            recipients,
            delivered: recipients,
            open_rate,
            click_rate,
            publish_date: Some(Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap()),
            ..Post::default()
        }
    }

    fn subscriber(status: &str, source: &str, tier: EngagementTier) -> Subscriber {
        Subscriber {
            status: status.to_string(),
            utm_source: source.to_string(),
            engagement_tier: tier,
            ..Subscriber::default()
        }
    }

    #[test]
    fn oversized_counters_do_not_overflow() {
        let mut first = post("a", u64::MAX, 30.0, 5.0);
        first.unsubscribes = u64::MAX;
        first.article_clicks = vec![article("https://x.test/a", u64::MAX, 1)];
        let mut second = first.clone();
        second.id = "b".to_string();

        let overview = overview(&[first.clone(), second.clone()], &[]);
        assert_eq!(overview.total_newsletter_sends, 2);
        assert_eq!(overview.unsubscribe_rate, 100.0);

        let top = top_articles(&[first, second], 5);
        assert_eq!(top[0].total_clicks, u64::MAX);
        assert_eq!(top[0].unique_clicks, 2);
    }

    fn article(url: &str, total: u64, unique: u64) -> ArticleClick {
        ArticleClick {
            url: url.to_string(),
            total_clicks: total,
            unique_clicks: unique,
            email_clicks: total,
        }
    }

    #[test]
    fn overview_uses_unweighted_means_of_qualifying_sends() {
        let mut small = post("test send", 20, 90.0, 50.0);
        small.unsubscribes = 10;
        let mut draft = post("draft", 5_000, 10.0, 1.0);
        draft.status = "draft".to_string();
        let mut a = post("a", 1_000, 40.0, 4.0);
        a.unsubscribes = 5;
        a.spam_reports = 1;
        let mut b = post("b", 3_000, 20.0, 2.0);
        b.unsubscribes = 15;

        let overview = overview(&[small, draft, a, b], &[]);
        assert_eq!(overview.total_newsletter_sends, 2);
        assert_eq!(overview.avg_open_rate, 30.0);
        assert_eq!(overview.avg_click_rate, 3.0);
        assert_eq!(overview.total_unsubscribes, 20);
        assert_eq!(overview.unsubscribe_rate, 0.5);
        assert_eq!(overview.spam_rate, 0.025);
    }

    #[test]
    fn overview_partitions_active_subscribers() {
        let subs = vec![
            subscriber("active", "direct", EngagementTier::High),
            subscriber("active", "website", EngagementTier::Low),
            subscriber("active", "", EngagementTier::Low),
            subscriber("active", "ml2", EngagementTier::NoData),
            subscriber("inactive", "ml2", EngagementTier::High),
        ];

        let overview = overview(&[], &subs);
        assert_eq!(overview.total_subscribers, 4);
        assert_eq!(overview.organic_users, 3);
        assert_eq!(overview.inorganic_users, 1);
        assert_eq!(overview.avg_open_rate, 0.0);
        assert_eq!(overview.total_newsletter_sends, 0);
        assert_eq!(overview.engagement_distribution[&EngagementTier::Low], 2);
        assert_eq!(overview.engagement_distribution[&EngagementTier::Medium], 0);
        assert_eq!(overview.utm_distribution["direct"], 2);
        assert_eq!(overview.utm_distribution["ml2"], 1);
    }

    #[test]
    fn overview_of_nothing_is_zeroed() {
        let overview = overview(&[], &[]);
        assert_eq!(overview.unsubscribe_rate, 0.0);
        assert_eq!(overview.spam_rate, 0.0);
        assert_eq!(overview.engagement_distribution.len(), 5);
        assert!(overview.utm_distribution.is_empty());
    }

    #[test]
    fn same_article_merges_across_posts() {
        let mut first = post("first", 500, 0.0, 0.0);
        first.article_clicks = vec![article("x", 10, 8)];
        let mut second = post("second", 500, 0.0, 0.0);
        second.publish_date = first.publish_date.map(|d| d + Duration::days(1));
        second.article_clicks = vec![article("x", 5, 4), article("y", 12, 3)];

        let top = top_articles(&[first, second], TOP_ARTICLES_LIMIT);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].url, "y");
        assert_eq!(top[1].url, "x");
        assert_eq!(top[1].total_clicks, 15);
        assert_eq!(top[1].unique_clicks, 12);
        assert_eq!(top[1].post_title, "first");
    }

    #[test]
    fn article_ties_prefer_newer_posts() {
        let mut older = post("older", 500, 0.0, 0.0);
        older.article_clicks = vec![article("a", 7, 7)];
        let mut newer = post("newer", 500, 0.0, 0.0);
        newer.publish_date = older.publish_date.map(|d| d + Duration::days(3));
        newer.article_clicks = vec![article("b", 7, 7)];

        let top = top_articles(&[older, newer], 10);
        assert_eq!(top[0].url, "b");
        assert_eq!(top[1].url, "a");
    }

    #[test]
    fn top_articles_truncate_to_limit() {
        let mut big = post("big", 500, 0.0, 0.0);
        big.article_clicks = (0..20)
            .map(|i| article(&format!("https://inquisitr.com/{i}"), i, i))
            .collect();
        let top = top_articles(&[big], TOP_ARTICLES_LIMIT);
        assert_eq!(top.len(), 15);
        assert_eq!(top[0].total_clicks, 19);
    }

    #[test]
    fn top_posts_rank_by_field_and_direction() {
        let posts = vec![
            post("low", 100, 12.0, 1.0),
            post("high", 300, 48.0, 2.0),
            post("mid", 200, 30.0, 9.0),
        ];

        let by_open = top_posts(&posts, PostRanking::default(), TOP_VIEW_LIMIT);
        let titles: Vec<_> = by_open.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);

        let by_click = top_posts(
            &posts,
            PostRanking {
                field: PostRankField::ClickRate,
                direction: SortDirection::Ascending,
            },
            2,
        );
        let titles: Vec<_> = by_click.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["low", "high"]);
    }

    #[test]
    fn rank_field_parses_loosely() {
        assert_eq!("open-rate".parse::<PostRankField>().unwrap(), PostRankField::OpenRate);
        assert_eq!("traffic".parse::<PostRankField>().unwrap(), PostRankField::TrafficSent);
        assert!("bogus".parse::<PostRankField>().is_err());
    }
}
