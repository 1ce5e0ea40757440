use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::models::{SourceGrowth, TopArticle, TopPost, TrendPoint};

/// One row per day, columns in `TrendPoint` field order.
pub fn write_trend_csv<W: Write>(writer: W, points: &[TrendPoint]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for point in points {
        csv.serialize(point)?;
    }
    csv.flush()?;
    Ok(())
}

/// `date`, one column per source, then `total`.
pub fn write_source_growth_csv<W: Write>(writer: W, growth: &SourceGrowth) -> Result<()> {
    let sources: Vec<&str> = growth
        .sources
        .iter()
        .map(String::as_str)
        .filter(|s| *s != "total")
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["date"];
    header.extend(sources.iter().copied());
    header.push("total");
    csv.write_record(&header)?;

    for point in &growth.data {
        let mut row = vec![point.date.format("%Y-%m-%d").to_string()];
        row.extend(
            sources
                .iter()
                .map(|s| point.counts.get(*s).copied().unwrap_or(0).to_string()),
        );
        row.push(point.total.to_string());
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_top_articles_csv<W: Write>(writer: W, articles: &[TopArticle]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for article in articles {
        csv.serialize(article)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_top_posts_csv<W: Write>(writer: W, posts: &[TopPost]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for post in posts {
        csv.serialize(post)?;
    }
    csv.flush()?;
    Ok(())
}

/// Pretty JSON written to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body)?;
    Ok(())
}
