use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use newsletter_analytics::aggregate::{PostRankField, PostRanking, SortDirection, TOP_VIEW_LIMIT};
use newsletter_analytics::cache::{
    next_refresh_delay, CacheStatus, FileCache, Snapshot, SnapshotCache,
};
use newsletter_analytics::client::BeehiivClient;
use newsletter_analytics::config::{AppConfig, CacheBackend};
use newsletter_analytics::db::{self, PgSnapshotCache};
use newsletter_analytics::metrics::ComparisonPeriod;
use newsletter_analytics::models::Dashboard;
use newsletter_analytics::normalize::Normalizer;
use newsletter_analytics::period::TimePeriod;
use newsletter_analytics::pipeline::{self, PeriodView, ViewOptions};
use newsletter_analytics::projection::target_report;
use newsletter_analytics::trends::TrendField;
use newsletter_analytics::{export, report};

#[derive(Parser)]
#[command(name = "newsletter-analytics")]
#[command(about = "Newsletter performance analytics for Beehiiv publications", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Read a dashboard JSON document instead of the snapshot cache
    #[arg(long, global = true)]
    dashboard: Option<PathBuf>,
    /// Never call the API; use whatever is cached
    #[arg(long, global = true)]
    offline: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ViewArgs {
    /// yesterday, 7day, 30day, monthly, 90day, alltime or custom
    #[arg(long, default_value = "7day")]
    period: String,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Publication id or name
    #[arg(long, default_value = "overall")]
    publication: String,
    /// Compare against the previous week or month
    #[arg(long)]
    compare: Option<String>,
    #[arg(long, default_value_t = TOP_VIEW_LIMIT)]
    limit: usize,
}

impl ViewArgs {
    fn options(&self) -> anyhow::Result<ViewOptions> {
        let period: TimePeriod = self.period.parse()?;
        let custom = match (self.from, self.to) {
            (Some(from), Some(to)) => Some((from, to)),
            (None, None) => None,
            _ => bail!("--from and --to must be given together"),
        };
        let comparison = self
            .compare
            .as_deref()
            .map(str::parse::<ComparisonPeriod>)
            .transpose()?;
        Ok(ViewOptions {
            period,
            custom,
            publication: self.publication.clone(),
            comparison,
            limit: self.limit,
            ..ViewOptions::default()
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres cache schema
    InitDb,
    /// Fetch a fresh snapshot from the API and cache it
    Fetch,
    /// Show cache age and staleness
    Status,
    /// Keep the cache fresh, refreshing on the configured interval
    Watch,
    /// Print the account-wide overview
    Overview,
    /// Print period metrics with change against the prior period
    Metrics {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Daily trend for the period, printed or written as CSV
    Trends {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Field to chart against the comparison window
        #[arg(long, default_value = "open-rate")]
        field: String,
    },
    /// Daily signups by acquisition source
    Sources {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Top articles or top newsletters for the period
    #[command(group(
        ArgGroup::new("kind")
            .args(["articles", "posts"])
            .multiple(false)
    ))]
    Top {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        articles: bool,
        #[arg(long)]
        posts: bool,
        /// open-rate, click-rate, recipients, unique-clicks or traffic-sent
        #[arg(long, default_value = "open-rate")]
        by: String,
        #[arg(long)]
        ascending: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Costs, estimated revenue and ROI against the prior period
    Economics {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Open rate by subject format and CTOR by title format
    Content {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Progress toward subscriber and engagement targets
    Targets {
        #[arg(long, default_value = "overall")]
        publication: String,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the dashboard document, or a period view, as JSON
    Export {
        #[command(flatten)]
        view: ViewArgs,
        /// Export the period view instead of the full dashboard
        #[arg(long)]
        period_view: bool,
        #[arg(long, default_value = "dashboard.json")]
        out: PathBuf,
    },
}

enum Store {
    File(FileCache),
    Postgres(PgSnapshotCache),
}

impl SnapshotCache for Store {
    fn name(&self) -> &'static str {
        match self {
            Store::File(cache) => cache.name(),
            Store::Postgres(cache) => cache.name(),
        }
    }

    async fn get(&self) -> newsletter_analytics::Result<Option<Snapshot>> {
        match self {
            Store::File(cache) => cache.get().await,
            Store::Postgres(cache) => cache.get().await,
        }
    }

    async fn put(&self, snapshot: &Snapshot) -> newsletter_analytics::Result<()> {
        match self {
            Store::File(cache) => cache.put(snapshot).await,
            Store::Postgres(cache) => cache.put(snapshot).await,
        }
    }
}

impl Store {
    fn location(&self) -> String {
        match self {
            Store::File(cache) => cache.path().display().to_string(),
            Store::Postgres(_) => "newsletter_analytics.snapshots".to_string(),
        }
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Store> {
    match config.cache.backend {
        CacheBackend::File => Ok(Store::File(FileCache::new(&config.cache.path))),
        CacheBackend::Postgres => {
            let database_url = config
                .cache
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres cache")?;
            let pool = db::connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            Ok(Store::Postgres(PgSnapshotCache::new(
                pool,
                config.cache.keep_snapshots,
            )))
        }
    }
}

async fn refresh(config: &AppConfig, store: &Store) -> anyhow::Result<Snapshot> {
    let client = BeehiivClient::new(&config.api)?;
    let snapshot = client.fetch_snapshot().await.context("fetch failed")?;
    store
        .put(&snapshot)
        .await
        .with_context(|| format!("failed to write {} cache", store.name()))?;
    Ok(snapshot)
}

/// Cached snapshot, refreshed first when stale unless running offline.
async fn current_snapshot(config: &AppConfig, store: &Store, offline: bool) -> anyhow::Result<Snapshot> {
    let cached = store.get().await.context("failed to read cache")?;
    let hours = config.cache.refresh_interval_hours;
    match cached {
        Some(snapshot) if offline || !snapshot.is_stale(hours, Utc::now()) => {
            info!(fetched_at = %snapshot.fetched_at, "using cached snapshot");
            Ok(snapshot)
        }
        Some(stale) => match refresh(config, store).await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                warn!(error = %e, fetched_at = %stale.fetched_at, "refresh failed, using stale snapshot");
                Ok(stale)
            }
        },
        None if offline => bail!("no cached snapshot; run `fetch` first"),
        None => refresh(config, store).await,
    }
}

async fn load_dashboard(cli: &Cli, config: &AppConfig) -> anyhow::Result<Dashboard> {
    if let Some(path) = &cli.dashboard {
        return pipeline::load_dashboard(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    let store = open_store(config).await?;
    let snapshot = current_snapshot(config, &store, cli.offline).await?;
    let normalizer = Normalizer::new(config.api.content_domains.clone());
    Ok(pipeline::build_dashboard(&snapshot, &normalizer))
}

fn analyze(dashboard: &Dashboard, view: &ViewArgs) -> anyhow::Result<PeriodView> {
    let options = view.options()?;
    Ok(pipeline::analyze(dashboard, &options, Utc::now())?)
}

fn write_file(path: &Path, write: impl FnOnce(std::fs::File) -> newsletter_analytics::Result<()>) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write(file)?;
    println!("Wrote {}.", path.display());
    Ok(())
}

fn parse_trend_field(raw: &str) -> anyhow::Result<TrendField> {
    let field = match raw.to_lowercase().replace(['-', '_'], "").as_str() {
        "openrate" => TrendField::OpenRate,
        "ctr" => TrendField::Ctr,
        "ctor" => TrendField::Ctor,
        "unsubscriberate" => TrendField::UnsubscribeRate,
        "bouncerate" => TrendField::BounceRate,
        "delivered" => TrendField::Delivered,
        "recipients" => TrendField::Recipients,
        "trafficsent" => TrendField::TrafficSent,
        "newsubscribers" => TrendField::NewSubscribers,
        other => bail!("unknown trend field: {other}"),
    };
    Ok(field)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match &cli.command {
        Commands::InitDb => {
            let database_url = config
                .cache
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to a Postgres instance")?;
            let pool = db::connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Fetch => {
            let store = open_store(&config).await?;
            let snapshot = refresh(&config, &store).await?;
            let (posts, subscribers, segments) = snapshot.record_counts();
            println!(
                "Fetched {} publications ({posts} posts, {subscribers} subscribers, {segments} segments) in {}ms.",
                snapshot.publications.len(),
                snapshot.fetch_duration_ms
            );
            println!("Cached to {} ({}).", store.location(), store.name());
        }
        Commands::Status => {
            let store = open_store(&config).await?;
            let snapshot = store.get().await?;
            let status = CacheStatus::new(
                snapshot.as_ref(),
                config.cache.refresh_interval_hours,
                Utc::now(),
            );
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Watch => {
            let store = open_store(&config).await?;
            let hours = config.cache.refresh_interval_hours;
            loop {
                let mut fetched_at = store.get().await?.map(|s| s.fetched_at);
                if newsletter_analytics::cache::is_stale(fetched_at, hours, Utc::now()) {
                    match refresh(&config, &store).await {
                        Ok(snapshot) => fetched_at = Some(snapshot.fetched_at),
                        Err(e) => warn!(error = %e, "scheduled refresh failed"),
                    }
                }
                let delay = next_refresh_delay(fetched_at, hours, Utc::now());
                info!(minutes = delay.num_minutes(), "next refresh scheduled");
                let sleep = tokio::time::sleep(
                    delay.to_std().unwrap_or(std::time::Duration::from_secs(60)),
                );
                tokio::select! {
                    _ = sleep => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("stopping");
                        break;
                    }
                }
            }
        }
        Commands::Overview => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let overview = dashboard.overview.unwrap_or_default();
            println!("Subscribers: {} active", overview.total_subscribers);
            println!(
                "- organic {}, inorganic {}",
                overview.organic_users, overview.inorganic_users
            );
            println!(
                "Sends: {} (avg open {:.2}%, avg click {:.2}%)",
                overview.total_newsletter_sends, overview.avg_open_rate, overview.avg_click_rate
            );
            println!(
                "Unsubscribes: {} ({:.2}%), spam reports: {} ({:.3}%)",
                overview.total_unsubscribes,
                overview.unsubscribe_rate,
                overview.total_spam_reports,
                overview.spam_rate
            );
            println!("Engagement tiers:");
            for (tier, count) in &overview.engagement_distribution {
                println!("- {tier}: {count}");
            }
        }
        Commands::Metrics { view } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let result = analyze(&dashboard, view)?;
            let m = &result.metrics;
            println!("{} | {} ({})", result.publication, result.window.period, result.window.current);
            for (label, metric) in [
                ("Total subscribers", m.total_subs),
                ("New subscribers", m.new_subscribers),
                ("Subscriber growth %", m.subs_growth_rate),
                ("Open rate %", m.open_rate),
                ("CTR %", m.ctr),
                ("CTOR %", m.ctor),
                ("Traffic sent", m.traffic_sent),
                ("Unsubscribe rate %", m.unsubscribe_rate),
                ("Bounce rate %", m.bounce_rate),
                ("Engaged subscribers %", m.active_rate),
                ("Unsubscribes", m.total_unsubscribes),
            ] {
                println!("- {label}: {:.2} ({:+.2})", metric.value, metric.change);
            }
            if let Some(averages) = result.comparison.as_ref().and_then(|c| c.averages) {
                println!(
                    "Comparison: open {:.2}%, CTR {:.2}%, CTOR {:.2}%",
                    averages.open_rate, averages.ctr, averages.ctor
                );
            }
        }
        Commands::Trends { view, out, field } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let result = analyze(&dashboard, view)?;
            if let Some(path) = out {
                write_file(path, |file| export::write_trend_csv(file, &result.trend))?;
            } else if let Some(series) = result.comparison_series(parse_trend_field(field)?) {
                for point in series {
                    println!(
                        "{} {:.2} vs {:.2} ({:?})",
                        point.date, point.current, point.comparison, point.sample
                    );
                }
            } else {
                for point in &result.trend {
                    println!(
                        "{} posts {} delivered {} open {:.2}% ctr {:.2}% ctor {:.2}% new subs {}",
                        point.date,
                        point.posts,
                        point.delivered,
                        point.open_rate,
                        point.ctr,
                        point.ctor,
                        point.new_subscribers
                    );
                }
            }
        }
        Commands::Sources { view, out } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let result = analyze(&dashboard, view)?;
            let growth = &result.source_growth;
            if let Some(path) = out {
                write_file(path, |file| export::write_source_growth_csv(file, growth))?;
            } else if growth.data.is_empty() {
                println!("No signups in this window.");
            } else {
                for point in &growth.data {
                    let counts: Vec<String> = point
                        .counts
                        .iter()
                        .map(|(source, count)| format!("{source} {count}"))
                        .collect();
                    println!("{} total {} | {}", point.date, point.total, counts.join(", "));
                }
            }
        }
        Commands::Top {
            view,
            articles,
            posts,
            by,
            ascending,
            out,
        } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let mut options = view.options()?;
            options.ranking = PostRanking {
                field: by.parse::<PostRankField>()?,
                direction: if *ascending {
                    SortDirection::Ascending
                } else {
                    SortDirection::Descending
                },
            };
            let result = pipeline::analyze(&dashboard, &options, Utc::now())?;
            let show_posts = *posts && !*articles;

            match (show_posts, out) {
                (false, Some(path)) => {
                    write_file(path, |file| export::write_top_articles_csv(file, &result.top_articles))?
                }
                (true, Some(path)) => {
                    write_file(path, |file| export::write_top_posts_csv(file, &result.top_posts))?
                }
                (false, None) => {
                    println!("Top articles:");
                    for article in &result.top_articles {
                        println!(
                            "- {} ({} clicks) from {}",
                            article.url, article.total_clicks, article.post_title
                        );
                    }
                }
                (true, None) => {
                    println!("Top newsletters:");
                    for post in &result.top_posts {
                        println!(
                            "- {} open {:.1}% click {:.1}% recipients {}",
                            post.title, post.open_rate, post.click_rate, post.recipients
                        );
                    }
                }
            }
        }
        Commands::Economics { view } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let options = view.options()?;
            let result = pipeline::economics_view(&dashboard, &options, &config.economics, Utc::now())?;
            let (now, before) = (&result.current, &result.prior);
            println!("{} vs {}", result.range, result.prior_range);
            println!(
                "- Revenue: ${:.2} (was ${:.2}, {:+.1}%)",
                now.estimated_revenue, before.estimated_revenue, result.change.revenue
            );
            println!(
                "- Cost: ${:.2} (platform ${:.2}, acquisition ${:.2}, {:+.1}%)",
                now.total_cost, now.platform_cost, now.acquisition_cost, result.change.total_cost
            );
            println!("- Profit: ${:.2} ({:+.1}%)", now.profit, result.change.profit);
            println!("- ROI: {:.1}% ({:+.1} pts)", now.roi, result.change.roi);
            println!(
                "- New subscribers: {} ({} paid, {} organic), cost each ${:.2}",
                now.new_subscribers, now.paid_subscribers, now.organic_subscribers, now.cost_per_subscriber
            );
            println!(
                "- Article clicks: {}, revenue per clicker ${:.3}, RPM ${:.2}",
                now.article_clicks, now.revenue_per_clicker, now.rpm
            );
        }
        Commands::Content { view } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let options = view.options()?;
            let result = pipeline::content_view(&dashboard, &options, Utc::now())?;
            println!("Subject formats (open rate):");
            for row in &result.subject_formats {
                println!("- {}: {:.2}% over {} posts", row.format, row.open_rate, row.posts);
            }
            println!("Title formats (CTOR):");
            for row in &result.title_formats {
                println!("- {}: {:.2}% over {} posts", row.format, row.ctor, row.posts);
            }
        }
        Commands::Targets { publication } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let scoped = pipeline::scope(&dashboard, publication);
            let targets = target_report(&scoped.posts, &scoped.subscribers, &config.targets, Utc::now());
            println!("{}", serde_json::to_string_pretty(&targets)?);
        }
        Commands::Report { view, out } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            let result = analyze(&dashboard, view)?;
            let scoped = pipeline::scope(&dashboard, &view.publication);
            let targets = target_report(&scoped.posts, &scoped.subscribers, &config.targets, Utc::now());
            let body = report::build_report(
                dashboard.overview.as_ref(),
                &result,
                &targets,
                &dashboard.segments,
            );
            std::fs::write(out, body)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            view,
            period_view,
            out,
        } => {
            let dashboard = load_dashboard(&cli, &config).await?;
            if *period_view {
                export::write_json(out, &analyze(&dashboard, view)?)?;
            } else {
                export::write_json(out, &dashboard)?;
            }
            println!("Exported to {}.", out.display());
        }
    }

    Ok(())
}
