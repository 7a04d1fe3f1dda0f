use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use slate_core::League;
use slate_sync::{enqueue_league_fetches, ingest_season, IngestTask, SlateContext, TaskDispatcher};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "slate-cli")]
#[command(about = "Daily sports slate command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the JSON API server (with the scheduler, when enabled).
    Serve,
    /// Apply pending database migrations.
    Migrate,
    /// Print the day's slate, aggregated live from every provider.
    Today {
        /// IANA timezone the day is resolved in.
        #[arg(long)]
        timezone: Option<String>,
        /// Local calendar date, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Read from the database instead of the providers.
        #[arg(long)]
        stored: bool,
    },
    /// Fetch and persist one date's games, all leagues or one.
    Ingest {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Restrict to a single league (NHL, NBA, MLB, NFL).
        #[arg(long)]
        league: Option<League>,
    },
    /// Replay the full NBA season schedule into the database in chunks.
    IngestSeason {
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Refresh the team tables from the league directory feeds.
    SyncTeams,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => slate_web::serve_from_env().await?,
        Commands::Migrate => {
            let context = SlateContext::from_env()?;
            context.store.run_migrations().await?;
            println!("migrations applied");
        }
        Commands::Today {
            timezone,
            date,
            stored,
        } => {
            let context = SlateContext::from_env()?;
            let tz = match timezone {
                Some(name) => name
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown timezone {name:?}"))?,
                None => context.config.tz(),
            };
            let events = if stored {
                context.aggregator.stored_today_events(tz, date).await?
            } else {
                context.aggregator.today_events(tz, date).await
            };
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Commands::Ingest { date, league } => {
            let context = SlateContext::from_env()?;
            let tz = context.config.tz();
            let date = date.unwrap_or_else(|| {
                chrono::Utc::now().with_timezone(&tz).date_naive()
            });
            let dispatcher = context.dispatcher();
            match league {
                Some(league) => {
                    dispatcher
                        .submit(IngestTask::LeagueDate { league, date })
                        .await
                        .with_context(|| format!("queueing {league} fetch"))?;
                }
                None => {
                    enqueue_league_fetches(dispatcher.as_ref(), date).await?;
                }
            }
            let summary = dispatcher.wait_idle().await;
            println!(
                "ingest complete: date={date} stored={} skipped={} failed={}",
                summary.stored, summary.skipped, summary.failed
            );
        }
        Commands::IngestSeason { chunk_size } => {
            let context = SlateContext::from_env()?;
            let chunk_size = chunk_size.unwrap_or(context.config.chunk_size);
            let events = slate_adapters::season::fetch_nba_season(&context.http)
                .await
                .context("fetching the season schedule")?;
            anyhow::ensure!(!events.is_empty(), "season schedule came back empty");
            let total = events.len();

            let dispatcher = context.dispatcher();
            let batches = ingest_season(dispatcher.as_ref(), events, chunk_size).await?;
            println!("dispatched {batches} batches covering {total} games");
            let summary = dispatcher.wait_idle().await;
            println!(
                "season replay complete: stored={} skipped={} failed={}",
                summary.stored, summary.skipped, summary.failed
            );
        }
        Commands::SyncTeams => {
            let context = SlateContext::from_env()?;
            let summary = context.team_sync().sync_all().await;
            println!(
                "team sync complete: nhl={} nba={} mlb={} total={}",
                summary.nhl,
                summary.nba,
                summary.mlb,
                summary.total()
            );
        }
    }

    Ok(())
}
