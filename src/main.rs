use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod analysis;
mod config;
mod db;
mod dispatch;
mod error;
mod models;
mod report;
mod schedule;

use config::AppConfig;
use db::{PgRecordStore, RecordStore};
use dispatch::{Dispatcher, OutboxDispatcher, StdoutDispatcher};
use models::NewRecord;
use report::{DispatchTarget, ReportAssembler};
use schedule::{Clock, Schedule, SystemClock};

#[derive(Parser)]
#[command(name = "review-digest")]
#[command(about = "Daily self-review log with a scheduled weekly digest", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Name shown in report headers and subjects
    #[arg(long, env = "APP_NAME", global = true)]
    app_name: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample reviews from the past week
    Seed,
    /// Record today's review
    Record {
        #[arg(long)]
        work: i32,
        #[arg(long)]
        training: i32,
        #[arg(long)]
        studies: i32,
        #[arg(long)]
        mind: i32,
        #[arg(long)]
        positive: String,
        #[arg(long)]
        negative: String,
        /// Send an intake confirmation to this address
        #[arg(long)]
        to: Option<String>,
        /// Also notify this operator address (needs --to)
        #[arg(long, requires = "to")]
        admin: Option<String>,
        #[arg(long, env = "DIGEST_OUTBOX")]
        outbox: Option<PathBuf>,
    },
    /// Import reviews from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List stored reviews, newest first
    List {
        /// Only show the trailing window of this many days
        #[arg(long)]
        days: Option<i64>,
    },
    /// Show per-area averages for the trailing window
    Averages {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Generate the weekly report
    Report {
        /// Recipient; the report is dispatched when set
        #[arg(long, env = "REPORT_RECIPIENT")]
        to: Option<String>,
        /// Queue dispatched messages in this directory instead of printing them
        #[arg(long, env = "DIGEST_OUTBOX")]
        outbox: Option<PathBuf>,
        /// Write the report body to a file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the report with its aggregate and analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the check-in schedule
    Schedule {
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduled cycle: check-in request on send days, report on report day
    Tick {
        #[arg(long, env = "REPORT_RECIPIENT")]
        to: Option<String>,
        #[arg(long, env = "DIGEST_OUTBOX")]
        outbox: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::default().with_app_name(cli.app_name.clone());
    let clock = SystemClock;

    match cli.command {
        Commands::Schedule { json } => {
            let info = Schedule::new(&config.schedule).schedule_info(clock.now());
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Today: {}", info.today);
                println!("Check-in day: {}", yes_no(info.is_send_day));
                println!("Report day: {}", yes_no(info.is_report_day));
                println!("Next check-in: {}", info.next_send_date.format("%d/%m/%Y"));
                println!(
                    "Check-in days: {} at {}",
                    info.send_days.join(", "),
                    info.nominal_send_time.format("%H:%M")
                );
            }
        }
        Commands::InitDb => {
            let store = connect(cli.database_url.as_deref()).await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = connect(cli.database_url.as_deref()).await?;
            let inserted = db::seed(&store, clock.now()).await?;
            println!("Inserted {inserted} sample reviews.");
        }
        Commands::Record {
            work,
            training,
            studies,
            mind,
            positive,
            negative,
            to,
            admin,
            outbox,
        } => {
            let store = connect(cli.database_url.as_deref()).await?;
            let record = NewRecord {
                work,
                training,
                studies,
                mind,
                positive_notes: positive,
                negative_notes: negative,
            };
            let stored = store.insert(&record).await?;
            println!(
                "Review {} recorded. Day average: {:.1}/10",
                stored.id,
                stored.average_score()
            );

            if let Some(recipient) = to.as_deref() {
                let dispatcher = dispatcher_for(outbox);
                let user = DispatchTarget {
                    recipient,
                    dispatcher: dispatcher.as_ref(),
                };
                let admin = admin.as_deref().map(|recipient| DispatchTarget {
                    recipient,
                    dispatcher: dispatcher.as_ref(),
                });
                report::send_intake_notices(&config, &stored, clock.now(), &user, admin.as_ref())
                    .context("intake confirmation failed")?;
            }
        }
        Commands::Import { csv } => {
            let store = connect(cli.database_url.as_deref()).await?;
            let summary = db::import_csv(&store, &csv).await?;
            println!(
                "Inserted {} reviews from {} ({} already present, {} rejected).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.rejected.len()
            );
            for (line, messages) in &summary.rejected {
                println!("- line {line}: {}", messages.join("; "));
            }
        }
        Commands::List { days } => {
            let store = connect(cli.database_url.as_deref()).await?;
            let now = clock.now();
            let records = match days {
                Some(days) => store.query_window(db::window_start(now, days)?, now).await?,
                None => store.all_records().await?,
            };

            if records.is_empty() {
                println!("No reviews found.");
                return Ok(());
            }

            for record in &records {
                let when = record
                    .created_at
                    .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                println!(
                    "#{} ({}) work {} | training {} | studies {} | mind {} | avg {:.1}",
                    record.id,
                    when,
                    record.work,
                    record.training,
                    record.studies,
                    record.mind,
                    record.average_score()
                );
                println!("    + {}", record.positive_notes);
                println!("    - {}", record.negative_notes);
            }
        }
        Commands::Averages { days } => {
            let store = connect(cli.database_url.as_deref()).await?;
            match store.aggregate_last_n_days(clock.now(), days).await {
                Ok(aggregate) => {
                    println!("Averages over the last {days} days:");
                    for dimension in models::Dimension::ALL {
                        println!("- {}: {:.2}/10", dimension, aggregate.average(dimension));
                    }
                    println!("Overall average: {:.2}/10", aggregate.overall_average);
                    println!("Reviews: {}", aggregate.total_reviews);
                }
                Err(error::ReviewError::NoData) => {
                    println!("No reviews found in the last {days} days.");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Report {
            to,
            outbox,
            out,
            json,
        } => {
            let store = connect(cli.database_url.as_deref()).await?;
            let dispatcher = dispatcher_for(outbox);
            let target = to.as_deref().map(|recipient| DispatchTarget {
                recipient,
                dispatcher: dispatcher.as_ref(),
            });

            let report = ReportAssembler::new(&store, &config, &clock)
                .generate(target)
                .await
                .context("weekly report failed")?;

            if let Some(out) = out {
                std::fs::write(&out, &report.body)?;
                println!("Report written to {}.", out.display());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !report.dispatched {
                println!("{}", report.body);
            }
        }
        Commands::Tick { to, outbox } => {
            let recipient = to.context("a recipient is required (--to or REPORT_RECIPIENT)")?;
            let dispatcher = dispatcher_for(outbox);
            let now = clock.now();
            let schedule = Schedule::new(&config.schedule);

            if schedule.is_send_day(now) {
                let (subject, body) = report::render_checkin_request(&config, now);
                dispatcher
                    .dispatch(&recipient, &subject, &body)
                    .context("check-in request failed")?;
                info!(recipient = %recipient, "check-in request sent");
            }

            if schedule.is_report_day(now) {
                let store = connect(cli.database_url.as_deref()).await?;
                let report = ReportAssembler::new(&store, &config, &clock)
                    .generate(Some(DispatchTarget {
                        recipient: &recipient,
                        dispatcher: dispatcher.as_ref(),
                    }))
                    .await
                    .context("weekly report failed")?;
                info!(reviews = report.reviews_count, "weekly report sent");
            }

            if !schedule.is_send_day(now) && !schedule.is_report_day(now) {
                println!(
                    "Nothing scheduled today. Next check-in: {}",
                    schedule.next_send_date(now).format("%d/%m/%Y")
                );
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    tracing_subscriber::registry()
        .with(log_filter(verbose, std::env::var("RUST_LOG").ok()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// `-v`/`-vv` take precedence over `RUST_LOG`, which in turn overrides `info`.
fn log_filter(verbose: u8, rust_log: Option<String>) -> EnvFilter {
    match verbose {
        0 => rust_log
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgRecordStore> {
    let database_url =
        database_url.context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(PgRecordStore::new(pool))
}

fn dispatcher_for(outbox: Option<PathBuf>) -> Box<dyn Dispatcher> {
    match outbox {
        Some(dir) => Box::new(OutboxDispatcher::new(dir)),
        None => Box::new(StdoutDispatcher),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_overrides_rust_log() {
        assert_eq!(log_filter(1, Some("warn".to_string())).to_string(), "debug");
        assert_eq!(log_filter(2, Some("warn".to_string())).to_string(), "trace");
    }

    #[test]
    fn rust_log_applies_without_verbosity() {
        assert_eq!(log_filter(0, Some("warn".to_string())).to_string(), "warn");
        assert_eq!(log_filter(0, None).to_string(), "info");
    }

    #[test]
    fn admin_notice_needs_a_recipient() {
        let base = [
            "review-digest", "record", "--work", "8", "--training", "7", "--studies", "9",
            "--mind", "8", "--positive", "ok", "--negative", "meh",
        ];
        let mut args = base.to_vec();
        args.extend(["--admin", "ops@example.com"]);
        assert!(Cli::try_parse_from(args.clone()).is_err());

        args.extend(["--to", "me@example.com"]);
        let cli = Cli::try_parse_from(args.clone()).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Record { ref to, ref admin, .. }
                if to.as_deref() == Some("me@example.com")
                    && admin.as_deref() == Some("ops@example.com")
        ));
    }
}
