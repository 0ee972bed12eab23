//! # Entitlements CLI
//!
//! Inspect and drive a file-backed entitlement store: show status, inject a
//! verified subscription record, check and open content, manage the trial flag.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use content_entitlements::{
    initialize, EntitlementConfig, Entitlements, SubscriptionRecord, SubscriptionStatus,
};

#[derive(Parser)]
#[command(name = "entitlements-cli")]
#[command(about = "Local subscription entitlement and free-view quota store")]
#[command(version = content_entitlements::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or YAML)
    #[arg(short, long, default_value = "entitlements.toml")]
    config: PathBuf,

    /// Store file, overrides `storage.path` from the config
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show subscription status, verification and quota state
    Status,

    /// Store a verified subscription record
    Save {
        /// free, active, expired or cancelled
        #[arg(long, default_value = "active")]
        status: SubscriptionStatus,

        /// Product identifier
        #[arg(long)]
        product: Option<String>,

        /// Expiry relative to now, in hours (omit for a lifetime grant)
        #[arg(long, allow_hyphen_values = true)]
        expires_in_hours: Option<i64>,

        /// Original transaction identifier
        #[arg(long)]
        transaction_id: Option<String>,

        /// Auto-renew flag
        #[arg(long)]
        auto_renew: bool,
    },

    /// Sign out: forget the subscription and verification time
    Clear,

    /// Check whether content may be opened (does not use quota)
    Access {
        content_id: u32,
    },

    /// Open content, spending a free view when required
    Open {
        content_id: u32,
    },

    /// Record a free view directly
    View,

    /// Print the free-view ledger
    Ledger,

    /// Free-trial flag
    Trial {
        #[command(subcommand)]
        action: TrialCommands,
    },
}

#[derive(Subcommand)]
enum TrialCommands {
    /// Show whether the trial was used
    Status,
    /// Mark the trial as used
    Mark,
}

#[derive(Serialize)]
struct StatusReport {
    record: SubscriptionRecord,
    is_premium: bool,
    needs_verification: bool,
    last_verification: Option<String>,
    views_today: u32,
    remaining_views: u32,
    max_free_views: u32,
    free_trial_used: bool,
}

fn status_report(entitlements: &Entitlements) -> StatusReport {
    let record = entitlements.load();
    StatusReport {
        is_premium: record.is_active(),
        record,
        needs_verification: entitlements.needs_verification(),
        last_verification: entitlements
            .store()
            .last_verification_time()
            .map(|ts| ts.to_rfc3339()),
        views_today: entitlements.quota().view_count_today(),
        remaining_views: entitlements.remaining_views(),
        max_free_views: entitlements.quota().max_free_views_per_day(),
        free_trial_used: entitlements.has_free_trial_been_used(),
    }
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "content_entitlements=debug,entitlements_cli=debug"
    } else {
        "content_entitlements=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = EntitlementConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let store_path = cli
        .store
        .clone()
        .or(config.storage.path.take())
        .unwrap_or_else(|| PathBuf::from("entitlements.json"));
    config.storage.path = Some(store_path);

    let entitlements = initialize(config).context("opening entitlement store")?;

    match cli.command {
        Commands::Status => {
            let report = status_report(&entitlements);
            print(cli.json, &report, || {
                format!(
                    "status:             {}\n\
                     product:            {}\n\
                     expires:            {}\n\
                     premium:            {}\n\
                     needs verification: {}\n\
                     views today:        {}/{} ({} remaining)\n\
                     free trial used:    {}",
                    report.record.status,
                    report.record.product_id.as_deref().unwrap_or("-"),
                    report
                        .record
                        .expiration_date
                        .map(|ts| ts.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                    report.is_premium,
                    report.needs_verification,
                    report.views_today,
                    report.max_free_views,
                    report.remaining_views,
                    report.free_trial_used,
                )
            })?;
        }
        Commands::Save {
            status,
            product,
            expires_in_hours,
            transaction_id,
            auto_renew,
        } => {
            let now = Utc::now();
            let record = SubscriptionRecord {
                status,
                product_id: product,
                purchase_date: (status != SubscriptionStatus::Free).then_some(now),
                expiration_date: expires_in_hours.map(|h| now + Duration::hours(h)),
                original_transaction_id: transaction_id,
                auto_renew_enabled: auto_renew,
            };
            entitlements
                .store()
                .try_save(&record)
                .context("saving subscription record")?;
            print(cli.json, &record, || format!("saved {} record", record.status))?;
        }
        Commands::Clear => {
            entitlements.store().try_clear().context("clearing subscription")?;
            print(cli.json, &serde_json::json!({ "cleared": true }), || {
                "subscription cleared".to_string()
            })?;
        }
        Commands::Access { content_id } => {
            let decision = entitlements.policy().evaluate(content_id);
            print(cli.json, &decision, || {
                format!(
                    "content {}: {} ({:?})",
                    content_id,
                    if decision.is_allowed() { "allowed" } else { "denied" },
                    decision
                )
            })?;
        }
        Commands::Open { content_id } => {
            let decision = entitlements.open_content(content_id);
            print(cli.json, &decision, || {
                format!(
                    "content {}: {} ({} free views left)",
                    content_id,
                    if decision.is_allowed() { "opened" } else { "locked" },
                    entitlements.remaining_views()
                )
            })?;
        }
        Commands::View => {
            let count = entitlements
                .quota()
                .try_record_view()
                .context("recording free view")?;
            print(cli.json, &serde_json::json!({ "views_today": count }), || {
                format!("views today: {}", count)
            })?;
        }
        Commands::Ledger => {
            let ledger = entitlements.free_view_ledger();
            let stored = ledger.to_stored();
            print(cli.json, &stored, || {
                if ledger.is_empty() {
                    "ledger is empty".to_string()
                } else {
                    ledger
                        .iter()
                        .map(|(day, count)| format!("{}  {}", day, count))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })?;
        }
        Commands::Trial { action } => {
            if let TrialCommands::Mark = action {
                entitlements.mark_free_trial_used();
            }
            let used = entitlements.has_free_trial_been_used();
            print(cli.json, &serde_json::json!({ "free_trial_used": used }), || {
                format!("free trial used: {}", used)
            })?;
        }
    }

    Ok(())
}
