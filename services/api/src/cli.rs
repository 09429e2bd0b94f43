use crate::infra::Collaborators;
use crate::server;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use leadgate::config::AppConfig;
use leadgate::error::AppError;
use leadgate::telemetry;
use leadgate::workflows::admission::{
    normalize_dimension, AdmissionError, Lead, LeadBucketer, LeadSubmission,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Admission Gate",
    about = "Decide affiliate leads and run the auto-pilot controller from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a single auto-pilot pass against the configured stores
    Tick,
    /// Copy several days of counters into the analytics traffic table
    SyncHistory(SyncHistoryArgs),
    /// Print the deterministic bucket a lead would land in
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct SyncHistoryArgs {
    /// Days before today at which to start
    #[arg(long, default_value_t = 0)]
    pub(crate) offset: u32,
    /// Number of days to sync, walking backwards
    #[arg(long, default_value_t = 5)]
    pub(crate) limit: u32,
    /// Reference day in YYYY-MM-DD format (defaults to today, UTC)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    #[arg(long)]
    pub(crate) lead_id: String,
    #[arg(long)]
    pub(crate) affiliate_id: String,
    #[arg(long)]
    pub(crate) offer_id: String,
    #[arg(long)]
    pub(crate) sub_id: Option<String>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{raw}': {err}"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Tick => run_tick().await,
        Command::SyncHistory(args) => run_sync_history(args).await,
        Command::Score(args) => run_score(args),
    }
}

fn bootstrap() -> Result<(AppConfig, Collaborators), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let collaborators = Collaborators::from_config(&config)?;
    Ok((config, collaborators))
}

async fn run_tick() -> Result<(), AppError> {
    let (config, collaborators) = bootstrap()?;
    let report = collaborators.controller(&config).tick().await?;
    println!("{:#}", json!(report));
    Ok(())
}

async fn run_sync_history(args: SyncHistoryArgs) -> Result<(), AppError> {
    let (_, collaborators) = bootstrap()?;
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    let total_rows = collaborators
        .history_sync()
        .sync_history(today, args.offset, args.limit)
        .await?;
    println!(
        "{:#}",
        json!({
            "today": today,
            "offset": args.offset,
            "limit": args.limit,
            "total_rows": total_rows,
        })
    );
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let submission = LeadSubmission {
        lead_id: normalize_dimension(Some(&args.lead_id)),
        affiliate_id: normalize_dimension(Some(&args.affiliate_id)),
        offer_id: normalize_dimension(Some(&args.offer_id)),
        sub_id: normalize_dimension(args.sub_id.as_deref()),
        click_id: None,
    };
    let lead = Lead::try_from(submission).map_err(AdmissionError::from)?;
    let bucket = LeadBucketer::new(config.admission.hash_secret).bucket(&lead);
    println!("{:#}", json!({ "lead": lead, "bucket": bucket }));
    Ok(())
}
