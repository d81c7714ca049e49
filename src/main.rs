//! # Main — CLI Entry Point
//!
//! Routes subcommands to the execution functions in `cli.rs`. Shared
//! concerns handled here: `.env` loading, structured logging setup, and
//! construction of the API client from the `--server`/`GREYMOON_SERVER`
//! base URL.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use greymoon::leads::LeadStatus;

#[derive(Parser)]
#[command(
    name = "greymoon",
    about = "Operator console for the greymoon lead-collection platform"
)]
struct Cli {
    /// Base URL of the greymoon API (e.g. http://127.0.0.1:8000/api)
    #[arg(
        long,
        env = "GREYMOON_SERVER",
        default_value = "http://127.0.0.1:8000/api"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session tokens
    Login {
        #[arg(long, short)]
        username: String,
        #[arg(long, short)]
        password: String,
    },
    /// Create an operator account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Show the logged-in account
    Whoami,
    /// List scrapeable cities, grouped by state
    Cities {
        /// Only show one state
        #[arg(long)]
        state: Option<String>,
    },
    /// Control the collection run
    Scrape {
        #[command(subcommand)]
        action: ScrapeAction,
    },
    /// Browse collected leads
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },
    /// Show past runs
    History {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
}

#[derive(Subcommand)]
enum ScrapeAction {
    /// Start a run over the selected cities
    Start {
        /// City code to include (repeatable)
        #[arg(long = "city")]
        cities: Vec<String>,
        /// Select every city in the catalog
        #[arg(long, conflicts_with = "cities")]
        all: bool,
        /// Keep polling until the run finishes
        #[arg(long)]
        watch: bool,
    },
    /// Show the authoritative run status
    Status,
    /// Cancel the active run
    Cancel,
    /// Follow the active run until it reaches a terminal state
    Watch,
}

#[derive(Subcommand)]
enum LeadsAction {
    /// List leads, optionally filtered
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, value_enum)]
        status: Option<LeadStatus>,
        /// true = only leads with a phone, false = only without
        #[arg(long)]
        has_phone: Option<bool>,
        /// true = only leads with an email, false = only without
        #[arg(long)]
        has_email: Option<bool>,
        /// Minimum score, inclusive
        #[arg(long)]
        min_score: Option<i64>,
        /// Maximum score, inclusive
        #[arg(long)]
        max_score: Option<i64>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = greymoon::leads::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Aggregate counts over the full set
    Stats,
    /// Update one lead's pipeline status
    SetStatus {
        post_id: String,
        #[arg(value_enum)]
        status: LeadStatus,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Structured logging: LOG_FORMAT=json for machine consumption,
    // human-readable stderr otherwise.
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let api = cli::client(&cli.server)?;

    match &cli.command {
        Commands::Login { username, password } => cli::run_login(&api, username, password),
        Commands::Register {
            username,
            email,
            password,
        } => cli::run_register(&api, username, email, password),
        Commands::Logout => cli::run_logout(&api),
        Commands::Whoami => cli::run_whoami(&api),
        Commands::Cities { state } => cli::run_cities(&api, state.as_deref()),
        Commands::Scrape { action } => match action {
            ScrapeAction::Start { cities, all, watch } => {
                cli::run_start(api, cities.clone(), *all, *watch)
            }
            ScrapeAction::Status => cli::run_status(&api),
            ScrapeAction::Cancel => cli::run_cancel(api),
            ScrapeAction::Watch => cli::run_watch(api),
        },
        Commands::Leads { action } => match action {
            LeadsAction::List {
                category,
                state,
                status,
                has_phone,
                has_email,
                min_score,
                max_score,
                page,
                page_size,
            } => cli::run_leads_list(
                &api,
                greymoon::leads::FilterCriteria {
                    category: category.clone(),
                    state: state.clone(),
                    status: *status,
                    has_phone: *has_phone,
                    has_email: *has_email,
                    score_min: *min_score,
                    score_max: *max_score,
                },
                *page,
                *page_size,
            ),
            LeadsAction::Stats => cli::run_leads_stats(&api),
            LeadsAction::SetStatus { post_id, status } => {
                cli::run_set_status(&api, post_id, *status)
            }
        },
        Commands::History { page } => cli::run_history(&api, *page),
    }
}
