//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each function
//! runs one subcommand end to end: build the relevant engine, call the
//! API, print. All user-visible failures surface through `anyhow` with
//! the typed `ApiError` message intact.

use anyhow::Result;
use greymoon::api::ApiClient;
use greymoon::catalog::CityCatalog;
use greymoon::history::HistoryLog;
use greymoon::job::{JobController, RunStatus};
use greymoon::leads::{FilterCriteria, LeadStatus, LeadStore};

pub fn client(server: &str) -> Result<ApiClient> {
    Ok(ApiClient::new(server)?)
}

// ── Session ─────────────────────────────────────────────────────

pub fn run_login(api: &ApiClient, username: &str, password: &str) -> Result<()> {
    api.login(username, password)?;
    let user = api.current_user()?;
    println!("Logged in as {}", user.username);
    Ok(())
}

pub fn run_register(api: &ApiClient, username: &str, email: &str, password: &str) -> Result<()> {
    api.register(username, email, password)?;
    println!("Account {} created. Run `greymoon login` to start.", username);
    Ok(())
}

pub fn run_logout(api: &ApiClient) -> Result<()> {
    api.logout();
    println!("Logged out");
    Ok(())
}

pub fn run_whoami(api: &ApiClient) -> Result<()> {
    let user = api.current_user()?;
    match user.email.as_deref() {
        Some(email) if !email.is_empty() => println!("{} <{}>", user.username, email),
        _ => println!("{}", user.username),
    }
    Ok(())
}

// ── Catalog ─────────────────────────────────────────────────────

pub fn run_cities(api: &ApiClient, state: Option<&str>) -> Result<()> {
    let mut catalog = CityCatalog::new();
    catalog.load(api)?;

    let grouped = catalog.by_state();
    let mut shown = 0;
    for (st, cities) in &grouped {
        if let Some(wanted) = state {
            if !st.eq_ignore_ascii_case(wanted) {
                continue;
            }
        }
        println!("{}", st);
        for city in cities {
            println!("  {:<8} {}", city.code, city.display_name());
            shown += 1;
        }
    }
    if shown == 0 {
        match state {
            Some(wanted) => println!("No cities in state {}", wanted),
            None => println!("No cities available"),
        }
    }
    Ok(())
}

// ── Run control ─────────────────────────────────────────────────

pub fn run_start(api: ApiClient, mut cities: Vec<String>, all: bool, watch: bool) -> Result<()> {
    let controller = JobController::new(api);

    if all {
        let mut catalog = CityCatalog::new();
        catalog.load(controller.api())?;
        catalog.select_all();
        cities = catalog.selected();
    }

    let run_id = controller.start(cities)?;
    println!("Run {} started", run_id);

    if watch {
        watch_loop(&controller)?;
    }
    Ok(())
}

pub fn run_status(api: &ApiClient) -> Result<()> {
    let report = api.scrape_status()?;
    let status = RunStatus::from_wire(&report.status)
        .map(|s| s.to_string())
        .unwrap_or_else(|| report.status.clone());
    match report.run_id.as_deref() {
        Some(run_id) => println!("{} (run {})", status, run_id),
        None => println!("{}", status),
    }
    Ok(())
}

pub fn run_cancel(api: ApiClient) -> Result<()> {
    let controller = JobController::new(api);
    // Reconcile first: a fresh process starts IDLE and must adopt the
    // live run before it has anything to cancel.
    controller.poll_tick()?;
    controller.cancel()?;
    println!(
        "Cancel requested for run {}; the run stays CANCELLING until the server confirms",
        controller.snapshot().run_id.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

pub fn run_watch(api: ApiClient) -> Result<()> {
    let controller = JobController::new(api);
    watch_loop(&controller)
}

fn watch_loop(controller: &JobController) -> Result<()> {
    let mut store = LeadStore::new();
    let finished = controller.run_until_terminal(&mut store, |status, store| {
        let agg = store.aggregates();
        println!(
            "status {:<10}  leads {:>5}  (phone {}, email {}, geolocated {})",
            status.to_string(),
            agg.total,
            agg.with_phone,
            agg.with_email,
            agg.geolocated
        );
    })?;
    match finished {
        RunStatus::Idle => println!("No run in progress"),
        status => println!("Run finished: {}", status),
    }
    Ok(())
}

// ── Leads ───────────────────────────────────────────────────────

pub fn run_leads_list(
    api: &ApiClient,
    criteria: FilterCriteria,
    page: usize,
    page_size: usize,
) -> Result<()> {
    let mut store = LeadStore::with_page_size(page_size);
    store.replace_all(api.list_leads()?);
    store.apply_filter(criteria);

    let rows = store.page(page);
    println!(
        "{:<12} {:<36} {:<10} {:<14} {:>5}  {:<10} {:<14}",
        "POST ID", "TITLE", "CATEGORY", "STATE", "SCORE", "STATUS", "PHONE"
    );
    for lead in &rows {
        println!(
            "{:<12} {:<36} {:<10} {:<14} {:>5}  {:<10} {:<14}",
            truncate(&lead.post_id, 12),
            truncate(&lead.title, 36),
            truncate(lead.category.as_deref().unwrap_or("-"), 10),
            truncate(lead.state.as_deref().unwrap_or("-"), 14),
            lead.score,
            status_label(lead.status),
            lead.phone.as_deref().unwrap_or("-"),
        );
    }
    println!(
        "page {}/{} — {} of {} leads match",
        store.current_page(),
        store.total_pages().max(1),
        store.filtered_len(),
        store.len()
    );
    Ok(())
}

pub fn run_leads_stats(api: &ApiClient) -> Result<()> {
    let mut store = LeadStore::new();
    store.replace_all(api.list_leads()?);

    let agg = store.aggregates();
    println!("total       {}", agg.total);
    for (status, count) in &agg.by_status {
        println!("{:<11} {}", status_label(*status).to_lowercase(), count);
    }
    println!("with phone  {}", agg.with_phone);
    println!("with email  {}", agg.with_email);
    println!("geolocated  {}", agg.geolocated);
    Ok(())
}

pub fn run_set_status(api: &ApiClient, post_id: &str, status: LeadStatus) -> Result<()> {
    let mut store = LeadStore::new();
    store.replace_all(api.list_leads()?);
    store.set_status(api, post_id, status)?;
    println!("Lead {} marked {}", post_id, status_label(status));
    Ok(())
}

// ── History ─────────────────────────────────────────────────────

pub fn run_history(api: &ApiClient, page: usize) -> Result<()> {
    let log = HistoryLog::new(api.scrape_history()?);
    if log.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }
    println!(
        "{:<24} {:<10} {:>8}  {:<20} {:<20}",
        "RUN", "STATUS", "LEADS", "STARTED", "FINISHED"
    );
    for run in log.page(page) {
        println!(
            "{:<24} {:<10} {:>8}  {:<20} {:<20}",
            truncate(&run.run_id, 24),
            run.status,
            run.leads_collected,
            run.started_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into()),
            run.finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into()),
        );
    }
    println!(
        "page {}/{}",
        page.clamp(1, log.total_pages().max(1)),
        log.total_pages().max(1)
    );
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn status_label(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::New => "NEW",
        LeadStatus::Contacted => "CONTACTED",
        LeadStatus::Qualified => "QUALIFIED",
        LeadStatus::Won => "WON",
        LeadStatus::Lost => "LOST",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
