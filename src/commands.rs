use anyhow::{anyhow, bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::models::auth::{Credentials, Registration};
use crate::models::expenses::{Expense, ExpensesResponse};
use crate::models::notifications::PushNotification;
use crate::models::speedtest::format_speed;
use crate::repositories::api::BackendApi;
use crate::repositories::places::PlacesApi;
use crate::repositories::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::services::account::AccountService;
use crate::services::budget::{daily_totals, summarize, BudgetLevel, BudgetPools};
use crate::services::expenses::{ExpenseLoader, LoadPhase};
use crate::services::location::LocationEnricher;
use crate::services::months::MonthCursor;
use crate::services::notifications::{
    listen, HighlightCoordinator, ListAction, NotificationHub,
};
use crate::services::session::{Session, SessionService, SessionState};
use crate::services::ServiceError;
use crate::settings::Settings;

#[derive(Debug, Args)]
pub struct MonthArgs {
    /// Month number, 1-12. Defaults to the current month.
    #[arg(long)]
    pub month: Option<u32>,
    #[arg(long)]
    pub year: Option<i32>,
    /// Go this many months back from the current one.
    #[arg(long, conflicts_with_all = ["month", "year"])]
    pub back: Option<u32>,
}

impl MonthArgs {
    pub fn resolve(&self, today: NaiveDate) -> Result<MonthCursor, anyhow::Error> {
        let current = MonthCursor::current(today);
        if let Some(back) = self.back {
            return Ok(current.back(back));
        }

        let cursor = MonthCursor::past_or_current(
            self.month.unwrap_or(current.month()),
            self.year.unwrap_or(current.year()),
            today,
        )?;
        Ok(cursor)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and warm the expense cache.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Logout,
    Whoami,
    /// List a month's movements with the budget summary.
    Expenses {
        #[command(flatten)]
        month: MonthArgs,
    },
    /// Spend per day for a month.
    Calendar {
        #[command(flatten)]
        month: MonthArgs,
    },
    /// Show one movement, looking up its location when missing.
    Detail {
        id: String,
        #[command(flatten)]
        month: MonthArgs,
    },
    #[command(subcommand)]
    Cookie(CookieCommand),
    #[command(subcommand)]
    Card(CardCommand),
    #[command(subcommand)]
    Push(PushCommand),
    /// Replay a push notification payload from a JSON file.
    Notify {
        payload: PathBuf,
        #[command(flatten)]
        month: MonthArgs,
    },
    #[command(subcommand)]
    Speedtest(SpeedtestCommand),
    /// Cache the most recent months if not done yet for this session.
    Preload,
}

#[derive(Debug, Subcommand)]
pub enum CookieCommand {
    Get,
    Set { value: String },
    Test,
}

#[derive(Debug, Subcommand)]
pub enum CardCommand {
    Get,
    Set { value: String },
}

#[derive(Debug, Subcommand)]
pub enum PushCommand {
    Register { token: String },
    Unregister { token: String },
    Show,
}

#[derive(Debug, Subcommand)]
pub enum SpeedtestCommand {
    Summary,
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
}

pub struct App {
    pub settings: Settings,
    pub session: SessionService,
    pub loader: ExpenseLoader,
    pub account: AccountService,
    pub enricher: Option<LocationEnricher>,
}

impl App {
    pub async fn new(settings: Settings, ephemeral: bool) -> Result<Self, anyhow::Error> {
        let store: Arc<dyn KeyValueStore> = if ephemeral {
            log::info!("Using in-memory storage.");
            Arc::new(MemoryStore::new())
        } else {
            let dir = settings.storage_dir()?;
            log::debug!("Using storage at {}", dir.display());
            Arc::new(
                FileStore::open(&dir)
                    .await
                    .with_context(|| format!("Could not open storage in {}", dir.display()))?,
            )
        };

        let state = Arc::new(SessionState::new(store.clone()));
        let api = BackendApi::new(&settings.api.url, state.clone());

        let enricher = if settings.places.api_key.is_empty() {
            log::debug!("No places API key, location lookups disabled.");
            None
        } else {
            let places = PlacesApi::new(&settings.places.url, &settings.places.api_key);
            Some(LocationEnricher::new(Arc::new(places)))
        };

        let app = Self {
            session: SessionService::new(state, api.clone()),
            loader: ExpenseLoader::new(Arc::new(api.clone()), store),
            account: AccountService::new(api),
            enricher,
            settings,
        };
        app.session.init().await?;
        Ok(app)
    }

    async fn require_session(&self) -> Result<Session, ServiceError> {
        self.session
            .state()
            .current()
            .await
            .ok_or(ServiceError::NotSignedIn)
    }

    async fn latest(&self, cursor: MonthCursor) -> Result<ExpensesResponse, anyhow::Error> {
        let mut latest = None;
        let mut phases = pin!(self.loader.load(cursor));
        while let Some(phase) = phases.next().await {
            match phase {
                LoadPhase::Cached(response) | LoadPhase::Fresh(response) => {
                    latest = Some(response)
                }
                LoadPhase::Failed(e) => return Err(e.into()),
            }
        }
        latest.ok_or_else(|| anyhow!("No data for {}", cursor))
    }

    async fn located(&self, expense: &Expense) -> Expense {
        match &self.enricher {
            Some(enricher) => enricher.enrich(expense).await,
            None => expense.clone(),
        }
    }
}

pub async fn run(app: &App, command: Command) -> Result<(), anyhow::Error> {
    let today = Local::now().date_naive();

    match command {
        Command::Login { email, password } => {
            let session = app.session.login(Credentials { email, password }).await?;
            println!("Signed in as {}", session.user.email);
            preload(app, today).await?;
        }
        Command::Register {
            email,
            password,
            confirm_password,
        } => {
            let session = app
                .session
                .register(Registration {
                    email,
                    password,
                    confirm_password,
                })
                .await?;
            println!("Account created, signed in as {}", session.user.email);
            preload(app, today).await?;
        }
        Command::Logout => {
            app.session.logout().await?;
            println!("Signed out.");
        }
        Command::Whoami => match app.session.state().current().await {
            Some(session) => println!("{} (id {})", session.user.email, session.user.id),
            None => println!("Not signed in."),
        },
        Command::Expenses { month } => {
            app.require_session().await?;
            let cursor = month.resolve(today)?;
            show_expenses(app, cursor).await?;
        }
        Command::Calendar { month } => {
            app.require_session().await?;
            let cursor = month.resolve(today)?;
            let response = app.latest(cursor).await?;
            print_calendar(cursor, &response);
        }
        Command::Detail { id, month } => {
            app.require_session().await?;
            let cursor = month.resolve(today)?;
            let response = app.latest(cursor).await?;
            let Some(expense) = response.find(&id) else {
                bail!("Expense {} not found in {}", id, cursor);
            };
            print_detail(&app.located(expense).await);
        }
        Command::Cookie(command) => {
            app.require_session().await?;
            match command {
                CookieCommand::Get => print_optional("Cookie", app.account.cookie().await?),
                CookieCommand::Set { value } => {
                    app.account.save_cookie(&value).await?;
                    println!("Cookie saved.");
                }
                CookieCommand::Test => {
                    let result = app.account.test_cookie().await?;
                    let verdict = if result.success { "valid" } else { "invalid" };
                    println!(
                        "Cookie is {}{}",
                        verdict,
                        result
                            .message
                            .map(|m| format!(": {}", m))
                            .unwrap_or_default()
                    );
                }
            }
        }
        Command::Card(command) => {
            app.require_session().await?;
            match command {
                CardCommand::Get => print_optional("Card", app.account.card().await?),
                CardCommand::Set { value } => {
                    app.account.save_card(&value).await?;
                    println!("Card saved.");
                }
            }
        }
        Command::Push(command) => {
            app.require_session().await?;
            match command {
                PushCommand::Register { token } => {
                    app.account.register_push_token(&token).await?;
                    println!("Push token registered.");
                }
                PushCommand::Unregister { token } => {
                    app.account.unregister_push_token(&token).await?;
                    println!("Push token removed.");
                }
                PushCommand::Show => print_optional("Push token", app.account.push_token().await?),
            }
        }
        Command::Notify { payload, month } => {
            app.require_session().await?;
            let cursor = month.resolve(today)?;
            replay_notification(app, cursor, &payload).await?;
        }
        Command::Speedtest(command) => {
            app.require_session().await?;
            match command {
                SpeedtestCommand::Summary => {
                    let summary = app.account.speedtest_summary().await?;
                    if let Some(latest) = summary.latest {
                        println!(
                            "Latest  {}  down {}  up {}  ping {:.0} ms",
                            latest.timestamp,
                            format_speed(latest.download_speed),
                            format_speed(latest.upload_speed),
                            latest.ping
                        );
                    }
                    if let Some(average) = summary.average {
                        println!(
                            "Average down {}  up {}  ping {:.0} ms",
                            format_speed(average.download_speed),
                            format_speed(average.upload_speed),
                            average.ping
                        );
                    }
                    if let Some(total) = summary.total_tests {
                        println!("{} tests recorded", total);
                    }
                }
                SpeedtestCommand::History { page, page_size } => {
                    let history = app.account.speedtest_history(page, page_size).await?;
                    for result in &history.results {
                        println!(
                            "{}  down {:>12}  up {:>12}  ping {:>4.0} ms",
                            result.timestamp,
                            format_speed(result.download_speed),
                            format_speed(result.upload_speed),
                            result.ping
                        );
                    }
                    println!(
                        "Page {} of {}",
                        history.pagination.page, history.pagination.total_pages
                    );
                }
            }
        }
        Command::Preload => {
            app.require_session().await?;
            preload(app, today).await?;
        }
    }

    Ok(())
}

async fn preload(app: &App, today: NaiveDate) -> Result<(), anyhow::Error> {
    let report = app
        .loader
        .preload_recent(today, app.settings.preload.months)
        .await?;
    if report.skipped {
        println!("Recent months already cached.");
    } else {
        println!(
            "Cached {} months ({} failed).",
            report.loaded, report.failed
        );
    }
    Ok(())
}

async fn show_expenses(app: &App, cursor: MonthCursor) -> Result<(), anyhow::Error> {
    let mut shown: Option<ExpensesResponse> = None;
    let mut phases = pin!(app.loader.load(cursor));

    while let Some(phase) = phases.next().await {
        match phase {
            LoadPhase::Cached(response) => {
                print_month(cursor, &response, app.settings.budget, " (cached)");
                shown = Some(response);
            }
            LoadPhase::Fresh(response) => {
                if shown.as_ref() == Some(&response) {
                    log::debug!("Cached data for {} is up to date.", cursor);
                } else {
                    print_month(cursor, &response, app.settings.budget, "");
                }
                shown = Some(response);
            }
            LoadPhase::Failed(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn replay_notification(
    app: &App,
    cursor: MonthCursor,
    payload: &Path,
) -> Result<(), anyhow::Error> {
    let raw = tokio::fs::read_to_string(payload)
        .await
        .with_context(|| format!("Could not read {}", payload.display()))?;
    let notification = PushNotification::from_value(serde_json::from_str(&raw)?)?;

    let mut loaded = app.loader.cached(cursor).await.map(|r| r.gastos).unwrap_or_default();

    // Deliver through the hub the same way a push transport would.
    let hub = NotificationHub::new();
    let (delivered_tx, mut delivered_rx) = mpsc::channel(8);
    let subscription = hub.subscribe(move |n: &PushNotification| {
        if delivered_tx.try_send(n.clone()).is_err() {
            log::warn!("Dropping notification, receiver is busy.");
        }
    });
    let (push_tx, push_rx) = mpsc::channel(1);
    push_tx.send(notification).await?;
    drop(push_tx);
    listen(&hub, push_rx).await;
    subscription.unsubscribe();

    let mut coordinator = HighlightCoordinator::new(app.settings.timings());

    while let Some(notification) = delivered_rx.recv().await {
        let Some(outcome) = coordinator.on_notification(&notification, &loaded, Instant::now())
        else {
            println!("Notification carries no expense id.");
            continue;
        };

        println!("Highlighting expense {}", outcome.expense_id);
        if let Some(status) = &outcome.status {
            println!("Reported status: {}", status.as_str());
        }

        match outcome.action {
            ListAction::ScrollTo(index) => println!("Scrolling to row {}", index + 1),
            ListAction::Reload => {
                println!("Not in the list yet, reloading {}", cursor);
                match app.loader.refresh(cursor).await {
                    Ok(response) => loaded = response.gastos,
                    Err(e) => log::warn!("Reload after notification failed: {}", e),
                }
                if let Some(index) = coordinator.on_data_loaded(&loaded) {
                    println!("Scrolling to row {}", index + 1);
                }
            }
        }

        loop {
            if let Some(expense) = coordinator.poll(&loaded, Instant::now()) {
                print_detail(&app.located(&expense).await);
                break;
            }
            match coordinator.next_deadline(Instant::now()) {
                Some(deadline) => sleep_until(deadline).await,
                None => {
                    println!("Expense {} is not in {}.", outcome.expense_id, cursor);
                    coordinator.clear();
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_optional(label: &str, value: Option<String>) {
    match value {
        Some(value) => println!("{}: {}", label, value),
        None => println!("{}: not set", label),
    }
}

fn print_month(cursor: MonthCursor, response: &ExpensesResponse, pools: BudgetPools, tag: &str) {
    println!("{}: {} movements{}", cursor, response.gastos.len(), tag);
    for expense in &response.gastos {
        let day = expense
            .day()
            .map(|d| d.format("%d/%m").to_string())
            .unwrap_or_else(|| "--/--".to_string());
        println!(
            "  {}  {:<30} {:>10.2} {:<3}  {}",
            day,
            truncate(&expense.merchant, 30),
            expense.amount,
            expense.currency,
            expense.display_status().label()
        );
    }

    let summary = summarize(&response.gastos, pools);
    let marker = match summary.level {
        BudgetLevel::Green => "ok",
        BudgetLevel::Amber => "close to limit",
        BudgetLevel::Red => "over budget",
    };
    println!(
        "Spent {:.2} of {:.2} ({:.0}%, {}). Remaining {:.2}",
        summary.spent, pools.company, summary.percentage, marker, summary.remaining
    );
    if summary.payroll_used > 0.0 {
        println!(
            "Payroll pool: {:.2} of {:.2} used",
            summary.payroll_used, pools.payroll
        );
    }
}

fn print_calendar(cursor: MonthCursor, response: &ExpensesResponse) {
    println!("{}", cursor);
    for (day, summary) in daily_totals(&response.gastos) {
        println!(
            "  {}  {:>3} movements  {:>10.2}",
            day.format("%a %d"),
            summary.expenses.len(),
            summary.total_spent
        );
    }
}

fn print_detail(expense: &Expense) {
    println!("{}", expense.merchant);
    println!("  Id:       {}", expense.id);
    println!("  Amount:   {:.2} {}", expense.amount, expense.currency);
    println!("  Date:     {}", expense.date);
    println!("  Status:   {}", expense.display_status().label());
    if let Some(location) = &expense.location {
        println!("  Location: {}", location);
    }
    if let Some(address) = &expense.address {
        println!("  Address:  {}", address);
    }
    if let Some(url) = expense.map_url() {
        println!("  Map:      {}", url);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
