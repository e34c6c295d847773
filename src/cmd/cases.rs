use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;

use fogbugz_alerts::context::AppContext;
use fogbugz_alerts::domain::case::{ALERT_HEADER_FIELD, Case};
use fogbugz_alerts::domain::params::RequestParams;
use fogbugz_alerts::error::{AppError, AppResult};
use fogbugz_alerts::workflow::cases::{self, ForwardMessage};

#[derive(Args, Debug, Clone)]
pub struct AlertsArgs {
    /// Only alerts flagged for a link in the catalogue tab.
    #[arg(long)]
    pub link_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// FogBugz search query.
    pub query: String,
    /// Comma-separated column list (defaults to every case field).
    #[arg(long)]
    pub cols: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Case number.
    pub id: u64,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long, conflicts_with = "project_id")]
    pub project: Option<String>,
    #[arg(long)]
    pub project_id: Option<u64>,
    #[arg(long, conflicts_with = "category_id")]
    pub category: Option<String>,
    #[arg(long)]
    pub category_id: Option<u64>,
    #[arg(long)]
    pub priority_id: Option<u64>,
    #[arg(long)]
    pub mailbox_id: Option<u64>,
    #[arg(long)]
    pub customer_email: Option<String>,
    /// Opening event text.
    #[arg(long)]
    pub body: Option<String>,
    /// Comma-separated tags.
    #[arg(long)]
    pub tags: Option<String>,
    /// Attach a file (repeatable).
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ForwardArgs {
    /// Case number.
    pub id: u64,
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub body: String,
    /// Recipient; defaults to the case's customer email.
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub cc: Option<String>,
    #[arg(long)]
    pub bcc: Option<String>,
    /// Attach a file (repeatable).
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
    /// One of: new, search, forward.
    pub command: String,
    /// Parameters as key=value, using semantic names (e.g. projectId=4).
    pub params: Vec<String>,
}

pub async fn alerts(ctx: &AppContext, args: AlertsArgs) -> AppResult<()> {
    let alerts = cases::active_alerts(ctx, args.link_only).await?;
    if alerts.is_empty() {
        println!("No active alerts.");
    }
    for case in &alerts {
        print!("{}", render_alert(case));
    }
    Ok(())
}

pub async fn search(ctx: &AppContext, args: SearchArgs) -> AppResult<()> {
    let found = cases::search(ctx, &args.query, args.cols.as_deref()).await?;
    if found.is_empty() {
        println!("No matching cases.");
    }
    for case in &found {
        println!("{}", render_line(case));
    }
    Ok(())
}

pub async fn show(ctx: &AppContext, args: ShowArgs) -> AppResult<()> {
    match cases::show(ctx, args.id).await? {
        Some(case) => print!("{}", render_detail(&case)),
        None => println!("Case {} not found.", args.id),
    }
    Ok(())
}

pub async fn create(ctx: &AppContext, args: CreateArgs) -> AppResult<()> {
    let case = cases::create(ctx, create_params(args)).await?;
    println!("Case {} created: {}", case.id(), case.title());
    Ok(())
}

pub async fn forward(ctx: &AppContext, args: ForwardArgs) -> AppResult<()> {
    let id = args.id;
    let message = ForwardMessage {
        to: args.to,
        cc: args.cc,
        bcc: args.bcc,
        subject: args.subject,
        body: args.body,
        files: args.files,
    };
    cases::forward(ctx, id, message).await?;
    println!("Message forwarded on case {id}.");
    Ok(())
}

pub async fn call(ctx: &AppContext, args: CallArgs) -> AppResult<()> {
    let params = parse_pairs(&args.params)?;
    let body = cases::call(ctx, &args.command, params).await?;
    println!("{body}");
    Ok(())
}

fn create_params(args: CreateArgs) -> RequestParams {
    let mut params = RequestParams::new().field("title", args.title);
    let optional = [
        ("project", args.project),
        ("projectId", args.project_id.map(|id| id.to_string())),
        ("category", args.category),
        ("categoryId", args.category_id.map(|id| id.to_string())),
        ("priorityId", args.priority_id.map(|id| id.to_string())),
        ("mailboxId", args.mailbox_id.map(|id| id.to_string())),
        ("customerEmail", args.customer_email),
        ("event", args.body),
        ("tags", args.tags),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            params.insert(key, value);
        }
    }
    params.files(args.files)
}

fn parse_pairs(pairs: &[String]) -> AppResult<RequestParams> {
    let mut params = RequestParams::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            AppError::Configuration(format!("expected key=value, got {pair:?}"))
        })?;
        params.insert(key.trim(), value);
    }
    Ok(params)
}

fn render_line(case: &Case) -> String {
    let state = if case.is_open() { "open" } else { "closed" };
    format!(
        "#{:<6} {:<8} {:<20} {}",
        case.id(),
        state,
        case.status(),
        case.title()
    )
}

fn render_alert(case: &Case) -> String {
    let header = case
        .custom_field(ALERT_HEADER_FIELD)
        .filter(|header| !header.is_empty())
        .unwrap_or(case.title());
    let mut out = format!(
        "[{}] {} (#{}, opened {})\n",
        case.alert_class().as_str(),
        header,
        case.id(),
        case.opened().format("%Y-%m-%d %H:%M")
    );
    if let Some(summary) = case.summary() {
        let _ = writeln!(out, "    {summary}");
    }
    out
}

fn render_detail(case: &Case) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Case {}: {}", case.id(), case.title());
    let _ = writeln!(out, "Status: {}", case.status());
    if let Some(project) = case.project() {
        let _ = writeln!(out, "Project: {} ({})", project.name, project.id);
    }
    if let Some(category) = case.category() {
        let _ = writeln!(out, "Category: {}", category.name);
    }
    if let Some(priority) = case.priority() {
        let _ = writeln!(out, "Priority: {} {}", priority.id, priority.name);
    }
    if !case.customer_email().is_empty() {
        let _ = writeln!(out, "Requester: {}", case.customer_email());
    }
    let _ = writeln!(out, "Opened: {}", case.opened().format("%Y-%m-%d %H:%M"));
    if let Some(closed) = case.closed() {
        let _ = writeln!(out, "Closed: {}", closed.format("%Y-%m-%d %H:%M"));
    }
    if !case.tags().is_empty() {
        let _ = writeln!(out, "Tags: {}", case.tags().join(", "));
    }
    if let Some(summary) = case.summary() {
        let _ = writeln!(out, "\n{summary}");
    }

    let history = case.filtered_events(None);
    if !history.is_empty() {
        let _ = writeln!(out, "\nHistory:");
        for event in history {
            let date = event
                .date
                .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "----------------".to_string());
            let _ = writeln!(
                out,
                "  {} {}: {}",
                date,
                event.action,
                event.changes.trim()
            );
        }
    }
    out
}
