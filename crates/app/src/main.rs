use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use edu_core::model::{DEFAULT_NOTIFICATION_DURATION, NotifyOptions, Severity};
use services::supabase::settings_from_env;
use services::{AppServices, Clock, SupabaseProgressSource, Timer, TokioTimer};
use storage::repository::{InMemoryProgressSource, ProgressSource};
use tokio::runtime::Handle;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidAmount { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidAmount { raw } => write!(f, "invalid --add value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- stars      [--db <sqlite_url>] [--add <n>]");
    eprintln!("  cargo run -p app -- progress   --student <id>");
    eprintln!("  cargo run -p app -- toast-demo");
    eprintln!();
    eprintln!("Global flags:");
    eprintln!("  --verbose, -v   debug logging (RUST_LOG overrides)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EDU_DB_URL, EDU_SUPABASE_URL, EDU_SUPABASE_ANON_KEY, EDU_TOAST_DURATION_MS");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Stars { add: Option<i64> },
    Progress { student: String },
    ToastDemo,
}

struct Args {
    db_url: String,
    verbose: bool,
    command: Command,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = std::env::var("EDU_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://edu.sqlite3".into(), normalize_sqlite_url);
        let mut verbose = false;
        let mut add = None;
        let mut student = None;

        let mut args = argv.into_iter();
        let sub = match args.next() {
            None => return Ok(None),
            Some(arg) if arg == "--help" || arg == "-h" => return Ok(None),
            Some(arg) => arg,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--add" => {
                    let value = require_value(&mut args, "--add")?;
                    let parsed: i64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidAmount { raw: value.clone() })?;
                    add = Some(parsed);
                }
                "--student" => student = Some(require_value(&mut args, "--student")?),
                "--verbose" | "-v" => verbose = true,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match sub.as_str() {
            "stars" => Command::Stars { add },
            "progress" => Command::Progress {
                student: student.ok_or(ArgsError::MissingFlag { flag: "--student" })?,
            },
            "toast-demo" => Command::ToastDemo,
            _ => return Err(ArgsError::UnknownArg(sub)),
        };

        Ok(Some(Self {
            db_url,
            verbose,
            command,
        }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn toast_duration_from_env() -> Duration {
    std::env::var("EDU_TOAST_DURATION_MS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map_or(DEFAULT_NOTIFICATION_DURATION, Duration::from_millis)
}

async fn build_services(
    db_url: &str,
    source: Arc<dyn ProgressSource>,
) -> Result<AppServices, Box<dyn std::error::Error>> {
    // Open + migrate SQLite here so the library crates never touch the filesystem directly.
    prepare_sqlite_file(db_url)?;
    tracing::debug!(db_url, "opening storage");
    let timer: Arc<dyn Timer> = Arc::new(TokioTimer::new(Handle::current()));
    let services = AppServices::new_sqlite(
        db_url,
        source,
        timer,
        Clock::system(),
        toast_duration_from_env(),
    )
    .await?;
    Ok(services)
}

async fn run_stars(services: &AppServices, add: Option<i64>) {
    let total = match add {
        Some(amount) => services.award_stars(amount).await,
        None => services.rewards().read().await,
    };
    println!("stars: {total}");
    for toast in services.notifications().list() {
        println!("  [{}] {}", severity_label(toast.severity()), toast.title());
    }
}

async fn run_progress(
    services: &AppServices,
    student: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = services.progress().fetch_snapshot(student).await?;
    println!(
        "student {} (overall {}%, fetched {})",
        snapshot.student_id(),
        snapshot.overall_percent(),
        snapshot.fetched_at().to_rfc3339()
    );
    println!("badges:");
    for badge in snapshot.badges() {
        println!("  {} ({})", badge.name(), badge.earned_at().date_naive());
    }
    println!("subjects:");
    for entry in snapshot.subject_progress() {
        let score = entry
            .quiz_score()
            .map_or_else(|| "-".to_string(), |score| format!("{score}%"));
        println!(
            "  {:<16} {:>3}/{:<3} {:>3}%  quiz {score}",
            entry.subject(),
            entry.completed_lessons(),
            entry.total_lessons(),
            entry.percent_complete(),
        );
    }
    Ok(())
}

async fn run_toast_demo(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let queue = services.notifications();
    let mut rx = queue.subscribe();

    queue.notify(NotifyOptions::success("Lesson complete").with_description("Fractions, part 2"));
    queue.notify(NotifyOptions::new("New badge").with_duration_ms(1_500));
    queue.notify(NotifyOptions::destructive("Could not refresh progress").with_duration_ms(0));

    loop {
        let items = rx.borrow_and_update().clone();
        let line: Vec<String> = items
            .iter()
            .map(|n| {
                let marker = if n.is_visible() { "+" } else { "-" };
                format!("{marker}{}", n.title())
            })
            .collect();
        println!("toasts: [{}]", line.join(", "));
        if items.is_empty() {
            break;
        }
        rx.changed().await?;
    }
    Ok(())
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Default => "info",
        Severity::Destructive => "error",
        Severity::Success => "success",
    }
}

fn progress_source() -> Result<Arc<dyn ProgressSource>, Box<dyn std::error::Error>> {
    let settings = settings_from_env()?;
    Ok(Arc::new(SupabaseProgressSource::new(settings)?))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match Args::parse(argv) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    init_tracing(parsed.verbose);

    match &parsed.command {
        Command::Stars { add } => {
            let services =
                build_services(&parsed.db_url, Arc::new(InMemoryProgressSource::new())).await?;
            run_stars(&services, *add).await;
        }
        Command::Progress { student } => {
            let services = build_services(&parsed.db_url, progress_source()?).await?;
            run_progress(&services, student).await?;
        }
        Command::ToastDemo => {
            let services =
                build_services(&parsed.db_url, Arc::new(InMemoryProgressSource::new())).await?;
            run_toast_demo(&services).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
