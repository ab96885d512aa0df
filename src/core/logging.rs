//! Logging and Terminal Output
//!
//! Library code logs through the `log` facade. Binaries call [`init`] (or
//! [`init_quiet`] for interactive output) to install a `tracing` registry
//! with a daily-rolling JSON file layer, and `log` records are bridged into
//! it. The console helpers render flow phases for the CLI driver.

use std::fs;
use std::io;
use std::path::PathBuf;

use console::{style, Color, Term};
use once_cell::sync::Lazy;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use crate::core::flow::{PhaseState, SupportResource};

const LOG_FILE: &str = "genflow.log";

static SUPPORTS_UNICODE: Lazy<bool> = Lazy::new(|| {
    std::env::var("TERM")
        .map(|t| !t.contains("dumb"))
        .unwrap_or(true)
        && std::env::var("LANG")
            .map(|l| l.contains("UTF-8") || l.contains("utf8"))
            .unwrap_or(true)
});

// ============================================================================
// Logging Initialization
// ============================================================================

/// Directory the JSON log files are written to.
pub fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("genflow").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

fn file_writer() -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard, PathBuf) {
    let log_dir = log_dir();
    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create logs directory: {}", e);
        }
    }

    // Daily rotation, no size limit
    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    (non_blocking, guard, log_dir)
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn bridge_log_records() {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize LogTracer: {}", e);
    }
}

/// Initialize logging: JSON file layer plus a pretty stdout layer.
///
/// Returns a `WorkerGuard` which must be kept alive so buffered records are
/// flushed on shutdown.
pub fn init() -> WorkerGuard {
    let (non_blocking, guard, log_dir) = file_writer();
    let filter = env_filter("debug");

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(filter.clone());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .pretty()
        .with_filter(filter);

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
    bridge_log_records();

    log::info!(
        "Logging initialized. Writing to: {:?} (daily rolling)",
        log_dir.join(LOG_FILE)
    );
    guard
}

/// Identical to [`init`] but without the stdout layer, so log records never
/// interleave with revealed text on the terminal.
pub fn init_quiet() -> WorkerGuard {
    let (non_blocking, guard, log_dir) = file_writer();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_filter(env_filter("info"));

    let subscriber = tracing_subscriber::registry().with(file_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
    bridge_log_records();

    log::info!("Logging to {:?}", log_dir.join(LOG_FILE));
    guard
}

// ============================================================================
// Console Output Utilities
// ============================================================================

fn phase_color(phase: &PhaseState) -> Color {
    match phase {
        PhaseState::Completed { .. } => Color::Green,
        PhaseState::Failed { .. } => Color::Red,
        PhaseState::Interrupted { .. } => Color::Magenta,
        PhaseState::Cancelled => Color::Yellow,
        PhaseState::Generating { .. } | PhaseState::Revealing { .. } => Color::Cyan,
        _ => Color::Color256(243),
    }
}

/// Short styled label for a phase, e.g. `[generating 2]`.
pub fn phase_label(phase: &PhaseState) -> String {
    let label = match phase {
        PhaseState::Generating { attempt } => format!("[{} {}]", phase.name(), attempt),
        PhaseState::Revealing { revealed, total } => {
            format!("[{} {}/{}]", phase.name(), revealed, total)
        }
        other => format!("[{}]", other.name()),
    };
    format!("{}", style(label).fg(phase_color(phase)).bold())
}

/// Print a bordered panel with a title and content lines.
pub fn print_panel(title: &str, content: &str) {
    let width = (Term::stdout().size().1 as usize).clamp(20, 80);
    let unicode = *SUPPORTS_UNICODE;

    let border = if unicode { "─" } else { "-" };
    let (tl, tr, bl, br, side) = if unicode {
        ("╭", "╮", "╰", "╯", "│")
    } else {
        ("+", "+", "+", "+", "|")
    };

    let title = format!(" {} ", title);
    let top_len = width
        .saturating_sub(title.chars().count())
        .saturating_sub(2)
        .max(1);
    println!(
        "{}{}{}{}",
        style(tl).magenta(),
        style(&title).magenta().bold(),
        style(border.repeat(top_len)).magenta(),
        style(tr).magenta()
    );

    let content_width = width.saturating_sub(4).max(1);
    for line in content.lines() {
        println!(
            "{} {:width$} {}",
            style(side).magenta(),
            line,
            style(side).magenta(),
            width = content_width
        );
    }
    println!(
        "{}{}{}",
        style(bl).magenta(),
        style(border.repeat(width.saturating_sub(2).max(1))).magenta(),
        style(br).magenta()
    );
}

/// Render support resources, one per line.
pub fn format_resources(resources: &[SupportResource]) -> String {
    resources
        .iter()
        .map(|r| format!("{}: {} ({})", r.name, r.contact, r.availability))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_success(message: &str) {
    let prefix = if *SUPPORTS_UNICODE { "✔" } else { "[OK]" };
    println!("{} {}", style(prefix).green(), style(message).green());
}

pub fn print_error(message: &str) {
    let prefix = if *SUPPORTS_UNICODE { "✖" } else { "[ERROR]" };
    println!("{} {}", style(prefix).red(), style(message).red().bold());
}

pub fn print_warning(message: &str) {
    let prefix = if *SUPPORTS_UNICODE { "⚠" } else { "[WARN]" };
    println!("{} {}", style(prefix).yellow(), style(message).yellow().bold());
}

pub fn print_info(message: &str) {
    let prefix = if *SUPPORTS_UNICODE { "ℹ" } else { "[INFO]" };
    println!("{} {}", style(prefix).blue(), style(message).blue());
}
