// file: src/utils/logging.rs
// description: tracing subscriber setup and colored status lines for the cli

use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// HTTP internals stay at warn unless RUST_LOG asks for more.
const QUIET_TARGETS: &[&str] = &["hyper_util", "reqwest", "rustls", "h2"];

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let directives = std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

pub fn init_logger(colored_output: bool, verbose: bool) {
    colored::control::set_override(colored_output);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    let fmt_layer = fmt::layer()
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_ansi(colored_output);

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}
