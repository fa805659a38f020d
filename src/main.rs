use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use gcp_keyprobe::catalog::{get_all_service_keys, get_service, list_services, Category, ServiceDescriptor};
use gcp_keyprobe::config::Config;
use gcp_keyprobe::probe::http::ProbeHttpClient;
use gcp_keyprobe::probe::KeyProber;
use gcp_keyprobe::report::{render_header, TextOptions};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXAMPLES: &str = "\
Examples:
  gcp-keyprobe YOUR_API_KEY
  gcp-keyprobe YOUR_API_KEY --paid-only
  gcp-keyprobe YOUR_API_KEY --json
  GOOGLE_API_KEY=YOUR_API_KEY gcp-keyprobe --service maps-geocoding -v";

/// Check which Google services are accessible with an API key
#[derive(Parser, Debug)]
#[command(name = "gcp-keyprobe", version, about, long_about = None, after_help = EXAMPLES)]
struct Args {
    /// Google API key to test
    #[arg(env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Which services to probe
    #[arg(long, value_enum, default_value = "all")]
    category: CategoryArg,

    /// Only test paid services (same as --category paid)
    #[arg(long, conflicts_with = "category")]
    paid_only: bool,

    /// Only probe these services (repeatable, see --list)
    #[arg(long = "service", value_name = "KEY")]
    services: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output results as JSON (same as --format json)
    #[arg(long, conflicts_with = "format")]
    json: bool,

    /// Show error messages and request/response details for every service
    #[arg(short, long)]
    verbose: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = parse_timeout)]
    timeout: Option<f64>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// List the service catalog and exit
    #[arg(long)]
    list: bool,

    /// Log level for debugging (written to the log file)
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    All,
    Paid,
    Free,
}

impl CategoryArg {
    fn to_filter(self) -> Option<Category> {
        match self {
            CategoryArg::All => None,
            CategoryArg::Paid => Some(Category::Paid),
            CategoryArg::Free => Some(Category::Free),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn parse_timeout(s: &str) -> std::result::Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if secs.is_nan() || secs <= 0.0 {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs)
        .map(|_| secs)
        .map_err(|_| format!("timeout of {} seconds is too large", s))
}

/// `--log-level` sets the crate's base level. Directives from `RUST_LOG` are
/// layered on top, so they can raise dependency levels or override ours.
fn build_filter(directive: &str, rust_log: Option<&str>) -> EnvFilter {
    let mut filter = EnvFilter::new(format!("gcp_keyprobe={}", directive));
    for extra in rust_log.unwrap_or_default().split(',').map(str::trim) {
        if extra.is_empty() {
            continue;
        }
        match extra.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(e) => eprintln!("Warning: ignoring RUST_LOG directive '{}': {}", extra, e),
        }
    }
    filter
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let directive = level.as_directive()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(directive, rust_log.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcp-keyprobe started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcp-keyprobe").join("gcp-keyprobe.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcp-keyprobe").join("gcp-keyprobe.log");
    }
    PathBuf::from("gcp-keyprobe.log")
}

/// Resolve category and `--service` selection to catalog entries, catalog order kept
fn select_services(args: &Args) -> Result<Vec<&'static ServiceDescriptor>> {
    let filter = if args.paid_only {
        Some(Category::Paid)
    } else {
        args.category.to_filter()
    };

    let mut services = list_services(filter);

    if !args.services.is_empty() {
        if let Some(unknown) = args.services.iter().find(|key| get_service(key).is_none()) {
            bail!(
                "Unknown service '{}'. Known services: {}",
                unknown,
                get_all_service_keys().join(", ")
            );
        }
        services.retain(|s| args.services.contains(&s.key));
    }

    Ok(services)
}

fn print_catalog() {
    for service in list_services(None) {
        println!(
            "{:<24} {:<5} {} ({})",
            service.key, service.category, service.name, service.cost_info
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if args.list {
        print_catalog();
        return Ok(());
    }

    let Some(api_key) = args.api_key.as_deref() else {
        bail!("No API key supplied. Pass it as an argument or set GOOGLE_API_KEY");
    };

    let services = select_services(&args)?;
    if services.is_empty() {
        bail!("No services match the selected filters");
    }

    let config = Config::load();
    let timeout = config.effective_timeout(args.timeout);
    let http = ProbeHttpClient::new(timeout, &config.effective_user_agent())?;
    let prober = KeyProber::new(http).verbose(args.verbose);

    let json = args.json || args.format == OutputFormat::Json;
    let color = config.effective_color(args.no_color, std::io::stdout().is_terminal());

    tracing::info!(
        "Probing {} services with timeout {:?}",
        services.len(),
        timeout
    );

    if !json {
        print!("{}", render_header(services.len()));
    }

    let report = prober.run_all(&services, api_key).await;

    if json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!(
            "{}",
            report.render_text(TextOptions {
                verbose: args.verbose,
                color,
            })
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_paid_only_selects_paid_services() {
        let args = parse(&["gcp-keyprobe", "k", "--paid-only"]);
        let services = select_services(&args).unwrap();
        assert!(!services.is_empty());
        assert!(services.iter().all(|s| s.category == Category::Paid));
    }

    #[test]
    fn test_category_free() {
        let args = parse(&["gcp-keyprobe", "k", "--category", "free"]);
        let services = select_services(&args).unwrap();
        assert!(services.iter().any(|s| s.key == "youtube-data"));
        assert!(services.iter().all(|s| s.category == Category::Free));
    }

    #[test]
    fn test_service_selection_keeps_catalog_order() {
        let args = parse(&[
            "gcp-keyprobe",
            "k",
            "--service",
            "youtube-data",
            "--service",
            "maps-geocoding",
        ]);
        let keys: Vec<&str> = select_services(&args)
            .unwrap()
            .into_iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys, vec!["maps-geocoding", "youtube-data"]);
    }

    #[test]
    fn test_unknown_service_is_usage_error() {
        let args = parse(&["gcp-keyprobe", "k", "--service", "nope"]);
        let err = select_services(&args).unwrap_err();
        assert!(err.to_string().contains("Unknown service 'nope'"));
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Args::try_parse_from(["gcp-keyprobe", "k", "--paid-only", "--category", "free"]).is_err());
        assert!(Args::try_parse_from(["gcp-keyprobe", "k", "--json", "--format", "text"]).is_err());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        assert!(Args::try_parse_from(["gcp-keyprobe", "k", "--timeout", "0"]).is_err());
        assert!(Args::try_parse_from(["gcp-keyprobe", "k", "--timeout", "abc"]).is_err());
        assert!(Args::try_parse_from(["gcp-keyprobe", "k", "--timeout", "inf"]).is_err());
        assert_eq!(parse(&["gcp-keyprobe", "k", "--timeout", "2.5"]).timeout, Some(2.5));
    }

    #[test]
    fn test_log_level_is_base_with_rust_log_on_top() {
        let filter = build_filter("debug", Some("hyper=warn, ,reqwest=info")).to_string();
        assert!(filter.contains("gcp_keyprobe=debug"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=info"));

        let filter = build_filter("warn", None).to_string();
        assert!(filter.contains("gcp_keyprobe=warn"));
        assert!(!filter.contains("hyper"));
    }

    #[test]
    fn test_huge_timeout_is_usage_error() {
        let err = Args::try_parse_from(["gcp-keyprobe", "k", "--timeout", "1e30"]).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
