use billdash::api::{ApiError, CompanySize, OptionKind, SelectOption};
use billdash::app::Session;
use billdash::config::Config;
use billdash::preferences::{Channel, PreferenceRecord};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "billdash")]
#[command(about = "Billing dashboard data access from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/billdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List a user-settings option family
  Options {
    #[arg(value_enum)]
    kind: OptionKind,
  },
  /// List, look up, or search company sizes
  CompanySizes {
    /// Show a single company size
    #[arg(long, conflicts_with = "search")]
    code: Option<String>,
    /// Search company sizes
    #[arg(long)]
    search: Option<String>,
  },
  /// Notification preferences
  Notifications {
    #[command(subcommand)]
    action: NotificationsCommand,
  },
}

#[derive(Subcommand, Debug)]
enum NotificationsCommand {
  /// Show every notification type and its channels
  List,
  /// Turn one channel of one notification type on or off
  Set {
    /// Notification type, e.g. billing
    notification_type: String,
    /// email, in-app, push or sms
    channel: Channel,
    state: Toggle,
  },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
  On,
  Off,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let session = Session::new(&config)?;

  match args.command {
    Command::Options { kind } => {
      let options = session.reference.options(kind).await.map_err(report)?;
      print_options(&options);
    }
    Command::CompanySizes { code, search } => {
      let sizes = match (code, search) {
        (Some(code), _) => vec![session.reference.company_size(&code).await.map_err(report)?],
        (None, Some(query)) => session
          .reference
          .search_company_sizes(&query)
          .await
          .map_err(report)?,
        (None, None) => session.reference.company_sizes().await.map_err(report)?,
      };
      print_company_sizes(&sizes);
    }
    Command::Notifications { action } => {
      // Start from what the backend has so untouched channels are accurate
      let records = session.preferences.refresh().await.map_err(report)?;

      match action {
        NotificationsCommand::List => {
          for record in records.values() {
            print_record(record);
          }
        }
        NotificationsCommand::Set {
          notification_type,
          channel,
          state,
        } => {
          let enabled = matches!(state, Toggle::On);
          let record = session
            .preferences
            .try_set_channel(&notification_type, channel, enabled)
            .await
            .map_err(report)?;
          print_record(&record);
        }
      }
    }
  }

  session.logout();
  Ok(())
}

/// Log to a daily file so command output stays clean. Filter with RUST_LOG.
fn init_logging() -> Result<Option<WorkerGuard>> {
  let Some(log_dir) = dirs::data_dir().map(|d| d.join("billdash").join("logs")) else {
    return Ok(None);
  };
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "billdash.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("billdash=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}

/// Turn a classified error into a report, keeping per-field detail.
fn report(err: ApiError) -> color_eyre::Report {
  let mut message = format!("{} ({} error", err.message, err.kind);
  if err.status != 0 {
    message.push_str(&format!(", status {}", err.status));
  }
  message.push(')');

  if let Some(fields) = &err.field_errors {
    for (field, errors) in fields {
      message.push_str(&format!("\n  {}: {}", field, errors.join("; ")));
    }
  }

  eyre!(message)
}

fn print_options(options: &[SelectOption]) {
  let width = options.iter().map(|o| o.value.len()).max().unwrap_or(0);
  for option in options {
    println!("{:<width$}  {}", option.value, option.label, width = width);
  }
}

fn print_company_sizes(sizes: &[CompanySize]) {
  for size in sizes {
    let range = match (size.min_employees, size.max_employees) {
      (Some(min), Some(max)) => format!("{}-{}", min, max),
      (Some(min), None) => format!("{}+", min),
      (None, Some(max)) => format!("up to {}", max),
      (None, None) => String::new(),
    };
    println!("{:<12} {:<24} {}", size.code, size.label, range);
  }
}

fn print_record(record: &PreferenceRecord) {
  let channels: Vec<String> = Channel::ALL
    .iter()
    .map(|&c| format!("{}={}", c, if record.channel(c) { "on" } else { "off" }))
    .collect();
  println!("{:<20} {}", record.notification_type, channels.join(" "));
}
