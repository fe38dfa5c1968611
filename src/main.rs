use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use futures::TryStreamExt;

use cwtail_aws::CloudWatchBackend;
use cwtail_tail::{LogBackend, StreamPattern, TailOptions, interval_limiter};

mod config;
mod output;
mod time_arg;

use config::Config;
use output::{Formatter, OutputOptions};

/// cwtail - Tail CloudWatch Logs from the terminal
#[derive(Parser, Debug)]
#[command(name = "cwtail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// AWS region (defaults to the environment or profile)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS named profile
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Config file (defaults to $CWTAIL_CONFIG or ~/.config/cwtail/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print events from a log group
    Tail(TailArgs),

    /// List log groups
    Groups {
        /// Only groups starting with this prefix
        #[arg(value_name = "PREFIX")]
        prefix: Option<String>,
    },

    /// List log streams in a group
    Streams {
        #[arg(value_name = "GROUP")]
        group: String,

        /// Only streams starting with this prefix
        #[arg(value_name = "PREFIX")]
        prefix: Option<String>,
    },
}

#[derive(Args, Debug)]
struct TailArgs {
    /// Log group name
    #[arg(value_name = "GROUP")]
    group: String,

    /// Stream name prefix, or `*` for every stream
    #[arg(value_name = "STREAM", default_value = "*")]
    stream: String,

    /// Keep polling for new events
    #[arg(short, long)]
    follow: bool,

    /// Wait for the log group to be created
    #[arg(long)]
    retry: bool,

    /// Start time: now, RFC 3339, or an amount ago like 5m
    #[arg(short, long, value_name = "TIME")]
    start: Option<String>,

    /// End time (ignored when following)
    #[arg(short, long, value_name = "TIME")]
    end: Option<String>,

    /// CloudWatch filter pattern
    #[arg(short, long, value_name = "PATTERN")]
    grep: Option<String>,

    /// Drop events whose message matches this regex
    #[arg(short = 'v', long, value_name = "REGEX")]
    grepv: Option<String>,

    /// Print the event timestamp
    #[arg(long)]
    timestamp: bool,

    /// Print the stream name
    #[arg(long)]
    stream_name: bool,

    /// Print the event id
    #[arg(long)]
    event_id: bool,

    /// Print one JSON object per event
    #[arg(long)]
    json: bool,

    /// Print timestamps in local time
    #[arg(long)]
    local: bool,
}

impl TailArgs {
    /// Flags switch fields on; they never switch off what the config enabled
    fn output_options(&self, base: OutputOptions) -> OutputOptions {
        OutputOptions {
            timestamp: base.timestamp || self.timestamp,
            stream_name: base.stream_name || self.stream_name,
            event_id: base.event_id || self.event_id,
            local_time: base.local_time || self.local,
            json: base.json || self.json,
        }
    }

    fn tail_options(&self, config: &Config) -> Result<TailOptions> {
        let now = Utc::now();
        let default_start = if self.follow { "now" } else { "1h" };
        let start = time_arg::parse_time(self.start.as_deref().unwrap_or(default_start), now)
            .context("Invalid --start")?;
        let end = self
            .end
            .as_deref()
            .map(|e| time_arg::parse_time(e, now))
            .transpose()
            .context("Invalid --end")?;

        if let Some(end) = end {
            if end < start {
                bail!("--end {} is before --start {}", end, start);
            }
        }

        let mut options = TailOptions::new(&self.group, start.timestamp_millis())
            .streams(&self.stream)
            .follow(self.follow)
            .retry(self.retry)
            .end_time(end.map(|e| e.timestamp_millis()))
            .buffer_size(config.buffer_size)
            .cache_ttl(config.cache_ttl())
            .purge_interval(config.purge_interval())
            .refresh_interval(config.refresh_interval());

        if let Some(pattern) = &self.grep {
            options = options.include(pattern);
        }
        if let Some(pattern) = &self.grepv {
            options = options.exclude(pattern);
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // Diagnostics go to stderr, events to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let region = cli.region.or_else(|| config.region.clone());
    let profile = cli.profile.or_else(|| config.profile.clone());
    let backend = CloudWatchBackend::from_env(region, profile).await;

    match cli.command {
        Command::Tail(args) => run_tail(backend, &args, &config).await,

        Command::Groups { prefix } => {
            let groups = backend
                .list_groups(prefix.as_deref())
                .await
                .context("Failed to list log groups")?;

            let mut out = std::io::stdout().lock();
            for group in groups {
                writeln!(out, "{}", group)?;
            }
            Ok(())
        }

        Command::Streams { group, prefix } => {
            let pattern = StreamPattern::parse(prefix.as_deref().unwrap_or("*"));
            let mut listing = backend.list_streams(&group, &pattern);

            while let Some(name) = listing
                .try_next()
                .await
                .with_context(|| format!("Failed to list streams in {}", group))?
            {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn run_tail(backend: CloudWatchBackend, args: &TailArgs, config: &Config) -> Result<()> {
    let options = args.tail_options(config)?;
    let formatter = Formatter::new(args.output_options(config.output));

    let mut tail = cwtail_tail::tail(
        Arc::new(backend),
        options,
        interval_limiter(config.poll_interval()),
    )
    .await
    .with_context(|| format!("Failed to tail {}", args.group))?;

    let mut out = std::io::stdout();

    loop {
        let item = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            item = tail.next() => item,
        };

        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(e).with_context(|| format!("Tailing {} failed", args.group)),
            None => break,
        };

        let line = formatter.format(&event)?;
        if let Err(e) = writeln!(out, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                break;
            }
            return Err(e.into());
        }
    }

    tail.stop();
    Ok(())
}
