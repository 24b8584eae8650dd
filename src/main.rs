// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crocdeck::binary::{BinaryLocator, EnsureOptions, FixedBinary, Provisioner};
use crocdeck::command::{NetworkOptions, ReceiveOptions, SendOptions, SendPayload};
use crocdeck::config::{load_config, Paths};
use crocdeck::context::AppContext;
use crocdeck::history::{HistoryRecord, HistoryStatus};
use crocdeck::logging::init_logging;
use crocdeck::relay::{probe, RelayAddress};
use crocdeck::transfer::{Phase, TransferDone, TransferEvent, TransferKind, TransferProgress};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Transfer or command completed
    pub const SUCCESS: i32 = 0;
    /// General error, including a failed transfer
    pub const ERROR: i32 = 1;
    /// Service unavailable (relay unreachable)
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Stopped by Ctrl-C
    pub const CANCELED: i32 = 130;
}

/// Spinner helpers shared by the slower commands
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

#[derive(Parser)]
#[command(name = "crocdeck")]
#[command(version = VERSION)]
#[command(about = "Send and receive files with croc, with a managed croc binary and history.")]
#[command(long_about = "crocdeck - croc transfers without the guesswork\n\n\
    Send files:          crocdeck send report.pdf photos/\n\
    Send text:           crocdeck send --text \"hello\"\n\
    Receive:             crocdeck receive 7123-alpha-bravo\n\
    See the command:     crocdeck preview send report.pdf\n\
    Past transfers:      crocdeck history list\n\
    Install croc:        crocdeck binary ensure")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Run this croc executable instead of the managed one
    #[arg(long, global = true, value_name = "PATH")]
    croc: Option<PathBuf>,

    /// Data directory (defaults to $CROCDECK_HOME or the platform data dir)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files, folders or text
    ///
    /// Examples:
    ///   crocdeck send report.pdf
    ///   crocdeck send --text "meet at 5" --code 7123-my-code
    Send(SendArgs),

    /// Receive with a code
    #[command(alias = "r")]
    Receive(ReceiveArgs),

    /// Print the croc command a transfer would run, with secrets masked
    Preview {
        #[command(subcommand)]
        command: PreviewCommands,
    },

    /// Browse or prune transfer history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Manage the croc executable
    Binary {
        #[command(subcommand)]
        command: BinaryCommands,
    },

    /// Show which optional flags the croc in use supports
    Capabilities {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that a relay answers
    Relay {
        /// host[:port]; defaults to the configured relay
        address: Option<String>,
        /// Give up after this many milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Subcommand)]
enum PreviewCommands {
    Send(SendArgs),
    Receive(ReceiveArgs),
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List transfers, newest first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
        /// Show at most this many
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show one transfer with its log tail
    Show { id: String },
    /// Delete all history
    Clear,
    /// Remove transfers older than the retention window
    Prune {
        /// Override the configured retention
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum BinaryCommands {
    /// Make sure a usable croc is installed, downloading if needed
    Ensure {
        /// Install this version instead of the pin or latest
        #[arg(long)]
        version: Option<String>,
    },
    /// List upstream releases
    Releases,
    /// Show the installed binary and platform
    Info,
}

#[derive(Args, Clone, Default)]
struct NetworkArgs {
    /// Relay address host:port
    #[arg(long)]
    relay: Option<String>,
    /// IPv6 relay address
    #[arg(long)]
    relay6: Option<String>,
    /// Relay password
    #[arg(long)]
    pass: Option<String>,
    /// SOCKS5 proxy
    #[arg(long)]
    socks5: Option<String>,
    /// Only use the local network
    #[arg(long)]
    local: bool,
    /// Use croc's internal DNS resolver
    #[arg(long)]
    internal_dns: bool,
}

impl From<NetworkArgs> for NetworkOptions {
    fn from(args: NetworkArgs) -> Self {
        NetworkOptions {
            relay: args.relay,
            relay6: args.relay6,
            pass: args.pass,
            socks5: args.socks5,
            local: args.local,
            internal_dns: args.internal_dns,
        }
    }
}

#[derive(Args, Clone)]
struct SendArgs {
    /// Files or folders to send
    paths: Vec<PathBuf>,
    /// Send this text instead of files
    #[arg(long, conflicts_with = "paths")]
    text: Option<String>,
    /// Use this code instead of a generated one
    #[arg(long)]
    code: Option<String>,
    /// Disable compression
    #[arg(long)]
    no_compress: bool,
    /// Skip files matching this pattern (repeatable)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,
    /// Upload rate limit, e.g. 500k
    #[arg(long, value_name = "RATE")]
    throttle_upload: Option<String>,
    /// Answer yes to croc's prompts
    #[arg(long)]
    yes: bool,
    /// Extra croc flags, shell-quoted
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    extra: Option<String>,
    #[command(flatten)]
    network: NetworkArgs,
}

impl SendArgs {
    fn into_options(self) -> SendOptions {
        let payload = match self.text {
            Some(text) => SendPayload::Text { text },
            None => SendPayload::Files { paths: self.paths },
        };
        SendOptions {
            payload,
            code: self.code,
            network: self.network.into(),
            no_compress: self.no_compress,
            exclude: self.exclude,
            throttle_upload: self.throttle_upload,
            yes: self.yes,
            extra_flags: self.extra,
        }
    }
}

#[derive(Args, Clone)]
struct ReceiveArgs {
    /// Code from the sender
    code: String,
    /// Directory to save into
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
    /// Overwrite existing files
    #[arg(long)]
    overwrite: bool,
    /// Answer yes to croc's prompts
    #[arg(long)]
    yes: bool,
    /// Elliptic curve for the key exchange
    #[arg(long)]
    curve: Option<String>,
    /// Extra croc flags, shell-quoted
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    extra: Option<String>,
    #[command(flatten)]
    network: NetworkArgs,
}

impl ReceiveArgs {
    fn into_options(self) -> ReceiveOptions {
        ReceiveOptions {
            code: self.code,
            out_dir: self.out,
            overwrite: self.overwrite,
            yes: self.yes,
            curve: self.curve,
            network: self.network.into(),
            extra_flags: self.extra,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} Failed to start async runtime: {}", "[X]".red(), e);
            std::process::exit(exit_codes::ERROR);
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "[X]".red(), e);
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let paths = cli.home.map(Paths::new).unwrap_or_else(Paths::discover);
    let config = load_config(&paths)?;

    let locator: Option<Arc<dyn BinaryLocator>> = match cli.croc {
        Some(path) => {
            if !path.exists() {
                bail!("croc executable not found at {}", path.display());
            }
            let version = Provisioner::runtime_version(&path).await;
            Some(Arc::new(FixedBinary::new(path, version)) as Arc<dyn BinaryLocator>)
        }
        None => None,
    };
    let ctx = AppContext::with_locator(paths, config, locator);

    let result = match cli.command {
        Commands::Send(args) => run_send(&ctx, args.into_options()).await,
        Commands::Receive(args) => run_receive(&ctx, args.into_options()).await,
        Commands::Preview { command } => {
            let line = match command {
                PreviewCommands::Send(args) => ctx.supervisor.preview_send(args.into_options()).await?,
                PreviewCommands::Receive(args) => {
                    ctx.supervisor.preview_receive(args.into_options()).await?
                }
            };
            println!("{}", line);
            Ok(exit_codes::SUCCESS)
        }
        Commands::History { command } => handle_history(&ctx, command),
        Commands::Binary { command } => handle_binary(&ctx, command).await,
        Commands::Capabilities { json } => handle_capabilities(&ctx, json).await,
        Commands::Relay { address, timeout_ms } => {
            handle_relay(&ctx, address, Duration::from_millis(timeout_ms)).await
        }
    };

    ctx.shutdown();
    result
}

async fn run_send(ctx: &AppContext, options: SendOptions) -> Result<i32> {
    let mut events = ctx.bus.subscribe();
    let id = ctx.supervisor.run_send(None, options).await?;
    follow_transfer(ctx, &mut events, &id).await
}

async fn run_receive(ctx: &AppContext, options: ReceiveOptions) -> Result<i32> {
    let mut events = ctx.bus.subscribe();
    let id = ctx.supervisor.run_receive(None, options).await?;
    follow_transfer(ctx, &mut events, &id).await
}

fn transfer_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Render events for `id` until its done event; Ctrl-C asks the supervisor
/// to stop and keeps waiting for the outcome.
async fn follow_transfer(
    ctx: &AppContext,
    events: &mut crocdeck::transfer::Subscription,
    id: &str,
) -> Result<i32> {
    let bar = transfer_bar();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut code_shown = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                bar.set_message("stopping...");
                if let Err(e) = ctx.supervisor.stop(id) {
                    tracing::debug!("Stop after Ctrl-C: {}", e);
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    bar.finish_and_clear();
                    bail!("Event stream closed before the transfer finished");
                };
                if event.id() != id {
                    continue;
                }
                match event {
                    TransferEvent::Progress(progress) => render_progress(&bar, &progress, &mut code_shown),
                    TransferEvent::Done(done) => {
                        bar.finish_and_clear();
                        return Ok(report_done(&done));
                    }
                }
            }
        }
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Connecting => "connecting",
        Phase::Sending => "sending",
        Phase::Receiving => "receiving",
        Phase::Done => "done",
        Phase::Failed => "failed",
    }
}

fn render_progress(bar: &ProgressBar, progress: &TransferProgress, code_shown: &mut bool) {
    if progress.kind == TransferKind::Send && !*code_shown {
        if let Some(code) = &progress.code {
            bar.println(format!("{} {}", "Code is:".bold(), code.green().bold()));
            bar.println(format!("On the other computer run: crocdeck receive {}", code));
            *code_shown = true;
        }
    }

    if let Some(percent) = progress.percent {
        bar.set_position(percent.round().clamp(0.0, 100.0) as u64);
    } else if progress.code.is_none() {
        if let Some(message) = &progress.message {
            bar.println(format!("  {}", message.dimmed()));
        }
    }

    let mut status = phase_label(progress.phase).to_string();
    if let Some(name) = &progress.file_name {
        status.push(' ');
        status.push_str(name);
    }
    if let Some(speed) = &progress.speed {
        status.push_str(&format!(" ({})", speed));
    }
    if let Some(eta) = &progress.eta {
        status.push_str(&format!(" eta {}", eta));
    }
    bar.set_message(status);
}

fn report_done(done: &TransferDone) -> i32 {
    let took = done
        .duration_ms
        .map(|ms| format!(" in {:.1}s", ms as f64 / 1000.0))
        .unwrap_or_default();

    if done.canceled {
        println!("{} Transfer stopped{}", "[!]".yellow(), took);
        exit_codes::CANCELED
    } else if done.success {
        println!("{} Transfer complete{}", "[OK]".green(), took);
        exit_codes::SUCCESS
    } else {
        println!(
            "{} Transfer failed: {}",
            "[X]".red(),
            done.error.as_deref().unwrap_or("unknown error")
        );
        exit_codes::ERROR
    }
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_label(status: HistoryStatus) -> colored::ColoredString {
    match status {
        HistoryStatus::InProgress => "in progress".cyan(),
        HistoryStatus::Done => "done".green(),
        HistoryStatus::Failed => "failed".red(),
        HistoryStatus::Canceled => "canceled".yellow(),
    }
}

fn summarize_files(record: &HistoryRecord) -> String {
    match record.files.as_slice() {
        [] => "-".to_string(),
        [one] => one.name.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first.name, rest.len()),
    }
}

fn handle_history(ctx: &AppContext, command: HistoryCommands) -> Result<i32> {
    match command {
        HistoryCommands::List { json, limit } => {
            let mut records = ctx.history.list();
            if let Some(limit) = limit {
                records.truncate(limit);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(exit_codes::SUCCESS);
            }
            if records.is_empty() {
                println!("No transfers yet.");
            }
            for record in &records {
                println!(
                    "{}  {:<7}  {:<11}  {}  {}",
                    format_time(record.created_at),
                    record.kind.as_str(),
                    status_label(record.status),
                    summarize_files(record),
                    record.id.dimmed()
                );
            }
        }
        HistoryCommands::Show { id } => {
            let record = ctx
                .history
                .get(&id)
                .with_context(|| format!("No transfer with id '{}' in history", id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        HistoryCommands::Clear => {
            ctx.history.clear();
            println!("{} History cleared", "[OK]".green());
        }
        HistoryCommands::Prune { days } => {
            let removed = ctx.history.prune_retention(days);
            println!("{} Removed {} transfers", "[OK]".green(), removed);
        }
    }

    if let Some(error) = ctx.history.status().last_error {
        eprintln!("{} History storage problem: {}", "[!]".yellow(), error);
    }
    Ok(exit_codes::SUCCESS)
}

async fn handle_binary(ctx: &AppContext, command: BinaryCommands) -> Result<i32> {
    match command {
        BinaryCommands::Ensure { version } => {
            let spinner = spinner::create("Resolving croc...");
            let result = ctx
                .provisioner
                .resolve(EnsureOptions {
                    version,
                    prefer_system: ctx.config.prefer_system_binary,
                })
                .await;
            spinner.finish_and_clear();
            let info = result?;
            println!(
                "{} croc {} at {}",
                "[OK]".green(),
                info.version.as_deref().unwrap_or("(unknown version)"),
                info.path.display()
            );
        }
        BinaryCommands::Releases => {
            let spinner = spinner::create("Fetching releases...");
            let result = ctx.provisioner.releases().await;
            spinner.finish_and_clear();
            let releases = result?;
            let latest = crocdeck::binary::releases::latest_stable(&releases);
            for release in &releases {
                let marker = if release.version.is_some() && release.version == latest {
                    " (latest)".green().to_string()
                } else if !release.is_stable() {
                    " (pre-release)".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "{:<10} {}{}",
                    release.tag_name,
                    release.published_at.as_deref().unwrap_or(""),
                    marker
                );
            }
        }
        BinaryCommands::Info => {
            let target = ctx.provisioner.target();
            println!("Platform:   {}-{}", target.os, target.arch);
            match target.release_target() {
                Ok(rt) => println!("Asset:      {}", rt.asset_name("<version>")),
                Err(e) => println!("Asset:      {}", e.to_string().yellow()),
            }
            match ctx.provisioner.installed() {
                Some(manifest) => println!(
                    "Installed:  croc {} at {}",
                    manifest.version,
                    manifest.binary_path.display()
                ),
                None => println!("Installed:  {}", "none".dimmed()),
            }
            if let Some(pin) = &ctx.config.binary_version {
                println!("Pinned:     {}", pin);
            }
        }
    }
    Ok(exit_codes::SUCCESS)
}

async fn handle_capabilities(ctx: &AppContext, json: bool) -> Result<i32> {
    let (binary, caps) = ctx.current_capabilities().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(exit_codes::SUCCESS);
    }

    println!(
        "croc {} at {} (via {})",
        binary.version.as_deref().unwrap_or("(unknown version)"),
        binary.path.display(),
        ctx.capabilities.strategy_name()
    );
    if caps.is_empty() {
        println!("{}", "Flag support unknown; every flag will be passed.".yellow());
    }
    for (flag, supported) in caps.iter() {
        let mark = if supported { "yes".green() } else { "no".red() };
        println!("  {:<20} {}", flag.token(), mark);
    }
    Ok(exit_codes::SUCCESS)
}

async fn handle_relay(ctx: &AppContext, address: Option<String>, timeout: Duration) -> Result<i32> {
    let addr = match address {
        Some(a) => RelayAddress::parse(&a)?,
        None => ctx.relay_address()?,
    };
    let status = probe(&addr, timeout).await;
    if status.reachable {
        println!(
            "{} {} reachable ({} ms)",
            "[OK]".green(),
            status.address,
            status.latency_ms.unwrap_or(0)
        );
        Ok(exit_codes::SUCCESS)
    } else {
        println!(
            "{} {} unreachable: {}",
            "[X]".red(),
            status.address,
            status.error.as_deref().unwrap_or("unknown error")
        );
        Ok(exit_codes::SERVICE_UNAVAILABLE)
    }
}
