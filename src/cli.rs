use anyhow::{Result, bail};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

use crate::commands::preview::{self, PreviewOptions};
use crate::commands::status;
use crate::commands::sync::{self, SyncOptions};
use crate::commands::{CommandReport, ConfigOverrides};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "boxdsync")]
#[command(bin_name = "boxdsync")]
#[command(version)]
#[command(about = "Merge a Letterboxd diary feed into markdown vault notes")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Fetch the feed and merge it into the diary and film notes.")]
    Sync(SyncArgs),
    #[command(about = "Print the diary entries the feed would produce, writing nothing.")]
    Preview(PreviewArgs),
    #[command(about = "Show resolved paths, config, last sync, and lock state.")]
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct FeedArgs {
    #[arg(long, help = "Feed JSON file or http(s) URL; overrides the configured feed.")]
    pub feed: Option<String>,

    #[arg(long, help = "Diary rendering variant (list, list-review, callout, callout-poster).")]
    pub variant: Option<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    #[arg(long, help = "Plan the merge and report it without writing documents.")]
    pub dry_run: bool,

    #[arg(long, help = "Entry order in the diary (old appends, new prepends).")]
    pub sort: Option<String>,

    #[arg(long, conflicts_with = "no_notes", help = "Also maintain one note per film.")]
    pub notes: bool,

    #[arg(long, help = "Skip film notes even if enabled in config.")]
    pub no_notes: bool,

    #[arg(long, help = "Print the report as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub feed: FeedArgs,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long, help = "Print the report as JSON.")]
    pub json: bool,
}

fn notes_flag(args: &SyncArgs) -> Option<bool> {
    match (args.notes, args.no_notes) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        let state = if report.ok { "ok" } else { "failed" };
        println!("{}: {state}", report.command);
        for detail in &report.details {
            println!("  {detail}");
        }
        for issue in &report.issues {
            println!("  issue: {issue}");
        }
    }
    if !report.ok {
        bail!("{} finished with {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => {
            let opts = SyncOptions {
                overrides: ConfigOverrides {
                    feed: args.feed.feed.clone(),
                    sort: args.sort.clone(),
                    variant: args.feed.variant.clone(),
                    notes: notes_flag(&args),
                },
                dry_run: args.dry_run,
            };
            let report = sync::run(&opts)?;
            print_report(&report, args.json)
        }
        Commands::Preview(args) => {
            let opts = PreviewOptions {
                overrides: ConfigOverrides {
                    feed: args.feed.feed,
                    variant: args.feed.variant,
                    ..ConfigOverrides::default()
                },
            };
            let preview = preview::run(&opts)?;
            print!("{}", preview.text);
            for detail in &preview.report.details {
                eprintln!("{detail}");
            }
            Ok(())
        }
        Commands::Status(args) => {
            let report = status::run()?;
            print_report(&report, args.json)
        }
    }
}
