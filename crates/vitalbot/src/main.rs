use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use vitalbot_core::assessment::resolve;
use vitalbot_core::client::{ListPageApi, MediaWikiClient};
use vitalbot_core::config::{BotConfig, load_config};
use vitalbot_core::runner::{RunOptions, RunReport, run_update};
use vitalbot_core::transform::transform_offline;

const DEFAULT_CONFIG_FILENAME: &str = "vitalbot.toml";

#[derive(Debug, Parser)]
#[command(
    name = "vitalbot",
    version,
    about = "Keeps vital-article list counts and assessment icons in sync"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to vitalbot.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Emit reports as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Update counts and icons on the given list pages")]
    Update(UpdateArgs),
    #[command(about = "Resolve and print one article's assessment")]
    Assess(AssessArgs),
    #[command(about = "Run the offline stages (counts, total) over a local file")]
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(required = true, value_name = "TITLE")]
    titles: Vec<String>,
    #[arg(long, help = "Report a diff instead of saving the edit")]
    dry_run: bool,
    #[arg(long, help = "Skip talk-page lookups and icon reconciliation")]
    skip_assessment: bool,
    #[arg(long, value_name = "TEXT", help = "Override the edit summary")]
    summary: Option<String>,
}

#[derive(Debug, Args)]
struct AssessArgs {
    title: String,
}

#[derive(Debug, Args)]
struct RenderArgs {
    file: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_bot_config(&cli)?;

    match &cli.command {
        Commands::Update(args) => run_update_command(&cli, &config, args),
        Commands::Assess(args) => run_assess_command(&cli, &config, args),
        Commands::Render(args) => run_render_command(&cli, args),
    }
}

fn load_bot_config(cli: &Cli) -> Result<BotConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var("VITALBOT_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    load_config(&path)
}

fn build_client(config: &BotConfig) -> Result<MediaWikiClient> {
    let mut client = MediaWikiClient::from_bot_config(config)?;
    if let (Ok(username), Ok(password)) = (
        std::env::var("WIKI_USERNAME"),
        std::env::var("WIKI_PASSWORD"),
    ) {
        client
            .login(&username, &password)
            .context("failed to log in to the wiki")?;
    }
    Ok(client)
}

fn run_update_command(cli: &Cli, config: &BotConfig, args: &UpdateArgs) -> Result<()> {
    let mut client = build_client(config)?;
    let mut options = RunOptions::from_config(config);
    options.dry_run = args.dry_run;
    options.skip_assessment = options.skip_assessment || args.skip_assessment;
    if let Some(summary) = &args.summary {
        options.summary = summary.clone();
    }

    let mut reports = Vec::new();
    for title in &args.titles {
        let report = run_update(&mut client, title, config, &options)
            .with_context(|| format!("failed to update {title}"))?;
        if !cli.json {
            print_run_report(&report);
        }
        reports.push(report);
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

fn run_assess_command(cli: &Cli, config: &BotConfig, args: &AssessArgs) -> Result<()> {
    let mut client = build_client(config)?;
    let assessment = resolve(&args.title, &mut client)
        .with_context(|| format!("failed to assess {}", args.title))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }
    println!("title: {}", args.title);
    println!("class: {}", assessment.class);
    println!(
        "delisted_good_article: {}",
        assessment.is_delisted_good_article
    );
    println!(
        "former_featured_article: {}",
        assessment.is_former_featured_article
    );
    println!("requests: {}", client.request_count());
    Ok(())
}

fn run_render_command(cli: &Cli, args: &RenderArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let outcome = transform_offline(&text)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    print!("{}", outcome.text);
    eprintln!(
        "sections: {} seen, {} rewritten; total: {} (depth {})",
        outcome.counts.sections_seen,
        outcome.counts.sections_rewritten,
        outcome.total.total,
        outcome
            .total
            .depth
            .map(|depth| depth.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("title: {}", report.title);
    println!("action: {:?}", report.action);
    if let Some(counts) = &report.counts {
        println!(
            "sections: {} seen, {} rewritten",
            counts.sections_seen, counts.sections_rewritten
        );
    }
    if let Some(total) = &report.total {
        println!("total: {} ({} markers)", total.total, total.markers_updated);
    }
    if let Some(icons) = &report.icons {
        println!(
            "icons: {} items, {} lookups, {} updated, {} sentinels removed, {} inserted",
            icons.items_seen,
            icons.lookups,
            icons.icons_updated,
            icons.sentinels_removed,
            icons.sentinels_inserted
        );
    }
    if let Some(diff) = &report.diff {
        println!("{diff}");
    }
    println!("requests: {}", report.request_count);
    println!();
}
