use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use static_site_stack::{synthesize, SiteAccess, StackConfig};

/// site_synth - synthesize the static site cloudformation stack
#[derive(Parser)]
#[command(name = "site_synth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StackArgs {
    /// TOML stack configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// .env file with SITE_* overrides
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// private or public-read
    #[arg(long)]
    access: Option<SiteAccess>,

    /// customization script: a path or gh:owner/repo/path/to/script.rhai
    #[arg(long)]
    script: Option<String>,

    #[arg(long)]
    stack_name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the template, asset manifest and cloud manifest to a directory
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Print the template to stdout
    Print {
        #[command(flatten)]
        stack: StackArgs,
    },
}

fn load_config(args: &StackArgs) -> Result<StackConfig> {
    let mut config = StackConfig::load(args.config.as_deref(), args.env_file.as_deref())
        .context("Failed to load stack configuration")?;
    if let Some(access) = args.access {
        config.access = access;
    }
    if let Some(script) = &args.script {
        config.script = Some(script.clone());
    }
    if let Some(name) = &args.stack_name {
        config.stack_name = name.clone();
    }
    Ok(config)
}

fn cmd_synth(args: &StackArgs, out: &Path) -> Result<()> {
    let config = load_config(args)?;
    let synthesized = synthesize(&config)
        .with_context(|| format!("Failed to synthesize stack {}", config.stack_name))?;
    synthesized.write_to(out)
        .with_context(|| format!("Failed to write stack artifacts to {}", out.display()))?;
    println!("{}", synthesized.stack_name);
    println!("{}", synthesized.template_path(out).display());
    Ok(())
}

fn cmd_print(args: &StackArgs) -> Result<()> {
    let config = load_config(args)?;
    let synthesized = synthesize(&config)
        .with_context(|| format!("Failed to synthesize stack {}", config.stack_name))?;
    println!("{}", synthesized.template.to_json_pretty()?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match &cli.command {
        Commands::Synth { stack, out } => cmd_synth(stack, out),
        Commands::Print { stack } => cmd_print(stack),
    }
}
