mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod runner;
mod ssh;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::DeckhandConfig;
use paths::ConfigSource;
use reconcile::CancelToken;
use std::io;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub source: ConfigSource,
    pub config: DeckhandConfig,
    pub cancel: CancelToken,
}

fn load_config(flag: Option<&str>) -> Result<(ConfigSource, DeckhandConfig)> {
    let source = paths::resolve_config(flag)?;
    let config = match source.path() {
        Some(path) => DeckhandConfig::load(path)?,
        None => DeckhandConfig::default(),
    };
    log::debug!("Loaded config from {}", source.describe());
    Ok((source, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "deckhand", &mut io::stdout());
        return Ok(());
    }

    let (source, config) = load_config(cli.config.as_deref())?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("Interrupted; stopping every host at its next command (Ctrl-C again to abort)");
        handler_token.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let ctx = Context {
        quiet: cli.quiet,
        source,
        config,
        cancel,
    };

    if let Some((operation, args)) = cli.command.operation() {
        return commands::operation::run(&ctx, operation, args);
    }

    match cli.command {
        Command::Hosts { json } => commands::hosts::run(&ctx, json),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        // operations and completions are dispatched above
        _ => Ok(()),
    }
}
