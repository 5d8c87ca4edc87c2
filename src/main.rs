// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! smc - static compiler for CMD-style JavaScript modules
//!
//! Compiles each entry and prints the output, or writes it below an output
//! directory at the path matching its module id.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use owo_colors::OwoColorize;
use smc_compiler::{CompileError, CompiledModule, Compiler, CompilerConfig, FsLoader};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// smc - flatten and declare CMD module dependencies
#[derive(Parser, Debug)]
#[command(name = "smc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entry modules, as pathnames or `#` ids
    #[arg(required = true)]
    entries: Vec<String>,

    /// Pathname prefix canonical ids are relative to
    #[arg(short, long, env = "SMC_BASE")]
    base: Option<String>,

    /// Filesystem directory pathnames are read from
    #[arg(short, long, default_value = "/")]
    root: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write each output here instead of stdout
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Enable debug logging for the compiler
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("smc=debug,smc_compiler=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Configuration file first, then `--base` / `SMC_BASE`
fn load_config(cli: &Cli) -> Result<CompilerConfig, CompileError> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_file(path)?,
        None => CompilerConfig::default(),
    };
    if let Some(base) = &cli.base {
        config.base = base.clone();
    }
    Ok(config)
}

async fn run(cli: &Cli) -> Result<(), CompileError> {
    let config = load_config(cli)?;
    debug!("Configuration: {:?}", config);
    let compiler = Compiler::new(config, Arc::new(FsLoader::new(&cli.root)))?;

    let results = compiler.compile_all(&cli.entries).await?;

    for (entry, result) in cli.entries.iter().zip(results) {
        let Some(module) = result else {
            eprintln!(
                "{}: {} resolves to no module",
                "Skipped".yellow().bold(),
                entry.cyan()
            );
            continue;
        };

        match &cli.out_dir {
            Some(dir) => write_output(dir, &compiler.config().base, &module).await?,
            None => println!("{}", module.code),
        }
    }

    Ok(())
}

/// Write the output at the entry's base-relative path below `dir`
async fn write_output(
    dir: &Path,
    base: &str,
    module: &CompiledModule,
) -> Result<(), CompileError> {
    let pathname = &module.file.pathname;
    let relative = pathname
        .strip_prefix(base)
        .unwrap_or_else(|| pathname.trim_start_matches('/'));
    let target = dir.join(relative);
    let io_error = |source: std::io::Error| CompileError::Io {
        pathname: target.display().to_string(),
        source,
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(&target, &module.code).await.map_err(io_error)?;

    eprintln!(
        "{} {} -> {}",
        "Compiled".green().bold(),
        module.file.id,
        target.display().dimmed()
    );
    Ok(())
}
