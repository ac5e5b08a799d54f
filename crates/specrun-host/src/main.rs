//! specrun-host - runs specification assemblies on behalf of an IDE.

mod colors;
mod console;
mod run;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "specrun-host")]
#[command(about = "Run specification assemblies outside the IDE process")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer IPC commands on stdin/stdout
    Serve,

    /// Run one request file and print notifications
    Run {
        /// Path to the run request (.json)
        request: PathBuf,

        /// Run only contexts with one of these tags
        #[arg(long = "include", value_name = "TAG")]
        include_tags: Vec<String>,

        /// Skip contexts with any of these tags
        #[arg(long = "exclude", value_name = "TAG")]
        exclude_tags: Vec<String>,

        /// Run only contexts with these names
        #[arg(long = "filter", value_name = "CONTEXT")]
        filters: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol in serve mode, so logs go to stderr
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<specrun_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Serve => serve::execute().map_err(format_error)?,

        Commands::Run {
            request,
            include_tags,
            exclude_tags,
            filters,
        } => {
            let overrides = specrun_core::RunOptions {
                include_tags,
                exclude_tags,
                filters,
            };
            run::execute(&request, overrides).map_err(format_error)?;
        }
    }

    Ok(())
}
