// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use harvest_runtime::cli;

#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest — deadline-bounded orchestration for web extraction agents",
    version,
    after_help = "Run 'harvest <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = cli::serve::DEFAULT_PORT)]
        port: u16,
        /// Skip browser startup; agents fetch over plain HTTP only
        #[arg(long)]
        http_only: bool,
    },
    /// List the registered agents
    Agents {
        /// Include full input/output schemas
        #[arg(long)]
        schemas: bool,
    },
    /// Run one agent and print its report
    Run {
        /// Agent name (see 'harvest agents')
        agent: String,
        /// Input payload as a JSON object
        #[arg(long)]
        input: Option<String>,
        /// Outer deadline in seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
        /// Also write the report to this path
        #[arg(long)]
        output: Option<String>,
        /// Skip browser startup; fetch over plain HTTP only
        #[arg(long)]
        http_only: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Export global flags so every module can check them
    if cli.json {
        std::env::set_var("HARVEST_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("HARVEST_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("HARVEST_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("HARVEST_NO_COLOR", "1");
    }

    cli::init_tracing();

    let result = match cli.command {
        Commands::Serve { port, http_only } => cli::serve::run(port, http_only).await,
        Commands::Agents { schemas } => cli::agents_cmd::run(schemas).await,
        Commands::Run {
            agent,
            input,
            timeout_secs,
            output,
            http_only,
        } => {
            cli::run_cmd::run(
                &agent,
                input.as_deref(),
                timeout_secs,
                output.as_deref(),
                http_only,
            )
            .await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
    result
}
