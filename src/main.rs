//! lisp-swank - command line front end for the editor core.
//!
//! Inspects Lisp files offline (tokens, packages) and talks to a running
//! SWANK server (eval, completion).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lisp_editor_core::config::SessionConfig;
use lisp_editor_core::ipc::Session;
use lisp_editor_core::packages::{FileId, LineRange, PackageTable};
use lisp_editor_core::syntax;

#[derive(Parser, Debug)]
#[command(name = "lisp-swank", version, about = "Lisp reader and SWANK client")]
struct Cli {
    /// Config file to use instead of the user config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the token stream of a file as JSON.
    Tokenize {
        file: PathBuf,
        /// Run the full reader and report resolved kinds.
        #[arg(long)]
        resolved: bool,
    },
    /// Print package ranges and visible names for a file.
    Packages {
        file: PathBuf,
        /// Line to list visible names for.
        #[arg(long, default_value_t = 0)]
        line: usize,
    },
    /// Evaluate an expression on the SWANK server.
    Eval {
        expr: String,
        #[arg(long, short)]
        package: Option<String>,
    },
    /// Complete a symbol prefix on the SWANK server.
    Complete {
        prefix: String,
        #[arg(long, short)]
        package: Option<String>,
    },
}

#[derive(Serialize)]
struct PackageReport {
    name: String,
    range: Option<LineRange>,
    uses: Vec<String>,
    exports: Vec<String>,
    defined: Vec<String>,
}

#[derive(Serialize)]
struct PackagesOutput {
    file: FileId,
    line: usize,
    active: String,
    packages: Vec<PackageReport>,
    visible: Vec<String>,
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn tokenize_command(path: &Path, resolved: bool) -> Result<()> {
    let text = read_source(path)?;
    if resolved {
        print_json(&syntax::classify(&text))
    } else {
        print_json(&syntax::quick_classify(&text))
    }
}

fn packages_command(path: &Path, line: usize) -> Result<()> {
    let text = read_source(path)?;
    let file = FileId::from_path(path);
    let mut table = PackageTable::new();
    table.update(&syntax::parse(&text), &file);

    let packages = table
        .packages()
        .map(|p| PackageReport {
            name: p.name.clone(),
            range: p.range(&file),
            uses: p.uses().into_iter().map(str::to_string).collect(),
            exports: p.exports().into_iter().map(str::to_string).collect(),
            defined: p.defined_names().into_iter().map(str::to_string).collect(),
        })
        .collect();

    print_json(&PackagesOutput {
        active: table.resolve(&file, line).name.clone(),
        visible: table.list_visible_names(&file, line),
        file,
        line,
        packages,
    })
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::load()?,
    };
    if path.is_some() {
        config.apply_env(|key| std::env::var(key).ok());
    }
    Ok(config)
}

async fn connect(config: &SessionConfig, package: Option<&str>) -> Result<Session> {
    let mut session = Session::connect_with_config(config)
        .await
        .with_context(|| format!("Failed to connect to SWANK at {}", config.address()))?;
    if let Some(package) = package {
        session.set_package(&syntax::normalize_package_name(package));
    }
    Ok(session)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Tokenize { file, resolved } => tokenize_command(&file, resolved),
        Command::Packages { file, line } => packages_command(&file, line),
        Command::Eval { expr, package } => {
            let config = load_config(cli.config.as_deref())?;
            let session = connect(&config, package.as_deref()).await?;
            let result = session.eval(&expr).await;
            session.close().await;
            println!("{}", result?);
            Ok(())
        }
        Command::Complete { prefix, package } => {
            let config = load_config(cli.config.as_deref())?;
            let session = connect(&config, package.as_deref()).await?;
            let result = session.completions(&prefix).await;
            session.close().await;
            print_json(&result?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lisp_editor_core=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!(?cli, "Starting lisp-swank v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
