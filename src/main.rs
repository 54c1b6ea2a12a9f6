//! # doc-uploader CLI (`docup`)
//!
//! ## Usage
//!
//! ```bash
//! docup --config ./config/docup.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docup check` | Collect and classify documents; no network access |
//! | `docup upload` | Resolve, upload, and link every document |
//! | `docup login` | Run the browser login and print the access token |
//! | `docup completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # See how a tree would be classified
//! docup check --root ./documents
//!
//! # Upload with a token from the environment
//! DOCUP_ACCESS_TOKEN=00D... docup upload --progress json
//!
//! # Rehearse a run against an in-memory org
//! docup upload --dry-run
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use doc_uploader::auth::{CredentialProvider, PkceLogin, StaticToken};
use doc_uploader::config;
use doc_uploader::logging;
use doc_uploader::pipeline::{self, RunOptions};
use doc_uploader::progress::ProgressMode;
use doc_uploader::salesforce::{HttpOrgClient, InMemoryOrg, OrgApi};

/// Classify building-project documents, upload them to the org, and link
/// them to their hierarchy records.
#[derive(Parser)]
#[command(name = "docup", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: when the file does not exist, defaults plus the
    /// `SF_INSTANCE_URL` / `SF_CLIENT_ID` / `SF_REDIRECT_URI` environment
    /// variables are used.
    #[arg(long, global = true, default_value = "./config/docup.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect and classify documents without contacting the org.
    ///
    /// Prints one line per document and a per-level summary. Fails on the
    /// first file whose name or location cannot be classified.
    Check {
        /// Document root (overrides `upload.root`).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Resolve, upload, and link every document under the root.
    Upload {
        /// Document root (overrides `upload.root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Access token. Falls back to `DOCUP_ACCESS_TOKEN`, then to the
        /// browser login.
        #[arg(long)]
        token: Option<String>,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Run against an in-memory org in which every hierarchy node
        /// exists. Nothing leaves the machine.
        #[arg(long)]
        dry_run: bool,
    },

    /// Log in through the browser and print the access token.
    Login {
        /// Print the login URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "docup", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg = config::load_or_minimal(&cli.config)?;
    let _log_guard = logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Check { root } => {
            let options = RunOptions::from_config(&cfg).with_root(root);
            let report = pipeline::check(&options)?;
            for doc in &report.documents {
                println!(
                    "{:<11}  {:<17}  {}  ({})",
                    doc.entity_type().as_str(),
                    doc.document_type().label(),
                    doc.name_path().display_path(),
                    doc.source_path()
                );
            }
            println!();
            for (level, count) in &report.per_level {
                println!("{:<11}  {}", level.as_str(), count);
            }
            println!("{} documents classified.", report.documents.len());
        }
        Commands::Upload {
            root,
            token,
            progress,
            dry_run,
        } => {
            let options = RunOptions::from_config(&cfg).with_root(root);
            let sink = progress.unwrap_or_else(ProgressMode::default_for_tty).sink();

            let org: Box<dyn OrgApi> = if dry_run {
                let org = InMemoryOrg::new();
                for doc in &pipeline::check(&options)?.documents {
                    org.register_hierarchy(doc.name_path());
                }
                Box::new(org)
            } else {
                cfg.validate_remote()?;
                let provider: Box<dyn CredentialProvider> =
                    match token.map(StaticToken::new).or_else(StaticToken::from_env) {
                        Some(static_token) => Box::new(static_token),
                        None => Box::new(PkceLogin::from_config(&cfg)?),
                    };
                let access = provider.access_token().await?;
                if let Some(instance_url) = access.instance_url.filter(|u| !u.is_empty()) {
                    cfg.org.instance_url = instance_url;
                }
                Box::new(HttpOrgClient::new(&cfg, access.access_token)?)
            };

            let report = pipeline::run_upload(org.as_ref(), &options, sink.as_ref()).await?;
            println!(
                "Uploaded {} documents ({} bytes) and created {} attachment records{}.",
                report.uploaded,
                report.bytes,
                report.attachments,
                if dry_run { " (dry run)" } else { "" }
            );
        }
        Commands::Login { no_browser } => {
            cfg.validate_remote()?;
            let mut login = PkceLogin::from_config(&cfg)?;
            if no_browser {
                login = login.without_browser();
            }
            let access = login.access_token().await.context("login failed")?;
            if let Some(instance_url) = &access.instance_url {
                eprintln!("Instance: {}", instance_url);
            }
            println!("{}", access.access_token);
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
