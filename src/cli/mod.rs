//! CLI module for rehome.
//!
//! Subcommands:
//! - `init`: One-time store setup (Postgres table, empty snapshot file)
//! - `relocate`: Move documents into the owner hierarchy (PREVIEW unless `--commit`)
//! - `audit`: Read-only normalisation audit

mod audit;
mod init;
mod relocate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

pub use relocate::RelocateArgs;

/// rehome - owner-centric document restructuring
#[derive(Parser)]
#[command(name = "rehome")]
#[command(about = "Relocate flat multi-tenant documents into a per-owner hierarchy")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Extra config file, layered over `.rehome.toml`
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Prepare the configured store (safe to repeat)
    Init,

    /// Relocate documents into the owner hierarchy
    Relocate(RelocateArgs),

    /// Check restructured collections without writing anything
    Audit {
        /// Print the findings as JSON
        #[arg(long)]
        json: bool,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        match self.command {
            Command::Init => self.run_init().await,
            Command::Relocate(ref args) => self.run_relocate(args).await,
            Command::Audit { json } => self.run_audit(json).await,
        }
    }

    /// Loads the layered configuration, including `--config` if given.
    fn load_config(&self) -> color_eyre::Result<Config> {
        let config = Config::load(self.config.as_deref())?;
        tracing::debug!(backend = ?config.store.backend, "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        App::command().debug_assert();
    }

    #[test]
    fn test_parse_relocate_flags() {
        let app = App::parse_from([
            "rehome",
            "-v",
            "relocate",
            "--commit",
            "--purge-source",
            "--collection",
            "empresas",
            "--collection",
            "sucursales",
            "--owner",
            "AAAAAAAAAAAAAAAAAAAA",
            "--grace-seconds",
            "0",
            "--json",
        ]);
        assert!(app.verbose);
        let Command::Relocate(args) = app.command else {
            panic!("expected relocate");
        };
        let overrides = args.overrides();
        assert!(overrides.commit && overrides.purge_source);
        assert_eq!(overrides.collections, vec!["empresas", "sucursales"]);
        assert_eq!(overrides.owners, vec!["AAAAAAAAAAAAAAAAAAAA"]);
        assert_eq!(overrides.grace_seconds, Some(0));
        assert!(args.json);
    }

    #[test]
    fn test_relocate_defaults_to_preview() {
        let app = App::parse_from(["rehome", "relocate"]);
        let Command::Relocate(args) = app.command else {
            panic!("expected relocate");
        };
        let overrides = args.overrides();
        assert!(!overrides.commit);
        assert!(overrides.collections.is_empty());
        assert_eq!(overrides.grace_seconds, None);
    }

    #[test]
    fn test_global_config_flag() {
        let app = App::parse_from(["rehome", "audit", "--config", "ops.toml", "--json"]);
        assert_eq!(app.config, Some(PathBuf::from("ops.toml")));
        assert!(matches!(app.command, Command::Audit { json: true }));
    }
}
