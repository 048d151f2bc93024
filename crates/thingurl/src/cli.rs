//! Clap derive structures for the `thingurl` daemon.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// thingurl -- mirror Web Thing devices from URLs and local discovery
#[derive(Debug, Parser)]
#[command(
    name = "thingurl",
    version,
    about = "Mirror Web Thing devices found at configured or discovered URLs",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Defaults to `run` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file path (defaults to the platform config directory)
    #[arg(long, env = "THINGURL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load configured URLs, watch devices, and log changes until Ctrl-C
    Run(RunArgs),

    /// Add a thing URL to the config file
    Add(AddArgs),

    /// Remove a thing URL from the config file
    #[command(alias = "rm")]
    Remove {
        /// URL to remove (a trailing slash is ignored)
        url: String,
    },

    /// List configured thing URLs
    #[command(alias = "ls")]
    List,
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Extra thing URL to load for this run only (repeatable)
    #[arg(long = "url", short = 'u')]
    pub urls: Vec<String>,

    /// Seconds between poll cycles (overrides config)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k')]
    pub insecure: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Thing URL, e.g. http://lamp.local:8888
    pub url: String,

    /// Bearer token for the thing
    #[arg(long, env = "THINGURL_TOKEN", hide_env = true)]
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_repeated_urls() {
        let cli = Cli::parse_from([
            "thingurl",
            "-vv",
            "run",
            "--url",
            "http://a.local",
            "-u",
            "http://b.local",
            "--poll-interval",
            "2",
        ]);
        assert_eq!(cli.global.verbose, 2);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.urls, vec!["http://a.local", "http://b.local"]);
        assert_eq!(args.poll_interval, Some(2));
    }

    #[test]
    fn command_defaults_to_none() {
        let cli = Cli::parse_from(["thingurl"]);
        assert!(cli.command.is_none());
    }
}
