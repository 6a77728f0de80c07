//! CLI argument parsing and subcommand dispatch.

use adu_core::Config;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{resume, serve, startup};

#[derive(Parser, Debug)]
#[command(name = "adu-server", version, about = "ADU form intake and external system dispatcher")]
pub struct Cli {
    /// Config profile; `{PROFILE}_{KEY}` env vars override `{KEY}`.
    #[arg(long, env = "ADU_PROFILE", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the intake server, dispatch workers and the CSV export cron (default)
    Serve,
    /// Run the batch CSV export once and exit
    ExportCsv,
    /// Reschedule every stored submission and wait for the queue to drain
    Resume,
}

impl Cli {
    pub fn config(&self) -> Config {
        match self.profile.as_deref() {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    config.log_summary();
    let components = startup::build(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve::serve(components).await,
        Command::ExportCsv => {
            let report = components.exporter.run().await?;
            info!(
                artifacts = report.artifacts.len(),
                exported = report.exported.len(),
                marked = report.marked,
                "export-csv finished"
            );
            for artifact in &report.artifacts {
                println!("{}\t{}\t{}", artifact.system, artifact.rows, artifact.location);
            }
            Ok(())
        }
        Command::Resume => {
            let report = resume::resume(&components).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["adu-server"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_kebab_case_subcommands() {
        let cli = Cli::try_parse_from(["adu-server", "export-csv"]).unwrap();
        assert_eq!(cli.command, Some(Command::ExportCsv));
        let cli = Cli::try_parse_from(["adu-server", "resume", "--profile", "staging"]).unwrap();
        assert_eq!(cli.command, Some(Command::Resume));
        assert_eq!(cli.profile.as_deref(), Some("staging"));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["adu-server", "import"]).is_err());
    }
}
