use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use coevo_config::CONFIG_FILE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct MineArgs {
    #[arg(long, help = "Directory whose children are git repositories")]
    pub repos_dir: PathBuf,

    #[arg(long, default_value = "out", help = "Output root; artifacts go under <out-dir>/rq0")]
    pub out_dir: PathBuf,

    #[arg(long, default_value = CONFIG_FILE_NAME, help = "Config file; defaults apply when missing")]
    pub config: PathBuf,

    #[arg(long, help = "Worker threads (defaults to CPU count minus two)")]
    pub workers: Option<usize>,

    #[arg(long, help = "Only consider the newest N non-merge commits per repository")]
    pub max_commits: Option<usize>,

    #[arg(long, help = "Also pool this run's pair rows into all_pairs.csv")]
    pub merge_all: bool,

    #[arg(long, help = "Do not persist per-repository transaction logs")]
    pub no_events: bool,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct ReplayArgs {
    #[arg(long, help = "Transaction log (JSON lines) written by `coevo mine`")]
    pub events: PathBuf,

    #[arg(long, help = "Pair table CSV to write")]
    pub out: PathBuf,

    #[arg(long, default_value = CONFIG_FILE_NAME, help = "Config file; defaults apply when missing")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct MergePairsArgs {
    #[arg(long, help = "Directory holding repo=<name>/pairs.csv partitions")]
    pub pairs_dir: PathBuf,

    #[arg(long, help = "Merged pair table CSV to write")]
    pub out: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct InitConfigArgs {
    #[arg(long, default_value = CONFIG_FILE_NAME, help = "Where to write the default config")]
    pub path: PathBuf,

    #[arg(long, help = "Overwrite an existing config file")]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Mine interface co-change rules from every repository in a directory
    Mine(MineArgs),
    /// Recompute rules from a persisted transaction log
    Replay(ReplayArgs),
    /// Merge per-repository pair tables already on disk into one CSV
    MergePairs(MergePairsArgs),
    /// Write a config file populated with defaults
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Interface co-evolution miner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{Cli, Commands, LogFormat};

    #[test]
    fn mine_flags_parse() {
        let cli = Cli::try_parse_from([
            "coevo",
            "mine",
            "--repos-dir",
            "repos",
            "--out-dir",
            "results",
            "--workers",
            "3",
            "--max-commits",
            "500",
            "--merge-all",
            "--log-format",
            "json",
        ])
        .expect("mine flags should parse");

        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Mine(args) = cli.command else {
            panic!("expected mine command");
        };
        assert_eq!(args.repos_dir, PathBuf::from("repos"));
        assert_eq!(args.out_dir, PathBuf::from("results"));
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.max_commits, Some(500));
        assert!(args.merge_all);
        assert!(!args.no_events);
        assert_eq!(args.config, PathBuf::from("coevo.toml"));
    }

    #[test]
    fn replay_merge_and_init_config_parse() {
        let cli = Cli::try_parse_from([
            "coevo", "replay", "--events", "a.jsonl", "--out", "pairs.csv",
        ])
        .expect("replay should parse");
        assert_eq!(cli.log_format.as_str(), "human");
        assert!(matches!(cli.command, Commands::Replay(_)));

        let cli = Cli::try_parse_from([
            "coevo",
            "merge-pairs",
            "--pairs-dir",
            "out/rq0/pairs",
            "--out",
            "all.csv",
        ])
        .expect("merge-pairs should parse");
        let Commands::MergePairs(args) = cli.command else {
            panic!("expected merge-pairs command");
        };
        assert_eq!(args.pairs_dir, PathBuf::from("out/rq0/pairs"));

        let cli = Cli::try_parse_from(["coevo", "init-config", "--force"])
            .expect("init-config should parse");
        let Commands::InitConfig(args) = cli.command else {
            panic!("expected init-config command");
        };
        assert!(args.force);
        assert_eq!(args.path, PathBuf::from("coevo.toml"));
    }

    #[test]
    fn invalid_log_format_and_missing_repos_dir_are_rejected() {
        assert!(
            Cli::try_parse_from(["coevo", "--log-format", "xml", "init-config"]).is_err()
        );
        assert!(Cli::try_parse_from(["coevo", "mine"]).is_err());
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
