//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

/// redis-ctrl - keep Redis keys in line with declared entries
#[derive(Parser, Debug)]
#[command(name = "redis-ctrl")]
#[command(version)]
#[command(about = "Reconcile declared RedisEntry manifests into a Redis store")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "REDIS_CTRL_CONFIG")]
    pub config: Option<PathBuf>,

    /// RedisEntry manifest file, or a directory of *.yaml / *.yml manifests
    #[arg(short, long)]
    pub entries: PathBuf,

    /// Reconcile every entry once, print a summary and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Write to an in-memory store instead of Redis
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_parse_once_dry_run() {
        let cli = Cli::try_parse_from(["redis-ctrl", "--entries", "deploy/", "--once", "--dry-run"])
            .unwrap();
        assert!(cli.once);
        assert!(cli.dry_run);
        assert_eq!(cli.entries, PathBuf::from("deploy/"));
    }

    #[test]
    fn test_entries_is_required() {
        assert!(Cli::try_parse_from(["redis-ctrl"]).is_err());
    }
}
