//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::CollectorConfig;

#[derive(Debug, Parser)]
#[command(name = "logcollector")]
#[command(about = "Tails a growing log file and streams new lines to a collection server")]
#[command(version)]
pub struct Cli {
    /// Log file to follow
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Name announced to the server
    #[arg(short, long)]
    pub name: Option<String>,

    /// Collection server as host:port
    #[arg(short, long)]
    pub server: Option<String>,

    /// Seconds to wait at end of file before polling again
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_secs: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Save the effective name, file and server to the config file
    #[arg(long)]
    pub remember: bool,
}

impl Cli {
    /// Applies command-line values on top of `config`.
    pub fn apply(&self, config: &mut CollectorConfig) {
        if let Some(file) = &self.file {
            config.log_file = Some(file.clone());
        }
        if let Some(name) = &self.name {
            config.uploader_name = name.clone();
        }
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(secs) = self.poll_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> (tempfile::TempDir, CollectorConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::load_from(dir.path().join("config.json")).unwrap();
        (dir, config)
    }

    #[test]
    fn flags_override_config() {
        let (_dir, mut config) = base_config();
        config.server = "from-file:1".into();

        let cli = Cli::parse_from([
            "logcollector",
            "--file",
            "out.txt",
            "--name",
            "sam",
            "--poll-secs",
            "3",
        ]);
        cli.apply(&mut config);

        assert_eq!(config.log_file, Some(PathBuf::from("out.txt")));
        assert_eq!(config.uploader_name, "sam");
        assert_eq!(config.server, "from-file:1");
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert!(!cli.remember);
    }

    #[test]
    fn empty_name_is_passed_through() {
        let (_dir, mut config) = base_config();
        let cli = Cli::parse_from(["logcollector", "--name", ""]);
        cli.apply(&mut config);
        assert_eq!(config.uploader_name, "");
    }

    #[test]
    fn zero_poll_interval_is_refused() {
        let result = Cli::try_parse_from(["logcollector", "--poll-secs", "0"]);
        assert!(result.is_err());
    }
}
