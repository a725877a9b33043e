//! Collector configuration.
//!
//! Reads/writes JSON at `~/.config/logcollector/config.json`
//! (`%APPDATA%\logcollector\config.json` on Windows).

use std::path::{Path, PathBuf};
use std::time::Duration;

use logcollector_data_channel::{
    DEFAULT_PORT, HANDSHAKE_REPLY_TIMEOUT, HandshakeOptions, TCP_CONNECT_TIMEOUT,
};
use logcollector_session::SessionConfig;
use logcollector_status::OverflowPolicy;
use logcollector_tail::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};

/// On-disk config format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    uploader_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_file: Option<PathBuf>,
    #[serde(default)]
    server: String,
    #[serde(default)]
    poll_interval_secs: u64,
    /// `0` disables the timeout; absent means the default.
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    handshake_timeout_secs: Option<u64>,
    #[serde(default)]
    status_overflow: String,
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub uploader_name: String,
    pub log_file: Option<PathBuf>,
    pub server: String,
    pub poll_interval: Duration,
    /// `None` disables the timeout.
    pub connect_timeout: Option<Duration>,
    pub handshake_timeout: Option<Duration>,
    pub status_overflow: OverflowPolicy,
    file_path: PathBuf,
}

fn default_name() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
        .unwrap_or_else(|| "collector".into())
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            uploader_name: default_name(),
            log_file: None,
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: Some(TCP_CONNECT_TIMEOUT),
            handshake_timeout: Some(HANDSHAKE_REPLY_TIMEOUT),
            status_overflow: OverflowPolicy::default(),
            file_path: config_file_path()
                .unwrap_or_else(|_| std::env::temp_dir().join("logcollector.json")),
        }
    }
}

impl CollectorConfig {
    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(config_file_path()?)
    }

    /// Loads configuration from `file_path`, falling back to defaults for
    /// anything missing or unreadable. Later saves go to the same path.
    pub fn load_from(file_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let file_path = file_path.into();
        let mut config = CollectorConfig {
            file_path: file_path.clone(),
            ..Default::default()
        };

        if !file_path.exists() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(&file_path)?;
        let Ok(file) = serde_json::from_str::<ConfigFile>(&content) else {
            tracing::warn!(
                path = %file_path.display(),
                "failed to parse collector config, using defaults"
            );
            return Ok(config);
        };

        if !file.uploader_name.is_empty() {
            config.uploader_name = file.uploader_name;
        }
        config.log_file = file.log_file.filter(|p| !p.as_os_str().is_empty());
        if !file.server.is_empty() {
            config.server = file.server;
        }
        if file.poll_interval_secs >= 1 {
            config.poll_interval = Duration::from_secs(file.poll_interval_secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = timeout_from_secs(secs);
        }
        if let Some(secs) = file.handshake_timeout_secs {
            config.handshake_timeout = timeout_from_secs(secs);
        }
        if !file.status_overflow.is_empty() {
            match file.status_overflow.parse() {
                Ok(policy) => config.status_overflow = policy,
                Err(e) => tracing::warn!(error = %e, "ignoring statusOverflow"),
            }
        }

        Ok(config)
    }

    /// Saves configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = ConfigFile {
            uploader_name: self.uploader_name.clone(),
            log_file: self.log_file.clone(),
            server: self.server.clone(),
            poll_interval_secs: self.poll_interval.as_secs(),
            connect_timeout_secs: Some(timeout_to_secs(self.connect_timeout)),
            handshake_timeout_secs: Some(timeout_to_secs(self.handshake_timeout)),
            status_overflow: self.status_overflow.to_string(),
        };

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.file_path, &json)?;
        set_permissions_0600(&self.file_path);

        tracing::debug!(path = %self.file_path.display(), "collector configuration saved");
        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Builds the session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            file_path: self.log_file.clone(),
            uploader_name: self.uploader_name.clone(),
            server: self.server.clone(),
            poll_interval: self.poll_interval,
            handshake: HandshakeOptions {
                connect_timeout: self.connect_timeout,
                reply_timeout: self.handshake_timeout,
            },
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Sub-second timeouts round up so they are not saved as "disabled".
fn timeout_to_secs(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, |d| d.as_secs().max(1))
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn config_file_path() -> anyhow::Result<PathBuf> {
    let config_dir = config_base_dir()?;
    Ok(config_dir.join("logcollector").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return Ok(PathBuf::from(xdg));
            }
        }
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::load_from(dir.path().join("config.json")).unwrap();

        assert!(!config.uploader_name.is_empty());
        assert_eq!(config.log_file, None);
        assert_eq!(config.server, "127.0.0.1:8124");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.status_overflow, OverflowPolicy::Block);
    }

    #[test]
    fn reads_camel_case_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "uploaderName": "quinn",
                "logFile": "/var/log/game/output.txt",
                "server": "collector.lan:9000",
                "pollIntervalSecs": 2,
                "handshakeTimeoutSecs": 5,
                "statusOverflow": "drop-oldest"
            }"#,
        )
        .unwrap();

        let config = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(config.uploader_name, "quinn");
        assert_eq!(
            config.log_file.as_deref(),
            Some(Path::new("/var/log/game/output.txt"))
        );
        assert_eq!(config.server, "collector.lan:9000");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.status_overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(config.server, "127.0.0.1:8124");
        assert_eq!(config.file_path(), path.as_path());
    }

    #[test]
    fn unknown_overflow_policy_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "statusOverflow": "sometimes" }"#).unwrap();

        let config = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(config.status_overflow, OverflowPolicy::Block);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = CollectorConfig::load_from(&path).unwrap();
        config.uploader_name = "rae".into();
        config.log_file = Some(PathBuf::from("/tmp/app.txt"));
        config.server = "10.0.0.2:8124".into();
        config.save().unwrap();

        let loaded = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(loaded.uploader_name, "rae");
        assert_eq!(loaded.log_file, Some(PathBuf::from("/tmp/app.txt")));
        assert_eq!(loaded.server, "10.0.0.2:8124");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn zero_timeout_in_file_disables_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "connectTimeoutSecs": 0 }"#).unwrap();

        let config = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn disabled_timeouts_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = CollectorConfig::load_from(&path).unwrap();
        config.connect_timeout = None;
        config.handshake_timeout = None;
        config.save().unwrap();

        let loaded = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(loaded.connect_timeout, None);
        assert_eq!(loaded.handshake_timeout, None);

        let mut config = loaded;
        config.connect_timeout = Some(Duration::from_secs(7));
        config.save().unwrap();
        let loaded = CollectorConfig::load_from(&path).unwrap();
        assert_eq!(loaded.connect_timeout, Some(Duration::from_secs(7)));
        assert_eq!(loaded.handshake_timeout, None);
    }

    #[test]
    fn session_config_carries_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CollectorConfig::load_from(dir.path().join("c.json")).unwrap();
        config.log_file = Some(PathBuf::from("game.txt"));
        config.connect_timeout = None;

        let session = config.session_config();
        assert_eq!(session.file_path, Some(PathBuf::from("game.txt")));
        assert_eq!(session.handshake.connect_timeout, None);
        assert_eq!(
            session.handshake.reply_timeout,
            Some(Duration::from_secs(30))
        );
    }
}
