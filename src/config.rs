//! Persisted settings and command-line overrides.
//!
//! Grounded in the original `Settings.h`/`Settings.cpp`: a small key/value
//! record (port, cert path, key path) loaded once at startup and otherwise
//! immutable for the lifetime of the process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 8443,
            cert_path: PathBuf::from("server.crt"),
            key_path: PathBuf::from("server.key"),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to (and writing out) the
    /// default record if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Settings> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let settings: Settings = toml::from_str(&contents)
                    .map_err(|e| Error::TlsContext(format!("invalid settings file: {e}")))?;
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                settings.save(path)?;
                Ok(settings)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .expect("Settings serializes infallibly");
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Command-line overrides, applied over the persisted settings file.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "hremoted", about = "Remote desktop capture/encode/broadcast server")]
pub struct Args {
    /// Path to the TOML settings file.
    #[arg(long, default_value = "hremote.toml")]
    pub config: PathBuf,

    /// Overrides the listen port from the settings file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Initial target frame rate (1..=120).
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Initial target bitrate in kbps (500..=8000).
    #[arg(long, default_value_t = 2000)]
    pub bitrate_kbps: u32,

    /// Initial codec tag ("vp8" or "vp9").
    #[arg(long, default_value = "vp8")]
    pub codec: String,

    /// Directory of static assets served over HTTP (the out-of-scope
    /// viewer bundle lives here; only its path is in scope).
    #[arg(long, default_value = "web")]
    pub web_root: PathBuf,
}

impl Args {
    /// Resolves the effective settings: CLI `--port` wins over the file.
    pub fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.config)?;
        if let Some(port) = self.port {
            settings.port = port;
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hremote.toml");
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.port, 8443);
        assert!(path.exists());
    }

    #[test]
    fn load_round_trips_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hremote.toml");
        let mut settings = Settings::default();
        settings.port = 9000;
        settings.save(&path).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.port, 9000);
    }

    #[test]
    fn cli_port_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hremote.toml");
        Settings::default().save(&path).unwrap();

        let args = Args {
            config: path,
            port: Some(1234),
            fps: 30,
            bitrate_kbps: 2000,
            codec: "vp8".into(),
            web_root: "web".into(),
        };
        let settings = args.resolve_settings().unwrap();
        assert_eq!(settings.port, 1234);
    }
}
