use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 60;
const MAX_COUNTDOWN_SECS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    pub capture: CaptureConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub fps: u32,
    pub countdown_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiConfig {
    pub theme: Theme,
    pub show_notifications: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.capture.fps < MIN_FPS || self.capture.fps > MAX_FPS {
            return Err(anyhow!("fps must be between {} and {}", MIN_FPS, MAX_FPS));
        }
        if self.capture.countdown_secs > MAX_COUNTDOWN_SECS {
            return Err(anyhow!(
                "countdown_secs must be <= {}",
                MAX_COUNTDOWN_SECS
            ));
        }
        let dir = self.output.directory.to_string_lossy();
        if dir.contains("..") {
            return Err(anyhow!("output directory contains path traversal"));
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.capture.fps = self.capture.fps.clamp(MIN_FPS, MAX_FPS);
        self.capture.countdown_secs = self.capture.countdown_secs.min(MAX_COUNTDOWN_SECS);
    }
}

impl Default for Config {
    fn default() -> Self {
        let videos_dir = directories::UserDirs::new()
            .and_then(|d| d.video_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            output: OutputConfig {
                directory: videos_dir.join("screenrec"),
            },
            capture: CaptureConfig {
                fps: 30,
                countdown_secs: 3,
            },
            ui: UiConfig {
                theme: Theme::Dark,
                show_notifications: true,
            },
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "screenrec", "screenrec").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                let mut config: Config = toml::from_str(&content)?;
                config.sanitize();
                config.validate()?;
                return Ok(config);
            }
        }
        Ok(Config::default())
    }

    pub fn save(&self) -> Result<()> {
        self.validate()?;
        if let Some(dir) = Self::config_dir() {
            fs::create_dir_all(&dir)?;
            if let Some(path) = Self::config_path() {
                let content = toml::to_string_pretty(self)?;
                fs::write(&path, content)?;
            }
        }
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        let dir = &self.output.directory;
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("Output directory path is empty"));
        }
        if dir.to_string_lossy().contains("..") {
            return Err(anyhow!("Output directory contains path traversal"));
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture.countdown_secs, 3);
        assert_eq!(config.capture.fps, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sanitize_clamps_fps() {
        let mut config = Config::default();
        config.capture.fps = 0;
        config.sanitize();
        assert_eq!(config.capture.fps, MIN_FPS);

        config.capture.fps = 999;
        config.sanitize();
        assert_eq!(config.capture.fps, MAX_FPS);
    }

    #[test]
    fn test_validate_rejects_traversal() {
        let mut config = Config::default();
        config.output.directory = PathBuf::from("../outside");
        assert!(config.validate().is_err());
    }
}
