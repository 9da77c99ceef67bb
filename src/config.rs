//! Optional interpreter configuration, read from a `lantern.toml` sitting
//! next to the story file. Everything has a sensible default so the file
//! is never required.

use log::debug;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pin the RNG for reproducible transcripts
    pub seed: Option<u64>,
    /// Never attach to the terminal, even when one is present
    pub headless: bool,
    /// Transcript file to use without asking
    pub transcript: Option<String>,
    /// Screen size overrides for non-terminal runs
    pub screen_width: Option<u16>,
    pub screen_height: Option<u16>,
}

impl Config {
    /// Load the config next to the story file, or defaults.
    pub fn load_near(story_path: &Path) -> Config {
        let candidate = story_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("lantern.toml");
        match std::fs::read_to_string(&candidate) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!("config loaded from {}", candidate.display());
                    config
                }
                Err(e) => {
                    eprintln!("Ignoring malformed {}: {e}", candidate.display());
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let config = Config::load_near(Path::new("/nonexistent/story.z3"));
        assert!(config.seed.is_none());
        assert!(!config.headless);
    }

    #[test]
    fn parses_partial_files() {
        let config: Config = toml::from_str("seed = 42\nheadless = true").unwrap();
        assert_eq!(config.seed, Some(42));
        assert!(config.headless);
        assert!(config.transcript.is_none());
    }
}
