//! Runtime configuration: GC pressure threshold and prompt text, loadable
//! from a `schola.toml` file and overridable by CLI flags (SPEC_FULL.md
//! §1.3).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes of live heap payload that triggers an automatic collection.
    pub gc_threshold: usize,
    /// Written before each read in the prompt loop (§6).
    pub prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gc_threshold: 1 << 20,
            prompt: "> ".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// CLI flags take precedence over whatever the file set.
    pub fn apply_overrides(&mut self, gc_threshold: Option<usize>, prompt: Option<String>) {
        if let Some(t) = gc_threshold {
            self.gc_threshold = t;
        }
        if let Some(p) = prompt {
            self.prompt = p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.gc_threshold, 1 << 20);
        assert_eq!(c.prompt, "> ");
    }

    #[test]
    fn toml_overrides_defaults() {
        let c = Config::from_toml_str("gc_threshold = 4096\nprompt = \"schola> \"\n").unwrap();
        assert_eq!(c.gc_threshold, 4096);
        assert_eq!(c.prompt, "schola> ");
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let c = Config::from_toml_str("prompt = \"> \"\n").unwrap();
        assert_eq!(c.gc_threshold, 1 << 20);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let mut c = Config::from_toml_str("prompt = \"file> \"\n").unwrap();
        c.apply_overrides(None, Some("cli> ".to_string()));
        assert_eq!(c.prompt, "cli> ");
    }
}
