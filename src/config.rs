use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::render::UnresolvedPolicy;
use crate::scan::BraceStyle;

pub const CONFIG_FILE_NAME: &str = "docmerge.toml";
pub const CONFIG_ENV_VAR: &str = "DOCMERGE_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderSection,

    /// Pre-seeded tag values. CLI `--values` / `--set` override these.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RenderSection {
    /// Tag grammar: "guillemet" («field») or "braces" ({{field}}).
    #[serde(default)]
    pub grammar: Option<String>,

    /// Fail on unresolved tags instead of leaving them in place.
    #[serde(default)]
    pub strict: Option<bool>,
}

impl AppConfig {
    /// Loads the config from an explicit path, else `DOCMERGE_CONFIG`, else
    /// `docmerge.toml` searched upwards from the current directory. A
    /// missing config is not an error; defaults apply.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match std::env::var_os(CONFIG_ENV_VAR) {
                Some(p) => Some(PathBuf::from(p)),
                None => std::env::current_dir()
                    .ok()
                    .and_then(|d| find_file_upwards(&d, CONFIG_FILE_NAME, 6)),
            },
        };
        let Some(path) = path else {
            return Ok((Self::default(), None));
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&raw).with_context(|| format!("parse config: {}", path.display()))?;
        Ok((cfg, Some(path)))
    }

    pub fn grammar(&self) -> anyhow::Result<BraceStyle> {
        match self.render.grammar.as_deref() {
            None => Ok(BraceStyle::default()),
            Some(s) => {
                BraceStyle::parse(s).with_context(|| format!("unknown grammar in config: {s}"))
            }
        }
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        if self.render.strict.unwrap_or(false) {
            UnresolvedPolicy::Strict
        } else {
            UnresolvedPolicy::Lenient
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

const DEFAULT_CONFIG: &str = r#"# docmerge configuration
#
# Tag grammar: "guillemet" for «field» merge fields (names restricted to
# [a-z0-9_], results sorted), "braces" for {{field}} tags (first-seen order).

[render]
grammar = "guillemet"
strict = false

# Pre-seeded tag values, applied before --values/--set overrides.
#[values]
#client_name = "Alice"
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        anyhow::bail!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        );
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::{init_default_config, AppConfig};
    use crate::render::UnresolvedPolicy;
    use crate::scan::BraceStyle;

    #[test]
    fn full_config_parses() {
        let cfg: AppConfig = toml::from_str(
            r#"
[render]
grammar = "braces"
strict = true

[values]
client_name = "Alice"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.grammar().expect("grammar"), BraceStyle::DoubleBrace);
        assert_eq!(cfg.policy(), UnresolvedPolicy::Strict);
        assert_eq!(
            cfg.values.get("client_name").map(String::as_str),
            Some("Alice")
        );
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg.grammar().expect("grammar"), BraceStyle::Guillemet);
        assert_eq!(cfg.policy(), UnresolvedPolicy::Lenient);
        assert!(cfg.values.is_empty());
    }

    #[test]
    fn unknown_grammar_is_rejected() {
        let cfg: AppConfig = toml::from_str("[render]\ngrammar = \"angle\"\n").expect("parse");
        assert!(cfg.grammar().is_err());
    }

    #[test]
    fn default_config_file_round_trips() {
        let dir = std::env::temp_dir().join(format!("docmerge-cfg-{}", std::process::id()));
        let path = init_default_config(&dir, false).expect("init");
        let raw = std::fs::read_to_string(&path).expect("read");
        let cfg: AppConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(cfg.grammar().expect("grammar"), BraceStyle::Guillemet);

        assert!(init_default_config(&dir, false).is_err());
        assert!(init_default_config(&dir, true).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
