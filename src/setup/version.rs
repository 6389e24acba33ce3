//! Config version tracking.
//!
//! The first line of the config file records the version that last wrote it.
//! Comparing it with the binary's version decides whether setup has to run.

use anyhow::anyhow;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// Current application version from Cargo.toml
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A semantic version (major.minor.patch)
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct SemanticVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemanticVersion {
    fn parse(version_str: &str) -> anyhow::Result<Self> {
        let parts = version_str
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| anyhow!("Invalid version component '{part}' in '{version_str}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(anyhow!(
                "Invalid version format: '{version_str}'. Expected 'major.minor.patch'"
            )),
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What startup has to do with the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupAction {
    /// No config file yet: write the default template
    Install,
    /// Config written by an older (or unknown) version
    Migrate { from: String },
    UpToDate,
}

/// Extracts the version from a leading `config_version = "X.Y.Z"` line.
fn read_config_version(content: &str) -> anyhow::Result<Option<String>> {
    let Some(first_line) = content.lines().next() else {
        return Ok(None);
    };
    let regex = Regex::new(r#"^\s*config_version\s*=\s*"([^"]+)""#)?;
    Ok(regex
        .captures(first_line)
        .map(|caps| caps[1].to_string()))
}

/// Decides the setup action for config text written by some version.
fn action_for(content: &str, current: &str) -> anyhow::Result<SetupAction> {
    let Some(config_version) = read_config_version(content)? else {
        return Ok(SetupAction::Migrate {
            from: "unknown (legacy config)".to_string(),
        });
    };

    let config_parsed = SemanticVersion::parse(&config_version)?;
    let current_parsed = SemanticVersion::parse(current)?;
    Ok(match config_parsed.cmp(&current_parsed) {
        Ordering::Less => SetupAction::Migrate {
            from: config_parsed.to_string(),
        },
        Ordering::Equal => SetupAction::UpToDate,
        Ordering::Greater => {
            tracing::warn!(
                "Config version {} is newer than app version {}",
                config_parsed,
                current_parsed
            );
            SetupAction::UpToDate
        }
    })
}

/// Checks the config file at `config_path` against the running version.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or carries a malformed version.
pub fn check_setup_needed(config_path: &Path) -> anyhow::Result<SetupAction> {
    if !config_path.exists() {
        return Ok(SetupAction::Install);
    }
    let content = std::fs::read_to_string(config_path)?;
    action_for(&content, CURRENT_VERSION)
}

/// Replaces any `config_version` line with one for `version`, placed first.
fn with_version_line(content: &str, version: &str) -> String {
    let version_line = format!(r#"config_version = "{version}""#);
    let rest: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().starts_with("config_version"))
        .collect();
    if rest.is_empty() {
        version_line
    } else {
        format!("{}\n{}", version_line, rest.join("\n"))
    }
}

/// Stamps the config file with the running version, preserving its content.
pub fn update_config_version(config_path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    std::fs::write(config_path, with_version_line(&content, CURRENT_VERSION))?;
    Ok(())
}
