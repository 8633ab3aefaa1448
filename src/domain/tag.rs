use crate::error::{ConductorError, Result};

const PLACEHOLDER: &str = "{version}";

/// Tag naming pattern (e.g., "{version}", "v{version}", "release-{version}")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    prefix: String,
    suffix: String,
}

impl TagPattern {
    /// Parse a tag pattern; it must contain exactly one `{version}` placeholder
    pub fn new(pattern: &str) -> Result<Self> {
        let parts: Vec<&str> = pattern.split(PLACEHOLDER).collect();
        if parts.len() != 2 {
            return Err(ConductorError::config(format!(
                "Invalid tag_format '{}': should have exactly one {{version}} placeholder",
                pattern
            )));
        }

        Ok(TagPattern {
            prefix: parts[0].to_string(),
            suffix: parts[1].to_string(),
        })
    }

    /// Format a version according to pattern
    /// Example: pattern="v{version}", version="1.2.3" -> "v1.2.3"
    pub fn format(&self, version: &impl std::fmt::Display) -> String {
        format!("{}{}{}", self.prefix, version, self.suffix)
    }

    /// Extract the version part of a tag, or `None` if the tag does not fit the pattern
    pub fn version_part<'t>(&self, tag: &'t str) -> Option<&'t str> {
        if tag.len() < self.prefix.len() + self.suffix.len() {
            return None;
        }
        tag.strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())
    }
}

impl Default for TagPattern {
    fn default() -> Self {
        TagPattern {
            prefix: String::new(),
            suffix: String::new(),
        }
    }
}

impl std::fmt::Display for TagPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.prefix, PLACEHOLDER, self.suffix)
    }
}
