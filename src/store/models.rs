use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MultisiteType {
    Subdomain,
    Subdirectory,
}

impl MultisiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subdomain => "subdomain",
            Self::Subdirectory => "subdirectory",
        }
    }
}

impl FromStr for MultisiteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subdomain" => Ok(Self::Subdomain),
            "subdirectory" => Ok(Self::Subdirectory),
            _ => Err(format!("Invalid multisite type: {}", s)),
        }
    }
}

impl std::fmt::Display for MultisiteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Multisite {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: MultisiteType,
}

/// A site record. `domain` is the unique key everywhere: directory name,
/// hosts entry, proxy config file and database name all derive from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub domain: String,
    /// Space-separated extra hostnames
    #[serde(default)]
    pub aliases: Option<String>,
    /// Document root relative to the site directory
    #[serde(default)]
    pub web_root: Option<String>,
    #[serde(default)]
    pub multisite: Option<Multisite>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Site {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn with_aliases(mut self, aliases: impl Into<String>) -> Self {
        let aliases = aliases.into();
        self.aliases = if aliases.trim().is_empty() {
            None
        } else {
            Some(aliases)
        };
        self
    }

    pub fn with_web_root(mut self, web_root: impl Into<String>) -> Self {
        self.web_root = Some(web_root.into());
        self
    }

    pub fn with_multisite(mut self, kind: MultisiteType) -> Self {
        self.multisite = Some(Multisite {
            enabled: true,
            kind,
        });
        self
    }

    /// Alias hostnames, split on whitespace.
    pub fn alias_list(&self) -> Vec<String> {
        self.aliases
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Domain followed by aliases.
    pub fn hostnames(&self) -> Vec<String> {
        std::iter::once(self.domain.clone())
            .chain(self.alias_list())
            .collect()
    }

    /// Multisite mode, only when enabled.
    pub fn multisite_kind(&self) -> Option<MultisiteType> {
        self.multisite.filter(|m| m.enabled).map(|m| m.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
