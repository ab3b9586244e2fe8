use std::{fs, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{error::CardError, ids::DEFAULT_ID_PREFIX};

pub const CONFIG_FILE: &str = "bangumi.toml";

/// The root config, parsed from `bangumi.toml`.
///
/// Every table is optional, a missing file means all defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub card: CardConfig,
    #[serde(default)]
    pub page: PageConfig,
}

/// Card layout variant.
///
/// Both variants carry the same slots and class names; they only differ
/// in how the nickname and username are grouped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CardLayout {
    /// Nickname and username share a `bc-nickname-line` row.
    #[default]
    Classic,
    /// Nickname and username are separate rows of the details column.
    Stacked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "snake_case"))]
pub struct CardConfig {
    #[serde(default)]
    pub layout: CardLayout,
    #[serde(default = "CardConfig::default_id_prefix")]
    pub id_prefix: String,
    #[serde(default = "CardConfig::default_profile_url")]
    pub profile_url: String,
    #[serde(default = "CardConfig::default_api_url")]
    pub api_url: String,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            layout: CardLayout::default(),
            id_prefix: Self::default_id_prefix(),
            profile_url: Self::default_profile_url(),
            api_url: Self::default_api_url(),
        }
    }
}

impl CardConfig {
    const DEFAULT_PROFILE_URL: &'static str = "https://bangumi.tv/user/";
    const DEFAULT_API_URL: &'static str = "https://api.bgm.tv/v0/users/";

    fn default_id_prefix() -> String {
        DEFAULT_ID_PREFIX.to_string()
    }

    fn default_profile_url() -> String {
        Self::DEFAULT_PROFILE_URL.to_string()
    }

    fn default_api_url() -> String {
        Self::DEFAULT_API_URL.to_string()
    }

    /// Profile page of `user`, with the username encoded as one path segment.
    pub fn profile_url_for(&self, user: &str) -> String {
        join_user(&self.profile_url, user)
    }

    /// Profile API endpoint of `user`, with the username encoded as one path segment.
    pub fn api_url_for(&self, user: &str) -> String {
        join_user(&self.api_url, user)
    }
}

fn join_user(base: &str, user: &str) -> String {
    let encoded = urlencoding::encode(user);
    if base.ends_with('/') {
        format!("{base}{encoded}")
    } else {
        format!("{base}/{encoded}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "PageConfig::default_title")]
    pub title: String,
    pub stylesheet: Option<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            stylesheet: None,
        }
    }
}

impl PageConfig {
    fn default_title() -> String {
        String::from("Bangumi cards")
    }
}

impl Config {
    pub fn parse(content: &str) -> Result<Self, CardError> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Load `bangumi.toml` from `source` directory.
    pub fn load_from_dir(source: impl AsRef<Path>) -> Result<Self> {
        Self::load(source.as_ref().join(CONFIG_FILE))
    }

    /// Load config from `path`, fallback to the default config if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No {} found, using default config", path.display());
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.card.layout, CardLayout::Classic);
        assert_eq!(config.card.id_prefix, "BC");
        assert_eq!(config.card.profile_url, "https://bangumi.tv/user/");
        assert_eq!(config.card.api_url, "https://api.bgm.tv/v0/users/");
        assert_eq!(config.page.title, "Bangumi cards");
        assert!(config.page.stylesheet.is_none());
    }

    #[test]
    fn test_parse_config() {
        let config = Config::parse(
            r#"
            [card]
            layout = "stacked"
            id_prefix = "card"
            api_url = "https://mirror.example/v0/users"

            [page]
            stylesheet = "/static/card.css"
            "#,
        )
        .unwrap();
        assert_eq!(config.card.layout, CardLayout::Stacked);
        assert_eq!(config.card.id_prefix, "card");
        assert_eq!(
            config.card.api_url_for("sai"),
            "https://mirror.example/v0/users/sai"
        );
        assert_eq!(config.page.stylesheet.as_deref(), Some("/static/card.css"));
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::parse("[card]\nlayout = \"grid\"").unwrap_err();
        assert!(matches!(err, CardError::InvalidConfigFile(_)));
    }

    #[test_case("sai", "https://bangumi.tv/user/sai")]
    #[test_case("a b", "https://bangumi.tv/user/a%20b")]
    #[test_case("../admin?x=1#y", "https://bangumi.tv/user/..%2Fadmin%3Fx%3D1%23y")]
    #[test_case("番组", "https://bangumi.tv/user/%E7%95%AA%E7%BB%84")]
    fn test_profile_url_encoding(user: &str, expected: &str) {
        assert_eq!(CardConfig::default().profile_url_for(user), expected);
    }
}
