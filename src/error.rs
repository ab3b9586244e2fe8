use thiserror::Error;

#[derive(Error, Debug)]
pub enum CardError {
    #[error("Invalid format of `bangumi.toml`: {0}")]
    InvalidConfigFile(#[from] toml::de::Error),
    #[error("Invalid card id prefix `{0}`, it must be an ASCII letter followed by ASCII alphanumerics")]
    InvalidIdPrefix(String),
    #[error("Not a rendered Bangumi card, `data-card-uuid` or `data-user` is missing")]
    NotACard,
    #[error("Render template `{name}` failed: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: minijinja::Error,
    },
}
