use std::sync::Arc;

use anyhow::Result;

pub mod components;
pub mod config;
pub mod directive;
mod engine;
mod error;
pub mod ids;
pub mod lint;
pub mod markdown;
pub mod node;

pub use components::bangumi::simulate::{simulate, CardState, FetchOutcome};
pub use components::{BangumiCard, Component, Components};
pub use config::{CardConfig, CardLayout, Config, PageConfig};
pub use engine::{render_page, BangumiEngine, BuildSummary};
pub use error::CardError;
pub use ids::CardIds;
pub use markdown::MarkdownRender;

/// Render a markdown document with a fresh id allocator.
pub fn render_markdown(markdown: &str, config: &Config) -> Result<String> {
    let ids = Arc::new(CardIds::new(&config.card.id_prefix)?);
    let components = Components::new(config, ids);
    MarkdownRender::new(&components).render_html(markdown)
}
