use std::sync::Arc;

use anyhow::Result;

use crate::{config::Config, directive::Properties, ids::CardIds, node::Node};

pub mod bangumi;

pub use bangumi::BangumiCard;

pub const BANGUMI: &str = "bangumi";

/// A directive component.
///
/// It is invoked once per directive occurrence with the directive's
/// attributes and child nodes, and returns the node to render in place.
/// Malformed invocations should be reported as inert markup, not as `Err`,
/// so that one bad directive never fails the whole document.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, properties: &Properties, children: &[Node]) -> Result<Node>;
}

/// The registered directive components.
pub struct Components {
    components: Vec<Box<dyn Component>>,
}

impl Components {
    pub fn new(config: &Config, ids: Arc<CardIds>) -> Self {
        Components {
            components: vec![Box::new(BangumiCard::new(config.card.clone(), ids))],
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|component| component.name() == name)
            .map(|component| component.as_ref())
    }
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.components.iter().map(|component| component.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        let components = Components::new(&Config::default(), Arc::new(CardIds::default()));
        assert!(components.get("youtube").is_none());
        assert_eq!(components.get(BANGUMI).unwrap().name(), "bangumi");
    }
}
