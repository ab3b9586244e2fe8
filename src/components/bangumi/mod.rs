use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::CardConfig,
    directive::Properties,
    ids::CardIds,
    node::{Element, Node},
};

use super::{Component, BANGUMI};

pub mod lifecycle;
mod markup;
pub mod script;
pub mod simulate;

use lifecycle::Slot;

const NOT_LEAF_MESSAGE: &str =
    r#"Invalid directive. ("bangumi" must be a leaf type "::bangumi{user="username"}")"#;
const MISSING_USER_MESSAGE: &str =
    r#"Invalid user. ("user" attribute must be provided for a Bangumi card")"#;

/// One rendered card occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInstance {
    /// Namespaces every element id of the card.
    pub instance_id: String,
    /// The raw `user` attribute, untrusted.
    pub username: String,
}

impl CardInstance {
    pub fn slot_id(&self, slot: Slot) -> String {
        slot.element_id(&self.instance_id)
    }
}

/// Why a directive invocation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidDirective {
    /// The directive has children, it must be a leaf.
    NotLeaf,
    /// The `user` attribute is missing or empty.
    MissingUser,
}

impl InvalidDirective {
    pub fn message(self) -> &'static str {
        match self {
            InvalidDirective::NotLeaf => NOT_LEAF_MESSAGE,
            InvalidDirective::MissingUser => MISSING_USER_MESSAGE,
        }
    }

    /// The inert, hidden node rendered in place of the card.
    pub fn to_node(self) -> Node {
        Element::new("div")
            .class("hidden")
            .text(self.message())
            .into()
    }
}

/// Validate the shape of a `bangumi` directive and return the username.
///
/// The leaf check comes first, so children are rejected regardless of
/// the attributes.
pub fn validate<'a>(
    properties: &'a Properties,
    children: &[Node],
) -> Result<&'a str, InvalidDirective> {
    if !children.is_empty() {
        return Err(InvalidDirective::NotLeaf);
    }
    match properties.get("user") {
        Some(user) if !user.is_empty() => Ok(user),
        _ => Err(InvalidDirective::MissingUser),
    }
}

/// The `::bangumi{user="..."}` card component.
///
/// A valid invocation renders a placeholder link card whose inline script
/// fetches the profile in the browser and fills in the slots.
#[derive(Debug)]
pub struct BangumiCard {
    config: CardConfig,
    ids: Arc<CardIds>,
}

impl BangumiCard {
    pub fn new(config: CardConfig, ids: Arc<CardIds>) -> Self {
        BangumiCard { config, ids }
    }

    /// Render the card of a validated `user`.
    pub fn render_card(&self, user: &str) -> Result<Element> {
        let card = CardInstance {
            instance_id: self.ids.allocate(),
            username: user.to_owned(),
        };
        let profile_url = self.config.profile_url_for(user);
        let endpoint = self.config.api_url_for(user);

        let code = script::generate(&card, &endpoint)?;
        let script = Element::new("script")
            .id(format!("{}-script", card.instance_id))
            .attr("type", "text/javascript")
            .flag("defer")
            .child(Node::raw(code));

        tracing::debug!(
            user,
            instance_id = card.instance_id.as_str(),
            "Rendered bangumi card"
        );
        Ok(markup::build_card(&card, self.config.layout, &profile_url).child(script))
    }
}

impl Component for BangumiCard {
    fn name(&self) -> &str {
        BANGUMI
    }

    fn render(&self, properties: &Properties, children: &[Node]) -> Result<Node> {
        match validate(properties, children) {
            Ok(user) => Ok(self.render_card(user)?.into()),
            Err(invalid) => {
                tracing::warn!("{}", invalid.message());
                Ok(invalid.to_node())
            }
        }
    }
}
