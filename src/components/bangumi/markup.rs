use crate::{config::CardLayout, node::Element};

use super::{
    lifecycle::{Slot, CARD_CLASS, LOADING_TEXT, NO_STYLING_CLASS, WAITING_CLASS},
    CardInstance,
};

/// Build the placeholder card in its pre-fetch state, without the script.
pub(super) fn build_card(card: &CardInstance, layout: CardLayout, profile_url: &str) -> Element {
    let avatar = slot(card, "div", Slot::Avatar);
    let nickname = slot(card, "div", Slot::Nickname).text(LOADING_TEXT);
    let sign = slot(card, "div", Slot::Sign).text(LOADING_TEXT);
    let user_group = slot(card, "div", Slot::UserGroup).text(LOADING_TEXT);
    let user_id = slot(card, "div", Slot::UserId).text(LOADING_TEXT);

    let details = match layout {
        CardLayout::Classic => {
            let username = slot(card, "span", Slot::Username).text(format!("@{}", card.username));
            let nickname_line = Element::new("div")
                .id(format!("{}-nickname-line", card.instance_id))
                .class("bc-nickname-line")
                .child(nickname)
                .child(username);
            Element::new("div")
                .class("bc-user-details")
                .child(nickname_line)
                .child(sign)
        }
        CardLayout::Stacked => {
            let username = slot(card, "div", Slot::Username).text(format!("@{}", card.username));
            Element::new("div")
                .class("bc-user-details")
                .child(nickname)
                .child(username)
                .child(sign)
        }
    };

    Element::new("a")
        .id(card.slot_id(Slot::Card))
        .class(format!("{CARD_CLASS} {WAITING_CLASS} {NO_STYLING_CLASS}"))
        .attr("href", profile_url)
        .attr("target", "_blank")
        .attr("rel", "noopener noreferrer")
        .attr("data-user", card.username.as_str())
        .attr("data-card-uuid", card.instance_id.as_str())
        .attr("style", "text-decoration: none; color: inherit;")
        .child(
            Element::new("div")
                .class("bc-user-card")
                .child(avatar)
                .child(details),
        )
        .child(
            Element::new("div")
                .class("bc-additional-info")
                .child(user_group)
                .child(user_id),
        )
}

fn slot(card: &CardInstance, tag: &str, slot: Slot) -> Element {
    Element::new(tag)
        .id(card.slot_id(slot))
        .class(slot.class())
}
