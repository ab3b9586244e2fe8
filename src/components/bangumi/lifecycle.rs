//! The client-side fetch lifecycle of a card.
//!
//! A card starts in [`Lifecycle::Loading`] and ends in either
//! [`Lifecycle::Loaded`] or [`Lifecycle::Errored`]. Each terminal state is
//! entered by applying a fixed list of [`Effect`]s to the card's slots.
//! The same effect lists are compiled into the emitted script and
//! interpreted by the offline simulator, so both always agree.

use std::fmt;

use serde::Serialize;

pub const LOADING_TEXT: &str = "Loading…";
pub const NO_SIGNATURE: &str = "No signature available";
pub const ERROR_TEXT: &str = "Error loading user";

pub const CARD_CLASS: &str = "card-bangumi";
pub const WAITING_CLASS: &str = "fetch-waiting";
pub const ERROR_CLASS: &str = "fetch-error";
pub const NO_STYLING_CLASS: &str = "no-styling";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Loading,
    Loaded,
    Errored,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Loading => "loading",
            Lifecycle::Loaded => "loaded",
            Lifecycle::Errored => "errored",
        })
    }
}

/// An addressable element of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// The root link element.
    Card,
    Avatar,
    Nickname,
    Username,
    Sign,
    UserGroup,
    UserId,
}

impl Slot {
    /// The six data slots, in document order.
    pub const DATA: [Slot; 6] = [
        Slot::Avatar,
        Slot::Nickname,
        Slot::Username,
        Slot::Sign,
        Slot::UserGroup,
        Slot::UserId,
    ];

    /// The reserved id suffix of this slot.
    pub fn suffix(self) -> &'static str {
        match self {
            Slot::Card => "card",
            Slot::Avatar => "avatar",
            Slot::Nickname => "nickname",
            Slot::Username => "username",
            Slot::Sign => "sign",
            Slot::UserGroup => "usergroup",
            Slot::UserId => "userid",
        }
    }

    /// The stylesheet class of this slot.
    pub fn class(self) -> &'static str {
        match self {
            Slot::Card => CARD_CLASS,
            Slot::Avatar => "bc-avatar",
            Slot::Nickname => "bc-nickname",
            Slot::Username => "bc-username",
            Slot::Sign => "bc-sign",
            Slot::UserGroup => "bc-usergroup",
            Slot::UserId => "bc-userid",
        }
    }

    pub fn element_id(self, instance_id: &str) -> String {
        format!("{instance_id}-{}", self.suffix())
    }
}

/// A value computed from the fetched profile record.
///
/// Evaluation follows JavaScript semantics: `Or` yields the left value
/// when it is truthy, `Concat` stringifies both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(&'static str),
    /// The username the card was rendered for.
    User,
    /// A property path into the profile record, e.g. `avatar.large`.
    Field(&'static [&'static str]),
    Or(Box<Expr>, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn field(path: &'static [&'static str]) -> Self {
        Expr::Field(path)
    }

    pub fn or(self, fallback: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(fallback))
    }

    pub fn concat(self, other: Expr) -> Self {
        Expr::Concat(Box::new(self), Box::new(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SetText(Slot, Expr),
    AddClass(Slot, &'static str),
    RemoveClass(Slot, &'static str),
    /// Use the value as the slot's background image if it is truthy,
    /// and clear the placeholder background color.
    SetBackground(Slot, Expr),
}

/// Effects applied when the profile is fetched and parsed.
pub fn loaded_effects() -> Vec<Effect> {
    let avatar = Expr::field(&["avatar", "large"])
        .or(Expr::field(&["avatar", "medium"]))
        .or(Expr::field(&["avatar", "small"]));

    vec![
        Effect::SetBackground(Slot::Avatar, avatar),
        Effect::SetText(Slot::Nickname, Expr::field(&["nickname"]).or(Expr::User)),
        Effect::SetText(
            Slot::Username,
            Expr::Literal("@").concat(Expr::field(&["username"]).or(Expr::User)),
        ),
        Effect::SetText(
            Slot::Sign,
            Expr::field(&["sign"]).or(Expr::Literal(NO_SIGNATURE)),
        ),
        Effect::SetText(
            Slot::UserGroup,
            Expr::Literal("Groups attended: ")
                .concat(Expr::field(&["user_group"]).or(Expr::Literal("N/A"))),
        ),
        Effect::SetText(
            Slot::UserId,
            Expr::Literal("ID: ").concat(Expr::field(&["id"]).or(Expr::Literal("N/A"))),
        ),
        Effect::RemoveClass(Slot::Card, WAITING_CLASS),
    ]
}

/// Effects applied when the fetch, the status check or the body parse fails.
/// The avatar keeps its placeholder look.
pub fn errored_effects() -> Vec<Effect> {
    vec![
        Effect::AddClass(Slot::Card, ERROR_CLASS),
        Effect::SetText(Slot::Nickname, Expr::Literal(ERROR_TEXT)),
        Effect::SetText(Slot::Sign, Expr::Literal("")),
        Effect::SetText(Slot::UserGroup, Expr::Literal("")),
        Effect::SetText(Slot::UserId, Expr::Literal("")),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_slot_suffixes_are_distinct() {
        let mut slots = Slot::DATA.to_vec();
        slots.push(Slot::Card);
        let suffixes = slots.iter().map(|slot| slot.suffix()).collect::<HashSet<_>>();
        assert_eq!(suffixes.len(), slots.len());
        assert_eq!(Slot::UserGroup.element_id("BC1"), "BC1-usergroup");
    }

    #[test]
    fn test_error_keeps_avatar() {
        assert!(errored_effects().iter().all(|effect| !matches!(
            effect,
            Effect::SetBackground(..) | Effect::SetText(Slot::Avatar, _)
        )));
        assert!(!errored_effects().contains(&Effect::RemoveClass(Slot::Card, WAITING_CLASS)));
    }
}
