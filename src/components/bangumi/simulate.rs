//! Offline run of a card's client lifecycle.
//!
//! The simulator applies the same effect lists the client script is compiled
//! from to a copy of the rendered card, so the final DOM state of a card can
//! be checked without a browser.

use std::fmt;

use serde_json::Value;

use crate::{error::CardError, node::Element};

use super::lifecycle::{errored_effects, loaded_effects, Effect, Expr, Lifecycle, Slot};

/// How the profile fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Response { status: u16, body: String },
    NetworkError(String),
}

impl FetchOutcome {
    pub fn ok(body: impl Into<String>) -> Self {
        FetchOutcome::Response {
            status: 200,
            body: body.into(),
        }
    }
}

/// The card after its lifecycle settled.
#[derive(Debug, Clone)]
pub struct CardState {
    pub lifecycle: Lifecycle,
    pub instance_id: String,
    pub root: Element,
}

impl CardState {
    pub fn slot(&self, slot: Slot) -> Option<&Element> {
        match slot {
            Slot::Card => Some(&self.root),
            _ => self.root.find_by_id(&slot.element_id(&self.instance_id)),
        }
    }

    pub fn text(&self, slot: Slot) -> Option<String> {
        self.slot(slot).map(Element::text_content)
    }

    pub fn classes(&self) -> Vec<&str> {
        self.root.class_list().collect()
    }

    /// A declaration of the slot's inline style.
    pub fn style(&self, slot: Slot, property: &str) -> Option<String> {
        let style = self.slot(slot)?.get_attr("style")?;
        split_styles(style)
            .into_iter()
            .find(|(name, _)| *name == property)
            .map(|(_, value)| value.to_owned())
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "card {} ({})", self.instance_id, self.lifecycle)?;
        writeln!(f, "  classes: {}", self.classes().join(" "))?;
        if let Some(background) = self.style(Slot::Avatar, "background-image") {
            writeln!(f, "  avatar: {background}")?;
        }
        for slot in Slot::DATA.into_iter().filter(|slot| *slot != Slot::Avatar) {
            match self.text(slot) {
                Some(text) => writeln!(f, "  {}: {text:?}", slot.suffix())?,
                None => writeln!(f, "  {}: <missing>", slot.suffix())?,
            }
        }
        Ok(())
    }
}

/// Run the client lifecycle of a rendered `card` against a fetch `outcome`.
///
/// The card is identified by its `data-card-uuid` and `data-user` attributes.
/// Slots removed from the card are skipped, like the client script does.
pub fn simulate(card: &Element, outcome: &FetchOutcome) -> Result<CardState, CardError> {
    let (Some(instance_id), Some(user)) =
        (card.get_attr("data-card-uuid"), card.get_attr("data-user"))
    else {
        return Err(CardError::NotACard);
    };

    let mut state = CardState {
        lifecycle: Lifecycle::Loading,
        instance_id: instance_id.to_owned(),
        root: card.clone(),
    };
    let context = Context {
        user: user.to_owned(),
        data: Value::Null,
    };

    let (lifecycle, context) = match outcome {
        FetchOutcome::Response { status, body } if (200..300).contains(status) => {
            match serde_json::from_str::<Value>(body) {
                // Mirrors the `typeof data === "object"` check of the script.
                Ok(data @ (Value::Object(_) | Value::Array(_))) => {
                    (Lifecycle::Loaded, Context { data, ..context })
                }
                Ok(_) => (Lifecycle::Errored, context),
                Err(err) => {
                    tracing::debug!("Profile body is not JSON: {err}");
                    (Lifecycle::Errored, context)
                }
            }
        }
        _ => (Lifecycle::Errored, context),
    };

    let effects = match lifecycle {
        Lifecycle::Loaded => loaded_effects(),
        _ => errored_effects(),
    };
    for effect in &effects {
        apply(&mut state, effect, &context);
    }
    state.lifecycle = lifecycle;
    Ok(state)
}

struct Context {
    user: String,
    data: Value,
}

fn slot_mut<'a>(state: &'a mut CardState, slot: Slot) -> Option<&'a mut Element> {
    match slot {
        Slot::Card => Some(&mut state.root),
        _ => {
            let id = slot.element_id(&state.instance_id);
            state.root.find_by_id_mut(&id)
        }
    }
}

fn apply(state: &mut CardState, effect: &Effect, context: &Context) {
    match effect {
        Effect::SetText(slot, expr) => {
            let text = match eval(expr, context) {
                // `textContent = null` clears the element.
                JsValue::Json(Value::Null) => String::new(),
                value => value.to_js_string(),
            };
            if let Some(element) = slot_mut(state, *slot) {
                element.set_text(text);
            }
        }
        Effect::AddClass(slot, class) => {
            if let Some(element) = slot_mut(state, *slot) {
                element.add_class(class);
            }
        }
        Effect::RemoveClass(slot, class) => {
            if let Some(element) = slot_mut(state, *slot) {
                element.remove_class(class);
            }
        }
        Effect::SetBackground(slot, expr) => {
            let value = eval(expr, context);
            if !value.is_truthy() {
                return;
            }
            let url = serde_json::Value::String(value.to_js_string()).to_string();
            if let Some(element) = slot_mut(state, *slot) {
                set_style(element, "background-image", &format!("url({url})"));
                set_style(element, "background-color", "transparent");
            }
        }
    }
}

/// A JavaScript value as seen by the client script.
#[derive(Debug, Clone, PartialEq)]
enum JsValue {
    Undefined,
    Json(Value),
}

impl JsValue {
    fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Json(Value::Null) => false,
            JsValue::Json(Value::Bool(b)) => *b,
            JsValue::Json(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
            JsValue::Json(Value::String(s)) => !s.is_empty(),
            JsValue::Json(Value::Array(_) | Value::Object(_)) => true,
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_owned(),
            JsValue::Json(value) => json_to_js_string(value),
        }
    }
}

fn json_to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        // `Array.prototype.toString`: null and undefined items become empty.
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                item => json_to_js_string(item),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

fn eval(expr: &Expr, context: &Context) -> JsValue {
    match expr {
        Expr::Literal(text) => JsValue::Json(Value::String((*text).to_owned())),
        Expr::User => JsValue::Json(Value::String(context.user.clone())),
        Expr::Field(path) => {
            // `data.a && data.a.b`: stop at the first falsy step.
            let mut current = JsValue::Json(context.data.clone());
            for name in path.iter() {
                let next = match &current {
                    JsValue::Json(Value::Object(map)) => map
                        .get(*name)
                        .cloned()
                        .map_or(JsValue::Undefined, JsValue::Json),
                    _ => JsValue::Undefined,
                };
                current = next;
                if !current.is_truthy() {
                    break;
                }
            }
            current
        }
        Expr::Or(value, fallback) => {
            let value = eval(value, context);
            if value.is_truthy() {
                value
            } else {
                eval(fallback, context)
            }
        }
        Expr::Concat(left, right) => {
            let mut text = eval(left, context).to_js_string();
            text.push_str(&eval(right, context).to_js_string());
            JsValue::Json(Value::String(text))
        }
    }
}

fn split_styles(style: &str) -> Vec<(&str, &str)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            Some((name.trim(), value.trim()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn set_style(element: &mut Element, property: &str, value: &str) {
    let style = element.get_attr("style").unwrap_or_default().to_owned();
    let mut declarations = split_styles(&style)
        .into_iter()
        .filter(|(name, _)| *name != property)
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>();
    declarations.push(format!("{property}: {value};"));
    element.set_attr("style", declarations.join(" "));
}
