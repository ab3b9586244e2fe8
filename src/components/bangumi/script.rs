use std::fmt::Write;

use anyhow::Result;
use minijinja::context;

use crate::engine;

use super::{
    lifecycle::{errored_effects, loaded_effects, Effect, Expr, Slot},
    CardInstance,
};

const SCRIPT_TEMPLATE: &str = "blocks/bangumi-script.jinja";
// Effects are emitted inside the promise callbacks.
const INDENT: &str = "      ";

/// Generate the client script of `card`, fetching the profile from `endpoint`.
///
/// Every untrusted value is embedded as an escaped string literal, and every
/// element lookup is scoped under the card root, captured once.
pub fn generate(card: &CardInstance, endpoint: &str) -> Result<String> {
    let loaded = compile_effects(card, &loaded_effects())?;
    let errored = compile_effects(card, &errored_effects())?;
    let script = engine::render_lite(
        SCRIPT_TEMPLATE,
        context! {
            user => js_string(&card.username),
            card_id => js_string(&card.instance_id),
            root_id => js_string(&card.slot_id(Slot::Card)),
            endpoint => js_string(endpoint),
            loaded,
            errored,
        },
    )?;
    Ok(script)
}

fn compile_effects(card: &CardInstance, effects: &[Effect]) -> Result<String> {
    let mut js = String::new();
    for effect in effects {
        match effect {
            Effect::SetText(slot, expr) => {
                writeln!(js, "{INDENT}el = {};", lookup(card, *slot))?;
                writeln!(js, "{INDENT}if (el) el.textContent = {};", expr_js(expr))?;
            }
            Effect::AddClass(slot, class) => {
                writeln!(js, "{INDENT}el = {};", lookup(card, *slot))?;
                writeln!(js, "{INDENT}if (el) el.classList.add({});", js_string(class))?;
            }
            Effect::RemoveClass(slot, class) => {
                writeln!(js, "{INDENT}el = {};", lookup(card, *slot))?;
                writeln!(
                    js,
                    "{INDENT}if (el) el.classList.remove({});",
                    js_string(class)
                )?;
            }
            Effect::SetBackground(slot, expr) => {
                writeln!(js, "{INDENT}value = {};", expr_js(expr))?;
                writeln!(js, "{INDENT}el = value ? {} : null;", lookup(card, *slot))?;
                writeln!(js, "{INDENT}if (el) {{")?;
                writeln!(
                    js,
                    "{INDENT}  el.style.backgroundImage = \"url(\" + JSON.stringify(String(value)) + \")\";"
                )?;
                writeln!(js, "{INDENT}  el.style.backgroundColor = \"transparent\";")?;
                writeln!(js, "{INDENT}}}")?;
            }
        }
    }
    Ok(js.trim_end().to_owned())
}

// Element lookup, scoped under the captured root.
fn lookup(card: &CardInstance, slot: Slot) -> String {
    match slot {
        Slot::Card => "root".to_owned(),
        _ => format!(
            "root.querySelector({})",
            js_string(&format!("#{}", card.slot_id(slot)))
        ),
    }
}

fn expr_js(expr: &Expr) -> String {
    match expr {
        Expr::Literal(text) => js_string(text),
        Expr::User => "user".to_owned(),
        Expr::Field([name]) => format!("data.{name}"),
        Expr::Field(path) => {
            let steps = (1..=path.len())
                .map(|n| format!("data.{}", path[..n].join(".")))
                .collect::<Vec<_>>();
            format!("({})", steps.join(" && "))
        }
        Expr::Or(value, fallback) => format!("({} || {})", expr_js(value), expr_js(fallback)),
        Expr::Concat(left, right) => format!("{} + {}", expr_js(left), expr_js(right)),
    }
}

/// Encode `text` as a JavaScript string literal that is also safe inside
/// an HTML `<script>` element.
pub fn js_string(text: &str) -> String {
    let json = serde_json::Value::String(text.to_owned()).to_string();
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}
