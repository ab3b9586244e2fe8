use std::fmt::Write;

use anyhow::Result;
use pulldown_cmark::{html, CowStr, Event, Options, Parser};

use crate::{
    components::Components,
    directive::{self, Directive, Segment},
    node::Node,
};

/// Markdown html render with directive components.
///
/// The whole document goes through pulldown-cmark in one pass. Every
/// directive with a registered component is replaced by a placeholder
/// comment line beforehand, and the placeholder's html event is swapped
/// for the component's markup. Directives without a component are kept
/// as plain markdown.
pub struct MarkdownRender<'a> {
    components: &'a Components,
    options: Options,
}

impl<'a> MarkdownRender<'a> {
    pub fn new(components: &'a Components) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        MarkdownRender {
            components,
            options,
        }
    }

    /// Render markdown to HTML.
    pub fn render_html(&self, markdown: &str) -> Result<String> {
        let marker = placeholder_marker(markdown);
        let mut source = String::with_capacity(markdown.len());
        let mut rendered = Vec::new();

        for segment in directive::scan(markdown) {
            match segment {
                Segment::Markdown(text) => source.push_str(text),
                Segment::Directive(directive) => {
                    let Some(component) = self.components.get(directive.name) else {
                        source.push_str(directive.raw);
                        continue;
                    };

                    let _span = tracing::info_span!(
                        "directive",
                        name = directive.name,
                        line = directive.line
                    )
                    .entered();
                    let children = self.children(&directive)?;
                    let node = component.render(&directive.properties, &children)?;
                    let mut html = String::new();
                    node.write_html(&mut html)?;
                    html.push('\n');

                    // Keep the indentation so the placeholder stays in its list item.
                    let raw = directive.raw;
                    let indent = &raw[..raw.len() - raw.trim_start_matches(' ').len()];
                    writeln!(source, "{indent}<!--{marker}:{}-->", rendered.len())?;
                    rendered.push(html);
                }
            }
        }

        let parser = Parser::new_ext(&source, self.options).map(|event| match event {
            Event::Html(html) => match placeholder_index(&html, &marker)
                .and_then(|index| rendered.get(index))
            {
                Some(node) => Event::Html(CowStr::Borrowed(node.as_str())),
                None => Event::Html(html),
            },
            event => event,
        });
        let mut html = String::new();
        html::push_html(&mut html, parser);
        Ok(html)
    }

    // The label becomes a text child, a non-blank container body a rendered child.
    fn children(&self, directive: &Directive) -> Result<Vec<Node>> {
        let mut children = Vec::new();
        if let Some(label) = &directive.label {
            children.push(Node::text(label.as_str()));
        }
        if let Some(body) = directive.body.filter(|body| !body.trim().is_empty()) {
            children.push(Node::raw(self.render_html(body)?));
        }
        Ok(children)
    }
}

// A comment marker which never occurs in the source.
fn placeholder_marker(markdown: &str) -> String {
    let mut marker = String::from("bangumi-card-directive");
    while markdown.contains(marker.as_str()) {
        marker.push('-');
    }
    marker
}

fn placeholder_index(html: &str, marker: &str) -> Option<usize> {
    html.trim()
        .strip_prefix("<!--")?
        .strip_suffix("-->")?
        .strip_prefix(marker)?
        .strip_prefix(':')?
        .parse()
        .ok()
}
