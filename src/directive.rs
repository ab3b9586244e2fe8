use std::collections::BTreeMap;

/// Directive attributes, keyed by attribute name.
pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `::name[label]{attrs}` on a line of its own.
    Leaf,
    /// `:::name[label]{attrs}` ... `:::`
    Container,
}

/// A block directive found in markdown source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub name: &'a str,
    pub kind: DirectiveKind,
    /// The `[label]` part. An empty label is treated as absent.
    pub label: Option<String>,
    pub properties: Properties,
    /// Body between the container fences, `None` for leaf directives.
    pub body: Option<&'a str>,
    /// The whole directive source, fences included.
    pub raw: &'a str,
    /// 1-based line of the opening fence.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Markdown(&'a str),
    Directive(Directive<'a>),
}

// The head of a directive: colon count, name, label and attributes.
#[derive(Debug, PartialEq, Eq)]
struct Head<'a> {
    colons: usize,
    name: &'a str,
    label: Option<String>,
    properties: Properties,
}

/// Split markdown into plain markdown runs and block directives.
///
/// Lines inside fenced code blocks are never treated as directives.
/// An unclosed container directive extends to the end of the document.
pub fn scan(markdown: &str) -> Vec<Segment<'_>> {
    let lines = line_offsets(markdown);
    let mut segments = Vec::new();
    let mut run_start = 0;
    let mut fence: Option<Fence> = None;
    let mut i = 0;

    while i < lines.len() {
        let (offset, line) = lines[i];
        let content = strip_line_ending(line);

        if let Some(open) = fence {
            if open.is_closed_by(content) {
                fence = None;
            }
            i += 1;
            continue;
        }
        if let Some(open) = Fence::open(content) {
            fence = Some(open);
            i += 1;
            continue;
        }

        let Some(head) = parse_head(content) else {
            i += 1;
            continue;
        };

        if run_start < offset {
            segments.push(Segment::Markdown(&markdown[run_start..offset]));
        }

        let (kind, body, end, next) = if head.colons == 2 {
            (DirectiveKind::Leaf, None, offset + line.len(), i + 1)
        } else {
            let (body_end, end, next) = find_container_end(markdown, &lines, i + 1, head.colons);
            let body_start = offset + line.len();
            (
                DirectiveKind::Container,
                Some(&markdown[body_start..body_end]),
                end,
                next,
            )
        };

        segments.push(Segment::Directive(Directive {
            name: head.name,
            kind,
            label: head.label,
            properties: head.properties,
            body,
            raw: &markdown[offset..end],
            line: i + 1,
        }));
        run_start = end;
        i = next;
    }

    if run_start < markdown.len() {
        segments.push(Segment::Markdown(&markdown[run_start..]));
    }
    segments
}

// Returns (body end offset, directive end offset, next line index).
fn find_container_end(
    markdown: &str,
    lines: &[(usize, &str)],
    from: usize,
    colons: usize,
) -> (usize, usize, usize) {
    let mut fence: Option<Fence> = None;
    for (i, &(offset, line)) in lines.iter().enumerate().skip(from) {
        let content = strip_line_ending(line);
        if let Some(open) = fence {
            if open.is_closed_by(content) {
                fence = None;
            }
            continue;
        }
        if let Some(open) = Fence::open(content) {
            fence = Some(open);
            continue;
        }
        let trimmed = content.trim();
        if trimmed.len() >= colons && trimmed.chars().all(|c| c == ':') {
            return (offset, offset + line.len(), i + 1);
        }
    }
    (markdown.len(), markdown.len(), lines.len())
}

fn line_offsets(markdown: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    markdown
        .split_inclusive('\n')
        .map(|line| {
            let item = (offset, line);
            offset += line.len();
            item
        })
        .collect()
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

// At most three spaces of indentation, otherwise it's an indented code block.
fn strip_indent(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        None
    } else {
        Some(trimmed)
    }
}

/// An open fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        let line = strip_indent(line)?;
        let marker = line.chars().next().filter(|c| matches!(c, '`' | '~'))?;
        let len = line.chars().take_while(|&c| c == marker).count();
        if len < 3 {
            return None;
        }
        // Backtick fences can't have backticks in the info string.
        if marker == '`' && line[len..].contains('`') {
            return None;
        }
        Some(Fence { marker, len })
    }

    fn is_closed_by(&self, line: &str) -> bool {
        let Some(line) = strip_indent(line) else {
            return false;
        };
        let len = line.chars().take_while(|&c| c == self.marker).count();
        len >= self.len && line[len * self.marker.len_utf8()..].trim().is_empty()
    }
}

fn parse_head(line: &str) -> Option<Head<'_>> {
    let line = strip_indent(line)?.trim_end();
    let colons = line.chars().take_while(|&c| c == ':').count();
    if colons < 2 {
        return None;
    }
    let rest = &line[colons..];

    let name_len = rest
        .char_indices()
        .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .map_or(rest.len(), |(i, _)| i);
    let name = &rest[..name_len];
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut rest = &rest[name_len..];

    let mut label = None;
    if let Some(after) = rest.strip_prefix('[') {
        let end = find_label_end(after)?;
        let text = after[..end].trim();
        if !text.is_empty() {
            label = Some(text.to_owned());
        }
        rest = &after[end + 1..];
    }

    let mut properties = Properties::new();
    if let Some(after) = rest.strip_prefix('{') {
        let end = find_attrs_end(after)?;
        properties = parse_attrs(&after[..end]);
        rest = &after[end + 1..];
    }

    if !rest.trim().is_empty() {
        return None;
    }

    Some(Head {
        colons,
        name,
        label,
        properties,
    })
}

// Byte offset of the `]` closing the label, nested brackets allowed.
fn find_label_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' if depth == 0 => return Some(i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

// Byte offset of the `}` closing the attribute list, skipping quoted values.
fn find_attrs_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '}') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

/// Parse directive attributes.
///
/// Handles `key="quoted"`, `key='quoted'`, `key=bare`, `#id`, `.class`
/// and bare `key` (an empty value). Quoted values support `\"`, `\'`
/// and `\\` escapes. Repeated `.class` tokens accumulate.
fn parse_attrs(input: &str) -> Properties {
    let mut properties = Properties::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('#').or_else(|| rest.strip_prefix('.')) {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            let value = &after[..end];
            if rest.starts_with('#') {
                properties.insert("id".to_owned(), value.to_owned());
            } else {
                let class = properties.entry("class".to_owned()).or_default();
                if !class.is_empty() {
                    class.push(' ');
                }
                class.push_str(value);
            }
            rest = after[end..].trim_start();
            continue;
        }

        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        let after_key = rest[key_end..].trim_start();

        let Some(after_eq) = after_key.strip_prefix('=') else {
            // Bare attribute.
            if !key.is_empty() {
                properties.insert(key.to_owned(), String::new());
            }
            rest = after_key;
            continue;
        };
        let after_eq = after_eq.trim_start();

        let (value, remaining) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let quoted = &after_eq[1..];
                let end = scan_quoted_value(quoted, quote);
                (
                    unescape_quoted(&quoted[..end]),
                    quoted.get(end + 1..).unwrap_or(""),
                )
            }
            _ => {
                let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                (after_eq[..end].to_owned(), &after_eq[end..])
            }
        };
        if !key.is_empty() {
            properties.insert(key.to_owned(), value);
        }
        rest = remaining.trim_start();
    }

    properties
}

// Byte offset of the closing quote, or the end of the string if unclosed.
fn scan_quoted_value(s: &str, quote: char) -> usize {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == quote => return i,
            _ => {}
        }
    }
    s.len()
}

fn unescape_quoted(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(c @ ('"' | '\'' | '\\')) => result.push(c),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn directives(markdown: &str) -> Vec<Directive<'_>> {
        scan(markdown)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Directive(directive) => Some(directive),
                _ => None,
            })
            .collect()
    }

    #[test_case(r#"user="sai""#, &[("user", "sai")]; "double quoted")]
    #[test_case("user='sai'", &[("user", "sai")]; "single quoted")]
    #[test_case("user=sai", &[("user", "sai")]; "bare value")]
    #[test_case(r#"user = "sai""#, &[("user", "sai")]; "spaces around eq")]
    #[test_case(r#"user="a \"b\" \\ c""#, &[("user", r#"a "b" \ c"#)]; "escapes")]
    #[test_case(r#"user="a}b""#, &[("user", "a}b")]; "brace in quotes")]
    #[test_case("#main .a .b user=x", &[("id", "main"), ("class", "a b"), ("user", "x")]; "id and classes")]
    #[test_case("user", &[("user", "")]; "bare key")]
    #[test_case(r#"user="unclosed"#, &[("user", "unclosed")]; "unclosed quote")]
    #[test_case("", &[]; "empty")]
    fn test_parse_attrs(input: &str, expected: &[(&str, &str)]) {
        assert_eq!(parse_attrs(input), props(expected));
    }

    #[test]
    fn test_parse_leaf_head() {
        let head = parse_head(r#"::bangumi{user="sai"}"#).unwrap();
        assert_eq!(head.colons, 2);
        assert_eq!(head.name, "bangumi");
        assert_eq!(head.label, None);
        assert_eq!(head.properties, props(&[("user", "sai")]));

        let head = parse_head(r#"  ::bangumi[my [nested] card]{user="sai"}  "#).unwrap();
        assert_eq!(head.label.as_deref(), Some("my [nested] card"));

        let head = parse_head("::bangumi[]").unwrap();
        assert_eq!(head.label, None);
    }

    #[test_case("plain text"; "text")]
    #[test_case(":bangumi{user=x}"; "text directive")]
    #[test_case("::{user=x}"; "no name")]
    #[test_case("::1card"; "name starts with digit")]
    #[test_case("::bangumi{user=x} trailing"; "trailing text")]
    #[test_case("::bangumi{user=\"x\""; "unclosed attrs")]
    #[test_case("::bangumi[label"; "unclosed label")]
    #[test_case("    ::bangumi{user=x}"; "indented code")]
    fn test_not_a_head(line: &str) {
        assert_eq!(parse_head(line), None);
    }

    #[test]
    fn test_scan_segments() {
        let markdown = "# Title\n\n::bangumi{user=\"sai\"}\n\nAfter\n";
        let segments = scan(markdown);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Markdown("# Title\n\n"));
        match &segments[1] {
            Segment::Directive(directive) => {
                assert_eq!(directive.kind, DirectiveKind::Leaf);
                assert_eq!(directive.raw, "::bangumi{user=\"sai\"}\n");
                assert_eq!(directive.line, 3);
                assert_eq!(directive.label, None);
                assert_eq!(directive.body, None);
            }
            other => panic!("unexpected segment: {other:?}"),
        }
        assert_eq!(segments[2], Segment::Markdown("\nAfter\n"));
    }

    #[test]
    fn test_scan_container() {
        let markdown = "::: bangumi\n:::bangumi{user=sai}\nHello *there*\n:::\ntail";
        let found = directives(markdown);
        assert_eq!(found.len(), 1);
        let directive = &found[0];
        assert_eq!(directive.kind, DirectiveKind::Container);
        assert_eq!(directive.line, 2);
        assert_eq!(directive.body, Some("Hello *there*\n"));
        assert_eq!(directive.raw, ":::bangumi{user=sai}\nHello *there*\n:::\n");
    }

    #[test]
    fn test_scan_container_blank_body() {
        let found = directives("::::bangumi{user=sai}\n\n::::\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body.map(str::trim), Some(""));
    }

    #[test]
    fn test_scan_unclosed_container() {
        let markdown = ":::bangumi{user=sai}\nbody\n";
        let found = directives(markdown);
        assert_eq!(found[0].body, Some("body\n"));
        assert_eq!(found[0].raw, markdown);
    }

    #[test]
    fn test_scan_skips_code_fences() {
        let markdown = "```markdown\n::bangumi{user=\"sai\"}\n```\n~~~~\n::bangumi{user=x}\n~~~\n~~~~\n::bangumi{user=y}\n";
        let found = directives(markdown);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].properties["user"], "y");
        assert_eq!(found[0].line, 8);
    }

    #[test]
    fn test_scan_container_closing_inside_code() {
        let markdown = ":::bangumi{user=sai}\n```\n:::\n```\n:::\n";
        let found = directives(markdown);
        assert_eq!(found[0].body, Some("```\n:::\n```\n"));
    }

    #[test]
    fn test_scan_crlf() {
        let found = directives("text\r\n::bangumi{user=sai}\r\nmore\r\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, "::bangumi{user=sai}\r\n");
    }
}
