use crate::types::Color;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use log::warn;

pub const LINE_BREAK: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Ordered,
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListContext {
    pub kind: ListKind,
    /// Only set for checkbox items.
    pub checked: Option<bool>,
    pub depth: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub highlighted: bool,
    pub highlight_color: Option<Color>,
    pub list: Option<ListContext>,
    pub indent: u8,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn line_break() -> Self {
        Self::plain(LINE_BREAK)
    }

    pub fn is_break(&self) -> bool {
        self.text == LINE_BREAK
    }
}

#[derive(Debug, Clone, Default)]
struct InlineStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    highlighted: bool,
    highlight_color: Option<Color>,
    list_kind: Option<ListKind>,
    list_item: Option<ListContext>,
    depth: u8,
}

#[derive(Default)]
struct RunCollector {
    runs: Vec<TextRun>,
}

impl RunCollector {
    fn at_line_start(&self) -> bool {
        self.runs.last().is_none_or(TextRun::is_break)
    }

    fn push_break(&mut self) {
        self.runs.push(TextRun::line_break());
    }

    fn push_text(&mut self, raw: &str, style: &InlineStyle) {
        let text = sanitize_text(&collapse_whitespace(raw));
        let text = if self.at_line_start() {
            text.trim_start().to_string()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        self.runs.push(TextRun {
            text,
            bold: style.bold,
            italic: style.italic,
            underline: style.underline,
            highlighted: style.highlighted,
            highlight_color: style.highlight_color,
            list: style.list_item,
            indent: style.depth,
        });
    }

    fn walk_children(&mut self, node: &NodeRef, style: &InlineStyle) {
        for child in node.children() {
            self.walk(&child, style);
        }
    }

    fn walk(&mut self, node: &NodeRef, style: &InlineStyle) {
        match node.data() {
            NodeData::Text(text) => {
                let text = text.borrow();
                self.push_text(&text, style);
            }
            NodeData::Element(element) => {
                let tag = element.name.local.to_ascii_lowercase().to_string();
                let attrs = element.attributes.borrow();
                let mut child_style = style.clone();
                if let Some(color) = highlight_of(&tag, attrs.get("data-color"), attrs.get("style"))
                {
                    child_style.highlighted = true;
                    child_style.highlight_color = color;
                }

                match tag.as_str() {
                    "br" => self.push_break(),
                    "script" | "style" | "input" | "head" | "title" | "template" => {}
                    "strong" | "b" => {
                        child_style.bold = true;
                        self.walk_children(node, &child_style);
                    }
                    "em" | "i" => {
                        child_style.italic = true;
                        self.walk_children(node, &child_style);
                    }
                    "u" => {
                        child_style.underline = true;
                        self.walk_children(node, &child_style);
                    }
                    "ul" | "ol" => {
                        let kind = if attrs.get("data-type") == Some("taskList") {
                            ListKind::Checkbox
                        } else if tag == "ol" {
                            ListKind::Ordered
                        } else {
                            ListKind::Bullet
                        };
                        if !self.at_line_start() {
                            self.push_break();
                        }
                        child_style.list_kind = Some(kind);
                        child_style.depth = style.depth.saturating_add(1);
                        self.walk_children(node, &child_style);
                    }
                    "li" => {
                        let checked_attr = attrs.get("data-checked");
                        let mut kind = style.list_kind.unwrap_or(ListKind::Bullet);
                        if checked_attr.is_some() {
                            kind = ListKind::Checkbox;
                        }
                        let checked = (kind == ListKind::Checkbox)
                            .then(|| checked_attr.is_some_and(|v| v.eq_ignore_ascii_case("true")));
                        child_style.list_item = Some(ListContext {
                            kind,
                            checked,
                            depth: style.depth.max(1),
                        });
                        child_style.depth = style.depth.max(1);
                        self.walk_children(node, &child_style);
                        self.push_break();
                    }
                    "p" | "div" | "blockquote" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5"
                    | "h6" => {
                        if tag.starts_with('h') && tag.len() == 2 {
                            child_style.bold = true;
                        }
                        // Closing a block always adds a break, even right after
                        // a nested block or a trailing <br>.
                        self.walk_children(node, &child_style);
                        self.push_break();
                    }
                    _ => self.walk_children(node, &child_style),
                }
            }
            NodeData::Document(_) | NodeData::DocumentFragment => self.walk_children(node, style),
            _ => {}
        }
    }
}

/// Returns `Some(color)` when the element paints a highlight; the inner
/// `None` means "use the default highlight color".
fn highlight_of(tag: &str, data_color: Option<&str>, style: Option<&str>) -> Option<Option<Color>> {
    let style_color = style.and_then(|style| {
        style.split(';').find_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim().to_ascii_lowercase();
            let paints = matches!(prop.as_str(), "background-color" | "background")
                && !matches!(value.as_str(), "transparent" | "none" | "inherit" | "initial");
            paints.then_some(value)
        })
    });
    if tag != "mark" && style_color.is_none() {
        return None;
    }
    let color = data_color
        .and_then(Color::from_css)
        .or_else(|| style_color.as_deref().and_then(Color::from_css));
    Some(color)
}

fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Replaces typographic and symbol characters with ASCII equivalents the
/// standard PDF fonts can show. One pass over the input, so a replacement is
/// never itself replaced.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let replacement = match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => "'",
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => "\"",
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => "-",
            '\u{2022}' | '\u{2023}' | '\u{2043}' | '\u{25E6}' | '\u{25AA}' | '\u{25AB}'
            | '\u{25CF}' | '\u{25CB}' | '\u{25A0}' | '\u{00B7}' => "-",
            '\u{2611}' | '\u{2612}' | '\u{2713}' | '\u{2714}' | '\u{2705}' => "[x]",
            '\u{2610}' | '\u{25A1}' => "[ ]",
            '\u{2192}' | '\u{279C}' | '\u{27A1}' => "->",
            '\u{2190}' => "<-",
            '\u{2194}' => "<->",
            '\u{21D2}' => "=>",
            '\u{21D0}' => "<=",
            '\u{2026}' => "...",
            '\u{00A9}' => "(c)",
            '\u{00AE}' => "(R)",
            '\u{2122}' => "(TM)",
            '\u{2265}' => ">=",
            '\u{2264}' => "<=",
            '\u{2260}' => "!=",
            '\u{00B1}' => "+/-",
            '\u{00D7}' => "x",
            '\u{00F7}' => "/",
            '\u{00B0}' => " deg",
            '\u{20AC}' => "EUR",
            '\u{00A3}' => "GBP",
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2009}' => " ",
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => "",
            _ => {
                out.push(ch);
                continue;
            }
        };
        out.push_str(replacement);
    }
    out
}

/// Parses an editor HTML fragment into text runs. Never fails: input the
/// walker cannot place degrades to a single unstyled run of its text.
pub fn parse_runs(html: &str) -> Vec<TextRun> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let document = kuchiki::parse_html().one(html);
    let mut collector = RunCollector::default();
    match document.select_first("body") {
        Ok(body) => collector.walk_children(body.as_node(), &InlineStyle::default()),
        Err(()) => warn!("rich text has no body; falling back to plain text"),
    }
    if collector.runs.is_empty() {
        let text = normalize_text(&document.text_contents());
        if !text.is_empty() {
            return vec![TextRun::plain(text)];
        }
    }
    collector.runs
}

/// Tag-stripped, sanitized, trimmed text of a fragment.
pub fn plain_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = kuchiki::parse_html().one(html);
    normalize_text(&document.text_contents())
}

fn normalize_text(raw: &str) -> String {
    sanitize_text(&collapse_whitespace(raw)).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(runs: &[TextRun]) -> Vec<&str> {
        runs.iter().map(|run| run.text.as_str()).collect()
    }

    #[test]
    fn paragraphs_end_with_one_break_and_br_adds_one() {
        let runs = parse_runs("<p>One<br>Two</p><p>Three</p>");
        assert_eq!(texts(&runs), vec!["One", "\n", "Two", "\n", "Three", "\n"]);
    }

    #[test]
    fn nested_styles_combine_and_do_not_leak() {
        let runs = parse_runs("<p><em>a <strong>b</strong></em> c</p>");
        assert_eq!(texts(&runs), vec!["a ", "b", " c", "\n"]);
        assert!(runs[0].italic && !runs[0].bold);
        assert!(runs[1].italic && runs[1].bold);
        assert!(!runs[2].italic && !runs[2].bold);
    }

    #[test]
    fn entities_are_decoded_and_symbols_sanitized() {
        let runs = parse_runs("<p>&ldquo;Slab&rdquo; &amp; pier &mdash; &#9745; done</p>");
        assert_eq!(runs[0].text, "\"Slab\" & pier - [x] done");
        assert!(runs[0].text.is_ascii());
    }

    #[test]
    fn sanitization_covers_quote_dash_and_checkbox() {
        let out = sanitize_text("\"\u{201D}\u{2014}\u{2611}");
        assert_eq!(out, "\"\"-[x]");
        assert!(out.is_ascii());
        assert_eq!(sanitize_text("\u{2610} \u{2192} \u{2122}"), "[ ] -> (TM)");
        assert_eq!(sanitize_text("Ünïcode stays"), "Ünïcode stays");
    }

    #[test]
    fn highlight_reads_data_color() {
        let runs = parse_runs(r##"<p>x <mark data-color="#ff0000">hot</mark></p>"##);
        let hot = &runs[1];
        assert!(hot.highlighted);
        assert_eq!(hot.highlight_color, Some(Color::rgb8(255, 0, 0)));
        assert!(!runs[0].highlighted);

        let runs = parse_runs(r#"<p><span style="background-color: rgb(0, 255, 0)">go</span></p>"#);
        assert!(runs[0].highlighted);
        assert_eq!(runs[0].highlight_color, Some(Color::rgb8(0, 255, 0)));

        let runs = parse_runs("<p><mark>plain</mark></p>");
        assert!(runs[0].highlighted);
        assert_eq!(runs[0].highlight_color, None);
    }

    #[test]
    fn bullet_and_ordered_lists_carry_context_and_depth() {
        let runs = parse_runs("<ul><li>A<ul><li>B</li></ul></li></ul><ol><li>C</li></ol>");
        assert_eq!(texts(&runs), vec!["A", "\n", "B", "\n", "\n", "C", "\n"]);
        let a = runs[0].list.expect("list");
        assert_eq!((a.kind, a.depth), (ListKind::Bullet, 1));
        let b = runs[2].list.expect("list");
        assert_eq!((b.kind, b.depth, runs[2].indent), (ListKind::Bullet, 2, 2));
        assert_eq!(runs[5].list.map(|l| l.kind), Some(ListKind::Ordered));
    }

    #[test]
    fn task_list_items_capture_checked_state() {
        let html = r#"<ul data-type="taskList">
            <li data-checked="true"><label><input type="checkbox" checked></label><div><p>Done</p></div></li>
            <li data-checked="false"><label><input type="checkbox"></label><div><p>Todo</p></div></li>
        </ul>"#;
        let runs = parse_runs(html);
        // p, div and li each close with their own break.
        assert_eq!(
            texts(&runs),
            vec!["Done", "\n", "\n", "\n", "Todo", "\n", "\n", "\n"]
        );
        assert_eq!(runs[0].list.and_then(|l| l.checked), Some(true));
        assert_eq!(runs[4].list.and_then(|l| l.checked), Some(false));
        assert_eq!(runs[0].list.map(|l| l.kind), Some(ListKind::Checkbox));
    }

    #[test]
    fn nested_blocks_and_trailing_br_each_add_a_break() {
        assert_eq!(texts(&parse_runs("<div><p>x</p></div>")), vec!["x", "\n", "\n"]);
        assert_eq!(texts(&parse_runs("<ul><li><p>x</p></li></ul>")), vec!["x", "\n", "\n"]);
        assert_eq!(texts(&parse_runs("<p>a<br></p>")), vec!["a", "\n", "\n"]);
        assert_eq!(texts(&parse_runs("<p></p>")), vec!["\n"]);
    }

    #[test]
    fn odd_color_attributes_never_panic() {
        let runs = parse_runs("<p><mark data-color=\"#€\">hot</mark></p>");
        assert!(runs[0].highlighted);
        assert_eq!(runs[0].highlight_color, None);

        let runs = parse_runs(r#"<p><span style="background-color:#€€">warm</span></p>"#);
        assert!(runs[0].highlighted);
        assert_eq!(runs[0].highlight_color, None);

        let runs = parse_runs(r#"<p><span style="background-color:rgb(1,2">a</span><span style=";;:">b</span></p>"#);
        assert_eq!(texts(&runs), vec!["a", "b", "\n"]);
        assert!(runs[0].highlighted && !runs[1].highlighted);
    }

    #[test]
    fn malformed_markup_still_yields_text() {
        let runs = parse_runs("<p><b>unclosed <i>tags");
        assert_eq!(plain_text("<p><b>unclosed <i>tags"), "unclosed tags");
        assert_eq!(texts(&runs).concat(), "unclosed tags\n");

        let runs = parse_runs("just text");
        assert_eq!(texts(&runs), vec!["just text"]);
        assert!(parse_runs("   ").is_empty());
    }

    #[test]
    fn plain_text_strips_tags() {
        assert_eq!(plain_text("<p> Poured <b>today</b></p>"), "Poured today");
        assert_eq!(plain_text("<p><br></p>"), "");
    }
}
