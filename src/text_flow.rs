use crate::canvas::Canvas;
use crate::font::{StandardFont, measure_text_width};
use crate::markup::{self, ListContext, ListKind, TextRun};
use crate::types::{Color, Pt};
use log::debug;

/// Creates a new page on demand and returns the top of its content area.
/// The renderer never creates pages itself.
pub trait PageBreaker {
    fn break_page(&mut self, canvas: &mut Canvas) -> Pt;
}

pub enum FlowTarget<'a> {
    DryRun,
    Draw {
        canvas: &'a mut Canvas,
        breaker: Option<&'a mut dyn PageBreaker>,
    },
}

impl<'a> FlowTarget<'a> {
    pub fn draw(canvas: &'a mut Canvas, breaker: &'a mut dyn PageBreaker) -> Self {
        FlowTarget::Draw {
            canvas,
            breaker: Some(breaker),
        }
    }

    fn canvas(&mut self) -> Option<&mut Canvas> {
        match self {
            FlowTarget::Draw { canvas, .. } => Some(&mut **canvas),
            FlowTarget::DryRun => None,
        }
    }

    fn break_page(&mut self) -> Option<Pt> {
        match self {
            FlowTarget::Draw {
                canvas,
                breaker: Some(breaker),
            } => Some(breaker.break_page(&mut **canvas)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowStyle {
    pub font_size: Pt,
    pub line_height: Pt,
    pub indent_step: Pt,
    pub marker_width: Pt,
    pub ink: Color,
    pub highlight: Color,
    pub checked: Color,
}

impl Default for FlowStyle {
    fn default() -> Self {
        Self {
            font_size: Pt::from_f32(10.0),
            line_height: Pt::from_f32(14.0),
            indent_step: Pt::from_f32(12.0),
            marker_width: Pt::from_f32(12.0),
            ink: Color::rgb8(33, 33, 33),
            highlight: Color::rgb8(255, 240, 102),
            checked: Color::rgb8(46, 158, 79),
        }
    }
}

// Write position plus the column it is confined to. Owned by one render.
#[derive(Debug, Clone, Copy)]
struct LayoutCursor {
    x: Pt,
    y: Pt,
    start_x: Pt,
    width: Pt,
    max_y: Pt,
}

impl LayoutCursor {
    fn new(x: Pt, y: Pt, width: Pt, max_y: Pt) -> Self {
        Self {
            x,
            y,
            start_x: x,
            width,
            max_y,
        }
    }

    fn remaining(&self) -> Pt {
        (self.width - (self.x - self.start_x)).max(Pt::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextFlow {
    style: FlowStyle,
}

impl TextFlow {
    pub fn new(style: FlowStyle) -> Self {
        Self { style }
    }

    pub fn line_height(&self) -> Pt {
        self.style.line_height
    }

    /// Lays out `runs` starting at (`x`, `y`) and returns the y just below the
    /// last line. `DryRun` takes the same path without drawing or breaking
    /// pages, so it predicts the live height whenever no break intervenes.
    pub fn render(
        &self,
        runs: &[TextRun],
        x: Pt,
        y: Pt,
        width: Pt,
        max_y: Pt,
        mut target: FlowTarget<'_>,
    ) -> Pt {
        let lh = self.style.line_height;
        let mut cursor = LayoutCursor::new(x, y, width, max_y);
        let mut at_line_start = true;

        for run in runs {
            if run.is_break() {
                cursor.y += lh;
                cursor.x = cursor.start_x;
                at_line_start = true;
                if cursor.y > cursor.max_y {
                    if let Some(top) = target.break_page() {
                        debug!("text flow: forced break crossed the column bottom");
                        cursor.y = top;
                    }
                }
                continue;
            }

            let indent_x = cursor.start_x + self.style.indent_step * i32::from(run.indent);
            if at_line_start {
                cursor.x = indent_x;
                self.ensure_line_fits(&mut cursor, indent_x, &mut target);
                if let Some(list) = run.list {
                    self.draw_marker(list, &cursor, &mut target);
                    cursor.x += self.style.marker_width;
                }
                at_line_start = false;
            }

            let font = StandardFont::select(run.bold, run.italic);
            let continuation_width = (cursor.width - (indent_x - cursor.start_x)).max(Pt::ZERO);
            let lines = wrap_text(
                &run.text,
                font,
                self.style.font_size,
                cursor.remaining(),
                continuation_width,
            );

            for (idx, line) in lines.iter().enumerate() {
                if idx > 0 {
                    cursor.y += lh;
                    cursor.x = indent_x;
                    self.ensure_line_fits(&mut cursor, indent_x, &mut target);
                }
                let line_width = measure_text_width(font, self.style.font_size, line);
                if let Some(canvas) = target.canvas() {
                    self.draw_line(canvas, run, font, line, cursor.x, cursor.y, line_width);
                }
                cursor.x += line_width;
            }
        }

        cursor.y + lh
    }

    pub fn measure_runs(&self, runs: &[TextRun], width: Pt) -> Pt {
        self.render(runs, Pt::ZERO, Pt::ZERO, width, Pt::unbounded(), FlowTarget::DryRun)
    }

    /// Height the fragment occupies when rendered into a column of `width`.
    pub fn measure_height(&self, html: &str, width: Pt) -> Pt {
        self.measure_runs(&markup::parse_runs(html), width)
    }

    fn ensure_line_fits(&self, cursor: &mut LayoutCursor, indent_x: Pt, target: &mut FlowTarget<'_>) {
        if cursor.y + self.style.line_height <= cursor.max_y {
            return;
        }
        if let Some(top) = target.break_page() {
            debug!("text flow: line overflowed at y={:.1}, continuing on a new page", cursor.y.to_f32());
            cursor.y = top;
            cursor.x = indent_x;
        }
    }

    fn draw_marker(&self, list: ListContext, cursor: &LayoutCursor, target: &mut FlowTarget<'_>) {
        let Some(canvas) = target.canvas() else {
            return;
        };
        let style = &self.style;
        match list.kind {
            ListKind::Checkbox => {
                let side = style.font_size * 0.8;
                let top = cursor.y + (style.line_height - side) / 2;
                canvas.set_stroke_color(style.ink);
                canvas.set_line_width(Pt::from_f32(0.75));
                canvas.stroke_rect(cursor.x, top, side, side);
                if list.checked == Some(true) {
                    let inset = Pt::from_f32(2.0);
                    canvas.set_fill_color(style.checked);
                    canvas.draw_rect(cursor.x + inset, top + inset, side - inset * 2, side - inset * 2);
                    canvas.set_fill_color(style.ink);
                }
            }
            ListKind::Bullet | ListKind::Ordered => {
                let marker = if list.kind == ListKind::Bullet { "-" } else { "1." };
                canvas.set_fill_color(style.ink);
                canvas.set_font(StandardFont::Helvetica);
                canvas.set_font_size(style.font_size);
                canvas.draw_string(cursor.x, self.text_top(cursor.y), marker);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_line(
        &self,
        canvas: &mut Canvas,
        run: &TextRun,
        font: StandardFont,
        line: &str,
        x: Pt,
        y: Pt,
        width: Pt,
    ) {
        if line.is_empty() {
            return;
        }
        let style = &self.style;
        if run.highlighted && !line.trim().is_empty() {
            canvas.set_fill_color(run.highlight_color.unwrap_or(style.highlight));
            canvas.draw_rect(x, y, width, style.line_height);
        }
        canvas.set_fill_color(style.ink);
        canvas.set_font(font);
        canvas.set_font_size(style.font_size);
        canvas.draw_string(x, self.text_top(y), line);
        if run.underline {
            let rule_y = self.text_top(y) + style.font_size + Pt::from_f32(1.2);
            canvas.set_stroke_color(style.ink);
            canvas.set_line_width(Pt::from_f32(0.5));
            canvas.line(x, rule_y, x + width, rule_y);
        }
    }

    fn text_top(&self, line_y: Pt) -> Pt {
        line_y + (self.style.line_height - self.style.font_size) * 0.3
    }
}

/// Greedy word wrap. The first line has `first_width` left; later lines get
/// `full_width`. An empty first line means the run starts on the next line.
/// Only the last line keeps its trailing whitespace, so a following run
/// continues after it.
fn wrap_text(
    text: &str,
    font: StandardFont,
    size: Pt,
    first_width: Pt,
    full_width: Pt,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut limit = first_width;
    let fits = |candidate: &str, limit: Pt| measure_text_width(font, size, candidate.trim_end()) <= limit;

    for token in text.split_inclusive(' ') {
        let mut candidate = current.clone();
        candidate.push_str(token);
        if fits(&candidate, limit) {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(current.trim_end().to_string());
            current.clear();
            limit = full_width;
        } else if lines.is_empty() && limit < full_width {
            lines.push(String::new());
            limit = full_width;
        }

        let mut rest = if current.is_empty() && !lines.is_empty() {
            token.trim_start()
        } else {
            token
        };
        while !fits(rest, limit) {
            let split = split_point(rest, font, size, limit);
            lines.push(rest[..split].to_string());
            rest = &rest[split..];
            limit = full_width;
            if rest.trim().is_empty() {
                break;
            }
        }
        current.push_str(rest);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Byte offset of the longest prefix that fits; always at least one char.
fn split_point(word: &str, font: StandardFont, size: Pt, limit: Pt) -> usize {
    let mut end = 0;
    for (idx, ch) in word.char_indices() {
        let next = idx + ch.len_utf8();
        if end > 0 && measure_text_width(font, size, &word[..next]) > limit {
            break;
        }
        end = next;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    struct CountingBreaker {
        calls: usize,
        top: Pt,
    }

    impl PageBreaker for CountingBreaker {
        fn break_page(&mut self, canvas: &mut Canvas) -> Pt {
            canvas.show_page();
            self.calls += 1;
            self.top
        }
    }

    fn drawn_strings(doc: &crate::canvas::Document) -> Vec<String> {
        doc.pages
            .iter()
            .flat_map(|page| page.strings().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    #[test]
    fn dry_run_height_matches_live_render() {
        let html = r#"<p>Check <strong>slab levels</strong> against the engineering set and
            <mark>confirm</mark> with the site supervisor before pouring.</p>
            <ul><li>Reo chairs<ul><li>spacing 600</li></ul></li></ul>
            <ol><li>Termite barrier</li></ol>
            <ul data-type="taskList"><li data-checked="true"><p>Inspected</p></li></ul>"#;
        let flow = TextFlow::default();
        let runs = markup::parse_runs(html);
        let width = Pt::from_f32(180.0);
        let y = Pt::from_f32(50.0);

        let dry = flow.render(&runs, Pt::from_f32(40.0), y, width, Pt::unbounded(), FlowTarget::DryRun);
        let mut canvas = Canvas::new(Size::a4());
        let live = flow.render(
            &runs,
            Pt::from_f32(40.0),
            y,
            width,
            Pt::unbounded(),
            FlowTarget::Draw {
                canvas: &mut canvas,
                breaker: None,
            },
        );
        assert_eq!(dry, live);
        assert_eq!(flow.measure_height(html, width), dry - y);
        assert!(flow.measure_height(html, width) > flow.line_height() * 6);
    }

    #[test]
    fn forced_break_past_bottom_requests_exactly_one_page() {
        let flow = TextFlow::default();
        let lh = flow.line_height();
        let top = Pt::from_f32(100.0);
        let runs = vec![TextRun::plain("A"), TextRun::line_break(), TextRun::plain("B")];
        let mut canvas = Canvas::new(Size::a4());
        let mut breaker = CountingBreaker { calls: 0, top };

        let next = flow.render(
            &runs,
            Pt::from_f32(40.0),
            top,
            Pt::from_f32(200.0),
            top + lh,
            FlowTarget::draw(&mut canvas, &mut breaker),
        );

        assert_eq!(breaker.calls, 1);
        assert_eq!(next, top + lh);
        let doc = canvas.finish();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].strings().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(doc.pages[1].strings().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn page_breaks_neither_drop_nor_duplicate_words() {
        let words: Vec<String> = (0..60).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let flow = TextFlow::default();
        let top = Pt::from_f32(60.0);
        let mut canvas = Canvas::new(Size::a4());
        let mut breaker = CountingBreaker { calls: 0, top };

        flow.render(
            &[TextRun::plain(text.clone())],
            Pt::from_f32(40.0),
            top,
            Pt::from_f32(150.0),
            top + flow.line_height() * 4,
            FlowTarget::draw(&mut canvas, &mut breaker),
        );

        assert!(breaker.calls >= 2);
        let doc = canvas.finish();
        assert_eq!(doc.pages.len(), breaker.calls + 1);
        assert_eq!(drawn_strings(&doc).join(" "), text);
    }

    #[test]
    fn dry_run_never_calls_the_breaker() {
        let flow = TextFlow::default();
        let runs = markup::parse_runs("<p>one</p><p>two</p><p>three</p>");
        let y = Pt::from_f32(10.0);
        let next = flow.render(&runs, Pt::ZERO, y, Pt::from_f32(100.0), y, FlowTarget::DryRun);
        assert_eq!(next, y + flow.line_height() * 4);
    }

    #[test]
    fn over_long_words_split_by_character() {
        let size = FlowStyle::default().font_size;
        let limit = Pt::from_f32(30.0);
        let lines = wrap_text("Supercalifragilistic", StandardFont::Helvetica, size, limit, limit);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "Supercalifragilistic");
        for line in &lines {
            assert!(measure_text_width(StandardFont::Helvetica, size, line) <= limit);
        }
    }

    #[test]
    fn run_that_cannot_start_mid_line_moves_to_next_line() {
        let size = Pt::from_f32(10.0);
        let lines = wrap_text("continues", StandardFont::Helvetica, size, Pt::from_f32(5.0), Pt::from_f32(200.0));
        assert_eq!(lines, vec![String::new(), "continues".to_string()]);
    }

    #[test]
    fn checked_box_fills_green_and_highlight_restores_ink() {
        let flow = TextFlow::default();
        let runs = markup::parse_runs(
            r#"<ul data-type="taskList"><li data-checked="true"><p>Set out <mark>hot</mark></p></li></ul>"#,
        );
        let mut canvas = Canvas::new(Size::a4());
        flow.render(
            &runs,
            Pt::from_f32(40.0),
            Pt::from_f32(40.0),
            Pt::from_f32(300.0),
            Pt::unbounded(),
            FlowTarget::Draw {
                canvas: &mut canvas,
                breaker: None,
            },
        );
        let doc = canvas.finish();
        let commands = &doc.pages[0].commands;
        let style = FlowStyle::default();

        assert!(commands.contains(&Command::Stroke));
        let green = commands
            .iter()
            .position(|cmd| *cmd == Command::SetFillColor(style.checked))
            .expect("checked fill");
        assert!(matches!(commands[green + 1], Command::DrawRect { .. }));

        let hot = commands
            .iter()
            .position(|cmd| matches!(cmd, Command::DrawString { text, .. } if text == "hot"))
            .expect("highlighted text");
        let band = commands[..hot]
            .iter()
            .rposition(|cmd| *cmd == Command::SetFillColor(style.highlight))
            .expect("highlight band");
        let last_fill = commands[..hot]
            .iter()
            .rposition(|cmd| matches!(cmd, Command::SetFillColor(_)))
            .expect("fill before text");
        assert!(band < last_fill);
        assert_eq!(commands[last_fill], Command::SetFillColor(style.ink));
    }
}
