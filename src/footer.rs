use crate::canvas::{Command, Document};
use crate::font::{StandardFont, measure_text_width};
use crate::types::{Color, Pt};

pub const DEFAULT_FOOTER_TEMPLATE: &str = "Page {page} of {pages}";

/// Footer stamped onto every page once the page total is known.
#[derive(Debug, Clone)]
pub struct FooterSpec {
    /// Right-aligned text; `{page}` and `{pages}` are substituted.
    pub template: String,
    /// Left-aligned text, typically the job name.
    pub left_text: String,
    pub margin_x: Pt,
    pub y_from_bottom: Pt,
    pub font_size: Pt,
    pub color: Color,
    pub rule_color: Option<Color>,
}

impl Default for FooterSpec {
    fn default() -> Self {
        Self {
            template: DEFAULT_FOOTER_TEMPLATE.to_string(),
            left_text: String::new(),
            margin_x: Pt::from_f32(40.0),
            y_from_bottom: Pt::from_f32(24.0),
            font_size: Pt::from_f32(8.0),
            color: Color::rgb8(110, 110, 110),
            rule_color: Some(Color::rgb8(210, 210, 210)),
        }
    }
}

pub fn substitute_placeholders(template: &str, page: usize, pages: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{pages}", &pages.to_string())
}

/// Appends footer commands to each page. Runs after layout, so commands are
/// pushed wrapped in a save/restore pair and never disturb page state.
pub fn apply_page_footer(doc: &mut Document, spec: &FooterSpec) {
    let total_pages = doc.pages.len();
    if total_pages == 0 {
        return;
    }
    let font = StandardFont::Helvetica;
    let page_width = doc.page_size.width;
    // Top-left origin; DrawString takes the top of the text box.
    let y = (doc.page_size.height - spec.y_from_bottom - spec.font_size).max(Pt::ZERO);

    for (idx0, page) in doc.pages.iter_mut().enumerate() {
        let text = substitute_placeholders(&spec.template, idx0 + 1, total_pages);
        let text_width = measure_text_width(font, spec.font_size, &text);

        page.commands.push(Command::SaveState);
        if let Some(rule_color) = spec.rule_color {
            let rule_y = y - Pt::from_f32(4.0);
            page.commands.push(Command::SetStrokeColor(rule_color));
            page.commands.push(Command::SetLineWidth(Pt::from_f32(0.5)));
            page.commands.push(Command::MoveTo {
                x: spec.margin_x,
                y: rule_y,
            });
            page.commands.push(Command::LineTo {
                x: page_width - spec.margin_x,
                y: rule_y,
            });
            page.commands.push(Command::Stroke);
        }
        page.commands.push(Command::SetFillColor(spec.color));
        page.commands.push(Command::SetFont(font));
        page.commands.push(Command::SetFontSize(spec.font_size));
        if !spec.left_text.is_empty() {
            page.commands.push(Command::DrawString {
                x: spec.margin_x,
                y,
                text: spec.left_text.clone(),
            });
        }
        page.commands.push(Command::DrawString {
            x: (page_width - spec.margin_x - text_width).max(Pt::ZERO),
            y,
            text,
        });
        page.commands.push(Command::RestoreState);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;

    #[test]
    fn every_page_gets_its_number_and_the_total() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "one");
        canvas.show_page();
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "two");
        canvas.show_page();
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "three");
        let mut doc = canvas.finish();

        let spec = FooterSpec {
            left_text: "J-1042".to_string(),
            ..FooterSpec::default()
        };
        apply_page_footer(&mut doc, &spec);

        for (idx, page) in doc.pages.iter().enumerate() {
            let strings: Vec<&str> = page.strings().collect();
            assert!(strings.contains(&"J-1042"));
            let expected = format!("Page {} of 3", idx + 1);
            assert_eq!(strings.last(), Some(&expected.as_str()));
        }
    }

    #[test]
    fn page_number_is_right_aligned_to_the_margin() {
        let mut doc = Canvas::new(Size::a4()).finish();
        let spec = FooterSpec::default();
        apply_page_footer(&mut doc, &spec);
        let (x, text) = doc.pages[0]
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawString { x, text, .. } => Some((*x, text.clone())),
                _ => None,
            })
            .expect("footer text");
        assert_eq!(text, "Page 1 of 1");
        let right = x + measure_text_width(StandardFont::Helvetica, spec.font_size, &text);
        let expected = doc.page_size.width - spec.margin_x;
        assert!((right.to_f32() - expected.to_f32()).abs() < 0.01);
    }

    #[test]
    fn placeholders_substitute_repeatedly() {
        assert_eq!(substitute_placeholders("{page}/{pages} ({page})", 2, 5), "2/5 (2)");
    }
}
