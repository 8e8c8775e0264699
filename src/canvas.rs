use crate::assets::EmbeddedImage;
use crate::font::StandardFont;
use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;

// Bezier handle length for quarter circles.
const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    // Non-rendered metadata describing what was laid out. Ignored by the PDF writer.
    Meta {
        key: String,
        value: String,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFont(StandardFont),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    Stroke,
    // `y` is the top of the text box; the writer derives the baseline.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, EmbeddedImage>,
}

#[derive(Debug)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font: StandardFont,
    font_size: Pt,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font: StandardFont::Helvetica,
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Page-structured drawing surface. Coordinates are top-left origin.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    current_state: GraphicsState,
    images: BTreeMap<String, EmbeddedImage>,
    image_ids: BTreeMap<String, String>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            current_state: GraphicsState::default(),
            images: BTreeMap::new(),
            image_ids: BTreeMap::new(),
        }
    }

    /// Number of pages including the one being drawn.
    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.current.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, font: StandardFont) {
        if self.current_state.font == font {
            return;
        }
        self.current_state.font = font;
        self.current.commands.push(Command::SetFont(font));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, x: Pt, y: Pt) {
        self.current.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.current.commands.push(Command::ClosePath);
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.stroke();
    }

    pub fn stroke_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close_path();
        self.stroke();
    }

    pub fn fill_rounded_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, radius: Pt) {
        let radius = radius.min(width / 2).min(height / 2).max(Pt::ZERO);
        if radius == Pt::ZERO {
            self.draw_rect(x, y, width, height);
            return;
        }
        let k = radius * KAPPA;
        let right = x + width;
        let bottom = y + height;
        self.move_to(x + radius, y);
        self.line_to(right - radius, y);
        self.curve_to(right - radius + k, y, right, y + radius - k, right, y + radius);
        self.line_to(right, bottom - radius);
        self.curve_to(
            right,
            bottom - radius + k,
            right - radius + k,
            bottom,
            right - radius,
            bottom,
        );
        self.line_to(x + radius, bottom);
        self.curve_to(x + radius - k, bottom, x, bottom - radius + k, x, bottom - radius);
        self.line_to(x, y + radius);
        self.curve_to(x, y + radius - k, x + radius - k, y, x + radius, y);
        self.close_path();
        self.fill();
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.current.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    /// Registers image data once per distinct content and returns its resource id.
    pub fn register_image(&mut self, image: EmbeddedImage) -> String {
        if let Some(existing) = self.image_ids.get(&image.content_hash) {
            return existing.clone();
        }
        let resource_id = format!("Im{}", self.images.len() + 1);
        self.image_ids
            .insert(image.content_hash.clone(), resource_id.clone());
        self.images.insert(resource_id.clone(), image);
        resource_id
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.current_state = GraphicsState::default();
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changes_are_deduplicated_per_page() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_fill_color(Color::WHITE);
        canvas.set_fill_color(Color::WHITE);
        canvas.set_font(StandardFont::HelveticaBold);
        canvas.set_font(StandardFont::HelveticaBold);
        assert_eq!(canvas.current.commands.len(), 2);

        canvas.show_page();
        canvas.set_fill_color(Color::WHITE);
        assert_eq!(canvas.page_count(), 2);
        let doc = canvas.finish();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].commands, vec![Command::SetFillColor(Color::WHITE)]);
    }

    #[test]
    fn empty_canvas_still_yields_one_page() {
        let doc = Canvas::new(Size::a4()).finish();
        assert_eq!(doc.pages.len(), 1);
    }

    #[test]
    fn identical_images_share_one_resource() {
        let image = crate::assets::decode_image(&crate::assets::tests::png_bytes(3, 3))
            .expect("decode");
        let mut canvas = Canvas::new(Size::a4());
        let first = canvas.register_image(image.clone());
        let second = canvas.register_image(image);
        assert_eq!(first, "Im1");
        assert_eq!(first, second);
        assert_eq!(canvas.finish().images.len(), 1);
    }
}
