use crate::assets::{self, EmbeddedImage, ImageFetcher};
use crate::canvas::{Canvas, Document};
use crate::error::Result;
use crate::font::{StandardFont, measure_text_width};
use crate::footer::{self, DEFAULT_FOOTER_TEMPLATE, FooterSpec};
use crate::markup::{self, TextRun};
use crate::model::{AnswerState, ImageSource, Item, ReportDocument, Section};
use crate::progress::{Checkpoint, proportional};
use crate::text_flow::{FlowStyle, FlowTarget, PageBreaker, TextFlow};
use crate::types::{Color, Margins, Pt, Size};
use log::{debug, info, warn};

const PILL_HEIGHT: f32 = 12.0;
const PILL_PADDING: f32 = 6.0;
const PILL_FONT_SIZE: f32 = 8.0;
const TITLE_PILL_GAP: f32 = 8.0;
const SECTION_BAR_HEIGHT: f32 = 20.0;
const SECTION_FONT_SIZE: f32 = 11.0;
const SECTION_BAR_GAP: f32 = 6.0;
const NOTES_PADDING: f32 = 6.0;
const NOTES_INSET: f32 = 10.0;
const NOTES_BAR_WIDTH: f32 = 3.0;
const BLOCK_GAP: f32 = 4.0;
const DIVIDER_SPACE: f32 = 8.0;
const CAPTION_FONT_SIZE: f32 = 8.0;

/// Page geometry and look of a report. Built and validated by `ReportBuilder`.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub page_size: Size,
    pub margins: Margins,
    pub header_height: Pt,
    pub logo_max_height: Pt,
    pub flow: FlowStyle,
    pub image_max_height: Pt,
    pub grid_gap: Pt,
    pub footer_template: String,
    pub section_fill: Color,
    pub notes_fill: Color,
    pub notes_accent: Color,
    pub rule_color: Color,
    pub muted_text: Color,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(40.0),
            header_height: Pt::from_f32(64.0),
            logo_max_height: Pt::from_f32(40.0),
            flow: FlowStyle::default(),
            image_max_height: Pt::from_f32(180.0),
            grid_gap: Pt::from_f32(10.0),
            footer_template: DEFAULT_FOOTER_TEMPLATE.to_string(),
            section_fill: Color::rgb8(226, 232, 240),
            notes_fill: Color::rgb8(255, 248, 225),
            notes_accent: Color::rgb8(232, 135, 26),
            rule_color: Color::rgb8(200, 200, 200),
            muted_text: Color::rgb8(100, 100, 100),
        }
    }
}

impl ReportLayout {
    fn geometry(&self) -> PageGeometry {
        let left = self.margins.left;
        let right = self.page_size.width - self.margins.right;
        let top = self.margins.top;
        PageGeometry {
            left,
            right,
            width: right - left,
            top,
            content_top: top + self.header_height,
            max_y: self.page_size.height - self.margins.bottom,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PageGeometry {
    left: Pt,
    right: Pt,
    width: Pt,
    top: Pt,
    content_top: Pt,
    max_y: Pt,
}

#[derive(Debug, Clone)]
struct PlacedLogo {
    resource_id: String,
    width: Pt,
    height: Pt,
}

struct PageChrome {
    job_name: String,
    title: String,
    meta_line: String,
    logo: Option<PlacedLogo>,
    geometry: PageGeometry,
    header_height: Pt,
    ink: Color,
    muted: Color,
    rule_color: Color,
}

impl PageChrome {
    fn begin_page(&mut self, canvas: &mut Canvas) -> Pt {
        let g = self.geometry;
        let logo_width = self.logo.as_ref().map_or(Pt::ZERO, |logo| logo.width + Pt::from_f32(12.0));
        let text_width = (g.width - logo_width).max(Pt::ZERO);

        canvas.set_fill_color(self.ink);
        if !self.job_name.is_empty() {
            let size = Pt::from_f32(14.0);
            canvas.set_font(StandardFont::HelveticaBold);
            canvas.set_font_size(size);
            let text = fit_text(&self.job_name, StandardFont::HelveticaBold, size, text_width);
            canvas.draw_string(g.left, g.top, text);
        }
        let size = Pt::from_f32(11.0);
        canvas.set_font(StandardFont::Helvetica);
        canvas.set_font_size(size);
        let title = fit_text(&self.title, StandardFont::Helvetica, size, text_width);
        canvas.draw_string(g.left, g.top + Pt::from_f32(19.0), title);

        if !self.meta_line.is_empty() {
            let size = Pt::from_f32(9.0);
            canvas.set_fill_color(self.muted);
            canvas.set_font_size(size);
            let meta = fit_text(&self.meta_line, StandardFont::Helvetica, size, text_width);
            canvas.draw_string(g.left, g.top + Pt::from_f32(35.0), meta);
        }

        if let Some(logo) = &self.logo {
            canvas.draw_image(
                g.right - logo.width,
                g.top,
                logo.width,
                logo.height,
                logo.resource_id.clone(),
            );
        }

        let rule_y = g.top + self.header_height - Pt::from_f32(8.0);
        canvas.set_stroke_color(self.rule_color);
        canvas.set_line_width(Pt::from_f32(0.75));
        canvas.line(g.left, rule_y, g.right, rule_y);
        g.content_top
    }
}

impl PageBreaker for PageChrome {
    fn break_page(&mut self, canvas: &mut Canvas) -> Pt {
        canvas.show_page();
        debug!("report: started page {}", canvas.page_count());
        self.begin_page(canvas)
    }
}

// An item pre-measured against the current layout, ready to draw.
struct ItemBlock {
    title_runs: Vec<TextRun>,
    description_runs: Vec<TextRun>,
    notes_runs: Vec<TextRun>,
    pill_width: Pt,
    title_width: Pt,
    notes_width: Pt,
    notes_height: Pt,
    height: Pt,
}

struct PendingImage {
    source: ImageSource,
    caption: String,
}

struct PlacedImage {
    resource_id: String,
    width: Pt,
    height: Pt,
    caption: String,
}

struct PageWriter<'a> {
    layout: &'a ReportLayout,
    geometry: PageGeometry,
    flow: TextFlow,
    canvas: Canvas,
    chrome: PageChrome,
    y: Pt,
    percent: u8,
}

impl<'a> PageWriter<'a> {
    fn new(layout: &'a ReportLayout, mut chrome: PageChrome, mut canvas: Canvas) -> Self {
        let y = chrome.begin_page(&mut canvas);
        Self {
            layout,
            geometry: chrome.geometry,
            flow: TextFlow::new(layout.flow),
            canvas,
            chrome,
            y,
            percent: 10,
        }
    }
}

impl PageWriter<'_> {
    fn at_top(&self) -> bool {
        self.y <= self.geometry.content_top
    }

    fn new_page(&mut self) {
        self.y = self.chrome.break_page(&mut self.canvas);
    }

    fn ensure_space(&mut self, height: Pt) {
        if self.y + height > self.geometry.max_y && !self.at_top() {
            debug!(
                "report: block of {:.1}pt does not fit at y={:.1}, breaking page",
                height.to_f32(),
                self.y.to_f32()
            );
            self.new_page();
        }
    }

    /// Draws the shaded "{number}. {name}" bar, keeping it on the same page
    /// as the first item block (`lead`) when that block fits on one page.
    fn draw_section_bar(&mut self, section: &Section, lead: Pt) {
        let g = self.geometry;
        let bar = Pt::from_f32(SECTION_BAR_HEIGHT);
        let below = Pt::from_f32(SECTION_BAR_GAP);
        let page_capacity = g.max_y - g.content_top;
        let needed = if bar + below + lead <= page_capacity {
            bar + below + lead
        } else {
            bar + below + self.flow.line_height()
        };
        self.ensure_space(needed);

        let label = markup::sanitize_text(&format!("{}. {}", section.number, section.name));
        let size = Pt::from_f32(SECTION_FONT_SIZE);
        self.canvas.meta("report.section", label.clone());
        self.canvas.set_fill_color(self.layout.section_fill);
        self.canvas.draw_rect(g.left, self.y, g.width, bar);
        self.canvas.set_fill_color(self.layout.flow.ink);
        self.canvas.set_font(StandardFont::HelveticaBold);
        self.canvas.set_font_size(size);
        let text = fit_text(
            &label,
            StandardFont::HelveticaBold,
            size,
            g.width - Pt::from_f32(12.0),
        );
        self.canvas
            .draw_string(g.left + Pt::from_f32(6.0), centered_text_top(self.y, bar, size), text);
        self.y += bar + below;
    }

    fn notes_height(&self, runs: &[TextRun], width: Pt) -> Pt {
        if runs.is_empty() {
            return Pt::ZERO;
        }
        Pt::from_f32(NOTES_PADDING) + self.flow.line_height() + self.flow.measure_runs(runs, width)
    }

    fn measure_item(&self, item: &Item) -> ItemBlock {
        let g = self.geometry;
        let lh = self.flow.line_height();
        let pill_size = Pt::from_f32(PILL_FONT_SIZE);
        let pill_width = measure_text_width(
            StandardFont::HelveticaBold,
            pill_size,
            item.answer_state.short_label(),
        ) + Pt::from_f32(PILL_PADDING) * 2;
        let title_width = (g.width - pill_width - Pt::from_f32(TITLE_PILL_GAP)).max(lh);
        let notes_width = g.width - Pt::from_f32(NOTES_INSET + NOTES_PADDING);

        let title_runs = vec![TextRun {
            text: markup::sanitize_text(&item.name),
            bold: true,
            ..TextRun::default()
        }];
        let description_runs = markup::parse_runs(&item.description_html);
        let notes_runs = if item.has_notes() {
            markup::parse_runs(&item.notes_html)
        } else {
            Vec::new()
        };

        let title_height = self
            .flow
            .measure_runs(&title_runs, title_width)
            .max(Pt::from_f32(PILL_HEIGHT));
        let description_height = if description_runs.is_empty() {
            Pt::ZERO
        } else {
            self.flow.measure_runs(&description_runs, g.width)
        };
        let notes_height = self.notes_height(&notes_runs, notes_width);
        let height = title_height
            + description_height
            + notes_height
            + Pt::from_f32(BLOCK_GAP)
            + Pt::from_f32(DIVIDER_SPACE);
        ItemBlock {
            title_runs,
            description_runs,
            notes_runs,
            pill_width,
            title_width,
            notes_width,
            notes_height,
            height,
        }
    }

    fn draw_item(&mut self, item: &Item, block: ItemBlock, pending: &mut Vec<PendingImage>) {
        let g = self.geometry;
        let lh = self.flow.line_height();
        let ItemBlock {
            title_runs,
            description_runs,
            notes_runs,
            pill_width,
            title_width,
            notes_width,
            notes_height,
            height,
        } = block;
        self.ensure_space(height);

        self.canvas.meta("report.item", item.name.clone());
        let top = self.y;
        self.draw_pill(
            item.answer_state,
            g.right - pill_width,
            top + (lh - Pt::from_f32(PILL_HEIGHT)) / 2,
            pill_width,
        );
        let next = self.flow.render(
            &title_runs,
            g.left,
            top,
            title_width,
            g.max_y,
            FlowTarget::draw(&mut self.canvas, &mut self.chrome),
        );
        self.y = next.max(top + Pt::from_f32(PILL_HEIGHT));

        if !description_runs.is_empty() {
            self.y = self.flow.render(
                &description_runs,
                g.left,
                self.y,
                g.width,
                g.max_y,
                FlowTarget::draw(&mut self.canvas, &mut self.chrome),
            );
        }

        if !notes_runs.is_empty() {
            self.draw_notes(&notes_runs, notes_height, notes_width);
        }

        let rule_y = self.y + Pt::from_f32(DIVIDER_SPACE) / 2;
        self.canvas.set_stroke_color(self.layout.rule_color);
        self.canvas.set_line_width(Pt::from_f32(0.5));
        self.canvas.line(g.left, rule_y, g.right, rule_y);
        self.y += Pt::from_f32(DIVIDER_SPACE);

        for image in &item.images {
            let caption = if image.caption.trim().is_empty() {
                item.name.clone()
            } else {
                format!("{} - {}", item.name, image.caption.trim())
            };
            pending.push(PendingImage {
                source: image.source.clone(),
                caption: markup::sanitize_text(&caption),
            });
        }
    }

    fn draw_pill(&mut self, state: AnswerState, x: Pt, y: Pt, width: Pt) {
        let height = Pt::from_f32(PILL_HEIGHT);
        let size = Pt::from_f32(PILL_FONT_SIZE);
        let label = state.short_label();
        self.canvas.meta("report.pill", label);
        self.canvas.set_fill_color(state.pill_color());
        self.canvas.fill_rounded_rect(x, y, width, height, height / 2);
        self.canvas.set_fill_color(Color::WHITE);
        self.canvas.set_font(StandardFont::HelveticaBold);
        self.canvas.set_font_size(size);
        let text_width = measure_text_width(StandardFont::HelveticaBold, size, label);
        self.canvas.draw_string(
            x + (width - text_width) / 2,
            centered_text_top(y, height, size),
            label,
        );
    }

    fn draw_notes(&mut self, runs: &[TextRun], height: Pt, text_width: Pt) {
        let g = self.geometry;
        let lh = self.flow.line_height();
        let page_capacity = g.max_y - g.content_top;
        // A callout that fits on a fresh page moves there whole.
        if self.y + height > g.max_y && height <= page_capacity && !self.at_top() {
            self.new_page();
        }

        let top = self.y + Pt::from_f32(BLOCK_GAP) / 2;
        let painted = height.min(g.max_y - top).max(Pt::ZERO);
        self.canvas.set_fill_color(self.layout.notes_fill);
        self.canvas.draw_rect(g.left, top, g.width, painted);
        self.canvas.set_fill_color(self.layout.notes_accent);
        self.canvas
            .draw_rect(g.left, top, Pt::from_f32(NOTES_BAR_WIDTH), painted);

        let text_x = g.left + Pt::from_f32(NOTES_INSET);
        let label_size = Pt::from_f32(PILL_FONT_SIZE);
        self.canvas.set_font(StandardFont::HelveticaBold);
        self.canvas.set_font_size(label_size);
        self.canvas
            .draw_string(text_x, top + Pt::from_f32(NOTES_PADDING), "NOTES:");

        let pages_before = self.canvas.page_count();
        let next = self.flow.render(
            runs,
            text_x,
            top + Pt::from_f32(NOTES_PADDING) + lh,
            text_width,
            g.max_y,
            FlowTarget::draw(&mut self.canvas, &mut self.chrome),
        );
        self.y = if self.canvas.page_count() == pages_before {
            top + height
        } else {
            next
        };
        self.y += Pt::from_f32(BLOCK_GAP) / 2;
    }

    async fn draw_images(
        &mut self,
        pending: Vec<PendingImage>,
        fetcher: &dyn ImageFetcher,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let total = pending.len();
        let mut resolved: Vec<(EmbeddedImage, String)> = Vec::with_capacity(total);
        for (idx, image) in pending.into_iter().enumerate() {
            checkpoint.check(
                &format!("Loading image {} of {}", idx + 1, total),
                self.percent,
            )?;
            match load_image(&image.source, fetcher).await {
                Ok(embedded) => resolved.push((embedded, image.caption)),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => warn!("skipping image '{}': {err}", image.caption),
            }
        }

        let g = self.geometry;
        let gap = self.layout.grid_gap;
        let cell_width = (g.width - gap) / 2;
        let mut placed = Vec::with_capacity(resolved.len());
        for (image, caption) in resolved {
            let (width, height) =
                fit_cell(image.aspect_ratio(), cell_width, self.layout.image_max_height);
            let resource_id = self.canvas.register_image(image);
            placed.push(PlacedImage {
                resource_id,
                width,
                height,
                caption,
            });
        }

        let caption_size = Pt::from_f32(CAPTION_FONT_SIZE);
        let caption_line = self.flow.line_height();
        for row in placed.chunks(2) {
            let image_height = row.iter().map(|cell| cell.height).fold(Pt::ZERO, Pt::max);
            self.ensure_space(image_height + caption_line);
            for (col, cell) in row.iter().enumerate() {
                let cell_x = g.left + (cell_width + gap) * col as i32;
                self.canvas.meta("report.image", cell.caption.clone());
                self.canvas.draw_image(
                    cell_x + (cell_width - cell.width) / 2,
                    self.y,
                    cell.width,
                    cell.height,
                    cell.resource_id.clone(),
                );
                self.canvas.set_fill_color(self.layout.muted_text);
                self.canvas.set_font(StandardFont::Helvetica);
                self.canvas.set_font_size(caption_size);
                let text = fit_text(&cell.caption, StandardFont::Helvetica, caption_size, cell_width);
                self.canvas
                    .draw_string(cell_x, self.y + image_height + Pt::from_f32(3.0), text);
            }
            self.y += image_height + caption_line + gap;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReportAssembler {
    layout: ReportLayout,
}

impl ReportAssembler {
    pub fn new(layout: ReportLayout) -> Self {
        Self { layout }
    }

    /// Cancellation is observed before each item and each image fetch.
    pub async fn assemble(
        &self,
        document: &ReportDocument,
        logo: Option<&ImageSource>,
        fetcher: &dyn ImageFetcher,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<Document> {
        let layout = &self.layout;
        let geometry = layout.geometry();
        info!(
            "assembling checklist report '{}' ({} sections)",
            document.title,
            document.sections.len()
        );

        checkpoint.check("Loading branding", 10)?;
        let mut canvas = Canvas::new(layout.page_size);
        let logo = match logo {
            Some(source) => match load_image(source, fetcher).await {
                Ok(image) => Some(self.place_logo(&mut canvas, image)),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!("logo could not be loaded, continuing without it: {err}");
                    None
                }
            },
            None => None,
        };

        let chrome = PageChrome {
            job_name: markup::sanitize_text(&document.job.job_name),
            title: markup::sanitize_text(&document.title),
            meta_line: metadata_line(document),
            logo,
            geometry,
            header_height: layout.header_height,
            ink: layout.flow.ink,
            muted: layout.muted_text,
            rule_color: layout.rule_color,
        };
        let mut writer = PageWriter::new(layout, chrome, canvas);

        let total = document.visible_item_count();
        let mut done = 0usize;
        for section in &document.sections {
            if !section.is_visible() {
                debug!(
                    "report: section {} '{}' has no printable items, skipped",
                    section.number, section.name
                );
                continue;
            }
            let lead = section
                .visible_items()
                .next()
                .map_or(Pt::ZERO, |item| writer.measure_item(item).height);
            writer.draw_section_bar(section, lead);
            let mut pending = Vec::new();
            for item in section.visible_items() {
                writer.percent = proportional(10, 80, done, total);
                checkpoint.check(
                    &format!("Adding {}. {}: {}", section.number, section.name, item.name),
                    writer.percent,
                )?;
                let block = writer.measure_item(item);
                writer.draw_item(item, block, &mut pending);
                done += 1;
            }
            writer.draw_images(pending, fetcher, checkpoint).await?;
        }

        let mut output = writer.canvas.finish();
        let footer_spec = FooterSpec {
            template: layout.footer_template.clone(),
            left_text: markup::sanitize_text(&document.job.job_name),
            margin_x: layout.margins.left,
            color: layout.muted_text,
            ..FooterSpec::default()
        };
        footer::apply_page_footer(&mut output, &footer_spec);
        info!(
            "assembled checklist report '{}': {} items on {} pages",
            document.title,
            done,
            output.pages.len()
        );
        Ok(output)
    }

    /// Fixed height; the width follows the logo's own aspect ratio.
    fn place_logo(&self, canvas: &mut Canvas, image: EmbeddedImage) -> PlacedLogo {
        let height = self.layout.logo_max_height;
        let width = height / image.aspect_ratio();
        let resource_id = canvas.register_image(image);
        PlacedLogo {
            resource_id,
            width,
            height,
        }
    }
}

async fn load_image(source: &ImageSource, fetcher: &dyn ImageFetcher) -> Result<EmbeddedImage> {
    let bytes = assets::resolve_image_bytes(source, fetcher).await?;
    assets::decode_image(&bytes)
}

/// `client | status | revision | date`, skipping blank parts. The date
/// defaults to today.
fn metadata_line(document: &ReportDocument) -> String {
    let date = document
        .job
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive())
        .format("%d/%m/%Y")
        .to_string();
    let parts = [
        document.job.client_name.trim(),
        document.status_label.trim(),
        document.revision_label.trim(),
        date.as_str(),
    ];
    let line = parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" | ");
    markup::sanitize_text(&line)
}

// Full cell width unless the height cap applies.
fn fit_cell(aspect: f32, cell_width: Pt, max_height: Pt) -> (Pt, Pt) {
    let height = cell_width * aspect;
    if height <= max_height {
        return (cell_width, height);
    }
    (max_height / aspect, max_height)
}

fn centered_text_top(box_top: Pt, box_height: Pt, font_size: Pt) -> Pt {
    box_top + box_height / 2 - font_size * 0.64
}

fn fit_text(text: &str, font: StandardFont, size: Pt, width: Pt) -> String {
    if measure_text_width(font, size, text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        out.push(ch);
        let candidate = format!("{}...", out.trim_end());
        if measure_text_width(font, size, &candidate) > width {
            out.pop();
            break;
        }
    }
    format!("{}...", out.trim_end())
}
