mod assets;
mod canvas;
mod error;
mod font;
mod footer;
mod markup;
mod model;
mod pdf;
mod progress;
mod report;
mod text_flow;
mod types;

pub use assets::{EmbeddedImage, ImageFetcher, NoopFetcher, decode_image, resolve_image_bytes};
pub use canvas::{Canvas, Command, Document, Page};
pub use error::{ReportError, Result};
pub use font::{StandardFont, measure_text_width};
pub use footer::{DEFAULT_FOOTER_TEMPLATE, FooterSpec, apply_page_footer};
pub use markup::{ListContext, ListKind, TextRun, parse_runs, plain_text, sanitize_text};
pub use model::{AnswerState, ImageRef, ImageSource, Item, JobMetadata, ReportDocument, Section};
pub use pdf::{PdfOptions, document_to_pdf};
pub use progress::{
    CancellationToken, Checkpoint, ExportOutcome, ProgressObserver, SilentProgress,
};
pub use report::{ReportAssembler, ReportLayout};
pub use text_flow::{FlowStyle, FlowTarget, PageBreaker, TextFlow};
pub use types::{Color, Margins, Pt, Size};

use log::info;

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub page_count: usize,
    pub bytes: Vec<u8>,
}

/// Configured report generator. Cheap to clone; one instance can serve many
/// exports.
#[derive(Debug, Clone)]
pub struct ChecklistReport {
    layout: ReportLayout,
    pdf_options: PdfOptions,
}

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    layout: ReportLayout,
    pdf_options: PdfOptions,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            layout: ReportLayout::default(),
            pdf_options: PdfOptions::default(),
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.layout.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.layout.margins = margins;
        self
    }

    pub fn margin_all(mut self, value: f32) -> Self {
        self.layout.margins = Margins::all(value);
        self
    }

    pub fn header_height(mut self, value: f32) -> Self {
        self.layout.header_height = Pt::from_f32(value);
        self
    }

    pub fn logo_max_height(mut self, value: f32) -> Self {
        self.layout.logo_max_height = Pt::from_f32(value);
        self
    }

    pub fn body_font_size(mut self, value: f32) -> Self {
        self.layout.flow.font_size = Pt::from_f32(value);
        self
    }

    pub fn line_height(mut self, value: f32) -> Self {
        self.layout.flow.line_height = Pt::from_f32(value);
        self
    }

    pub fn image_max_height(mut self, value: f32) -> Self {
        self.layout.image_max_height = Pt::from_f32(value);
        self
    }

    pub fn grid_gap(mut self, value: f32) -> Self {
        self.layout.grid_gap = Pt::from_f32(value);
        self
    }

    // `{page}` and `{pages}` are substituted per page.
    pub fn footer_template(mut self, template: impl Into<String>) -> Self {
        self.layout.footer_template = template.into();
        self
    }

    pub fn highlight_color(mut self, color: Color) -> Self {
        self.layout.flow.highlight = color;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.pdf_options.compress = enabled;
        self
    }

    pub fn build(self) -> Result<ChecklistReport> {
        let layout = &self.layout;
        let page = layout.page_size;
        let m = layout.margins;
        if page.width <= Pt::ZERO || page.height <= Pt::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }
        if [m.top, m.right, m.bottom, m.left].iter().any(|v| *v < Pt::ZERO) {
            return Err(ReportError::InvalidConfiguration(
                "margins cannot be negative".to_string(),
            ));
        }
        let content_width = page.width - m.left - m.right;
        // Two grid columns and a status pill need some room.
        if content_width < Pt::from_f32(120.0) {
            return Err(ReportError::InvalidConfiguration(format!(
                "content width {:.1}pt is too narrow",
                content_width.to_f32()
            )));
        }
        let flow = layout.flow;
        if flow.font_size <= Pt::ZERO || flow.line_height < flow.font_size {
            return Err(ReportError::InvalidConfiguration(
                "line height must be at least the (positive) body font size".to_string(),
            ));
        }
        if layout.logo_max_height <= Pt::ZERO || layout.logo_max_height > layout.header_height {
            return Err(ReportError::InvalidConfiguration(
                "logo height must be positive and fit inside the header".to_string(),
            ));
        }
        let body_height = page.height - m.top - m.bottom - layout.header_height;
        if body_height < flow.line_height * 4 {
            return Err(ReportError::InvalidConfiguration(
                "page leaves no room for content below the header".to_string(),
            ));
        }
        if layout.image_max_height <= Pt::ZERO || layout.image_max_height > body_height / 2 {
            return Err(ReportError::InvalidConfiguration(
                "image max height must be positive and at most half the content area".to_string(),
            ));
        }
        if layout.grid_gap < Pt::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "grid gap cannot be negative".to_string(),
            ));
        }
        Ok(ChecklistReport {
            layout: self.layout,
            pdf_options: self.pdf_options,
        })
    }
}

impl ChecklistReport {
    pub fn builder() -> ReportBuilder {
        ReportBuilder::new()
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    /// Lays out `document` and returns the canvas pages without serialising.
    pub async fn render_to_document(
        &self,
        document: &ReportDocument,
        logo: Option<&ImageSource>,
        fetcher: &dyn ImageFetcher,
        progress: &mut (dyn ProgressObserver + Send),
        token: Option<CancellationToken>,
    ) -> Result<Document> {
        let mut checkpoint = Checkpoint::new(progress, token);
        ReportAssembler::new(self.layout.clone())
            .assemble(document, logo, fetcher, &mut checkpoint)
            .await
    }

    pub async fn render(
        &self,
        document: &ReportDocument,
        logo: Option<&ImageSource>,
        fetcher: &dyn ImageFetcher,
        progress: &mut (dyn ProgressObserver + Send),
        token: Option<CancellationToken>,
    ) -> Result<RenderedReport> {
        let file_name = report_file_name(&document.title, document.revision_number);
        info!("export started: {file_name}");
        let mut checkpoint = Checkpoint::new(progress, token);
        let laid_out = ReportAssembler::new(self.layout.clone())
            .assemble(document, logo, fetcher, &mut checkpoint)
            .await?;

        checkpoint.check("Finalising PDF", 95)?;
        let options = PdfOptions {
            document_title: Some(document.title.clone()),
            author: Some(document.job.client_name.clone()).filter(|name| !name.is_empty()),
            subject: Some(document.job.job_name.clone()).filter(|name| !name.is_empty()),
            ..self.pdf_options.clone()
        };
        let bytes = document_to_pdf(&laid_out, &options)?;
        checkpoint.complete("Done");
        info!(
            "export finished: {file_name} ({} pages, {} bytes)",
            laid_out.pages.len(),
            bytes.len()
        );
        Ok(RenderedReport {
            file_name,
            page_count: laid_out.pages.len(),
            bytes,
        })
    }

    /// `render` driven to completion on a current-thread runtime, for callers
    /// without an executor.
    pub fn render_blocking(
        &self,
        document: &ReportDocument,
        logo: Option<&ImageSource>,
        fetcher: &dyn ImageFetcher,
        progress: &mut (dyn ProgressObserver + Send),
        token: Option<CancellationToken>,
    ) -> Result<RenderedReport> {
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        runtime.block_on(self.render(document, logo, fetcher, progress, token))
    }
}

/// `{title}-REV{revision}.pdf` with every non-alphanumeric title character
/// replaced by `_`.
pub fn report_file_name(title: &str, revision_number: u32) -> String {
    let sanitized: String = title
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    format!("{sanitized}-REV{revision_number}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_replaces_non_alphanumerics() {
        assert_eq!(report_file_name("PAP Checklist", 3), "PAP_Checklist-REV3.pdf");
        assert_eq!(report_file_name("Smith/Jones: Stage 2", 0), "Smith_Jones__Stage_2-REV0.pdf");
    }

    #[test]
    fn builder_rejects_nonsense_geometry() {
        let err = ChecklistReport::builder()
            .line_height(4.0)
            .build()
            .expect_err("line height below font size");
        assert!(matches!(err, ReportError::InvalidConfiguration(_)));

        let err = ChecklistReport::builder()
            .margin_all(290.0)
            .build()
            .expect_err("no content width");
        assert!(matches!(err, ReportError::InvalidConfiguration(_)));

        let err = ChecklistReport::builder()
            .logo_max_height(200.0)
            .build()
            .expect_err("logo taller than header");
        assert!(matches!(err, ReportError::InvalidConfiguration(_)));
    }

    #[test]
    fn builder_applies_options() {
        let report = ChecklistReport::builder()
            .page_size(Size::letter())
            .body_font_size(9.0)
            .line_height(12.0)
            .footer_template("{page}/{pages}")
            .build()
            .expect("valid");
        assert_eq!(report.layout().page_size, Size::letter());
        assert_eq!(report.layout().flow.line_height, Pt::from_f32(12.0));
        assert_eq!(report.layout().footer_template, "{page}/{pages}");
    }
}
