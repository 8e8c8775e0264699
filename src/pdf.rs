use crate::assets::{EmbeddedImage, ImageColorSpace, ImageEncoding};
use crate::canvas::{Command, Document, Page};
use crate::error::Result;
use crate::font::StandardFont;
use crate::types::{Color, Pt};
use fixed::types::I32F32;
use log::debug;
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId, Stream as LoStream, dictionary};

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub document_title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub producer: String,
    // When false, streams are written uncompressed (useful when diffing output).
    pub compress: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            document_title: None,
            author: None,
            subject: None,
            producer: format!("checklist-report {}", env!("CARGO_PKG_VERSION")),
            compress: true,
        }
    }
}

/// Serialises a laid-out document into PDF 1.7 bytes.
pub fn document_to_pdf(document: &Document, options: &PdfOptions) -> Result<Vec<u8>> {
    let mut pdf = LoDocument::with_version("1.7");
    let pages_id = pdf.new_object_id();

    let mut fonts = Dictionary::new();
    for font in StandardFont::ALL {
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), font_id);
    }

    let mut xobjects = Dictionary::new();
    for (resource_id, image) in &document.images {
        let image_id = add_image_object(&mut pdf, image);
        xobjects.set(resource_id.as_bytes().to_vec(), image_id);
    }

    let resources_id = pdf.add_object(dictionary! {
        "Font" => fonts,
        "XObject" => xobjects,
        "ProcSet" => vec!["PDF".into(), "Text".into(), "ImageB".into(), "ImageC".into()],
    });

    let width = document.page_size.width.to_f32();
    let height = document.page_size.height.to_f32();
    let mut kids: Vec<LoObject> = Vec::with_capacity(document.pages.len());
    for (page_index, page) in document.pages.iter().enumerate() {
        let content = render_page(page, document.page_size.height);
        debug!(
            "pdf: page {} content stream {} bytes",
            page_index + 1,
            content.len()
        );
        let content_id = pdf.add_object(LoStream::new(Dictionary::new(), content.into_bytes()));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = pdf.add_object(info_dictionary(options));
    pdf.trailer.set("Root", catalog_id);
    pdf.trailer.set("Info", info_id);

    if options.compress {
        pdf.compress();
    }
    let mut out = Vec::new();
    pdf.save_to(&mut out)?;
    Ok(out)
}

fn info_dictionary(options: &PdfOptions) -> Dictionary {
    let mut info = dictionary! {
        "Producer" => LoObject::string_literal(options.producer.as_str()),
        "CreationDate" => LoObject::string_literal(
            chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string(),
        ),
    };
    if let Some(title) = options.document_title.as_deref() {
        info.set("Title", LoObject::string_literal(title));
    }
    if let Some(author) = options.author.as_deref() {
        info.set("Author", LoObject::string_literal(author));
    }
    if let Some(subject) = options.subject.as_deref() {
        info.set("Subject", LoObject::string_literal(subject));
    }
    info
}

fn add_image_object(pdf: &mut LoDocument, image: &EmbeddedImage) -> ObjectId {
    let color_space = match image.color_space {
        ImageColorSpace::Gray => "DeviceGray",
        ImageColorSpace::Rgb => "DeviceRGB",
    };
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    };

    if let Some(alpha) = image.alpha.as_ref() {
        let smask = LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.clone(),
        );
        let smask_id = pdf.add_object(smask);
        dict.set("SMask", smask_id);
    }

    let stream = match image.encoding {
        ImageEncoding::Dct => {
            dict.set("Filter", "DCTDecode");
            LoStream::new(dict, image.data.clone()).with_compression(false)
        }
        ImageEncoding::Raw => LoStream::new(dict, image.data.clone()),
    };
    pdf.add_object(stream)
}

fn render_page(page: &Page, page_height: Pt) -> String {
    let mut out = String::new();
    let mut current_font = StandardFont::Helvetica;
    let mut current_font_size = Pt::from_f32(12.0);

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFont(font) => current_font = *font,
            Command::SetFontSize(size) => current_font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_pt(*x1),
                    fmt_pt(page_height - *y1),
                    fmt_pt(*x2),
                    fmt_pt(page_height - *y2),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y),
                ));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    current_font.resource(),
                    fmt_pt(current_font_size)
                ));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - current_font_size)
                ));
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    debug!(
                        "pdf: {} character(s) outside WinAnsi replaced in '{}'",
                        encoded.replaced, text
                    );
                }
                out.push_str(&format!("({}) Tj\n", encoded.text));
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let draw_y = page_height - *y - *height;
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(draw_y)
                ));
                out.push_str(&format!("/{} Do\n", resource_id));
                out.push_str("Q\n");
            }
        }
    }

    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // cp1252 extensions
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn color_to_pdf_fill(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!(
        "{} {} {} RG\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn uncompressed() -> PdfOptions {
        PdfOptions {
            compress: false,
            ..PdfOptions::default()
        }
    }

    #[test]
    fn every_canvas_page_becomes_a_pdf_page() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_string(Pt::from_f32(40.0), Pt::from_f32(40.0), "one");
        canvas.show_page();
        canvas.draw_string(Pt::from_f32(40.0), Pt::from_f32(40.0), "two");
        let doc = canvas.finish();

        let bytes = document_to_pdf(&doc, &PdfOptions::default()).expect("pdf");
        assert!(bytes.starts_with(b"%PDF-1.7"));
        let parsed = LoDocument::load_mem(&bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 2);
    }

    #[test]
    fn text_is_escaped_and_flipped_to_pdf_space() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font(StandardFont::HelveticaBold);
        canvas.set_font_size(Pt::from_f32(10.0));
        canvas.draw_string(Pt::from_f32(40.0), Pt::from_f32(100.0), "Slab (main)");
        let doc = canvas.finish();

        let content = render_page(&doc.pages[0], doc.page_size.height);
        assert!(content.contains("/F2 10 Tf"));
        assert!(content.contains("40 731.89 Td"));
        assert!(content.contains("(Slab \\(main\\)) Tj"));
    }

    #[test]
    fn non_winansi_characters_are_replaced() {
        let encoded = encode_winansi_pdf_string("caf\u{e9} \u{4e2d}");
        assert_eq!(encoded.text, "caf\\351 ?");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn images_with_alpha_get_a_soft_mask() {
        let mut rgba = image::RgbaImage::new(2, 2);
        for pixel in rgba.pixels_mut() {
            *pixel = image::Rgba([10, 20, 30, 128]);
        }
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut png, image::ImageFormat::Png)
            .expect("encode png");
        let embedded = assets::decode_image(png.get_ref()).expect("decode");
        assert!(embedded.alpha.is_some());

        let mut canvas = Canvas::new(Size::a4());
        let resource = canvas.register_image(embedded);
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_f32(20.0), Pt::from_f32(20.0), resource.clone());
        let doc = canvas.finish();

        let bytes = document_to_pdf(&doc, &uncompressed()).expect("pdf");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/SMask"));
        assert!(text.contains(&format!("/{resource} Do")));
    }

    #[test]
    fn numbers_are_trimmed() {
        assert_eq!(format_milli(12_500), "12.5");
        assert_eq!(format_milli(-3_000), "-3");
        assert_eq!(fmt(0.0004), "0");
    }
}
