use crate::types::Pt;

/// The base-14 Helvetica family. Every report font is one of these, so text
/// metrics come from the fixed AFM tables below instead of a font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
}

impl StandardFont {
    pub const ALL: [StandardFont; 4] = [
        StandardFont::Helvetica,
        StandardFont::HelveticaBold,
        StandardFont::HelveticaOblique,
        StandardFont::HelveticaBoldOblique,
    ];

    pub fn select(bold: bool, italic: bool) -> StandardFont {
        match (bold, italic) {
            (false, false) => StandardFont::Helvetica,
            (true, false) => StandardFont::HelveticaBold,
            (false, true) => StandardFont::HelveticaOblique,
            (true, true) => StandardFont::HelveticaBoldOblique,
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
        }
    }

    pub fn from_base_font(name: &str) -> Option<StandardFont> {
        StandardFont::ALL
            .into_iter()
            .find(|font| font.base_font() == name)
    }

    /// PDF resource name used in content streams.
    pub fn resource(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "F1",
            StandardFont::HelveticaBold => "F2",
            StandardFont::HelveticaOblique => "F3",
            StandardFont::HelveticaBoldOblique => "F4",
        }
    }

    fn is_bold(self) -> bool {
        matches!(
            self,
            StandardFont::HelveticaBold | StandardFont::HelveticaBoldOblique
        )
    }

    fn advance_for_char(self, ch: char) -> u16 {
        let table = if self.is_bold() {
            &HELVETICA_BOLD_WIDTHS
        } else {
            &HELVETICA_WIDTHS
        };
        let code = ch as u32;
        if (FIRST_CHAR..=LAST_CHAR).contains(&code) {
            table[(code - FIRST_CHAR) as usize]
        } else {
            MISSING_WIDTH
        }
    }
}

const FIRST_CHAR: u32 = 32;
const LAST_CHAR: u32 = 126;
const MISSING_WIDTH: u16 = 556;

// Advance widths (1/1000 em) for codes 32..=126. Oblique faces share the
// upright widths.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

pub fn measure_text_width(font: StandardFont, font_size: Pt, text: &str) -> Pt {
    let total_units: i32 = text
        .chars()
        .map(|ch| font.advance_for_char(ch) as i32)
        .fold(0i32, |acc, adv| acc.saturating_add(adv));
    if total_units <= 0 {
        return Pt::ZERO;
    }
    font_size.mul_ratio(total_units, 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_is_wider_than_regular() {
        let size = Pt::from_f32(10.0);
        let regular = measure_text_width(StandardFont::Helvetica, size, "Footings");
        let bold = measure_text_width(StandardFont::HelveticaBold, size, "Footings");
        assert!(bold > regular);
        assert_eq!(
            measure_text_width(StandardFont::HelveticaOblique, size, "Footings"),
            regular
        );
    }

    #[test]
    fn space_width_matches_afm() {
        let width = measure_text_width(StandardFont::Helvetica, Pt::from_f32(10.0), " ");
        assert_eq!(width.to_milli_i64(), 2780);
        assert_eq!(
            measure_text_width(StandardFont::Helvetica, Pt::from_f32(10.0), ""),
            Pt::ZERO
        );
    }

    #[test]
    fn base_font_names_round_trip() {
        for font in StandardFont::ALL {
            assert_eq!(StandardFont::from_base_font(font.base_font()), Some(font));
        }
    }
}
