use fixed::types::I32F32;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

const MILLI: i128 = 1000;
const FRAC_BITS: u32 = 32;

/// PDF points. Every operation lands back on a 1/1000 pt grid, so a dry run
/// and a live draw that perform the same steps end on the same value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::ZERO);

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_milli((f64::from(value) * 1000.0).round() as i128)
    }

    /// Bottom bound for pure measurement; no page is this tall.
    pub fn unbounded() -> Pt {
        Pt::from_milli(1_000_000 * MILLI)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let milli = round_div(i128::from(self.0.to_bits()) * MILLI, 1 << FRAC_BITS);
        saturate_i64(milli)
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    /// `self * num / denom`, rounded once.
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        Pt::from_milli(round_div(self.milli() * i128::from(num), i128::from(denom)))
    }

    fn milli(self) -> i128 {
        i128::from(self.to_milli_i64())
    }

    fn from_milli(milli: i128) -> Pt {
        let bits = round_div(milli.saturating_mul(1 << FRAC_BITS), MILLI);
        Pt(I32F32::from_bits(saturate_i64(bits)))
    }
}

impl Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli(self.milli() + rhs.milli())
    }
}

impl Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli(self.milli() - rhs.milli())
    }
}

impl AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        Pt::from_milli(self.milli().saturating_mul(i128::from(rhs)))
    }
}

impl Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        Pt::from_milli(round_div(self.milli(), i128::from(rhs)))
    }
}

// Scaling by image ratios and font factors.
impl Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl Div<f32> for Pt {
    type Output = Pt;
    fn div(self, rhs: f32) -> Pt {
        if rhs == 0.0 {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() / rhs)
    }
}

/// Division rounding half away from zero; zero when `den` is zero.
fn round_div(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let half = den.abs() / 2;
    if (num >= 0) == (den > 0) {
        (num.abs() + half) / den.abs()
    } else {
        -((num.abs() + half) / den.abs())
    }
}

fn saturate_i64(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self {
            width: Pt::from_f32(595.28),
            height: Pt::from_f32(841.89),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self {
            width: Pt::from_f32(612.0),
            height: Pt::from_f32(792.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    pub fn all(value: f32) -> Self {
        let v = Pt::from_f32(value);
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Parses the color notations rich-text editors put into `data-color` and
    /// `background-color`: `#rgb`, `#rrggbb`, `rgb(r, g, b)`, `rgba(...)` and a
    /// handful of names.
    pub fn from_css(raw: &str) -> Option<Color> {
        let value = raw.trim().to_ascii_lowercase();
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(inner) = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))
        {
            let inner = inner.strip_suffix(')')?;
            let parts: Vec<u8> = inner
                .split(',')
                .take(3)
                .map(|part| part.trim().parse::<f32>().map(|v| v.clamp(0.0, 255.0) as u8))
                .collect::<Result<_, _>>()
                .ok()?;
            if parts.len() != 3 {
                return None;
            }
            return Some(Color::rgb8(parts[0], parts[1], parts[2]));
        }
        match value.as_str() {
            "yellow" => Some(Color::rgb8(255, 255, 0)),
            "lime" | "green" => Some(Color::rgb8(0, 128, 0)),
            "red" => Some(Color::rgb8(255, 0, 0)),
            "orange" => Some(Color::rgb8(255, 165, 0)),
            "blue" => Some(Color::rgb8(0, 0, 255)),
            "pink" => Some(Color::rgb8(255, 192, 203)),
            _ => None,
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let digits: Vec<u8> = match hex.len() {
        3 => hex.bytes().flat_map(|b| [b, b]).collect(),
        6 | 8 => hex.bytes().take(6).collect(),
        _ => return None,
    };
    let mut channels = digits.chunks(2).map(|pair| {
        let pair = std::str::from_utf8(pair).ok()?;
        u8::from_str_radix(pair, 16).ok()
    });
    Some(Color::rgb8(channels.next()??, channels.next()??, channels.next()??))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_arithmetic_is_exact_in_milli_points() {
        let a = Pt::from_f32(14.0);
        assert_eq!(a * 3, Pt::from_f32(42.0));
        assert_eq!(Pt::from_f32(10.0) / 3, Pt::from_f32(3.333));
        assert_eq!(Pt::from_f32(-10.0) / 3, Pt::from_f32(-3.333));
        assert_eq!(Pt::from_f32(0.1) + Pt::from_f32(0.2), Pt::from_f32(0.3));
        assert_eq!(a.mul_ratio(556, 1000).to_milli_i64(), 7784);
    }

    #[test]
    fn css_colors_parse() {
        assert_eq!(Color::from_css("#fff"), Some(Color::WHITE));
        assert_eq!(Color::from_css("#000000"), Some(Color::BLACK));
        assert_eq!(
            Color::from_css("rgb(255, 0, 0)"),
            Some(Color::rgb8(255, 0, 0))
        );
        assert_eq!(Color::from_css("var(--tt-color)"), None);
        assert_eq!(Color::from_css("#ff000080"), Some(Color::rgb8(255, 0, 0)));
    }

    #[test]
    fn non_ascii_hex_is_rejected_without_panicking() {
        assert_eq!(Color::from_css("#\u{20ac}"), None);
        assert_eq!(Color::from_css("#\u{20ac}\u{20ac}"), None);
        assert_eq!(Color::from_css("#ab\u{e9}"), None);
        assert_eq!(Color::from_css("#ggg"), None);
    }
}
