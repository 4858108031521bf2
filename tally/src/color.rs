use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tiny_skia::PremultipliedColorU8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color '{0}' must be in #RRGGBB[AA] format")]
    Format(String),
}

/// Normalized RGBA, straight alpha unless produced by [`Color::premultiply`].
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        let f = |c: u8| c as f32 / 255.0;
        Self::new(f(rgba[0]), f(rgba[1]), f(rgba[2]), f(rgba[3]))
    }

    pub fn premultiply(self) -> Self {
        Self::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        [quantize(self.r), quantize(self.g), quantize(self.b), quantize(self.a)]
    }

    pub fn to_rgba(self) -> u32 {
        u32::from_be_bytes(self.to_rgba8())
    }

    /// Pixel value for a canvas. Expects a color that went through `premultiply`.
    pub fn to_pixel(self) -> PremultipliedColorU8 {
        let [r, g, b, a] = self.to_rgba8();
        PremultipliedColorU8::from_rgba(r.min(a), g.min(a), b.min(a), a)
            .unwrap_or(PremultipliedColorU8::TRANSPARENT)
    }
}

fn quantize(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !(hex.len() == 6 || hex.len() == 8) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorError::Format(s.to_string()));
        }
        let part = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorError::Format(s.to_string()));
        let alpha = if hex.len() == 8 { part(6)? } else { 0xff };
        Ok(Self::from_rgba8([part(0)?, part(2)?, part(4)?, alpha]))
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.to_rgba())
    }
}
