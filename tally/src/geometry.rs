use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Scale factors are fixed point with this value meaning 1.0.
pub const SCALE_BASE: u32 = 120;

// Smallest bar that still has to fit inside border and padding.
const MIN_BAR_SIZE: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("width {width} is too small, need at least {min} for the given border and padding")]
    TooNarrow { width: u32, min: u32 },
    #[error("height {height} is too small, need at least {min} for the given border and padding")]
    TooShort { height: u32, min: u32 },
    #[error("margin must be <value> or <top> <right> <bottom> <left>, got '{0}'")]
    Margin(String),
    #[error("anchor must be made of 'top', 'bottom', 'left', 'right', 'center', got '{0}'")]
    Anchor(String),
}

// --- Orientation ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

// --- Dimensions ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub border_offset: u32,
    pub border_size: u32,
    pub bar_padding: u32,
    pub orientation: Orientation,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { width: 400, height: 50, border_offset: 4, border_size: 4, bar_padding: 4, orientation: Orientation::Horizontal }
    }
}

impl Dimensions {
    /// Distance from the outer edge to the bar on every side.
    pub fn inset(&self) -> u32 {
        self.border_offset.saturating_add(self.border_size).saturating_add(self.bar_padding)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let min = self.inset().saturating_mul(2).saturating_add(MIN_BAR_SIZE);
        if self.width < min {
            return Err(GeometryError::TooNarrow { width: self.width, min });
        }
        if self.height < min {
            return Err(GeometryError::TooShort { height: self.height, min });
        }
        Ok(())
    }

    pub fn scale(&self, factor: u32) -> Dimensions {
        Dimensions {
            width: scale_value(self.width, factor),
            height: scale_value(self.height, factor),
            border_offset: scale_value(self.border_offset, factor),
            border_size: scale_value(self.border_size, factor),
            bar_padding: scale_value(self.bar_padding, factor),
            orientation: self.orientation,
        }
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}

fn scale_value(value: u32, factor: u32) -> u32 {
    let base = SCALE_BASE as u64;
    let scaled = (value as u64 * factor as u64 + base / 2) / base;
    scaled.min(u32::MAX as u64) as u32
}

/// Decides whether a buffer sized for `a` can be reused for `b`.
pub fn dimensions_equal(a: &Dimensions, b: &Dimensions) -> bool {
    a == b
}

pub fn margin_equal(a: &Margin, b: &Margin) -> bool {
    a == b
}

// --- Margin ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "MarginSpec")]
pub struct Margin {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Margin {
    pub fn uniform(v: u32) -> Self {
        Self { top: v, right: v, bottom: v, left: v }
    }
}

impl FromStr for Margin {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || GeometryError::Margin(s.to_string());
        let values = s.split_whitespace()
            .map(|t| t.parse::<u32>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;
        match values[..] {
            [v] => Ok(Margin::uniform(v)),
            [top, right, bottom, left] => Ok(Margin { top, right, bottom, left }),
            _ => Err(err()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MarginSpec {
    Uniform(u32),
    Edges(String),
}

impl TryFrom<MarginSpec> for Margin {
    type Error = GeometryError;

    fn try_from(spec: MarginSpec) -> Result<Self, Self::Error> {
        match spec {
            MarginSpec::Uniform(v) => Ok(Margin::uniform(v)),
            MarginSpec::Edges(s) => s.parse(),
        }
    }
}

// --- Anchor ---

/// Screen edges the overlay is pinned to. No edge set means centered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Anchor {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Anchor {
    pub const CENTER: Anchor = Anchor { top: false, bottom: false, left: false, right: false };
}

impl FromStr for Anchor {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut anchor = Anchor::CENTER;
        for token in s.split_whitespace() {
            match token {
                "top" => anchor.top = true,
                "bottom" => anchor.bottom = true,
                "left" => anchor.left = true,
                "right" => anchor.right = true,
                "center" => {}
                _ => return Err(GeometryError::Anchor(s.to_string())),
            }
        }
        Ok(anchor)
    }
}

impl TryFrom<String> for Anchor {
    type Error = GeometryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<&str> = [(self.top, "top"), (self.bottom, "bottom"), (self.left, "left"), (self.right, "right")]
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect();
        if edges.is_empty() { f.write_str("center") } else { f.write_str(&edges.join(" ")) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Dimensions> {
        vec![
            Dimensions::default(),
            Dimensions { width: 1, height: 1, border_offset: 0, border_size: 0, bar_padding: 0, orientation: Orientation::Vertical },
            Dimensions { width: 37, height: 301, border_offset: 3, border_size: 1, bar_padding: 7, orientation: Orientation::Vertical },
            Dimensions { width: 1920, height: 9, border_offset: 0, border_size: 2, bar_padding: 1, orientation: Orientation::Horizontal },
        ]
    }

    #[test]
    fn unit_scale_is_identity() {
        for d in samples() {
            assert_eq!(d.scale(SCALE_BASE), d);
        }
    }

    #[test]
    fn integer_scale_multiplies() {
        let d = Dimensions::default().scale(240);
        assert_eq!((d.width, d.height, d.border_offset, d.border_size, d.bar_padding), (800, 100, 8, 8, 8));
    }

    #[test]
    fn fractional_scale_rounds_to_nearest() {
        // 1.25x
        let d = Dimensions { width: 401, height: 51, border_offset: 3, border_size: 1, bar_padding: 2, orientation: Orientation::Vertical }.scale(150);
        assert_eq!((d.width, d.height, d.border_offset, d.border_size, d.bar_padding), (501, 64, 4, 1, 3));
        assert_eq!(d.orientation, Orientation::Vertical);
    }

    #[test]
    fn scaling_is_monotonic() {
        for d in samples() {
            let mut prev = d.scale(1);
            for factor in 2..=480 {
                let next = d.scale(factor);
                assert!(next.width >= prev.width && next.height >= prev.height);
                assert!(next.border_offset >= prev.border_offset && next.border_size >= prev.border_size);
                assert!(next.bar_padding >= prev.bar_padding);
                prev = next;
            }
        }
    }

    #[test]
    fn equality_is_structural() {
        let a = Dimensions::default();
        let mut b = a;
        assert!(dimensions_equal(&a, &b));
        b.orientation = Orientation::Vertical;
        assert!(!dimensions_equal(&a, &b));
        assert!(margin_equal(&Margin::uniform(3), &"3 3 3 3".parse().unwrap()));
        assert!(!margin_equal(&Margin::uniform(3), &"3 3 3 4".parse().unwrap()));
    }

    #[test]
    fn validate_enforces_minimum_bar() {
        let d = Dimensions { width: 25, height: 25, border_offset: 4, border_size: 4, bar_padding: 4, orientation: Orientation::Horizontal };
        assert_eq!(d.validate(), Ok(()));
        assert_eq!(Dimensions { width: 24, ..d }.validate(), Err(GeometryError::TooNarrow { width: 24, min: 25 }));
        assert_eq!(Dimensions { height: 10, ..d }.validate(), Err(GeometryError::TooShort { height: 10, min: 25 }));
    }

    #[test]
    fn margin_forms() {
        assert_eq!("7".parse::<Margin>().unwrap(), Margin::uniform(7));
        assert_eq!("1 2 3 4".parse::<Margin>().unwrap(), Margin { top: 1, right: 2, bottom: 3, left: 4 });
        assert!("1 2".parse::<Margin>().is_err());
        assert!("".parse::<Margin>().is_err());
        assert!("1 2 3 x".parse::<Margin>().is_err());
    }

    #[test]
    fn anchor_tokens() {
        let a: Anchor = "top left".parse().unwrap();
        assert!(a.top && a.left && !a.bottom && !a.right);
        assert_eq!("center".parse::<Anchor>().unwrap(), Anchor::CENTER);
        assert_eq!(a.to_string(), "top left");
        assert_eq!(Anchor::CENTER.to_string(), "center");
        assert!("middle".parse::<Anchor>().is_err());
    }
}
