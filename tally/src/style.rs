use tracing::warn;

use crate::config::{Colors, Config, OverflowMode};

/// What to draw for one update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub value: u64,
    pub colors: Colors,
    pub overflow: bool,
}

pub fn resolve(config: &Config, value: u64, style_name: Option<&str>) -> Resolved {
    let style = match style_name {
        Some(name) => config.find_style(name).unwrap_or_else(|| {
            warn!("Style named '{name}' not found, using default style");
            &config.default_style
        }),
        None => &config.default_style,
    };

    if value <= config.max {
        return Resolved { value, colors: style.normal, overflow: false };
    }

    let max = config.max.max(1);
    let value = match config.overflow_mode {
        OverflowMode::Wrap => value % max,
        OverflowMode::Nowrap => max,
    };
    Resolved { value, colors: style.overflow, overflow: true }
}
