use crate::config::{Config, OutputConfig};
use crate::geometry::{Anchor, Dimensions, Margin};

/// Identity strings reported by the display for one output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputIdentity {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl OutputIdentity {
    pub fn label(&self) -> &str {
        self.name.as_deref().or(self.description.as_deref()).unwrap_or("UNKNOWN")
    }
}

/// Where and how large the overlay is on one output, before scaling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub dimensions: Dimensions,
    pub margin: Margin,
    pub anchor: Anchor,
}

/// First configured output whose pattern occurs in the name or the description.
pub fn match_output<'a>(config: &'a Config, identity: &OutputIdentity) -> Option<&'a OutputConfig> {
    config.outputs.iter().find(|output| {
        [&identity.name, &identity.description]
            .into_iter()
            .flatten()
            .any(|s| s.contains(output.pattern.as_str()))
    })
}

pub fn placement_for(config: &Config, identity: &OutputIdentity) -> Placement {
    let global = Placement { dimensions: config.dimensions, margin: config.margin, anchor: config.anchor };
    match match_output(config, identity) {
        Some(output) => Placement {
            dimensions: output.dimensions.unwrap_or(global.dimensions),
            margin: output.margin.unwrap_or(global.margin),
            anchor: output.anchor.unwrap_or(global.anchor),
        },
        None => global,
    }
}
