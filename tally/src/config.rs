use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::color::Color;
use crate::geometry::{Anchor, Dimensions, GeometryError, Margin, Orientation};

const MAX_LIMIT: u64 = 10_000;
const TIMEOUT_LIMIT: u64 = 10_000;

const COLOR_KEYS: &[&str] = &[
    "background_color", "border_color", "bar_color",
    "overflow_background_color", "overflow_border_color", "overflow_bar_color",
];
const GEOMETRY_KEYS: &[&str] = &["width", "height", "border_offset", "border_size", "bar_padding", "orientation"];
const PLACEMENT_KEYS: &[&str] = &["margin", "anchor"];
const TOP_KEYS: &[&str] = &["max", "timeout", "overflow_mode", "output_mode", "sandbox", "style", "output"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, #[source] source: io::Error },
    #[error("{0}")]
    Syntax(#[from] toml::de::Error),
    #[error("in [{section}]: {source}")]
    Section { section: String, #[source] source: toml::de::Error },
    #[error("'{0}' must be a table")]
    NotATable(String),
    #[error("[output.{0}] needs a non-empty 'match' pattern")]
    MissingMatch(String),
    #[error("{key} must be a value between 1 and {limit}, got {value}")]
    OutOfRange { key: &'static str, value: u64, limit: u64 },
    #[error("invalid geometry in [{section}]: {source}")]
    Geometry { section: String, #[source] source: GeometryError },
}

// --- Data model ---

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Colors {
    pub background: Color,
    pub border: Color,
    pub bar: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Style {
    pub normal: Colors,
    pub overflow: Colors,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            normal: Colors { background: Color::BLACK, border: Color::WHITE, bar: Color::WHITE },
            overflow: Colors { background: Color::BLACK, border: Color::WHITE, bar: Color::RED },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    #[default]
    Wrap,
    Nowrap,
}

/// Which outputs get a bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One surface, placed by the compositor on the output it considers focused.
    #[default]
    Focused,
    All,
    /// Only outputs matching an `[output.*]` section.
    Whitelist,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub id: String,
    pub pattern: String,
    pub dimensions: Option<Dimensions>,
    pub margin: Option<Margin>,
    pub anchor: Option<Anchor>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub max: u64,
    pub timeout: Duration,
    pub anchor: Anchor,
    pub overflow_mode: OverflowMode,
    pub output_mode: OutputMode,
    pub dimensions: Dimensions,
    pub margin: Margin,
    pub default_style: Style,
    pub styles: Vec<(String, Style)>,
    pub outputs: Vec<OutputConfig>,
    pub sandbox: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max: 100,
            timeout: Duration::from_millis(1000),
            anchor: Anchor::CENTER,
            overflow_mode: OverflowMode::Wrap,
            output_mode: OutputMode::Focused,
            dimensions: Dimensions::default(),
            margin: Margin::default(),
            default_style: Style::default(),
            styles: Vec::new(),
            outputs: Vec::new(),
            sandbox: true,
        }
    }
}

impl Config {
    pub fn find_style(&self, name: &str) -> Option<&Style> {
        self.styles.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let mut doc: toml::Table = text.parse()?;
        let styles = take_sections(&mut doc, "style")?;
        let outputs = take_sections(&mut doc, "output")?;
        warn_unknown("", &doc, &[TOP_KEYS, COLOR_KEYS, GEOMETRY_KEYS, PLACEMENT_KEYS]);
        let raw: RawConfig = toml::Value::Table(doc).try_into()?;

        let mut config = Config::default();
        if let Some(max) = raw.max {
            config.max = check_range("max", max, MAX_LIMIT)?;
        }
        if let Some(ms) = raw.timeout {
            config.timeout = Duration::from_millis(check_range("timeout", ms, TIMEOUT_LIMIT)?);
        }
        config.dimensions = raw.geometry.apply(config.dimensions);
        config.dimensions.validate()
            .map_err(|source| ConfigError::Geometry { section: "global".into(), source })?;
        config.anchor = raw.anchor.unwrap_or(config.anchor);
        config.margin = raw.margin.unwrap_or(config.margin);
        config.overflow_mode = raw.overflow_mode.unwrap_or(config.overflow_mode);
        config.output_mode = raw.output_mode.unwrap_or(config.output_mode);
        config.sandbox = raw.sandbox.unwrap_or(config.sandbox);
        raw.colors.apply(&mut config.default_style);

        // Named styles start from the finished default style.
        for (name, table) in styles {
            let section = format!("style.{name}");
            warn_unknown(&section, &table, &[COLOR_KEYS]);
            let colors: RawColors = toml::Value::Table(table).try_into()
                .map_err(|source| ConfigError::Section { section, source })?;
            let mut style = config.default_style;
            colors.apply(&mut style);
            config.styles.push((name, style));
        }

        for (id, table) in outputs {
            let section = format!("output.{id}");
            warn_unknown(&section, &table, &[&["match"], GEOMETRY_KEYS, PLACEMENT_KEYS]);
            let raw: RawOutput = toml::Value::Table(table).try_into()
                .map_err(|source| ConfigError::Section { section: section.clone(), source })?;
            let pattern = match raw.pattern {
                Some(p) if !p.is_empty() => p,
                _ => return Err(ConfigError::MissingMatch(id)),
            };
            let dimensions = if raw.geometry.is_empty() {
                None
            } else {
                let d = raw.geometry.apply(config.dimensions);
                d.validate().map_err(|source| ConfigError::Geometry { section, source })?;
                Some(d)
            };
            config.outputs.push(OutputConfig { id, pattern, dimensions, margin: raw.margin, anchor: raw.anchor });
        }

        Ok(config)
    }

    pub fn log_debug(&self) {
        debug!("config.max = {}", self.max);
        debug!("config.timeout = {}ms", self.timeout.as_millis());
        debug!("config.dimensions = {:?}", self.dimensions);
        debug!("config.margin = {:?}", self.margin);
        debug!("config.anchor = {}", self.anchor);
        debug!("config.overflow_mode = {:?}", self.overflow_mode);
        debug!("config.output_mode = {:?}", self.output_mode);
        debug!("config.sandbox = {}", self.sandbox);
        log_style("default", &self.default_style);
        for (name, style) in &self.styles {
            log_style(name, style);
        }
        for output in &self.outputs {
            debug!("config.output.{}.match = {}", output.id, output.pattern);
            if let Some(d) = &output.dimensions { debug!("config.output.{}.dimensions = {d:?}", output.id); }
            if let Some(m) = &output.margin { debug!("config.output.{}.margin = {m:?}", output.id); }
            if let Some(a) = &output.anchor { debug!("config.output.{}.anchor = {a}", output.id); }
        }
    }
}

fn log_style(name: &str, style: &Style) {
    let (n, o) = (&style.normal, &style.overflow);
    debug!("config.style.{name}.colors = bg {} border {} bar {}", n.background, n.border, n.bar);
    debug!("config.style.{name}.overflow_colors = bg {} border {} bar {}", o.background, o.border, o.bar);
}

fn check_range(key: &'static str, value: u64, limit: u64) -> Result<u64, ConfigError> {
    if (1..=limit).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange { key, value, limit })
    }
}

fn take_sections(doc: &mut toml::Table, key: &str) -> Result<Vec<(String, toml::Table)>, ConfigError> {
    let sections = match doc.remove(key) {
        None => return Ok(Vec::new()),
        Some(toml::Value::Table(t)) => t,
        Some(_) => return Err(ConfigError::NotATable(key.to_string())),
    };
    sections.into_iter()
        .map(|(name, value)| match value {
            toml::Value::Table(t) => Ok((name, t)),
            _ => Err(ConfigError::NotATable(format!("{key}.{name}"))),
        })
        .collect()
}

fn warn_unknown(section: &str, table: &toml::Table, known: &[&[&str]]) {
    for key in table.keys() {
        if !known.iter().any(|group| group.contains(&key.as_str())) {
            match section {
                "" => warn!("Unknown config key {key}"),
                _ => warn!("Unknown config key {key} in [{section}]"),
            }
        }
    }
}

// --- Raw TOML shapes ---

#[derive(Deserialize, Default)]
struct RawColors {
    background_color: Option<Color>,
    border_color: Option<Color>,
    bar_color: Option<Color>,
    overflow_background_color: Option<Color>,
    overflow_border_color: Option<Color>,
    overflow_bar_color: Option<Color>,
}

impl RawColors {
    fn apply(&self, style: &mut Style) {
        let set = |slot: &mut Color, value: Option<Color>| if let Some(c) = value { *slot = c };
        set(&mut style.normal.background, self.background_color);
        set(&mut style.normal.border, self.border_color);
        set(&mut style.normal.bar, self.bar_color);
        set(&mut style.overflow.background, self.overflow_background_color);
        set(&mut style.overflow.border, self.overflow_border_color);
        set(&mut style.overflow.bar, self.overflow_bar_color);
    }
}

#[derive(Deserialize, Default)]
struct RawGeometry {
    width: Option<u32>,
    height: Option<u32>,
    border_offset: Option<u32>,
    border_size: Option<u32>,
    bar_padding: Option<u32>,
    orientation: Option<Orientation>,
}

impl RawGeometry {
    fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.border_offset.is_none()
            && self.border_size.is_none() && self.bar_padding.is_none() && self.orientation.is_none()
    }

    fn apply(&self, base: Dimensions) -> Dimensions {
        Dimensions {
            width: self.width.unwrap_or(base.width),
            height: self.height.unwrap_or(base.height),
            border_offset: self.border_offset.unwrap_or(base.border_offset),
            border_size: self.border_size.unwrap_or(base.border_size),
            bar_padding: self.bar_padding.unwrap_or(base.bar_padding),
            orientation: self.orientation.unwrap_or(base.orientation),
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    max: Option<u64>,
    timeout: Option<u64>,
    anchor: Option<Anchor>,
    margin: Option<Margin>,
    overflow_mode: Option<OverflowMode>,
    output_mode: Option<OutputMode>,
    sandbox: Option<bool>,
    #[serde(flatten)]
    geometry: RawGeometry,
    #[serde(flatten)]
    colors: RawColors,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(rename = "match")]
    pattern: Option<String>,
    margin: Option<Margin>,
    anchor: Option<Anchor>,
    #[serde(flatten)]
    geometry: RawGeometry,
}

// --- Loading ---

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    Config::from_toml(&text)
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(dir).join("widgets/tally.toml"));
    }
    if let Ok(home) = env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config/widgets/tally.toml"));
    }
    paths.push(PathBuf::from("/etc/tally/tally.toml"));
    paths
}

pub fn default_path() -> Option<PathBuf> {
    candidate_paths().into_iter().find(|p| {
        debug!("Looking for config file at {}", p.display());
        p.is_file()
    })
}
