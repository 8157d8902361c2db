#![forbid(unsafe_code)]

use core::time::Duration;

use serde::Deserialize;

use crate::color::Rgb;
use crate::error::ConfigError;

/// Flags forwarded to the transport client with every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadPolicy {
    pub include_text: bool,
    /// Clip spans at the requested range.
    pub clip_spans: bool,
    /// Clip relation arcs at the requested range.
    pub clip_arcs: bool,
    /// Render relations that leave the visible range as long arcs.
    pub long_arcs: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            include_text: false,
            clip_spans: true,
            clip_arcs: false,
            long_arcs: true,
        }
    }
}

/// Editor configuration, usually handed over by the JS host as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Prefix of every generated style class.
    pub class_prefix: String,
    /// Background alpha of text-range highlights.
    pub highlight_opacity: f32,
    /// Color for spans and relations that carry none.
    pub default_color: String,
    /// Per-pane load timeout; `None` or `0` disables it.
    pub load_timeout_ms: Option<u64>,
    pub load: LoadPolicy,
    /// Class marking annotated text regions rendered by the widget.
    pub annotation_class: String,
    /// Class of the inner connector path whose stroke carries the color.
    pub connector_path_class: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            class_prefix: "i7n-".to_owned(),
            highlight_opacity: 0.2,
            default_color: "#000000".to_owned(),
            load_timeout_ms: Some(10_000),
            load: LoadPolicy::default(),
            annotation_class: "r6o-annotation".to_owned(),
            connector_path_class: "r6o-connections-edge-path-inner".to_owned(),
        }
    }
}

impl EditorConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Self::from_json`], with an absent config meaning the defaults.
    pub fn from_optional_json(json: Option<&str>) -> Result<Self, ConfigError> {
        json.map_or_else(|| Ok(Self::default()), Self::from_json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.highlight_opacity) {
            return Err(ConfigError::Invalid {
                field: "highlightOpacity",
                reason: format!("{} is outside [0, 1]", self.highlight_opacity),
            });
        }
        if Rgb::parse_hex(&self.default_color).is_none() {
            return Err(ConfigError::Invalid {
                field: "defaultColor",
                reason: format!("`{}` is not a hex color", self.default_color),
            });
        }
        if self.annotation_class.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "annotationClass",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.connector_path_class.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "connectorPathClass",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    #[must_use]
    pub fn default_rgb(&self) -> Rgb {
        Rgb::parse_hex(&self.default_color).unwrap_or(Rgb::BLACK)
    }

    /// `<prefix>highlighted`, always the first style class.
    #[must_use]
    pub fn highlighted_class(&self) -> String {
        format!("{}highlighted", self.class_prefix)
    }

    /// `<prefix>marker-<kind>`, used for markers and comments alike.
    #[must_use]
    pub fn marker_class(&self, kind: &str) -> String {
        format!("{}marker-{kind}", self.class_prefix)
    }
}
