//! Closed-caption styling.
//!
//! [`ClosedCaptionsStyle`] is the caller-facing description (enumerated font
//! options, `#rrggbb` colours and 0-100 opacities, `-1` meaning "use whatever the
//! content says"). [`CcAttributes`] is what a closed-caption decoder consumes: one
//! 32-bit word per attribute, with [`CONTENT_DEFAULT`] standing in for unset values.

use serde::{Deserialize, Serialize};

/// Decoder-side marker for "not overridden, use the content's value".
pub const CONTENT_DEFAULT: u32 = u32::MAX;

/// Decoder-side marker for a colour that is not set.
pub const UNSET_COLOR: u32 = 0xff00_0000;

/// Opacity levels understood by closed-caption decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opacity {
    Solid = 0,
    Flashing = 1,
    Translucent = 2,
    Transparent = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    #[default]
    ContentDefault,
    MonospacedSerif,
    ProportionalSerif,
    MonospacedSansSerif,
    ProportionalSansSerif,
    Casual,
    Cursive,
    SmallCapital,
}

impl FontFamily {
    fn raw(self) -> u32 {
        match self {
            FontFamily::ContentDefault => CONTENT_DEFAULT,
            FontFamily::MonospacedSerif => 1,
            FontFamily::ProportionalSerif => 2,
            FontFamily::MonospacedSansSerif => 3,
            FontFamily::ProportionalSansSerif => 4,
            FontFamily::Casual => 5,
            FontFamily::Cursive => 6,
            FontFamily::SmallCapital => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSize {
    #[default]
    ContentDefault,
    Small,
    Regular,
    Large,
    ExtraLarge,
}

impl FontSize {
    fn raw(self) -> u32 {
        match self {
            FontSize::ContentDefault => CONTENT_DEFAULT,
            FontSize::Small => 0,
            FontSize::Regular => 1,
            FontSize::Large => 2,
            FontSize::ExtraLarge => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontEdge {
    #[default]
    ContentDefault,
    None,
    Raised,
    Depressed,
    Uniform,
    LeftDropShadow,
    RightDropShadow,
}

impl FontEdge {
    fn raw(self) -> u32 {
        match self {
            FontEdge::ContentDefault => CONTENT_DEFAULT,
            FontEdge::None => 0,
            FontEdge::Raised => 1,
            FontEdge::Depressed => 2,
            FontEdge::Uniform => 3,
            FontEdge::LeftDropShadow => 4,
            FontEdge::RightDropShadow => 5,
        }
    }
}

/// Caller-facing closed-caption style.
///
/// Colours are `#rrggbb` strings (anything else means "unset"); opacities are
/// percentages where any negative value means "content default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosedCaptionsStyle {
    pub font_family: FontFamily,
    pub font_size: FontSize,
    pub font_color: String,
    pub font_opacity: i8,
    pub font_edge: FontEdge,
    pub font_edge_color: String,
    pub background_color: String,
    pub background_opacity: i8,
    pub window_color: String,
    pub window_opacity: i8,
}

impl Default for ClosedCaptionsStyle {
    fn default() -> Self {
        Self {
            font_family: FontFamily::ContentDefault,
            font_size: FontSize::ContentDefault,
            font_color: String::new(),
            font_opacity: -1,
            font_edge: FontEdge::ContentDefault,
            font_edge_color: String::new(),
            background_color: String::new(),
            background_opacity: -1,
            window_color: String::new(),
            window_opacity: -1,
        }
    }
}

/// Decoder-facing closed-caption attribute words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CcAttributes {
    pub font_color: u32,
    pub font_opacity: u32,
    pub font_style: u32,
    pub font_size: u32,
    pub edge_type: u32,
    pub edge_color: u32,
    pub background_color: u32,
    pub background_opacity: u32,
    pub window_color: u32,
    pub window_opacity: u32,
}

impl Default for CcAttributes {
    fn default() -> Self {
        ClosedCaptionsStyle::default().to_attributes()
    }
}

impl ClosedCaptionsStyle {
    /// Convert to the word representation a closed-caption decoder consumes.
    pub fn to_attributes(&self) -> CcAttributes {
        CcAttributes {
            font_color: parse_rgb_color(&self.font_color),
            font_opacity: convert_opacity(self.font_opacity),
            font_style: self.font_family.raw(),
            font_size: self.font_size.raw(),
            edge_type: self.font_edge.raw(),
            edge_color: parse_rgb_color(&self.font_edge_color),
            background_color: parse_rgb_color(&self.background_color),
            background_opacity: convert_opacity(self.background_opacity),
            window_color: parse_rgb_color(&self.window_color),
            window_opacity: convert_opacity(self.window_opacity),
        }
    }
}

impl From<&ClosedCaptionsStyle> for CcAttributes {
    fn from(style: &ClosedCaptionsStyle) -> Self {
        style.to_attributes()
    }
}

/// Parse a `#rrggbb` colour, returning [`UNSET_COLOR`] for anything else.
pub fn parse_rgb_color(value: &str) -> u32 {
    match value.strip_prefix('#') {
        Some(hex) if hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u32::from_str_radix(hex, 16).unwrap_or(UNSET_COLOR)
        }
        _ => UNSET_COLOR,
    }
}

/// Map a 0-100 opacity percentage onto the three decoder opacity levels.
pub fn convert_opacity(value: i8) -> u32 {
    match value {
        0..=33 => Opacity::Transparent as u32,
        34..=66 => Opacity::Translucent as u32,
        67..=100 => Opacity::Solid as u32,
        _ => CONTENT_DEFAULT,
    }
}
