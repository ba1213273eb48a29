//! Core value types shared by the codec, the session engine and the registry.
//!
//! - [`SessionType`] tags the active subtitle format of a session
//! - [`DataType`] classifies payloads submitted through `send_data`
//! - [`CcServiceType`] distinguishes CEA-608 from CEA-708 caption services
//! - [`ClosedCaptionsStyle`] and [`CcAttributes`] describe caption styling on
//!   the caller side and the decoder side respectively

mod cc_style;
mod session_type;

pub use cc_style::{
    CONTENT_DEFAULT, CcAttributes, ClosedCaptionsStyle, FontEdge, FontFamily, FontSize, Opacity,
    UNSET_COLOR, convert_opacity, parse_rgb_color,
};
pub use session_type::{CcServiceType, DataType, SessionId, SessionType};
