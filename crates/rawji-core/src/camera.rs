//! Supported camera bodies.
//!
//! Each body is identified by its USB VID/PID pair and carries the
//! recipe capabilities its processor accepts.

use std::fmt;

/// Fuji Photo Film Co., Ltd.
pub const FUJIFILM_VENDOR_ID: u16 = 0x04CB;

/// Per-body limits applied when validating a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub highlight_tone: (i8, i8),
    pub shadow_tone: (i8, i8),
}

impl Capabilities {
    /// Ranges accepted by X-Processor 4 bodies.
    pub const STANDARD: Capabilities = Capabilities {
        highlight_tone: (-4, 4),
        shadow_tone: (-4, 4),
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// A supported camera body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraModel {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub capabilities: Capabilities,
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04X}:{:04X})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

pub const X_T30: CameraModel = CameraModel {
    name: "X-T30",
    vendor_id: FUJIFILM_VENDOR_ID,
    product_id: 0x02E3,
    // Shadow tone stops at -2 on this body.
    capabilities: Capabilities {
        highlight_tone: (-4, 4),
        shadow_tone: (-2, 4),
    },
};

pub const X_T3: CameraModel = CameraModel {
    name: "X-T3",
    vendor_id: FUJIFILM_VENDOR_ID,
    product_id: 0x02E5,
    capabilities: Capabilities::STANDARD,
};

pub const X_T4: CameraModel = CameraModel {
    name: "X-T4",
    vendor_id: FUJIFILM_VENDOR_ID,
    product_id: 0x02E7,
    capabilities: Capabilities::STANDARD,
};

pub const SUPPORTED_CAMERAS: &[CameraModel] = &[X_T30, X_T3, X_T4];

/// Find the supported body matching a VID/PID pair.
pub fn lookup(vendor_id: u16, product_id: u16) -> Option<&'static CameraModel> {
    SUPPORTED_CAMERAS
        .iter()
        .find(|m| m.vendor_id == vendor_id && m.product_id == product_id)
}
