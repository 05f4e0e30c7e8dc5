//! Conversion recipes and the camera's 628-byte profile encoding.
//!
//! A [`Recipe`] is built and validated through [`RecipeBuilder`], then
//! encoded with [`encode`] into the [`RecipeBlob`] the camera consumes.

pub mod builder;
pub mod codec;
pub mod exposure;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::Capabilities;

pub use builder::RecipeBuilder;
pub use codec::{BLOB_SIZE, FIELDS, FieldSpec, RecipeBlob, decode, encode, fields};
pub use exposure::ExposureBias;

/// Range shared by color, sharpness and noise reduction.
pub const TONE_RANGE: (i8, i8) = (-4, 4);
pub const CLARITY_RANGE: (i8, i8) = (-5, 5);
pub const WB_SHIFT_RANGE: (i8, i8) = (-9, 9);
pub const COLOR_TEMPERATURE_RANGE: (u16, u16) = (2500, 10000);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} out of range: {value} (must be {min} to {max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Exposure {ev:+.2} EV is not a whole number of third stops")]
    ExposureNotAligned { ev: f64 },

    #[error("Exposure {ev:+.2} EV out of range (must be -5.0 to +5.0)")]
    ExposureOutOfRange { ev: f64 },

    #[error("White balance 'temperature' requires a color temperature")]
    MissingColorTemperature,

    #[error("Color temperature {kelvin}K given but white balance is {white_balance}")]
    UnexpectedColorTemperature {
        kelvin: u32,
        white_balance: WhiteBalance,
    },

    #[error("Profile is {actual} bytes, expected {expected}")]
    BlobLength { expected: usize, actual: usize },

    #[error("Profile declares {count} parameters, expected {expected}")]
    ParamCount { count: u16, expected: u16 },

    #[error("{field} has unknown code {code}")]
    UnknownCode { field: &'static str, code: i32 },

    #[error("{field} raw value {raw} is not a multiple of {scale}")]
    NotScaled {
        field: &'static str,
        raw: i32,
        scale: i32,
    },
}

/// Enumeration with a fixed device code per variant.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $code:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn code(self) -> i32 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

coded_enum! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum FilmSimulation {
        Provia = 0x01 => "Provia",
        Velvia = 0x02 => "Velvia",
        Astia = 0x03 => "Astia",
        ProNegHi = 0x04 => "Pro Neg. Hi",
        ProNegStd = 0x05 => "Pro Neg. Std",
        Monochrome = 0x06 => "Monochrome",
        MonochromeYe = 0x07 => "Monochrome+Ye",
        MonochromeR = 0x08 => "Monochrome+R",
        MonochromeG = 0x09 => "Monochrome+G",
        Sepia = 0x0A => "Sepia",
        ClassicChrome = 0x0B => "Classic Chrome",
        Acros = 0x0C => "Acros",
        AcrosYe = 0x0D => "Acros+Ye",
        AcrosR = 0x0E => "Acros+R",
        AcrosG = 0x0F => "Acros+G",
        Eterna = 0x10 => "Eterna",
        EternaBleach = 0x11 => "Eterna Bleach Bypass",
    }
}

coded_enum! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum WhiteBalance {
        AsShot = 0x0000 => "As Shot",
        Auto = 0x0002 => "Auto",
        Daylight = 0x0004 => "Daylight",
        Incandescent = 0x0006 => "Incandescent",
        Underwater = 0x0008 => "Underwater",
        Fluorescent1 = 0x8001 => "Fluorescent 1",
        Fluorescent2 = 0x8002 => "Fluorescent 2",
        Fluorescent3 = 0x8003 => "Fluorescent 3",
        Shade = 0x8006 => "Shade",
        Temperature = 0x8007 => "Color Temperature",
        Custom1 = 0x8008 => "Custom 1",
        Custom2 = 0x8009 => "Custom 2",
        Custom3 = 0x800A => "Custom 3",
    }
}

coded_enum! {
    /// Output size and aspect ratio.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ImageSize {
        Small3x2 = 1 => "S 3:2",
        Small16x9 = 2 => "S 16:9",
        Small1x1 = 3 => "S 1:1",
        Medium3x2 = 4 => "M 3:2",
        Medium16x9 = 5 => "M 16:9",
        Medium1x1 = 6 => "M 1:1",
        Large3x2 = 7 => "L 3:2",
        Large16x9 = 8 => "L 16:9",
        Large1x1 = 9 => "L 1:1",
    }
}

coded_enum! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ImageQuality {
        Fine = 2 => "Fine",
        Normal = 3 => "Normal",
    }
}

coded_enum! {
    /// Dynamic range expansion, written as 100/200/400 in recipe files.
    #[derive(Serialize, Deserialize)]
    #[serde(try_from = "u16", into = "u16")]
    pub enum DynamicRange {
        Dr100 = 1 => "DR100",
        Dr200 = 2 => "DR200",
        Dr400 = 3 => "DR400",
    }
}

coded_enum! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum GrainSize {
        Small = 0 => "Small",
        Large = 1 => "Large",
    }
}

impl DynamicRange {
    pub fn percent(self) -> u16 {
        match self {
            DynamicRange::Dr100 => 100,
            DynamicRange::Dr200 => 200,
            DynamicRange::Dr400 => 400,
        }
    }

    pub fn from_percent(percent: u16) -> Option<Self> {
        match percent {
            100 => Some(DynamicRange::Dr100),
            200 => Some(DynamicRange::Dr200),
            400 => Some(DynamicRange::Dr400),
            _ => None,
        }
    }
}

impl TryFrom<u16> for DynamicRange {
    type Error = String;

    fn try_from(percent: u16) -> Result<Self, Self::Error> {
        DynamicRange::from_percent(percent)
            .ok_or_else(|| format!("dynamic range must be 100, 200 or 400, got {percent}"))
    }
}

impl From<DynamicRange> for u16 {
    fn from(dr: DynamicRange) -> Self {
        dr.percent()
    }
}

/// Strength of grain and color-chrome effects. The device code differs
/// per field, so the codec owns the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectStrength {
    #[default]
    Off,
    Weak,
    Strong,
}

impl EffectStrength {
    pub const ALL: &'static [EffectStrength] =
        &[EffectStrength::Off, EffectStrength::Weak, EffectStrength::Strong];

    pub(crate) fn ordinal(self) -> i32 {
        match self {
            EffectStrength::Off => 0,
            EffectStrength::Weak => 1,
            EffectStrength::Strong => 2,
        }
    }

    pub(crate) fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(ordinal).ok()?).copied()
    }
}

impl fmt::Display for EffectStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectStrength::Off => write!(f, "Off"),
            EffectStrength::Weak => write!(f, "Weak"),
            EffectStrength::Strong => write!(f, "Strong"),
        }
    }
}

/// A validated set of conversion parameters. Immutable; build one with
/// [`RecipeBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub(crate) film_simulation: FilmSimulation,
    pub(crate) exposure: ExposureBias,
    pub(crate) dynamic_range: DynamicRange,
    pub(crate) highlight_tone: i8,
    pub(crate) shadow_tone: i8,
    pub(crate) color: i8,
    pub(crate) sharpness: i8,
    pub(crate) noise_reduction: i8,
    pub(crate) clarity: i8,
    pub(crate) grain: EffectStrength,
    pub(crate) grain_size: GrainSize,
    pub(crate) color_chrome: EffectStrength,
    pub(crate) color_chrome_blue: EffectStrength,
    pub(crate) white_balance: WhiteBalance,
    pub(crate) wb_shift_r: i8,
    pub(crate) wb_shift_b: i8,
    pub(crate) color_temperature: Option<u16>,
    pub(crate) image_size: ImageSize,
    pub(crate) image_quality: ImageQuality,
}

impl Default for Recipe {
    /// Provia, as shot, every adjustment neutral, L 3:2 Fine.
    fn default() -> Self {
        Self {
            film_simulation: FilmSimulation::Provia,
            exposure: ExposureBias::ZERO,
            dynamic_range: DynamicRange::Dr100,
            highlight_tone: 0,
            shadow_tone: 0,
            color: 0,
            sharpness: 0,
            noise_reduction: 0,
            clarity: 0,
            grain: EffectStrength::Off,
            grain_size: GrainSize::Small,
            color_chrome: EffectStrength::Off,
            color_chrome_blue: EffectStrength::Off,
            white_balance: WhiteBalance::AsShot,
            wb_shift_r: 0,
            wb_shift_b: 0,
            color_temperature: None,
            image_size: ImageSize::Large3x2,
            image_quality: ImageQuality::Fine,
        }
    }
}

impl Recipe {
    pub fn film_simulation(&self) -> FilmSimulation {
        self.film_simulation
    }

    pub fn exposure(&self) -> ExposureBias {
        self.exposure
    }

    pub fn dynamic_range(&self) -> DynamicRange {
        self.dynamic_range
    }

    pub fn highlight_tone(&self) -> i8 {
        self.highlight_tone
    }

    pub fn shadow_tone(&self) -> i8 {
        self.shadow_tone
    }

    pub fn color(&self) -> i8 {
        self.color
    }

    pub fn sharpness(&self) -> i8 {
        self.sharpness
    }

    pub fn noise_reduction(&self) -> i8 {
        self.noise_reduction
    }

    pub fn clarity(&self) -> i8 {
        self.clarity
    }

    pub fn grain(&self) -> EffectStrength {
        self.grain
    }

    pub fn grain_size(&self) -> GrainSize {
        self.grain_size
    }

    pub fn color_chrome(&self) -> EffectStrength {
        self.color_chrome
    }

    pub fn color_chrome_blue(&self) -> EffectStrength {
        self.color_chrome_blue
    }

    pub fn white_balance(&self) -> WhiteBalance {
        self.white_balance
    }

    pub fn wb_shift(&self) -> (i8, i8) {
        (self.wb_shift_r, self.wb_shift_b)
    }

    /// Kelvin, present only with [`WhiteBalance::Temperature`].
    pub fn color_temperature(&self) -> Option<u16> {
        self.color_temperature
    }

    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn image_quality(&self) -> ImageQuality {
        self.image_quality
    }

    /// Check every field against the limits of one camera body.
    pub fn validate_for(&self, caps: &Capabilities) -> Result<(), ValidationError> {
        check_range("HighlightTone", self.highlight_tone, caps.highlight_tone)?;
        check_range("ShadowTone", self.shadow_tone, caps.shadow_tone)?;
        check_range("Color", self.color, TONE_RANGE)?;
        check_range("Sharpness", self.sharpness, TONE_RANGE)?;
        check_range("NoiseReduction", self.noise_reduction, TONE_RANGE)?;
        check_range("Clarity", self.clarity, CLARITY_RANGE)?;
        check_range("WBShiftR", self.wb_shift_r, WB_SHIFT_RANGE)?;
        check_range("WBShiftB", self.wb_shift_b, WB_SHIFT_RANGE)?;

        match (self.white_balance, self.color_temperature) {
            (WhiteBalance::Temperature, None) => Err(ValidationError::MissingColorTemperature),
            (WhiteBalance::Temperature, Some(kelvin)) => {
                check_range("WBColorTemp", kelvin, COLOR_TEMPERATURE_RANGE)
            }
            (white_balance, Some(kelvin)) => Err(ValidationError::UnexpectedColorTemperature {
                kelvin: kelvin.into(),
                white_balance,
            }),
            (_, None) => Ok(()),
        }
    }
}

pub(crate) fn check_range<V>(field: &'static str, value: V, (min, max): (V, V)) -> Result<(), ValidationError>
where
    V: PartialOrd + Into<i64> + Copy,
{
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::X_T30;

    #[test]
    fn test_enum_codes_round_trip() {
        for sim in FilmSimulation::ALL {
            assert_eq!(FilmSimulation::from_code(sim.code()), Some(*sim));
        }
        for wb in WhiteBalance::ALL {
            assert_eq!(WhiteBalance::from_code(wb.code()), Some(*wb));
        }
        assert_eq!(FilmSimulation::ALL.len(), 17);
        assert_eq!(FilmSimulation::EternaBleach.code(), 0x11);
        assert_eq!(WhiteBalance::Temperature.code(), 0x8007);
        assert_eq!(FilmSimulation::from_code(0x12), None);
        assert_eq!(ImageSize::from_code(0), None);
    }

    #[test]
    fn test_dynamic_range_percent() {
        assert_eq!(DynamicRange::from_percent(400), Some(DynamicRange::Dr400));
        assert_eq!(DynamicRange::from_percent(300), None);
        assert_eq!(DynamicRange::Dr200.code(), 2);
        assert!(DynamicRange::try_from(150u16).is_err());
    }

    #[test]
    fn test_validate_for_narrow_shadow_range() {
        let recipe = Recipe {
            shadow_tone: -3,
            ..Default::default()
        };
        assert!(recipe.validate_for(&Capabilities::STANDARD).is_ok());
        assert_eq!(
            recipe.validate_for(&X_T30.capabilities),
            Err(ValidationError::OutOfRange {
                field: "ShadowTone",
                value: -3,
                min: -2,
                max: 4
            })
        );
    }

    #[test]
    fn test_color_temperature_consistency() {
        let missing = Recipe {
            white_balance: WhiteBalance::Temperature,
            ..Default::default()
        };
        assert_eq!(
            missing.validate_for(&Capabilities::STANDARD),
            Err(ValidationError::MissingColorTemperature)
        );

        let stray = Recipe {
            color_temperature: Some(5500),
            ..Default::default()
        };
        assert!(matches!(
            stray.validate_for(&Capabilities::STANDARD),
            Err(ValidationError::UnexpectedColorTemperature { kelvin: 5500, .. })
        ));
    }
}
