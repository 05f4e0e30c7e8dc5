//! The 628-byte "d185" conversion profile.
//!
//! ```text
//! [0..2]       parameter count (u16 LE, 29)
//! [2..]        IOP code as a PTP string ("FF159502")
//! ...          zero padding
//! [0x200..]    29 parameters, i32 LE each
//! ```
//!
//! Every parameter's position and encoding comes from [`FIELDS`]; encode
//! and decode both walk that table.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::*;
use crate::ptp::dataset::write_string;

pub const BLOB_SIZE: usize = 628;
pub const PARAM_COUNT: u16 = 29;
pub const PARAMS_OFFSET: usize = 0x200;
pub const IOP_CODE: &str = "FF159502";

/// Recipe fields carried by profile parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    ImageSize,
    ImageQuality,
    Exposure,
    DynamicRange,
    FilmSimulation,
    Grain,
    GrainSize,
    ColorChrome,
    ColorChromeBlue,
    WhiteBalance,
    WbShiftR,
    WbShiftB,
    ColorTemperature,
    HighlightTone,
    ShadowTone,
    Color,
    Sharpness,
    NoiseReduction,
    Clarity,
}

const SOURCE_COUNT: usize = 19;

/// How a parameter's raw value relates to the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Constant the camera expects; not part of the recipe.
    Fixed(i32),
    /// Device code from an enumeration table.
    Code(Source),
    /// Effect strength; Off maps to the given code, then counts up.
    Effect(Source, i32),
    /// Signed integer stored as is.
    Direct(Source),
    /// Signed integer times the scale.
    Scaled(Source, i32),
    /// EV×10 on third stops.
    Exposure,
}

/// One parameter of the profile.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub index: usize,
    pub name: &'static str,
    encoding: Encoding,
}

impl FieldSpec {
    pub fn offset(&self) -> usize {
        PARAMS_OFFSET + self.index * 4
    }

    /// Human-readable form of a raw value, for profile dumps.
    pub fn describe(&self, raw: i32) -> String {
        let known = match self.encoding {
            Encoding::Fixed(_) | Encoding::Direct(_) => None,
            Encoding::Scaled(_, scale) if raw % scale == 0 => Some(format!("{:+}", raw / scale)),
            Encoding::Scaled(..) => None,
            Encoding::Exposure => ExposureBias::from_raw(raw).ok().map(|e| e.to_string()),
            Encoding::Effect(_, off) => EffectStrength::from_ordinal(raw - off).map(|e| e.to_string()),
            Encoding::Code(source) => code_label(source, raw),
        };
        known.unwrap_or_else(|| raw.to_string())
    }
}

const fn field(index: usize, name: &'static str, encoding: Encoding) -> FieldSpec {
    FieldSpec {
        index,
        name,
        encoding,
    }
}

pub static FIELDS: [FieldSpec; PARAM_COUNT as usize] = [
    field(0, "ShootingCondition", Encoding::Fixed(2)),
    field(1, "FileType", Encoding::Fixed(7)),
    field(2, "ImageSize", Encoding::Code(Source::ImageSize)),
    field(3, "ImageQuality", Encoding::Code(Source::ImageQuality)),
    field(4, "ExposureBias", Encoding::Exposure),
    field(5, "DynamicRange", Encoding::Code(Source::DynamicRange)),
    field(6, "WideDRange", Encoding::Fixed(0)),
    field(7, "FilmSimulation", Encoding::Code(Source::FilmSimulation)),
    field(8, "BlackImageTone", Encoding::Fixed(0)),
    field(9, "MonochromaticColorRG", Encoding::Fixed(0)),
    field(10, "GrainEffect", Encoding::Effect(Source::Grain, 1)),
    field(11, "GrainEffectSize", Encoding::Code(Source::GrainSize)),
    field(12, "ColorChromeEffect", Encoding::Effect(Source::ColorChrome, 1)),
    field(13, "ColorChromeBlue", Encoding::Effect(Source::ColorChromeBlue, 0)),
    field(14, "SmoothSkinEffect", Encoding::Fixed(0)),
    field(15, "WBShootCond", Encoding::Fixed(0)),
    field(16, "WhiteBalance", Encoding::Code(Source::WhiteBalance)),
    field(17, "WBShiftR", Encoding::Direct(Source::WbShiftR)),
    field(18, "WBShiftB", Encoding::Direct(Source::WbShiftB)),
    field(19, "WBColorTemp", Encoding::Direct(Source::ColorTemperature)),
    field(20, "HighlightTone", Encoding::Scaled(Source::HighlightTone, 10)),
    field(21, "ShadowTone", Encoding::Scaled(Source::ShadowTone, 10)),
    field(22, "Color", Encoding::Scaled(Source::Color, 10)),
    field(23, "Sharpness", Encoding::Scaled(Source::Sharpness, 10)),
    field(24, "NoiseReduction", Encoding::Scaled(Source::NoiseReduction, 10)),
    field(25, "Clarity", Encoding::Scaled(Source::Clarity, 10)),
    field(26, "LensModulationOpt", Encoding::Fixed(0)),
    field(27, "ColorSpace", Encoding::Fixed(0)),
    field(28, "HDR", Encoding::Fixed(0)),
];

fn code_label(source: Source, raw: i32) -> Option<String> {
    let label = match source {
        Source::ImageSize => ImageSize::from_code(raw)?.label(),
        Source::ImageQuality => ImageQuality::from_code(raw)?.label(),
        Source::DynamicRange => DynamicRange::from_code(raw)?.label(),
        Source::FilmSimulation => FilmSimulation::from_code(raw)?.label(),
        Source::GrainSize => GrainSize::from_code(raw)?.label(),
        Source::WhiteBalance => WhiteBalance::from_code(raw)?.label(),
        _ => return None,
    };
    Some(label.to_string())
}

/// Canonical binary form of a recipe.
#[derive(Clone, PartialEq, Eq)]
pub struct RecipeBlob([u8; BLOB_SIZE]);

impl RecipeBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn param_count(&self) -> u16 {
        LittleEndian::read_u16(&self.0[..2])
    }

    /// Raw value of parameter `index`.
    pub fn param(&self, index: usize) -> i32 {
        let offset = PARAMS_OFFSET + index * 4;
        LittleEndian::read_i32(&self.0[offset..offset + 4])
    }

    fn set_param(&mut self, index: usize, value: i32) {
        let offset = PARAMS_OFFSET + index * 4;
        LittleEndian::write_i32(&mut self.0[offset..offset + 4], value);
    }
}

impl TryFrom<&[u8]> for RecipeBlob {
    type Error = ValidationError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; BLOB_SIZE] = bytes.try_into().map_err(|_| ValidationError::BlobLength {
            expected: BLOB_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for RecipeBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RecipeBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<i32> = (0..PARAM_COUNT as usize).map(|i| self.param(i)).collect();
        f.debug_struct("RecipeBlob")
            .field("param_count", &self.param_count())
            .field("params", &params)
            .finish()
    }
}

fn source_value(recipe: &Recipe, source: Source) -> i32 {
    match source {
        Source::ImageSize => recipe.image_size.code(),
        Source::ImageQuality => recipe.image_quality.code(),
        Source::Exposure => recipe.exposure.to_raw(),
        Source::DynamicRange => recipe.dynamic_range.code(),
        Source::FilmSimulation => recipe.film_simulation.code(),
        Source::Grain => recipe.grain.ordinal(),
        Source::GrainSize => recipe.grain_size.code(),
        Source::ColorChrome => recipe.color_chrome.ordinal(),
        Source::ColorChromeBlue => recipe.color_chrome_blue.ordinal(),
        Source::WhiteBalance => recipe.white_balance.code(),
        Source::WbShiftR => recipe.wb_shift_r.into(),
        Source::WbShiftB => recipe.wb_shift_b.into(),
        Source::ColorTemperature => recipe.color_temperature.map_or(0, i32::from),
        Source::HighlightTone => recipe.highlight_tone.into(),
        Source::ShadowTone => recipe.shadow_tone.into(),
        Source::Color => recipe.color.into(),
        Source::Sharpness => recipe.sharpness.into(),
        Source::NoiseReduction => recipe.noise_reduction.into(),
        Source::Clarity => recipe.clarity.into(),
    }
}

/// Encode a validated recipe. Total and deterministic.
pub fn encode(recipe: &Recipe) -> RecipeBlob {
    let mut blob = RecipeBlob([0; BLOB_SIZE]);
    LittleEndian::write_u16(&mut blob.0[..2], PARAM_COUNT);
    let mut header = Vec::with_capacity(32);
    write_string(&mut header, IOP_CODE);
    blob.0[2..2 + header.len()].copy_from_slice(&header);

    for spec in &FIELDS {
        let raw = match spec.encoding {
            Encoding::Fixed(value) => value,
            Encoding::Code(source) | Encoding::Direct(source) => source_value(recipe, source),
            Encoding::Effect(source, off) => off + source_value(recipe, source),
            Encoding::Scaled(source, scale) => source_value(recipe, source) * scale,
            Encoding::Exposure => recipe.exposure.to_raw(),
        };
        blob.set_param(spec.index, raw);
    }
    blob
}

/// Decode a profile into a recipe, rejecting anything this codec would not
/// have produced for a valid recipe.
pub fn decode(blob: &RecipeBlob) -> Result<Recipe, ValidationError> {
    if blob.param_count() != PARAM_COUNT {
        return Err(ValidationError::ParamCount {
            count: blob.param_count(),
            expected: PARAM_COUNT,
        });
    }

    let mut raw = [0i32; PARAM_COUNT as usize];
    let mut sources = [0usize; SOURCE_COUNT];
    for spec in &FIELDS {
        raw[spec.index] = blob.param(spec.index);
        if let Some(source) = spec.source() {
            sources[source as usize] = spec.index;
        }
    }
    let field_of = |source: Source| &FIELDS[sources[source as usize]];
    let value = |source: Source| raw[sources[source as usize]];

    let unknown = |source: Source| ValidationError::UnknownCode {
        field: field_of(source).name,
        code: value(source),
    };
    let effect = |source: Source| -> Result<EffectStrength, ValidationError> {
        let off = match field_of(source).encoding {
            Encoding::Effect(_, off) => off,
            _ => 0,
        };
        EffectStrength::from_ordinal(value(source) - off).ok_or_else(|| unknown(source))
    };
    let small = |source: Source| -> Result<i8, ValidationError> {
        let spec = field_of(source);
        let raw = value(source);
        let scale = match spec.encoding {
            Encoding::Scaled(_, scale) => scale,
            _ => 1,
        };
        if raw % scale != 0 {
            return Err(ValidationError::NotScaled {
                field: spec.name,
                raw,
                scale,
            });
        }
        i8::try_from(raw / scale).map_err(|_| ValidationError::OutOfRange {
            field: spec.name,
            value: (raw / scale).into(),
            min: i8::MIN.into(),
            max: i8::MAX.into(),
        })
    };

    let color_temperature = match value(Source::ColorTemperature) {
        0 => None,
        kelvin => Some(u16::try_from(kelvin).map_err(|_| ValidationError::OutOfRange {
            field: field_of(Source::ColorTemperature).name,
            value: kelvin.into(),
            min: COLOR_TEMPERATURE_RANGE.0.into(),
            max: COLOR_TEMPERATURE_RANGE.1.into(),
        })?),
    };

    let recipe = Recipe {
        film_simulation: FilmSimulation::from_code(value(Source::FilmSimulation))
            .ok_or_else(|| unknown(Source::FilmSimulation))?,
        exposure: ExposureBias::from_raw(value(Source::Exposure))?,
        dynamic_range: DynamicRange::from_code(value(Source::DynamicRange))
            .ok_or_else(|| unknown(Source::DynamicRange))?,
        highlight_tone: small(Source::HighlightTone)?,
        shadow_tone: small(Source::ShadowTone)?,
        color: small(Source::Color)?,
        sharpness: small(Source::Sharpness)?,
        noise_reduction: small(Source::NoiseReduction)?,
        clarity: small(Source::Clarity)?,
        grain: effect(Source::Grain)?,
        grain_size: GrainSize::from_code(value(Source::GrainSize))
            .ok_or_else(|| unknown(Source::GrainSize))?,
        color_chrome: effect(Source::ColorChrome)?,
        color_chrome_blue: effect(Source::ColorChromeBlue)?,
        white_balance: WhiteBalance::from_code(value(Source::WhiteBalance))
            .ok_or_else(|| unknown(Source::WhiteBalance))?,
        wb_shift_r: small(Source::WbShiftR)?,
        wb_shift_b: small(Source::WbShiftB)?,
        color_temperature,
        image_size: ImageSize::from_code(value(Source::ImageSize))
            .ok_or_else(|| unknown(Source::ImageSize))?,
        image_quality: ImageQuality::from_code(value(Source::ImageQuality))
            .ok_or_else(|| unknown(Source::ImageQuality))?,
    };
    recipe.validate_for(&Capabilities::STANDARD)?;
    Ok(recipe)
}

impl FieldSpec {
    fn source(&self) -> Option<Source> {
        match self.encoding {
            Encoding::Fixed(_) => None,
            Encoding::Exposure => Some(Source::Exposure),
            Encoding::Code(source)
            | Encoding::Effect(source, _)
            | Encoding::Direct(source)
            | Encoding::Scaled(source, _) => Some(source),
        }
    }
}

/// Every parameter of a profile with its raw value, in table order.
pub fn fields(blob: &RecipeBlob) -> impl Iterator<Item = (&'static FieldSpec, i32)> + '_ {
    FIELDS.iter().map(move |spec| (spec, blob.param(spec.index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn velvia() -> Recipe {
        RecipeBuilder::new()
            .film_simulation(FilmSimulation::Velvia)
            .exposure(0.7)
            .highlights(-1)
            .shadows(1)
            .color(2)
            .sharpness(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_velvia_scenario() {
        let recipe = velvia();
        let blob = encode(&recipe);

        assert_eq!(blob.as_bytes().len(), BLOB_SIZE);
        assert_eq!(blob.param(7), 0x02);
        assert_eq!(blob.param(4), 7);
        assert_eq!(blob.param(20), -10);
        assert_eq!(blob.param(21), 10);
        assert_eq!(blob.param(22), 20);
        assert_eq!(blob.param(23), 20);
        assert_eq!(decode(&blob).unwrap(), recipe);
    }

    #[test]
    fn test_header_layout() {
        let blob = encode(&Recipe::default());
        let bytes = blob.as_bytes();
        assert_eq!(&bytes[..2], &[29, 0]);
        assert_eq!(bytes[2], 9);
        assert_eq!(&bytes[3..5], &[b'F', 0]);
        assert_eq!(&bytes[17..21], &[b'2', 0, 0, 0]);
        assert!(bytes[21..PARAMS_OFFSET].iter().all(|&b| b == 0));
        // ShootingCondition and FileType are constants.
        assert_eq!(&bytes[0x200..0x208], &[2, 0, 0, 0, 7, 0, 0, 0]);
        assert_eq!(PARAMS_OFFSET + FIELDS.len() * 4, BLOB_SIZE);
    }

    #[test]
    fn test_field_table_is_dense() {
        for (i, spec) in FIELDS.iter().enumerate() {
            assert_eq!(spec.index, i, "{}", spec.name);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let recipe = velvia();
        assert_eq!(encode(&recipe), encode(&recipe));
    }

    #[test]
    fn test_round_trip_across_enumerations() {
        let mut recipes = Vec::new();
        for &sim in FilmSimulation::ALL {
            recipes.push(RecipeBuilder::new().film_simulation(sim).build().unwrap());
        }
        for &wb in WhiteBalance::ALL {
            let mut builder = RecipeBuilder::new().white_balance(wb).wb_shift(-9, 9);
            if wb == WhiteBalance::Temperature {
                builder = builder.color_temperature(10000);
            }
            recipes.push(builder.build().unwrap());
        }
        for &strength in EffectStrength::ALL {
            recipes.push(
                RecipeBuilder::new()
                    .grain(strength, GrainSize::Large)
                    .color_chrome(strength)
                    .color_chrome_blue(strength)
                    .build()
                    .unwrap(),
            );
        }
        for &size in ImageSize::ALL {
            recipes.push(
                RecipeBuilder::new()
                    .image_size(size)
                    .image_quality(ImageQuality::Normal)
                    .dynamic_range(DynamicRange::Dr400)
                    .build()
                    .unwrap(),
            );
        }
        recipes.push(
            RecipeBuilder::new()
                .exposure(-5.0)
                .highlights(4)
                .shadows(-4)
                .noise_reduction(-4)
                .clarity(-5)
                .build()
                .unwrap(),
        );

        for recipe in recipes {
            assert_eq!(decode(&encode(&recipe)).unwrap(), recipe);
        }
    }

    #[test]
    fn test_effect_codes_per_field() {
        let blob = encode(
            &RecipeBuilder::new()
                .grain(EffectStrength::Off, GrainSize::Small)
                .color_chrome(EffectStrength::Strong)
                .color_chrome_blue(EffectStrength::Off)
                .build()
                .unwrap(),
        );
        assert_eq!(blob.param(10), 1);
        assert_eq!(blob.param(11), 0);
        assert_eq!(blob.param(12), 3);
        assert_eq!(blob.param(13), 0);
    }

    fn with_param(index: usize, raw: i32) -> RecipeBlob {
        let mut blob = encode(&Recipe::default());
        blob.set_param(index, raw);
        blob
    }

    #[test]
    fn test_decode_rejects_unknown_codes() {
        assert_eq!(
            decode(&with_param(7, 0x12)),
            Err(ValidationError::UnknownCode {
                field: "FilmSimulation",
                code: 0x12
            })
        );
        assert!(matches!(
            decode(&with_param(16, 0x8005)),
            Err(ValidationError::UnknownCode { field: "WhiteBalance", .. })
        ));
        assert!(matches!(
            decode(&with_param(10, 4)),
            Err(ValidationError::UnknownCode { field: "GrainEffect", .. })
        ));
        assert!(matches!(
            decode(&with_param(13, -1)),
            Err(ValidationError::UnknownCode { field: "ColorChromeBlue", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_scalars() {
        assert!(matches!(
            decode(&with_param(20, 15)),
            Err(ValidationError::NotScaled { field: "HighlightTone", raw: 15, scale: 10 })
        ));
        assert!(matches!(
            decode(&with_param(22, 50)),
            Err(ValidationError::OutOfRange { field: "Color", value: 5, .. })
        ));
        assert!(matches!(
            decode(&with_param(4, 5)),
            Err(ValidationError::ExposureNotAligned { .. })
        ));
        // A temperature without the matching white balance.
        assert!(matches!(
            decode(&with_param(19, 5000)),
            Err(ValidationError::UnexpectedColorTemperature { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let mut blob = encode(&Recipe::default());
        LittleEndian::write_u16(&mut blob.0[..2], 24);
        assert_eq!(
            decode(&blob),
            Err(ValidationError::ParamCount {
                count: 24,
                expected: 29
            })
        );
        assert_eq!(
            RecipeBlob::try_from(&[0u8; 605][..]),
            Err(ValidationError::BlobLength {
                expected: 628,
                actual: 605
            })
        );
    }

    #[test]
    fn test_describe_fields() {
        let blob = encode(&velvia());
        let described: Vec<String> = fields(&blob)
            .map(|(spec, raw)| format!("{}={}", spec.name, spec.describe(raw)))
            .collect();
        assert_eq!(described.len(), 29);
        assert!(described.contains(&"FilmSimulation=Velvia".to_string()));
        assert!(described.contains(&"ExposureBias=+0.67 EV".to_string()));
        assert!(described.contains(&"HighlightTone=-1".to_string()));
        assert!(described.contains(&"GrainEffect=Off".to_string()));
    }
}
