//! Named-field recipe construction.

use serde::{Deserialize, Serialize};

use super::*;

/// Unvalidated recipe parameters. Unset fields take the neutral default.
///
/// Deserializes from TOML, e.g.
///
/// ```toml
/// film_simulation = "classic-chrome"
/// exposure = 0.7
/// highlights = -1
/// grain = "weak"
/// dynamic_range = 200
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeBuilder {
    pub film_simulation: Option<FilmSimulation>,
    /// EV, in third-stop steps.
    pub exposure: Option<f64>,
    pub dynamic_range: Option<DynamicRange>,
    pub highlights: Option<i32>,
    pub shadows: Option<i32>,
    pub color: Option<i32>,
    pub sharpness: Option<i32>,
    pub noise_reduction: Option<i32>,
    pub clarity: Option<i32>,
    pub grain: Option<EffectStrength>,
    pub grain_size: Option<GrainSize>,
    pub color_chrome: Option<EffectStrength>,
    pub color_chrome_blue: Option<EffectStrength>,
    pub white_balance: Option<WhiteBalance>,
    pub wb_shift_r: Option<i32>,
    pub wb_shift_b: Option<i32>,
    /// Kelvin. Implies `white_balance = "temperature"` when that is unset.
    pub color_temperature: Option<u32>,
    pub image_size: Option<ImageSize>,
    pub image_quality: Option<ImageQuality>,
}

impl RecipeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn film_simulation(mut self, value: FilmSimulation) -> Self {
        self.film_simulation = Some(value);
        self
    }

    pub fn exposure(mut self, ev: f64) -> Self {
        self.exposure = Some(ev);
        self
    }

    pub fn dynamic_range(mut self, value: DynamicRange) -> Self {
        self.dynamic_range = Some(value);
        self
    }

    pub fn highlights(mut self, value: i32) -> Self {
        self.highlights = Some(value);
        self
    }

    pub fn shadows(mut self, value: i32) -> Self {
        self.shadows = Some(value);
        self
    }

    pub fn color(mut self, value: i32) -> Self {
        self.color = Some(value);
        self
    }

    pub fn sharpness(mut self, value: i32) -> Self {
        self.sharpness = Some(value);
        self
    }

    pub fn noise_reduction(mut self, value: i32) -> Self {
        self.noise_reduction = Some(value);
        self
    }

    pub fn clarity(mut self, value: i32) -> Self {
        self.clarity = Some(value);
        self
    }

    pub fn grain(mut self, strength: EffectStrength, size: GrainSize) -> Self {
        self.grain = Some(strength);
        self.grain_size = Some(size);
        self
    }

    pub fn color_chrome(mut self, value: EffectStrength) -> Self {
        self.color_chrome = Some(value);
        self
    }

    pub fn color_chrome_blue(mut self, value: EffectStrength) -> Self {
        self.color_chrome_blue = Some(value);
        self
    }

    pub fn white_balance(mut self, value: WhiteBalance) -> Self {
        self.white_balance = Some(value);
        self
    }

    pub fn wb_shift(mut self, red: i32, blue: i32) -> Self {
        self.wb_shift_r = Some(red);
        self.wb_shift_b = Some(blue);
        self
    }

    pub fn color_temperature(mut self, kelvin: u32) -> Self {
        self.color_temperature = Some(kelvin);
        self
    }

    pub fn image_size(mut self, value: ImageSize) -> Self {
        self.image_size = Some(value);
        self
    }

    pub fn image_quality(mut self, value: ImageQuality) -> Self {
        self.image_quality = Some(value);
        self
    }

    /// Overlay `other` on top of `self`: fields set in `other` win.
    pub fn merge(self, other: RecipeBuilder) -> Self {
        Self {
            film_simulation: other.film_simulation.or(self.film_simulation),
            exposure: other.exposure.or(self.exposure),
            dynamic_range: other.dynamic_range.or(self.dynamic_range),
            highlights: other.highlights.or(self.highlights),
            shadows: other.shadows.or(self.shadows),
            color: other.color.or(self.color),
            sharpness: other.sharpness.or(self.sharpness),
            noise_reduction: other.noise_reduction.or(self.noise_reduction),
            clarity: other.clarity.or(self.clarity),
            grain: other.grain.or(self.grain),
            grain_size: other.grain_size.or(self.grain_size),
            color_chrome: other.color_chrome.or(self.color_chrome),
            color_chrome_blue: other.color_chrome_blue.or(self.color_chrome_blue),
            white_balance: other.white_balance.or(self.white_balance),
            wb_shift_r: other.wb_shift_r.or(self.wb_shift_r),
            wb_shift_b: other.wb_shift_b.or(self.wb_shift_b),
            color_temperature: other.color_temperature.or(self.color_temperature),
            image_size: other.image_size.or(self.image_size),
            image_quality: other.image_quality.or(self.image_quality),
        }
    }

    /// Validate against the ranges every supported body accepts.
    pub fn build(&self) -> Result<Recipe, ValidationError> {
        self.build_for(&Capabilities::STANDARD)
    }

    /// Validate against one body's ranges.
    pub fn build_for(&self, caps: &Capabilities) -> Result<Recipe, ValidationError> {
        let defaults = Recipe::default();

        let white_balance = match (self.white_balance, self.color_temperature) {
            (Some(wb), _) => wb,
            (None, Some(_)) => WhiteBalance::Temperature,
            (None, None) => defaults.white_balance,
        };
        let color_temperature = self
            .color_temperature
            .map(|k| narrow::<u16>("WBColorTemp", k.into(), COLOR_TEMPERATURE_RANGE))
            .transpose()?;

        let recipe = Recipe {
            film_simulation: self.film_simulation.unwrap_or(defaults.film_simulation),
            exposure: self
                .exposure
                .map(ExposureBias::from_ev)
                .transpose()?
                .unwrap_or(defaults.exposure),
            dynamic_range: self.dynamic_range.unwrap_or(defaults.dynamic_range),
            highlight_tone: tone("HighlightTone", self.highlights, caps.highlight_tone)?,
            shadow_tone: tone("ShadowTone", self.shadows, caps.shadow_tone)?,
            color: tone("Color", self.color, TONE_RANGE)?,
            sharpness: tone("Sharpness", self.sharpness, TONE_RANGE)?,
            noise_reduction: tone("NoiseReduction", self.noise_reduction, TONE_RANGE)?,
            clarity: tone("Clarity", self.clarity, CLARITY_RANGE)?,
            grain: self.grain.unwrap_or(defaults.grain),
            grain_size: self.grain_size.unwrap_or(defaults.grain_size),
            color_chrome: self.color_chrome.unwrap_or(defaults.color_chrome),
            color_chrome_blue: self.color_chrome_blue.unwrap_or(defaults.color_chrome_blue),
            white_balance,
            wb_shift_r: tone("WBShiftR", self.wb_shift_r, WB_SHIFT_RANGE)?,
            wb_shift_b: tone("WBShiftB", self.wb_shift_b, WB_SHIFT_RANGE)?,
            color_temperature,
            image_size: self.image_size.unwrap_or(defaults.image_size),
            image_quality: self.image_quality.unwrap_or(defaults.image_quality),
        };
        recipe.validate_for(caps)?;
        Ok(recipe)
    }
}

fn tone(field: &'static str, value: Option<i32>, range: (i8, i8)) -> Result<i8, ValidationError> {
    value.map_or(Ok(0), |v| narrow(field, v.into(), range))
}

/// Narrow a user value into the field's storage type, reporting the
/// field's documented range when it does not fit.
fn narrow<T>(field: &'static str, value: i64, range: (T, T)) -> Result<T, ValidationError>
where
    T: TryFrom<i64> + Into<i64> + Copy,
{
    let out_of_range = || ValidationError::OutOfRange {
        field,
        value,
        min: range.0.into(),
        max: range.1.into(),
    };
    let narrowed = T::try_from(value).map_err(|_| out_of_range())?;
    if value < range.0.into() || value > range.1.into() {
        return Err(out_of_range());
    }
    Ok(narrowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::X_T30;

    #[test]
    fn test_defaults_are_neutral() {
        let recipe = RecipeBuilder::new().build().unwrap();
        assert_eq!(recipe, Recipe::default());
    }

    #[test]
    fn test_each_range_rejects_one_past_the_edge() {
        type Setter = fn(RecipeBuilder, i32) -> RecipeBuilder;
        let cases: [(&str, Setter, i32, i32); 8] = [
            ("HighlightTone", RecipeBuilder::highlights, -4, 4),
            ("ShadowTone", RecipeBuilder::shadows, -4, 4),
            ("Color", RecipeBuilder::color, -4, 4),
            ("Sharpness", RecipeBuilder::sharpness, -4, 4),
            ("NoiseReduction", RecipeBuilder::noise_reduction, -4, 4),
            ("Clarity", RecipeBuilder::clarity, -5, 5),
            ("WBShiftR", |b, v| b.wb_shift(v, 0), -9, 9),
            ("WBShiftB", |b, v| b.wb_shift(0, v), -9, 9),
        ];
        for (field, set, min, max) in cases {
            assert!(set(RecipeBuilder::new(), min).build().is_ok(), "{field} {min}");
            assert!(set(RecipeBuilder::new(), max).build().is_ok(), "{field} {max}");
            for bad in [min - 1, max + 1] {
                match set(RecipeBuilder::new(), bad).build() {
                    Err(ValidationError::OutOfRange { field: f, value, .. }) => {
                        assert_eq!(f, field);
                        assert_eq!(value, i64::from(bad));
                    }
                    other => panic!("{field} = {bad}: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_out_of_i8_value_reports_range() {
        assert_eq!(
            RecipeBuilder::new().highlights(1000).build(),
            Err(ValidationError::OutOfRange {
                field: "HighlightTone",
                value: 1000,
                min: -4,
                max: 4
            })
        );
    }

    #[test]
    fn test_x_t30_shadow_range() {
        let builder = RecipeBuilder::new().shadows(-3);
        assert!(builder.build().is_ok());
        assert!(builder.build_for(&X_T30.capabilities).is_err());
        assert!(
            RecipeBuilder::new()
                .shadows(-2)
                .build_for(&X_T30.capabilities)
                .is_ok()
        );
    }

    #[test]
    fn test_color_temperature_implies_temperature_wb() {
        let recipe = RecipeBuilder::new().color_temperature(5600).build().unwrap();
        assert_eq!(recipe.white_balance(), WhiteBalance::Temperature);
        assert_eq!(recipe.color_temperature(), Some(5600));

        assert!(RecipeBuilder::new().color_temperature(2400).build().is_err());
        assert!(RecipeBuilder::new().color_temperature(10001).build().is_err());
        assert_eq!(
            RecipeBuilder::new()
                .white_balance(WhiteBalance::Temperature)
                .build(),
            Err(ValidationError::MissingColorTemperature)
        );
    }

    #[test]
    fn test_from_toml() {
        let builder = RecipeBuilder::from_toml(
            r#"
            film_simulation = "classic-chrome"
            exposure = -0.33
            highlights = -1
            grain = "weak"
            grain_size = "large"
            dynamic_range = 200
            white_balance = "daylight"
            "#,
        )
        .unwrap();
        let recipe = builder.build().unwrap();
        assert_eq!(recipe.film_simulation(), FilmSimulation::ClassicChrome);
        assert_eq!(recipe.exposure().thirds(), -1);
        assert_eq!(recipe.highlight_tone(), -1);
        assert_eq!(recipe.grain(), EffectStrength::Weak);
        assert_eq!(recipe.grain_size(), GrainSize::Large);
        assert_eq!(recipe.dynamic_range(), DynamicRange::Dr200);
        assert_eq!(recipe.white_balance(), WhiteBalance::Daylight);

        assert!(RecipeBuilder::from_toml("dynamic_range = 300").is_err());
        assert!(RecipeBuilder::from_toml("film = \"velvia\"").is_err());
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = RecipeBuilder::new()
            .film_simulation(FilmSimulation::Astia)
            .color(2);
        let merged = base.merge(RecipeBuilder::new().color(-1));
        assert_eq!(merged.film_simulation, Some(FilmSimulation::Astia));
        assert_eq!(merged.color, Some(-1));
    }
}
