//! Tunable dispersion parameters and partial updates.

use crate::band::{BAND_SAMPLES, Band, MAX_BAND_SAMPLES};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from validating parameter values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("index of refraction for band {band} must be positive and finite, got {value}")]
    InvalidIor { band: Band, value: f32 },
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("{name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f32 },
    #[error("light direction must be a finite non-zero vector, got {0:?}")]
    DegenerateLight(Vec3),
    #[error("band sample count must be at least 1")]
    NoBandSamples,
    #[error("band sample count must be at most {max}, got {value}")]
    TooManyBandSamples { value: u32, max: u32 },
}

/// Errors from loading parameter files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid parameters: {0}")]
    Invalid(#[from] ParamError),
}

/// Per-material configuration. Created once; dynamic fields change only
/// through [`ParamUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DispersionParams {
    pub ior_red: f32,
    pub ior_yellow: f32,
    pub ior_green: f32,
    pub ior_cyan: f32,
    pub ior_blue: f32,
    pub ior_purple: f32,
    /// Scale of the refracted sampling offset.
    pub refract_power: f32,
    /// Multiplier on every band's offset; exaggerates the band separation.
    pub chromatic_aberration: f32,
    /// 0 is grayscale, 1 leaves the color alone, above 1 over-saturates.
    pub saturation: f32,
    pub shininess: f32,
    pub diffuseness: f32,
    pub fresnel_power: f32,
    pub light_direction: Vec3,
    pub band_samples: u32,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            ior_red: 1.15,
            ior_yellow: 1.16,
            ior_green: 1.18,
            ior_cyan: 1.22,
            ior_blue: 1.22,
            ior_purple: 1.22,
            refract_power: 0.4,
            chromatic_aberration: 0.6,
            saturation: 1.08,
            shininess: 40.0,
            diffuseness: 0.2,
            fresnel_power: 8.0,
            light_direction: Vec3::new(-1.0, 1.0, 1.0),
            band_samples: BAND_SAMPLES,
        }
    }
}

impl DispersionParams {
    /// Index of refraction for one band.
    pub fn ior(&self, band: Band) -> f32 {
        match band {
            Band::Red => self.ior_red,
            Band::Yellow => self.ior_yellow,
            Band::Green => self.ior_green,
            Band::Cyan => self.ior_cyan,
            Band::Blue => self.ior_blue,
            Band::Purple => self.ior_purple,
        }
    }

    pub fn set_ior(&mut self, band: Band, value: f32) {
        match band {
            Band::Red => self.ior_red = value,
            Band::Yellow => self.ior_yellow = value,
            Band::Green => self.ior_green = value,
            Band::Cyan => self.ior_cyan = value,
            Band::Blue => self.ior_blue = value,
            Band::Purple => self.ior_purple = value,
        }
    }

    /// Same IOR on every band.
    pub fn with_uniform_ior(mut self, value: f32) -> Self {
        for band in Band::ALL {
            self.set_ior(band, value);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        for band in Band::ALL {
            let value = self.ior(band);
            if !(value.is_finite() && value > 0.0) {
                return Err(ParamError::InvalidIor { band, value });
            }
        }
        finite("refractPower", self.refract_power)?;
        finite("chromaticAberration", self.chromatic_aberration)?;
        finite("saturation", self.saturation)?;
        positive("shininess", self.shininess)?;
        non_negative("diffuseness", self.diffuseness)?;
        positive("fresnelPower", self.fresnel_power)?;
        if !self.light_direction.is_finite() || self.light_direction.length_squared() == 0.0 {
            return Err(ParamError::DegenerateLight(self.light_direction));
        }
        if self.band_samples == 0 {
            return Err(ParamError::NoBandSamples);
        }
        if self.band_samples > MAX_BAND_SAMPLES {
            return Err(ParamError::TooManyBandSamples {
                value: self.band_samples,
                max: MAX_BAND_SAMPLES,
            });
        }
        Ok(())
    }

    /// Parse a YAML parameter document. Missing keys take their defaults.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_yaml::from_str(source)?;
        params.validate()?;
        Ok(params)
    }

    /// Load and validate a YAML parameter file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let params = Self::from_yaml_str(&source)?;
        tracing::info!("loaded dispersion parameters from {}", path.display());
        Ok(params)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn finite(name: &'static str, value: f32) -> Result<(), ParamError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParamError::NotFinite { name, value })
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ParamError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ParamError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParamError::Negative { name, value })
    }
}

/// A partial parameter change. Unset fields leave the material untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ParamUpdate {
    pub ior_red: Option<f32>,
    pub ior_yellow: Option<f32>,
    pub ior_green: Option<f32>,
    pub ior_cyan: Option<f32>,
    pub ior_blue: Option<f32>,
    pub ior_purple: Option<f32>,
    pub refract_power: Option<f32>,
    pub chromatic_aberration: Option<f32>,
    pub saturation: Option<f32>,
    pub shininess: Option<f32>,
    pub diffuseness: Option<f32>,
    pub fresnel_power: Option<f32>,
    pub light_direction: Option<Vec3>,
    pub band_samples: Option<u32>,
}

impl ParamUpdate {
    pub fn light_direction(direction: Vec3) -> Self {
        Self {
            light_direction: Some(direction),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Full replacement of every field.
    pub fn replace_all(params: &DispersionParams) -> Self {
        Self {
            ior_red: Some(params.ior_red),
            ior_yellow: Some(params.ior_yellow),
            ior_green: Some(params.ior_green),
            ior_cyan: Some(params.ior_cyan),
            ior_blue: Some(params.ior_blue),
            ior_purple: Some(params.ior_purple),
            refract_power: Some(params.refract_power),
            chromatic_aberration: Some(params.chromatic_aberration),
            saturation: Some(params.saturation),
            shininess: Some(params.shininess),
            diffuseness: Some(params.diffuseness),
            fresnel_power: Some(params.fresnel_power),
            light_direction: Some(params.light_direction),
            band_samples: Some(params.band_samples),
        }
    }

    /// Combine with a later update; fields set in `later` win.
    pub fn merge(self, later: ParamUpdate) -> ParamUpdate {
        ParamUpdate {
            ior_red: later.ior_red.or(self.ior_red),
            ior_yellow: later.ior_yellow.or(self.ior_yellow),
            ior_green: later.ior_green.or(self.ior_green),
            ior_cyan: later.ior_cyan.or(self.ior_cyan),
            ior_blue: later.ior_blue.or(self.ior_blue),
            ior_purple: later.ior_purple.or(self.ior_purple),
            refract_power: later.refract_power.or(self.refract_power),
            chromatic_aberration: later.chromatic_aberration.or(self.chromatic_aberration),
            saturation: later.saturation.or(self.saturation),
            shininess: later.shininess.or(self.shininess),
            diffuseness: later.diffuseness.or(self.diffuseness),
            fresnel_power: later.fresnel_power.or(self.fresnel_power),
            light_direction: later.light_direction.or(self.light_direction),
            band_samples: later.band_samples.or(self.band_samples),
        }
    }

    /// The parameters that would result from applying this update to `base`.
    pub fn applied_to(&self, base: &DispersionParams) -> DispersionParams {
        DispersionParams {
            ior_red: self.ior_red.unwrap_or(base.ior_red),
            ior_yellow: self.ior_yellow.unwrap_or(base.ior_yellow),
            ior_green: self.ior_green.unwrap_or(base.ior_green),
            ior_cyan: self.ior_cyan.unwrap_or(base.ior_cyan),
            ior_blue: self.ior_blue.unwrap_or(base.ior_blue),
            ior_purple: self.ior_purple.unwrap_or(base.ior_purple),
            refract_power: self.refract_power.unwrap_or(base.refract_power),
            chromatic_aberration: self.chromatic_aberration.unwrap_or(base.chromatic_aberration),
            saturation: self.saturation.unwrap_or(base.saturation),
            shininess: self.shininess.unwrap_or(base.shininess),
            diffuseness: self.diffuseness.unwrap_or(base.diffuseness),
            fresnel_power: self.fresnel_power.unwrap_or(base.fresnel_power),
            light_direction: self.light_direction.unwrap_or(base.light_direction),
            band_samples: self.band_samples.unwrap_or(base.band_samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let params = DispersionParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.band_samples, 16);
        assert_eq!(params.ior(Band::Green), 1.18);
    }

    #[test]
    fn rejects_non_positive_ior() {
        let mut params = DispersionParams::default();
        params.set_ior(Band::Cyan, 0.0);
        assert_eq!(
            params.validate(),
            Err(ParamError::InvalidIor {
                band: Band::Cyan,
                value: 0.0
            })
        );
    }

    #[test]
    fn rejects_zero_light_and_negative_diffuse() {
        let params = DispersionParams {
            light_direction: Vec3::ZERO,
            ..DispersionParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamError::DegenerateLight(_))
        ));

        let params = DispersionParams {
            diffuseness: -0.1,
            ..DispersionParams::default()
        };
        assert!(matches!(params.validate(), Err(ParamError::Negative { .. })));
    }

    #[test]
    fn band_samples_are_bounded() {
        let at_max = DispersionParams {
            band_samples: MAX_BAND_SAMPLES,
            ..DispersionParams::default()
        };
        assert!(at_max.validate().is_ok());

        let over = DispersionParams {
            band_samples: MAX_BAND_SAMPLES + 1,
            ..DispersionParams::default()
        };
        assert_eq!(
            over.validate(),
            Err(ParamError::TooManyBandSamples {
                value: MAX_BAND_SAMPLES + 1,
                max: MAX_BAND_SAMPLES,
            })
        );

        assert!(matches!(
            DispersionParams::from_yaml_str("bandSamples: 4000000000\n"),
            Err(ConfigError::Invalid(ParamError::TooManyBandSamples { .. }))
        ));
    }

    #[test]
    fn merge_prefers_later_fields() {
        let first = ParamUpdate {
            saturation: Some(0.5),
            shininess: Some(10.0),
            ..ParamUpdate::default()
        };
        let second = ParamUpdate {
            saturation: Some(0.9),
            ..ParamUpdate::default()
        };
        let merged = first.merge(second);
        assert_eq!(merged.saturation, Some(0.9));
        assert_eq!(merged.shininess, Some(10.0));
        assert!(merged.light_direction.is_none());
    }

    #[test]
    fn update_applies_only_set_fields() {
        let base = DispersionParams::default();
        let next = ParamUpdate::light_direction(Vec3::X).applied_to(&base);
        assert_eq!(next.light_direction, Vec3::X);
        assert_eq!(next.shininess, base.shininess);
        assert!(ParamUpdate::default().is_empty());
        assert_eq!(ParamUpdate::replace_all(&base).applied_to(&next), base);
    }

    #[test]
    fn yaml_uses_camel_case_and_defaults() {
        let params = DispersionParams::from_yaml_str("iorRed: 1.3\nrefractPower: 0.1\n").unwrap();
        assert_eq!(params.ior_red, 1.3);
        assert_eq!(params.refract_power, 0.1);
        assert_eq!(params.fresnel_power, 8.0);
    }

    #[test]
    fn yaml_rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            DispersionParams::from_yaml_str("iorMagenta: 1.0\n"),
            Err(ConfigError::Yaml(_))
        ));
        assert!(matches!(
            DispersionParams::from_yaml_str("shininess: 0\n"),
            Err(ConfigError::Invalid(ParamError::NotPositive { .. }))
        ));
    }

    #[test]
    fn yaml_roundtrip_through_file() {
        let params = DispersionParams {
            saturation: 0.25,
            ..DispersionParams::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(params.to_yaml_string().unwrap().as_bytes())
            .unwrap();
        let loaded = DispersionParams::load(file.path()).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DispersionParams::load(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
