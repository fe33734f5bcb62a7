use bevy::prelude::*;
use thiserror::Error;

/// Parameter snapshot consumed by the generator.
///
/// `Copy` on purpose: the panel edits the copy held by [`GalaxyConfig`] and
/// every regeneration request carries its own value.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GalaxyParams {
    pub count: u32,
    pub size: f32,
    pub radius: f32,
    pub branches: u32,
    pub spin: f32, // radians per unit radius
    pub randomness: f32,
    pub randomness_power: f32,
    pub inside_color: LinearRgba,
    pub outside_color: LinearRgba,
}

impl Default for GalaxyParams {
    fn default() -> Self {
        Self {
            count: 100_000,
            size: 0.01,
            radius: 5.0,
            branches: 3,
            spin: 1.0,
            randomness: 0.2,
            randomness_power: 3.0,
            inside_color: Srgba::rgb_u8(0xff, 0x60, 0x30).into(),
            outside_color: Srgba::rgb_u8(0x1b, 0x39, 0x84).into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },
}

impl GalaxyParams {
    // colors are unbounded
    pub const MIN: Self = Self {
        count: 100,
        size: 0.001,
        radius: 0.01,
        branches: 2,
        spin: -5.0,
        randomness: 0.0,
        randomness_power: 1.0,
        inside_color: LinearRgba::BLACK,
        outside_color: LinearRgba::BLACK,
    };
    pub const MAX: Self = Self {
        count: 500_000,
        size: 0.1,
        radius: 20.0,
        branches: 20,
        spin: 5.0,
        randomness: 2.0,
        randomness_power: 10.0,
        inside_color: LinearRgba::WHITE,
        outside_color: LinearRgba::WHITE,
    };

    /// Checks every numeric field against the panel ranges, reporting the first violation.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let (min, max) = (Self::MIN, Self::MAX);

        check_range("count", self.count as f64, min.count as f64, max.count as f64)?;
        check_range("size", self.size as f64, min.size as f64, max.size as f64)?;
        check_range("radius", self.radius as f64, min.radius as f64, max.radius as f64)?;
        check_range(
            "branches",
            self.branches as f64,
            min.branches as f64,
            max.branches as f64,
        )?;
        check_range("spin", self.spin as f64, min.spin as f64, max.spin as f64)?;
        check_range(
            "randomness",
            self.randomness as f64,
            min.randomness as f64,
            max.randomness as f64,
        )?;
        check_range(
            "randomness_power",
            self.randomness_power as f64,
            min.randomness_power as f64,
            max.randomness_power as f64,
        )?;
        Ok(())
    }

    /// Copy of `self` with every numeric field pulled into its panel range.
    /// Non-finite floats fall back to the default value for that field.
    pub fn clamped(&self) -> Self {
        let (min, max, fallback) = (Self::MIN, Self::MAX, Self::default());
        let clamp_f32 = |value: f32, lo: f32, hi: f32, default: f32| {
            if value.is_finite() {
                value.clamp(lo, hi)
            } else {
                default
            }
        };

        Self {
            count: self.count.clamp(min.count, max.count),
            size: clamp_f32(self.size, min.size, max.size, fallback.size),
            radius: clamp_f32(self.radius, min.radius, max.radius, fallback.radius),
            branches: self.branches.clamp(min.branches, max.branches),
            spin: clamp_f32(self.spin, min.spin, max.spin, fallback.spin),
            randomness: clamp_f32(
                self.randomness,
                min.randomness,
                max.randomness,
                fallback.randomness,
            ),
            randomness_power: clamp_f32(
                self.randomness_power,
                min.randomness_power,
                max.randomness_power,
                fallback.randomness_power,
            ),
            inside_color: self.inside_color,
            outside_color: self.outside_color,
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ParamsError> {
    if !value.is_finite() {
        return Err(ParamsError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ParamsError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Live parameters owned by the panel. Edited in place every frame the user drags a slider.
#[derive(Resource, Default, Clone, PartialEq)]
pub struct GalaxyConfig {
    pub params: GalaxyParams,
}

/// Fired when the user finishes an edit. Carries the snapshot the galaxy is rebuilt from.
#[derive(Event, Clone, Copy, Debug)]
pub struct RegenerateGalaxy(pub GalaxyParams);

pub struct GalaxyConfigPlugin;

impl Plugin for GalaxyConfigPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(GalaxyConfig::default())
            .add_event::<RegenerateGalaxy>()
            .add_systems(Startup, request_initial_galaxy);
    }
}

fn request_initial_galaxy(config: Res<GalaxyConfig>, mut events: EventWriter<RegenerateGalaxy>) {
    events.write(RegenerateGalaxy(config.params));
}
