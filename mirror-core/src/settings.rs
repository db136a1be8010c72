//! Scene-wide settings carried by scene messages.

use serde::{Deserialize, Serialize};

use crate::message::{FogKind, FogMsg, SceneMsg, SkyMsg};
use crate::{Color, Vector3};

/// Current fog state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fog {
    /// Falloff type.
    pub kind: FogKind,
    /// Fog color.
    pub color: Color,
    /// Density for exponential fog.
    pub density: f64,
    /// Linear start distance.
    pub start: f64,
    /// Linear end distance.
    pub end: f64,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            kind: FogKind::None,
            color: Color::new(1.0, 1.0, 1.0, 1.0),
            density: 1.0,
            start: 1.0,
            end: 100.0,
        }
    }
}

/// Current sky state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sky {
    /// Time of day in hours, `[0, 24]`.
    pub time: f64,
    /// Sunrise hour, `[0, 24]`.
    pub sunrise: f64,
    /// Sunset hour, `[0, 24]`.
    pub sunset: f64,
    /// Wind speed.
    pub wind_speed: f64,
    /// Wind direction in radians.
    pub wind_direction: f64,
    /// Cloud ambient color.
    pub cloud_ambient: Color,
    /// Humidity, `[0, 1]`.
    pub humidity: f64,
    /// Mean cloud size, `[0, 1]`.
    pub mean_cloud_size: f64,
}

impl Default for Sky {
    fn default() -> Self {
        Self {
            time: 10.0,
            sunrise: 6.0,
            sunset: 20.0,
            wind_speed: 10.0,
            wind_direction: 0.0,
            cloud_ambient: Color::new(0.8, 0.8, 0.8, 1.0),
            humidity: 0.5,
            mean_cloud_size: 0.5,
        }
    }
}

/// Terrain registered by the first heightmap visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heightmap {
    /// Visual that carried the heightmap.
    pub visual: String,
    /// Height image URI.
    pub uri: String,
    /// Terrain extent.
    pub size: Vector3,
}

/// Global scene settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    /// Ambient light color.
    pub ambient: Color,
    /// Background color.
    pub background: Color,
    /// Shadows enabled.
    pub shadows: bool,
    /// Ground grid shown.
    pub grid: bool,
    /// Fog state.
    pub fog: Fog,
    /// Sky state, `None` until a scene enables it.
    pub sky: Option<Sky>,
    /// Terrain, if any.
    pub heightmap: Option<Heightmap>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient: Color::new(0.1, 0.1, 0.1, 1.0),
            background: Color::new(0.7, 0.7, 0.7, 1.0),
            shadows: true,
            grid: true,
            fog: Fog::default(),
            sky: None,
            heightmap: None,
        }
    }
}

impl SceneSettings {
    /// Apply the settings present in a scene message.
    pub fn apply(&mut self, msg: &SceneMsg) {
        if let Some(ambient) = msg.ambient {
            self.ambient = ambient;
        }
        if let Some(background) = msg.background {
            self.background = background;
        }
        if let Some(shadows) = msg.shadows {
            self.shadows = shadows;
        }
        if let Some(grid) = msg.grid {
            self.grid = grid;
        }
        if let Some(fog) = &msg.fog {
            self.apply_fog(fog);
        }
        if let Some(sky) = &msg.sky {
            self.apply_sky(sky);
        }
    }

    fn apply_fog(&mut self, msg: &FogMsg) {
        let fog = &mut self.fog;
        if let Some(kind) = msg.kind {
            fog.kind = kind;
        }
        if let Some(color) = msg.color {
            fog.color = color;
        }
        if let Some(density) = msg.density {
            fog.density = density;
        }
        if let Some(start) = msg.start {
            fog.start = start;
        }
        if let Some(end) = msg.end {
            fog.end = end;
        }
    }

    fn apply_sky(&mut self, msg: &SkyMsg) {
        let sky = self.sky.get_or_insert_with(Sky::default);
        if let Some(time) = msg.time {
            sky.time = time.clamp(0.0, 24.0);
        }
        if let Some(sunrise) = msg.sunrise {
            sky.sunrise = sunrise.clamp(0.0, 24.0);
        }
        if let Some(sunset) = msg.sunset {
            sky.sunset = sunset.clamp(0.0, 24.0);
        }
        if let Some(speed) = msg.wind_speed {
            sky.wind_speed = speed;
        }
        if let Some(direction) = msg.wind_direction {
            sky.wind_direction = direction;
        }
        if let Some(color) = msg.cloud_ambient {
            sky.cloud_ambient = color;
        }
        if let Some(humidity) = msg.humidity {
            sky.humidity = humidity.clamp(0.0, 1.0);
        }
        if let Some(size) = msg.mean_cloud_size {
            sky.mean_cloud_size = size.clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_scene_keeps_other_fields() {
        let mut settings = SceneSettings::default();
        settings.apply(&SceneMsg {
            grid: Some(false),
            ..SceneMsg::default()
        });
        assert!(!settings.grid);
        assert!(settings.shadows);
        assert!(settings.sky.is_none());
    }

    #[test]
    fn test_sky_values_are_clamped() {
        let mut settings = SceneSettings::default();
        settings.apply(&SceneMsg {
            sky: Some(SkyMsg {
                time: Some(30.0),
                sunrise: Some(-2.0),
                humidity: Some(1.5),
                ..SkyMsg::default()
            }),
            ..SceneMsg::default()
        });
        let sky = settings.sky.expect("sky enabled");
        assert!((sky.time - 24.0).abs() < f64::EPSILON);
        assert!(sky.sunrise.abs() < f64::EPSILON);
        assert!((sky.humidity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fog_fields_merge() {
        let mut settings = SceneSettings::default();
        settings.apply(&SceneMsg {
            fog: Some(FogMsg {
                kind: Some(FogKind::Linear),
                end: Some(50.0),
                ..FogMsg::default()
            }),
            ..SceneMsg::default()
        });
        assert_eq!(settings.fog.kind, FogKind::Linear);
        assert!((settings.fog.end - 50.0).abs() < f64::EPSILON);
        assert!((settings.fog.start - 1.0).abs() < f64::EPSILON);
    }
}
