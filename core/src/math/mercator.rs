use std::f64::consts::PI;

use crate::config::ProjectionConfig;

/// Spherical Web Mercator projection onto a single fixed-zoom pixel grid.
#[derive(Debug, Clone, Copy)]
pub struct WebMercator {
    pixel_width: f64,
    max_pixel: i64,
}

impl WebMercator {
    pub fn new(config: &ProjectionConfig) -> Self {
        Self {
            pixel_width: f64::from(config.pixel_width),
            max_pixel: i64::from(config.pixel_width) - 1,
        }
    }

    pub fn pixel_x(&self, longitude: f64) -> i64 {
        ((longitude + 180.0) * (self.pixel_width / 360.0)).round() as i64
    }

    pub fn pixel_y(&self, latitude: f64) -> i64 {
        let sin_lat = (latitude * PI / 180.0).sin();
        let stretch = ((1.0 + sin_lat) / (1.0 - sin_lat)).ln();
        ((0.5 - stretch / (4.0 * PI)) * self.pixel_width).round() as i64
    }

    /// Projects, shifts by `offset` pixels and clamps into the grid.
    pub fn project(&self, longitude: f64, latitude: f64, offset: (i32, i32)) -> (u32, u32) {
        let x = self.pixel_x(longitude) + i64::from(offset.0);
        let y = self.pixel_y(latitude) + i64::from(offset.1);
        (self.clamp(x), self.clamp(y))
    }

    fn clamp(&self, pixel: i64) -> u32 {
        // max_pixel < 2^31 once the projection config has been validated
        pixel.clamp(0, self.max_pixel) as u32
    }
}
