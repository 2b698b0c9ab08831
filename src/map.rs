//! Campus map projection.
//!
//! Maps latitude/longitude linearly onto a fixed pixel viewport. Points
//! outside the campus bounds are pinned to the viewport edge.

/// Geographic bounds, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

pub const CAMPUS_BOUNDS: Bounds = Bounds { min_lat: -33.8850, max_lat: -33.8800, min_lng: 151.1950, max_lng: 151.2000 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewport {
    pub bounds: Bounds,
    pub width: f64,
    pub height: f64,
    /// Top-left corner of the map area on screen.
    pub origin: Point,
}

impl Default for MapViewport {
    fn default() -> Self {
        Self { bounds: CAMPUS_BOUNDS, width: 300.0, height: 300.0, origin: Point { x: 50.0, y: 75.0 } }
    }
}

impl MapViewport {
    /// Screen position for a coordinate, clamped to the viewport.
    #[must_use]
    pub fn project(&self, latitude: f64, longitude: f64) -> Point {
        let b = &self.bounds;
        let x = (longitude - b.min_lng) / (b.max_lng - b.min_lng) * self.width + self.origin.x;
        let y = (latitude - b.min_lat) / (b.max_lat - b.min_lat) * self.height + self.origin.y;
        Point {
            x: x.clamp(self.origin.x, self.origin.x + self.width),
            y: y.clamp(self.origin.y, self.origin.y + self.height),
        }
    }

    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let b = &self.bounds;
        (b.min_lat..=b.max_lat).contains(&latitude) && (b.min_lng..=b.max_lng).contains(&longitude)
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod tests;
