//! Straight-line route interpolation.
//!
//! Latitude and longitude are interpolated independently, so intermediate
//! points lie on the straight segment in lat/lng space rather than on the
//! great circle. The error grows with route length and latitude; it is
//! accepted for short and medium simulated routes.

use std::iter::FusedIterator;

use tracking_core::{Coordinate, Result, bad_request};

/// A straight route from `origin` to `destination` split into `steps` legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    origin: Coordinate,
    destination: Coordinate,
    steps: usize,
}

impl Route {
    /// Creates a route with `steps + 1` points.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `steps` is zero or either endpoint is
    /// outside the valid coordinate ranges.
    pub fn new(origin: Coordinate, destination: Coordinate, steps: usize) -> Result<Self> {
        if steps == 0 {
            return Err(bad_request!("route steps must be positive"));
        }
        origin.validate()?;
        destination.validate()?;
        Ok(Self { origin, destination, steps })
    }

    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// Number of points, always `steps + 1`.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The point at `index`, or `None` past the destination.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<Coordinate> {
        if index > self.steps {
            return None;
        }
        // endpoints are returned verbatim so the destination is exact
        if index == 0 {
            return Some(self.origin);
        }
        if index == self.steps {
            return Some(self.destination);
        }

        #[allow(clippy::cast_precision_loss)]
        let fraction = index as f64 / self.steps as f64;
        Some(Coordinate {
            latitude: lerp(self.origin.latitude, self.destination.latitude, fraction),
            longitude: lerp(self.origin.longitude, self.destination.longitude, fraction),
        })
    }

    /// A fresh iterator over every point; call again to restart.
    #[must_use]
    pub const fn points(&self) -> Points {
        Points { route: *self, front: 0, back: self.steps + 1 }
    }
}

/// Iterator over the points of a [`Route`].
#[derive(Debug, Clone)]
pub struct Points {
    route: Route,
    front: usize,
    back: usize,
}

impl Iterator for Points {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let point = self.route.point(self.front);
        self.front += 1;
        point
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Points {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.route.point(self.back)
    }
}

impl ExactSizeIterator for Points {}
impl FusedIterator for Points {}

/// Interpolates `steps + 1` points from `origin` to `destination`.
///
/// # Errors
///
/// Returns a validation error when `steps` is zero or a coordinate is invalid.
pub fn interpolate(
    origin: Coordinate, destination: Coordinate, steps: usize,
) -> Result<Vec<Coordinate>> {
    Ok(Route::new(origin, destination, steps)?.points().collect())
}

fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    (to - from).mul_add(fraction, from)
}
