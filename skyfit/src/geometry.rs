//! Aperture and annulus geometry.
//!
//! Pixel `(x, y)` has its center at integer coordinates. Angles are measured
//! counter-clockwise from the +x axis in pixel coordinates and normalised to
//! `[0, 2π)`.

use std::f64::consts::TAU;

use glam::DVec2;

/// Polar form of `point` relative to `center`: `(radius, angle)`.
#[inline]
pub fn to_polar(center: DVec2, point: DVec2) -> (f64, f64) {
    let d = point - center;
    (d.length(), normalize_angle(d.y.atan2(d.x)))
}

/// Cartesian point at `radius` and `angle` from `center`.
#[inline]
pub fn from_polar(center: DVec2, radius: f64, angle: f64) -> DVec2 {
    center + DVec2::from_angle(angle) * radius
}

/// Wraps an angle into `[0, 2π)`.
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Index of the equal-width angular sector containing `angle`.
///
/// Sector 0 starts at angle 0; there are `sectors` sectors covering `[0, 2π)`.
#[inline]
pub fn angular_sector(angle: f64, sectors: usize) -> usize {
    debug_assert!(sectors > 0);
    let idx = (normalize_angle(angle) / TAU * sectors as f64) as usize;
    idx.min(sectors - 1)
}

/// An ellipse centered on the origin. A circle has equal semi-axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Rotation of the major axis from +x, in radians.
    pub position_angle: f64,
}

impl Ellipse {
    pub fn circle(radius: f64) -> Self {
        Self {
            semi_major: radius,
            semi_minor: radius,
            position_angle: 0.0,
        }
    }

    pub fn new(semi_major: f64, semi_minor: f64, position_angle: f64) -> Self {
        Self {
            semi_major,
            semi_minor,
            position_angle,
        }
    }

    #[inline]
    pub fn is_circle(&self) -> bool {
        self.semi_major == self.semi_minor
    }

    /// `sqrt((u/a)² + (v/b)²)` where `(u, v)` is `offset` in the ellipse's
    /// own axes. Points with a value `<= 1` are inside.
    #[inline]
    pub fn normalized_distance(&self, offset: DVec2) -> f64 {
        if self.is_circle() {
            return offset.length() / self.semi_major;
        }
        let (sin, cos) = self.position_angle.sin_cos();
        let u = offset.x * cos + offset.y * sin;
        let v = -offset.x * sin + offset.y * cos;
        let nu = u / self.semi_major;
        let nv = v / self.semi_minor;
        (nu * nu + nv * nv).sqrt()
    }

    #[inline]
    pub fn contains(&self, offset: DVec2) -> bool {
        self.normalized_distance(offset) <= 1.0
    }

    /// The ellipse with both semi-axes extended by `margin`.
    pub fn grown(&self, margin: f64) -> Self {
        Self {
            semi_major: self.semi_major + margin,
            semi_minor: self.semi_minor + margin,
            position_angle: self.position_angle,
        }
    }

    /// Largest distance from the center to the boundary.
    #[inline]
    pub fn extent(&self) -> f64 {
        self.semi_major.max(self.semi_minor)
    }
}

/// Where a pixel falls relative to an aperture and its annulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Aperture,
    Annulus,
    Outside,
}

/// Aperture ellipse plus the annulus ring immediately outside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureGeometry {
    pub aperture: Ellipse,
    pub annulus_width: f64,
}

impl ApertureGeometry {
    pub fn new(aperture: Ellipse, annulus_width: f64) -> Self {
        Self {
            aperture,
            annulus_width,
        }
    }

    /// Outer boundary of the annulus.
    #[inline]
    pub fn outer(&self) -> Ellipse {
        self.aperture.grown(self.annulus_width)
    }

    #[inline]
    pub fn aperture_radius(&self) -> f64 {
        self.aperture.semi_major
    }

    #[inline]
    pub fn annulus_outer_radius(&self) -> f64 {
        self.aperture.semi_major + self.annulus_width
    }

    /// Classifies a pixel by its offset from the aperture center.
    pub fn classify(&self, offset: DVec2) -> Region {
        if self.aperture.contains(offset) {
            Region::Aperture
        } else if self.outer().contains(offset) {
            Region::Annulus
        } else {
            Region::Outside
        }
    }

    /// Pixel bounding box `(x0, y0, x1, y1)` (exclusive end) of the annulus
    /// around `center`, clipped to a `width × height` frame. `None` when the
    /// box misses the frame entirely.
    pub fn pixel_bounds(
        &self,
        center: DVec2,
        width: usize,
        height: usize,
    ) -> Option<(usize, usize, usize, usize)> {
        let extent = self.outer().extent();
        let x0 = (center.x - extent).floor().max(0.0);
        let y0 = (center.y - extent).floor().max(0.0);
        let x1 = ((center.x + extent).ceil() + 1.0).min(width as f64);
        let y1 = ((center.y + extent).ceil() + 1.0).min(height as f64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
    }
}
