use nalgebra::{Isometry3, Point3, Vector3};

/// An immutable sphere described by its center and radius.
///
/// Spheres are plain values: every operation that changes the geometry returns
/// a new sphere. The radius is never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    center: Point3<f64>,
    radius: f64,
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Point3::origin(), 0.0)
    }
}

impl Sphere {
    /// Creates a sphere from a center and a non-negative radius.
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        debug_assert!(radius >= 0.0, "sphere radius must be non-negative");
        Self { center, radius }
    }

    #[inline]
    pub fn center(&self) -> &Point3<f64> {
        &self.center
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns `true` if `point` lies inside or on the surface of the sphere.
    #[inline]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }

    /// Returns `true` if the sphere fully contains `other`.
    #[inline]
    pub fn contains_sphere(&self, other: &Sphere) -> bool {
        (other.center - self.center).norm() + other.radius <= self.radius
    }

    /// Returns `true` if the two spheres touch or intersect.
    #[inline]
    pub fn overlaps(&self, other: &Sphere) -> bool {
        let sum = self.radius + other.radius;
        (other.center - self.center).norm_squared() <= sum * sum
    }

    /// Distance between the two sphere surfaces.
    ///
    /// Negative when the spheres interpenetrate. Two spheres are "within `d`" of
    /// each other when this value is at most `d`.
    #[inline]
    pub fn distance(&self, other: &Sphere) -> f64 {
        (other.center - self.center).norm() - self.radius - other.radius
    }

    /// Returns the sphere mapped into another frame by `frame`.
    #[inline]
    pub fn transformed(&self, frame: &Isometry3<f64>) -> Sphere {
        Sphere::new(frame * self.center, self.radius)
    }

    /// Returns a copy with the radius multiplied by `factor`.
    #[inline]
    pub fn expanded(&self, factor: f64) -> Sphere {
        Sphere::new(self.center, self.radius * factor)
    }

    /// Returns a copy with `amount` added to the radius.
    #[inline]
    pub fn loosened(&self, amount: f64) -> Sphere {
        Sphere::new(self.center, (self.radius + amount).max(0.0))
    }

    /// A sphere guaranteed to contain every input sphere.
    ///
    /// The center is the centroid of the input centers and the radius the largest
    /// `|centroid - c_i| + r_i`. This is not the minimal bounding sphere; for
    /// clustered but offset inputs it can be noticeably loose, which only costs
    /// pruning efficiency. An empty input yields a zero sphere at the origin.
    pub fn enclosing<'a, I>(spheres: I) -> Sphere
    where
        I: IntoIterator<Item = &'a Sphere>,
        I::IntoIter: Clone,
    {
        let iter = spheres.into_iter();
        let (sum, count) = iter
            .clone()
            .fold((Vector3::zeros(), 0usize), |(sum, count), s| {
                (sum + s.center.coords, count + 1)
            });
        if count == 0 {
            return Sphere::default();
        }
        let centroid = Point3::from(sum / count as f64);
        let radius = iter
            .map(|s| (s.center - centroid).norm() + s.radius)
            .fold(0.0, f64::max);
        Sphere::new(centroid, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn contains_includes_the_surface() {
        let s = Sphere::new(Point3::new(1.0, 0.0, 0.0), 2.0);
        assert!(s.contains(&Point3::new(3.0, 0.0, 0.0)));
        assert!(s.contains(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!s.contains(&Point3::new(3.1, 0.0, 0.0)));
    }

    #[test]
    fn overlaps_is_symmetric_and_touching_counts() {
        let a = Sphere::new(Point3::origin(), 1.0);
        let b = Sphere::new(Point3::new(3.0, 0.0, 0.0), 2.0);
        let c = Sphere::new(Point3::new(3.5, 0.0, 0.0), 2.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn distance_is_surface_to_surface() {
        let a = Sphere::new(Point3::origin(), 1.0);
        let b = Sphere::new(Point3::new(5.0, 0.0, 0.0), 1.5);
        assert!((a.distance(&b) - 2.5).abs() < 1e-12);
        let overlapping = Sphere::new(Point3::new(1.0, 0.0, 0.0), 1.0);
        assert!(a.distance(&overlapping) < 0.0);
    }

    #[test]
    fn enclosing_contains_every_input() {
        let spheres = vec![
            Sphere::new(Point3::new(0.0, 0.0, 0.0), 0.5),
            Sphere::new(Point3::new(4.0, 1.0, -2.0), 1.0),
            Sphere::new(Point3::new(-3.0, 2.0, 1.0), 0.0),
            Sphere::new(Point3::new(1.0, -5.0, 0.5), 2.0),
        ];
        let e = Sphere::enclosing(&spheres);
        for s in &spheres {
            assert!(e.contains_sphere(s));
        }
        let expected_center = Point3::new(0.5, -0.5, -0.125);
        assert!((e.center() - expected_center).norm() < 1e-12);
    }

    #[test]
    fn enclosing_of_coincident_points_has_zero_radius() {
        let spheres = vec![Sphere::new(Point3::new(2.0, 2.0, 2.0), 0.0); 5];
        let e = Sphere::enclosing(&spheres);
        assert_eq!(e.radius(), 0.0);
        assert_eq!(*e.center(), Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn enclosing_of_nothing_is_a_zero_sphere() {
        let e = Sphere::enclosing(&Vec::<Sphere>::new());
        assert_eq!(e, Sphere::default());
    }

    #[test]
    fn transformed_moves_center_only() {
        let s = Sphere::new(Point3::new(1.0, 0.0, 0.0), 0.7);
        let frame = Isometry3::from_parts(
            Translation3::new(0.0, 10.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let t = s.transformed(&frame);
        assert!((t.center() - Point3::new(0.0, 11.0, 0.0)).norm() < 1e-12);
        assert_eq!(t.radius(), 0.7);
    }

    #[test]
    fn expanded_and_loosened_grow_the_radius() {
        let s = Sphere::new(Point3::origin(), 2.0);
        assert_eq!(s.expanded(1.5).radius(), 3.0);
        assert_eq!(s.loosened(0.25).radius(), 2.25);
        assert_eq!(s.loosened(-5.0).radius(), 0.0);
    }
}
