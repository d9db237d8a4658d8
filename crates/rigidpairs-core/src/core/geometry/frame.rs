use super::sphere::Sphere;
use nalgebra::{Isometry3, Point3};

/// Angle (radians, in `[0, π]`) of the rotation taking `from` to `to`.
pub fn relative_rotation_angle(from: &Isometry3<f64>, to: &Isometry3<f64>) -> f64 {
    (to.rotation * from.rotation.inverse()).angle()
}

/// Upper bound on how far any point of `local` moves when its rigid body goes
/// from frame `from` to frame `to`.
///
/// For a local point `c + v` with `|v| <= r` the world displacement is
/// `(T(c) - T0(c)) + (R - R0) v`, and `|(R - R0) v| <= 2 sin(θ/2) |v|` with θ the
/// relative rotation angle.
pub fn displacement_bound(from: &Isometry3<f64>, to: &Isometry3<f64>, local: &Sphere) -> f64 {
    let center_shift = (to * local.center() - from * local.center()).norm();
    let theta = relative_rotation_angle(from, to);
    center_shift + 2.0 * (theta / 2.0).sin() * local.radius()
}

/// Maps a world-space point into the local frame of a rigid body.
#[inline]
pub fn to_local(frame: &Isometry3<f64>, world: &Point3<f64>) -> Point3<f64> {
    frame.inverse_transform_point(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};
    use std::f64::consts::PI;

    fn frame(t: [f64; 3], axis_angle: Option<(Vector3<f64>, f64)>) -> Isometry3<f64> {
        let rotation = match axis_angle {
            Some((axis, angle)) => {
                UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle)
            }
            None => UnitQuaternion::identity(),
        };
        Isometry3::from_parts(Translation3::new(t[0], t[1], t[2]), rotation)
    }

    #[test]
    fn pure_translation_bound_is_the_translation_length() {
        let a = frame([0.0, 0.0, 0.0], None);
        let b = frame([3.0, 4.0, 0.0], None);
        let s = Sphere::new(Point3::new(1.0, 1.0, 1.0), 10.0);
        assert!((displacement_bound(&a, &b, &s) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_bound_covers_every_point_of_the_sphere() {
        let a = frame([1.0, -2.0, 0.5], Some((Vector3::new(0.2, 1.0, 0.3), 0.4)));
        let b = frame([1.5, -2.0, 0.0], Some((Vector3::new(1.0, 0.0, 0.0), 1.3)));
        let s = Sphere::new(Point3::new(0.5, 0.5, -1.0), 3.0);
        let bound = displacement_bound(&a, &b, &s);
        for i in 0..50 {
            let t = i as f64 / 50.0 * 2.0 * PI;
            let dir = Vector3::new(t.cos(), t.sin() * 0.6, t.sin() * 0.8);
            let p = s.center() + dir * s.radius();
            let moved = (b * p - a * p).norm();
            assert!(moved <= bound + 1e-9, "moved {moved} exceeds bound {bound}");
        }
    }

    #[test]
    fn relative_angle_of_identical_frames_is_zero() {
        let a = frame([1.0, 2.0, 3.0], Some((Vector3::z(), 0.7)));
        assert!(relative_rotation_angle(&a, &a).abs() < 1e-12);
    }

    #[test]
    fn to_local_inverts_the_frame() {
        let f = frame([5.0, 0.0, 0.0], Some((Vector3::z(), PI / 2.0)));
        let local = Point3::new(1.0, 0.0, 0.0);
        let world = f * local;
        assert!((to_local(&f, &world) - local).norm() < 1e-12);
    }
}
