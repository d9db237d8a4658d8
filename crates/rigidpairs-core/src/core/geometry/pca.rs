use nalgebra::{Matrix3, Point3, Vector3};

/// Principal axes of a point cloud, ordered by decreasing variance.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalComponents {
    pub centroid: Point3<f64>,
    /// Unit-length axes; `axes[0]` carries the largest variance.
    pub axes: [Vector3<f64>; 3],
    pub variances: [f64; 3],
}

impl PrincipalComponents {
    /// Coordinates of `point` in the principal frame (relative to the centroid).
    #[inline]
    pub fn to_principal_frame(&self, point: &Point3<f64>) -> Vector3<f64> {
        let d = point - self.centroid;
        Vector3::new(self.axes[0].dot(&d), self.axes[1].dot(&d), self.axes[2].dot(&d))
    }
}

/// Computes the principal components of `points` through an eigen-decomposition
/// of the centered covariance matrix.
///
/// Returns `None` for an empty input. A single point, or a set of coincident
/// points, yields the canonical axes with zero variance.
pub fn principal_components(points: &[Point3<f64>]) -> Option<PrincipalComponents> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = Point3::from(
        points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / n,
    );

    let covariance = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = covariance.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let axes = order.map(|i| {
        let column: Vector3<f64> = eigen.eigenvectors.column(i).into_owned();
        column.try_normalize(f64::EPSILON).unwrap_or_else(|| match i {
            0 => Vector3::x(),
            1 => Vector3::y(),
            _ => Vector3::z(),
        })
    });
    let variances = order.map(|i| eigen.eigenvalues[i].max(0.0));

    Some(PrincipalComponents {
        centroid,
        axes,
        variances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_components() {
        assert!(principal_components(&[]).is_none());
    }

    #[test]
    fn dominant_axis_follows_the_line_of_points() {
        let direction = Vector3::new(1.0, 2.0, -1.0).normalize();
        let points: Vec<_> = (0..20)
            .map(|i| Point3::from(direction * i as f64))
            .collect();
        let pca = principal_components(&points).unwrap();
        assert!(pca.axes[0].dot(&direction).abs() > 1.0 - 1e-9);
        assert!(pca.variances[0] > 1.0);
        assert!(pca.variances[1].abs() < 1e-9);
        assert!(pca.variances[2].abs() < 1e-9);
    }

    #[test]
    fn axes_are_orthonormal_and_sorted() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
            Point3::new(10.0, 3.0, 0.0),
            Point3::new(5.0, 1.5, 1.0),
            Point3::new(5.0, 1.5, -1.0),
        ];
        let pca = principal_components(&points).unwrap();
        for i in 0..3 {
            assert!((pca.axes[i].norm() - 1.0).abs() < 1e-9);
            for j in (i + 1)..3 {
                assert!(pca.axes[i].dot(&pca.axes[j]).abs() < 1e-9);
            }
        }
        assert!(pca.variances[0] >= pca.variances[1]);
        assert!(pca.variances[1] >= pca.variances[2]);
        assert!(pca.axes[0].x.abs() > 0.99);
    }

    #[test]
    fn principal_frame_is_centered_on_the_centroid() {
        let points = vec![Point3::new(1.0, 1.0, 1.0), Point3::new(3.0, 1.0, 1.0)];
        let pca = principal_components(&points).unwrap();
        assert_eq!(pca.centroid, Point3::new(2.0, 1.0, 1.0));
        let local = pca.to_principal_frame(&Point3::new(2.0, 1.0, 1.0));
        assert!(local.norm() < 1e-12);
        let far = pca.to_principal_frame(&Point3::new(3.0, 1.0, 1.0));
        assert!((far[0].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coincident_points_have_zero_variance() {
        let points = vec![Point3::new(4.0, -2.0, 7.0); 12];
        let pca = principal_components(&points).unwrap();
        assert!(pca.variances.iter().all(|&v| v == 0.0));
    }
}
