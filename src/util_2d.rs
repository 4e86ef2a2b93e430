use cgmath::InnerSpace;

pub type Vector2 = cgmath::Vector2<f64>;

const AXIS_EPS: f64 = 1e-12;

pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// z component of the 3D cross product of two 2D vectors.
pub fn cross(a: Vector2, b: Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Perpendicular vector, rotated 90° counter-clockwise.
pub fn perp(a: Vector2) -> Vector2 {
    Vector2::new(-a.y, a.x)
}

pub fn centroid(points: &[Vector2]) -> Option<Vector2> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vector2::new(0.0, 0.0), |acc, p| acc + *p);
    Some(sum / points.len() as f64)
}

/// Signed area of a triangle, positive for counter-clockwise winding.
pub fn triangle_area(a: Vector2, b: Vector2, c: Vector2) -> f64 {
    cross(b - a, c - a) * 0.5
}

/// Dominant direction of a 2D point cloud.
///
/// Computes the eigenvector of the largest eigenvalue of the covariance
/// matrix. The sign is fixed so that the dominant component is positive,
/// which keeps the result stable for mirrored inputs. Returns `None` for fewer
/// than two points or when every point coincides.
pub fn principal_axis(points: &[Vector2]) -> Option<Vector2> {
    if points.len() < 2 {
        return None;
    }
    let center = centroid(points)?;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let d = *p - center;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }
    let n = points.len() as f64;
    let (a, b, c) = (sxx / n, sxy / n, syy / n);
    if !(a + c).is_finite() || a + c < AXIS_EPS {
        return None;
    }

    let half_diff = (a - c) * 0.5;
    let lambda = (a + c) * 0.5 + (half_diff * half_diff + b * b).sqrt();

    // Either row of (C - λI) gives the eigenvector; pick the better conditioned one.
    let v1 = Vector2::new(lambda - c, b);
    let v2 = Vector2::new(b, lambda - a);
    let v = if v1.magnitude2() >= v2.magnitude2() { v1 } else { v2 };
    let axis = if v.magnitude2() < AXIS_EPS {
        // Isotropic spread: any direction works.
        if a >= c { Vector2::new(1.0, 0.0) } else { Vector2::new(0.0, 1.0) }
    } else {
        v.normalize()
    };

    let flip = if axis.x.abs() >= axis.y.abs() { axis.x < 0.0 } else { axis.y < 0.0 };
    Some(if flip { -axis } else { axis })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_principal_axis_horizontal_spread() {
        let pts = [
            Vector2::new(0.0, 0.5),
            Vector2::new(1.0, 0.5),
            Vector2::new(0.5, 0.52),
            Vector2::new(0.5, 0.48),
        ];
        let axis = principal_axis(&pts).unwrap();
        assert!(axis.x > 0.99);
        assert!(axis.y.abs() < 0.1);
    }

    #[test]
    fn test_principal_axis_diagonal_sign_is_stable() {
        let fwd = [Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0)];
        let rev = [Vector2::new(1.0, 1.0), Vector2::new(0.0, 0.0)];
        let a = principal_axis(&fwd).unwrap();
        let b = principal_axis(&rev).unwrap();
        assert!(close(a.x, b.x) && close(a.y, b.y));
        assert!(close(a.x, std::f64::consts::FRAC_1_SQRT_2));
    }

    #[test]
    fn test_principal_axis_degenerate() {
        assert!(principal_axis(&[Vector2::new(0.3, 0.3)]).is_none());
        assert!(principal_axis(&[Vector2::new(0.3, 0.3), Vector2::new(0.3, 0.3)]).is_none());
    }

    #[test]
    fn test_triangle_area_sign() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(1.0, 0.0);
        let c = Vector2::new(0.0, 1.0);
        assert!(close(triangle_area(a, b, c), 0.5));
        assert!(close(triangle_area(a, c, b), -0.5));
    }
}
