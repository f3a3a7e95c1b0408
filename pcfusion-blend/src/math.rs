//! Small numeric helpers: covariance accumulation and symmetric 3x3 eigen-decomposition.

use glam::{Mat3, Vec3};

const MAX_SWEEPS: usize = 24;

/// Running sums for the covariance of a weighted point set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CovarianceAccumulator {
    weight: f32,
    sum: Vec3,
    // xx, xy, xz, yy, yz, zz
    outer: [f32; 6],
}

impl CovarianceAccumulator {
    pub fn add(&mut self, p: Vec3, w: f32) {
        self.weight += w;
        self.sum += p * w;
        self.outer[0] += w * p.x * p.x;
        self.outer[1] += w * p.x * p.y;
        self.outer[2] += w * p.x * p.z;
        self.outer[3] += w * p.y * p.y;
        self.outer[4] += w * p.y * p.z;
        self.outer[5] += w * p.z * p.z;
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn centroid(&self) -> Option<Vec3> {
        (self.weight > 0.0).then(|| self.sum / self.weight)
    }

    /// Weighted covariance matrix, `None` if nothing was added.
    pub fn covariance(&self) -> Option<Mat3> {
        let c = self.centroid()?;
        let w = self.weight;
        let [xx, xy, xz, yy, yz, zz] = self.outer;
        let cxx = xx / w - c.x * c.x;
        let cxy = xy / w - c.x * c.y;
        let cxz = xz / w - c.x * c.z;
        let cyy = yy / w - c.y * c.y;
        let cyz = yz / w - c.y * c.z;
        let czz = zz / w - c.z * c.z;
        Some(Mat3::from_cols(
            Vec3::new(cxx, cxy, cxz),
            Vec3::new(cxy, cyy, cyz),
            Vec3::new(cxz, cyz, czz),
        ))
    }
}

/// Eigenvalues and unit eigenvectors of a symmetric matrix (cyclic Jacobi).
///
/// Returned in ascending eigenvalue order; eigenvector `i` belongs to eigenvalue `i`.
pub fn symmetric_eigen(m: Mat3) -> ([f32; 3], [Vec3; 3]) {
    // a[row][col]; symmetric, so column-major input reads the same
    let mut a = m.to_cols_array_2d();
    let mut v = [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _ in 0..MAX_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        let scale = a[0][0] * a[0][0] + a[1][1] * a[1][1] + a[2][2] * a[2][2];
        if off <= 1e-14 * scale.max(f32::MIN_POSITIVE) {
            break;
        }
        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq.abs() < f32::MIN_POSITIVE {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for row in a.iter_mut() {
                let (akp, akq) = (row[p], row[q]);
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[i][i].total_cmp(&a[j][j]));
    let values = order.map(|i| a[i][i]);
    let vectors = order.map(|i| Vec3::new(v[0][i], v[1][i], v[2][i]).normalize_or_zero());
    (values, vectors)
}

/// Direction of least variance: the normal of the best-fit plane.
pub fn plane_normal(covariance: Mat3) -> Option<Vec3> {
    let (values, vectors) = symmetric_eigen(covariance);
    // a degenerate neighborhood (collinear or a single point) has two near-zero eigenvalues
    if values[1] <= values[2] * 1e-6 || !values.iter().all(|v| v.is_finite()) {
        return None;
    }
    let n = vectors[0];
    (n.length_squared() > 0.5).then_some(n)
}
