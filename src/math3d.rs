// Homogeneous-coordinate math for the world / body / leg frame stack.
//
// Every rotation in this robot is about a single principal axis (the body
// yaws, the joints pitch), so orientations are a (axis, degrees) pair
// rather than a full Euler triple. Matrices use the column-vector
// convention: `m.transform(p)` maps a point in the child frame into the
// parent frame, and `a.compose(&b)` maps child-of-b into parent-of-a.

/// A 3D point or displacement in millimetres. Plain value type, copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, k: f64) -> Vector3 {
        Vector3::new(self.x * k, self.y * k, self.z * k)
    }

    /// Linear blend: `self` at t=0, `other` at t=1.
    pub fn blend(self, other: Vector3, t: f64) -> Vector3 {
        self.scale(1.0 - t).add(other.scale(t))
    }

    pub fn distance(self, other: Vector3) -> f64 {
        self.sub(other).length()
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// The three principal rotation axes. Heading is yaw about Y (the vertical
/// axis), bank is about Z, attitude is about X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Heading,
    Bank,
    Attitude,
}

/// A rotation about exactly one principal axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub axis: Axis,
    pub degrees: f64,
}

impl Rotation {
    pub fn new(axis: Axis, degrees: f64) -> Self {
        Self { axis, degrees }
    }

    pub fn heading(degrees: f64) -> Self {
        Self::new(Axis::Heading, degrees)
    }

    pub fn bank(degrees: f64) -> Self {
        Self::new(Axis::Bank, degrees)
    }

    pub fn none() -> Self {
        Self::new(Axis::Heading, 0.0)
    }
}

/// A 4x4 rigid homogeneous transform (rotation + translation, never
/// scale or shear). Row-major storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix44 {
    m: [[f64; 4]; 4],
}

impl Matrix44 {
    pub fn identity() -> Self {
        Self::from_parts(Vector3::ZERO, Rotation::none())
    }

    /// Build the matrix mapping a child frame into its parent: rotate by
    /// `rotation`, then translate by `translation` (parent coordinates).
    pub fn from_parts(translation: Vector3, rotation: Rotation) -> Self {
        let r = rotation.degrees.to_radians();
        let (s, c) = r.sin_cos();
        let rot = match rotation.axis {
            // Yaw: +x maps to (cos, 0, -sin)
            Axis::Heading => [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
            // Pitch in the x/y plane: +x maps to (cos, sin, 0)
            Axis::Bank => [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            Axis::Attitude => [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]],
        };

        let mut m = [[0.0; 4]; 4];
        for (i, row) in rot.iter().enumerate() {
            m[i][..3].copy_from_slice(row);
        }
        m[0][3] = translation.x;
        m[1][3] = translation.y;
        m[2][3] = translation.z;
        m[3][3] = 1.0;
        Self { m }
    }

    pub fn translation(translation: Vector3) -> Self {
        Self::from_parts(translation, Rotation::none())
    }

    pub fn rotation(rotation: Rotation) -> Self {
        Self::from_parts(Vector3::ZERO, rotation)
    }

    /// Matrix product `self * other`: the transform mapping child-of-other
    /// into parent-of-self.
    pub fn compose(&self, other: &Matrix44) -> Matrix44 {
        let mut m = [[0.0; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += self.m[i][k] * other.m[k][j];
                }
                m[i][j] = acc;
            }
        }
        Matrix44 { m }
    }

    /// Rigid inverse: transpose the rotation block and counter-rotate the
    /// translation. Exact for rotation+translation matrices, which is all
    /// this system ever builds; no general elimination needed.
    pub fn inverse(&self) -> Matrix44 {
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = self.m[j][i];
            }
        }
        for i in 0..3 {
            m[i][3] = -(m[i][0] * self.m[0][3] + m[i][1] * self.m[1][3] + m[i][2] * self.m[2][3]);
        }
        m[3][3] = 1.0;
        Matrix44 { m }
    }

    /// Map a point from the child frame into the parent frame.
    pub fn transform(&self, p: Vector3) -> Vector3 {
        Vector3::new(
            self.m[0][0] * p.x + self.m[0][1] * p.y + self.m[0][2] * p.z + self.m[0][3],
            self.m[1][0] * p.x + self.m[1][1] * p.y + self.m[1][2] * p.z + self.m[1][3],
            self.m[2][0] * p.x + self.m[2][1] * p.y + self.m[2][2] * p.z + self.m[2][3],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: Vector3, b: Vector3) {
        assert!(
            a.distance(b) < 1e-6,
            "expected {:?} to be close to {:?}",
            a,
            b
        );
    }

    #[test]
    fn heading_rotates_x_toward_negative_z() {
        let m = Matrix44::rotation(Rotation::heading(90.0));
        assert_close(m.transform(Vector3::new(1.0, 0.0, 0.0)), Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn bank_rotates_x_toward_y() {
        let m = Matrix44::rotation(Rotation::bank(90.0));
        assert_close(m.transform(Vector3::new(1.0, 0.0, 0.0)), Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn transform_applies_rotation_then_translation() {
        let m = Matrix44::from_parts(Vector3::new(10.0, 0.0, 0.0), Rotation::heading(90.0));
        assert_close(m.transform(Vector3::new(1.0, 0.0, 0.0)), Vector3::new(10.0, 0.0, -1.0));
    }

    #[test]
    fn compose_matches_sequential_transforms() {
        let a = Matrix44::from_parts(Vector3::new(5.0, -2.0, 1.0), Rotation::heading(30.0));
        let b = Matrix44::from_parts(Vector3::new(-1.0, 4.0, 2.0), Rotation::bank(-45.0));
        let p = Vector3::new(3.0, 7.0, -2.0);
        assert_close(a.compose(&b).transform(p), a.transform(b.transform(p)));
    }

    #[test]
    fn inverse_round_trips_points() {
        let m = Matrix44::from_parts(Vector3::new(12.0, -3.0, 8.0), Rotation::heading(72.5));
        let p = Vector3::new(-40.0, 19.0, 66.0);
        assert_close(m.inverse().transform(m.transform(p)), p);
    }

    #[test]
    fn inverse_laws_hold_for_rigid_transforms() {
        let cases = [
            Matrix44::identity(),
            Matrix44::from_parts(Vector3::new(1.0, 2.0, 3.0), Rotation::heading(123.0)),
            Matrix44::from_parts(Vector3::new(-66.0, 0.0, 98.0), Rotation::bank(-17.0)),
            Matrix44::from_parts(
                Vector3::new(0.5, -0.5, 9.0),
                Rotation::new(Axis::Attitude, 89.0),
            ),
        ];

        for m in cases {
            let inv = m.inverse();

            // M * M^-1 ~= I
            let id = m.compose(&inv);
            let expect = Matrix44::identity();
            for i in 0..4 {
                for j in 0..4 {
                    assert!((id.m[i][j] - expect.m[i][j]).abs() < EPS);
                }
            }

            // (M^-1)^-1 ~= M
            let back = inv.inverse();
            for i in 0..4 {
                for j in 0..4 {
                    assert!((back.m[i][j] - m.m[i][j]).abs() < EPS);
                }
            }
        }
    }

    #[test]
    fn blend_interpolates_endpoints() {
        let a = Vector3::new(0.0, 10.0, -4.0);
        let b = Vector3::new(8.0, -10.0, 4.0);
        assert_close(a.blend(b, 0.0), a);
        assert_close(a.blend(b, 1.0), b);
        assert_close(a.blend(b, 0.5), Vector3::new(4.0, 0.0, 0.0));
    }
}
