// Analytic inverse kinematics for one leg: coxa yaw plus a three-joint
// pitch chain (femur, tibia, tarsus).
//
// The coxa is the only joint that rotates about the vertical axis, so its
// angle falls straight out of the target's azimuth. That leaves the pitch
// joints in a single vertical plane, where every angle comes from SSS
// triangle solutions (law of cosines).

use crate::math3d::{Matrix44, Rotation, Vector3};

/// Offset from the coxa pivot to the femur pivot, in the coxa's frame.
pub const COXA_OFFSET: Vector3 = Vector3 {
    x: 39.0,
    y: -12.0,
    z: 0.0,
};

/// Link lengths in mm. Chassis constants for this build, not derived.
pub const FEMUR_LENGTH: f64 = 100.0;
pub const TIBIA_LENGTH: f64 = 85.0;

/// The physical tarsus segment is 76.5mm, but it is mounted at an angle so
/// that the foot tip sits 64mm directly below the ankle in the calibrated
/// stance. The planar solve works with that vertical drop.
pub const TARSUS_DROP: f64 = 64.0;

/// Arbitrary plumb length used to measure the target's angle from vertical
/// with the same SSS machinery as the joint triangles.
const VERTICAL_REF: f64 = 50.0;

/// The four joint angles of one leg, in degrees, before any per-build
/// mounting sign corrections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles {
    pub coxa: f64,
    pub femur: f64,
    pub tibia: f64,
    pub tarsus: f64,
}

impl JointAngles {
    pub fn is_finite(&self) -> bool {
        self.coxa.is_finite()
            && self.femur.is_finite()
            && self.tibia.is_finite()
            && self.tarsus.is_finite()
    }
}

/// The target cannot be reached by the chain (an SSS solve went out of the
/// acos domain).
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("target ({x:.1}, {y:.1}, {z:.1}) is outside the reachable workspace")]
pub struct IkError {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A node in a kinematic chain: an optional parent, a single-axis rotation
/// and an offset in the rotated frame. Chains are rebuilt from chassis
/// constants on every solve; segments are never persistent state.
pub struct Segment<'a> {
    parent: Option<&'a Segment<'a>>,
    rotation: Rotation,
    offset: Vector3,
}

impl<'a> Segment<'a> {
    pub fn root(offset: Vector3) -> Segment<'static> {
        Segment {
            parent: None,
            rotation: Rotation::none(),
            offset,
        }
    }

    pub fn new(parent: &'a Segment<'a>, rotation: Rotation, offset: Vector3) -> Segment<'a> {
        Segment {
            parent: Some(parent),
            rotation,
            offset,
        }
    }

    fn world_matrix(&self) -> Matrix44 {
        let local = Matrix44::rotation(self.rotation).compose(&Matrix44::translation(self.offset));
        match self.parent {
            Some(parent) => parent.world_matrix().compose(&local),
            None => local,
        }
    }

    /// Position of this segment's near end (the parent's far end).
    pub fn start(&self) -> Vector3 {
        match self.parent {
            Some(parent) => parent.end(),
            None => Vector3::ZERO,
        }
    }

    /// Position of this segment's far end, by walking the parent links.
    pub fn end(&self) -> Vector3 {
        self.world_matrix().transform(Vector3::ZERO)
    }
}

/// SSS triangle solution: the interior angle between sides `b` and `c`
/// (opposite side `a`), in degrees. NaN when no such triangle exists.
fn sss(a: f64, b: f64, c: f64) -> f64 {
    (((b * b) + (c * c) - (a * a)) / (2.0 * b * c)).acos().to_degrees()
}

/// Solve the four joint angles placing the foot tip at `target`, expressed
/// in the leg's own frame (origin at the coxa pivot, heading along +x).
pub fn solve(target: Vector3) -> Result<JointAngles, IkError> {
    // The coxa is the sole yaw joint, so it is solved by projecting the
    // target onto the horizontal plane. This decouples the rest of the
    // chain into a 2D problem.
    let coxa = (-target.z).atan2(target.x).to_degrees();

    // Femur pivot position once the coxa has yawed toward the target.
    let root = Segment::root(Vector3::ZERO);
    let coxa_segment = Segment::new(&root, Rotation::heading(coxa), COXA_OFFSET);
    let r = coxa_segment.end();

    let v = target;
    // The ankle sits a fixed drop above the foot tip.
    let vv = v.add(Vector3::new(0.0, TARSUS_DROP, 0.0));
    // Plumb point below the femur pivot, for measuring angles from vertical.
    let t = r.add(Vector3::new(0.0, -VERTICAL_REF, 0.0));

    let a = FEMUR_LENGTH;
    let b = TIBIA_LENGTH;
    let c = TARSUS_DROP;
    let d = r.distance(vv);
    let e = r.distance(v);
    let f = VERTICAL_REF;
    let g = t.distance(v);

    let aa = sss(b, a, d); // at femur pivot, femur vs pivot->ankle
    let bb = sss(c, d, e); // at femur pivot, pivot->ankle vs pivot->foot
    let cc = sss(g, e, f); // at femur pivot, pivot->foot vs vertical
    let dd = sss(a, d, b); // at ankle, tibia vs ankle->pivot
    let ee = sss(e, c, d); // at ankle, ankle->pivot vs vertical
    let hh = 180.0 - aa - dd; // knee interior angle

    let angles = JointAngles {
        coxa,
        femur: (aa + bb + cc) - 90.0,
        tibia: 180.0 - hh,
        tarsus: 180.0 - (dd + ee),
    };

    if !angles.is_finite() {
        return Err(IkError {
            x: target.x,
            y: target.y,
            z: target.z,
        });
    }

    Ok(angles)
}

/// Foot-tip position in the leg frame for a set of joint angles. The exact
/// inverse of `solve` over the reachable workspace; the control loop never
/// needs it, but it pins the solver down in tests.
pub fn forward_kinematics(angles: &JointAngles) -> Vector3 {
    let root = Segment::root(Vector3::ZERO);
    let coxa = Segment::new(&root, Rotation::heading(angles.coxa), COXA_OFFSET);
    let femur = Segment::new(
        &coxa,
        Rotation::bank(angles.femur),
        Vector3::new(FEMUR_LENGTH, 0.0, 0.0),
    );
    let tibia = Segment::new(
        &femur,
        Rotation::bank(-angles.tibia),
        Vector3::new(TIBIA_LENGTH, 0.0, 0.0),
    );
    let foot = Segment::new(
        &tibia,
        Rotation::bank(-angles.tarsus),
        Vector3::new(TARSUS_DROP, 0.0, 0.0),
    );
    foot.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coxa_follows_target_azimuth() {
        let straight = solve(Vector3::new(180.0, -70.0, 0.0)).unwrap();
        assert!(straight.coxa.abs() < 1e-9);

        let yawed = solve(Vector3::new(130.0, -70.0, -130.0)).unwrap();
        assert!((yawed.coxa - 45.0).abs() < 1e-9);
    }

    #[test]
    fn round_trips_through_forward_kinematics() {
        // Representative points across the working envelope: near/far,
        // low/high, both sides of the leg's heading.
        let targets = [
            Vector3::new(154.0, -24.0, 0.0), // home stance
            Vector3::new(120.0, -100.0, -60.0),
            Vector3::new(200.0, -60.0, 60.0),
            Vector3::new(160.0, -10.0, 0.0),
            Vector3::new(100.0, -80.0, 100.0),
            Vector3::new(180.0, 5.0, -40.0), // lifted above the coxa plane
        ];

        for target in targets {
            let angles = solve(target).unwrap_or_else(|e| panic!("{e}"));
            let reached = forward_kinematics(&angles);
            assert!(
                reached.distance(target) < 0.5,
                "target {:?} reconstructed as {:?}",
                target,
                reached
            );
        }
    }

    #[test]
    fn rejects_targets_beyond_the_leg_span() {
        // Farther out than coxa + femur + tibia + drop combined.
        let err = solve(Vector3::new(400.0, -300.0, 0.0));
        assert!(err.is_err(), "expected an unreachable error");
    }

    #[test]
    fn rejects_without_emitting_nan() {
        if let Err(e) = solve(Vector3::new(500.0, 0.0, 0.0)) {
            assert!(e.x.is_finite() && e.y.is_finite() && e.z.is_finite());
        } else {
            panic!("expected an unreachable error");
        }
    }

    #[test]
    fn segment_chain_walks_parent_links() {
        let root = Segment::root(Vector3::new(10.0, 0.0, 0.0));
        let child = Segment::new(&root, Rotation::heading(90.0), Vector3::new(5.0, 0.0, 0.0));
        assert!(child.start().distance(Vector3::new(10.0, 0.0, 0.0)) < 1e-9);
        assert!(child.end().distance(Vector3::new(10.0, 0.0, -5.0)) < 1e-9);
    }

    #[test]
    fn knee_stays_above_the_ankle_in_stance() {
        // Sanity on sign conventions: in a normal stance the femur pitches
        // up from horizontal and the knee bends back down.
        let angles = solve(Vector3::new(154.0, -24.0, 0.0)).unwrap();
        assert!(angles.femur > 0.0);
        assert!(angles.tibia > 0.0);
        assert!(angles.tarsus > 0.0);
    }
}
