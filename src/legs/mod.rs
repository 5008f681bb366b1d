// Leg entities: per-leg chassis geometry, actuator handles and readiness.
//
// Provides:
// - `Leg`: one kinematic chain with its four servo handles
// - `ik`: the analytic solver mapping a leg-frame point to joint angles

pub mod ik;

use tracing::debug;

use crate::bus::{BusError, Servo, ServoBus};
use crate::math3d::{Matrix44, Rotation, Vector3};

pub use ik::{IkError, JointAngles};

/// Per-leg failure modes, so the gait machine can tell "not ready" from
/// "can't reach" from "bus fault" and decide what to do.
#[derive(Debug, thiserror::Error)]
pub enum LegError {
    #[error("leg {leg} is not initialized")]
    NotReady { leg: &'static str },

    #[error("leg {leg}: {source}")]
    Unreachable {
        leg: &'static str,
        source: IkError,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// One leg: body-relative mounting geometry (immutable after construction),
/// four actuator handles (owned exclusively by this leg) and a readiness
/// flag flipped once by the gait machine's startup phase.
#[derive(Debug)]
pub struct Leg {
    origin: Vector3,
    heading: f64,
    name: &'static str,
    coxa: Servo,
    femur: Servo,
    tibia: Servo,
    tarsus: Servo,
    initialized: bool,
}

impl Leg {
    /// `base_id` is the leg's bus ID block; the four joints occupy
    /// `base_id + 1 ..= base_id + 4` from body to foot tip.
    pub fn new(base_id: u8, name: &'static str, origin: Vector3, heading: f64) -> Self {
        Self {
            origin,
            heading,
            name,
            coxa: Servo::new(base_id + 1),
            femur: Servo::new(base_id + 2),
            tibia: Servo::new(base_id + 3),
            tarsus: Servo::new(base_id + 4),
            initialized: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn origin(&self) -> Vector3 {
        self.origin
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn coxa(&self) -> Servo {
        self.coxa
    }

    /// All four actuator handles, body to foot tip.
    pub fn servos(&self) -> [Servo; 4] {
        [self.coxa, self.femur, self.tibia, self.tarsus]
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Marks the leg ready to receive motion commands. Called exactly once,
    /// by the startup phase, after torque has been enabled.
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// The transform mapping a point in this leg's frame into the body frame.
    pub fn matrix(&self) -> Matrix44 {
        Matrix44::from_parts(self.origin, Rotation::heading(self.heading))
    }

    /// Command the foot tip to `world_point`. The point is projected through
    /// the body's world->body transform and this leg's body->leg transform,
    /// solved, and dispatched as four queued move commands. On any error the
    /// servos keep their last commanded pose.
    pub fn set_goal<B: ServoBus>(
        &self,
        bus: &mut B,
        world_point: Vector3,
        body_to_local: &Matrix44,
    ) -> Result<(), LegError> {
        if !self.initialized {
            return Err(LegError::NotReady { leg: self.name });
        }

        let local = self
            .matrix()
            .inverse()
            .transform(body_to_local.transform(world_point));

        let angles = ik::solve(local).map_err(|source| LegError::Unreachable {
            leg: self.name,
            source,
        })?;

        debug!(
            leg = self.name,
            coxa = angles.coxa,
            femur = angles.femur,
            tibia = angles.tibia,
            tarsus = angles.tarsus,
            "dispatching joint angles"
        );

        self.coxa.move_to(bus, angles.coxa)?;
        // The femur servo is mounted mirrored on this chassis; the sign flip
        // is a per-build calibration value, not a kinematic property.
        self.femur.move_to(bus, -angles.femur)?;
        self.tibia.move_to(bus, angles.tibia)?;
        self.tarsus.move_to(bus, angles.tarsus)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;

    fn test_leg() -> Leg {
        Leg::new(30, "MR", Vector3::new(66.0, -19.0, 0.0), 0.0)
    }

    #[test]
    fn uninitialized_leg_refuses_motion() {
        let mut bus = MockBus::new();
        let leg = test_leg();
        let err = leg
            .set_goal(&mut bus, Vector3::new(220.0, -43.0, 0.0), &Matrix44::identity())
            .unwrap_err();
        assert!(matches!(err, LegError::NotReady { leg: "MR" }));
        assert!(bus.ops.is_empty(), "no bus traffic for an uninitialized leg");
    }

    #[test]
    fn goal_dispatches_four_moves_with_femur_sign_flipped() {
        let mut bus = MockBus::new();
        let mut leg = test_leg();
        leg.mark_initialized();

        let world = Vector3::new(220.0, -43.0, 0.0);
        leg.set_goal(&mut bus, world, &Matrix44::identity()).unwrap();

        let moves = bus.moves();
        assert_eq!(moves.len(), 4);
        assert_eq!(
            moves.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![31, 32, 33, 34]
        );

        // Same point in the leg's own frame: origin subtracted, heading zero.
        let local = Vector3::new(154.0, -24.0, 0.0);
        let angles = ik::solve(local).unwrap();
        assert!((moves[0].1 - angles.coxa).abs() < 1e-9);
        assert!((moves[1].1 + angles.femur).abs() < 1e-9, "femur sign flip");
        assert!((moves[2].1 - angles.tibia).abs() < 1e-9);
        assert!((moves[3].1 - angles.tarsus).abs() < 1e-9);
    }

    #[test]
    fn unreachable_goal_leaves_servos_untouched() {
        let mut bus = MockBus::new();
        let mut leg = test_leg();
        leg.mark_initialized();

        let err = leg
            .set_goal(&mut bus, Vector3::new(900.0, -43.0, 0.0), &Matrix44::identity())
            .unwrap_err();
        assert!(matches!(err, LegError::Unreachable { .. }));
        assert!(bus.moves().is_empty());
    }

    #[test]
    fn heading_is_unrotated_out_of_the_goal() {
        let mut bus = MockBus::new();
        let mut leg = Leg::new(10, "FL", Vector3::new(-51.1769, -19.0, 98.0), -120.0);
        leg.mark_initialized();

        // A point straight out along the leg's heading at stance height
        // should solve with a near-zero coxa angle.
        let azimuth = (-120.0f64).to_radians();
        let world = Vector3::new(
            -51.1769 + 180.0 * azimuth.cos(),
            -43.0,
            98.0 - 180.0 * azimuth.sin(),
        );
        leg.set_goal(&mut bus, world, &Matrix44::identity()).unwrap();
        let moves = bus.moves();
        assert!(moves[0].1.abs() < 1e-6, "coxa angle was {}", moves[0].1);
    }
}
