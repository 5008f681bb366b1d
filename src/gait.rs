// Gait state machine: owns the body pose, the six world-frame foot targets
// and the stepping phases, and turns one gamepad sample per tick into a
// batched set of joint commands.
//
// All timing is counted in ticks of the fixed-rate control loop, never in
// wall-clock time, so every transition is deterministic and testable.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::bus::{BusError, ServoBus};
use crate::config::{INIT_INTERVAL_TICKS, MINIMUM_VOLTAGE, VOLTAGE_CHECK_TICKS};
use crate::legs::{Leg, LegError};
use crate::math3d::{Matrix44, Rotation, Vector3};
use crate::messages::GamepadState;

// Maximum body translation per tick (mm) at full stick deflection.
const TRANSLATION_SPEED: f64 = 2.0;

// Maximum body rotation per tick (degrees) at full stick deflection.
const ROTATION_SPEED: f64 = 0.5;

// Per-tick body raise/lower step for the dpad (mm).
const BODY_LIFT_STEP: f64 = 2.0;

// Height feet are pushed down to when standing, relative to the body
// origin (mm; y is up).
const FOOT_DOWN: f64 = -80.0;

// Base height for a lifted foot. Raised by up to 50mm while the lift
// trigger is held, which helps stepping over obstacles.
const BASE_FOOT_UP: f64 = -40.0;

// Height of the ideal home foot position used when (re)placing feet.
const HOME_FOOT_Y: f64 = -43.0;

// A leg steps once its foot target drifts this far (mm) from its home
// position. Hysteresis so the body can lean without constant stepping.
const MIN_STEP_DISTANCE: f64 = 20.0;

// Phase durations in ticks.
const STEP_UP_TICKS: u32 = 2;
const STEP_OVER_TICKS: u32 = 2;
const STEP_DOWN_TICKS: u32 = 3;

// Per-tick foot travel during stand-up / sit-down (mm).
const STAND_RATE: f64 = 2.0;

// The order in which legs are activated at startup: alternating sides so
// the inrush load stays balanced on the power supply.
const INIT_ORDER: [usize; 6] = [0, 3, 1, 4, 2, 5];

// Moving-speed limit applied to freshly activated servos.
const INIT_MOVING_SPEED: u16 = 512;

/// The gait phase. Every state has a defined successor; `Halt` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaitState {
    Init,
    StandUp,
    Stand,
    StepUp,
    StepOver,
    StepDown,
    SitDown,
    Halt,
}

impl fmt::Display for GaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GaitState::Init => "init",
            GaitState::StandUp => "stand_up",
            GaitState::Stand => "stand",
            GaitState::StepUp => "step_up",
            GaitState::StepOver => "step_over",
            GaitState::StepDown => "step_down",
            GaitState::SitDown => "sit_down",
            GaitState::Halt => "halt",
        };
        f.write_str(name)
    }
}

/// What a tick produced: either keep looping, or the controller reached
/// `Halt` and the process should exit with the given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Finished { exit_code: i32 },
}

/// Fatal controller failures. Per-leg recoverable conditions (unreachable
/// targets, single move-command transport errors) are logged and skipped
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid leg group size {0} (must be 1, 2 or 3)")]
    Config(usize),

    #[error("servo bus failure: {0}")]
    Bus(#[from] BusError),

    #[error("leg precondition violated: {0}")]
    Precondition(LegError),
}

/// The hexapod controller: the single owner of the bus connection, the six
/// legs, the body pose and all gait state. Everything is mutated through
/// `tick`, so multiple instances can coexist in tests.
#[derive(Debug)]
pub struct Hexapod<B: ServoBus> {
    bus: B,

    // World coordinates of the centre of the body, plus its heading.
    position: Vector3,
    rotation: f64,

    state: GaitState,
    state_ticks: u32,
    exit_code: i32,

    // Asynchronous shutdown request (signal handler); polled at the top of
    // every tick. The only cross-thread interaction in the system.
    halt: Arc<AtomicBool>,

    step_radius: f64,
    legs: [Leg; 6],

    // Foot targets in the WORLD frame. Stored there rather than in the body
    // frame so planted feet stay put when the body moves; only the stepping
    // and stand/sit phases relocate them.
    feet: [Vector3; 6],

    // Where a currently stepping foot should land. Set when its group
    // lifts, consumed when the group swings.
    next_feet: [Option<Vector3>; 6],

    leg_sets: Vec<Vec<usize>>,
    set_index: usize,
    init_count: usize,
    ticks_to_voltage_check: u32,
}

impl<B: ServoBus> Hexapod<B> {
    /// Build a controller for the fixed six-leg chassis. `leg_set_size`
    /// picks the stepping group layout: 1 (one leg at a time), 2 (opposite
    /// pairs) or 3 (tripod). Configures status reporting on all servos, so
    /// the bus must already be open.
    pub fn new(
        mut bus: B,
        halt: Arc<AtomicBool>,
        leg_set_size: usize,
    ) -> Result<Self, ControllerError> {
        let leg_sets: Vec<Vec<usize>> = match leg_set_size {
            1 => (0..6).map(|i| vec![i]).collect(),
            2 => vec![vec![0, 3], vec![1, 4], vec![2, 5]],
            3 => vec![vec![0, 2, 4], vec![1, 3, 5]],
            other => return Err(ControllerError::Config(other)),
        };

        // Offsets from the centre of the top of the body to the coxa
        // pivots, and each leg's mounting heading.
        let legs = [
            Leg::new(10, "FL", Vector3::new(-51.1769, -19.0, 98.0), -120.0),
            Leg::new(20, "FR", Vector3::new(51.1769, -19.0, 98.0), -60.0),
            Leg::new(30, "MR", Vector3::new(66.0, -19.0, 0.0), 0.0),
            Leg::new(40, "BR", Vector3::new(51.1769, -19.0, -98.0), 60.0),
            Leg::new(50, "BL", Vector3::new(-51.1769, -19.0, -98.0), 120.0),
            Leg::new(60, "ML", Vector3::new(-66.0, -19.0, 0.0), 180.0),
        ];

        // Quiet the bus during the control loop: servos answer reads only.
        for leg in &legs {
            for servo in leg.servos() {
                servo.set_status_report_level(&mut bus, 1)?;
            }
        }

        let mut hexapod = Self {
            bus,
            position: Vector3::ZERO,
            rotation: 0.0,
            state: GaitState::Init,
            state_ticks: 0,
            exit_code: 0,
            halt,
            step_radius: 220.0,
            legs,
            feet: [Vector3::ZERO; 6],
            next_feet: [None; 6],
            leg_sets,
            set_index: 0,
            init_count: 0,
            ticks_to_voltage_check: 0,
        };

        for i in 0..6 {
            hexapod.feet[i] = hexapod.home_foot_position(&hexapod.legs[i]);
        }

        Ok(hexapod)
    }

    pub fn state(&self) -> GaitState {
        self.state
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    fn set_state(&mut self, state: GaitState) {
        info!(from = %self.state, to = %state, "gait transition");
        self.state = state;
        self.state_ticks = 0;
    }

    /// Transform mapping body coordinates into the world frame.
    fn world(&self) -> Matrix44 {
        Matrix44::from_parts(self.position, Rotation::heading(self.rotation))
    }

    /// Transform mapping world coordinates into the body frame.
    fn local(&self) -> Matrix44 {
        self.world().inverse()
    }

    /// The world-frame home position for a leg's foot: at the step radius,
    /// at the leg's angular offset from the current body heading.
    fn home_foot_position(&self, leg: &Leg) -> Vector3 {
        let r = (self.rotation + leg.heading()).to_radians();
        self.position.add(Vector3::new(
            r.cos() * self.step_radius,
            HOME_FOOT_Y,
            -r.sin() * self.step_radius,
        ))
    }

    /// The height a lifted foot is raised to, modulated by the lift trigger.
    fn step_up_height(&self, input: &GamepadState) -> f64 {
        BASE_FOOT_UP + (input.lift_trigger as f64 / 255.0) * 50.0
    }

    /// Accumulate operator intent into the body pose. Translation is
    /// re-expressed through the current world transform every tick, so the
    /// sticks always mean "relative to where the robot faces now".
    fn update_body_pose(&mut self, input: &GamepadState) {
        if input.right_x != 0 {
            self.rotation += (input.right_x as f64 / 127.0) * ROTATION_SPEED;
        }

        let mut step = Vector3::ZERO;
        if input.left_x != 0 {
            step.x = (input.left_x as f64 / 127.0) * TRANSLATION_SPEED;
        }
        if input.left_y != 0 {
            // Negate after widening: i8::MIN has no i8 negation.
            step.z = (-(input.left_y as f64) / 127.0) * TRANSLATION_SPEED;
        }
        if input.dpad_up {
            step.y += BODY_LIFT_STEP;
        }
        if input.dpad_down {
            step.y -= BODY_LIFT_STEP;
        }

        if !step.is_zero() {
            self.position = self.world().transform(step);
        }
    }

    /// Sample the battery voltage through one actuator's telemetry. A read
    /// failure is fatal: without power telemetry the robot cannot run
    /// safely, so the legs are de-energized best-effort and the error is
    /// surfaced. A low reading forces `Halt` directly, skipping the
    /// sit-down choreography to protect the battery.
    fn check_voltage(&mut self) -> Result<(), ControllerError> {
        match self.legs[0].coxa().read_voltage(&mut self.bus) {
            Ok(voltage) => {
                info!(voltage = format!("{voltage:.2}"), "voltage sample");
                if voltage < MINIMUM_VOLTAGE {
                    warn!(voltage, threshold = MINIMUM_VOLTAGE, "low voltage, halting");
                    self.set_state(GaitState::Halt);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "voltage telemetry failed, de-energizing");
                let _ = self.relax();
                Err(e.into())
            }
        }
    }

    /// De-energize every actuator and restore verbose status reporting.
    fn relax(&mut self) -> Result<(), BusError> {
        for leg in &self.legs {
            for servo in leg.servos() {
                servo.set_status_report_level(&mut self.bus, 2)?;
                servo.set_torque_enabled(&mut self.bus, false)?;
                servo.set_led(&mut self.bus, false)?;
            }
        }
        Ok(())
    }

    /// Run one control tick: poll the halt flag, fold the gamepad sample
    /// into the body pose, advance the gait phase, and dispatch one batched
    /// set of joint commands.
    pub fn tick(&mut self, input: &GamepadState) -> Result<TickOutcome, ControllerError> {
        self.state_ticks += 1;

        self.update_body_pose(input);

        if self.ticks_to_voltage_check == 0 {
            self.ticks_to_voltage_check = VOLTAGE_CHECK_TICKS;
            self.check_voltage()?;
        } else {
            self.ticks_to_voltage_check -= 1;
        }

        // An explicit stop (or the async halt flag) routes through SitDown
        // so the body settles before torque drops.
        if input.start || self.halt.load(Ordering::Relaxed) {
            if input.select {
                self.exit_code = 1;
            }
            if self.state != GaitState::SitDown && self.state != GaitState::Halt {
                self.set_state(GaitState::SitDown);
            }
        }

        // Terminal state: de-energize and stop the loop. Reached here in
        // the same tick when the voltage cutoff fired above.
        if self.state == GaitState::Halt {
            self.relax()?;
            info!(exit_code = self.exit_code, "halted");
            return Ok(TickOutcome::Finished {
                exit_code: self.exit_code,
            });
        }

        match self.state {
            GaitState::Init => self.tick_init()?,

            GaitState::StandUp => {
                for foot in &mut self.feet {
                    foot.y -= STAND_RATE;
                }
                if self.feet[0].y <= FOOT_DOWN {
                    self.set_state(GaitState::Stand);
                }
            }

            GaitState::SitDown => {
                for foot in &mut self.feet {
                    foot.y += STAND_RATE;
                }
                if self.feet[0].y >= self.step_up_height(input) {
                    self.set_state(GaitState::Halt);
                }
            }

            GaitState::Stand => {
                if !input.brace {
                    let needs_move = (0..self.legs.len()).any(|i| {
                        let mut home = self.home_foot_position(&self.legs[i]);
                        home.y = self.feet[i].y;
                        self.feet[i].distance(home) > MIN_STEP_DISTANCE
                    });
                    if needs_move {
                        self.set_state(GaitState::StepUp);
                    }
                }
            }

            GaitState::StepUp => {
                // Targets are derived once at phase entry, so continuous
                // stick input doesn't make the phase chase a moving goal.
                if self.state_ticks == 1 {
                    let lift = self.step_up_height(input);
                    for &i in &self.leg_sets[self.set_index] {
                        self.feet[i].y = lift;
                    }
                }
                if self.state_ticks >= STEP_UP_TICKS {
                    for &i in &self.leg_sets[self.set_index] {
                        self.next_feet[i] = Some(self.home_foot_position(&self.legs[i]));
                    }
                    self.set_state(GaitState::StepOver);
                }
            }

            GaitState::StepOver => {
                if self.state_ticks == 1 {
                    for &i in &self.leg_sets[self.set_index] {
                        if let Some(next) = self.next_feet[i].take() {
                            self.feet[i].x = next.x;
                            self.feet[i].z = next.z;
                        }
                    }
                }
                if self.state_ticks >= STEP_OVER_TICKS {
                    self.set_state(GaitState::StepDown);
                }
            }

            GaitState::StepDown => {
                if self.state_ticks == 1 {
                    for &i in &self.leg_sets[self.set_index] {
                        self.feet[i].y = FOOT_DOWN;
                    }
                }
                if self.state_ticks >= STEP_DOWN_TICKS {
                    self.set_index += 1;
                    if self.set_index >= self.leg_sets.len() {
                        self.set_index = 0;
                        self.set_state(GaitState::Stand);
                    } else {
                        self.set_state(GaitState::StepUp);
                    }
                }
            }

            GaitState::Halt => unreachable!("handled above"),
        }

        self.dispatch()?;
        Ok(TickOutcome::Running)
    }

    /// Startup: activate legs one at a time at a fixed interval, then wait
    /// one extra interval so the last leg has started moving before the
    /// body pushes up.
    fn tick_init(&mut self) -> Result<(), ControllerError> {
        if self.init_count < self.legs.len() {
            if self.state_ticks == self.init_count as u32 * INIT_INTERVAL_TICKS + 1 {
                let leg = &mut self.legs[INIT_ORDER[self.init_count]];
                for servo in leg.servos() {
                    servo.set_torque_enabled(&mut self.bus, true)?;
                    servo.set_moving_speed(&mut self.bus, INIT_MOVING_SPEED)?;
                }
                leg.mark_initialized();
                info!(leg = leg.name(), "leg activated");
                self.init_count += 1;
            }
        } else if self.state_ticks >= self.legs.len() as u32 * INIT_INTERVAL_TICKS {
            self.set_state(GaitState::StandUp);
        }
        Ok(())
    }

    /// Queue this tick's joint moves for every ready leg and commit them as
    /// one batch, so a stepping group moves in physical synchrony. A leg
    /// whose target is unreachable, or whose move fails on the wire, keeps
    /// its last pose while the rest of the batch still commits.
    ///
    /// The batch sequence is spelled out here instead of going through
    /// `ServoBus::run_batched` because the `NotReady` abort is a `LegError`,
    /// not a bus error, and must skip the commit. An aborted batch leaves
    /// the already-queued writes staged on the servos; they fire with the
    /// next tick's commit, which by then has restaged every joint's target,
    /// so nothing stale reaches an actuator.
    fn dispatch(&mut self) -> Result<(), ControllerError> {
        let body_to_local = self.local();
        let Self {
            bus, legs, feet, ..
        } = self;

        bus.begin_batch()?;
        for (leg, foot) in legs.iter().zip(feet.iter()) {
            if !leg.initialized() {
                continue;
            }
            match leg.set_goal(bus, *foot, &body_to_local) {
                Ok(()) => {}
                Err(LegError::Unreachable { .. }) => {
                    warn!(leg = leg.name(), "target unreachable, keeping last pose");
                }
                Err(LegError::Bus(e)) => {
                    warn!(leg = leg.name(), error = %e, "move dispatch failed");
                }
                Err(e @ LegError::NotReady { .. }) => {
                    // Programming defect: the readiness filter above should
                    // make this impossible. Fail loudly without committing.
                    bus.end_batch()?;
                    return Err(ControllerError::Precondition(e));
                }
            }
        }
        bus.end_batch()?;
        bus.commit()?;
        Ok(())
    }
}
