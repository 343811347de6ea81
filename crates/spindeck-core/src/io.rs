//! I/O task: input polling and motor control
//!
//! A fixed-period loop (10ms by default) that polls the physical inputs,
//! fans the snapshot out to the audio and UI input queues (non-blocking;
//! a stalled consumer loses snapshots rather than stalling this task) and
//! runs one PID update per platter motor.
//!
//! The motors only run while their deck is playing: the PID drives the
//! measured platter speed toward the target derived from the speed pot,
//! negated when the deck is reversed, and the controller state is cleared
//! whenever the deck stops so stale integral wind-up cannot kick the
//! platter on the next play.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CoreConfig;
use crate::dsp::Pid;
use crate::engine::{flag, DeckAtomics};
use crate::hal::{AnalogInput, InputSnapshot, InputSource, MotorSink};
use crate::types::NUM_DECKS;

/// Per-deck motor control state
struct MotorControl {
    pid: Pid,
    running: bool,
}

/// The input polling and motor control task
pub struct IoTask {
    input: Box<dyn InputSource>,
    motors: Box<dyn MotorSink>,

    audio_inputs: rtrb::Producer<InputSnapshot>,
    ui_inputs: rtrb::Producer<InputSnapshot>,
    atomics: [Arc<DeckAtomics>; NUM_DECKS],

    controls: [MotorControl; NUM_DECKS],
    period: Duration,
    speed_range: f32,
    nominal_rps: f32,
    steps_per_rev: f32,
}

impl IoTask {
    pub fn new(
        input: Box<dyn InputSource>,
        motors: Box<dyn MotorSink>,
        audio_inputs: rtrb::Producer<InputSnapshot>,
        ui_inputs: rtrb::Producer<InputSnapshot>,
        atomics: [Arc<DeckAtomics>; NUM_DECKS],
        config: &CoreConfig,
    ) -> Self {
        let pid = &config.motor_pid;
        let make_control = || MotorControl {
            pid: Pid::new(pid.kp, pid.ki, pid.kd, pid.iclamp),
            running: false,
        };

        Self {
            input,
            motors,
            audio_inputs,
            ui_inputs,
            atomics,
            controls: [make_control(), make_control()],
            period: Duration::from_millis(config.io_period_ms),
            speed_range: config.speed_range,
            nominal_rps: config.nominal_rps(),
            steps_per_rev: config.steps_per_rev as f32,
        }
    }

    /// Run until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("I/O task running");

        let mut next = Instant::now() + self.period;

        while !shutdown.load(Ordering::Relaxed) {
            self.poll_tick();

            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
            next += self.period;
        }

        // Leave the platters coasting.
        for deck in 0..NUM_DECKS {
            self.motors.stop(deck, false);
        }
    }

    /// One poll + motor update cycle
    ///
    /// Public so tests can drive the task without a thread.
    pub fn poll_tick(&mut self) {
        let mut snapshot = InputSnapshot::default();
        self.input.poll(&mut snapshot);

        // Fan out non-blocking; both consumers drain faster than the
        // poll period, so a full queue means the consumer is gone.
        let _ = self.audio_inputs.push(snapshot);
        let _ = self.ui_inputs.push(snapshot);

        for deck in 0..NUM_DECKS {
            self.update_motor(deck, &snapshot);
        }
    }

    fn update_motor(&mut self, deck: usize, snapshot: &InputSnapshot) {
        let flags = self.atomics[deck].flags();
        let control = &mut self.controls[deck];

        if flags & flag::PLAYING == 0 {
            if control.running {
                control.running = false;
                control.pid.reset();
                self.motors.stop(deck, false);
            }
            return;
        }
        control.running = true;

        if snapshot.dt <= 0.0 {
            return;
        }

        let speed_input = match deck {
            0 => AnalogInput::LeftSpeed,
            _ => AnalogInput::RightSpeed,
        };

        // The speed pot sweeps the target around nominal speed; reverse
        // flips the target so the PID spins the platter backwards.
        let rate = (snapshot.analog(speed_input) as f32 / 127.5 - 1.0) * self.speed_range + 1.0;
        let mut target_rps = rate * self.nominal_rps;
        if flags & flag::REVERSE != 0 {
            target_rps = -target_rps;
        }

        let measured_rps =
            snapshot.deck_encoders[deck] as f32 / snapshot.dt / self.steps_per_rev;

        let drive = control.pid.update(target_rps - measured_rps, snapshot.dt);
        self.motors.drive(deck, drive.clamp(-1.0, 1.0));
    }
}
