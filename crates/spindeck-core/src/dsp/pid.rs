//! PID controller for the platter motors

/// Textbook PID controller with a clamped integral term
#[derive(Debug, Clone)]
pub struct Pid {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric clamp applied to the integral accumulator
    pub iclamp: f32,

    accumulator: f32,
    last_error: f32,
}

impl Pid {
    pub fn new(kp: f32, ki: f32, kd: f32, iclamp: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            iclamp,
            accumulator: 0.0,
            last_error: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.last_error = 0.0;
    }

    /// Advance the controller by `dt` seconds and return the correction
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        debug_assert!(dt > 0.0);

        self.accumulator += error * dt;
        self.accumulator = self.accumulator.clamp(-self.iclamp, self.iclamp);

        let delta = (error - self.last_error) / dt;
        self.last_error = error;

        self.kp * error + self.ki * self.accumulator + self.kd * delta
    }
}
