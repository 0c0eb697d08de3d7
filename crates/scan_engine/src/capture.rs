//! Capture scheduler
//!
//! Turns simulated time into angular capture windows. Owns the revolution
//! cursor and the readback error cooldown; everything here is tick-thread
//! state.

use contracts::LidarConfig;
use nalgebra::Isometry3;

/// Accumulated-angle comparison slack; repeated `dt * 360 * f` sums drift
const ANGLE_EPSILON_DEG: f64 = 1e-9;

/// Window bookkeeping carried from submission through decode
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMeta {
    /// Window sequence number since the last reset
    pub index: u64,
    /// First point-buffer slot covered by the window
    pub start_slot: usize,
    /// Slots covered
    pub slot_count: usize,
    /// Simulation time of the capture (seconds)
    pub sim_time: f64,
    /// Sensor pose in world at capture time
    pub sensor_pose: Isometry3<f32>,
    /// Window reaches the end of the revolution
    pub closes_revolution: bool,
    /// Tick the readback was submitted on
    pub submitted_tick: u64,
}

/// One window produced by [`CaptureScheduler::next_window`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPlan {
    pub index: u64,
    pub start_slot: usize,
    /// Zero when the configuration cannot fill a window
    pub slot_count: usize,
    /// How far before the end of the tick this window completed (seconds)
    pub time_offset_s: f64,
    pub closes_revolution: bool,
}

/// Rotation state machine
#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    window_angle_deg: f64,
    slot_angle_deg: f64,
    slots_per_window: usize,
    measurements_per_revolution: usize,
    degrees_per_second: f64,
    cooldown_duration_s: f64,
    pending_deg: f64,
    cursor: usize,
    cooldown_s: f64,
    next_index: u64,
}

impl CaptureScheduler {
    pub fn new(config: &LidarConfig) -> Self {
        Self {
            window_angle_deg: config.window_angle_deg as f64,
            slot_angle_deg: config.slot_angle_deg(),
            slots_per_window: config.slots_per_window(),
            measurements_per_revolution: config.measurements_per_revolution as usize,
            degrees_per_second: 360.0 * config.rotation_frequency_hz.max(0.0) as f64,
            cooldown_duration_s: config.readback_error_cooldown_s.max(0.0) as f64,
            pending_deg: 0.0,
            cursor: 0,
            cooldown_s: 0.0,
            next_index: 0,
        }
    }

    /// Add the rotation covered by `dt` seconds
    pub fn accumulate(&mut self, dt: f64) {
        if dt > 0.0 {
            self.pending_deg += dt * self.degrees_per_second;
        }
    }

    /// Pop the next due window, advancing the cursor
    ///
    /// The cursor moves whether or not the caller ends up capturing the
    /// window, so skipped windows leave their slots untouched.
    pub fn next_window(&mut self) -> Option<WindowPlan> {
        if self.window_angle_deg <= 0.0
            || self.pending_deg + ANGLE_EPSILON_DEG < self.window_angle_deg
        {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;

        let mpr = self.measurements_per_revolution;
        if self.slots_per_window == 0 || mpr == 0 {
            self.pending_deg = (self.pending_deg - self.window_angle_deg).max(0.0);
            return Some(WindowPlan {
                index,
                start_slot: self.cursor,
                slot_count: 0,
                time_offset_s: self.offset_s(),
                closes_revolution: false,
            });
        }

        let start_slot = self.cursor;
        let slot_count = self.slots_per_window.min(mpr - start_slot);
        let closes_revolution = start_slot + slot_count >= mpr;

        // consume exactly the angle the slots cover so the cursor tracks rotation
        let consumed = slot_count as f64 * self.slot_angle_deg;
        self.pending_deg = (self.pending_deg - consumed).max(0.0);
        self.cursor = (start_slot + slot_count) % mpr;

        Some(WindowPlan {
            index,
            start_slot,
            slot_count,
            time_offset_s: self.offset_s(),
            closes_revolution,
        })
    }

    fn offset_s(&self) -> f64 {
        if self.degrees_per_second > 0.0 {
            self.pending_deg / self.degrees_per_second
        } else {
            0.0
        }
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_s > 0.0
    }

    /// Suppress submissions for the configured cooldown
    pub fn arm_cooldown(&mut self) {
        self.cooldown_s = self.cooldown_duration_s;
    }

    /// Run the cooldown down by `dt`
    pub fn decay_cooldown(&mut self, dt: f64) {
        if self.cooldown_s > 0.0 {
            self.cooldown_s = (self.cooldown_s - dt.max(0.0)).max(0.0);
        }
    }

    pub fn cooldown_remaining_s(&self) -> f64 {
        self.cooldown_s
    }

    /// Next slot to be filled
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Accumulated rotation not yet turned into windows (degrees)
    pub fn pending_deg(&self) -> f64 {
        self.pending_deg
    }

    pub fn slots_per_window(&self) -> usize {
        self.slots_per_window
    }
}
