use servo::{PwmPort, ServoController, SpeedRequest};
use std::io::Write;
use std::time::{Duration, Instant};

use crate::harness::{home, rotation_speed, CalibrationLog, CalibrationRow};

pub const HEADER: &'static str = "percent_waiting,rotation_speed_deg_s,steps,waiting_time_s";

/// Times full rotations for every step count up to `max_steps` and every waiting percentage,
/// to relate the motion parameters to the resulting speed.
#[derive(Debug, Clone)]
pub struct TimingSweep {
	pub max_steps: u32,
	pub percents: Vec<f64>,
	pub settle: Duration,
}

impl Default for TimingSweep {
	fn default() -> Self {
		Self {
			max_steps: 229,
			percents: (1..=20).map(|i| i as f64 * 5.).collect(),
			settle: Duration::from_secs(1),
		}
	}
}

impl TimingSweep {
	pub fn run<P: PwmPort, W: Write>(
		&self,
		servo: &mut ServoController<P>,
		log: &mut CalibrationLog<W>,
	) -> anyhow::Result<()> {
		let end = servo.envelope().half_angle();

		for steps in 1..=self.max_steps {
			for &percent_waiting in &self.percents {
				home(servo, self.settle)?;

				let start = Instant::now();
				let motion = servo.go_to_position(end, SpeedRequest::Waiting { percent_waiting, steps })?;
				let elapsed = start.elapsed();

				let row = CalibrationRow {
					percent: percent_waiting,
					rotation_speed_deg_s: rotation_speed((motion.to_angle - motion.from_angle).abs(), elapsed),
					steps,
					waiting_time: motion.delay,
				};

				info!(
					"{} steps, {}% waiting: {:.1}°/s in {} writes",
					steps, percent_waiting, row.rotation_speed_deg_s, motion.writes
				);

				log.append(&row)?;
			}
		}

		Ok(())
	}
}
