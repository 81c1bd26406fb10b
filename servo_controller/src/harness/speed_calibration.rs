use servo::{PwmPort, ServoController, SpeedRequest};
use std::io::Write;
use std::time::{Duration, Instant};

use crate::harness::{home, rotation_speed, CalibrationLog, CalibrationRow};
use crate::input_controllers::{wait_until_asserted, DigitalInput};

pub const HEADER: &'static str = "speed_percent,measured_deg_per_s,step,waiting_time_s";

/// Measures the actual rotation speed for each speed percentage, the end of the travel being
/// detected by a photo interrupter.
#[derive(Debug, Clone)]
pub struct SpeedCalibration {
	pub percents: Vec<f64>,
	pub settle: Duration,
	pub poll: Duration,
	pub timeout: Duration,
}

impl Default for SpeedCalibration {
	fn default() -> Self {
		Self {
			percents: (0..=10).map(|i| i as f64 * 10.).collect(),
			settle: Duration::from_secs(1),
			poll: Duration::from_millis(1),
			timeout: Duration::from_secs(10),
		}
	}
}

impl SpeedCalibration {
	pub fn run<P: PwmPort, I: DigitalInput + ?Sized, W: Write>(
		&self,
		servo: &mut ServoController<P>,
		sensor: &mut I,
		log: &mut CalibrationLog<W>,
	) -> anyhow::Result<()> {
		let cancel = servo.cancel_token();
		let end = servo.envelope().half_angle();

		for &percent in &self.percents {
			home(servo, self.settle)?;

			let start = Instant::now();
			let motion = servo.go_to_position(end, SpeedRequest::Percent(percent))?;
			wait_until_asserted(sensor, self.poll, self.timeout, &cancel)?;
			let elapsed = start.elapsed();

			let row = CalibrationRow {
				percent,
				rotation_speed_deg_s: rotation_speed((motion.to_angle - motion.from_angle).abs(), elapsed),
				steps: motion.step.count(),
				waiting_time: motion.delay,
			};

			match motion.speed_deg_s {
				Some(expected) => info!(
					"{}%: {:.1}°/s measured, {:.1}°/s expected",
					percent, row.rotation_speed_deg_s, expected
				),
				None => info!("{}%: {:.1}°/s measured", percent, row.rotation_speed_deg_s),
			}

			log.append(&row)?;
		}

		Ok(())
	}
}
