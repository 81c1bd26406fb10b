use servo::{PwmPort, ServoController, SpeedRequest};
use std::io;
use std::io::Write;
use std::thread;
use std::time::Duration;

pub mod speed_calibration;
pub mod timing_sweep;

/// One measured rotation over the full travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
	pub percent: f64,
	pub rotation_speed_deg_s: f64,
	pub steps: u32,
	pub waiting_time: Duration,
}

/// CSV output of the calibration harnesses. Every row is flushed as soon as it is measured so
/// that an interrupted run keeps its results.
pub struct CalibrationLog<W: Write> {
	writer: W,
	rows: usize,
}

impl<W: Write> CalibrationLog<W> {
	pub fn new(mut writer: W, header: &str) -> io::Result<Self> {
		writeln!(writer, "{}", header)?;
		writer.flush()?;

		Ok(Self { writer, rows: 0 })
	}

	pub fn append(&mut self, row: &CalibrationRow) -> io::Result<()> {
		writeln!(
			self.writer,
			"{},{:.3},{},{:.6}",
			row.percent,
			row.rotation_speed_deg_s,
			row.steps,
			row.waiting_time.as_secs_f64()
		)?;
		self.writer.flush()?;
		self.rows += 1;

		Ok(())
	}

	pub fn rows(&self) -> usize {
		self.rows
	}

	pub fn into_inner(self) -> W {
		self.writer
	}
}

/// Brings the servo to the lower end of its travel in a single write, then lets it settle.
pub fn home<P: PwmPort>(servo: &mut ServoController<P>, settle: Duration) -> servo::Result<()> {
	let envelope = *servo.envelope();
	let full_travel = (envelope.max_angle().ceil() as u32).max(1);

	servo.go_to_position(
		-envelope.half_angle(),
		SpeedRequest::Waiting {
			percent_waiting: 100.,
			steps: full_travel,
		},
	)?;

	thread::sleep(settle);

	Ok(())
}

fn rotation_speed(travel_deg: f64, elapsed: Duration) -> f64 {
	let elapsed_s = elapsed.as_secs_f64();

	if elapsed_s > 0. {
		travel_deg / elapsed_s
	} else {
		f64::INFINITY
	}
}
