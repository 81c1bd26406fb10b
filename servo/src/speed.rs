use std::time::Duration;

use crate::envelope::ServoEnvelope;
use crate::error::{Result, ServoError};

/// What a caller asks for when moving the servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedRequest {
	/// Percentage of the servo speed range, in [0, 100].
	Percent(f64),
	/// `steps` minimum increments per write, waiting `percent_waiting` percent of the
	/// configured sleep interval between writes. Used to measure raw timing curves.
	Waiting { percent_waiting: f64, steps: u32 },
}

/// Duty cycle distance covered by a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSize {
	/// A multiple of the duty cycle change corresponding to one degree.
	Increments(u32),
	/// The whole duty cycle span divided into this many writes.
	Divisions(u32),
}

impl StepSize {
	pub fn count(&self) -> u32 {
		match *self {
			StepSize::Increments(count) | StepSize::Divisions(count) => count,
		}
	}

	/// Always strictly positive, `count` being at least 1.
	pub fn duty_increment(&self, envelope: &ServoEnvelope) -> f64 {
		match *self {
			StepSize::Increments(count) => count as f64 * envelope.min_increment(),
			StepSize::Divisions(count) => envelope.duty_span() / count as f64,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedRange {
	pub min_deg_s: f64,
	pub max_deg_s: f64,
}

impl SpeedRange {
	pub fn speed(&self, percent: f64) -> f64 {
		self.min_deg_s + percent * (self.max_deg_s - self.min_deg_s) / 100.
	}
}

/// Interval in which the sleep between two writes is interpolated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepBounds {
	pub min: Duration,
	pub max: Duration,
}

impl SleepBounds {
	pub fn new(min: Duration, max: Duration) -> Result<Self> {
		if min > max {
			return Err(ServoError::InvalidCalibration(format!(
				"minimum sleep ({:?}) is greater than maximum sleep ({:?})",
				min, max
			)));
		}

		// The slowest sleep is `max + min`.
		if max.checked_add(min).is_none() {
			return Err(ServoError::InvalidCalibration(format!(
				"sleep bounds ({:?}, {:?}) overflow",
				min, max
			)));
		}

		Ok(Self { min, max })
	}

	/// Sleep decreases from `max + min` at 0% down to `2 * min` at 100%, it never goes below
	/// `min`.
	pub fn interpolate(&self, percent: f64) -> Duration {
		let min = self.min.as_secs_f64();
		let max = self.max.as_secs_f64();

		let seconds = max - (max - min) * clamp_percent(percent) / 100. + min;

		// Rounding may push `max + min` just past the largest duration.
		Duration::try_from_secs_f64(seconds).unwrap_or_else(|_| self.max.saturating_add(self.min))
	}
}

impl Default for SleepBounds {
	fn default() -> Self {
		Self {
			min: Duration::from_micros(100),
			max: Duration::from_millis(5),
		}
	}
}

/// Hyperbolic fit of the measured waiting time, in milliseconds, against the rotation speed:
/// `waiting_time = a / (speed - b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperbolicFit {
	pub a: f64,
	pub b: f64,
}

impl HyperbolicFit {
	pub fn delay(&self, speed: f64) -> Result<Duration> {
		let seconds = self.a / (speed - self.b) / 1000.;

		Duration::try_from_secs_f64(seconds).map_err(|_| {
			ServoError::InvalidCalibration(format!(
				"fit (a: {}, b: {}) gives no valid delay at {}°/s",
				self.a, self.b, speed
			))
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSegment {
	pub min_speed: f64,
	pub max_speed: f64,
	pub fit: HyperbolicFit,
	pub steps: u32,
}

impl CalibrationSegment {
	pub fn contains(&self, speed: f64) -> bool {
		self.min_speed <= speed && speed <= self.max_speed
	}

	fn validate(&self) -> Result<()> {
		let error = |reason: String| {
			Err(ServoError::InvalidCalibration(format!(
				"segment [{}, {}]°/s with {} steps: {}",
				self.min_speed, self.max_speed, self.steps, reason
			)))
		};

		if !(self.min_speed.is_finite() && self.max_speed.is_finite()) {
			return error(String::from("speeds must be finite"));
		}

		if self.min_speed > self.max_speed {
			return error(String::from("minimum speed is greater than maximum speed"));
		}

		if self.steps == 0 {
			return error(String::from("step count must be at least 1"));
		}

		// The fit must give a finite positive delay over the whole segment.
		if !(self.fit.a.is_finite() && self.fit.a > 0.) || !(self.fit.b < self.min_speed) {
			return error(format!("fit (a: {}, b: {}) is not positive over the segment", self.fit.a, self.fit.b));
		}

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedProfile {
	Linear { speed: SpeedRange },
	Table { speed: SpeedRange, segments: Vec<CalibrationSegment> },
}

impl SpeedProfile {
	pub fn speed_range(&self) -> SpeedRange {
		match self {
			SpeedProfile::Linear { speed } | SpeedProfile::Table { speed, .. } => *speed,
		}
	}
}

/// Outcome of a speed resolution: how far to move per write, and how long to wait after each
/// write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
	pub step: StepSize,
	pub delay: Duration,
	/// Targeted rotation speed, unknown for raw `Waiting` requests.
	pub speed_deg_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedCalibrationModel {
	profile: SpeedProfile,
	sleep: SleepBounds,
}

impl SpeedCalibrationModel {
	pub fn new(profile: SpeedProfile, sleep: SleepBounds) -> Result<Self> {
		let speed = profile.speed_range();

		if !(speed.min_deg_s.is_finite() && speed.max_deg_s.is_finite()) || speed.min_deg_s > speed.max_deg_s {
			return Err(ServoError::InvalidCalibration(format!(
				"invalid speed range [{}, {}]°/s",
				speed.min_deg_s, speed.max_deg_s
			)));
		}

		if let SpeedProfile::Table { segments, .. } = &profile {
			for segment in segments {
				segment.validate()?;
			}
		}

		Ok(Self { profile, sleep })
	}

	pub fn linear(speed: SpeedRange, sleep: SleepBounds) -> Result<Self> {
		Self::new(SpeedProfile::Linear { speed }, sleep)
	}

	pub fn table(speed: SpeedRange, segments: Vec<CalibrationSegment>, sleep: SleepBounds) -> Result<Self> {
		Self::new(SpeedProfile::Table { speed, segments }, sleep)
	}

	pub fn profile(&self) -> &SpeedProfile {
		&self.profile
	}

	pub fn sleep_bounds(&self) -> SleepBounds {
		self.sleep
	}

	pub fn resolve(&self, request: SpeedRequest) -> Result<Resolution> {
		let resolution = match request {
			SpeedRequest::Percent(percent) => {
				let percent = clamp_percent(percent);

				match &self.profile {
					SpeedProfile::Linear { speed } => Resolution {
						step: StepSize::Increments(1),
						delay: self.sleep.interpolate(percent),
						speed_deg_s: Some(speed.speed(percent)),
					},
					SpeedProfile::Table { speed, segments } => {
						Self::lookup(segments, speed.speed(percent))?
					}
				}
			}
			SpeedRequest::Waiting { percent_waiting, steps } => {
				if steps == 0 {
					return Err(ServoError::InvalidStep(steps));
				}

				Resolution {
					step: StepSize::Increments(steps),
					delay: self.sleep.interpolate(percent_waiting),
					speed_deg_s: None,
				}
			}
		};

		debug!("Resolved {:?} to {:?}", request, resolution);

		Ok(resolution)
	}

	/// First segment containing `speed` wins.
	///
	/// `segments` may come straight from the caller rather than from a validated model, so a
	/// segment without steps is still rejected here.
	pub fn lookup(segments: &[CalibrationSegment], speed: f64) -> Result<Resolution> {
		let segment = segments
			.iter()
			.find(|segment| segment.contains(speed))
			.ok_or(ServoError::NoCalibrationMatch { speed })?;

		if segment.steps == 0 {
			return Err(ServoError::InvalidStep(segment.steps));
		}

		Ok(Resolution {
			step: StepSize::Divisions(segment.steps),
			delay: segment.fit.delay(speed)?,
			speed_deg_s: Some(speed),
		})
	}
}

fn clamp_percent(percent: f64) -> f64 {
	if percent.is_nan() {
		0.
	} else {
		percent.max(0.).min(100.)
	}
}
