use std::{thread, time::Duration};

use crate::cancel::CancelToken;
use crate::envelope::ServoEnvelope;
use crate::error::{Result, ServoError};
use crate::motion::{DutySteps, MotionPhase};
use crate::port::PwmPort;
use crate::speed::{SpeedCalibrationModel, SpeedRequest, StepSize};

/// Summary of a completed motion, used by calibration harnesses to relate the requested
/// parameters to the observed rotation speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
	pub from_angle: f64,
	pub to_angle: f64,
	pub step: StepSize,
	pub delay: Duration,
	pub writes: usize,
	pub speed_deg_s: Option<f64>,
}

/// Drives a single servo through its PWM port.
///
/// The controller owns the port: the output is stopped when the controller is dropped, and
/// whenever a motion is aborted.
pub struct ServoController<P: PwmPort> {
	port: P,
	envelope: ServoEnvelope,
	calibration: SpeedCalibrationModel,
	current_angle: f64,
	phase: MotionPhase,
	engaged: bool,
	cancel: CancelToken,
}

impl<P: PwmPort> ServoController<P> {
	/// Starts the output at the middle of the travel.
	pub fn new(port: P, envelope: ServoEnvelope, calibration: SpeedCalibrationModel) -> Result<Self> {
		Self::with_start_angle(port, envelope, calibration, 0.)
	}

	pub fn with_start_angle(
		mut port: P,
		envelope: ServoEnvelope,
		calibration: SpeedCalibrationModel,
		start_angle: f64,
	) -> Result<Self> {
		let start_angle = envelope.clamp_angle(start_angle);

		if let Err(e) = port.set_duty_cycle(envelope.angle_to_duty(start_angle)) {
			port.stop().unwrap_or_default();
			return Err(ServoError::HardwareWrite(e));
		}

		info!("Servo started at {:.1}° ({:.3}%)", start_angle, envelope.angle_to_duty(start_angle));

		Ok(Self {
			port,
			envelope,
			calibration,
			current_angle: start_angle,
			phase: MotionPhase::Idle,
			engaged: true,
			cancel: CancelToken::new(),
		})
	}

	pub fn current_angle(&self) -> f64 {
		self.current_angle
	}

	pub fn phase(&self) -> MotionPhase {
		self.phase
	}

	pub fn envelope(&self) -> &ServoEnvelope {
		&self.envelope
	}

	pub fn calibration(&self) -> &SpeedCalibrationModel {
		&self.calibration
	}

	/// Whether the PWM output is currently driven.
	pub fn is_engaged(&self) -> bool {
		self.engaged
	}

	/// Token aborting the current and following motions once cancelled.
	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	/// Shares an existing token, e.g. one already handed to an operator input thread.
	pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	/// Moves the servo to `angle` (clamped to the travel), blocking until the last write.
	///
	/// The current angle is only updated once every write succeeded. On any failure after the
	/// first write the output is stopped; the next successful motion brings the servo back in
	/// line with the stored angle.
	pub fn go_to_position(&mut self, angle: f64, request: SpeedRequest) -> Result<Motion> {
		let from_angle = self.current_angle;
		let to_angle = self.envelope.clamp_angle(angle);

		let resolution = self.calibration.resolve(request)?;

		if self.cancel.is_cancelled() {
			self.phase = MotionPhase::Idle;
			self.release()
				.map_err(|e| error!("Failed to release cancelled servo: {}", e))
				.unwrap_or_default();
			return Err(ServoError::Cancelled);
		}

		let steps = DutySteps::new(
			self.envelope.angle_to_duty(from_angle),
			self.envelope.angle_to_duty(to_angle),
			resolution.step.duty_increment(&self.envelope),
		);

		self.phase = MotionPhase::Stepping;

		let writes = {
			let mut guard = ReleaseGuard {
				port: &mut self.port,
				engaged: &mut self.engaged,
				completed: false,
			};

			let mut writes = 0;

			for duty in steps {
				if self.cancel.is_cancelled() {
					warn!("Motion to {:.1}° cancelled after {} writes", to_angle, writes);
					self.phase = MotionPhase::Idle;
					return Err(ServoError::Cancelled);
				}

				if let Err(e) = guard.port.set_duty_cycle(duty) {
					error!("Motion to {:.1}° aborted after {} writes: {}", to_angle, writes, e);
					self.phase = MotionPhase::Idle;
					return Err(ServoError::HardwareWrite(e));
				}

				*guard.engaged = true;
				writes += 1;
				trace!("Duty cycle {:.4}%", duty);

				thread::sleep(resolution.delay);
			}

			guard.completed = true;
			writes
		};

		self.current_angle = to_angle;
		self.phase = MotionPhase::Settled;

		let motion = Motion {
			from_angle,
			to_angle,
			step: resolution.step,
			delay: resolution.delay,
			writes,
			speed_deg_s: resolution.speed_deg_s,
		};

		debug!("{:?}", motion);

		Ok(motion)
	}

	/// Stops the PWM output. Calling it on a released controller does nothing.
	pub fn release(&mut self) -> Result<()> {
		if self.engaged {
			self.port.stop().map_err(ServoError::HardwareWrite)?;
			self.engaged = false;
			info!("Servo released at {:.1}°", self.current_angle);
		}

		Ok(())
	}
}

impl<P: PwmPort> Drop for ServoController<P> {
	fn drop(&mut self) {
		self.release()
			.map_err(|e| error!("Failed to release servo: {}", e))
			.unwrap_or_default();
	}
}

/// Stops the port when a motion leaves its stepping loop without completing, including on
/// unwinding.
struct ReleaseGuard<'a, P: PwmPort> {
	port: &'a mut P,
	engaged: &'a mut bool,
	completed: bool,
}

impl<'a, P: PwmPort> Drop for ReleaseGuard<'a, P> {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		match self.port.stop() {
			Ok(()) => *self.engaged = false,
			Err(e) => error!("Failed to stop PWM output: {}", e),
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::*;
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	#[derive(Debug, Clone, PartialEq)]
	enum Event {
		Duty(f64),
		Stop,
	}

	#[derive(Clone, Default)]
	struct RecordingPort {
		events: Arc<Mutex<Vec<Event>>>,
		fail_after: Option<usize>,
		cancel_after: Option<(usize, CancelToken)>,
	}

	impl RecordingPort {
		fn events(&self) -> Vec<Event> {
			self.events.lock().unwrap().clone()
		}

		fn duties(&self) -> Vec<f64> {
			self.events()
				.into_iter()
				.filter_map(|event| match event {
					Event::Duty(duty) => Some(duty),
					Event::Stop => None,
				})
				.collect()
		}

		fn clear(&self) {
			self.events.lock().unwrap().clear();
		}
	}

	impl PwmPort for RecordingPort {
		fn set_duty_cycle(&mut self, duty_pct: f64) -> std::result::Result<(), BoxError> {
			let mut events = self.events.lock().unwrap();
			let written = events.iter().filter(|event| matches!(event, Event::Duty(_))).count();

			if let Some((count, token)) = &self.cancel_after {
				if written + 1 == *count {
					token.cancel();
				}
			}

			if self.fail_after == Some(written) {
				return Err("write failed".into());
			}

			events.push(Event::Duty(duty_pct));
			Ok(())
		}

		fn stop(&mut self) -> std::result::Result<(), BoxError> {
			self.events.lock().unwrap().push(Event::Stop);
			Ok(())
		}
	}

	/// 0% to 100% over ±90°
	fn unit_envelope() -> ServoEnvelope {
		ServoEnvelope::new(20., 180., 0., 100.).unwrap()
	}

	fn fast_sleep() -> SleepBounds {
		SleepBounds::new(Duration::from_micros(10), Duration::from_micros(50)).unwrap()
	}

	fn ten_percent_table() -> SpeedCalibrationModel {
		let speed = SpeedRange {
			min_deg_s: 10.,
			max_deg_s: 100.,
		};
		let segments = vec![CalibrationSegment {
			min_speed: 10.,
			max_speed: 100.,
			fit: HyperbolicFit { a: 0.01, b: 0. },
			steps: 10,
		}];

		SpeedCalibrationModel::table(speed, segments, fast_sleep()).unwrap()
	}

	fn linear() -> SpeedCalibrationModel {
		let speed = SpeedRange {
			min_deg_s: 7.,
			max_deg_s: 400.,
		};

		SpeedCalibrationModel::linear(speed, fast_sleep()).unwrap()
	}

	#[test]
	fn start_test() {
		let port = RecordingPort::default();
		let servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();

		assert_eq!(servo.current_angle(), 0.);
		assert_eq!(servo.phase(), MotionPhase::Idle);
		assert_eq!(port.duties(), vec![50.]);

		let port = RecordingPort::default();
		let servo = ServoController::with_start_angle(port.clone(), unit_envelope(), linear(), -500.).unwrap();
		assert_eq!(servo.current_angle(), -90.);
		assert_eq!(port.duties(), vec![0.]);
	}

	#[test]
	fn end_to_end_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), ten_percent_table()).unwrap();
		port.clear();

		let motion = servo.go_to_position(90., SpeedRequest::Percent(100.)).unwrap();

		let duties = port.duties();
		assert_eq!(duties.len(), 5);
		for (duty, expected) in duties.iter().zip(&[60., 70., 80., 90.]) {
			assert_approx_eq!(*duty, *expected);
		}
		assert_eq!(*duties.last().unwrap(), 100.);

		assert_eq!(motion.writes, 5);
		assert_eq!(motion.step, StepSize::Divisions(10));
		assert_eq!(motion.from_angle, 0.);
		assert_eq!(servo.current_angle(), 90.);
		assert_eq!(servo.phase(), MotionPhase::Settled);
		assert!(servo.is_engaged());
	}

	#[test]
	fn idempotence_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();

		servo.go_to_position(30., SpeedRequest::Percent(100.)).unwrap();
		assert_eq!(servo.current_angle(), 30.);
		port.clear();

		let motion = servo.go_to_position(30., SpeedRequest::Percent(100.)).unwrap();
		assert_eq!(motion.writes, 1);
		assert_eq!(port.duties().len(), 1);
		assert_approx_eq!(port.duties()[0], unit_envelope().angle_to_duty(30.));
		assert_eq!(servo.current_angle(), 30.);
	}

	#[test]
	fn clamp_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), ten_percent_table()).unwrap();

		let motion = servo.go_to_position(400., SpeedRequest::Percent(50.)).unwrap();
		assert_eq!(motion.to_angle, 90.);
		assert_eq!(servo.current_angle(), 90.);
		assert_eq!(*port.duties().last().unwrap(), 100.);

		servo.go_to_position(-400., SpeedRequest::Percent(50.)).unwrap();
		assert_eq!(servo.current_angle(), -90.);
		assert_eq!(*port.duties().last().unwrap(), 0.);
	}

	#[test]
	fn linear_stepping_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();
		port.clear();

		// One degree per write
		let motion = servo.go_to_position(-20., SpeedRequest::Percent(100.)).unwrap();
		assert_eq!(motion.writes, 20);
		assert_eq!(motion.step, StepSize::Increments(1));

		let duties = port.duties();
		assert!(duties.windows(2).all(|pair| pair[0] > pair[1]));
		assert_approx_eq!(*duties.last().unwrap(), unit_envelope().angle_to_duty(-20.));
	}

	#[test]
	fn waiting_request_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();

		let motion = servo
			.go_to_position(
				90.,
				SpeedRequest::Waiting {
					percent_waiting: 100.,
					steps: 30,
				},
			)
			.unwrap();

		assert_eq!(motion.writes, 3);
		assert_eq!(motion.speed_deg_s, None);
		assert_approx_eq!(motion.delay.as_secs_f64(), 20e-6);
	}

	#[test]
	fn no_match_test() {
		let port = RecordingPort::default();
		let speed = SpeedRange {
			min_deg_s: 0.,
			max_deg_s: 100.,
		};
		let segments = vec![CalibrationSegment {
			min_speed: 10.,
			max_speed: 50.,
			fit: HyperbolicFit { a: 100., b: 5. },
			steps: 1,
		}];
		let calibration = SpeedCalibrationModel::table(speed, segments, fast_sleep()).unwrap();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), calibration).unwrap();
		port.clear();

		assert!(matches!(
			servo.go_to_position(45., SpeedRequest::Percent(90.)),
			Err(ServoError::NoCalibrationMatch { .. })
		));
		assert!(port.events().is_empty());
		assert_eq!(servo.current_angle(), 0.);
		assert_eq!(servo.phase(), MotionPhase::Idle);
	}

	#[test]
	fn hardware_failure_test() {
		let port = RecordingPort {
			fail_after: Some(3),
			..RecordingPort::default()
		};
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();

		assert!(matches!(
			servo.go_to_position(45., SpeedRequest::Percent(100.)),
			Err(ServoError::HardwareWrite(_))
		));

		// Start write, two steps, then the port is stopped
		assert_eq!(port.duties().len(), 3);
		assert_eq!(port.events().last(), Some(&Event::Stop));
		assert_eq!(servo.current_angle(), 0.);
		assert_eq!(servo.phase(), MotionPhase::Idle);
		assert!(!servo.is_engaged());
	}

	#[test]
	fn cancel_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();
		let token = servo.cancel_token();

		token.cancel();
		assert!(matches!(
			servo.go_to_position(45., SpeedRequest::Percent(100.)),
			Err(ServoError::Cancelled)
		));
		assert_eq!(port.duties(), vec![50.]);
		assert_eq!(port.events().last(), Some(&Event::Stop));
		assert_eq!(servo.current_angle(), 0.);
		assert!(!servo.is_engaged());

		token.reset();
		servo.go_to_position(1., SpeedRequest::Percent(100.)).unwrap();
		assert_eq!(servo.current_angle(), 1.);
		assert!(servo.is_engaged());
	}

	#[test]
	fn cancel_while_stepping_test() {
		let token = CancelToken::new();
		let port = RecordingPort {
			// Cancelled while writing the fifth duty cycle, start included
			cancel_after: Some((5, token.clone())),
			..RecordingPort::default()
		};
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear())
			.unwrap()
			.with_cancel_token(token);

		assert!(matches!(
			servo.go_to_position(45., SpeedRequest::Percent(100.)),
			Err(ServoError::Cancelled)
		));
		assert_eq!(port.duties().len(), 5);
		assert_eq!(port.events().last(), Some(&Event::Stop));
		assert_eq!(servo.current_angle(), 0.);
		assert_eq!(servo.phase(), MotionPhase::Idle);
		assert!(!servo.is_engaged());
	}

	#[test]
	fn release_test() {
		let port = RecordingPort::default();
		let mut servo = ServoController::new(port.clone(), unit_envelope(), linear()).unwrap();

		servo.release().unwrap();
		servo.release().unwrap();
		assert_eq!(port.events().iter().filter(|event| **event == Event::Stop).count(), 1);
		assert!(!servo.is_engaged());

		// A released servo is driven again by the next motion
		servo.go_to_position(10., SpeedRequest::Percent(100.)).unwrap();
		assert!(servo.is_engaged());

		drop(servo);
		assert_eq!(port.events().last(), Some(&Event::Stop));
		assert_eq!(port.events().iter().filter(|event| **event == Event::Stop).count(), 2);
	}
}
