use crate::error::BoxError;

/// Output emitting the PWM signal of a single servo.
///
/// The controller only ever calls these two operations, pin setup and frequency configuration
/// belong to whoever builds the port. Setting a duty cycle on a stopped output must start it
/// again, and `stop` must be safe to call any number of times.
pub trait PwmPort {
	/// `duty_pct` is a percentage of the PWM period, in [0, 100].
	fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), BoxError>;

	fn stop(&mut self) -> Result<(), BoxError>;
}

impl<P: PwmPort + ?Sized> PwmPort for Box<P> {
	fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), BoxError> {
		(**self).set_duty_cycle(duty_pct)
	}

	fn stop(&mut self) -> Result<(), BoxError> {
		(**self).stop()
	}
}
