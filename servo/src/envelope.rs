use crate::error::{Result, ServoError};

/// Physical envelope of a servo: PWM period, mechanical travel and the duty cycles reached at
/// both ends of the travel.
///
/// Angles are in degrees, with 0 in the middle of the travel, positive angles clockwise and
/// negative angles counter-clockwise. A servo with 180° of travel therefore accepts angles in
/// [-90, 90]. Duty cycles are percentages of the PWM period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoEnvelope {
	period_ms: f64,
	max_angle_deg: f64,
	min_duty_pct: f64,
	max_duty_pct: f64,
}

impl ServoEnvelope {
	pub fn new(period_ms: f64, max_angle_deg: f64, min_duty_pct: f64, max_duty_pct: f64) -> Result<Self> {
		let all_finite = [period_ms, max_angle_deg, min_duty_pct, max_duty_pct]
			.iter()
			.all(|value| value.is_finite());

		if !all_finite {
			return Err(ServoError::InvalidEnvelope(String::from("values must be finite")));
		}

		if period_ms <= 0. {
			return Err(ServoError::InvalidEnvelope(format!("period must be positive (found {} ms)", period_ms)));
		}

		if max_angle_deg <= 0. {
			return Err(ServoError::InvalidEnvelope(format!("maximum angle must be positive (found {}°)", max_angle_deg)));
		}

		if min_duty_pct >= max_duty_pct {
			return Err(ServoError::InvalidEnvelope(format!(
				"minimum duty cycle ({}%) must be lower than maximum duty cycle ({}%)",
				min_duty_pct, max_duty_pct
			)));
		}

		Ok(Self {
			period_ms,
			max_angle_deg,
			min_duty_pct,
			max_duty_pct,
		})
	}

	/// Builds an envelope from the pulse widths sent at both ends of the travel, which is how
	/// servo datasheets (and configuration files) usually describe it.
	pub fn from_pulse_widths(period_ms: f64, max_angle_deg: f64, min_pulse_ms: f64, max_pulse_ms: f64) -> Result<Self> {
		if period_ms <= 0. {
			return Err(ServoError::InvalidEnvelope(format!("period must be positive (found {} ms)", period_ms)));
		}

		Self::new(
			period_ms,
			max_angle_deg,
			min_pulse_ms / period_ms * 100.,
			max_pulse_ms / period_ms * 100.,
		)
	}

	pub fn period_ms(&self) -> f64 {
		self.period_ms
	}

	pub fn frequency_hz(&self) -> f64 {
		1000. / self.period_ms
	}

	pub fn max_angle(&self) -> f64 {
		self.max_angle_deg
	}

	pub fn half_angle(&self) -> f64 {
		self.max_angle_deg / 2.
	}

	pub fn min_duty(&self) -> f64 {
		self.min_duty_pct
	}

	pub fn max_duty(&self) -> f64 {
		self.max_duty_pct
	}

	pub fn duty_span(&self) -> f64 {
		self.max_duty_pct - self.min_duty_pct
	}

	/// Duty cycle change corresponding to one degree.
	pub fn min_increment(&self) -> f64 {
		self.duty_span() / self.max_angle_deg
	}

	pub fn center_duty(&self) -> f64 {
		self.min_duty_pct + self.duty_span() / 2.
	}

	/// Out of range angles are silently brought back to the nearest end of the travel.
	pub fn clamp_angle(&self, angle_deg: f64) -> f64 {
		if angle_deg.is_nan() {
			return 0.;
		}

		angle_deg.max(-self.half_angle()).min(self.half_angle())
	}

	/// Callers are expected to clamp the angle first; see `clamp_angle`.
	pub fn angle_to_duty(&self, angle_deg: f64) -> f64 {
		let percent = (angle_deg + self.half_angle()) / self.max_angle_deg;
		percent * self.duty_span() + self.min_duty_pct
	}

	pub fn duty_to_angle(&self, duty_pct: f64) -> f64 {
		let percent = (duty_pct - self.min_duty_pct) / self.duty_span();
		percent * self.max_angle_deg - self.half_angle()
	}
}

#[cfg(test)]
mod tests {
	use crate::{ServoEnvelope, ServoError};

	fn sg90() -> ServoEnvelope {
		ServoEnvelope::from_pulse_widths(20., 180., 0.5, 2.5).unwrap()
	}

	#[test]
	fn pulse_width_test() {
		let envelope = sg90();
		assert_approx_eq!(envelope.min_duty(), 2.5);
		assert_approx_eq!(envelope.max_duty(), 12.5);
		assert_approx_eq!(envelope.frequency_hz(), 50.);
		assert_approx_eq!(envelope.center_duty(), 7.5);
		assert_approx_eq!(envelope.min_increment(), 10. / 180.);
	}

	#[test]
	fn bounds_test() {
		let envelope = sg90();
		assert_approx_eq!(envelope.angle_to_duty(-90.), envelope.min_duty());
		assert_approx_eq!(envelope.angle_to_duty(90.), envelope.max_duty());
		assert_approx_eq!(envelope.angle_to_duty(0.), envelope.center_duty());
	}

	#[test]
	fn monotonic_test() {
		let envelope = sg90();
		let mut last = envelope.angle_to_duty(-90.);

		for angle in -89..=90 {
			let duty = envelope.angle_to_duty(angle as f64);
			assert!(duty >= last, "duty decreased at {}°", angle);
			last = duty;
		}
	}

	#[test]
	fn inverse_test() {
		let envelope = sg90();

		for &angle in &[-90., -45.5, 0., 12.25, 90.] {
			assert_approx_eq!(envelope.duty_to_angle(envelope.angle_to_duty(angle)), angle);
		}
	}

	#[test]
	fn clamp_test() {
		let envelope = sg90();
		assert_eq!(envelope.clamp_angle(135.), 90.);
		assert_eq!(envelope.clamp_angle(-1000.), -90.);
		assert_eq!(envelope.clamp_angle(33.), 33.);
		assert_eq!(envelope.clamp_angle(f64::NAN), 0.);
	}

	#[test]
	fn invalid_envelope_test() {
		assert!(matches!(ServoEnvelope::new(20., 180., 10., 5.), Err(ServoError::InvalidEnvelope(_))));
		assert!(matches!(ServoEnvelope::new(20., 180., 5., 5.), Err(ServoError::InvalidEnvelope(_))));
		assert!(matches!(ServoEnvelope::new(20., 0., 5., 10.), Err(ServoError::InvalidEnvelope(_))));
		assert!(matches!(ServoEnvelope::new(0., 180., 5., 10.), Err(ServoError::InvalidEnvelope(_))));
		assert!(matches!(ServoEnvelope::new(20., f64::INFINITY, 5., 10.), Err(ServoError::InvalidEnvelope(_))));
		assert!(matches!(ServoEnvelope::from_pulse_widths(-20., 180., 1., 2.), Err(ServoError::InvalidEnvelope(_))));
	}
}
