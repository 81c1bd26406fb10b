use pwm::{Polarity, PwmPin};
use servo::{BoxError, PwmPort};

/// Servo signal generated by a hardware PWM channel.
pub struct SysfsPwmOutputController {
	pin: PwmPin,
	enabled: bool,
}

impl SysfsPwmOutputController {
	pub fn new(chip: u32, channel: u32, frequency_hz: f64) -> anyhow::Result<Self> {
		Self::with_pin(PwmPin::new(chip, channel)?, frequency_hz)
	}

	pub fn with_pin(mut pin: PwmPin, frequency_hz: f64) -> anyhow::Result<Self> {
		pin.export()?;

		// Some drivers refuse a period shorter than the current pulse width.
		pin.set_pulse_width_ns(0)?;

		pin.set_frequency(frequency_hz)?;
		pin.set_polarity(Polarity::Normal)?;
		pin.set_enabled(false)?;

		Ok(Self { pin, enabled: false })
	}
}

impl PwmPort for SysfsPwmOutputController {
	fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), BoxError> {
		self.pin.set_duty_cycle(duty_pct)?;

		if !self.enabled {
			self.pin.set_enabled(true)?;
			self.enabled = true;
		}

		Ok(())
	}

	fn stop(&mut self) -> Result<(), BoxError> {
		if self.enabled {
			self.pin.set_enabled(false)?;
			self.enabled = false;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::output_controllers::sysfs_pwm_output_controller::SysfsPwmOutputController;
	use pwm::{PwmChip, PwmPin};
	use servo::PwmPort;
	use std::fs;

	#[test]
	fn sysfs_output_test() {
		let root = std::env::temp_dir().join(format!("sysfs_output_{}", std::process::id()));
		let _ = fs::remove_dir_all(&root);
		fs::create_dir_all(root.join("pwmchip0/pwm0")).unwrap();
		fs::write(root.join("pwmchip0/pwm0/duty_cycle"), "1500000").unwrap();

		let mut pin = PwmPin::with_chip(PwmChip::with_root(&root, 0).unwrap(), 0);
		pin.set_unexport_on_drop(false);

		let attribute = |name: &str| fs::read_to_string(root.join("pwmchip0/pwm0").join(name)).unwrap();

		let mut output = SysfsPwmOutputController::with_pin(pin, 50.).unwrap();
		assert_eq!(attribute("duty_cycle"), "0");
		assert_eq!(attribute("period"), "20000000");
		assert_eq!(attribute("enable"), "0");

		output.set_duty_cycle(7.5).unwrap();
		assert_eq!(attribute("duty_cycle"), "1500000");
		assert_eq!(attribute("enable"), "1");

		output.stop().unwrap();
		output.stop().unwrap();
		assert_eq!(attribute("enable"), "0");

		drop(output);
		fs::remove_dir_all(root).unwrap();
	}
}
