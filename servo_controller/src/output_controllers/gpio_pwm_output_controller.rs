use rppal::gpio::{Gpio, OutputPin};
use servo::{BoxError, PwmPort};

/// Servo signal generated by rppal's software PWM, usable on any GPIO pin.
pub struct GpioPwmOutputController {
	pin: OutputPin,
	frequency_hz: f64,
}

impl GpioPwmOutputController {
	pub fn new(pin: u8, frequency_hz: f64) -> anyhow::Result<Self> {
		let gpio = Gpio::new()?;

		let mut pin = gpio.get(pin)?.into_output();
		pin.set_low();

		Ok(Self { pin, frequency_hz })
	}
}

impl PwmPort for GpioPwmOutputController {
	fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), BoxError> {
		let duty_cycle = (duty_pct / 100.).max(0.).min(1.);
		self.pin.set_pwm_frequency(self.frequency_hz, duty_cycle)?;

		Ok(())
	}

	fn stop(&mut self) -> Result<(), BoxError> {
		self.pin.clear_pwm()?;
		self.pin.set_low();

		Ok(())
	}
}
