use rppal::gpio::{Gpio, InputPin};
use servo::BoxError;

use crate::input_controllers::DigitalInput;

/// Photo interrupter placed at the end of the travel, used to time full rotations.
pub struct PhotoInterrupterInputController {
	pin: InputPin,
}

impl PhotoInterrupterInputController {
	pub fn new(pin: u8) -> anyhow::Result<Self> {
		let gpio = Gpio::new()?;

		Ok(Self {
			pin: gpio.get(pin)?.into_input_pullup(),
		})
	}
}

impl DigitalInput for PhotoInterrupterInputController {
	fn read(&mut self) -> Result<bool, BoxError> {
		Ok(self.pin.is_high())
	}
}
