use servo::PwmPort;

use crate::config::OutputConfig;
use crate::output_controllers::gpio_pwm_output_controller::GpioPwmOutputController;
use crate::output_controllers::sysfs_pwm_output_controller::SysfsPwmOutputController;

pub mod gpio_pwm_output_controller;
pub mod sysfs_pwm_output_controller;

/// Opens the PWM output described by the configuration, running at `frequency_hz`.
pub fn open(output: &OutputConfig, frequency_hz: f64) -> anyhow::Result<Box<dyn PwmPort>> {
	let port: Box<dyn PwmPort> = match *output {
		OutputConfig::Gpio { pin } => {
			info!("Software PWM on GPIO {} at {:.1} Hz", pin, frequency_hz);
			Box::new(GpioPwmOutputController::new(pin, frequency_hz)?)
		}
		OutputConfig::Sysfs { chip, channel } => {
			info!("Hardware PWM on pwmchip{}/pwm{} at {:.1} Hz", chip, channel, frequency_hz);
			Box::new(SysfsPwmOutputController::new(chip, channel, frequency_hz)?)
		}
	};

	Ok(port)
}
