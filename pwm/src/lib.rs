// Adapted from libraries `rppal` by Rene van der Meer and `sysfs-pwm` by the Rust Embedded team

use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const PWM_PATH: &'static str = "/sys/class/pwm";

#[derive(Debug)]
pub struct PwmChip {
	pub number: u32,
	root: PathBuf,
}

impl PwmChip {
	pub fn new(number: u32) -> io::Result<PwmChip> {
		Self::with_root(PWM_PATH, number)
	}

	/// Opens a chip exposed under `root` rather than `/sys/class/pwm`.
	pub fn with_root<P: AsRef<Path>>(root: P, number: u32) -> io::Result<PwmChip> {
		let root = root.as_ref().to_owned();
		fs::metadata(root.join(format!("pwmchip{}", number)))?;
		Ok(PwmChip { number, root })
	}

	fn path(&self) -> PathBuf {
		self.root.join(format!("pwmchip{}", self.number))
	}

	pub fn count(&self) -> Result<u32, Box<dyn Error + Send + Sync>> {
		let npwm = fs::read_to_string(self.path().join("npwm"))?;
		Ok(npwm.trim().parse()?)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
	Normal,
	Inverse,
}

/// A single PWM channel of a sysfs PWM chip.
#[derive(Debug)]
pub struct PwmPin {
	chip: PwmChip,
	channel: u32,
	period_ns: Option<u64>,
	unexport_on_drop: bool,
}

impl PwmPin {
	pub fn new(chip: u32, channel: u32) -> io::Result<PwmPin> {
		Ok(Self::with_chip(PwmChip::new(chip)?, channel))
	}

	pub fn with_chip(chip: PwmChip, channel: u32) -> PwmPin {
		PwmPin {
			chip,
			channel,
			period_ns: None,
			unexport_on_drop: true,
		}
	}

	pub fn set_unexport_on_drop(&mut self, unexport_on_drop: bool) {
		self.unexport_on_drop = unexport_on_drop;
	}

	fn channel_path(&self) -> PathBuf {
		self.chip.path().join(format!("pwm{}", self.channel))
	}

	fn read_attribute<T>(&self, attribute: &str) -> Result<T, Box<dyn Error + Send + Sync>>
	where
		T: FromStr,
		T::Err: Error + Send + Sync + 'static,
	{
		let value = fs::read_to_string(self.channel_path().join(attribute))?;
		Ok(value.trim().parse()?)
	}

	fn write_attribute<T: Display>(&self, attribute: &str, value: T) -> io::Result<()> {
		File::create(self.channel_path().join(attribute))?.write_fmt(format_args!("{}", value))
	}

	pub fn is_exported(&self) -> bool {
		self.channel_path().exists()
	}

	pub fn export(&self) -> io::Result<()> {
		// Exporting a PWM pin takes a significant time, that is also unpredictable.
		if !self.is_exported() {
			File::create(self.chip.path().join("export"))?.write_fmt(format_args!("{}", self.channel))?;

			const MAX_RETRY: usize = 25;
			const EXPORT_DELAY: Duration = Duration::from_millis(30);

			for _ in 0..MAX_RETRY {
				if self.is_exported() {
					break;
				}

				std::thread::sleep(EXPORT_DELAY);
			}
		}

		fs::metadata(self.channel_path()).map(|_| ())
	}

	pub fn unexport(&self) -> io::Result<()> {
		// Only unexport if the channel is actually exported
		if self.is_exported() {
			File::create(self.chip.path().join("unexport"))?.write_fmt(format_args!("{}", self.channel))?;
		}

		Ok(())
	}

	pub fn period_ns(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
		self.read_attribute("period")
	}

	pub fn set_period_ns(&mut self, period_ns: u64) -> io::Result<()> {
		self.write_attribute("period", period_ns)?;
		self.period_ns = Some(period_ns);

		Ok(())
	}

	pub fn set_frequency(&mut self, frequency_hz: f64) -> io::Result<()> {
		if !(frequency_hz.is_finite() && frequency_hz > 0.) {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("invalid PWM frequency {} Hz", frequency_hz),
			));
		}

		self.set_period_ns((1e9 / frequency_hz).round() as u64)
	}

	/// The sysfs PWM interface specifies the duty cycle in nanoseconds, which means it's
	/// actually the pulse width.
	pub fn pulse_width_ns(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
		self.read_attribute("duty_cycle")
	}

	pub fn set_pulse_width_ns(&mut self, pulse_width_ns: u64) -> io::Result<()> {
		self.write_attribute("duty_cycle", pulse_width_ns)
	}

	/// Sets the pulse width as a percentage of the period. The period is read back from the
	/// channel unless it was set through this handle.
	pub fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), Box<dyn Error + Send + Sync>> {
		let period_ns = match self.period_ns {
			Some(period_ns) => period_ns,
			None => {
				let period_ns = self.period_ns()?;
				self.period_ns = Some(period_ns);
				period_ns
			}
		};

		let duty_pct = duty_pct.max(0.).min(100.);
		self.set_pulse_width_ns((period_ns as f64 * duty_pct / 100.).round() as u64)?;

		Ok(())
	}

	pub fn polarity(&self) -> Result<Polarity, Box<dyn Error + Send + Sync>> {
		let polarity: String = self.read_attribute("polarity")?;

		match polarity.as_str() {
			"normal" => Ok(Polarity::Normal),
			_ => Ok(Polarity::Inverse),
		}
	}

	pub fn set_polarity(&mut self, polarity: Polarity) -> io::Result<()> {
		let polarity = match polarity {
			Polarity::Normal => "normal",
			Polarity::Inverse => "inversed",
		};

		self.write_attribute("polarity", polarity)
	}

	pub fn enabled(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
		let enabled: u8 = self.read_attribute("enable")?;
		Ok(enabled == 1)
	}

	pub fn set_enabled(&mut self, enabled: bool) -> io::Result<()> {
		self.write_attribute("enable", enabled as u8)
	}
}

impl Drop for PwmPin {
	fn drop(&mut self) {
		if self.unexport_on_drop {
			self.unexport().unwrap_or_default()
		}
	}
}
