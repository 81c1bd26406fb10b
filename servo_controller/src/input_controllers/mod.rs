use servo::{BoxError, CancelToken, ServoError};
use std::thread;
use std::time::{Duration, Instant};

pub mod enter_stop_input_controller;
pub mod photo_interrupter_input_controller;

/// A binary sensor, `true` when asserted.
pub trait DigitalInput {
	fn read(&mut self) -> Result<bool, BoxError>;
}

/// Polls `input` every `poll` until it is asserted, returning how long it took.
pub fn wait_until_asserted<I: DigitalInput + ?Sized>(
	input: &mut I,
	poll: Duration,
	timeout: Duration,
	cancel: &CancelToken,
) -> anyhow::Result<Duration> {
	let start = Instant::now();

	loop {
		if input.read().map_err(|e| anyhow!("Failed to read sensor: {}", e))? {
			return Ok(start.elapsed());
		}

		if cancel.is_cancelled() {
			return Err(ServoError::Cancelled.into());
		}

		if start.elapsed() >= timeout {
			return Err(anyhow!("Sensor not asserted after {:.1} s", timeout.as_secs_f64()));
		}

		thread::sleep(poll);
	}
}
