use servo::CancelToken;
use std::io::BufRead;
use std::thread;
use std::thread::JoinHandle;

/// Lets the operator stop a long run by pressing enter.
pub struct EnterStopInputController {
	cancel: CancelToken,
}

impl EnterStopInputController {
	pub fn new(cancel: CancelToken) -> Self {
		Self { cancel }
	}

	/// Cancels the token once a line is read. A closed input never cancels, so that runs
	/// without a terminal go to completion.
	pub fn wait<R: BufRead>(&self, mut reader: R) {
		let mut line = String::new();

		match reader.read_line(&mut line) {
			Ok(0) => debug!("Operator input closed"),
			Ok(_) => {
				info!("Stop requested by operator");
				self.cancel.cancel();
			}
			Err(e) => warn!("Failed to read operator input: {}", e),
		}
	}

	pub fn spawn(self) -> JoinHandle<()> {
		info!("Press enter to stop");

		thread::spawn(move || {
			let stdin = std::io::stdin();
			self.wait(stdin.lock());
		})
	}
}

#[cfg(test)]
mod tests {
	use crate::input_controllers::enter_stop_input_controller::EnterStopInputController;
	use servo::CancelToken;
	use std::io::Cursor;

	#[test]
	fn enter_test() {
		let cancel = CancelToken::new();

		EnterStopInputController::new(cancel.clone()).wait(Cursor::new("\n"));
		assert!(cancel.is_cancelled());
	}

	#[test]
	fn closed_input_test() {
		let cancel = CancelToken::new();

		EnterStopInputController::new(cancel.clone()).wait(Cursor::new(""));
		assert!(!cancel.is_cancelled());
	}
}
