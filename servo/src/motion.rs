/// Below this distance the running duty cycle is considered to have reached its target.
const DUTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
	Idle,
	Stepping,
	Settled,
}

/// Ordered duty cycles written while walking from `start` to `end`.
///
/// The start duty cycle is not emitted, the servo already sits there. Each item moves the
/// running value by one increment towards `end`. As soon as the running value would reach or
/// cross `end`, `end` itself is emitted and the sequence stops, so the last write always lands
/// exactly on the target whatever the increment. When a single increment covers the whole
/// distance, `end` is the only item.
#[derive(Debug, Clone)]
pub struct DutySteps {
	running: f64,
	end: f64,
	increment: f64,
	done: bool,
}

impl DutySteps {
	/// `step` is the unsigned duty cycle distance of a single write, it must be strictly positive.
	pub fn new(start: f64, end: f64, step: f64) -> Self {
		debug_assert!(step > 0., "step must be strictly positive");

		let increment = if end > start { step.abs() } else { -step.abs() };

		Self {
			running: start,
			end,
			increment,
			done: false,
		}
	}

	/// Signed increment, positive when moving towards greater duty cycles.
	pub fn increment(&self) -> f64 {
		self.increment
	}

	pub fn is_short_hop(&self) -> bool {
		self.increment.abs() >= (self.end - self.running).abs()
	}
}

impl Iterator for DutySteps {
	type Item = f64;

	fn next(&mut self) -> Option<f64> {
		if self.done {
			return None;
		}

		let next = self.running + self.increment;
		let remaining = (self.end - next) * self.increment.signum();

		// A zero or non-finite increment cannot make progress, jump to the end.
		if remaining <= DUTY_EPSILON || !next.is_finite() || self.increment == 0. {
			self.done = true;
			self.running = self.end;
			return Some(self.end);
		}

		self.running = next;
		Some(next)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		if self.done {
			(0, Some(0))
		} else {
			(1, None)
		}
	}
}
