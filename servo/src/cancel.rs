use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

/// Shared flag used to abort a motion from another thread.
///
/// Once cancelled, every motion fails with `ServoError::Cancelled` until `reset` is called.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	pub fn reset(&self) {
		self.0.store(false, Ordering::SeqCst);
	}
}
