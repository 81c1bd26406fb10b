use std::error::Error;

/// Error type returned by hardware seams (PWM ports, digital inputs).
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ServoError {
	#[error("Invalid servo envelope: {0}")]
	InvalidEnvelope(String),

	#[error("Invalid speed calibration: {0}")]
	InvalidCalibration(String),

	#[error("Invalid step count {0}, expected at least 1")]
	InvalidStep(u32),

	/// The requested speed is not covered by any calibration segment.
	#[error("No calibration segment covers {speed:.2}°/s")]
	NoCalibrationMatch { speed: f64 },

	#[error("PWM write failed: {0}")]
	HardwareWrite(BoxError),

	#[error("Motion cancelled")]
	Cancelled,
}

pub type Result<T> = std::result::Result<T, ServoError>;
