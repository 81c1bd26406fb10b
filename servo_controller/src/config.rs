use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use servo::{
	CalibrationSegment, HyperbolicFit, ServoEnvelope, SleepBounds, SpeedCalibrationModel, SpeedProfile, SpeedRange,
};

/// Where the PWM signal of a servo comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutputConfig {
	/// Software PWM on any BCM GPIO pin.
	Gpio { pin: u8 },
	/// Hardware PWM channel exposed through `/sys/class/pwm`.
	Sysfs { chip: u32, channel: u32 },
}

impl Default for OutputConfig {
	fn default() -> Self {
		OutputConfig::Gpio { pin: 17 }
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpeedSegmentConfig {
	pub min_speed: f64,
	pub max_speed: f64,
	/// `[a, b]` of `waiting_time_ms = a / (speed - b)`
	pub params: [f64; 2],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServoParams {
	pub period_ms: f64,
	pub max_angle: f64,
	pub min_duty_ms: f64,
	pub max_duty_ms: f64,
	pub min_speed_d_s: f64,
	pub max_speed_d_s: f64,
	#[serde(alias = "min_sleep")]
	pub min_sleep_s: f64,
	#[serde(alias = "max_sleep")]
	pub max_sleep_s: f64,
	pub output: OutputConfig,
	/// Photo interrupter used by the speed calibration.
	pub sensor_pin: u8,
	/// Calibration segments keyed by step count, in file order.
	#[serde(with = "ordered_segments", skip_serializing_if = "Vec::is_empty")]
	pub speed_config: Vec<(u32, SpeedSegmentConfig)>,
}

impl Default for ServoParams {
	fn default() -> Self {
		ServoParams {
			period_ms: 20.,
			max_angle: 180.,
			min_duty_ms: 0.5,
			max_duty_ms: 2.5,
			min_speed_d_s: 7.,
			max_speed_d_s: 400.,
			min_sleep_s: 0.0001,
			max_sleep_s: 0.005,
			output: OutputConfig::default(),
			sensor_pin: 3,
			speed_config: Vec::new(),
		}
	}
}

impl ServoParams {
	pub fn envelope(&self) -> anyhow::Result<ServoEnvelope> {
		Ok(ServoEnvelope::from_pulse_widths(
			self.period_ms,
			self.max_angle,
			self.min_duty_ms,
			self.max_duty_ms,
		)?)
	}

	/// Uses the calibration table when there is one, the linear profile otherwise.
	pub fn calibration(&self) -> anyhow::Result<SpeedCalibrationModel> {
		let speed = SpeedRange {
			min_deg_s: self.min_speed_d_s,
			max_deg_s: self.max_speed_d_s,
		};

		let profile = if self.speed_config.is_empty() {
			SpeedProfile::Linear { speed }
		} else {
			let segments = self
				.speed_config
				.iter()
				.map(|(steps, segment)| CalibrationSegment {
					min_speed: segment.min_speed,
					max_speed: segment.max_speed,
					fit: HyperbolicFit {
						a: segment.params[0],
						b: segment.params[1],
					},
					steps: *steps,
				})
				.collect();

			SpeedProfile::Table { speed, segments }
		};

		let sleep = SleepBounds::new(seconds(self.min_sleep_s)?, seconds(self.max_sleep_s)?)?;

		Ok(SpeedCalibrationModel::new(profile, sleep)?)
	}
}

fn seconds(value: f64) -> anyhow::Result<Duration> {
	Duration::try_from_secs_f64(value).map_err(|_| anyhow!("Invalid duration {} s", value))
}

/// Servo parameter file: servo name → parameters.
pub type ServoConfigs = BTreeMap<String, ServoParams>;

pub trait TryIntoLevelFilter {
	fn try_into_level_filter(&self) -> Result<LevelFilter, ()>;
}

impl TryIntoLevelFilter for str {
	fn try_into_level_filter(&self) -> Result<LevelFilter, ()> {
		Ok(match self {
			"none" => LevelFilter::Off,
			"error" => LevelFilter::Error,
			"warn" => LevelFilter::Warn,
			"info" => LevelFilter::Info,
			"debug" => LevelFilter::Debug,
			"all" => LevelFilter::Trace,
			_ => return Err(()),
		})
	}
}

pub fn default_configs() -> ServoConfigs {
	let mut configs = ServoConfigs::new();
	configs.insert(String::from("servo_1"), ServoParams::default());
	configs
}

pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<ServoConfigs> {
	let path = path.as_ref();
	let config_file = File::open(path)
		.map_err(|e| anyhow!("Failed to open configuration \"{}\": {}", path.display(), e))?;

	let configs: ServoConfigs = serde_json::from_reader(config_file)?;

	Ok(configs)
}

pub fn save<P: AsRef<Path>>(path: P, configs: &ServoConfigs) -> anyhow::Result<()> {
	let mut config_file = OpenOptions::new()
		.create(true)
		.write(true)
		.truncate(true)
		.open(path)?;

	write!(config_file, "{}", serde_json::to_string_pretty(configs)?)?;

	Ok(())
}

pub fn servo<'a>(configs: &'a ServoConfigs, name: &str) -> anyhow::Result<&'a ServoParams> {
	configs.get(name).ok_or_else(|| {
		anyhow!(
			"Unknown servo \"{}\" (available: {})",
			name,
			configs.keys().cloned().collect::<Vec<String>>().join(", ")
		)
	})
}

/// JSON objects keyed by step count, keeping the order of the file since the first matching
/// segment wins.
mod ordered_segments {
	use super::SpeedSegmentConfig;
	use serde::de::{Error, MapAccess, Visitor};
	use serde::ser::SerializeMap;
	use serde::{Deserializer, Serializer};
	use std::fmt;

	pub fn serialize<S: Serializer>(segments: &[(u32, SpeedSegmentConfig)], serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(segments.len()))?;

		for (steps, segment) in segments {
			map.serialize_entry(&steps.to_string(), segment)?;
		}

		map.end()
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(u32, SpeedSegmentConfig)>, D::Error> {
		deserializer.deserialize_map(SegmentsVisitor)
	}

	struct SegmentsVisitor;

	impl<'de> Visitor<'de> for SegmentsVisitor {
		type Value = Vec<(u32, SpeedSegmentConfig)>;

		fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
			formatter.write_str("a map of step counts to speed segments")
		}

		fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
			let mut segments = Vec::with_capacity(access.size_hint().unwrap_or(0));

			while let Some((key, segment)) = access.next_entry::<String, SpeedSegmentConfig>()? {
				let steps = key
					.trim()
					.parse::<u32>()
					.map_err(|_| A::Error::custom(format!("invalid step count \"{}\"", key)))?;

				segments.push((steps, segment));
			}

			Ok(segments)
		}
	}
}
