#[macro_use]
extern crate anyhow;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate assert_approx_eq;

use clap::{Arg, ArgMatches, Command};
use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;

use crate::config::{ServoParams, TryIntoLevelFilter};
use crate::harness::speed_calibration::{self, SpeedCalibration};
use crate::harness::timing_sweep::{self, TimingSweep};
use crate::harness::CalibrationLog;
use crate::input_controllers::enter_stop_input_controller::EnterStopInputController;
use crate::input_controllers::photo_interrupter_input_controller::PhotoInterrupterInputController;
use black_box::BlackBox;
use servo::{PwmPort, ServoController, ServoError, SpeedRequest};

mod config;
mod harness;
mod input_controllers;
mod output_controllers;

// Command line arguments
const CONFIG_ARG: &'static str = "config";
const SERVO_ARG: &'static str = "servo";
const LOG_LEVEL_ARG: &'static str = "log-level";
const ANGLE_ARG: &'static str = "angle";
const SPEED_ARG: &'static str = "speed";
const WAITING_ARG: &'static str = "waiting";
const STEPS_ARG: &'static str = "steps";
const MAX_STEPS_ARG: &'static str = "max-steps";
const SETTLE_ARG: &'static str = "settle-ms";
const SENSOR_PIN_ARG: &'static str = "sensor-pin";
const TIMEOUT_ARG: &'static str = "timeout-s";
const OUTPUT_ARG: &'static str = "output";

const MOVE_COMMAND: &'static str = "move";
const SWEEP_COMMAND: &'static str = "sweep";
const CALIBRATE_COMMAND: &'static str = "calibrate";
const INIT_CONFIG_COMMAND: &'static str = "init-config";

fn cli() -> Command<'static> {
	let settle = Arg::new(SETTLE_ARG)
		.long(SETTLE_ARG)
		.help("Pause after each homing, in milliseconds")
		.takes_value(true)
		.default_value("1000");

	Command::new("Servo controller")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Vincent Leporcher <vincent.leporcher@telecom-paris.fr>")
		.subcommand_required(true)
		.arg_required_else_help(true)
		.arg(Arg::new(CONFIG_ARG)
			.long(CONFIG_ARG)
			.help("Servo parameter file")
			.takes_value(true)
			.global(true)
			.default_value("servo_params.json"))
		.arg(Arg::new(SERVO_ARG)
			.long(SERVO_ARG)
			.help("Servo entry of the parameter file")
			.takes_value(true)
			.global(true)
			.default_value("servo_1"))
		.arg(Arg::new(LOG_LEVEL_ARG)
			.long(LOG_LEVEL_ARG)
			.help("none, error, warn, info, debug or all")
			.takes_value(true)
			.global(true)
			.default_value("info"))
		.subcommand(Command::new(MOVE_COMMAND)
			.about("Move to an angle, 0° being the middle of the travel")
			.arg(Arg::new(ANGLE_ARG)
				.long(ANGLE_ARG)
				.takes_value(true)
				.allow_hyphen_values(true)
				.required(true))
			.arg(Arg::new(SPEED_ARG)
				.long(SPEED_ARG)
				.help("Speed percentage, 100 when omitted")
				.takes_value(true)
				.conflicts_with(WAITING_ARG))
			.arg(Arg::new(WAITING_ARG)
				.long(WAITING_ARG)
				.help("Waiting percentage, the step count being given by --steps")
				.takes_value(true)
				.requires(STEPS_ARG))
			.arg(Arg::new(STEPS_ARG)
				.long(STEPS_ARG)
				.help("Minimal increments per write")
				.takes_value(true)
				.requires(WAITING_ARG)))
		.subcommand(Command::new(SWEEP_COMMAND)
			.about("Time full rotations for every step count and waiting percentage")
			.arg(Arg::new(MAX_STEPS_ARG)
				.long(MAX_STEPS_ARG)
				.takes_value(true)
				.default_value("229"))
			.arg(settle.clone())
			.arg(Arg::new(OUTPUT_ARG)
				.long(OUTPUT_ARG)
				.takes_value(true)
				.default_value("time_analysis_servo.csv")))
		.subcommand(Command::new(CALIBRATE_COMMAND)
			.about("Measure the rotation speed of every speed percentage with a photo interrupter")
			.arg(Arg::new(SENSOR_PIN_ARG)
				.long(SENSOR_PIN_ARG)
				.help("Overrides the sensor pin of the parameter file")
				.takes_value(true))
			.arg(Arg::new(TIMEOUT_ARG)
				.long(TIMEOUT_ARG)
				.help("Longest wait for the sensor, in seconds")
				.takes_value(true)
				.default_value("10"))
			.arg(settle)
			.arg(Arg::new(OUTPUT_ARG)
				.long(OUTPUT_ARG)
				.takes_value(true)))
		.subcommand(Command::new(INIT_CONFIG_COMMAND)
			.about("Write a default parameter file"))
}

fn main() -> anyhow::Result<()> {
	let args = cli().get_matches();

	// Log
	let level_filter = args
		.value_of(LOG_LEVEL_ARG)
		.unwrap_or("info")
		.try_into_level_filter()
		.map_err(|_| anyhow!("Failed to parse log level filter"))?;

	BlackBox::new("servo")?
		.spawn(level_filter)
		.map_err(|e| anyhow!("Failed to install logger: {}", e))?;

	info!("Servo controller {}", env!("CARGO_PKG_VERSION"));

	let result = run(&args);

	match &result {
		Err(e) if matches!(e.downcast_ref::<ServoError>(), Some(ServoError::Cancelled)) => {
			info!("Stopped by operator");
		}
		Err(e) => error!("{:#}", e),
		Ok(()) => info!("Done"),
	}

	BlackBox::sync(Duration::from_secs(1));

	match result {
		Err(e) if matches!(e.downcast_ref::<ServoError>(), Some(ServoError::Cancelled)) => Ok(()),
		result => result,
	}
}

fn run(args: &ArgMatches) -> anyhow::Result<()> {
	let config_path = args.value_of(CONFIG_ARG).unwrap_or("servo_params.json");
	let servo_name = args.value_of(SERVO_ARG).unwrap_or("servo_1");

	if let Some((INIT_CONFIG_COMMAND, _)) = args.subcommand() {
		info!("Writing default parameters to {}", config_path);
		return config::save(config_path, &config::default_configs());
	}

	// Configuration
	let configs = config::read(config_path)?;
	let params = config::servo(&configs, servo_name)?;
	let mut servo = open_servo(params)?;

	match args.subcommand() {
		Some((MOVE_COMMAND, args)) => {
			let angle: f64 = args.value_of_t(ANGLE_ARG)?;

			let request = if args.is_present(WAITING_ARG) {
				SpeedRequest::Waiting {
					percent_waiting: args.value_of_t(WAITING_ARG)?,
					steps: args.value_of_t(STEPS_ARG)?,
				}
			} else {
				match args.value_of(SPEED_ARG) {
					Some(_) => SpeedRequest::Percent(args.value_of_t(SPEED_ARG)?),
					None => SpeedRequest::Percent(100.),
				}
			};

			let motion = servo.go_to_position(angle, request)?;
			info!(
				"Reached {:.1}° in {} writes ({:?} per write)",
				motion.to_angle, motion.writes, motion.delay
			);
		}
		Some((SWEEP_COMMAND, args)) => {
			let sweep = TimingSweep {
				max_steps: args.value_of_t(MAX_STEPS_ARG)?,
				settle: Duration::from_millis(args.value_of_t(SETTLE_ARG)?),
				..TimingSweep::default()
			};

			let output = args.value_of(OUTPUT_ARG).unwrap_or("time_analysis_servo.csv");
			let mut log = CalibrationLog::new(BufWriter::new(File::create(output)?), timing_sweep::HEADER)?;

			EnterStopInputController::new(servo.cancel_token()).spawn();

			let result = sweep.run(&mut servo, &mut log);
			info!("{} rows written to {}", log.rows(), output);
			result?;
		}
		Some((CALIBRATE_COMMAND, args)) => {
			let sensor_pin = match args.value_of(SENSOR_PIN_ARG) {
				Some(_) => args.value_of_t(SENSOR_PIN_ARG)?,
				None => params.sensor_pin,
			};

			let calibration = SpeedCalibration {
				settle: Duration::from_millis(args.value_of_t(SETTLE_ARG)?),
				timeout: Duration::from_secs(args.value_of_t(TIMEOUT_ARG)?),
				..SpeedCalibration::default()
			};

			let output = match args.value_of(OUTPUT_ARG) {
				Some(output) => output.to_string(),
				None => format!("data_rotation_results_{}.csv", servo_name),
			};

			let mut sensor = PhotoInterrupterInputController::new(sensor_pin)?;
			let mut log = CalibrationLog::new(BufWriter::new(File::create(&output)?), speed_calibration::HEADER)?;

			EnterStopInputController::new(servo.cancel_token()).spawn();

			let result = calibration.run(&mut servo, &mut sensor, &mut log);
			info!("{} rows written to {}", log.rows(), output);
			result?;
		}
		_ => return Err(anyhow!("Unknown command")),
	}

	servo.release()?;

	Ok(())
}

fn open_servo(params: &ServoParams) -> anyhow::Result<ServoController<Box<dyn PwmPort>>> {
	let envelope = params.envelope()?;
	let calibration = params.calibration()?;

	let port = output_controllers::open(&params.output, envelope.frequency_hz())?;

	Ok(ServoController::new(port, envelope, calibration)?)
}
