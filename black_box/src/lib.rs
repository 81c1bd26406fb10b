#[macro_use]
extern crate lazy_static;

use chrono::{DateTime, TimeZone};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::{
	collections::VecDeque,
	fmt::Display,
	fs::{File, OpenOptions},
	io,
	io::Write,
	thread,
	thread::JoinHandle,
	time::{Duration, Instant},
};

lazy_static! {
	static ref BLACK_BOX_CHANNEL: (Sender<Message>, Receiver<Message>) = unbounded::<Message>();
	static ref BLACK_BOX_LOGGER: BlackBoxLogger = BlackBoxLogger {
		start_instant: Instant::now()
	};
}

/// Messages kept while the log file cannot be written.
const MAX_PENDING_LEN: usize = 1024;

enum Message {
	Log(String),
	/// Flushes the buffer, then acknowledges through the sender if any.
	Flush(Option<Sender<()>>),
}

/// Logger writing every record to the standard output and to a log file, from a background
/// thread so that motion loops never wait on the file system.
pub struct BlackBox {
	file: File,
	buffer: VecDeque<String>,
	last_flush_instant: Instant,
}

impl BlackBox {
	/// Creates `<prefix>_<hour>-<minute>-<second>_<day>-<month>-<year>.log` in the working
	/// directory.
	pub fn new(prefix: &str) -> io::Result<Self> {
		let file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(log_file_name(prefix, &chrono::offset::Local::now()))?;

		Ok(Self::with_file(file))
	}

	pub fn with_file(file: File) -> Self {
		BlackBox {
			buffer: VecDeque::<String>::new(),
			file,
			last_flush_instant: Instant::now(),
		}
	}

	/// Drops the oldest messages while the file cannot be written.
	fn push(&mut self, message: String) {
		while self.buffer.len() >= MAX_PENDING_LEN {
			self.buffer.pop_front();
		}

		self.buffer.push_back(message);
	}

	fn try_flush(&mut self) {
		match self.flush() {
			Ok(()) => self.last_flush_instant = Instant::now(),
			Err(e) => self.push(format!("Failed to flush black box: {}", e)),
		}
	}

	/// A message is only removed from the buffer once written to the file.
	fn flush(&mut self) -> io::Result<()> {
		while let Some(message) = self.buffer.pop_front() {
			if let Err(e) = writeln!(self.file, "{}", message) {
				self.buffer.push_front(message);
				return Err(e);
			}

			println!("{}", message);
		}

		self.file.flush()
	}

	fn handle(&mut self, message: Message) {
		match message {
			Message::Log(content) => self.push(content),
			Message::Flush(ack) => {
				self.try_flush();

				if let Some(ack) = ack {
					ack.send(()).unwrap_or_default();
				}
			}
		}

		const MAX_BUFFER_LEN: usize = 8;
		const MAX_FLUSH_PERIOD: Duration = Duration::from_secs(1);

		if self.buffer.len() > MAX_BUFFER_LEN || self.last_flush_instant.elapsed() > MAX_FLUSH_PERIOD {
			self.try_flush();
		}
	}

	fn receive_loop(&mut self, receiver: &Receiver<Message>) {
		const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

		while let Ok(message) = receiver.recv_timeout(RECEIVE_TIMEOUT) {
			self.handle(message);
		}

		if !self.buffer.is_empty() {
			self.try_flush();
		}
	}

	/// Installs the logger and starts the writing thread. Fails if another logger is already
	/// installed.
	pub fn spawn(mut self, level_filter: LevelFilter) -> Result<JoinHandle<()>, SetLoggerError> {
		log::set_logger(&*BLACK_BOX_LOGGER).map(|()| log::set_max_level(level_filter))?;

		Ok(thread::spawn(move || loop {
			self.receive_loop(&BLACK_BOX_CHANNEL.1)
		}))
	}

	/// Blocks until every record logged so far is written, or `timeout` elapsed.
	pub fn sync(timeout: Duration) {
		let (ack_sender, ack_receiver) = bounded::<()>(1);

		if BLACK_BOX_CHANNEL.0.send(Message::Flush(Some(ack_sender))).is_ok() {
			ack_receiver.recv_timeout(timeout).unwrap_or_default();
		}
	}
}

fn log_file_name<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
	Tz::Offset: Display,
{
	format!("{}_{}.log", prefix, now.format("%-H-%-M-%-S_%-d-%-m-%Y"))
}

fn format_record(record: &Record, elapsed: Duration) -> String {
	if record.metadata().level() == Level::Error {
		format!(
			"[{:.3}][{:?}][{}] {} ({}:{})",
			elapsed.as_secs_f32(),
			record.level(),
			record.module_path().unwrap_or("unknown"),
			record.args(),
			record.file().unwrap_or("unknown"),
			record.line().unwrap_or(0)
		)
	} else {
		format!(
			"[{:.3}][{:?}][{}] {}",
			elapsed.as_secs_f32(),
			record.level(),
			record.module_path().unwrap_or("unknown"),
			record.args(),
		)
	}
}

/// A `Log` implementation that logs verbosely
struct BlackBoxLogger {
	start_instant: Instant,
}

impl Log for BlackBoxLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= log::max_level()
	}

	fn log(&self, record: &Record) {
		if self.enabled(record.metadata()) {
			let formatted = format_record(record, self.start_instant.elapsed());
			BLACK_BOX_CHANNEL.0.send(Message::Log(formatted)).unwrap_or_default();
		}
	}

	fn flush(&self) {
		BLACK_BOX_CHANNEL.0.send(Message::Flush(None)).unwrap_or_default();
	}
}
