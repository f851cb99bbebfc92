/*!
# Scorch: Message Outpost

All user-visible output funnels through a per-context hub with two channels:
result (the answers) and info (the diagnostics), plus a mark string that is
echoed after every command when non-empty. Frontends can flip on packet mode
to get machine-parsable `R:`/`I:`/`M:` prefixes instead of plain lines.
*/

use crate::ScorchError;
use fyi_msg::Msg;
use std::{
	fmt,
	fs::OpenOptions,
	io::Write,
	path::{
		Path,
		PathBuf,
	},
	sync::{
		Arc,
		Mutex,
		mpsc,
	},
};
use utc2k::Utc2k;



#[derive(Debug, Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
/// # Event Severity.
///
/// Ordered lowest to highest. Two thresholds hang off this scale: the
/// abort threshold (stop the whole run) and the return threshold (pick the
/// process exit code).
pub enum Severity {
	#[default]
	/// # Debugging Chatter.
	Debug,

	/// # Progress Update.
	Update,

	/// # Worth Knowing.
	Note,

	/// # Something Looks Off.
	Warning,

	/// # A Request Failed, Gently.
	Sorry,

	/// # A Request Failed.
	Failure,

	/// # The Drive or Run Is Poisoned.
	Fatal,

	/// # Stop Everything.
	Abort,
}

impl fmt::Display for Severity {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Severity {
	/// # All Severities, Ascending.
	pub const ALL: [Self; 8] = [
		Self::Debug, Self::Update, Self::Note, Self::Warning,
		Self::Sorry, Self::Failure, Self::Fatal, Self::Abort,
	];

	#[must_use]
	/// # As String Slice.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Debug => "DEBUG",
			Self::Update => "UPDATE",
			Self::Note => "NOTE",
			Self::Warning => "WARNING",
			Self::Sorry => "SORRY",
			Self::Failure => "FAILURE",
			Self::Fatal => "FATAL",
			Self::Abort => "ABORT",
		}
	}

	/// # From Keyword.
	///
	/// Parse a (case-insensitive) severity keyword.
	///
	/// ## Errors
	///
	/// This will return an error if the keyword isn't on the scale.
	pub fn from_keyword(raw: &str) -> Result<Self, ScorchError> {
		let raw = raw.trim();
		for sev in Self::ALL {
			if raw.eq_ignore_ascii_case(sev.as_str()) { return Ok(sev); }
		}
		Err(ScorchError::SeverityName(raw.to_owned()))
	}

	/// # Render as a Console Message.
	fn msg(self, text: &str) -> Msg {
		match self {
			Self::Debug => Msg::custom("Debug", 8, text),
			Self::Update => Msg::custom("Update", 4, text),
			Self::Note => Msg::custom("Note", 6, text),
			Self::Warning => Msg::warning(text),
			Self::Sorry => Msg::custom("Sorry", 208, text),
			Self::Failure => Msg::error(text),
			Self::Fatal => Msg::custom("Fatal", 196, text),
			Self::Abort => Msg::custom("Abort", 196, text),
		}
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Output Channel.
enum Channel {
	/// # Result Lines.
	Result,

	/// # Diagnostics.
	Info,

	/// # The Post-Command Mark.
	Mark,
}

impl Channel {
	/// # Packet Prefix Letter.
	const fn letter(self) -> char {
		match self {
			Self::Result => 'R',
			Self::Info => 'I',
			Self::Mark => 'M',
		}
	}
}



/// # A Queued Line.
#[derive(Debug)]
struct Packet {
	/// # Where It Goes.
	channel: Channel,

	/// # Severity (Info Only).
	severity: Severity,

	/// # The Line Itself.
	text: String,
}



/// # Mutable Hub State.
#[derive(Debug)]
struct OutpostState {
	/// # Receiving End of the Queue.
	rx: mpsc::Receiver<Packet>,

	/// # Highest Severity Since the Last Reset.
	problem_status: Severity,

	/// # Highest Severity Ever.
	eternal_status: Severity,

	/// # Mark String.
	mark: String,

	/// # Packet Mode?
	pkt_output: bool,

	/// # Session Log Destination.
	session_log: Option<PathBuf>,

	/// # Error File Log Destination.
	errfile_log: Option<PathBuf>,
}



#[derive(Debug, Clone)]
/// # Message Outpost.
///
/// Cheap to clone; all clones feed the same queue. Exactly one place —
/// the owning shell, or a background watcher — should call [`Outpost::drain`]
/// to actually print things.
pub struct Outpost {
	/// # Sending End of the Queue.
	tx: mpsc::Sender<Packet>,

	/// # Everything Else.
	state: Arc<Mutex<OutpostState>>,
}

impl Default for Outpost {
	fn default() -> Self {
		let (tx, rx) = mpsc::channel();
		Self {
			tx,
			state: Arc::new(Mutex::new(OutpostState {
				rx,
				problem_status: Severity::Debug,
				eternal_status: Severity::Debug,
				mark: String::new(),
				pkt_output: false,
				session_log: None,
				errfile_log: None,
			})),
		}
	}
}

/// # Submission.
impl Outpost {
	/// # Queue a Result Line.
	pub fn result<S>(&self, text: S)
	where S: Into<String> {
		let _res = self.tx.send(Packet {
			channel: Channel::Result,
			severity: Severity::Debug,
			text: text.into(),
		});
	}

	/// # Queue a Diagnostic.
	///
	/// The severity is folded into the running problem status as a side
	/// effect.
	pub fn info<S>(&self, severity: Severity, text: S)
	where S: Into<String> {
		self.record(severity);
		let _res = self.tx.send(Packet {
			channel: Channel::Info,
			severity,
			text: text.into(),
		});
	}

	/// # Queue an Error.
	///
	/// Shorthand for [`Outpost::info`] with the error's own severity.
	pub fn oops(&self, err: &ScorchError) {
		self.info(err.severity(), err.to_string());
	}

	/// # Queue the Mark, If Any.
	pub fn mark(&self) {
		let mark = match self.state.lock() {
			Ok(state) => state.mark.clone(),
			Err(_) => return,
		};
		if ! mark.is_empty() {
			let _res = self.tx.send(Packet {
				channel: Channel::Mark,
				severity: Severity::Debug,
				text: mark,
			});
		}
	}

	/// # Record a Severity Without a Message.
	pub fn record(&self, severity: Severity) {
		if let Ok(mut state) = self.state.lock() {
			if state.problem_status < severity { state.problem_status = severity; }
			if state.eternal_status < severity { state.eternal_status = severity; }
		}
	}
}

/// # Draining.
impl Outpost {
	/// # Print Everything Queued So Far.
	///
	/// Result lines go to STDOUT, diagnostics to STDERR, unless packet mode
	/// is on, in which case everything goes to STDOUT with channel
	/// prefixes.
	pub fn drain(&self) {
		let Ok(state) = self.state.lock() else { return; };
		while let Ok(packet) = state.rx.try_recv() {
			if state.pkt_output {
				println!("{}:1: {}", packet.channel.letter(), packet.text);
			}
			else {
				match packet.channel {
					Channel::Result => println!("{}", packet.text),
					Channel::Info => packet.severity.msg(&packet.text).eprint(),
					Channel::Mark => println!("{}", packet.text),
				}
			}
		}
	}

	/// # Background Watcher.
	///
	/// Spawn a thread that drains the queue four times a second until the
	/// kill switch flips. Useful while a long burn or blank holds the main
	/// thread hostage.
	#[must_use]
	pub fn watch(&self, killed: &crate::KillSwitch) -> std::thread::JoinHandle<()> {
		let outpost = self.clone();
		let killed = killed.clone();
		std::thread::spawn(move || {
			while ! killed.killed() {
				outpost.drain();
				std::thread::sleep(std::time::Duration::from_millis(250));
			}
			outpost.drain();
		})
	}
}

/// # Status Accounting.
impl Outpost {
	#[must_use]
	/// # Highest Severity Since the Last Reset.
	pub fn problem_status(&self) -> Severity {
		self.state.lock().map_or(Severity::Debug, |s| s.problem_status)
	}

	/// # Reset the Per-Command Status, Returning the Old Value.
	pub fn take_problem_status(&self) -> Severity {
		self.state.lock().map_or(Severity::Debug, |mut s| {
			std::mem::take(&mut s.problem_status)
		})
	}

	#[must_use]
	/// # Highest Severity Ever.
	pub fn eternal_status(&self) -> Severity {
		self.state.lock().map_or(Severity::Debug, |s| s.eternal_status)
	}
}

/// # Settings.
impl Outpost {
	/// # Set the Mark String.
	pub fn set_mark<S>(&self, mark: S)
	where S: Into<String> {
		if let Ok(mut state) = self.state.lock() { state.mark = mark.into(); }
	}

	/// # Toggle Packet Mode.
	pub fn set_pkt_output(&self, yes: bool) {
		if let Ok(mut state) = self.state.lock() { state.pkt_output = yes; }
	}

	/// # Set (or Clear) the Session Log Path.
	pub fn set_session_log(&self, path: Option<PathBuf>) {
		if let Ok(mut state) = self.state.lock() { state.session_log = path; }
	}

	/// # Set (or Clear) the Error File Log Path.
	pub fn set_errfile_log(&self, path: Option<PathBuf>) {
		if let Ok(mut state) = self.state.lock() { state.errfile_log = path; }
	}
}

/// # Logging.
impl Outpost {
	/// # Record a Successful Write.
	///
	/// One whitespace-separated line per session: timestamp, start LBA,
	/// sector count, volume id.
	pub fn log_session(&self, start_lba: i32, sectors: i32, volid: &str) {
		let Some(path) = self.state.lock().ok().and_then(|s| s.session_log.clone())
			else { return; };
		let line = format!("{} {start_lba} {sectors} {volid}\n", Utc2k::now());
		if append_line(&path, &line).is_err() {
			self.info(
				Severity::Warning,
				format!("Unable to extend the session log at {}.", path.display()),
			);
		}
	}

	/// # Record a Problem File.
	///
	/// One line per event: the `ERRFILE` tag, then a shell-safe rendering
	/// of the path that triggered it.
	pub fn log_errfile(&self, severity: Severity, path: &Path) {
		let Some(log) = self.state.lock().ok().and_then(|s| s.errfile_log.clone())
			else { return; };
		let line = format!(
			"ERRFILE {} {}\n",
			severity.as_str(),
			shell_quote(&path.to_string_lossy()),
		);
		let _res = append_line(&log, &line);
	}
}



/// # Append One Line to a Log File.
fn append_line(path: &Path, line: &str) -> Result<(), ScorchError> {
	OpenOptions::new()
		.create(true)
		.append(true)
		.open(path)
		.and_then(|mut file| file.write_all(line.as_bytes()))
		.map_err(|_| ScorchError::Write(path.to_string_lossy().into_owned()))
}

/// # Shell-Safe Path Rendering.
///
/// Wrap in single quotes when anything scary is present, escaping embedded
/// single quotes the Bourne way.
pub(crate) fn shell_quote(raw: &str) -> String {
	if ! raw.is_empty() && raw.bytes().all(|b|
		b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'-' | b'_' | b'+' | b':' | b',' | b'@')
	) {
		raw.to_owned()
	}
	else {
		let mut out = String::with_capacity(raw.len() + 2);
		out.push('\'');
		for c in raw.chars() {
			if c == '\'' { out.push_str("'\\''"); }
			else { out.push(c); }
		}
		out.push('\'');
		out
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_severity_order() {
		// The scale must be strictly ascending or the thresholds fall apart.
		for pair in Severity::ALL.windows(2) {
			assert!(pair[0] < pair[1], "Severity scale out of order.");
		}
		assert_eq!(Severity::from_keyword("failure"), Ok(Severity::Failure));
		assert_eq!(Severity::from_keyword(" SORRY "), Ok(Severity::Sorry));
		assert!(Severity::from_keyword("MEDIOCRE").is_err());
	}

	#[test]
	fn t_problem_status() {
		let outpost = Outpost::default();
		assert_eq!(outpost.problem_status(), Severity::Debug);

		outpost.record(Severity::Note);
		outpost.record(Severity::Sorry);
		outpost.record(Severity::Update);
		assert_eq!(outpost.problem_status(), Severity::Sorry);
		assert_eq!(outpost.take_problem_status(), Severity::Sorry);

		// The per-command status resets; the eternal one sticks.
		assert_eq!(outpost.problem_status(), Severity::Debug);
		assert_eq!(outpost.eternal_status(), Severity::Sorry);
	}

	#[test]
	fn t_shell_quote() {
		assert_eq!(shell_quote("/plain/path.iso"), "/plain/path.iso");
		assert_eq!(shell_quote("has space"), "'has space'");
		assert_eq!(shell_quote("it's"), "'it'\\''s'");
		assert_eq!(shell_quote(""), "''");
	}
}
