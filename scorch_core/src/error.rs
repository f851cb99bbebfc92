/*!
# Scorch: Errors
*/

use cdtoc::TocError;
use crate::msg::Severity;
use crate::scsi::Sense;
use fyi_msg::Msg;
use std::{
	error::Error,
	fmt,
};



#[cfg(feature = "bin")]
/// # Help Text.
const HELP: &str = concat!(r#"
      )
     ) \      "#, "\x1b[38;5;199mScorch\x1b[0;38;5;69m v", env!("CARGO_PKG_VERSION"), "\x1b[0m", r#"
    / ) (     Incremental ISO-9660 mastering
    \(_)/     for CD, DVD, and BD media.

USAGE:
    scorch [-COMMAND [ARG...]]...

Every argument is a command. Commands run in the order given, unless -x is
present, in which case they are re-ordered into a sensible sequence first.

DRIVE COMMANDS:
    -dev ADDR         Acquire ADDR for both input and output.
    -indev ADDR       Acquire ADDR for input only.
    -outdev ADDR      Acquire ADDR for output only.
    -toc              Print the table of contents of the loaded medium.
    -blank MODE       Blank re-usable media: as_needed, fast, all,
                      deformat, deformat_quickest. Prefix "force:" to
                      override the medium status check.
    -format MODE      Format media: as_needed, full, fast, by_index_NUM,
                      by_size_NUM.
    -speed NUM        Set the write speed, e.g. 8x, max, min.
    -eject WHICH      Eject "in", "out", or "all".
    -check_media OPTS --
                      Verify readability of the medium and report damage.

IMAGE COMMANDS:
    -add PATH ... --  Insert files from disk into the image tree.
    -rm PATH ... --   Remove image nodes.
    -find PATH EXPR --
                      Walk the image tree with a test expression.
    -commit           Write pending image changes to the output drive.

GLOBAL COMMANDS:
    -abort_on SEV     Abort the run when a problem of SEV or higher occurs.
    -return_with SEV CODE
                      Exit with CODE if a problem of SEV or higher occurred.
    -pkt_output MODE  Prefix output lines with R:/I:/M: channel markers.
    -help             Print this text and exit.
    -version          Print version details and exit.

This is only a summary; each command documents its own arguments.
"#);



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Errors.
pub enum ScorchError {
	/// # Argument Count Mismatch.
	ArgCount(String, usize),

	/// # Invalid Argument Value.
	BadArgValue(String, String),

	/// # Unknown Command.
	BadCommand(String),

	/// # Invalid barcode.
	Barcode,

	/// # Blanking Unsupported on Profile.
	BlankUnsupported(&'static str),

	/// # Bug!
	Bug(&'static str),

	/// # CDTOC passthrough.
	Cdtoc(TocError),

	/// # Drive Cancel Flag Tripped.
	DriveCancelled,

	/// # Invalid device.
	Device(String),

	/// # Unable to open device.
	DeviceOpen(Option<String>),

	/// # Invalid drive model.
	DriveModel,

	/// # Invalid drive vendor.
	DriveVendor,

	/// # Find Expression Parse Failure.
	FindParse(String),

	/// # Formatting Unsupported on Profile.
	FormatUnsupported(&'static str),

	/// # Format Size Shortfall.
	FormatSize(u64, u64),

	/// # User Abort.
	Killed,

	/// # Expansion Memory Budget Exceeded.
	MemLimit,

	/// # No Drive Acquired.
	NoDrive(&'static str),

	/// # Empty Wildcard Expansion.
	NoMatch(String),

	/// # No Such Image Path.
	IsoPath(String),

	/// # Image Path Already Exists.
	IsoPathExists(String),

	/// # Image Path Is Not a Directory.
	IsoPathNotDir(String),

	/// # Null Drive Refusal.
	NullDrive,

	/// # Invalid Pattern.
	Pattern(String),

	/// # Relative Pattern Underflow.
	PatternUnderflow(String),

	/// # Track Source Ended Early.
	PrematureEoi,

	/// # Reading From Disk.
	Read(String),

	/// # SCSI Command Failure.
	Scsi(Sense),

	/// # Corrupt Sector Map File.
	SectorMap(String),

	/// # Severity Keyword.
	SeverityName(String),

	/// # Media Unsuitable For the Operation.
	Unsuitable(&'static str),

	/// # Write Beyond the Permitted LBA Range.
	WriteBeyondLimit(i32, i32),

	/// # Writing to Disk.
	Write(String),

	#[cfg(feature = "bin")]
	/// # Invalid CLI arg.
	CliArg(String),

	#[cfg(feature = "bin")]
	/// # CLI Parsing failure.
	CliParse(&'static str),

	#[cfg(feature = "bin")]
	/// # Print Help (Not an Error).
	PrintHelp,

	#[cfg(feature = "bin")]
	/// # Print Version (Not an Error).
	PrintVersion,
}

impl Error for ScorchError {}

impl From<TocError> for ScorchError {
	#[inline]
	fn from(err: TocError) -> Self { Self::Cdtoc(err) }
}

impl From<ScorchError> for Msg {
	#[inline]
	fn from(src: ScorchError) -> Self { Self::error(src.to_string()) }
}

impl ScorchError {
	#[must_use]
	/// # Matching Event Severity.
	///
	/// Most errors surface as `Failure`; the handful that poison the drive
	/// or the run escalate to `Fatal`.
	pub const fn severity(&self) -> Severity {
		match self {
			Self::Bug(_) |
			Self::DriveCancelled |
			Self::WriteBeyondLimit(_, _) => Severity::Fatal,
			Self::NoMatch(_) |
			Self::FormatSize(_, _) |
			Self::FormatUnsupported(_) |
			Self::BlankUnsupported(_) |
			Self::Unsuitable(_) => Severity::Sorry,
			Self::Killed => Severity::Abort,
			_ => Severity::Failure,
		}
	}
}

impl fmt::Display for ScorchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ArgCount(s, n) =>
				if *n == 1 { write!(f, "Command {s} expects 1 argument.") }
				else { write!(f, "Command {s} expects {n} arguments.") },
			Self::BadArgValue(c, a) => write!(f, "Unusable argument {a} for command {c}."),
			Self::BadCommand(s) => write!(f, "Not a known command: {s}."),
			Self::Barcode => f.write_str("Invalid/unsupported barcode."),
			Self::BlankUnsupported(p) => write!(f, "Blanking is not possible with {p} media."),
			Self::Bug(s) => write!(f, "Bug: {s}."),
			Self::Cdtoc(s) => write!(f, "{s}"),
			Self::DriveCancelled => f.write_str("The drive has entered cancel mode; no further commands will be issued."),
			Self::Device(s) => write!(f, "Invalid device path {s}."),
			Self::DeviceOpen(s) =>
				if let Some(s) = s { write!(f, "Unable to open connection with {s}.") }
				else {
					f.write_str("Unable to open connection with default optical drive.")
				},
			Self::DriveModel => f.write_str("Invalid drive model."),
			Self::DriveVendor => f.write_str("Invalid drive vendor."),
			Self::FindParse(s) => write!(f, "Unparsable find expression near {s}."),
			Self::FormatUnsupported(p) => write!(f, "Formatting is not possible with {p} media."),
			Self::FormatSize(want, have) => write!(
				f,
				"Requested format size of {want} bytes exceeds the {have} available.",
			),
			Self::Killed => f.write_str("User abort."),
			Self::MemLimit => f.write_str("Pattern expansion exceeded the temporary memory budget."),
			Self::NoDrive(which) => write!(f, "No {which} drive has been acquired."),
			Self::NoMatch(s) => write!(f, "Nothing matches pattern {s}."),
			Self::IsoPath(s) => write!(f, "No such node in the image tree: {s}."),
			Self::IsoPathExists(s) => write!(f, "The image tree already has a node at {s}."),
			Self::IsoPathNotDir(s) => write!(f, "Not a directory in the image tree: {s}."),
			Self::NullDrive => f.write_str("The null drive accepts no commands."),
			Self::Pattern(s) => write!(f, "Invalid pattern {s}."),
			Self::PatternUnderflow(s) => write!(f, "Pattern {s} climbs above the root directory."),
			Self::PrematureEoi => f.write_str("The track source ended before its fixed size was delivered."),
			Self::Read(s) => write!(f, "Unable to read from {s}."),
			Self::Scsi(sense) => write!(f, "SCSI failure: {sense}"),
			Self::SectorMap(s) => write!(f, "Not a usable sector map file: {s}."),
			Self::SeverityName(s) => write!(f, "Not a severity keyword: {s}."),
			Self::Unsuitable(op) => write!(f, "The loaded medium is unsuitable for {op}."),
			Self::WriteBeyondLimit(start, limit) => write!(
				f,
				"Refusing to write at LBA {start}: the permitted range ends at {limit}.",
			),
			Self::Write(s) => write!(f, "Unable to write to {s}."),

			#[cfg(feature = "bin")]
			Self::CliArg(s) => write!(f, "Invalid CLI option: {s}"),

			#[cfg(feature = "bin")]
			Self::CliParse(s) => write!(f, "Unable to parse {s}."),

			#[cfg(feature = "bin")]
			Self::PrintHelp => f.write_str(HELP),

			#[cfg(feature = "bin")]
			Self::PrintVersion => f.write_str(concat!("Scorch v", env!("CARGO_PKG_VERSION"))),
		}
	}
}
