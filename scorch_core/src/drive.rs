/*!
# Scorch: Drives and Media

One `Drive` owns one acquired device — real or pseudo — together with
everything learned about the loaded medium: profile, status, session/track
layout, feature cache, format descriptors, and write-pacing state. Most of
it is lazily populated by the MMC conversation during acquisition.
*/

use bitflags::bitflags;
use cdtoc::Toc;
use crate::{
	CD_LEADIN,
	Command,
	Pacer,
	ScorchError,
	ScsiBuffer,
	DriveRole,
	profile,
	transport::{
		StdioDrive,
		Transport,
	},
};
use std::{
	fmt,
	path::Path,
	sync::Mutex,
};
use trimothy::NormalizeWhitespace;



/// # Max Drive Vendor Length.
const DRIVE_VENDOR_LEN: usize = 8;

/// # Max Drive Model Length.
const DRIVE_MODEL_LEN: usize = 16;

/// # Address Prefix for Pseudo-Drives.
const STDIO_PREFIX: &str = "stdio:";

/// # Profile Code for Pseudo-Drives.
const STDIO_PROFILE: u16 = 0xFFFF;



bitflags! {
	#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
	/// # Which Disc-Info Fields Came Back Valid.
	pub(crate) struct DiscInfoValid: u8 {
		/// # Disc Status Byte.
		const STATUS = 1;

		/// # Erasable Bit.
		const ERASABLE = 1 << 1;

		/// # Disc ID.
		const DISC_ID = 1 << 2;

		/// # Bar Code.
		const BAR_CODE = 1 << 3;

		/// # Application Code.
		const APP_CODE = 1 << 4;

		/// # Unrestricted Use Bit.
		const URU = 1 << 5;
	}
}

bitflags! {
	#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
	/// # Particularly Memorable Errors.
	///
	/// A sticky record of the error classes that change how later commands
	/// are interpreted or reported.
	pub(crate) struct ParticularError: u8 {
		/// # A Fatal Sense Arrived.
		const FATAL_SENSE = 1;

		/// # A Write Aimed Past the Permitted Range.
		const LBA_LIMIT = 1 << 1;

		/// # A Command Timed Out.
		const TIMEOUT = 1 << 2;
	}
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Media Status.
pub enum MediaStatus {
	/// # Nothing Learned Yet (Or Drive Not Ready).
	#[default]
	Unready,

	/// # No Medium.
	Empty,

	/// # Blank Medium.
	Blank,

	/// # Writable, With Existing Sessions.
	Appendable,

	/// # Closed (or Read-Only) Medium.
	Full,

	/// # Present But Unusable For the Requested Role.
	Unsuitable,
}

impl fmt::Display for MediaStatus {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Unready => "is not ready",
			Self::Empty => "is absent",
			Self::Blank => "is blank",
			Self::Appendable => "is written , is appendable",
			Self::Full => "is written , is closed",
			Self::Unsuitable => "is not usable in this drive",
		})
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # One (Possibly Synthesized) TOC Entry.
pub struct TocEntry {
	/// # Session Number.
	pub session: u8,

	/// # Point: Track Number, or 0xA2 For a Lead-Out.
	pub point: u8,

	/// # Control Nibble.
	pub control: u8,

	/// # Start LBA.
	pub start_lba: i32,

	/// # Size in Blocks (Zero For Lead-Outs).
	pub track_blocks: i32,
}

impl TocEntry {
	#[must_use]
	/// # Is This a Lead-Out Marker?
	pub const fn is_leadout(&self) -> bool { self.point == 0xA2 }

	#[must_use]
	/// # Audio Track?
	pub const fn is_audio(&self) -> bool { self.control & 0x04 == 0 }
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # One Format Descriptor.
pub(crate) struct FormatDescr {
	/// # Format Type.
	pub(crate) ftype: u8,

	/// # Capacity in Bytes.
	pub(crate) size: u64,

	/// # Type-Dependent Parameter.
	pub(crate) tdp: u32,
}



#[derive(Debug, Clone)]
/// # Cached GET CONFIGURATION Results.
pub(crate) struct Features {
	/// # Feature 21h (Incremental Streaming) Present?
	pub(crate) f21h: bool,

	/// # Link Size From Feature 21h.
	pub(crate) link_size: u8,

	/// # Raw Feature 23h Bytes (BD Format Capabilities).
	pub(crate) f23h: Vec<u8>,

	/// # Feature 2Fh Byte 4 (DVD±RW Write Capabilities).
	pub(crate) f2fh_byte4: u8,

	/// # Physical Interface Standard Code.
	pub(crate) phys_if_std: u32,

	/// # Physical Interface Name.
	pub(crate) phys_if_name: &'static str,

	/// # Every Profile the Drive Announced.
	pub(crate) all_profiles: [bool; 256],
}

impl Default for Features {
	fn default() -> Self {
		Self {
			f21h: false,
			link_size: 0,
			f23h: Vec::new(),
			f2fh_byte4: 0,
			phys_if_std: 0,
			phys_if_name: "",
			all_profiles: [false; 256],
		}
	}
}



#[derive(Debug)]
/// # An Acquired Drive.
pub struct Drive {
	/// # Address As Given.
	pub(crate) addr: String,

	/// # Role.
	pub(crate) role: DriveRole,

	/// # The Wire (or File) Underneath.
	///
	/// Exactly one CDB may be in flight per drive; the mutex is the
	/// enforcement, not the suggestion.
	pub(crate) transport: Mutex<Transport>,

	/// # Vendor/Model, When Knowable.
	pub(crate) vendor_model: Option<DriveVendorModel>,

	/// # Current Profile Code.
	pub(crate) current_profile: u16,

	/// # Was the Profile Guessed (MMC-1 Fallback)?
	pub(crate) profile_guessed: bool,

	/// # Media Status.
	pub(crate) status: MediaStatus,

	/// # Erasable Medium?
	pub(crate) erasable: bool,

	/// # Disc Type Byte From READ DISC INFORMATION.
	pub(crate) disc_type: u8,

	/// # Background Format Status (DVD+RW).
	pub(crate) bg_format_status: u8,

	/// # Start of the Last Session's Lead-In (-150 If Unknown).
	pub(crate) last_leadin: i32,

	/// # Start of the Lead-Out.
	pub(crate) last_leadout: i32,

	/// # Remaining Writable Capacity (Blocks).
	pub(crate) media_capacity_remaining: u64,

	/// # Hard Upper Write Bound (0 = None).
	pub(crate) media_lba_limit: i32,

	/// # READ CAPACITY Result (Blocks).
	pub(crate) read_capacity: u32,

	/// # State of the Last Session.
	pub(crate) state_of_last_session: u8,

	/// # Complete Session Count.
	pub(crate) complete_sessions: u32,

	/// # Incomplete Session Count.
	pub(crate) incomplete_sessions: u32,

	/// # Highest Track Number.
	pub(crate) last_track_no: u8,

	/// # The (Possibly Fabricated) TOC.
	pub(crate) toc: Vec<TocEntry>,

	/// # Feature Cache.
	pub(crate) features: Features,

	/// # Format Descriptors (≤32).
	pub(crate) formats: Vec<FormatDescr>,

	/// # Current/Maximum Capacity Descriptor Type (1/2/3).
	pub(crate) format_descr_type: u8,

	/// # Current/Maximum Capacity in Bytes.
	pub(crate) format_curr_max_size: u64,

	/// # Best Descriptor Type for the Last Wanted Format.
	pub(crate) best_format_type: Option<u8>,

	/// # Size of Said Descriptor, In Bytes.
	pub(crate) best_format_size: u64,

	/// # Cached Speed Descriptors: (end_lba, write kB/s, read kB/s).
	pub(crate) speed_descriptors: Vec<(i32, u32, u32)>,

	/// # Write Pacing State.
	pub(crate) pacer: Pacer,

	/// # Use WRITE(12) Streaming Past This LBA?
	pub(crate) do_stream_recording: bool,

	/// # First Streamed LBA.
	pub(crate) stream_recording_start: u32,

	/// # A CLOSE SESSION Is Owed.
	pub(crate) needs_close_session: bool,

	/// # A SYNCHRONIZE CACHE Is Owed.
	pub(crate) needs_sync_cache: bool,

	/// # Swallow SCSI Error Chatter?
	pub(crate) silent_on_scsi_error: bool,

	/// # Sticky Error Record.
	pub(crate) particular: ParticularError,

	/// # Poisoned?
	pub(crate) cancel: bool,

	/// # Disc ID.
	pub(crate) disc_id: u32,

	/// # Bar Code Bytes.
	pub(crate) bar_code: Option<[u8; 8]>,

	/// # Application Code.
	pub(crate) app_code: u8,

	/// # Which Disc-Info Fields Are Trustworthy.
	pub(crate) disc_info_valid: DiscInfoValid,

	/// # Upcoming-Track Damage: Bit 0 = Damage, Bit 1 = NWA Valid.
	pub(crate) next_track_damaged: u8,

	/// # Run Optimum Power Calibration Before Writing?
	pub(crate) do_opc: bool,

	/// # Message Hub.
	pub(crate) outpost: crate::Outpost,
}

impl Drive {
	/// # The Null Drive.
	///
	/// Accepts no commands, reads nothing, writes nothing. Useful as a
	/// stand-in and for tests.
	#[must_use]
	pub fn null() -> Self {
		Self::raw(String::new(), DriveRole::Null, Transport::Null)
	}

	/// # Acquire a Drive.
	///
	/// `stdio:`-prefixed addresses open regular files as pseudo-drives;
	/// anything else is treated as an MMC device path. For MMC drives the
	/// whole media conversation — configuration, disc info, TOC, formats,
	/// capacity, performance — runs before this returns.
	///
	/// ## Errors
	///
	/// This will return an error if the device cannot be opened.
	pub fn acquire(addr: &str, write_role: bool) -> Result<Self, ScorchError> {
		if let Some(path) = addr.strip_prefix(STDIO_PREFIX) {
			Self::acquire_stdio(addr, path, write_role)
		}
		else {
			let cdio = crate::LibcdioInstance::new(Some(Path::new(addr)))?;
			let vendor_model = cdio.drive_vendor_model();
			let mut out = Self::raw(
				addr.to_owned(),
				DriveRole::Mmc,
				Transport::Mmc(cdio),
			);
			out.vendor_model = vendor_model;
			out.refresh_media_state()?;
			Ok(out)
		}
	}

	/// # Acquire a Stdio Pseudo-Drive.
	fn acquire_stdio(addr: &str, path: &str, write_role: bool)
	-> Result<Self, ScorchError> {
		let path = Path::new(path);
		let role =
			if write_role { DriveRole::StdioRw }
			else if path.exists() { DriveRole::StdioRo }
			else {
				return Err(ScorchError::Device(addr.to_owned()));
			};
		let stdio = StdioDrive::open(path, role)?;
		let sectors = stdio.sectors();

		let mut out = Self::raw(addr.to_owned(), role, Transport::Stdio(stdio));
		out.current_profile = STDIO_PROFILE;
		out.read_capacity = sectors;
		out.last_leadout = i32::try_from(sectors).unwrap_or(i32::MAX);
		out.erasable = write_role;
		out.status =
			if sectors == 0 { MediaStatus::Blank }
			else if write_role { MediaStatus::Appendable }
			else { MediaStatus::Full };
		if 0 < sectors {
			out.complete_sessions = 1;
			out.last_track_no = 1;
			out.toc = vec![
				TocEntry {
					session: 1,
					point: 1,
					control: 0x04,
					start_lba: 0,
					track_blocks: out.last_leadout,
				},
				TocEntry {
					session: 1,
					point: 0xA2,
					control: 0x04,
					start_lba: out.last_leadout,
					track_blocks: 0,
				},
			];
		}
		Ok(out)
	}

	/// # Bare Construction.
	fn raw(addr: String, role: DriveRole, transport: Transport) -> Self {
		Self {
			addr,
			role,
			transport: Mutex::new(transport),
			vendor_model: None,
			current_profile: 0,
			profile_guessed: false,
			status: MediaStatus::Unready,
			erasable: false,
			disc_type: 0,
			bg_format_status: 0,
			last_leadin: -150,
			last_leadout: 0,
			media_capacity_remaining: 0,
			media_lba_limit: 0,
			read_capacity: 0,
			state_of_last_session: 0,
			complete_sessions: 0,
			incomplete_sessions: 0,
			last_track_no: 0,
			toc: Vec::new(),
			features: Features::default(),
			formats: Vec::new(),
			format_descr_type: 0,
			format_curr_max_size: 0,
			best_format_type: None,
			best_format_size: 0,
			speed_descriptors: Vec::new(),
			pacer: Pacer::default(),
			do_stream_recording: false,
			stream_recording_start: 0,
			needs_close_session: false,
			needs_sync_cache: false,
			silent_on_scsi_error: false,
			particular: ParticularError::empty(),
			cancel: false,
			disc_id: 0,
			bar_code: None,
			app_code: 0,
			disc_info_valid: DiscInfoValid::empty(),
			next_track_damaged: 0,
			do_opc: false,
			outpost: crate::Outpost::default(),
		}
	}

	/// # Wire Up a Message Hub.
	///
	/// Drives report through their own outpost clone so command internals
	/// can narrate without dragging the shell along.
	pub fn set_outpost(&mut self, outpost: crate::Outpost) {
		self.outpost = outpost;
	}

	/// # Release the Drive.
	///
	/// Flush anything owed, optionally eject, and drop the handle.
	///
	/// ## Errors
	///
	/// This will return an error if an owed sync or the eject fails.
	pub fn release(mut self, eject: bool) -> Result<(), ScorchError> {
		if self.role == DriveRole::Mmc {
			if self.needs_sync_cache && ! self.cancel {
				self.sync_cache()?;
			}
			if eject { self.eject()?; }
		}
		else if self.role.writeable() {
			let transport = self.transport.lock()
				.map_err(|_| ScorchError::Bug("Transport mutex poisoned."))?;
			if let Some(stdio) = transport.stdio() { stdio.sync()?; }
		}
		Ok(())
	}

	/// # Pretend the Medium Is Full.
	///
	/// Used by forced blanking: overriding the status check lets a stuck
	/// medium be deformatted regardless of what it claims to be.
	pub fn pretend_full(&mut self) {
		self.status = MediaStatus::Full;
	}
}

/// # Wire Access.
impl Drive {
	/// # Issue One Command.
	///
	/// The single chokepoint for CDBs: the cancel flag is honored, the
	/// transport mutex taken, and the command's outcome recorded in place.
	///
	/// ## Errors
	///
	/// This will return an error if the drive is poisoned, holds a non-MMC
	/// role, or the transport malfunctions. A drive-reported failure is
	/// *not* an error here; inspect the command.
	pub(crate) fn issue(&self, cmd: &mut Command, buf: &mut ScsiBuffer)
	-> Result<(), ScorchError> {
		if self.cancel { return Err(ScorchError::DriveCancelled); }
		let transport = self.transport.lock()
			.map_err(|_| ScorchError::Bug("Transport mutex poisoned."))?;
		transport.issue(cmd, buf)
	}

	/// # Issue, Expecting Success.
	///
	/// ## Errors
	///
	/// This will return an error if the issue malfunctions *or* the drive
	/// reports a failure of any kind.
	pub(crate) fn issue_ok(&self, cmd: &mut Command, buf: &mut ScsiBuffer)
	-> Result<(), ScorchError> {
		self.issue(cmd, buf)?;
		if cmd.failed() {
			Err(ScorchError::Scsi(cmd.sense().unwrap_or_default()))
		}
		else { Ok(()) }
	}
}

/// # Status Derivation.
impl Drive {
	/// # Normalize the Freshly-Read Status.
	///
	/// Applied after READ DISC INFORMATION has been parsed:
	///
	/// * ROM profiles force `Full` and non-erasable.
	/// * Overwriteable profiles always present as `Blank`, whatever their
	///   background-format state says.
	/// * A sequential BD-R with one empty open session is `Blank` too.
	pub(crate) fn normalize_status(&mut self) {
		match self.current_profile {
			0x0008 | 0x0010 | 0x0040 | 0x0042 => {
				self.status = MediaStatus::Full;
				self.erasable = false;
			},
			p if profile::profile_is_overwriteable(p) => {
				self.status = MediaStatus::Blank;
				self.erasable = true;
			},
			0x0041 if self.status == MediaStatus::Appendable &&
				self.read_capacity == 0 &&
				self.state_of_last_session == 0 &&
				self.complete_sessions + self.incomplete_sessions == 1 => {
				self.status = MediaStatus::Blank;
			},
			_ => {},
		}
	}

	/// # Resolve a Guessed Profile.
	///
	/// For drives that answered GET CONFIGURATION with (5,20,00).
	pub(crate) fn guess_profile(&mut self) {
		self.current_profile = profile::profile_guess(self.status, self.erasable);
		self.profile_guessed = true;
	}
}

/// # Accessors.
impl Drive {
	#[must_use]
	/// # Address.
	pub fn addr(&self) -> &str { &self.addr }

	#[must_use]
	/// # Role.
	pub const fn role(&self) -> DriveRole { self.role }

	#[must_use]
	/// # Current Profile Code.
	pub const fn profile(&self) -> u16 { self.current_profile }

	#[must_use]
	/// # Profile Display Name.
	pub fn profile_name(&self) -> &'static str {
		profile::profile_name(self.current_profile)
	}

	#[must_use]
	/// # Media Status.
	pub const fn status(&self) -> MediaStatus { self.status }

	#[must_use]
	/// # Erasable?
	pub const fn erasable(&self) -> bool { self.erasable }

	#[must_use]
	/// # Poisoned?
	pub const fn cancelled(&self) -> bool { self.cancel }

	#[must_use]
	/// # The TOC.
	pub fn toc(&self) -> &[TocEntry] { &self.toc }

	#[must_use]
	/// # Upcoming-Track Damage Bits.
	pub const fn next_track_damaged(&self) -> u8 { self.next_track_damaged }

	/// # Set the Hard Write Bound.
	pub fn set_media_lba_limit(&mut self, limit: i32) {
		self.media_lba_limit = limit;
	}

	/// # Toggle Stream Recording.
	pub fn set_stream_recording(&mut self, yes: bool, start: u32) {
		self.do_stream_recording = yes;
		self.stream_recording_start = start;
	}
}

/// # Reporting.
impl Drive {
	/// # TOC Report Lines.
	///
	/// One line per track plus a summary header, in the shape `-toc`
	/// prints. CD media with a fully-audio layout also get a CDTOC id
	/// line, because those are handy to paste elsewhere.
	#[must_use]
	pub fn toc_report(&self) -> Vec<String> {
		let mut out = Vec::new();
		out.push(format!(
			"Media current: {}{}",
			self.profile_name(),
			if self.profile_guessed { " (guessed)" } else { "" },
		));
		out.push(format!("Media status : {}", self.status));

		if self.status == MediaStatus::Blank {
			out.push("Media blank".to_owned());
			return out;
		}

		out.push(format!(
			"Media summary: {} session{}, {} track{}, {} blocks",
			self.complete_sessions,
			if self.complete_sessions == 1 { "" } else { "s" },
			self.last_track_no,
			if self.last_track_no == 1 { "" } else { "s" },
			self.last_leadout,
		));

		for entry in &self.toc {
			if entry.is_leadout() {
				out.push(format!(
					"Session {:>2}: leadout at {:>8}",
					entry.session, entry.start_lba,
				));
			}
			else {
				out.push(format!(
					"Track   {:>2}: session {:>2} , {} , lba {:>8} , {:>8} blocks",
					entry.point,
					entry.session,
					if entry.is_audio() { "audio" } else { "data " },
					entry.start_lba,
					entry.track_blocks,
				));
			}
		}

		if let Some(line) = self.cdtoc_line() { out.push(line); }
		out
	}

	/// # CDTOC Identity Line.
	///
	/// Only applies to CD profiles where every track is audio.
	fn cdtoc_line(&self) -> Option<String> {
		if ! profile::profile_is_cd(self.current_profile) { return None; }

		let mut audio: Vec<u32> = Vec::new();
		let mut leadout: u32 = 0;
		for entry in &self.toc {
			if entry.is_leadout() {
				leadout = u32::try_from(entry.start_lba).ok()? + CD_LEADIN;
			}
			else if entry.is_audio() {
				audio.push(u32::try_from(entry.start_lba).ok()? + CD_LEADIN);
			}
			else { return None; }
		}
		if audio.is_empty() || leadout == 0 { return None; }

		let toc = Toc::from_parts(audio, None, leadout).ok()?;
		Some(format!("Media id     : CDTOC {toc} (CDDB {})", toc.cddb_id()))
	}
}



#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
/// # Drive Vendor/Model.
///
/// Hardware vendor and model identifiers have hard limits of 8 and 16 bytes
/// respectively. By storing them together in a fixed 24-byte array, we can
/// make their values `Copy` while also improving comparison efficiency.
///
/// While probably not strictly necessary, values are stored UPPERCASE to
/// force case insensitivity. They're also required to be ASCII.
///
/// Whitespace cannot be normalized at the point of storage because some
/// pairs differentiate themselves with spacing alone, but the `Display`
/// impl cleans up that nonsense.
pub struct DriveVendorModel([u8; 24]);

impl fmt::Display for DriveVendorModel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Ok(raw) = std::str::from_utf8(&self.0) {
			for c in raw.chars().normalized_control_and_whitespace() {
				write!(f, "{c}")?;
			}
		}

		Ok(())
	}
}

impl DriveVendorModel {
	/// # New!
	///
	/// Validate and parse separate vendor and model strings into our
	/// special model.
	///
	/// ## Errors
	///
	/// This will return an error if the lengths are out of range, or the
	/// model number is missing.
	pub(crate) fn new(mut vendor: &str, mut model: &str) -> Result<Self, ScorchError> {
		vendor = vendor.trim();
		model = model.trim();

		if DRIVE_VENDOR_LEN < vendor.len() || ! vendor.is_ascii() { Err(ScorchError::DriveVendor) }
		else if ! (1..=DRIVE_MODEL_LEN).contains(&model.len()) || ! model.is_ascii() {
			Err(ScorchError::DriveModel)
		}
		else {
			let mut buf = [0_u8; 24];
			for (b, v) in buf.iter_mut().zip(vendor.bytes()) {
				*b = v.to_ascii_uppercase();
			}
			for (b, v) in buf.iter_mut().skip(DRIVE_VENDOR_LEN).zip(model.bytes()) {
				*b = v.to_ascii_uppercase();
			}
			Ok(Self(buf))
		}
	}

	#[must_use]
	/// # Vendor.
	///
	/// Note: This may be empty.
	pub fn vendor(&self) -> &str {
		if self.0[0] == 0 { "" }
		else {
			let mut chunk = &self.0[..DRIVE_VENDOR_LEN];
			while let [ rest @ .., 0 ] = chunk { chunk = rest; }
			std::str::from_utf8(chunk).unwrap_or("")
		}
	}

	#[must_use]
	/// # Model.
	///
	/// A model number is always present.
	pub fn model(&self) -> &str {
		let mut chunk = &self.0[DRIVE_VENDOR_LEN..];
		while let [ rest @ .., 0 ] = chunk { chunk = rest; }
		std::str::from_utf8(chunk).unwrap_or("")
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_vendormodel() {
		// Test some failures first.
		for (v, m) in [
			("", ""),
			("Foo", ""),
			("Immatoolongvendor", "Bar"),
			("Foo", "Immatoolongmodelnumber"),
		] {
			assert!(DriveVendorModel::new(v, m).is_err());
		}

		// Test things that should work.
		let vm = DriveVendorModel::new("\nPioneer ", "BD-RW   BDR-XD05   ")
			.expect("Unable to create DriveVendorModel.");
		assert_eq!(vm.vendor(), "PIONEER");
		assert_eq!(vm.model(), "BD-RW   BDR-XD05");
		assert_eq!(vm.to_string(), "PIONEER BD-RW BDR-XD05");
	}

	#[test]
	fn t_null_refuses() {
		let drive = Drive::null();
		let mut cmd = Command::new(&[0x00, 0, 0, 0, 0, 0]);
		let mut buf = ScsiBuffer::default();
		assert!(matches!(
			drive.issue(&mut cmd, &mut buf),
			Err(ScorchError::NullDrive),
		));
	}

	#[test]
	fn t_overwriteable_normalizes_blank() {
		// A DVD+RW reporting appendable with background format pending
		// still presents as blank and erasable.
		let mut drive = Drive::null();
		drive.current_profile = 0x001A;
		drive.status = MediaStatus::Appendable;
		drive.bg_format_status = 1;
		drive.normalize_status();
		assert_eq!(drive.status(), MediaStatus::Blank);
		assert!(drive.erasable());
	}

	#[test]
	fn t_rom_forces_full() {
		let mut drive = Drive::null();
		drive.current_profile = 0x0040;
		drive.status = MediaStatus::Blank;
		drive.erasable = true;
		drive.normalize_status();
		assert_eq!(drive.status(), MediaStatus::Full);
		assert!(! drive.erasable());
	}

	#[test]
	fn t_bd_r_empty_is_blank() {
		let mut drive = Drive::null();
		drive.current_profile = 0x0041;
		drive.status = MediaStatus::Appendable;
		drive.read_capacity = 0;
		drive.state_of_last_session = 0;
		drive.incomplete_sessions = 1;
		drive.normalize_status();
		assert_eq!(drive.status(), MediaStatus::Blank);

		// With data on it, appendable stays appendable.
		let mut drive = Drive::null();
		drive.current_profile = 0x0041;
		drive.status = MediaStatus::Appendable;
		drive.read_capacity = 1234;
		drive.incomplete_sessions = 1;
		drive.normalize_status();
		assert_eq!(drive.status(), MediaStatus::Appendable);
	}

	#[test]
	fn t_mmc1_guess() {
		let mut drive = Drive::null();
		drive.status = MediaStatus::Appendable;
		drive.erasable = true;
		drive.guess_profile();
		assert_eq!(drive.profile(), 0x000A);
		assert!(drive.profile_guessed);
	}

	#[test]
	fn t_stdio_acquire() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("image.iso");
		let addr = format!("stdio:{}", path.display());

		// A fresh file is blank.
		let drive = Drive::acquire(&addr, true).expect("Stdio acquire failed.");
		assert_eq!(drive.role(), DriveRole::StdioRw);
		assert_eq!(drive.profile(), 0xFFFF);
		assert_eq!(drive.status(), MediaStatus::Blank);
		drive.release(false).expect("Release failed.");

		// Read-acquiring a missing file is an error.
		assert!(Drive::acquire("stdio:/definitely/not/here.iso", false).is_err());
	}
}
