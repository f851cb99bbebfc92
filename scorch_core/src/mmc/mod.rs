/*!
# Scorch: The MMC Command Set

Every drive conversation lives under this module, one concern per file:
discovery in `features`, session/track layout in `toc`, formatting in
`format`, speed and buffer affairs in `speed`. This file carries the shared
plumbing — two-pass allocation probing, unit control, the write path — that
the rest lean on.
*/

pub(crate) mod features;
pub(crate) mod format;
pub(crate) mod speed;
pub(crate) mod toc;

use crate::{
	Command,
	CommandDir,
	Drive,
	DriveRole,
	ScorchError,
	ScsiBuffer,
	Severity,
	BUFFER_PAYLOAD,
	SECTOR_DATA_SIZE,
	drive::ParticularError,
	scsi::get16,
	scsi::get32,
};
use std::time::{
	Duration,
	Instant,
};



// Timeouts (ms)
// ---------------

/// # Discovery Commands.
pub(crate) const TIMEOUT_DEFAULT: u32 = 30_000;

/// # READ/WRITE.
pub(crate) const TIMEOUT_WRITE: u32 = 200_000;

/// # BLANK and FORMAT UNIT Run For Ages.
pub(crate) const TIMEOUT_BLANK: u32 = 7_200_000;

/// # SYNCHRONIZE CACHE.
pub(crate) const TIMEOUT_SYNC: u32 = 180_000;

/// # Tray Loading.
pub(crate) const TIMEOUT_LOAD: u32 = 300_000;



// CDB Templates
// ---------------

/// # TEST UNIT READY.
const SPC_TEST_UNIT_READY: [u8; 6] = [0x00, 0, 0, 0, 0, 0];

/// # START STOP UNIT: Load.
const SBC_LOAD: [u8; 6] = [0x1B, 0, 0, 0, 3, 0];

/// # START STOP UNIT: Eject.
const SBC_UNLOAD: [u8; 6] = [0x1B, 0, 0, 0, 2, 0];

/// # START STOP UNIT: Spin Up.
const SBC_START_UNIT: [u8; 6] = [0x1B, 0, 0, 0, 1, 0];

/// # BLANK.
const MMC_BLANK: [u8; 12] = [0xA1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # SYNCHRONIZE CACHE.
const MMC_SYNC_CACHE: [u8; 10] = [0x35, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # CLOSE TRACK/SESSION.
const MMC_CLOSE: [u8; 10] = [0x5B, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # WRITE (10).
const MMC_WRITE_10: [u8; 10] = [0x2A, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # WRITE (12).
const MMC_WRITE_12: [u8; 12] = [0xAA, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # READ (10).
const MMC_READ_10: [u8; 10] = [0x28, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # READ CD.
const MMC_READ_CD: [u8; 12] = [0xBE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # READ CD MSF.
const MMC_READ_CD_MSF: [u8; 12] = [0xB9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # RESERVE TRACK.
const MMC_RESERVE_TRACK: [u8; 10] = [0x53, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # SEND OPC INFORMATION.
const MMC_SEND_OPC: [u8; 10] = [0x54, 1, 0, 0, 0, 0, 0, 0, 0, 0];



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Blanking Flavors.
pub enum BlankMode {
	/// # Whole Disc.
	All,

	/// # Minimal (TOC Only).
	Fast,

	/// # De-Format an Overwriteable DVD-RW.
	Deformat,

	/// # De-Format, Quickest Variant.
	DeformatQuickest,
}

impl BlankMode {
	/// # Low CDB Bits.
	const fn bits(self) -> u8 {
		match self {
			Self::All | Self::Deformat => 0,
			Self::Fast | Self::DeformatQuickest => 1,
		}
	}
}



/// # Length-Header Width for Two-Pass Probing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum LenWidth {
	/// # Two-Byte Header (Most Replies).
	U16,

	/// # Four-Byte Header (GET CONFIGURATION and Friends).
	U32,
}

/// # Two-Pass Probe.
impl Drive {
	/// # Run a Variable-Length Reply Command.
	///
	/// The universal contract for variable-length replies: issue once with
	/// a minimal allocation to learn the announced size, then re-issue
	/// with a right-sized allocation. The builder receives the allocation
	/// length and must encode it into the CDB itself.
	///
	/// ## Errors
	///
	/// This will return an error if either issue fails.
	pub(crate) fn two_pass<F>(&mut self, width: LenWidth, initial: u16, build: F)
	-> Result<Vec<u8>, ScorchError>
	where F: Fn(u16) -> Command {
		let mut buf = ScsiBuffer::default();
		let mut cmd = build(initial);
		self.issue_ok(&mut cmd, &mut buf)?;

		let announced = match width {
			LenWidth::U16 => get16(buf.as_slice(), 0) as usize + 2,
			LenWidth::U32 => get32(buf.as_slice(), 0) as usize + 4,
		};
		let want = announced.min(BUFFER_PAYLOAD);

		// Anything beyond the first allocation requires a second round trip.
		if usize::from(initial) < want {
			let want16 = u16::try_from(want).unwrap_or(u16::MAX);
			let mut cmd = build(want16);
			self.issue_ok(&mut cmd, &mut buf)?;
		}

		Ok(buf.as_slice()[..want].to_vec())
	}
}

/// # Unit Control.
impl Drive {
	/// # TEST UNIT READY.
	///
	/// Returns `true` when the unit reports ready.
	///
	/// ## Errors
	///
	/// This will return an error only if the issue itself malfunctions.
	pub(crate) fn test_unit_ready(&mut self) -> Result<bool, ScorchError> {
		let mut cmd = Command::new(&SPC_TEST_UNIT_READY)
			.timeout(TIMEOUT_DEFAULT);
		let mut buf = ScsiBuffer::default();
		self.issue(&mut cmd, &mut buf)?;
		Ok(! cmd.failed())
	}

	/// # Poll TEST UNIT READY Until Ready.
	///
	/// Polls at a 0.2 s cadence up to `max_sec` seconds.
	///
	/// ## Errors
	///
	/// This will return an error if the unit never becomes ready in time.
	pub(crate) fn wait_unit_attention(&mut self, max_sec: u64, what: &str)
	-> Result<(), ScorchError> {
		let deadline = Instant::now() + Duration::from_secs(max_sec);
		loop {
			if self.test_unit_ready()? { return Ok(()); }
			if deadline <= Instant::now() {
				self.outpost.info(
					Severity::Failure,
					format!("Drive not ready after {max_sec} s: {what}."),
				);
				self.particular.insert(ParticularError::TIMEOUT);
				return Err(ScorchError::Scsi(crate::Sense { key: 2, asc: 4, ascq: 0 }));
			}
			std::thread::sleep(Duration::from_millis(200));
		}
	}

	/// # Load the Tray.
	///
	/// ## Errors
	///
	/// This will return an error if the load or the follow-up wait fails.
	pub(crate) fn load(&mut self) -> Result<(), ScorchError> {
		let mut cmd = Command::new(&SBC_LOAD)
			.timeout(TIMEOUT_LOAD)
			.with_retry();
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		// Needed regardless of IMMED. Five minutes for loading; if that
		// does not suffice then other commands shall fail righteously.
		self.wait_unit_attention(300, "waiting after START UNIT (+ LOAD)")
	}

	/// # Eject the Tray.
	///
	/// Synchronous; a late eject could surprise or hurt the user.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	pub(crate) fn eject(&mut self) -> Result<(), ScorchError> {
		let mut cmd = Command::new(&SBC_UNLOAD).timeout(TIMEOUT_LOAD);
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)
	}

	/// # Spin the Unit Up.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	pub(crate) fn start_unit(&mut self) -> Result<(), ScorchError> {
		let mut cmd = Command::new(&SBC_START_UNIT)
			.timeout(TIMEOUT_LOAD)
			.with_retry();
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		self.wait_unit_attention(1800, "START UNIT")
	}
}

/// # Blank / Close / Sync.
impl Drive {
	/// # BLANK.
	///
	/// Always IMMED; the caller polls for completion via
	/// [`Drive::wait_unit_attention`] unless `wait` is set, in which case
	/// the polling happens right here (budgeted at two hours).
	///
	/// ## Errors
	///
	/// This will return an error if the profile cannot blank, or the drive
	/// refuses.
	pub fn blank(&mut self, mode: BlankMode, wait: bool) -> Result<(), ScorchError> {
		// Only CD-RW and DVD-RW sequential take BLANK; everything else
		// "blanks" by formatting or not at all.
		if ! matches!(self.current_profile, 0x000A | 0x0014) &&
			! (self.current_profile == 0x0013 &&
				matches!(mode, BlankMode::Deformat | BlankMode::DeformatQuickest)) {
			return Err(ScorchError::BlankUnsupported(self.profile_name()));
		}

		let mut cmd = Command::new(&MMC_BLANK)
			.timeout(TIMEOUT_BLANK)
			.with_retry();
		cmd.set_byte(1, 16 | mode.bits()); // IMMED + blanking type.
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;

		if wait { self.wait_unit_attention(7200, "BLANK")?; }
		Ok(())
	}

	/// # SYNCHRONIZE CACHE.
	///
	/// IMMED, then wait for unit attention up to one hour.
	///
	/// ## Errors
	///
	/// This will return an error — and poison the drive — if the sync
	/// fails, because pending data in limbo is as bad as burns get.
	pub fn sync_cache(&mut self) -> Result<(), ScorchError> {
		self.outpost.info(Severity::Debug, "syncing cache");
		if self.pacer.enabled {
			self.outpost.info(Severity::Debug, format!(
				"Checked buffer {} times. Waited {}+{} times = {:.3} s",
				self.pacer.pessimistic_writes,
				self.pacer.waited_writes,
				self.pacer.waited_tries - self.pacer.waited_writes,
				self.pacer.waited_usec as f64 / 1.0e6,
			));
		}

		let mut cmd = Command::new(&MMC_SYNC_CACHE)
			.timeout(TIMEOUT_SYNC)
			.with_retry();
		cmd.or_byte(1, 2); // IMMED.
		let mut buf = ScsiBuffer::default();
		self.issue(&mut cmd, &mut buf)?;
		if cmd.failed() {
			let sense = cmd.sense().unwrap_or_default();
			self.outpost.info(
				Severity::Failure,
				format!("Failed to synchronize drive cache. SCSI error : {sense}"),
			);
			self.cancel = true;
			return Err(ScorchError::Scsi(sense));
		}

		if self.wait_unit_attention(3600, "SYNCHRONIZE CACHE").is_err() {
			self.cancel = true;
			return Err(ScorchError::DriveCancelled);
		}
		self.needs_sync_cache = false;
		Ok(())
	}

	/// # CLOSE TRACK/SESSION.
	///
	/// The close function packs the caller's session (high two bits) and
	/// track (low bit) choices; IMMED, then a patient wait.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	pub fn close(&mut self, session: u8, track: u16) -> Result<(), ScorchError> {
		let mut cmd = Command::new(&MMC_CLOSE)
			.timeout(TIMEOUT_BLANK)
			.with_retry();
		cmd.or_byte(1, 1); // IMMED.
		cmd.set_byte(2, ((session & 3) << 1) | u8::from(track != 0));
		cmd.put16(4, track);
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		self.wait_unit_attention(3600, "CLOSE TRACK SESSION")?;
		self.needs_close_session = false;
		Ok(())
	}
}

/// # The Write Path.
impl Drive {
	/// # Write Sectors.
	///
	/// The buffer's fill counters say how much goes out; `start` says
	/// where. Pacing runs first, then WRITE(10) — or WRITE(12) with the
	/// Streaming bit once stream recording territory begins — then the
	/// pessimistic accounting.
	///
	/// ## Errors
	///
	/// This will return an error (and set the cancel flag) if the write
	/// aims past the permitted range or the drive reports a failure.
	pub(crate) fn write(&mut self, start: i32, buf: &mut ScsiBuffer)
	-> Result<(), ScorchError> {
		if self.cancel { return Err(ScorchError::DriveCancelled); }

		// The hard bound is checked before any CDB is built.
		if 0 < self.media_lba_limit && self.media_lba_limit <= start {
			self.cancel = true;
			self.particular.insert(ParticularError::LBA_LIMIT);
			let err = ScorchError::WriteBeyondLimit(start, self.media_lba_limit);
			self.outpost.info(Severity::Fatal, err.to_string());
			return Err(err);
		}

		let bytes = buf.bytes();
		let sectors = u32::try_from(buf.sectors()).unwrap_or(0);

		// Pseudo-drives skip the SCSI theater entirely.
		match self.role {
			DriveRole::Mmc => {},
			DriveRole::Null => return Err(ScorchError::NullDrive),
			_ => {
				{
					let transport = self.transport.lock()
						.map_err(|_| ScorchError::Bug("Transport mutex poisoned."))?;
					let stdio = transport.stdio()
						.ok_or(ScorchError::Bug("Stdio role without a stdio transport."))?;
					stdio.write_at(u32::try_from(start).unwrap_or(0), buf.used())?;
				}
				self.pacer.note_write(u32::try_from(bytes).unwrap_or(u32::MAX));
				self.needs_sync_cache = false;
				return Ok(());
			},
		}

		self.pace_before_write(bytes as u64)?;

		let mut cmd =
			if self.do_stream_recording &&
				u32::try_from(start).unwrap_or(0) >= self.stream_recording_start {
				let mut c = Command::new(&MMC_WRITE_12)
					.transfer(CommandDir::ToDrive, bytes)
					.timeout(TIMEOUT_WRITE);
				c.put32(2, u32::try_from(start).unwrap_or(0));
				c.put32(6, sectors);
				c.or_byte(10, 0x80); // Streaming.
				c
			}
			else {
				let mut c = Command::new(&MMC_WRITE_10)
					.transfer(CommandDir::ToDrive, bytes)
					.timeout(TIMEOUT_WRITE);
				c.put32(2, u32::try_from(start).unwrap_or(0));
				c.put16(7, u16::try_from(sectors).unwrap_or(u16::MAX));
				c
			};

		self.issue(&mut cmd, buf)?;
		if cmd.failed() {
			let sense = cmd.sense().unwrap_or_default();
			self.cancel = true;
			self.particular.insert(ParticularError::FATAL_SENSE);
			self.outpost.info(Severity::Fatal, format!(
				"SCSI error on write({start},{sectors}): {sense}",
			));
			return Err(ScorchError::Scsi(sense));
		}

		self.pacer.note_write(u32::try_from(bytes).unwrap_or(u32::MAX));
		self.needs_sync_cache = true;
		Ok(())
	}

	/// # Wait For Buffer Room.
	///
	/// ## Errors
	///
	/// This will return an error if the drive stops answering READ BUFFER
	/// CAPACITY mid-wait.
	fn pace_before_write(&mut self, bytes: u64) -> Result<(), ScorchError> {
		if ! self.pacer.might_wait(self.pacer.buffered_bytes, bytes) {
			return Ok(());
		}
		self.pacer.pessimistic_writes += 1;
		if self.pacer.roomy(bytes) { return Ok(()); }

		self.pacer.waited_writes += 1;
		let started = Instant::now();
		let mut announced = false;
		loop {
			self.read_buffer_capacity()?;
			if self.pacer.target_met(bytes) { break; }

			let elapsed = started.elapsed();
			if ! announced && Duration::from_secs(3) < elapsed {
				self.outpost.info(Severity::Debug, format!(
					"Waiting for free buffer takes a while ({:.1} s so far).",
					elapsed.as_secs_f64(),
				));
				announced = true;
			}
			if Duration::from_secs(self.pacer.wfb_timeout_sec) < elapsed {
				self.pacer.enabled = false;
				self.outpost.info(
					Severity::Sorry,
					"Giving up on waiting for free drive buffer; pacing disabled.",
				);
				break;
			}

			let usec = self.pacer.sleep_usec(bytes);
			self.pacer.waited_tries += 1;
			self.pacer.waited_usec += usec;
			std::thread::sleep(Duration::from_micros(usec));
		}
		Ok(())
	}
}

/// # Reading.
impl Drive {
	/// # Read Data Sectors, Role-Agnostic.
	///
	/// MMC drives get READ(10); stdio drives get plain file reads. `out`
	/// must hold exactly `count * 2048` bytes.
	///
	/// ## Errors
	///
	/// This will return an error if the role can't read or the read fails.
	pub(crate) fn read_blocks(&mut self, lba: u32, count: u16, out: &mut [u8])
	-> Result<(), ScorchError> {
		if out.len() != usize::from(count) * SECTOR_DATA_SIZE {
			return Err(ScorchError::Bug("Read buffer size mismatch."));
		}
		match self.role {
			DriveRole::Mmc if crate::profile::profile_is_cd(self.current_profile) =>
				self.read_cd_blocks(lba, count, out),
			DriveRole::Mmc => self.read10(lba, count, out),
			DriveRole::Null => Err(ScorchError::NullDrive),
			_ => {
				let transport = self.transport.lock()
					.map_err(|_| ScorchError::Bug("Transport mutex poisoned."))?;
				let stdio = transport.stdio()
					.ok_or(ScorchError::Bug("Stdio role without a stdio transport."))?;
				stdio.read_at(lba, out)
			},
		}
	}

	/// # Read Data Sectors From CD Media.
	///
	/// CD drives answer READ CD more reliably than READ(10); the handful
	/// that predate the LBA form fall back to the MSF-addressed sibling.
	///
	/// ## Errors
	///
	/// This will return an error if both forms fail.
	fn read_cd_blocks(&mut self, lba: u32, count: u16, out: &mut [u8])
	-> Result<(), ScorchError> {
		let start = i32::try_from(lba).unwrap_or(i32::MAX);
		// Sector type 0 (any), user data only, no subchannel.
		match self.read_cd(start, u32::from(count), 0, 0x10, 0, SECTOR_DATA_SIZE, out) {
			Err(ScorchError::Scsi(sense)) if sense.is_invalid_opcode() =>
				self.read_cd_msf(
					start,
					start + i32::from(count),
					0,
					0x10,
					0,
					SECTOR_DATA_SIZE,
					out,
				),
			other => other,
		}
	}

	/// # READ (10).
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn read10(&mut self, lba: u32, count: u16, out: &mut [u8])
	-> Result<(), ScorchError> {
		let bytes = usize::from(count) * SECTOR_DATA_SIZE;
		let mut cmd = Command::new(&MMC_READ_10)
			.transfer(CommandDir::FromDrive, bytes)
			.timeout(TIMEOUT_WRITE);
		cmd.put32(2, lba);
		cmd.put16(7, count);

		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		out.copy_from_slice(&buf.as_slice()[..bytes]);
		Ok(())
	}

	/// # READ CD.
	///
	/// Sector type in bits 2–4 of byte one, DAP in bit one, main-channel
	/// selection in byte nine, subchannel selection in byte ten. The
	/// default is main channel only; sub-q (0x01) is only worth asking for
	/// while grabbing or when subcode was explicitly requested.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn read_cd(
		&mut self,
		start: i32,
		len: u32,
		sector_type: u8,
		main_fmt: u8,
		sub: u8,
		block_size: usize,
		out: &mut [u8],
	) -> Result<(), ScorchError> {
		let bytes = len as usize * block_size;
		let mut cmd = Command::new(&MMC_READ_CD)
			.transfer(CommandDir::FromDrive, bytes)
			.timeout(TIMEOUT_WRITE);
		cmd.or_byte(1, (sector_type & 0x07) << 2);
		cmd.put32(2, u32::try_from(start).unwrap_or(0));
		// Length squeezes into three bytes.
		cmd.set_byte(6, ((len >> 16) & 0xFF) as u8);
		cmd.set_byte(7, ((len >> 8) & 0xFF) as u8);
		cmd.set_byte(8, (len & 0xFF) as u8);
		cmd.set_byte(9, main_fmt);
		cmd.set_byte(10, sub & 0x07);

		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		let take = bytes.min(out.len());
		out[..take].copy_from_slice(&buf.as_slice()[..take]);
		Ok(())
	}

	/// # READ CD MSF.
	///
	/// The timecode-addressed sibling of READ CD, for drives and contexts
	/// that think in minutes/seconds/frames.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn read_cd_msf(
		&mut self,
		start_lba: i32,
		end_lba: i32,
		sector_type: u8,
		main_fmt: u8,
		sub: u8,
		block_size: usize,
		out: &mut [u8],
	) -> Result<(), ScorchError> {
		let len = u32::try_from(end_lba - start_lba).unwrap_or(0);
		let bytes = len as usize * block_size;
		let mut cmd = Command::new(&MMC_READ_CD_MSF)
			.transfer(CommandDir::FromDrive, bytes)
			.timeout(TIMEOUT_WRITE);
		cmd.or_byte(1, (sector_type & 0x07) << 2);

		let (m1, s1, f1) = lba_to_msf(start_lba);
		let (m2, s2, f2) = lba_to_msf(end_lba);
		cmd.set_byte(3, m1);
		cmd.set_byte(4, s1);
		cmd.set_byte(5, f1);
		cmd.set_byte(6, m2);
		cmd.set_byte(7, s2);
		cmd.set_byte(8, f2);
		cmd.set_byte(9, main_fmt);
		cmd.set_byte(10, sub & 0x07);

		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		let take = bytes.min(out.len());
		out[..take].copy_from_slice(&buf.as_slice()[..take]);
		Ok(())
	}
}

/// # Session Prep.
impl Drive {
	/// # RESERVE TRACK.
	///
	/// Reserve `size` bytes worth of track on sequential media.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	pub(crate) fn reserve_track(&mut self, size: u64) -> Result<(), ScorchError> {
		let blocks = u32::try_from(size.div_ceil(SECTOR_DATA_SIZE as u64))
			.unwrap_or(u32::MAX);
		let mut cmd = Command::new(&MMC_RESERVE_TRACK).timeout(TIMEOUT_DEFAULT);
		cmd.put32(5, blocks);
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)
	}

	/// # Prepare the Drive For a Sequential Burn.
	///
	/// Sequential DVD-R[W] media take a track reservation sized to the
	/// upcoming payload; anything sequential gets the optional power
	/// calibration when policy asks for it.
	///
	/// ## Errors
	///
	/// This will return an error if a required reservation is refused.
	pub(crate) fn prepare_for_write(&mut self, payload_bytes: u64)
	-> Result<(), ScorchError> {
		// Without buffer-underrun-free recording, pacing is the only
		// thing standing between the burn and a coaster.
		if ! self.has_bufe() { self.pacer.enabled = true; }
		if self.do_opc &&
			matches!(self.current_profile, 0x0009..=0x0015 | 0x001B | 0x002B | 0x0041) {
			self.perform_opc();
		}
		if matches!(self.current_profile, 0x0011 | 0x0014 | 0x0015) &&
			0 < payload_bytes {
			self.reserve_track(payload_bytes)?;
		}
		Ok(())
	}

	/// # Optimum Power Calibration.
	///
	/// Strictly optional; failure is reported and shrugged off.
	pub(crate) fn perform_opc(&mut self) {
		let mut cmd = Command::new(&MMC_SEND_OPC)
			.timeout(TIMEOUT_LOAD)
			.with_retry();
		let mut buf = ScsiBuffer::default();
		if self.issue(&mut cmd, &mut buf).is_err() || cmd.failed() {
			self.outpost.info(
				Severity::Warning,
				"Drive declined optimum power calibration; burning anyway.",
			);
		}
	}
}

/// # Acquisition Conversation.
impl Drive {
	/// # Learn Everything About the Loaded Medium.
	///
	/// The fixed acquisition sequence: configuration (profile + features),
	/// disc info (status, sessions, TOC), format descriptors, capacities,
	/// performance, and a first buffer reading. Individual discovery
	/// failures degrade gracefully; only a dead transport is fatal.
	///
	/// ## Errors
	///
	/// This will return an error if the drive cannot be talked to at all.
	pub(crate) fn refresh_media_state(&mut self) -> Result<(), ScorchError> {
		if self.role != DriveRole::Mmc {
			return Err(ScorchError::Bug("Media refresh on a non-MMC drive."));
		}

		// An empty tray gets one chance to swallow whatever is on it.
		if ! self.test_unit_ready()? {
			let _res = self.load();
		}
		let _ready = self.start_unit();
		self.get_configuration()?;
		self.read_disc_info()?;
		if self.formats.is_empty() {
			let _res = self.read_format_capacities(None);
		}
		let _res = self.read_capacity();
		let _res = self.get_write_performance();
		let _res = self.read_buffer_capacity();
		self.normalize_status();
		self.probe_next_track_damage();
		Ok(())
	}
}



/// # LBA to MSF.
///
/// Includes the 150-frame pre-gap bias.
pub(crate) const fn lba_to_msf(lba: i32) -> (u8, u8, u8) {
	let abs = lba + 150;
	if abs < 0 { return (0, 0, 0); }
	(
		(abs / (60 * 75)) as u8,
		((abs / 75) % 60) as u8,
		(abs % 75) as u8,
	)
}

/// # MSF to LBA.
pub(crate) const fn msf_to_lba(m: u8, s: u8, f: u8) -> i32 {
	(m as i32 * 60 + s as i32) * 75 + f as i32 - 150
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_msf_roundtrip() {
		for lba in [-150_i32, -1, 0, 74, 75, 4500, 449_849] {
			let (m, s, f) = lba_to_msf(lba);
			assert_eq!(msf_to_lba(m, s, f), lba, "MSF round-trip failed for {lba}.");
		}
		assert_eq!(lba_to_msf(0), (0, 2, 0));
		assert_eq!(lba_to_msf(-150), (0, 0, 0));
	}

	#[test]
	fn t_blank_profile_gate() {
		// A DVD+RW cannot BLANK; it reports as such without any CDB
		// reaching the (null) transport.
		let mut drive = crate::Drive::null();
		drive.current_profile = 0x001A;
		assert!(matches!(
			drive.blank(BlankMode::Fast, false),
			Err(ScorchError::BlankUnsupported(_)),
		));
	}

	#[test]
	fn t_write_beyond_limit() {
		// A limited drive fails writes at/past the bound with a FATAL and
		// flips cancel, again without dispatching anything.
		let mut drive = crate::Drive::null();
		drive.current_profile = 0x001A;
		drive.media_lba_limit = 1000;

		let mut buf = ScsiBuffer::default();
		buf.set_fill(2048, 1);
		assert!(matches!(
			drive.write(1000, &mut buf),
			Err(ScorchError::WriteBeyondLimit(1000, 1000)),
		));
		assert!(drive.cancelled());

		// And every subsequent op refuses straight away.
		assert!(matches!(
			drive.write(0, &mut buf),
			Err(ScorchError::DriveCancelled),
		));
	}
}
