/*!
# Scorch: Sector Assembly

Turning track source bytes into writable sectors: zero-padding at either
end, CD-XA subheader stripping, byte swapping, raw Mode-1 framing (sync,
BCD header, EDC, parity, scramble), and the 96-byte subchannel with its
once-every-tenth-sector Q-mode rotation.
*/

use crate::{
	Drive,
	ScorchError,
	ScsiBuffer,
	SECTOR_DATA_SIZE,
	SECTOR_RAW_SIZE,
	SUBCHANNEL_SIZE,
	BUFFER_SIZE,
	ecma130,
	mmc::lba_to_msf,
};



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Identified Sector Flavor.
///
/// `sector_identify` has exactly one answer for now; the enum exists so
/// growing a real identifier later doesn't ripple through every caller.
pub enum SectorMode {
	/// # Mode-1 Data.
	Mode1,
}

/// # Identify a Sector.
#[must_use]
pub const fn sector_identify(_data: &[u8]) -> SectorMode { SectorMode::Mode1 }



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Track Payload Flavor.
pub enum TrackMode {
	/// # 2048-Byte Data Sectors.
	Mode1,

	/// # 2352-Byte Audio Sectors.
	Audio,

	/// # 2352-Byte Raw Sectors.
	Raw,

	/// # Raw Plus 96 Bytes of Subchannel.
	Raw96,
}

impl TrackMode {
	#[must_use]
	/// # Payload Bytes Per Sector.
	pub const fn sector_length(self) -> usize {
		match self {
			Self::Mode1 => SECTOR_DATA_SIZE,
			Self::Audio | Self::Raw => SECTOR_RAW_SIZE,
			Self::Raw96 => SECTOR_RAW_SIZE + SUBCHANNEL_SIZE,
		}
	}

	#[must_use]
	/// # Subchannel Bytes Per Sector.
	pub const fn subcode_length(self) -> usize {
		if matches!(self, Self::Raw96) { SUBCHANNEL_SIZE } else { 0 }
	}
}



/// # A Track's Byte Supply.
///
/// Returns the number of bytes delivered; zero means end of input. The
/// optional subchannel hook supplies pre-cooked 96-byte blocks when the
/// source has them.
pub trait TrackSource {
	/// # Pull Bytes.
	fn read(&mut self, out: &mut [u8]) -> usize;

	/// # Pull a Subchannel Block, If Supported.
	fn read_sub(&mut self, _out: &mut [u8; SUBCHANNEL_SIZE]) -> bool { false }
}

impl TrackSource for std::io::Cursor<Vec<u8>> {
	fn read(&mut self, out: &mut [u8]) -> usize {
		std::io::Read::read(self, out).unwrap_or(0)
	}
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # ISRC Identity For Q-Mode 3.
pub struct Isrc {
	/// # Country Code.
	pub(crate) country: [u8; 2],

	/// # Owner Code.
	pub(crate) owner: [u8; 3],

	/// # Year (Two Digits Used).
	pub(crate) year: u16,

	/// # Serial Number.
	pub(crate) serial: u32,
}



/// # One Track Being Written.
pub struct Track {
	/// # The Byte Supply.
	pub(crate) source: Box<dyn TrackSource>,

	/// # Payload Flavor.
	pub(crate) mode: TrackMode,

	/// # Leading Zero Bytes.
	pub(crate) offset: usize,

	/// # Leading Zeros Delivered So Far.
	pub(crate) offsetcount: usize,

	/// # Trailing Zero Bytes.
	pub(crate) tail: usize,

	/// # Trailing Zeros Delivered So Far.
	pub(crate) tailcount: usize,

	/// # Bytes Pulled From the Source.
	pub(crate) sourcecount: u64,

	/// # Bytes Handed to the Drive.
	pub(crate) writecount: u64,

	/// # Sectors Handed to the Drive.
	pub(crate) written_sectors: u32,

	/// # Fixed Size in Bytes (Zero When Open-Ended).
	pub(crate) fixed_size: u64,

	/// # No Predeclared Size?
	pub(crate) open_ended: bool,

	/// # Premature-End Policy: 0 = Pad, 1 = Fail, 2 = Already Failed.
	pub(crate) end_on_premature_eoi: u8,

	/// # Source Exhausted?
	pub(crate) eos: bool,

	/// # Nothing More to Write?
	pub(crate) track_data_done: bool,

	/// # Drop an 8-Byte CD-XA Subheader Per Sector?
	pub(crate) cdxa_conversion: u8,

	/// # Swap Byte Pairs (Endian Fix For Audio)?
	pub(crate) swap_source_bytes: bool,

	/// # Track Number on the Medium.
	pub(crate) point: u8,

	/// # Control Nibble.
	pub(crate) control: u8,

	/// # ISRC, If Any.
	pub(crate) isrc: Option<Isrc>,
}

impl std::fmt::Debug for Track {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Track")
			.field("mode", &self.mode)
			.field("point", &self.point)
			.field("sourcecount", &self.sourcecount)
			.field("written_sectors", &self.written_sectors)
			.finish_non_exhaustive()
	}
}

impl Track {
	/// # A Data Track Over Any Source.
	pub fn new(source: Box<dyn TrackSource>, mode: TrackMode) -> Self {
		Self {
			source,
			mode,
			offset: 0,
			offsetcount: 0,
			tail: 0,
			tailcount: 0,
			sourcecount: 0,
			writecount: 0,
			written_sectors: 0,
			fixed_size: 0,
			open_ended: true,
			end_on_premature_eoi: 0,
			eos: false,
			track_data_done: false,
			cdxa_conversion: 0,
			swap_source_bytes: false,
			point: 1,
			control: 4,
			isrc: None,
		}
	}

	/// # Fill a Slice From the Track.
	///
	/// Leading offset zeros first, then source bytes, then tail zeros,
	/// then plain padding. A short read on a fixed-size track with the
	/// fail policy trips the sticky premature-end state.
	///
	/// ## Errors
	///
	/// This will return an error (once) when premature end of input is
	/// both detected and configured to be fatal.
	pub fn get_bytes(&mut self, data: &mut [u8]) -> Result<(), ScorchError> {
		let count = data.len();

		// First we use up any offset.
		let mut valid = (self.offset - self.offsetcount).min(count);
		if 0 < valid {
			self.offsetcount += valid;
			data[..valid].fill(0);
		}
		let mut curr = valid;

		// Next we use source data.
		if curr < count {
			valid =
				if self.eos || self.end_on_premature_eoi == 2 { 0 }
				else { self.source.read(&mut data[curr..]) };
			if valid == 0 { self.eos = true; }
			self.sourcecount += valid as u64;
			curr += valid;
		}

		// Then we run through any tail.
		if curr < count {
			valid = (self.tail - self.tailcount).min(count - curr);
			if 0 < valid {
				self.tailcount += valid;
				data[curr..curr + valid].fill(0);
				curr += valid;
			}
		}

		let shortage = count - curr;
		if count <= shortage { self.track_data_done = true; }
		if self.end_on_premature_eoi == 1 && count <= shortage && ! self.open_ended {
			self.end_on_premature_eoi = 2;
			data[curr..].fill(0);
			return Err(ScorchError::PrematureEoi);
		}

		// Whatever is still short gets zeros.
		if 0 < shortage { data[curr..].fill(0); }

		if self.swap_source_bytes {
			for pair in data.chunks_exact_mut(2) {
				pair.swap(0, 1);
			}
		}
		Ok(())
	}
}



#[derive(Debug, Clone, Copy, Default)]
/// # Session Write Settings.
pub struct WriteSettings {
	/// # Output Flavor Override (Raw Modes Re-Frame Their Input).
	pub(crate) out_mode: Option<TrackMode>,

	/// # Flush Trigger in Bytes (e.g. 32 KiB For DVD).
	pub(crate) obs: usize,

	/// # Media Catalog Number (Thirteen ASCII Digits).
	pub(crate) mcn: Option<[u8; 13]>,
}

impl WriteSettings {
	/// # Effective Output Mode For an Input Mode.
	pub(crate) fn out_mode(&self, inmode: TrackMode) -> TrackMode {
		self.out_mode.unwrap_or(inmode)
	}
}



#[derive(Debug)]
/// # The Sector Pump.
///
/// Owns the outgoing buffer and the running addresses. Each `sector_*`
/// call claims the next slot, fills it, and flushes through the drive
/// whenever the buffer (or the flush trigger) fills up.
pub struct Burner {
	/// # Outgoing Buffer.
	pub(crate) buf: ScsiBuffer,

	/// # LBA of the Buffer's First Sector.
	pub(crate) start_lba: i32,

	/// # Absolute LBA of the Next Sector.
	pub(crate) alba: i32,

	/// # Track-Relative LBA of the Next Sector.
	pub(crate) rlba: i32,

	/// # Settings.
	pub(crate) settings: WriteSettings,
}

impl Burner {
	/// # New Pump Starting at an Address.
	pub fn new(start_lba: i32, settings: WriteSettings) -> Self {
		Self {
			buf: ScsiBuffer::default(),
			start_lba,
			alba: start_lba,
			rlba: 0,
			settings,
		}
	}

	/// # Claim the Next Sector Slot.
	///
	/// Flushes first when the slot wouldn't fit (or would cross the
	/// configured flush trigger). Returns the slot's offset into the
	/// buffer.
	///
	/// ## Errors
	///
	/// This will return an error if the flush write fails.
	fn get_sector(&mut self, drive: &mut Drive, inmode: TrackMode)
	-> Result<usize, ScorchError> {
		let outmode = self.settings.out_mode(inmode);
		let seclen = outmode.sector_length() + outmode.subcode_length();

		if BUFFER_SIZE < self.buf.bytes() + seclen ||
			(0 < self.settings.obs && self.settings.obs < self.buf.bytes() + seclen) {
			self.flush(drive)?;
		}
		let at = self.buf.bytes();
		self.buf.advance(seclen, 1);
		Ok(at)
	}

	/// # Revoke the Most Recent Slot.
	fn unget_sector(&mut self, inmode: TrackMode) {
		let outmode = self.settings.out_mode(inmode);
		let seclen = outmode.sector_length() + outmode.subcode_length();
		self.buf.set_fill(
			self.buf.bytes() - seclen,
			self.buf.sectors() - 1,
		);
	}

	/// # Write Out Whatever Has Accumulated.
	///
	/// ## Errors
	///
	/// This will return an error if the drive write fails.
	pub fn flush(&mut self, drive: &mut Drive) -> Result<(), ScorchError> {
		let sectors = self.buf.sectors();
		if sectors == 0 { return Ok(()); }
		drive.write(self.start_lba, &mut self.buf)?;
		self.start_lba += i32::try_from(sectors).unwrap_or(0);
		self.buf.clear();
		Ok(())
	}

	/// # Produce One Track Sector.
	///
	/// Returns `false` once an open-ended (or prematurely ended) track
	/// has run dry; the claimed slot is revoked in that case.
	///
	/// ## Errors
	///
	/// This will return an error if the source fails hard or a flush
	/// write fails.
	pub fn sector_data(
		&mut self,
		drive: &mut Drive,
		track: &mut Track,
		psub: bool,
	) -> Result<bool, ScorchError> {
		let inmode = track.mode;
		let at = self.get_sector(drive, inmode)?;
		let premature = self.convert_data(Some(track), inmode, at);

		if (track.open_ended || track.end_on_premature_eoi != 0) &&
			track.track_data_done {
			self.unget_sector(inmode);
			return premature.map(|()| false);
		}
		premature?;

		let outmode = self.settings.out_mode(inmode);
		if outmode.subcode_length() != 0 {
			let mut subs = [0_u8; SUBCHANNEL_SIZE];
			if ! track.source.read_sub(&mut subs) {
				self.subcode_user(&mut subs, track, 1, psub);
			}
			let base = at + outmode.sector_length();
			self.buf.as_mut_slice()[base..base + SUBCHANNEL_SIZE]
				.copy_from_slice(&subs);
		}

		self.sector_headers(at, inmode, false);
		self.advance(track);
		Ok(true)
	}

	/// # Produce One Lead-Out Sector.
	///
	/// ## Errors
	///
	/// This will return an error if a flush write fails.
	pub fn sector_lout(
		&mut self,
		drive: &mut Drive,
		control: u8,
		mode: TrackMode,
	) -> Result<(), ScorchError> {
		let at = self.get_sector(drive, mode)?;
		self.convert_data(None, mode, at)?;

		let outmode = self.settings.out_mode(mode);
		if outmode.subcode_length() != 0 {
			let mut subs = [0_u8; SUBCHANNEL_SIZE];
			self.subcode_lout(&mut subs, control);
			let base = at + outmode.sector_length();
			self.buf.as_mut_slice()[base..base + SUBCHANNEL_SIZE]
				.copy_from_slice(&subs);
		}

		self.sector_headers(at, mode, false);
		self.alba += 1;
		self.rlba += 1;
		Ok(())
	}

	/// # Account For One Delivered Sector.
	fn advance(&mut self, track: &mut Track) {
		let outmode = self.settings.out_mode(track.mode);
		track.writecount += outmode.sector_length() as u64;
		track.written_sectors += 1;
		self.alba += 1;
		self.rlba += 1;
	}

	/// # Fill a Claimed Slot With Payload.
	///
	/// Same-mode transfers copy straight through (minus an optional CD-XA
	/// subheader); raw output takes Mode-1 input at byte sixteen, audio
	/// and raw input at byte zero.
	fn convert_data(
		&mut self,
		track: Option<&mut Track>,
		inmode: TrackMode,
		at: usize,
	) -> Result<(), ScorchError> {
		let outmode = self.settings.out_mode(inmode);
		let outlen = outmode.sector_length();
		let inlen = inmode.sector_length();
		if outlen < inlen {
			return Err(ScorchError::Bug("Output mode narrower than input."));
		}

		// Same payload flavor (or raw-over-raw/audio): straight copy.
		if outmode == inmode ||
			(matches!(outmode, TrackMode::Raw | TrackMode::Raw96) &&
				matches!(inmode, TrackMode::Raw | TrackMode::Audio)) {
			return self.pull(track, at, inlen);
		}

		// Re-framing: only raw output can embed another mode, and Mode-1
		// payloads land behind the sixteen header bytes.
		if ! matches!(outmode, TrackMode::Raw | TrackMode::Raw96) {
			return Err(ScorchError::Bug("Unsupported mode conversion."));
		}
		let offset = if inmode == TrackMode::Mode1 { 16 } else { 0 };
		self.pull(track, at + offset, inlen)
	}

	/// # Pull Bytes Into the Buffer (or Zeros Without a Track).
	fn pull(
		&mut self,
		track: Option<&mut Track>,
		at: usize,
		mut inlen: usize,
	) -> Result<(), ScorchError> {
		match track {
			None => {
				self.buf.as_mut_slice()[at..at + inlen].fill(0);
				Ok(())
			},
			Some(track) => {
				let cdxa = track.cdxa_conversion == 1;
				if cdxa { inlen += 8; }
				let slice = &mut self.buf.as_mut_slice()[at..at + inlen];
				let res = track.get_bytes(slice);
				// Drop the 8-byte CD-XA subheader.
				if cdxa { slice.copy_within(8.., 0); }
				res
			},
		}
	}
}

/// # Subchannel Fabrication.
impl Burner {
	/// # User-Data Subchannel.
	///
	/// Q-mode 1 everywhere except every tenth sector, where mode 2 (the
	/// media catalog number) or mode 3 (the ISRC) is substituted when
	/// available. CRC-16 over the first ten Q bytes, appended big-endian.
	pub fn subcode_user(
		&self,
		subs: &mut [u8; SUBCHANNEL_SIZE],
		track: &Track,
		indx: u8,
		psub: bool,
	) {
		subs.fill(0);
		if (track.point == 1 && self.rlba == -150) || psub {
			subs[..12].fill(0xFF);
		}

		let q = &mut subs[12..24];
		let mut qmode = 1_u8;
		// Every 1 in 10 we can do something different.
		if self.rlba % 10 == 0 {
			// Each of these can occur 1 in 100.
			if (self.rlba / 10) % 10 == 0 {
				if self.settings.mcn.is_some() { qmode = 2; }
			}
			else if (self.rlba / 10) % 10 == 1 && track.isrc.is_some() {
				qmode = 3;
			}
		}

		match qmode {
			2 => {
				let mcn = self.settings.mcn.unwrap_or([b'0'; 13]);
				let digit = |i: usize| mcn[i] & 0x0F;
				for i in 0..6 {
					q[1 + i] = (digit(2 * i) << 4) | digit(2 * i + 1);
				}
				q[7] = digit(12) << 4;
				q[8] = 0;
				let (_, _, f) = lba_to_msf(self.alba);
				q[9] = dec_to_bcd(f);
			},
			3 => {
				let isrc = track.isrc.unwrap_or_default();
				let c0 = char_to_isrc(isrc.country[0]);
				let c1 = char_to_isrc(isrc.country[1]);
				let o0 = char_to_isrc(isrc.owner[0]);
				let o1 = char_to_isrc(isrc.owner[1]);
				let o2 = char_to_isrc(isrc.owner[2]);
				q[1] = (c0 << 2) | (c1 >> 4);
				q[2] = (c1 << 4) | (o0 >> 2);
				q[3] = (o0 << 6) | o1;
				q[4] = o2 << 2;
				q[5] = dec_to_bcd((isrc.year % 100) as u8);
				q[6] = dec_to_bcd((isrc.serial % 100) as u8);
				q[7] = dec_to_bcd(((isrc.serial / 100) % 100) as u8);
				q[8] = dec_to_bcd(((isrc.serial / 10_000) % 10) as u8) << 4;
				let (_, _, f) = lba_to_msf(self.alba);
				q[9] = dec_to_bcd(f);
			},
			_ => {
				q[1] = dec_to_bcd(track.point);
				q[2] = dec_to_bcd(indx);
				let (m, s, f) = lba_to_msf(self.rlba);
				q[3] = dec_to_bcd(m);
				q[4] = dec_to_bcd(s);
				q[5] = dec_to_bcd(f);
				q[6] = 0;
				let (m, s, f) = lba_to_msf(self.alba);
				q[7] = dec_to_bcd(m);
				q[8] = dec_to_bcd(s);
				q[9] = dec_to_bcd(f);
			},
		}
		q[0] = (track.control << 4) | qmode;

		let crc = ecma130::crc16(&q[..10]);
		q[10] = (crc >> 8) as u8;
		q[11] = (crc & 0xFF) as u8;
	}

	/// # Lead-Out Subchannel.
	pub fn subcode_lout(&self, subs: &mut [u8; SUBCHANNEL_SIZE], control: u8) {
		subs.fill(0);
		let (rm, rs, rf) = lba_to_msf(self.rlba);
		let (m, s, f) = lba_to_msf(self.alba);

		// The P channel blinks through the lead-out.
		if (rm == 0 && rs == 0 && rf == 0) || (2 <= rs && (rf / 19) % 2 == 0) {
			subs[..12].fill(0xFF);
		}
		let q = &mut subs[12..24];
		q[0] = (control << 4) | 1;
		q[1] = 0xAA;
		q[2] = 0x01;
		q[3] = dec_to_bcd(rm);
		q[4] = dec_to_bcd(rs);
		q[5] = dec_to_bcd(rf);
		q[6] = 0;
		q[7] = dec_to_bcd(m);
		q[8] = dec_to_bcd(s);
		q[9] = dec_to_bcd(f);

		let crc = ecma130::crc16(&q[..10]);
		q[10] = (crc >> 8) as u8;
		q[11] = (crc & 0xFF) as u8;
	}

	/// # Lead-In TOC Subchannel.
	///
	/// Rotates through the A0/A1/A2 bookkeeping points and the track
	/// entries, one Q packet per lead-in sector.
	pub fn subcode_toc(
		&self,
		subs: &mut [u8; SUBCHANNEL_SIZE],
		entries: &[(u8, u8, i32)],
		seq: usize,
	) {
		subs.fill(0);
		if entries.is_empty() { return; }
		let (point, control, lba) = entries[seq % entries.len()];
		let q = &mut subs[12..24];
		q[0] = (control << 4) | 1;
		q[1] = 0;
		q[2] = point;
		let (m, s, f) = lba_to_msf(self.rlba);
		q[3] = dec_to_bcd(m);
		q[4] = dec_to_bcd(s);
		q[5] = dec_to_bcd(f);
		q[6] = 0;
		let (m, s, f) = lba_to_msf(lba);
		q[7] = dec_to_bcd(m);
		q[8] = dec_to_bcd(s);
		q[9] = dec_to_bcd(f);

		let crc = ecma130::crc16(&q[..10]);
		q[10] = (crc >> 8) as u8;
		q[11] = (crc & 0xFF) as u8;
	}
}

/// # Raw Framing.
impl Burner {
	/// # Frame a Raw Mode-1 Sector In Place.
	///
	/// Sync pattern, BCD MSF header (with the 0xA0 minute bias in the
	/// lead-in), mode byte, EDC over the first 2064 bytes (stored
	/// little-endian), zeroed intermediate field, P/Q parity, scramble.
	/// Audio payloads and non-raw outputs are left untouched.
	pub fn sector_headers(&mut self, at: usize, inmode: TrackMode, leadin: bool) {
		let outmode = self.settings.out_mode(inmode);
		if inmode != TrackMode::Mode1 ||
			! matches!(outmode, TrackMode::Raw | TrackMode::Raw96) {
			return;
		}

		let out = &mut self.buf.as_mut_slice()[at..at + SECTOR_RAW_SIZE];
		out[0] = 0;
		out[1..11].fill(0xFF);
		out[11] = 0;

		if leadin {
			let (m, s, f) = lba_to_msf(self.rlba);
			out[12] = dec_to_bcd(m) + 0xA0;
			out[13] = dec_to_bcd(s);
			out[14] = dec_to_bcd(f);
		}
		else {
			let (m, s, f) = lba_to_msf(self.alba);
			out[12] = dec_to_bcd(m);
			out[13] = dec_to_bcd(s);
			out[14] = dec_to_bcd(f);
		}
		out[15] = 1; // Mode byte.

		let crc = ecma130::edc(&out[..2064]);
		out[2064..2068].copy_from_slice(&crc.to_le_bytes());
		out[2068..2076].fill(0);
		ecma130::encode_parity(out);
		ecma130::scramble(out);
	}
}



/// # Decimal to BCD.
pub(crate) const fn dec_to_bcd(d: u8) -> u8 {
	((d / 10) << 4) | (d % 10)
}

/// # ISRC Character Code.
const fn char_to_isrc(c: u8) -> u8 {
	match c {
		b'0'..=b'9' => c - b'0',
		b'A'..=b'Z' => 0x11 + (c - b'A'),
		b'a'..=b'z' => 0x11 + (c - b'a'),
		_ => 0,
	}
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Track Over In-Memory Bytes.
	fn mem_track(data: Vec<u8>, mode: TrackMode) -> Track {
		Track::new(Box::new(std::io::Cursor::new(data)), mode)
	}

	#[test]
	fn t_get_bytes_offset_tail() {
		let mut track = mem_track(vec![1, 2, 3, 4], TrackMode::Mode1);
		track.offset = 2;
		track.tail = 3;

		let mut out = [0xAA_u8; 12];
		track.get_bytes(&mut out).expect("get_bytes failed.");

		// Two offset zeros, four source bytes, three tail zeros, and
		// three plain padding zeros.
		assert_eq!(out, [0, 0, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0]);
		assert_eq!(track.sourcecount, 4);
		assert!(track.eos);
		assert!(track.track_data_done);
	}

	#[test]
	fn t_get_bytes_swap() {
		let mut track = mem_track(vec![1, 2, 3, 4], TrackMode::Audio);
		track.swap_source_bytes = true;
		let mut out = [0_u8; 4];
		track.get_bytes(&mut out).expect("get_bytes failed.");
		assert_eq!(out, [2, 1, 4, 3]);
	}

	#[test]
	fn t_premature_eoi() {
		// A fixed-size track with the fail policy errors once, then
		// delivers zeros quietly.
		let mut track = mem_track(vec![7_u8; 100], TrackMode::Mode1);
		track.open_ended = false;
		track.fixed_size = 4096;
		track.end_on_premature_eoi = 1;

		let mut out = [0_u8; 2048];
		track.get_bytes(&mut out).expect("First sector should succeed.");
		assert_eq!(out[..100], [7_u8; 100]);

		assert!(matches!(
			track.get_bytes(&mut out),
			Err(ScorchError::PrematureEoi),
		));
		assert_eq!(track.end_on_premature_eoi, 2);

		// No more reads, no more errors.
		track.get_bytes(&mut out).expect("Post-failure read should pad.");
		assert!(out.iter().all(|&b| b == 0));
	}

	#[test]
	fn t_subcode_user_rotation() {
		let settings = WriteSettings {
			mcn: Some(*b"5099969944123"),
			..WriteSettings::default()
		};
		let mut burner = Burner::new(0, settings);
		let track = mem_track(Vec::new(), TrackMode::Audio);

		let mut subs = [0_u8; SUBCHANNEL_SIZE];

		// rlba 0 is a 1-in-100 slot: the MCN gets in (q-mode 2).
		burner.rlba = 0;
		burner.subcode_user(&mut subs, &track, 1, false);
		assert_eq!(subs[12] & 0x0F, 2);

		// rlba 5 is an ordinary slot (q-mode 1).
		burner.rlba = 5;
		burner.subcode_user(&mut subs, &track, 1, false);
		assert_eq!(subs[12] & 0x0F, 1);
		assert_eq!(subs[13], dec_to_bcd(track.point));

		// The CRC seals the first ten Q bytes.
		let crc = crate::ecma130::crc16(&subs[12..22]);
		assert_eq!(subs[22], (crc >> 8) as u8);
		assert_eq!(subs[23], (crc & 0xFF) as u8);
	}

	#[test]
	fn t_sector_headers() {
		let settings = WriteSettings {
			out_mode: Some(TrackMode::Raw),
			..WriteSettings::default()
		};
		let mut burner = Burner::new(0, settings);
		burner.alba = 0;
		burner.buf.advance(SECTOR_RAW_SIZE, 1);
		burner.sector_headers(0, TrackMode::Mode1, false);

		// Unscramble to inspect the framing.
		let mut sector = [0_u8; SECTOR_RAW_SIZE];
		sector.copy_from_slice(&burner.buf.as_slice()[..SECTOR_RAW_SIZE]);
		crate::ecma130::scramble(&mut sector);

		// Sync: 00 FF*10 00.
		assert_eq!(sector[0], 0);
		assert_eq!(sector[1..11], [0xFF_u8; 10]);
		assert_eq!(sector[11], 0);

		// LBA 0 = 00:02:00, mode 1.
		assert_eq!(&sector[12..16], &[0x00, 0x02, 0x00, 0x01]);

		// The stored EDC matches a fresh computation over 0..2064.
		let crc = crate::ecma130::edc(&sector[..2064]);
		assert_eq!(&sector[2064..2068], &crc.to_le_bytes());
	}

	#[test]
	fn t_dec_to_bcd() {
		assert_eq!(dec_to_bcd(0), 0x00);
		assert_eq!(dec_to_bcd(9), 0x09);
		assert_eq!(dec_to_bcd(42), 0x42);
		assert_eq!(dec_to_bcd(75), 0x75);
	}
}
