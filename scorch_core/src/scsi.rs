/*!
# Scorch: SCSI Primitives

The low-level vocabulary every drive conversation is built from: a transfer
buffer, a command descriptor block wrapper, and decoded sense data. All
multi-byte CDB fields are big-endian, per MMC.
*/

use crate::BUFFER_SIZE;
use std::fmt;



/// # Raw Sense Length.
///
/// Fixed-format sense data is eighteen bytes; anything extra a drive sends
/// is legal but uninteresting.
pub(crate) const SENSE_LEN: usize = 18;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Transfer Direction.
pub(crate) enum CommandDir {
	/// # Data Travels to the Drive.
	ToDrive,

	/// # Data Travels From the Drive.
	FromDrive,

	#[default]
	/// # No Payload Either Way.
	NoTransfer,
}



#[derive(Debug)]
/// # Transfer Buffer.
///
/// A fixed-size byte container passed (exclusively) to command functions.
/// The payload region covers sixteen data sectors; the slack absorbs
/// raw-mode overshoot.
pub(crate) struct ScsiBuffer {
	/// # The Bytes.
	data: Box<[u8; BUFFER_SIZE]>,

	/// # Bytes In Use.
	bytes: usize,

	/// # Whole Sectors In Use.
	sectors: usize,
}

impl Default for ScsiBuffer {
	fn default() -> Self {
		Self {
			data: Box::new([0_u8; BUFFER_SIZE]),
			bytes: 0,
			sectors: 0,
		}
	}
}

impl ScsiBuffer {
	/// # Full Backing Slice.
	pub(crate) fn as_slice(&self) -> &[u8] { self.data.as_slice() }

	/// # Full Backing Slice (Mutable).
	pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] { self.data.as_mut_slice() }

	/// # The Used Portion.
	pub(crate) fn used(&self) -> &[u8] { &self.data[..self.bytes] }

	/// # Bytes In Use.
	pub(crate) const fn bytes(&self) -> usize { self.bytes }

	/// # Sectors In Use.
	pub(crate) const fn sectors(&self) -> usize { self.sectors }

	/// # Reset the Fill Counters.
	pub(crate) fn clear(&mut self) {
		self.bytes = 0;
		self.sectors = 0;
	}

	/// # Set the Fill Counters.
	pub(crate) fn set_fill(&mut self, bytes: usize, sectors: usize) {
		self.bytes = bytes;
		self.sectors = sectors;
	}

	/// # Advance the Fill Counters.
	pub(crate) fn advance(&mut self, bytes: usize, sectors: usize) {
		self.bytes += bytes;
		self.sectors += sectors;
	}
}



#[derive(Debug, Clone)]
/// # One Drive Operation.
///
/// An operation request: the CDB itself, the transfer direction and length,
/// retry/timeout policy, and — after issue — the outcome.
pub(crate) struct Command {
	/// # Operation Code Block.
	cdb: [u8; 16],

	/// # Used CDB Length (1–16).
	cdb_len: usize,

	/// # Transfer Direction.
	dir: CommandDir,

	/// # Transfer Length in Bytes.
	xfer: usize,

	/// # Worth Retrying on Transient Failure?
	retry: bool,

	/// # Give Up After This Many Milliseconds.
	timeout_ms: u32,

	/// # Raw Sense Bytes From the Last Issue.
	sense_raw: [u8; SENSE_LEN],

	/// # Did the Last Issue Fail?
	error: bool,
}

impl Command {
	/// # New Command From a CDB Template.
	///
	/// The conventional starting point, mirroring the fixed opcode tables:
	/// copy the template, zero the rest, and fill in the variable fields
	/// afterwards.
	pub(crate) fn new(template: &[u8]) -> Self {
		let mut cdb = [0_u8; 16];
		let cdb_len = template.len().min(16);
		cdb[..cdb_len].copy_from_slice(&template[..cdb_len]);
		Self {
			cdb,
			cdb_len,
			dir: CommandDir::NoTransfer,
			xfer: 0,
			retry: false,
			timeout_ms: 30_000,
			sense_raw: [0_u8; SENSE_LEN],
			error: false,
		}
	}

	/// # Set Direction and Transfer Length.
	pub(crate) const fn transfer(mut self, dir: CommandDir, xfer: usize) -> Self {
		self.dir = dir;
		self.xfer = xfer;
		self
	}

	/// # Set the Timeout.
	pub(crate) const fn timeout(mut self, ms: u32) -> Self {
		self.timeout_ms = ms;
		self
	}

	/// # Allow a Retry.
	pub(crate) const fn with_retry(mut self) -> Self {
		self.retry = true;
		self
	}
}

/// # Field Accessors.
impl Command {
	/// # The CDB Bytes.
	pub(crate) fn cdb(&self) -> &[u8] { &self.cdb[..self.cdb_len] }

	/// # Opcode.
	pub(crate) const fn opcode(&self) -> u8 { self.cdb[0] }

	/// # Direction.
	pub(crate) const fn dir(&self) -> CommandDir { self.dir }

	/// # Transfer Length.
	pub(crate) const fn xfer(&self) -> usize { self.xfer }

	/// # Retry?
	pub(crate) const fn retry(&self) -> bool { self.retry }

	/// # Timeout (ms).
	pub(crate) const fn timeout_ms(&self) -> u32 { self.timeout_ms }

	/// # Set a Single CDB Byte.
	pub(crate) fn set_byte(&mut self, at: usize, value: u8) {
		self.cdb[at] = value;
	}

	/// # OR Bits Into a CDB Byte.
	pub(crate) fn or_byte(&mut self, at: usize, bits: u8) {
		self.cdb[at] |= bits;
	}

	/// # Write a Big-Endian `u16` Field.
	pub(crate) fn put16(&mut self, at: usize, value: u16) {
		self.cdb[at] = (value >> 8) as u8;
		self.cdb[at + 1] = (value & 0xFF) as u8;
	}

	/// # Write a Big-Endian `u32` Field.
	pub(crate) fn put32(&mut self, at: usize, value: u32) {
		self.cdb[at] = (value >> 24) as u8;
		self.cdb[at + 1] = ((value >> 16) & 0xFF) as u8;
		self.cdb[at + 2] = ((value >> 8) & 0xFF) as u8;
		self.cdb[at + 3] = (value & 0xFF) as u8;
	}
}

/// # Outcome.
impl Command {
	/// # Record the Outcome of an Issue.
	pub(crate) fn set_outcome(&mut self, error: bool, sense: &[u8]) {
		self.error = error;
		self.sense_raw = [0_u8; SENSE_LEN];
		let len = sense.len().min(SENSE_LEN);
		self.sense_raw[..len].copy_from_slice(&sense[..len]);
	}

	/// # Did the Last Issue Fail?
	pub(crate) const fn failed(&self) -> bool { self.error }

	/// # Decoded Sense, If Any.
	pub(crate) fn sense(&self) -> Option<Sense> {
		if self.error { Sense::decode(&self.sense_raw) } else { None }
	}
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Decoded Sense Data.
///
/// The (key, asc, ascq) triple drives all error branching; everything else
/// in the sense page is noise.
pub struct Sense {
	/// # Sense Key.
	pub key: u8,

	/// # Additional Sense Code.
	pub asc: u8,

	/// # Additional Sense Code Qualifier.
	pub ascq: u8,
}

impl fmt::Display for Sense {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"[{:X} {:02X} {:02X}] {}",
			self.key, self.asc, self.ascq, self.text(),
		)
	}
}

impl Sense {
	/// # Decode Raw Sense Bytes.
	///
	/// Both fixed (0x70/0x71) and descriptor (0x72/0x73) formats are
	/// understood; anything else — including an all-zero page — decodes to
	/// `None`.
	pub(crate) fn decode(raw: &[u8]) -> Option<Self> {
		match raw.first().copied()? & 0x7F {
			0x70 | 0x71 if raw.len() >= 14 => Some(Self {
				key: raw[2] & 0x0F,
				asc: raw[12],
				ascq: raw[13],
			}),
			0x72 | 0x73 if raw.len() >= 4 => Some(Self {
				key: raw[1] & 0x0F,
				asc: raw[2],
				ascq: raw[3],
			}),
			_ => None,
		}
	}

	#[must_use]
	/// # Unit Attention?
	pub const fn is_unit_attention(self) -> bool { self.key == 0x6 }

	#[must_use]
	/// # Not Ready?
	pub const fn is_not_ready(self) -> bool { self.key == 0x2 }

	#[must_use]
	/// # Invalid Opcode?
	///
	/// The classic (5,20,00) reply from drives predating a command; several
	/// operations fall back to older commands when they see it.
	pub const fn is_invalid_opcode(self) -> bool {
		self.key == 0x5 && self.asc == 0x20 && self.ascq == 0x00
	}

	#[must_use]
	/// # Human-Readable Summary.
	pub const fn text(self) -> &'static str {
		match (self.asc, self.ascq) {
			(0x04, _) => "logical unit not ready",
			(0x0C, _) => "write error",
			(0x11, _) => "unrecovered read error",
			(0x20, 0x00) => "invalid command operation code",
			(0x21, 0x00) => "lba out of range",
			(0x24, 0x00) => "invalid field in cdb",
			(0x26, _) => "invalid field in parameter list",
			(0x28, 0x00) => "medium may have changed",
			(0x29, _) => "power on, reset, or bus device reset occurred",
			(0x2C, 0x00) => "command sequence error",
			(0x30, 0x05) => "cannot write medium, incompatible format",
			(0x3A, _) => "medium not present",
			(0x63, 0x00) => "end of user area encountered on this track",
			(0x64, 0x00) => "illegal mode for this track",
			(0x72, 0x03) => "session fixation error, incomplete track in session",
			_ => match self.key {
				0x0 => "no sense",
				0x1 => "recovered error",
				0x2 => "not ready",
				0x3 => "medium error",
				0x4 => "hardware error",
				0x5 => "illegal request",
				0x6 => "unit attention",
				0x7 => "data protect",
				0xB => "aborted command",
				_ => "unclassified sense",
			},
		}
	}
}



/// # Read a Big-Endian `u16`.
pub(crate) const fn get16(raw: &[u8], at: usize) -> u16 {
	((raw[at] as u16) << 8) | raw[at + 1] as u16
}

/// # Read a Big-Endian `u32`.
pub(crate) const fn get32(raw: &[u8], at: usize) -> u32 {
	((raw[at] as u32) << 24)
	| ((raw[at + 1] as u32) << 16)
	| ((raw[at + 2] as u32) << 8)
	| raw[at + 3] as u32
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_pack_unpack() {
		let mut cmd = Command::new(&[0x2A, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
		cmd.put32(2, 0x0012_3456);
		cmd.put16(7, 16);
		assert_eq!(cmd.cdb(), &[0x2A, 0, 0, 0x12, 0x34, 0x56, 0, 0, 16, 0]);

		// And back again.
		assert_eq!(get32(cmd.cdb(), 2), 0x0012_3456);
		assert_eq!(get16(cmd.cdb(), 7), 16);
	}

	#[test]
	fn t_sense_decode() {
		// Fixed format.
		let mut raw = [0_u8; SENSE_LEN];
		raw[0] = 0x70;
		raw[2] = 0x05;
		raw[12] = 0x20;
		raw[13] = 0x00;
		let sense = Sense::decode(&raw).expect("Fixed sense failed to decode.");
		assert_eq!(sense, Sense { key: 5, asc: 0x20, ascq: 0 });
		assert!(sense.is_invalid_opcode());
		assert!(! sense.is_unit_attention());

		// Descriptor format.
		let raw = [0x72_u8, 0x06, 0x28, 0x00];
		let sense = Sense::decode(&raw).expect("Descriptor sense failed to decode.");
		assert_eq!(sense, Sense { key: 6, asc: 0x28, ascq: 0 });
		assert!(sense.is_unit_attention());

		// Garbage.
		assert!(Sense::decode(&[0_u8; SENSE_LEN]).is_none());
		assert!(Sense::decode(&[]).is_none());
	}

	#[test]
	fn t_buffer_fill() {
		let mut buf = ScsiBuffer::default();
		assert_eq!(buf.bytes(), 0);
		buf.advance(2048, 1);
		buf.advance(2048, 1);
		assert_eq!(buf.bytes(), 4096);
		assert_eq!(buf.sectors(), 2);
		buf.clear();
		assert_eq!(buf.bytes(), 0);
		assert_eq!(buf.as_slice().len(), crate::BUFFER_SIZE);
	}
}
