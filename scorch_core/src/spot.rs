/*!
# Scorch: Spot Lists and Sector Bitmaps

A check run produces a `SpotList` — contiguous LBA ranges sharing a read
quality — and, optionally, a `SectorBitmap` that can be persisted and
merged into later runs so known-good sectors aren't re-read forever.
*/

use crate::ScorchError;
use dactyl::NiceU32;
use std::{
	fs::File,
	io::{
		Read,
		Write,
	},
	path::Path,
};



/// # Bitmap File Magic, Version 2.
///
/// The full 32-byte header is the magic, a six-digit left-aligned info
/// length, and a newline; the info bytes follow, then eight bytes of
/// geometry, then the raw map.
const BITMAP_MAGIC_V2: &[u8; 25] = b"xorriso sector bitmap v2 ";

/// # Bitmap File Magic, Version 1 (Full 32-Byte Header).
///
/// Same as v2 but with no info field at all.
const BITMAP_MAGIC_V1: &[u8; 32] = b"xorriso sector bitmap v1        ";



#[derive(Debug, Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
/// # Read Quality.
///
/// Ordered worst to best, so `Ord` comparisons against the configurable
/// "bad limit" sort damage from health.
pub enum ReadQuality {
	/// # Hard Read Failure.
	Unreadable,

	/// # Checksum Contradiction.
	Md5Mismatch,

	/// # Outside Any Track.
	OffTrack,

	/// # TAO End-of-Track Artifact.
	TaoEnd,

	/// # Declared Bad by a Loaded Map.
	Invalid,

	#[default]
	/// # Not Examined.
	Untested,

	/// # Declared Good by a Loaded Map.
	Valid,

	/// # Readable Only in Parts.
	Partial,

	/// # Readable, But Slowly.
	Slow,

	/// # Readable and Checksum-Confirmed.
	Md5Match,

	/// # Readable.
	Good,
}

impl ReadQuality {
	#[must_use]
	/// # Keyword.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unreadable => "unreadable",
			Self::Md5Mismatch => "md5_mismatch",
			Self::OffTrack => "off_track",
			Self::TaoEnd => "tao_end",
			Self::Invalid => "invalid",
			Self::Untested => "untested",
			Self::Valid => "valid",
			Self::Partial => "partial",
			Self::Slow => "slow",
			Self::Md5Match => "md5_match",
			Self::Good => "good",
		}
	}

	/// # From Keyword.
	///
	/// ## Errors
	///
	/// This will return an error for unknown keywords.
	pub fn from_keyword(raw: &str) -> Result<Self, ScorchError> {
		let raw = raw.trim();
		for q in [
			Self::Unreadable, Self::Md5Mismatch, Self::OffTrack, Self::TaoEnd,
			Self::Invalid, Self::Untested, Self::Valid, Self::Partial,
			Self::Slow, Self::Md5Match, Self::Good,
		] {
			if raw.eq_ignore_ascii_case(q.as_str()) { return Ok(q); }
		}
		Err(ScorchError::BadArgValue("quality".to_owned(), raw.to_owned()))
	}

	#[must_use]
	/// # Report Prefix Relative to a Bad Limit.
	///
	/// `+` is healthy, `-` is damaged, `0` is indifferent (untested and
	/// the track-layout artifacts).
	pub const fn prefix(self, bad_limit: Self) -> char {
		match self {
			Self::Untested | Self::TaoEnd | Self::OffTrack => '0',
			_ =>
				if self as u8 <= bad_limit as u8 { '-' }
				else { '+' },
		}
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # One Quality Run.
pub struct SpotItem {
	/// # First LBA.
	pub start_lba: i32,

	/// # Run Length in Blocks.
	pub blocks: i32,

	/// # Quality.
	pub quality: ReadQuality,
}



#[derive(Debug, Clone, Default)]
/// # A Sequence of Quality Runs.
///
/// Append-only during a check run; adjacent same-quality items merge on
/// arrival.
pub struct SpotList {
	/// # The Runs.
	items: Vec<SpotItem>,
}

impl SpotList {
	/// # Append a Run.
	///
	/// Contiguous with the previous run and of the same quality? Merge.
	pub fn add(&mut self, start_lba: i32, blocks: i32, quality: ReadQuality) {
		if blocks <= 0 { return; }
		if let Some(last) = self.items.last_mut() {
			if last.quality == quality &&
				last.start_lba + last.blocks == start_lba {
				last.blocks += blocks;
				return;
			}
		}
		self.items.push(SpotItem { start_lba, blocks, quality });
	}

	#[must_use]
	/// # The Runs.
	pub fn items(&self) -> &[SpotItem] { &self.items }

	#[must_use]
	/// # Run Count.
	pub fn len(&self) -> usize { self.items.len() }

	#[must_use]
	/// # Empty?
	pub fn is_empty(&self) -> bool { self.items.is_empty() }

	#[must_use]
	/// # Total Blocks of a Given Quality.
	pub fn count_blocks(&self, quality: ReadQuality) -> u64 {
		self.items.iter()
			.filter(|i| i.quality == quality)
			.map(|i| u64::try_from(i.blocks).unwrap_or(0))
			.sum()
	}

	#[must_use]
	/// # Worst Quality on Record.
	pub fn worst(&self) -> Option<ReadQuality> {
		self.items.iter().map(|i| i.quality).min()
	}

	#[must_use]
	/// # Report Lines.
	pub fn report(&self, bad_limit: ReadQuality) -> Vec<String> {
		self.items.iter()
			.map(|i| format!(
				"{} {:<12} , lba {:>9} , {:>9} blocks",
				i.quality.prefix(bad_limit),
				i.quality.as_str(),
				i.start_lba,
				NiceU32::from(u32::try_from(i.blocks).unwrap_or(0)).as_str(),
			))
			.collect()
	}

	/// # Project Onto a Bitmap.
	///
	/// Sectors whose run quality beats the bad limit get their bits set.
	#[must_use]
	pub fn to_bitmap(&self, bad_limit: ReadQuality, sector_size: u32) -> SectorBitmap {
		let sectors = self.items.iter()
			.map(|i| i.start_lba + i.blocks)
			.max()
			.and_then(|n| u32::try_from(n).ok())
			.unwrap_or(0);
		let mut map = SectorBitmap::new(sectors, sector_size);
		for item in &self.items {
			if bad_limit < item.quality {
				if let (Ok(start), Ok(blocks)) =
					(u32::try_from(item.start_lba), u32::try_from(item.blocks)) {
					map.set_range(start, blocks, true);
				}
			}
		}
		map
	}
}

impl From<&SectorBitmap> for SpotList {
	/// # Run-Length Encode a Bitmap.
	///
	/// Set bits become `Valid` runs, clear bits `Invalid` ones.
	fn from(map: &SectorBitmap) -> Self {
		let mut out = Self::default();
		for sector in 0..map.sectors() {
			let quality =
				if map.is_set(sector) { ReadQuality::Valid }
				else { ReadQuality::Invalid };
			out.add(i32::try_from(sector).unwrap_or(i32::MAX), 1, quality);
		}
		out
	}
}



#[derive(Debug, Clone, Eq, PartialEq)]
/// # A Readability Bitmap.
///
/// Bit *i* set means sector *i* read back fine. Bits pack LSB-first.
pub struct SectorBitmap {
	/// # Sector Count.
	sectors: u32,

	/// # Bytes Per Sector.
	sector_size: u32,

	/// # The Bits.
	map: Vec<u8>,
}

impl SectorBitmap {
	#[must_use]
	/// # New (All Clear).
	pub fn new(sectors: u32, sector_size: u32) -> Self {
		Self {
			sectors,
			sector_size,
			map: vec![0; sectors as usize / 8 + 1],
		}
	}

	#[must_use]
	/// # Sector Count.
	pub const fn sectors(&self) -> u32 { self.sectors }

	#[must_use]
	/// # Bytes Per Sector.
	pub const fn sector_size(&self) -> u32 { self.sector_size }

	#[must_use]
	/// # Is a Sector Marked Readable?
	pub fn is_set(&self, sector: u32) -> bool {
		sector < self.sectors &&
		self.map[sector as usize / 8] & (1 << (sector % 8)) != 0
	}

	/// # Mark One Sector.
	pub fn set(&mut self, sector: u32, value: bool) {
		if self.sectors <= sector { return; }
		if value { self.map[sector as usize / 8] |= 1 << (sector % 8); }
		else { self.map[sector as usize / 8] &= ! (1 << (sector % 8)); }
	}

	/// # Mark a Range.
	pub fn set_range(&mut self, start: u32, count: u32, value: bool) {
		for sector in start..start.saturating_add(count).min(self.sectors) {
			self.set(sector, value);
		}
	}

	#[must_use]
	/// # Is Every Sector in the Range Marked?
	pub fn is_set_range(&self, start: u32, count: u32) -> bool {
		if self.sectors < start.saturating_add(count) { return false; }
		(start..start + count).all(|s| self.is_set(s))
	}

	#[must_use]
	/// # Number of Set Bits.
	pub fn count_set(&self) -> u64 {
		(0..self.sectors).filter(|&s| self.is_set(s)).count() as u64
	}

	#[must_use]
	/// # Re-Grain to a Different Sector Size.
	///
	/// Conservative in both directions: a destination sector is marked
	/// readable only when every source sector overlapping it is marked.
	pub fn rescale(&self, sector_size: u32) -> Self {
		if sector_size == self.sector_size { return self.clone(); }
		let total_bytes = u64::from(self.sectors) * u64::from(self.sector_size);
		let sectors = u32::try_from(total_bytes.div_ceil(u64::from(sector_size)))
			.unwrap_or(u32::MAX);
		let mut out = Self::new(sectors, sector_size);

		for dst in 0..sectors {
			let lo = u64::from(dst) * u64::from(sector_size);
			let hi = lo + u64::from(sector_size);
			let src_lo = lo / u64::from(self.sector_size);
			let src_hi = hi.div_ceil(u64::from(self.sector_size));
			let all = (src_lo..src_hi.min(u64::from(self.sectors)))
				.all(|s| self.is_set(u32::try_from(s).unwrap_or(u32::MAX)));
			if all && src_lo < u64::from(self.sectors) {
				out.set(dst, true);
			}
		}
		out
	}
}

/// # Persistence.
impl SectorBitmap {
	/// # Load From a File.
	///
	/// Accepts both the v1 and v2 layouts; the v2 info field is returned
	/// alongside.
	///
	/// ## Errors
	///
	/// This will return an error if the file is unreadable or not a
	/// bitmap at all.
	pub fn from_file(path: &Path) -> Result<(Self, String), ScorchError> {
		let bad = || ScorchError::SectorMap(path.to_string_lossy().into_owned());
		let mut file = File::open(path).map_err(|_| bad())?;

		let mut head = [0_u8; 32];
		file.read_exact(&mut head).map_err(|_| bad())?;

		let mut info = String::new();
		if head == *BITMAP_MAGIC_V1 {
			// No info field.
		}
		else if head.starts_with(BITMAP_MAGIC_V2) {
			let len: usize = std::str::from_utf8(&head[25..31])
				.ok()
				.and_then(|s| s.trim().parse().ok())
				.ok_or_else(bad)?;
			let mut raw = vec![0_u8; len];
			file.read_exact(&mut raw).map_err(|_| bad())?;
			info = String::from_utf8_lossy(&raw).into_owned();
		}
		else { return Err(bad()); }

		let mut geometry = [0_u8; 8];
		file.read_exact(&mut geometry).map_err(|_| bad())?;
		let sectors = u32::from_be_bytes([geometry[0], geometry[1], geometry[2], geometry[3]]);
		let sector_size = u32::from_be_bytes([geometry[4], geometry[5], geometry[6], geometry[7]]);
		if sectors == 0 || sector_size == 0 { return Err(bad()); }

		let mut out = Self::new(sectors, sector_size);
		file.read_exact(&mut out.map).map_err(|_| bad())?;
		Ok((out, info))
	}

	/// # Save to a File (v2 Layout).
	///
	/// ## Errors
	///
	/// This will return an error if the info string is outlandish or the
	/// write fails.
	pub fn to_file(&self, path: &Path, info: &str) -> Result<(), ScorchError> {
		let bad = || ScorchError::Write(path.to_string_lossy().into_owned());
		if 999_999 < info.len() {
			return Err(ScorchError::Bug("Bitmap info string too long."));
		}

		let mut file = File::create(path).map_err(|_| bad())?;
		let head = format!(
			"{}{:<6}\n",
			std::str::from_utf8(BITMAP_MAGIC_V2).unwrap_or_default(),
			info.len(),
		);
		file.write_all(head.as_bytes()).map_err(|_| bad())?;
		file.write_all(info.as_bytes()).map_err(|_| bad())?;
		file.write_all(&self.sectors.to_be_bytes()).map_err(|_| bad())?;
		file.write_all(&self.sector_size.to_be_bytes()).map_err(|_| bad())?;
		file.write_all(&self.map).map_err(|_| bad())?;
		Ok(())
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_quality_order() {
		assert!(ReadQuality::Unreadable < ReadQuality::Md5Mismatch);
		assert!(ReadQuality::Invalid < ReadQuality::Valid);
		assert!(ReadQuality::Partial < ReadQuality::Good);
		assert!(ReadQuality::Md5Match < ReadQuality::Good);

		// Prefixes against the default bad limit.
		let limit = ReadQuality::Invalid;
		assert_eq!(ReadQuality::Good.prefix(limit), '+');
		assert_eq!(ReadQuality::Unreadable.prefix(limit), '-');
		assert_eq!(ReadQuality::Invalid.prefix(limit), '-');
		assert_eq!(ReadQuality::Untested.prefix(limit), '0');
		assert_eq!(ReadQuality::TaoEnd.prefix(limit), '0');

		assert_eq!(
			ReadQuality::from_keyword("md5_match"),
			Ok(ReadQuality::Md5Match),
		);
		assert!(ReadQuality::from_keyword("excellent").is_err());
	}

	#[test]
	fn t_spotlist_merge() {
		let mut list = SpotList::default();
		list.add(0, 16, ReadQuality::Good);
		list.add(16, 16, ReadQuality::Good); // Contiguous: merges.
		list.add(32, 8, ReadQuality::Partial);
		list.add(40, 8, ReadQuality::Good);  // New run despite quality.

		assert_eq!(list.len(), 3);
		assert_eq!(list.items()[0], SpotItem {
			start_lba: 0,
			blocks: 32,
			quality: ReadQuality::Good,
		});
		assert_eq!(list.count_blocks(ReadQuality::Good), 40);
		assert_eq!(list.worst(), Some(ReadQuality::Partial));
	}

	#[test]
	fn t_bitmap_roundtrip() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("sectors.map");

		let mut map = SectorBitmap::new(100, 2048);
		map.set_range(0, 40, true);
		map.set_range(48, 52, true);
		map.set(7, false);

		map.to_file(&path, "volid=TEST").expect("Bitmap save failed.");
		let (back, info) = SectorBitmap::from_file(&path)
			.expect("Bitmap load failed.");

		assert_eq!(map, back);
		assert_eq!(info, "volid=TEST");
		assert!(back.is_set(0));
		assert!(! back.is_set(7));
		assert!(! back.is_set(40));
		assert!(back.is_set(99));
		assert_eq!(back.count_set(), 40 + 52 - 1);
	}

	#[test]
	fn t_bitmap_v1() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("v1.map");

		// Assemble a v1 file by hand: 32-byte header, geometry, map.
		let mut raw: Vec<u8> = Vec::new();
		raw.extend_from_slice(BITMAP_MAGIC_V1);
		raw.extend_from_slice(&16_u32.to_be_bytes());
		raw.extend_from_slice(&2048_u32.to_be_bytes());
		raw.extend_from_slice(&[0b0000_1111, 0b1000_0000, 0]);
		std::fs::write(&path, raw).expect("V1 write failed.");

		let (map, info) = SectorBitmap::from_file(&path)
			.expect("V1 load failed.");
		assert!(info.is_empty());
		assert_eq!(map.sectors(), 16);
		assert!(map.is_set_range(0, 4));
		assert!(! map.is_set(4));
		assert!(map.is_set(15));
	}

	#[test]
	fn t_bitmap_rescale() {
		// 2048-byte sectors to 4096: a destination is readable only when
		// both its halves are.
		let mut map = SectorBitmap::new(8, 2048);
		map.set_range(0, 2, true); // Covers dst 0 fully.
		map.set(2, true);          // Half of dst 1.
		map.set_range(6, 2, true); // Covers dst 3 fully.

		let coarse = map.rescale(4096);
		assert_eq!(coarse.sectors(), 4);
		assert!(coarse.is_set(0));
		assert!(! coarse.is_set(1)); // Conservative.
		assert!(! coarse.is_set(2));
		assert!(coarse.is_set(3));

		// Every destination set bit is backed by at least one source bit.
		let fine = coarse.rescale(2048);
		for s in 0..fine.sectors() {
			if fine.is_set(s) {
				assert!(map.is_set(s), "Rescale invented readability.");
			}
		}
	}
}
