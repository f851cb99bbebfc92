/*!
# Scorch: Media Verification

The check engine sweeps an LBA window in chunks, classifying each range by
how its readback went. Failures are bisected down to single blocks when
retries are allowed, recovered data can be siphoned into a file, and the
whole result can round-trip through a sector bitmap so the next run skips
what's already known good.
*/

use crate::{
	Drive,
	KillSwitch,
	Outpost,
	ReadQuality,
	ScorchError,
	SectorBitmap,
	Severity,
	SpotList,
	SECTOR_DATA_SIZE,
};
use std::{
	fs::OpenOptions,
	io::{
		Seek,
		SeekFrom,
		Write,
	},
	path::PathBuf,
	time::Instant,
};



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Which Side to Read.
pub enum CheckUse {
	#[default]
	/// # The Input Drive.
	Indev,

	/// # The Output Drive.
	Outdev,

	/// # No Reading; Render a Stored Sector Map.
	SectorMap,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # What to Sweep.
pub enum CheckWhat {
	/// # The Recorded Tracks.
	#[default]
	Tracks,

	/// # The ISO Image Range.
	Image,

	/// # Everything Addressable.
	Disc,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Report Shape.
pub enum CheckReportMode {
	#[default]
	/// # One Line Per Quality Run.
	Blocks,

	/// # Affected Image Files.
	Files,

	/// # Both.
	BlocksFiles,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Retry Policy.
pub enum CheckRetry {
	#[default]
	/// # Bisect When the Chunk Is Larger Than a Block.
	Default,

	/// # Always Bisect.
	On,

	/// # Never Bisect.
	Off,
}



#[derive(Debug, Clone, Default)]
/// # A Media Check Job.
///
/// All the knobs `-check_media` exposes, in one bag. Options are set
/// builder-style or parsed from `key=value` tokens.
pub struct CheckMediaJob {
	/// # Which Drive.
	pub use_drive: CheckUse,

	/// # What Range Family.
	pub what: CheckWhat,

	/// # Window Start (Negative = From Layout).
	pub min_lba: i32,

	/// # Window End (Negative = From Layout).
	pub max_lba: i32,

	/// # Sectors Per Read Chunk.
	pub min_block_size: u32,

	/// # Parallel Chunk Hint (Accepted, Currently Serialized).
	pub async_chunks: u32,

	/// # Overall Time Budget in Seconds (0 = None).
	pub time_limit_sec: u64,

	/// # Spot Item Budget (0 = None).
	pub item_limit: u64,

	/// # Stop When This File Appears.
	pub abort_file_path: Option<PathBuf>,

	/// # Copy Recovered Data Here.
	pub data_to_path: Option<PathBuf>,

	/// # Byte Offset Into the Recovery File.
	pub data_to_offset: u64,

	/// # Byte Budget For the Recovery File (0 = None).
	pub data_to_limit: u64,

	/// # Patch the Recovery File's Head From Another LBA.
	pub patch_lba0: bool,

	/// # Source LBA For the Patch.
	pub patch_lba0_msc1: Option<i32>,

	/// # Sector Map to Merge and Update.
	pub sector_map_path: Option<PathBuf>,

	/// # Only Trust the Map When the Volume Id Matches.
	pub map_with_volid: bool,

	/// # Volume Id For Map Tagging.
	pub volid: String,

	/// # Retry Policy.
	pub retry: CheckRetry,

	/// # Report Shape.
	pub report_mode: CheckReportMode,

	/// # Severity For the Damage Summary Event.
	pub event_severity: Option<Severity>,

	/// # Slow-Read Threshold in Seconds (0 = Off).
	pub slow_sec: f64,

	/// # Treat Untested Map Sectors as Valid.
	pub untested_valid: bool,

	/// # Quality At or Below Which a Range Counts Damaged.
	pub bad_limit: ReadQuality,

	/// # Expected MD5 Sums: (start_lba, blocks, digest).
	pub md5_ranges: Vec<(i32, i32, [u8; 16])>,
}

impl CheckMediaJob {
	#[must_use]
	/// # Sensible Defaults.
	pub fn new() -> Self {
		Self {
			min_lba: -1,
			max_lba: -1,
			min_block_size: 16,
			bad_limit: ReadQuality::Invalid,
			slow_sec: 1.0,
			..Self::default()
		}
	}

	/// # Apply One `key=value` Token.
	///
	/// ## Errors
	///
	/// This will return an error for unknown keys or unusable values.
	pub fn set_param(&mut self, token: &str) -> Result<(), ScorchError> {
		let bad = || ScorchError::BadArgValue(
			"-check_media".to_owned(),
			token.to_owned(),
		);
		let (key, value) = token.split_once('=').unwrap_or((token, ""));
		match key {
			"use" => self.use_drive = match value {
				"indev" => CheckUse::Indev,
				"outdev" => CheckUse::Outdev,
				"sector_map" => CheckUse::SectorMap,
				_ => return Err(bad()),
			},
			"what" => self.what = match value {
				"tracks" => CheckWhat::Tracks,
				"image" => CheckWhat::Image,
				"disc" => CheckWhat::Disc,
				_ => return Err(bad()),
			},
			"min_lba" => self.min_lba = value.parse().map_err(|_| bad())?,
			"max_lba" => self.max_lba = value.parse().map_err(|_| bad())?,
			"chunk_size" | "min_block_size" => {
				let bytes: u64 = parse_size(value).ok_or_else(bad)?;
				self.min_block_size =
					u32::try_from(bytes / SECTOR_DATA_SIZE as u64)
						.map_err(|_| bad())?
						.max(1);
			},
			"async_chunks" => self.async_chunks = value.parse().map_err(|_| bad())?,
			"time_limit" => self.time_limit_sec = value.parse().map_err(|_| bad())?,
			"item_limit" => self.item_limit = value.parse().map_err(|_| bad())?,
			"abort_file" => self.abort_file_path = Some(PathBuf::from(value)),
			"data_to" => self.data_to_path = Some(PathBuf::from(value)),
			"data_to_offset" => self.data_to_offset = value.parse().map_err(|_| bad())?,
			"data_to_limit" => self.data_to_limit = parse_size(value).ok_or_else(bad)?,
			"patch_lba0" => match value {
				"on" => self.patch_lba0 = true,
				"off" => self.patch_lba0 = false,
				lba => {
					self.patch_lba0 = true;
					self.patch_lba0_msc1 = Some(lba.parse().map_err(|_| bad())?);
				},
			},
			"sector_map" => self.sector_map_path = Some(PathBuf::from(value)),
			"map_with_volid" => self.map_with_volid = value == "on",
			"retry" => self.retry = match value {
				"default" => CheckRetry::Default,
				"on" => CheckRetry::On,
				"off" => CheckRetry::Off,
				_ => return Err(bad()),
			},
			"report" => self.report_mode = match value {
				"blocks" => CheckReportMode::Blocks,
				"files" => CheckReportMode::Files,
				"blocks_files" => CheckReportMode::BlocksFiles,
				_ => return Err(bad()),
			},
			"event" => self.event_severity = Some(Severity::from_keyword(value)?),
			"slow_limit" => self.slow_sec = value.parse().map_err(|_| bad())?,
			"untested" => self.untested_valid = value == "damaged" || value == "valid",
			"bad_limit" => self.bad_limit = ReadQuality::from_keyword(value)?,
			_ => return Err(bad()),
		}
		Ok(())
	}
}



/// # One Run's Results.
#[derive(Debug)]
pub struct CheckOutcome {
	/// # The Quality Runs.
	pub spotlist: SpotList,

	/// # The Updated Readability Map.
	pub bitmap: SectorBitmap,

	/// # Was the Run Cut Short?
	pub aborted: bool,
}



/// # Block Supply For a Check Run.
///
/// An indirection so the engine can be exercised against synthetic damage
/// as well as real drives.
pub(crate) trait BlockReader {
	/// # Read `count` Data Sectors at `lba`.
	///
	/// ## Errors
	///
	/// This will return an error when any sector in the range won't come.
	fn read_chunk(&mut self, lba: i32, count: u32, out: &mut [u8])
	-> Result<(), ScorchError>;

	/// # Total Addressable Sectors.
	fn capacity(&mut self) -> u32;
}

impl BlockReader for Drive {
	fn read_chunk(&mut self, lba: i32, count: u32, out: &mut [u8])
	-> Result<(), ScorchError> {
		let lba = u32::try_from(lba)
			.map_err(|_| ScorchError::Bug("Negative check LBA."))?;
		self.read_blocks(lba, u16::try_from(count).unwrap_or(u16::MAX), out)
	}

	fn capacity(&mut self) -> u32 {
		if 0 < self.last_leadout {
			u32::try_from(self.last_leadout).unwrap_or(0)
		}
		else { self.read_capacity }
	}
}



/// # Run a Check Job.
///
/// ## Errors
///
/// This will return an error for configuration problems (bad window, dead
/// recovery file); read failures are data, not errors.
pub(crate) fn check_media(
	reader: &mut dyn BlockReader,
	job: &CheckMediaJob,
	outpost: &Outpost,
	killed: &KillSwitch,
) -> Result<CheckOutcome, ScorchError> {
	let started = Instant::now();
	let chunk = job.min_block_size.max(1);

	// Resolve the window.
	let min_lba = job.min_lba.max(0);
	let max_lba =
		if 0 <= job.max_lba { job.max_lba }
		else {
			i32::try_from(reader.capacity()).unwrap_or(i32::MAX) - 1
		};
	if max_lba < min_lba {
		return Err(ScorchError::BadArgValue(
			"-check_media".to_owned(),
			format!("min_lba={min_lba} > max_lba={max_lba}"),
		));
	}
	let total_sectors = u32::try_from(max_lba - min_lba + 1).unwrap_or(0);

	// A prior sector map keeps known-good sectors from being re-read, if
	// its identity matches.
	let prior = load_prior_map(job, outpost);

	// The recovery file, if any.
	let mut data_to = match &job.data_to_path {
		Some(path) => Some(
			OpenOptions::new()
				.write(true)
				.create(true)
				.open(path)
				.map_err(|_| ScorchError::Write(path.to_string_lossy().into_owned()))?,
		),
		None => None,
	};

	let mut spots = SpotList::default();
	let mut bitmap = SectorBitmap::new(
		u32::try_from(max_lba + 1).unwrap_or(0),
		SECTOR_DATA_SIZE as u32,
	);
	if let Some(prior) = &prior {
		for s in 0..prior.sectors().min(bitmap.sectors()) {
			if prior.is_set(s) { bitmap.set(s, true); }
		}
	}

	let mut md5 = Md5Ranges::new(&job.md5_ranges);
	let mut buf = vec![0_u8; chunk as usize * SECTOR_DATA_SIZE];
	let mut aborted = false;
	let mut lba = min_lba;

	while lba <= max_lba {
		// Cooperative abort checks come first.
		if killed.killed() ||
			job.abort_file_path.as_deref().is_some_and(std::path::Path::exists) ||
			(0 < job.time_limit_sec &&
				job.time_limit_sec < started.elapsed().as_secs()) ||
			(0 < job.item_limit && job.item_limit <= spots.len() as u64) {
			aborted = true;
			spots.add(lba, max_lba - lba + 1, ReadQuality::Untested);
			break;
		}

		let count = chunk.min(u32::try_from(max_lba - lba + 1).unwrap_or(chunk));
		let bytes = count as usize * SECTOR_DATA_SIZE;

		// Already vouched for by the prior map? (With `untested=valid`,
		// even clear map bits count as vouched.)
		if let Some(prior) = &prior {
			let vouched = u32::try_from(lba).is_ok_and(|start|
				start + count <= prior.sectors() &&
				(job.untested_valid || prior.is_set_range(start, count))
			);
			if vouched {
				spots.add(lba, count as i32, ReadQuality::Valid);
				lba += count as i32;
				md5.skip(lba);
				continue;
			}
		}

		let before = Instant::now();
		match reader.read_chunk(lba, count, &mut buf[..bytes]) {
			Ok(()) => {
				let quality =
					if 0.0 < job.slow_sec &&
						job.slow_sec < before.elapsed().as_secs_f64() {
						ReadQuality::Slow
					}
					else { ReadQuality::Good };
				spots.add(lba, count as i32, quality);
				bitmap.set_range(u32::try_from(lba).unwrap_or(0), count, true);
				md5.feed(lba, count, &buf[..bytes], &mut spots, outpost, job);
				siphon(&mut data_to, job, min_lba, lba, &buf[..bytes])?;
			},
			Err(_) if job.retry != CheckRetry::Off && 1 < count => {
				// Bisect down to single blocks: the survivors get pulled
				// out, the chunk as a whole is recorded as partial (or
				// unreadable, if nothing came), and the casualties are
				// named in nested unreadable runs.
				let mut any_good = false;
				let mut block = vec![0_u8; SECTOR_DATA_SIZE];
				let mut bad_runs: Vec<(i32, i32)> = Vec::new();
				for i in 0..count as i32 {
					let one = lba + i;
					if reader.read_chunk(one, 1, &mut block).is_ok() {
						any_good = true;
						bitmap.set(u32::try_from(one).unwrap_or(0), true);
						siphon(&mut data_to, job, min_lba, one, &block)?;
					}
					else if let Some(last) = bad_runs.last_mut()
						.filter(|(s, b)| *s + *b == one) {
						last.1 += 1;
					}
					else { bad_runs.push((one, 1)); }
				}
				spots.add(
					lba,
					count as i32,
					if any_good { ReadQuality::Partial }
					else { ReadQuality::Unreadable },
				);
				for (start, blocks) in bad_runs {
					spots.add(start, blocks, ReadQuality::Unreadable);
				}
				md5.poison(lba);
			},
			Err(_) => {
				spots.add(lba, count as i32, ReadQuality::Unreadable);
				md5.poison(lba);
			},
		}
		lba += count as i32;
	}

	// The head patch, when asked for: the first 32 bytes of a nominated
	// sector overwrite the head of the recovery file.
	if job.patch_lba0 && ! aborted {
		if let (Some(file), Some(src)) = (&mut data_to, job.patch_lba0_msc1) {
			let mut block = vec![0_u8; SECTOR_DATA_SIZE];
			if reader.read_chunk(src, 1, &mut block).is_ok() {
				file.seek(SeekFrom::Start(0))
					.and_then(|_| file.write_all(&block[..32]))
					.map_err(|_| ScorchError::Write(
						job.data_to_path.as_ref()
							.map(|p| p.to_string_lossy().into_owned())
							.unwrap_or_default(),
					))?;
			}
		}
	}

	// Persist the refreshed map.
	if let Some(path) = &job.sector_map_path {
		let info =
			if job.volid.is_empty() { String::new() }
			else { format!("volid={}\n", job.volid) };
		bitmap.to_file(path, &info)?;
	}

	// One summary event for real damage.
	let unreadable = spots.count_blocks(ReadQuality::Unreadable);
	let mismatched = spots.count_blocks(ReadQuality::Md5Mismatch);
	if 0 < unreadable + mismatched {
		outpost.info(
			job.event_severity.unwrap_or(Severity::Sorry),
			format!(
				"Event triggered by media damage: {unreadable} unreadable, {mismatched} mismatching of {total_sectors} blocks",
			),
		);
	}

	Ok(CheckOutcome { spotlist: spots, bitmap, aborted })
}



/// # Load (and Vet) the Prior Sector Map.
fn load_prior_map(job: &CheckMediaJob, outpost: &Outpost) -> Option<SectorBitmap> {
	let path = job.sector_map_path.as_deref()?;
	if ! path.exists() { return None; }
	match SectorBitmap::from_file(path) {
		Ok((map, info)) => {
			if job.map_with_volid && ! job.volid.is_empty() &&
				! info.contains(&format!("volid={}", job.volid)) {
				outpost.info(
					Severity::Warning,
					"Sector map belongs to another volume; starting fresh.",
				);
				return None;
			}
			Some(map.rescale(SECTOR_DATA_SIZE as u32))
		},
		Err(err) => {
			outpost.oops(&err);
			None
		},
	}
}

/// # Write Recovered Data Into the Recovery File.
fn siphon(
	data_to: &mut Option<std::fs::File>,
	job: &CheckMediaJob,
	min_lba: i32,
	lba: i32,
	data: &[u8],
) -> Result<(), ScorchError> {
	let Some(file) = data_to else { return Ok(()); };
	let rel = u64::try_from(lba - min_lba).unwrap_or(0) * SECTOR_DATA_SIZE as u64;
	let at = job.data_to_offset + rel;

	let mut take = data.len() as u64;
	if 0 < job.data_to_limit {
		if job.data_to_limit <= rel { return Ok(()); }
		take = take.min(job.data_to_limit - rel);
	}

	file.seek(SeekFrom::Start(at))
		.and_then(|_| file.write_all(&data[..usize::try_from(take).unwrap_or(0)]))
		.map_err(|_| ScorchError::Write(
			job.data_to_path.as_ref()
				.map(|p| p.to_string_lossy().into_owned())
				.unwrap_or_default(),
		))
}



/// # Running MD5 Comparisons.
struct Md5Ranges {
	/// # (start, blocks, expected, context, poisoned).
	runs: Vec<(i32, i32, [u8; 16], md5::Context, bool)>,
}

impl Md5Ranges {
	/// # New From Job Config.
	fn new(ranges: &[(i32, i32, [u8; 16])]) -> Self {
		Self {
			runs: ranges.iter()
				.map(|&(start, blocks, digest)|
					(start, blocks, digest, md5::Context::new(), false)
				)
				.collect(),
		}
	}

	/// # Feed a Successfully Read Chunk.
	///
	/// Ranges are expected to be fed monotonically; any that complete are
	/// judged on the spot.
	fn feed(
		&mut self,
		lba: i32,
		count: u32,
		data: &[u8],
		spots: &mut SpotList,
		outpost: &Outpost,
		job: &CheckMediaJob,
	) {
		for (start, blocks, expected, ctx, poisoned) in &mut self.runs {
			let end = *start + *blocks;
			let chunk_end = lba + count as i32;
			if *poisoned || end <= lba || chunk_end <= *start { continue; }

			// Clip the chunk to the range.
			let lo = lba.max(*start);
			let hi = chunk_end.min(end);
			let off = usize::try_from(lo - lba).unwrap_or(0) * SECTOR_DATA_SIZE;
			let len = usize::try_from(hi - lo).unwrap_or(0) * SECTOR_DATA_SIZE;
			ctx.consume(&data[off..off + len]);

			if hi == end {
				let got: [u8; 16] = ctx.clone().compute().0;
				if got == *expected {
					spots.add(*start, *blocks, crate::ReadQuality::Md5Match);
				}
				else {
					spots.add(*start, *blocks, crate::ReadQuality::Md5Mismatch);
					outpost.info(
						job.event_severity.unwrap_or(Severity::Sorry),
						format!("MD5 mismatch over lba {start}, {blocks} blocks"),
					);
				}
				*poisoned = true; // Judged; no further feeding.
			}
		}
	}

	/// # A Read Failure Voids Any Range Covering That Chunk.
	fn poison(&mut self, lba: i32) {
		for (start, blocks, _, _, poisoned) in &mut self.runs {
			if *start <= lba && lba < *start + *blocks { *poisoned = true; }
		}
	}

	/// # Skipped (Map-Vouched) Sectors Void Their Ranges Too.
	fn skip(&mut self, lba: i32) {
		self.poison(lba - 1);
	}
}



/// # Parse a Size With Optional k/m/g Suffix.
pub(crate) fn parse_size(raw: &str) -> Option<u64> {
	let raw = raw.trim();
	if raw.is_empty() { return None; }
	let (num, mult) = match raw.as_bytes()[raw.len() - 1] {
		b'k' | b'K' => (&raw[..raw.len() - 1], 1024),
		b'm' | b'M' => (&raw[..raw.len() - 1], 1024 * 1024),
		b'g' | b'G' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
		b's' | b'S' => (&raw[..raw.len() - 1], SECTOR_DATA_SIZE as u64),
		_ => (raw, 1),
	};
	num.trim().parse::<u64>().ok().map(|n| n * mult)
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Fake Medium With Declared Dead Sectors.
	struct FakeMedium {
		/// # Total Sectors.
		sectors: u32,

		/// # Unreadable Ranges (Inclusive).
		dead: Vec<(i32, i32)>,
	}

	impl BlockReader for FakeMedium {
		fn read_chunk(&mut self, lba: i32, count: u32, out: &mut [u8])
		-> Result<(), ScorchError> {
			let end = lba + count as i32 - 1;
			for &(lo, hi) in &self.dead {
				if lba <= hi && lo <= end {
					return Err(ScorchError::Read("fake".to_owned()));
				}
			}
			for (i, b) in out.iter_mut().enumerate() {
				*b = ((lba as usize * SECTOR_DATA_SIZE + i) % 251) as u8;
			}
			Ok(())
		}

		fn capacity(&mut self) -> u32 { self.sectors }
	}

	#[test]
	fn t_clean_sweep() {
		let mut medium = FakeMedium { sectors: 100, dead: Vec::new() };
		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("Clean sweep failed.");

		assert!(! out.aborted);
		assert_eq!(out.spotlist.len(), 1);
		assert_eq!(out.spotlist.items()[0].quality, ReadQuality::Good);
		assert_eq!(out.spotlist.items()[0].blocks, 100);
		assert!(out.bitmap.is_set_range(0, 100));
	}

	#[test]
	fn t_bisected_damage() {
		// Sectors 40..=45 are dead; chunks are sixteen sectors. The run
		// covering 32..48 must come back partial with a nested
		// unreadable 40..=45, bracketed by good runs.
		let mut medium = FakeMedium { sectors: 100, dead: vec![(40, 45)] };
		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;
		job.retry = CheckRetry::On;

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("Damaged sweep failed.");

		let items = out.spotlist.items();
		assert_eq!(items.len(), 4);
		assert_eq!(
			(items[0].start_lba, items[0].blocks, items[0].quality),
			(0, 32, ReadQuality::Good),
		);
		assert_eq!(
			(items[1].start_lba, items[1].blocks, items[1].quality),
			(32, 16, ReadQuality::Partial),
		);
		assert_eq!(
			(items[2].start_lba, items[2].blocks, items[2].quality),
			(40, 6, ReadQuality::Unreadable),
		);
		assert_eq!(
			(items[3].start_lba, items[3].blocks, items[3].quality),
			(48, 52, ReadQuality::Good),
		);

		// The bitmap agrees sector by sector.
		for s in 0..100_u32 {
			assert_eq!(out.bitmap.is_set(s), ! (40..=45).contains(&s));
		}

		// Item count stays within the chunk arithmetic bound... plus the
		// nested damage detail.
		assert!(out.spotlist.len() <= (100_usize.div_ceil(16)) + 1);
	}

	#[test]
	fn t_no_retry() {
		let mut medium = FakeMedium { sectors: 32, dead: vec![(5, 5)] };
		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;
		job.retry = CheckRetry::Off;

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("No-retry sweep failed.");

		// The whole first chunk is written off.
		assert_eq!(out.spotlist.items()[0].quality, ReadQuality::Unreadable);
		assert_eq!(out.spotlist.items()[0].blocks, 16);
	}

	#[test]
	fn t_data_recovery() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("salvage.bin");

		let mut medium = FakeMedium { sectors: 32, dead: vec![(3, 3)] };
		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;
		job.retry = CheckRetry::On;
		job.min_block_size = 4;
		job.data_to_path = Some(path.clone());

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("Recovery sweep failed.");
		assert_eq!(out.spotlist.count_blocks(ReadQuality::Unreadable), 1);

		let raw = std::fs::read(&path).expect("Salvage file missing.");
		assert_eq!(raw.len(), 32 * SECTOR_DATA_SIZE);

		// Sector 2 content survives; the dead sector is a hole (zeros).
		let s2 = &raw[2 * SECTOR_DATA_SIZE..3 * SECTOR_DATA_SIZE];
		assert!(s2.iter().enumerate().all(|(i, &b)|
			b == ((2 * SECTOR_DATA_SIZE + i) % 251) as u8
		));
		let s3 = &raw[3 * SECTOR_DATA_SIZE..4 * SECTOR_DATA_SIZE];
		assert!(s3.iter().all(|&b| b == 0));
	}

	#[test]
	fn t_sector_map_merge() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("sectors.map");

		// First pass: everything readable; map saved.
		let mut medium = FakeMedium { sectors: 64, dead: Vec::new() };
		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;
		job.sector_map_path = Some(path.clone());
		job.volid = "SALVAGE".to_owned();

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("First pass failed.");
		assert_eq!(out.spotlist.items()[0].quality, ReadQuality::Good);
		assert!(path.is_file());

		// Second pass: the medium "rots", but the map vouches for it, so
		// nothing gets re-read and everything reports valid.
		let mut medium = FakeMedium { sectors: 64, dead: vec![(0, 63)] };
		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("Second pass failed.");
		assert_eq!(out.spotlist.items()[0].quality, ReadQuality::Valid);
		assert_eq!(out.spotlist.items()[0].blocks, 64);
	}

	#[test]
	fn t_md5_ranges() {
		let mut medium = FakeMedium { sectors: 32, dead: Vec::new() };

		// Compute the honest digest for sectors 0..16.
		let mut raw = vec![0_u8; 16 * SECTOR_DATA_SIZE];
		medium.read_chunk(0, 16, &mut raw).expect("Fake read failed.");
		let good: [u8; 16] = md5::compute(&raw).0;

		let mut job = CheckMediaJob::new();
		job.slow_sec = 0.0;
		job.md5_ranges = vec![
			(0, 16, good),
			(16, 16, [0_u8; 16]), // Deliberately wrong.
		];

		let out = check_media(
			&mut medium, &job, &Outpost::default(), &KillSwitch::default(),
		).expect("MD5 sweep failed.");

		assert_eq!(out.spotlist.count_blocks(ReadQuality::Md5Match), 16);
		assert_eq!(out.spotlist.count_blocks(ReadQuality::Md5Mismatch), 16);
	}

	#[test]
	fn t_parse_size() {
		assert_eq!(parse_size("2048"), Some(2048));
		assert_eq!(parse_size("32k"), Some(32 * 1024));
		assert_eq!(parse_size("1m"), Some(1 << 20));
		assert_eq!(parse_size("4s"), Some(4 * 2048));
		assert_eq!(parse_size(""), None);
		assert_eq!(parse_size("lots"), None);
	}

	#[test]
	fn t_set_param() {
		let mut job = CheckMediaJob::new();
		for token in [
			"use=outdev", "what=disc", "min_lba=100", "max_lba=200",
			"chunk_size=32k", "retry=off", "report=blocks_files",
			"bad_limit=valid", "event=FAILURE", "slow_limit=2.5",
			"sector_map=/tmp/map", "map_with_volid=on",
		] {
			job.set_param(token).expect("Param refused.");
		}
		assert_eq!(job.use_drive, CheckUse::Outdev);
		assert_eq!(job.what, CheckWhat::Disc);
		assert_eq!(job.min_lba, 100);
		assert_eq!(job.max_lba, 200);
		assert_eq!(job.min_block_size, 16);
		assert_eq!(job.retry, CheckRetry::Off);
		assert_eq!(job.report_mode, CheckReportMode::BlocksFiles);
		assert_eq!(job.bad_limit, ReadQuality::Valid);
		assert_eq!(job.event_severity, Some(Severity::Failure));
		assert!(job.map_with_volid);

		assert!(job.set_param("nonsense=1").is_err());
		assert!(job.set_param("retry=maybe").is_err());
	}
}
