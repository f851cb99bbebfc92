/*!
# Scorch: Formatting

FORMAT UNIT is the most profile-opinionated command in the whole set; each
media family wants its own format type, sub-type, and parameter encoding,
all selected from the descriptor list READ FORMAT CAPACITIES hands back.
*/

use crate::{
	Command,
	CommandDir,
	Drive,
	ScorchError,
	ScsiBuffer,
	Severity,
	drive::FormatDescr,
	scsi::get32,
};
use super::{
	TIMEOUT_BLANK,
	TIMEOUT_DEFAULT,
};
use std::time::{
	Duration,
	Instant,
};



/// # READ FORMAT CAPACITIES.
const MMC_READ_FORMAT_CAPACITIES: [u8; 10] = [0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # FORMAT UNIT.
const MMC_FORMAT_UNIT: [u8; 6] = [0x04, 0x11, 0, 0, 0, 0];

/// # Descriptor List Ceiling.
const MAX_FORMAT_DESCR: usize = 32;



#[derive(Debug, Clone, Copy, Default)]
/// # Formatting Choices.
///
/// The knobs `-format` exposes, decomposed.
pub struct FormatOpts {
	/// # Size Mode: 0 = As Given, 1 = Insist on Zero, 2 = Maximum, 3 = Default.
	pub size_mode: u8,

	/// # Grow an Existing Format up to at Least the Requested Size.
	pub expand: bool,

	/// # Force Re-Format of (Partly) Formatted Media.
	pub reformat: bool,

	/// # Try to Disable Defect Management.
	pub no_defect_mgt: bool,

	/// # Skip Lengthy Media Certification.
	pub avoid_certification: bool,

	/// # Use This Format Descriptor Verbatim.
	pub descriptor_index: Option<u8>,

	/// # Enable Pseudo-Overwrite on Blank BD-R.
	pub enable_pow: bool,

	/// # Block Until the Drive Finishes.
	pub wait: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # What FORMAT UNIT Actually Did.
pub enum FormatOutcome {
	/// # Formatted (and Synced).
	Done,

	/// # Nothing Needed Doing.
	Skipped,

	/// # Kicked Off; the Caller Polls.
	Async,
}



/// # Format Capacities.
impl Drive {
	/// # READ FORMAT CAPACITIES.
	///
	/// Parse the current/maximum capacity descriptor plus up to 32
	/// formattable descriptors. When `top_wanted` names a format type,
	/// the best (largest) descriptor of that type is memorized for the
	/// FORMAT UNIT selection that usually follows.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn read_format_capacities(&mut self, top_wanted: Option<u8>)
	-> Result<(), ScorchError> {
		self.formats.clear();
		self.format_descr_type = 0;
		self.format_curr_max_size = 0;
		self.best_format_type = None;
		self.best_format_size = 0;

		let mut cmd = Command::new(&MMC_READ_FORMAT_CAPACITIES)
			.transfer(CommandDir::FromDrive, 4 + 8 + 8 * MAX_FORMAT_DESCR)
			.timeout(TIMEOUT_DEFAULT)
			.with_retry();
		cmd.put16(7, u16::try_from(cmd.xfer()).unwrap_or(u16::MAX));
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		let data = buf.as_slice();

		let list_len = usize::from(data[3]);
		if list_len < 8 { return Ok(()); }

		// The first descriptor describes the now: its low two bits say
		// whether the medium is unformatted (1), formatted (2), or absent
		// (3), and its block count the current/maximum capacity.
		self.format_descr_type = data[8] & 3;
		self.format_curr_max_size = u64::from(get32(data, 4)) * 2048;

		for raw in data[12..4 + list_len.min(8 * (MAX_FORMAT_DESCR + 1))]
			.chunks_exact(8) {
			let blocks = get32(raw, 0);
			let ftype = raw[4] >> 2;
			let tdp = (u32::from(raw[5]) << 16)
				| (u32::from(raw[6]) << 8)
				| u32::from(raw[7]);
			let descr = FormatDescr {
				ftype,
				size: u64::from(blocks) * 2048,
				tdp,
			};
			self.formats.push(descr);

			if top_wanted.is_some_and(|want| want == ftype) &&
				self.best_format_size < descr.size {
				self.best_format_type = Some(ftype);
				self.best_format_size = descr.size;
			}
		}
		Ok(())
	}

	/// # Largest Descriptor of a Type.
	fn largest_of(&self, ftype: u8) -> Option<FormatDescr> {
		self.formats.iter()
			.filter(|d| d.ftype == ftype)
			.max_by_key(|d| d.size)
			.copied()
	}

	/// # Smallest Descriptor of Given Types With at Least `size` Bytes.
	fn smallest_at_least(&self, types: &[u8], size: u64) -> Option<FormatDescr> {
		self.formats.iter()
			.filter(|d| types.contains(&d.ftype) && size <= d.size)
			.min_by_key(|d| d.size)
			.copied()
	}

	/// # Size Range Offered by a Type.
	fn size_range_of(&self, ftype: u8) -> Option<(u64, u64)> {
		let sizes: Vec<u64> = self.formats.iter()
			.filter(|d| d.ftype == ftype)
			.map(|d| d.size)
			.collect();
		match (sizes.iter().min(), sizes.iter().max()) {
			(Some(&min), Some(&max)) => Some((min, max)),
			_ => None,
		}
	}
}

/// # A Formatting Plan.
#[derive(Debug, Clone, Copy)]
struct FormatPlan {
	/// # Format Type.
	ftype: u8,

	/// # Format Sub-Type (Low Two Bits of CDB Byte 8).
	sub: u8,

	/// # Block Count For the Parameter List.
	blocks: u32,

	/// # Explicit Type-Dependent Parameter (Else the Table Default).
	tdp: Option<u32>,

	/// # FOV Bit.
	fov: bool,

	/// # DCRT + CmpList (DVD-RAM Certification Skip).
	dcrt: bool,

	/// # Restart Bit (DVD+RW Background Resume).
	restart: bool,

	/// # Caller Does the Waiting.
	return_immediately: bool,

	/// # Failure Is Tolerable.
	tolerate_failure: bool,
}

/// # FORMAT UNIT.
impl Drive {
	/// # Format the Loaded Medium.
	///
	/// Profile-dependent selection of format type and parameters; see the
	/// per-profile helpers. `size` is in bytes.
	///
	/// ## Errors
	///
	/// This will return an error if the profile cannot format, no suitable
	/// descriptor exists, or the drive refuses.
	pub fn format_unit(&mut self, size: u64, opts: FormatOpts)
	-> Result<FormatOutcome, ScorchError> {
		let profile = self.current_profile;
		let default_blocks = u32::try_from(size / 2048).unwrap_or(u32::MAX);

		let plan = if let Some(index) = opts.descriptor_index {
			self.plan_explicit(index, size, opts)?
		}
		else {
			match profile {
				0x001A => match self.plan_dvd_plus_rw(default_blocks, size, opts)? {
					Some(plan) => plan,
					None => return Ok(FormatOutcome::Skipped),
				},
				0x0013 if ! opts.reformat =>
					match self.plan_dvd_rw_quick_grow(size, opts)? {
						Some(plan) => plan,
						None => return Ok(FormatOutcome::Skipped),
					},
				0x0014 | 0x0013 => self.plan_dvd_rw_full(opts)?,
				0x0012 => self.plan_dvd_ram(size, opts)?,
				0x0041 => self.plan_bd_r(size, opts)?,
				0x0043 => self.plan_bd_re(size, opts)?,
				_ => {
					self.outpost.info(Severity::Sorry, format!(
						"Unsuitable media detected. Profile {profile:04X}h  {}",
						self.profile_name(),
					));
					return Err(ScorchError::FormatUnsupported(self.profile_name()));
				},
			}
		};

		self.send_format_unit(&plan, opts.wait)
	}

	/// # Explicitly Indexed Descriptor.
	fn plan_explicit(&mut self, index: u8, size: u64, opts: FormatOpts)
	-> Result<FormatPlan, ScorchError> {
		self.read_format_capacities(None)?;
		let descr = self.formats.get(usize::from(index)).copied()
			.ok_or(ScorchError::FormatUnsupported(self.profile_name()))?;
		if ! matches!(self.current_profile, 0x0013 | 0x0014 | 0x001A | 0x0012 | 0x0041 | 0x0043) {
			return Err(ScorchError::FormatUnsupported(self.profile_name()));
		}
		if ! matches!(
			descr.ftype,
			0x00 | 0x01 | 0x10 | 0x11 | 0x13 | 0x15 | 0x26 | 0x30 | 0x31 | 0x32,
		) {
			return Err(ScorchError::FormatUnsupported(self.profile_name()));
		}

		let blocks =
			if opts.size_mode == 2 {
				u32::try_from(descr.size / 2048).unwrap_or(u32::MAX)
			}
			else { u32::try_from(size / 2048).unwrap_or(u32::MAX) };

		let sub =
			if matches!(descr.ftype, 0x30 | 0x31) {
				bd_cert_sub_type(self.feat23h_byte4(), opts.avoid_certification)
			}
			else if descr.ftype == 0x32 ||
				(descr.ftype == 0x00 && self.current_profile == 0x0041) {
				u8::from(! opts.enable_pow)
			}
			else { 0 };

		Ok(FormatPlan {
			ftype: descr.ftype,
			sub,
			blocks,
			tdp: (descr.ftype != 0x26).then_some(descr.tdp),
			fov: true,
			dcrt: self.current_profile == 0x0012 &&
				descr.ftype != 0x01 && opts.avoid_certification,
			restart: false,
			return_immediately: true,
			tolerate_failure: false,
		})
	}

	/// # DVD+RW: Basic Format (26h).
	///
	/// Returns `None` when the background format is already in progress or
	/// complete and no re-format was demanded.
	fn plan_dvd_plus_rw(&mut self, mut blocks: u32, size: u64, opts: FormatOpts)
	-> Result<Option<FormatPlan>, ScorchError> {
		if (size == 0 && opts.size_mode != 1) || opts.size_mode == 2 || opts.expand {
			blocks = 0xFFFF_FFFF; // Maximum capacity.
		}

		if self.bg_format_status == 2 ||
			(self.bg_format_status == 3 && ! opts.reformat) {
			self.outpost.info(Severity::Note, format!(
				"FORMAT UNIT ignored. Already {}.",
				if self.bg_format_status == 2 { "in progress" } else { "completed" },
			));
			return Ok(None);
		}

		Ok(Some(FormatPlan {
			ftype: 0x26,
			sub: 0,
			blocks,
			tdp: None,
			fov: false,
			dcrt: false,
			restart: ! opts.reformat && self.bg_format_status == 1,
			return_immediately: opts.size_mode == 2,
			tolerate_failure: false,
		}))
	}

	/// # DVD-RW Restricted Overwrite: Quick Grow (13h).
	///
	/// Returns `None` when the border needs no growing (or the medium is
	/// already fully formatted / mid-format).
	fn plan_dvd_rw_quick_grow(&mut self, size: u64, opts: FormatOpts)
	-> Result<Option<FormatPlan>, ScorchError> {
		let mut tolerate_failure = false;
		let mut blocks = 0_u32;
		self.read_format_capacities(Some(0x13))?;

		if self.best_format_type == Some(0x13) {
			if self.best_format_size == 0 { return Ok(None); }
			if opts.size_mode == 2 || opts.expand {
				let mut n = u32::try_from(self.best_format_size / 2048)
					.unwrap_or(u32::MAX);
				if opts.expand {
					// Blocks needed to cover the requested size, in
					// 32 KiB chunks of sixteen blocks.
					let need = size.saturating_sub(self.format_curr_max_size);
					let diff = u32::try_from(need.div_ceil(32_768) * 16)
						.unwrap_or(u32::MAX);
					if diff < n { n = diff; }
				}
				blocks = n;
			}
		}
		else {
			if self.format_descr_type == 2 { return Ok(None); } // Formatted.
			if self.format_descr_type == 3 { // Intermediate state.
				self.needs_close_session = true;
				return Ok(None);
			}
			// Does trying make sense at all?
			tolerate_failure = true;
		}

		Ok(Some(FormatPlan {
			ftype: 0x13,
			sub: 0,
			blocks,
			tdp: None, // The table default: 16-block ECC unit.
			fov: false,
			dcrt: false,
			restart: false,
			return_immediately: false,
			tolerate_failure,
		}))
	}

	/// # DVD-RW Sequential (or Forced Re-Format): Quick (15h) or Full (00h).
	fn plan_dvd_rw_full(&mut self, opts: FormatOpts)
	-> Result<FormatPlan, ScorchError> {
		let wanted: u8 = if opts.size_mode == 2 { 0x00 } else { 0x15 };
		self.read_format_capacities(Some(wanted))?;
		let mut best = self.best_format_type;
		if best.is_none() && wanted == 0x15 {
			// Try Full when Quick isn't on offer.
			self.read_format_capacities(Some(0x00))?;
			best = self.best_format_type;
		}
		let ftype = best.ok_or_else(|| {
			self.outpost.info(
				Severity::Sorry,
				"No suitable formatting type offered by drive",
			);
			ScorchError::FormatUnsupported(self.profile_name())
		})?;

		Ok(FormatPlan {
			ftype,
			sub: 0,
			blocks: u32::try_from(self.best_format_size / 2048).unwrap_or(u32::MAX),
			tdp: None,
			fov: false,
			dcrt: false,
			restart: false,
			return_immediately: true,
			tolerate_failure: false,
		})
	}

	/// # DVD-RAM: Full (00h) or Spare Area Expansion (01h).
	fn plan_dvd_ram(&mut self, size: u64, opts: FormatOpts)
	-> Result<FormatPlan, ScorchError> {
		self.read_format_capacities(None)?;
		let descr =
			if opts.no_defect_mgt { self.largest_of(0x00) }
			else if opts.size_mode == 2 || opts.size_mode == 3 {
				self.largest_of(0x00).or_else(|| self.largest_of(0x01))
			}
			else {
				self.smallest_at_least(&[0x00, 0x01], size)
			};
		let descr = descr.ok_or_else(|| {
			self.outpost.info(
				Severity::Sorry,
				"No suitable formatting type offered by drive",
			);
			if opts.size_mode == 0 {
				let have = self.formats.iter().map(|d| d.size).max().unwrap_or(0);
				ScorchError::FormatSize(size, have)
			}
			else { ScorchError::FormatUnsupported(self.profile_name()) }
		})?;

		Ok(FormatPlan {
			ftype: descr.ftype,
			sub: 0,
			blocks: u32::try_from(descr.size / 2048).unwrap_or(u32::MAX),
			tdp: Some(descr.tdp),
			fov: true,
			dcrt: opts.avoid_certification && descr.ftype != 0x01,
			restart: false,
			return_immediately: true,
			tolerate_failure: false,
		})
	}

	/// # BD-R SRM (00h, Sub-Type POW/Plain) or Spare-Managed (32h).
	fn plan_bd_r(&mut self, mut size: u64, opts: FormatOpts)
	-> Result<FormatPlan, ScorchError> {
		self.read_format_capacities(None)?;
		if self.formats.first().is_none_or(|d| d.ftype != 0) {
			return Err(ScorchError::FormatUnsupported(self.profile_name()));
		}
		// Formatting with spares is mandatory for type 32h; "no defect
		// management" has nothing to offer here.
		if opts.no_defect_mgt {
			self.outpost.info(
				Severity::Sorry,
				"No suitable formatting type offered by drive",
			);
			return Err(ScorchError::FormatUnsupported(self.profile_name()));
		}

		let sub = u8::from(! opts.enable_pow);

		if opts.size_mode == 3 {
			// Default payload: plain type 00h.
			return Ok(FormatPlan {
				ftype: 0x00,
				sub,
				blocks: u32::try_from(self.formats[0].size / 2048).unwrap_or(u32::MAX),
				tdp: Some(self.formats[0].tdp),
				fov: true,
				dcrt: false,
				restart: false,
				return_immediately: true,
				tolerate_failure: false,
			});
		}
		if opts.size_mode == 2 {
			let descr = self.largest_of(0x32).unwrap_or(self.formats[0]);
			return Ok(FormatPlan {
				ftype: descr.ftype,
				sub,
				blocks: u32::try_from(descr.size / 2048).unwrap_or(u32::MAX),
				tdp: Some(descr.tdp),
				fov: true,
				dcrt: false,
				restart: false,
				return_immediately: true,
				tolerate_failure: false,
			});
		}

		// Size wish: round up to the 32 MiB grid and stay in the offered
		// window.
		let (min, max) = self.size_range_of(0x32).ok_or_else(||
			ScorchError::FormatUnsupported(self.profile_name())
		)?;
		if size == 0 { size = min; }
		if size % 0x10000 != 0 { size += 0x10000 - size % 0x10000; }
		if size < min || max < size {
			self.outpost.info(
				Severity::Sorry,
				"No suitable formatting type offered by drive",
			);
			return Err(ScorchError::FormatSize(size, max));
		}
		Ok(FormatPlan {
			ftype: 0x32,
			sub,
			blocks: u32::try_from(size / 2048).unwrap_or(u32::MAX),
			tdp: Some(0),
			fov: true,
			dcrt: false,
			restart: false,
			return_immediately: true,
			tolerate_failure: false,
		})
	}

	/// # BD-RE (00h / 30h With Certification Sub-Type / 31h).
	fn plan_bd_re(&mut self, mut size: u64, opts: FormatOpts)
	-> Result<FormatPlan, ScorchError> {
		self.read_format_capacities(None)?;
		if self.formats.first().is_none_or(|d| d.ftype != 0) {
			return Err(ScorchError::FormatUnsupported(self.profile_name()));
		}

		let descr =
			if opts.no_defect_mgt { self.largest_of(0x31) }
			else if opts.size_mode == 2 { self.largest_of(0x30) }
			else if opts.size_mode == 3 {
				if opts.avoid_certification {
					// Some drives refuse 30h "quick"; 00h succeeds fast.
					self.formats.iter().find(|d| d.ftype == 0x00).copied()
				}
				else {
					self.formats.iter().find(|d| d.ftype == 0x30).copied()
						.or_else(|| Some(self.formats[0]))
				}
			}
			else {
				// Size wish against the 30h window.
				let (min, max) = self.size_range_of(0x30).ok_or_else(||
					ScorchError::FormatUnsupported(self.profile_name())
				)?;
				if size == 0 { size = min; }
				if size % 0x10000 != 0 { size += 0x10000 - size % 0x10000; }
				if size < min || max < size {
					self.outpost.info(
						Severity::Sorry,
						"No suitable formatting type offered by drive",
					);
					return Err(ScorchError::FormatSize(size, max));
				}
				return Ok(FormatPlan {
					ftype: 0x30,
					sub: bd_cert_sub_type(self.feat23h_byte4(), opts.avoid_certification),
					blocks: u32::try_from(size / 2048).unwrap_or(u32::MAX),
					tdp: Some(0),
					fov: true,
					dcrt: false,
					restart: false,
					return_immediately: true,
					tolerate_failure: false,
				});
			};
		let descr = descr.ok_or_else(|| {
			self.outpost.info(
				Severity::Sorry,
				"No suitable formatting type offered by drive",
			);
			ScorchError::FormatUnsupported(self.profile_name())
		})?;

		let sub =
			if matches!(descr.ftype, 0x30 | 0x31) {
				if opts.avoid_certification || self.feat23h_byte4() & 3 == 0 {
					if ! opts.avoid_certification {
						self.outpost.info(
							Severity::Note,
							"Drive does not support media certification",
						);
					}
					0
				}
				else { bd_cert_sub_type(self.feat23h_byte4(), false) }
			}
			else { 0 };

		Ok(FormatPlan {
			ftype: descr.ftype,
			sub,
			blocks: u32::try_from(descr.size / 2048).unwrap_or(u32::MAX),
			tdp: Some(descr.tdp),
			fov: true,
			dcrt: false,
			restart: false,
			return_immediately: true,
			tolerate_failure: false,
		})
	}

	/// # Build, Send, and (Maybe) Wait.
	fn send_format_unit(&mut self, plan: &FormatPlan, wait: bool)
	-> Result<FormatOutcome, ScorchError> {
		let mut buf = ScsiBuffer::default();
		{
			let data = buf.as_mut_slice();
			data[..12].fill(0);
			data[1] = 0x02; // IMMED.
			if plan.fov { data[1] |= 0x80; }
			if plan.dcrt { data[1] |= 0x20; }
			data[3] = 8; // Format descriptor length.
			data[4..8].copy_from_slice(&plan.blocks.to_be_bytes());
			data[8] = (plan.ftype << 2) | (plan.sub & 3);

			// Type-dependent parameter: explicit value, else the table
			// defaults (2 KiB block length, or the 16-block ECC unit).
			if let Some(tdp) = plan.tdp {
				data[9] = ((tdp >> 16) & 0xFF) as u8;
				data[10] = ((tdp >> 8) & 0xFF) as u8;
				data[11] = (tdp & 0xFF) as u8;
			}
			if matches!(plan.ftype, 0x00 | 0x01 | 0x31) {
				data[9] = 0x00;
				data[10] = 0x08;
				data[11] = 0x00;
			}
			else if (0x10..=0x15).contains(&plan.ftype) {
				data[9] = 0;
				data[10] = 0;
				data[11] = 16;
			}
			if plan.restart { data[11] = 1; }
		}
		buf.set_fill(12, 0);

		let mut cmd = Command::new(&MMC_FORMAT_UNIT)
			.transfer(CommandDir::ToDrive, 12)
			.timeout(TIMEOUT_BLANK)
			.with_retry();
		if plan.dcrt { cmd.or_byte(1, 0x08); } // CmpList.

		self.outpost.info(Severity::Debug, format!(
			"Format type {:02X}h, blocks = {}",
			plan.ftype, plan.blocks,
		));

		self.issue(&mut cmd, &mut buf)?;
		if cmd.failed() {
			if plan.tolerate_failure {
				return Ok(FormatOutcome::Skipped);
			}
			let sense = cmd.sense().unwrap_or_default();
			self.outpost.info(Severity::Failure, format!(
				"SCSI error on format_unit: {sense}",
			));
			return Err(ScorchError::Scsi(sense));
		}
		if matches!(plan.ftype, 0x13 | 0x15) {
			self.needs_close_session = true;
		}

		if plan.return_immediately && ! wait {
			return Ok(FormatOutcome::Async);
		}

		// There seems to be a little race condition.
		std::thread::sleep(Duration::from_secs(1));
		let deadline = Instant::now() + Duration::from_secs(7200);
		loop {
			std::thread::sleep(Duration::from_millis(50));
			if self.test_unit_ready()? { break; }
			if deadline <= Instant::now() {
				return Err(ScorchError::Scsi(crate::Sense { key: 2, asc: 4, ascq: 4 }));
			}
		}
		self.sync_cache()?;
		Ok(FormatOutcome::Done)
	}
}



/// # BD Certification Sub-Type From Feature 23h Byte 4.
const fn bd_cert_sub_type(feat23h_byte4: u8, quick_wanted: bool) -> u8 {
	if quick_wanted {
		if feat23h_byte4 & 2 != 0 { 3 } // Quick certification.
		else { 0 }
	}
	else if feat23h_byte4 & 1 != 0 { 2 } // Full certification.
	else { 0 }
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Null Drive With Canned Format Descriptors.
	fn drive_with(profile: u16, formats: &[(u8, u64, u32)]) -> Drive {
		let mut d = Drive::null();
		d.current_profile = profile;
		for &(ftype, size, tdp) in formats {
			d.formats.push(FormatDescr { ftype, size, tdp });
		}
		d
	}

	#[test]
	fn t_bd_cert_sub_type() {
		assert_eq!(bd_cert_sub_type(0b01, false), 2); // Full.
		assert_eq!(bd_cert_sub_type(0b10, true), 3);  // Quick.
		assert_eq!(bd_cert_sub_type(0b00, false), 0);
		assert_eq!(bd_cert_sub_type(0b01, true), 0);
	}

	#[test]
	fn t_descriptor_searches() {
		let d = drive_with(0x12, &[
			(0x00, 100 << 20, 0),
			(0x00, 200 << 20, 0),
			(0x01, 50 << 20, 0),
			(0x01, 150 << 20, 0),
		]);
		assert_eq!(d.largest_of(0x00).map(|x| x.size), Some(200 << 20));
		assert_eq!(
			d.smallest_at_least(&[0x00, 0x01], 120 << 20).map(|x| (x.ftype, x.size)),
			Some((0x01, 150 << 20)),
		);
		assert_eq!(d.size_range_of(0x00), Some((100 << 20, 200 << 20)));
		assert_eq!(d.size_range_of(0x32), None);
	}

	#[test]
	fn t_bd_r_size_window() {
		// A size wish below the offered window is a polite failure; the
		// exact minimum works out.
		let mut d = drive_with(0x41, &[
			(0x00, 25_025_314_816, 0),
			(0x32, 10 << 20, 256),
			(0x32, 100 << 20, 1024),
		]);
		let plan = d.plan_bd_r(10 << 20, FormatOpts::default())
			.expect("Exact-min BD-R plan failed.");
		assert_eq!(plan.ftype, 0x32);
		assert_eq!(plan.blocks, (10 << 20) / 2048);

		assert!(matches!(
			d.plan_bd_r(1 << 20, FormatOpts::default()),
			Err(ScorchError::FormatSize(_, _)),
		));

		// No defect management cannot be honored on BD-R.
		assert!(d.plan_bd_r(
			10 << 20,
			FormatOpts { no_defect_mgt: true, ..FormatOpts::default() },
		).is_err());
	}

	#[test]
	fn t_dvd_plus_rw_skip() {
		// Background format already complete: a plain format is skipped...
		let mut d = drive_with(0x1A, &[]);
		d.bg_format_status = 3;
		assert!(
			d.plan_dvd_plus_rw(0, 0, FormatOpts::default())
				.expect("DVD+RW plan failed.")
				.is_none(),
		);

		// ...unless a re-format is demanded.
		let plan = d.plan_dvd_plus_rw(
			0, 0,
			FormatOpts { reformat: true, ..FormatOpts::default() },
		).expect("DVD+RW re-format plan failed.").expect("Plan missing.");
		assert_eq!(plan.ftype, 0x26);
		assert_eq!(plan.blocks, 0xFFFF_FFFF);
		assert!(! plan.restart);

		// A started-but-idle background format resumes via Restart.
		d.bg_format_status = 1;
		let plan = d.plan_dvd_plus_rw(0, 0, FormatOpts::default())
			.expect("DVD+RW resume plan failed.").expect("Plan missing.");
		assert!(plan.restart);
	}
}
