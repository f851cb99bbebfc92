/*!
# Scorch: Drive Commands

Acquisition, media surgery (blank/format), speed, the TOC report, and the
check-media front end.
*/

use crate::{
	Drive,
	DriveRole,
	MediaStatus,
	ReadQuality,
	ScorchError,
	Severity,
	SpotList,
	check::{
		self,
		CheckReportMode,
		CheckUse,
		CheckWhat,
	},
	mmc::{
		BlankMode,
		format::{
			FormatOpts,
			FormatOutcome,
		},
	},
	msg::shell_quote,
	pattern::compile_glob,
	profile,
	SECTOR_DATA_SIZE,
	SectorBitmap,
	tree::IsoTree,
};
use super::{
	Shell,
	cmd_global::on_off,
};



impl Shell {
	/// # `-dev` / `-indev` / `-outdev ADDR`
	///
	/// An empty address releases the side(s); anything else is vetted
	/// against the drive classes and acquired. `-dev` joins both sides
	/// onto one handle.
	pub(crate) fn cmd_dev(&mut self, addr: &str, input: bool, output: bool)
	-> Result<(), ScorchError> {
		// Release whatever occupies the requested side(s).
		if input {
			if let Some(drive) = self.indev.take() { drive.release(false)?; }
			if self.dev_joined {
				self.dev_joined = false;
				if let Some(drive) = self.outdev.take() { drive.release(false)?; }
			}
		}
		if output {
			if let Some(drive) = self.outdev.take() { drive.release(false)?; }
		}
		if addr.is_empty() { return Ok(()); }

		self.vet_drive_address(addr)?;

		let mut drive = Drive::acquire(addr, output)?;
		drive.set_outpost(self.outpost.clone());
		drive.set_stream_recording(self.stream_recording.0, self.stream_recording.1);
		if let Some((r, w)) = self.speed_wish {
			if drive.role() == DriveRole::Mmc {
				let _res = drive.set_speed(r, w);
			}
		}
		self.outpost.info(Severity::Update, format!(
			"Drive current: {} , media: {} , status: medium {}",
			shell_quote(addr),
			drive.profile_name(),
			drive.status(),
		));

		if input && output {
			self.dev_joined = true;
			self.outdev = Some(drive);
		}
		else if output {
			self.dev_joined = false;
			self.outdev = Some(drive);
		}
		else {
			self.indev = Some(drive);
		}

		// Reading sides bring an image along when there is one.
		if input {
			let loaded = {
				let drive = self.indrive_mut()?;
				drive.status() == MediaStatus::Appendable ||
				drive.status() == MediaStatus::Full
			};
			if loaded {
				let mut tree = std::mem::take(&mut self.tree);
				let res = tree.load_session(self.indrive_mut()?, -1);
				self.tree = tree;
				if let Err(err) = res {
					self.outpost.info(
						Severity::Note,
						format!("No loadable image found: {err}"),
					);
				}
			}
		}
		Ok(())
	}

	/// # Check an Address Against the Drive Classes.
	fn vet_drive_address(&self, addr: &str) -> Result<(), ScorchError> {
		for (class, pattern) in &self.drive_classes {
			let rx = compile_glob(pattern)?;
			if rx.is_match(addr) && class == "banned" {
				return Err(ScorchError::Device(addr.to_owned()));
			}
		}
		Ok(())
	}

	/// # `-drive_class CLASS PATTERN`
	pub(crate) fn cmd_drive_class(&mut self, class: &str, pattern: &str)
	-> Result<(), ScorchError> {
		if ! matches!(class, "banned" | "caution" | "harmless" | "clear_list") {
			return Err(ScorchError::BadArgValue(
				"-drive_class".to_owned(),
				class.to_owned(),
			));
		}
		if class == "clear_list" { self.drive_classes.clear(); }
		else {
			self.drive_classes.push((class.to_owned(), pattern.to_owned()));
		}
		Ok(())
	}

	/// # `-load TYPE ID`
	///
	/// Loads a recorded session into the tree: `session N`, or `auto`.
	pub(crate) fn cmd_load(&mut self, addr_type: &str, id: &str)
	-> Result<(), ScorchError> {
		let session: i32 = match addr_type {
			"auto" => -1,
			"session" => id.parse().map_err(|_| ScorchError::BadArgValue(
				"-load".to_owned(),
				id.to_owned(),
			))?,
			"track" | "lba" | "sbsector" | "volid" => {
				self.outpost.info(Severity::Note, format!(
					"-load addressing by {addr_type} is not supported; using the last session.",
				));
				-1
			},
			_ => return Err(ScorchError::BadArgValue(
				"-load".to_owned(),
				addr_type.to_owned(),
			)),
		};

		let mut tree = std::mem::take(&mut self.tree);
		let res = tree.load_session(self.indrive_mut()?, session);
		self.tree = tree;
		res
	}

	/// # `-eject in|out|all`
	pub(crate) fn cmd_eject(&mut self, which: &str) -> Result<(), ScorchError> {
		let (do_in, do_out) = match which {
			"in" => (true, false),
			"out" => (false, true),
			"all" | "" => (true, true),
			_ => return Err(ScorchError::BadArgValue(
				"-eject".to_owned(),
				which.to_owned(),
			)),
		};
		if do_in {
			if let Some(drive) = self.indev.take() { drive.release(true)?; }
		}
		if do_out || (do_in && self.dev_joined) {
			self.dev_joined = false;
			if let Some(drive) = self.outdev.take() { drive.release(true)?; }
		}
		Ok(())
	}

	/// # `-blank MODE`
	///
	/// Modes: `as_needed`, `fast`, `all`, `deformat`, `deformat_quickest`,
	/// each optionally prefixed `force:` to skip the status check.
	pub(crate) fn cmd_blank(&mut self, mode: &str) -> Result<(), ScorchError> {
		let (force, mode) = match mode.strip_prefix("force:") {
			Some(rest) => (true, rest),
			None => (false, mode),
		};
		let dummy = self.dummy;
		let drive = self.outdrive_mut()?;
		if force { drive.pretend_full(); }

		// Stdio pseudo-drives blank by truncation.
		if drive.role() != DriveRole::Mmc {
			if drive.status() == MediaStatus::Blank && mode == "as_needed" {
				self.outpost.info(Severity::Note, "Medium is already blank.");
				return Ok(());
			}
			if ! dummy {
				let transport = drive.transport.lock()
					.map_err(|_| ScorchError::Bug("Transport mutex poisoned."))?;
				if let Some(stdio) = transport.stdio() { stdio.truncate()?; }
			}
			drive.status = MediaStatus::Blank;
			drive.read_capacity = 0;
			drive.last_leadout = 0;
			drive.toc.clear();
			return Ok(());
		}

		let blank_mode = match mode {
			"as_needed" => {
				if drive.status() == MediaStatus::Blank {
					self.outpost.info(Severity::Note, "Medium is already blank.");
					return Ok(());
				}
				if profile::profile_is_overwriteable(drive.profile()) {
					self.outpost.info(
						Severity::Note,
						"Overwriteable medium needs no blanking.",
					);
					return Ok(());
				}
				BlankMode::Fast
			},
			"fast" => BlankMode::Fast,
			"all" => BlankMode::All,
			"deformat" => BlankMode::Deformat,
			"deformat_quickest" => BlankMode::DeformatQuickest,
			_ => return Err(ScorchError::BadArgValue(
				"-blank".to_owned(),
				mode.to_owned(),
			)),
		};

		if ! force &&
			! matches!(drive.status(), MediaStatus::Appendable | MediaStatus::Full) {
			return Err(ScorchError::Unsuitable("blanking"));
		}
		if dummy {
			self.outpost.info(Severity::Note, "-dummy on : will not really blank.");
			return Ok(());
		}
		drive.blank(blank_mode, true)?;
		drive.refresh_media_state()?;
		Ok(())
	}

	/// # `-format MODE`
	///
	/// Modes: `as_needed`, `full`, `fast`, `by_index_N`, `by_size_SIZE`.
	pub(crate) fn cmd_format(&mut self, mode: &str) -> Result<(), ScorchError> {
		let dummy = self.dummy;
		let drive = self.outdrive_mut()?;
		if drive.role() != DriveRole::Mmc {
			self.outpost.info(
				Severity::Note,
				"Stdio pseudo-drives need no formatting.",
			);
			return Ok(());
		}

		let (size, opts) = match mode {
			"as_needed" => (0, FormatOpts { size_mode: 3, wait: true, ..FormatOpts::default() }),
			"full" => (0, FormatOpts {
				size_mode: 2,
				reformat: true,
				wait: true,
				..FormatOpts::default()
			}),
			"fast" => (0, FormatOpts {
				size_mode: 3,
				avoid_certification: true,
				wait: true,
				..FormatOpts::default()
			}),
			_ =>
				if let Some(raw) = mode.strip_prefix("by_index_") {
					let index: u8 = raw.parse().map_err(|_|
						ScorchError::BadArgValue("-format".to_owned(), mode.to_owned())
					)?;
					(0, FormatOpts {
						size_mode: 2,
						descriptor_index: Some(index),
						wait: true,
						..FormatOpts::default()
					})
				}
				else if let Some(raw) = mode.strip_prefix("by_size_") {
					let size = check::parse_size(raw).ok_or_else(||
						ScorchError::BadArgValue("-format".to_owned(), mode.to_owned())
					)?;
					(size, FormatOpts { wait: true, ..FormatOpts::default() })
				}
				else {
					return Err(ScorchError::BadArgValue(
						"-format".to_owned(),
						mode.to_owned(),
					));
				},
		};

		if dummy {
			self.outpost.info(Severity::Note, "-dummy on : will not really format.");
			return Ok(());
		}
		match drive.format_unit(size, opts)? {
			FormatOutcome::Done => {
				drive.outpost.info(Severity::Update, "Formatting done.");
				drive.refresh_media_state()?;
			},
			FormatOutcome::Skipped => {},
			FormatOutcome::Async => {
				drive.outpost.info(
					Severity::Update,
					"Formatting started; the drive will settle in the background.",
				);
			},
		}
		Ok(())
	}

	/// # `-speed VALUE`
	///
	/// `max`, `min`, a plain kB/s number, or an `Nx` multiple of the
	/// loaded medium's base rate.
	pub(crate) fn cmd_speed(&mut self, value: &str) -> Result<(), ScorchError> {
		let profile = self.outdev.as_ref().map_or(0, Drive::profile);
		let wish = parse_speed(value, profile)?;
		self.speed_wish = Some((wish, wish));
		if let Ok(drive) = self.outdrive_mut() {
			if drive.role() == DriveRole::Mmc { drive.set_speed(wish, wish)?; }
		}
		Ok(())
	}

	/// # `-dummy on|off`
	pub(crate) fn cmd_dummy(&mut self, value: &str) -> Result<(), ScorchError> {
		self.dummy = on_off("-dummy", value)?;
		Ok(())
	}

	/// # `-close on|off`
	pub(crate) fn cmd_close(&mut self, value: &str) -> Result<(), ScorchError> {
		self.do_close = on_off("-close", value)?;
		Ok(())
	}

	/// # `-padding SIZE|off`
	pub(crate) fn cmd_padding(&mut self, value: &str) -> Result<(), ScorchError> {
		if value == "off" {
			self.padding_blocks = 0;
			return Ok(());
		}
		let bytes = check::parse_size(value).ok_or_else(||
			ScorchError::BadArgValue("-padding".to_owned(), value.to_owned())
		)?;
		self.padding_blocks =
			u32::try_from(bytes.div_ceil(SECTOR_DATA_SIZE as u64))
				.map_err(|_| ScorchError::BadArgValue(
					"-padding".to_owned(),
					value.to_owned(),
				))?;
		Ok(())
	}

	/// # `-stream_recording on|off|START_LBA`
	pub(crate) fn cmd_stream_recording(&mut self, value: &str)
	-> Result<(), ScorchError> {
		self.stream_recording = match value {
			"on" => (true, 0),
			"off" => (false, 0),
			raw => {
				let start = check::parse_size(raw)
					.map(|bytes| bytes / SECTOR_DATA_SIZE as u64)
					.and_then(|s| u32::try_from(s).ok())
					.ok_or_else(|| ScorchError::BadArgValue(
						"-stream_recording".to_owned(),
						raw.to_owned(),
					))?;
				(true, start)
			},
		};
		let (on, start) = self.stream_recording;
		if let Some(drive) = self.outdev.as_mut() {
			drive.set_stream_recording(on, start);
		}
		Ok(())
	}

	/// # `-toc`
	pub(crate) fn cmd_toc(&mut self) -> Result<(), ScorchError> {
		let addr = {
			let drive = self.indrive_mut()?;
			drive.addr().to_owned()
		};
		self.say(format!("Drive current: -dev {}", shell_quote(&addr)));

		let product = {
			let drive = self.indrive_mut()?;
			if drive.role() == DriveRole::Mmc { drive.media_product_id() }
			else { None }
		};
		if let Some(id) = product {
			self.say(format!("Media product: {id}"));
		}

		let lines = {
			let drive = self.indrive_mut()?;
			drive.toc_report()
		};
		for line in lines { self.say(line); }
		Ok(())
	}

	/// # `-mount DEV MODE ID CMD`
	///
	/// Mounting is someone else's business; the command that would do it
	/// is reported instead.
	pub(crate) fn cmd_mount(&mut self, dev: &str, mode: &str, id: &str, cmd: &str)
	-> Result<(), ScorchError> {
		self.say(format!(
			"mount -o ro,sbsector={id} {} {}",
			shell_quote(dev),
			shell_quote(cmd),
		));
		self.outpost.info(Severity::Note, format!(
			"-mount does not execute; the {mode} command above is a suggestion.",
		));
		Ok(())
	}

	/// # `-check_media [OPTS] --`
	pub(crate) fn cmd_check_media(&mut self, args: &[String])
	-> Result<(), ScorchError> {
		let mut job = self.check_job.clone();
		for token in args {
			job.set_param(token)?;
		}
		job.volid = self.tree.volid().to_owned();

		// MD5 coverage comes from the last loaded/written session, when
		// MD5 accounting is on at all.
		job.md5_ranges.clear();
		if self.opt_md5 {
			if let Some((start, blocks, digest)) = self.tree.session_md5() {
				job.md5_ranges.push((start, blocks, digest));
			}
		}

		// Remember the settings for the next invocation.
		self.check_job = job.clone();

		let (spots, _bitmap) = match job.use_drive {
			CheckUse::SectorMap => {
				// Render the stored map; no reading at all.
				let path = job.sector_map_path.clone().ok_or_else(||
					ScorchError::BadArgValue(
						"-check_media".to_owned(),
						"use=sector_map without sector_map=".to_owned(),
					)
				)?;
				let (map, _info) = SectorBitmap::from_file(&path)?;
				(SpotList::from(&map), map)
			},
			which => {
				if job.what == CheckWhat::Image {
					// Clip the window to the loaded image range.
					if let Some((start, blocks, _)) = self.tree.session_md5() {
						if job.min_lba < 0 { job.min_lba = start; }
						if job.max_lba < 0 { job.max_lba = start + blocks - 1; }
					}
				}
				let outpost = self.outpost.clone();
				let killed = self.killed.clone();
				let drive = match which {
					CheckUse::Outdev => self.outdrive_mut()?,
					_ => self.indrive_mut()?,
				};
				let outcome = check::check_media(drive, &job, &outpost, &killed)?;
				if outcome.aborted {
					outpost.info(Severity::Warning, "Check run was cut short.");
				}
				(outcome.spotlist, outcome.bitmap)
			},
		};

		// Reporting.
		if matches!(job.report_mode, CheckReportMode::Blocks | CheckReportMode::BlocksFiles) {
			self.say(format!("Media checks :  {} spots", spots.len()));
			for line in spots.report(job.bad_limit) {
				self.say(line);
			}
		}
		if matches!(job.report_mode, CheckReportMode::Files | CheckReportMode::BlocksFiles) {
			for (path, quality) in self.damaged_files(&spots, job.bad_limit) {
				self.say(format!("{} {}", quality.as_str(), shell_quote(&path)));
			}
		}
		self.last_check = Some(spots);
		Ok(())
	}

	/// # Image Files Overlapping Damaged Ranges.
	fn damaged_files(&self, spots: &SpotList, bad_limit: ReadQuality)
	-> Vec<(String, ReadQuality)> {
		let mut out = Vec::new();
		for path in self.tree.all_paths() {
			let Some(node) = self.tree.node(&path) else { continue; };
			let Some((start, blocks)) = node.lba else { continue; };
			let worst = spots.items().iter()
				.filter(|i|
					i.quality.prefix(bad_limit) == '-' &&
					i.start_lba < start + blocks &&
					start < i.start_lba + i.blocks
				)
				.map(|i| i.quality)
				.min();
			if let Some(worst) = worst { out.push((path, worst)); }
		}
		out
	}
}



/// # Parse a `-speed` Wish.
///
/// Returns kB/s; 0 for max, -1 for min.
fn parse_speed(value: &str, profile: u16) -> Result<i32, ScorchError> {
	let bad = || ScorchError::BadArgValue("-speed".to_owned(), value.to_owned());
	match value {
		"max" | "0" | "any" => Ok(0),
		"min" => Ok(-1),
		raw => {
			let (num, unit) = raw.strip_suffix(['x', 'X'])
				.map_or((raw, 1_i64), |n| (n, base_speed(profile)));
			let num: f64 = num.trim().parse().map_err(|_| bad())?;
			if num <= 0.0 || 1.0e9 < num { return Err(bad()); }
			#[expect(clippy::cast_possible_truncation, reason = "Range-checked above.")]
			Ok((num * unit as f64) as i32)
		},
	}
}

/// # 1× Rate For a Profile Family (kB/s).
const fn base_speed(profile: u16) -> i64 {
	if profile::profile_is_cd(profile) { 177 }
	else if profile::profile_is_bd(profile) { 4496 }
	else { 1385 }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_parse_speed() {
		assert_eq!(parse_speed("max", 0x1A), Ok(0));
		assert_eq!(parse_speed("min", 0x1A), Ok(-1));
		assert_eq!(parse_speed("5540", 0x1A), Ok(5540));
		assert_eq!(parse_speed("4x", 0x1A), Ok(4 * 1385));
		assert_eq!(parse_speed("8x", 0x09), Ok(8 * 177));
		assert_eq!(parse_speed("2x", 0x43), Ok(2 * 4496));
		assert!(parse_speed("fast", 0x1A).is_err());
		assert!(parse_speed("-3", 0x1A).is_err());
	}

	#[test]
	fn t_blank_as_needed_noop() {
		// A blank stdio medium: -blank as_needed is a NOTE-grade no-op.
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let img = dir.path().join("blank.img");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-outdev".to_owned(), format!("stdio:{}", img.display()),
			"-blank".to_owned(), "as_needed".to_owned(),
		]);
		assert!(! shell.ended);
		assert_eq!(shell.exit_code(), 0);
		assert_eq!(
			shell.outdev.as_ref().map(Drive::status),
			Some(MediaStatus::Blank),
		);
	}

	#[test]
	fn t_blank_truncates_stdio() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let img = dir.path().join("full.img");
		std::fs::write(&img, vec![1_u8; 3 * SECTOR_DATA_SIZE]).expect("Write failed.");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-outdev".to_owned(), format!("stdio:{}", img.display()),
			"-blank".to_owned(), "fast".to_owned(),
		]);
		assert!(! shell.ended);
		assert_eq!(
			std::fs::metadata(&img).expect("Stat failed.").len(),
			0,
			"Blanking should have truncated the file.",
		);
	}

	#[test]
	fn t_drive_class_ban() {
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-abort_on".to_owned(), "ABORT".to_owned(),
			"-drive_class".to_owned(), "banned".to_owned(), "/dev/*".to_owned(),
		]);
		assert!(shell.vet_drive_address("/dev/sr0").is_err());
		assert!(shell.vet_drive_address("stdio:/tmp/x").is_ok());
	}
}
