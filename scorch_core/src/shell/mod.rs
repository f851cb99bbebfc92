/*!
# Scorch: The Command Shell

One logical pipeline, whether the words arrive as program arguments or
lines: tokenize, canonicalize the command name, collect its arguments per
the arity table, dispatch, then weigh the problems it raised against the
abort threshold. With `-x` on board, commands are first collected and
stable-sorted by rank so careless orderings still burn sensibly.
*/

pub(crate) mod cmd_drive;
pub(crate) mod cmd_global;
pub(crate) mod cmd_tree;
pub(crate) mod table;
pub(crate) mod token;

use crate::{
	CheckMediaJob,
	Drive,
	KillSwitch,
	MemTree,
	Outpost,
	ScorchError,
	Severity,
	pattern::{
		DEFAULT_MEM_LIMIT,
		DiskSpace,
		PatternPile,
		expand_pattern,
	},
};
use table::{
	Arity,
	canonical,
	lookup,
};
use token::BackslashMode;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # One Command's Outcome.
pub(crate) enum Outcome {
	/// # Fine.
	Ok,

	/// # Problems Were Raised (the Status Decides).
	Trouble,

	/// # Stop the Whole Run.
	EndProgram,
}



#[derive(Debug)]
/// # A Collected Command.
struct Gathered {
	/// # Canonical Name.
	name: String,

	/// # Its Arguments.
	args: Vec<String>,

	/// # Original Position (Sort Tiebreak).
	pos: usize,

	/// # Sorting Rank.
	rank: u16,
}



#[derive(Debug)]
/// # The Shell.
///
/// Owns the drives, the image tree, the message hub, and every setting a
/// command can flip.
pub struct Shell {
	/// # Message Hub.
	pub(crate) outpost: Outpost,

	/// # Cooperative Abort Flag.
	pub(crate) killed: KillSwitch,

	/// # The Image Tree.
	pub(crate) tree: MemTree,

	/// # Input Drive.
	pub(crate) indev: Option<Drive>,

	/// # Output Drive.
	pub(crate) outdev: Option<Drive>,

	/// # One Drive Serves Both Directions?
	pub(crate) dev_joined: bool,

	/// # Image-Side Working Directory.
	pub(crate) wdi: String,

	/// # Disk-Side Working Directory.
	pub(crate) wdx: String,

	/// # Backslash Mode.
	pub(crate) backslash_mode: BackslashMode,

	/// # Re-Encode Output Lines?
	pub(crate) encode_output: bool,

	/// # Variable-Arity Terminator.
	pub(crate) list_delimiter: String,

	/// # Abort Threshold.
	pub(crate) abort_on: Severity,

	/// # Exit-Code Threshold and Code.
	pub(crate) return_with: (Severity, i32),

	/// # Plain-Argument Policy (0 = Refuse ... 3 = Swallow Everything).
	pub(crate) add_plainly: u8,

	/// # Expand Wildcards in Image Paths?
	pub(crate) iso_rr_pattern: bool,

	/// # Expand Wildcards in Disk Paths?
	pub(crate) disk_pattern: bool,

	/// # Pattern Expansion Budget (Bytes).
	pub(crate) temp_mem_limit: usize,

	/// # Session Tail Padding (Blocks).
	pub(crate) padding_blocks: u32,

	/// # Pending Speed Wish (Read, Write; kB/s).
	pub(crate) speed_wish: Option<(i32, i32)>,

	/// # Simulate Writes?
	pub(crate) dummy: bool,

	/// # Close Sessions/Media After Writing?
	pub(crate) do_close: bool,

	/// # Output Character Set Name.
	pub(crate) charset: String,

	/// # Joliet Directory Tree?
	pub(crate) joliet: bool,

	/// # Compliance Rule String.
	pub(crate) compliance: String,

	/// # Record Hardlink Relations?
	pub(crate) opt_hardlinks: bool,

	/// # Import/Export ACLs?
	pub(crate) opt_acl: bool,

	/// # Import/Export Xattrs?
	pub(crate) opt_xattr: bool,

	/// # Record Session MD5s?
	pub(crate) opt_md5: bool,

	/// # Stream Recording: (On, Start LBA).
	pub(crate) stream_recording: (bool, u32),

	/// # Drive Address Classes: (Class, Pattern).
	pub(crate) drive_classes: Vec<(String, String)>,

	/// # Pending Append Partitions: (Number, Type, Image Path).
	pub(crate) append_partitions: Vec<(u8, String, String)>,

	/// # Sticky Check-Media Defaults.
	pub(crate) check_job: CheckMediaJob,

	/// # The Last Check Run's Quality Runs.
	pub(crate) last_check: Option<crate::SpotList>,

	/// # Program Over?
	pub(crate) ended: bool,
}

impl Default for Shell {
	fn default() -> Self {
		Self {
			outpost: Outpost::default(),
			killed: KillSwitch::default(),
			tree: MemTree::default(),
			indev: None,
			outdev: None,
			dev_joined: false,
			wdi: "/".to_owned(),
			wdx: std::env::current_dir()
				.map(|p| p.to_string_lossy().into_owned())
				.unwrap_or_else(|_| "/".to_owned()),
			backslash_mode: BackslashMode::Off,
			encode_output: false,
			list_delimiter: "--".to_owned(),
			abort_on: Severity::Failure,
			return_with: (Severity::Sorry, 32),
			add_plainly: 0,
			iso_rr_pattern: true,
			disk_pattern: false,
			temp_mem_limit: DEFAULT_MEM_LIMIT,
			padding_blocks: 150,
			speed_wish: None,
			dummy: false,
			do_close: false,
			charset: "UTF-8".to_owned(),
			joliet: false,
			compliance: "default".to_owned(),
			opt_hardlinks: false,
			opt_acl: false,
			opt_xattr: false,
			opt_md5: true,
			stream_recording: (false, 0),
			drive_classes: Vec::new(),
			append_partitions: Vec::new(),
			check_job: CheckMediaJob::new(),
			last_check: None,
			ended: false,
		}
	}
}

impl Shell {
	#[must_use]
	/// # New With External Hub and Kill Switch.
	pub fn new(outpost: Outpost, killed: KillSwitch) -> Self {
		Self {
			outpost,
			killed,
			..Self::default()
		}
	}

	#[must_use]
	/// # The Hub.
	pub fn outpost(&self) -> &Outpost { &self.outpost }

	#[must_use]
	/// # Final Exit Code.
	///
	/// Zero for a clean run; the configured code when the worst recorded
	/// problem reaches the `-return_with` threshold.
	pub fn exit_code(&self) -> i32 {
		if self.return_with.0 <= self.outpost.eternal_status() {
			self.return_with.1
		}
		else { 0 }
	}
}

/// # Execution.
impl Shell {
	/// # Run a Whole Argument Vector.
	///
	/// The presence of `-x` anywhere flips on rank sorting: commands are
	/// collected first, stable-sorted by `(rank, position)`, then
	/// executed. Otherwise execution happens in the order given.
	pub fn execute_args(&mut self, args: &[String]) {
		let sort = args.iter().any(|a| canonical(a) == "x" && a.starts_with('-'));
		let mut gathered = Vec::new();
		let mut pos = 0;
		while pos < args.len() && ! self.ended {
			match self.gather_one(args, &mut pos) {
				Ok(Some(cmd)) =>
					if sort { gathered.push(cmd); }
					else { self.run_one(&cmd.name, &cmd.args); },
				Ok(None) => {},
				Err(err) => {
					self.outpost.oops(&err);
					if self.weigh_problems("?") == Outcome::EndProgram {
						self.ended = true;
					}
				},
			}
			self.outpost.drain();
		}

		if sort {
			gathered.sort_by_key(|c| (c.rank, c.pos));
			for cmd in gathered {
				if self.ended { break; }
				self.run_one(&cmd.name, &cmd.args);
				self.outpost.drain();
			}
		}
		self.outpost.drain();
	}

	/// # Collect One Command (and Its Arguments).
	fn gather_one(&mut self, args: &[String], pos: &mut usize)
	-> Result<Option<Gathered>, ScorchError> {
		let at = *pos;
		let raw = &args[at];
		*pos += 1;

		let name = canonical(raw);
		let Some((arity, rank)) = lookup(&name) else {
			// Not a command: maybe a plain pathspec, maybe a typo.
			if self.add_plainly == 3 ||
				(! raw.starts_with('-') && 0 < self.add_plainly) {
				return Ok(Some(Gathered {
					name: "add".to_owned(),
					args: vec![raw.clone()],
					pos: at,
					rank: lookup("add").map_or(40, |(_, r)| r),
				}));
			}
			return Err(ScorchError::BadCommand(raw.clone()));
		};

		let mut collected = Vec::new();
		match arity {
			Arity::N(n) => {
				for _ in 0..n {
					if args.len() <= *pos {
						return Err(ScorchError::ArgCount(raw.clone(), usize::from(n)));
					}
					collected.push(args[*pos].clone());
					*pos += 1;
				}
			},
			Arity::Var => {
				while *pos < args.len() {
					if args[*pos] == self.list_delimiter {
						*pos += 1;
						break;
					}
					collected.push(args[*pos].clone());
					*pos += 1;
				}
			},
		}

		Ok(Some(Gathered { name, args: collected, pos: at, rank }))
	}

	/// # Execute One Command and Weigh Its Problems.
	fn run_one(&mut self, name: &str, args: &[String]) {
		if self.killed.killed() {
			self.ended = true;
			return;
		}

		// Commands start with a clean slate.
		let _stale = self.outpost.take_problem_status();

		if let Err(err) = self.dispatch(name, args) {
			self.log_errfile_for(&err);
			self.outpost.oops(&err);
		}
		match self.weigh_problems(name) {
			Outcome::EndProgram => { self.ended = true; },
			Outcome::Ok | Outcome::Trouble => {},
		}
		self.outpost.mark();
	}

	/// # Dispatch to a Handler.
	fn dispatch(&mut self, name: &str, args: &[String])
	-> Result<(), ScorchError> {
		match name {
			// Global plumbing.
			"abort_on" => self.cmd_abort_on(&args[0]),
			"backslash_codes" => self.cmd_backslash_codes(&args[0]),
			"errfile_log" => self.cmd_errfile_log(&args[0]),
			"list_delimiter" => self.cmd_list_delimiter(&args[0]),
			"mark" => { self.outpost.set_mark(args[0].clone()); Ok(()) },
			"pkt_output" => self.cmd_pkt_output(&args[0]),
			"return_with" => self.cmd_return_with(&args[0], &args[1]),
			"session_log" => self.cmd_session_log(&args[0]),
			"temp_mem_limit" => self.cmd_temp_mem_limit(&args[0]),
			"x" => Ok(()), // Recognized during collection.
			"add_plainly" => self.cmd_add_plainly(&args[0]),
			"iso_rr_pattern" => self.cmd_iso_rr_pattern(&args[0]),
			"disk_pattern" => self.cmd_disk_pattern(&args[0]),
			"version" => self.cmd_version(),
			"help" => self.cmd_help(),
			"end" => self.cmd_end(),

			// Drives and media.
			"dev" => self.cmd_dev(&args[0], true, true),
			"indev" => self.cmd_dev(&args[0], true, false),
			"outdev" => self.cmd_dev(&args[0], false, true),
			"load" => self.cmd_load(&args[0], &args[1]),
			"eject" => self.cmd_eject(&args[0]),
			"blank" => self.cmd_blank(&args[0]),
			"format" => self.cmd_format(&args[0]),
			"speed" => self.cmd_speed(&args[0]),
			"dummy" => self.cmd_dummy(&args[0]),
			"close" => self.cmd_close(&args[0]),
			"padding" => self.cmd_padding(&args[0]),
			"stream_recording" => self.cmd_stream_recording(&args[0]),
			"drive_class" => self.cmd_drive_class(&args[0], &args[1]),
			"toc" => self.cmd_toc(),
			"check_media" => self.cmd_check_media(args),
			"mount" => self.cmd_mount(&args[0], &args[1], &args[2], &args[3]),

			// Image properties.
			"volid" => self.cmd_volid(&args[0]),
			"charset" => self.cmd_charset(&args[0]),
			"joliet" => self.cmd_joliet(&args[0]),
			"compliance" => self.cmd_compliance(&args[0]),
			"hardlinks" => self.cmd_flag(&args[0], "hardlinks"),
			"acl" => self.cmd_flag(&args[0], "acl"),
			"xattr" => self.cmd_flag(&args[0], "xattr"),
			"md5" => self.cmd_flag(&args[0], "md5"),
			"jigdo" => self.cmd_jigdo(&args[0], &args[1]),

			// Navigation.
			"cd" => self.cmd_cd(&args[0]),
			"cdx" => self.cmd_cdx(&args[0]),
			"pwd" => self.cmd_pwd(),
			"pwdx" => self.cmd_pwdx(),

			// Tree work.
			"add" => self.cmd_add(args),
			"map_l" => self.cmd_map_l(args),
			"mkdir" => self.cmd_mkdir(args),
			"rmdir" => self.cmd_rmdir(args),
			"rm" => self.cmd_rm(args, false),
			"rm_r" => self.cmd_rm(args, true),
			"mv" => self.cmd_mv(args),
			"chown" => self.cmd_chown(args, false),
			"chgrp" => self.cmd_chown(args, true),
			"chmod" => self.cmd_chmod(args),
			"setfacl" => self.cmd_setfacl(args),
			"setfattr" => self.cmd_setfattr(&args[0], &args[1]),
			"find" => self.cmd_find(args),
			"ls" => self.cmd_ls(args),
			"du" => self.cmd_du(args),
			"update" => self.cmd_update(&args[0], &args[1]),
			"compare" => self.cmd_compare(&args[0], &args[1]),
			"cut_out" => self.cmd_cut_out(&args[0], &args[1], &args[2], &args[3]),
			"paste_in" => self.cmd_paste_in(&args[0], &args[1], &args[2], &args[3]),
			"extract_cut" => self.cmd_extract_cut(&args[0], &args[1], &args[2], &args[3]),
			"path_list" => self.cmd_path_list(args),
			"append_partition" => self.cmd_append_partition(&args[0], &args[1], &args[2]),
			"as" => self.cmd_as(args),
			"print_size" => self.cmd_print_size(),
			"commit" => self.cmd_commit(),
			"rollback" => self.cmd_rollback(),

			_ => Err(ScorchError::BadCommand(name.to_owned())),
		}
	}

	/// # Per-Command Problem Evaluation.
	///
	/// The highest severity a command raised either trips the abort
	/// threshold — ending the run — or, from NOTE upward, earns a
	/// tolerated-problem line and life goes on.
	fn weigh_problems(&mut self, cmd: &str) -> Outcome {
		let status = self.outpost.take_problem_status();
		if self.abort_on <= status {
			self.outpost.result(format!(
				"scorch : aborting : -abort_on {} encountered {}",
				self.abort_on.as_str(),
				status.as_str(),
			));
			return Outcome::EndProgram;
		}
		if Severity::Note <= status {
			self.outpost.info(Severity::Debug, format!(
				"-{cmd} : tolerated problem event of severity {}",
				status.as_str(),
			));
			return Outcome::Trouble;
		}
		Outcome::Ok
	}
}

/// # Shared Helpers.
impl Shell {
	/// # A Result Line, Possibly Re-Encoded.
	pub(crate) fn say(&self, text: String) {
		if self.encode_output {
			self.outpost.result(token::encode_escapes(&text));
		}
		else { self.outpost.result(text); }
	}

	/// # Feed the ERRFILE Log.
	///
	/// Errors that name a file get one `ERRFILE` line each, so frontends
	/// can collect the casualties without parsing prose.
	pub(crate) fn log_errfile_for(&self, err: &ScorchError) {
		match err {
			ScorchError::Read(path) | ScorchError::Write(path) |
			ScorchError::SectorMap(path) => {
				self.outpost.log_errfile(
					err.severity(),
					std::path::Path::new(path),
				);
			},
			_ => {},
		}
	}

	/// # The Reading Drive.
	pub(crate) fn indrive_mut(&mut self) -> Result<&mut Drive, ScorchError> {
		if self.dev_joined { self.outdev.as_mut() }
		else { self.indev.as_mut() }
			.ok_or(ScorchError::NoDrive("input"))
	}

	/// # The Writing Drive.
	pub(crate) fn outdrive_mut(&mut self) -> Result<&mut Drive, ScorchError> {
		self.outdev.as_mut().ok_or(ScorchError::NoDrive("output"))
	}

	/// # Expand Image-Side Patterns (or Resolve Literals).
	pub(crate) fn expand_iso(&self, raw: &[String], tolerant: bool)
	-> Result<Vec<String>, ScorchError> {
		if ! self.iso_rr_pattern {
			return Ok(
				raw.iter().map(|p| normalize_path(&self.wdi, p)).collect()
			);
		}
		let mut pile = PatternPile::new(self.temp_mem_limit);
		for pattern in raw {
			expand_pattern(&self.tree, &self.wdi, pattern, tolerant, &mut pile)?;
		}
		Ok(pile.into_paths())
	}

	/// # Expand Disk-Side Patterns (or Resolve Literals).
	pub(crate) fn expand_disk(&self, raw: &[String], tolerant: bool)
	-> Result<Vec<String>, ScorchError> {
		if ! self.disk_pattern {
			return Ok(
				raw.iter().map(|p| normalize_path(&self.wdx, p)).collect()
			);
		}
		let mut pile = PatternPile::new(self.temp_mem_limit);
		for pattern in raw {
			expand_pattern(&DiskSpace, &self.wdx, pattern, tolerant, &mut pile)?;
		}
		Ok(pile.into_paths())
	}
}



/// # Resolve a Path Against a Working Directory.
///
/// Pure string work: join when relative, then fold away `.` and `..`.
pub(crate) fn normalize_path(wd: &str, path: &str) -> String {
	let joined =
		if path.starts_with('/') { path.to_owned() }
		else { format!("{wd}/{path}") };

	let mut stack: Vec<&str> = Vec::new();
	for part in joined.split('/') {
		match part {
			"" | "." => {},
			".." => { stack.pop(); },
			p => stack.push(p),
		}
	}
	if stack.is_empty() { "/".to_owned() }
	else { format!("/{}", stack.join("/")) }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_normalize_path() {
		assert_eq!(normalize_path("/a/b", "c"), "/a/b/c");
		assert_eq!(normalize_path("/a/b", "/c"), "/c");
		assert_eq!(normalize_path("/a/b", "../c"), "/a/c");
		assert_eq!(normalize_path("/a/b", "../../../c"), "/c");
		assert_eq!(normalize_path("/", "."), "/");
		assert_eq!(normalize_path("/a", "./b/./c"), "/a/b/c");
	}

	#[test]
	fn t_execute_basics() {
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-volid".to_owned(), "TESTDISC".to_owned(),
			"-mkdir".to_owned(), "/a".to_owned(), "/a/b".to_owned(), "--".to_owned(),
			"-cd".to_owned(), "/a".to_owned(),
			"-mkdir".to_owned(), "c".to_owned(), "--".to_owned(),
		]);
		assert!(! shell.ended);
		assert_eq!(shell.tree.volid(), "TESTDISC");
		assert!(shell.tree.node("/a/b").is_some());
		assert!(shell.tree.node("/a/c").is_some());
		assert_eq!(shell.exit_code(), 0);
	}

	#[test]
	fn t_unknown_command() {
		// Unknown commands are FAILUREs, which trip the default
		// -abort_on FAILURE threshold.
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-no_such_thing".to_owned(),
			"-mkdir".to_owned(), "/after".to_owned(), "--".to_owned(),
		]);
		assert!(shell.ended);
		assert!(shell.tree.node("/after").is_none());
		assert_eq!(shell.exit_code(), 32);

		// With a laxer threshold the run tolerates and continues.
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-abort_on".to_owned(), "FATAL".to_owned(),
			"-no_such_thing".to_owned(),
			"-mkdir".to_owned(), "/after".to_owned(), "--".to_owned(),
		]);
		assert!(! shell.ended);
		assert!(shell.tree.node("/after").is_some());
		assert_eq!(shell.exit_code(), 32); // Still a dirty run.
	}

	#[test]
	fn t_add_plainly() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let file = dir.path().join("plain.txt");
		std::fs::write(&file, b"x").expect("Write failed.");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-add_plainly".to_owned(), "1".to_owned(),
			file.to_string_lossy().into_owned(),
		]);
		assert!(! shell.ended);
		assert!(shell.tree.node("/plain.txt").is_some());
	}

	#[test]
	fn t_sorted_execution() {
		// -x reorders: the tree insertion must see the volid and padding
		// setup even though they trail in the raw argument order.
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-x".to_owned(),
			"-mkdir".to_owned(), "/data".to_owned(), "--".to_owned(),
			"-volid".to_owned(), "SORTED".to_owned(),
			"-padding".to_owned(), "0".to_owned(),
		]);
		assert!(! shell.ended);
		assert_eq!(shell.tree.volid(), "SORTED");
		assert_eq!(shell.padding_blocks, 0);
		assert!(shell.tree.node("/data").is_some());
	}

	#[test]
	fn t_errfile_log() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let log = dir.path().join("errfile.log");
		let missing = dir.path().join("not-here.txt");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-abort_on".to_owned(), "ABORT".to_owned(),
			"-errfile_log".to_owned(), log.to_string_lossy().into_owned(),
			"-add".to_owned(), missing.to_string_lossy().into_owned(),
			"--".to_owned(),
		]);
		assert!(! shell.ended);

		// The failed insertion named its casualty.
		let raw = std::fs::read_to_string(&log).expect("ERRFILE log missing.");
		let line = raw.lines().next().expect("ERRFILE log empty.");
		assert!(line.starts_with("ERRFILE FAILURE "), "Unexpected line: {line}");
		assert!(
			line.contains("not-here.txt"),
			"Casualty path missing from: {line}",
		);
	}

	#[test]
	fn t_list_delimiter() {
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-list_delimiter".to_owned(), "@@".to_owned(),
			"-mkdir".to_owned(), "/x".to_owned(), "@@".to_owned(),
			"-cd".to_owned(), "/x".to_owned(),
		]);
		assert!(! shell.ended);
		assert!(shell.tree.node("/x").is_some());
		assert_eq!(shell.wdi, "/x");
	}
}
