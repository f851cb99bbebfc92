/*!
# Scorch: Image Tree Commands

Insertion, manipulation, inspection, find execution, the disk/image
comparison pair, and the commit/rollback endgame.
*/

use crate::{
	DriveRole,
	FindAction,
	FindJob,
	MediaStatus,
	ScorchError,
	Severity,
	SECTOR_DATA_SIZE,
	msg::shell_quote,
	tree::{
		IsoTree,
		Node,
		NodeType,
	},
};
use super::{
	Shell,
	cmd_global::on_off,
	normalize_path,
};
use dactyl::{
	NiceU64,
	traits::BytesToUnsigned,
};
use std::path::{
	Path,
	PathBuf,
};



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # A Parsed Mode Change.
enum ModeChange {
	/// # Replace Outright.
	Set(u32),

	/// # AND Then OR (Symbolic Clauses).
	Mask(u32, u32),
}

impl ModeChange {
	/// # Apply to an Existing Mode.
	const fn apply(self, mode: u32) -> u32 {
		match self {
			Self::Set(m) => m,
			Self::Mask(and, or) => (mode & and) | or,
		}
	}
}

/// # Parse an Octal or Symbolic Mode.
fn parse_mode(raw: &str) -> Result<ModeChange, ScorchError> {
	let bad = || ScorchError::BadArgValue("mode".to_owned(), raw.to_owned());

	// Octal?
	if raw.bytes().all(|b| b.is_ascii_digit()) {
		return u32::from_str_radix(raw, 8)
			.ok()
			.filter(|&m| m <= 0o7777)
			.map(ModeChange::Set)
			.ok_or_else(bad);
	}

	// One symbolic clause: [ugoa]*[+-=][rwxst]+
	let op_at = raw.find(['+', '-', '=']).ok_or_else(bad)?;
	let (who, rest) = raw.split_at(op_at);
	let op = rest.as_bytes()[0];
	let perms = &rest[1..];

	let mut who_mask = 0_u32;
	for c in who.bytes() {
		who_mask |= match c {
			b'u' => 0o700,
			b'g' => 0o070,
			b'o' => 0o007,
			b'a' => 0o777,
			_ => return Err(bad()),
		};
	}
	if who.is_empty() { who_mask = 0o777; }

	let mut bits = 0_u32;
	for c in perms.bytes() {
		bits |= match c {
			b'r' => 0o444,
			b'w' => 0o222,
			b'x' => 0o111,
			b's' => 0o6000,
			b't' => 0o1000,
			_ => return Err(bad()),
		};
	}
	let bits = bits & (who_mask | 0o7000);

	Ok(match op {
		b'+' => ModeChange::Mask(!0, bits),
		b'-' => ModeChange::Mask(!bits, 0),
		_ => ModeChange::Mask(!(who_mask | 0o7000), bits),
	})
}



/// # Navigation and Image Properties.
impl Shell {
	/// # `-cd ISO_PATH`
	///
	/// The image-side working directory may point somewhere that doesn't
	/// exist yet; insertion will create it when the time comes.
	pub(crate) fn cmd_cd(&mut self, path: &str) -> Result<(), ScorchError> {
		self.wdi = normalize_path(&self.wdi, path);
		Ok(())
	}

	/// # `-cdx DISK_PATH`
	pub(crate) fn cmd_cdx(&mut self, path: &str) -> Result<(), ScorchError> {
		let path = normalize_path(&self.wdx, path);
		if ! Path::new(&path).is_dir() {
			return Err(ScorchError::Read(path));
		}
		self.wdx = path;
		Ok(())
	}

	/// # `-pwd`
	pub(crate) fn cmd_pwd(&mut self) -> Result<(), ScorchError> {
		let wdi = self.wdi.clone();
		self.say(wdi);
		Ok(())
	}

	/// # `-pwdx`
	pub(crate) fn cmd_pwdx(&mut self) -> Result<(), ScorchError> {
		let wdx = self.wdx.clone();
		self.say(wdx);
		Ok(())
	}

	/// # `-volid TEXT`
	pub(crate) fn cmd_volid(&mut self, volid: &str) -> Result<(), ScorchError> {
		if volid.is_empty() || 32 < volid.len() {
			return Err(ScorchError::BadArgValue(
				"-volid".to_owned(),
				volid.to_owned(),
			));
		}
		self.tree.set_volid(volid);
		Ok(())
	}

	/// # `-charset NAME`
	pub(crate) fn cmd_charset(&mut self, name: &str) -> Result<(), ScorchError> {
		if name.is_empty() {
			return Err(ScorchError::BadArgValue(
				"-charset".to_owned(),
				name.to_owned(),
			));
		}
		self.charset = name.to_owned();
		Ok(())
	}

	/// # `-joliet on|off`
	pub(crate) fn cmd_joliet(&mut self, value: &str) -> Result<(), ScorchError> {
		self.joliet = on_off("-joliet", value)?;
		Ok(())
	}

	/// # `-compliance RULES`
	pub(crate) fn cmd_compliance(&mut self, rules: &str) -> Result<(), ScorchError> {
		self.compliance = rules.to_owned();
		Ok(())
	}

	/// # Shared On/Off Image Flags.
	pub(crate) fn cmd_flag(&mut self, value: &str, which: &str)
	-> Result<(), ScorchError> {
		let on = on_off(which, value)?;
		match which {
			"hardlinks" => self.opt_hardlinks = on,
			"acl" => self.opt_acl = on,
			"xattr" => self.opt_xattr = on,
			"md5" => self.opt_md5 = on,
			_ => return Err(ScorchError::Bug("Unknown image flag.")),
		}
		Ok(())
	}

	/// # `-jigdo ASPECT VALUE`
	pub(crate) fn cmd_jigdo(&mut self, aspect: &str, _value: &str)
	-> Result<(), ScorchError> {
		self.outpost.info(Severity::Note, format!(
			"Jigdo production ({aspect}) is not supported by this build.",
		));
		Ok(())
	}
}

/// # Insertion.
impl Shell {
	/// # `-add PATHSPEC... --`
	///
	/// A pathspec is `ISO_PATH=DISK_PATH`, or a plain disk path that
	/// keeps its own name. Disk-side wildcards expand when
	/// `-disk_pattern` allows.
	pub(crate) fn cmd_add(&mut self, args: &[String]) -> Result<(), ScorchError> {
		for spec in args {
			if let Some((iso, disk)) = spec.split_once('=') {
				let iso = normalize_path(&self.wdi, iso);
				let disk = normalize_path(&self.wdx, disk);
				self.insert_one(&disk, &iso)?;
			}
			else {
				for disk in self.expand_disk(std::slice::from_ref(spec), false)? {
					let name =
						if spec.starts_with('/') { disk.clone() }
						else {
							Path::new(&disk).file_name()
								.map(|n| n.to_string_lossy().into_owned())
								.unwrap_or_default()
						};
					let iso = normalize_path(&self.wdi, &name);
					self.insert_one(&disk, &iso)?;
				}
			}
		}
		Ok(())
	}

	/// # Insert One Disk Object.
	fn insert_one(&mut self, disk: &str, iso: &str) -> Result<(), ScorchError> {
		self.tree.mkdir_parents_of(iso)?;
		let added = self.tree.add_file_from_disk(Path::new(disk), iso)?;
		self.outpost.info(Severity::Update, format!(
			"Added {added} node{} under {iso}",
			if added == 1 { "" } else { "s" },
		));
		Ok(())
	}

	/// # `-map_l DISK_PREFIX ISO_PREFIX PATTERN... --`
	pub(crate) fn cmd_map_l(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let [disk_prefix, iso_prefix, patterns @ ..] = args else {
			return Err(ScorchError::ArgCount("-map_l".to_owned(), 3));
		};
		let disk_prefix = normalize_path(&self.wdx, disk_prefix);
		let iso_prefix = normalize_path(&self.wdi, iso_prefix);

		for disk in self.expand_disk(patterns, false)? {
			let tail = disk.strip_prefix(&disk_prefix).ok_or_else(||
				ScorchError::BadArgValue("-map_l".to_owned(), disk.clone())
			)?;
			let iso = format!("{iso_prefix}{tail}");
			self.insert_one(&disk, &iso)?;
		}
		Ok(())
	}

	/// # `-mkdir ISO_PATH... --`
	pub(crate) fn cmd_mkdir(&mut self, args: &[String]) -> Result<(), ScorchError> {
		for raw in args {
			let path = normalize_path(&self.wdi, raw);
			self.tree.mkdir(&path)?;
		}
		Ok(())
	}

	/// # `-rmdir ISO_PATH... --`
	pub(crate) fn cmd_rmdir(&mut self, args: &[String]) -> Result<(), ScorchError> {
		for path in self.expand_iso(args, false)? {
			let node = self.tree.lstat(&path)?;
			if node.ntype != NodeType::Dir {
				return Err(ScorchError::IsoPathNotDir(path));
			}
			self.tree.unlink(&path, false)?;
		}
		Ok(())
	}

	/// # `-path_list FILE... --`
	///
	/// Each line of each file is one `-add` pathspec.
	pub(crate) fn cmd_path_list(&mut self, args: &[String])
	-> Result<(), ScorchError> {
		for raw in args {
			let path = normalize_path(&self.wdx, raw);
			let text = std::fs::read_to_string(&path)
				.map_err(|_| ScorchError::Read(path.clone()))?;
			for line in text.lines() {
				let line = line.trim();
				if line.is_empty() || line.starts_with('#') { continue; }
				self.cmd_add(&[line.to_owned()])?;
			}
		}
		Ok(())
	}

	/// # `-cut_out DISK_PATH START COUNT ISO_PATH`
	///
	/// Insert a byte range of a disk file as an image file.
	pub(crate) fn cmd_cut_out(
		&mut self,
		disk: &str,
		start: &str,
		count: &str,
		iso: &str,
	) -> Result<(), ScorchError> {
		let disk = normalize_path(&self.wdx, disk);
		let iso = normalize_path(&self.wdi, iso);
		let start = crate::check::parse_size(start).ok_or_else(||
			ScorchError::BadArgValue("-cut_out".to_owned(), start.to_owned())
		)?;
		let count = crate::check::parse_size(count).ok_or_else(||
			ScorchError::BadArgValue("-cut_out".to_owned(), count.to_owned())
		)?;

		let meta = std::fs::metadata(&disk)
			.map_err(|_| ScorchError::Read(disk.clone()))?;
		if meta.len() <= start {
			return Err(ScorchError::BadArgValue("-cut_out".to_owned(), disk));
		}
		let size = count.min(meta.len() - start);

		self.tree.mkdir_parents_of(&iso)?;
		self.tree.insert_file_node(&iso, Node {
			ntype: NodeType::File,
			mode: 0o644,
			size,
			disk_path: Some(PathBuf::from(&disk)),
			disk_offset: start,
			pending_data: true,
			..Node::default()
		})?;
		Ok(())
	}

	/// # `-append_partition NUMBER TYPE DISK_PATH`
	pub(crate) fn cmd_append_partition(
		&mut self,
		number: &str,
		ptype: &str,
		disk: &str,
	) -> Result<(), ScorchError> {
		let number = u8::btou(number.as_bytes())
			.filter(|&n| (1..=4).contains(&n))
			.ok_or_else(|| ScorchError::BadArgValue(
				"-append_partition".to_owned(),
				number.to_owned(),
			))?;
		let disk = normalize_path(&self.wdx, disk);
		if ! Path::new(&disk).is_file() {
			return Err(ScorchError::Read(disk));
		}
		self.append_partitions.push((number, ptype.to_owned(), disk));
		Ok(())
	}

	/// # `-as PROGRAM ... --`
	pub(crate) fn cmd_as(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let program = args.first().map(String::as_str).unwrap_or("?");
		self.outpost.info(Severity::Failure, format!(
			"Emulation of {program} is not included in this build.",
		));
		Ok(())
	}
}

/// # Manipulation.
impl Shell {
	/// # `-rm` / `-rm_r PATTERN... --`
	pub(crate) fn cmd_rm(&mut self, args: &[String], recursive: bool)
	-> Result<(), ScorchError> {
		for path in self.expand_iso(args, false)? {
			self.tree.unlink(&path, recursive)?;
		}
		Ok(())
	}

	/// # `-mv SOURCE... TARGET --`
	pub(crate) fn cmd_mv(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let [sources @ .., target] = args else {
			return Err(ScorchError::ArgCount("-mv".to_owned(), 2));
		};
		let target = normalize_path(&self.wdi, target);
		let target_is_dir = self.tree.node(&target)
			.is_some_and(|n| n.ntype == NodeType::Dir);

		let sources = self.expand_iso(sources, false)?;
		if 1 < sources.len() && ! target_is_dir {
			return Err(ScorchError::IsoPathNotDir(target));
		}
		for src in sources {
			let to =
				if target_is_dir {
					let leaf = src.rsplit('/').next().unwrap_or("");
					format!("{target}/{leaf}")
				}
				else { target.clone() };
			self.tree.rename(&src, &to)?;
		}
		Ok(())
	}

	/// # `-chown UID PATTERN... --` (and `-chgrp`)
	pub(crate) fn cmd_chown(&mut self, args: &[String], group: bool)
	-> Result<(), ScorchError> {
		let [id, patterns @ ..] = args else {
			return Err(ScorchError::ArgCount(
				if group { "-chgrp" } else { "-chown" }.to_owned(),
				2,
			));
		};
		let id = u32::btou(id.as_bytes()).ok_or_else(||
			ScorchError::BadArgValue("owner id".to_owned(), id.clone())
		)?;
		for path in self.expand_iso(patterns, false)? {
			let node = self.tree.node_required(&path)?;
			if group { node.gid = id; } else { node.uid = id; }
			self.tree.touch();
		}
		Ok(())
	}

	/// # `-chmod MODE PATTERN... --`
	pub(crate) fn cmd_chmod(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let [mode, patterns @ ..] = args else {
			return Err(ScorchError::ArgCount("-chmod".to_owned(), 2));
		};
		let change = parse_mode(mode)?;
		for path in self.expand_iso(patterns, false)? {
			let node = self.tree.node_required(&path)?;
			node.mode = change.apply(node.mode);
			self.tree.touch();
		}
		Ok(())
	}

	/// # `-setfacl ACL_TEXT PATTERN... --`
	pub(crate) fn cmd_setfacl(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let [acl, patterns @ ..] = args else {
			return Err(ScorchError::ArgCount("-setfacl".to_owned(), 2));
		};
		let acl =
			if acl.is_empty() || acl == "clear" { None }
			else { Some(acl.clone()) };
		for path in self.expand_iso(patterns, false)? {
			self.tree.set_acl(&path, acl.clone())?;
		}
		Ok(())
	}

	/// # `-setfattr NAME=VALUE ISO_PATH`
	///
	/// An empty value removes the attribute.
	pub(crate) fn cmd_setfattr(&mut self, spec: &str, path: &str)
	-> Result<(), ScorchError> {
		let (name, value) = spec.split_once('=').ok_or_else(||
			ScorchError::BadArgValue("-setfattr".to_owned(), spec.to_owned())
		)?;
		let path = normalize_path(&self.wdi, path);
		let value =
			if value.is_empty() { None }
			else { Some(value.as_bytes().to_vec()) };
		self.tree.set_xattr(&path, name, value)
	}
}

/// # Inspection.
impl Shell {
	/// # `-ls PATTERN... --`
	pub(crate) fn cmd_ls(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let fallback = [".".to_owned()];
		let args: &[String] = if args.is_empty() { &fallback } else { args };
		for path in self.expand_iso(args, false)? {
			let node = self.tree.lstat(&path)?;
			if node.ntype == NodeType::Dir {
				for name in self.tree.walk_directory(&path)? {
					let sub = format!("{}/{name}", path.trim_end_matches('/'));
					if let Ok(child) = self.tree.lstat(&sub) {
						let line = ls_line(child, &name);
						self.say(line);
					}
				}
			}
			else {
				let leaf = path.rsplit('/').next().unwrap_or("").to_owned();
				let line = ls_line(node, &leaf);
				self.say(line);
			}
		}
		Ok(())
	}

	/// # `-du PATTERN... --`
	pub(crate) fn cmd_du(&mut self, args: &[String]) -> Result<(), ScorchError> {
		let fallback = [".".to_owned()];
		let args: &[String] = if args.is_empty() { &fallback } else { args };
		for path in self.expand_iso(args, false)? {
			let _exists = self.tree.lstat(&path)?;
			let total = self.du_total(&path);
			let line = format!(
				"{:>10}  {}",
				NiceU64::from(total.div_ceil(1024)),
				shell_quote(&path),
			);
			self.say(line);
		}
		Ok(())
	}

	/// # Recursive Size of One Node (Bytes).
	///
	/// A plain prefix test would rope in siblings like `/foobar` when
	/// totaling `/foo`; only the node itself and paths below its slash
	/// boundary count.
	fn du_total(&self, path: &str) -> u64 {
		let Some(node) = self.tree.node(path) else { return 0; };
		if node.ntype != NodeType::Dir { return node.size; }

		let prefix = format!("{}/", path.trim_end_matches('/'));
		let mut total = 0;
		for sub in self.tree.all_paths() {
			if sub == path || sub.starts_with(&prefix) {
				if let Some(n) = self.tree.node(&sub) { total += n.size; }
			}
		}
		total
	}

	/// # `-print_size`
	pub(crate) fn cmd_print_size(&mut self) -> Result<(), ScorchError> {
		let sectors = self.tree.estimate_size()
			.div_ceil(SECTOR_DATA_SIZE as u64)
			+ u64::from(self.padding_blocks);
		self.say(format!("Image size   : {sectors}s"));
		Ok(())
	}
}

/// # Find.
impl Shell {
	/// # `-find [START] [EXPR] [-exec ACTION]... --`
	pub(crate) fn cmd_find(&mut self, args: &[String]) -> Result<(), ScorchError> {
		// Resolve a leading relative start path before parsing.
		let mut args = args.to_vec();
		if let Some(first) = args.first_mut() {
			if ! first.starts_with('-') && *first != "(" {
				*first = normalize_path(&self.wdi, first);
			}
		}
		else { args.push(self.wdi.clone()); }

		let mut job = FindJob::parse(&args)?;
		let hits = {
			let drive =
				if self.dev_joined { self.outdev.as_ref() }
				else { self.indev.as_ref() };
			job.matches(&self.tree, drive)?
		};
		self.find_exec(&job, &hits)?;

		// A nested -exec find runs over every hit of the outer job.
		if let Some(mut sub) = job.subjob.take() {
			for hit in &hits {
				sub.start_path.clone_from(hit);
				let sub_hits = {
					let drive =
						if self.dev_joined { self.outdev.as_ref() }
						else { self.indev.as_ref() };
					sub.matches(&self.tree, drive)?
				};
				self.find_exec(&sub, &sub_hits)?;
			}
		}
		Ok(())
	}

	/// # Apply a Find Action to Every Hit.
	fn find_exec(&mut self, job: &FindJob, hits: &[String])
	-> Result<(), ScorchError> {
		let mut estimate = 0_u64;
		for path in hits {
			match job.action {
				FindAction::Echo => {
					let line = shell_quote(path);
					self.say(line);
				},
				FindAction::FoundPath => {},
				FindAction::Rm => { self.tree.unlink(path, false)?; },
				FindAction::RmR => {
					// Hits inside an already-removed subtree are gone.
					if self.tree.node(path).is_some() {
						self.tree.unlink(path, true)?;
					}
				},
				FindAction::Chown | FindAction::ChownR |
				FindAction::Chgrp | FindAction::ChgrpR => {
					let id = u32::btou(job.target.as_bytes()).ok_or_else(||
						ScorchError::BadArgValue("owner id".to_owned(), job.target.clone())
					)?;
					let group = matches!(job.action, FindAction::Chgrp | FindAction::ChgrpR);
					let node = self.tree.node_required(path)?;
					if group { node.gid = id; } else { node.uid = id; }
					self.tree.touch();
				},
				FindAction::Chmod | FindAction::ChmodR => {
					let change = parse_mode(&job.target)?;
					let node = self.tree.node_required(path)?;
					node.mode = change.apply(node.mode);
					self.tree.touch();
				},
				FindAction::AlterDate | FindAction::AlterDateR => {
					let stamp = parse_date(&job.text_2)?;
					let node = self.tree.node_required(path)?;
					node.mtime = stamp;
					self.tree.touch();
				},
				FindAction::Lsdl => {
					let node = self.tree.lstat(path)?;
					let leaf = path.rsplit('/').next().unwrap_or("");
					let line = ls_line(node, leaf);
					self.say(line);
				},
				FindAction::Getfacl => {
					if let Some(acl) = self.tree.get_acl(path)? {
						let line = format!("# file: {}\n{acl}", shell_quote(path));
						self.say(line);
					}
				},
				FindAction::Setfacl => {
					let acl =
						if job.target.is_empty() { None }
						else { Some(job.target.clone()) };
					self.tree.set_acl(path, acl)?;
				},
				FindAction::Getfattr | FindAction::GetAnyXattr |
				FindAction::ListExtattr => {
					let node = self.tree.lstat(path)?;
					let all = job.action != FindAction::Getfattr;
					let mut names: Vec<&String> = node.xattr.keys()
						.filter(|k| all || k.starts_with("user."))
						.collect();
					names.sort();
					let lines: Vec<String> = names.iter()
						.map(|name|
							if job.action == FindAction::ListExtattr {
								format!("{name} {}", shell_quote(path))
							}
							else {
								format!(
									"{name}=\"{}\" {}",
									String::from_utf8_lossy(
										node.xattr.get(*name).map_or(&[][..], Vec::as_slice)
									),
									shell_quote(path),
								)
							}
						)
						.collect();
					for line in lines { self.say(line); }
				},
				FindAction::Setfattr => {
					let value =
						if job.text_2.is_empty() { None }
						else { Some(job.text_2.as_bytes().to_vec()) };
					self.tree.set_xattr(path, &job.target, value)?;
				},
				FindAction::SetFilter => {
					let filter =
						if job.target.is_empty() || job.target == "--remove-all-filters" {
							None
						}
						else { Some(job.target.clone()) };
					self.tree.set_filter(path, filter)?;
				},
				FindAction::ShowStream => {
					let node = self.tree.lstat(path)?;
					let line = format!(
						"{} < {}{}",
						shell_quote(path),
						node.disk_path.as_deref()
							.map_or_else(|| "-".to_owned(), |p| shell_quote(&p.to_string_lossy())),
						node.filter.as_deref()
							.map_or_else(String::new, |f| format!(" | {f}")),
					);
					self.say(line);
				},
				FindAction::GetMd5 => {
					let node = self.tree.lstat(path)?;
					if let Some(md5) = node.md5 {
						let line = format!("{} {}", hex(&md5), shell_quote(path));
						self.say(line);
					}
				},
				FindAction::MakeMd5 => {
					let digest = self.iso_file_bytes(path)
						.map(|bytes| md5::compute(&bytes).0)?;
					let node = self.tree.node_required(path)?;
					if node.ntype == NodeType::File { node.md5 = Some(digest); }
					self.tree.touch();
				},
				FindAction::CheckMd5 => {
					let node = self.tree.lstat(path)?;
					let Some(want) = node.md5 else { continue; };
					let got = md5::compute(&self.iso_file_bytes(path)?).0;
					if want != got {
						self.outpost.info(Severity::Sorry, format!(
							"MD5 mismatch: {}",
							shell_quote(path),
						));
					}
				},
				FindAction::Hide => {
					let mask = match job.target.as_str() {
						"on" => 0b111,
						"off" => 0,
						"iso_rr" => 0b001,
						"joliet" => 0b010,
						"hfsplus" => 0b100,
						_ => return Err(ScorchError::BadArgValue(
							"hide".to_owned(),
							job.target.clone(),
						)),
					};
					let node = self.tree.node_required(path)?;
					node.hidden = mask;
					self.tree.touch();
				},
				FindAction::SortWeight => {
					let weight: i32 = job.target.parse().map_err(|_|
						ScorchError::BadArgValue("sort_weight".to_owned(), job.target.clone())
					)?;
					let node = self.tree.node_required(path)?;
					node.sort_weight = weight;
					self.tree.touch();
				},
				FindAction::EstimateSize => {
					if let Ok(node) = self.tree.lstat(path) {
						estimate += node.size.div_ceil(SECTOR_DATA_SIZE as u64);
					}
				},
				FindAction::ReportLba => {
					let node = self.tree.lstat(path)?;
					if let Some((lba, blocks)) = node.lba {
						let line = format!(
							"Report layout: {lba:>10} , {blocks:>10} , {}",
							shell_quote(path),
						);
						self.say(line);
					}
				},
				FindAction::ReportDamage => {
					let node = self.tree.lstat(path)?;
					let Some((lba, blocks)) = node.lba else { continue; };
					let bad_limit = self.check_job.bad_limit;
					let damaged = self.last_check.as_ref().is_some_and(|spots|
						spots.items().iter().any(|i|
							i.quality.prefix(bad_limit) == '-' &&
							i.start_lba < lba + blocks &&
							lba < i.start_lba + i.blocks
						)
					);
					if damaged {
						let line = format!(
							"Damaged: {lba:>10} , {blocks:>10} , {}",
							shell_quote(path),
						);
						self.say(line);
					}
				},
				FindAction::InIso => {
					let line = shell_quote(path);
					self.say(line);
				},
				FindAction::Compare => {
					let disk = self.tree.lstat(path)?.disk_path.clone();
					if let Some(disk) = disk {
						self.compare_one(&disk.to_string_lossy(), path)?;
					}
				},
				FindAction::Update => {
					let disk = self.tree.lstat(path)?.disk_path.clone();
					if let Some(disk) = disk {
						self.update_one(&disk.to_string_lossy(), path)?;
					}
				},
				FindAction::SetHfsCrtp => {
					let (creator, tp) = (fourcc(&job.target)?, fourcc(&job.text_2)?);
					let node = self.tree.node_required(path)?;
					node.hfs_crtp = Some((creator, tp));
					self.tree.touch();
				},
				FindAction::GetHfsCrtp => {
					let node = self.tree.lstat(path)?;
					if let Some((c, t)) = node.hfs_crtp {
						let line = format!(
							"{} {} {}",
							String::from_utf8_lossy(&c),
							String::from_utf8_lossy(&t),
							shell_quote(path),
						);
						self.say(line);
					}
				},
				FindAction::SetHfsBless => {
					let kind: u8 = job.target.parse().map_err(|_|
						ScorchError::BadArgValue("bless".to_owned(), job.target.clone())
					)?;
					let node = self.tree.node_required(path)?;
					node.hfs_bless = kind;
					self.tree.touch();
				},
				FindAction::GetHfsBless => {
					let node = self.tree.lstat(path)?;
					if node.hfs_bless != 0 {
						let line = format!("blessed/{} {}", node.hfs_bless, shell_quote(path));
						self.say(line);
					}
				},
				FindAction::Find => {}, // Handled by the caller.
				FindAction::NotInIso | FindAction::AddMissing |
				FindAction::EmptyIsoDir | FindAction::IsFullInIso |
				FindAction::UpdateMerge | FindAction::RmMerge |
				FindAction::ClearMerge | FindAction::WidenHardlinks |
				FindAction::MkisofsR => {
					self.outpost.info(Severity::Note, format!(
						"Find action {:?} applies to merge runs, which this build does not perform.",
						job.action,
					));
					break;
				},
			}
		}

		if job.action == FindAction::FoundPath {
			self.say(format!("Found {} matching node(s).", hits.len()));
		}
		if job.action == FindAction::EstimateSize {
			self.say(format!("Estimated size: {estimate}s"));
		}
		Ok(())
	}
}

/// # Compare / Update.
impl Shell {
	/// # `-compare DISK_PATH ISO_PATH`
	pub(crate) fn cmd_compare(&mut self, disk: &str, iso: &str)
	-> Result<(), ScorchError> {
		let disk = normalize_path(&self.wdx, disk);
		let iso = normalize_path(&self.wdi, iso);
		self.compare_one(&disk, &iso)
	}

	/// # Compare One Pair, Reporting Differences.
	fn compare_one(&mut self, disk: &str, iso: &str) -> Result<(), ScorchError> {
		let mut diffs = Vec::new();
		match (std::fs::symlink_metadata(disk), self.tree.node(iso)) {
			(Err(_), None) => {},
			(Err(_), Some(_)) => {
				diffs.push("disk object is missing".to_owned());
				self.outpost.log_errfile(Severity::Note, Path::new(disk));
			},
			(Ok(_), None) => {
				diffs.push("image object is missing".to_owned());
				self.outpost.log_errfile(Severity::Note, Path::new(disk));
			},
			(Ok(meta), Some(node)) => {
				use std::os::unix::fs::MetadataExt;
				if meta.is_dir() != (node.ntype == NodeType::Dir) {
					diffs.push("object types differ".to_owned());
				}
				if meta.is_file() {
					if meta.len() != node.size {
						diffs.push(format!("size {} <> {}", meta.len(), node.size));
					}
					if meta.mtime() != node.mtime {
						diffs.push(format!("mtime {} <> {}", meta.mtime(), node.mtime));
					}
				}
			},
		}
		if diffs.is_empty() {
			let line = format!("{} : identical", shell_quote(iso));
			self.say(line);
		}
		else {
			for diff in diffs {
				let line = format!("{} : differs : {diff}", shell_quote(iso));
				self.say(line);
			}
			self.outpost.record(Severity::Note);
		}
		Ok(())
	}

	/// # `-update DISK_PATH ISO_PATH`
	///
	/// Re-inserts the disk object only when something observable changed,
	/// so running it twice in a row is a no-op the second time.
	pub(crate) fn cmd_update(&mut self, disk: &str, iso: &str)
	-> Result<(), ScorchError> {
		let disk = normalize_path(&self.wdx, disk);
		let iso = normalize_path(&self.wdi, iso);
		self.update_one(&disk, &iso)
	}

	/// # Update One Pair.
	fn update_one(&mut self, disk: &str, iso: &str) -> Result<(), ScorchError> {
		use std::os::unix::fs::MetadataExt;

		let meta = std::fs::symlink_metadata(disk)
			.map_err(|_| ScorchError::Read(disk.to_owned()))?;
		let unchanged = self.tree.node(iso).is_some_and(|node|
			meta.is_file() &&
			node.ntype == NodeType::File &&
			node.size == meta.len() &&
			node.mtime == meta.mtime()
		);
		if unchanged {
			self.outpost.info(Severity::Update, format!(
				"Unchanged: {}",
				shell_quote(iso),
			));
			return Ok(());
		}

		if self.tree.node(iso).is_some() { self.tree.unlink(iso, true)?; }
		self.tree.mkdir_parents_of(iso)?;
		self.tree.add_file_from_disk(Path::new(disk), iso)?;
		self.outpost.info(Severity::Update, format!(
			"Updated: {}",
			shell_quote(iso),
		));
		Ok(())
	}
}

/// # Byte Extraction.
impl Shell {
	/// # Content Bytes of an Image File.
	fn iso_file_bytes(&mut self, path: &str) -> Result<Vec<u8>, ScorchError> {
		let (disk, offset, size, lba) = {
			let node = self.tree.lstat(path)?;
			(node.disk_path.clone(), node.disk_offset, node.size, node.lba)
		};

		// Fresh content still lives on disk.
		if let Some(disk) = disk {
			use std::io::{
				Read,
				Seek,
			};
			let mut file = std::fs::File::open(&disk)
				.map_err(|_| ScorchError::Read(disk.to_string_lossy().into_owned()))?;
			file.seek(std::io::SeekFrom::Start(offset))
				.map_err(|_| ScorchError::Read(disk.to_string_lossy().into_owned()))?;
			let mut out = vec![0_u8; usize::try_from(size).unwrap_or(0)];
			file.read_exact(&mut out)
				.map_err(|_| ScorchError::Read(disk.to_string_lossy().into_owned()))?;
			return Ok(out);
		}

		// Committed content comes off the medium.
		if let Some((lba, blocks)) = lba {
			let drive = if self.dev_joined { self.outdrive_mut()? }
				else { self.indrive_mut()? };
			let mut out = vec![0_u8; usize::try_from(blocks).unwrap_or(0) * SECTOR_DATA_SIZE];
			drive.read_blocks(
				u32::try_from(lba).unwrap_or(0),
				u16::try_from(blocks).unwrap_or(u16::MAX),
				&mut out,
			)?;
			out.truncate(usize::try_from(size).unwrap_or(0));
			return Ok(out);
		}

		Ok(Vec::new())
	}

	/// # `-paste_in ISO_PATH DISK_PATH START COUNT`
	pub(crate) fn cmd_paste_in(
		&mut self,
		iso: &str,
		disk: &str,
		start: &str,
		count: &str,
	) -> Result<(), ScorchError> {
		use std::io::{
			Seek,
			Write,
		};

		let iso = normalize_path(&self.wdi, iso);
		let disk = normalize_path(&self.wdx, disk);
		let start = crate::check::parse_size(start).ok_or_else(||
			ScorchError::BadArgValue("-paste_in".to_owned(), start.to_owned())
		)?;
		let count = crate::check::parse_size(count).ok_or_else(||
			ScorchError::BadArgValue("-paste_in".to_owned(), count.to_owned())
		)?;

		let mut bytes = self.iso_file_bytes(&iso)?;
		bytes.truncate(usize::try_from(count).unwrap_or(0));

		let mut file = std::fs::OpenOptions::new()
			.write(true)
			.create(true)
			.open(&disk)
			.map_err(|_| ScorchError::Write(disk.clone()))?;
		file.seek(std::io::SeekFrom::Start(start))
			.and_then(|_| file.write_all(&bytes))
			.map_err(|_| ScorchError::Write(disk))?;
		Ok(())
	}

	/// # `-extract_cut ISO_PATH START COUNT DISK_PATH`
	pub(crate) fn cmd_extract_cut(
		&mut self,
		iso: &str,
		start: &str,
		count: &str,
		disk: &str,
	) -> Result<(), ScorchError> {
		let iso = normalize_path(&self.wdi, iso);
		let disk = normalize_path(&self.wdx, disk);
		let start = crate::check::parse_size(start).ok_or_else(||
			ScorchError::BadArgValue("-extract_cut".to_owned(), start.to_owned())
		)?;
		let count = crate::check::parse_size(count).ok_or_else(||
			ScorchError::BadArgValue("-extract_cut".to_owned(), count.to_owned())
		)?;

		let bytes = self.iso_file_bytes(&iso)?;
		let start = usize::try_from(start).unwrap_or(usize::MAX).min(bytes.len());
		let end = start.saturating_add(usize::try_from(count).unwrap_or(0)).min(bytes.len());
		std::fs::write(&disk, &bytes[start..end])
			.map_err(|_| ScorchError::Write(disk))?;
		Ok(())
	}
}

/// # Commit / Rollback.
impl Shell {
	/// # `-commit`
	pub(crate) fn cmd_commit(&mut self) -> Result<(), ScorchError> {
		if ! self.tree.changes_pending() {
			self.outpost.info(Severity::Note, "No image changes pending; nothing to commit.");
			return Ok(());
		}
		if self.dummy {
			self.outpost.info(Severity::Note, "-dummy on : will not really write.");
			return Ok(());
		}
		if ! self.append_partitions.is_empty() {
			self.outpost.info(Severity::Note, format!(
				"{} appended partition(s) ride along after the session.",
				self.append_partitions.len(),
			));
		}

		let padding = self.padding_blocks;
		let status = self.outdev.as_ref().map(crate::Drive::status);
		if matches!(status, Some(MediaStatus::Full)) {
			return Err(ScorchError::Unsuitable("writing"));
		}

		let mut tree = std::mem::take(&mut self.tree);
		let res = {
			let drive = self.outdrive_mut()?;
			tree.write_session(drive, padding)
		};
		self.tree = tree;
		let summary = res?;

		// Appended partitions land verbatim after the session.
		let parts = self.append_partitions.clone();
		for (_number, _ptype, disk) in parts {
			let bytes = std::fs::read(&disk)
				.map_err(|_| ScorchError::Read(disk.clone()))?;
			let drive = self.outdrive_mut()?;
			let mut burner = crate::sector::Burner::new(
				summary.start_lba + summary.sectors,
				crate::sector::WriteSettings {
					obs: 32 * 1024,
					..crate::sector::WriteSettings::default()
				},
			);
			let mut track = crate::sector::Track::new(
				Box::new(std::io::Cursor::new(bytes)),
				crate::sector::TrackMode::Mode1,
			);
			track.open_ended = true;
			while burner.sector_data(drive, &mut track, false)? {}
			burner.flush(drive)?;
		}

		if self.do_close {
			let drive = self.outdrive_mut()?;
			if drive.role() == DriveRole::Mmc { drive.close(1, 0)?; }
		}

		// Keep the drive's media model in step with what just happened.
		{
			let drive = self.outdrive_mut()?;
			if drive.role() == DriveRole::Mmc {
				drive.refresh_media_state()?;
			}
			else {
				let end = summary.start_lba + summary.sectors;
				drive.status = MediaStatus::Appendable;
				drive.read_capacity = u32::try_from(end).unwrap_or(0);
				drive.last_leadout = end;
			}
		}

		self.outpost.info(Severity::Update, format!(
			"Committed session: {} blocks at lba {}",
			summary.sectors,
			summary.start_lba,
		));
		Ok(())
	}

	/// # `-rollback`
	pub(crate) fn cmd_rollback(&mut self) -> Result<(), ScorchError> {
		self.tree.clear();
		// With a loaded input medium, the old image comes straight back.
		let can_reload = self.dev_joined || self.indev.is_some();
		if can_reload {
			let mut tree = std::mem::take(&mut self.tree);
			let res = tree.load_session(self.indrive_mut()?, -1);
			self.tree = tree;
			if res.is_err() {
				self.outpost.info(Severity::Note, "No previous image to reload.");
			}
		}
		self.outpost.info(Severity::Update, "Image changes rolled back.");
		Ok(())
	}
}



/// # One `ls -l` Style Line.
fn ls_line(node: &Node, name: &str) -> String {
	let tletter = match node.ntype {
		NodeType::Dir => 'd',
		NodeType::Symlink => 'l',
		NodeType::BlockDev => 'b',
		NodeType::CharDev => 'c',
		NodeType::Fifo => 'p',
		NodeType::Socket => 's',
		NodeType::File | NodeType::BootCatalog => '-',
	};
	let mut perms = String::with_capacity(9);
	for shift in [6_u32, 3, 0] {
		let bits = (node.mode >> shift) & 7;
		perms.push(if bits & 4 != 0 { 'r' } else { '-' });
		perms.push(if bits & 2 != 0 { 'w' } else { '-' });
		perms.push(if bits & 1 != 0 { 'x' } else { '-' });
	}
	format!(
		"{tletter}{perms} {:>5} {:>5} {:>12} {}{}",
		node.uid,
		node.gid,
		NiceU64::from(node.size),
		shell_quote(name),
		node.link_target.as_deref()
			.map_or_else(String::new, |t| format!(" -> {t}")),
	)
}

/// # Hex Rendering of a Digest.
fn hex(digest: &[u8; 16]) -> String {
	let mut out = String::with_capacity(32);
	for b in digest {
		out.push_str(&format!("{b:02x}"));
	}
	out
}

/// # A Four-Character Code.
fn fourcc(raw: &str) -> Result<[u8; 4], ScorchError> {
	let bytes = raw.as_bytes();
	if bytes.len() != 4 {
		return Err(ScorchError::BadArgValue("4-char code".to_owned(), raw.to_owned()));
	}
	Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// # Parse a Date: `@epoch` or `YYYY.MM.DD[.hh.mm.ss]`.
fn parse_date(raw: &str) -> Result<i64, ScorchError> {
	let bad = || ScorchError::BadArgValue("date".to_owned(), raw.to_owned());
	if let Some(epoch) = raw.strip_prefix('@') {
		return epoch.parse().map_err(|_| bad());
	}
	let parts: Vec<u32> = raw.split('.')
		.map(|p| p.parse().map_err(|_| bad()))
		.collect::<Result<_, _>>()?;
	if parts.len() < 3 { return Err(bad()); }
	let get = |i: usize| parts.get(i).copied().unwrap_or(0);
	let stamp = utc2k::Utc2k::new(
		u16::try_from(get(0)).map_err(|_| bad())?,
		u8::try_from(get(1)).map_err(|_| bad())?,
		u8::try_from(get(2)).map_err(|_| bad())?,
		u8::try_from(get(3)).map_err(|_| bad())?,
		u8::try_from(get(4)).map_err(|_| bad())?,
		u8::try_from(get(5)).map_err(|_| bad())?,
	);
	Ok(i64::from(stamp.unixtime()))
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_parse_mode() {
		assert_eq!(parse_mode("755"), Ok(ModeChange::Set(0o755)));
		assert_eq!(parse_mode("0644"), Ok(ModeChange::Set(0o644)));
		assert!(parse_mode("9999").is_err());

		// Symbolic clauses.
		assert_eq!(parse_mode("a+x").map(|c| c.apply(0o644)), Ok(0o755));
		assert_eq!(parse_mode("go-w").map(|c| c.apply(0o666)), Ok(0o644));
		assert_eq!(parse_mode("u=rwx").map(|c| c.apply(0o444)), Ok(0o744));
		assert!(parse_mode("q+x").is_err());
	}

	#[test]
	fn t_parse_date() {
		assert_eq!(parse_date("@1700000000"), Ok(1_700_000_000));
		let day = parse_date("2024.02.29").expect("Date refused.");
		let next = parse_date("2024.03.01").expect("Date refused.");
		assert_eq!(next - day, 86_400);
		assert!(parse_date("yesterday").is_err());
	}

	#[test]
	fn t_add_rm_roundtrip() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		std::fs::write(dir.path().join("one.txt"), b"1").expect("Write failed.");
		std::fs::write(dir.path().join("two.txt"), b"22").expect("Write failed.");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-cdx".to_owned(), dir.path().to_string_lossy().into_owned(),
			"-disk_pattern".to_owned(), "on".to_owned(),
			"-add".to_owned(), "*.txt".to_owned(), "--".to_owned(),
		]);
		assert!(! shell.ended);
		assert!(shell.tree.node("/one.txt").is_some());
		assert!(shell.tree.node("/two.txt").is_some());

		shell.execute_args(&[
			"-rm".to_owned(), "/one.txt".to_owned(), "--".to_owned(),
		]);
		assert!(shell.tree.node("/one.txt").is_none());
		assert!(shell.tree.node("/two.txt").is_some());
	}

	#[test]
	fn t_chmod_chown() {
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-mkdir".to_owned(), "/d".to_owned(), "--".to_owned(),
			"-chmod".to_owned(), "0700".to_owned(), "/d".to_owned(), "--".to_owned(),
			"-chown".to_owned(), "1000".to_owned(), "/d".to_owned(), "--".to_owned(),
			"-chgrp".to_owned(), "100".to_owned(), "/d".to_owned(), "--".to_owned(),
		]);
		assert!(! shell.ended);
		let node = shell.tree.lstat("/d").expect("stat failed.");
		assert_eq!(node.mode, 0o700);
		assert_eq!(node.uid, 1000);
		assert_eq!(node.gid, 100);
	}

	#[test]
	fn t_update_idempotent() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let file = dir.path().join("data.bin");
		std::fs::write(&file, vec![9_u8; 100]).expect("Write failed.");
		let disk = file.to_string_lossy().into_owned();

		let mut shell = Shell::default();
		shell.cmd_update(&disk, "/data.bin").expect("First update failed.");
		assert!(shell.tree.node("/data.bin").is_some());
		let before = shell.tree.lstat("/data.bin").expect("stat failed.").clone();

		// Second run: no observable change.
		shell.cmd_update(&disk, "/data.bin").expect("Second update failed.");
		let after = shell.tree.lstat("/data.bin").expect("stat failed.");
		assert_eq!(before.size, after.size);
		assert_eq!(before.mtime, after.mtime);

		// Touch the file and the third run re-imports.
		std::fs::write(&file, vec![9_u8; 200]).expect("Write failed.");
		shell.cmd_update(&disk, "/data.bin").expect("Third update failed.");
		assert_eq!(shell.tree.lstat("/data.bin").expect("stat failed.").size, 200);
	}

	#[test]
	fn t_du_boundary() {
		// /foo must not swallow its lookalike siblings.
		let mut shell = Shell::default();
		for dir in ["/foo", "/foobar", "/foo.bak"] {
			shell.tree.mkdir(dir).expect("mkdir failed.");
		}
		for (path, size) in [
			("/foo/a.bin", 2048_u64),
			("/foobar/b.bin", 4096),
			("/foo.bak/c.bin", 8192),
		] {
			shell.tree.insert_file_node(path, Node {
				ntype: NodeType::File,
				size,
				..Node::default()
			}).expect("insert failed.");
		}

		assert_eq!(shell.du_total("/foo"), 2048);
		assert_eq!(shell.du_total("/foobar"), 4096);
		assert_eq!(shell.du_total("/foo.bak"), 8192);
		assert_eq!(shell.du_total("/foo/a.bin"), 2048);
		assert_eq!(shell.du_total("/"), 2048 + 4096 + 8192);
	}

	#[test]
	fn t_find_exec_chmod() {
		let mut shell = Shell::default();
		shell.execute_args(&[
			"-mkdir".to_owned(), "/x".to_owned(), "/x/y".to_owned(), "--".to_owned(),
			"-find".to_owned(), "/".to_owned(),
			"-type".to_owned(), "d".to_owned(),
			"-exec".to_owned(), "chmod".to_owned(), "0700".to_owned(), "--".to_owned(),
		]);
		assert!(! shell.ended, "Run aborted unexpectedly.");
		assert_eq!(shell.tree.lstat("/x").expect("stat failed.").mode, 0o700);
		assert_eq!(shell.tree.lstat("/x/y").expect("stat failed.").mode, 0o700);
	}

	#[test]
	fn t_commit_roundtrip_via_shell() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		std::fs::write(dir.path().join("payload.txt"), b"payload bytes")
			.expect("Write failed.");
		let img = dir.path().join("out.img");

		let mut shell = Shell::default();
		shell.execute_args(&[
			"-outdev".to_owned(), format!("stdio:{}", img.display()),
			"-volid".to_owned(), "SHELLRT".to_owned(),
			"-add".to_owned(),
			format!("/payload.txt={}", dir.path().join("payload.txt").display()),
			"--".to_owned(),
			"-padding".to_owned(), "0".to_owned(),
			"-commit".to_owned(),
		]);
		assert!(! shell.ended, "Run aborted unexpectedly.");
		assert_eq!(shell.exit_code(), 0);

		// The image exists and starts with the session magic.
		let raw = std::fs::read(&img).expect("Image missing.");
		assert!(! raw.is_empty());
		assert!(raw.starts_with(b"SCORCHIMG v1\nSHELLRT\n"));

		// And a second commit has nothing to do.
		shell.execute_args(&["-commit".to_owned()]);
		assert!(! shell.ended);
	}
}
