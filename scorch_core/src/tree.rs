/*!
# Scorch: The Image Tree

The interpreter treats the ISO tree as a collaborator with a deliberately
narrow surface: stat, structural edits, attribute plumbing, and session
load/store. `MemTree` is the in-memory implementation behind that surface;
its session format is a plain manifest — enough to round-trip through a
drive and be verified, without pretending to be ECMA-119.
*/

use crate::{
	Drive,
	DriveRole,
	MediaStatus,
	ScorchError,
	SECTOR_DATA_SIZE,
	sector::{
		Burner,
		Track,
		TrackMode,
		TrackSource,
		WriteSettings,
	},
};
use std::{
	collections::BTreeMap,
	fmt,
	path::{
		Path,
		PathBuf,
	},
};



/// # Session Header Magic.
const SESSION_MAGIC: &str = "SCORCHIMG v1";



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Node Flavor.
pub enum NodeType {
	/// # Directory.
	Dir,

	#[default]
	/// # Regular File.
	File,

	/// # Symbolic Link.
	Symlink,

	/// # Block Device.
	BlockDev,

	/// # Character Device.
	CharDev,

	/// # Named Pipe.
	Fifo,

	/// # Socket.
	Socket,

	/// # Boot Catalog.
	BootCatalog,
}

impl NodeType {
	#[must_use]
	/// # The `-type` Letter.
	pub const fn letter(self) -> char {
		match self {
			Self::Dir => 'd',
			Self::File => 'f',
			Self::Symlink => 'l',
			Self::BlockDev => 'b',
			Self::CharDev => 'c',
			Self::Fifo => 'p',
			Self::Socket => 's',
			Self::BootCatalog => 'e',
		}
	}

	#[must_use]
	/// # Matches a `-type` Argument Letter?
	///
	/// `X` covers the whole exotic family.
	pub const fn matches_letter(self, letter: char) -> bool {
		match letter {
			'X' => matches!(
				self,
				Self::BlockDev | Self::CharDev | Self::Fifo | Self::Socket,
			),
			l => l == self.letter(),
		}
	}
}



#[derive(Debug, Clone, Default)]
/// # One Tree Node.
pub struct Node {
	/// # Flavor.
	pub ntype: NodeType,

	/// # Permission Bits.
	pub mode: u32,

	/// # Owner.
	pub uid: u32,

	/// # Group.
	pub gid: u32,

	/// # Modification Time (Unix Seconds).
	pub mtime: i64,

	/// # Content Size in Bytes.
	pub size: u64,

	/// # Recorded Extent: (start_lba, blocks).
	pub lba: Option<(i32, i32)>,

	/// # POSIX ACL Text, If Any.
	pub acl: Option<String>,

	/// # Extended Attributes.
	pub xattr: ahash::HashMap<String, Vec<u8>>,

	/// # Attached Content Filter.
	pub filter: Option<String>,

	/// # Hide Mask (Bit 0 ISO, Bit 1 Joliet, Bit 2 HFS+).
	pub hidden: u8,

	/// # Recorded MD5.
	pub md5: Option<[u8; 16]>,

	/// # HFS+ Creator/Type Codes.
	pub hfs_crtp: Option<([u8; 4], [u8; 4])>,

	/// # HFS+ Blessing.
	pub hfs_bless: u8,

	/// # Source Path on Disk.
	pub disk_path: Option<PathBuf>,

	/// # Byte Offset Into the Source (For Cut-Out Pieces).
	pub disk_offset: u64,

	/// # Weight For Content Ordering at Write Time.
	pub sort_weight: i32,

	/// # Content Not Yet Committed?
	pub pending_data: bool,

	/// # Link Target (Symlinks).
	pub link_target: Option<String>,

	/// # Children (Directories).
	pub children: BTreeMap<String, Node>,
}

impl Node {
	/// # A Fresh Directory.
	fn dir() -> Self {
		Self {
			ntype: NodeType::Dir,
			mode: 0o755,
			..Self::default()
		}
	}

	#[must_use]
	/// # Any ACL?
	pub fn has_acl(&self) -> bool { self.acl.is_some() }

	#[must_use]
	/// # Any `user.` Extended Attributes?
	pub fn has_user_xattr(&self) -> bool {
		self.xattr.keys().any(|k| k.starts_with("user."))
	}

	#[must_use]
	/// # Any Extended Attributes At All?
	pub fn has_any_xattr(&self) -> bool { ! self.xattr.is_empty() }

	#[must_use]
	/// # Carries AAIP Metadata (ACL or Xattr)?
	pub fn has_aaip(&self) -> bool { self.has_acl() || self.has_any_xattr() }
}



#[derive(Debug, Clone, Copy)]
/// # A Written Session.
pub struct SessionSummary {
	/// # First LBA.
	pub start_lba: i32,

	/// # Sectors Written.
	pub sectors: i32,

	/// # Stream MD5.
	pub md5: [u8; 16],
}



/// # The Collaborator Surface.
///
/// Everything the interpreter is allowed to want from an image tree.
pub trait IsoTree {
	/// # Stat a Node.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn lstat(&self, path: &str) -> Result<&Node, ScorchError>;

	/// # Create a Directory.
	///
	/// ## Errors
	///
	/// This will return an error if the parent is missing or the name is
	/// taken.
	fn mkdir(&mut self, path: &str) -> Result<(), ScorchError>;

	/// # Create a Symlink.
	///
	/// ## Errors
	///
	/// This will return an error if the parent is missing or the name is
	/// taken.
	fn symlink(&mut self, target: &str, path: &str) -> Result<(), ScorchError>;

	/// # Move a Node.
	///
	/// ## Errors
	///
	/// This will return an error if the source is missing or the
	/// destination is taken.
	fn rename(&mut self, from: &str, to: &str) -> Result<(), ScorchError>;

	/// # Remove a Node.
	///
	/// ## Errors
	///
	/// This will return an error if the path is missing, or names a
	/// non-empty directory without `recursive`.
	fn unlink(&mut self, path: &str, recursive: bool) -> Result<(), ScorchError>;

	/// # List a Directory.
	///
	/// ## Errors
	///
	/// This will return an error if the path isn't a directory.
	fn walk_directory(&self, path: &str) -> Result<Vec<String>, ScorchError>;

	/// # Insert a File (or Whole Hierarchy) From Disk.
	///
	/// ## Errors
	///
	/// This will return an error if the disk side is unreadable or the
	/// image parent missing.
	fn add_file_from_disk(&mut self, disk_path: &Path, iso_path: &str)
	-> Result<u64, ScorchError>;

	/// # Set (or Clear) a Node's ACL.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn set_acl(&mut self, path: &str, acl: Option<String>) -> Result<(), ScorchError>;

	/// # Read a Node's ACL.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn get_acl(&self, path: &str) -> Result<Option<String>, ScorchError>;

	/// # Set (or Remove) One Extended Attribute.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn set_xattr(&mut self, path: &str, name: &str, value: Option<Vec<u8>>)
	-> Result<(), ScorchError>;

	/// # Read One Extended Attribute.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn get_xattr(&self, path: &str, name: &str)
	-> Result<Option<Vec<u8>>, ScorchError>;

	/// # Attach (or Detach) a Content Filter.
	///
	/// ## Errors
	///
	/// This will return an error if the path doesn't resolve.
	fn set_filter(&mut self, path: &str, filter: Option<String>)
	-> Result<(), ScorchError>;

	/// # Duplicate a Subtree.
	///
	/// ## Errors
	///
	/// This will return an error if the source is missing or the
	/// destination taken.
	fn clone_subtree(&mut self, from: &str, to: &str) -> Result<(), ScorchError>;

	/// # Load a Recorded Session Into the Tree.
	///
	/// ## Errors
	///
	/// This will return an error if nothing parseable is on the medium.
	fn load_session(&mut self, drive: &mut Drive, session: i32)
	-> Result<(), ScorchError>;

	/// # Write the Tree as a New Session.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses or a source file
	/// vanished.
	fn write_session(&mut self, drive: &mut Drive, padding_blocks: u32)
	-> Result<SessionSummary, ScorchError>;
}



#[derive(Debug, Clone)]
/// # The In-Memory Tree.
pub struct MemTree {
	/// # Root Directory.
	root: Node,

	/// # Volume Id.
	volid: String,

	/// # Uncommitted Changes?
	changes_pending: bool,

	/// # MD5 Coverage of the Last Loaded/Written Session.
	session_md5: Option<(i32, i32, [u8; 16])>,
}

impl Default for MemTree {
	fn default() -> Self {
		Self {
			root: Node::dir(),
			volid: "ISOIMAGE".to_owned(),
			changes_pending: false,
			session_md5: None,
		}
	}
}

impl fmt::Display for MemTree {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({} nodes)", self.volid, self.count_nodes())
	}
}

/// # Path Plumbing.
impl MemTree {
	/// # Split a Path Into Components.
	fn components(path: &str) -> Vec<&str> {
		path.split('/').filter(|p| ! p.is_empty() && *p != ".").collect()
	}

	/// # Find a Node.
	pub(crate) fn node(&self, path: &str) -> Option<&Node> {
		let mut cur = &self.root;
		for part in Self::components(path) {
			cur = cur.children.get(part)?;
		}
		Some(cur)
	}

	/// # Find a Node, Mutably.
	pub(crate) fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
		let mut cur = &mut self.root;
		for part in Self::components(path) {
			cur = cur.children.get_mut(part)?;
		}
		Some(cur)
	}

	/// # Find the Parent Directory and Leaf Name.
	fn parent_mut(&mut self, path: &str) -> Result<(&mut Node, String), ScorchError> {
		let comps = Self::components(path);
		let Some((leaf, dirs)) = comps.split_last() else {
			return Err(ScorchError::IsoPath(path.to_owned()));
		};
		let mut cur = &mut self.root;
		for part in dirs {
			cur = cur.children.get_mut(*part)
				.ok_or_else(|| ScorchError::IsoPath(path.to_owned()))?;
			if cur.ntype != NodeType::Dir {
				return Err(ScorchError::IsoPathNotDir(path.to_owned()));
			}
		}
		Ok((cur, (*leaf).to_owned()))
	}

	/// # Find a Node, Mutably, or Complain.
	pub(crate) fn node_required(&mut self, path: &str)
	-> Result<&mut Node, ScorchError> {
		// Two-phase borrow dance: existence first, handle second.
		if self.node(path).is_none() {
			return Err(ScorchError::IsoPath(path.to_owned()));
		}
		self.node_mut(path).ok_or_else(|| ScorchError::IsoPath(path.to_owned()))
	}

	/// # Create a Directory Chain.
	pub(crate) fn mkdir_parents(&mut self, path: &str) -> Result<(), ScorchError> {
		let mut cur = String::new();
		for part in Self::components(path) {
			cur.push('/');
			cur.push_str(part);
			match self.node(&cur) {
				Some(node) if node.ntype == NodeType::Dir => {},
				Some(_) => return Err(ScorchError::IsoPathNotDir(cur)),
				None => self.mkdir(&cur)?,
			}
		}
		Ok(())
	}

	/// # Create a Path's Missing Ancestors.
	pub(crate) fn mkdir_parents_of(&mut self, path: &str)
	-> Result<(), ScorchError> {
		let comps = Self::components(path);
		let Some((_, dirs)) = comps.split_last() else { return Ok(()); };
		if dirs.is_empty() { return Ok(()); }
		self.mkdir_parents(&format!("/{}", dirs.join("/")))
	}

	/// # Insert (or Replace) a File Node Outright.
	pub(crate) fn insert_file_node(&mut self, path: &str, node: Node)
	-> Result<(), ScorchError> {
		let (parent, leaf) = self.parent_mut(path)?;
		parent.children.insert(leaf, node);
		self.touch();
		Ok(())
	}

	/// # Total Node Count.
	pub(crate) fn count_nodes(&self) -> usize {
		fn walk(node: &Node) -> usize {
			1 + node.children.values().map(walk).sum::<usize>()
		}
		walk(&self.root)
	}

	/// # Volume Id.
	#[must_use]
	pub fn volid(&self) -> &str { &self.volid }

	/// # Set the Volume Id.
	pub fn set_volid(&mut self, volid: &str) {
		self.volid = volid.to_owned();
		self.changes_pending = true;
	}

	/// # Anything Uncommitted?
	#[must_use]
	pub const fn changes_pending(&self) -> bool { self.changes_pending }

	/// # Mark Dirty.
	pub(crate) fn touch(&mut self) { self.changes_pending = true; }

	/// # Last Session's MD5 Coverage.
	#[must_use]
	pub const fn session_md5(&self) -> Option<(i32, i32, [u8; 16])> {
		self.session_md5
	}

	/// # Wipe Everything (Rollback).
	pub fn clear(&mut self) {
		self.root = Node::dir();
		self.changes_pending = false;
		self.session_md5 = None;
	}

	/// # Depth-First Paths (Directories Before Their Contents).
	#[must_use]
	pub fn all_paths(&self) -> Vec<String> {
		fn walk(node: &Node, base: &str, out: &mut Vec<String>) {
			for (name, child) in &node.children {
				let path = format!("{base}/{name}");
				out.push(path.clone());
				if child.ntype == NodeType::Dir { walk(child, &path, out); }
			}
		}
		let mut out = vec!["/".to_owned()];
		walk(&self.root, "", &mut out);
		out
	}

	/// # Estimated Image Size in Bytes (Manifest + Content).
	#[must_use]
	pub fn estimate_size(&self) -> u64 {
		let mut total = SECTOR_DATA_SIZE as u64; // Header sector.
		for path in self.all_paths() {
			if let Some(node) = self.node(&path) {
				total += path.len() as u64 + 64;
				if node.ntype == NodeType::File {
					total += node.size.div_ceil(SECTOR_DATA_SIZE as u64) *
						SECTOR_DATA_SIZE as u64;
				}
			}
		}
		total
	}
}

impl IsoTree for MemTree {
	fn lstat(&self, path: &str) -> Result<&Node, ScorchError> {
		self.node(path).ok_or_else(|| ScorchError::IsoPath(path.to_owned()))
	}

	fn mkdir(&mut self, path: &str) -> Result<(), ScorchError> {
		let (parent, leaf) = self.parent_mut(path)?;
		if parent.children.contains_key(&leaf) {
			return Err(ScorchError::IsoPathExists(path.to_owned()));
		}
		parent.children.insert(leaf, Node::dir());
		self.touch();
		Ok(())
	}

	fn symlink(&mut self, target: &str, path: &str) -> Result<(), ScorchError> {
		let (parent, leaf) = self.parent_mut(path)?;
		if parent.children.contains_key(&leaf) {
			return Err(ScorchError::IsoPathExists(path.to_owned()));
		}
		parent.children.insert(leaf, Node {
			ntype: NodeType::Symlink,
			mode: 0o777,
			link_target: Some(target.to_owned()),
			pending_data: true,
			..Node::default()
		});
		self.touch();
		Ok(())
	}

	fn rename(&mut self, from: &str, to: &str) -> Result<(), ScorchError> {
		if self.node(to).is_some() {
			return Err(ScorchError::IsoPathExists(to.to_owned()));
		}
		let (parent, leaf) = self.parent_mut(from)?;
		let node = parent.children.remove(&leaf)
			.ok_or_else(|| ScorchError::IsoPath(from.to_owned()))?;
		let (parent, leaf) = match self.parent_mut(to) {
			Ok(ok) => ok,
			Err(err) => {
				// Put it back before bailing.
				if let Ok((p, l)) = self.parent_mut(from) {
					p.children.insert(l, node);
				}
				return Err(err);
			},
		};
		parent.children.insert(leaf, node);
		self.touch();
		Ok(())
	}

	fn unlink(&mut self, path: &str, recursive: bool) -> Result<(), ScorchError> {
		{
			let node = self.lstat(path)?;
			if node.ntype == NodeType::Dir && ! node.children.is_empty() &&
				! recursive {
				return Err(ScorchError::IsoPathNotDir(path.to_owned()));
			}
		}
		let (parent, leaf) = self.parent_mut(path)?;
		parent.children.remove(&leaf)
			.ok_or_else(|| ScorchError::IsoPath(path.to_owned()))?;
		self.touch();
		Ok(())
	}

	fn walk_directory(&self, path: &str) -> Result<Vec<String>, ScorchError> {
		let node = self.lstat(path)?;
		if node.ntype != NodeType::Dir {
			return Err(ScorchError::IsoPathNotDir(path.to_owned()));
		}
		Ok(node.children.keys().cloned().collect())
	}

	fn add_file_from_disk(&mut self, disk_path: &Path, iso_path: &str)
	-> Result<u64, ScorchError> {
		let meta = disk_path.symlink_metadata()
			.map_err(|_| ScorchError::Read(disk_path.to_string_lossy().into_owned()))?;

		let mut added = 0;
		if meta.is_dir() {
			if self.node(iso_path).is_none() { self.mkdir(iso_path)?; }
			let mut names: Vec<PathBuf> = std::fs::read_dir(disk_path)
				.map_err(|_| ScorchError::Read(disk_path.to_string_lossy().into_owned()))?
				.filter_map(|e| e.ok().map(|e| e.path()))
				.collect();
			names.sort();
			for sub in names {
				let name = sub.file_name()
					.map(|n| n.to_string_lossy().into_owned())
					.unwrap_or_default();
				added += self.add_file_from_disk(&sub, &format!("{iso_path}/{name}"))?;
			}
		}
		else if meta.is_symlink() {
			let target = std::fs::read_link(disk_path)
				.map(|t| t.to_string_lossy().into_owned())
				.unwrap_or_default();
			if self.node(iso_path).is_some() { self.unlink(iso_path, true)?; }
			self.symlink(&target, iso_path)?;
			added += 1;
		}
		else {
			use std::os::unix::fs::MetadataExt;
			let (parent, leaf) = self.parent_mut(iso_path)?;
			parent.children.insert(leaf, Node {
				ntype: NodeType::File,
				mode: meta.mode() & 0o7777,
				uid: meta.uid(),
				gid: meta.gid(),
				mtime: meta.mtime(),
				size: meta.len(),
				disk_path: Some(disk_path.to_path_buf()),
				pending_data: true,
				..Node::default()
			});
			added += 1;
		}
		self.touch();
		Ok(added)
	}

	fn set_acl(&mut self, path: &str, acl: Option<String>) -> Result<(), ScorchError> {
		let node = self.node_mut(path)
			.ok_or_else(|| ScorchError::IsoPath(path.to_owned()))?;
		node.acl = acl;
		self.touch();
		Ok(())
	}

	fn get_acl(&self, path: &str) -> Result<Option<String>, ScorchError> {
		Ok(self.lstat(path)?.acl.clone())
	}

	fn set_xattr(&mut self, path: &str, name: &str, value: Option<Vec<u8>>)
	-> Result<(), ScorchError> {
		let node = self.node_mut(path)
			.ok_or_else(|| ScorchError::IsoPath(path.to_owned()))?;
		match value {
			Some(value) => { node.xattr.insert(name.to_owned(), value); },
			None => { node.xattr.remove(name); },
		}
		self.touch();
		Ok(())
	}

	fn get_xattr(&self, path: &str, name: &str)
	-> Result<Option<Vec<u8>>, ScorchError> {
		Ok(self.lstat(path)?.xattr.get(name).cloned())
	}

	fn set_filter(&mut self, path: &str, filter: Option<String>)
	-> Result<(), ScorchError> {
		let node = self.node_mut(path)
			.ok_or_else(|| ScorchError::IsoPath(path.to_owned()))?;
		node.filter = filter;
		self.touch();
		Ok(())
	}

	fn clone_subtree(&mut self, from: &str, to: &str) -> Result<(), ScorchError> {
		if self.node(to).is_some() {
			return Err(ScorchError::IsoPathExists(to.to_owned()));
		}
		let copy = self.lstat(from)?.clone();
		let (parent, leaf) = self.parent_mut(to)?;
		parent.children.insert(leaf, copy);
		self.touch();
		Ok(())
	}

	fn load_session(&mut self, drive: &mut Drive, _session: i32)
	-> Result<(), ScorchError> {
		// Find the session start: the stdio pseudo-drive records from
		// zero; optical media are asked for their last session directly,
		// with the TOC as the fallback witness.
		let start: i32 =
			if drive.role() == DriveRole::Mmc {
				drive.read_multi_session_info()
					.map(|(_, start)| start)
					.unwrap_or_else(|_| drive.toc().iter()
						.filter(|e| ! e.is_leadout())
						.map(|e| e.start_lba)
						.max()
						.unwrap_or(0))
			}
			else { 0 };

		let mut head = vec![0_u8; SECTOR_DATA_SIZE];
		drive.read_blocks(u32::try_from(start).unwrap_or(0), 1, &mut head)?;
		let head = String::from_utf8_lossy(&head).into_owned();
		let mut lines = head.lines();
		if lines.next() != Some(SESSION_MAGIC) {
			return Err(ScorchError::Unsuitable("image loading"));
		}
		let volid = lines.next().unwrap_or("ISOIMAGE").to_owned();
		let manifest_sectors: u32 = lines.next()
			.and_then(|l| l.trim().parse().ok())
			.unwrap_or(0);

		// The manifest proper.
		let mut raw = vec![0_u8; manifest_sectors as usize * SECTOR_DATA_SIZE];
		if 0 < manifest_sectors {
			drive.read_blocks(
				u32::try_from(start + 1).unwrap_or(0),
				u16::try_from(manifest_sectors).unwrap_or(u16::MAX),
				&mut raw,
			)?;
		}
		let manifest = String::from_utf8_lossy(&raw).into_owned();

		self.clear();
		self.volid = volid;
		for line in manifest.lines() {
			let line = line.trim_end_matches('\0');
			if line.is_empty() { continue; }
			let mut parts = line.splitn(4, ' ');
			let (Some(kind), Some(size), Some(lba), Some(path)) =
				(parts.next(), parts.next(), parts.next(), parts.next())
				else { continue; };
			let size: u64 = size.parse().unwrap_or(0);
			let lba: i32 = lba.parse().unwrap_or(0);
			match kind {
				"d" => { let _res = self.mkdir(path); },
				"f" => {
					if let Ok((parent, leaf)) = self.parent_mut(path) {
						let blocks = i32::try_from(
							size.div_ceil(SECTOR_DATA_SIZE as u64)
						).unwrap_or(0);
						parent.children.insert(leaf, Node {
							ntype: NodeType::File,
							mode: 0o644,
							size,
							lba: Some((lba, blocks)),
							..Node::default()
						});
					}
				},
				"l" => {
					let (target, path) = path.split_once(" -> ")
						.map_or((String::new(), path), |(p, t)| (t.to_owned(), p));
					let _res = self.symlink(&target, path);
				},
				_ => {},
			}
		}
		self.changes_pending = false;
		Ok(())
	}

	fn write_session(&mut self, drive: &mut Drive, padding_blocks: u32)
	-> Result<SessionSummary, ScorchError> {
		// Where does the session land?
		let start: i32 =
			if drive.role() == DriveRole::Mmc {
				drive.get_nwa()?.map_or(0, |(_, nwa)| nwa)
			}
			else if drive.status() == MediaStatus::Blank { 0 }
			else { drive.last_leadout };
		let start = start.max(0);

		// Lay out the files: manifest first, content after, heavier sort
		// weights first within the content run.
		let mut manifest = String::new();
		let mut files: Vec<(String, PathBuf, u64, u64)> = Vec::new();
		let mut weights: Vec<i32> = Vec::new();
		for path in self.all_paths() {
			if path == "/" { continue; }
			let Some(node) = self.node(&path) else { continue; };
			match node.ntype {
				NodeType::Dir => {
					manifest.push_str(&format!("d 0 0 {path}\n"));
				},
				NodeType::Symlink => {
					manifest.push_str(&format!(
						"l 0 0 {path} -> {}\n",
						node.link_target.as_deref().unwrap_or(""),
					));
				},
				NodeType::File => {
					files.push((
						path.clone(),
						node.disk_path.clone().unwrap_or_default(),
						node.size,
						node.disk_offset,
					));
					weights.push(node.sort_weight);
				},
				_ => {},
			}
		}
		let mut order: Vec<usize> = (0..files.len()).collect();
		order.sort_by_key(|&i| std::cmp::Reverse(weights[i]));
		let files: Vec<(String, PathBuf, u64, u64)> =
			order.into_iter().map(|i| files[i].clone()).collect();

		// File extents are assigned after the (not yet sized) manifest;
		// two passes settle the circularity: size the manifest with
		// placeholder lbas, then fill in the real ones.
		let mut manifest_sectors = 0_u32;
		let mut body = String::new();
		for _pass in 0..2 {
			body = manifest.clone();
			let mut next = start + 1 + i32::try_from(manifest_sectors).unwrap_or(0);
			for (path, _, size, _) in &files {
				body.push_str(&format!("f {size} {next} {path}\n"));
				next += i32::try_from(size.div_ceil(SECTOR_DATA_SIZE as u64))
					.unwrap_or(0);
			}
			manifest_sectors = u32::try_from(
				(body.len() as u64).div_ceil(SECTOR_DATA_SIZE as u64)
			).unwrap_or(0);
		}

		// Header sector.
		let header = format!("{SESSION_MAGIC}\n{}\n{manifest_sectors}\n", self.volid);

		// Source files that vanished since insertion still occupy their
		// extents — as zeros — but the damage goes on record first.
		for (path, disk, _, _) in &files {
			if std::fs::File::open(disk).is_err() {
				drive.outpost.info(crate::Severity::Sorry, format!(
					"Source file is unreadable; zeros will stand in for {path}",
				));
				drive.outpost.log_errfile(crate::Severity::Sorry, disk);
			}
		}

		// Stream it through the sector pump, hashing on the way past.
		let md5_acc = std::rc::Rc::new(std::cell::RefCell::new(md5::Context::new()));
		let source = SessionSource::new(
			header, body, manifest_sectors, &files, std::rc::Rc::clone(&md5_acc),
		);
		let total_bytes = source.total_bytes;
		let mut track = Track::new(Box::new(source), TrackMode::Mode1);
		track.open_ended = false;
		track.fixed_size = total_bytes;
		track.tail = padding_blocks as usize * SECTOR_DATA_SIZE;

		let mut burner = Burner::new(start, WriteSettings {
			obs: 32 * 1024,
			..WriteSettings::default()
		});

		if drive.role() == DriveRole::Mmc {
			drive.prepare_for_write(total_bytes)?;
		}

		let total_sectors = i64::try_from(
			total_bytes.div_ceil(SECTOR_DATA_SIZE as u64) + u64::from(padding_blocks)
		).unwrap_or(0);
		for _ in 0..total_sectors {
			if ! burner.sector_data(drive, &mut track, false)? { break; }
		}
		burner.flush(drive)?;
		if drive.role() == DriveRole::Mmc { drive.sync_cache()?; }

		let sectors = i32::try_from(total_sectors).unwrap_or(0);
		let digest: [u8; 16] = {
			// The tail padding never passes through the source, but it is
			// on the medium, so it joins the digest here.
			let mut ctx = md5_acc.borrow().clone();
			let zeros = [0_u8; 1024];
			let mut left = padding_blocks as usize * SECTOR_DATA_SIZE;
			while 0 < left {
				let take = left.min(zeros.len());
				ctx.consume(&zeros[..take]);
				left -= take;
			}
			ctx.compute().0
		};

		// Settle the tree: extents in, pending out.
		let mut next = start + 1 + i32::try_from(manifest_sectors).unwrap_or(0);
		for (path, _, size, _) in &files {
			let blocks = i32::try_from(size.div_ceil(SECTOR_DATA_SIZE as u64))
				.unwrap_or(0);
			if let Some(node) = self.node_mut(path) {
				node.lba = Some((next, blocks));
				node.pending_data = false;
			}
			next += blocks;
		}
		self.changes_pending = false;
		self.session_md5 = Some((start, sectors, digest));

		drive.outpost.log_session(start, sectors, &self.volid);
		Ok(SessionSummary { start_lba: start, sectors, md5: digest })
	}
}

/// # Pattern Namespace.
impl crate::pattern::Namespace for MemTree {
	fn children(&self, dir: &str) -> Vec<String> {
		self.node(dir)
			.map(|n| n.children.keys().cloned().collect())
			.unwrap_or_default()
	}

	fn exists(&self, path: &str) -> bool { self.node(path).is_some() }

	fn is_dir(&self, path: &str) -> bool {
		self.node(path).is_some_and(|n| n.ntype == NodeType::Dir)
	}
}



/// # The Session Byte Stream.
///
/// Header sector plus padded manifest (one memory chunk), then each file's
/// content padded to the sector grid. Missing source files deliver zeros;
/// their damage is the caller's to report. Everything read is folded into
/// the shared MD5 context on the way past.
struct SessionSource {
	/// # Concatenated Pieces.
	chunks: Vec<SessionChunk>,

	/// # Current Piece.
	pos: usize,

	/// # Total Stream Bytes.
	total_bytes: u64,

	/// # Shared Digest Accumulator.
	md5: std::rc::Rc<std::cell::RefCell<md5::Context>>,
}

/// # One Piece of the Stream.
enum SessionChunk {
	/// # Literal Bytes.
	Mem(Vec<u8>, usize),

	/// # A File's Content, Clipped to Its Recorded Size.
	File(std::io::BufReader<std::fs::File>, u64, u64),

	/// # Plain Zeros.
	Zeros(u64),
}

impl SessionSource {
	/// # Assemble the Stream.
	fn new(
		header: String,
		body: String,
		manifest_sectors: u32,
		files: &[(String, PathBuf, u64, u64)],
		md5: std::rc::Rc<std::cell::RefCell<md5::Context>>,
	) -> Self {
		use std::io::Seek;

		let mut chunks = Vec::with_capacity(1 + 2 * files.len());

		// Header sector and manifest sectors travel as one padded blob.
		let mut head = header.into_bytes();
		head.resize(SECTOR_DATA_SIZE, 0);
		let mut man = body.into_bytes();
		man.resize(manifest_sectors as usize * SECTOR_DATA_SIZE, 0);
		head.append(&mut man);
		let mut total = head.len() as u64;
		chunks.push(SessionChunk::Mem(head, 0));

		for (_, disk, size, offset) in files {
			let padded = size.div_ceil(SECTOR_DATA_SIZE as u64)
				* SECTOR_DATA_SIZE as u64;
			total += padded;
			match std::fs::File::open(disk) {
				Ok(mut file) => {
					if 0 < *offset &&
						file.seek(std::io::SeekFrom::Start(*offset)).is_err() {
						chunks.push(SessionChunk::Zeros(padded));
						continue;
					}
					chunks.push(SessionChunk::File(
						std::io::BufReader::new(file), *size, 0,
					));
					if *size < padded {
						chunks.push(SessionChunk::Zeros(padded - size));
					}
				},
				Err(_) => chunks.push(SessionChunk::Zeros(padded)),
			}
		}

		Self { chunks, pos: 0, total_bytes: total, md5 }
	}
}

impl TrackSource for SessionSource {
	fn read(&mut self, out: &mut [u8]) -> usize {
		use std::io::Read;

		let mut done = 0;
		while done < out.len() && self.pos < self.chunks.len() {
			let dst = &mut out[done..];
			let n = match &mut self.chunks[self.pos] {
				SessionChunk::Mem(raw, at) => {
					let take = (raw.len() - *at).min(dst.len());
					dst[..take].copy_from_slice(&raw[*at..*at + take]);
					*at += take;
					if raw.len() <= *at { self.pos += 1; }
					take
				},
				SessionChunk::File(file, size, at) => {
					let want = usize::try_from((*size - *at).min(dst.len() as u64))
						.unwrap_or(0);
					let got = file.read(&mut dst[..want]).unwrap_or(0);
					if got == 0 {
						// A shrunken source file: the remainder becomes
						// zeros so the grid stays square.
						let left = *size - *at;
						self.chunks[self.pos] = SessionChunk::Zeros(left);
					}
					else {
						*at += got as u64;
						if *size <= *at { self.pos += 1; }
					}
					got
				},
				SessionChunk::Zeros(left) => {
					let take = usize::try_from((*left).min(dst.len() as u64))
						.unwrap_or(0);
					dst[..take].fill(0);
					*left -= take as u64;
					if *left == 0 { self.pos += 1; }
					take
				},
			};
			done += n;
		}

		self.md5.borrow_mut().consume(&out[..done]);
		done
	}
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Tree With Some Furniture.
	fn furnished() -> MemTree {
		let mut tree = MemTree::default();
		tree.mkdir("/docs").expect("mkdir failed.");
		tree.mkdir("/docs/old").expect("mkdir failed.");
		tree.symlink("/docs", "/shortcut").expect("symlink failed.");
		tree
	}

	#[test]
	fn t_structure() {
		let mut tree = furnished();
		assert_eq!(tree.lstat("/docs").expect("stat failed.").ntype, NodeType::Dir);
		assert_eq!(
			tree.lstat("/shortcut").expect("stat failed.").link_target.as_deref(),
			Some("/docs"),
		);
		assert!(tree.lstat("/nope").is_err());
		assert!(tree.mkdir("/docs").is_err()); // Taken.
		assert!(tree.mkdir("/a/b/c").is_err()); // No parent.

		// Walking and renaming.
		assert_eq!(
			tree.walk_directory("/").expect("walk failed."),
			vec!["docs".to_owned(), "shortcut".to_owned()],
		);
		tree.rename("/docs/old", "/docs/new").expect("rename failed.");
		assert!(tree.node("/docs/old").is_none());
		assert!(tree.node("/docs/new").is_some());

		// A populated directory resists casual unlinking.
		assert!(tree.unlink("/docs", false).is_err());
		tree.unlink("/docs", true).expect("recursive unlink failed.");
		assert!(tree.node("/docs").is_none());
	}

	#[test]
	fn t_attributes() {
		let mut tree = furnished();
		tree.set_acl("/docs", Some("user::rwx,group::r-x".to_owned()))
			.expect("set_acl failed.");
		tree.set_xattr("/docs", "user.note", Some(b"hello".to_vec()))
			.expect("set_xattr failed.");
		tree.set_xattr("/docs", "system.sec", Some(b"x".to_vec()))
			.expect("set_xattr failed.");

		let node = tree.lstat("/docs").expect("stat failed.");
		assert!(node.has_acl());
		assert!(node.has_user_xattr());
		assert!(node.has_any_xattr());
		assert!(node.has_aaip());
		assert_eq!(
			tree.get_xattr("/docs", "user.note").expect("get_xattr failed."),
			Some(b"hello".to_vec()),
		);

		tree.set_xattr("/docs", "user.note", None).expect("clear failed.");
		tree.set_xattr("/docs", "system.sec", None).expect("clear failed.");
		tree.set_acl("/docs", None).expect("clear failed.");
		let node = tree.lstat("/docs").expect("stat failed.");
		assert!(! node.has_aaip());
	}

	#[test]
	fn t_add_from_disk_and_clone() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let sub = dir.path().join("payload");
		std::fs::create_dir(&sub).expect("mkdir failed.");
		std::fs::write(sub.join("alpha.txt"), b"alpha").expect("write failed.");
		std::fs::write(sub.join("beta.txt"), b"beta beta").expect("write failed.");

		let mut tree = MemTree::default();
		let added = tree.add_file_from_disk(&sub, "/payload")
			.expect("add failed.");
		assert_eq!(added, 2);
		assert_eq!(tree.lstat("/payload/alpha.txt").expect("stat failed.").size, 5);
		assert!(tree.lstat("/payload/beta.txt").expect("stat failed.").pending_data);

		tree.clone_subtree("/payload", "/copy").expect("clone failed.");
		assert_eq!(tree.lstat("/copy/beta.txt").expect("stat failed.").size, 9);
		assert!(tree.clone_subtree("/payload", "/copy").is_err());
	}

	#[test]
	fn t_session_roundtrip() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		std::fs::write(dir.path().join("a.txt"), b"first file").expect("write failed.");
		std::fs::write(dir.path().join("b.bin"), vec![7_u8; 5000]).expect("write failed.");

		// Build a tree and commit it to a stdio pseudo-drive.
		let image = dir.path().join("image.bin");
		let mut drive = Drive::acquire(
			&format!("stdio:{}", image.display()),
			true,
		).expect("acquire failed.");

		let mut tree = MemTree::default();
		tree.set_volid("ROUNDTRIP");
		tree.mkdir("/docs").expect("mkdir failed.");
		tree.add_file_from_disk(&dir.path().join("a.txt"), "/docs/a.txt")
			.expect("add failed.");
		tree.add_file_from_disk(&dir.path().join("b.bin"), "/b.bin")
			.expect("add failed.");

		let summary = tree.write_session(&mut drive, 0)
			.expect("write_session failed.");
		assert_eq!(summary.start_lba, 0);
		assert!(0 < summary.sectors);
		assert!(! tree.changes_pending());

		// Load it back into a fresh tree and compare the shape.
		let mut back = MemTree::default();
		back.load_session(&mut drive, -1).expect("load_session failed.");
		assert_eq!(back.volid(), "ROUNDTRIP");
		assert_eq!(back.lstat("/docs").expect("stat failed.").ntype, NodeType::Dir);
		let a = back.lstat("/docs/a.txt").expect("stat failed.");
		assert_eq!(a.size, 10);
		assert!(a.lba.is_some());
		let b = back.lstat("/b.bin").expect("stat failed.");
		assert_eq!(b.size, 5000);
		assert_eq!(b.lba.map(|(_, blocks)| blocks), Some(3));

		// And the recorded bytes really are the file contents.
		let (lba, _) = a.lba.expect("extent missing.");
		let mut sector = vec![0_u8; SECTOR_DATA_SIZE];
		drive.read_blocks(u32::try_from(lba).expect("lba"), 1, &mut sector)
			.expect("readback failed.");
		assert_eq!(&sector[..10], b"first file");
	}

	#[test]
	fn t_type_letters() {
		assert!(NodeType::Dir.matches_letter('d'));
		assert!(NodeType::File.matches_letter('f'));
		assert!(NodeType::Symlink.matches_letter('l'));
		assert!(NodeType::Fifo.matches_letter('X'));
		assert!(NodeType::Socket.matches_letter('X'));
		assert!(! NodeType::File.matches_letter('X'));
		assert!(! NodeType::Dir.matches_letter('f'));
	}
}
