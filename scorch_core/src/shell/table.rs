/*!
# Scorch: The Command Table

Every command belongs to exactly one arity class — 0 to 4 fixed arguments,
or variable-length ended by the list delimiter — and carries a sorting
rank for `-x` runs: setup before drive acquisition before insertion before
manipulation before write before finish. The table is the contract.
*/

use ahash::HashMapExt;
use std::sync::OnceLock;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Argument Arity.
pub(crate) enum Arity {
	/// # Fixed Count.
	N(u8),

	/// # Variable, Ended by the List Delimiter.
	Var,
}



// Sorting Ranks
// ---------------

/// # Global/Message Setup.
const RANK_GLOBAL: u16 = 5;

/// # Write/Image Setup.
const RANK_SETUP: u16 = 10;

/// # Drive Acquisition.
const RANK_DRIVE: u16 = 20;

/// # Source Navigation.
const RANK_SOURCE: u16 = 30;

/// # Insertion.
const RANK_INSERT: u16 = 40;

/// # Manipulation.
const RANK_MANIP: u16 = 50;

/// # Inspection.
const RANK_INSPECT: u16 = 55;

/// # Writing.
const RANK_WRITE: u16 = 60;

/// # Finishing Up.
const RANK_FINISH: u16 = 70;



/// # The Table.
///
/// (canonical name, arity, rank)
const COMMANDS: &[(&str, Arity, u16)] = &[
	// Global plumbing.
	("abort_on", Arity::N(1), RANK_GLOBAL),
	("backslash_codes", Arity::N(1), RANK_GLOBAL),
	("errfile_log", Arity::N(1), RANK_GLOBAL),
	("list_delimiter", Arity::N(1), RANK_GLOBAL),
	("mark", Arity::N(1), RANK_GLOBAL),
	("pkt_output", Arity::N(1), RANK_GLOBAL),
	("return_with", Arity::N(2), RANK_GLOBAL),
	("session_log", Arity::N(1), RANK_GLOBAL),
	("temp_mem_limit", Arity::N(1), RANK_GLOBAL),
	("x", Arity::N(0), RANK_GLOBAL),

	// Setup.
	("acl", Arity::N(1), RANK_SETUP),
	("add_plainly", Arity::N(1), RANK_SETUP),
	("charset", Arity::N(1), RANK_SETUP),
	("compliance", Arity::N(1), RANK_SETUP),
	("disk_pattern", Arity::N(1), RANK_SETUP),
	("drive_class", Arity::N(2), RANK_SETUP),
	("dummy", Arity::N(1), RANK_SETUP),
	("hardlinks", Arity::N(1), RANK_SETUP),
	("iso_rr_pattern", Arity::N(1), RANK_SETUP),
	("jigdo", Arity::N(2), RANK_SETUP),
	("joliet", Arity::N(1), RANK_SETUP),
	("md5", Arity::N(1), RANK_SETUP),
	("padding", Arity::N(1), RANK_SETUP),
	("speed", Arity::N(1), RANK_SETUP),
	("stream_recording", Arity::N(1), RANK_SETUP),
	("volid", Arity::N(1), RANK_SETUP),
	("xattr", Arity::N(1), RANK_SETUP),

	// Drives.
	("dev", Arity::N(1), RANK_DRIVE),
	("indev", Arity::N(1), RANK_DRIVE),
	("load", Arity::N(2), RANK_DRIVE),
	("outdev", Arity::N(1), RANK_DRIVE),

	// Navigation.
	("cd", Arity::N(1), RANK_SOURCE),
	("cdx", Arity::N(1), RANK_SOURCE),

	// Insertion.
	("add", Arity::Var, RANK_INSERT),
	("append_partition", Arity::N(3), RANK_INSERT),
	("cut_out", Arity::N(4), RANK_INSERT),
	("map_l", Arity::Var, RANK_INSERT),
	("mkdir", Arity::Var, RANK_INSERT),
	("path_list", Arity::Var, RANK_INSERT),

	// Manipulation.
	("as", Arity::Var, RANK_MANIP),
	("chgrp", Arity::Var, RANK_MANIP),
	("chmod", Arity::Var, RANK_MANIP),
	("chown", Arity::Var, RANK_MANIP),
	("find", Arity::Var, RANK_MANIP),
	("mv", Arity::Var, RANK_MANIP),
	("paste_in", Arity::N(4), RANK_MANIP),
	("rm", Arity::Var, RANK_MANIP),
	("rm_r", Arity::Var, RANK_MANIP),
	("rmdir", Arity::Var, RANK_MANIP),
	("setfacl", Arity::Var, RANK_MANIP),
	("setfattr", Arity::N(2), RANK_MANIP),
	("update", Arity::N(2), RANK_MANIP),

	// Inspection.
	("check_media", Arity::Var, RANK_INSPECT),
	("compare", Arity::N(2), RANK_INSPECT),
	("du", Arity::Var, RANK_INSPECT),
	("extract_cut", Arity::N(4), RANK_INSPECT),
	("ls", Arity::Var, RANK_INSPECT),
	("mount", Arity::N(4), RANK_INSPECT),
	("print_size", Arity::N(0), RANK_INSPECT),
	("pwd", Arity::N(0), RANK_INSPECT),
	("pwdx", Arity::N(0), RANK_INSPECT),
	("toc", Arity::N(0), RANK_INSPECT),

	// Writing.
	("blank", Arity::N(1), RANK_WRITE),
	("close", Arity::N(1), RANK_WRITE),
	("commit", Arity::N(0), RANK_WRITE),
	("format", Arity::N(1), RANK_WRITE),

	// Finishing.
	("eject", Arity::N(1), RANK_FINISH),
	("end", Arity::N(0), RANK_FINISH),
	("help", Arity::N(0), RANK_FINISH),
	("rollback", Arity::N(0), RANK_FINISH),
	("version", Arity::N(0), RANK_FINISH),
];

/// # Name Index.
static INDEX: OnceLock<ahash::HashMap<&'static str, (Arity, u16)>> = OnceLock::new();

/// # Look Up a Canonical Command Name.
pub(crate) fn lookup(name: &str) -> Option<(Arity, u16)> {
	INDEX.get_or_init(|| {
		let mut map = ahash::HashMap::with_capacity(COMMANDS.len());
		for &(name, arity, rank) in COMMANDS {
			map.insert(name, (arity, rank));
		}
		map
	})
		.get(name)
		.copied()
}

/// # Canonicalize a Raw Command Word.
///
/// Leading dashes (any number) strip away; interior dashes become
/// underscores.
pub(crate) fn canonical(raw: &str) -> String {
	raw.trim_start_matches('-').replace('-', "_")
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_canonical() {
		assert_eq!(canonical("-check_media"), "check_media");
		assert_eq!(canonical("--check-media"), "check_media");
		assert_eq!(canonical("add"), "add");
		assert_eq!(canonical("---rm-r"), "rm_r");
	}

	#[test]
	fn t_lookup() {
		assert_eq!(lookup("commit"), Some((Arity::N(0), RANK_WRITE)));
		assert_eq!(lookup("dev"), Some((Arity::N(1), RANK_DRIVE)));
		assert_eq!(lookup("return_with"), Some((Arity::N(2), RANK_GLOBAL)));
		assert_eq!(lookup("append_partition"), Some((Arity::N(3), RANK_INSERT)));
		assert_eq!(lookup("cut_out"), Some((Arity::N(4), RANK_INSERT)));
		assert_eq!(lookup("add"), Some((Arity::Var, RANK_INSERT)));
		assert!(lookup("explode").is_none());
	}

	#[test]
	fn t_rank_ordering() {
		// The fixed precedence: setup < acquisition < insertion <
		// manipulation < write < finish.
		let rank = |name: &str| lookup(name).expect("Missing command.").1;
		assert!(rank("padding") < rank("dev"));
		assert!(rank("speed") < rank("outdev"));
		assert!(rank("dev") < rank("add"));
		assert!(rank("add") < rank("rm"));
		assert!(rank("rm") < rank("commit"));
		assert!(rank("commit") < rank("end"));
	}
}
