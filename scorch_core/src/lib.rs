/*!
# Scorch: Library
*/

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
	unsafe_code,
)]

#![warn(
	clippy::complexity,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::style,

	clippy::allow_attributes,
	clippy::clone_on_ref_ptr,
	clippy::create_dir,
	clippy::filetype_is_file,
	clippy::format_push_string,
	clippy::get_unwrap,
	clippy::impl_trait_in_params,
	clippy::lossy_float_literal,
	clippy::missing_assert_message,
	clippy::missing_docs_in_private_items,
	clippy::needless_raw_strings,
	clippy::panic_in_result_fn,
	clippy::pub_without_shorthand,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::semicolon_inside_block,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::todo,
	clippy::undocumented_unsafe_blocks,
	clippy::unneeded_field_pattern,
	clippy::unseparated_literal_suffix,
	clippy::unwrap_in_result,

	macro_use_extern_crate,
	missing_copy_implementations,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![expect(clippy::redundant_pub_crate, reason = "Unresolvable.")]

mod abort;
mod check;
mod cdio;
mod drive;
mod ecma130;
mod error;
mod findjob;
mod mmc;
mod msg;
mod pacing;
mod pattern;
mod profile;
mod scsi;
mod sector;
mod shell;
mod spot;
mod transport;
mod tree;

pub use abort::KillSwitch;
pub(crate) use cdio::LibcdioInstance;
pub use check::{
	CheckMediaJob,
	CheckOutcome,
	CheckReportMode,
	CheckRetry,
	CheckUse,
	CheckWhat,
};
pub use drive::{
	Drive,
	DriveVendorModel,
	MediaStatus,
	TocEntry,
};
pub use error::ScorchError;
pub use findjob::{
	FindAction,
	FindJob,
	FindStats,
	MatchResult,
};
pub use mmc::{
	BlankMode,
	format::{
		FormatOpts,
		FormatOutcome,
	},
};
pub use msg::{
	Outpost,
	Severity,
};
pub(crate) use pacing::Pacer;
pub use pattern::PatternPile;
pub(crate) use scsi::{
	Command,
	CommandDir,
	ScsiBuffer,
};
pub use scsi::Sense;
pub use sector::{
	Burner,
	Isrc,
	SectorMode,
	Track,
	TrackMode,
	TrackSource,
	WriteSettings,
	sector_identify,
};
pub use shell::{
	Shell,
	token::BackslashMode,
};
pub use spot::{
	ReadQuality,
	SectorBitmap,
	SpotItem,
	SpotList,
};
pub use transport::DriveRole;
pub use tree::{
	IsoTree,
	MemTree,
	Node,
	NodeType,
	SessionSummary,
};



// Sector Geometry
// ---------------

/// # Payload Bytes Per Data Sector.
pub const SECTOR_DATA_SIZE: usize = 2048;

/// # Bytes Per Raw CD Sector.
pub const SECTOR_RAW_SIZE: usize = 2352;

/// # Bytes Per Subchannel Block.
pub const SUBCHANNEL_SIZE: usize = 96;

/// # Number of Lead-In Sectors.
///
/// All CDs have a 2-second region at the start before any data. Different
/// contexts include or exclude this amount, so it's good to keep it handy.
pub const CD_LEADIN: u32 = 150;

/// # CD Frames Per Second.
pub const CD_FPS: u32 = 75;



// Transfer Buffers
// ---------------

/// # Command Buffer Payload.
///
/// The largest transfer any single command moves: sixteen data sectors, or
/// the equivalent in raw/TOC/feature replies.
pub(crate) const BUFFER_PAYLOAD: usize = 32 * 1024;

/// # Command Buffer Slack.
///
/// Raw-mode sectors overshoot the 2048-byte grid; the slack absorbs the
/// overrun so conversions never need a second allocation.
pub(crate) const BUFFER_SLACK: usize = 4 * 1024;

/// # Total Command Buffer Size.
pub(crate) const BUFFER_SIZE: usize = BUFFER_PAYLOAD + BUFFER_SLACK;
