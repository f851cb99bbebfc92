/*!
# Scorch
*/

#![forbid(unsafe_code)]

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
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
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

use argyle::Argument;
use dactyl::NiceU64;
use fyi_msg::Msg;
use scorch_core::{
	KillSwitch,
	Outpost,
	ScorchError,
	Shell,
};



/// # Main.
///
/// This lets us bubble up startup errors so they can be pretty-printed.
fn main() {
	match _main() {
		Ok(code) => std::process::exit(code),
		Err(ScorchError::PrintHelp) => {
			println!("{}", ScorchError::PrintHelp);
		},
		Err(ScorchError::PrintVersion) => {
			println!("{}", ScorchError::PrintVersion);
		},
		Err(e) => {
			Msg::from(e).eprint();
			std::process::exit(1);
		},
	}
}

#[inline]
/// # Actual Main.
///
/// Every argument that isn't ours is a command for the shell; it runs
/// them in order (or rank-sorted if `-x` is among them) and picks the
/// exit code from the worst problem on record.
fn _main() -> Result<i32, ScorchError> {
	let args = argyle::args()
		.with_keywords(include!(concat!(env!("OUT_DIR"), "/argyle.rs")));

	let mut commands: Vec<String> = Vec::new();
	for arg in args {
		match arg {
			Argument::Key("-h" | "--help") => return Err(ScorchError::PrintHelp),
			Argument::Key("-V" | "--version") => return Err(ScorchError::PrintVersion),
			Argument::Other(s) => { commands.push(s); },
			Argument::InvalidUtf8(s) => {
				return Err(ScorchError::CliArg(s.to_string_lossy().into_owned()));
			},
			_ => {},
		}
	}

	if commands.is_empty() { return Err(ScorchError::PrintHelp); }

	// Wire up CTRL-C before anything long-running starts.
	let outpost = Outpost::default();
	let killed = KillSwitch::default();
	sigint(&killed);

	let mut shell = Shell::new(outpost, killed);
	shell.execute_args(&commands);

	summarize(&shell);
	Ok(shell.exit_code())
}

/// # Hook Up CTRL+C.
fn sigint(killed: &KillSwitch) {
	let killed = killed.inner();
	let _res = ctrlc::set_handler(move || {
		use std::sync::atomic::Ordering::SeqCst;
		killed.store(true, SeqCst);
	});
}

/// # Closing Status Line.
fn summarize(shell: &Shell) {
	let status = shell.outpost().eternal_status();
	let code = shell.exit_code();
	if code == 0 {
		Msg::success("Run finished.").eprint();
	}
	else {
		Msg::warning(format!(
			"Run finished with problems (worst: {status}, exit {}).",
			NiceU64::from(u64::try_from(code).unwrap_or_default()),
		)).eprint();
	}
}
