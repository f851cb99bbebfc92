/*!
# Scorch: Global Commands

The plumbing knobs: thresholds, channels, tokenization behavior, pattern
policies, and the run terminators.
*/

use crate::{
	ScorchError,
	Severity,
};
use super::{
	Shell,
	token::BackslashMode,
};
use dactyl::traits::BytesToUnsigned;
use std::path::PathBuf;



/// # On/Off Parser.
pub(crate) fn on_off(cmd: &str, value: &str) -> Result<bool, ScorchError> {
	match value {
		"on" => Ok(true),
		"off" => Ok(false),
		_ => Err(ScorchError::BadArgValue(cmd.to_owned(), value.to_owned())),
	}
}

impl Shell {
	/// # `-abort_on SEVERITY`
	pub(crate) fn cmd_abort_on(&mut self, severity: &str)
	-> Result<(), ScorchError> {
		self.abort_on = Severity::from_keyword(severity)?;
		Ok(())
	}

	/// # `-return_with SEVERITY CODE`
	///
	/// The exit code must be zero or within the reserved 32–63 window.
	pub(crate) fn cmd_return_with(&mut self, severity: &str, code: &str)
	-> Result<(), ScorchError> {
		let severity = Severity::from_keyword(severity)?;
		let code = u32::btou(code.as_bytes())
			.filter(|&c| c == 0 || (32..=63).contains(&c))
			.and_then(|c| i32::try_from(c).ok())
			.ok_or_else(|| ScorchError::BadArgValue(
				"-return_with".to_owned(),
				code.to_owned(),
			))?;
		self.return_with = (severity, code);
		Ok(())
	}

	/// # `-backslash_codes MODE`
	pub(crate) fn cmd_backslash_codes(&mut self, mode: &str)
	-> Result<(), ScorchError> {
		// The orthogonal output modes piggyback on the same command.
		match mode {
			"encode_output" => { self.encode_output = true; },
			"plain_output" => { self.encode_output = false; },
			other => { self.backslash_mode = BackslashMode::from_keyword(other)?; },
		}
		Ok(())
	}

	/// # `-list_delimiter WORD`
	pub(crate) fn cmd_list_delimiter(&mut self, word: &str)
	-> Result<(), ScorchError> {
		if word.is_empty() || word.contains(char::is_whitespace) {
			return Err(ScorchError::BadArgValue(
				"-list_delimiter".to_owned(),
				word.to_owned(),
			));
		}
		self.list_delimiter = word.to_owned();
		Ok(())
	}

	/// # `-pkt_output on|off`
	pub(crate) fn cmd_pkt_output(&mut self, value: &str)
	-> Result<(), ScorchError> {
		self.outpost.set_pkt_output(on_off("-pkt_output", value)?);
		Ok(())
	}

	/// # `-session_log PATH`
	pub(crate) fn cmd_session_log(&mut self, path: &str)
	-> Result<(), ScorchError> {
		self.outpost.set_session_log(
			if path.is_empty() { None } else { Some(PathBuf::from(path)) }
		);
		Ok(())
	}

	/// # `-errfile_log PATH`
	pub(crate) fn cmd_errfile_log(&mut self, path: &str)
	-> Result<(), ScorchError> {
		self.outpost.set_errfile_log(
			if path.is_empty() { None } else { Some(PathBuf::from(path)) }
		);
		Ok(())
	}

	/// # `-temp_mem_limit SIZE`
	pub(crate) fn cmd_temp_mem_limit(&mut self, size: &str)
	-> Result<(), ScorchError> {
		let bytes = crate::check::parse_size(size)
			.filter(|&b| 64 * 1024 <= b)
			.ok_or_else(|| ScorchError::BadArgValue(
				"-temp_mem_limit".to_owned(),
				size.to_owned(),
			))?;
		self.temp_mem_limit = usize::try_from(bytes).unwrap_or(usize::MAX);
		Ok(())
	}

	/// # `-add_plainly MODE`
	///
	/// 0 refuses non-command arguments, 1 swallows plain ones, 2 reports
	/// them first, 3 swallows anything unrecognized, dashes included.
	pub(crate) fn cmd_add_plainly(&mut self, mode: &str)
	-> Result<(), ScorchError> {
		let mode = match mode {
			"none" | "0" => 0,
			"unknown" | "1" => 1,
			"dashed" | "2" => 2,
			"any" | "3" => 3,
			_ => return Err(ScorchError::BadArgValue(
				"-add_plainly".to_owned(),
				mode.to_owned(),
			)),
		};
		self.add_plainly = mode;
		Ok(())
	}

	/// # `-iso_rr_pattern on|off`
	pub(crate) fn cmd_iso_rr_pattern(&mut self, value: &str)
	-> Result<(), ScorchError> {
		self.iso_rr_pattern = on_off("-iso_rr_pattern", value)?;
		Ok(())
	}

	/// # `-disk_pattern on|off`
	pub(crate) fn cmd_disk_pattern(&mut self, value: &str)
	-> Result<(), ScorchError> {
		self.disk_pattern = on_off("-disk_pattern", value)?;
		Ok(())
	}

	/// # `-version`
	pub(crate) fn cmd_version(&mut self) -> Result<(), ScorchError> {
		self.say(format!("scorch {}", env!("CARGO_PKG_VERSION")));
		self.say("ISO 9660 Rock Ridge mastering shell".to_owned());
		Ok(())
	}

	/// # `-help`
	pub(crate) fn cmd_help(&mut self) -> Result<(), ScorchError> {
		for line in [
			"Usage: scorch [settings] [-dev|-indev|-outdev ADDR] [actions]",
			"Commands run in the order given (or rank-sorted with -x).",
			"Drive:  -dev -indev -outdev -toc -blank -format -speed -eject",
			"        -check_media ... --",
			"Image:  -add PATHS -- , -rm PATHS -- , -mkdir , -find ... -- ,",
			"        -chmod/-chown/-chgrp MODE PATHS -- , -update , -compare",
			"Write:  -volid -padding -dummy -close -commit",
			"Global: -abort_on -return_with -pkt_output -backslash_codes",
			"        -list_delimiter -mark -help -version -end",
		] {
			self.say(line.to_owned());
		}
		Ok(())
	}

	/// # `-end`
	pub(crate) fn cmd_end(&mut self) -> Result<(), ScorchError> {
		if self.tree.changes_pending() {
			self.outpost.info(
				Severity::Note,
				"Pending image changes were not committed.",
			);
		}
		// Drop the drives politely.
		if let Some(drive) = self.indev.take() { drive.release(false)?; }
		if let Some(drive) = self.outdev.take() { drive.release(false)?; }
		self.ended = true;
		Ok(())
	}
}
