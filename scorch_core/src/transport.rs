/*!
# Scorch: Drive Transports

A drive is one of six things: a real MMC optical unit, one of four stdio
pseudo-drive flavors backed by a regular file, or the null drive, which
politely refuses everything. The closed set replaces the function-pointer
tables such designs usually accrete; dispatch is a plain `match`.
*/

use crate::{
	Command,
	LibcdioInstance,
	ScorchError,
	ScsiBuffer,
	SECTOR_DATA_SIZE,
};
use std::{
	fs::{
		File,
		OpenOptions,
	},
	os::unix::fs::FileExt,
	path::{
		Path,
		PathBuf,
	},
};



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Drive Role.
pub enum DriveRole {
	#[default]
	/// # The Null Drive.
	Null,

	/// # A Real MMC Optical Drive.
	Mmc,

	/// # Random-Access File, Read/Write.
	StdioRw,

	/// # File, Write-Only.
	StdioWo,

	/// # File, Read-Only.
	StdioRo,

	/// # File, Write-Only, Sequential.
	StdioWoSeq,
}

impl DriveRole {
	#[must_use]
	/// # Numeric Role Code.
	pub const fn code(self) -> u8 {
		match self {
			Self::Null => 0,
			Self::Mmc => 1,
			Self::StdioRw => 2,
			Self::StdioWo => 3,
			Self::StdioRo => 4,
			Self::StdioWoSeq => 5,
		}
	}

	#[must_use]
	/// # Can This Role Read?
	pub const fn readable(self) -> bool {
		matches!(self, Self::Mmc | Self::StdioRw | Self::StdioRo)
	}

	#[must_use]
	/// # Can This Role Write?
	pub const fn writeable(self) -> bool {
		matches!(self, Self::Mmc | Self::StdioRw | Self::StdioWo | Self::StdioWoSeq)
	}
}



#[derive(Debug)]
/// # A Stdio Pseudo-Drive.
///
/// A regular file pretending to be a burner. Reads and writes are addressed
/// in 2048-byte sectors like their optical counterparts.
pub(crate) struct StdioDrive {
	/// # File Path.
	path: PathBuf,

	/// # Open Handle.
	file: File,

	/// # Role (One of the Stdio Flavors).
	role: DriveRole,
}

impl StdioDrive {
	/// # Open a File as a Pseudo-Drive.
	///
	/// ## Errors
	///
	/// This will return an error if the file can't be opened with the
	/// access the role demands.
	pub(crate) fn open(path: &Path, role: DriveRole) -> Result<Self, ScorchError> {
		let mut opts = OpenOptions::new();
		match role {
			DriveRole::StdioRo => { opts.read(true); },
			DriveRole::StdioWo | DriveRole::StdioWoSeq => {
				opts.write(true).create(true);
			},
			DriveRole::StdioRw => {
				opts.read(true).write(true).create(true);
			},
			DriveRole::Mmc | DriveRole::Null =>
				return Err(ScorchError::Bug("Stdio open with a non-stdio role.")),
		}

		let file = opts.open(path)
			.map_err(|_| ScorchError::DeviceOpen(Some(path.to_string_lossy().into_owned())))?;

		Ok(Self {
			path: path.to_path_buf(),
			file,
			role,
		})
	}

	/// # File Path.
	pub(crate) fn path(&self) -> &Path { &self.path }

	/// # Current Size in Whole Sectors.
	pub(crate) fn sectors(&self) -> u32 {
		let bytes = self.file.metadata().map_or(0, |m| m.len());
		u32::try_from(bytes / SECTOR_DATA_SIZE as u64).unwrap_or(u32::MAX)
	}

	/// # Read Sectors at an LBA.
	///
	/// ## Errors
	///
	/// This will return an error if the role forbids reading or the read
	/// comes up short.
	pub(crate) fn read_at(&self, lba: u32, out: &mut [u8]) -> Result<(), ScorchError> {
		if ! self.role.readable() {
			return Err(ScorchError::Read(self.path.to_string_lossy().into_owned()));
		}
		self.file.read_exact_at(out, u64::from(lba) * SECTOR_DATA_SIZE as u64)
			.map_err(|_| ScorchError::Read(self.path.to_string_lossy().into_owned()))
	}

	/// # Write Sectors at an LBA.
	///
	/// ## Errors
	///
	/// This will return an error if the role forbids writing or the write
	/// fails.
	pub(crate) fn write_at(&self, lba: u32, data: &[u8]) -> Result<(), ScorchError> {
		if ! self.role.writeable() {
			return Err(ScorchError::Write(self.path.to_string_lossy().into_owned()));
		}
		self.file.write_all_at(data, u64::from(lba) * SECTOR_DATA_SIZE as u64)
			.map_err(|_| ScorchError::Write(self.path.to_string_lossy().into_owned()))
	}

	/// # Flush to Disk.
	///
	/// ## Errors
	///
	/// This will return an error if the sync fails.
	pub(crate) fn sync(&self) -> Result<(), ScorchError> {
		self.file.sync_all()
			.map_err(|_| ScorchError::Write(self.path.to_string_lossy().into_owned()))
	}

	/// # Truncate to Zero Sectors.
	///
	/// ## Errors
	///
	/// This will return an error if the role forbids writing or the
	/// truncation fails.
	pub(crate) fn truncate(&self) -> Result<(), ScorchError> {
		if ! self.role.writeable() {
			return Err(ScorchError::Write(self.path.to_string_lossy().into_owned()));
		}
		self.file.set_len(0)
			.map_err(|_| ScorchError::Write(self.path.to_string_lossy().into_owned()))
	}
}



#[derive(Debug)]
/// # The Transport Behind a Drive.
pub(crate) enum Transport {
	/// # A Real Optical Drive.
	Mmc(LibcdioInstance),

	/// # A File.
	Stdio(StdioDrive),

	/// # Nothing At All.
	Null,
}

impl Transport {
	/// # Issue a CDB.
	///
	/// Only the MMC transport talks SCSI; stdio drives are addressed
	/// through [`Transport::stdio`] instead, and the null drive refuses
	/// everything outright.
	///
	/// ## Errors
	///
	/// This will return an error for non-MMC transports, or if the issue
	/// itself malfunctions. Command-level failures land in the command's
	/// sense slot rather than here.
	pub(crate) fn issue(&self, cmd: &mut Command, buf: &mut ScsiBuffer)
	-> Result<(), ScorchError> {
		match self {
			Self::Mmc(cdio) => cdio.issue(cmd, buf),
			Self::Stdio(_) => Err(ScorchError::Bug("Stdio drives take no CDBs.")),
			Self::Null => Err(ScorchError::NullDrive),
		}
	}

	/// # The Stdio Side, If Any.
	pub(crate) const fn stdio(&self) -> Option<&StdioDrive> {
		if let Self::Stdio(s) = self { Some(s) } else { None }
	}

	/// # The MMC Side, If Any.
	pub(crate) const fn mmc(&self) -> Option<&LibcdioInstance> {
		if let Self::Mmc(m) = self { Some(m) } else { None }
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_role_codes() {
		for (role, code) in [
			(DriveRole::Null, 0_u8),
			(DriveRole::Mmc, 1),
			(DriveRole::StdioRw, 2),
			(DriveRole::StdioWo, 3),
			(DriveRole::StdioRo, 4),
			(DriveRole::StdioWoSeq, 5),
		] {
			assert_eq!(role.code(), code);
		}

		assert!(! DriveRole::Null.readable());
		assert!(! DriveRole::Null.writeable());
		assert!(! DriveRole::StdioWoSeq.readable());
		assert!(DriveRole::StdioWoSeq.writeable());
		assert!(DriveRole::Mmc.readable());
		assert!(DriveRole::Mmc.writeable());
	}

	#[test]
	fn t_stdio_rw() {
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let path = dir.path().join("pseudo.iso");

		let drive = StdioDrive::open(&path, DriveRole::StdioRw)
			.expect("Unable to open pseudo-drive.");
		assert_eq!(drive.sectors(), 0);

		// Write two sectors at LBA 3, read one back.
		let data = vec![0xAB_u8; SECTOR_DATA_SIZE * 2];
		drive.write_at(3, &data).expect("Pseudo-drive write failed.");
		assert_eq!(drive.sectors(), 5);

		let mut back = vec![0_u8; SECTOR_DATA_SIZE];
		drive.read_at(4, &mut back).expect("Pseudo-drive read failed.");
		assert!(back.iter().all(|&b| b == 0xAB), "Readback mismatch.");

		// Reads past the end come up short.
		assert!(drive.read_at(5, &mut back).is_err());

		// The null transport refuses.
		let mut cmd = crate::Command::new(&[0x00, 0, 0, 0, 0, 0]);
		let mut buf = crate::ScsiBuffer::default();
		assert!(matches!(
			Transport::Null.issue(&mut cmd, &mut buf),
			Err(ScorchError::NullDrive),
		));
	}
}
