/*!
# Scorch: GET CONFIGURATION and READ DISC STRUCTURE

Feature descriptors tell us what the drive *can* do; disc structures tell
us who actually manufactured the thing in the tray.
*/

use crate::{
	Command,
	CommandDir,
	Drive,
	ScorchError,
	ScsiBuffer,
	scsi::{
		get16,
		get32,
	},
};
use super::{
	LenWidth,
	TIMEOUT_DEFAULT,
};



/// # GET CONFIGURATION.
const MMC_GET_CONFIGURATION: [u8; 10] = [0x46, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # READ DISC STRUCTURE.
const MMC_READ_DISC_STRUCTURE: [u8; 12] = [0xAD, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];



/// # Physical Interface Name.
const fn phys_if_name(code: u32) -> &'static str {
	match code {
		1 => "SCSI Family",
		2 => "ATAPI",
		3 | 4 | 6 => "IEEE 1394 FireWire",
		7 => "Serial ATAPI",
		8 => "USB",
		_ => "",
	}
}



/// # Configuration.
impl Drive {
	/// # GET CONFIGURATION.
	///
	/// Learn the current profile and walk the feature descriptors,
	/// keeping the handful the rest of the model cares about: the profile
	/// list (00h), the physical interface (01h), incremental streaming
	/// and its link size (21h), BD format capabilities (23h), and the
	/// DVD±RW write capabilities byte (2Fh).
	///
	/// MMC-1 drives reject the opcode with (5,20,00); those get flagged
	/// for profile guessing once READ DISC INFORMATION has run.
	///
	/// ## Errors
	///
	/// This will return an error if the issue malfunctions; an MMC-1
	/// rejection is handled, not propagated.
	pub(crate) fn get_configuration(&mut self) -> Result<(), ScorchError> {
		self.current_profile = 0;
		self.profile_guessed = false;
		self.features = crate::drive::Features::default();

		// First pass by hand: the MMC-1 fallback needs the sense.
		let mut buf = ScsiBuffer::default();
		let mut cmd = get_configuration_cmd(8);
		self.issue(&mut cmd, &mut buf)?;
		if cmd.failed() {
			if cmd.sense().is_some_and(|s| s.is_invalid_opcode()) {
				// Will yield a non-zero profile only after READ DISC
				// INFORMATION has run.
				self.profile_guessed = true;
				return Ok(());
			}
			return Err(ScorchError::Scsi(cmd.sense().unwrap_or_default()));
		}

		let data = self.two_pass(LenWidth::U32, 8, get_configuration_cmd)?;
		if data.len() < 8 { return Ok(()); }

		self.current_profile = get16(&data, 6);

		// Walk the descriptors.
		let mut pos = 8_usize;
		while pos + 4 <= data.len() {
			let descr = &data[pos..];
			let descr_len = 4 + usize::from(descr[3]);
			if data.len() < pos + descr_len { break; }
			let feature_code = get16(descr, 0);
			let is_current = descr[2] & 1 != 0;

			match feature_code {
				0x0000 => {
					// Profile list: four bytes per profile.
					for prf in descr[4..descr_len].chunks_exact(4) {
						let code = get16(prf, 0);
						if code < 256 {
							self.features.all_profiles[usize::from(code as u8)] = true;
						}
					}
				},
				0x0001 if 8 <= descr_len => {
					let code = get32(descr, 4);
					self.features.phys_if_std = code;
					self.features.phys_if_name = phys_if_name(code);
				},
				0x0021 => {
					self.features.f21h = is_current;
					// Prefer a 16-sector link size when offered, else the
					// first one listed.
					if 8 <= descr_len {
						let n = usize::from(descr[7]);
						for i in 0..n {
							if descr_len <= 8 + i { break; }
							if i == 0 || descr[8 + i] == 16 {
								self.features.link_size = descr[8 + i];
							}
						}
					}
				},
				0x0023 if is_current => {
					self.features.f23h = descr[4..descr_len].to_vec();
				},
				0x002F if is_current && 5 <= descr_len => {
					self.features.f2fh_byte4 = descr[4];
				},
				_ => {},
			}
			pos += descr_len;
		}

		Ok(())
	}

	/// # Feature 23h Byte 4 (BD Certification Capabilities).
	pub(crate) fn feat23h_byte4(&self) -> u8 {
		self.features.f23h.first().copied().unwrap_or(0)
	}

	/// # BUFE: Buffer Under-run Free Recording Available?
	pub(crate) const fn has_bufe(&self) -> bool {
		self.features.f2fh_byte4 & 64 != 0
	}
}

/// # Disc Structure.
impl Drive {
	/// # READ DISC STRUCTURE.
	///
	/// Two-pass fetch of one structure format; the reply payload (minus
	/// the four-byte header) is returned when it meets `min_len`.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure or the
	/// reply is too short to matter.
	pub(crate) fn read_disc_structure(
		&mut self,
		media_type: u8,
		format: u8,
		min_len: usize,
	) -> Result<Vec<u8>, ScorchError> {
		let data = self.two_pass(LenWidth::U16, 4, |len| {
			let mut cmd = Command::new(&MMC_READ_DISC_STRUCTURE)
				.transfer(CommandDir::FromDrive, usize::from(len))
				.timeout(TIMEOUT_DEFAULT)
				.with_retry();
			cmd.set_byte(1, media_type);
			cmd.set_byte(7, format);
			cmd.put16(8, len);
			cmd
		})?;

		if data.len() < 4 + min_len {
			return Err(ScorchError::Scsi(crate::Sense::default()));
		}
		Ok(data[4..].to_vec())
	}

	/// # Media Manufacturer / Product Id.
	///
	/// Best-effort, profile-dependent:
	///
	/// * DVD-R family — format 0Eh, two (or three) six-packs of ADIP text.
	/// * DVD+ family — format 11h, eight bytes of manufacturer plus three
	///   of type plus a revision number.
	/// * BD family — format 00h Disc Information, six bytes of
	///   manufacturer and three of type.
	///
	/// Anything else (or any structural surprise) yields `None`.
	pub(crate) fn media_product_id(&mut self) -> Option<String> {
		match self.current_profile {
			0x0011 | 0x0013 | 0x0014 | 0x0015 => {
				// Two six-packs of ADIP text, tagged 3 and 4.
				let reply = self.read_disc_structure(0, 0x0E, 31).ok()?;
				if reply[16] != 3 || reply[24] != 4 { return None; }
				let mut code = Vec::with_capacity(12);
				code.extend_from_slice(&reply[17..23]);
				code.extend_from_slice(&reply[25..31]);
				Some(printable_word(&code))
			},
			0x001A | 0x001B | 0x002B => {
				let reply = self.read_disc_structure(0, 0x11, 29).ok()?;
				let manuf = printable_word(&reply[19..27]);
				let mtype = printable_word(&reply[27..30]);
				let rev = reply[28];
				Some(format!("{manuf}/{mtype}/{rev}"))
			},
			0x0040..=0x0043 => {
				let reply = self.read_disc_structure(1, 0x00, 112).ok()?;
				// DI unit 0: "DI" signature, manufacturer and type text
				// near the end of the block.
				if &reply[0..2] != b"DI" { return None; }
				let manuf = printable_word(&reply[100..106]);
				let mtype = printable_word(&reply[106..109]);
				Some(format!("{manuf}/{mtype}"))
			},
			_ => None,
		}
	}
}



/// # Printable Word.
///
/// Strip NULs and replace anything non-printable with underscores, the way
/// media codes are conventionally rendered.
fn printable_word(raw: &[u8]) -> String {
	raw.iter()
		.filter(|&&b| b != 0)
		.map(|&b|
			if (0x20..=0x7E).contains(&b) && b != b'\\' { b as char }
			else { '_' }
		)
		.collect()
}

/// # CDB Builder for GET CONFIGURATION.
fn get_configuration_cmd(len: u16) -> Command {
	let mut cmd = Command::new(&MMC_GET_CONFIGURATION)
		.transfer(CommandDir::FromDrive, usize::from(len))
		.timeout(TIMEOUT_DEFAULT)
		.with_retry();
	cmd.put16(7, len);
	cmd
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_phys_if_names() {
		assert_eq!(phys_if_name(1), "SCSI Family");
		assert_eq!(phys_if_name(2), "ATAPI");
		assert_eq!(phys_if_name(4), "IEEE 1394 FireWire");
		assert_eq!(phys_if_name(7), "Serial ATAPI");
		assert_eq!(phys_if_name(8), "USB");
		assert_eq!(phys_if_name(99), "");
	}

	#[test]
	fn t_printable_word() {
		assert_eq!(printable_word(b"CMC MAG\0"), "CMC MAG");
		assert_eq!(printable_word(&[0x01, b'A', 0x7F]), "_A_");
	}
}
