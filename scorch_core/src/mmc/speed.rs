/*!
# Scorch: Speed and Buffer Affairs

CD drives take SET CD SPEED with its quaint 16-bit kB/s fields; everything
newer takes SET STREAMING with a proper performance descriptor. READ BUFFER
CAPACITY feeds the pacer; GET PERFORMANCE feeds the speed menu.
*/

use crate::{
	Command,
	CommandDir,
	Drive,
	ScorchError,
	ScsiBuffer,
	profile,
	scsi::get32,
};
use super::TIMEOUT_DEFAULT;



/// # SET CD SPEED.
const MMC_SET_SPEED: [u8; 12] = [0xBB, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # SET STREAMING.
const MMC_SET_STREAMING: [u8; 12] = [0xB6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # GET PERFORMANCE.
const MMC_GET_PERFORMANCE: [u8; 12] = [0xAC, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0];

/// # READ BUFFER CAPACITY.
const MMC_READ_BUFFER_CAPACITY: [u8; 10] = [0x5C, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// # 1× CD Speed (kB/s, Rounded Up).
pub(crate) const CD_1X_KBPS: u16 = 177;



/// # Speed Control.
impl Drive {
	/// # Set Read/Write Speed (kB/s).
	///
	/// Zero means "maximum", negative means "minimum". CD profiles go
	/// through SET CD SPEED; DVD and BD through SET STREAMING.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	pub fn set_speed(&mut self, read_kbps: i32, write_kbps: i32)
	-> Result<(), ScorchError> {
		if profile::profile_is_cd(self.current_profile) {
			self.set_cd_speed(read_kbps, write_kbps)
		}
		else {
			self.set_streaming(read_kbps, write_kbps)
		}
	}

	/// # SET CD SPEED.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	fn set_cd_speed(&mut self, read_kbps: i32, write_kbps: i32)
	-> Result<(), ScorchError> {
		let mut cmd = Command::new(&MMC_SET_SPEED)
			.timeout(TIMEOUT_DEFAULT)
			.with_retry();
		cmd.put16(2, cap_cd_speed(read_kbps));
		cmd.put16(4, cap_cd_speed(write_kbps));
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;

		if 0 < write_kbps {
			self.pacer.nominal_write_speed =
				u32::try_from(write_kbps).unwrap_or(0) * 1000;
		}
		Ok(())
	}

	/// # SET STREAMING.
	///
	/// A 28-byte performance descriptor: the end LBA of the medium plus a
	/// (speed, 1000 ms) pair for each direction.
	///
	/// ## Errors
	///
	/// This will return an error if the drive refuses.
	fn set_streaming(&mut self, read_kbps: i32, write_kbps: i32)
	-> Result<(), ScorchError> {
		let end_lba: u32 =
			if 0 < self.last_leadout {
				u32::try_from(self.last_leadout).unwrap_or(0)
			}
			else { self.read_capacity.max(1) };

		let (min_w, max_w) = self.write_speed_range();
		let read = resolve_speed(read_kbps, min_w, max_w);
		let write = resolve_speed(write_kbps, min_w, max_w);

		let mut buf = ScsiBuffer::default();
		{
			let data = buf.as_mut_slice();
			data[..28].fill(0);
			data[8..12].copy_from_slice(&end_lba.to_be_bytes());
			data[12..16].copy_from_slice(&read.to_be_bytes());
			data[16..20].copy_from_slice(&1000_u32.to_be_bytes());
			data[20..24].copy_from_slice(&write.to_be_bytes());
			data[24..28].copy_from_slice(&1000_u32.to_be_bytes());
		}
		buf.set_fill(28, 0);

		let mut cmd = Command::new(&MMC_SET_STREAMING)
			.transfer(CommandDir::ToDrive, 28)
			.timeout(TIMEOUT_DEFAULT)
			.with_retry();
		cmd.put16(9, 28);
		self.issue_ok(&mut cmd, &mut buf)?;

		self.pacer.nominal_write_speed = write * 1000;
		Ok(())
	}

	/// # Offered Write-Speed Window (kB/s).
	///
	/// From the cached GET PERFORMANCE descriptors, with a 1× DVD floor
	/// when the drive kept quiet.
	pub(crate) fn write_speed_range(&self) -> (u32, u32) {
		let mut min = u32::MAX;
		let mut max = 0;
		for &(_, write, _) in &self.speed_descriptors {
			if write < min { min = write; }
			if max < write { max = write; }
		}
		if max == 0 { (1385, 1385) } else { (min, max) }
	}
}

/// # Discovery.
impl Drive {
	/// # GET PERFORMANCE (Write Speed Descriptors, Type 03h).
	///
	/// Caches `(end_lba, write kB/s, read kB/s)` triples for the speed
	/// menu and seeds the pacer's nominal speed with the slowest offer.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn get_write_performance(&mut self) -> Result<(), ScorchError> {
		self.speed_descriptors.clear();

		// Probe with room for eight descriptors, then re-issue if the
		// drive has more to say.
		let max_descr = 8_u16;
		let alloc = 8 + 16 * usize::from(max_descr);
		let mut cmd = Command::new(&MMC_GET_PERFORMANCE)
			.transfer(CommandDir::FromDrive, alloc)
			.timeout(TIMEOUT_DEFAULT)
			.with_retry();
		cmd.put16(8, max_descr);
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		let data = buf.as_slice();

		let perf_len = get32(data, 0) as usize;
		let end = (perf_len + 4).min(alloc);
		if end < 8 + 16 { return Ok(()); }

		for descr in data[8..end].chunks_exact(16) {
			let end_lba = get32(descr, 4) as i32;
			let read = get32(descr, 8);
			let write = get32(descr, 12);
			self.speed_descriptors.push((end_lba, write, read));
		}

		let (min_w, _) = self.write_speed_range();
		if 0 < min_w && min_w != u32::MAX {
			self.pacer.nominal_write_speed = min_w * 1000;
		}
		Ok(())
	}

	/// # READ BUFFER CAPACITY.
	///
	/// Re-syncs the pessimistic estimate with reality.
	///
	/// ## Errors
	///
	/// This will return an error if the drive reports a failure.
	pub(crate) fn read_buffer_capacity(&mut self) -> Result<(), ScorchError> {
		let mut cmd = Command::new(&MMC_READ_BUFFER_CAPACITY)
			.transfer(CommandDir::FromDrive, 12)
			.timeout(TIMEOUT_DEFAULT)
			.with_retry();
		cmd.put16(7, 12);
		let mut buf = ScsiBuffer::default();
		self.issue_ok(&mut cmd, &mut buf)?;
		let data = buf.as_slice();

		let capacity = get32(data, 4);
		let available = get32(data, 8);
		self.pacer.refresh(capacity, available);
		Ok(())
	}
}



/// # Cap a CD Speed Into Its 16-Bit Field.
///
/// Zero (or anything huge) is "max" (0xFFFF); negative is the 1× floor.
const fn cap_cd_speed(kbps: i32) -> u16 {
	if kbps == 0 { 0xFFFF }
	else if kbps < 0 { CD_1X_KBPS }
	else if 0xFFFF <= kbps { 0xFFFF }
	else if (kbps as u16) < CD_1X_KBPS { CD_1X_KBPS }
	else { kbps as u16 }
}

/// # Resolve a Streaming Speed Wish Against the Offered Window.
const fn resolve_speed(kbps: i32, min: u32, max: u32) -> u32 {
	if kbps == 0 { max }
	else if kbps < 0 { min }
	else { kbps as u32 }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_cap_cd_speed() {
		assert_eq!(cap_cd_speed(0), 0xFFFF);      // Max.
		assert_eq!(cap_cd_speed(-1), CD_1X_KBPS); // Min.
		assert_eq!(cap_cd_speed(100), CD_1X_KBPS); // Below the floor.
		assert_eq!(cap_cd_speed(1412), 1412);     // 8x, as-is.
		assert_eq!(cap_cd_speed(0x10_0000), 0xFFFF);
	}

	#[test]
	fn t_speed_window() {
		let mut d = Drive::null();
		assert_eq!(d.write_speed_range(), (1385, 1385)); // Floor.

		d.speed_descriptors = vec![
			(2_295_104, 11_080, 11_080),
			(2_295_104, 5540, 11_080),
			(2_295_104, 22_160, 22_160),
		];
		assert_eq!(d.write_speed_range(), (5540, 22_160));
		assert_eq!(resolve_speed(0, 5540, 22_160), 22_160);
		assert_eq!(resolve_speed(-1, 5540, 22_160), 5540);
		assert_eq!(resolve_speed(11_080, 5540, 22_160), 11_080);
	}
}
