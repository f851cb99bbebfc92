/*!
# Scorch: `libcdio` Wrappers

Somewhat useful documentation:
<https://www.t10.org/ftp/t10/document.97/97-117r0.pdf>
*/

use crate::{
	Command,
	CommandDir,
	DriveVendorModel,
	ScorchError,
	ScsiBuffer,
	scsi::SENSE_LEN,
};
use dactyl::traits::SaturatingFrom;
use libcdio_sys::{
	cdio_hwinfo,
	cdio_mmc_direction_t_SCSI_MMC_DATA_NONE,
	cdio_mmc_direction_t_SCSI_MMC_DATA_READ,
	cdio_mmc_direction_t_SCSI_MMC_DATA_WRITE,
	driver_id_t_DRIVER_DEVICE, // The equivalent of "use whatever's best".
	driver_return_code_t_DRIVER_OP_SUCCESS,
	mmc_cdb_t,
};
use std::{
	ffi::{
		CStr,
		CString,
	},
	os::unix::ffi::OsStrExt,
	path::Path,
	sync::Once,
};



/// # Initialization Counter.
static LIBCDIO_INIT: Once = Once::new();



#[derive(Debug)]
/// # CDIO Instance.
///
/// All optical-drive communication runs through a single `libcdio` object.
/// Every interface is unsafe and awkward, so this struct exists to abstract
/// away the noise and handle cleanup.
pub(crate) struct LibcdioInstance {
	dev: Option<CString>,
	ptr: *mut libcdio_sys::CdIo_t,
}

impl Drop for LibcdioInstance {
	#[allow(unsafe_code, reason = "Required for FFI.")]
	fn drop(&mut self) {
		// Release the C memory!
		if ! self.ptr.is_null() {
			unsafe { libcdio_sys::cdio_destroy(self.as_mut_ptr()); }

			// Use the dev field so Rust won't complain about dead code. Haha.
			self.dev.take();
		}
	}
}

impl LibcdioInstance {
	#[allow(unsafe_code, reason = "Required for FFI.")]
	/// # New!
	///
	/// Initialize a new instance, optionally connecting to a specific device.
	///
	/// ## Errors
	///
	/// This will return an error if initialization fails, or if the provided
	/// device path is obviously wrong.
	pub(crate) fn new<P>(dev: Option<P>) -> Result<Self, ScorchError>
	where P: AsRef<Path> {
		// Make sure the library has been initialized.
		init();

		// Take a look at the desired device.
		let dev = {
			if let Some(dev) = dev {
				let dev = dev.as_ref();
				let original: String = dev.to_string_lossy().into_owned();
				if ! dev.exists() {
					return Err(ScorchError::Device(original));
				}
				let dev = CString::new(dev.as_os_str().as_bytes())
					.map_err(|_| ScorchError::Device(original))?;
				Some(dev)
			}
			else { None }
		};

		// Connect to it.
		let ptr = unsafe {
			libcdio_sys::cdio_open(
				dev.as_ref().map_or_else(std::ptr::null, |v| v.as_ptr()),
				driver_id_t_DRIVER_DEVICE,
			)
		};

		// NULL is bad.
		if ptr.is_null() {
			Err(ScorchError::DeviceOpen(dev.map(|v| v.to_string_lossy().into_owned())))
		}
		// Otherwise good!
		else { Ok(Self { dev, ptr }) }
	}
}

impl LibcdioInstance {
	/// # As Ptr.
	pub(crate) const fn as_ptr(&self) -> *const libcdio_sys::CdIo_t { self.ptr.cast() }

	/// # As Mut Ptr.
	pub(crate) const fn as_mut_ptr(&self) -> *mut libcdio_sys::CdIo_t { self.ptr }
}

impl LibcdioInstance {
	#[allow(unsafe_code, reason = "Required for FFI.")]
	/// # Issue One Command.
	///
	/// Ship the CDB to the drive and wait for the reply (or the timeout).
	/// The outcome — error flag and raw sense bytes — is recorded on the
	/// command itself; callers inspect that before deciding anything.
	///
	/// ## Errors
	///
	/// This will return an error if the transfer length exceeds the buffer,
	/// a bug no retry can fix. SCSI-level failures are *not* errors here;
	/// they land in the command's sense slot.
	pub(crate) fn issue(&self, cmd: &mut Command, buf: &mut ScsiBuffer)
	-> Result<(), ScorchError> {
		if buf.as_slice().len() < cmd.xfer() {
			return Err(ScorchError::Bug("Transfer length exceeds the buffer."));
		}

		// Repackage the CDB the way libcdio wants it.
		// SAFETY: zeroed is a valid value for a C byte-array struct.
		let mut cdb: mmc_cdb_t = unsafe { std::mem::zeroed() };
		{
			let raw = cmd.cdb();
			cdb.field[..raw.len()].copy_from_slice(raw);
		}

		let direction = match cmd.dir() {
			CommandDir::ToDrive => cdio_mmc_direction_t_SCSI_MMC_DATA_WRITE,
			CommandDir::FromDrive => cdio_mmc_direction_t_SCSI_MMC_DATA_READ,
			CommandDir::NoTransfer => cdio_mmc_direction_t_SCSI_MMC_DATA_NONE,
		};

		let res = unsafe {
			libcdio_sys::mmc_run_cmd(
				self.as_ptr(),
				cmd.timeout_ms(),
				&cdb,
				direction,
				u32::saturating_from(cmd.xfer()),
				buf.as_mut_slice().as_mut_ptr().cast(),
			)
		};

		if res == driver_return_code_t_DRIVER_OP_SUCCESS {
			cmd.set_outcome(false, &[]);
		}
		else {
			let mut sense = [0_u8; SENSE_LEN];
			self.last_sense(&mut sense);
			cmd.set_outcome(true, &sense);
		}

		Ok(())
	}

	#[allow(unsafe_code, reason = "Required for FFI.")]
	/// # Fetch the Last Sense Page.
	///
	/// Copy up to eighteen bytes of the most recent sense data into `out`.
	fn last_sense(&self, out: &mut [u8; SENSE_LEN]) {
		let mut ptr: *mut libcdio_sys::cdio_mmc_request_sense_t = std::ptr::null_mut();
		let len = unsafe {
			libcdio_sys::mmc_last_cmd_sense(self.as_ptr(), &mut ptr)
		};
		if 0 < len && ! ptr.is_null() {
			let len = usize::saturating_from(len).min(SENSE_LEN);
			// SAFETY: libcdio has promised us len valid bytes.
			let raw = unsafe {
				std::slice::from_raw_parts(ptr.cast::<u8>(), len)
			};
			out[..len].copy_from_slice(raw);
		}
		if ! ptr.is_null() {
			unsafe { libcdio_sys::cdio_free(ptr.cast()); }
		}
	}
}

impl LibcdioInstance {
	#[allow(unsafe_code, reason = "Required for FFI.")]
	/// # Drive Vendor/Model.
	///
	/// Fetch the drive vendor and/or model, if possible.
	pub(crate) fn drive_vendor_model(&self) -> Option<DriveVendorModel> {
		let mut raw = cdio_hwinfo {
			psz_vendor: [0; 9],
			psz_model: [0; 17],
			psz_revision: [0; 5],
		};

		// The return code is a bool, true for good, instead of the usual
		// 0 for good.
		if 1 == unsafe { libcdio_sys::cdio_get_hwinfo(self.as_ptr(), &mut raw) } {
			// Rather than deal with the uncertainty of pointers, let's recast
			// the signs since we have everything right here.
			let vendor_u8 = raw.psz_vendor.map(u8::saturating_from);
			let model_u8 = raw.psz_model.map(u8::saturating_from);

			// Vendor might be empty.
			let vendor =
				if vendor_u8[0] == 0 { "" }
				else {
					CStr::from_bytes_until_nul(vendor_u8.as_slice())
					.ok()
					.and_then(|v| v.to_str().ok())?
				};

			// But model is required.
			let model =
				if model_u8[0] == 0 { None }
				else {
					CStr::from_bytes_until_nul(model_u8.as_slice())
					.ok()
					.and_then(|v| v.to_str().ok())
				}?;

			DriveVendorModel::new(vendor, model).ok()
		}
		else { None }
	}
}



#[allow(unsafe_code, reason = "Required for FFI.")]
/// # Initialize `libcdio`.
///
/// This is only called once, but to be safe, it is also wrapped in a static
/// to make sure it can never re-initialize.
fn init() {
	LIBCDIO_INIT.call_once(|| unsafe { libcdio_sys::cdio_init(); });
}
