/*!
# Scorch: Media Profiles

The MMC profile code is the single most load-bearing number in the whole
model: almost every command — formatting, blanking, TOC strategy, track
addressing — branches on it.
*/

use crate::MediaStatus;



/// # Known Profiles.
///
/// (code, display name, CD family?, writeable?)
const PROFILES: &[(u16, &str, bool, bool)] = &[
	(0x0008, "CD-ROM", true, false),
	(0x0009, "CD-R", true, true),
	(0x000A, "CD-RW", true, true),
	(0x0010, "DVD-ROM", false, false),
	(0x0011, "DVD-R sequential recording", false, true),
	(0x0012, "DVD-RAM", false, true),
	(0x0013, "DVD-RW restricted overwrite", false, true),
	(0x0014, "DVD-RW sequential recording", false, true),
	(0x0015, "DVD-R/DL sequential recording", false, true),
	(0x001A, "DVD+RW", false, true),
	(0x001B, "DVD+R", false, true),
	(0x002B, "DVD+R/DL", false, true),
	(0x0040, "BD-ROM", false, false),
	(0x0041, "BD-R sequential recording", false, true),
	// 0x42 is treated read-only here; random-recording BD-R support in the
	// wild is too thin to trust.
	(0x0042, "BD-R random recording", false, false),
	(0x0043, "BD-RE", false, true),
	(0xFFFF, "stdio file", false, true),
];



/// # Profile Display Name.
///
/// Returns the empty string for profiles not in the table.
pub(crate) fn profile_name(code: u16) -> &'static str {
	PROFILES.iter()
		.find_map(|&(c, name, _, _)| if c == code { Some(name) } else { None })
		.unwrap_or("")
}

/// # Is This a Profile We Can Work With?
pub(crate) fn profile_is_supported(code: u16) -> bool {
	PROFILES.iter().any(|&(c, _, _, _)| c == code)
}

/// # CD Family?
pub(crate) fn profile_is_cd(code: u16) -> bool {
	PROFILES.iter()
		.any(|&(c, _, cd, _)| c == code && cd)
}

/// # Writeable at All?
pub(crate) fn profile_is_writeable(code: u16) -> bool {
	PROFILES.iter()
		.any(|&(c, _, _, w)| c == code && w)
}

/// # Overwriteable Media?
///
/// These profiles take random-access writes and report as blank whenever
/// they're loaded, whatever their background-format state claims.
pub(crate) const fn profile_is_overwriteable(code: u16) -> bool {
	matches!(code, 0x0012 | 0x0013 | 0x001A | 0x0043)
}

/// # DVD Family?
pub(crate) const fn profile_is_dvd(code: u16) -> bool {
	matches!(code, 0x0010..=0x002B)
}

/// # BD Family?
pub(crate) const fn profile_is_bd(code: u16) -> bool {
	matches!(code, 0x0040..=0x0043)
}

/// # Guess a Profile.
///
/// MMC-1 drives predate GET CONFIGURATION, so the profile has to be
/// inferred from what READ DISC INFORMATION was willing to share. The
/// guess is always a CD flavor; nothing older than MMC-2 burns DVDs.
pub(crate) const fn profile_guess(status: MediaStatus, erasable: bool) -> u16 {
	match status {
		MediaStatus::Blank | MediaStatus::Appendable =>
			if erasable { 0x000A } else { 0x0009 },
		MediaStatus::Full => 0x0008,
		_ => 0,
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_profile_table() {
		assert_eq!(profile_name(0x1A), "DVD+RW");
		assert_eq!(profile_name(0x41), "BD-R sequential recording");
		assert_eq!(profile_name(0x0777), "");

		assert!(profile_is_cd(0x08));
		assert!(profile_is_cd(0x0A));
		assert!(! profile_is_cd(0x10));

		assert!(profile_is_supported(0x43));
		assert!(! profile_is_supported(0x0777));

		// ROM profiles and (per policy) BD-R random don't take writes.
		for code in [0x08_u16, 0x10, 0x40, 0x42] {
			assert!(! profile_is_writeable(code), "Profile {code:#04x} should be read-only.");
		}
		for code in [0x09_u16, 0x11, 0x1A, 0x41, 0x43] {
			assert!(profile_is_writeable(code), "Profile {code:#04x} should be writeable.");
		}

		for code in [0x12_u16, 0x13, 0x1A, 0x43] {
			assert!(profile_is_overwriteable(code));
		}
		assert!(! profile_is_overwriteable(0x14));
	}

	#[test]
	fn t_profile_guess() {
		assert_eq!(profile_guess(MediaStatus::Blank, false), 0x09);
		assert_eq!(profile_guess(MediaStatus::Appendable, false), 0x09);
		assert_eq!(profile_guess(MediaStatus::Blank, true), 0x0A);
		assert_eq!(profile_guess(MediaStatus::Full, false), 0x08);
		assert_eq!(profile_guess(MediaStatus::Unready, true), 0);
	}
}
