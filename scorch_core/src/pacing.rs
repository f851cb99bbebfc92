/*!
# Scorch: Write Pacing

Drives lie about their buffer, but only in one direction: actual free space
can exceed the pessimistic estimate, never undercut it. So the estimate is
decremented on every write and only re-synced from READ BUFFER CAPACITY
when a wait actually becomes necessary. Cheap, and safe.
*/



/// # Default Minimum Poll Sleep (µs).
const WFB_MIN_USEC: u64 = 10_000;

/// # Default Maximum Poll Sleep (µs).
const WFB_MAX_USEC: u64 = 100_000;

/// # Default Overall Wait Timeout (seconds).
const WFB_TIMEOUT_SEC: u64 = 120;

/// # Default Fill Floor Percentage.
const WFB_MIN_PERCENT: u8 = 65;

/// # Default Fill Ceiling Percentage.
const WFB_MAX_PERCENT: u8 = 95;



#[derive(Debug, Clone, Copy)]
/// # The Pacer.
///
/// Pessimistic buffer accounting for one drive, plus the counters the
/// post-run report wants.
pub(crate) struct Pacer {
	/// # Waiting Enabled?
	pub(crate) enabled: bool,

	/// # Pessimistic Free Bytes.
	pub(crate) pessimistic_buffer_free: u32,

	/// # Estimate Touched Since the Last Readback?
	pub(crate) pbf_altered: bool,

	/// # Total Buffer Capacity (Bytes).
	pub(crate) buffer_capacity: u32,

	/// # Last Reported Available Bytes.
	pub(crate) buffer_available: u32,

	/// # Nominal Write Speed (Bytes/Second).
	pub(crate) nominal_write_speed: u32,

	/// # Minimum Poll Sleep (µs).
	pub(crate) wfb_min_usec: u64,

	/// # Maximum Poll Sleep (µs).
	pub(crate) wfb_max_usec: u64,

	/// # Overall Wait Timeout (Seconds).
	pub(crate) wfb_timeout_sec: u64,

	/// # Fill Floor Percentage.
	pub(crate) min_percent: u8,

	/// # Fill Ceiling Percentage.
	pub(crate) max_percent: u8,

	/// # Writes Throttled by the Estimate Alone.
	pub(crate) pessimistic_writes: u64,

	/// # Writes That Actually Waited.
	pub(crate) waited_writes: u64,

	/// # Individual Poll Rounds.
	pub(crate) waited_tries: u64,

	/// # Total Microseconds Slept.
	pub(crate) waited_usec: u64,

	/// # Bytes Transmitted This Session.
	pub(crate) buffered_bytes: u64,
}

impl Default for Pacer {
	fn default() -> Self {
		Self {
			enabled: false,
			pessimistic_buffer_free: 0,
			pbf_altered: false,
			buffer_capacity: 0,
			buffer_available: 0,
			nominal_write_speed: 1385 * 1024, // 1x DVD, a safe floor.
			wfb_min_usec: WFB_MIN_USEC,
			wfb_max_usec: WFB_MAX_USEC,
			wfb_timeout_sec: WFB_TIMEOUT_SEC,
			min_percent: WFB_MIN_PERCENT,
			max_percent: WFB_MAX_PERCENT,
			pessimistic_writes: 0,
			waited_writes: 0,
			waited_tries: 0,
			waited_usec: 0,
			buffered_bytes: 0,
		}
	}
}

impl Pacer {
	/// # Sync From READ BUFFER CAPACITY.
	pub(crate) fn refresh(&mut self, capacity: u32, available: u32) {
		self.buffer_capacity = capacity;
		self.buffer_available = available;
		self.pessimistic_buffer_free = available;
		self.pbf_altered = false;
	}

	/// # Account For a Completed Write.
	pub(crate) fn note_write(&mut self, bytes: u32) {
		self.pessimistic_buffer_free =
			self.pessimistic_buffer_free.saturating_sub(bytes);
		self.pbf_altered = true;
		self.buffered_bytes += u64::from(bytes);
	}

	/// # Free Bytes Needed Before a Write May Proceed Unquestioned.
	const fn slack(&self, percent: u8) -> u64 {
		self.buffer_capacity as u64 * (100 - percent as u64) / 100
	}

	/// # Is a Wait Even on the Table?
	///
	/// Nothing is worth checking until the amount transmitted so far could
	/// plausibly have filled the buffer past the ceiling.
	pub(crate) const fn might_wait(&self, buffered_bytes: u64, next_bytes: u64) -> bool {
		self.enabled &&
		0 < self.buffer_capacity &&
		self.buffer_capacity as u64 * self.max_percent as u64 / 100
			< buffered_bytes + next_bytes
	}

	/// # Does the Pessimistic Estimate Already Clear the Ceiling?
	pub(crate) const fn roomy(&self, next_bytes: u64) -> bool {
		self.slack(self.max_percent) + next_bytes
			<= self.pessimistic_buffer_free as u64
	}

	/// # Has the Floor Target Been Reached?
	pub(crate) const fn target_met(&self, next_bytes: u64) -> bool {
		self.slack(self.min_percent) + next_bytes
			<= self.pessimistic_buffer_free as u64
	}

	/// # How Long to Sleep Before the Next Poll (µs).
	///
	/// Scaled to how long the drive should take to drain the missing bytes
	/// at its nominal speed, clamped into the configured window.
	pub(crate) fn sleep_usec(&self, next_bytes: u64) -> u64 {
		let want = self.slack(self.min_percent) + next_bytes;
		let need = want.saturating_sub(u64::from(self.pessimistic_buffer_free));
		let speed = u64::from(self.nominal_write_speed.max(1));
		(need * 1_000_000 / speed).clamp(self.wfb_min_usec, self.wfb_max_usec)
	}
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Pacer With a 4 MiB Buffer.
	fn pacer() -> Pacer {
		let mut p = Pacer { enabled: true, ..Pacer::default() };
		p.refresh(4 << 20, 4 << 20);
		p
	}

	#[test]
	fn t_note_write() {
		let mut p = pacer();
		assert!(! p.pbf_altered);

		// Each write decrements the estimate by exactly its size.
		p.note_write(64 << 10);
		assert_eq!(p.pessimistic_buffer_free, (4 << 20) - (64 << 10));
		assert!(p.pbf_altered);

		p.note_write(64 << 10);
		assert_eq!(p.pessimistic_buffer_free, (4 << 20) - (128 << 10));

		// A refresh resets both estimate and flag.
		p.refresh(4 << 20, 3 << 20);
		assert_eq!(p.pessimistic_buffer_free, 3 << 20);
		assert!(! p.pbf_altered);
	}

	#[test]
	fn t_thresholds() {
		let mut p = pacer();

		// Nothing transmitted yet: no reason to wait.
		assert!(! p.might_wait(0, 32 << 10));

		// Plenty transmitted: waiting is on the table...
		assert!(p.might_wait(8 << 20, 32 << 10));
		// ...but the estimate still clears the ceiling.
		assert!(p.roomy(32 << 10));

		// Drain the estimate below the 5% ceiling slack and it stops
		// being roomy.
		p.pessimistic_buffer_free = (4 << 20) / 100; // 1%.
		assert!(! p.roomy(32 << 10));
		assert!(! p.target_met(32 << 10));

		// Disabled pacers never wait.
		p.enabled = false;
		assert!(! p.might_wait(8 << 20, 32 << 10));
	}

	#[test]
	fn t_sleep_clamp() {
		let mut p = pacer();
		p.nominal_write_speed = 1 << 20; // 1 MiB/s.

		// Broke: the sleep lands on the max clamp.
		p.pessimistic_buffer_free = 0;
		assert_eq!(p.sleep_usec(32 << 10), p.wfb_max_usec);

		// Nearly there: the sleep lands on the min clamp.
		p.pessimistic_buffer_free = (4 << 20) * 35 / 100 + (31 << 10);
		assert_eq!(p.sleep_usec(32 << 10), p.wfb_min_usec);
	}
}
