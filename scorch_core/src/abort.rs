/*!
# Scorch: Kill Switch
*/

use std::sync::{
	Arc,
	atomic::{
		AtomicBool,
		Ordering::{
			Acquire,
			Release,
		},
	},
};



#[derive(Debug, Clone)]
/// # Kill Switch.
///
/// This is a short-circuit for long-running operations across multiple
/// threads. (Command execution is single-threaded, but the message watcher
/// isn't.)
///
/// The main program's CTRL-C intercept sets the value, allowing long loops
/// — burns, blanks, media checks, tree walks — to notice and tidy up
/// before dying. Library code can trip it too, e.g. on a fatal sense.
pub struct KillSwitch(Arc<AtomicBool>);

impl Default for KillSwitch {
	fn default() -> Self { Self(Arc::from(AtomicBool::new(false))) }
}

impl KillSwitch {
	#[must_use]
	/// # Dead?
	pub fn killed(&self) -> bool { self.0.load(Acquire) }

	/// # Kill It.
	pub fn kill(&self) { self.0.store(true, Release); }

	#[must_use]
	/// # Inner Clone.
	pub fn inner(&self) -> Arc<AtomicBool> { Arc::clone(&self.0) }
}
