/*!
# Scorch: Pattern Matching and Expansion

Bourne-style wildcards over two namespaces — the image tree and the local
disk — with the same machinery behind both. A pattern splits on `/` into
components, each matched independently: literals compare exactly, `*` as a
whole component matches anything, and everything else compiles down to an
anchored regex.
*/

use crate::ScorchError;
use regex::Regex;



/// # Default Expansion Memory Budget.
///
/// The accumulated byte length of matched paths may not exceed this
/// (unless reconfigured); runaway wildcards should fail, not swap.
pub const DEFAULT_MEM_LIMIT: usize = 16 * 1024 * 1024;



/// # A Namespace to Match Against.
///
/// The same expansion drives the image tree and the local filesystem;
/// this is the narrow waist between them.
pub(crate) trait Namespace {
	/// # Child Names of a Directory.
	fn children(&self, dir: &str) -> Vec<String>;

	/// # Does a Path Exist?
	fn exists(&self, path: &str) -> bool;

	/// # Is a Path a Directory?
	fn is_dir(&self, path: &str) -> bool;
}

/// # The Local Filesystem.
pub(crate) struct DiskSpace;

impl Namespace for DiskSpace {
	fn children(&self, dir: &str) -> Vec<String> {
		let dir = if dir.is_empty() { "/" } else { dir };
		let mut out: Vec<String> = std::fs::read_dir(dir)
			.map(|rd| rd.filter_map(|e|
				e.ok().map(|e| e.file_name().to_string_lossy().into_owned())
			).collect())
			.unwrap_or_default();
		out.sort();
		out
	}

	fn exists(&self, path: &str) -> bool {
		let path = if path.is_empty() { "/" } else { path };
		std::path::Path::new(path).symlink_metadata().is_ok()
	}

	fn is_dir(&self, path: &str) -> bool {
		let path = if path.is_empty() { "/" } else { path };
		std::path::Path::new(path).is_dir()
	}
}



/// # Does a String Carry Wildcards?
pub(crate) fn is_wildcard(pattern: &str) -> bool {
	pattern.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
}

/// # Bourne Glob to Anchored Regex Source.
///
/// `*` becomes `.*`, `?` becomes `.`, bracket classes pass through, and
/// everything else is literal-escaped.
pub(crate) fn glob_to_regex(glob: &str) -> String {
	let mut out = String::with_capacity(glob.len() + 8);
	out.push('^');
	let bytes = glob.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		match bytes[i] {
			b'*' => out.push_str(".*"),
			b'?' => out.push('.'),
			b'[' => {
				// Pass a bracket class through verbatim (the first `]`
				// after an optional negation is literal).
				let mut j = i + 1;
				if j < bytes.len() && (bytes[j] == b'!' || bytes[j] == b'^') { j += 1; }
				if j < bytes.len() && bytes[j] == b']' { j += 1; }
				while j < bytes.len() && bytes[j] != b']' { j += 1; }
				if j < bytes.len() {
					out.push('[');
					if bytes[i + 1] == b'!' {
						out.push('^');
						out.push_str(&glob[i + 2..j]);
					}
					else { out.push_str(&glob[i + 1..j]); }
					out.push(']');
					i = j;
				}
				else { out.push_str("\\["); }
			},
			_ => {
				let c = glob[i..].chars().next().unwrap_or('\u{FFFD}');
				if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | ' ') {
					out.push(c);
				}
				else {
					out.push('\\');
					out.push(c);
				}
				i += c.len_utf8();
				continue;
			},
		}
		i += 1;
	}
	out.push('$');
	out
}

/// # Compile a Glob.
pub(crate) fn compile_glob(glob: &str) -> Result<Regex, ScorchError> {
	Regex::new(&glob_to_regex(glob))
		.map_err(|_| ScorchError::Pattern(glob.to_owned()))
}



#[derive(Debug)]
/// # One Path Component Matcher.
enum Comp {
	/// # Exact Name.
	Lit(String),

	/// # Anything At All.
	Any,

	/// # Wildcard Component.
	Rx(Regex),
}

impl Comp {
	/// # Does a Name Match?
	fn matches(&self, name: &str) -> bool {
		match self {
			Self::Lit(lit) => lit == name,
			Self::Any => true,
			Self::Rx(rx) => rx.is_match(name),
		}
	}
}



#[derive(Debug)]
/// # A Structured (Component-Wise) Pattern.
pub(crate) struct StructuredPattern {
	/// # The Components, Root Downward.
	comps: Vec<Comp>,

	/// # Any Wildcards Anywhere?
	wildcards: bool,
}

impl StructuredPattern {
	/// # Parse, Resolving Against a Working Directory.
	///
	/// Relative patterns get the working directory's components stacked
	/// underneath; `..` pops and `.` evaporates. Popping an empty stack
	/// is the underflow the caller retries (without the wd) before giving
	/// up for real.
	///
	/// ## Errors
	///
	/// This will return an error on underflow or an uncompilable
	/// component.
	pub(crate) fn parse(pattern: &str, wd: Option<&str>)
	-> Result<Self, ScorchError> {
		let mut comps: Vec<Comp> = Vec::new();
		let absolute = pattern.starts_with('/');

		if ! absolute {
			if let Some(wd) = wd {
				for part in wd.split('/').filter(|p| ! p.is_empty()) {
					comps.push(Comp::Lit(part.to_owned()));
				}
			}
		}

		let mut wildcards = false;
		for part in pattern.split('/').filter(|p| ! p.is_empty()) {
			match part {
				"." => {},
				".." => {
					if comps.pop().is_none() {
						return Err(ScorchError::PatternUnderflow(pattern.to_owned()));
					}
				},
				"*" => {
					wildcards = true;
					comps.push(Comp::Any);
				},
				p if is_wildcard(p) => {
					wildcards = true;
					comps.push(Comp::Rx(compile_glob(p)?));
				},
				p => comps.push(Comp::Lit(p.to_owned())),
			}
		}

		Ok(Self { comps, wildcards })
	}

	/// # Any Wildcards?
	pub(crate) const fn has_wildcards(&self) -> bool { self.wildcards }

	/// # The Literal Path, If Fully Constant.
	pub(crate) fn as_constant(&self) -> Option<String> {
		if self.wildcards { return None; }
		let mut out = String::new();
		for comp in &self.comps {
			let Comp::Lit(lit) = comp else { return None; };
			out.push('/');
			out.push_str(lit);
		}
		if out.is_empty() { out.push('/'); }
		Some(out)
	}

	/// # Expand Within a Namespace.
	///
	/// Walks component by component, depth first, collecting every
	/// existing path the pattern covers.
	pub(crate) fn expand(
		&self,
		ns: &dyn Namespace,
		pile: &mut PatternPile,
	) -> Result<(), ScorchError> {
		self.descend(ns, 0, String::new(), pile)
	}

	/// # Recursive Walker.
	fn descend(
		&self,
		ns: &dyn Namespace,
		depth: usize,
		base: String,
		pile: &mut PatternPile,
	) -> Result<(), ScorchError> {
		let Some(comp) = self.comps.get(depth) else {
			let path = if base.is_empty() { "/".to_owned() } else { base };
			if ns.exists(&path) { pile.push(path)?; }
			return Ok(());
		};

		// A literal component doesn't need a directory listing.
		if let Comp::Lit(lit) = comp {
			let next = format!("{base}/{lit}");
			if ns.exists(&next) {
				return self.descend(ns, depth + 1, next, pile);
			}
			return Ok(());
		}

		let dir = if base.is_empty() { "/".to_owned() } else { base.clone() };
		if ! ns.is_dir(&dir) { return Ok(()); }
		for name in ns.children(&dir) {
			if comp.matches(&name) {
				self.descend(ns, depth + 1, format!("{base}/{name}"), pile)?;
			}
		}
		Ok(())
	}
}



#[derive(Debug)]
/// # An Expansion Result Pile.
///
/// Collects matched paths under a byte budget so a careless `-rm /*` on a
/// forest of a namespace fails loudly instead of eating the machine.
pub struct PatternPile {
	/// # Matched Paths.
	paths: Vec<String>,

	/// # Bytes Accumulated.
	used: usize,

	/// # Byte Budget.
	limit: usize,
}

impl Default for PatternPile {
	fn default() -> Self { Self::new(DEFAULT_MEM_LIMIT) }
}

impl PatternPile {
	#[must_use]
	/// # New With a Budget.
	pub const fn new(limit: usize) -> Self {
		Self {
			paths: Vec::new(),
			used: 0,
			limit,
		}
	}

	/// # Add a Path.
	///
	/// ## Errors
	///
	/// This will return an error if the budget would be exceeded.
	pub(crate) fn push(&mut self, path: String) -> Result<(), ScorchError> {
		self.used += path.len() + std::mem::size_of::<String>();
		if self.limit < self.used { return Err(ScorchError::MemLimit); }
		self.paths.push(path);
		Ok(())
	}

	#[must_use]
	/// # The Paths.
	pub fn paths(&self) -> &[String] { &self.paths }

	#[must_use]
	/// # Count.
	pub fn len(&self) -> usize { self.paths.len() }

	#[must_use]
	/// # Empty?
	pub fn is_empty(&self) -> bool { self.paths.is_empty() }

	/// # Take the Paths.
	pub fn into_paths(self) -> Vec<String> { self.paths }
}



/// # Expand One Pattern Into a Pile.
///
/// The full contract:
///
/// * Constant patterns short-circuit to an existence check; missing
///   constants pass through literally when `tolerant` (the caller will
///   complain contextually), otherwise they miss.
/// * A relative pattern resolves against `wd`; if `..` underflows, the
///   expansion retries without the wd, and a second underflow is an
///   error.
/// * An empty expansion of a wildcard pattern is an error unless
///   `tolerant`.
///
/// Returns the number of paths contributed.
///
/// ## Errors
///
/// This will return an error for underflow, budget overrun, or an empty
/// intolerant wildcard expansion.
pub(crate) fn expand_pattern(
	ns: &dyn Namespace,
	wd: &str,
	pattern: &str,
	tolerant: bool,
	pile: &mut PatternPile,
) -> Result<usize, ScorchError> {
	let before = pile.len();

	let parsed = match StructuredPattern::parse(pattern, Some(wd)) {
		Ok(parsed) => parsed,
		// Underflow against the wd: try again bare.
		Err(ScorchError::PatternUnderflow(_)) =>
			StructuredPattern::parse(pattern, None)?,
		Err(err) => return Err(err),
	};

	if let Some(path) = parsed.as_constant() {
		if ns.exists(&path) { pile.push(path)?; }
		else if tolerant { pile.push(path)?; }
		else { return Err(ScorchError::NoMatch(pattern.to_owned())); }
		return Ok(pile.len() - before);
	}

	parsed.expand(ns, pile)?;
	let added = pile.len() - before;
	if added == 0 && ! tolerant {
		return Err(ScorchError::NoMatch(pattern.to_owned()));
	}
	Ok(added)
}



#[cfg(test)]
mod test {
	use super::*;
	use ahash::HashMapExt;

	/// # A Toy Namespace.
	struct ToySpace {
		/// # Directory Listings.
		dirs: ahash::HashMap<String, Vec<String>>,
	}

	impl ToySpace {
		/// # The Usual Suspects.
		fn new() -> Self {
			let mut dirs = ahash::HashMap::new();
			dirs.insert("/".to_owned(), vec![
				"a".to_owned(), "c".to_owned(), "readme.txt".to_owned(),
			]);
			dirs.insert("/a".to_owned(), vec![
				"b".to_owned(), "notes.txt".to_owned(), "src".to_owned(),
			]);
			dirs.insert("/a/b".to_owned(), vec!["deep.txt".to_owned()]);
			dirs.insert("/a/src".to_owned(), Vec::new());
			dirs.insert("/c".to_owned(), Vec::new());
			Self { dirs }
		}
	}

	impl Namespace for ToySpace {
		fn children(&self, dir: &str) -> Vec<String> {
			self.dirs.get(dir).cloned().unwrap_or_default()
		}

		fn exists(&self, path: &str) -> bool {
			if self.dirs.contains_key(path) { return true; }
			let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
			let dir = if dir.is_empty() { "/" } else { dir };
			self.dirs.get(dir).is_some_and(|c| c.iter().any(|n| n == name))
		}

		fn is_dir(&self, path: &str) -> bool { self.dirs.contains_key(path) }
	}

	#[test]
	fn t_glob_to_regex() {
		assert_eq!(glob_to_regex("*.txt"), "^.*\\.txt$");
		assert_eq!(glob_to_regex("a?c"), "^a.c$");
		assert_eq!(glob_to_regex("x[0-9]y"), "^x[0-9]y$");
		assert_eq!(glob_to_regex("x[!ab]"), "^x[^ab]$");
		assert_eq!(glob_to_regex("a+b"), "^a\\+b$");

		let rx = compile_glob("*.txt").expect("Glob refused to compile.");
		assert!(rx.is_match("notes.txt"));
		assert!(! rx.is_match("notes.txt.bak"));
		assert!(! rx.is_match("txt"));
	}

	#[test]
	fn t_constant_short_circuit() {
		let ns = ToySpace::new();
		let mut pile = PatternPile::default();

		// Existing constant: exactly itself.
		let n = expand_pattern(&ns, "/", "/a/notes.txt", false, &mut pile)
			.expect("Constant expansion failed.");
		assert_eq!(n, 1);
		assert_eq!(pile.paths(), &["/a/notes.txt".to_owned()]);

		// Missing constant, intolerant: error.
		assert!(matches!(
			expand_pattern(&ns, "/", "/nope", false, &mut pile),
			Err(ScorchError::NoMatch(_)),
		));

		// Missing constant, tolerant: the literal passes through.
		let mut pile = PatternPile::default();
		let n = expand_pattern(&ns, "/", "/nope", true, &mut pile)
			.expect("Tolerant expansion failed.");
		assert_eq!(n, 1);
		assert_eq!(pile.paths(), &["/nope".to_owned()]);
	}

	#[test]
	fn t_wildcard_expansion() {
		let ns = ToySpace::new();

		// Relative to /a: all the text files.
		let mut pile = PatternPile::default();
		expand_pattern(&ns, "/a", "*.txt", false, &mut pile)
			.expect("Wildcard expansion failed.");
		assert_eq!(pile.paths(), &["/a/notes.txt".to_owned()]);

		// A whole-component star spans directories.
		let mut pile = PatternPile::default();
		expand_pattern(&ns, "/", "/*/*.txt", false, &mut pile)
			.expect("Two-level expansion failed.");
		assert_eq!(pile.paths(), &["/a/notes.txt".to_owned()]);

		// Nothing matching, intolerant: an error.
		let mut pile = PatternPile::default();
		assert!(matches!(
			expand_pattern(&ns, "/c", "*.txt", false, &mut pile),
			Err(ScorchError::NoMatch(_)),
		));

		// Same again, tolerant: just empty.
		let mut pile = PatternPile::default();
		let n = expand_pattern(&ns, "/c", "*.txt", true, &mut pile)
			.expect("Tolerant wildcard failed.");
		assert_eq!(n, 0);
	}

	#[test]
	fn t_dotdot_resolution() {
		let ns = ToySpace::new();

		// Ordinary climbing.
		let mut pile = PatternPile::default();
		expand_pattern(&ns, "/a/b", "../notes.txt", false, &mut pile)
			.expect("Dot-dot expansion failed.");
		assert_eq!(pile.paths(), &["/a/notes.txt".to_owned()]);

		// Two levels from /a/b empties the stack and lands on /c.
		let mut pile = PatternPile::default();
		expand_pattern(&ns, "/a/b", "../../c", false, &mut pile)
			.expect("Root climb failed.");
		assert_eq!(pile.paths(), &["/c".to_owned()]);

		// Climbing past root with the wd underflows; the bare retry
		// underflows again, and that's fatal.
		let mut pile = PatternPile::default();
		assert!(matches!(
			expand_pattern(&ns, "/a/b", "../../../c", false, &mut pile),
			Err(ScorchError::PatternUnderflow(_)),
		));

		// The same shape against a missing target misses politely.
		let mut pile = PatternPile::default();
		assert!(matches!(
			expand_pattern(&ns, "/a/b", "../../zebra", false, &mut pile),
			Err(ScorchError::NoMatch(_)),
		));
	}

	#[test]
	fn t_mem_limit() {
		let ns = ToySpace::new();
		let mut pile = PatternPile::new(8); // Comically small.
		assert!(matches!(
			expand_pattern(&ns, "/", "/*", false, &mut pile),
			Err(ScorchError::MemLimit),
		));
	}
}
