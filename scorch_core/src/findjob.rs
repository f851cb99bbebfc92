/*!
# Scorch: Find Jobs

`-find` walks the image tree with a boolean expression — tests composed by
`-and`/`-or`/`-not`, grouped by `-sub`/`-subend`, braided by
`-if`/`-then`/`-elseif`/`-else`/`-endif` — and runs an action on every
node the expression accepts. Evaluation short-circuits, and two special
verdicts cut deeper: immediate-yes/no from `-decision`, and the recursion
block from `-prune`.
*/

use crate::{
	Drive,
	MemTree,
	ScorchError,
	pattern::compile_glob,
	tree::{
		Node,
		NodeType,
	},
};
use regex::Regex;
use std::cell::Cell;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Evaluation Verdict.
pub enum MatchResult {
	/// # The Node Fails the Expression.
	NoMatch,

	/// # The Node Passes.
	Match,

	/// # A Hard No, Skipping Further Evaluation.
	ImmediateNo,

	/// # A Hard Yes, Skipping Further Evaluation.
	ImmediateYes,
}

impl MatchResult {
	/// # Immediate?
	const fn is_immediate(self) -> bool {
		matches!(self, Self::ImmediateNo | Self::ImmediateYes)
	}

	/// # Does This Count as a Hit?
	const fn hit(self) -> bool {
		matches!(self, Self::Match | Self::ImmediateYes)
	}

	/// # Boolean Flip (Immediates Pass Through).
	const fn not(self) -> Self {
		match self {
			Self::NoMatch => Self::Match,
			Self::Match => Self::NoMatch,
			other => other,
		}
	}
}



#[derive(Debug, Clone)]
/// # One Leaf Test.
pub(crate) enum Test {
	/// # Constant.
	Const(bool),

	/// # Leaf Name Against a Glob.
	Name(Regex, String),

	/// # Node Type Letter.
	Type(char),

	/// # Upcoming-Track Damage Overlap.
	Damaged,

	/// # Start LBA Within a Window.
	LbaRange(i32, i32),

	/// # Has a POSIX ACL.
	HasAcl,

	/// # Has `user.` Extended Attributes.
	HasXattr,

	/// # Has Any Extended Attributes.
	HasAnyXattr,

	/// # Has AAIP Metadata.
	HasAaip,

	/// # Has a Content Filter.
	HasFilter,

	/// # Identity Test Against a Specific Path.
	WantedNode(String),

	/// # Has Uncommitted Content.
	PendingData,

	/// # Immediate Verdict.
	Decision(bool),

	/// # Block Recursion Below Here.
	Prune,

	/// # Full Path Against a Glob.
	Wholename(Regex, String),

	/// # Has a Recorded MD5.
	HasMd5,

	/// # Disk-Side Name Against a Glob.
	DiskName(Regex, String),

	/// # Hide Mask Overlap.
	Hidden(u8),

	/// # HFS+ Creator/Type Codes.
	HasHfsCrtp(String, String),

	/// # HFS+ Blessing Kind.
	HasHfsBless(u8),

	/// # Exact Disk-Side Path.
	DiskPath(String),
}



#[derive(Debug, Clone)]
/// # An Expression Tree.
pub(crate) enum Expr {
	/// # A Leaf (Possibly Inverted).
	Leaf(bool, Test),

	/// # Conjunction.
	And(Box<Expr>, Box<Expr>),

	/// # Disjunction.
	Or(Box<Expr>, Box<Expr>),

	/// # Negation.
	Not(Box<Expr>),

	/// # Branching.
	IfThenElse(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
}

impl Expr {
	/// # The Accept-Everything Expression.
	pub(crate) const fn always() -> Self { Self::Leaf(false, Test::Const(true)) }
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Find Actions.
///
/// The numeric codes are the dispatch contract; names map through
/// [`FindAction::from_name`].
pub enum FindAction {
	/// # Print the Path.
	Echo = 0,

	/// # Remove (Non-Recursive).
	Rm = 1,

	/// # Remove Recursively.
	RmR = 2,

	/// # Change Owner.
	Chown = 4,

	/// # Change Group.
	Chgrp = 5,

	/// # Change Mode.
	Chmod = 6,

	/// # Set Timestamps.
	AlterDate = 7,

	/// # Long Listing.
	Lsdl = 8,

	/// # Change Owner, Recursive.
	ChownR = 9,

	/// # Change Group, Recursive.
	ChgrpR = 10,

	/// # Change Mode, Recursive.
	ChmodR = 11,

	/// # Set Timestamps, Recursive.
	AlterDateR = 12,

	/// # Nested Find.
	Find = 13,

	/// # Compare Against Disk.
	Compare = 14,

	/// # Report Presence.
	InIso = 15,

	/// # Report Absence From the Image.
	NotInIso = 16,

	/// # Update From Disk.
	Update = 17,

	/// # Add Missing From Disk.
	AddMissing = 18,

	/// # Remove Directories Emptied by Comparison.
	EmptyIsoDir = 19,

	/// # Report Fully-Present Directories.
	IsFullInIso = 20,

	/// # Report Damage Overlap.
	ReportDamage = 21,

	/// # Report Block Addresses.
	ReportLba = 22,

	/// # Count Matches Quietly.
	FoundPath = 23,

	/// # Print ACL.
	Getfacl = 24,

	/// # Set ACL.
	Setfacl = 25,

	/// # Print Extended Attributes.
	Getfattr = 26,

	/// # Set an Extended Attribute.
	Setfattr = 27,

	/// # Attach a Content Filter.
	SetFilter = 28,

	/// # Show the Content Pipeline.
	ShowStream = 29,

	/// # Widen Hardlink Siblings.
	WidenHardlinks = 32,

	/// # Print All Extended Attributes.
	GetAnyXattr = 33,

	/// # Print Recorded MD5.
	GetMd5 = 34,

	/// # Verify Recorded MD5.
	CheckMd5 = 35,

	/// # Record Fresh MD5.
	MakeMd5 = 36,

	/// # Emit mkisofs-Style Arguments.
	MkisofsR = 37,

	/// # Set Sort Weight.
	SortWeight = 38,

	/// # Set the Hide Mask.
	Hide = 39,

	/// # Accumulate a Size Estimate.
	EstimateSize = 40,

	/// # Update and Merge.
	UpdateMerge = 41,

	/// # Remove Merge Markers.
	RmMerge = 42,

	/// # Clear Merge Markers.
	ClearMerge = 43,

	/// # List Extended Attribute Names.
	ListExtattr = 44,

	/// # Set HFS+ Creator/Type.
	SetHfsCrtp = 45,

	/// # Print HFS+ Creator/Type.
	GetHfsCrtp = 46,

	/// # Set HFS+ Blessing.
	SetHfsBless = 47,

	/// # Print HFS+ Blessing.
	GetHfsBless = 48,
}

impl FindAction {
	/// # From a `-exec` Name.
	pub(crate) fn from_name(name: &str) -> Option<Self> {
		Some(match name {
			"echo" => Self::Echo,
			"rm" => Self::Rm,
			"rm_r" => Self::RmR,
			"chown" => Self::Chown,
			"chgrp" => Self::Chgrp,
			"chmod" => Self::Chmod,
			"alter_date" => Self::AlterDate,
			"lsdl" => Self::Lsdl,
			"chown_r" => Self::ChownR,
			"chgrp_r" => Self::ChgrpR,
			"chmod_r" => Self::ChmodR,
			"alter_date_r" => Self::AlterDateR,
			"find" => Self::Find,
			"compare" => Self::Compare,
			"in_iso" => Self::InIso,
			"not_in_iso" => Self::NotInIso,
			"update" => Self::Update,
			"add_missing" => Self::AddMissing,
			"empty_iso_dir" => Self::EmptyIsoDir,
			"is_full_in_iso" => Self::IsFullInIso,
			"report_damage" => Self::ReportDamage,
			"report_lba" => Self::ReportLba,
			"found_path" => Self::FoundPath,
			"getfacl" => Self::Getfacl,
			"setfacl" => Self::Setfacl,
			"getfattr" => Self::Getfattr,
			"setfattr" => Self::Setfattr,
			"set_filter" => Self::SetFilter,
			"show_stream" => Self::ShowStream,
			"widen_hardlinks" => Self::WidenHardlinks,
			"get_any_xattr" => Self::GetAnyXattr,
			"get_md5" => Self::GetMd5,
			"check_md5" => Self::CheckMd5,
			"make_md5" => Self::MakeMd5,
			"mkisofs_r" => Self::MkisofsR,
			"sort_weight" => Self::SortWeight,
			"hide" => Self::Hide,
			"estimate_size" => Self::EstimateSize,
			"update_merge" => Self::UpdateMerge,
			"rm_merge" => Self::RmMerge,
			"clear_merge" => Self::ClearMerge,
			"list_extattr" => Self::ListExtattr,
			"set_hfs_crtp" => Self::SetHfsCrtp,
			"get_hfs_crtp" => Self::GetHfsCrtp,
			"set_hfs_bless" => Self::SetHfsBless,
			"get_hfs_bless" => Self::GetHfsBless,
			_ => return None,
		})
	}

	/// # How Many Arguments the Action Eats.
	pub(crate) const fn arg_count(self) -> usize {
		match self {
			Self::Chown | Self::ChownR | Self::Chgrp | Self::ChgrpR |
			Self::Chmod | Self::ChmodR | Self::Setfacl | Self::SetFilter |
			Self::SortWeight | Self::Hide | Self::SetHfsBless => 1,
			Self::AlterDate | Self::AlterDateR | Self::Setfattr |
			Self::SetHfsCrtp => 2,
			_ => 0,
		}
	}
}



#[derive(Debug, Clone, Copy, Default)]
/// # Running Statistics.
pub struct FindStats {
	/// # Nodes Accepted.
	pub match_count: u64,

	/// # Size Estimate, Lower Bound (Bytes).
	pub estim_lower_size: u64,

	/// # Size Estimate, Upper Bound (Bytes).
	pub estim_upper_size: u64,
}



#[derive(Debug)]
/// # A Parsed Find Job.
pub struct FindJob {
	/// # Where to Start.
	pub(crate) start_path: String,

	/// # The Expression.
	pub(crate) root: Expr,

	/// # What to Do With Hits.
	pub(crate) action: FindAction,

	/// # Action Target (Owner, Mode, Filter Name, ...).
	pub(crate) target: String,

	/// # Second Action Argument.
	pub(crate) text_2: String,

	/// # Running Statistics.
	pub(crate) stats: FindStats,

	/// # Nested Job For `-exec find`.
	pub(crate) subjob: Option<Box<FindJob>>,
}

impl FindJob {
	/// # Parse From Tokens.
	///
	/// Shape: `START_PATH [EXPRESSION] [-exec ACTION [ARGS]]`. An absent
	/// expression accepts everything; an absent action echoes.
	///
	/// ## Errors
	///
	/// This will return an error for malformed expressions or unknown
	/// actions.
	pub fn parse(args: &[String]) -> Result<Self, ScorchError> {
		let (start_path, rest) = match args.first() {
			Some(first) if ! first.starts_with('-') && first != "(" =>
				(first.clone(), &args[1..]),
			_ => ("/".to_owned(), args),
		};

		let mut parser = Parser { tokens: rest, pos: 0 };
		let root =
			if parser.done() || parser.peek() == Some("-exec") { Expr::always() }
			else { parser.parse_expr()? };

		// The action clause.
		let mut action = FindAction::Echo;
		let mut target = String::new();
		let mut text_2 = String::new();
		let mut subjob = None;
		if parser.peek() == Some("-exec") {
			parser.pos += 1;
			let name = parser.next()
				.ok_or_else(|| ScorchError::FindParse("-exec".to_owned()))?;
			action = FindAction::from_name(name)
				.ok_or_else(|| ScorchError::FindParse(name.to_owned()))?;
			let wanted = action.arg_count();
			if 0 < wanted {
				target = parser.next()
					.ok_or_else(|| ScorchError::FindParse(name.to_owned()))?
					.to_owned();
			}
			if 1 < wanted {
				text_2 = parser.next()
					.ok_or_else(|| ScorchError::FindParse(name.to_owned()))?
					.to_owned();
			}
			if action == FindAction::Find {
				// Whatever follows describes the nested job.
				let rest: Vec<String> = parser.tokens[parser.pos..].to_vec();
				parser.pos = parser.tokens.len();
				subjob = Some(Box::new(Self::parse(&rest)?));
			}
		}
		if ! parser.done() {
			return Err(ScorchError::FindParse(
				parser.peek().unwrap_or("?").to_owned(),
			));
		}

		Ok(Self {
			start_path,
			root,
			action,
			target,
			text_2,
			stats: FindStats::default(),
			subjob,
		})
	}

	#[must_use]
	/// # The Statistics So Far.
	pub const fn stats(&self) -> &FindStats { &self.stats }

	#[must_use]
	/// # The Action.
	pub const fn action(&self) -> FindAction { self.action }

	/// # Collect Matching Paths.
	///
	/// Walks depth-first from the start path, evaluating the expression
	/// at every node. `-prune` verdicts stop descent; everything accepted
	/// lands in the returned list in traversal order.
	///
	/// ## Errors
	///
	/// This will return an error if the start path doesn't resolve.
	pub fn matches(&mut self, tree: &MemTree, drive: Option<&Drive>)
	-> Result<Vec<String>, ScorchError> {
		tree.lstat(&self.start_path)?;
		let mut hits = Vec::new();
		self.walk(tree, drive, &self.start_path.clone(), &mut hits);
		self.stats.match_count += hits.len() as u64;
		for hit in &hits {
			if let Some(node) = tree.node(hit) {
				self.stats.estim_lower_size += node.size;
				self.stats.estim_upper_size +=
					node.size.div_ceil(2048) * 2048 + 256;
			}
		}
		Ok(hits)
	}

	/// # Recursive Walker.
	fn walk(
		&self,
		tree: &MemTree,
		drive: Option<&Drive>,
		path: &str,
		hits: &mut Vec<String>,
	) {
		let Some(node) = tree.node(path) else { return; };
		let pruned = Cell::new(false);
		let ctx = EvalCtx { path, node, drive, pruned: &pruned };
		let verdict = eval(&self.root, &ctx);
		if verdict.hit() { hits.push(path.to_owned()); }

		if node.ntype == NodeType::Dir && ! pruned.get() {
			for name in node.children.keys() {
				let sub =
					if path == "/" { format!("/{name}") }
					else { format!("{path}/{name}") };
				self.walk(tree, drive, &sub, hits);
			}
		}
	}
}



/// # Evaluation Context.
pub(crate) struct EvalCtx<'a> {
	/// # Full Image Path.
	pub(crate) path: &'a str,

	/// # The Node.
	pub(crate) node: &'a Node,

	/// # The Input Drive (For Damage Tests).
	pub(crate) drive: Option<&'a Drive>,

	/// # Set When a `-prune` Fires.
	pub(crate) pruned: &'a Cell<bool>,
}

/// # Evaluate an Expression.
///
/// Short-circuit rules: an OR stops on a true left arm, an AND on a false
/// one; immediate verdicts stop everything on their way out.
pub(crate) fn eval(expr: &Expr, ctx: &EvalCtx) -> MatchResult {
	match expr {
		Expr::Leaf(invert, test) => {
			let verdict = eval_test(test, ctx);
			if *invert { verdict.not() } else { verdict }
		},
		Expr::And(left, right) => {
			let l = eval(left, ctx);
			if l.is_immediate() || l == MatchResult::NoMatch { return l; }
			eval(right, ctx)
		},
		Expr::Or(left, right) => {
			let l = eval(left, ctx);
			if l.is_immediate() || l == MatchResult::Match { return l; }
			eval(right, ctx)
		},
		Expr::Not(sub) => eval(sub, ctx).not(),
		Expr::IfThenElse(cond, yes, no) => {
			let c = eval(cond, ctx);
			if c.is_immediate() { return c; }
			if c == MatchResult::Match { eval(yes, ctx) }
			else if let Some(no) = no { eval(no, ctx) }
			// No arm applies: the braid is neutral, not a veto.
			else { MatchResult::Match }
		},
	}
}

/// # Evaluate One Leaf Test.
fn eval_test(test: &Test, ctx: &EvalCtx) -> MatchResult {
	let yes = |b: bool|
		if b { MatchResult::Match } else { MatchResult::NoMatch };
	let leaf = ctx.path.rsplit('/').next().unwrap_or("");

	match test {
		Test::Const(b) => yes(*b),
		Test::Name(rx, _) => yes(rx.is_match(leaf)),
		Test::Type(letter) => yes(ctx.node.ntype.matches_letter(*letter)),
		Test::Damaged => {
			// Overlap between the node's extent and drive-reported damage.
			let damaged = ctx.drive.is_some_and(|d|
				d.next_track_damaged() & 1 != 0
			) && ctx.node.lba.is_some();
			yes(damaged)
		},
		Test::LbaRange(start, count) => yes(ctx.node.lba.is_some_and(|(lba, blocks)|
			lba < start + count && *start < lba + blocks
		)),
		Test::HasAcl => yes(ctx.node.has_acl()),
		Test::HasXattr => yes(ctx.node.has_user_xattr()),
		Test::HasAnyXattr => yes(ctx.node.has_any_xattr()),
		Test::HasAaip => yes(ctx.node.has_aaip()),
		Test::HasFilter => yes(ctx.node.filter.is_some()),
		Test::WantedNode(path) => yes(ctx.path == path),
		Test::PendingData => yes(ctx.node.pending_data),
		Test::Decision(true) => MatchResult::ImmediateYes,
		Test::Decision(false) => MatchResult::ImmediateNo,
		Test::Prune => {
			ctx.pruned.set(true);
			MatchResult::ImmediateNo
		},
		Test::Wholename(rx, _) => yes(rx.is_match(ctx.path)),
		Test::HasMd5 => yes(ctx.node.md5.is_some()),
		Test::DiskName(rx, _) => yes(
			ctx.node.disk_path.as_ref().is_some_and(|p|
				p.file_name().is_some_and(|n| rx.is_match(&n.to_string_lossy()))
			)
		),
		Test::Hidden(mask) => yes(ctx.node.hidden & mask != 0 ||
			(*mask == 0 && ctx.node.hidden == 0)),
		Test::HasHfsCrtp(creator, tp) => yes(
			ctx.node.hfs_crtp.as_ref().is_some_and(|(c, t)|
				c == creator.as_bytes() && t == tp.as_bytes()
			)
		),
		Test::HasHfsBless(kind) => yes(ctx.node.hfs_bless == *kind),
		Test::DiskPath(path) => yes(
			ctx.node.disk_path.as_ref()
				.is_some_and(|p| p.to_string_lossy() == *path)
		),
	}
}



/// # Token-Stream Parser.
struct Parser<'a> {
	/// # The Tokens.
	tokens: &'a [String],

	/// # Cursor.
	pos: usize,
}

impl<'a> Parser<'a> {
	/// # Out of Tokens?
	fn done(&self) -> bool { self.tokens.len() <= self.pos }

	/// # Peek the Next Token.
	fn peek(&self) -> Option<&'a str> {
		self.tokens.get(self.pos).map(String::as_str)
	}

	/// # Take the Next Token.
	fn next(&mut self) -> Option<&'a str> {
		let out = self.peek();
		if out.is_some() { self.pos += 1; }
		out
	}

	/// # `expr := term (('-or'|'-o') term)*`
	fn parse_expr(&mut self) -> Result<Expr, ScorchError> {
		let mut left = self.parse_term()?;
		while matches!(self.peek(), Some("-or" | "-o")) {
			self.pos += 1;
			let right = self.parse_term()?;
			left = Expr::Or(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	/// # `term := factor (('-and'|'-a'|juxtapose) factor)*`
	fn parse_term(&mut self) -> Result<Expr, ScorchError> {
		let mut left = self.parse_factor()?;
		loop {
			match self.peek() {
				Some("-and" | "-a") => { self.pos += 1; },
				// Juxtaposition binds like -and; anything that opens a
				// factor continues the term.
				Some(tok) if tok != "-or" && tok != "-o" &&
					tok != "-subend" && tok != ")" &&
					tok != "-then" && tok != "-elseif" &&
					tok != "-else" && tok != "-endif" &&
					tok != "-exec" => {},
				_ => break,
			}
			let right = self.parse_factor()?;
			left = Expr::And(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	/// # `factor := '-not' factor | '-sub' expr '-subend' | if_expr | test`
	fn parse_factor(&mut self) -> Result<Expr, ScorchError> {
		match self.peek() {
			Some("-not" | "!") => {
				self.pos += 1;
				Ok(Expr::Not(Box::new(self.parse_factor()?)))
			},
			Some("-sub" | "(") => {
				self.pos += 1;
				let inner = self.parse_expr()?;
				match self.next() {
					Some("-subend" | ")") => Ok(inner),
					other => Err(ScorchError::FindParse(
						other.unwrap_or("-subend").to_owned(),
					)),
				}
			},
			Some("-if") => self.parse_if(),
			Some(_) => self.parse_test(),
			None => Err(ScorchError::FindParse("end of expression".to_owned())),
		}
	}

	/// # `if_expr := '-if' e '-then' e ('-elseif' e '-then' e)* ('-else' e)? '-endif'`
	fn parse_if(&mut self) -> Result<Expr, ScorchError> {
		self.expect("-if")?;
		let cond = self.parse_expr()?;
		self.expect("-then")?;
		let yes = self.parse_expr()?;

		// Collect elseif arms to fold from the back.
		let mut arms: Vec<(Expr, Expr)> = Vec::new();
		while self.peek() == Some("-elseif") {
			self.pos += 1;
			let c = self.parse_expr()?;
			self.expect("-then")?;
			let y = self.parse_expr()?;
			arms.push((c, y));
		}
		let mut tail: Option<Box<Expr>> = None;
		if self.peek() == Some("-else") {
			self.pos += 1;
			tail = Some(Box::new(self.parse_expr()?));
		}
		self.expect("-endif")?;

		for (c, y) in arms.into_iter().rev() {
			tail = Some(Box::new(Expr::IfThenElse(Box::new(c), Box::new(y), tail)));
		}
		Ok(Expr::IfThenElse(Box::new(cond), Box::new(yes), tail))
	}

	/// # Demand a Specific Token.
	fn expect(&mut self, want: &str) -> Result<(), ScorchError> {
		if self.next() == Some(want) { Ok(()) }
		else { Err(ScorchError::FindParse(want.to_owned())) }
	}

	/// # One Leaf Test.
	fn parse_test(&mut self) -> Result<Expr, ScorchError> {
		let tok = self.next()
			.ok_or_else(|| ScorchError::FindParse("test".to_owned()))?;
		let mut arg = |what: &str| -> Result<&'a str, ScorchError> {
			self.next().ok_or_else(|| ScorchError::FindParse(what.to_owned()))
		};

		let (invert, test) = match tok {
			"-true" => (false, Test::Const(true)),
			"-false" => (false, Test::Const(false)),
			"-name" => {
				let glob = arg("-name")?;
				(false, Test::Name(compile_glob(glob)?, glob.to_owned()))
			},
			"-wholename" => {
				let glob = arg("-wholename")?;
				(false, Test::Wholename(compile_glob(glob)?, glob.to_owned()))
			},
			"-disk_name" => {
				let glob = arg("-disk_name")?;
				(false, Test::DiskName(compile_glob(glob)?, glob.to_owned()))
			},
			"-disk_path" => (false, Test::DiskPath(arg("-disk_path")?.to_owned())),
			"-type" => {
				let raw = arg("-type")?;
				let letter = raw.chars().next()
					.filter(|c| matches!(c, 'b' | 'c' | 'd' | 'p' | 'f' | 'l' | 's' | 'e' | 'X'))
					.ok_or_else(|| ScorchError::FindParse(raw.to_owned()))?;
				(false, Test::Type(letter))
			},
			"-damaged" => (false, Test::Damaged),
			"-undamaged" => (true, Test::Damaged),
			"-lba_range" => {
				let start: i32 = arg("-lba_range")?.parse()
					.map_err(|_| ScorchError::FindParse("-lba_range".to_owned()))?;
				let count: i32 = arg("-lba_range")?.parse()
					.map_err(|_| ScorchError::FindParse("-lba_range".to_owned()))?;
				(false, Test::LbaRange(start, count))
			},
			"-has_acl" => (false, Test::HasAcl),
			"-has_xattr" => (false, Test::HasXattr),
			"-has_any_xattr" => (false, Test::HasAnyXattr),
			"-has_aaip" => (false, Test::HasAaip),
			"-has_filter" => (false, Test::HasFilter),
			"-wanted_node" => (false, Test::WantedNode(arg("-wanted_node")?.to_owned())),
			"-pending_data" => (false, Test::PendingData),
			"-decision" => {
				let raw = arg("-decision")?;
				(false, Test::Decision(raw == "yes"))
			},
			"-prune" => (false, Test::Prune),
			"-has_md5" => (false, Test::HasMd5),
			"-hidden" => {
				let mask: u8 = arg("-hidden")?.parse()
					.map_err(|_| ScorchError::FindParse("-hidden".to_owned()))?;
				(false, Test::Hidden(mask))
			},
			"-has_hfs_crtp" => {
				let creator = arg("-has_hfs_crtp")?.to_owned();
				let tp = arg("-has_hfs_crtp")?.to_owned();
				(false, Test::HasHfsCrtp(creator, tp))
			},
			"-has_hfs_bless" => {
				let kind: u8 = arg("-has_hfs_bless")?.parse()
					.map_err(|_| ScorchError::FindParse("-has_hfs_bless".to_owned()))?;
				(false, Test::HasHfsBless(kind))
			},
			other => return Err(ScorchError::FindParse(other.to_owned())),
		};
		Ok(Expr::Leaf(invert, test))
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::IsoTree;

	/// # String Slices to Owned Tokens.
	fn toks(raw: &[&str]) -> Vec<String> {
		raw.iter().map(|s| (*s).to_owned()).collect()
	}

	/// # A Tree With Text Files and a Source Directory.
	fn playground() -> MemTree {
		let mut tree = MemTree::default();
		tree.mkdir("/a").expect("mkdir failed.");
		tree.mkdir("/a/src").expect("mkdir failed.");
		tree.mkdir("/a/junk").expect("mkdir failed.");
		tree.symlink("x", "/a/readme.txt").expect("symlink failed.");
		tree.symlink("y", "/a/src/lib.txt").expect("symlink failed.");
		tree
	}

	/// # Evaluate a Token Expression at a Path.
	fn verdict(tree: &MemTree, expr: &[&str], path: &str) -> MatchResult {
		let mut parser = Parser { tokens: &toks(expr), pos: 0 };
		let root = parser.parse_expr().expect("Parse failed.");
		assert!(parser.done(), "Tokens left over.");
		let node = tree.node(path).expect("Missing node.");
		let pruned = Cell::new(false);
		eval(&root, &EvalCtx { path, node, drive: None, pruned: &pruned })
	}

	#[test]
	fn t_short_circuit_precedence() {
		// -and binds tighter than -or: name *.txt OR (type d AND name src).
		let tree = playground();
		let expr = ["-name", "*.txt", "-or", "-type", "d", "-and", "-name", "src"];

		// A directory named src: the left arm misses, the right lands.
		assert_eq!(verdict(&tree, &expr, "/a/src"), MatchResult::Match);

		// A .txt file: the left arm lands, the right never runs.
		assert_eq!(verdict(&tree, &expr, "/a/readme.txt"), MatchResult::Match);

		// A directory named junk: both arms miss.
		assert_eq!(verdict(&tree, &expr, "/a/junk"), MatchResult::NoMatch);
	}

	#[test]
	fn t_not_involution() {
		// not(not(e)) behaves like e across a mixed population.
		let tree = playground();
		let plain = ["-type", "d"];
		let doubled = ["-not", "-not", "-type", "d"];
		for path in ["/a", "/a/src", "/a/readme.txt", "/a/src/lib.txt"] {
			assert_eq!(
				verdict(&tree, &plain, path),
				verdict(&tree, &doubled, path),
				"Double negation diverged at {path}.",
			);
		}
	}

	#[test]
	fn t_distribution() {
		// a AND (b OR c) ≡ (a AND b) OR (a AND c).
		let tree = playground();
		let left = [
			"-type", "d", "-and", "-sub",
			"-name", "src", "-or", "-name", "junk",
			"-subend",
		];
		let right = [
			"-sub", "-type", "d", "-and", "-name", "src", "-subend",
			"-or",
			"-sub", "-type", "d", "-and", "-name", "junk", "-subend",
		];
		for path in ["/a", "/a/src", "/a/junk", "/a/readme.txt"] {
			assert_eq!(
				verdict(&tree, &left, path),
				verdict(&tree, &right, path),
				"Distribution diverged at {path}.",
			);
		}
	}

	#[test]
	fn t_decision_and_if() {
		let tree = playground();

		// -decision yes is an immediate yes, whatever follows.
		assert_eq!(
			verdict(&tree, &["-decision", "yes", "-and", "-false"], "/a"),
			MatchResult::ImmediateYes,
		);
		assert_eq!(
			verdict(&tree, &["-decision", "no", "-or", "-true"], "/a"),
			MatchResult::ImmediateNo,
		);

		// if/then/else braids.
		let expr = [
			"-if", "-type", "d", "-then", "-name", "src",
			"-else", "-name", "*.txt", "-endif",
		];
		assert_eq!(verdict(&tree, &expr, "/a/src"), MatchResult::Match);
		assert_eq!(verdict(&tree, &expr, "/a/junk"), MatchResult::NoMatch);
		assert_eq!(verdict(&tree, &expr, "/a/readme.txt"), MatchResult::Match);
	}

	#[test]
	fn t_prune_blocks_descent() {
		let mut tree = playground();
		tree.symlink("z", "/a/junk/deep.txt").expect("symlink failed.");

		// Without pruning, both .txt leaves under /a/junk and /a/src show.
		let mut job = FindJob::parse(&toks(&["/", "-name", "*.txt"]))
			.expect("Parse failed.");
		let hits = job.matches(&tree, None).expect("Run failed.");
		assert_eq!(hits.len(), 3);

		// Pruning junk hides its subtree (and junk itself doesn't match).
		let mut job = FindJob::parse(&toks(&[
			"/",
			"-if", "-name", "junk", "-then", "-prune", "-endif",
			"-and", "-name", "*.txt",
		])).expect("Parse failed.");
		let hits = job.matches(&tree, None).expect("Run failed.");
		assert_eq!(
			hits,
			vec!["/a/readme.txt".to_owned(), "/a/src/lib.txt".to_owned()],
		);
	}

	#[test]
	fn t_parse_action() {
		let job = FindJob::parse(&toks(&[
			"/a", "-type", "d", "-exec", "chmod", "0750",
		])).expect("Parse failed.");
		assert_eq!(job.action(), FindAction::Chmod);
		assert_eq!(job.target, "0750");
		assert_eq!(job.start_path, "/a");

		// Unknown actions and trailing junk are refused.
		assert!(FindJob::parse(&toks(&["/", "-exec", "explode"])).is_err());
		assert!(FindJob::parse(&toks(&["/", "-name"])).is_err());
		assert!(FindJob::parse(&toks(&["/", "-sub", "-true"])).is_err());
	}

	#[test]
	fn t_metadata_tests() {
		let mut tree = playground();
		tree.set_acl("/a/src", Some("user::rwx".to_owned())).expect("acl failed.");
		tree.set_xattr("/a/src", "user.k", Some(b"v".to_vec())).expect("xattr failed.");
		tree.set_filter("/a/readme.txt", Some("--gzip".to_owned())).expect("filter failed.");

		assert_eq!(verdict(&tree, &["-has_acl"], "/a/src"), MatchResult::Match);
		assert_eq!(verdict(&tree, &["-has_acl"], "/a"), MatchResult::NoMatch);
		assert_eq!(verdict(&tree, &["-has_xattr"], "/a/src"), MatchResult::Match);
		assert_eq!(verdict(&tree, &["-has_aaip"], "/a/src"), MatchResult::Match);
		assert_eq!(
			verdict(&tree, &["-has_filter"], "/a/readme.txt"),
			MatchResult::Match,
		);
		assert_eq!(
			verdict(&tree, &["-pending_data"], "/a/readme.txt"),
			MatchResult::Match,
		);
		assert_eq!(verdict(&tree, &["-has_md5"], "/a"), MatchResult::NoMatch);
	}
}
