/*!
# Scorch: Tokenization

One logical line becomes words: double and single quotes group, and one of
four backslash-interpretation modes decides where C-style escapes get
decoded. A trailing backslash (or an open quote, when quoted input is on)
asks for a continuation line.
*/

use crate::ScorchError;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Backslash Interpretation Mode.
pub enum BackslashMode {
	/// # Backslashes Are Just Bytes.
	Off,

	#[default]
	/// # Decode Escapes Inside Double Quotes Only.
	InDoubleQuotes,

	/// # Decode Escapes Inside Either Quote Flavor.
	InQuotes,

	/// # Decode Escapes Everywhere.
	WithQuotedInput,
}

impl BackslashMode {
	/// # From a Keyword.
	///
	/// ## Errors
	///
	/// This will return an error for unknown keywords.
	pub fn from_keyword(raw: &str) -> Result<Self, ScorchError> {
		match raw {
			"off" => Ok(Self::Off),
			"in_double_quotes" => Ok(Self::InDoubleQuotes),
			"in_quotes" => Ok(Self::InQuotes),
			"with_quoted_input" | "on" => Ok(Self::WithQuotedInput),
			_ => Err(ScorchError::BadArgValue(
				"-backslash_codes".to_owned(),
				raw.to_owned(),
			)),
		}
	}

	/// # Decode Within Double Quotes?
	const fn in_dq(self) -> bool { ! matches!(self, Self::Off) }

	/// # Decode Within Single Quotes?
	const fn in_sq(self) -> bool {
		matches!(self, Self::InQuotes | Self::WithQuotedInput)
	}

	/// # Decode Outside Quotes?
	const fn bare(self) -> bool { matches!(self, Self::WithQuotedInput) }
}



#[derive(Debug, Clone, Default)]
/// # A Tokenized Line.
pub struct TokenLine {
	/// # The Words.
	pub words: Vec<String>,

	/// # More Input Wanted (Trailing Escape / Open Quote).
	pub incomplete: bool,
}



/// # Split a Line Into Words.
///
/// ## Errors
///
/// This will return an error for an unterminated quote when quoted input
/// continuation isn't available.
pub fn tokenize(line: &str, mode: BackslashMode) -> Result<TokenLine, ScorchError> {
	let mut words = Vec::new();
	let mut word = String::new();
	let mut in_word = false;
	let mut quote: Option<char> = None;
	let mut chars = line.chars().peekable();
	let mut incomplete = false;

	while let Some(c) = chars.next() {
		match quote {
			Some(q) => {
				if c == q { quote = None; }
				else if c == '\\' &&
					((q == '"' && mode.in_dq()) || (q == '\'' && mode.in_sq())) {
					match decode_one(&mut chars) {
						Some(dec) => word.push(dec),
						None => { incomplete = true; }, // Trailing backslash.
					}
				}
				else { word.push(c); }
			},
			None if c.is_whitespace() => {
				if in_word {
					words.push(std::mem::take(&mut word));
					in_word = false;
				}
			},
			None if c == '"' || c == '\'' => {
				quote = Some(c);
				in_word = true;
			},
			None if c == '\\' => {
				in_word = true;
				if mode == BackslashMode::Off {
					// Literal, except a bare trailing backslash still
					// requests continuation.
					if chars.peek().is_none() { incomplete = true; }
					else { word.push('\\'); }
				}
				else if mode.bare() {
					match decode_one(&mut chars) {
						Some(dec) => word.push(dec),
						None => { incomplete = true; },
					}
				}
				else {
					// Shell-style: the backslash protects the next char.
					match chars.next() {
						Some(next) => word.push(next),
						None => { incomplete = true; },
					}
				}
			},
			None => {
				in_word = true;
				word.push(c);
			},
		}
	}

	if quote.is_some() {
		if mode == BackslashMode::WithQuotedInput {
			// The newline belongs to the word; ask for more.
			word.push('\n');
			incomplete = true;
		}
		else {
			return Err(ScorchError::BadArgValue(
				"quotation".to_owned(),
				line.to_owned(),
			));
		}
	}

	if in_word && ! incomplete { words.push(word); }
	else if incomplete && (in_word || quote.is_some()) {
		// Hand the partial word back so the caller can glue the next
		// line onto it.
		words.push(word);
	}

	Ok(TokenLine { words, incomplete })
}



/// # Decode One Escape Sequence (Cursor Past the Backslash).
///
/// The classic set: `\a \b \e \f \n \r \t \v \\`, octal `\NNN`, hex
/// `\xNN`, and control `\cC`. Unknown escapes decode to their literal
/// character; a backslash at end of input decodes to nothing.
fn decode_one(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<char> {
	let c = chars.next()?;
	Some(match c {
		'a' => '\u{7}',
		'b' => '\u{8}',
		'e' => '\u{1B}',
		'f' => '\u{C}',
		'n' => '\n',
		'r' => '\r',
		't' => '\t',
		'v' => '\u{B}',
		'\\' => '\\',
		'0'..='7' => {
			let mut value = c as u32 - '0' as u32;
			for _ in 0..2 {
				match chars.peek() {
					Some(&d @ '0'..='7') => {
						value = value * 8 + (d as u32 - '0' as u32);
						chars.next();
					},
					_ => break,
				}
			}
			char::from_u32(value).unwrap_or('\u{FFFD}')
		},
		'x' => {
			let mut value = 0_u32;
			let mut any = false;
			for _ in 0..2 {
				match chars.peek().and_then(|d| d.to_digit(16)) {
					Some(d) => {
						value = value * 16 + d;
						any = true;
						chars.next();
					},
					None => break,
				}
			}
			if any { char::from_u32(value).unwrap_or('\u{FFFD}') }
			else { 'x' }
		},
		'c' => {
			let ctl = chars.next()?;
			char::from_u32((ctl as u32) & 0x1F).unwrap_or('\u{FFFD}')
		},
		other => other,
	})
}

/// # Re-Encode a Line For Output.
///
/// The inverse-ish of decoding: control bytes and backslashes become
/// escape sequences so logs and frontends get clean single-line text.
#[must_use]
pub fn encode_escapes(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for c in raw.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'\u{7}' => out.push_str("\\a"),
			'\u{8}' => out.push_str("\\b"),
			'\u{1B}' => out.push_str("\\e"),
			'\u{C}' => out.push_str("\\f"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			'\u{B}' => out.push_str("\\v"),
			c if (c as u32) < 0x20 => {
				out.push_str(&format!("\\x{:02X}", c as u32));
			},
			c => out.push(c),
		}
	}
	out
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Quick Word Split.
	fn words(line: &str, mode: BackslashMode) -> Vec<String> {
		tokenize(line, mode).expect("Tokenize failed.").words
	}

	#[test]
	fn t_plain_words() {
		assert_eq!(
			words("-add /some/file  -commit", BackslashMode::Off),
			vec!["-add".to_owned(), "/some/file".to_owned(), "-commit".to_owned()],
		);
		assert!(words("   ", BackslashMode::Off).is_empty());
	}

	#[test]
	fn t_quotes() {
		assert_eq!(
			words("-volid \"MY DISC\"", BackslashMode::Off),
			vec!["-volid".to_owned(), "MY DISC".to_owned()],
		);
		assert_eq!(
			words("'one two' three", BackslashMode::Off),
			vec!["one two".to_owned(), "three".to_owned()],
		);
		// Adjacent quoted pieces glue into one word.
		assert_eq!(
			words("a\"b c\"d", BackslashMode::Off),
			vec!["ab cd".to_owned()],
		);
		// An unterminated quote without quoted-input mode is an error.
		assert!(tokenize("\"dangling", BackslashMode::Off).is_err());
	}

	#[test]
	fn t_escape_modes() {
		// Off: backslashes are bytes.
		assert_eq!(
			words(r"a\nb", BackslashMode::Off),
			vec![r"a\nb".to_owned()],
		);

		// In double quotes only.
		assert_eq!(
			words(r#""a\nb" a\nb"#, BackslashMode::InDoubleQuotes),
			vec!["a\nb".to_owned(), "anb".to_owned()],
		);

		// Everywhere.
		assert_eq!(
			words(r"a\tb", BackslashMode::WithQuotedInput),
			vec!["a\tb".to_owned()],
		);

		// Octal, hex, and control forms.
		assert_eq!(
			words(r"\101\x42\cA", BackslashMode::WithQuotedInput),
			vec!["AB\u{1}".to_owned()],
		);
	}

	#[test]
	fn t_continuation() {
		// A trailing backslash wants more.
		let out = tokenize("half a wo\\", BackslashMode::InDoubleQuotes)
			.expect("Tokenize failed.");
		assert!(out.incomplete);

		// So does an open quote in quoted-input mode.
		let out = tokenize("-volid \"TWO", BackslashMode::WithQuotedInput)
			.expect("Tokenize failed.");
		assert!(out.incomplete);
		assert_eq!(out.words.last().map(String::as_str), Some("TWO\n"));
	}

	#[test]
	fn t_encode_roundtrip() {
		let nasty = "tab\there\nand\u{1B}esc";
		let encoded = encode_escapes(nasty);
		assert_eq!(encoded, "tab\\there\\nand\\eesc");

		// Decoding the encoded form (bare mode) restores the original.
		let back = words(&encoded, BackslashMode::WithQuotedInput);
		assert_eq!(back, vec![nasty.to_owned()]);
	}
}
