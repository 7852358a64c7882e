use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Characters with query-syntax meaning in the Lucene standard parser.
const RESERVED: &[char] = &[
	'+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];
const OPERATOR_WORDS: &[&str] = &["AND", "OR", "NOT"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Keyword,
	Vector,
	Hybrid,
}
impl SearchMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Keyword => "keyword",
			Self::Vector => "vector",
			Self::Hybrid => "hybrid",
		}
	}

	pub fn uses_lexical(self) -> bool {
		!matches!(self, Self::Vector)
	}

	pub fn uses_vector(self) -> bool {
		!matches!(self, Self::Keyword)
	}
}
impl FromStr for SearchMode {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim() {
			"keyword" => Ok(Self::Keyword),
			"vector" => Ok(Self::Vector),
			"hybrid" => Ok(Self::Hybrid),
			other => Err(Error::InvalidQuery {
				message: format!("mode must be one of keyword, vector, or hybrid, got {other:?}."),
			}),
		}
	}
}
impl fmt::Display for SearchMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Lexical query tree. Leaf strings are stored already escaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexicalQuery {
	Term(String),
	Phrase { words: Vec<String>, slop: u32 },
	AnyOf(Vec<LexicalQuery>),
}
impl fmt::Display for LexicalQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Term(term) => f.write_str(term),
			Self::Phrase { words, slop } => write!(f, "\"{}\"~{slop}", words.join(" ")),
			Self::AnyOf(alternatives) => {
				f.write_str("(")?;

				for (idx, alternative) in alternatives.iter().enumerate() {
					if idx > 0 {
						f.write_str(" OR ")?;
					}

					write!(f, "{alternative}")?;
				}

				f.write_str(")")
			},
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedQuery {
	pub mode: SearchMode,
	pub lexical: LexicalQuery,
	/// Plain text handed to the embedding service.
	pub embedding_text: String,
}
impl TranslatedQuery {
	pub fn rendered(&self) -> String {
		self.lexical.to_string()
	}

	pub fn use_lexical(&self) -> bool {
		self.mode.uses_lexical()
	}

	pub fn use_vector(&self) -> bool {
		self.mode.uses_vector()
	}
}

#[derive(Clone, Debug)]
pub struct QueryTranslator {
	slop: u32,
	hyphen_expansion: bool,
}
impl QueryTranslator {
	pub fn new(slop: u32, hyphen_expansion: bool) -> Self {
		Self { slop, hyphen_expansion }
	}

	pub fn from_config(cfg: &sol_config::Search) -> Self {
		Self::new(cfg.phrase_slop, cfg.hyphen_expansion)
	}

	pub fn translate(&self, raw: &str, mode: SearchMode) -> Result<TranslatedQuery> {
		let trimmed = raw.trim();

		if trimmed.is_empty() {
			return Err(Error::InvalidQuery { message: "query must be non-empty.".to_string() });
		}

		let words = literal_words(trimmed);

		if words.is_empty() {
			return Err(Error::InvalidQuery {
				message: "query must contain at least one searchable term.".to_string(),
			});
		}

		let embedding_text = words.join(" ");
		let lexical = match self.canonical(trimmed) {
			Some(query) => query,
			None => self.build(&words),
		};

		Ok(TranslatedQuery { mode, lexical, embedding_text })
	}

	/// Accepts text only when it is exactly what this translator renders for its own content.
	fn canonical(&self, text: &str) -> Option<LexicalQuery> {
		let parsed = parse_rendered(text)?;
		let seed = match &parsed {
			LexicalQuery::AnyOf(alternatives) => alternatives.first()?,
			other => other,
		};
		let words: Vec<String> = match seed {
			LexicalQuery::Term(term) => vec![unescape(term)],
			LexicalQuery::Phrase { words, .. } => words.iter().map(|word| unescape(word)).collect(),
			LexicalQuery::AnyOf(_) => return None,
		};

		(self.build(&words) == parsed).then_some(parsed)
	}

	fn build(&self, words: &[String]) -> LexicalQuery {
		let has_hyphenated =
			self.hyphen_expansion && words.iter().any(|word| hyphen_parts(word).is_some());

		if !has_hyphenated {
			return self.assemble(words.iter().map(|word| vec![escape(word)]).collect());
		}

		let alternatives = [HyphenForm::Hyphenated, HyphenForm::Spaced, HyphenForm::Joined]
			.into_iter()
			.map(|form| {
				self.assemble(words.iter().map(|word| hyphen_variant(word, form)).collect())
			})
			.collect();

		LexicalQuery::AnyOf(alternatives)
	}

	fn assemble(&self, pieces: Vec<Vec<String>>) -> LexicalQuery {
		let mut flat: Vec<String> = pieces.into_iter().flatten().collect();

		if flat.len() == 1 {
			return LexicalQuery::Term(flat.remove(0));
		}

		LexicalQuery::Phrase { words: flat, slop: self.slop }
	}
}

#[derive(Clone, Copy)]
enum HyphenForm {
	Hyphenated,
	Spaced,
	Joined,
}

fn hyphen_variant(word: &str, form: HyphenForm) -> Vec<String> {
	let Some(parts) = hyphen_parts(word) else {
		return vec![escape(word)];
	};

	match form {
		HyphenForm::Hyphenated => vec![escape(word)],
		HyphenForm::Spaced => parts.into_iter().map(escape).collect(),
		HyphenForm::Joined => vec![escape(&parts.concat())],
	}
}

fn hyphen_parts(word: &str) -> Option<Vec<&str>> {
	let parts: Vec<&str> = word.split('-').collect();

	if parts.len() < 2 || parts.iter().any(|part| part.is_empty()) {
		return None;
	}

	Some(parts)
}

/// Splits user input into literal words.
///
/// A backslash before a reserved character marks that character literal. Unescaped double quotes
/// are dropped; the translator builds its own phrases.
fn literal_words(raw: &str) -> Vec<String> {
	let mut words = Vec::new();
	let mut current = String::new();
	let mut chars = raw.chars().peekable();

	while let Some(ch) = chars.next() {
		match ch {
			'\\' => match chars.peek() {
				Some(next) if RESERVED.contains(next) => {
					current.push(*next);
					chars.next();
				},
				_ => current.push('\\'),
			},
			'"' => {},
			ch if ch.is_whitespace() =>
				if !current.is_empty() {
					words.push(std::mem::take(&mut current));
				},
			ch => current.push(ch),
		}
	}

	if !current.is_empty() {
		words.push(current);
	}

	words
}

fn unescape(token: &str) -> String {
	literal_words(token).concat()
}

/// Escapes every reserved character. Operator words are lowercased so they stay literal.
pub fn escape(literal: &str) -> String {
	if OPERATOR_WORDS.contains(&literal) {
		return literal.to_lowercase();
	}

	let mut out = String::with_capacity(literal.len() + 4);

	for ch in literal.chars() {
		if RESERVED.contains(&ch) {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

/// Recognises text this translator could have produced.
fn parse_rendered(text: &str) -> Option<LexicalQuery> {
	if let Some(inner) = text.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
		let alternatives: Option<Vec<LexicalQuery>> =
			inner.split(" OR ").map(parse_rendered_leaf).collect();
		let alternatives = alternatives?;

		return (alternatives.len() >= 2).then_some(LexicalQuery::AnyOf(alternatives));
	}

	parse_rendered_leaf(text)
}

fn parse_rendered_leaf(text: &str) -> Option<LexicalQuery> {
	if text.starts_with('"') {
		let (body, slop) = text.rsplit_once("\"~")?;

		if slop.is_empty() || !slop.bytes().all(|byte| byte.is_ascii_digit()) {
			return None;
		}

		let slop = slop.parse().ok()?;
		let words: Vec<String> = body.strip_prefix('"')?.split(' ').map(str::to_string).collect();

		if words.len() < 2 || !words.iter().all(|word| is_escaped_token(word)) {
			return None;
		}

		return Some(LexicalQuery::Phrase { words, slop });
	}

	is_escaped_token(text).then(|| LexicalQuery::Term(text.to_string()))
}

fn is_escaped_token(token: &str) -> bool {
	if token.is_empty() || OPERATOR_WORDS.contains(&token) {
		return false;
	}

	let mut chars = token.chars();

	while let Some(ch) = chars.next() {
		if ch.is_whitespace() {
			return false;
		}
		if ch == '\\' {
			match chars.next() {
				Some(next) if RESERVED.contains(&next) => continue,
				_ => return false,
			}
		}
		if RESERVED.contains(&ch) {
			return false;
		}
	}

	true
}
