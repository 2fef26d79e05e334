//! Hierarchical property paths.
//!
//! A path is a sequence of segments rendered as:
//!
//! ```text
//! customer.addresses[0]["zip code"]
//! ```
//!
//! Property names escape `.`, `[` and `\` with a backslash; quoted keys
//! escape `"` and `\`. [`Path::parse`] is the exact inverse of `Display`.

use crate::error::{Result, VersionError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

/// A single step in a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Named property of an object.
    Property(String),
    /// Position in a list.
    Index(u64),
    /// Entry of a map keyed by arbitrary strings.
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Property(name) => {
                for c in name.chars() {
                    if matches!(c, '.' | '[' | '\\') {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                Ok(())
            }
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Key(key) => {
                write!(f, "[\"")?;
                for c in key.chars() {
                    if matches!(c, '"' | '\\') {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "\"]")
            }
        }
    }
}

/// A path addressing one property of a document.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The empty (root) path.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Create a path from segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Path(segments)
    }

    /// Parse the rendered form of a path.
    pub fn parse(input: &str) -> Result<Self> {
        PathParser::new(input).parse()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Check whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Create a child path with a property segment.
    pub fn property(&self, name: impl Into<String>) -> Self {
        self.child(Segment::Property(name.into()))
    }

    /// Create a child path with an index segment.
    pub fn index(&self, index: u64) -> Self {
        self.child(Segment::Index(index))
    }

    /// Create a child path with a key segment.
    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(Segment::Key(key.into()))
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    fn child(&self, segment: Segment) -> Self {
        let mut child = self.clone();
        child.push(segment);
        child
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && matches!(segment, Segment::Property(_)) {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl FromStr for Path {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Path::parse(&s).map_err(serde::de::Error::custom)
    }
}

struct PathParser<'a> {
    input: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        PathParser {
            input,
            chars: input.chars().peekable(),
        }
    }

    fn error(&self, reason: &str) -> VersionError {
        VersionError::InvalidPath(format!("{:?}: {}", self.input, reason))
    }

    fn parse(mut self) -> Result<Path> {
        let mut segments = Vec::new();

        while let Some(&c) = self.chars.peek() {
            let segment = match c {
                '[' => {
                    self.chars.next();
                    self.bracketed()?
                }
                '.' if segments.is_empty() => return Err(self.error("leading '.'")),
                '.' => {
                    self.chars.next();
                    self.property()?
                }
                _ if segments.is_empty() => self.property()?,
                _ => return Err(self.error("expected '.' or '['")),
            };
            segments.push(segment);
        }

        Ok(Path(segments))
    }

    fn property(&mut self) -> Result<Segment> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                '.' | '[' => break,
                '\\' => {
                    self.chars.next();
                    let escaped = self.chars.next().ok_or_else(|| self.error("dangling '\\'"))?;
                    name.push(escaped);
                }
                _ => {
                    self.chars.next();
                    name.push(c);
                }
            }
        }
        if name.is_empty() {
            return Err(self.error("empty property name"));
        }
        Ok(Segment::Property(name))
    }

    fn bracketed(&mut self) -> Result<Segment> {
        let segment = if self.chars.peek() == Some(&'"') {
            self.chars.next();
            let mut key = String::new();
            loop {
                match self.chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        let escaped =
                            self.chars.next().ok_or_else(|| self.error("dangling '\\'"))?;
                        key.push(escaped);
                    }
                    Some(c) => key.push(c),
                    None => return Err(self.error("unterminated key")),
                }
            }
            Segment::Key(key)
        } else {
            let mut digits = String::new();
            while let Some(&c) = self.chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                digits.push(c);
                self.chars.next();
            }
            let index = digits.parse().map_err(|_| self.error("invalid index"))?;
            Segment::Index(index)
        };

        match self.chars.next() {
            Some(']') => Ok(segment),
            _ => Err(self.error("expected ']'")),
        }
    }
}
