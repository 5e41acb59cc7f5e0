//! Hierarchical store keys.
//!
//! A [`Path`] is an ordered sequence of opaque [`Value`] segments. The empty
//! path denotes the root of the store. Paths parse from `/`-delimited strings
//! (optionally percent-encoded, so a segment may contain `/`) and render to
//! URL path suffixes with each segment percent-encoded, such that encoding
//! and decoding round-trip arbitrary segment bytes exactly.

use std::fmt;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CanopyError, Result};
use crate::types::Value;

/// Path delimiter on the wire and in display form.
pub const DELIM: char = '/';

// Unreserved characters pass through; everything else is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// An ordered sequence of opaque segments addressing a key in the store.
///
/// # Examples
///
/// ```
/// use canopy_client::Path;
///
/// let path = Path::parse("/a/b");
/// assert_eq!(path.segments().len(), 2);
/// assert_eq!(path.url_path(), "/a/b");
///
/// let root = Path::new();
/// assert!(root.is_root());
/// assert_eq!(root.url_path(), "");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Value>);

impl Path {
    /// The root path (no segments).
    pub fn new() -> Self {
        Path(Vec::new())
    }

    /// Build a path from pre-split segments.
    pub fn from_segments(segments: Vec<Value>) -> Self {
        Path(segments)
    }

    /// Parse a `/`-delimited path string. Segments are taken verbatim; no
    /// escape processing is applied.
    pub fn parse(p: &str) -> Self {
        let trimmed = p.trim_matches(&[' ', DELIM][..]);
        if trimmed.is_empty() {
            return Path::new();
        }
        Path(trimmed.split(DELIM).map(Value::from).collect())
    }

    /// Parse a `/`-delimited path string whose segments may be
    /// percent-encoded (`%2F` escapes a literal `/` inside a segment name;
    /// `+` decodes to a space).
    pub fn parse_encoded(p: &str) -> Result<Self> {
        let trimmed = p.trim_matches(&[' ', DELIM][..]);
        if trimmed.is_empty() {
            return Ok(Path::new());
        }
        let mut segments = Vec::new();
        for seg in trimmed.split(DELIM) {
            segments.push(Value::from(unescape_segment(seg)?));
        }
        Ok(Path(segments))
    }

    /// The path's segments in order.
    pub fn segments(&self) -> &[Value] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the path has no segments (same as [`Path::is_root`]).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment.
    pub fn push(&mut self, segment: impl Into<Value>) {
        self.0.push(segment.into());
    }

    /// Return a new path with one more segment.
    pub fn child(&self, segment: impl Into<Value>) -> Self {
        let mut p = self.clone();
        p.push(segment);
        p
    }

    /// Render the path as a URL suffix: `/seg1/seg2` with each segment
    /// percent-encoded, or the empty string for the root.
    pub fn url_path(&self) -> String {
        let mut out = String::new();
        for seg in &self.0 {
            out.push(DELIM);
            out.push_str(&escape_segment(seg.as_bytes()));
        }
        out
    }
}

/// Percent-encode one path segment.
pub(crate) fn escape_segment(bytes: &[u8]) -> String {
    percent_encode(bytes, SEGMENT).to_string()
}

/// Decode one percent-encoded path segment back to raw bytes.
fn unescape_segment(seg: &str) -> Result<Vec<u8>> {
    let raw = seg.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let hi = raw.get(i + 1).and_then(|b| (*b as char).to_digit(16));
                let lo = raw.get(i + 2).and_then(|b| (*b as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        return Err(CanopyError::PathEncoding(format!(
                            "bad percent-escape in segment {seg:?}"
                        )))
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            write!(f, "{}{}", DELIM, seg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl FromIterator<Value> for Path {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for seg in &self.0 {
            seq.serialize_element(seg)?;
        }
        seq.end()
    }
}

struct PathVisitor;

impl<'de> Visitor<'de> for PathVisitor {
    type Value = Path;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a path string or an array of segments")
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Path, E> {
        Path::parse_encoded(s).map_err(de::Error::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Path, A::Error> {
        let mut segments = Vec::new();
        while let Some(seg) = seq.next_element::<Value>()? {
            segments.push(seg);
        }
        Ok(Path(segments))
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Path, D::Error> {
        deserializer.deserialize_any(PathVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delimited_string() {
        let p = Path::parse("/a/b/c");
        assert_eq!(p.len(), 3);
        assert_eq!(p.segments()[1].as_bytes(), b"b");
    }

    #[test]
    fn trims_surrounding_delimiters_and_spaces() {
        assert_eq!(Path::parse(" /a/b/ "), Path::parse("a/b"));
    }

    #[test]
    fn empty_string_is_root() {
        assert!(Path::parse("").is_root());
        assert!(Path::parse(" / ").is_root());
        assert_eq!(Path::parse("").url_path(), "");
    }

    #[test]
    fn encoded_parse_unescapes_segments() {
        let p = Path::parse_encoded("/a%2Fb/c+d").unwrap();
        assert_eq!(p.segments()[0].as_bytes(), b"a/b");
        assert_eq!(p.segments()[1].as_bytes(), b"c d");
    }

    #[test]
    fn encoded_parse_rejects_bad_escape() {
        assert!(Path::parse_encoded("/a%zz").is_err());
        assert!(Path::parse_encoded("/a%2").is_err());
    }

    #[test]
    fn url_path_escapes_segments() {
        let mut p = Path::new();
        p.push("a/b");
        p.push("c d");
        assert_eq!(p.url_path(), "/a%2Fb/c%20d");
    }

    #[test]
    fn url_round_trips_arbitrary_bytes() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let escaped = escape_segment(&bytes);
        let back = unescape_segment(&escaped).unwrap();
        assert_eq!(back, bytes);
    }

    #[test]
    fn decodes_from_json_array() {
        let p: Path = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(p, Path::parse("/a/b"));
    }

    #[test]
    fn decodes_from_json_string() {
        let p: Path = serde_json::from_str(r#""/a/b""#).unwrap();
        assert_eq!(p, Path::parse("/a/b"));
    }

    #[test]
    fn encodes_as_segment_array() {
        let json = serde_json::to_string(&Path::parse("/a/b")).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }

    #[test]
    fn display_joins_with_delimiter() {
        assert_eq!(Path::parse("a/b").to_string(), "/a/b");
    }
}
