//! Big-endian named-tag framing, compatible with the host's binary tag format.
//!
//! Only what the surrogate records need is modelled, but every tag id the host
//! can produce is accepted so foreign payloads parse (and skip) cleanly.
//! Strings are Java modified UTF-8: NUL is `C0 80` and supplementary
//! characters are written as surrogate pairs.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum nesting of lists and compounds, root included.
pub const MAX_DEPTH: usize = 16;

pub const END: u8 = 0;
pub const BYTE: u8 = 1;
pub const SHORT: u8 = 2;
pub const INT: u8 = 3;
pub const LONG: u8 = 4;
pub const FLOAT: u8 = 5;
pub const DOUBLE: u8 = 6;
pub const BYTE_ARRAY: u8 = 7;
pub const STRING: u8 = 8;
pub const LIST: u8 = 9;
pub const COMPOUND: u8 = 10;
pub const INT_ARRAY: u8 = 11;
pub const LONG_ARRAY: u8 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NbtError {
    #[error("input ends at byte {at}, {needed} more needed")]
    Truncated { at: usize, needed: usize },
    #[error("malformed tag data at byte {at}: {reason}")]
    Malformed { at: usize, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    /// Element tag id plus items. Empty lists keep their declared id.
    List(u8, Vec<Tag>),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(_) => BYTE,
            Tag::Short(_) => SHORT,
            Tag::Int(_) => INT,
            Tag::Long(_) => LONG,
            Tag::Float(_) => FLOAT,
            Tag::Double(_) => DOUBLE,
            Tag::ByteArray(_) => BYTE_ARRAY,
            Tag::String(_) => STRING,
            Tag::List(..) => LIST,
            Tag::Compound(_) => COMPOUND,
            Tag::IntArray(_) => INT_ARRAY,
            Tag::LongArray(_) => LONG_ARRAY,
        }
    }
}

/// Compound with insertion-ordered entries, so writing is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compound {
    entries: Vec<(String, Tag)>,
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, tag: Tag) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = tag,
            None => self.entries.push((name, tag)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, tag: Tag) -> Self {
        self.insert(name, tag);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// --- Reading ---

struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    #[inline]
    fn at(&self) -> usize {
        self.total - self.buf.remaining()
    }

    fn malformed(&self, reason: impl Into<String>) -> NbtError {
        NbtError::Malformed {
            at: self.at(),
            reason: reason.into(),
        }
    }

    fn need(&self, n: usize) -> Result<(), NbtError> {
        let have = self.buf.remaining();
        if have < n {
            return Err(NbtError::Truncated {
                at: self.at(),
                needed: n - have,
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, NbtError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn i16(&mut self) -> Result<i16, NbtError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn i32(&mut self) -> Result<i32, NbtError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn i64(&mut self) -> Result<i64, NbtError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    fn len_prefix(&mut self) -> Result<usize, NbtError> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| self.malformed(format!("negative length {n}")))
    }

    /// Checks that `n` elements of `size` bytes are present before allocating.
    fn need_elems(&self, n: usize, size: usize) -> Result<(), NbtError> {
        let bytes = n
            .checked_mul(size)
            .ok_or_else(|| self.malformed("length overflows"))?;
        self.need(bytes)
    }

    fn string(&mut self) -> Result<String, NbtError> {
        self.need(2)?;
        let n = self.buf.get_u16() as usize;
        self.need(n)?;
        let s = cesu8::from_java_cesu8(&self.buf[..n])
            .map_err(|_| self.malformed("string is not valid modified UTF-8"))?
            .into_owned();
        self.buf.advance(n);
        Ok(s)
    }

    fn enter(&self, depth: usize) -> Result<usize, NbtError> {
        let next = depth + 1;
        if next > MAX_DEPTH {
            return Err(self.malformed(format!("nesting deeper than {MAX_DEPTH}")));
        }
        Ok(next)
    }

    fn payload(&mut self, id: u8, depth: usize) -> Result<Tag, NbtError> {
        Ok(match id {
            BYTE => Tag::Byte(self.u8()? as i8),
            SHORT => Tag::Short(self.i16()?),
            INT => Tag::Int(self.i32()?),
            LONG => Tag::Long(self.i64()?),
            FLOAT => Tag::Float(f32::from_bits(self.i32()? as u32)),
            DOUBLE => Tag::Double(f64::from_bits(self.i64()? as u64)),
            BYTE_ARRAY => {
                let n = self.len_prefix()?;
                self.need_elems(n, 1)?;
                let v = self.buf[..n].iter().map(|&b| b as i8).collect();
                self.buf.advance(n);
                Tag::ByteArray(v)
            }
            STRING => Tag::String(self.string()?),
            LIST => {
                let depth = self.enter(depth)?;
                let elem = self.u8()?;
                let n = self.len_prefix()?;
                if elem > LONG_ARRAY {
                    return Err(self.malformed(format!("unknown list element tag {elem}")));
                }
                if elem == END && n > 0 {
                    return Err(self.malformed("non-empty list of end tags"));
                }
                let mut items = Vec::with_capacity(n.min(self.buf.remaining()));
                for _ in 0..n {
                    items.push(self.payload(elem, depth)?);
                }
                Tag::List(elem, items)
            }
            COMPOUND => {
                let depth = self.enter(depth)?;
                Tag::Compound(self.compound(depth)?)
            }
            INT_ARRAY => {
                let n = self.len_prefix()?;
                self.need_elems(n, 4)?;
                Tag::IntArray((0..n).map(|_| self.buf.get_i32()).collect())
            }
            LONG_ARRAY => {
                let n = self.len_prefix()?;
                self.need_elems(n, 8)?;
                Tag::LongArray((0..n).map(|_| self.buf.get_i64()).collect())
            }
            other => return Err(self.malformed(format!("unknown tag id {other}"))),
        })
    }

    fn compound(&mut self, depth: usize) -> Result<Compound, NbtError> {
        let mut out = Compound::new();
        loop {
            let id = self.u8()?;
            if id == END {
                return Ok(out);
            }
            let name = self.string()?;
            if out.get(&name).is_some() {
                return Err(self.malformed(format!("duplicate entry '{name}'")));
            }
            let tag = self.payload(id, depth)?;
            out.entries.push((name, tag));
        }
    }

    fn skip(&mut self, id: u8, depth: usize) -> Result<(), NbtError> {
        let fixed = match id {
            BYTE => 1,
            SHORT => 2,
            INT | FLOAT => 4,
            LONG | DOUBLE => 8,
            BYTE_ARRAY | INT_ARRAY | LONG_ARRAY => {
                let size = match id {
                    BYTE_ARRAY => 1,
                    INT_ARRAY => 4,
                    _ => 8,
                };
                let n = self.len_prefix()?;
                self.need_elems(n, size)?;
                self.buf.advance(n * size);
                return Ok(());
            }
            STRING => {
                self.need(2)?;
                let n = self.buf.get_u16() as usize;
                self.need(n)?;
                self.buf.advance(n);
                return Ok(());
            }
            LIST => {
                let depth = self.enter(depth)?;
                let elem = self.u8()?;
                let n = self.len_prefix()?;
                if elem > LONG_ARRAY || (elem == END && n > 0) {
                    return Err(self.malformed(format!("bad list element tag {elem}")));
                }
                for _ in 0..n {
                    self.skip(elem, depth)?;
                }
                return Ok(());
            }
            COMPOUND => {
                let depth = self.enter(depth)?;
                loop {
                    let id = self.u8()?;
                    if id == END {
                        return Ok(());
                    }
                    self.skip(STRING, depth)?;
                    self.skip(id, depth)?;
                }
            }
            other => return Err(self.malformed(format!("unknown tag id {other}"))),
        };
        self.need(fixed)?;
        self.buf.advance(fixed);
        Ok(())
    }

    fn root_header(&mut self) -> Result<String, NbtError> {
        let id = self.u8()?;
        if id != COMPOUND {
            return Err(self.malformed(format!("root tag is {id}, expected a compound")));
        }
        self.string()
    }

    fn finish(&self) -> Result<(), NbtError> {
        if self.buf.has_remaining() {
            return Err(self.malformed(format!("{} trailing bytes", self.buf.remaining())));
        }
        Ok(())
    }
}

/// Parses a complete named root compound.
pub fn read_root(buf: &[u8]) -> Result<(String, Compound), NbtError> {
    let mut r = Reader::new(buf);
    let name = r.root_header()?;
    let root = r.compound(1)?;
    r.finish()?;
    Ok((name, root))
}

/// True when the root compound has a top-level compound entry called `name`.
/// Other entries are skipped without being materialised.
pub fn has_compound_entry(buf: &[u8], name: &str) -> Result<bool, NbtError> {
    let mut r = Reader::new(buf);
    r.root_header()?;
    let mut found = false;
    loop {
        let id = r.u8()?;
        if id == END {
            break;
        }
        let entry = r.string()?;
        if id == COMPOUND && entry == name {
            found = true;
        }
        r.skip(id, 1)?;
    }
    r.finish()?;
    Ok(found)
}

// --- Writing ---

/// Bytes `c` takes in modified UTF-8.
fn modified_utf8_len(c: char) -> usize {
    match c {
        '\0' => 2,
        c if c.len_utf8() == 4 => 6,
        c => c.len_utf8(),
    }
}

fn put_string(out: &mut BytesMut, s: &str) {
    let mut encoded = cesu8::to_java_cesu8(s);
    if encoded.len() > u16::MAX as usize {
        // Schema bounds keep content strings far below this; cut whole
        // characters so the prefix stays decodable.
        let mut used = 0;
        let end = s
            .char_indices()
            .find_map(|(i, c)| {
                used += modified_utf8_len(c);
                (used > u16::MAX as usize).then_some(i)
            })
            .unwrap_or(s.len());
        encoded = cesu8::to_java_cesu8(&s[..end]);
        log::warn!("tag string truncated from {} to {} bytes", s.len(), end);
    }
    out.put_u16(encoded.len() as u16);
    out.put_slice(&encoded);
}

fn put_payload(out: &mut BytesMut, tag: &Tag) {
    match tag {
        Tag::Byte(v) => out.put_i8(*v),
        Tag::Short(v) => out.put_i16(*v),
        Tag::Int(v) => out.put_i32(*v),
        Tag::Long(v) => out.put_i64(*v),
        Tag::Float(v) => out.put_f32(*v),
        Tag::Double(v) => out.put_f64(*v),
        Tag::ByteArray(v) => {
            out.put_i32(v.len() as i32);
            for b in v {
                out.put_i8(*b);
            }
        }
        Tag::String(s) => put_string(out, s),
        Tag::List(elem, items) => {
            out.put_u8(*elem);
            out.put_i32(items.len() as i32);
            for item in items {
                put_payload(out, item);
            }
        }
        Tag::Compound(c) => put_compound(out, c),
        Tag::IntArray(v) => {
            out.put_i32(v.len() as i32);
            for x in v {
                out.put_i32(*x);
            }
        }
        Tag::LongArray(v) => {
            out.put_i32(v.len() as i32);
            for x in v {
                out.put_i64(*x);
            }
        }
    }
}

fn put_compound(out: &mut BytesMut, c: &Compound) {
    for (name, tag) in &c.entries {
        out.put_u8(tag.id());
        put_string(out, name);
        put_payload(out, tag);
    }
    out.put_u8(END);
}

pub fn write_root(name: &str, root: &Compound) -> Bytes {
    let mut out = BytesMut::with_capacity(64);
    out.put_u8(COMPOUND);
    put_string(&mut out, name);
    put_compound(&mut out, root);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Compound {
        Compound::new()
            .with("id", Tag::String("minecraft:note_block".into()))
            .with("f", Tag::Float(1.5))
            .with("longs", Tag::LongArray(vec![1, -2]))
            .with("empty", Tag::List(STRING, Vec::new()))
            .with(
                "nested",
                Tag::Compound(Compound::new().with("b", Tag::ByteArray(vec![1, 2, -3]))),
            )
    }

    #[test]
    fn write_then_read_preserves_order_and_types() {
        let bytes = write_root("", &sample());
        let (name, back) = read_root(&bytes).unwrap();
        assert_eq!(name, "");
        assert_eq!(back, sample());
        let names: Vec<&str> = back.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["id", "f", "longs", "empty", "nested"]);
        assert_eq!(write_root("", &back), bytes);
    }

    #[test]
    fn strings_use_modified_utf8() {
        let root = Compound::new().with("t", Tag::String("a\u{0}\u{1F600}".into()));
        let bytes = write_root("", &root);
        assert_eq!(
            &bytes[..],
            [
                0x0A, 0x00, 0x00, // root compound, empty name
                0x08, 0x00, 0x01, b't', // string entry "t"
                0x00, 0x09, b'a', 0xC0, 0x80, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80, //
                0x00,
            ]
        );
        assert_eq!(read_root(&bytes).unwrap().1, root);

        // a lone surrogate half is not a character
        let lone = [0x0A, 0x00, 0x00, 0x08, 0x00, 0x01, b't', 0x00, 0x03, 0xED, 0xA0, 0xBD, 0x00];
        assert!(matches!(read_root(&lone), Err(NbtError::Malformed { .. })));
    }

    #[test]
    fn overlong_strings_are_cut_on_a_character_boundary() {
        let long = "\u{1F600}".repeat(11_000);
        let bytes = write_root("", &Compound::new().with("t", Tag::String(long)));
        let (_, back) = read_root(&bytes).unwrap();
        let Some(Tag::String(s)) = back.get("t") else {
            panic!("string entry missing");
        };
        assert_eq!(s.chars().count(), 10_922);
        assert!(s.chars().all(|c| c == '\u{1F600}'));
    }

    #[test]
    fn every_truncation_is_reported_as_truncated() {
        let bytes = write_root("", &sample());
        for cut in 0..bytes.len() {
            let err = read_root(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, NbtError::Truncated { .. }), "cut {cut}: {err:?}");
        }
    }

    #[test]
    fn rejects_unknown_ids_trailing_bytes_and_deep_nesting() {
        let mut bad = write_root("", &Compound::new().with("x", Tag::Byte(1))).to_vec();
        bad[3] = 42;
        assert!(matches!(read_root(&bad), Err(NbtError::Malformed { .. })));

        let mut trailing = write_root("", &Compound::new()).to_vec();
        trailing.push(0);
        assert!(matches!(read_root(&trailing), Err(NbtError::Malformed { .. })));

        let mut deep = Tag::Int(0);
        for _ in 0..MAX_DEPTH {
            deep = Tag::Compound(Compound::new().with("d", deep));
        }
        let bytes = write_root("", &Compound::new().with("d", deep));
        assert!(matches!(read_root(&bytes), Err(NbtError::Malformed { .. })));
        assert!(has_compound_entry(&bytes, "d").is_err());
    }

    #[test]
    fn marker_detection_skips_other_entries() {
        let with = write_root("", &sample().with("craft", Tag::Compound(Compound::new())));
        assert!(has_compound_entry(&with, "craft").unwrap());
        assert!(!has_compound_entry(&write_root("", &sample()), "craft").unwrap());
        // a non-compound entry with the marker name does not count
        let shadow = write_root("", &Compound::new().with("craft", Tag::Int(1)));
        assert!(!has_compound_entry(&shadow, "craft").unwrap());
    }
}
