//! Reference text access.
//!
//! [`TextSource`] is how the verification core reads genomic text and turns a
//! global text position back into a sequence name and a local coordinate.
//! [`ReferenceText`] is the in-memory implementation: every sequence encoded
//! and concatenated, with per-sequence annotations searched by binary search.
//!
//! [`TextCollection`] is the read-scoped arena candidate and match text spans
//! are copied into. Spans are never freed individually; the arena is cleared
//! once the read is done.

use crate::core::dna::encode_sequence;
use std::sync::Arc;

/// Handle to a span stored in a [`TextCollection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextHandle(u32);

#[derive(Debug, Clone, Copy)]
struct TextSpan {
    begin: usize,
    length: usize,
    position: u64,
}

/// Append-only arena of text spans, cleared per read
#[derive(Debug, Default)]
pub struct TextCollection {
    buffer: Vec<u8>,
    spans: Vec<TextSpan>,
}

impl TextCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `text`, remembering the global `position` it came from
    pub fn add_text(&mut self, text: &[u8], position: u64) -> TextHandle {
        let begin = self.buffer.len();
        self.buffer.extend_from_slice(text);
        self.spans.push(TextSpan {
            begin,
            length: text.len(),
            position,
        });
        TextHandle((self.spans.len() - 1) as u32)
    }

    /// Copy `length` bases at `position` from `source` into the arena
    pub fn fetch_text(&mut self, source: &dyn TextSource, position: u64, length: u64) -> TextHandle {
        let begin = self.buffer.len();
        let fetched = source.fetch(position, length, &mut self.buffer);
        self.spans.push(TextSpan {
            begin,
            length: fetched as usize,
            position,
        });
        TextHandle((self.spans.len() - 1) as u32)
    }

    pub fn get(&self, handle: TextHandle) -> &[u8] {
        let span = self.spans[handle.0 as usize];
        &self.buffer[span.begin..span.begin + span.length]
    }

    pub fn position(&self, handle: TextHandle) -> u64 {
        self.spans[handle.0 as usize].position
    }

    pub fn num_texts(&self) -> usize {
        self.spans.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Free every span at once (capacity is kept)
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.spans.clear();
    }
}

/// Decoded coordinate of a global text position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPosition<'a> {
    pub sequence_name: &'a str,
    pub sequence_index: usize,
    pub position: u64,
}

/// Read access to the (encoded) reference
pub trait TextSource: Send + Sync {
    /// Total length of the concatenated text
    fn text_length(&self) -> u64;

    /// Append up to `length` encoded bases starting at `position` to `out`;
    /// returns how many were appended (clamped at the text end)
    fn fetch(&self, position: u64, length: u64, out: &mut Vec<u8>) -> u64;

    /// Map a global position to its sequence and local offset
    fn decode_position(&self, position: u64) -> Option<DecodedPosition<'_>>;

    /// True if `[begin, end)` lies inside a single sequence
    fn is_contained(&self, begin: u64, end: u64) -> bool {
        if end <= begin {
            return false;
        }
        match self.decode_position(begin) {
            Some(first) => self
                .decode_position(end - 1)
                .is_some_and(|d| d.sequence_index == first.sequence_index),
            None => false,
        }
    }
}

/// Per-sequence annotation
#[derive(Debug, Clone)]
pub struct SequenceAnnotation {
    pub name: String,
    /// Offset in the concatenated text
    pub offset: u64,
    pub length: u64,
}

/// In-memory reference made of named sequences
#[derive(Debug, Clone, Default)]
pub struct ReferenceText {
    annotations: Vec<SequenceAnnotation>,
    text: Arc<Vec<u8>>,
}

impl ReferenceText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, ascii sequence)` pairs
    pub fn from_sequences<'a, I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut reference = Self::new();
        for (name, seq) in sequences {
            reference.add_sequence(name, seq);
        }
        reference
    }

    /// Append one ASCII sequence
    pub fn add_sequence(&mut self, name: &str, seq: &[u8]) {
        let text = Arc::make_mut(&mut self.text);
        let offset = text.len() as u64;
        text.extend(encode_sequence(seq));
        self.annotations.push(SequenceAnnotation {
            name: name.to_string(),
            offset,
            length: seq.len() as u64,
        });
    }

    pub fn annotations(&self) -> &[SequenceAnnotation] {
        &self.annotations
    }

    /// Shared handle to the encoded text (what a device keeps resident)
    pub fn shared_text(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.text)
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }
}

impl TextSource for ReferenceText {
    fn text_length(&self) -> u64 {
        self.text.len() as u64
    }

    fn fetch(&self, position: u64, length: u64, out: &mut Vec<u8>) -> u64 {
        let begin = (position as usize).min(self.text.len());
        let end = (position.saturating_add(length) as usize).min(self.text.len());
        out.extend_from_slice(&self.text[begin..end]);
        (end - begin) as u64
    }

    fn decode_position(&self, position: u64) -> Option<DecodedPosition<'_>> {
        if position >= self.text.len() as u64 {
            return None;
        }
        // First annotation whose end is past `position`
        let idx = self
            .annotations
            .partition_point(|ann| ann.offset + ann.length <= position);
        let ann = self.annotations.get(idx)?;
        if position < ann.offset {
            return None;
        }
        Some(DecodedPosition {
            sequence_name: &ann.name,
            sequence_index: idx,
            position: position - ann.offset,
        })
    }
}
