//! The framing state machine: recognizes the ASDF header lines, locates the
//! YAML tree, catalogs binary blocks, and (optionally) the trailing block
//! index.

use bitflags::bitflags;

use crate::block::{read_block_header, BLOCK_MAGIC};
use crate::context::Context;
use crate::error::FramingError;
use crate::event::{Event, EventKind};
use crate::log::LogLevel;
use crate::stream::{Mark, Stream};

bitflags! {
    /// Options controlling what the framing parser emits while walking
    /// the YAML tree region. Orthogonal: either, both, or neither may be
    /// set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParserOptions: u32 {
        /// Emit one [`EventKind::Yaml`] event per underlying YAML token
        /// while walking the tree, instead of a single opaque span.
        const EMIT_YAML_EVENTS = 0b01;
        /// Capture the tree's raw bytes into the `buffer` field of the
        /// [`EventKind::TreeEnd`] event, so the caller can parse it into a
        /// full document without re-reading the stream.
        const BUFFER_TREE = 0b10;
    }
}

const ASDF_VERSION_PREFIX: &str = "#ASDF ";
const ASDF_STANDARD_PREFIX: &str = "#ASDF_STANDARD ";
const YAML_DIRECTIVE_PREFIX: &str = "%YAML ";
const BLOCK_INDEX_MARKER: &str = "#ASDF BLOCK INDEX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Comments,
    YamlDirective,
    InTree,
    AfterTree,
    Done,
    Errored,
}

/// Drives a [`Stream`] through the ASDF framing grammar, producing
/// [`Event`]s one at a time.
pub struct FramingParser {
    stream: Box<dyn Stream>,
    options: ParserOptions,
    state: State,
    tree_start: u64,
}

impl FramingParser {
    pub fn new(stream: Box<dyn Stream>, options: ParserOptions) -> FramingParser {
        FramingParser {
            stream,
            options,
            state: State::Initial,
            tree_start: 0,
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            offset: self.stream.tell(),
            line: 0,
            column: 0,
        }
    }

    fn line_str(&mut self, ctx: &Context) -> Result<String, FramingError> {
        let raw = self.stream.readline().map_err(FramingError::from)?;
        String::from_utf8(raw).map_err(|e| {
            let msg = format!("header line is not valid UTF-8: {e}");
            ctx.log(LogLevel::Error, &msg);
            FramingError::InvalidHeader { mark: self.mark() }
        })
    }

    /// Produce the next event, or `Ok(EventKind::End)` once parsing has
    /// finished. Once an error has been reported, every subsequent call
    /// returns `End` without reporting again.
    pub fn next_event(&mut self, ctx: &Context) -> Result<Event, FramingError> {
        if self.state == State::Errored {
            return Ok(Event::new(EventKind::End, self.mark()));
        }
        match self.step(ctx) {
            Ok(event) => Ok(event),
            Err(err) => {
                ctx.set_error(&err);
                self.state = State::Errored;
                Err(err)
            }
        }
    }

    fn step(&mut self, ctx: &Context) -> Result<Event, FramingError> {
        match self.state {
            State::Initial => {
                let mark = self.mark();
                let line = self.line_str(ctx)?;
                let version = line.strip_prefix(ASDF_VERSION_PREFIX).ok_or(FramingError::InvalidHeader { mark })?;
                self.state = State::Comments;
                Ok(Event::new(EventKind::AsdfVersion(version.to_string()), mark))
            }
            State::Comments => {
                let mark = self.mark();
                if self.stream.peek(1)?.is_empty() {
                    self.state = State::Done;
                    return Ok(Event::new(EventKind::End, mark));
                }
                let line = self.line_str(ctx)?;
                if let Some(version) = line.strip_prefix(ASDF_STANDARD_PREFIX) {
                    self.state = State::Comments;
                    // Only the first line in this state is the standard
                    // version; subsequent ones (if any) are comments. We
                    // distinguish by remembering we've seen it via a
                    // transition to YamlDirective-seeking comments state,
                    // encoded by immediately trying the next line for
                    // `%YAML` on the following call.
                    self.state = State::YamlDirective;
                    return Ok(Event::new(EventKind::StandardVersion(version.to_string()), mark));
                }
                if let Some(rest) = line.strip_prefix(YAML_DIRECTIVE_PREFIX) {
                    if rest.trim() != "1.1" {
                        ctx.log(LogLevel::Warn, format!("unrecognized YAML directive version {rest:?}"));
                    }
                    self.tree_start = mark.offset;
                    self.state = State::InTree;
                    if self.options.contains(ParserOptions::BUFFER_TREE) {
                        self.stream.start_capture();
                    }
                    return Ok(Event::new(EventKind::TreeStart { offset: mark.offset }, mark));
                }
                if let Some(text) = line.strip_prefix('#') {
                    return Ok(Event::new(EventKind::Comment(text.trim().to_string()), mark));
                }
                Err(FramingError::InvalidHeader { mark })
            }
            State::YamlDirective => {
                let mark = self.mark();
                if self.stream.peek(1)?.is_empty() {
                    self.state = State::Done;
                    return Ok(Event::new(EventKind::End, mark));
                }
                let line = self.line_str(ctx)?;
                if let Some(rest) = line.strip_prefix(YAML_DIRECTIVE_PREFIX) {
                    if rest.trim() != "1.1" {
                        ctx.log(LogLevel::Warn, format!("unrecognized YAML directive version {rest:?}"));
                    }
                    self.tree_start = mark.offset;
                    self.state = State::InTree;
                    if self.options.contains(ParserOptions::BUFFER_TREE) {
                        self.stream.start_capture();
                    }
                    return Ok(Event::new(EventKind::TreeStart { offset: mark.offset }, mark));
                }
                if let Some(text) = line.strip_prefix('#') {
                    return Ok(Event::new(EventKind::Comment(text.trim().to_string()), mark));
                }
                Err(FramingError::InvalidHeader { mark })
            }
            State::InTree => {
                // Skip ahead to whichever comes first: block magic, the
                // block index marker, or end of input. The tree bytes (if
                // buffering) are captured as a side effect of `scan`.
                let tokens: [&[u8]; 2] = [&BLOCK_MAGIC, BLOCK_INDEX_MARKER.as_bytes()];
                let which = self.stream.scan(&tokens).map_err(FramingError::from)?;
                let end = self.stream.tell();
                let buffer = if self.options.contains(ParserOptions::BUFFER_TREE) {
                    Some(self.stream.take_capture())
                } else {
                    None
                };
                self.state = State::AfterTree;
                let _ = which; // consumed by the next step via re-scan at the current position
                Ok(Event::new(
                    EventKind::TreeEnd {
                        start: self.tree_start,
                        end,
                        buffer,
                    },
                    self.mark(),
                ))
            }
            State::AfterTree | State::Done => {
                let start = self.stream.tell();
                let window = self.stream.peek(BLOCK_MAGIC.len())?;
                if window.is_empty() {
                    self.state = State::Done;
                    return Ok(Event::new(EventKind::End, self.mark()));
                }
                if window.starts_with(&BLOCK_MAGIC) {
                    let descriptor = read_block_header(&mut *self.stream)?;
                    self.stream.seek(descriptor.header.allocated_size + descriptor.data_pos)?;
                    self.state = State::AfterTree;
                    return Ok(Event::new(EventKind::Block(descriptor), self.mark()));
                }
                let marker = BLOCK_INDEX_MARKER.as_bytes();
                if window.starts_with(marker) {
                    let offsets = self.parse_block_index(ctx)?;
                    self.state = State::Done;
                    return Ok(Event::new(EventKind::BlockIndex(offsets), self.mark()));
                }
                // Unrecognized bytes: treat as padding up to the next
                // occurrence of block magic, the index marker, or EOF.
                let tokens: [&[u8]; 2] = [&BLOCK_MAGIC, marker];
                self.stream.scan(&tokens)?;
                let len = self.stream.tell() - start;
                if len == 0 {
                    // `scan` made no progress (e.g. a truncated magic
                    // candidate); avoid spinning.
                    self.stream.consume(1.min(self.stream.peek(1)?.len()))?;
                }
                Ok(Event::new(EventKind::Padding { start, len: len.max(1) }, self.mark()))
            }
            State::Errored => unreachable!(),
        }
    }

    fn parse_block_index(&mut self, ctx: &Context) -> Result<Vec<u64>, FramingError> {
        // `#ASDF BLOCK INDEX` header line, followed by a `%YAML 1.1`
        // directive and a YAML document containing a flat sequence of
        // integer offsets. We parse it with the same scalar grammar used
        // by the typed value layer rather than pulling in a second copy
        // of the tree machinery.
        let _ = self.line_str(ctx)?; // consumes the marker line itself
        let directive = self.line_str(ctx)?;
        if !directive.starts_with(YAML_DIRECTIVE_PREFIX) {
            return Err(FramingError::InvalidHeader { mark: self.mark() });
        }
        let mut offsets = Vec::new();
        loop {
            let window = self.stream.peek(1)?;
            if window.is_empty() {
                break;
            }
            let line = self.line_str(ctx)?;
            let trimmed = line.trim();
            if trimmed == "---" || trimmed.is_empty() {
                continue;
            }
            if trimmed == "..." {
                break;
            }
            if let Some(value) = trimmed.strip_prefix("- ") {
                let value = value.trim();
                match value.parse::<u64>() {
                    Ok(n) => offsets.push(n),
                    Err(_) => {
                        ctx.log(LogLevel::Warn, format!("ignoring malformed block index entry {value:?}"));
                    }
                }
            }
        }
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn parser(bytes: &[u8]) -> FramingParser {
        FramingParser::new(
            Box::new(MemoryStream::new(bytes.to_vec())),
            ParserOptions::BUFFER_TREE,
        )
    }

    #[test]
    fn minimal_header_only_file() {
        let ctx = Context::new();
        let mut p = parser(b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n");
        let e1 = p.next_event(&ctx).unwrap();
        assert!(matches!(e1.kind, EventKind::AsdfVersion(ref v) if v == "1.0.0"));
        let e2 = p.next_event(&ctx).unwrap();
        assert!(matches!(e2.kind, EventKind::StandardVersion(ref v) if v == "1.6.0"));
    }

    #[test]
    fn comment_before_yaml_directive() {
        let ctx = Context::new();
        let mut p = parser(b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n#NONSTANDARD HEADER COMMENT\n%YAML 1.1\n--- {}\n...\n");
        p.next_event(&ctx).unwrap();
        p.next_event(&ctx).unwrap();
        let e3 = p.next_event(&ctx).unwrap();
        assert!(matches!(e3.kind, EventKind::Comment(ref c) if c == "NONSTANDARD HEADER COMMENT"));
        let e4 = p.next_event(&ctx).unwrap();
        assert!(matches!(e4.kind, EventKind::TreeStart { .. }));
    }
}
