//! Host-side streaming frame decoder.
//!
//! Bytes may arrive in any chunking. The decoder scans for the start sequence
//! with a sliding window, reads the header, then commits to reading exactly
//! `length` payload bytes. A header is only committed when its type is known
//! and its length is plausible; otherwise its first byte is dropped and the
//! rest is scanned again. Once a payload is committed there is no backtracking.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::{Message, MessageType, HEADER_LEN, START_SEQUENCE};

/// What to do with an id the symbol table cannot resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Dispatch an unresolved-symbol event
    #[default]
    Report,
    /// Drop the message after logging it
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Headers announcing a longer payload are treated as misaligned noise
    pub max_payload_len: u16,
    pub stale_symbols: StalePolicy,
    /// Surface bytes found outside frames (the program's own serial output)
    pub forward_unframed: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_payload_len: 64,
            stale_symbols: StalePolicy::Report,
            forward_unframed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    pub frames: u64,
    pub discarded_bytes: u64,
    pub rejected_headers: u64,
    pub malformed_frames: u64,
}

/// Output of [`FrameDecoder::push`], in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(Message),
    /// Bytes skipped while scanning, only produced with `forward_unframed`
    Unframed(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    ScanningForStart,
    ReadingHeader,
    ReadingPayload { message_type: MessageType, len: usize },
}

pub struct FrameDecoder {
    config: DecoderConfig,
    state: DecodeState,
    /// Start sequence and header bytes of the frame being read
    window: Vec<u8>,
    payload: Vec<u8>,
    unframed: Vec<u8>,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecodeState::ScanningForStart,
            window: Vec::with_capacity(HEADER_LEN),
            payload: Vec::new(),
            unframed: Vec::new(),
            stats: DecoderStats::default(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Whether a frame has been started but not finished
    pub fn in_frame(&self) -> bool {
        !self.window.is_empty()
    }

    /// Ingest new bytes and return every complete message found
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        let mut out = Vec::new();
        let mut pending: VecDeque<u8> = bytes.iter().copied().collect();
        while let Some(byte) = pending.pop_front() {
            self.feed(byte, &mut pending, &mut out);
        }
        self.flush_unframed(&mut out);
        out
    }

    /// Drop any partial frame, e.g. after the transport disconnected.
    /// Returns the number of bytes thrown away.
    pub fn reset(&mut self) -> usize {
        let dropped = self.window.len() + self.payload.len() + self.unframed.len();
        if dropped > 0 {
            log::debug!("discarding {} bytes of partial frame state", dropped);
        }
        self.window.clear();
        self.payload.clear();
        self.unframed.clear();
        self.state = DecodeState::ScanningForStart;
        dropped
    }

    fn feed(&mut self, byte: u8, pending: &mut VecDeque<u8>, out: &mut Vec<Decoded>) {
        match self.state {
            DecodeState::ScanningForStart => {
                self.window.push(byte);
                while !START_SEQUENCE.starts_with(&self.window) {
                    let dropped = self.window.remove(0);
                    self.discard(dropped);
                }
                if self.window.len() == START_SEQUENCE.len() {
                    self.flush_unframed(out);
                    self.state = DecodeState::ReadingHeader;
                }
            }
            DecodeState::ReadingHeader => {
                self.window.push(byte);
                if self.window.len() == HEADER_LEN {
                    self.commit_header(pending, out);
                }
            }
            DecodeState::ReadingPayload { message_type, len } => {
                self.payload.push(byte);
                if self.payload.len() == len {
                    self.finish_frame(message_type, out);
                }
            }
        }
    }

    fn commit_header(&mut self, pending: &mut VecDeque<u8>, out: &mut Vec<Decoded>) {
        let type_byte = self.window[START_SEQUENCE.len()];
        let len = u16::from_be_bytes([self.window[HEADER_LEN - 2], self.window[HEADER_LEN - 1]]);

        match MessageType::try_from(type_byte) {
            Ok(message_type) if len <= self.config.max_payload_len => {
                if len == 0 {
                    self.finish_frame(message_type, out);
                } else {
                    self.state = DecodeState::ReadingPayload {
                        message_type,
                        len: usize::from(len),
                    };
                }
            }
            _ => {
                self.stats.rejected_headers += 1;
                log::warn!(
                    "rejecting frame header (type {}, length {}), resynchronising",
                    type_byte,
                    len
                );
                // Drop the first start byte and scan the rest again
                let replay: Vec<u8> = self.window.drain(1..).collect();
                let dropped = self.window.remove(0);
                self.discard(dropped);
                for byte in replay.into_iter().rev() {
                    pending.push_front(byte);
                }
                self.state = DecodeState::ScanningForStart;
            }
        }
    }

    fn finish_frame(&mut self, message_type: MessageType, out: &mut Vec<Decoded>) {
        match Message::decode(message_type, &self.payload) {
            Ok(message) => {
                self.stats.frames += 1;
                out.push(Decoded::Message(message));
            }
            Err(e) => {
                self.stats.malformed_frames += 1;
                log::warn!("dropping malformed frame: {}", e);
            }
        }
        self.window.clear();
        self.payload.clear();
        self.state = DecodeState::ScanningForStart;
    }

    fn discard(&mut self, byte: u8) {
        self.stats.discarded_bytes += 1;
        log::trace!("discarding byte {:#04x} while scanning", byte);
        if self.config.forward_unframed {
            self.unframed.push(byte);
        }
    }

    fn flush_unframed(&mut self, out: &mut Vec<Decoded>) {
        if !self.unframed.is_empty() {
            out.push(Decoded::Unframed(std::mem::take(&mut self.unframed)));
        }
    }
}
