//! Device-side encoder. Each message is written and flushed before the call returns.

use std::io::Write;

use super::{Message, ProtocolResult, HEADER_LEN, MAX_KNOWN_PAYLOAD};

pub struct Encoder<W: Write> {
    sink: W,
    frame: Vec<u8>,
    failed_writes: u64,
}

impl<W: Write> Encoder<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frame: Vec::with_capacity(HEADER_LEN + MAX_KNOWN_PAYLOAD),
            failed_writes: 0,
        }
    }

    pub fn send(&mut self, message: &Message) -> ProtocolResult<()> {
        self.frame.clear();
        message.encode_into(&mut self.frame);
        self.sink.write_all(&self.frame)?;
        self.sink.flush()?;
        Ok(())
    }

    pub fn iteration_start(&mut self) -> ProtocolResult<()> {
        self.send(&Message::IterationStart)
    }

    pub fn iteration_end(&mut self) -> ProtocolResult<()> {
        self.send(&Message::IterationEnd)
    }

    pub fn current_state(&mut self, state: u16) -> ProtocolResult<()> {
        self.send(&Message::CurrentState { state })
    }

    /// Report the check, then evaluate `condition` and return its value as is.
    ///
    /// A failed report never changes the result: the error is logged and
    /// counted in [`Encoder::failed_writes`] instead of being returned.
    pub fn will_check_condition(
        &mut self,
        transition: u16,
        condition: u16,
        evaluate: impl FnOnce() -> bool,
    ) -> bool {
        if let Err(e) = self.send(&Message::WillCheckCondition {
            transition,
            condition,
        }) {
            self.failed_writes += 1;
            log::warn!("could not report condition check: {}", e);
        }
        evaluate()
    }

    pub fn will_perform_transition(&mut self, transition: u16) -> ProtocolResult<()> {
        self.send(&Message::WillPerformTransition { transition })
    }

    pub fn will_perform_action(&mut self, transition: u16, index: u16) -> ProtocolResult<()> {
        self.send(&Message::WillPerformAction { transition, index })
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
