//! Live Trace
//! Turns the device's byte stream into execution events about graph entities.

use std::io::{self, Read};

use crate::fsm::{ConditionId, StateId, TransitionId};
use crate::protocol::{Decoded, DecoderConfig, DecoderStats, FrameDecoder, Message, StalePolicy};
use crate::symbols::{SharedSymbolTable, SymbolTable};


/// A trace message with its ids resolved against the symbol table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    IterationStart,
    IterationEnd,
    CurrentState(StateId),
    WillCheckCondition {
        transition: TransitionId,
        condition: ConditionId,
    },
    WillPerformTransition(TransitionId),
    WillPerformAction {
        transition: TransitionId,
        index: u16,
    },
    /// The message named an id this session cannot resolve, usually because
    /// the firmware predates the latest regeneration
    UnresolvedSymbol { message: Message, id: u16 },
    /// Serial output of the program itself, found between frames
    UnframedBytes(Vec<u8>),
}

/// Receives trace events. Every callback defaults to doing nothing.
pub trait TraceObserver {
    fn iteration_started(&mut self) {}

    fn iteration_ended(&mut self) {}

    fn current_state(&mut self, _state: StateId) {}

    fn will_check_condition(&mut self, _transition: TransitionId, _condition: ConditionId) {}

    fn will_perform_transition(&mut self, _transition: TransitionId) {}

    fn will_perform_action(&mut self, _transition: TransitionId, _index: u16) {}

    fn unresolved_symbol(&mut self, _message: &Message, _id: u16) {}

    fn unframed_bytes(&mut self, _bytes: &[u8]) {}
}

impl TraceObserver for Vec<TraceEvent> {
    fn iteration_started(&mut self) {
        self.push(TraceEvent::IterationStart);
    }

    fn iteration_ended(&mut self) {
        self.push(TraceEvent::IterationEnd);
    }

    fn current_state(&mut self, state: StateId) {
        self.push(TraceEvent::CurrentState(state));
    }

    fn will_check_condition(&mut self, transition: TransitionId, condition: ConditionId) {
        self.push(TraceEvent::WillCheckCondition {
            transition,
            condition,
        });
    }

    fn will_perform_transition(&mut self, transition: TransitionId) {
        self.push(TraceEvent::WillPerformTransition(transition));
    }

    fn will_perform_action(&mut self, transition: TransitionId, index: u16) {
        self.push(TraceEvent::WillPerformAction { transition, index });
    }

    fn unresolved_symbol(&mut self, message: &Message, id: u16) {
        self.push(TraceEvent::UnresolvedSymbol {
            message: *message,
            id,
        });
    }

    fn unframed_bytes(&mut self, bytes: &[u8]) {
        self.push(TraceEvent::UnframedBytes(bytes.to_vec()));
    }
}

impl TraceEvent {
    /// Resolve the ids of `message`. On failure returns the first id that did not resolve.
    pub fn resolve(message: &Message, symbols: &SymbolTable) -> Result<TraceEvent, u16> {
        let state = |id| symbols.state_for(id).ok_or(id);
        let transition = |id| symbols.transition_for(id).ok_or(id);
        let condition = |id| symbols.condition_for(id).ok_or(id);

        Ok(match *message {
            Message::IterationStart => TraceEvent::IterationStart,
            Message::IterationEnd => TraceEvent::IterationEnd,
            Message::CurrentState { state: id } => TraceEvent::CurrentState(state(id)?),
            Message::WillCheckCondition {
                transition: t,
                condition: c,
            } => TraceEvent::WillCheckCondition {
                transition: transition(t)?,
                condition: condition(c)?,
            },
            Message::WillPerformTransition { transition: t } => {
                TraceEvent::WillPerformTransition(transition(t)?)
            }
            Message::WillPerformAction {
                transition: t,
                index,
            } => TraceEvent::WillPerformAction {
                transition: transition(t)?,
                index,
            },
        })
    }

    /// Deliver this event to the matching observer callback
    pub fn dispatch(&self, observer: &mut impl TraceObserver) {
        match self {
            TraceEvent::IterationStart => observer.iteration_started(),
            TraceEvent::IterationEnd => observer.iteration_ended(),
            TraceEvent::CurrentState(state) => observer.current_state(*state),
            TraceEvent::WillCheckCondition {
                transition,
                condition,
            } => observer.will_check_condition(*transition, *condition),
            TraceEvent::WillPerformTransition(transition) => {
                observer.will_perform_transition(*transition)
            }
            TraceEvent::WillPerformAction { transition, index } => {
                observer.will_perform_action(*transition, *index)
            }
            TraceEvent::UnresolvedSymbol { message, id } => {
                observer.unresolved_symbol(message, *id)
            }
            TraceEvent::UnframedBytes(bytes) => observer.unframed_bytes(bytes),
        }
    }
}

/// Framing plus symbol resolution for one device connection
pub struct TraceDecoder {
    frames: FrameDecoder,
    symbols: SharedSymbolTable,
    stale_symbols: StalePolicy,
    unresolved: u64,
}

impl TraceDecoder {
    pub fn new(symbols: SharedSymbolTable, config: DecoderConfig) -> Self {
        let stale_symbols = config.stale_symbols;
        Self {
            frames: FrameDecoder::new(config),
            symbols,
            stale_symbols,
            unresolved: 0,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.frames.stats()
    }

    /// Number of messages whose ids did not resolve
    pub fn unresolved(&self) -> u64 {
        self.unresolved
    }

    /// Feed bytes as they arrive and dispatch every completed event, in order
    pub fn push(&mut self, bytes: &[u8], observer: &mut impl TraceObserver) {
        for decoded in self.frames.push(bytes) {
            match decoded {
                Decoded::Message(message) => self.dispatch_message(&message, observer),
                Decoded::Unframed(bytes) => observer.unframed_bytes(&bytes),
            }
        }
    }

    fn dispatch_message(&mut self, message: &Message, observer: &mut impl TraceObserver) {
        // Hold the read lock only while resolving, never across observer callbacks
        let resolved = TraceEvent::resolve(message, &self.symbols.read());
        match resolved {
            Ok(event) => event.dispatch(observer),
            Err(id) => {
                self.unresolved += 1;
                log::warn!("unknown symbol {} in {:?}", id, message);
                if self.stale_symbols == StalePolicy::Report {
                    observer.unresolved_symbol(message, id);
                }
            }
        }
    }

    /// The transport went away: forget any partially received frame
    pub fn disconnect(&mut self) {
        let dropped = self.frames.reset();
        log::debug!("trace connection closed, {} partial bytes dropped", dropped);
    }

    /// Read `source` until end of stream, dispatching as bytes arrive
    pub fn pump<R: Read>(
        &mut self,
        source: &mut R,
        observer: &mut impl TraceObserver,
    ) -> io::Result<()> {
        let mut chunk = [0u8; 256];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.push(&chunk[..n], observer),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(e);
                }
            }
        }
        self.disconnect();
        Ok(())
    }
}
