//! statewire - state machine firmware generator
//! Edit-preserving code templates for graph-edited state machines, plus the
//! framed binary trace protocol the generated firmware reports over.

pub mod codegen;
pub mod config;
pub mod document;
pub mod fsm;
pub mod parser;
pub mod protocol;
pub mod reconcile;
pub mod symbols;
pub mod template;
pub mod trace;

pub use codegen::{generate_code, messaging_header, GeneratorOptions, Key};
pub use config::Settings;
pub use document::Document;
pub use fsm::*;
pub use parser::{parse_graph_source, parse_graphs};
pub use protocol::{DecoderConfig, Encoder, FrameDecoder, Message, MessageType};
pub use reconcile::{RangePolicy, Reconciler};
pub use symbols::{SharedSymbolTable, SymbolTable};
pub use template::TemplateBuffer;
pub use trace::{TraceDecoder, TraceEvent, TraceObserver};
