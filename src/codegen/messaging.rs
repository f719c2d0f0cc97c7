//! Device-side trace encoder, rendered as a C header for the generated firmware.

use crate::protocol::{MessageType, START_SEQUENCE};

/// Source of the header included by logging builds.
///
/// `sendMessageWillCheckCondition` returns true so it can lead an `&&` chain
/// in front of the condition without changing its value.
pub fn messaging_header() -> String {
    let start: Vec<String> = START_SEQUENCE.iter().map(|b| b.to_string()).collect();
    let mut out = String::new();

    out.push_str("// Trace messaging for state machines generated by statewire\n");
    out.push_str("#include \"Arduino.h\"\n\n");
    out.push_str(&format!(
        "static const int kMessageStartSequenceLength = {};\n",
        START_SEQUENCE.len()
    ));
    out.push_str(&format!(
        "static const byte kMessageStartSequence[] = {{ {} }};\n\n",
        start.join(", ")
    ));

    out.push_str("typedef enum {\n\tkMessageNone = 0");
    for message_type in MessageType::ALL {
        out.push_str(&format!(
            ",\n\tkMessage{} = {}",
            message_type.name(),
            message_type as u8
        ));
    }
    out.push_str("\n} MessageType;\n\n");

    out.push_str(
        "void setupMessaging() {\n\
         \tSerial.begin(9600);\n\
         }\n\n\
         void writeUInt16(uint16_t value) {\n\
         \tSerial.write((value >> 8) & 255);\n\
         \tSerial.write(value & 255);\n\
         }\n\n\
         void writeMessageHeader(MessageType type, uint16_t length) {\n\
         \tSerial.write(kMessageStartSequence, kMessageStartSequenceLength);\n\
         \tSerial.write((uint8_t)type);\n\
         \twriteUInt16(length);\n\
         }\n\n\
         void endMessage() {\n\
         \tSerial.flush();\n\
         }\n",
    );

    for message_type in MessageType::ALL {
        out.push('\n');
        out.push_str(&message_function(message_type));
    }
    out
}

fn message_function(message_type: MessageType) -> String {
    let params: &[&str] = match message_type {
        MessageType::IterationStart | MessageType::IterationEnd => &[],
        MessageType::CurrentState => &["stateID"],
        MessageType::WillCheckCondition => &["transitionID", "conditionID"],
        MessageType::WillPerformTransition => &["transitionID"],
        MessageType::WillPerformAction => &["transitionID", "index"],
    };
    let returns_flag = message_type == MessageType::WillCheckCondition;

    let signature: Vec<String> = params.iter().map(|p| format!("uint16_t {}", p)).collect();
    let mut out = format!(
        "{} sendMessage{}({}) {{\n",
        if returns_flag { "boolean" } else { "void" },
        message_type.name(),
        signature.join(", ")
    );
    out.push_str(&format!(
        "\twriteMessageHeader(kMessage{}, {});\n",
        message_type.name(),
        message_type.payload_len()
    ));
    for param in params {
        out.push_str(&format!("\twriteUInt16({});\n", param));
    }
    out.push_str("\tendMessage();\n");
    if returns_flag {
        out.push_str("\treturn true;\n");
    }
    out.push_str("}\n");
    out
}
