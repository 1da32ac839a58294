/// Events emitted during LLM streaming response (pipeline step 12).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model. Maps 1:1 to the gateway's
    /// `delta` SSE event.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },

    /// Error during streaming.
    Error { message: String },
}

/// Parse a single SSE line from Anthropic's streaming API.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_lines() {
        match parse_sse_line("event: message_start") {
            Some(SseParsed::Event(ev)) => assert_eq!(ev, "message_start"),
            other => panic!("unexpected: {other:?}"),
        }
        match parse_sse_line(r#"data: {"type":"ping"}"#) {
            Some(SseParsed::Data(data)) => assert_eq!(data, r#"{"type":"ping"}"#),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_sse_line(": heartbeat").is_none());
    }
}
