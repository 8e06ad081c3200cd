//! Incremental server-sent-events decoder.
//!
//! Fed raw byte chunks as they arrive; yields complete frames. A frame ends
//! at a blank line. `event:` and `data:` fields are kept, comments and the
//! other field names are dropped.

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and drains every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf
            .push_str(&String::from_utf8_lossy(chunk).replace("\r\n", "\n"));

        let mut frames = Vec::new();
        while let Some(boundary) = self.buf.find("\n\n") {
            let raw: String = self.buf.drain(..boundary + 2).collect();
            if let Some(frame) = parse_frame(&raw) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in raw.lines() {
        if line.starts_with(':') {
            // Comment / keep-alive line.
            continue;
        }
        if let Some(value) = field_value(line, "event") {
            event = Some(value.to_string());
        } else if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        }
        // `id:` and `retry:` are not part of our contract.
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
