//! SSE decoding for the answer stream
//!
//! Turns a raw, possibly chunk-fragmented byte stream into a typed sequence
//! of [`StreamEvent`]s. Frames are `data: <json>` lines terminated by a
//! blank line; the JSON payload is one tagged event object. No business
//! logic lives here.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use shared_types::StreamEvent;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A frame that could not be parsed. Recoverable: the caller should
    /// log it and keep reading.
    #[error("malformed event frame: {0}")]
    MalformedFrame(String),

    /// The underlying transport failed mid-stream. Terminal.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Lazy decoder over a byte stream. Finite: yields `None` once the stream
/// closes or a terminal event has been produced. Not restartable — a fresh
/// stream requires a fresh decoder.
pub struct EventDecoder<S> {
    stream: S,
    buf: BytesMut,
    /// Accumulated `data:` payload of the frame being read.
    data: String,
    exhausted: bool,
    finished: bool,
}

impl<S, E> EventDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            data: String::new(),
            exhausted: false,
            finished: false,
        }
    }

    /// The next decoded event, or `None` at end of stream.
    ///
    /// Malformed frames surface as `Err(DecodeError::MalformedFrame)` items;
    /// decoding continues with the next frame. A transport failure ends the
    /// decoder after its `Err(DecodeError::Transport)` item.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, DecodeError>> {
        if self.finished {
            return None;
        }

        loop {
            while let Some(line) = self.take_line() {
                if let Some(result) = self.accept_line(&line) {
                    if matches!(result, Ok(StreamEvent::Done)) {
                        self.finished = true;
                    }
                    return Some(result);
                }
            }

            if self.exhausted {
                // The stream closed mid-frame; flush whatever data was
                // buffered, then end.
                self.finished = true;
                if self.data.is_empty() {
                    return None;
                }
                return Some(self.parse_frame());
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(DecodeError::Transport(err.to_string())));
                }
                None => self.exhausted = true,
            }
        }
    }

    /// Pop one complete line off the buffer, stripping the LF/CRLF ending.
    fn take_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Feed one line into the frame accumulator. Returns an event when the
    /// line completes a frame.
    fn accept_line(&mut self, line: &str) -> Option<Result<StreamEvent, DecodeError>> {
        if line.is_empty() {
            // Frame boundary.
            if self.data.is_empty() {
                return None;
            }
            return Some(self.parse_frame());
        }
        if line.starts_with(':') {
            // SSE comment / keep-alive.
            return None;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(payload);
        }
        // event:/id:/retry: and unknown fields are tolerated and skipped.
        None
    }

    fn parse_frame(&mut self) -> Result<StreamEvent, DecodeError> {
        let payload = std::mem::take(&mut self.data);
        serde_json::from_str(&payload).map_err(|err| DecodeError::MalformedFrame(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn decoder_for(chunks: Vec<&str>) -> EventDecoder<impl Stream<Item = Result<Bytes, Infallible>> + Unpin> {
        let chunks: Vec<Result<Bytes, Infallible>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        EventDecoder::new(futures_util::stream::iter(chunks))
    }

    async fn collect(mut decoder: EventDecoder<impl Stream<Item = Result<Bytes, Infallible>> + Unpin>) -> Vec<Result<StreamEvent, DecodeError>> {
        let mut events = Vec::new();
        while let Some(event) = decoder.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_decodes_simple_frames() {
        let decoder = decoder_for(vec![
            "data: {\"type\":\"chunk\",\"content\":\"Hello \"}\n\n",
            "data: {\"type\":\"chunk\",\"content\":\"world\"}\n\ndata: {\"type\":\"done\"}\n\n",
        ]);
        let events: Vec<StreamEvent> = collect(decoder).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk { content: "Hello ".to_string() },
                StreamEvent::Chunk { content: "world".to_string() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_reassembles_frames_split_across_chunks() {
        let decoder = decoder_for(vec![
            "data: {\"type\":\"chu",
            "nk\",\"content\":\"ab\"}",
            "\n\ndata: {\"type\":\"done\"}\n\n",
        ]);
        let events: Vec<StreamEvent> = collect(decoder).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Chunk { content: "ab".to_string() });
    }

    #[tokio::test]
    async fn test_tolerates_crlf_comments_and_other_fields() {
        let decoder = decoder_for(vec![
            ": keep-alive\r\nevent: message\r\nid: 7\r\ndata: {\"type\":\"thinking\",\"content\":\"hm\"}\r\n\r\n",
            "data: {\"type\":\"done\"}\r\n\r\n",
        ]);
        let events: Vec<StreamEvent> = collect(decoder).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Thinking { content: "hm".to_string() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_is_recoverable() {
        let decoder = decoder_for(vec![
            "data: {not json}\n\n",
            "data: {\"type\":\"chunk\",\"content\":\"ok\"}\n\n",
            "data: {\"type\":\"done\"}\n\n",
        ]);
        let events = collect(decoder).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Err(DecodeError::MalformedFrame(_))));
        assert_eq!(
            *events[1].as_ref().unwrap(),
            StreamEvent::Chunk { content: "ok".to_string() }
        );
        assert_eq!(*events[2].as_ref().unwrap(), StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_terminal_event_ends_decoding() {
        let decoder = decoder_for(vec![
            "data: {\"type\":\"done\"}\n\ndata: {\"type\":\"chunk\",\"content\":\"late\"}\n\n",
        ]);
        let events = collect(decoder).await;
        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_stream_close_without_done_just_ends() {
        let decoder = decoder_for(vec![
            "data: {\"type\":\"chunk\",\"content\":\"partial\"}\n\n",
        ]);
        let events: Vec<StreamEvent> = collect(decoder).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![StreamEvent::Chunk { content: "partial".to_string() }]);
    }

    #[tokio::test]
    async fn test_unterminated_final_frame_is_flushed() {
        let decoder = decoder_for(vec![
            "data: {\"type\":\"chunk\",\"content\":\"tail\"}\n",
        ]);
        let events: Vec<StreamEvent> = collect(decoder).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![StreamEvent::Chunk { content: "tail".to_string() }]);
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"chunk\",\"content\":\"a\"}\n\n")),
            Err("connection reset".to_string()),
        ];
        let mut decoder = EventDecoder::new(futures_util::stream::iter(chunks));

        let first = decoder.next_event().await.unwrap().unwrap();
        assert_eq!(first, StreamEvent::Chunk { content: "a".to_string() });

        let second = decoder.next_event().await.unwrap();
        assert!(matches!(second, Err(DecodeError::Transport(_))));

        assert!(decoder.next_event().await.is_none());
    }
}
