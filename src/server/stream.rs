//! Response body that streams turn events as they are produced.

use std::io::{self, Read};

use tokio::sync::mpsc;

use crate::protocol::StreamEvent;

/// Blocking [`Read`] over a turn's event channel.
///
/// Each event is framed with [`StreamEvent::to_wire`]. The body ends after the
/// terminal event or when the turn drops its sender. Dropping the reader (the
/// client went away and the response write failed) closes the channel, which
/// the turn sees as a disconnect.
pub struct EventReader {
    rx: mpsc::Receiver<StreamEvent>,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl EventReader {
    /// `first` is the event already taken off the channel to decide the status code
    pub fn new(first: StreamEvent, rx: mpsc::Receiver<StreamEvent>) -> Self {
        let finished = first.is_terminal();
        Self {
            rx,
            pending: first.to_wire().into_bytes(),
            pos: 0,
            finished,
        }
    }

    fn refill(&mut self) -> bool {
        if self.finished {
            return false;
        }
        match self.rx.blocking_recv() {
            Some(event) => {
                self.finished = event.is_terminal();
                self.pending = event.to_wire().into_bytes();
                self.pos = 0;
                true
            }
            None => {
                self.finished = true;
                false
            }
        }
    }
}

impl Read for EventReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.pending.len() && !self.refill() {
            return Ok(0);
        }

        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_frames_until_terminal_event() {
        let (tx, rx) = mpsc::channel(8);
        tx.try_send(StreamEvent::chunk("hello\nworld")).unwrap();
        tx.try_send(StreamEvent::Complete {
            message_id: "msg_1".into(),
        })
        .unwrap();
        // Anything after the terminal event is never read
        tx.try_send(StreamEvent::chunk("late")).unwrap();

        let mut body = String::new();
        EventReader::new(StreamEvent::Start, rx)
            .read_to_string(&mut body)
            .unwrap();

        let events: Vec<StreamEvent> = body
            .split("\n\n")
            .filter(|f| !f.is_empty())
            .filter_map(StreamEvent::from_wire)
            .collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::chunk("hello\nworld"),
                StreamEvent::Complete {
                    message_id: "msg_1".into()
                },
            ]
        );
    }

    #[test]
    fn test_closed_channel_ends_body() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let mut body = String::new();
        EventReader::new(StreamEvent::Start, rx)
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "data: {\"type\":\"start\"}\n\n");
    }

    #[test]
    fn test_small_buffer_reads() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let mut reader = EventReader::new(StreamEvent::error("boom"), rx);

        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            StreamEvent::error("boom").to_wire()
        );
    }
}
