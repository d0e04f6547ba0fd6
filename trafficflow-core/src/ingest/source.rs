use std::collections::VecDeque;
use std::io::BufRead;

use log::warn;

/// Stream transport boundary: hands out opaque payloads in delivery order.
///
/// `None` marks the end of the stream. Reconnects and retries are the
/// transport's business; after one the pipeline is simply handed a new source.
pub trait EventSource {
    fn next_event(&mut self) -> Option<Vec<u8>>;
}

/// Newline-delimited payloads from any buffered reader
pub struct LineSource<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead> EventSource for LineSource<R> {
    fn next_event(&mut self) -> Option<Vec<u8>> {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let payload = self.line.trim_ascii();
                    if !payload.is_empty() {
                        return Some(payload.to_vec());
                    }
                }
                Err(e) => {
                    warn!("Event stream read failed: {e}");
                    return None;
                }
            }
        }
    }
}

/// Replays a fixed list of payloads
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    events: VecDeque<Vec<u8>>,
}

impl VecSource {
    pub fn new<I, P>(events: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventSource for VecSource {
    fn next_event(&mut self) -> Option<Vec<u8>> {
        self.events.pop_front()
    }
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn next_event(&mut self) -> Option<Vec<u8>> {
        (**self).next_event()
    }
}
