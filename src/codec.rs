//! Wire Codec (C3) — stateful byte-at-a-time parser/serializer for trash
//! events.

use std::sync::Mutex;

pub const END_BYTE: u8 = 0x17;

/// The four recognized command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Schedule,
    Unschedule,
    Remove,
}

impl Command {
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Add => b'a',
            Command::Schedule => b's',
            Command::Unschedule => b'u',
            Command::Remove => b'r',
        }
    }

    pub fn from_byte(b: u8) -> Option<Command> {
        match b {
            b'a' => Some(Command::Add),
            b's' => Some(Command::Schedule),
            b'u' => Some(Command::Unschedule),
            b'r' => Some(Command::Remove),
            _ => None,
        }
    }
}

/// A decoded event, or an `undefined` event for an unrecognized command byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Known { command: Command, name: String },
    Undefined { command: u8, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Reading,
}

/// Byte-at-a-time decoder state machine. One `Decoder` per peer connection.
pub struct Decoder {
    state: State,
    command: u8,
    buffer: Vec<u8>,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            state: State::Idle,
            command: 0,
            buffer: Vec::new(),
        }
    }

    /// Feeds one byte; returns a completed [`Event`] if the end byte closed
    /// one out. NUL bytes are discarded unconditionally in any state, since
    /// Unix paths cannot contain NUL anyway.
    pub fn push_byte(&mut self, byte: u8) -> Option<Event> {
        if byte == 0 {
            return None;
        }

        match self.state {
            State::Idle => {
                self.command = byte;
                self.buffer.clear();
                self.state = State::Reading;
                None
            }
            State::Reading => {
                if byte == END_BYTE {
                    self.state = State::Idle;
                    let name = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    Some(match Command::from_byte(self.command) {
                        Some(command) => Event::Known { command, name },
                        None => Event::Undefined {
                            command: self.command,
                            name,
                        },
                    })
                } else {
                    self.buffer.push(byte);
                    None
                }
            }
        }
    }

    /// Feeds a full chunk, returning every event completed within it.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }
}

/// Append-only FIFO byte queue for one outbound connection, guarded by a
/// mutex.
pub struct Encoder {
    queue: Mutex<Vec<u8>>,
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Appends `command | name-bytes | 0x17` to the queue.
    pub fn encode(&self, command: Command, name: &str) {
        let mut queue = self.queue.lock().unwrap();
        queue.push(command.to_byte());
        queue.extend_from_slice(name.as_bytes());
        queue.push(END_BYTE);
    }

    /// Number of queued, not-yet-drained bytes.
    pub fn available(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Drains up to `max` bytes from the head of the queue.
    pub fn output(&self, max: usize) -> Vec<u8> {
        let mut queue = self.queue.lock().unwrap();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Puts `bytes` back at the head of the queue. Used by the write loop
    /// when a `send` only accepts part of a drained chunk — the remainder
    /// goes back to the front, advanced by exactly `sent` bytes.
    pub fn requeue_front(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut queue = self.queue.lock().unwrap();
        let mut merged = Vec::with_capacity(bytes.len() + queue.len());
        merged.extend_from_slice(bytes);
        merged.append(&mut queue);
        *queue = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_sequence_of_events() {
        let encoder = Encoder::new();
        encoder.encode(Command::Schedule, "a.txt");
        encoder.encode(Command::Remove, "b.txt");

        let bytes = encoder.output(1024);
        assert_eq!(encoder.available(), 0);

        let mut decoder = Decoder::new();
        let events = decoder.push_bytes(&bytes);

        assert_eq!(
            events,
            vec![
                Event::Known {
                    command: Command::Schedule,
                    name: "a.txt".to_string()
                },
                Event::Known {
                    command: Command::Remove,
                    name: "b.txt".to_string()
                },
            ]
        );
    }

    #[test]
    fn nul_bytes_are_dropped_anywhere() {
        let mut decoder = Decoder::new();
        let mut bytes = vec![b's'];
        bytes.push(0);
        bytes.extend_from_slice(b"name");
        bytes.push(0);
        bytes.push(END_BYTE);

        let events = decoder.push_bytes(&bytes);
        assert_eq!(
            events,
            vec![Event::Known {
                command: Command::Schedule,
                name: "name".to_string()
            }]
        );
    }

    #[test]
    fn undefined_command_byte_is_reported() {
        let mut decoder = Decoder::new();
        let events = decoder.push_bytes(b"zname\x17");
        assert_eq!(
            events,
            vec![Event::Undefined {
                command: b'z',
                name: "name".to_string()
            }]
        );
    }

    #[test]
    fn partial_feed_keeps_state_across_calls() {
        let mut decoder = Decoder::new();
        assert!(decoder.push_bytes(b"afo").is_empty());
        let events = decoder.push_bytes(b"o\x17");
        assert_eq!(
            events,
            vec![Event::Known {
                command: Command::Add,
                name: "foo".to_string()
            }]
        );
    }

    #[test]
    fn requeue_front_restores_fifo_order() {
        let encoder = Encoder::new();
        encoder.encode(Command::Add, "first");
        let chunk = encoder.output(3); // partial "send" of the first 3 bytes
        encoder.requeue_front(&chunk);
        assert_eq!(encoder.available(), 7); // "a" + "first" + 0x17

        let full = encoder.output(1024);
        let mut decoder = Decoder::new();
        let events = decoder.push_bytes(&full);
        assert_eq!(
            events,
            vec![Event::Known {
                command: Command::Add,
                name: "first".to_string()
            }]
        );
    }

    #[test]
    fn drain_respects_max() {
        let encoder = Encoder::new();
        encoder.encode(Command::Add, "abcdef");
        let first = encoder.output(3);
        assert_eq!(first.len(), 3);
        assert_eq!(encoder.available(), 5);
    }
}
