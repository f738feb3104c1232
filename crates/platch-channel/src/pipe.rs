//! In-memory duplex byte stream for tests and in-process demos.
//!
//! [`duplex`] returns two connected ends. Bytes written to one end are
//! read from the other, in order. Dropping an end (or its last half)
//! makes the peer's reads return EOF and its writes fail with
//! `BrokenPipe`, which a [`crate::Host`] reader thread treats as a
//! clean disconnect.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};

/// Receiving half of a pipe end. `read` blocks until the peer writes
/// or hangs up.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

/// Sending half of a pipe end.
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

/// One end of an in-memory connection.
pub struct PipeEnd {
    reader: PipeReader,
    writer: PipeWriter,
}

impl PipeEnd {
    /// Split into independently owned halves, so reading and writing
    /// can happen on different threads.
    pub fn split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                // Sender dropped: clean EOF.
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Create a connected pair of in-memory stream ends.
pub fn duplex() -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        PipeEnd {
            reader: PipeReader {
                rx: a_rx,
                pending: Vec::new(),
            },
            writer: PipeWriter { tx: a_tx },
        },
        PipeEnd {
            reader: PipeReader {
                rx: b_rx,
                pending: Vec::new(),
            },
            writer: PipeWriter { tx: b_tx },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_cross_in_order() {
        let (mut a, mut b) = duplex();
        a.write_all(b"hello ").unwrap();
        a.write_all(b"world").unwrap();
        let mut buf = [0u8; 11];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn both_directions_work() {
        let (mut a, mut b) = duplex();
        a.write_all(b"ping").unwrap();
        b.write_all(b"pong").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn drop_yields_eof_then_broken_pipe() {
        let (mut a, b) = duplex();
        drop(b);
        let mut buf = [0u8; 4];
        assert_eq!(a.read(&mut buf).unwrap(), 0);
        let err = a.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn split_halves_work_across_threads() {
        let (a, mut b) = duplex();
        let (mut a_read, mut a_write) = a.split();
        let writer = std::thread::spawn(move || {
            a_write.write_all(b"from-half").unwrap();
        });
        let mut buf = [0u8; 9];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"from-half");
        writer.join().unwrap();
        b.write_all(b"back").unwrap();
        let mut back = [0u8; 4];
        a_read.read_exact(&mut back).unwrap();
        assert_eq!(&back, b"back");
    }

    #[test]
    fn partial_reads_drain_pending() {
        let (mut a, mut b) = duplex();
        a.write_all(b"abcdef").unwrap();
        let mut small = [0u8; 2];
        b.read_exact(&mut small).unwrap();
        assert_eq!(&small, b"ab");
        let mut rest = [0u8; 4];
        b.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"cdef");
    }
}
