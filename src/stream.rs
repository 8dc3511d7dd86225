// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Bidirectional BGZF stream session
//!
//! [`BgzfStream`] wraps one byte source or sink and is fixed to a single
//! direction at construction. Blocking and async entry points share the
//! same block engine; the async ones only await on the wrapped stream.

use std::fmt;
use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};

use log::warn;

use crate::block::Quality;
use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::reader::BlockReader;
use crate::writer::BlockWriter;

/// Direction of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read BGZF blocks and yield the decompressed bytes
    Decompress,
    /// Accept bytes and write BGZF blocks
    Compress,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Decompress => write!(f, "decompress"),
            Mode::Compress => write!(f, "compress"),
        }
    }
}

/// Read side: block reader plus the cursor into its current block
struct Decoder<S> {
    reader: BlockReader<S>,
    pos: usize,
    done: bool,
}

impl<S> Decoder<S> {
    /// Copy leftover bytes of the current block into `buf`
    fn drain(&mut self, buf: &mut [u8]) -> usize {
        let block = self.reader.block();
        let available = block.len() - self.pos;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&block[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Whether a read must pull another block before it can make progress
    fn needs_block(&self, want: usize) -> bool {
        want > 0 && !self.done && self.pos == self.reader.block().len()
    }
}

enum Engine<S> {
    Decompress(Decoder<S>),
    Compress(BlockWriter<S>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// An async operation is running; seen at entry only if it was cancelled
    InFlight,
    Faulted,
    Closed,
}

/// BgzfStream presents a BGZF file as a plain byte stream
///
/// In [`Mode::Decompress`] it reads blocks from the wrapped source; in
/// [`Mode::Compress`] it writes blocks to the wrapped sink. Calling an
/// operation of the other direction fails with [`Error::NotSupported`].
///
/// Operations that need a capability of the wrapped stream (reading,
/// writing, finishing a compress session) live here, bounded on that
/// capability. Everything else, including closing a session over a
/// read-only source, is reached through [`Session`].
///
/// A compress session must be closed with [`close`](BgzfStream::close) or
/// [`close_async`](BgzfStream::close_async) to write the final block and the
/// EOF marker. Closing releases the wrapped stream unless `leave_open` was
/// requested, in which case it stays available through
/// [`into_inner`](BgzfStream::into_inner).
///
/// # Example
///
/// ```
/// use bgzfio::{BgzfStream, Mode, Quality};
/// use std::io::{Cursor, Read, Write};
///
/// let mut stream = BgzfStream::builder()
///     .stream(Cursor::new(Vec::<u8>::new()))
///     .quality(Quality::Fastest)
///     .leave_open(true)
///     .build()
///     .unwrap();
/// stream.write_all(b"chr1\t1000\t2000\n").unwrap();
/// stream.close().unwrap();
/// let compressed = stream.into_inner().unwrap().into_inner();
///
/// let mut stream = BgzfStream::new(Cursor::new(compressed), Mode::Decompress);
/// let mut text = String::new();
/// stream.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "chr1\t1000\t2000\n");
/// stream.close().unwrap();
/// ```
pub struct BgzfStream<S> {
    session: Session<S>,
}

/// Lifecycle of a [`BgzfStream`], available whatever the wrapped stream is
///
/// A `BgzfStream` dereferences to its session, so these methods are called
/// directly on the stream. When the wrapped stream implements `Write` (or
/// `AsyncWrite`) the stream's own `close`/`flush` take precedence and can
/// finish a compress session; the ones here release the stream and report
/// [`Error::NotSupported`] for a compress session they cannot finish.
///
/// ```
/// use bgzfio::{BgzfStream, Error, Mode, EOF_MARKER};
///
/// let mut stream = BgzfStream::new(&EOF_MARKER[..], Mode::Decompress);
/// assert_eq!(stream.read_byte().unwrap(), None);
/// stream.close().unwrap();
/// assert!(matches!(stream.read_byte(), Err(Error::Closed)));
/// ```
pub struct Session<S> {
    engine: Option<Engine<S>>,
    mode: Mode,
    leave_open: bool,
    state: State,
}

impl<S> BgzfStream<S> {
    /// Create a session in the given mode; compress mode uses [`Quality::Optimal`]
    pub fn new(inner: S, mode: Mode) -> Self {
        match mode {
            Mode::Decompress => Self::decompress(inner, false),
            Mode::Compress => Self::compress(inner, Quality::default(), DEFAULT_BLOCK_SIZE, false),
        }
    }

    /// Create a compress session with the given quality
    pub fn with_quality(inner: S, quality: Quality) -> Self {
        Self::compress(inner, quality, DEFAULT_BLOCK_SIZE, false)
    }

    /// Start building a session with explicit options
    pub fn builder() -> Builder<S> {
        Builder::default()
    }

    fn decompress(inner: S, leave_open: bool) -> Self {
        let engine = Engine::Decompress(Decoder {
            reader: BlockReader::new(inner),
            pos: 0,
            done: false,
        });
        Self::open(engine, Mode::Decompress, leave_open)
    }

    fn compress(inner: S, quality: Quality, block_size: usize, leave_open: bool) -> Self {
        let engine = Engine::Compress(BlockWriter::with_block_size(inner, quality, block_size));
        Self::open(engine, Mode::Compress, leave_open)
    }

    fn open(engine: Engine<S>, mode: Mode, leave_open: bool) -> Self {
        BgzfStream {
            session: Session {
                engine: Some(engine),
                mode,
                leave_open,
                state: State::Open,
            },
        }
    }

    /// Unwrap the session, returning the wrapped stream if still held
    ///
    /// After [`close`](BgzfStream::close) the stream is only held when the
    /// session was built with `leave_open`. Unwrapping an open compress
    /// session discards pending data without writing the EOF marker.
    pub fn into_inner(self) -> Option<S> {
        self.session.into_inner()
    }
}

impl<S> Deref for BgzfStream<S> {
    type Target = Session<S>;

    fn deref(&self) -> &Session<S> {
        &self.session
    }
}

impl<S> DerefMut for BgzfStream<S> {
    fn deref_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }
}

impl<S> Session<S> {
    /// Direction of this session
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Get a reference to the wrapped stream, if still held
    pub fn get_ref(&self) -> Option<&S> {
        match self.engine.as_ref()? {
            Engine::Decompress(decoder) => Some(decoder.reader.get_ref()),
            Engine::Compress(writer) => Some(writer.get_ref()),
        }
    }

    /// Flush a session whose wrapped stream cannot be flushed
    ///
    /// A decompress session has nothing to flush. A compress session needs a
    /// `Write` sink, so it fails with [`Error::NotSupported`].
    pub fn flush(&mut self) -> Result<()> {
        self.enter()?;
        let result = match self.mode {
            Mode::Decompress => Ok(()),
            Mode::Compress => Err(Error::NotSupported {
                operation: "blocking flush",
                mode: self.mode,
            }),
        };
        self.leave(result)
    }

    /// Close a session whose wrapped stream cannot be written
    ///
    /// Releases the stream unless `leave_open` was set. Closing again is a
    /// no-op. A compress session that still needs its EOF marker is released
    /// too, but reports [`Error::NotSupported`] since nothing can be written.
    pub fn close(&mut self) -> Result<()> {
        let result = if self.needs_finish() {
            Err(Error::NotSupported {
                operation: "blocking close",
                mode: self.mode,
            })
        } else {
            Ok(())
        };
        self.release();
        result
    }

    fn into_inner(mut self) -> Option<S> {
        self.state = State::Closed;
        match self.engine.take()? {
            Engine::Decompress(decoder) => Some(decoder.reader.into_inner()),
            Engine::Compress(writer) => Some(writer.into_inner()),
        }
    }

    /// Check lifecycle state before an operation
    fn enter(&mut self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Closed => Err(Error::Closed),
            State::InFlight => {
                self.state = State::Faulted;
                Err(Error::Faulted)
            }
            State::Faulted => Err(Error::Faulted),
        }
    }

    /// Record the outcome of an operation
    ///
    /// A sink error may leave part of a block written, so in compress mode
    /// it faults the session like a format error does.
    fn leave<T>(&mut self, result: Result<T>) -> Result<T> {
        let faulted = match &result {
            Ok(_) => false,
            Err(Error::Io(_)) => self.mode == Mode::Compress,
            Err(e) => e.is_fatal(),
        };
        self.state = if faulted { State::Faulted } else { State::Open };
        result
    }

    /// Check lifecycle and direction before an operation
    fn check(&mut self, operation: &'static str, wanted: Mode) -> Result<()> {
        self.enter()?;
        if self.engine.is_none() {
            return Err(Error::Closed);
        }
        if self.mode != wanted {
            return Err(Error::NotSupported {
                operation,
                mode: self.mode,
            });
        }
        Ok(())
    }

    fn decoder(&mut self) -> Result<&mut Decoder<S>> {
        match self.engine.as_mut() {
            Some(Engine::Decompress(decoder)) => Ok(decoder),
            _ => Err(Error::Closed),
        }
    }

    fn writer(&mut self) -> Result<&mut BlockWriter<S>> {
        match self.engine.as_mut() {
            Some(Engine::Compress(writer)) => Ok(writer),
            _ => Err(Error::Closed),
        }
    }

    /// Mark the session closed and drop the stream unless it stays open
    fn release(&mut self) {
        self.state = State::Closed;
        if !self.leave_open {
            self.engine = None;
        }
    }

    /// Whether closing must still write the final block and EOF marker
    fn needs_finish(&self) -> bool {
        self.state == State::Open
            && matches!(&self.engine, Some(Engine::Compress(w)) if !w.is_finished())
    }
}

impl<S: Read> BgzfStream<S> {
    /// Read decompressed bytes into `buf`
    ///
    /// Returns 0 at the end of the data, and on every call after that.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check("read", Mode::Decompress)?;
        let result = self
            .decoder()
            .and_then(|decoder| Self::read_inner(decoder, buf));
        self.leave(result)
    }

    /// Read one byte; `None` marks the end of the data
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn read_inner(decoder: &mut Decoder<S>, buf: &mut [u8]) -> Result<usize> {
        while decoder.needs_block(buf.len()) {
            decoder.pos = 0;
            let more = decoder.reader.next_block()?.is_some();
            decoder.done = !more;
        }
        Ok(decoder.drain(buf))
    }
}

impl<S: Write> BgzfStream<S> {
    /// Compress `buf`, writing any blocks that fill up
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check("write", Mode::Compress)?;
        let result = self.writer().and_then(|writer| writer.write(buf));
        self.leave(result)
    }

    /// Flush the wrapped sink
    ///
    /// No short block is emitted, so block sizes stay maximal. On a
    /// decompress session this does nothing.
    pub fn flush(&mut self) -> Result<()> {
        self.enter()?;
        let result = match self.engine.as_mut() {
            Some(Engine::Compress(writer)) => writer.flush(),
            _ => Ok(()),
        };
        self.leave(result)
    }

    /// Finish the stream and release the wrapped sink
    ///
    /// A compress session writes its final block and the EOF marker first.
    /// Closing again is a no-op. The sink is released even if finishing
    /// fails, and that failure is returned.
    pub fn close(&mut self) -> Result<()> {
        let result = if self.needs_finish() {
            self.writer().and_then(|writer| writer.finish())
        } else {
            Ok(())
        };
        self.release();
        result
    }
}

impl<S: Read> Read for BgzfStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(BgzfStream::read(self, buf)?)
    }
}

impl<S: Write> Write for BgzfStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BgzfStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(BgzfStream::flush(self)?)
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        if self.needs_finish() {
            warn!("bgzf: compress stream dropped without close, EOF marker not written");
        }
    }
}

#[cfg(feature = "async")]
mod nonblocking {
    use tokio::io::{AsyncRead, AsyncWrite};

    use super::{BgzfStream, Decoder, Engine, Mode, Session, State};
    use crate::error::{Error, Result};

    impl<S> Session<S> {
        /// Mark an async operation as started
        ///
        /// If its future is dropped before `leave` runs, the state stays
        /// `InFlight` and the next operation reports the session as faulted.
        fn begin(&mut self, operation: &'static str, wanted: Mode) -> Result<()> {
            self.check(operation, wanted)?;
            self.state = State::InFlight;
            Ok(())
        }

        /// Async counterpart of [`Session::close`]
        ///
        /// Used when the wrapped stream is not `AsyncWrite`, such as an
        /// `AsyncRead` source.
        pub async fn close_async(&mut self) -> Result<()> {
            let result = if self.needs_finish() {
                Err(Error::NotSupported {
                    operation: "async close",
                    mode: self.mode,
                })
            } else {
                Ok(())
            };
            self.release();
            result
        }
    }

    impl<S: AsyncRead + Unpin> BgzfStream<S> {
        /// Async counterpart of [`read`](BgzfStream::read)
        pub async fn read_async(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.begin("read", Mode::Decompress)?;
            let result = match self.decoder() {
                Ok(decoder) => Self::read_inner_async(decoder, buf).await,
                Err(e) => Err(e),
            };
            self.leave(result)
        }

        /// Async counterpart of [`read_byte`](BgzfStream::read_byte)
        pub async fn read_byte_async(&mut self) -> Result<Option<u8>> {
            let mut byte = [0u8; 1];
            match self.read_async(&mut byte).await? {
                0 => Ok(None),
                _ => Ok(Some(byte[0])),
            }
        }

        async fn read_inner_async(decoder: &mut Decoder<S>, buf: &mut [u8]) -> Result<usize> {
            while decoder.needs_block(buf.len()) {
                decoder.pos = 0;
                let more = decoder.reader.next_block_async().await?.is_some();
                decoder.done = !more;
            }
            Ok(decoder.drain(buf))
        }
    }

    impl<S: AsyncWrite + Unpin> BgzfStream<S> {
        /// Async counterpart of [`write`](BgzfStream::write)
        pub async fn write_async(&mut self, buf: &[u8]) -> Result<()> {
            self.begin("write", Mode::Compress)?;
            let result = match self.writer() {
                Ok(writer) => writer.write_async(buf).await,
                Err(e) => Err(e),
            };
            self.leave(result)
        }

        /// Async counterpart of [`flush`](BgzfStream::flush)
        pub async fn flush_async(&mut self) -> Result<()> {
            self.enter()?;
            self.state = State::InFlight;
            let result = match self.engine.as_mut() {
                Some(Engine::Compress(writer)) => writer.flush_async().await,
                _ => Ok(()),
            };
            self.leave(result)
        }

        /// Async counterpart of [`close`](BgzfStream::close)
        pub async fn close_async(&mut self) -> Result<()> {
            let result = if self.needs_finish() {
                self.state = State::InFlight;
                match self.engine.as_mut() {
                    Some(Engine::Compress(writer)) => writer.finish_async().await,
                    _ => Ok(()),
                }
            } else {
                Ok(())
            };
            self.release();
            result
        }
    }
}

/// Builder for [`BgzfStream`]
///
/// Either a [`mode`](Builder::mode) or a [`quality`](Builder::quality) must
/// be given; a quality implies [`Mode::Compress`].
pub struct Builder<S> {
    stream: Option<S>,
    mode: Option<Mode>,
    quality: Option<Quality>,
    leave_open: bool,
    block_size: usize,
}

impl<S> Default for Builder<S> {
    fn default() -> Self {
        Builder {
            stream: None,
            mode: None,
            quality: None,
            leave_open: false,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl<S> Builder<S> {
    /// Set the wrapped source or sink
    pub fn stream(mut self, stream: S) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set the direction
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the compression quality, selecting compress mode
    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Keep the wrapped stream after close instead of dropping it
    pub fn leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }

    /// Uncompressed bytes per block written (clamped to 1..=65280)
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn build(self) -> Result<BgzfStream<S>> {
        let stream = self
            .stream
            .ok_or(Error::Argument("no underlying stream given"))?;

        match (self.mode, self.quality) {
            (Some(Mode::Decompress), None) => Ok(BgzfStream::decompress(stream, self.leave_open)),
            (Some(Mode::Decompress), Some(_)) => Err(Error::Argument(
                "a compression quality cannot be used in decompress mode",
            )),
            (Some(Mode::Compress), quality) | (None, quality @ Some(_)) => {
                Ok(BgzfStream::compress(
                    stream,
                    quality.unwrap_or_default(),
                    self.block_size,
                    self.leave_open,
                ))
            }
            (None, None) => Err(Error::Argument("either a mode or a quality is required")),
        }
    }
}
