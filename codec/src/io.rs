//! Frame transport.
//!
//! [`FrameReader`] reads newline-delimited frames from an [`AsyncRead`]
//! reader; [`FrameWriter`] writes rendered frames to an [`AsyncWrite`]
//! writer. The writer buffers at most one frame and finishes it across
//! backpressure, so a frame is never presented to the transport partially.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes, BytesMut};
use futures::{ready, AsyncRead, AsyncWrite, Sink, Stream};

use crate::try_ready;

/// Reader of newline-delimited frames.
///
/// Yields one [`Bytes`] item per frame, with the terminating newline
/// stripped.
///
/// # Cancellation safety
///
/// The [`Stream`] implementation is cancellation safe: partial input is
/// buffered inside the reader, not in the `next` future.
pub struct FrameReader<R> {
    /// Underlying async bytestream being read.
    stream: R,
    /// Internal buffer for incomplete frames.
    buffer: BytesMut,
    /// Maximum number of bytes to read in one go.
    max_read_buffer_increment: usize,
    /// Set once the underlying stream has reached end of input.
    finished: bool,
}

impl<R> FrameReader<R> {
    /// Creates a new frame reader with the given read buffer increment.
    pub fn new(stream: R, max_read_buffer_increment: usize) -> Self {
        FrameReader {
            stream,
            buffer: BytesMut::new(),
            max_read_buffer_increment,
            finished: false,
        }
    }

    /// Deconstructs the reader into the underlying stream.
    pub fn into_inner(self) -> R {
        self.stream
    }
}

impl<R> Stream for FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(position) = this.buffer.iter().position(|&byte| byte == b'\n') {
                let mut line = this.buffer.split_to(position + 1);
                line.truncate(position);
                return Poll::Ready(Some(Ok(line.freeze())));
            }

            if this.finished {
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                // Trailing bytes without a newline cannot form a frame.
                this.buffer.clear();
                return Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated frame at end of stream",
                ))));
            }

            let start = this.buffer.len();
            let end = start + this.max_read_buffer_increment;
            this.buffer.resize(end, 0x00);

            match Pin::new(&mut this.stream).poll_read(cx, &mut this.buffer[start..end]) {
                Poll::Ready(Ok(bytes_read)) => {
                    this.buffer.truncate(start + bytes_read);
                    if bytes_read == 0 {
                        this.finished = true;
                    }
                }
                Poll::Ready(Err(error)) => {
                    this.buffer.truncate(start);
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Pending => {
                    this.buffer.truncate(start);
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Writer for rendered frames.
///
/// # Cancellation safety
///
/// The [`Sink`] methods are cancellation safe. Only a single frame is
/// buffered inside the writer itself.
pub struct FrameWriter<W> {
    /// Underlying async bytestream being written.
    stream: W,
    /// The frame in process of being sent.
    current_frame: Option<Bytes>,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Creates a new frame writer.
    pub fn new(stream: W) -> Self {
        FrameWriter {
            stream,
            current_frame: None,
        }
    }

    fn finish_sending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match self.current_frame {
                // No frame in flight, we're ready.
                None => return Poll::Ready(Ok(())),

                Some(ref mut current_frame) => {
                    let stream_pin = Pin::new(&mut self.stream);
                    match stream_pin.poll_write(cx, current_frame.chunk()) {
                        Poll::Ready(Ok(bytes_written)) => {
                            current_frame.advance(bytes_written);

                            // If we're done, clear the current frame and return.
                            if !current_frame.has_remaining() {
                                self.current_frame.take();
                                return Poll::Ready(Ok(()));
                            }

                            // Otherwise, repeat the loop.
                        }
                        Poll::Ready(Err(error)) => return Poll::Ready(Err(error)),
                        // The underlying output stream is blocked, no progress can be made.
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

impl<W> Sink<Bytes> for FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let self_mut = self.get_mut();

        try_ready!(ready!(self_mut.finish_sending(cx)));

        // The item buffer is empty, so we are ready for the next frame even
        // if the underlying stream still has writes outstanding.
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: Bytes) -> Result<(), Self::Error> {
        self.get_mut().current_frame = Some(frame);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let self_mut = self.get_mut();

        // Buffer the outstanding frame to the underlying stream first.
        try_ready!(ready!(self_mut.finish_sending(cx)));

        Pin::new(&mut self_mut.stream).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let self_mut = self.get_mut();

        try_ready!(ready!(self_mut.finish_sending(cx)));

        Pin::new(&mut self_mut.stream).poll_close(cx)
    }
}
