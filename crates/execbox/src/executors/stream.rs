//! Multiplexed log-stream decoding
//!
//! The container runtime interleaves stdout and stderr on one connection
//! using length-prefixed frames: an 8-byte header whose first byte is the
//! stream type (1 = stdout, 2 = stderr), bytes 1-3 are reserved, and bytes
//! 4-7 are the big-endian payload length, followed by that many payload
//! bytes. [`Demuxer`] decodes that framing incrementally; [`LogSink`] is
//! the accumulator it shares with the typed-stream collection path used
//! against the runtime client.

/// Byte offset of the payload length within a frame header.
const LEN_OFFSET: usize = 4;
/// Total header size.
const HEADER_LEN: usize = 8;

const STREAM_STDOUT: u8 = 1;
const STREAM_STDERR: u8 = 2;

/// Two independent output accumulators.
#[derive(Debug, Default)]
pub struct LogSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl LogSink {
    pub fn new() -> Self {
        LogSink::default()
    }

    pub fn push_stdout(&mut self, bytes: &[u8]) {
        self.stdout.extend_from_slice(bytes);
    }

    pub fn push_stderr(&mut self, bytes: &[u8]) {
        self.stderr.extend_from_slice(bytes);
    }

    /// Lossy UTF-8 views of both accumulators.
    pub fn into_strings(self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).into_owned(),
            String::from_utf8_lossy(&self.stderr).into_owned(),
        )
    }
}

/// Incremental decoder for the multiplexed framing. Feed it chunks as they
/// arrive; a trailing frame with insufficient header or payload bytes is
/// silently discarded rather than treated as an error.
#[derive(Debug, Default)]
pub struct Demuxer {
    sink: LogSink,
    buf: Vec<u8>,
}

impl Demuxer {
    pub fn new() -> Self {
        Demuxer::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        self.drain_complete_frames();
    }

    fn drain_complete_frames(&mut self) {
        let mut offset = 0;
        while self.buf.len() - offset >= HEADER_LEN {
            let header = &self.buf[offset..offset + HEADER_LEN];
            let len = u32::from_be_bytes([
                header[LEN_OFFSET],
                header[LEN_OFFSET + 1],
                header[LEN_OFFSET + 2],
                header[LEN_OFFSET + 3],
            ]) as usize;
            if self.buf.len() - offset - HEADER_LEN < len {
                break;
            }
            let payload = &self.buf[offset + HEADER_LEN..offset + HEADER_LEN + len];
            match header[0] {
                STREAM_STDOUT => self.sink.push_stdout(payload),
                STREAM_STDERR => self.sink.push_stderr(payload),
                // Unknown stream types are skipped, payload and all.
                _ => {}
            }
            offset += HEADER_LEN + len;
        }
        self.buf.drain(..offset);
    }

    /// Finish decoding, discarding any incomplete trailing frame.
    pub fn finish(self) -> (String, String) {
        self.sink.into_strings()
    }
}

/// One-shot decode of a complete multiplexed buffer.
pub fn demux(buf: &[u8]) -> (String, String) {
    let mut demuxer = Demuxer::new();
    demuxer.push(buf);
    demuxer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn empty_buffer_decodes_to_empty_streams() {
        assert_eq!(demux(&[]), (String::new(), String::new()));
    }

    #[test]
    fn frames_route_to_their_streams() {
        let mut buf = Vec::new();
        buf.extend(frame(1, b"out one\n"));
        buf.extend(frame(2, b"err one\n"));
        buf.extend(frame(1, b"out two\n"));
        let (stdout, stderr) = demux(&buf);
        assert_eq!(stdout, "out one\nout two\n");
        assert_eq!(stderr, "err one\n");
    }

    #[test]
    fn round_trip_preserves_concatenation_including_empty_payloads() {
        let frames: Vec<(u8, &[u8])> = vec![
            (1, b"alpha"),
            (2, b""),
            (1, b""),
            (2, b"beta"),
            (1, b"gamma"),
        ];
        let mut buf = Vec::new();
        for (stream, payload) in &frames {
            buf.extend(frame(*stream, payload));
        }
        let (stdout, stderr) = demux(&buf);
        assert_eq!(stdout, "alphagamma");
        assert_eq!(stderr, "beta");
    }

    #[test]
    fn truncated_trailing_header_is_discarded() {
        let mut buf = frame(1, b"kept");
        buf.extend_from_slice(&[2, 0, 0]); // three bytes of a header
        let (stdout, stderr) = demux(&buf);
        assert_eq!(stdout, "kept");
        assert_eq!(stderr, "");
    }

    #[test]
    fn truncated_trailing_payload_is_discarded() {
        let mut buf = frame(2, b"kept");
        buf.extend(frame(1, b"dropped")[..12].to_vec()); // header + 4 of 7 bytes
        let (stdout, stderr) = demux(&buf);
        assert_eq!(stdout, "");
        assert_eq!(stderr, "kept");
    }

    #[test]
    fn incremental_pushes_reassemble_split_frames() {
        let buf = frame(1, b"split across chunks");
        let mut demuxer = Demuxer::new();
        for chunk in buf.chunks(3) {
            demuxer.push(chunk);
        }
        let (stdout, stderr) = demuxer.finish();
        assert_eq!(stdout, "split across chunks");
        assert_eq!(stderr, "");
    }

    #[test]
    fn unknown_stream_types_are_skipped() {
        let mut buf = frame(0, b"stdin echo");
        buf.extend(frame(1, b"real"));
        let (stdout, stderr) = demux(&buf);
        assert_eq!(stdout, "real");
        assert_eq!(stderr, "");
    }
}
