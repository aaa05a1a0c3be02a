//! [`MediumSource`] implementations (spec §4.2, §9).
//!
//! [`ElementaryStreamSource`] reads a raw, already-framed elementary
//! stream off disk (one length-prefixed record per frame, written by an
//! offline muxing step) and terminates at EOF. [`LiveCaptureSource`] is
//! the optional v4l-equivalent collaborator (spec §9 "a live capture
//! source never finalises its Medium") driven by a caller-supplied
//! capture callback instead of a file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, StreamdError};

use super::packetiser::CodecId;
use super::{DemuxRecord, MediaKind, MediumSource};

/// On-disk layout for one track: a sequence of records
/// `[pts: f64 LE][is_key: u8][len: u32 LE][payload...]`, produced by
/// whatever offline tool split the source container into elementary
/// streams. This is the file-backed counterpart to
/// [`LiveCaptureSource`]; a real deployment would instead depend on a
/// container-demuxing crate per spec §1's external collaborator note.
pub struct ElementaryStreamSource {
    reader: BufReader<File>,
    media_kind: MediaKind,
    codec: CodecId,
    payload_type: u8,
    clock_rate: u32,
    extradata: Vec<u8>,
    stream_index: usize,
}

impl ElementaryStreamSource {
    pub fn open(
        path: impl AsRef<Path>,
        media_kind: MediaKind,
        codec: CodecId,
        payload_type: u8,
        clock_rate: u32,
        extradata: Vec<u8>,
        stream_index: usize,
    ) -> Result<Self> {
        let file = File::open(path)?;
        Ok(ElementaryStreamSource {
            reader: BufReader::new(file),
            media_kind,
            codec,
            payload_type,
            clock_rate,
            extradata,
            stream_index,
        })
    }

    fn read_record(&mut self) -> std::io::Result<Option<DemuxRecord>> {
        let mut pts_buf = [0u8; 8];
        match self.reader.read_exact(&mut pts_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let pts = f64::from_le_bytes(pts_buf);

        let mut key_buf = [0u8; 1];
        self.reader.read_exact(&mut key_buf)?;
        let is_key = key_buf[0] != 0;

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;

        Ok(Some(DemuxRecord {
            stream_index: self.stream_index,
            pts,
            dts: pts,
            payload,
            is_key,
        }))
    }
}

impl MediumSource for ElementaryStreamSource {
    fn next_record(&mut self) -> Option<DemuxRecord> {
        match self.read_record() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "elementary stream read failed, stopping demux");
                None
            }
        }
    }

    fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    fn codec_id(&self) -> CodecId {
        self.codec
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn extradata(&self) -> Vec<u8> {
        self.extradata.clone()
    }
}

/// A never-ending capture source (spec §9 optional second collaborator,
/// "a live capture source stands in for a v4l/v4l2-style device"). Each
/// call to `next_record` blocks on the supplied capture function, which
/// is expected to itself block until the next frame is available (e.g.
/// a device read or a timer). There is no EOF: `spawn_demux`'s loop ends
/// only when the capture function returns `None`, which a live source
/// should do only on device failure.
pub struct LiveCaptureSource {
    capture: Box<dyn FnMut() -> Option<(f64, Vec<u8>, bool)> + Send>,
    media_kind: MediaKind,
    codec: CodecId,
    payload_type: u8,
    clock_rate: u32,
    extradata: Vec<u8>,
}

impl LiveCaptureSource {
    pub fn new(
        media_kind: MediaKind,
        codec: CodecId,
        payload_type: u8,
        clock_rate: u32,
        extradata: Vec<u8>,
        capture: impl FnMut() -> Option<(f64, Vec<u8>, bool)> + Send + 'static,
    ) -> Self {
        LiveCaptureSource {
            capture: Box::new(capture),
            media_kind,
            codec,
            payload_type,
            clock_rate,
            extradata,
        }
    }
}

impl MediumSource for LiveCaptureSource {
    fn next_record(&mut self) -> Option<DemuxRecord> {
        let (pts, payload, is_key) = (self.capture)()?;
        Some(DemuxRecord {
            stream_index: 0,
            pts,
            dts: pts,
            payload,
            is_key,
        })
    }

    fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    fn codec_id(&self) -> CodecId {
        self.codec
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn extradata(&self) -> Vec<u8> {
        self.extradata.clone()
    }
}

/// Convenience wrapper so callers that only hold a path string get a
/// typed "file not found" error instead of a raw io error (spec §8
/// `NotFound`).
pub fn open_elementary_stream(
    path: impl AsRef<Path>,
    media_kind: MediaKind,
    codec: CodecId,
    payload_type: u8,
    clock_rate: u32,
    extradata: Vec<u8>,
    stream_index: usize,
) -> Result<ElementaryStreamSource> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StreamdError::NotFound(path.display().to_string()));
    }
    ElementaryStreamSource::open(
        path,
        media_kind,
        codec,
        payload_type,
        clock_rate,
        extradata,
        stream_index,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_stream(path: &Path, records: &[(f64, bool, &[u8])]) {
        let mut f = File::create(path).unwrap();
        for (pts, is_key, payload) in records {
            f.write_all(&pts.to_le_bytes()).unwrap();
            f.write_all(&[*is_key as u8]).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(payload).unwrap();
        }
    }

    #[test]
    fn elementary_stream_reads_records_in_order() {
        let path = std::env::temp_dir().join("streamd_test_elem_stream.bin");
        write_stream(&path, &[(0.0, true, b"a"), (0.5, false, b"bb")]);

        let mut source = ElementaryStreamSource::open(
            &path,
            MediaKind::Video,
            CodecId::Mpeg4Video,
            96,
            90000,
            vec![],
            0,
        )
        .unwrap();
        let r1 = source.next_record().unwrap();
        assert_eq!(r1.pts, 0.0);
        assert!(r1.is_key);
        assert_eq!(r1.payload, b"a");

        let r2 = source.next_record().unwrap();
        assert_eq!(r2.pts, 0.5);
        assert!(!r2.is_key);
        assert_eq!(r2.payload, b"bb");

        assert!(source.next_record().is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = open_elementary_stream(
            "/nonexistent/streamd/path.bin",
            MediaKind::Audio,
            CodecId::Aac,
            97,
            48000,
            vec![],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, StreamdError::NotFound(_)));
    }

    #[test]
    fn live_capture_source_never_signals_eof_until_callback_does() {
        let mut remaining = 3;
        let mut source = LiveCaptureSource::new(MediaKind::Video, CodecId::Mpeg4Video, 96, 90000, vec![], move || {
            if remaining == 0 {
                None
            } else {
                remaining -= 1;
                Some((0.0, vec![0u8], true))
            }
        });
        assert!(source.next_record().is_some());
        assert!(source.next_record().is_some());
        assert!(source.next_record().is_some());
        assert!(source.next_record().is_none());
    }
}
