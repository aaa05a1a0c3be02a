//! Presentation loader (spec §4.2 "opened by calling the demuxer
//! collaborator", §6 `SDP.base-dir`).
//!
//! The on-disk container demuxing library itself is an external
//! collaborator this spec does not define (§1 Non-goals); what it does
//! define is the shape a loaded presentation must have. This loader
//! bridges the two: for a mount named `name` it reads a small sidecar
//! manifest (`<base_dir>/<name>.manifest.ini`, parsed with the same `ini`
//! crate [`Config::load`](crate::config::Config::load) uses) that
//! describes one `[trackN]` section per elementary stream file already
//! split out by an offline muxing step, and opens each one through
//! [`ElementaryStreamSource`](crate::media::demux::ElementaryStreamSource).

use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StreamdError};
use crate::media::demux::open_elementary_stream;
use crate::media::packetiser::CodecId;
use crate::media::{MediaKind, Medium};
use crate::mount::Presentation;

fn parse_codec(s: &str) -> Result<CodecId> {
    match s {
        "mpa" => Ok(CodecId::Mpa),
        "aac" => Ok(CodecId::Aac),
        "mpeg4video" => Ok(CodecId::Mpeg4Video),
        "mp3adu" => Ok(CodecId::Mp3Adu),
        other => Err(StreamdError::UnsupportedCodec(other.to_string())),
    }
}

fn parse_kind(s: &str) -> Result<MediaKind> {
    match s {
        "audio" => Ok(MediaKind::Audio),
        "video" => Ok(MediaKind::Video),
        "application" => Ok(MediaKind::Application),
        other => Err(StreamdError::Protocol(format!("unknown media kind: {other}"))),
    }
}

/// Load the presentation manifest for `name` out of `base_dir` and spawn
/// one demux thread per track (spec §5 "per Medium there is one demux
/// thread").
pub fn load_presentation(base_dir: &str, name: &str) -> Result<Arc<Presentation>> {
    let manifest_path = Path::new(base_dir).join(format!("{name}.manifest.ini"));
    if !manifest_path.exists() {
        return Err(StreamdError::NotFound(manifest_path.display().to_string()));
    }
    let ini = ini::Ini::load_from_file(&manifest_path)
        .map_err(|e| StreamdError::Protocol(format!("manifest parse error: {e}")))?;

    let mut media = Vec::new();
    let mut index = 0usize;
    loop {
        let section_name = format!("track{index}");
        let Some(section) = ini.section(Some(section_name.as_str())) else {
            break;
        };

        let kind = parse_kind(section.get("kind").unwrap_or("video"))?;
        let codec = parse_codec(section.get("codec").unwrap_or(""))?;
        let payload_type: u8 = section
            .get("payload_type")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StreamdError::Protocol(format!("{section_name}: missing payload_type")))?;
        let clock_rate: u32 = section
            .get("clock_rate")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StreamdError::Protocol(format!("{section_name}: missing clock_rate")))?;
        let extradata = section
            .get("extradata_hex")
            .map(|hex| decode_hex(hex))
            .transpose()?
            .unwrap_or_default();
        let file = section
            .get("file")
            .ok_or_else(|| StreamdError::Protocol(format!("{section_name}: missing file")))?;

        let source = open_elementary_stream(
            Path::new(base_dir).join(file),
            kind,
            codec,
            payload_type,
            clock_rate,
            extradata.clone(),
            index,
        )?;

        let medium = Medium::new(kind, codec, payload_type, clock_rate, extradata, file.to_string(), index);
        medium.spawn_demux(Box::new(source));
        media.push(medium);
        index += 1;
    }

    if media.is_empty() {
        return Err(StreamdError::NotFound(format!("{name}: manifest has no tracks")));
    }

    tracing::info!(name, tracks = media.len(), "presentation loaded");
    Ok(Presentation::new(name, media))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(StreamdError::Protocol("odd-length extradata_hex".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| StreamdError::Protocol("invalid extradata_hex".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_elementary_stream(path: &Path, records: &[(f64, bool, &[u8])]) {
        let mut f = File::create(path).unwrap();
        for (pts, is_key, payload) in records {
            f.write_all(&pts.to_le_bytes()).unwrap();
            f.write_all(&[*is_key as u8]).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(payload).unwrap();
        }
    }

    #[test]
    fn loads_manifest_with_two_tracks() {
        let dir = std::env::temp_dir().join(format!("streamd_loader_test_{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();

        write_elementary_stream(&dir.join("video.bin"), &[(0.0, true, b"v")]);
        write_elementary_stream(&dir.join("audio.bin"), &[(0.0, true, b"a")]);

        let manifest = dir.join("demo.manifest.ini");
        std::fs::write(
            &manifest,
            "[track0]\nkind=video\ncodec=mpeg4video\npayload_type=96\nclock_rate=90000\nfile=video.bin\n\n\
             [track1]\nkind=audio\ncodec=aac\npayload_type=97\nclock_rate=48000\nextradata_hex=1190\nfile=audio.bin\n",
        )
        .unwrap();

        let presentation = load_presentation(dir.to_str().unwrap(), "demo").unwrap();
        assert_eq!(presentation.media.len(), 2);
        assert_eq!(presentation.media[0].media_kind, MediaKind::Video);
        assert_eq!(presentation.media[1].media_kind, MediaKind::Audio);
        assert_eq!(presentation.media[1].extradata, vec![0x11, 0x90]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let err = load_presentation("/nonexistent/streamd/base", "nope").unwrap_err();
        assert!(matches!(err, StreamdError::NotFound(_)));
    }
}
