//! SDP (Session Description Protocol) generation (RFC 4566, spec §6).
//!
//! Produces the SDP body returned by DESCRIBE responses: one `m=` line
//! per track of the resolved [`Presentation`], each followed by the
//! codec's own `a=rtpmap`/`a=fmtp` attributes (spec §4.4's packetiser
//! registry owns those) and an `a=control:` line addressing the track
//! for per-track SETUP (spec §6 `a=control:<url>/tk=<index>`).

use crate::media::packetiser::make_packetiser;
use crate::mount::Presentation;

/// Generate an SDP session description for `presentation`.
pub fn generate_sdp(
    presentation: &Presentation,
    ip: &str,
    session_id: &str,
    session_version: &str,
    username: &str,
    session_name: &str,
    base_url: &str,
) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!(
        "o={} {} {} IN IP4 {}",
        username, session_id, session_version, ip
    ));
    sdp.push(format!("s={}", session_name));
    sdp.push(format!("c=IN IP4 {}", ip));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:streamd".to_string());
    if presentation.media.iter().any(|m| m.media_kind == crate::media::MediaKind::Application) {
        sdp.push("a=recvonly".to_string());
    } else {
        sdp.push("a=sendonly".to_string());
    }

    for (index, medium) in presentation.media.iter().enumerate() {
        let kind = match medium.media_kind {
            crate::media::MediaKind::Audio => "audio",
            crate::media::MediaKind::Video => "video",
            crate::media::MediaKind::Application => "application",
        };
        sdp.push(format!("m={} 0 RTP/AVP {}", kind, medium.payload_type));
        let packetiser = make_packetiser(medium.codec, medium.payload_type, 0);
        sdp.extend(
            packetiser
                .sdp_attributes(&medium.extradata)
                .into_iter()
                .map(|attr| format!("a={attr}")),
        );
        sdp.push(format!("a=control:{}/track{}", base_url, index));
    }

    tracing::debug!(tracks = presentation.media.len(), "SDP generated");

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Medium;
    use crate::media::packetiser::CodecId;
    use std::sync::Arc;

    fn sample_presentation() -> Arc<Presentation> {
        let video = Medium::new(
            crate::media::MediaKind::Video,
            CodecId::Mpeg4Video,
            96,
            90000,
            vec![0xAA, 0xBB],
            "sample.mp4".into(),
            0,
        );
        let audio = Medium::new(
            crate::media::MediaKind::Audio,
            CodecId::Aac,
            97,
            48000,
            vec![0x11, 0x88],
            "sample.mp4".into(),
            1,
        );
        Presentation::new("sample.mp4", vec![video, audio])
    }

    #[test]
    fn generates_multitrack_sdp() {
        let presentation = sample_presentation();
        let sdp = generate_sdp(
            &presentation,
            "192.168.1.100",
            "1234567890",
            "1",
            "-",
            "Stream",
            "rtsp://192.168.1.100:8554/stream",
        );

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 1234567890 1 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=Stream\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("m=audio 0 RTP/AVP 97\r\n"));
        assert!(sdp.contains("a=rtpmap:96 MP4V-ES/90000"));
        assert!(sdp.contains("a=rtpmap:97 mpeg4-generic/48000"));
        assert!(sdp.contains("a=control:rtsp://192.168.1.100:8554/stream/track0"));
        assert!(sdp.contains("a=control:rtsp://192.168.1.100:8554/stream/track1"));
        assert!(sdp.ends_with("\r\n"));

        let video_idx = sdp.find("m=video").unwrap();
        let audio_idx = sdp.find("m=audio").unwrap();
        let video_control_idx = sdp.find("track0").unwrap();
        assert!(video_idx < audio_idx);
        assert!(video_control_idx > video_idx);
    }

    #[test]
    fn rtpmap_precedes_fmtp_for_aac() {
        let presentation = sample_presentation();
        let sdp = generate_sdp(&presentation, "127.0.0.1", "1", "1", "-", "S", "rtsp://h/s");
        let rtpmap_idx = sdp.find("a=rtpmap:97").unwrap();
        let fmtp_idx = sdp.find("a=fmtp:97").unwrap();
        assert!(rtpmap_idx < fmtp_idx);
    }
}
