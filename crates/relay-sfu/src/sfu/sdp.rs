//! Attribute extraction from parsed session descriptions

use std::collections::HashSet;

use webrtc::sdp::description::media::MediaDescription;
use webrtc::sdp::description::session::SessionDescription;
use webrtc::sdp::extmap::TRANSPORT_CC_URI;

const ATTR_KEY_MID: &str = "mid";
const ATTR_KEY_MSID: &str = "msid";
const ATTR_KEY_EXT_MAP: &str = "extmap";

const MEDIA_AUDIO: &str = "audio";
const MEDIA_VIDEO: &str = "video";

/// Transport-wide congestion control marker of one offered media section
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TwccMarker {
    /// Last token of the section's `msid`, empty when absent
    pub stream_id: String,
    /// Extension id from the TWCC `extmap`, 0 when absent
    pub ext_id: u8,
}

fn attribute_value<'a>(media: &'a MediaDescription, key: &str) -> Option<&'a str> {
    media
        .attributes
        .iter()
        .find(|attr| attr.key == key)
        .and_then(|attr| attr.value.as_deref())
}

/// Mids of every media section that carries one
pub fn confirmed_mids(desc: &SessionDescription) -> HashSet<String> {
    desc.media_descriptions
        .iter()
        .filter_map(|media| attribute_value(media, ATTR_KEY_MID))
        .map(str::to_owned)
        .collect()
}

/// One marker per audio/video section, defaulted when the attributes are missing
pub fn twcc_markers(desc: &SessionDescription) -> Vec<TwccMarker> {
    desc.media_descriptions
        .iter()
        .filter(|media| {
            let kind = media.media_name.media.as_str();
            kind == MEDIA_AUDIO || kind == MEDIA_VIDEO
        })
        .map(section_marker)
        .collect()
}

fn section_marker(media: &MediaDescription) -> TwccMarker {
    let mut marker = TwccMarker::default();

    for attr in &media.attributes {
        let Some(value) = attr.value.as_deref() else {
            continue;
        };

        if attr.key == ATTR_KEY_EXT_MAP && value.ends_with(TRANSPORT_CC_URI) {
            marker.ext_id = leading_number(value);
        } else if attr.key == ATTR_KEY_MSID {
            marker.stream_id = value
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_owned();
        }

        if marker.ext_id != 0 && !marker.stream_id.is_empty() {
            break;
        }
    }

    marker
}

/// Leading decimal digits of an `extmap` value (`"3/sendrecv uri"` -> 3)
fn leading_number(value: &str) -> u8 {
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    fn parse(sdp: &str) -> SessionDescription {
        RTCSessionDescription::offer(sdp.to_owned())
            .unwrap()
            .unmarshal()
            .unwrap()
    }

    const HEADER: &str = "v=0\r\no=- 4215775240449105457 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_twcc_marker_extracted() {
        let sdp = format!(
            "{HEADER}m=video 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\na=extmap:3 {TRANSPORT_CC_URI}\r\na=msid:stream1 track1\r\na=rtpmap:96 VP8/90000\r\n"
        );
        let markers = twcc_markers(&parse(&sdp));
        assert_eq!(
            markers,
            vec![TwccMarker {
                stream_id: "track1".to_string(),
                ext_id: 3
            }]
        );
    }

    #[test]
    fn test_missing_attributes_yield_default_marker() {
        // Boundary case: a bare audio section still produces a ("", 0) marker
        let sdp = format!(
            "{HEADER}m=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\na=rtpmap:111 opus/48000/2\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\nc=IN IP4 0.0.0.0\r\na=mid:1\r\n"
        );
        let markers = twcc_markers(&parse(&sdp));
        assert_eq!(markers, vec![TwccMarker::default()]);
    }

    #[test]
    fn test_other_extmaps_ignored() {
        let sdp = format!(
            "{HEADER}m=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\na=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\na=extmap:12 {TRANSPORT_CC_URI}\r\na=msid:s a\r\n"
        );
        let markers = twcc_markers(&parse(&sdp));
        assert_eq!(markers[0].ext_id, 12);
        assert_eq!(markers[0].stream_id, "a");
    }

    #[test]
    fn test_confirmed_mids() {
        let sdp = format!(
            "{HEADER}m=video 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\na=mid:audio1\r\n"
        );
        let mids = confirmed_mids(&parse(&sdp));
        assert_eq!(mids.len(), 2);
        assert!(mids.contains("0"));
        assert!(mids.contains("audio1"));
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("3 http://example"), 3);
        assert_eq!(leading_number("14/sendonly uri"), 14);
        assert_eq!(leading_number("x uri"), 0);
        assert_eq!(leading_number("999 uri"), 0);
    }
}
