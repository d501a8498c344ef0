use super::SdpParseError;
use super::parser::SdpParser;
use super::raop::*;
use crate::audio::AudioCodec;

const SAMPLE_SDP: &str = r"v=0
o=iTunes 3413821438 0 IN IP4 192.168.1.100
s=iTunes
c=IN IP4 192.168.1.1
t=0 0
m=audio 0 RTP/AVP 96
a=rtpmap:96 AppleLossless
a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100
a=rsaaeskey:VGhpcyBpcyBhIHRlc3Qga2V5IHRoYXQgaXMgdXNlZCBmb3IgdGVzdGluZw
a=aesiv:MDEyMzQ1Njc4OWFiY2RlZg
a=min-latency:11025
";

const SIMPLE_SDP: &str = r"v=0
o=- 0 0 IN IP4 127.0.0.1
s=AirTunes
t=0 0
m=audio 0 RTP/AVP 96
a=rtpmap:96 AppleLossless
a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100
";

const PCM_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=Test\r\nt=0 0\r\nm=audio 0 RTP/AVP 96\r\na=rtpmap:96 L16/48000/1\r\n";

#[test]
fn test_detect_codec_alac() {
    let sdp = SdpParser::parse(SIMPLE_SDP).unwrap();
    let audio = sdp.audio_media().unwrap();
    assert_eq!(detect_codec(audio), Some(AudioCodec::Alac));
}

#[test]
fn test_parse_alac_parameters() {
    let params = AlacParameters::parse("96 352 0 16 40 10 14 2 255 0 0 44100").unwrap();
    assert_eq!(params.frames_per_packet, 352);
    assert_eq!(params.bit_depth, 16);
    assert_eq!(params.channels, 2);
    assert_eq!(params.sample_rate, 44100);
}

#[test]
fn test_parse_alac_parameters_no_payload_type() {
    let params = AlacParameters::parse("352 0 16 40 10 14 2 255 0 0 44100").unwrap();
    assert_eq!(params.max_run, 255);
    assert_eq!(params.sample_rate, 44100);
}

#[test]
fn test_parse_alac_rejects_garbage() {
    assert!(AlacParameters::parse("96 352 0").is_err());
    assert!(AlacParameters::parse("96 x 0 16 40 10 14 2 255 0 0 44100").is_err());
}

#[test]
fn test_magic_cookie_layout() {
    let params = AlacParameters::parse("352 0 16 40 10 14 2 255 0 0 44100").unwrap();
    let cookie = params.magic_cookie();
    assert_eq!(&cookie[0..4], &352u32.to_be_bytes());
    assert_eq!(cookie[5], 16);
    assert_eq!(cookie[9], 2);
    assert_eq!(&cookie[20..24], &44100u32.to_be_bytes());
}

#[test]
fn test_parse_encryption_params_unpadded() {
    let sdp = SdpParser::parse(SAMPLE_SDP).unwrap();
    let enc = parse_encryption(&sdp).unwrap().unwrap();
    assert_eq!(&enc.aes_iv, b"0123456789abcdef");
    assert!(!enc.encrypted_aes_key.is_empty());
}

#[test]
fn test_extract_alac_stream() {
    let sdp = SdpParser::parse(SAMPLE_SDP).unwrap();
    let params = extract_stream_parameters(&sdp).unwrap();
    assert_eq!(params.codec, AudioCodec::Alac);
    assert_eq!(params.sample_rate, 44100);
    assert_eq!(params.frames_per_packet, 352);
    assert_eq!(params.min_latency, Some(11025));
    assert!(params.encryption.is_some());
    assert!(params.alac.is_some());
}

#[test]
fn test_extract_pcm_uses_rtpmap_format() {
    let sdp = SdpParser::parse(PCM_SDP).unwrap();
    let params = extract_stream_parameters(&sdp).unwrap();
    assert_eq!(params.codec, AudioCodec::Pcm);
    assert_eq!(params.sample_rate, 48000);
    assert_eq!(params.channels, 1);
    assert!(params.encryption.is_none());
}

#[test]
fn test_missing_audio_media() {
    let sdp = SdpParser::parse("v=0\r\ns=x\r\n").unwrap();
    assert!(matches!(
        extract_stream_parameters(&sdp),
        Err(SdpParseError::MissingField("audio media"))
    ));
}

#[test]
fn test_aac_eld_detection() {
    let sdp = SdpParser::parse(
        "v=0\r\nm=audio 0 RTP/AVP 96\r\na=rtpmap:96 mpeg4-generic/44100/2\r\na=fmtp:96 mode=AAC-eld; constantDuration=480\r\n",
    )
    .unwrap();
    assert_eq!(detect_codec(sdp.audio_media().unwrap()), Some(AudioCodec::AacEld));
}
