//! Tests for the transport constants and packet math.
use super::*;

#[test]
/// Packet math: 7 bytes per packet, rounded up.
fn test_packet_count() {
    assert_eq!(packet_count(1), 1);
    assert_eq!(packet_count(7), 1);
    assert_eq!(packet_count(8), 2);
    assert_eq!(packet_count(21), 3);
    assert_eq!(packet_count(120), 18);
    assert_eq!(packet_count(MAX_BAM_PAYLOAD as u16), 255);
    assert_eq!(packet_count(0), 0);
}

#[test]
/// Only the deployed tag pool is accepted.
fn test_session_tag_pool() {
    for tag in SESSION_TAGS {
        assert!(is_valid_session_tag(tag));
    }
    for tag in [0, 1, 4, 5, 8, 9, 12, 13, 14, 15] {
        assert!(!is_valid_session_tag(tag));
    }
}

#[test]
/// Tags map onto their log labels.
fn test_session_names() {
    assert_eq!(session_name(2), "A");
    assert_eq!(session_name(11), "F");
    assert_eq!(session_name(5), "Unknown");
}
