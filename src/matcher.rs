//! Keyword matching
//!
//! First hit in pool order wins. There is no scoring: a keyword either appears
//! (case-insensitively) in the searched field or it doesn't.

use crate::devices::{AudioEndpointRecord, DisplayRecord};

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// First display whose name contains `keyword`
#[must_use]
pub fn find_display<'a>(keyword: &str, pool: &'a [DisplayRecord]) -> Option<&'a DisplayRecord> {
    let keyword = keyword.to_lowercase();
    pool.iter().find(|d| contains_ignore_case(&d.name, &keyword))
}

/// First endpoint whose name or description contains `keyword`
#[must_use]
pub fn find_audio<'a>(
    keyword: &str,
    pool: &'a [AudioEndpointRecord],
) -> Option<&'a AudioEndpointRecord> {
    let keyword = keyword.to_lowercase();
    pool.iter().find(|e| {
        contains_ignore_case(&e.name, &keyword) || contains_ignore_case(&e.description, &keyword)
    })
}

/// Try each keyword in order, stopping at the first that matches anything
#[must_use]
pub fn first_display_match<'a, S: AsRef<str>>(
    keywords: &[S],
    pool: &'a [DisplayRecord],
) -> Option<&'a DisplayRecord> {
    keywords.iter().find_map(|k| find_display(k.as_ref(), pool))
}

/// Audio counterpart of [`first_display_match`]
#[must_use]
pub fn first_audio_match<'a, S: AsRef<str>>(
    keywords: &[S],
    pool: &'a [AudioEndpointRecord],
) -> Option<&'a AudioEndpointRecord> {
    keywords.iter().find_map(|k| find_audio(k.as_ref(), pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{display, sink};
    use test_case::test_case;

    #[test]
    fn first_candidate_in_pool_order_wins() {
        let pool = vec![display("HDMI-1"), display("hdmi-2")];
        assert_eq!(find_display("hdmi", &pool).unwrap().name, "HDMI-1");
    }

    #[test_case("DP", Some("DP-1") ; "prefix")]
    #[test_case("dp-1", Some("DP-1") ; "case insensitive")]
    #[test_case("-0", Some("HDMI-0") ; "substring")]
    #[test_case("VGA", None ; "absent")]
    fn display_match(keyword: &str, expected: Option<&str>) {
        let pool = vec![display("HDMI-0"), display("DP-1")];
        assert_eq!(find_display(keyword, &pool).map(|d| d.name.as_str()), expected);
    }

    #[test]
    fn audio_matches_description_too() {
        let pool = vec![
            sink("0", "alsa_output.pci-0000_00_1f.3.analog-stereo", "Built-in Audio Analog Stereo"),
            sink("1", "alsa_output.pci-0000_01_00.1.hdmi-stereo", "TU104 HDMI Audio"),
        ];
        assert_eq!(find_audio("built-in", &pool).unwrap().id, "0");
        assert_eq!(find_audio("HDMI", &pool).unwrap().id, "1");
        assert!(find_audio("bluez", &pool).is_none());
    }

    #[test]
    fn keyword_order_beats_pool_order() {
        let pool = vec![display("DP-1"), display("HDMI-0")];
        let hit = first_display_match(&["HDMI-0", "DP"], &pool).unwrap();
        assert_eq!(hit.name, "HDMI-0");
    }

    #[test]
    fn empty_pool_or_keywords_match_nothing() {
        let keywords: [&str; 0] = [];
        assert!(first_display_match(&keywords, &[display("DP-1")]).is_none());
        assert!(first_audio_match(&["hdmi"], &[]).is_none());
    }
}
