use itertools::Itertools;
use serde::Deserialize;

const GENERATED_KIND: &str = "asr";
const FALLBACK_LANGUAGE: &str = "en";
const SRV3_FORMAT_PARAM: &str = "&fmt=srv3";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub captions: Option<PlayerCaptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCaptions {
    pub player_captions_tracklist_renderer: Option<CaptionTrackList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrackList {
    #[serde(default)]
    pub caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    #[serde(default)]
    pub language_code: String,
    pub name: Option<TrackName>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackName {
    #[serde(default)]
    pub runs: Vec<TextRun>,
    pub simple_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextRun {
    pub text: Option<String>,
}

impl PlayerResponse {
    pub fn caption_tracks(self) -> Vec<CaptionTrack> {
        self.captions
            .and_then(|c| c.player_captions_tracklist_renderer)
            .map(|list| list.caption_tracks)
            .unwrap_or_default()
    }
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some(GENERATED_KIND)
    }

    /// Display name of the track, falling back to its language code.
    pub fn language_name(&self) -> String {
        let name = self.name.as_ref().and_then(|name| {
            name.runs
                .first()
                .and_then(|run| run.text.clone())
                .or_else(|| name.simple_text.clone())
        });

        match name {
            Some(name) if !name.is_empty() => name,
            _ => self.language_code.clone(),
        }
    }

    /// The srv3 variant is a different XML dialect, so ask for the plain one.
    pub fn transcript_url(&self) -> String {
        self.base_url.replacen(SRV3_FORMAT_PARAM, "", 1)
    }
}

/// Primary language subtags in preference order, always ending with `en`.
pub fn build_language_preferences(locales: &[String]) -> Vec<String> {
    locales
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(FALLBACK_LANGUAGE))
        .map(|code| code.trim().to_lowercase())
        .filter_map(|code| code.split('-').next().map(str::to_string))
        .filter(|code| !code.is_empty())
        .unique()
        .collect()
}

/// First track matching a preferred language, else the first track at all.
pub fn select_track<'a>(
    tracks: &[&'a CaptionTrack],
    preferences: &[String],
) -> Option<&'a CaptionTrack> {
    let first = *tracks.first()?;

    let preferred = preferences.iter().find_map(|pref| {
        let prefix = format!("{}-", pref);
        tracks.iter().copied().find(|track| {
            let code = track.language_code.to_lowercase();
            code == *pref || code.starts_with(&prefix)
        })
    });

    Some(preferred.unwrap_or(first))
}

/// Human-authored tracks win over generated ones regardless of language.
pub fn select_best_track<'a>(
    tracks: &'a [CaptionTrack],
    preferences: &[String],
) -> Option<&'a CaptionTrack> {
    let (generated, manual): (Vec<&CaptionTrack>, Vec<&CaptionTrack>) =
        tracks.iter().partition(|track| track.is_generated());

    select_track(&manual, preferences).or_else(|| select_track(&generated, preferences))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_language_preferences, select_best_track, CaptionTrack, PlayerResponse};

    fn track(code: &str, kind: Option<&str>) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://example.com/timedtext?lang={}", code),
            language_code: code.to_string(),
            name: None,
            kind: kind.map(str::to_string),
        }
    }

    fn prefs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn preferences_are_primary_subtags_deduplicated() {
        let locales = prefs(&["en-US", "fr-CA", "EN", "de"]);
        assert_eq!(build_language_preferences(&locales), prefs(&["en", "fr", "de"]));
        assert_eq!(build_language_preferences(&[]), prefs(&["en"]));
    }

    #[test]
    fn manual_track_follows_preference_order() {
        let tracks = vec![track("en", None), track("fr", None)];
        let selected = select_best_track(&tracks, &prefs(&["fr", "en"])).unwrap();
        assert_eq!(selected.language_code, "fr");
    }

    #[test]
    fn regional_code_matches_primary_preference() {
        let tracks = vec![track("de", None), track("pt-BR", None)];
        let selected = select_best_track(&tracks, &prefs(&["pt"])).unwrap();
        assert_eq!(selected.language_code, "pt-BR");
    }

    #[test]
    fn manual_track_in_any_language_beats_generated() {
        let tracks = vec![track("en", Some("asr")), track("ja", None)];
        let selected = select_best_track(&tracks, &prefs(&["en"])).unwrap();
        assert_eq!(selected.language_code, "ja");
        assert!(!selected.is_generated());
    }

    #[test]
    fn generated_tracks_use_same_preference_logic() {
        let tracks = vec![track("es", Some("asr")), track("fr", Some("asr"))];
        let selected = select_best_track(&tracks, &prefs(&["fr", "en"])).unwrap();
        assert_eq!(selected.language_code, "fr");
        assert!(selected.is_generated());
    }

    #[test]
    fn no_tracks_selects_nothing() {
        assert!(select_best_track(&[], &prefs(&["en"])).is_none());
    }

    #[test]
    fn srv3_format_is_stripped() {
        let mut t = track("en", None);
        t.base_url = "https://example.com/api/timedtext?v=abc&fmt=srv3&lang=en".to_string();
        assert_eq!(
            t.transcript_url(),
            "https://example.com/api/timedtext?v=abc&lang=en"
        );
    }

    #[test]
    fn player_response_tracks_and_names() {
        let response: PlayerResponse = serde_json::from_value(json!({
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {
                            "baseUrl": "https://example.com/a",
                            "languageCode": "en",
                            "name": {"runs": [{"text": "English"}]}
                        },
                        {
                            "baseUrl": "https://example.com/b",
                            "languageCode": "fr",
                            "kind": "asr"
                        }
                    ]
                }
            }
        }))
        .unwrap();

        let tracks = response.caption_tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language_name(), "English");
        assert_eq!(tracks[1].language_name(), "fr");
        assert!(tracks[1].is_generated());

        let empty: PlayerResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.caption_tracks().is_empty());
    }
}
