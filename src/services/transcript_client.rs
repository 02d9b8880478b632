use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::{
    configuration::TranscriptSettings,
    domain::{
        caption_track::{build_language_preferences, select_best_track, PlayerResponse},
        transcript::{parse_transcript_xml, TranscriptData},
        watch_url::extract_video_id,
    },
};

static API_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([a-zA-Z0-9_-]+)""#).expect("valid api key pattern")
});

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid script selector"));

#[derive(Debug, thiserror::Error)]
pub enum TranscriptFailure {
    #[error("YouTube transcript unavailable: missing video identifier.")]
    MissingVideoId,
    #[error("YouTube transcript unavailable: unable to locate Innertube API key.")]
    MissingApiKey,
    #[error("YouTube transcript unavailable: failed to load player data.")]
    FetchError(#[source] reqwest::Error),
    #[error("YouTube transcript unavailable: captions are disabled for this video.")]
    CaptionsDisabled,
    #[error("YouTube transcript unavailable: no captions found in any language.")]
    NoCaptions,
    #[error("YouTube transcript unavailable: unable to download transcript data.")]
    TranscriptFetchError(#[source] reqwest::Error),
    #[error("YouTube transcript unavailable: transcript data could not be parsed.")]
    ParsingError(#[source] quick_xml::Error),
}

impl TranscriptFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            TranscriptFailure::MissingVideoId => "missing-video-id",
            TranscriptFailure::MissingApiKey => "missing-api-key",
            TranscriptFailure::FetchError(_) => "fetch-error",
            TranscriptFailure::CaptionsDisabled => "captions-disabled",
            TranscriptFailure::NoCaptions => "no-captions",
            TranscriptFailure::TranscriptFetchError(_) => "transcript-fetch-error",
            TranscriptFailure::ParsingError(_) => "parsing-error",
        }
    }
}

/// First inline script (document order) carrying the Innertube API key.
pub fn extract_api_key(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document.select(&SCRIPT_SELECTOR).find_map(|script| {
        let text: String = script.text().collect();
        API_KEY_PATTERN
            .captures(&text)
            .and_then(|captures| captures.get(1))
            .map(|key| key.as_str().to_string())
    })
}

#[derive(Serialize)]
struct PlayerQuery<'a> {
    key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientIdentity<'a> {
    client_name: &'a str,
    client_version: &'a str,
}

#[derive(Serialize)]
struct PlayerContext<'a> {
    client: ClientIdentity<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerRequest<'a> {
    context: PlayerContext<'a>,
    video_id: &'a str,
}

pub struct TranscriptClient {
    client: Client,
    settings: TranscriptSettings,
}

impl TranscriptClient {
    pub fn new(settings: TranscriptSettings) -> Self {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_default();

        TranscriptClient { client, settings }
    }

    /// Fetches the transcript for a rendered watch page.
    pub async fn fetch_transcript(
        &self,
        page_url: &str,
        page_html: &str,
    ) -> Result<TranscriptData, TranscriptFailure> {
        let video_id = extract_video_id(page_url).ok_or(TranscriptFailure::MissingVideoId)?;
        let api_key = extract_api_key(page_html).ok_or(TranscriptFailure::MissingApiKey)?;

        let player_response = self
            .fetch_player_response(&video_id, &api_key)
            .await
            .map_err(TranscriptFailure::FetchError)?;

        let tracks = player_response.caption_tracks();
        if tracks.is_empty() {
            return Err(TranscriptFailure::CaptionsDisabled);
        }

        let preferences = build_language_preferences(&self.settings.languages);
        let track =
            select_best_track(&tracks, &preferences).ok_or(TranscriptFailure::NoCaptions)?;

        log::info!(
            "Selected {} caption track '{}' for video {}",
            match track.is_generated() {
                true => "generated",
                false => "manual",
            },
            track.language_code,
            video_id
        );

        let xml = self
            .fetch_transcript_xml(&track.transcript_url())
            .await
            .map_err(TranscriptFailure::TranscriptFetchError)?;

        let segments = parse_transcript_xml(&xml).map_err(TranscriptFailure::ParsingError)?;

        Ok(TranscriptData {
            video_id,
            language: track.language_name(),
            language_code: track.language_code.clone(),
            is_generated: track.is_generated(),
            segments,
        })
    }

    async fn fetch_player_response(
        &self,
        video_id: &str,
        api_key: &str,
    ) -> Result<PlayerResponse, reqwest::Error> {
        let body = PlayerRequest {
            context: PlayerContext {
                client: ClientIdentity {
                    client_name: &self.settings.client_name,
                    client_version: &self.settings.client_version,
                },
            },
            video_id,
        };

        self.client
            .post(&self.settings.player_endpoint)
            .query(&PlayerQuery { key: api_key })
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<PlayerResponse>()
            .await
    }

    async fn fetch_transcript_xml(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}
