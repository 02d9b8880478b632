use std::collections::BTreeSet;

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use serde::{Deserialize, Serialize};

pub const TRANSCRIPT_SOURCE: &str = "youtube-transcript";

const VOID_ELEMENTS: [&str; 4] = ["br", "hr", "img", "wbr"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptData {
    pub video_id: String,
    pub language: String,
    pub language_code: String,
    pub is_generated: bool,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub duration: f64,
    pub html: String,
}

pub fn escape_attribute_value(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn parse_seconds(value: Option<String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

struct OpenSegment {
    start: Option<f64>,
    duration: f64,
    html: String,
    /// Inline elements opened inside the segment and not yet closed.
    open_tags: Vec<String>,
}

fn tag_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_lowercase()
}

fn attribute(element: &BytesStart, names: &[&[u8]]) -> Result<Option<String>, quick_xml::Error> {
    for name in names {
        if let Some(attr) = element.try_get_attribute(*name)? {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn open_tag(element: &BytesStart) -> Result<(String, String), quick_xml::Error> {
    let name = tag_name(element.name().as_ref());

    let mut rendered = format!("<{}", name);
    for attr in element.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?;
        rendered.push_str(&format!(" {}=\"{}\"", key, escape_attribute_value(&value)));
    }
    rendered.push('>');

    Ok((name, rendered))
}

/// Parses a timed-text document into segments in document order.
///
/// Segment text keeps inline markup such as `<b>` or `<font color>`, with
/// attribute values re-escaped and text entities decoded. A `<text>` element
/// whose `start` is not a finite number is dropped; malformed XML fails the
/// whole document.
pub fn parse_transcript_xml(xml: &str) -> Result<Vec<TranscriptSegment>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.check_end_names(true);

    let mut segments = Vec::new();
    let mut current: Option<OpenSegment> = None;
    let mut depth: usize = 0;
    let mut seen_root = false;
    let mut tags = BTreeSet::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                seen_root = true;
                match current.as_mut() {
                    Some(segment) => {
                        let (name, rendered) = open_tag(&element)?;
                        segment.html.push_str(&rendered);
                        tags.insert(name.clone());
                        segment.open_tags.push(name);
                    }
                    None if element.name().as_ref() == b"text" => {
                        current = Some(OpenSegment {
                            start: parse_seconds(attribute(&element, &[b"start"])?),
                            duration: parse_seconds(attribute(&element, &[b"dur", b"duration"])?)
                                .unwrap_or(0.0),
                            html: String::new(),
                            open_tags: Vec::new(),
                        });
                    }
                    None => {}
                }
                depth += 1;
            }
            Event::Empty(element) => {
                seen_root = true;
                match current.as_mut() {
                    Some(segment) => {
                        let (name, rendered) = open_tag(&element)?;
                        segment.html.push_str(&rendered);
                        if !VOID_ELEMENTS.contains(&name.as_str()) {
                            segment.html.push_str(&format!("</{}>", name));
                        }
                        tags.insert(name);
                    }
                    None if element.name().as_ref() == b"text" => {
                        if let Some(start) = parse_seconds(attribute(&element, &[b"start"])?) {
                            segments.push(TranscriptSegment {
                                start,
                                duration: parse_seconds(attribute(
                                    &element,
                                    &[b"dur", b"duration"],
                                )?)
                                .unwrap_or(0.0),
                                html: String::new(),
                            });
                        }
                    }
                    None => {}
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if let Some(segment) = current.as_mut() {
                    match segment.open_tags.pop() {
                        Some(name) => {
                            if !VOID_ELEMENTS.contains(&name.as_str()) {
                                segment.html.push_str(&format!("</{}>", name));
                            }
                        }
                        None => {
                            if let Some(done) = current.take() {
                                if let Some(start) = done.start {
                                    segments.push(TranscriptSegment {
                                        start,
                                        duration: done.duration,
                                        html: done.html,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Event::Text(text) => {
                if let Some(segment) = current.as_mut() {
                    segment.html.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(segment) = current.as_mut() {
                    segment
                        .html
                        .push_str(&String::from_utf8_lossy(data.into_inner().as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 || !seen_root {
        return Err(quick_xml::Error::UnexpectedEof(
            "transcript document is incomplete".to_string(),
        ));
    }

    log::debug!(
        "Transcript inline tags: {:?}",
        tags.into_iter().collect::<Vec<_>>()
    );

    Ok(segments)
}

/// Wraps segments into an `<article>` that the markdown converter treats like
/// any other extracted content.
pub fn render_transcript_html(transcript: &TranscriptData) -> String {
    let attr = |name: &str, value: &str| format!("{}=\"{}\"", name, escape_attribute_value(value));

    let paragraphs: String = transcript
        .segments
        .iter()
        .map(|segment| {
            format!(
                "<p {} {}>{}</p>",
                attr("data-start", &format!("{:.3}", segment.start)),
                attr("data-duration", &format!("{:.3}", segment.duration)),
                segment.html
            )
        })
        .collect();

    format!(
        "<article {} {} {}>{}</article>",
        attr("data-mole-source", TRANSCRIPT_SOURCE),
        attr("data-language", &transcript.language_code),
        attr("data-is-generated", &transcript.is_generated.to_string()),
        paragraphs
    )
}
