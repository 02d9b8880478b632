use std::sync::LazyLock;

use anyhow::Context;
use async_trait::async_trait;
use htmd::options::{BulletListMarker, CodeBlockStyle, HeadingStyle, Options};
use itertools::Itertools;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::{
    page_record::PageRecord,
    transcript::render_transcript_html,
    watch_url::is_watch_url,
};

use super::TranscriptClient;

const CONTENT_ROOTS: [&str; 3] = ["article", "main", "body"];
const SKIPPED_TAGS: [&str; 3] = ["script", "style", "noscript"];

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("valid img selector"));
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));
static ICON_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel~=icon][href]").expect("valid icon selector"));
static TIME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time[datetime]").expect("valid time selector"));

/// Where a tab's rendered HTML comes from when the event did not carry it.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, url: &str) -> anyhow::Result<String>;
}

pub struct HttpDocumentSource {
    client: Client,
}

impl Default for HttpDocumentSource {
    fn default() -> Self {
        HttpDocumentSource {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_document(&self, url: &str) -> anyhow::Result<String> {
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(html)
    }
}

/// Readable parts of a page, before any transcript substitution.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub author: String,
    pub published: String,
    pub content: String,
    pub description: String,
    pub favicon: String,
    pub image: String,
    pub site: String,
    pub images: Vec<String>,
}

fn meta_content(document: &Html, selectors: &[&str]) -> String {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .filter_map(|meta| meta.value().attr("content"))
                .map(str::trim)
                .find(|content| !content.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn absolute_url(base: Option<&Url>, raw: &str) -> Option<String> {
    let resolved = match base {
        Some(base) => base.join(raw.trim()).ok()?,
        None => Url::parse(raw.trim()).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    CONTENT_ROOTS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
}

pub fn extract_page(url: &str, html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let base = Url::parse(url).ok();

    let title = match meta_content(&document, &[r#"meta[property="og:title"]"#]) {
        t if !t.is_empty() => t,
        _ => document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default(),
    };

    let published = match meta_content(&document, &[r#"meta[property="article:published_time"]"#]) {
        p if !p.is_empty() => p,
        _ => document
            .select(&TIME_SELECTOR)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .unwrap_or_default()
            .to_string(),
    };

    let favicon = document
        .select(&ICON_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| absolute_url(base.as_ref(), href))
        .or_else(|| absolute_url(base.as_ref(), "/favicon.ico"))
        .unwrap_or_default();

    let image = absolute_url(
        base.as_ref(),
        &meta_content(&document, &[r#"meta[property="og:image"]"#]),
    )
    .unwrap_or_default();

    let root = content_root(&document);
    let content = root.map(|r| r.inner_html()).unwrap_or_default();
    let images: Vec<String> = root
        .map(|r| {
            r.select(&IMG_SELECTOR)
                .filter_map(|img| img.value().attr("src"))
                .filter_map(|src| absolute_url(base.as_ref(), src))
                .unique()
                .collect()
        })
        .unwrap_or_default();

    ExtractedPage {
        title,
        author: meta_content(
            &document,
            &[r#"meta[name="author"]"#, r#"meta[property="article:author"]"#],
        ),
        published,
        content,
        description: meta_content(
            &document,
            &[r#"meta[name="description"]"#, r#"meta[property="og:description"]"#],
        ),
        favicon,
        image,
        site: meta_content(&document, &[r#"meta[property="og:site_name"]"#]),
        images,
    }
}

/// Registrable domain of a URL: `news.bbc.co.uk` -> `bbc.co.uk`.
pub fn get_domain(url: &str) -> String {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return String::new();
    };

    let is_ipv4 = host.split('.').count() == 4 && host.split('.').all(|p| p.parse::<u8>().is_ok());
    if host == "localhost" || is_ipv4 || host.starts_with('[') {
        return host;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 2 {
        let second_level = parts[parts.len() - 2];
        let country = parts[parts.len() - 1];
        let is_country_suffix = ["co", "com", "org", "net", "edu", "gov", "mil"]
            .contains(&second_level)
            && country.len() == 2
            && country.chars().all(|c| c.is_ascii_lowercase());

        if is_country_suffix {
            return parts[parts.len() - 3..].join(".");
        }
    }

    parts[parts.len().saturating_sub(2)..].join(".")
}

pub fn html_to_markdown(html: &str) -> anyhow::Result<String> {
    htmd::HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            bullet_list_marker: BulletListMarker::Asterisk,
            ..Default::default()
        })
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build()
        .convert(html)
        .context("Failed to convert content to markdown")
}

pub struct PageExtractor {
    transcripts: TranscriptClient,
}

impl PageExtractor {
    pub fn new(transcripts: TranscriptClient) -> Self {
        PageExtractor { transcripts }
    }

    /// Builds the record for one page, substituting the transcript on watch pages.
    pub async fn extract(&self, url: &str, html: &str) -> anyhow::Result<PageRecord> {
        let mut page = extract_page(url, html);

        if is_watch_url(url) {
            let transcript = self
                .transcripts
                .fetch_transcript(url, html)
                .await
                .map_err(|failure| {
                    log::error!("Transcript failed ({}) for {}", failure.reason(), url);
                    anyhow::Error::new(failure)
                })?;
            log::info!(
                "Using {} transcript segments for {}",
                transcript.segments.len(),
                url
            );
            page.content = render_transcript_html(&transcript);
        }

        let markdown = match page.content.is_empty() {
            true => String::new(),
            false => html_to_markdown(&page.content)?,
        };

        Ok(PageRecord {
            title: page.title,
            url: url.to_string(),
            author: page.author,
            published: page.published,
            content: page.content,
            markdown,
            description: page.description,
            domain: get_domain(url),
            favicon: page.favicon,
            image: page.image,
            site: page.site,
            timestamp: chrono::Utc::now().timestamp_millis(),
            images: page.images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_page, get_domain, html_to_markdown, PageExtractor};
    use crate::{configuration::TranscriptSettings, services::TranscriptClient};

    const ARTICLE: &str = r#"<html>
        <head>
            <title>  Fallback title </title>
            <meta property="og:title" content="Real Title">
            <meta name="author" content="Ada Lovelace">
            <meta name="description" content="About engines">
            <meta property="article:published_time" content="2024-05-01T10:00:00Z">
            <meta property="og:image" content="/cover.png">
            <meta property="og:site_name" content="Engines Weekly">
            <link rel="shortcut icon" href="/static/icon.png">
        </head>
        <body>
            <nav>menu</nav>
            <article>
                <h1>Analytical engine</h1>
                <p>It <strong>weaves</strong> patterns.</p>
                <img src="img/loom.png">
                <img src="//cdn.example.com/a.jpg">
                <img src="img/loom.png">
                <img src="data:image/png;base64,AAAA">
                <script>track()</script>
            </article>
        </body>
    </html>"#;

    fn extractor() -> PageExtractor {
        PageExtractor::new(TranscriptClient::new(TranscriptSettings {
            player_endpoint: "http://127.0.0.1:9/player".to_string(),
            client_name: "ANDROID".to_string(),
            client_version: "20.10.38".to_string(),
            languages: vec![],
        }))
    }

    #[test]
    fn extracts_metadata_and_absolute_images() {
        let page = extract_page("https://blog.example.com/posts/engine.html", ARTICLE);

        assert_eq!(page.title, "Real Title");
        assert_eq!(page.author, "Ada Lovelace");
        assert_eq!(page.description, "About engines");
        assert_eq!(page.published, "2024-05-01T10:00:00Z");
        assert_eq!(page.site, "Engines Weekly");
        assert_eq!(page.image, "https://blog.example.com/cover.png");
        assert_eq!(page.favicon, "https://blog.example.com/static/icon.png");
        assert_eq!(
            page.images,
            vec![
                "https://blog.example.com/posts/img/loom.png",
                "https://cdn.example.com/a.jpg",
            ]
        );
        assert!(page.content.contains("Analytical engine"));
        assert!(!page.content.contains("menu"));
    }

    #[test]
    fn falls_back_to_title_tag_and_default_favicon() {
        let page = extract_page(
            "https://example.com/a",
            "<html><head><title> Plain </title></head><body><p>Body text</p></body></html>",
        );

        assert_eq!(page.title, "Plain");
        assert_eq!(page.favicon, "https://example.com/favicon.ico");
        assert!(page.content.contains("Body text"));
    }

    #[test]
    fn domain_heuristics() {
        assert_eq!(get_domain("https://news.bbc.co.uk/story"), "bbc.co.uk");
        assert_eq!(get_domain("https://www.example.com/"), "example.com");
        assert_eq!(get_domain("https://a.b.example.org/x"), "example.org");
        assert_eq!(get_domain("http://localhost:3000/"), "localhost");
        assert_eq!(get_domain("http://192.168.1.20/admin"), "192.168.1.20");
        assert_eq!(get_domain("https://example.com.au"), "example.com.au");
        assert_eq!(get_domain("not a url"), "");
    }

    #[test]
    fn markdown_skips_scripts() {
        let markdown = html_to_markdown("<h1>Title</h1><script>evil()</script><p>Text</p>").unwrap();
        assert!(markdown.contains("# Title"));
        assert!(markdown.contains("Text"));
        assert!(!markdown.contains("evil"));
    }

    #[tokio::test]
    async fn builds_page_record() {
        let record = extractor()
            .extract("https://blog.example.com/posts/engine.html", ARTICLE)
            .await
            .unwrap();

        assert_eq!(record.domain, "example.com");
        assert_eq!(record.url, "https://blog.example.com/posts/engine.html");
        assert!(record.markdown.contains("**weaves**"));
        assert!(!record.markdown.contains("track()"));
        assert!(record.timestamp > 0);
    }

    #[tokio::test]
    async fn watch_page_without_api_key_fails_extraction() {
        let error = extractor()
            .extract(
                "https://www.youtube.com/watch?v=abc123",
                "<html><body>video</body></html>",
            )
            .await
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "YouTube transcript unavailable: unable to locate Innertube API key."
        );
    }
}
