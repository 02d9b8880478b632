use url::Url;

const WATCH_HOSTS: [&str; 3] = ["www.youtube.com", "youtube.com", "m.youtube.com"];
const WATCH_PATH: &str = "/watch";
const VIDEO_ID_PARAM: &str = "v";

pub fn is_watch_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed_url) => match parsed_url.host_str() {
            Some(host) if WATCH_HOSTS.contains(&host) => {
                parsed_url.path() == WATCH_PATH
                    && parsed_url.query_pairs().any(|(key, _)| key == VIDEO_ID_PARAM)
            }
            _ => false,
        },
        Err(_) => false,
    }
}

pub fn extract_video_id(url: &str) -> Option<String> {
    if !is_watch_url(url) {
        return None;
    }

    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == VIDEO_ID_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}
