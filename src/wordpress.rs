//! Client for the Seesturm editorial REST API. Posts are fetched in
//! offset/length windows; each response carries the current total so the
//! caller can tell whether further pages exist.

use crate::page::{FetchError, Page, PageFetcher, PageRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use tracing::{info, warn};

const SEESTURM_API_BASE: &str = "https://seesturm.ch/wp-json/seesturmAppCustomEndpoints/v2/";

#[derive(Clone)]
pub struct WordpressApi {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for WordpressApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordpressApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// One post as delivered by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WordpressPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub published: String,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    posts: Vec<WordpressPost>,
    #[serde(rename = "totalPosts")]
    total_posts: u64,
}

impl WordpressApi {
    pub fn new() -> Self {
        let base_url = Url::parse(SEESTURM_API_BASE).expect("valid default API URL");
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("seesturm-sync/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    /// Posts endpoint for an offset/length window.
    pub fn posts_url(&self, start: u64, length: u32) -> Result<Url> {
        let mut url = self.base_url.join("posts").context("invalid API base URL")?;
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("length", &length.to_string());
        Ok(url)
    }

    async fn fetch_posts(&self, start: u64, length: u32) -> Result<PostsResponse, FetchError> {
        let url = self
            .posts_url(start, length)
            .map_err(|err| FetchError::Other(err.to_string()))?;
        info!(%url, "fetching posts window");

        let res = self.http.get(url).send().await.map_err(classify_reqwest)?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("rate limited by posts API");
            return Err(FetchError::Other("received 429 from posts API".into()));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "posts API error");
            return Err(FetchError::Other(format!("posts API error {status}: {body}")));
        }

        res.json::<PostsResponse>()
            .await
            .map_err(|err| FetchError::Other(format!("invalid posts response JSON: {err}")))
    }
}

impl Default for WordpressApi {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_connect() || err.is_timeout() {
        FetchError::Offline
    } else {
        FetchError::Other(err.to_string())
    }
}

#[async_trait]
impl PageFetcher for WordpressApi {
    type Item = WordpressPost;

    async fn fetch_page(&self, request: PageRequest) -> Result<Page<WordpressPost>, FetchError> {
        let response = self.fetch_posts(request.offset, request.page_size).await?;
        Ok(Page {
            items: response.posts,
            next_page_token: None,
            total_available: Some(response.total_posts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_url_carries_window_parameters() {
        let api = WordpressApi::new();
        let url = api.posts_url(10, 5).unwrap();
        assert_eq!(
            url.path(),
            "/wp-json/seesturmAppCustomEndpoints/v2/posts"
        );
        assert_eq!(url.query(), Some("start=10&length=5"));
    }

    #[test]
    fn posts_response_deserializes_api_shape() {
        let raw = r#"{
            "posts": [
                {
                    "id": 42,
                    "title": "Sommerlager 2024",
                    "content": "<p>Packliste folgt.</p>",
                    "imageUrl": "https://seesturm.ch/wp-content/uploads/sola.jpg",
                    "published": "2024-06-01T08:00:00"
                },
                {
                    "id": 43,
                    "title": "Ohne Bild",
                    "content": "",
                    "imageUrl": null,
                    "published": "2024-06-02T08:00:00"
                }
            ],
            "totalPosts": 12
        }"#;
        let parsed: PostsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.total_posts, 12);
        assert_eq!(parsed.posts.len(), 2);
        assert_eq!(parsed.posts[0].id, 42);
        assert_eq!(
            parsed.posts[0].image_url.as_deref(),
            Some("https://seesturm.ch/wp-content/uploads/sola.jpg")
        );
        assert!(parsed.posts[1].image_url.is_none());
    }
}
