// src/services/github.rs

//! GitHub REST API implementation of [`RepoSource`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ContentEntry, GithubConfig, Release, RepoInfo, SearchPage};
use crate::services::RepoSource;
use crate::utils::http::{check_response, create_async_client};

/// Releases fetched per repository; only the newest stable one matters.
const RELEASES_PER_PAGE: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_count: usize,
    #[serde(default)]
    items: Vec<RepoInfo>,
}

/// The contents endpoint answers with a list for directories and a single
/// object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentEntry>),
    Single(ContentEntry),
}

/// Repository source backed by the GitHub REST API.
pub struct GithubSource {
    client: Client,
    api_url: Url,
}

impl GithubSource {
    /// Create a source with a client built from the configuration.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = create_async_client(config)?;
        Self::with_client(client, &config.api_url)
    }

    /// Create a source around an existing client.
    pub fn with_client(client: Client, api_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            api_url: Url::parse(api_url)?,
        })
    }

    /// Shared HTTP client, also used to download release archives.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Build an API URL from path segments; segments may contain slashes.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config(format!("Invalid API URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(
                segments
                    .iter()
                    .flat_map(|segment| segment.split('/'))
                    .filter(|part| !part.is_empty()),
            );
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let response = check_response(response, what).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RepoSource for GithubSource {
    async fn search(
        &self,
        query: &str,
        sort: &str,
        page: usize,
        per_page: usize,
    ) -> Result<SearchPage> {
        let mut url = self.endpoint(&["search", "repositories"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", sort)
            .append_pair("order", "desc")
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());

        let response: SearchResponse = self.get_json(url, "search").await?;
        Ok(SearchPage {
            total_count: response.total_count,
            items: response.items,
        })
    }

    async fn get_item(&self, full_name: &str) -> Result<RepoInfo> {
        let url = self.endpoint(&["repos", full_name])?;
        let repo: RepoInfo = self.get_json(url, full_name).await?;

        // Renamed repositories redirect; the search lists them under the new name.
        if !repo.full_name.eq_ignore_ascii_case(full_name) {
            log::info!("{} has moved to {}", full_name, repo.full_name);
            return Err(AppError::not_found(full_name));
        }
        Ok(repo)
    }

    async fn get_releases(&self, full_name: &str) -> Result<Vec<Release>> {
        let mut url = self.endpoint(&["repos", full_name, "releases"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &RELEASES_PER_PAGE.to_string());
        self.get_json(url, full_name).await
    }

    async fn get_contents(&self, full_name: &str, path: &str) -> Result<Vec<ContentEntry>> {
        let url = self.endpoint(&["repos", full_name, "contents", path])?;
        let what = format!("{full_name}:{path}");
        match self.get_json::<ContentsResponse>(url, &what).await? {
            ContentsResponse::Listing(entries) => Ok(entries),
            ContentsResponse::Single(entry) => Ok(vec![entry]),
        }
    }
}
