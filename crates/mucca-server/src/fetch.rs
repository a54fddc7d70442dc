//! HTTP implementation of [`MetadataFetcher`].
//!
//! Downloads the article page and pulls a title and tags out of the HTML
//! head. Only the handful of tags we need are recognised; this is not a
//! general HTML parser.

use std::{collections::BTreeSet, sync::LazyLock, time::Duration};

use mucca_core::enrichment::{Metadata, MetadataFetcher};
use regex::Regex;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} responded with status {status}")]
  Status { url: String, status: u16 },

  #[error("no title found at {0}")]
  MissingTitle(String),
}

/// Fetches article metadata over HTTP.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(timeout)
      .build()?;
    Ok(Self { client })
  }
}

impl MetadataFetcher for HttpFetcher {
  type Error = FetchError;

  async fn fetch<'a>(&'a self, link: &'a Url) -> Result<Metadata, FetchError> {
    let resp = self.client.get(link.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Status { url: link.to_string(), status: status.as_u16() });
    }
    let html = resp.text().await?;
    extract_metadata(&html).ok_or_else(|| FetchError::MissingTitle(link.to_string()))
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

static META_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

static TITLE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Title and tags from an HTML document, `None` if no title can be found.
///
/// The title prefers `og:title` over `<title>`. Tags come from the
/// `keywords` meta and any `article:tag` metas, trimmed and lower-cased.
pub fn extract_metadata(html: &str) -> Option<Metadata> {
  let mut og_title = None;
  let mut tags = BTreeSet::new();

  for tag in META_RE.find_iter(html) {
    let mut key = None;
    let mut content = None;
    for attr in ATTR_RE.captures_iter(tag.as_str()) {
      let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
      match attr[1].to_ascii_lowercase().as_str() {
        "name" | "property" => key = Some(value.to_ascii_lowercase()),
        "content" => content = Some(value),
        _ => {}
      }
    }
    let (Some(key), Some(content)) = (key, content) else { continue };

    match key.as_str() {
      "og:title" => og_title = Some(clean(content)),
      "keywords" => tags.extend(content.split(',').filter_map(normalize_tag)),
      "article:tag" => tags.extend(normalize_tag(content)),
      _ => {}
    }
  }

  let title = og_title
    .filter(|t| !t.is_empty())
    .or_else(|| TITLE_RE.captures(html).map(|c| clean(&c[1])))
    .filter(|t| !t.is_empty())?;

  Some(Metadata { title, tags })
}

fn normalize_tag(raw: &str) -> Option<String> {
  let tag = clean(raw).to_lowercase();
  (!tag.is_empty()).then_some(tag)
}

/// Unescape the common entities and collapse whitespace.
fn clean(raw: &str) -> String {
  let text = raw
    .replace("&nbsp;", " ")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&#x27;", "'")
    .replace("&apos;", "'")
    .replace("&amp;", "&");
  SPACE_RE.replace_all(text.trim(), " ").into_owned()
}
