use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{ElementRef, Html, Selector};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";
const PLATFORM_TITLE_SUFFIX: &str = " - 微信公众平台";
const UNKNOWN_TITLE: &str = "Untitled";

const TITLE_SELECTORS: &[&str] = &["h1#js_title", "h1#activity-name", "h1.rich_media_title"];
const CONTENT_SELECTORS: &[&str] = &["div#js_content", "div.rich_media_content"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArticle {
    pub title: String,
    /// Outer HTML of the article body.
    pub content_html: String,
}

pub trait ArticleFetcher {
    fn fetch(&mut self, url: &str) -> anyhow::Result<FetchedArticle>;
}

/// Downloads article pages over plain HTTP and extracts title and body.
pub struct HttpArticleFetcher {
    client: reqwest::blocking::Client,
    page_delay: Duration,
}

impl HttpArticleFetcher {
    pub fn new(timeout: Duration, page_delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build article http client")?;
        Ok(Self { client, page_delay })
    }
}

impl ArticleFetcher for HttpArticleFetcher {
    fn fetch(&mut self, url: &str) -> anyhow::Result<FetchedArticle> {
        if !self.page_delay.is_zero() {
            std::thread::sleep(self.page_delay);
        }

        tracing::info!(%url, "fetch article page");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .send()
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        let html = response.text().context("read article body")?;

        extract_article(&html)
    }
}

pub fn extract_article(html: &str) -> anyhow::Result<FetchedArticle> {
    let document = Html::parse_document(html);

    let title = extract_title(&document)?.unwrap_or_else(|| UNKNOWN_TITLE.to_owned());

    let mut content = None;
    for css in CONTENT_SELECTORS {
        let selector = parse_selector(css)?;
        if let Some(element) = document.select(&selector).next() {
            content = Some(element.html());
            break;
        }
        tracing::debug!(selector = css, "content selector did not match");
    }
    let content_html = content.ok_or_else(|| anyhow::anyhow!("article content not found"))?;

    tracing::debug!(%title, "parsed article");
    Ok(FetchedArticle {
        title,
        content_html,
    })
}

fn extract_title(document: &Html) -> anyhow::Result<Option<String>> {
    for css in TITLE_SELECTORS {
        let selector = parse_selector(css)?;
        if let Some(title) = document.select(&selector).next().and_then(element_text) {
            return Ok(Some(title));
        }
    }

    let og_title = parse_selector(r#"meta[property="og:title"]"#)?;
    if let Some(title) = document
        .select(&og_title)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
    {
        return Ok(Some(title));
    }

    let title_tag = parse_selector("title")?;
    Ok(document
        .select(&title_tag)
        .next()
        .and_then(element_text)
        .map(|t| t.trim_end_matches(PLATFORM_TITLE_SUFFIX).trim().to_owned())
        .filter(|t| !t.is_empty()))
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse_selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_prefers_platform_title_and_content() -> anyhow::Result<()> {
        let html = r#"<!doctype html>
<html>
  <head><title>Ignored - 微信公众平台</title></head>
  <body>
    <h1 id="js_title">
      Rust   所有权
    </h1>
    <div id="js_content"><p>Body</p></div>
  </body>
</html>"#;

        let article = extract_article(html)?;
        assert_eq!(article.title, "Rust 所有权");
        assert!(article.content_html.starts_with("<div id=\"js_content\">"));
        assert!(article.content_html.contains("<p>Body</p>"));
        Ok(())
    }

    #[test]
    fn extract_falls_back_to_title_tag_and_rich_media_content() -> anyhow::Result<()> {
        let html = r#"<html>
  <head><title>Weekly Notes - 微信公众平台</title></head>
  <body><div class="rich_media_content"><p>Hi</p></div></body>
</html>"#;

        let article = extract_article(html)?;
        assert_eq!(article.title, "Weekly Notes");
        assert!(article.content_html.contains("<p>Hi</p>"));
        Ok(())
    }

    #[test]
    fn extract_uses_placeholder_title() -> anyhow::Result<()> {
        let article = extract_article(r#"<div id="js_content">x</div>"#)?;
        assert_eq!(article.title, UNKNOWN_TITLE);
        Ok(())
    }

    #[test]
    fn extract_fails_without_content() {
        let err = extract_article("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(format!("{err:#}").contains("article content not found"));
    }
}
