use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use scraper::Html;
use url::Url;

pub trait ImageDownloader {
    fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()>;
}

pub struct HttpImageDownloader {
    client: reqwest::blocking::Client,
}

impl HttpImageDownloader {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build image http client")?;
        Ok(Self { client })
    }
}

impl ImageDownloader for HttpImageDownloader {
    fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let bytes = response.bytes().context("read image body")?;
        std::fs::write(dest, &bytes).with_context(|| format!("write image: {}", dest.display()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedHtml {
    pub html: String,
    pub saved: usize,
    pub failed: usize,
}

/// Downloads every `<img>` of `html` into `group_dir` and points it at the
/// local copy (`<link_dir>/img_<n><ext>`).
///
/// Images that fail to download keep their original reference.
pub fn localize_images(
    html: &str,
    page_url: Option<&Url>,
    group_dir: &Path,
    link_dir: &str,
    downloader: &dyn ImageDownloader,
) -> anyhow::Result<LocalizedHtml> {
    let sources = image_sources(html)?;
    tracing::info!(count = sources.len(), "images found");

    // Keyed by the raw attribute value, exactly as the rewriter will see it.
    let mut local_by_source: HashMap<String, String> = HashMap::new();
    let mut failed = 0_usize;
    let mut seen: HashSet<&str> = HashSet::new();
    for raw in &sources {
        if !seen.insert(raw.as_str()) {
            continue;
        }
        let source = decode_attribute(raw);
        let absolute = match resolve_image_url(&source, page_url) {
            Some(url) => url,
            None => {
                tracing::warn!(src = %source, "skip image with unusable url");
                failed += 1;
                continue;
            }
        };

        std::fs::create_dir_all(group_dir)
            .with_context(|| format!("create image dir: {}", group_dir.display()))?;
        let file_name = format!("img_{}{}", local_by_source.len(), image_extension(&absolute));
        let dest = group_dir.join(&file_name);
        match downloader.download(&absolute, &dest) {
            Ok(()) => {
                tracing::info!(file = %file_name, "image saved");
                local_by_source.insert(raw.clone(), format!("{link_dir}/{file_name}"));
            }
            Err(err) => {
                tracing::error!(src = %absolute, err = format!("{err:#}"), "image download failed");
                let _ = std::fs::remove_file(&dest);
                failed += 1;
            }
        }
    }

    let saved = local_by_source.len();
    if saved == 0 {
        return Ok(LocalizedHtml {
            html: html.to_owned(),
            saved,
            failed,
        });
    }

    let html = rewrite_image_sources(html, &local_by_source)?;

    Ok(LocalizedHtml {
        html,
        saved,
        failed,
    })
}

/// `data-src` (lazy-loaded) or `src` of an `<img>`, raw as written in the markup.
fn raw_image_source(el: &lol_html::html_content::Element<'_, '_>) -> Option<String> {
    el.get_attribute("data-src")
        .or_else(|| el.get_attribute("src"))
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty() && !s.starts_with("data:"))
}

/// Raw sources of every `<img>`, in document order.
fn image_sources(html: &str) -> anyhow::Result<Vec<String>> {
    let sources = RefCell::new(Vec::new());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("img", |el| {
                if let Some(src) = raw_image_source(el) {
                    sources.borrow_mut().push(src);
                }
                Ok(())
            })],
            ..lol_html::Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes()).context("scan image references")?;
    rewriter.end().context("finish image scan")?;
    Ok(sources.into_inner())
}

/// Resolves character references (`&amp;` and friends) in a raw attribute value.
fn decode_attribute(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let markup = format!(r#"<img src="{}">"#, raw.replace('"', "&quot;"));
    let fragment = Html::parse_fragment(&markup);
    let Ok(selector) = crate::fetch::parse_selector("img") else {
        return raw.to_owned();
    };
    fragment
        .select(&selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map_or_else(|| raw.to_owned(), str::to_owned)
}

fn resolve_image_url(source: &str, page_url: Option<&Url>) -> Option<String> {
    let source = source.strip_prefix("//").map_or_else(
        || source.to_owned(),
        |rest| format!("https://{rest}"),
    );
    let url = match Url::parse(&source) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => page_url?.join(&source).ok()?,
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn image_extension(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.contains("png") {
        ".png"
    } else if lower.contains("gif") {
        ".gif"
    } else if lower.contains("webp") {
        ".webp"
    } else {
        ".jpg"
    }
}

fn rewrite_image_sources(html: &str, links: &HashMap<String, String>) -> anyhow::Result<String> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("img", |el| {
                if let Some(link) = raw_image_source(el).and_then(|src| links.get(&src)) {
                    el.set_attribute("src", link)?;
                    el.remove_attribute("data-src");
                }
                Ok(())
            })],
            ..lol_html::Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter
        .write(html.as_bytes())
        .context("rewrite image references")?;
    rewriter.end().context("finish image rewrite")?;

    String::from_utf8(output).context("rewritten html is not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDownloader {
        requested: RefCell<Vec<String>>,
        fail_containing: Option<&'static str>,
    }

    impl ImageDownloader for RecordingDownloader {
        fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
            self.requested.borrow_mut().push(url.to_owned());
            if self.fail_containing.is_some_and(|needle| url.contains(needle)) {
                anyhow::bail!("simulated failure");
            }
            std::fs::write(dest, b"img")?;
            Ok(())
        }
    }

    #[test]
    fn localize_rewrites_and_tolerates_failures() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let group_dir = temp.path().join("images").join("T_0123abcd");
        let downloader = RecordingDownloader {
            fail_containing: Some("broken"),
            ..RecordingDownloader::default()
        };
        let page = Url::parse("https://mp.example/s/abc")?;
        let html = r#"<div>
<img data-src="https://img.example/a?wx_fmt=png&amp;from=appmsg" src="placeholder.gif">
<img src="https://img.example/broken.jpg">
<img src="/static/c">
<img src="data:image/png;base64,AAAA">
</div>"#;

        let out = localize_images(html, Some(&page), &group_dir, "images/T_0123abcd", &downloader)?;

        assert_eq!(out.saved, 2);
        assert_eq!(out.failed, 1);
        assert_eq!(
            *downloader.requested.borrow(),
            vec![
                "https://img.example/a?wx_fmt=png&from=appmsg".to_owned(),
                "https://img.example/broken.jpg".to_owned(),
                "https://mp.example/static/c".to_owned(),
            ]
        );
        assert!(out.html.contains(r#"src="images/T_0123abcd/img_0.png""#));
        assert!(!out.html.contains("data-src"));
        assert!(out.html.contains("https://img.example/broken.jpg"));
        assert!(out.html.contains(r#"src="images/T_0123abcd/img_1.jpg""#));
        assert!(group_dir.join("img_0.png").exists());
        assert!(group_dir.join("img_1.jpg").exists());
        Ok(())
    }

    #[test]
    fn image_tags_outside_img_do_not_shift_links() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let group_dir = temp.path().join("images").join("g");
        let downloader = RecordingDownloader::default();
        let page = Url::parse("https://i.example/s/abc")?;
        let html = "<div><image src=x.jpg><img src=a.png><img src=b.gif></div>";

        let out = localize_images(html, Some(&page), &group_dir, "images/g", &downloader)?;

        assert_eq!(out.saved, 2);
        assert_eq!(
            *downloader.requested.borrow(),
            vec![
                "https://i.example/s/a.png".to_owned(),
                "https://i.example/s/b.gif".to_owned(),
            ]
        );
        assert!(out.html.contains(r#"<image src=x.jpg>"#));
        assert!(out.html.contains(r#"<img src="images/g/img_0.png">"#));
        assert!(out.html.contains(r#"<img src="images/g/img_1.gif">"#));
        Ok(())
    }

    #[test]
    fn repeated_image_shares_one_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let group_dir = temp.path().join("images").join("g");
        let downloader = RecordingDownloader::default();
        let html = r#"<p><img src="https://i.example/a.png"></p><p><img src="https://i.example/b.png"></p><p><img src="https://i.example/a.png"></p>"#;

        let out = localize_images(html, None, &group_dir, "images/g", &downloader)?;

        assert_eq!(out.saved, 2);
        assert_eq!(downloader.requested.borrow().len(), 2);
        assert_eq!(out.html.matches("images/g/img_0.png").count(), 2);
        assert_eq!(out.html.matches("images/g/img_1.png").count(), 1);
        Ok(())
    }

    #[test]
    fn decode_attribute_resolves_character_references() {
        assert_eq!(decode_attribute("a?x=1&amp;y=2"), "a?x=1&y=2");
        assert_eq!(decode_attribute("plain.png"), "plain.png");
    }

    #[test]
    fn localize_without_images_leaves_html_and_disk_alone() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let group_dir = temp.path().join("images").join("g");
        let downloader = RecordingDownloader::default();

        let out = localize_images("<p>text</p>", None, &group_dir, "images/g", &downloader)?;

        assert_eq!(out.html, "<p>text</p>");
        assert_eq!(out.saved, 0);
        assert!(!group_dir.exists());
        Ok(())
    }

    #[test]
    fn image_extension_follows_format_hints() {
        assert_eq!(image_extension("https://x/a?wx_fmt=png"), ".png");
        assert_eq!(image_extension("https://x/a.GIF"), ".gif");
        assert_eq!(image_extension("https://x/a?wx_fmt=webp"), ".webp");
        assert_eq!(image_extension("https://x/a?wx_fmt=jpeg"), ".jpg");
    }

    #[test]
    fn resolve_image_url_handles_relative_and_protocol_relative() -> anyhow::Result<()> {
        let page = Url::parse("https://mp.example/s/abc")?;
        assert_eq!(
            resolve_image_url("//cdn.example/x.png", None).as_deref(),
            Some("https://cdn.example/x.png")
        );
        assert_eq!(
            resolve_image_url("x.png", Some(&page)).as_deref(),
            Some("https://mp.example/s/x.png")
        );
        assert_eq!(resolve_image_url("x.png", None), None);
        assert_eq!(resolve_image_url("ftp://host/x.png", None), None);
        Ok(())
    }
}
