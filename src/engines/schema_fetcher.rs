// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use rand::Rng;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::models::batch::BatchEntry;
use crate::domain::models::crawl_task::SchemaType;
use crate::domain::repositories::object_store::ObjectStore;
use crate::engines::traits::{FetchError, PageFetcher};
use crate::utils::url_utils::{domain_key, raw_document_key, resolve_url};

/// 抓取结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// 写入对象存储的所有键
    pub stored_keys: Vec<String>,
    /// 需要解析的表格文档键，只有 `table` 模式才有
    pub document_key: Option<String>,
}

/// 导航前的随机延迟范围（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Jitter {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

struct ImageRef {
    url: String,
    name: String,
}

/// 按内容模式抓取页面并把原始文档写入对象存储
pub struct SchemaFetcher {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    jitter: Jitter,
}

impl SchemaFetcher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        jitter: Jitter,
    ) -> Self {
        Self {
            fetcher,
            store,
            bucket: bucket.into(),
            jitter,
        }
    }

    /// 存放原始文档的存储桶
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// 执行与条目模式对应的抓取例程
    ///
    /// # 参数
    ///
    /// * `entry` - 批次条目
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchOutcome)` - 写入的对象键
    /// * `Err(FetchError)` - 该URL的抓取失败
    pub async fn fetch(&self, entry: &BatchEntry) -> Result<FetchOutcome, FetchError> {
        let delay = self.jitter.sample();
        if !delay.is_zero() {
            debug!("Sleeping for {:?} before {}", delay, entry.url);
            tokio::time::sleep(delay).await;
        }

        match entry.schema_type() {
            SchemaType::Table => self.fetch_tables(entry).await,
            SchemaType::Html => self.fetch_html(entry).await,
            SchemaType::Image => self.fetch_images(entry).await,
            SchemaType::Pdf => self.fetch_pdfs(entry).await,
        }
    }

    async fn fetch_tables(&self, entry: &BatchEntry) -> Result<FetchOutcome, FetchError> {
        let page = self.fetcher.render(&entry.url).await?;
        let tables = collect_tables(&page.html)?;
        if tables.is_empty() {
            return Err(FetchError::NoContent("No tables found".to_string()));
        }
        info!("Found {} tables on {}", tables.len(), entry.url);

        let document = table_document(&entry.url, &entry.crawl_id, &tables);
        let key = raw_document_key(&entry.url, &entry.crawl_id);
        self.store
            .put(&self.bucket, &key, document.as_bytes())
            .await?;

        Ok(FetchOutcome {
            stored_keys: vec![key.clone()],
            document_key: Some(key),
        })
    }

    async fn fetch_html(&self, entry: &BatchEntry) -> Result<FetchOutcome, FetchError> {
        let page = self.fetcher.render(&entry.url).await?;
        let key = format!("{}/html_{}.html", domain_key(&entry.url), entry.crawl_id);
        self.store
            .put(&self.bucket, &key, page.html.as_bytes())
            .await?;

        Ok(FetchOutcome {
            stored_keys: vec![key],
            document_key: None,
        })
    }

    async fn fetch_images(&self, entry: &BatchEntry) -> Result<FetchOutcome, FetchError> {
        let page = self.fetcher.render(&entry.url).await?;
        let images = collect_images(&page.html, &page.url)?;
        if images.is_empty() {
            return Err(FetchError::NoContent("No images found".to_string()));
        }

        let folder = format!("{}/images_{}", domain_key(&entry.url), entry.crawl_id);
        let mut stored_keys = Vec::new();
        let mut last_error = None;
        for image in images {
            match self.fetcher.download(&image.url).await {
                Ok(bytes) => {
                    let key = format!("{}/{}.jpg", folder, image.name);
                    self.store.put(&self.bucket, &key, &bytes).await?;
                    stored_keys.push(key);
                }
                Err(e) => {
                    warn!("Error downloading image {}: {}", image.url, e);
                    last_error = Some(e);
                }
            }
        }

        finish_downloads(stored_keys, last_error)
    }

    async fn fetch_pdfs(&self, entry: &BatchEntry) -> Result<FetchOutcome, FetchError> {
        let page = self.fetcher.render(&entry.url).await?;
        let links = collect_pdf_links(&page.html, &page.url)?;
        if links.is_empty() {
            return Err(FetchError::NoContent("No PDF links found".to_string()));
        }

        let folder = format!("{}/pdfs_{}", domain_key(&entry.url), entry.crawl_id);
        let mut stored_keys = Vec::new();
        let mut last_error = None;
        for (index, link) in links.iter().enumerate() {
            match self.fetcher.download(link).await {
                Ok(bytes) => {
                    let key = format!("{}/file_{}.pdf", folder, index + 1);
                    self.store.put(&self.bucket, &key, &bytes).await?;
                    stored_keys.push(key);
                }
                Err(e) => {
                    warn!("Error downloading PDF {}: {}", link, e);
                    last_error = Some(e);
                }
            }
        }

        finish_downloads(stored_keys, last_error)
    }
}

// A routine succeeds when at least one resource was stored.
fn finish_downloads(
    stored_keys: Vec<String>,
    last_error: Option<FetchError>,
) -> Result<FetchOutcome, FetchError> {
    match (stored_keys.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(FetchOutcome {
            stored_keys,
            document_key: None,
        }),
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Browser(format!("Invalid selector {}: {}", css, e)))
}

/// 提取页面中所有 `<table>` 的外层HTML，按文档顺序
pub fn collect_tables(html: &str) -> Result<Vec<String>, FetchError> {
    let document = Html::parse_document(html);
    let tables = selector("table")?;
    Ok(document
        .select(&tables)
        // Nested tables are carried inside their outermost table.
        .filter(|table| {
            !table
                .ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|ancestor| ancestor.value().name() == "table")
        })
        .map(|table| table.html())
        .collect())
}

fn collect_images(html: &str, page_url: &str) -> Result<Vec<ImageRef>, FetchError> {
    let document = Html::parse_document(html);
    let images = selector("img")?;
    let base = Url::parse(page_url).map_err(|e| FetchError::Navigation(e.to_string()))?;

    let mut refs = Vec::new();
    for image in document.select(&images) {
        let Some(src) = image.value().attr("src") else {
            continue;
        };
        let Ok(resolved) = resolve_url(&base, src.trim()) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let name = match image.value().attr("alt").filter(|alt| !alt.is_empty()) {
            Some(alt) => alt
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect(),
            None => format!("image_{}", refs.len() + 1),
        };
        // Images sharing an alt text would otherwise overwrite each other.
        let name = if refs.iter().any(|r: &ImageRef| r.name == name) {
            format!("{}_{}", name, refs.len() + 1)
        } else {
            name
        };
        refs.push(ImageRef {
            url: resolved.to_string(),
            name,
        });
    }
    Ok(refs)
}

fn collect_pdf_links(html: &str, page_url: &str) -> Result<Vec<String>, FetchError> {
    let document = Html::parse_document(html);
    let links = selector(r#"a[href$=".pdf"]"#)?;
    let base = Url::parse(page_url).map_err(|e| FetchError::Navigation(e.to_string()))?;

    Ok(document
        .select(&links)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve_url(&base, href.trim()).ok())
        .map(|url| url.to_string())
        .collect())
}

/// 把页面中的表格包装成一个独立的HTML文档
pub fn table_document(url: &str, crawl_id: &str, tables: &[String]) -> String {
    let escaped_url = html_escape::encode_text(url);
    format!(
        r#"<!DOCTYPE html>
<html>
    <head>
        <title>{url}</title>
    </head>
    <body>
        <h1>Scraped Data from {url}</h1>
        <p>Crawl ID: {crawl_id}</p>
        <p>Scraped at: {scraped_at}</p>
        {tables}
    </body>
</html>
"#,
        url = escaped_url,
        crawl_id = crawl_id,
        scraped_at = Utc::now().to_rfc3339(),
        tables = tables.join("\n"),
    )
}
