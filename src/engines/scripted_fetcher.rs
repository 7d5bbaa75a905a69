// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::engines::traits::{FetchError, PageFetcher, RenderedPage};

#[derive(Debug, Clone)]
enum ScriptedPage {
    Html(String),
    NavigationError(String),
    Timeout(u64),
}

/// 预设响应的页面获取器
///
/// 不启动浏览器，按URL返回预先登记的页面或错误；未登记的URL视为导航失败
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, ScriptedPage>,
    downloads: HashMap<String, Vec<u8>>,
    rendered: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个页面
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages
            .insert(url.to_string(), ScriptedPage::Html(html.to_string()));
        self
    }

    /// 登记一个导航失败
    pub fn with_navigation_error(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage::NavigationError(message.to_string()),
        );
        self
    }

    /// 登记一个超时
    pub fn with_timeout(mut self, url: &str, seconds: u64) -> Self {
        self.pages
            .insert(url.to_string(), ScriptedPage::Timeout(seconds));
        self
    }

    /// 登记一个可下载的资源
    pub fn with_download(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.downloads.insert(url.to_string(), bytes);
        self
    }

    /// 按调用顺序返回渲染过的URL
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        self.rendered.lock().push(url.to_string());

        match self.pages.get(url) {
            Some(ScriptedPage::Html(html)) => Ok(RenderedPage {
                url: url.to_string(),
                html: html.clone(),
            }),
            Some(ScriptedPage::NavigationError(message)) => {
                Err(FetchError::Navigation(format!("{}: {}", url, message)))
            }
            Some(ScriptedPage::Timeout(seconds)) => Err(FetchError::ScrapeTimeout(*seconds)),
            None => Err(FetchError::Navigation(format!("{}: no scripted page", url))),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.downloads
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Download(format!("{} returned 404 Not Found", url)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
