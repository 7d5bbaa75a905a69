// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::engines::traits::{FetchError, PageFetcher, RenderedPage};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// 浏览器引擎
///
/// 基于chromiumoxide渲染页面，资源下载走普通HTTP客户端。
/// 浏览器在第一次使用时启动（或连接远程实例），之后在所有任务间复用。
pub struct BrowserFetcher {
    remote_debugging_url: Option<String>,
    timeout: Duration,
    browser: OnceCell<Browser>,
    http: reqwest::Client,
}

impl BrowserFetcher {
    /// 创建浏览器引擎
    ///
    /// # 参数
    ///
    /// * `remote_debugging_url` - 远程Chrome调试地址，为空时启动本地浏览器
    /// * `timeout` - 单个页面的导航和下载超时
    pub fn new(remote_debugging_url: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Browser(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            remote_debugging_url,
            timeout,
            browser: OnceCell::new(),
            http,
        })
    }

    async fn browser(&self) -> Result<&Browser, FetchError> {
        self.browser
            .get_or_try_init(|| async {
                let (browser, mut handler) = match &self.remote_debugging_url {
                    Some(url) => {
                        info!("Connecting to remote Chrome instance at: {}", url);
                        Browser::connect(url.as_str()).await.map_err(|e| {
                            FetchError::Browser(format!("Failed to connect to remote Chrome: {}", e))
                        })?
                    }
                    None => {
                        let config = BrowserConfig::builder()
                            .no_sandbox()
                            .request_timeout(self.timeout)
                            .arg("--disable-gpu")
                            .arg("--disable-dev-shm-usage")
                            .build()
                            .map_err(FetchError::Browser)?;
                        Browser::launch(config)
                            .await
                            .map_err(|e| FetchError::Browser(e.to_string()))?
                    }
                };

                // Drive browser events until the connection closes.
                tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                });

                Ok(browser)
            })
            .await
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    /// 导航到页面并等待加载完成
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    ///
    /// # 返回值
    ///
    /// * `Ok(RenderedPage)` - 渲染后的页面
    /// * `Err(FetchError)` - 浏览器错误、导航失败或超时
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let browser = self.browser().await?;

        let rendered = tokio::time::timeout(self.timeout, async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;

            page.set_user_agent(USER_AGENT)
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;

            // goto waits for the load event
            page.goto(url)
                .await
                .map_err(|e| FetchError::Navigation(format!("{}: {}", url, e)))?;

            let html = page
                .content()
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());

            if let Err(e) = page.close().await {
                warn!("Failed to close page for {}: {}", url, e);
            }

            Ok::<_, FetchError>(RenderedPage {
                url: final_url,
                html,
            })
        })
        .await
        .map_err(|_| FetchError::ScrapeTimeout(self.timeout.as_secs()))??;

        debug!("Rendered {} ({} bytes)", rendered.url, rendered.html.len());
        Ok(rendered)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::ScrapeTimeout(self.timeout.as_secs())
                } else {
                    FetchError::Download(format!("{}: {}", url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Download(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Download(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
