// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::repositories::object_store::StorageError;

/// 抓取错误类型
///
/// 每种错误只影响单个URL，调用方把它记入失败台账后继续处理批次
#[derive(Error, Debug)]
pub enum FetchError {
    /// 导航失败
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 页面处理超时
    #[error("Scrape timed out after {0} seconds")]
    ScrapeTimeout(u64),
    /// 浏览器启动或协议错误
    #[error("Browser error: {0}")]
    Browser(String),
    /// 资源下载失败
    #[error("Download failed: {0}")]
    Download(String),
    /// 页面中没有可保存的内容
    #[error("{0}")]
    NoContent(String),
    /// 原始文档写入失败
    #[error("Failed to store raw document: {0}")]
    Storage(#[from] StorageError),
}

impl FetchError {
    /// 用于指标标签的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Navigation(_) => "navigation",
            FetchError::ScrapeTimeout(_) => "timeout",
            FetchError::Browser(_) => "browser",
            FetchError::Download(_) => "download",
            FetchError::NoContent(_) => "no_content",
            FetchError::Storage(_) => "storage",
        }
    }
}

/// 渲染完成的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 导航后的最终URL
    pub url: String,
    /// 渲染后的完整HTML
    pub html: String,
}

/// 页面获取特质
///
/// 浏览器自动化能力的抽象：渲染页面和下载页面引用的资源
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 导航到URL并返回渲染后的HTML
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError>;

    /// 下载资源的原始字节
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// 获取器名称
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        (**self).render(url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).download(url).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
