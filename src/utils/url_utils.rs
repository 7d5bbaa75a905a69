// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use url::{ParseError, Url};

static TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d~-]+$").expect("Failed to compile trailing digits regex"));
static NON_WORD_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w-]+").expect("Failed to compile non-word regex"));

const UNKNOWN: &str = "unknown";

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 由URL得到存储目录名
///
/// 主机名（含端口）中的 `.` 替换为 `_`，无法解析的URL返回 `unknown`
pub fn domain_key(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return UNKNOWN.to_string();
    };
    let host = parsed.host_str().unwrap_or(UNKNOWN);
    let netloc = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    netloc.replace('.', "_")
}

/// 原始表格文档的存储键：`{domain}/tables_{crawl_id}.html`
pub fn raw_document_key(url: &str, crawl_id: &str) -> String {
    format!("{}/tables_{}.html", domain_key(url), crawl_id)
}

/// 结构化结果的输出路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    pub category: String,
    pub subcategory: String,
    pub name: String,
}

impl OutputPath {
    /// 带扩展名的完整路径，例如 `bearings/ball/flanged.xlsx`
    pub fn with_extension(&self, extension: &str) -> String {
        format!(
            "{}/{}/{}.{}",
            self.category, self.subcategory, self.name, extension
        )
    }
}

/// 由URL路径段推导输出路径
///
/// 取非空路径段的第2、第3和最后一段，缺失的段为 `unknown`；
/// 没有路径的URL得到 `unknown/unknown/data`
pub fn output_path(url: Option<&str>) -> OutputPath {
    let segments: Vec<String> = url
        .and_then(|u| Url::parse(u).ok())
        .map(|parsed| {
            parsed
                .path()
                .split('/')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let Some(last) = segments.last() else {
        return OutputPath {
            category: UNKNOWN.to_string(),
            subcategory: UNKNOWN.to_string(),
            name: "data".to_string(),
        };
    };

    let segment = |index: usize| {
        segments
            .get(index)
            .map(|s| clean_segment(s))
            .unwrap_or_else(|| UNKNOWN.to_string())
    };

    OutputPath {
        category: segment(1),
        subcategory: segment(2),
        name: clean_segment(last),
    }
}

/// 清理路径段：去掉结尾的数字、`~` 和 `-`，非单词字符替换为 `_`，转小写
pub fn clean_segment(segment: &str) -> String {
    let trimmed = TRAILING_DIGITS.replace(segment, "");
    let replaced = NON_WORD_RUNS.replace_all(&trimmed, "_");
    let cleaned = replaced
        .trim_matches(|c| c == '_' || c == '-')
        .to_lowercase();
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned
    }
}
