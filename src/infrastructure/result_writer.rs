// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::models::table::StructuredResult;
use crate::domain::repositories::object_store::ObjectStore;
use crate::domain::repositories::result_writer::{PersistenceError, ResultWriter};
use crate::utils::url_utils::output_path;

/// 工作簿中的一个工作表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    /// `Table_{n}`，n 为表格在文档中的序号（从1开始）
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// JSON工作簿
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    pub source_url: Option<String>,
    pub crawl_id: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// 由结构化结果构建工作簿，空表格不生成工作表
    pub fn from_results(url: Option<&str>, results: &[StructuredResult]) -> Self {
        let sheets = results
            .iter()
            .filter(|result| !result.is_empty())
            .map(|result| Sheet {
                name: sheet_name(result.table_index),
                columns: result.columns.clone(),
                rows: result.rows.clone(),
            })
            .collect();

        Self {
            source_url: url.map(str::to_string),
            crawl_id: results.first().map(|result| result.crawl_id.clone()),
            generated_at: Utc::now(),
            sheets,
        }
    }
}

fn sheet_name(table_index: usize) -> String {
    let mut name = format!("Table_{}", table_index + 1);
    name.truncate(31);
    name
}

/// 将结构化结果以JSON工作簿形式写入对象存储
///
/// 对象键为 `{category}/{subcategory}/{name}.json`
pub struct JsonWorkbookWriter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl JsonWorkbookWriter {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ResultWriter for JsonWorkbookWriter {
    async fn write(
        &self,
        url: Option<&str>,
        results: &[StructuredResult],
    ) -> Result<Option<String>, PersistenceError> {
        let workbook = Workbook::from_results(url, results);
        if workbook.sheets.is_empty() {
            debug!("No data to save for {:?}", url);
            return Ok(None);
        }

        let key = output_path(url).with_extension("json");
        let body = serde_json::to_vec_pretty(&workbook)?;
        self.store
            .put(&self.bucket, &key, &body)
            .await
            .map_err(|source| PersistenceError::Upload {
                key: key.clone(),
                source,
            })?;

        info!(
            "Uploaded {} sheet(s) to {}/{}",
            workbook.sheets.len(),
            self.bucket,
            key
        );
        Ok(Some(key))
    }
}
