// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 表格矩阵
///
/// 一个 `<table>` 拆分出的表头矩阵和表体矩阵。
/// 每个矩阵内部的所有行都被补齐到该矩阵的最大列数。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMatrix {
    pub header_rows: Vec<Vec<String>>,
    pub body_rows: Vec<Vec<String>>,
}

impl TableMatrix {
    /// 由原始行构造，并分别补齐两个矩阵
    pub fn new(header_rows: Vec<Vec<String>>, body_rows: Vec<Vec<String>>) -> Self {
        Self {
            header_rows: pad_rows(header_rows),
            body_rows: pad_rows(body_rows),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header_rows.is_empty() && self.body_rows.is_empty()
    }

    pub fn header_width(&self) -> usize {
        max_width(&self.header_rows)
    }

    pub fn body_width(&self) -> usize {
        max_width(&self.body_rows)
    }
}

fn max_width(rows: &[Vec<String>]) -> usize {
    rows.iter().map(Vec::len).max().unwrap_or(0)
}

/// 用空字符串把所有行补齐到最大列数
pub fn pad_rows(rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = max_width(&rows);
    pad_rows_to(rows, width)
}

/// 用空字符串把所有行补齐到指定列数
pub fn pad_rows_to(rows: Vec<Vec<String>>, width: usize) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|mut row| {
            if row.len() < width {
                row.resize(width, String::new());
            }
            row
        })
        .collect()
}

/// 最终结构化结果，以 `(crawl_id, table_index)` 为键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub crawl_id: String,
    pub table_index: usize,
    /// 由最后一行表头得到的列标识（已去重）
    pub columns: Vec<String>,
    /// 表头行在前、表体行在后的合并矩阵，列按位置编号
    pub rows: Vec<Vec<String>>,
}

impl StructuredResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 单个表格的错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableErrorKind {
    /// 表格结构无法修复（超出行列上限等）
    StructuralRepair,
    /// 属性合并失败
    Enrichment,
}

impl fmt::Display for TableErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableErrorKind::StructuralRepair => write!(f, "structural_repair"),
            TableErrorKind::Enrichment => write!(f, "enrichment"),
        }
    }
}

/// 单个表格处理失败，不影响同一文档中的其他表格
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("table {table_index} skipped ({kind}): {message}")]
pub struct TableError {
    pub table_index: usize,
    pub kind: TableErrorKind,
    pub message: String,
}

impl TableError {
    pub fn structural(table_index: usize, message: impl Into<String>) -> Self {
        Self {
            table_index,
            kind: TableErrorKind::StructuralRepair,
            message: message.into(),
        }
    }

    pub fn enrichment(table_index: usize, message: impl Into<String>) -> Self {
        Self {
            table_index,
            kind: TableErrorKind::Enrichment,
            message: message.into(),
        }
    }
}
