// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;

use crate::domain::models::attribute::{AttributePayload, AttributeSet};
use crate::domain::models::table::{pad_rows_to, StructuredResult, TableError, TableMatrix};

/// 属性合并后的表格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedTable {
    /// 由最后一行表头得到的列标识
    pub columns: Vec<String>,
    /// 增加了属性列的表头与表体
    pub matrix: TableMatrix,
}

impl EnrichedTable {
    /// 按 `(crawl_id, table_index)` 生成最终结果，表头行在前
    pub fn into_result(self, crawl_id: &str, table_index: usize) -> StructuredResult {
        let mut rows = self.matrix.header_rows;
        rows.extend(self.matrix.body_rows);
        StructuredResult {
            crawl_id: crawl_id.to_string(),
            table_index,
            columns: self.columns,
            rows,
        }
    }
}

/// 比较用的规范化：去掉引号、反斜杠、不换行空格和所有空白
pub fn normalize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '\u{a0}') && !c.is_whitespace())
        .collect()
}

/// 按分类标记行向下填充属性值
///
/// 每一行追加一列当前属性值，随后删除首列本身属于词表的标记行。
/// 词表为空时原样返回。
///
/// # 参数
///
/// * `rows` - 表体行，首列用于匹配词表
/// * `set` - 属性词表
///
/// # 返回值
///
/// 追加属性列并移除标记行后的表体
pub fn forward_fill(rows: &[Vec<String>], set: &AttributeSet) -> Vec<Vec<String>> {
    if set.is_empty() {
        return rows.to_vec();
    }

    let vocabulary: HashSet<String> = set.vocabulary.iter().map(|v| normalize_value(v)).collect();
    let mut current = String::new();
    let mut filled = Vec::with_capacity(rows.len());

    for row in rows {
        let first = row.first().map(String::as_str).unwrap_or_default();
        if vocabulary.contains(&normalize_value(first)) {
            current = first.to_string();
            continue;
        }
        let mut row = row.clone();
        row.push(current.clone());
        filled.push(row);
    }

    filled
}

/// 将属性载荷合并到表格
///
/// 载荷中的每个键在表头追加一列，表体中对应的词表按首列向下填充。
/// 没有表头的表格会补一行空表头来承载这些键。
///
/// # 参数
///
/// * `table` - 提取得到的表格矩阵
/// * `payload` - 属性载荷，`None` 表示不做属性合并
/// * `table_index` - 表格在文档中的序号，用于错误报告
///
/// # 返回值
///
/// 合并后的表格；首列缺失而无法匹配标记行时返回 `Enrichment` 错误
pub fn enrich(
    table: &TableMatrix,
    payload: Option<&AttributePayload>,
    table_index: usize,
) -> Result<EnrichedTable, TableError> {
    let width = table.header_width().max(table.body_width());
    let mut header_rows = pad_rows_to(table.header_rows.clone(), width);
    let mut body_rows = pad_rows_to(table.body_rows.clone(), width);

    let sets = payload.map(|p| p.sets.as_slice()).unwrap_or_default();
    if !sets.is_empty() {
        if width == 0 && !body_rows.is_empty() && sets.iter().any(|set| !set.is_empty()) {
            return Err(TableError::enrichment(
                table_index,
                "body rows have no first column to match category markers against",
            ));
        }

        if header_rows.is_empty() {
            header_rows.push(vec![String::new(); width]);
        }
        let last = header_rows.len() - 1;
        for (index, row) in header_rows.iter_mut().enumerate() {
            for set in sets {
                let cell = if index == last {
                    set.kind.key().to_string()
                } else {
                    String::new()
                };
                row.push(cell);
            }
        }

        for set in sets {
            body_rows = if set.is_empty() {
                body_rows
                    .into_iter()
                    .map(|mut row| {
                        row.push(String::new());
                        row
                    })
                    .collect()
            } else {
                forward_fill(&body_rows, set)
            };
        }
    }

    let columns = header_rows
        .last()
        .map(|row| column_names(row))
        .unwrap_or_else(|| (0..width).map(|i| i.to_string()).collect());

    Ok(EnrichedTable {
        columns,
        matrix: TableMatrix {
            header_rows,
            body_rows,
        },
    })
}

// Blank names fall back to the position; repeats become `{name}_{position}`.
fn column_names(row: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(row.len());
    for (position, cell) in row.iter().enumerate() {
        let trimmed = cell.trim();
        let name = if trimmed.is_empty() {
            position.to_string()
        } else {
            trimmed.to_string()
        };
        if columns.contains(&name) {
            columns.push(format!("{}_{}", name, position));
        } else {
            columns.push(name);
        }
    }
    columns
}
