// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::block_tree::{BlockTree, NodeId};
use crate::domain::models::table::{TableError, TableMatrix};

/// 单个表格的尺寸上限
///
/// 超出上限的表格被视为无法修复，跳过并记录错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_columns: usize,
    pub max_rows: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_columns: 256,
            max_rows: 10_000,
        }
    }
}

/// 从规范化后的块树中提取所有表格
///
/// 表格按文档顺序返回，没有任何行的表格以空矩阵保留。
pub fn extract(tree: &BlockTree) -> Vec<TableMatrix> {
    tree.find_all(tree.root(), "table")
        .into_iter()
        .map(|table| extract_table(tree, table))
        .collect()
}

/// 带尺寸检查的提取
///
/// # 参数
///
/// * `tree` - 规范化后的块树
/// * `limits` - 行列上限
///
/// # 返回值
///
/// 每个表格一个结果，超限的表格返回 `TableError`，不影响其他表格
pub fn try_extract(tree: &BlockTree, limits: ExtractLimits) -> Vec<Result<TableMatrix, TableError>> {
    extract(tree)
        .into_iter()
        .enumerate()
        .map(|(index, matrix)| check_limits(index, matrix, limits))
        .collect()
}

fn check_limits(
    index: usize,
    matrix: TableMatrix,
    limits: ExtractLimits,
) -> Result<TableMatrix, TableError> {
    let rows = matrix.header_rows.len() + matrix.body_rows.len();
    if rows > limits.max_rows {
        return Err(TableError::structural(
            index,
            format!("{} rows exceed the limit of {}", rows, limits.max_rows),
        ));
    }
    let columns = matrix.header_width().max(matrix.body_width());
    if columns > limits.max_columns {
        return Err(TableError::structural(
            index,
            format!("{} columns exceed the limit of {}", columns, limits.max_columns),
        ));
    }
    Ok(matrix)
}

fn extract_table(tree: &BlockTree, table: NodeId) -> TableMatrix {
    let mut header_rows = Vec::new();
    for thead in tree.child_elements(table, "thead") {
        // Any td inside thead is read as a header cell.
        for row in tree.child_elements(thead, "tr") {
            header_rows.push(row_cells(tree, row));
        }
    }

    let mut body_rows = Vec::new();
    for tbody in tree.child_elements(table, "tbody") {
        for &child in tree.children(tbody) {
            match tree.tag(child) {
                Some("tr") => body_rows.push(row_cells(tree, child)),
                // An orphan th is read as a one-cell row in its own position.
                Some("th") => body_rows.push(vec![tree.text_content(child)]),
                _ => {}
            }
        }
    }

    TableMatrix::new(header_rows, body_rows)
}

fn row_cells(tree: &BlockTree, row: NodeId) -> Vec<String> {
    tree.children(row)
        .iter()
        .filter(|&&cell| tree.is_tag(cell, "td") || tree.is_tag(cell, "th"))
        .map(|&cell| tree.text_content(cell))
        .collect()
}
