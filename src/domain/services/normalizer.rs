// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::domain::models::block_tree::{is_void_element, BlockTree, NodeId, NodeKind};
use crate::domain::services::html_parser::parse_html;

const WRAPPER_TAGS: &[&str] = &["div", "span", "a"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const TABLE_STRUCTURE_TAGS: &[&str] = &[
    "table", "caption", "thead", "tbody", "tfoot", "tr", "td", "th",
];
const CELL_TAGS: &[&str] = &["td", "th"];
const SPAN_ATTRIBUTES: &[&str] = &["colspan", "rowspan"];

/// 超过该列跨度的 `<td>` 被视为分节标题
const SECTION_HEADER_COLSPAN: u32 = 5;

/// 多 `<tbody>` 表格的修复策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TbodyStrategy {
    /// 把所有 `<tbody>` 的行按顺序合并到第一个 `<tbody>`
    #[default]
    Merge,
    /// 每个 `<tbody>` 拆分为独立的 `<table>`
    Split,
}

impl fmt::Display for TbodyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TbodyStrategy::Merge => write!(f, "merge"),
            TbodyStrategy::Split => write!(f, "split"),
        }
    }
}

impl FromStr for TbodyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(TbodyStrategy::Merge),
            "split" => Ok(TbodyStrategy::Split),
            other => Err(format!("Unknown tbody strategy: {}", other)),
        }
    }
}

/// 结构规范化器
///
/// 将任意残缺的HTML文档重写为规范的块树。流水线各步骤顺序敏感，
/// 对同一输入总是产生相同的树，并且对自身的输出是幂等的。
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    strategy: TbodyStrategy,
}

impl Normalizer {
    pub fn new(strategy: TbodyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> TbodyStrategy {
        self.strategy
    }

    /// 解析并规范化HTML文档
    ///
    /// # 参数
    ///
    /// * `raw_html` - 原始HTML文本
    ///
    /// # 返回值
    ///
    /// 规范化后的块树
    pub fn normalize(&self, raw_html: &str) -> BlockTree {
        let mut tree = parse_html(raw_html);
        self.normalize_tree(&mut tree);
        tree
    }

    /// 对已解析的树原地执行规范化流水线
    pub fn normalize_tree(&self, tree: &mut BlockTree) {
        remove_scripts_and_comments(tree);
        remove_void_elements(tree);
        tidy_text(tree);
        flatten_wrappers(tree);
        tidy_text(tree);
        strip_attributes(tree);
        collapse_single_child_chains(tree);

        let tables = tree.find_all(tree.root(), "table");
        debug!("Normalizing {} tables", tables.len());
        for &table in &tables {
            synthesize_thead(tree, table);
            promote_orphan_header_cells(tree, table);
            order_sections(tree, table);
        }
        for table in tables {
            repair_multiple_tbody(tree, table, self.strategy);
        }

        merge_incomplete_rows(tree);
        tidy_text(tree);
    }
}

/// 使用默认（合并）策略规范化HTML文档
pub fn normalize(raw_html: &str) -> BlockTree {
    Normalizer::default().normalize(raw_html)
}

fn tag_in(tree: &BlockTree, id: NodeId, tags: &[&str]) -> bool {
    tree.tag(id).is_some_and(|tag| tags.contains(&tag))
}

fn element_children(tree: &BlockTree, id: NodeId) -> Vec<NodeId> {
    tree.children(id)
        .iter()
        .copied()
        .filter(|&child| tree.is_element(child))
        .collect()
}

fn cells_of(tree: &BlockTree, row: NodeId) -> Vec<NodeId> {
    tree.children(row)
        .iter()
        .copied()
        .filter(|&child| tag_in(tree, child, CELL_TAGS))
        .collect()
}

fn join_text(left: &str, right: &str) -> String {
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    let needs_space = !left.ends_with(char::is_whitespace) && !right.starts_with(char::is_whitespace);
    if needs_space {
        format!("{} {}", left, right)
    } else {
        format!("{}{}", left, right)
    }
}

// Step 1.
fn remove_scripts_and_comments(tree: &mut BlockTree) {
    for node in tree.descendants(tree.root()) {
        let remove = matches!(tree.kind(node), NodeKind::Comment(_))
            || tag_in(tree, node, &["script", "style"]);
        if remove {
            tree.detach(node);
        }
    }
}

// Step 2.
fn remove_void_elements(tree: &mut BlockTree) {
    for node in tree.descendants(tree.root()) {
        let Some(tag) = tree.tag(node) else {
            continue;
        };
        if !is_void_element(tag) {
            continue;
        }
        if tag == "br" {
            let space = tree.create_text(" ");
            tree.replace(node, space);
        } else {
            tree.detach(node);
        }
    }
}

/// 合并相邻文本片段并删除纯空白片段
fn tidy_text(tree: &mut BlockTree) {
    let mut parents = vec![tree.root()];
    parents.extend(
        tree.descendants(tree.root())
            .into_iter()
            .filter(|&node| tree.is_element(node)),
    );

    for parent in parents {
        let mut previous_text: Option<NodeId> = None;
        for child in tree.children(parent).to_vec() {
            let Some(text) = tree.text(child).map(str::to_string) else {
                previous_text = None;
                continue;
            };
            match previous_text {
                Some(previous) => {
                    let merged = join_text(tree.text(previous).unwrap_or_default(), &text);
                    tree.set_text(previous, merged);
                    tree.detach(child);
                }
                None => previous_text = Some(child),
            }
        }

        for child in tree.children(parent).to_vec() {
            if tree.text(child).is_some_and(|text| text.trim().is_empty()) {
                tree.detach(child);
            }
        }
    }
}

// Step 3. Wrappers holding a heading or a table keep their structure.
fn flatten_wrappers(tree: &mut BlockTree) {
    let wrappers: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&node| tag_in(tree, node, WRAPPER_TAGS))
        .collect();

    for node in wrappers.into_iter().rev() {
        let keeps_structure = tree.has_descendant(node, |kind| match kind {
            NodeKind::Element { tag, .. } => {
                HEADING_TAGS.contains(&tag.as_str()) || tag == "table"
            }
            _ => false,
        });
        if keeps_structure {
            continue;
        }

        let text = tree.text_content(node);
        if text.is_empty() {
            tree.detach(node);
        } else {
            let replacement = tree.create_text(text);
            tree.replace(node, replacement);
        }
    }
}

// Step 4.
fn strip_attributes(tree: &mut BlockTree) {
    for node in tree.descendants(tree.root()) {
        if tag_in(tree, node, CELL_TAGS) {
            tree.retain_attrs(node, |name| SPAN_ATTRIBUTES.contains(&name));
        } else if tree.is_element(node) {
            tree.retain_attrs(node, |_| false);
        }
    }
}

// Step 5. Table structure is never collapsed away.
fn collapse_single_child_chains(tree: &mut BlockTree) {
    loop {
        let mut changed = false;
        for node in tree.descendants(tree.root()) {
            if tree.parent(node).is_none()
                || !tree.is_element(node)
                || tag_in(tree, node, TABLE_STRUCTURE_TAGS)
            {
                continue;
            }
            let children = tree.children(node);
            if children.len() == 1 && tree.is_element(children[0]) {
                let inner = children[0];
                tree.replace(node, inner);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

// Step 6.
fn synthesize_thead(tree: &mut BlockTree, table: NodeId) {
    let Some(&first_tbody) = tree.child_elements(table, "tbody").first() else {
        return;
    };
    if !tree.child_elements(table, "thead").is_empty() {
        return;
    }

    let thead = tree.create_element("thead");
    tree.insert_before(first_tbody, thead);
    for row in tree.child_elements(table, "tr") {
        tree.append_child(thead, row);
    }
}

// Step 7.
fn promote_orphan_header_cells(tree: &mut BlockTree, table: NodeId) {
    for thead in tree.child_elements(table, "thead") {
        let orphans = tree.child_elements(thead, "th");
        if orphans.is_empty() {
            continue;
        }

        let tbody = ensure_tbody(tree, table);
        for (index, th) in orphans.into_iter().enumerate() {
            let row = tree.create_element("tr");
            tree.append_child(row, th);
            tree.insert_child(tbody, index, row);
        }

        if tree.children(thead).is_empty() {
            tree.detach(thead);
        }
    }
}

// A table without any tbody gets one holding its loose rows.
fn ensure_tbody(tree: &mut BlockTree, table: NodeId) -> NodeId {
    if let Some(&tbody) = tree.child_elements(table, "tbody").first() {
        return tbody;
    }

    let tbody = tree.create_element("tbody");
    for row in tree.child_elements(table, "tr") {
        tree.append_child(tbody, row);
    }
    match tree.child_elements(table, "thead").first() {
        Some(&thead) => tree.insert_after(thead, tbody),
        None => tree.insert_child(table, 0, tbody),
    }
    tbody
}

// Step 8. Every tbody ends up preceded by a (possibly empty) thead.
fn order_sections(tree: &mut BlockTree, table: NodeId) {
    let tbody = ensure_tbody(tree, table);
    match tree.child_elements(table, "thead").first() {
        Some(&thead) => {
            let thead_index = tree.index_in_parent(thead);
            let tbody_index = tree.index_in_parent(tbody);
            if thead_index > tbody_index {
                tree.insert_before(tbody, thead);
            }
        }
        None => {
            let thead = tree.create_element("thead");
            tree.insert_before(tbody, thead);
        }
    }
}

// Step 9.
fn repair_multiple_tbody(tree: &mut BlockTree, table: NodeId, strategy: TbodyStrategy) {
    let tbodies = tree.child_elements(table, "tbody");
    if tbodies.len() < 2 {
        return;
    }

    for &tbody in &tbodies {
        for row in tree.child_elements(tbody, "tr") {
            for cell in tree.child_elements(row, "td") {
                let colspan = tree
                    .attr(cell, "colspan")
                    .and_then(|value| value.trim().parse::<u32>().ok())
                    .unwrap_or(1);
                if colspan > SECTION_HEADER_COLSPAN {
                    tree.set_tag(cell, "th");
                }
            }
        }
    }

    let first = tbodies[0];
    match strategy {
        TbodyStrategy::Merge => {
            for &extra in &tbodies[1..] {
                for child in tree.children(extra).to_vec() {
                    tree.append_child(first, child);
                }
                tree.detach(extra);
            }
        }
        TbodyStrategy::Split => {
            let thead = tree.child_elements(table, "thead").first().copied();
            let mut anchor = table;
            for &extra in &tbodies[1..] {
                let new_table = tree.create_element("table");
                if let Some(thead) = thead {
                    let header_copy = tree.deep_clone(thead);
                    tree.append_child(new_table, header_copy);
                }
                tree.append_child(new_table, extra);
                tree.insert_after(anchor, new_table);
                anchor = new_table;
            }
        }
    }
}

// Step 10.
fn merge_incomplete_rows(tree: &mut BlockTree) {
    let mut parents: Vec<NodeId> = Vec::new();
    for row in tree.find_all(tree.root(), "tr") {
        if let Some(parent) = tree.parent(row) {
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
    }

    for parent in parents {
        let mut rows: Vec<NodeId> = element_children(tree, parent)
            .into_iter()
            .filter(|&child| tree.is_tag(child, "tr"))
            .collect();

        let mut index = 0;
        while index + 1 < rows.len() {
            let (current, next) = (rows[index], rows[index + 1]);
            if !is_incomplete_pair(tree, current, next) {
                index += 1;
                continue;
            }

            let current_cells = cells_of(tree, current);
            let next_cells = cells_of(tree, next);
            let first_text = join_text(
                &tree.text_content(current_cells[0]),
                &tree.text_content(next_cells[0]),
            );
            let second_text = tree.text_content(next_cells[1]);
            set_cell_text(tree, current_cells[0], first_text);
            set_cell_text(tree, current_cells[1], second_text);

            tree.detach(next);
            rows.remove(index + 1);
        }
    }
}

fn is_incomplete_pair(tree: &BlockTree, current: NodeId, next: NodeId) -> bool {
    let current_cells = cells_of(tree, current);
    let next_cells = cells_of(tree, next);
    current_cells.len() == 2
        && next_cells.len() == 2
        && tree.text_content(current_cells[1]).is_empty()
}

fn set_cell_text(tree: &mut BlockTree, cell: NodeId, text: String) {
    for child in tree.children(cell).to_vec() {
        tree.detach(child);
    }
    if !text.is_empty() {
        let node = tree.create_text(text);
        tree.append_child(cell, node);
    }
}
