// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeMap;

/// 节点在树内存池中的索引
pub type NodeId = usize;

/// 节点类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// 文档根节点
    Document,
    /// 元素节点，标签名总是小写
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    /// 文本片段
    Text(String),
    /// 注释
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// 块树
///
/// 以内存池形式存储的DOM树，节点通过 [`NodeId`] 寻址。
/// 所有修改操作（替换、删除、重新挂载）都只调整父子索引，
/// 被摘除的节点仍留在池中但不再可达，因此修复过程中不会出现悬垂引用。
#[derive(Debug, Clone)]
pub struct BlockTree {
    nodes: Vec<Node>,
}

impl Default for BlockTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTree {
    /// 创建只包含文档根节点的空树
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// 文档根节点
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// 元素的标签名，非元素节点返回 `None`
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Element { .. })
    }

    pub fn is_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag(id) == Some(name)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Text(_))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> Option<&BTreeMap<String, String>> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .and_then(|attrs| attrs.get(name))
            .map(String::as_str)
    }

    /// 仅保留满足条件的属性
    pub fn retain_attrs<F>(&mut self, id: NodeId, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            attrs.retain(|name, _| keep(name));
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    /// 修改元素标签名，例如把 `td` 转换为 `th`
    pub fn set_tag(&mut self, id: NodeId, new_tag: &str) {
        if let NodeKind::Element { tag, .. } = &mut self.nodes[id].kind {
            *tag = new_tag.to_string();
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: String) {
        if let NodeKind::Text(text) = &mut self.nodes[id].kind {
            *text = value;
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// 创建游离的元素节点
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        })
    }

    /// 创建带属性的游离元素节点
    pub fn create_element_with_attrs(
        &mut self,
        tag: &str,
        attrs: BTreeMap<String, String>,
    ) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs,
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(text.into()))
    }

    /// 将节点从其父节点上摘除
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&child| child != id);
        }
    }

    /// 将节点追加为 `parent` 的最后一个子节点
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// 将节点插入到 `parent` 的指定位置
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let index = index.min(self.nodes[parent].children.len());
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(index, child);
    }

    /// 将节点插入到 `reference` 之前，`reference` 必须已挂载
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        if child == reference {
            return;
        }
        self.detach(child);
        if let Some(parent) = self.nodes[reference].parent {
            let index = self.index_in_parent(reference).unwrap_or(0);
            self.nodes[child].parent = Some(parent);
            self.nodes[parent].children.insert(index, child);
        }
    }

    /// 将节点插入到 `reference` 之后
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        if child == reference {
            return;
        }
        self.detach(child);
        if let Some(parent) = self.nodes[reference].parent {
            let index = self.index_in_parent(reference).map_or(0, |i| i + 1);
            self.nodes[child].parent = Some(parent);
            self.nodes[parent].children.insert(index, child);
        }
    }

    /// 用 `replacement` 替换 `old` 的位置，`old` 被摘除
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        self.insert_before(old, replacement);
        self.detach(old);
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id].parent?;
        self.nodes[parent].children.iter().position(|&c| c == id)
    }

    /// 判断节点当前是否可以从根节点到达
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes[current].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// 前序遍历的所有后代（不包括自身）
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev().copied());
        }
        out
    }

    /// 查找所有指定标签的后代元素，按文档顺序返回
    pub fn find_all(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_tag(n, name))
            .collect()
    }

    /// 直接子元素中指定标签的节点
    pub fn child_elements(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(|&c| self.is_tag(c, name))
            .collect()
    }

    pub fn has_descendant<F>(&self, id: NodeId, predicate: F) -> bool
    where
        F: Fn(&NodeKind) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .any(|n| predicate(&self.nodes[n].kind))
    }

    /// 扁平化文本：各文本片段去除首尾空白后以单个空格连接
    pub fn text_content(&self, id: NodeId) -> String {
        let mut pieces: Vec<&str> = Vec::new();
        if let NodeKind::Text(text) = &self.nodes[id].kind {
            pieces.push(text.trim());
        }
        for n in self.descendants(id) {
            if let NodeKind::Text(text) = &self.nodes[n].kind {
                pieces.push(text.trim());
            }
        }
        pieces.retain(|p| !p.is_empty());
        pieces.join(" ")
    }

    /// 深拷贝一棵子树，返回游离的新根
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let copy = self.push(self.nodes[id].kind.clone());
        let children = self.nodes[id].children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// 序列化为HTML
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(self.root(), &mut out);
        out
    }

    /// 序列化指定子树
    pub fn node_to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Document => {
                for &child in &self.nodes[id].children {
                    self.write_html(child, out);
                }
            }
            NodeKind::Text(text) => {
                out.push_str(&html_escape::encode_text(text));
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(tag) {
                    return;
                }
                for &child in &self.nodes[id].children {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn subtree_eq(&self, a: NodeId, other: &BlockTree, b: NodeId) -> bool {
        if self.nodes[a].kind != other.nodes[b].kind {
            return false;
        }
        let left = &self.nodes[a].children;
        let right = &other.nodes[b].children;
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(&x, &y)| self.subtree_eq(x, other, y))
    }
}

/// 结构相等：只比较从根节点可达的部分
impl PartialEq for BlockTree {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root(), other, other.root())
    }
}

impl Eq for BlockTree {}

/// HTML空元素（没有结束标签）
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}
