// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 宽松的HTML解析器
//!
//! 抓取到的表格经常是残缺的：孤立的 `<th>`、缺失的 `<thead>`、多个 `<tbody>`。
//! 词法分析交给 html5ever 的分词器（字符引用、原始文本、RCDATA 都按HTML5规则处理），
//! 但不使用标准的树构建算法，因为它会在解析时自动补全这些结构。
//! 这里只做最少的隐式闭合，把原始结构原样交给规范化流水线修复。

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::domain::models::block_tree::{is_void_element, BlockTree, NodeId};

const TABLE_SECTIONS: &[&str] = &["thead", "tbody", "tfoot"];

/// 将HTML文本解析为块树
///
/// # 参数
///
/// * `input` - HTML文本
///
/// # 返回值
///
/// 解析得到的块树，纯空白文本被丢弃
pub fn parse_html(input: &str) -> BlockTree {
    let queue = BufferQueue::default();
    queue.push_back(StrTendril::from(input));

    let tokenizer = Tokenizer::new(TreeSink::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&queue);
    tokenizer.end();

    tokenizer.sink.into_tree()
}

// Content model the tokenizer has to switch to after a start tag.
fn raw_kind(tag: &str) -> Option<RawKind> {
    match tag {
        "title" | "textarea" => Some(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "script" => Some(RawKind::ScriptData),
        _ => None,
    }
}

#[derive(Default)]
struct TreeSink {
    state: RefCell<TreeState>,
}

impl TreeSink {
    fn into_tree(self) -> BlockTree {
        let mut state = self.state.into_inner();
        state.flush_text();
        state.tree
    }
}

impl TokenSink for TreeSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::TagToken(tag) => {
                state.flush_text();
                match tag.kind {
                    TagKind::StartTag => return state.open_element(tag),
                    TagKind::EndTag => state.close_element(&tag.name),
                }
            }
            Token::CharacterTokens(text) => state.text.push_str(&text),
            Token::CommentToken(text) => {
                state.flush_text();
                state.append_comment(&text);
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

struct TreeState {
    tree: BlockTree,
    stack: Vec<NodeId>,
    // Character tokens arrive in fragments; a run is committed at the next tag.
    text: String,
}

impl Default for TreeState {
    fn default() -> Self {
        let tree = BlockTree::new();
        let root = tree.root();
        Self {
            tree,
            stack: vec![root],
            text: String::new(),
        }
    }
}

impl TreeState {
    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.tree.root())
    }

    fn open_element(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        self.apply_implicit_closes(&name);

        let mut attrs = BTreeMap::new();
        for attr in tag.attrs {
            attrs
                .entry(attr.name.local.to_string())
                .or_insert_with(|| attr.value.to_string());
        }

        let id = self.tree.create_element_with_attrs(&name, attrs);
        let parent = self.current();
        self.tree.append_child(parent, id);

        if tag.self_closing || is_void_element(&name) {
            return TokenSinkResult::Continue;
        }
        self.stack.push(id);

        match name.as_str() {
            "plaintext" => TokenSinkResult::Plaintext,
            other => raw_kind(other).map_or(TokenSinkResult::Continue, TokenSinkResult::RawData),
        }
    }

    fn apply_implicit_closes(&mut self, name: &str) {
        match name {
            "td" | "th" => self.close_within_table(&["td", "th"], &["tr", "thead", "tbody", "tfoot"]),
            "tr" => self.close_within_table(&["tr"], TABLE_SECTIONS),
            "thead" | "tbody" | "tfoot" => self.close_within_table(TABLE_SECTIONS, &[]),
            _ => {}
        }
    }

    // Pops the innermost open `targets` element, never crossing the nearest open table or a barrier.
    fn close_within_table(&mut self, targets: &[&str], barriers: &[&str]) {
        for index in (1..self.stack.len()).rev() {
            let tag = self.tree.tag(self.stack[index]).unwrap_or_default();
            if targets.contains(&tag) {
                self.stack.truncate(index);
                return;
            }
            if tag == "table" || barriers.contains(&tag) {
                return;
            }
        }
    }

    fn close_element(&mut self, name: &str) {
        for index in (1..self.stack.len()).rev() {
            let tag = self.tree.tag(self.stack[index]).unwrap_or_default();
            if tag == name {
                self.stack.truncate(index);
                return;
            }
            // Unmatched end tags never close an enclosing table.
            if tag == "table" {
                return;
            }
        }
    }

    fn append_comment(&mut self, text: &str) {
        let id = self.tree.create_comment(text);
        let parent = self.current();
        self.tree.append_child(parent, id);
    }

    fn flush_text(&mut self) {
        let text = std::mem::take(&mut self.text);
        if text.chars().all(|c| c.is_ascii_whitespace()) {
            return;
        }
        let parent = self.current();

        if let Some(&last) = self.tree.children(parent).last() {
            if let Some(previous) = self.tree.text(last) {
                let merged = format!("{}{}", previous, text);
                self.tree.set_text(last, merged);
                return;
            }
        }

        let id = self.tree.create_text(text);
        self.tree.append_child(parent, id);
    }
}
