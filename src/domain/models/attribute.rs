// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 可识别的分类属性
///
/// 每种属性对应外部属性提取器输出JSON中的一个键，
/// 其取值构成一个有限的词表，用于在表体中识别分类标记行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// 密封类型，例如 shielded / open
    SealType,
    /// 材料与表面处理
    MaterialSurface,
}

impl AttributeKind {
    /// 所有属性，按合并顺序排列
    pub const ALL: [AttributeKind; 2] = [AttributeKind::SealType, AttributeKind::MaterialSurface];

    /// 载荷中的键名，同时作为新增列的表头
    pub fn key(&self) -> &'static str {
        match self {
            AttributeKind::SealType => "seal_type",
            AttributeKind::MaterialSurface => "material_surface",
        }
    }

    /// 提示词中对该属性的描述
    pub fn description(&self) -> &'static str {
        match self {
            AttributeKind::SealType => {
                "Type of seal used in the part. Common examples include 'shielded', 'unshielded', and 'open'."
            }
            AttributeKind::MaterialSurface => "Material composition and surface treatments",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 一种属性及其取值词表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    pub kind: AttributeKind,
    pub vocabulary: Vec<String>,
}

impl AttributeSet {
    pub fn new<I, S>(kind: AttributeKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary: Vec<String> = Vec::new();
        for value in values {
            let value = value.into();
            if !vocabulary.contains(&value) {
                vocabulary.push(value);
            }
        }
        Self { kind, vocabulary }
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }
}

/// 单个文档的属性载荷
///
/// 载荷中出现的每个键都会在表头中新增一列，
/// 即使对应词表为空。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePayload {
    pub sets: Vec<AttributeSet>,
}

impl AttributePayload {
    pub fn new(sets: Vec<AttributeSet>) -> Self {
        let mut sets = sets;
        sets.sort_by_key(|set| set.kind);
        sets.dedup_by_key(|set| set.kind);
        Self { sets }
    }

    /// 从提取器返回的JSON对象构造载荷
    ///
    /// 未知键被忽略；值可以是字符串数组、单个字符串或 `null`。
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let sets = AttributeKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let raw = object.get(kind.key())?;
                let values: Vec<String> = match raw {
                    Value::Array(items) => items.iter().filter_map(json_scalar).collect(),
                    Value::Null => Vec::new(),
                    other => json_scalar(other).into_iter().collect(),
                };
                Some(AttributeSet::new(kind, values))
            })
            .collect();

        Self { sets }
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.sets.iter().map(|set| set.kind.key()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
