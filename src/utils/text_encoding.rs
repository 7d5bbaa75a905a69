// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;
use tracing::{debug, warn};

/// 文本编码处理错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextEncodingError {
    #[error("编码转换失败: {0}")]
    ConversionFailed(String),

    #[error("空文档")]
    EmptyDocument,
}

/// 将原始文档字节解码为UTF-8文本
///
/// 依次尝试 BOM、严格UTF-8，最后使用 chardetng 猜测编码。
///
/// # 参数
///
/// * `input` - 原始文档字节
///
/// # 返回值
///
/// * `Ok(String)` - 解码后的文本
/// * `Err(TextEncodingError)` - 输入为空或解码出现无法替换的错误
pub fn decode_document(input: &[u8]) -> Result<String, TextEncodingError> {
    if input.is_empty() {
        return Err(TextEncodingError::EmptyDocument);
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(input) {
        debug!("Decoding document with BOM encoding {}", encoding.name());
        return decode_with(encoding, &input[bom_len..]);
    }

    if let Ok(text) = std::str::from_utf8(input) {
        return Ok(text.to_string());
    }

    let encoding = detect_encoding(input);
    debug!("Detected document encoding {}", encoding.name());
    decode_with(encoding, input)
}

/// 猜测字节序列的编码
pub fn detect_encoding(input: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(input, true);
    detector.guess(None, true)
}

fn decode_with(encoding: &'static Encoding, input: &[u8]) -> Result<String, TextEncodingError> {
    let (decoded, _, had_errors) = encoding.decode(input);
    if had_errors {
        if encoding == UTF_8 {
            return Err(TextEncodingError::ConversionFailed(
                "invalid UTF-8 sequence".to_string(),
            ));
        }
        warn!(
            "Document contained bytes not valid in {}, replaced",
            encoding.name()
        );
    }
    Ok(decoded.into_owned())
}
