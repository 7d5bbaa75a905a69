// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 用例模块
///
/// 批次调度（提交、处理、重试）和文档解析流水线
pub mod batch_scheduler;
pub mod parse_document;
