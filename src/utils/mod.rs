// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
/// 包括遥测初始化、URL路径推导和文档编码检测
pub mod errors;
pub mod telemetry;
pub mod text_encoding;
pub mod url_utils;
