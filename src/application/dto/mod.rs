// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据传输对象模块
///
/// 定义HTTP请求和响应的数据结构
pub mod crawl_response;
pub mod scraping_request;
