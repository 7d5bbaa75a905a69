// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 引擎模块
///
/// 页面获取能力（浏览器渲染和资源下载）以及按内容模式划分的抓取例程
pub mod browser_engine;
pub mod schema_fetcher;
pub mod scripted_fetcher;
pub mod traits;
