// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台任务处理和工作器管理功能
/// 抓取工作者消费批次任务，解析工作者消费文档解析任务
pub mod manager;
pub mod parse_worker;
pub mod scrape_worker;
pub mod worker;

pub use worker::Worker;
