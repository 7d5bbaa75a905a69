// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - HTML解析（html_parser）：保留残缺结构的宽松解析器
/// - 结构规范化（normalizer）：把任意HTML重写为规范块树
/// - 表格提取（table_extractor）：把表格拆分为表头矩阵和表体矩阵
/// - 属性合并（attribute_enricher）：向下填充分类属性并扩展表头
/// - 属性提取（attribute_extractor）：外部LLM属性提取协作者
/// - 爬取注册表（crawl_registry）：crawl_id、状态和失败台账
pub mod attribute_enricher;
pub mod attribute_extractor;
pub mod crawl_registry;
pub mod html_parser;
pub mod normalizer;
pub mod table_extractor;
