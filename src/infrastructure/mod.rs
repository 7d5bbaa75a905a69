// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 基础设施层负责与外部系统的交互，依赖于领域层的抽象接口。
///
/// 包含的子模块：
/// - 缓存（cache）：Redis客户端和进程内键值存储
/// - 指标（metrics）：Prometheus导出器和计数器名称
/// - 结果写入（result_writer）：结构化结果的工作簿写入
/// - 存储（storage）：S3、本地文件和内存对象存储
pub mod cache;
pub mod metrics;
pub mod result_writer;
pub mod storage;
