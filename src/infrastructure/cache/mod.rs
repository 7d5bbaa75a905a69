// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 键值存储模块
///
/// 提供 `KeyValueStore` 的两种实现：
/// Redis客户端和带过期时间的内存存储
pub mod memory_store;
pub mod redis_client;
