// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod attribute;
pub mod batch;
pub mod block_tree;
pub mod crawl_task;
pub mod table;
