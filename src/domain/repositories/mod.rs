// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod kv_store;
pub mod object_store;
pub mod result_writer;
