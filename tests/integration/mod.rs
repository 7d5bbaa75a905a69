// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod batch_scheduler_test;
pub mod handlers_test;
pub mod helpers;
pub mod llm_extractor_test;
pub mod parse_pipeline_test;
pub mod workers_test;
