// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::application::use_cases::batch_scheduler::SchedulerError;
use crate::application::use_cases::parse_document::ParseError;
use crate::queue::task_queue::QueueError;

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),

    #[error("调度错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),

    #[error("任务类型不匹配: {0}")]
    UnexpectedJob(String),
}
