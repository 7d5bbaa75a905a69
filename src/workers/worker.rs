// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Worker trait定义
///
/// 所有后台工作器都必须实现此trait
#[async_trait]
pub trait Worker: Send + Sync {
    /// 处理一个到期任务
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 处理了一个任务
    /// * `Ok(false)` - 队列中没有到期任务
    /// * `Err(WorkerError)` - 任务处理失败，未确认的任务会被重新投递
    async fn poll_once(&self) -> Result<bool, WorkerError>;

    /// 获取工作器名称
    fn name(&self) -> &str;

    /// 空闲时的轮询间隔
    fn poll_interval(&self) -> Duration;

    /// 运行工作器，直到所在任务被取消
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Worker {} started", self.name());

        loop {
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval()).await,
                Err(e) => {
                    error!("Worker {} failed to process job: {}", self.name(), e);
                    sleep(self.poll_interval()).await;
                }
            }
        }
    }
}
