// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use tracing::info;

use crate::{
    application::dto::crawl_response::ParseResponseDto,
    presentation::errors::AppError,
    queue::{
        scheduler::TaskScheduler,
        task_queue::{Job, JobKind},
    },
};

/// 为存储中的原始文档创建解析任务
///
/// # 参数
///
/// * `bucket` - 存储桶
/// * `file_key` - 对象键，可以包含 `/`
pub async fn start_parse(
    Extension(scheduler): Extension<TaskScheduler>,
    Path((bucket, file_key)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ParseResponseDto>), AppError> {
    let job = scheduler
        .schedule_now(Job::new(JobKind::ParseDocument {
            bucket,
            key: file_key,
            url: None,
            crawl_id: None,
        }))
        .await?;
    info!("Parse task {} enqueued", job.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(ParseResponseDto {
            message: "Parse task started".to_string(),
            task_id: job.id.to_string(),
        }),
    ))
}
