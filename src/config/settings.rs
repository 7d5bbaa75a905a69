// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::services::normalizer::TbodyStrategy;
use crate::domain::services::table_extractor::ExtractLimits;
use crate::utils::telemetry::LogFormat;

/// 应用程序配置设置
///
/// 包含服务器、Redis、存储、批次、工作者、抓取、规范化和LLM等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// Redis配置
    #[serde(default)]
    pub redis: RedisSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 批次配置
    pub batch: BatchSettings,
    /// 工作者配置
    pub workers: WorkerSettings,
    /// 抓取配置
    pub fetch: FetchSettings,
    /// 规范化配置
    pub normalizer: NormalizerSettings,
    /// LLM配置
    pub llm: LlmSettings,
    /// 指标配置
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// Redis配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL，未配置时使用进程内存储和队列
    pub url: Option<String>,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
    /// 原始文档所在的存储桶
    pub input_bucket: String,
    /// 结构化结果所在的存储桶
    pub output_bucket: String,
}

/// 批次配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    /// 每个批次的URL数量
    pub size: usize,
    /// 批次记录存活时间（秒）
    pub ttl_secs: u64,
    /// 后继批次的冷却时间（秒）
    pub cooldown_secs: u64,
}

/// 工作者配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 抓取工作者数量
    pub scraping: usize,
    /// 解析工作者数量
    pub parsing: usize,
    /// 空闲轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 在途任务的可见性期限（秒）
    pub visibility_timeout_secs: u64,
    /// 调度器维护周期（秒）
    pub maintenance_interval_secs: u64,
}

/// 抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    /// 单个页面的超时时间（秒）
    pub timeout_secs: u64,
    /// 远程浏览器调试地址，未配置时启动本地浏览器
    pub remote_debugging_url: Option<String>,
    /// 导航前随机延迟下限（毫秒）
    pub jitter_min_ms: u64,
    /// 导航前随机延迟上限（毫秒）
    pub jitter_max_ms: u64,
}

/// 规范化配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerSettings {
    /// 多 `<tbody>` 修复策略
    pub tbody_strategy: TbodyStrategy,
    /// 单个表格的最大列数
    pub max_columns: usize,
    /// 单个表格的最大行数
    pub max_rows: usize,
}

impl NormalizerSettings {
    pub fn limits(&self) -> ExtractLimits {
        ExtractLimits {
            max_columns: self.max_columns,
            max_rows: self.max_rows,
        }
    }
}

/// LLM配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// API密钥，未配置时不做属性提取
    pub api_key: Option<String>,
    /// 模型名称
    pub model: String,
    /// API基础URL
    pub api_base_url: String,
}

/// 指标配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus 导出地址，未配置时不启动导出器
    pub listen_addr: Option<String>,
}

/// 日志配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// 输出格式 (pretty, json)
    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和 `TABLECRAWL__*` 环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载且校验通过的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("TABLECRAWL").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 只包含默认值的配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults()?.build()?.try_deserialize()
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default Storage settings
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            .set_default("storage.input_bucket", "raw-documents")?
            .set_default("storage.output_bucket", "structured-tables")?
            // Default Batch settings
            .set_default("batch.size", 30)?
            .set_default("batch.ttl_secs", 7200)?
            .set_default("batch.cooldown_secs", 1800)?
            // Default Worker settings
            .set_default("workers.scraping", 2)?
            .set_default("workers.parsing", 4)?
            .set_default("workers.poll_interval_ms", 1000)?
            .set_default("workers.visibility_timeout_secs", 900)?
            .set_default("workers.maintenance_interval_secs", 60)?
            // Default Fetch settings
            .set_default("fetch.timeout_secs", 300)?
            .set_default("fetch.jitter_min_ms", 2000)?
            .set_default("fetch.jitter_max_ms", 5000)?
            // Default Normalizer settings
            .set_default("normalizer.tbody_strategy", "merge")?
            .set_default("normalizer.max_columns", 256)?
            .set_default("normalizer.max_rows", 10000)?
            // Default LLM settings
            .set_default("llm.model", "gpt-3.5-turbo")?
            .set_default("llm.api_base_url", "https://api.openai.com/v1")
    }

    /// 校验配置的取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.size == 0 {
            return Err(ConfigError::Message("batch.size must be positive".to_string()));
        }
        if self.batch.ttl_secs == 0 {
            return Err(ConfigError::Message(
                "batch.ttl_secs must be positive".to_string(),
            ));
        }
        if self.fetch.jitter_min_ms > self.fetch.jitter_max_ms {
            return Err(ConfigError::Message(format!(
                "fetch.jitter_min_ms ({}) exceeds fetch.jitter_max_ms ({})",
                self.fetch.jitter_min_ms, self.fetch.jitter_max_ms
            )));
        }
        match self.storage.storage_type.as_str() {
            "local" | "memory" => Ok(()),
            "s3" if self.storage.s3_region.is_some() => Ok(()),
            "s3" => Err(ConfigError::Message(
                "storage.s3_region is required for s3 storage".to_string(),
            )),
            other => Err(ConfigError::Message(format!(
                "Unsupported storage type: {}",
                other
            ))),
        }
    }
}
