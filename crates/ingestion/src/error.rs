//! Ingestion 错误类型

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 无法打开事件文件
    #[error("failed to open event file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 读取事件流失败
    #[error("failed to read from source {source_name}: {source}")]
    Read {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// 无法识别的事件源描述
    #[error("invalid source '{0}'")]
    InvalidSource(String),
}

impl From<IngestionError> for ContractError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Read { source_name, source } => {
                ContractError::source(source_name, source.to_string())
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
