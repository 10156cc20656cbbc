//! 配置解析模块
//!
//! 支持 YAML (主要)、TOML 和 JSON 格式。

use contracts::{ContractError, ExporterConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML 格式 (推荐)
    Yaml,
    /// TOML 格式
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 YAML 格式配置
pub fn parse_yaml(content: &str) -> Result<ExporterConfig, ContractError> {
    serde_yaml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("YAML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ExporterConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ExporterConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
///
/// 空的 `log_level` 视为未设置，回落到默认级别。
pub fn parse(content: &str, format: ConfigFormat) -> Result<ExporterConfig, ContractError> {
    let mut config = match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }?;
    if config.log_level.trim().is_empty() {
        config.log_level = ExporterConfig::default().log_level;
    }
    Ok(config)
}
