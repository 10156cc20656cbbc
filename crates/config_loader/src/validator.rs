//! 配置校验模块
//!
//! 校验规则：
//! - log_level 可解析
//! - 字段级规则 (`validator` derive: 必填字段、URL、范围)
//! - receiver name 唯一
//! - 每个 receiver 恰好配置一种 destination
//! - route 引用的 receiver 存在
//! - route selector 正则可编译
//! - retry.max_delay_ms >= retry.base_delay_ms

use std::collections::HashSet;

use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};
use contracts::{ContractError, ExporterConfig, RetryConfig, RouteConfig};
use regex::Regex;

/// 校验 ExporterConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ExporterConfig) -> Result<(), ContractError> {
    validate_log_level(config)?;
    validate_fields(config)?;
    validate_receiver_names(config)?;
    validate_destinations(config)?;
    validate_retry(config)?;
    validate_routes(config)?;
    Ok(())
}

/// 校验日志级别
fn validate_log_level(config: &ExporterConfig) -> Result<(), ContractError> {
    config
        .log_level
        .parse::<tracing::Level>()
        .map(|_| ())
        .map_err(|_| {
            ContractError::config_validation(
                "log_level",
                format!("invalid log level '{}'", config.log_level),
            )
        })
}

/// 字段级规则 (derive)
fn validate_fields(config: &ExporterConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };
    let mut flat = Vec::new();
    flatten_errors(&errors, String::new(), &mut flat);
    flat.sort();
    match flat.into_iter().next() {
        Some((field, message)) => Err(ContractError::config_validation(field, message)),
        None => Ok(()),
    }
}

fn flatten_errors(errors: &ValidationErrors, prefix: String, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for err in errs {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", err.code));
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_errors(nested, path, out),
            ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    flatten_errors(nested, format!("{path}[{idx}]"), out);
                }
            }
        }
    }
}

/// 校验 receiver name 唯一性
fn validate_receiver_names(config: &ExporterConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for receiver in &config.receivers {
        if !seen.insert(receiver.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("receivers[name={}]", receiver.name),
                "duplicate receiver name",
            ));
        }
    }
    Ok(())
}

/// 每个 receiver 恰好一种 destination
fn validate_destinations(config: &ExporterConfig) -> Result<(), ContractError> {
    for receiver in &config.receivers {
        receiver.destination()?;
    }
    Ok(())
}

/// 校验重试策略
fn validate_retry(config: &ExporterConfig) -> Result<(), ContractError> {
    check_retry("dispatch.retry", &config.dispatch.retry)?;
    for (idx, receiver) in config.receivers.iter().enumerate() {
        if let Some(retry) = receiver.delivery.as_ref().and_then(|d| d.retry.as_ref()) {
            check_retry(&format!("receivers[{idx}].delivery.retry"), retry)?;
        }
    }
    Ok(())
}

fn check_retry(field: &str, retry: &RetryConfig) -> Result<(), ContractError> {
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ContractError::config_validation(
            field,
            format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                retry.max_delay_ms, retry.base_delay_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 routes: receiver 引用与正则
fn validate_routes(config: &ExporterConfig) -> Result<(), ContractError> {
    let known: HashSet<&str> = config.receivers.iter().map(|r| r.name.as_str()).collect();

    for (idx, route) in config.routes.iter().enumerate() {
        if route.destinations.is_empty() {
            return Err(ContractError::config_validation(
                format!("routes[{idx}].destinations"),
                "route must name at least one receiver",
            ));
        }
        for name in &route.destinations {
            if !known.contains(name.as_str()) {
                return Err(ContractError::config_validation(
                    format!("routes[{idx}].destinations"),
                    format!("receiver '{name}' is not defined"),
                ));
            }
        }
        validate_selectors(idx, route)?;
    }
    Ok(())
}

fn validate_selectors(idx: usize, route: &RouteConfig) -> Result<(), ContractError> {
    let selectors = [
        ("namespace", route.namespace.as_deref()),
        ("kind", route.kind.as_deref()),
        ("reason", route.reason.as_deref()),
        ("type", route.severity.as_deref()),
        ("component", route.component.as_deref()),
    ];
    let labels = route
        .labels
        .iter()
        .map(|(key, pattern)| (key.as_str(), Some(pattern.as_str())));

    for (field, pattern) in selectors.into_iter().chain(labels) {
        let Some(pattern) = pattern else { continue };
        if let Err(e) = Regex::new(&format!("^(?:{pattern})$")) {
            return Err(ContractError::config_validation(
                format!("routes[{idx}].{field}"),
                format!("invalid selector pattern '{pattern}': {e}"),
            ));
        }
    }
    Ok(())
}
