//! 配置校验模块
//!
//! 校验规则：
//! - source id 唯一
//! - 每个源至少声明一个 context 类型，且类型非空
//! - broker 时间参数均 > 0
//! - 退避策略 base_s <= max_s
//! - push 源的推送间隔 > 0

use std::collections::HashSet;

use contracts::{BrokerBlueprint, BrokerError, SourceMode};

/// 校验 BrokerBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &BrokerBlueprint) -> Result<(), BrokerError> {
    validate_broker_settings(blueprint)?;
    validate_source_ids(blueprint)?;
    validate_source_types(blueprint)?;
    validate_source_timing(blueprint)?;
    Ok(())
}

/// 校验 broker 运行时参数
fn validate_broker_settings(blueprint: &BrokerBlueprint) -> Result<(), BrokerError> {
    let broker = &blueprint.broker;

    if broker.validity_window_s <= 0.0 {
        return Err(BrokerError::config_validation(
            "broker.validity_window_s",
            format!("must be > 0, got {}", broker.validity_window_s),
        ));
    }

    if broker.request_timeout_s <= 0.0 {
        return Err(BrokerError::config_validation(
            "broker.request_timeout_s",
            format!("must be > 0, got {}", broker.request_timeout_s),
        ));
    }

    if broker.queue_capacity == 0 {
        return Err(BrokerError::config_validation(
            "broker.queue_capacity",
            "must be > 0",
        ));
    }

    if broker.sweep_interval_s <= 0.0 {
        return Err(BrokerError::config_validation(
            "broker.sweep_interval_s",
            format!("must be > 0, got {}", broker.sweep_interval_s),
        ));
    }

    if broker.backoff.base_s <= 0.0 || broker.backoff.base_s > broker.backoff.max_s {
        return Err(BrokerError::config_validation(
            "broker.backoff",
            format!(
                "base_s ({}) must be > 0 and <= max_s ({})",
                broker.backoff.base_s, broker.backoff.max_s
            ),
        ));
    }

    Ok(())
}

/// 校验 source id 唯一性，且不得与 broker 自身 id 冲突
fn validate_source_ids(blueprint: &BrokerBlueprint) -> Result<(), BrokerError> {
    let mut seen = HashSet::new();
    for source in &blueprint.sources {
        if !seen.insert(source.id.as_str()) {
            return Err(BrokerError::config_validation(
                format!("sources[id={}]", source.id),
                "duplicate source id",
            ));
        }
        if blueprint.broker.own_source_id.as_deref() == Some(source.id.as_str()) {
            return Err(BrokerError::config_validation(
                format!("sources[id={}]", source.id),
                "collides with broker.own_source_id",
            ));
        }
    }
    Ok(())
}

/// 校验每个源的 context 类型声明
fn validate_source_types(blueprint: &BrokerBlueprint) -> Result<(), BrokerError> {
    for source in &blueprint.sources {
        if source.context_types.is_empty() {
            return Err(BrokerError::config_validation(
                format!("sources[{}].context_types", source.id),
                "must declare at least one context type",
            ));
        }
        for context_type in &source.context_types {
            if context_type.is_empty() {
                return Err(BrokerError::config_validation(
                    format!("sources[{}].context_types", source.id),
                    "context type cannot be empty",
                ));
            }
        }
    }
    Ok(())
}

/// 校验源的时间参数
fn validate_source_timing(blueprint: &BrokerBlueprint) -> Result<(), BrokerError> {
    for source in &blueprint.sources {
        if source.mode == SourceMode::Push && source.push_interval_ms == 0 {
            return Err(BrokerError::config_validation(
                format!("sources[{}].push_interval_ms", source.id),
                "push sources need push_interval_ms > 0",
            ));
        }
    }
    Ok(())
}
