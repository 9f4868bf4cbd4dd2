/// 工具函数集合

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 计算耗时（毫秒）
///
/// 未结束的任务以 `now` 作为结束时间；未开始返回 None
pub fn duration_ms(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let start = start?;
    let end = end.unwrap_or(now);
    Some((end - start).num_milliseconds().max(0))
}

/// 格式化耗时，例如 "1.50 secs"、"2.00 mins"
pub fn format_duration(ms: i64) -> String {
    const UNITS: &[(&str, f64)] = &[("secs", 1000.0), ("mins", 60.0), ("hours", 60.0)];
    if ms < 1000 {
        return format!("{} ms", ms);
    }

    let mut value = ms as f64;
    let mut unit = UNITS[0].0;
    for (index, (name, divisor)) in UNITS.iter().enumerate() {
        if index > 0 && value < *divisor {
            break;
        }
        value /= divisor;
        unit = name;
    }

    format!("{:.2} {}", value, unit)
}

/// 拼接带命名空间的存储键
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", namespace, key)
    }
}
