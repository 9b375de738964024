//! 时长字符串解析
//!
//! 支持 `24h`、`30m`、`1h30m`、`1.5s`、`500ms`、`0` 这类写法，单位可为
//! `h` / `m` / `s` / `ms` / `us` / `ns`。

use std::time::Duration;

/// 解析时长字符串，失败时返回可读的原因
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let input = raw.trim();
    if input.is_empty() {
        return Err("时长不能为空".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = input;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("时长 '{input}' 缺少单位"))?;
        if number_len == 0 {
            return Err(format!("时长 '{input}' 格式无效"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("时长 '{input}' 中的数字无效"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" | "µs" => 1_000.0,
            "ns" => 1.0,
            unit => return Err(format!("时长 '{input}' 的单位 '{unit}' 不受支持")),
        };
        rest = &rest[unit_len..];

        total_nanos += value * nanos_per_unit;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(24 * 3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("0h").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(" 2m10s ").unwrap(), Duration::from_secs(130));
    }

    #[test]
    fn test_invalid_inputs() {
        for raw in ["", "10", "h", "5d", "1h-3m", "abc"] {
            assert!(parse_duration(raw).is_err(), "应当拒绝: {raw:?}");
        }
    }
}
