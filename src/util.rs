macro_rules! time_info {
    ($name:expr, $f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();
        log::info!("{} (took {:?})", $name, end.duration_since(start));
        result
    }};
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(v: &str) -> Result<u64, String> {
    let parsed = match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => v.parse::<u64>(),
    };

    parsed.map_err(|e| format!("\"{}\" is not a number: {}", v, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_number("1000"), Ok(1000));
        assert_eq!(parse_number("0x25f"), Ok(0x25f));
        assert!(parse_number("ten").is_err());
    }
}
