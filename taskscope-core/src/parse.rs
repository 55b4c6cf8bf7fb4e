//! パース関連のユーティリティ関数

use anyhow::Result;

/// 数値文字列をu64にパース（アドレス、tid、pid）
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use taskscope_core::parse::parse_number;
///
/// assert_eq!(parse_number("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_number("1234").unwrap(), 1234);
/// ```
pub fn parse_number(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal number '{}': {}", s, e))
    } else {
        s.parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid number '{}': {}", s, e))
    }
}
