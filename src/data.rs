use std::{cmp::Ordering, fmt};

/// Parses a dump field as a sort number. Blank text counts as zero; fields
/// that are not valid UTF-8 never parse.
pub fn parse_sort_number(value: &[u8]) -> Option<f64> {
    let trimmed = std::str::from_utf8(value).ok()?.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok()
}

/// True when `value` would sort as a number: blank or a valid float.
pub fn is_numeric_text(value: &[u8]) -> bool {
    parse_sort_number(value).is_some()
}

/// One component of a row's sort key.
#[derive(Debug, Clone)]
pub struct SortKeyValue {
    /// Field bytes as they appear in the dump.
    pub text: Vec<u8>,
    pub numeric: bool,
    /// Parsed value when `numeric`; 0.0 when parsing failed or text is blank.
    pub value: f64,
}

impl SortKeyValue {
    pub fn text(text: impl Into<Vec<u8>>) -> Self {
        Self {
            text: text.into(),
            numeric: false,
            value: 0.0,
        }
    }

    pub fn numeric(text: impl Into<Vec<u8>>) -> Self {
        let text = text.into();
        let value = parse_sort_number(&text).unwrap_or(0.0);
        Self {
            text,
            numeric: true,
            value,
        }
    }

    pub fn new(text: impl Into<Vec<u8>>, numeric: bool) -> Self {
        if numeric {
            Self::numeric(text)
        } else {
            Self::text(text)
        }
    }
}

impl PartialEq for SortKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKeyValue {}

impl Ord for SortKeyValue {
    /// Numbers compare by value (`total_cmp`), text by ordinal bytes. A
    /// numeric component sorts before a text one at the same position.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric, other.numeric) {
            (true, true) => self.value.total_cmp(&other.value),
            (false, false) => self.text.cmp(&other.text),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl PartialOrd for SortKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SortKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_unparseable_numbers_are_zero() {
        assert_eq!(SortKeyValue::numeric("").value, 0.0);
        assert_eq!(SortKeyValue::numeric("  ").value, 0.0);
        assert_eq!(SortKeyValue::numeric("abc").value, 0.0);
        assert_eq!(SortKeyValue::numeric(" 42.5 ").value, 42.5);
        assert!(is_numeric_text(b"-1e3"));
        assert!(!is_numeric_text(b"1,000"));
        assert!(!is_numeric_text(b"caf\xe9"));
    }

    #[test]
    fn numbers_compare_by_value_and_text_by_bytes() {
        assert!(SortKeyValue::numeric("9") < SortKeyValue::numeric("10"));
        assert!(SortKeyValue::text("9") > SortKeyValue::text("10"));
        assert!(SortKeyValue::text("Z") < SortKeyValue::text("a"));
        assert_eq!(
            SortKeyValue::numeric("1.0").cmp(&SortKeyValue::numeric("1")),
            Ordering::Equal
        );
    }

    #[test]
    fn numeric_sorts_before_text_at_same_position() {
        assert!(SortKeyValue::numeric("99") < SortKeyValue::text("1"));
    }

    #[test]
    fn latin1_text_compares_by_raw_bytes() {
        let cafe = SortKeyValue::text(b"caf\xe9".as_slice());
        assert!(SortKeyValue::text("cafe") < cafe);
        assert!(cafe < SortKeyValue::text(b"caf\xff".as_slice()));
        assert_eq!(cafe.to_string(), "caf\u{fffd}");
    }
}
