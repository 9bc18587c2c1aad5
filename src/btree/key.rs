use std::cmp::Ordering;

use crate::record::Value;

/// Total order used for index keys.
///
/// NULL sorts before everything else. Two integers compare numerically.
/// Any other pair compares by the text of their display forms, so `10`
/// sorts before `9` when compared against text.
pub fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_first() {
        assert_eq!(compare_keys(&Value::Null, &Value::Int(i32::MIN)), Ordering::Less);
        assert_eq!(compare_keys(&Value::from(""), &Value::Null), Ordering::Greater);
        assert_eq!(compare_keys(&Value::Null, &Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_ints_are_numeric() {
        assert_eq!(compare_keys(&Value::Int(9), &Value::Int(10)), Ordering::Less);
        assert_eq!(compare_keys(&Value::Int(-1), &Value::Int(-2)), Ordering::Greater);
    }

    #[test]
    fn test_text_and_mixed_are_lexicographic() {
        assert_eq!(compare_keys(&Value::from("apple"), &Value::from("banana")), Ordering::Less);
        assert_eq!(compare_keys(&Value::Int(10), &Value::from("9")), Ordering::Less);
        assert_eq!(compare_keys(&Value::from("5"), &Value::Int(5)), Ordering::Equal);
    }
}
