//! Locating a JSON object inside free-form model output.
//!
//! Language models wrap their answers in prose more often than not. This
//! module carves out the first balanced `{…}` substring with a single
//! forward pass that tracks brace depth and string/escape state — braces
//! inside string literals do not count toward nesting.

/// Returns the first balanced brace-delimited substring of `text`, or
/// `None` if no balanced object exists. The slice is not validated as
/// JSON; parsing is the caller's job.
pub fn find_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    // Braces are ASCII, so both ends are char boundaries.
                    return Some(&text[start?..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_surrounded_by_prose() {
        let text = "Sure, here is the extracted data:\n{\"name\": \"Ada\"}\nLet me know!";
        assert_eq!(find_json_object(text), Some("{\"name\": \"Ada\"}"));
    }

    #[test]
    fn handles_nested_objects() {
        let text = r#"{"a": {"b": {"c": 1}}, "d": 2} trailing"#;
        assert_eq!(
            find_json_object(text),
            Some(r#"{"a": {"b": {"c": 1}}, "d": 2}"#)
        );
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_object() {
        let text = r#"{"note": "set {x} and }", "n": 1}"#;
        assert_eq!(find_json_object(text), Some(text));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let text = r#"{"quote": "she said \"}\" loudly"}"#;
        assert_eq!(find_json_object(text), Some(text));
    }

    #[test]
    fn returns_first_of_multiple_objects() {
        let text = r#"{"first": 1} and then {"second": 2}"#;
        assert_eq!(find_json_object(text), Some(r#"{"first": 1}"#));
    }

    #[test]
    fn unbalanced_braces_yield_none() {
        assert_eq!(find_json_object(r#"{"open": 1"#), None);
    }

    #[test]
    fn no_object_yields_none() {
        assert_eq!(find_json_object("just some prose"), None);
        assert_eq!(find_json_object(""), None);
    }

    #[test]
    fn stray_closing_brace_before_object_is_ignored() {
        let text = r#"} noise {"a": 1}"#;
        assert_eq!(find_json_object(text), Some(r#"{"a": 1}"#));
    }
}
