//! Minimal `multipart/form-data` decoding for form validation.
//!
//! Every part becomes a field keyed by its `name`. File parts keep their
//! content as lossy UTF-8 text. Repeated names become lists.

use serde_json::{Map, Value};

/// `boundary` parameter of a multipart content type, unquoted.
pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Decode a multipart body. `content_type` must carry the boundary.
pub fn parse(body: &[u8], content_type: &str) -> Result<Map<String, Value>, String> {
    let boundary = boundary(content_type).ok_or_else(|| "missing multipart boundary".to_string())?;
    let delimiter = format!("--{boundary}");
    let text = String::from_utf8_lossy(body);

    let mut fields = Map::new();
    let mut sections = text.split(delimiter.as_str());
    // Preamble before the first delimiter is ignored.
    sections.next();
    for section in sections {
        if section.starts_with("--") {
            break;
        }
        let section = section
            .strip_prefix("\r\n")
            .or_else(|| section.strip_prefix('\n'))
            .unwrap_or(section);
        let (head, content) = section
            .split_once("\r\n\r\n")
            .or_else(|| section.split_once("\n\n"))
            .ok_or_else(|| "malformed multipart part".to_string())?;
        let content = content
            .strip_suffix("\r\n")
            .or_else(|| content.strip_suffix('\n'))
            .unwrap_or(content);
        let name = head
            .lines()
            .filter(|line| {
                line.to_ascii_lowercase()
                    .starts_with("content-disposition:")
            })
            .find_map(disposition_name)
            .ok_or_else(|| "multipart part without a name".to_string())?;
        crate::validator::push_field(&mut fields, name, Value::String(content.to_string()));
    }
    Ok(fields)
}

fn disposition_name(line: &str) -> Option<String> {
    line.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim() == "name" {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CT: &str = "multipart/form-data; boundary=\"XyZ\"";

    fn body(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in parts {
            out.push_str(&format!(
                "--XyZ\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        out.push_str("--XyZ--\r\n");
        out.into_bytes()
    }

    #[test]
    fn test_boundary() {
        assert_eq!(boundary(CT).as_deref(), Some("XyZ"));
        assert_eq!(boundary("multipart/form-data"), None);
    }

    #[test]
    fn test_repeated_keys_become_lists() {
        let fields = parse(&body(&[("key1", "v"), ("key2", "a"), ("key2", "b")]), CT).unwrap();
        assert_eq!(Value::Object(fields), json!({"key1": "v", "key2": ["a", "b"]}));
    }

    #[test]
    fn test_missing_boundary_fails() {
        assert!(parse(b"", "multipart/form-data").is_err());
    }
}
