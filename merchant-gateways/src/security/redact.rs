//! Masking of card data and secrets in wire transcripts.

/// Placeholder written over scrubbed values.
pub const FILTERED: &str = "[FILTERED]";

const CVV_KEYWORDS: &[&str] =
    &["verification_value", "card_code", "cardcode", "cvnumber", "cvv2", "cvv", "cvc", "cid"];

/// Redacts card numbers and verification values from free text.
///
/// # Pattern Matching
///
/// - Card numbers: runs of 13-19 digits, optionally grouped by single spaces
///   or dashes. All but the last four digits become `X`.
/// - Verification values: 3-4 digits following a CVV keyword (`cvv`, `cvc`,
///   `card_code`, `verification_value`, ...) and up to a few separator
///   characters such as `:`, `=`, `"` or `>`.
///
/// # Examples
///
/// ```
/// use merchant_gateways::security::redact_sensitive;
///
/// let redacted = redact_sensitive("card[number]=4242424242424242&card[cvc]=123");
/// assert_eq!(redact_sensitive("4242 4242 4242 4242"), "XXXX XXXX XXXX 4242");
/// assert!(!redacted.contains("4242424242424242"));
/// assert!(!redacted.contains("=123"));
/// ```
#[must_use]
pub fn redact_sensitive(input: &str) -> String {
    redact_verification_values(&redact_card_numbers(input))
}

fn redact_card_numbers(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let preceded_by_digit = i > 0 && chars[i - 1].is_ascii_digit();
        if !chars[i].is_ascii_digit() || preceded_by_digit {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // Extend over digits with single separators between them.
        let mut end = i;
        let mut digits = 0;
        while end < chars.len() {
            if chars[end].is_ascii_digit() {
                digits += 1;
                end += 1;
            } else if matches!(chars[end], ' ' | '-')
                && chars.get(end + 1).is_some_and(char::is_ascii_digit)
                && chars[end - 1].is_ascii_digit()
            {
                end += 1;
            } else {
                break;
            }
        }

        let run = &chars[i..end];
        if (13..=19).contains(&digits) {
            let mut remaining = digits;
            for c in run {
                if c.is_ascii_digit() {
                    out.push(if remaining > 4 { 'X' } else { *c });
                    remaining -= 1;
                } else {
                    out.push(*c);
                }
            }
        } else {
            out.extend(run);
        }
        i = end;
    }
    out
}

fn redact_verification_values(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &lower.as_bytes()[i..];
        let Some(keyword) = CVV_KEYWORDS.iter().find(|k| rest.starts_with(k.as_bytes())) else {
            i += 1;
            continue;
        };
        let mut j = i + keyword.len();
        let mut separators = 0;
        while j < bytes.len() && separators < 6 && b"\"':= ]>\t".contains(&bytes[j]) {
            j += 1;
            separators += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let digits = j - digits_start;
        if separators > 0 && (3..=4).contains(&digits) {
            out.push_str(&input[copied..digits_start]);
            out.push_str(FILTERED);
            copied = j;
        }
        i = j.max(i + keyword.len());
    }
    out.push_str(&input[copied..]);
    out
}

/// Masks the values of named fields in form, JSON or XML text.
///
/// - form: `key=value` (value ends at `&`)
/// - JSON: `"key": "value"` or `"key": 123`
/// - XML: `<key>value</key>`, with or without a namespace prefix
///
/// # Examples
///
/// ```
/// use merchant_gateways::security::scrub_pairs;
///
/// let body = r#"{"secret":"abc","amount":100}"#;
/// assert_eq!(scrub_pairs(body, &["secret"]), r#"{"secret":"[FILTERED]","amount":100}"#);
///
/// let xml = "<transactionKey>k3y</transactionKey>";
/// let scrubbed = scrub_pairs(xml, &["transactionKey"]);
/// assert_eq!(scrubbed, "<transactionKey>[FILTERED]</transactionKey>");
/// ```
#[must_use]
pub fn scrub_pairs(text: &str, keys: &[&str]) -> String {
    let mut out = text.to_owned();
    for key in keys {
        out = mask_values(&out, &format!("{key}="), |v| v.find('&').unwrap_or(v.len()));
        out = mask_xml(&out, key);
        out = mask_json(&out, key);
    }
    out
}

/// Masks the values of named HTTP headers in a transcript (`Name: value`
/// up to the end of the line). Header names match case-insensitively.
///
/// # Examples
///
/// ```
/// use merchant_gateways::security::scrub_headers;
///
/// let transcript = "POST /v1/charges\nAuthorization: Basic c2tfdGVzdDo=\nHost: api.stripe.com";
/// assert_eq!(
///     scrub_headers(transcript, &["authorization"]),
///     "POST /v1/charges\nAuthorization: [FILTERED]\nHost: api.stripe.com"
/// );
/// ```
#[must_use]
pub fn scrub_headers(text: &str, names: &[&str]) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let masked = line.split_once(':').and_then(|(name, value)| {
            let trimmed = name.trim();
            let sensitive = names.iter().any(|n| n.eq_ignore_ascii_case(trimmed));
            (sensitive && !value.trim().is_empty()).then(|| {
                let ending = if line.ends_with("\r\n") {
                    "\r\n"
                } else if line.ends_with('\n') {
                    "\n"
                } else {
                    ""
                };
                format!("{name}: {FILTERED}{ending}")
            })
        });
        out.push_str(masked.as_deref().unwrap_or(line));
    }
    out
}

fn mask_values(text: &str, marker: &str, value_len: impl Fn(&str) -> usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(marker) {
        let start = pos + marker.len();
        out.push_str(&rest[..start]);
        let value = &rest[start..];
        let at_boundary = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '%'));
        let len = value_len(value);
        if len > 0 && at_boundary && !value.starts_with(FILTERED) {
            out.push_str(FILTERED);
            rest = &value[len..];
        } else {
            rest = value;
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset just past the opening tag `<key ...>` or `<ns:key ...>` found
/// at `idx`, or `None` if `idx` is not the name of an opening tag with content.
fn xml_open_tag_end(text: &str, idx: usize, key: &str) -> Option<usize> {
    let tag_start = text[..idx].rfind('<')?;
    let prefix = &text[tag_start + 1..idx];
    let prefix_ok = prefix.is_empty()
        || (prefix.ends_with(':')
            && !prefix.contains(|c: char| c.is_whitespace() || c == '/' || c == '>'));
    if !prefix_ok {
        return None;
    }
    let after = &text[idx + key.len()..];
    if !after.starts_with(['>', ' ']) {
        return None;
    }
    let close = after.find('>')?;
    if after[..close].ends_with('/') {
        return None;
    }
    Some(idx + key.len() + close + 1)
}

fn mask_xml(text: &str, key: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(key) {
        let idx = search_from + found;
        search_from = idx + key.len();
        let Some(value_start) = xml_open_tag_end(text, idx, key) else {
            continue;
        };
        let value = &text[value_start..];
        let len = value.find('<').unwrap_or(value.len());
        if len > 0 && !value.starts_with(FILTERED) {
            out.push_str(&text[copied..value_start]);
            out.push_str(FILTERED);
            copied = value_start + len;
        }
        search_from = search_from.max(value_start + len);
    }
    out.push_str(&text[copied..]);
    out
}

fn mask_json(text: &str, key: &str) -> String {
    let marker = format!("\"{key}\"");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&marker) {
        let after_key = pos + marker.len();
        let tail = &rest[after_key..];
        let trimmed = tail.trim_start();
        let Some(value) = trimmed.strip_prefix(':') else {
            out.push_str(&rest[..after_key]);
            rest = tail;
            continue;
        };
        let value_trimmed = value.trim_start();
        let prefix_len = after_key + (tail.len() - value_trimmed.len());
        out.push_str(&rest[..prefix_len]);

        if let Some(string_body) = value_trimmed.strip_prefix('"') {
            let mut escaped = false;
            let close = string_body.char_indices().find_map(|(idx, c)| {
                if escaped {
                    escaped = false;
                    None
                } else if c == '\\' {
                    escaped = true;
                    None
                } else if c == '"' {
                    Some(idx)
                } else {
                    None
                }
            });
            let close = close.unwrap_or(string_body.len());
            out.push('"');
            out.push_str(FILTERED);
            rest = &string_body[close..];
        } else {
            let len = value_trimmed
                .find(|c: char| c == ',' || c == '}' || c == ']' || c.is_whitespace())
                .unwrap_or(value_trimmed.len());
            if len > 0 {
                out.push('"');
                out.push_str(FILTERED);
                out.push('"');
            }
            rest = &value_trimmed[len..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_card_numbers() {
        let inputs = [
            ("Card: 4111-1111-1111-1111", "Card: XXXX-XXXX-XXXX-1111"),
            ("Card: 4111 1111 1111 1111", "Card: XXXX XXXX XXXX 1111"),
            ("Card: 4111111111111111", "Card: XXXXXXXXXXXX1111"),
            ("amex 378282246310005", "amex XXXXXXXXXXX0005"),
        ];

        for (input, expected) in inputs {
            assert_eq!(redact_sensitive(input), expected, "Failed to redact: {input}");
        }
    }

    #[test]
    fn test_short_and_long_digit_runs_untouched() {
        assert_eq!(redact_sensitive("amount=1000"), "amount=1000");
        assert_eq!(redact_sensitive("id 123456789012345678901"), "id 123456789012345678901");
        assert_eq!(redact_sensitive("2024-01-31"), "2024-01-31");
    }

    #[test]
    fn test_redact_cvv_formats() {
        let inputs = [
            ("CVV: 123", "CVV: [FILTERED]"),
            ("card[cvc]=1234&x=1", "card[cvc]=[FILTERED]&x=1"),
            (r#""verification_value":"987""#, r#""verification_value":"[FILTERED]""#),
            ("<cardCode>321</cardCode>", "<cardCode>[FILTERED]</cardCode>"),
            ("ccv 12", "ccv 12"),
        ];

        for (input, expected) in inputs {
            assert_eq!(redact_sensitive(input), expected, "Failed to redact: {input}");
        }
    }

    #[test]
    fn test_non_ascii_text_is_safe() {
        assert_eq!(redact_sensitive("Prüfziffer cvv: 123 ✓"), "Prüfziffer cvv: [FILTERED] ✓");
    }

    #[test]
    fn test_cvv_keyword_without_value() {
        assert_eq!(redact_sensitive("cvc_check: pass"), "cvc_check: pass");
    }

    #[test]
    fn test_scrub_form_pairs() {
        let body = "security_key=s3cr3t&ccnumber=4111&mysecurity_key=keep";
        let scrubbed = scrub_pairs(body, &["security_key"]);
        assert_eq!(scrubbed, "security_key=[FILTERED]&ccnumber=4111&mysecurity_key=keep");
    }

    #[test]
    fn test_scrub_json_values() {
        let body = r#"{"access_key": "abc\"def", "nested": {"secret_key": 42}, "other": "x"}"#;
        let scrubbed = scrub_pairs(body, &["access_key", "secret_key"]);
        assert_eq!(
            scrubbed,
            r#"{"access_key": "[FILTERED]", "nested": {"secret_key": "[FILTERED]"}, "other": "x"}"#
        );
    }

    #[test]
    fn test_scrub_namespaced_xml() {
        let body = "<wsse:Password Type=\"x\">pw</wsse:Password><c:Password>pw</c:Password>";
        let scrubbed = scrub_pairs(body, &["Password"]);
        assert_eq!(
            scrubbed,
            "<wsse:Password Type=\"x\">[FILTERED]</wsse:Password>\
             <c:Password>[FILTERED]</c:Password>"
        );
    }

    #[test]
    fn test_scrub_is_idempotent() {
        let body = "security_key=abc";
        let once = scrub_pairs(body, &["security_key"]);
        assert_eq!(scrub_pairs(&once, &["security_key"]), once);
    }

    #[test]
    fn test_scrub_headers_keeps_line_endings() {
        let transcript = "access_key: ak_1\r\nsignature: abc\r\ncontent-type: application/json";
        assert_eq!(
            scrub_headers(transcript, &["Signature", "ACCESS_KEY"]),
            "access_key: [FILTERED]\r\nsignature: [FILTERED]\r\ncontent-type: application/json"
        );
    }
}
