//! Form-encoded bodies.

use serde_json::{Map, Value};
use url::form_urlencoded;

use super::DecodeError;

/// Encodes key/value pairs, preserving order.
///
/// # Examples
///
/// ```
/// use merchant_gateways::codec::form;
///
/// let encoded = form::encode(&[("card[number]", "4242"), ("note", "a b")]);
/// assert_eq!(encoded, "card%5Bnumber%5D=4242&note=a+b");
/// ```
#[must_use]
pub fn encode<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish()
}

/// Decodes a form-encoded body or query string.
///
/// # Errors
///
/// Returns [`DecodeError`] if the body is not valid form encoding.
pub fn decode(body: &[u8]) -> Result<Vec<(String, String)>, DecodeError> {
    let body = body.strip_prefix(b"?").unwrap_or(body);
    serde_urlencoded::from_bytes(body).map_err(|e| DecodeError::new("form", e))
}

/// Collects pairs into a JSON object; later duplicates win.
#[must_use]
pub fn to_json(pairs: &[(String, String)]) -> Value {
    let map: Map<String, Value> =
        pairs.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes() {
        let body = encode(&[("email", "a+b@example.com"), ("amount", "100")]);
        assert_eq!(body, "email=a%2Bb%40example.com&amount=100");
    }

    #[test]
    fn test_decode_query_string_reply() {
        let reply = b"response=1&responsetext=SUCCESS&authcode=123456&transactionid=281719471";
        let pairs = decode(reply).unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[1], ("responsetext".to_owned(), "SUCCESS".to_owned()));
    }

    #[test]
    fn test_decode_leading_question_mark_and_plus() {
        let pairs = decode(b"?responsetext=Invalid+Credit+Card+Number").unwrap();
        assert_eq!(pairs[0].1, "Invalid Credit Card Number");
    }

    #[test]
    fn test_to_json() {
        let pairs = decode(b"a=1&b=2&a=3").unwrap();
        let json = to_json(&pairs);
        assert_eq!(json["a"], "3");
        assert_eq!(json["b"], "2");
    }
}
