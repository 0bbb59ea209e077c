//! Minimal XML writing and reading for SOAP and XML-over-HTTP gateways.
//!
//! Gateways that speak XML only need two things: emit a fixed document shape
//! with escaped text, and pull a handful of values out of the reply. Neither
//! justifies full schema types, so the writer is a string builder and the
//! reader produces a generic element tree.

use quick_xml::{
    Reader,
    escape::{escape, resolve_predefined_entity},
    events::{BytesStart, Event},
};
use serde_json::{Map, Value};

use super::DecodeError;

/// Streaming XML writer.
///
/// # Examples
///
/// ```
/// use merchant_gateways::codec::xml::XmlBuilder;
///
/// let mut xml = XmlBuilder::new();
/// xml.nest("order", &[("id", "1")], |xml| {
///     xml.element("note", "fish & chips");
/// });
/// assert_eq!(xml.finish(), r#"<order id="1"><note>fish &amp; chips</note></order>"#);
/// ```
#[derive(Debug, Default, Clone)]
pub struct XmlBuilder {
    buf: String,
    open: Vec<String>,
}

impl XmlBuilder {
    /// Empty document without a declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Document starting with `<?xml version="1.0" encoding="utf-8"?>`.
    #[must_use]
    pub fn with_declaration() -> Self {
        Self {
            buf: r#"<?xml version="1.0" encoding="utf-8"?>"#.to_owned(),
            open: Vec::new(),
        }
    }

    fn write_tag_start(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attributes {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape(*value));
            self.buf.push('"');
        }
    }

    /// Opens an element; close it with [`close`](Self::close).
    pub fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> &mut Self {
        self.write_tag_start(name, attributes);
        self.buf.push('>');
        self.open.push(name.to_owned());
        self
    }

    /// Closes the innermost open element.
    pub fn close(&mut self) -> &mut Self {
        if let Some(name) = self.open.pop() {
            self.buf.push_str("</");
            self.buf.push_str(&name);
            self.buf.push('>');
        }
        self
    }

    /// Writes an element whose children are produced by `body`.
    pub fn nest(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.open(name, attributes);
        body(self);
        self.close()
    }

    /// Writes escaped text inside the innermost open element.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(&escape(text));
        self
    }

    /// Writes `<name>text</name>` with the text escaped.
    pub fn element(&mut self, name: &str, text: impl AsRef<str>) -> &mut Self {
        self.open(name, &[]);
        self.buf.push_str(&escape(text.as_ref()));
        self.close()
    }

    /// Writes the element only when `text` is present and not empty.
    pub fn element_opt(&mut self, name: &str, text: Option<&str>) -> &mut Self {
        match text {
            Some(text) if !text.is_empty() => self.element(name, text),
            _ => self,
        }
    }

    /// Writes a self-closing element.
    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> &mut Self {
        self.write_tag_start(name, attributes);
        self.buf.push_str("/>");
        self
    }

    /// Closes any open elements and returns the document.
    #[must_use]
    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.close();
        }
        self.buf
    }
}

/// One element of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name, without namespace prefix.
    pub name: String,
    /// Attributes by local name.
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First direct child with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a `/`-separated path of child names from this element.
    ///
    /// A `*` step matches any child name.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Self> {
        path.split('/').filter(|s| !s.is_empty()).try_fold(self, |node, step| {
            if step == "*" { node.children.first() } else { node.child(step) }
        })
    }

    /// Text at `path`, if the element exists and the text is not empty.
    #[must_use]
    pub fn text(&self, path: &str) -> Option<&str> {
        self.find(path).map(|e| e.text.as_str()).filter(|t| !t.is_empty())
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Depth-first search for the first element with the given local name,
    /// including this one.
    #[must_use]
    pub fn descendant(&self, name: &str) -> Option<&Self> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.descendant(name))
    }

    /// Converts to JSON: leaves become strings, repeated names become arrays,
    /// attributes are stored under `@name`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        if self.children.is_empty() && self.attributes.is_empty() {
            return Value::String(self.text.clone());
        }
        let mut map = Map::new();
        for (key, value) in &self.attributes {
            map.insert(format!("@{key}"), Value::String(value.clone()));
        }
        for child in &self.children {
            let value = child.to_json();
            match map.get_mut(&child.name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }
        if !self.text.is_empty() {
            map.insert("#text".to_owned(), Value::String(self.text.clone()));
        }
        Value::Object(map)
    }
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn start_element(
    reader: &Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Result<XmlElement, DecodeError> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| DecodeError::new("xml", e))?;
        let value = attribute
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| DecodeError::new("xml", e))?;
        attributes.push((local_name(attribute.key.local_name().as_ref()), value.into_owned()));
    }
    Ok(XmlElement {
        name: local_name(start.local_name().as_ref()),
        attributes,
        ..XmlElement::default()
    })
}

fn close_element(stack: &mut Vec<XmlElement>, mut element: XmlElement) -> Option<XmlElement> {
    element.text = element.text.trim().to_owned();
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            None
        }
        None => Some(element),
    }
}

/// Parses a document into its root element.
///
/// A UTF-8 byte-order mark and leading whitespace are skipped. Namespace
/// prefixes are dropped from element and attribute names.
///
/// # Errors
///
/// Returns [`DecodeError`] for malformed XML or a document with no root.
pub fn parse(body: &[u8]) -> Result<XmlElement, DecodeError> {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let body = body.trim_ascii_start();

    let mut reader = Reader::from_reader(body);
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let element = start_element(&reader, &e)?;
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&reader, &e)?;
                if let Some(root) = close_element(&mut stack, element) {
                    return Ok(root);
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DecodeError::new("xml", "unexpected closing tag"))?;
                if let Some(root) = close_element(&mut stack, element) {
                    return Ok(root);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.xml_content().map_err(|e| DecodeError::new("xml", e))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let resolved = match e.resolve_char_ref() {
                    Ok(Some(c)) => c.to_string(),
                    _ => {
                        let name = e.decode().map_err(|e| DecodeError::new("xml", e))?;
                        resolve_predefined_entity(&name).map(str::to_owned).ok_or_else(|| {
                            DecodeError::new("xml", format!("unknown entity &{name};"))
                        })?
                    }
                };
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&resolved);
                }
            }
            Ok(Event::Eof) => {
                return Err(DecodeError::new("xml", "document has no complete root element"));
            }
            Ok(_) => {}
            Err(e) => return Err(DecodeError::new("xml", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_REPLY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header/>
  <soap:Body>
    <c:replyMessage xmlns:c="urn:schemas-cybersource-com:transaction-data-1.121">
      <c:merchantReferenceCode>1</c:merchantReferenceCode>
      <c:requestID>6008</c:requestID>
      <c:decision>ACCEPT</c:decision>
      <c:ccAuthReply><c:reasonCode>100</c:reasonCode><c:avsCode>Y</c:avsCode></c:ccAuthReply>
    </c:replyMessage>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_builder_with_declaration_and_attributes() {
        let mut xml = XmlBuilder::with_declaration();
        xml.open("root", &[("xmlns", "urn:x"), ("note", "a\"b")]);
        xml.element("amount", "1.00").element_opt("skip", None).element_opt("skip", Some(""));
        xml.empty("flag", &[("on", "true")]);
        let doc = xml.finish();
        assert_eq!(
            doc,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><root xmlns=\"urn:x\" note=\"a&quot;b\">\
             <amount>1.00</amount><flag on=\"true\"/></root>"
        );
    }

    #[test]
    fn test_parse_strips_namespaces() {
        let root = parse(SOAP_REPLY.as_bytes()).unwrap();
        assert_eq!(root.name, "Envelope");
        assert_eq!(root.text("Body/replyMessage/decision"), Some("ACCEPT"));
        assert_eq!(root.text("Body/replyMessage/ccAuthReply/reasonCode"), Some("100"));
        assert_eq!(root.descendant("avsCode").map(|e| e.text.as_str()), Some("Y"));
        assert!(root.find("Body/missing").is_none());
    }

    #[test]
    fn test_parse_strips_bom() {
        let mut body = b"\xEF\xBB\xBF".to_vec();
        body.extend_from_slice(b"<a><b>1</b></a>");
        let root = parse(&body).unwrap();
        assert_eq!(root.text("b"), Some("1"));
    }

    #[test]
    fn test_parse_entities() {
        let root = parse(b"<a><b>Fish &amp; Chips &#38; more</b></a>").unwrap();
        assert_eq!(root.text("b"), Some("Fish & Chips & more"));
    }

    #[test]
    fn test_parse_attributes() {
        let root = parse(br#"<a x:id="7" xmlns:x="urn:x"><b/></a>"#).unwrap();
        assert_eq!(root.attribute("id"), Some("7"));
        assert!(root.child("b").is_some());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse(b"not xml at all").is_err());
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"").is_err());
    }

    #[test]
    fn test_to_json_arrays_and_leaves() {
        let root = parse(b"<r><m><code>E1</code></m><m><code>E2</code></m><id>9</id></r>").unwrap();
        let json = root.to_json();
        assert_eq!(json["id"], "9");
        assert_eq!(json["m"][1]["code"], "E2");
    }
}
