use super::{DecodedResponse, RawRecord, ResponseDecoder};
use crate::error::{ReconError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::debug;

const IMAGE_LIST_TAG: &str = "imageList";

/// Element tree built from a response body. Only what the decoder needs:
/// names, attributes, direct text and children.
#[derive(Debug, Default, Clone)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Depth-first search, self included.
    fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    fn find_any(&self, names: &[&str]) -> Option<&Node> {
        names.iter().find_map(|n| self.find(n))
    }

    fn text_of(&self, names: &[&str]) -> Option<String> {
        self.find_any(names).map(|n| n.text.trim().to_string())
    }
}

/// Decodes the XML bodies the service returns, including the gateway error
/// envelope (`OpenAPI_ServiceResponse` with `returnReasonCode`).
///
/// Records sit under an `items` or `list` element. A record's fields are
/// either child elements (`<name>금관</name>`) or key/value items
/// (`<item key="name" value="금관"/>`).
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlDecoder;

impl ResponseDecoder for XmlDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedResponse> {
        let root = parse_tree(bytes)?;

        let result_code = root
            .text_of(&["resultCode", "returnReasonCode"])
            .unwrap_or_default();
        let result_msg = root
            .text_of(&["resultMsg", "returnAuthMsg", "errMsg"])
            .unwrap_or_default();
        let total_count = root
            .text_of(&["totalCount"])
            .and_then(|s| s.parse().ok());

        let records: Vec<RawRecord> = match root.find_any(&["items", "list"]) {
            Some(container) => container
                .children
                .iter()
                .filter(|c| !c.children.is_empty())
                .map(raw_record)
                .collect(),
            // A lone record directly under the root (detail responses).
            None => root
                .children
                .iter()
                .filter(|c| c.name == "item" && !c.children.is_empty())
                .map(raw_record)
                .collect(),
        };

        debug!(
            "XmlDecoder: root={} code={} total={:?} records={}",
            root.name,
            result_code,
            total_count,
            records.len()
        );

        Ok(DecodedResponse {
            result_code,
            result_msg,
            total_count,
            records,
        })
    }
}

fn fields_of(node: &Node) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for child in &node.children {
        if child.name == IMAGE_LIST_TAG {
            continue;
        }
        if let (Some(key), Some(value)) = (child.attr("key"), child.attr("value")) {
            fields.insert(key.to_string(), value.trim().to_string());
        } else if child.children.is_empty() {
            fields.insert(child.name.clone(), child.text.trim().to_string());
        } else {
            for (k, v) in fields_of(child) {
                fields.insert(format!("{}.{}", child.name, k), v);
            }
        }
    }
    fields
}

fn raw_record(node: &Node) -> RawRecord {
    let images = node
        .children
        .iter()
        .filter(|c| c.name == IMAGE_LIST_TAG)
        .flat_map(|list| list.children.iter())
        .map(fields_of)
        .filter(|f| !f.is_empty())
        .collect();

    RawRecord {
        fields: fields_of(node),
        images,
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".into()),
        "lt" => Some("<".into()),
        "gt" => Some(">".into()),
        "quot" => Some("\"".into()),
        "apos" => Some("'".into()),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code).map(String::from)
        }
    }
}

fn open_node(e: &BytesStart) -> Node {
    Node {
        name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
        attrs: e
            .attributes()
            .flatten()
            .map(|a| {
                (
                    String::from_utf8_lossy(a.key.local_name().as_ref()).to_string(),
                    String::from_utf8_lossy(&a.value).to_string(),
                )
            })
            .collect(),
        ..Default::default()
    }
}

fn parse_tree(bytes: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(open_node(e)),
            Ok(Event::Empty(ref e)) => {
                let node = open_node(e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    let name = String::from_utf8_lossy(e).to_string();
                    match resolve_entity(&name) {
                        Some(resolved) => top.text.push_str(&resolved),
                        None => top.text.push_str(&format!("&{name};")),
                    }
                }
            }
            Ok(Event::End(_)) => {
                let Some(node) = stack.pop() else {
                    return Err(ReconError::Parse("unbalanced closing tag".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReconError::Parse(format!(
                    "invalid XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ReconError::Parse("unexpected end of XML document".into()));
    }
    root.ok_or_else(|| ReconError::Parse("no XML root element".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageVariant;

    const SEARCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<result>
  <resultCode>0000</resultCode>
  <resultMsg>success</resultMsg>
  <totalCount>2</totalCount>
  <items>
    <item>
      <id>PS0100100100100433100000</id>
      <name>빗살무늬 토기</name>
      <collection>암사 123</collection>
    </item>
    <item>
      <id>PS0100100100100433200000</id>
      <name>토기 &amp; 뚜껑</name>
      <collection></collection>
    </item>
  </items>
</result>"#;

    #[test]
    fn test_decodes_child_element_records() {
        let decoded = XmlDecoder.decode(SEARCH_XML.as_bytes()).unwrap();
        assert_eq!(decoded.result_code, "0000");
        assert_eq!(decoded.total_count, Some(2));

        let candidates = decoded.into_candidates().unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].collection_number, "암사 123");
        assert_eq!(candidates[1].name, "토기 & 뚜껑");
        assert_eq!(candidates[1].collection_number, "");
    }

    #[test]
    fn test_decodes_key_value_items_and_image_list() {
        let xml = r#"<result><resultCode>0000</resultCode>
            <list><data>
              <item key="id" value="PS01"/>
              <item key="name" value="금관"/>
              <imageList>
                <image><imgThumUriS>https://img/s.jpg</imgThumUriS><imgOriUri>https://img/o.jpg</imgOriUri></image>
              </imageList>
            </data></list></result>"#;
        let candidates = XmlDecoder.decode(xml.as_bytes()).unwrap().into_candidates().unwrap();

        assert_eq!(candidates[0].id, "PS01");
        assert_eq!(candidates[0].name, "금관");
        assert_eq!(candidates[0].images[0].variant, ImageVariant::Original);
        assert_eq!(candidates[0].images[1].url, "https://img/s.jpg");
    }

    #[test]
    fn test_gateway_auth_error() {
        let xml = "<OpenAPI_ServiceResponse><cmmMsgHeader>\
                   <errMsg>SERVICE ERROR</errMsg>\
                   <returnAuthMsg>SERVICE_KEY_IS_NOT_REGISTERED_ERROR</returnAuthMsg>\
                   <returnReasonCode>30</returnReasonCode>\
                   </cmmMsgHeader></OpenAPI_ServiceResponse>";
        let err = XmlDecoder.decode(xml.as_bytes()).unwrap().into_candidates().unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_truncated_document_is_parse_error() {
        let err = XmlDecoder.decode(b"<result><items><item>").unwrap_err();
        assert!(matches!(err, ReconError::Parse(_)));
    }
}
