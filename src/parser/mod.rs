//! Response decoding for the collection service.
//!
//! The service is asked for JSON but regularly answers in XML, and the JSON it
//! does send comes in more than one envelope. Every decoder here reduces a body
//! to the same [`DecodedResponse`] so the adapters and the reconciliation
//! pipeline never see the wire format.

pub mod json;
pub mod xml;

use crate::constants::{is_success_code, AUTH_RESULT_CODES, NO_DATA_RESULT_CODE};
use crate::error::{ReconError, Result};
use crate::types::{CandidateRecord, ImageRef, ImageVariant};
use std::collections::BTreeMap;
use tracing::debug;

pub use json::JsonDecoder;
pub use xml::XmlDecoder;

/// One record as flat `field -> text` pairs, before mapping onto
/// [`CandidateRecord`]. Nested objects are flattened with dotted keys
/// (`copyright.typeNm`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub fields: BTreeMap<String, String>,
    pub images: Vec<BTreeMap<String, String>>,
}

/// Wire image keys in the order they are read from one image entry.
const IMAGE_KEYS: &[(&str, Option<ImageVariant>)] = &[
    ("imgOriUri", Some(ImageVariant::Original)),
    ("imgThumUriM", Some(ImageVariant::ThumbnailMedium)),
    ("imgThumUriS", Some(ImageVariant::ThumbnailSmall)),
    ("imgUrl", None),
];

impl RawRecord {
    /// First non-empty value among `keys`.
    fn pick(&self, keys: &[&str]) -> String {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .unwrap_or_default()
            .to_string()
    }

    pub fn into_candidate(self) -> CandidateRecord {
        let mut images = Vec::new();
        for image in &self.images {
            for (key, variant) in IMAGE_KEYS {
                let Some(url) = image.get(*key).map(|u| u.trim()).filter(|u| !u.is_empty()) else {
                    continue;
                };
                let image_ref = match variant {
                    Some(variant) => ImageRef::new(url, *variant),
                    None => ImageRef::from_url(url),
                };
                images.push(image_ref);
            }
        }

        CandidateRecord {
            id: self.pick(&["id", "relicId"]),
            name: self.pick(&["name", "nameKr"]),
            name_en: self.pick(&["nameEng", "nameEn"]),
            collection_number: self.pick(&["collection", "inventoryNum", "collectionNum"]),
            era: self.pick(&["era", "eraName", "nameKrEra"]),
            material: self.pick(&["material", "materialName"]),
            size: self.pick(&["size", "standard", "sizeInfo"]),
            description: self.pick(&["description", "content", "desc"]),
            copyright_label: self.pick(&["copyright.typeNm", "copyrightTypeNm", "copyrightNm"]),
            images,
        }
    }
}

/// Envelope-independent view of a service response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedResponse {
    pub result_code: String,
    pub result_msg: String,
    pub total_count: Option<u64>,
    pub records: Vec<RawRecord>,
}

impl DecodedResponse {
    /// Applies the service result code: auth codes become [`ReconError::Auth`],
    /// "no data" yields an empty list, and any other failure code is a
    /// transport-level error.
    pub fn into_candidates(self) -> Result<Vec<CandidateRecord>> {
        let code = self.result_code.trim();
        if AUTH_RESULT_CODES.contains(&code) {
            return Err(ReconError::Auth(format!(
                "service result code {}: {}",
                code, self.result_msg
            )));
        }
        if code == NO_DATA_RESULT_CODE {
            return Ok(Vec::new());
        }
        if !is_success_code(code) {
            return Err(ReconError::Transport(format!(
                "service result code {}: {}",
                code, self.result_msg
            )));
        }
        Ok(self
            .records
            .into_iter()
            .map(RawRecord::into_candidate)
            .collect())
    }
}

/// Turns a response body into a [`DecodedResponse`].
pub trait ResponseDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedResponse>;
}

/// Picks JSON or XML from the body itself, falling back to the other format
/// when the first guess fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecoder;

impl ResponseDecoder for AutoDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedResponse> {
        let first = bytes
            .iter()
            .copied()
            .find(|b| !b.is_ascii_whitespace() && *b != 0xEF && *b != 0xBB && *b != 0xBF);

        match first {
            None => Err(ReconError::Parse("empty response body".into())),
            Some(b'<') => XmlDecoder.decode(bytes).or_else(|xml_err| {
                debug!("XML decode failed, trying JSON: {}", xml_err);
                JsonDecoder.decode(bytes).map_err(|_| xml_err)
            }),
            Some(_) => JsonDecoder.decode(bytes).or_else(|json_err| {
                debug!("JSON decode failed, trying XML: {}", json_err);
                XmlDecoder.decode(bytes).map_err(|_| json_err)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            images: Vec::new(),
        }
    }

    #[test]
    fn test_into_candidate_uses_fallback_keys() {
        let raw = record(&[
            ("id", "PS0100100100100433100000"),
            ("name", "빗살무늬토기"),
            ("inventoryNum", "암사 123"),
            ("eraName", "신석기"),
            ("standard", "높이 38.1cm"),
            ("content", ""),
            ("description", "  "),
        ]);
        let candidate = raw.into_candidate();
        assert_eq!(candidate.collection_number, "암사 123");
        assert_eq!(candidate.era, "신석기");
        assert_eq!(candidate.size, "높이 38.1cm");
        assert_eq!(candidate.description, "");
        assert!(candidate.images.is_empty());
    }

    #[test]
    fn test_image_entries_expand_per_variant() {
        let mut raw = record(&[("id", "1")]);
        raw.images.push(
            [
                ("imgThumUriS", "https://img/s.jpg"),
                ("imgOriUri", "https://img/o.jpg"),
                ("imgThumUriM", ""),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        );
        let candidate = raw.into_candidate();
        assert_eq!(
            candidate.images,
            vec![
                ImageRef::new("https://img/o.jpg", ImageVariant::Original),
                ImageRef::new("https://img/s.jpg", ImageVariant::ThumbnailSmall),
            ]
        );
    }

    #[test]
    fn test_result_codes() {
        let auth = DecodedResponse {
            result_code: "30".into(),
            result_msg: "SERVICE_KEY_IS_NOT_REGISTERED_ERROR".into(),
            ..Default::default()
        };
        assert!(auth.into_candidates().unwrap_err().is_auth());

        let no_data = DecodedResponse {
            result_code: "03".into(),
            ..Default::default()
        };
        assert!(no_data.into_candidates().unwrap().is_empty());

        let quota = DecodedResponse {
            result_code: "22".into(),
            ..Default::default()
        };
        assert!(matches!(quota.into_candidates(), Err(ReconError::Transport(_))));
    }

    #[test]
    fn test_auto_decoder_sniffs_format() {
        let json = r#"{"resultCode":"0000","totalCount":1,"list":[{"id":"a","name":"금관"}]}"#;
        let decoded = AutoDecoder.decode(json.as_bytes()).unwrap();
        assert_eq!(decoded.records.len(), 1);

        let xml = "<result><resultCode>0000</resultCode><totalCount>1</totalCount>\
                   <list><data><id>a</id><name>금관</name></data></list></result>";
        let decoded = AutoDecoder.decode(xml.as_bytes()).unwrap();
        assert_eq!(decoded.total_count, Some(1));
        assert_eq!(decoded.records[0].fields["name"], "금관");

        assert!(matches!(AutoDecoder.decode(b"  \n"), Err(ReconError::Parse(_))));
        assert!(matches!(AutoDecoder.decode(b"not a body"), Err(ReconError::Parse(_))));
    }
}
