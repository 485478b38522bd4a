//! Text codecs and generators that need no engine.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est",
];

pub fn base64_encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decodes standard Base64, ignoring embedded whitespace. The payload must
/// be UTF-8 text.
pub fn base64_decode(text: &str) -> Result<String, ConvertError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|_| ConvertError::validation("Invalid Base64 string"))?;
    String::from_utf8(bytes).map_err(|_| ConvertError::validation("Invalid Base64 string"))
}

pub fn json_to_yaml(text: &str) -> Result<String, ConvertError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ConvertError::validation(format!("Invalid JSON: {}", e)))?;
    serde_yaml::to_string(&value).map_err(|e| ConvertError::engine("yaml", e.to_string()))
}

pub fn yaml_to_json(text: &str) -> Result<String, ConvertError> {
    let value: serde_json::Value = serde_yaml::from_str(text)
        .map_err(|e| ConvertError::validation(format!("Invalid YAML: {}", e)))?;
    serde_json::to_string_pretty(&value).map_err(|e| ConvertError::engine("json", e.to_string()))
}

pub fn format_json(text: &str, minify: bool) -> Result<String, ConvertError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ConvertError::validation(format!("Invalid JSON: {}", e)))?;
    let rendered = if minify {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    };
    rendered.map_err(|e| ConvertError::engine("json", e.to_string()))
}

/// Percent-encodes everything except unreserved characters and `/`.
pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).replace("%2F", "/")
}

/// Percent-decodes `text`; invalid UTF-8 sequences become U+FFFD.
pub fn url_decode(text: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(text.as_bytes())).into_owned()
}

pub fn generate_uuids(count: usize, version: u8) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| match version {
            1 => {
                let mut node = [0u8; 6];
                rng.fill(&mut node);
                Uuid::now_v1(&node).to_string()
            }
            _ => Uuid::new_v4().to_string(),
        })
        .collect()
}

/// Random placeholder paragraphs separated by blank lines.
pub fn lorem_ipsum(paragraphs: usize, words_per_paragraph: usize) -> String {
    let mut rng = rand::rng();
    (0..paragraphs)
        .map(|_| {
            let words: Vec<&str> = (0..words_per_paragraph)
                .filter_map(|_| LOREM_WORDS.choose(&mut rng).copied())
                .collect();
            let mut paragraph = words.join(" ");
            if let Some(first) = paragraph.get(..1) {
                let upper = first.to_ascii_uppercase();
                paragraph.replace_range(..1, &upper);
            }
            paragraph.push('.');
            paragraph
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text utilities: codecs, format conversion and generators.
pub struct TextConverter {
    descriptor: ConverterDescriptor,
}

impl TextConverter {
    pub fn new(descriptor: ConverterDescriptor) -> Self {
        Self { descriptor }
    }

    async fn read_input(inputs: &[StagedFile]) -> Result<String, ConvertError> {
        let input = first_input(inputs)?;
        let bytes = tokio::fs::read(&input.path).await?;
        String::from_utf8(bytes)
            .map_err(|_| ConvertError::validation(format!("{} is not UTF-8 text", input.original_name)))
    }

    /// Produces the artifact body and its content type.
    async fn render(&self, inputs: &[StagedFile], params: &Params) -> Result<(String, &'static str), ConvertError> {
        const TEXT: &str = "text/plain";
        const JSON: &str = "application/json";

        let rendered = match self.descriptor.operation {
            Operation::Base64Encode => (base64_encode(params.text("text")), TEXT),
            Operation::Base64Decode => (base64_decode(params.text("text"))?, TEXT),
            Operation::JsonToYaml => (json_to_yaml(&Self::read_input(inputs).await?)?, "text/yaml"),
            Operation::YamlToJson => (yaml_to_json(&Self::read_input(inputs).await?)?, JSON),
            Operation::JsonFormat => {
                let minify = params.flag("minify", false)?;
                (format_json(params.text("text"), minify)?, JSON)
            }
            Operation::UrlEncode => (url_encode(params.text("text")), TEXT),
            Operation::UrlDecode => (url_decode(params.text("text")), TEXT),
            Operation::UuidGenerate => {
                let count = params.integer("count", 1)? as usize;
                let version = match params.choice("version", "4").as_str() {
                    "1" => 1,
                    _ => 4,
                };
                let uuids = generate_uuids(count, version);
                let body = json!({ "count": uuids.len(), "uuids": uuids });
                (body.to_string(), JSON)
            }
            _ => {
                let paragraphs = params.integer("paragraphs", 3)? as usize;
                let words = params.integer("words_per_para", 50)? as usize;
                (lorem_ipsum(paragraphs, words), TEXT)
            }
        };
        Ok(rendered)
    }
}

#[async_trait]
impl Converter for TextConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        match self.descriptor.operation {
            Operation::Base64Encode | Operation::UrlEncode => "encoded.txt".to_string(),
            Operation::Base64Decode | Operation::UrlDecode => "decoded.txt".to_string(),
            Operation::JsonToYaml => format!("{}.yaml", first_name(inputs).1),
            Operation::YamlToJson => format!("{}.json", first_name(inputs).1),
            Operation::JsonFormat => "formatted.json".to_string(),
            Operation::UuidGenerate => "uuids.json".to_string(),
            _ => "lorem_ipsum.txt".to_string(),
        }
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let (body, content_type) = self.render(inputs, params).await?;
        tokio::fs::write(output.scratch_path(), body).await?;
        Ok(Artifact::new(content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::error::ErrorKind;

    #[test]
    fn test_base64_round_trip_and_errors() {
        assert_eq!(base64_encode("héllo"), "aMOpbGxv");
        assert_eq!(base64_decode("aMOp bGxv\n").unwrap(), "héllo");
        assert_eq!(base64_decode("!!!").unwrap_err().kind(), ErrorKind::Validation);
        // valid base64, invalid UTF-8
        assert_eq!(base64_decode("/w==").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_json_yaml_conversion() {
        let yaml = json_to_yaml(r#"{"name": "convertino", "tags": ["a", "b"]}"#).unwrap();
        assert!(yaml.contains("name: convertino"));
        assert!(yaml.contains("- a"));

        let json = yaml_to_json("name: convertino\nport: 8000\n").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["port"], 8000);
        assert!(json.contains("\n  \"name\""));

        assert_eq!(json_to_yaml("{oops").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(yaml_to_json("a: [1, 2").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_format_json() {
        assert_eq!(format_json(r#"{ "a" : [1, 2] }"#, true).unwrap(), r#"{"a":[1,2]}"#);
        assert_eq!(format_json(r#"{"a":1}"#, false).unwrap(), "{\n  \"a\": 1\n}");
        assert!(format_json("nope", false).is_err());
    }

    #[test]
    fn test_url_codec() {
        assert_eq!(url_encode("a b/c?d=é"), "a%20b/c%3Fd%3D%C3%A9");
        assert_eq!(url_decode("a%20b/c%3Fd%3D%C3%A9"), "a b/c?d=é");
        assert_eq!(url_decode("100%"), "100%");
    }

    #[test]
    fn test_uuid_versions() {
        let v4 = generate_uuids(3, 4);
        assert_eq!(v4.len(), 3);
        for id in &v4 {
            assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 4);
        }
        let v1 = generate_uuids(1, 1);
        assert_eq!(Uuid::parse_str(&v1[0]).unwrap().get_version_num(), 1);
    }

    #[test]
    fn test_lorem_shape() {
        let text = lorem_ipsum(3, 5);
        let paragraphs: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(paragraphs.len(), 3);
        for paragraph in paragraphs {
            assert!(paragraph.ends_with('.'));
            assert_eq!(paragraph.split(' ').count(), 5);
            assert!(paragraph.chars().next().unwrap().is_ascii_uppercase());
            for word in paragraph.trim_end_matches('.').split(' ') {
                assert!(LOREM_WORDS.contains(&word.to_ascii_lowercase().as_str()));
            }
        }
    }
}
