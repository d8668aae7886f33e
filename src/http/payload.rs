//! Request bodies.
//!
//! Drivers hand the pipeline a [`Payload`]: either [`JsonData`] for JSON
//! APIs or [`FormData`] for `multipart/form-data` ones. Besides the body
//! itself a payload exposes its content type and a textual view of its
//! values, used for debug output.

use std::{
    fmt,
    io::{self, Write},
};

use once_cell::sync::OnceCell;
use reqwest::blocking::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{error::BoxError, Error};

const FIELD_ERROR: &str = "Error creating form field";
const FILE_ERROR: &str = "Error creating form file";

/// A request body
pub trait Payload: Send + Sync {
    /// Materializes the body
    fn buffer(&self) -> Result<Vec<u8>, Error>;

    /// Value of the `Content-Type` header
    fn content_type(&self) -> String;

    /// Text values of the body, for debugging only
    fn values(&self) -> Vec<(String, String)>;
}

/// JSON body built from any serializable value
///
/// The value must serialize to a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonData {
    values: Map<String, Value>,
}

impl JsonData {
    pub fn new<T: Serialize + ?Sized>(object: &T) -> Result<JsonData, Error> {
        let buf = serde_json::to_vec(object).map_err(|e| {
            Error::internal("Error marshalling payload")
                .with_operation("JSONData.New")
                .with_source(e)
        })?;

        let values = serde_json::from_slice(&buf).map_err(|e| {
            Error::internal("Error unmarshalling payload")
                .with_operation("JSONData.New")
                .with_source(e)
        })?;

        Ok(JsonData { values })
    }
}

impl Payload for JsonData {
    fn buffer(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(&self.values).map_err(|e| {
            Error::internal("Error marshalling values")
                .with_operation("JSONData.Buffer")
                .with_source(e)
        })
    }

    fn content_type(&self) -> String {
        mime::APPLICATION_JSON.to_string()
    }

    fn values(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

struct FilePart {
    key: String,
    filename: String,
    bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("key", &self.key)
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A materialized form, split where the file parts start
#[derive(Debug)]
struct Encoded {
    content_type: String,
    body: Vec<u8>,
    files_at: usize,
}

/// `multipart/form-data` body
///
/// Text fields are written first, then files, each in insertion order. The
/// form is encoded once, so every materialization of the same form agrees
/// with [`Payload::content_type`].
#[derive(Debug, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
    encoded: OnceCell<Encoded>,
}

impl FormData {
    pub fn new() -> FormData {
        FormData::default()
    }

    /// Adds a text field. Repeated keys produce repeated fields.
    pub fn add_value<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.fields.push((key.into(), value.into()));
        self.encoded = OnceCell::new();
    }

    /// Adds a file part
    pub fn add_buffer<K: Into<String>, N: Into<String>>(
        &mut self,
        key: K,
        filename: N,
        bytes: Vec<u8>,
    ) {
        self.files.push(FilePart {
            key: key.into(),
            filename: filename.into(),
            bytes,
        });
        self.encoded = OnceCell::new();
    }

    fn encode(&self) -> Result<&Encoded, Error> {
        self.encoded.get_or_try_init(|| {
            let mut form = Form::new().percent_encode_noop();
            for (key, value) in &self.fields {
                form = form.text(key.clone(), value.clone());
            }
            for file in &self.files {
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.filename.clone())
                    .mime_str(mime::APPLICATION_OCTET_STREAM.as_ref())
                    .map_err(fail(FILE_ERROR))?;
                form = form.part(file.key.clone(), part);
            }

            let boundary = form.boundary().to_owned();
            let mut body = Vec::new();
            io::copy(&mut form.into_reader(), &mut body).map_err(fail(FIELD_ERROR))?;
            if body.is_empty() {
                body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
            }

            let delimiter = format!("--{}\r\n", boundary);
            let files_at = part_offsets(&body, delimiter.as_bytes())
                .nth(self.fields.len())
                .unwrap_or(body.len());

            Ok(Encoded {
                content_type: format!("multipart/form-data; boundary={}", boundary),
                body,
                files_at,
            })
        })
    }

    /// Writes the multipart body into `out`
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<(), Error> {
        let encoded = self.encode()?;
        let (fields, files) = encoded.body.split_at(encoded.files_at);

        out.write_all(fields).map_err(fail(FIELD_ERROR))?;
        out.write_all(files).map_err(fail(FILE_ERROR))?;

        let closing = if self.files.is_empty() {
            FIELD_ERROR
        } else {
            FILE_ERROR
        };
        out.flush().map_err(fail(closing))
    }
}

impl Payload for FormData {
    fn buffer(&self) -> Result<Vec<u8>, Error> {
        Ok(self.encode()?.body.clone())
    }

    fn content_type(&self) -> String {
        self.encode()
            .map(|encoded| encoded.content_type.clone())
            .unwrap_or_default()
    }

    fn values(&self) -> Vec<(String, String)> {
        self.fields.clone()
    }
}

fn fail<E: Into<BoxError>>(message: &'static str) -> impl FnOnce(E) -> Error {
    move |e| {
        Error::internal(message)
            .with_operation("FormData.Buffer")
            .with_source(e)
    }
}

/// Start of every part opened by `delimiter`
fn part_offsets<'a>(body: &'a [u8], delimiter: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    body.windows(delimiter.len())
        .enumerate()
        .filter(move |(_, window)| *window == delimiter)
        .map(|(at, _)| at)
}

#[cfg(test)]
mod test {
    use std::io::{self, Write};

    use serde::Serialize;
    use serde_json::Value;

    use super::{FormData, JsonData, Payload};
    use crate::error::Kind;

    #[derive(Serialize)]
    struct Message {
        to: Vec<&'static str>,
        subject: &'static str,
        count: u32,
    }

    #[test]
    fn json_buffer() {
        let data = JsonData::new(&Message {
            to: vec!["r@x"],
            subject: "S",
            count: 2,
        })
        .unwrap();

        assert_eq!(data.content_type(), "application/json");
        assert_eq!(
            String::from_utf8(data.buffer().unwrap()).unwrap(),
            r#"{"count":2,"subject":"S","to":["r@x"]}"#
        );
    }

    #[test]
    fn json_values_match_buffer() {
        let data = JsonData::new(&Message {
            to: vec!["r@x", "s@x"],
            subject: "S",
            count: 2,
        })
        .unwrap();

        let parsed: serde_json::Map<String, Value> =
            serde_json::from_slice(&data.buffer().unwrap()).unwrap();
        let values = data.values();
        assert_eq!(values.len(), parsed.len());
        for (key, value) in values {
            let expected = match &parsed[&key] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn json_requires_an_object() {
        let err = JsonData::new(&vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::Internal));
        assert_eq!(err.message(), "Error unmarshalling payload");
    }

    #[test]
    fn json_marshalling_failure() {
        struct Broken;

        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("broken"))
            }
        }

        let err = JsonData::new(&Broken).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::Internal));
        assert_eq!(err.message(), "Error marshalling payload");
    }

    fn boundary_of(form: &FormData) -> String {
        form.content_type()
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_owned()
    }

    #[test]
    fn form_buffer() {
        let mut form = FormData::new();
        form.add_value("to", "a@x");
        form.add_value("to", "b@x");
        form.add_buffer("attachment", "notes.txt", b"notes".to_vec());

        let body = String::from_utf8(form.buffer().unwrap()).unwrap();
        let boundary = boundary_of(&form);

        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"to\"\r\n\r\na@x\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"to\"\r\n\r\nb@x\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"attachment\"; filename=\"notes.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nnotes\r\n\
             --{b}--\r\n",
            b = boundary
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn form_boundary_comes_from_reqwest() {
        let mut form = FormData::new();
        form.add_value("subject", "S");

        // four groups of 16 hex digits
        let boundary = boundary_of(&form);
        let groups: Vec<_> = boundary.split('-').collect();
        assert_eq!(boundary.len(), 67);
        assert_eq!(groups.len(), 4);
        assert!(groups
            .iter()
            .all(|g| g.len() == 16 && g.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn form_without_parts() {
        let form = FormData::new();
        let boundary = boundary_of(&form);
        assert_eq!(
            form.buffer().unwrap(),
            format!("--{}--\r\n", boundary).into_bytes()
        );
    }

    #[test]
    fn form_single_file() {
        let mut form = FormData::new();
        form.add_buffer("attachment", "a.bin", vec![0, 1, 2]);

        let body = form.buffer().unwrap();
        let boundary = boundary_of(&form);
        assert!(body.starts_with(format!("--{}\r\n", boundary).as_bytes()));
        assert!(body.ends_with(format!("\r\n--{}--\r\n", boundary).as_bytes()));
    }

    #[test]
    fn form_content_type_materializes() {
        let mut form = FormData::new();
        form.add_value("subject", "S");
        let content_type = form.content_type();
        assert!(content_type.starts_with("multipart/form-data; boundary="));

        // boundary is stable across materializations
        let body = form.buffer().unwrap();
        let boundary = content_type.rsplit('=').next().unwrap();
        assert!(String::from_utf8(body).unwrap().contains(boundary));
        assert_eq!(form.content_type(), content_type);
    }

    #[test]
    fn form_values_exclude_files() {
        let mut form = FormData::new();
        form.add_value("subject", "S");
        form.add_buffer("attachment", "secret.bin", b"secret".to_vec());
        assert_eq!(
            form.values(),
            vec![("subject".to_owned(), "S".to_owned())]
        );
    }

    #[test]
    fn form_escapes_names() {
        let mut form = FormData::new();
        form.add_buffer("attachment", "quo\"te\\.txt", b"x".to_vec());
        let body = String::from_utf8(form.buffer().unwrap()).unwrap();
        assert!(body.contains("filename=\"quo\\\"te\\\\.txt\""));
    }

    /// Accepts `limit` bytes, then fails
    struct FailingWriter {
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.limit == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.limit);
            self.limit -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn form_field_write_failure() {
        let mut form = FormData::new();
        form.add_value("subject", "S");
        form.add_buffer("attachment", "a.txt", b"a".to_vec());

        let err = form.write_to(FailingWriter { limit: 0 }).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::Internal));
        assert_eq!(err.message(), "Error creating form field");
        assert_eq!(err.operation(), Some("FormData.Buffer"));
    }

    #[test]
    fn form_file_write_failure() {
        let mut form = FormData::new();
        form.add_value("subject", "S");
        form.add_buffer("attachment", "a.txt", b"a".to_vec());

        // enough for the text field, not for the file part
        let body = String::from_utf8(form.buffer().unwrap()).unwrap();
        let limit = body.find("name=\"attachment\"").unwrap();
        let err = form.write_to(FailingWriter { limit }).unwrap_err();
        assert_eq!(err.message(), "Error creating form file");
        assert_eq!(err.operation(), Some("FormData.Buffer"));
    }

    #[test]
    fn form_failure_keeps_the_encoding() {
        let mut form = FormData::new();
        form.add_value("subject", "S");
        let content_type = form.content_type();
        assert!(form.write_to(FailingWriter { limit: 0 }).is_err());
        assert_eq!(form.content_type(), content_type);

        // a new value encodes the form again
        form.add_value("text", "T");
        assert_ne!(form.content_type(), content_type);
    }
}
