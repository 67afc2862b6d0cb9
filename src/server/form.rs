use crate::error::ProcessError;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use std::collections::HashMap;
use std::str::FromStr;

/// An uploaded file
#[derive(Debug)]
pub(crate) struct Upload {
    pub(crate) file_name: String,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug)]
struct Part {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// All fields of a multipart request, buffered in memory. A repeated field keeps
/// its last value.
#[derive(Debug, Default)]
pub(crate) struct Form {
    parts: HashMap<String, Part>,
}

impl Form {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Form, MultipartError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await?.to_vec();
            form.parts.insert(name, Part { file_name, bytes });
        }
        Ok(form)
    }

    /// Takes a required file field. Uploads without a file name are named after the field.
    pub(crate) fn file(&mut self, name: &str) -> Result<Upload, ProcessError> {
        let part = self
            .parts
            .remove(name)
            .ok_or_else(|| ProcessError::MissingField(name.to_owned()))?;
        Ok(Upload {
            file_name: part.file_name.unwrap_or_else(|| name.to_owned()),
            bytes: part.bytes,
        })
    }

    /// Text of an optional field; blank values count as absent.
    pub(crate) fn text(&self, name: &str) -> Result<Option<&str>, ProcessError> {
        match self.parts.get(name) {
            Some(part) => {
                let text = std::str::from_utf8(&part.bytes).map_err(|_| ProcessError::InvalidParameter {
                    name: name.to_owned(),
                    value: String::from_utf8_lossy(&part.bytes).into_owned(),
                })?;
                Ok(Some(text.trim()).filter(|text| !text.is_empty()))
            }
            None => Ok(None),
        }
    }

    /// Parses an optional field, falling back to `default` when it is absent.
    pub(crate) fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ProcessError> {
        match self.text(name)? {
            Some(text) => text.parse().map_err(|_| ProcessError::InvalidParameter {
                name: name.to_owned(),
                value: text.to_owned(),
            }),
            None => Ok(default),
        }
    }
}
