//! Multipart form handling shared by the upload endpoints.

use std::str::FromStr;

use axum::extract::Multipart;
use axum::response::Response;

use crate::app::errors;

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully buffered multipart form.
#[derive(Debug, Default)]
pub struct FormData {
    texts: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl FormData {
    /// Drain the request body. File inputs submitted without a file are
    /// skipped.
    pub async fn read(mut multipart: Multipart) -> Result<Self, Response> {
        let mut form = FormData::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(errors::bad_request(format!("malformed multipart body: {e}"))),
            };

            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| errors::bad_request(format!("could not read field '{name}': {e}")))?;

            match file_name {
                Some(file_name) => {
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.push(FilePart {
                        field: name,
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let text = String::from_utf8(bytes.to_vec())
                        .map_err(|_| errors::bad_request(format!("field '{name}' is not valid UTF-8")))?;
                    form.texts.push((name, text));
                }
            }
        }
        Ok(form)
    }

    /// First non-blank value of a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .find(|v| !v.trim().is_empty())
    }

    /// Every non-blank value of a repeated text field.
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.texts
            .iter()
            .filter(|(n, v)| n == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
            .collect()
    }

    /// Remove and return every file submitted under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<FilePart> {
        let (taken, rest): (Vec<FilePart>, Vec<FilePart>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field == name);
        self.files = rest;
        taken
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, Response> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| errors::bad_request(format!("invalid value for '{name}'"))),
        }
    }

    pub fn required<T: FromStr>(&self, name: &str) -> Result<T, Response> {
        self.parse(name)?
            .ok_or_else(|| errors::bad_request(format!("'{name}' is required")))
    }

    /// Checkbox-style boolean: true/false, on/off, 1/0, yes/no.
    pub fn flag(&self, name: &str) -> Result<Option<bool>, Response> {
        match self.text(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) => match v.as_str() {
                "true" | "on" | "1" | "yes" => Ok(Some(true)),
                "false" | "off" | "0" | "no" => Ok(Some(false)),
                _ => Err(errors::bad_request(format!("invalid value for '{name}'"))),
            },
        }
    }
}
