use std::collections::HashMap;

use axum::extract::Multipart;
use kinship_core::Upload;
use uuid::Uuid;

use crate::error::ApiError;

/// A drained multipart body: text fields by name, and file parts.
#[derive(Debug, Default)]
pub struct Form {
    text: HashMap<String, Vec<String>>,
    files: HashMap<String, Upload>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                    // browsers send an empty part for an untouched file input
                    if !data.is_empty() {
                        form.files.insert(name, Upload::new(file_name, data));
                    }
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                    form.text.entry(name).or_default().push(value);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        self.text(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid, ApiError> {
        let raw = self.required(name)?;
        Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest(format!("{name} must be a valid id")))
    }

    /// A list of ids, sent either as repeated fields or as one JSON array.
    pub fn uuids(&self, name: &str) -> Result<Vec<Uuid>, ApiError> {
        let invalid = || ApiError::BadRequest(format!("{name} must be a list of valid ids"));
        let Some(values) = self.text.get(name) else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::new();
        for value in values {
            let value = value.trim();
            if value.starts_with('[') {
                let parsed: Vec<Uuid> = serde_json::from_str(value).map_err(|_| invalid())?;
                ids.extend(parsed);
            } else {
                ids.push(Uuid::parse_str(value).map_err(|_| invalid())?);
            }
        }
        Ok(ids)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.text.entry(name.to_string()).or_default().push(value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_accept_repeated_fields_or_json() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let repeated = Form::default()
            .with_text("memberIds", &a.to_string())
            .with_text("memberIds", &b.to_string());
        assert_eq!(repeated.uuids("memberIds").unwrap(), vec![a, b]);

        let json = Form::default().with_text("memberIds", &format!("[\"{a}\",\"{b}\"]"));
        assert_eq!(json.uuids("memberIds").unwrap(), vec![a, b]);

        assert!(Form::default().uuids("memberIds").unwrap().is_empty());
        let bad = Form::default().with_text("memberIds", "[1,2]");
        assert!(matches!(bad.uuids("memberIds"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn required_rejects_blank() {
        let form = Form::default().with_text("name", "  ");
        assert!(form.required("name").is_err());
        assert!(form.required("missing").is_err());
        assert!(Form::default().with_text("name", "x").required("name").is_ok());
    }
}
