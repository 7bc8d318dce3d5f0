use axum::extract::{Multipart, multipart::MultipartError};

use crate::error::HttpError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A multipart body read fully into memory. Text fields keep their order so
/// repeated keys (`categories`) survive.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, UploadedFile)>,
}

fn multipart_error(e: MultipartError) -> HttpError {
    tracing::warn!("malformed multipart body: {}", e);
    HttpError::new(e.body_text(), e.status())
}

impl MultipartForm {
    /// Drain `multipart`. Any single file above `max_file_bytes` is a 413;
    /// file fields sent without content are skipped.
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> Result<Self, HttpError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    if bytes.is_empty() || filename.is_empty() {
                        continue;
                    }
                    if bytes.len() > max_file_bytes {
                        return Err(HttpError::payload_too_large(format!(
                            "File exceeds the {} byte limit",
                            max_file_bytes
                        )));
                    }
                    form.files.push((
                        name,
                        UploadedFile {
                            filename,
                            bytes: bytes.to_vec(),
                        },
                    ));
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.push((name, value));
                }
            }
        }

        Ok(form)
    }

    /// First non-blank value of `name`, trimmed.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .find(|value| !value.is_empty())
    }

    pub fn texts(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, file)| file)
    }

    #[cfg(test)]
    pub fn from_parts(fields: &[(&str, &str)], files: Vec<(&str, UploadedFile)>) -> Self {
        MultipartForm {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: files
                .into_iter()
                .map(|(k, f)| (k.to_string(), f))
                .collect(),
        }
    }
}

/// Category ids from repeated `categories` fields. Values that are not
/// integers are dropped; a single empty value means "no categories".
pub fn category_ids(form: &MultipartForm) -> Vec<i32> {
    let mut ids: Vec<i32> = form
        .texts("categories")
        .into_iter()
        .flat_map(|v| v.split(','))
        .filter_map(|v| v.trim().parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lookup_skips_blank_values() {
        let form = MultipartForm::from_parts(&[("title", "  "), ("title", " Hello ")], vec![]);
        assert_eq!(form.text("title"), Some("Hello"));
        assert_eq!(form.text("content"), None);
    }

    #[test]
    fn categories_accept_repeats_and_commas() {
        let form = MultipartForm::from_parts(
            &[("categories", "3"), ("categories", "1,2"), ("categories", "x"), ("categories", "3")],
            vec![],
        );
        assert_eq!(category_ids(&form), vec![1, 2, 3]);

        let empty = MultipartForm::from_parts(&[("categories", "")], vec![]);
        assert!(category_ids(&empty).is_empty());
    }

    #[test]
    fn files_are_found_by_field_name() {
        let form = MultipartForm::from_parts(
            &[],
            vec![(
                "main_image",
                UploadedFile {
                    filename: "a.png".into(),
                    bytes: vec![1, 2, 3],
                },
            )],
        );
        assert_eq!(form.file("main_image").map(|f| f.bytes.len()), Some(3));
        assert!(form.file("image").is_none());
    }
}
