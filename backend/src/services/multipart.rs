//! Field readers shared by the handlers that accept `multipart/form-data`.

use crate::error::{Error, Result};
use actix_multipart::{Field, MultipartError};
use common::model::report::FieldError;
use futures_util::StreamExt;

/// Text fields are short; anything longer is not a name or a password.
pub const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

pub fn malformed(err: MultipartError) -> Error {
    Error::invalid(format!("malformed multipart body: {}", err))
}

/// Name of the part, from its `Content-Disposition`.
pub fn field_name(field: &Field) -> Option<String> {
    field
        .content_disposition()
        .and_then(|cd| cd.get_name().map(|n| n.to_string()))
}

/// Reads the whole part, rejecting it once it grows past `limit` bytes.
pub async fn read_field(field: &mut Field, limit: usize, name: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if bytes.len() + chunk.len() > limit {
            return Err(Error::invalid_fields(
                "upload rejected",
                vec![FieldError::new(name, format!("exceeds the {} byte limit", limit))],
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

pub async fn read_text(field: &mut Field, name: &str) -> Result<String> {
    let bytes = read_field(field, MAX_TEXT_FIELD_BYTES, name).await?;
    String::from_utf8(bytes).map_err(|_| {
        Error::invalid_fields(
            "upload rejected",
            vec![FieldError::new(name, "must be UTF-8 text")],
        )
    })
}

/// Consumes a part nobody asked for.
pub async fn skip(field: &mut Field) -> Result<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(malformed)?;
    }
    Ok(())
}
