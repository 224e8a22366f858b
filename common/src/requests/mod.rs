use crate::model::schema::SchemaStructure;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub download_password: Option<String>,
}

/// The schema editor posts the structure as free JSON; it is only trusted
/// after it deserializes into [`SchemaStructure`] and passes well-formedness
/// checks on the backend.
#[derive(Debug, Deserialize, Serialize)]
pub struct SaveSchemaRequest {
    pub structure: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SaveSchemaResponse {
    pub version: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DownloadRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LatestSchemaResponse {
    pub version: i64,
    pub structure: SchemaStructure,
}
