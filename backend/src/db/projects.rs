//! Project Registry: identity, naming and the download secret.

use crate::db::is_constraint_violation;
use crate::error::{Error, Result};
use crate::security;
use chrono::Utc;
use common::model::project::Project;
use common::model::report::FieldError;
use common::requests::UpdateProjectRequest;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROJECT_COLUMNS: &str = "id, name, created_at, current_schema_version";

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        current_schema_version: row.get(3)?,
    })
}

fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_fields(
            "project name must not be empty",
            vec![FieldError::new("name", "must not be empty")],
        ));
    }
    Ok(name.to_string())
}

fn duplicate_name(name: &str) -> Error {
    Error::Conflict(format!("a project named '{}' already exists", name))
}

pub fn create(conn: &Connection, name: &str, default_password: &str) -> Result<Project> {
    let name = normalize_name(name)?;
    let created_at = Utc::now();
    let password_hash = security::hash_secret(default_password)?;
    conn.execute(
        "INSERT INTO projects (name, created_at, password_hash) VALUES (?1, ?2, ?3)",
        params![name, created_at, password_hash],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            duplicate_name(&name)
        } else {
            e.into()
        }
    })?;
    let id = conn.last_insert_rowid();
    info!("created project {} ({})", id, name);
    get(conn, id)
}

pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects ORDER BY id",
        PROJECT_COLUMNS
    ))?;
    let projects = stmt
        .query_map([], row_to_project)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(projects)
}

pub fn find(conn: &Connection, id: i64) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            params![id],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

pub fn get(conn: &Connection, id: i64) -> Result<Project> {
    find(conn, id)?.ok_or_else(|| Error::project_not_found(id))
}

pub fn ensure_exists(conn: &Connection, id: i64) -> Result<()> {
    get(conn, id).map(|_| ())
}

pub fn rename(conn: &Connection, id: i64, name: &str) -> Result<Project> {
    let name = normalize_name(name)?;
    let changed = conn
        .execute(
            "UPDATE projects SET name = ?1 WHERE id = ?2",
            params![name, id],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                duplicate_name(&name)
            } else {
                e.into()
            }
        })?;
    if changed == 0 {
        return Err(Error::project_not_found(id));
    }
    info!("renamed project {} to {}", id, name);
    get(conn, id)
}

/// Replaces the download secret. The secret is opaque: any non-empty value
/// is accepted.
pub fn set_password(conn: &Connection, id: i64, new_password: &str) -> Result<()> {
    if new_password.is_empty() {
        return Err(Error::invalid_fields(
            "download password must not be empty",
            vec![FieldError::new("download_password", "must not be empty")],
        ));
    }
    let password_hash = security::hash_secret(new_password)?;
    let changed = conn.execute(
        "UPDATE projects SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, id],
    )?;
    if changed == 0 {
        return Err(Error::project_not_found(id));
    }
    info!("download password replaced for project {}", id);
    Ok(())
}

/// Applies a partial update atomically and returns the record without the secret.
pub fn update(conn: &mut Connection, id: i64, req: &UpdateProjectRequest) -> Result<Project> {
    let tx = conn.transaction()?;
    ensure_exists(&tx, id)?;
    if let Some(name) = req.name.as_deref() {
        rename(&tx, id, name)?;
    }
    if let Some(password) = req.download_password.as_deref() {
        set_password(&tx, id, password)?;
    }
    let project = get(&tx, id)?;
    tx.commit()?;
    Ok(project)
}

/// Deletes the project; schema versions and submissions go with it.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(Error::project_not_found(id));
    }
    info!("deleted project {}", id);
    Ok(())
}

pub fn password_hash(conn: &Connection, id: i64) -> Result<Option<String>> {
    let hash = conn
        .query_row(
            "SELECT password_hash FROM projects WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_db;

    #[test]
    fn create_trims_and_lists_without_secret() {
        let (_dir, db) = temp_db();
        let conn = db.open().unwrap();
        let p = create(&conn, "  Trial A ", "init").unwrap();
        assert_eq!(p.name, "Trial A");
        assert_eq!(p.current_schema_version, None);

        let listed = list(&conn).unwrap();
        assert_eq!(listed, vec![p]);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("password"));
    }

    #[test]
    fn blank_and_duplicate_names_are_rejected() {
        let (_dir, db) = temp_db();
        let conn = db.open().unwrap();
        assert!(matches!(
            create(&conn, "   ", "x"),
            Err(Error::InvalidInput { .. })
        ));
        create(&conn, "Trial A", "x").unwrap();
        assert!(matches!(create(&conn, "Trial A", "x"), Err(Error::Conflict(_))));
    }

    #[test]
    fn password_is_stored_hashed() {
        let (_dir, db) = temp_db();
        let conn = db.open().unwrap();
        let p = create(&conn, "Trial A", "initial").unwrap();
        let stored = password_hash(&conn, p.id).unwrap().unwrap();
        assert_ne!(stored, "initial");
        assert!(security::verify_secret(&stored, "initial"));

        set_password(&conn, p.id, "rotated").unwrap();
        let stored = password_hash(&conn, p.id).unwrap().unwrap();
        assert!(security::verify_secret(&stored, "rotated"));
        assert!(!security::verify_secret(&stored, "initial"));
    }

    #[test]
    fn mutations_on_unknown_id_are_not_found() {
        let (_dir, db) = temp_db();
        let mut conn = db.open().unwrap();
        assert!(matches!(rename(&conn, 99, "x"), Err(Error::NotFound { .. })));
        assert!(matches!(
            set_password(&conn, 99, "x"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(delete(&conn, 99), Err(Error::NotFound { .. })));
        let req = UpdateProjectRequest {
            name: Some("y".into()),
            download_password: None,
        };
        assert!(matches!(update(&mut conn, 99, &req), Err(Error::NotFound { .. })));
    }

    #[test]
    fn update_applies_both_fields_or_neither() {
        let (_dir, db) = temp_db();
        let mut conn = db.open().unwrap();
        let p = create(&conn, "Trial A", "initial").unwrap();
        let bad = UpdateProjectRequest {
            name: Some("Trial B".into()),
            download_password: Some(String::new()),
        };
        assert!(update(&mut conn, p.id, &bad).is_err());
        assert_eq!(get(&conn, p.id).unwrap().name, "Trial A");

        let good = UpdateProjectRequest {
            name: Some("Trial B".into()),
            download_password: Some("new".into()),
        };
        let updated = update(&mut conn, p.id, &good).unwrap();
        assert_eq!(updated.name, "Trial B");
        let stored = password_hash(&conn, p.id).unwrap().unwrap();
        assert!(security::verify_secret(&stored, "new"));
    }
}
