//! SQLite implementation of `LocalStore`
//!
//! Handles all domain-type serialization and SQL query construction for
//! the on-device persistence of every synchronized entity kind.
//!
//! ## Type mapping
//!
//! | Domain type         | SQL type | Strategy                           |
//! |----------------------|----------|-------------------------------------|
//! | `LocalId`            | TEXT     | UUID string via `to_string`/`FromStr` |
//! | `Guid`               | TEXT     | string via `as_str`/`Guid::new`     |
//! | `Usn`                | INTEGER  | `i32`                               |
//! | `DateTime<Utc>`      | TEXT     | RFC 3339 via `to_rfc3339`/`parse_from_rfc3339` |
//! | tag/resource lists   | rows     | `note_tags`/`resources` join tables |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evercore_core::domain::{Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, Tag, Usn};
use evercore_core::ports::local_store::{NoteFetchOptions, NoteListOptions};
use evercore_core::ports::LocalStore;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::CacheError;

pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("failed to parse datetime '{s}': {e}")))
}

fn parse_local_id(s: &str) -> Result<LocalId, CacheError> {
    LocalId::from_str(s).map_err(|e| CacheError::SerializationError(format!("invalid local id '{s}': {e}")))
}

fn parse_guid(s: &str) -> Result<Guid, CacheError> {
    Guid::new(s).map_err(|e| CacheError::SerializationError(format!("invalid guid '{s}': {e}")))
}

fn parse_optional_guid(s: Option<String>) -> Result<Option<Guid>, CacheError> {
    s.map(|s| parse_guid(&s)).transpose()
}

fn notebook_from_row(row: &SqliteRow) -> Result<Notebook, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;
    let owning: Option<String> = row.try_get("owning_linked_notebook_guid")?;

    Ok(Notebook {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        name: row.try_get("name")?,
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
        is_default: row.try_get::<i64, _>("is_default")? != 0,
        owning_linked_notebook_guid: parse_optional_guid(owning)?,
    })
}

fn tag_from_row(row: &SqliteRow) -> Result<Tag, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;
    let parent_local_id: Option<String> = row.try_get("parent_tag_local_id")?;
    let parent_guid: Option<String> = row.try_get("parent_tag_guid")?;
    let owning: Option<String> = row.try_get("owning_linked_notebook_guid")?;

    Ok(Tag {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        name: row.try_get("name")?,
        parent_tag_local_id: parent_local_id.map(|s| parse_local_id(&s)).transpose()?,
        parent_tag_guid: parse_optional_guid(parent_guid)?,
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
        owning_linked_notebook_guid: parse_optional_guid(owning)?,
    })
}

fn saved_search_from_row(row: &SqliteRow) -> Result<SavedSearch, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;

    Ok(SavedSearch {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        name: row.try_get("name")?,
        query: row.try_get("query")?,
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
    })
}

fn linked_notebook_from_row(row: &SqliteRow) -> Result<LinkedNotebook, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;

    Ok(LinkedNotebook {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        share_name: row.try_get("share_name")?,
        shared_notebook_global_id: row.try_get("shared_notebook_global_id")?,
        uri: row.try_get("uri")?,
        shard_id: row.try_get("shard_id")?,
        note_store_url: row.try_get("note_store_url")?,
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
    })
}

fn note_from_row(row: &SqliteRow) -> Result<Note, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;
    let notebook_local_id: String = row.try_get("notebook_local_id")?;
    let notebook_guid: Option<String> = row.try_get("notebook_guid")?;
    let created: String = row.try_get("created")?;
    let updated: String = row.try_get("updated")?;

    Ok(Note {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        notebook_local_id: parse_local_id(&notebook_local_id)?,
        notebook_guid: parse_optional_guid(notebook_guid)?,
        tag_local_ids: Vec::new(),
        tag_guids: Vec::new(),
        resource_local_ids: Vec::new(),
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
        created: parse_datetime(&created)?,
        updated: parse_datetime(&updated)?,
    })
}

fn resource_from_row(row: &SqliteRow, with_binary_data: bool) -> Result<Resource, CacheError> {
    let local_id: String = row.try_get("local_id")?;
    let guid: Option<String> = row.try_get("guid")?;
    let usn: Option<i32> = row.try_get("usn")?;
    let note_local_id: String = row.try_get("note_local_id")?;
    let note_guid: Option<String> = row.try_get("note_guid")?;
    let data: Option<Vec<u8>> = if with_binary_data { row.try_get("data")? } else { None };

    Ok(Resource {
        local_id: parse_local_id(&local_id)?,
        guid: parse_optional_guid(guid)?,
        update_sequence_number: usn.map(Usn),
        note_local_id: parse_local_id(&note_local_id)?,
        note_guid: parse_optional_guid(note_guid)?,
        mime: row.try_get("mime")?,
        data,
        data_size: row.try_get::<i64, _>("data_size")? as u64,
        data_hash: row.try_get("data_hash")?,
        locally_modified: row.try_get::<i64, _>("locally_modified")? != 0,
        local_only: row.try_get::<i64, _>("local_only")? != 0,
    })
}

impl SqliteLocalStore {
    async fn hydrate_note(&self, mut note: Note, options: NoteFetchOptions) -> Result<Note, CacheError> {
        let tag_rows = sqlx::query("SELECT tag_local_id, tag_guid FROM note_tags WHERE note_local_id = ?")
            .bind(note.local_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        for row in tag_rows {
            let tag_local_id: String = row.try_get("tag_local_id")?;
            let tag_guid: Option<String> = row.try_get("tag_guid")?;
            note.tag_local_ids.push(parse_local_id(&tag_local_id)?);
            if let Some(guid) = parse_optional_guid(tag_guid)? {
                note.tag_guids.push(guid);
            }
        }

        if options.with_resource_metadata {
            let resource_rows = sqlx::query("SELECT * FROM resources WHERE note_local_id = ?")
                .bind(note.local_id.to_string())
                .fetch_all(&self.pool)
                .await?;
            for row in &resource_rows {
                let resource = resource_from_row(row, options.with_resource_binary_data)?;
                note.resource_local_ids.push(resource.local_id);
            }
        } else {
            let ids: Vec<String> = sqlx::query_scalar("SELECT local_id FROM resources WHERE note_local_id = ?")
                .bind(note.local_id.to_string())
                .fetch_all(&self.pool)
                .await?;
            for id in ids {
                note.resource_local_ids.push(parse_local_id(&id)?);
            }
        }

        Ok(note)
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn put_notebook(&self, notebook: &Notebook) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notebooks \
                (local_id, guid, usn, name, locally_modified, local_only, is_default, owning_linked_notebook_guid) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, name = excluded.name, \
                locally_modified = excluded.locally_modified, local_only = excluded.local_only, \
                is_default = excluded.is_default, \
                owning_linked_notebook_guid = excluded.owning_linked_notebook_guid",
        )
        .bind(notebook.local_id.to_string())
        .bind(notebook.guid.as_ref().map(Guid::as_str))
        .bind(notebook.update_sequence_number.map(|u| u.0))
        .bind(&notebook.name)
        .bind(notebook.locally_modified as i64)
        .bind(notebook.local_only as i64)
        .bind(notebook.is_default as i64)
        .bind(notebook.owning_linked_notebook_guid.as_ref().map(Guid::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<Notebook>> {
        let row = sqlx::query("SELECT * FROM notebooks WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(notebook_from_row).transpose()?)
    }

    async fn find_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Notebook>> {
        let row = sqlx::query("SELECT * FROM notebooks WHERE guid = ?")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(notebook_from_row).transpose()?)
    }

    async fn list_notebooks(&self) -> anyhow::Result<Vec<Notebook>> {
        let rows = sqlx::query("SELECT * FROM notebooks").fetch_all(&self.pool).await?;
        rows.iter().map(notebook_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn expunge_notebook(&self, guid: &Guid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM notebooks WHERE guid = ?")
            .bind(guid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_tag(&self, tag: &Tag) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO tags \
                (local_id, guid, usn, name, parent_tag_local_id, parent_tag_guid, \
                 locally_modified, local_only, owning_linked_notebook_guid) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, name = excluded.name, \
                parent_tag_local_id = excluded.parent_tag_local_id, \
                parent_tag_guid = excluded.parent_tag_guid, \
                locally_modified = excluded.locally_modified, local_only = excluded.local_only, \
                owning_linked_notebook_guid = excluded.owning_linked_notebook_guid",
        )
        .bind(tag.local_id.to_string())
        .bind(tag.guid.as_ref().map(Guid::as_str))
        .bind(tag.update_sequence_number.map(|u| u.0))
        .bind(&tag.name)
        .bind(tag.parent_tag_local_id.map(|id| id.to_string()))
        .bind(tag.parent_tag_guid.as_ref().map(Guid::as_str))
        .bind(tag.locally_modified as i64)
        .bind(tag.local_only as i64)
        .bind(tag.owning_linked_notebook_guid.as_ref().map(Guid::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_tag(&self, local_id: LocalId) -> anyhow::Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tag_from_row).transpose()?)
    }

    async fn find_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE guid = ?")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tag_from_row).transpose()?)
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT * FROM tags").fetch_all(&self.pool).await?;
        rows.iter().map(tag_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn expunge_tag(&self, guid: &Guid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM tags WHERE guid = ?")
            .bind(guid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_saved_search(&self, search: &SavedSearch) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO saved_searches (local_id, guid, usn, name, query, locally_modified, local_only) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, name = excluded.name, \
                query = excluded.query, locally_modified = excluded.locally_modified, \
                local_only = excluded.local_only",
        )
        .bind(search.local_id.to_string())
        .bind(search.guid.as_ref().map(Guid::as_str))
        .bind(search.update_sequence_number.map(|u| u.0))
        .bind(&search.name)
        .bind(&search.query)
        .bind(search.locally_modified as i64)
        .bind(search.local_only as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_saved_search(&self, local_id: LocalId) -> anyhow::Result<Option<SavedSearch>> {
        let row = sqlx::query("SELECT * FROM saved_searches WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(saved_search_from_row).transpose()?)
    }

    async fn list_saved_searches(&self) -> anyhow::Result<Vec<SavedSearch>> {
        let rows = sqlx::query("SELECT * FROM saved_searches").fetch_all(&self.pool).await?;
        rows.iter().map(saved_search_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn expunge_saved_search(&self, guid: &Guid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM saved_searches WHERE guid = ?")
            .bind(guid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_linked_notebook(&self, linked_notebook: &LinkedNotebook) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO linked_notebooks \
                (local_id, guid, usn, share_name, shared_notebook_global_id, uri, shard_id, \
                 note_store_url, locally_modified, local_only) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, share_name = excluded.share_name, \
                shared_notebook_global_id = excluded.shared_notebook_global_id, uri = excluded.uri, \
                shard_id = excluded.shard_id, note_store_url = excluded.note_store_url, \
                locally_modified = excluded.locally_modified, local_only = excluded.local_only",
        )
        .bind(linked_notebook.local_id.to_string())
        .bind(linked_notebook.guid.as_ref().map(Guid::as_str))
        .bind(linked_notebook.update_sequence_number.map(|u| u.0))
        .bind(&linked_notebook.share_name)
        .bind(&linked_notebook.shared_notebook_global_id)
        .bind(&linked_notebook.uri)
        .bind(&linked_notebook.shard_id)
        .bind(&linked_notebook.note_store_url)
        .bind(linked_notebook.locally_modified as i64)
        .bind(linked_notebook.local_only as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_linked_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<LinkedNotebook>> {
        let row = sqlx::query("SELECT * FROM linked_notebooks WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(linked_notebook_from_row).transpose()?)
    }

    async fn find_linked_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<LinkedNotebook>> {
        let row = sqlx::query("SELECT * FROM linked_notebooks WHERE guid = ?")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(linked_notebook_from_row).transpose()?)
    }

    async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>> {
        let rows = sqlx::query("SELECT * FROM linked_notebooks").fetch_all(&self.pool).await?;
        rows.iter().map(linked_notebook_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn expunge_linked_notebook(&self, guid: &Guid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM linked_notebooks WHERE guid = ?")
            .bind(guid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_note(&self, note: &Note) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notes \
                (local_id, guid, usn, title, content, notebook_local_id, notebook_guid, \
                 locally_modified, local_only, created, updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, title = excluded.title, \
                content = excluded.content, notebook_local_id = excluded.notebook_local_id, \
                notebook_guid = excluded.notebook_guid, locally_modified = excluded.locally_modified, \
                local_only = excluded.local_only, created = excluded.created, updated = excluded.updated",
        )
        .bind(note.local_id.to_string())
        .bind(note.guid.as_ref().map(Guid::as_str))
        .bind(note.update_sequence_number.map(|u| u.0))
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.notebook_local_id.to_string())
        .bind(note.notebook_guid.as_ref().map(Guid::as_str))
        .bind(note.locally_modified as i64)
        .bind(note.local_only as i64)
        .bind(note.created.to_rfc3339())
        .bind(note.updated.to_rfc3339())
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM note_tags WHERE note_local_id = ?")
            .bind(note.local_id.to_string())
            .execute(&self.pool)
            .await?;
        for (i, tag_local_id) in note.tag_local_ids.iter().enumerate() {
            let tag_guid = note.tag_guids.get(i).map(Guid::as_str);
            sqlx::query("INSERT INTO note_tags (note_local_id, tag_local_id, tag_guid) VALUES (?, ?, ?)")
                .bind(note.local_id.to_string())
                .bind(tag_local_id.to_string())
                .bind(tag_guid)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn find_note(&self, local_id: LocalId, options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
        let row = sqlx::query("SELECT * FROM notes WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let note = note_from_row(&row)?;
        Ok(Some(self.hydrate_note(note, options).await?))
    }

    async fn find_note_by_guid(&self, guid: &Guid, options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
        let row = sqlx::query("SELECT * FROM notes WHERE guid = ?")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let note = note_from_row(&row)?;
        Ok(Some(self.hydrate_note(note, options).await?))
    }

    async fn list_notes(&self, options: NoteListOptions) -> anyhow::Result<Vec<Note>> {
        let mut sql = String::from("SELECT * FROM notes WHERE 1 = 1");
        if options.locally_modified_only {
            sql.push_str(" AND locally_modified != 0");
        }
        if options.exclude_local_only {
            sql.push_str(" AND local_only = 0");
        }
        if options.notebook_local_id.is_some() {
            sql.push_str(" AND notebook_local_id = ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(notebook_local_id) = options.notebook_local_id {
            query = query.bind(notebook_local_id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut notes = Vec::with_capacity(rows.len());
        for row in &rows {
            let note = note_from_row(row)?;
            notes.push(self.hydrate_note(note, options.fetch).await?);
        }
        Ok(notes)
    }

    async fn expunge_note(&self, guid: &Guid) -> anyhow::Result<()> {
        let local_id: Option<String> = sqlx::query_scalar("SELECT local_id FROM notes WHERE guid = ?")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if let Some(local_id) = local_id {
            sqlx::query("DELETE FROM note_tags WHERE note_local_id = ?")
                .bind(&local_id)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM resources WHERE note_local_id = ?")
                .bind(&local_id)
                .execute(&self.pool)
                .await?;
        }
        sqlx::query("DELETE FROM notes WHERE guid = ?")
            .bind(guid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_resource(&self, resource: &Resource) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO resources \
                (local_id, guid, usn, note_local_id, note_guid, mime, data, data_size, \
                 data_hash, locally_modified, local_only) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (local_id) DO UPDATE SET \
                guid = excluded.guid, usn = excluded.usn, note_local_id = excluded.note_local_id, \
                note_guid = excluded.note_guid, mime = excluded.mime, data = excluded.data, \
                data_size = excluded.data_size, data_hash = excluded.data_hash, \
                locally_modified = excluded.locally_modified, local_only = excluded.local_only",
        )
        .bind(resource.local_id.to_string())
        .bind(resource.guid.as_ref().map(Guid::as_str))
        .bind(resource.update_sequence_number.map(|u| u.0))
        .bind(resource.note_local_id.to_string())
        .bind(resource.note_guid.as_ref().map(Guid::as_str))
        .bind(&resource.mime)
        .bind(&resource.data)
        .bind(resource.data_size as i64)
        .bind(&resource.data_hash)
        .bind(resource.locally_modified as i64)
        .bind(resource.local_only as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_resource(&self, local_id: LocalId, with_binary_data: bool) -> anyhow::Result<Option<Resource>> {
        let row = sqlx::query("SELECT * FROM resources WHERE local_id = ?")
            .bind(local_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .as_ref()
            .map(|r| resource_from_row(r, with_binary_data))
            .transpose()?)
    }

    async fn list_resources_for_note(&self, note_local_id: LocalId) -> anyhow::Result<Vec<Resource>> {
        let rows = sqlx::query("SELECT * FROM resources WHERE note_local_id = ?")
            .bind(note_local_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| resource_from_row(r, false))
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DatabasePool;

    async fn store() -> SqliteLocalStore {
        let pool = DatabasePool::in_memory().await.unwrap();
        SqliteLocalStore::new(pool.pool().clone())
    }

    #[tokio::test]
    async fn put_then_find_notebook_roundtrips() {
        let store = store().await;
        let notebook = Notebook::new("Inbox");
        store.put_notebook(&notebook).await.unwrap();

        let found = store.find_notebook(notebook.local_id).await.unwrap().unwrap();
        assert_eq!(found.name, "Inbox");
        assert!(found.is_new());
    }

    #[tokio::test]
    async fn find_notebook_by_guid_after_sync() {
        let store = store().await;
        let mut notebook = Notebook::new("Work");
        notebook.guid = Some(Guid::new("nb-1").unwrap());
        notebook.update_sequence_number = Some(Usn(5));
        notebook.locally_modified = false;
        store.put_notebook(&notebook).await.unwrap();

        let found = store
            .find_notebook_by_guid(&Guid::new("nb-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.local_id, notebook.local_id);
        assert!(!found.is_new());
    }

    #[tokio::test]
    async fn note_roundtrips_with_tags_and_resources() {
        let store = store().await;
        let notebook = Notebook::new("Inbox");
        store.put_notebook(&notebook).await.unwrap();

        let tag = Tag::new("work");
        store.put_tag(&tag).await.unwrap();

        let mut note = Note::new("Hello", notebook.local_id);
        note.tag_local_ids.push(tag.local_id);

        let resource = Resource::new(note.local_id, "image/png");
        note.resource_local_ids.push(resource.local_id);

        store.put_note(&note).await.unwrap();
        store.put_resource(&resource).await.unwrap();

        let found = store
            .find_note(note.local_id, NoteFetchOptions::with_resource_metadata())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.title, "Hello");
        assert_eq!(found.tag_local_ids, vec![tag.local_id]);
        assert_eq!(found.resource_local_ids, vec![resource.local_id]);
    }

    #[tokio::test]
    async fn list_notes_filters_by_locally_modified() {
        let store = store().await;
        let notebook = Notebook::new("Inbox");
        store.put_notebook(&notebook).await.unwrap();

        let mut synced = Note::new("Synced", notebook.local_id);
        synced.locally_modified = false;
        synced.update_sequence_number = Some(Usn(1));
        store.put_note(&synced).await.unwrap();

        let dirty = Note::new("Dirty", notebook.local_id);
        store.put_note(&dirty).await.unwrap();

        let dirty_notes = store
            .list_notes(NoteListOptions {
                locally_modified_only: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(dirty_notes.len(), 1);
        assert_eq!(dirty_notes[0].local_id, dirty.local_id);
    }

    #[tokio::test]
    async fn expunge_note_removes_join_rows() {
        let store = store().await;
        let notebook = Notebook::new("Inbox");
        store.put_notebook(&notebook).await.unwrap();

        let tag = Tag::new("work");
        store.put_tag(&tag).await.unwrap();

        let mut note = Note::new("Hello", notebook.local_id);
        note.guid = Some(Guid::new("note-1").unwrap());
        note.tag_local_ids.push(tag.local_id);
        store.put_note(&note).await.unwrap();

        store.expunge_note(&Guid::new("note-1").unwrap()).await.unwrap();

        assert!(store.find_note(note.local_id, NoteFetchOptions::metadata_only()).await.unwrap().is_none());
    }
}
