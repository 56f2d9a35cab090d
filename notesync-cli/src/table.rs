/// Table formatting for note listings using comfy-table

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use notesync_core::{InstanceId, Note, Tombstone};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format notes as a table, most recently updated first
pub fn format_notes_table(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "No notes found".to_string();
    }

    let mut sorted: Vec<&Note> = notes.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["id", "title", "tags", "preview", "updated", "synced"]);

    for note in sorted {
        table.add_row(vec![
            Cell::new(&note.id),
            Cell::new(&note.title),
            Cell::new(note.tags.join(", ")),
            Cell::new(&note.preview),
            Cell::new(format_time(note.updated_at)),
            Cell::new(if note.synced { "yes" } else { "no" }),
        ]);
    }

    table.to_string()
}

/// Format pending tombstones as a table
pub fn format_tombstones_table(tombstones: &[Tombstone]) -> String {
    if tombstones.is_empty() {
        return "No pending deletions".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["id", "deleted"]);

    for tombstone in tombstones {
        table.add_row(vec![
            Cell::new(&tombstone.id),
            Cell::new(format_time(tombstone.recorded_at)),
        ]);
    }

    table.to_string()
}

/// Format registered users and their instance ids
pub fn format_users_table(users: &[(String, InstanceId)], current: Option<&str>) -> String {
    if users.is_empty() {
        return "No users registered".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["user", "instance id", "current"]);

    for (user, id) in users {
        let marker = if current == Some(user.as_str()) { "*" } else { "" };
        table.add_row(vec![Cell::new(user), Cell::new(id), Cell::new(marker)]);
    }

    table.to_string()
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}
