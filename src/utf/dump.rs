//! Structured text dump of a table tree.

use serde_json::{json, Map, Value as Json};

use super::{BlobPayload, Field, FieldStorage, Table, Value};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn field_key(field: &Field, index: usize) -> String {
    field
        .name()
        .map(|n| n.text().into_owned())
        .unwrap_or_else(|| format!("#{}", index))
}

fn value_json(value: &Value) -> Json {
    match value {
        Value::U8(v) => json!(v),
        Value::I8(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::F32(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::String(s) => json!(s.text()),
        Value::Guid(g) => json!(hex(g)),
        Value::Blob(b) => match b.payload() {
            BlobPayload::Empty => Json::Null,
            BlobPayload::Bytes(bytes) => json!(hex(bytes)),
            BlobPayload::Table(t) => to_json(t),
            BlobPayload::Archive(a) => json!({
                "archive": {
                    "key": a.key(),
                    "header_only": a.is_header_only(),
                    "entries": a.entries().iter().map(|e| json!({
                        "id": e.id(),
                        "size": e.size(),
                    })).collect::<Vec<_>>(),
                }
            }),
        },
    }
}

/// Render a table, recursing into nested tables.
pub fn to_json(table: &Table) -> Json {
    let fields: Vec<Json> = table
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let storage = match f.storage() {
                FieldStorage::Absent => "absent",
                FieldStorage::Defaulted(_) => "default",
                FieldStorage::PerRow => "row",
            };
            json!({ "name": field_key(f, i), "type": f.value_type().name(), "storage": storage })
        })
        .collect();

    let rows: Vec<Json> = (0..table.row_count())
        .map(|r| {
            let mut row = Map::new();
            for (i, f) in table.fields().iter().enumerate() {
                if let Some(v) = table.get_at(r, i) {
                    row.insert(field_key(f, i), value_json(v));
                }
            }
            Json::Object(row)
        })
        .collect();

    json!({
        "name": table.name().text(),
        "encoding": table.encoding().name(),
        "fields": fields,
        "rows": rows,
    })
}
