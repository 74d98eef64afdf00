//! In-memory table model: schema, rows and field storage transitions.

use tracing::debug;

use crate::afs2::Archive;
use crate::util::{Error, Result, ValueType};

use super::{Blob, HeapString, TextEncoding, Value};

/// How a field supplies its value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldStorage {
    /// No value at all.
    Absent,
    /// One value shared by every row.
    Defaulted(Value),
    /// A slot in every row.
    PerRow,
}

/// A field descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: Option<HeapString>,
    value_type: ValueType,
    storage: FieldStorage,
}

impl Field {
    /// Named field stored in every row.
    pub fn per_row(name: &str, value_type: ValueType) -> Self {
        Self { name: Some(name.into()), value_type, storage: FieldStorage::PerRow }
    }

    /// Named field with one shared value.
    pub fn defaulted(name: &str, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value_type: value.value_type(),
            storage: FieldStorage::Defaulted(value),
        }
    }

    /// Named field with no value.
    pub fn absent(name: &str, value_type: ValueType) -> Self {
        Self { name: Some(name.into()), value_type, storage: FieldStorage::Absent }
    }

    /// Build a field from parsed parts. A default must match the type.
    pub fn new(name: Option<HeapString>, value_type: ValueType, storage: FieldStorage) -> Result<Self> {
        if let FieldStorage::Defaulted(v) = &storage {
            if v.value_type() != value_type {
                return Err(Error::TypeMismatch {
                    expected: value_type.name(),
                    actual: v.value_type().name(),
                });
            }
        }
        Ok(Self { name, value_type, storage })
    }

    #[inline]
    pub fn name(&self) -> Option<&HeapString> {
        self.name.as_ref()
    }

    #[inline]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    #[inline]
    pub fn storage(&self) -> &FieldStorage {
        &self.storage
    }

    #[inline]
    pub fn is_per_row(&self) -> bool {
        matches!(self.storage, FieldStorage::PerRow)
    }

    pub fn default_value(&self) -> Option<&Value> {
        match &self.storage {
            FieldStorage::Defaulted(v) => Some(v),
            _ => None,
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.as_ref().is_some_and(|n| n == name)
    }

    fn label(&self) -> String {
        self.name.as_ref().map(|n| n.text().into_owned()).unwrap_or_default()
    }
}

/// Heap placement parameters observed on parse and reused on write.
///
/// Alignments are measured from the table start (heap starts) or from the
/// blob heap start (individual blobs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLayout {
    pub string_heap_align: u32,
    pub blob_heap_align: u32,
    pub blob_align: u32,
    /// Repeated strings share one heap entry.
    pub pooled_strings: bool,
}

impl Default for HeapLayout {
    fn default() -> Self {
        Self { string_heap_align: 8, blob_heap_align: 8, blob_align: 1, pooled_strings: false }
    }
}

/// A parsed or synthesized @UTF table.
///
/// `rows[r][f]` is `Some` exactly when field `f` is stored per row.
/// Equality ignores the heap layout.
#[derive(Clone, Debug)]
pub struct Table {
    name: HeapString,
    encoding: TextEncoding,
    fields: Vec<Field>,
    rows: Vec<Vec<Option<Value>>>,
    layout: HeapLayout,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.encoding == other.encoding
            && self.fields == other.fields
            && self.rows == other.rows
    }
}

impl Table {
    /// Create an empty table with no fields.
    pub fn new(name: &str) -> Self {
        Self::with_encoding(name.into(), TextEncoding::Utf8)
    }

    pub fn with_encoding(name: HeapString, encoding: TextEncoding) -> Self {
        Self {
            name,
            encoding,
            fields: Vec::new(),
            rows: Vec::new(),
            layout: HeapLayout::default(),
        }
    }

    pub(crate) fn from_parts(
        name: HeapString,
        encoding: TextEncoding,
        fields: Vec<Field>,
        rows: Vec<Vec<Option<Value>>>,
        layout: HeapLayout,
    ) -> Self {
        Self { name, encoding, fields, rows, layout }
    }

    #[inline]
    pub fn name(&self) -> &HeapString {
        &self.name
    }

    #[inline]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn layout(&self) -> HeapLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: HeapLayout) {
        self.layout = layout;
    }

    pub(crate) fn raw_rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    /// Index of the first field with this name.
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.is_named(name))
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.is_named(name))
    }

    /// Append a field. Existing rows get the type's zero value for a
    /// per-row field.
    pub fn add_field(&mut self, field: Field) -> Result<usize> {
        if let Some(name) = field.name() {
            if self.fields.iter().any(|f| f.name() == Some(name)) {
                return Err(Error::other(format!("duplicate field {}", name)));
            }
        }
        let slot = field.is_per_row().then(|| Value::zero(field.value_type));
        for row in &mut self.rows {
            row.push(slot.clone());
        }
        self.fields.push(field);
        Ok(self.fields.len() - 1)
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows.len() {
            return Err(Error::RowOutOfBounds { index: row, count: self.rows.len() });
        }
        Ok(())
    }

    /// Value by field position: the row's slot, else the shared default.
    pub fn get_at(&self, row: usize, field: usize) -> Option<&Value> {
        match &self.fields.get(field)?.storage {
            FieldStorage::PerRow => self.rows.get(row)?.get(field)?.as_ref(),
            FieldStorage::Defaulted(v) => Some(v),
            FieldStorage::Absent => None,
        }
    }

    /// Value of `name` in `row`; `None` when the field has no storage.
    pub fn get(&self, row: usize, name: &str) -> Result<Option<&Value>> {
        let idx = self.field_index(name)?;
        self.check_row(row)?;
        Ok(self.get_at(row, idx))
    }

    /// Integer value of `name` in `row`.
    pub fn uint(&self, row: usize, name: &str) -> Result<Option<u64>> {
        match self.get(row, name)? {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or(Error::TypeMismatch {
                expected: "unsigned integer",
                actual: v.value_type().name(),
            }),
        }
    }

    pub fn string(&self, row: usize, name: &str) -> Result<Option<&HeapString>> {
        match self.get(row, name)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(v) => Err(Error::TypeMismatch { expected: "string", actual: v.value_type().name() }),
        }
    }

    pub fn blob(&self, row: usize, name: &str) -> Result<Option<&Blob>> {
        match self.get(row, name)? {
            None => Ok(None),
            Some(Value::Blob(b)) => Ok(Some(b)),
            Some(v) => Err(Error::TypeMismatch { expected: "data", actual: v.value_type().name() }),
        }
    }

    /// Nested table held in a blob cell.
    pub fn table(&self, row: usize, name: &str) -> Result<Option<&Table>> {
        Ok(self.blob(row, name)?.and_then(Blob::table))
    }

    /// Nested archive held in a blob cell.
    pub fn archive(&self, row: usize, name: &str) -> Result<Option<&Archive>> {
        Ok(self.blob(row, name)?.and_then(Blob::archive))
    }

    /// Mutable access to a cell.
    ///
    /// A defaulted field in a table with more than one row is promoted
    /// first so the edit stays local to `row`.
    pub fn value_mut(&mut self, row: usize, name: &str) -> Result<&mut Value> {
        let idx = self.field_index(name)?;
        self.check_row(row)?;
        let promote = match self.fields[idx].storage {
            FieldStorage::Absent => return Err(Error::NoStorage(name.to_string())),
            FieldStorage::Defaulted(_) => self.rows.len() > 1,
            FieldStorage::PerRow => false,
        };
        if promote {
            self.promote(idx);
        }
        let count = self.rows.len();
        match &mut self.fields[idx].storage {
            FieldStorage::Defaulted(v) => Ok(v),
            _ => self.rows[row][idx]
                .as_mut()
                .ok_or(Error::RowOutOfBounds { index: row, count }),
        }
    }

    pub fn blob_mut(&mut self, row: usize, name: &str) -> Result<&mut Blob> {
        let value = self.value_mut(row, name)?;
        let actual = value.value_type().name();
        value.as_blob_mut().ok_or(Error::TypeMismatch { expected: "data", actual })
    }

    pub fn table_mut(&mut self, row: usize, name: &str) -> Result<Option<&mut Table>> {
        Ok(self.blob_mut(row, name)?.table_mut())
    }

    pub fn archive_mut(&mut self, row: usize, name: &str) -> Result<Option<&mut Archive>> {
        Ok(self.blob_mut(row, name)?.archive_mut())
    }

    /// Turn a defaulted field into a per-row one, copying the default
    /// into every existing row. One-way.
    fn promote(&mut self, idx: usize) {
        let field = &mut self.fields[idx];
        let FieldStorage::Defaulted(default) =
            std::mem::replace(&mut field.storage, FieldStorage::PerRow)
        else {
            return;
        };
        debug!(table = %self.name, field = %field.label(), "promoting field to per-row storage");
        for row in &mut self.rows {
            row[idx] = Some(default.clone());
        }
    }

    /// Set one cell.
    ///
    /// Writing a value equal to a field's default is a no-op; a different
    /// value promotes the field.
    pub fn set(&mut self, row: usize, name: &str, value: Value) -> Result<()> {
        let idx = self.field_index(name)?;
        self.check_row(row)?;
        let value = value.coerce(self.fields[idx].value_type)?;
        let promote = match &self.fields[idx].storage {
            FieldStorage::Absent => return Err(Error::NoStorage(name.to_string())),
            FieldStorage::Defaulted(d) if *d == value => return Ok(()),
            FieldStorage::Defaulted(_) => true,
            FieldStorage::PerRow => false,
        };
        if promote {
            self.promote(idx);
        }
        self.rows[row][idx] = Some(value);
        Ok(())
    }

    /// Set several cells of one row. Nothing changes if any value is rejected.
    pub fn set_row(&mut self, row: usize, values: &[(&str, Value)]) -> Result<()> {
        self.check_row(row)?;
        let mut checked = Vec::with_capacity(values.len());
        for (name, value) in values {
            let idx = self.field_index(name)?;
            if matches!(self.fields[idx].storage, FieldStorage::Absent) {
                return Err(Error::NoStorage(name.to_string()));
            }
            checked.push((*name, value.clone().coerce(self.fields[idx].value_type)?));
        }
        for (name, value) in checked {
            self.set(row, name, value)?;
        }
        Ok(())
    }

    /// Append a row and return its index.
    ///
    /// Per-row fields take the supplied value (or the type's zero value);
    /// defaulted fields are promoted when the supplied value differs; values
    /// for absent or unknown fields are ignored. All values are checked
    /// before the table changes.
    pub fn add_row(&mut self, values: &[(&str, Value)]) -> Result<usize> {
        let mut pending: Vec<Option<Value>> = vec![None; self.fields.len()];
        for (name, value) in values {
            let Ok(idx) = self.field_index(name) else {
                debug!(table = %self.name, field = name, "ignoring value for unknown field");
                continue;
            };
            let field = &self.fields[idx];
            if matches!(field.storage, FieldStorage::Absent) {
                debug!(table = %self.name, field = name, "ignoring value for field without storage");
                continue;
            }
            pending[idx] = Some(value.clone().coerce(field.value_type)?);
        }

        for idx in 0..self.fields.len() {
            let differs = match (&self.fields[idx].storage, &pending[idx]) {
                (FieldStorage::Defaulted(d), Some(v)) => d != v,
                _ => false,
            };
            if differs {
                self.promote(idx);
            }
        }

        let row = self
            .fields
            .iter()
            .zip(pending)
            .map(|(field, value)| {
                field.is_per_row().then(|| {
                    value.unwrap_or_else(|| {
                        debug!(table = %self.name, field = %field.label(), "no value supplied, using zero");
                        Value::zero(field.value_type)
                    })
                })
            })
            .collect();
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }
}
