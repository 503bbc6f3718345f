//! Table and field metadata: the schema side of the catalog.
//!
//! A [`TableMeta`] is the durable description of one table: ordered
//! [`FieldMeta`] entries laying fields out inside a fixed-width record image,
//! plus the [`IndexMeta`] entries attached to the table. Metadata is persisted
//! as pretty JSON next to the table's heap file and reloaded on open.

use std::{fs, path::Path};

use ahash::RandomState;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::AttrType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Column description supplied by DDL before layout is computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub attr_type: AttrType,
    pub len: usize,
}

impl Column {
    pub fn new(name: &str, attr_type: AttrType, len: usize) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            len,
        }
    }
}

/// Layout and visibility of one field inside a record image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    name: String,
    attr_type: AttrType,
    offset: usize,
    len: usize,
    visible: bool,
}

impl FieldMeta {
    pub fn new(name: &str, attr_type: AttrType, offset: usize, len: usize, visible: bool) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            offset,
            len,
            visible,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn visible(&self) -> bool {
        self.visible
    }
}

/// Description of a single-column index attached to a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    name: String,
    field: String,
}

impl IndexMeta {
    pub fn new(name: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Durable description of one table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    table_id: u64,
    name: String,
    fields: Vec<FieldMeta>,
    indexes: Vec<IndexMeta>,
    record_size: usize,
    #[serde(skip)]
    #[serde(default)]
    field_lookup: Map<String, usize>,
}

impl TableMeta {
    /// Compute the record layout for a new table.
    ///
    /// Fields are laid out in declaration order, each at the end of the
    /// previous one. Chars columns use their declared length; other kinds use
    /// their fixed width.
    pub fn new(table_id: u64, name: &str, columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::InvalidArgument(format!(
                "table '{name}' must have at least one column"
            )));
        }

        let mut fields = Vec::with_capacity(columns.len());
        let mut offset = 0usize;
        for column in &columns {
            if columns
                .iter()
                .filter(|c| c.name.eq_ignore_ascii_case(&column.name))
                .count()
                > 1
            {
                return Err(DbError::InvalidArgument(format!(
                    "duplicate column '{}' on table '{name}'",
                    column.name
                )));
            }
            let len = match column.attr_type.fixed_len() {
                Some(len) => len,
                None => {
                    if column.len == 0 {
                        return Err(DbError::InvalidArgument(format!(
                            "column '{}' needs a positive length",
                            column.name
                        )));
                    }
                    column.len
                }
            };
            fields.push(FieldMeta::new(&column.name, column.attr_type, offset, len, true));
            offset += len;
        }

        let mut meta = Self {
            table_id,
            name: name.to_string(),
            fields,
            indexes: Vec::new(),
            record_size: offset,
            field_lookup: Map::default(),
        };
        meta.rebuild_lookup();
        Ok(meta)
    }

    pub fn table_id(&self) -> u64 {
        self.table_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total byte width of one record image.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Every field, system fields included, in layout order.
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Fields a `*` projection expands to, in layout order.
    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.visible())
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.field_lookup
            .get(&name.to_lowercase())
            .map(|idx| &self.fields[*idx])
    }

    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    /// First index whose key column is `field`, if any.
    pub fn find_index_by_field(&self, field: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.field() == field)
    }

    pub fn add_index(&mut self, index: IndexMeta) -> DbResult<()> {
        if self.index(index.name()).is_some() {
            return Err(DbError::InvalidArgument(format!(
                "index '{}' already exists on table '{}'",
                index.name(),
                self.name
            )));
        }
        if self.field(index.field()).is_none() {
            return Err(DbError::SchemaFieldMissing(format!(
                "{}.{}",
                self.name,
                index.field()
            )));
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn remove_index(&mut self, name: &str) -> DbResult<()> {
        let pos = self
            .indexes
            .iter()
            .position(|i| i.name() == name)
            .ok_or_else(|| {
                DbError::NotFound(format!("index '{name}' on table '{}'", self.name))
            })?;
        self.indexes.remove(pos);
        Ok(())
    }

    /// Load table metadata from its JSON file.
    pub fn load(path: &Path) -> DbResult<Self> {
        let data = fs::read_to_string(path)?;
        let mut meta: TableMeta = serde_json::from_str(&data)
            .map_err(|err| DbError::Storage(format!("invalid table meta file: {err}")))?;
        meta.rebuild_lookup();
        Ok(meta)
    }

    /// Persist table metadata as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Storage(format!("serialize table meta failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    fn rebuild_lookup(&mut self) {
        self.field_lookup.clear();
        for (idx, field) in self.fields.iter().enumerate() {
            self.field_lookup.insert(field.name().to_lowercase(), idx);
        }
    }
}
