use crate::cursor::Cursor;
use crate::diagnostics::{self, Diagnostics};
use crate::document::{self, Document, ID_FIELD};
use crate::error::{Result, ShelfDbError};
use crate::query;
use crate::schema::Schema;
use crate::storage::CollectionFile;
use serde_json::Value;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

/// File extension of collection files
pub const FILE_EXTENSION: &str = "json";

/// Tunables for a collection handle.
#[derive(Clone)]
pub struct CollectionOptions {
    /// Validate (and coerce) every document returned by `find` before the
    /// cursor is handed out. Off by default since it rejects stored documents
    /// that predate a schema change.
    pub validate_on_find: bool,
    /// Validate and coerce the fields named by an update payload before it is
    /// merged. Stored fields the update leaves out are never checked. On by
    /// default.
    pub validate_updates: bool,
    /// Where failing operations are reported before the error is returned.
    pub diagnostics: Arc<dyn Diagnostics>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            validate_on_find: false,
            validate_updates: true,
            diagnostics: diagnostics::default_sink(),
        }
    }
}

impl CollectionOptions {
    pub fn validate_on_find(mut self, enabled: bool) -> Self {
        self.validate_on_find = enabled;
        self
    }

    pub fn validate_updates(mut self, enabled: bool) -> Self {
        self.validate_updates = enabled;
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = sink;
        self
    }
}

impl fmt::Debug for CollectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionOptions")
            .field("validate_on_find", &self.validate_on_find)
            .field("validate_updates", &self.validate_updates)
            .finish_non_exhaustive()
    }
}

/// A named collection stored as `<storage_path>/<name>.json`.
///
/// Every operation reads the whole file, works on it in memory and, for
/// writes, replaces the whole file. The per-path lock is held from the read
/// to the write, so handles in one process that share a file never interleave.
#[derive(Debug)]
pub struct Collection {
    name: String,
    file: CollectionFile,
    schema: Arc<Schema>,
    options: CollectionOptions,
}

impl Collection {
    /// Open (creating if needed) the collection `name` under `storage_path`.
    pub fn open(
        name: &str,
        storage_path: impl AsRef<Path>,
        schema: impl Into<Arc<Schema>>,
    ) -> Result<Self> {
        Self::open_with(name, storage_path, schema, CollectionOptions::default())
    }

    pub fn open_with(
        name: &str,
        storage_path: impl AsRef<Path>,
        schema: impl Into<Arc<Schema>>,
        options: CollectionOptions,
    ) -> Result<Self> {
        let storage_path = storage_path.as_ref();
        let opened = check_config(name, storage_path).and_then(|()| {
            CollectionFile::open(storage_path.join(format!("{name}.{FILE_EXTENSION}")))
        });

        match opened {
            Ok(file) => Ok(Collection {
                name: name.to_string(),
                file,
                schema: schema.into(),
                options,
            }),
            Err(e) => {
                options.diagnostics.report(name, "open", &e);
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical path of the backing file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Validate `doc`, give it a fresh id, append it and persist.
    /// Returns the stored document.
    pub fn create_one(&self, doc: Value) -> Result<Document> {
        self.run("create_one", || {
            let mut doc = document::into_document(doc)?;
            self.schema.validate(&mut doc)?;
            doc.insert(ID_FIELD.to_string(), Value::String(document::new_id()));

            let _guard = self.file.lock();
            let mut docs = self.file.read_all()?;
            docs.push(doc.clone());
            self.file.write_all(&docs)?;
            Ok(doc)
        })
    }

    /// Insert a batch. Every document is validated before any id is assigned;
    /// one invalid document rejects the whole batch and nothing is written.
    pub fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Document>> {
        self.run("insert_many", || {
            let mut batch = docs
                .into_iter()
                .map(|value| {
                    let mut doc = document::into_document(value)?;
                    self.schema.validate(&mut doc)?;
                    Ok(doc)
                })
                .collect::<Result<Vec<Document>>>()?;

            for doc in &mut batch {
                doc.insert(ID_FIELD.to_string(), Value::String(document::new_id()));
            }

            let _guard = self.file.lock();
            let mut stored = self.file.read_all()?;
            stored.extend(batch.iter().cloned());
            self.file.write_all(&stored)?;
            log::debug!("{}: inserted {} documents", self.name, batch.len());
            Ok(batch)
        })
    }

    /// All documents matching `query`, wrapped in a cursor for further shaping.
    pub fn find(&self, query: &Value) -> Result<Cursor> {
        self.run("find", || {
            let mut matched: Vec<Document> = self
                .read()?
                .into_iter()
                .filter(|doc| query::matches(doc, query))
                .collect();

            if self.options.validate_on_find {
                for doc in &mut matched {
                    self.schema.validate(doc)?;
                }
            }
            Ok(Cursor::new(matched, Arc::clone(&self.schema))
                .with_diagnostics(&self.name, Arc::clone(&self.options.diagnostics)))
        })
    }

    /// The first document matching `query` in file order.
    pub fn find_one(&self, query: &Value) -> Result<Option<Document>> {
        self.run("find_one", || {
            Ok(self.read()?.into_iter().find(|doc| query::matches(doc, query)))
        })
    }

    /// Number of documents matching `query`.
    pub fn count(&self, query: &Value) -> Result<usize> {
        self.run("count", || {
            Ok(self.read()?.iter().filter(|doc| query::matches(doc, query)).count())
        })
    }

    /// Remove the first document matching `query` and return it. The file is
    /// left untouched when nothing matches.
    pub fn find_and_delete_one(&self, query: &Value) -> Result<Document> {
        self.run("find_and_delete_one", || {
            let _guard = self.file.lock();
            let mut docs = self.file.read_all()?;
            let index = docs
                .iter()
                .position(|doc| query::matches(doc, query))
                .ok_or(ShelfDbError::DocumentNotFound)?;

            let removed = docs.remove(index);
            self.file.write_all(&docs)?;
            Ok(removed)
        })
    }

    /// Merge `update` into the first document matching `query` and return the
    /// merged document. The file is left untouched when nothing matches.
    pub fn find_one_and_update(&self, query: &Value, update: &Value) -> Result<Document> {
        self.run("find_one_and_update", || {
            let update = self.prepare_update(update)?;

            let _guard = self.file.lock();
            let mut docs = self.file.read_all()?;
            let target = docs
                .iter_mut()
                .find(|doc| query::matches(doc, query))
                .ok_or(ShelfDbError::DocumentNotFound)?;

            document::merge(target, &update);
            let updated = target.clone();
            self.file.write_all(&docs)?;
            Ok(updated)
        })
    }

    /// Merge `update` into every matching document. The file is rewritten even
    /// when nothing matches. Returns the whole collection after the update.
    pub fn update_many(&self, query: &Value, update: &Value) -> Result<Vec<Document>> {
        self.run("update_many", || {
            let update = self.prepare_update(update)?;

            let _guard = self.file.lock();
            let mut docs = self.file.read_all()?;
            let mut modified = 0usize;
            for doc in docs.iter_mut().filter(|doc| query::matches(doc, query)) {
                document::merge(doc, &update);
                modified += 1;
            }

            self.file.write_all(&docs)?;
            log::debug!("{}: updated {modified} documents", self.name);
            Ok(docs)
        })
    }

    /// Remove every matching document. The file is rewritten even when nothing
    /// matches. Returns the remaining documents.
    pub fn delete_many(&self, query: &Value) -> Result<Vec<Document>> {
        self.run("delete_many", || {
            let _guard = self.file.lock();
            let mut docs = self.file.read_all()?;
            let before = docs.len();
            docs.retain(|doc| !query::matches(doc, query));

            self.file.write_all(&docs)?;
            log::debug!("{}: deleted {} documents", self.name, before - docs.len());
            Ok(docs)
        })
    }

    /// Check every stored document against the schema. Returns the id (or
    /// `#<position>` for documents without one) and problems of each document
    /// that fails.
    pub fn validate_all(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.run("validate_all", || {
            let report = self
                .read()?
                .iter()
                .enumerate()
                .filter_map(|(index, doc)| {
                    let problems = self.schema.check(doc);
                    if problems.is_empty() {
                        return None;
                    }
                    let label = document::document_id(doc)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("#{index}"));
                    Some((label, problems))
                })
                .collect();
            Ok(report)
        })
    }

    fn read(&self) -> Result<Vec<Document>> {
        let _guard = self.file.lock();
        self.file.read_all()
    }

    fn prepare_update(&self, update: &Value) -> Result<Document> {
        let mut update = update_object(update)?.clone();
        if self.options.validate_updates {
            self.schema.validate_update(&mut update)?;
        }
        Ok(update)
    }

    /// Run an operation, reporting its error to the diagnostics sink before
    /// handing it back.
    fn run<T>(&self, operation: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        op().map_err(|e| {
            self.options.diagnostics.report(&self.name, operation, &e);
            e
        })
    }
}

fn update_object(update: &Value) -> Result<&Document> {
    update.as_object().ok_or_else(|| {
        ShelfDbError::InvalidDocument(format!(
            "update must be an object, got {}",
            document::type_name(update)
        ))
    })
}

fn check_config(name: &str, storage_path: &Path) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ShelfDbError::InvalidCollectionConfig(
            "collection name is empty".into(),
        ));
    }
    if storage_path.as_os_str().is_empty() {
        return Err(ShelfDbError::InvalidCollectionConfig(
            "storage path is empty".into(),
        ));
    }
    let single_component = matches!(
        Path::new(name).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if !single_component || name.contains(['/', '\\']) {
        return Err(ShelfDbError::InvalidCollectionConfig(format!(
            "collection name '{name}' must be a plain file name"
        )));
    }
    Ok(())
}
