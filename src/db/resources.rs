//! Externalized query files.
//!
//! Query text can live in files named `{logical_name}.{extension}`, one per backend
//! (`pgsql`, `mysql`, `sqlite`). A [`QueryLocator`] finds them in a [`QueryStore`]: the
//! files compiled into the binary with `include_dir!`, or an in-memory map.
//!
//! Lookup tries the exact resource name first, then a unique resource whose path ends with
//! `/{file}`. Several matches are an error rather than a silent pick.

use crate::error::{DbError, DbResult};
use crate::models::BackendKind;
use include_dir::{Dir, DirEntry};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// A read-only collection of named query resources.
pub trait QueryStore: Send + Sync {
    /// All resource names, `/`-separated.
    fn resource_names(&self) -> Vec<String>;

    fn open(&self, name: &str) -> Option<Box<dyn Read + '_>>;
}

/// Query files embedded at compile time.
///
/// ```ignore
/// static QUERIES: Dir = include_dir!("$CARGO_MANIFEST_DIR/queries");
/// let locator = QueryLocator::new(EmbeddedQueries::new(&QUERIES));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedQueries {
    dir: &'static Dir<'static>,
}

impl EmbeddedQueries {
    pub const fn new(dir: &'static Dir<'static>) -> Self {
        Self { dir }
    }
}

/// Recursively collect file paths relative to the embedded root.
fn collect_files(dir: &Dir<'_>, names: &mut Vec<String>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(subdir) => collect_files(subdir, names),
            DirEntry::File(file) => names.push(file.path().to_string_lossy().replace('\\', "/")),
        }
    }
}

impl QueryStore for EmbeddedQueries {
    fn resource_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_files(self.dir, &mut names);
        names
    }

    fn open(&self, name: &str) -> Option<Box<dyn Read + '_>> {
        self.dir
            .get_file(name)
            .map(|file| Box::new(file.contents()) as Box<dyn Read>)
    }
}

/// Query text registered at runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueries {
    entries: BTreeMap<String, String>,
}

impl MemoryQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(name.into(), text.into());
    }
}

impl QueryStore for MemoryQueries {
    fn resource_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn open(&self, name: &str) -> Option<Box<dyn Read + '_>> {
        self.entries
            .get(name)
            .map(|text| Box::new(text.as_bytes()) as Box<dyn Read>)
    }
}

/// Shared handle to the store query files are resolved from.
#[derive(Clone)]
pub struct QueryLocator {
    store: Arc<dyn QueryStore>,
}

impl QueryLocator {
    pub fn new(store: impl QueryStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn embedded(dir: &'static Dir<'static>) -> Self {
        Self::new(EmbeddedQueries::new(dir))
    }

    /// A locator with no resources.
    pub fn empty() -> Self {
        Self::new(MemoryQueries::new())
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.store.resource_names()
    }

    /// Find the resource for `file`: exact name, else a unique path-suffix match.
    pub fn find(&self, file: &str) -> DbResult<String> {
        let names = self.store.resource_names();
        if names.iter().any(|n| n == file) {
            return Ok(file.to_string());
        }

        let suffix = format!("/{file}");
        let mut matches: Vec<String> = names
            .iter()
            .filter(|n| n.ends_with(&suffix))
            .cloned()
            .collect();
        match matches.len() {
            0 => Err(DbError::query_resource_not_found(file, names.len())),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                Err(DbError::ambiguous_query_resource(file, matches))
            }
        }
    }

    /// Read a resource as UTF-8 text.
    pub fn read(&self, name: &str) -> DbResult<String> {
        let mut reader = self
            .store
            .open(name)
            .ok_or_else(|| DbError::query_resource_not_found(name, self.resource_names().len()))?;
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|e| {
            DbError::internal(format!("Failed to read query resource '{name}': {e}"))
        })?;
        Ok(text)
    }
}

impl Default for QueryLocator {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for QueryLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLocator")
            .field("resources", &self.store.resource_names().len())
            .finish()
    }
}

/// Load the query text for `logical_name` written for `kind`.
///
/// Positional tokens `{0}`, `{1}`, ... are replaced by `substitutions` when the list is
/// non-empty; `{{` and `}}` stand for literal braces. Substitution is plain text
/// replacement: never pass untrusted input through it.
pub fn resolve_query(
    locator: &QueryLocator,
    logical_name: &str,
    kind: BackendKind,
    substitutions: &[String],
) -> DbResult<String> {
    let file = format!("{}.{}", logical_name, kind.query_file_extension());
    let resource = locator.find(&file)?;
    let text = locator.read(&resource)?;
    debug!(resource = %resource, backend = %kind, "Resolved query resource");

    if substitutions.is_empty() {
        Ok(text)
    } else {
        substitute(&text, substitutions)
    }
}

/// Replace `{n}` tokens with `values[n]`.
pub fn substitute(template: &str, values: &[String]) -> DbResult<String> {
    let malformed = |at: usize| {
        DbError::invalid_input(format!("Malformed substitution token at byte {at} in query text"))
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, d)) if d.is_ascii_digit() => digits.push(d),
                        _ => return Err(malformed(pos)),
                    }
                }
                let index: usize = digits.parse().map_err(|_| malformed(pos))?;
                let value = values.get(index).ok_or_else(|| {
                    DbError::invalid_input(format!(
                        "Substitution {{{index}}} has no value ({} supplied)",
                        values.len()
                    ))
                })?;
                out.push_str(value);
            }
            '}' => return Err(malformed(pos)),
            other => out.push(other),
        }
    }
    Ok(out)
}
