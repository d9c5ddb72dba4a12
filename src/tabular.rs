//! Tabular adapter.
//!
//! A [`Table`] is a set of rows with named columns. A [`TableCommand`] wraps a command
//! factory and either fills a table from a query or applies the command once per table row,
//! taking parameter values from the row's columns.
//!
//! Each parameter reads the column named like the parameter unless it is mapped:
//! `map_parameter("p", "col")` reads `col` instead, `skip_parameter("p")` keeps the value
//! the parameter was built with.

use crate::db::{Command, QueryState, Row};
use crate::error::{DbError, DbResult};
use crate::queries::{CommandFactory, Queries};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append rows, adding any column not seen before.
    pub fn append_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            for key in row.keys() {
                if !self.columns.iter().any(|c| c == key) {
                    self.columns.push(key.clone());
                }
            }
            self.rows.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableOperation {
    Select,
    Insert,
    Update,
    Delete,
}

pub struct TableCommand<S> {
    operation: TableOperation,
    factory: CommandFactory<S>,
    column_map: HashMap<String, Option<String>>,
}

impl<S: QueryState> TableCommand<S> {
    fn with_operation(operation: TableOperation, factory: CommandFactory<S>) -> Self {
        Self {
            operation,
            factory,
            column_map: HashMap::new(),
        }
    }

    pub fn select(factory: CommandFactory<S>) -> Self {
        Self::with_operation(TableOperation::Select, factory)
    }

    pub fn insert(factory: CommandFactory<S>) -> Self {
        Self::with_operation(TableOperation::Insert, factory)
    }

    pub fn update(factory: CommandFactory<S>) -> Self {
        Self::with_operation(TableOperation::Update, factory)
    }

    pub fn delete(factory: CommandFactory<S>) -> Self {
        Self::with_operation(TableOperation::Delete, factory)
    }

    pub fn operation(&self) -> TableOperation {
        self.operation
    }

    /// Read `parameter`'s value from `column`.
    pub fn map_parameter(
        mut self,
        parameter: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.column_map.insert(parameter.into(), Some(column.into()));
        self
    }

    /// Never read `parameter` from a row.
    pub fn skip_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.column_map.insert(parameter.into(), None);
        self
    }

    /// The column `parameter` is read from, or `None` when it is skipped.
    pub fn source_column<'a>(&'a self, parameter: &'a str) -> Option<&'a str> {
        match self.column_map.get(parameter) {
            Some(mapped) => mapped.as_deref(),
            None => Some(parameter),
        }
    }

    /// Rebind `template`'s parameters from `row`. Absent and NULL columns bind typed NULLs.
    pub fn bind_row(&self, template: &Command, row: &Row) -> DbResult<Command> {
        let mut command = template.clone();
        for parameter in command.parameters_mut() {
            let Some(column) = self
                .source_column(parameter.source_name())
                .map(str::to_string)
            else {
                continue;
            };
            let value = match row.get(&column) {
                Some(value) => parameter.logical_type().value_from_json(value)?,
                None => None,
            };
            parameter.rebind(value);
        }
        Ok(command)
    }

    /// Run the select command and append its rows to `table`.
    pub fn fill_table(self, table: Table) -> Queries<Table, S> {
        if self.operation != TableOperation::Select {
            return Queries::fail(self.wrong_operation("fill a table"));
        }
        self.factory.fetch_all().map(move |rows| {
            let mut table = table;
            let before = table.len();
            table.append_rows(rows);
            debug!(rows = table.len() - before, "Filled table");
            table
        })
    }

    /// Execute the insert, update or delete command once per row of `table`; yields the
    /// total number of rows affected.
    pub fn apply_rows(self, table: Table) -> Queries<u64, S> {
        if self.operation == TableOperation::Select {
            return Queries::fail(self.wrong_operation("apply table rows"));
        }
        Queries::new(move |state: &mut S| {
            async move {
                let template = self.factory.build(state)?;
                let mut affected = 0;
                for row in &table.rows {
                    let command = self.bind_row(&template, row)?;
                    affected += state.execute(&command).await?;
                }
                debug!(
                    operation = ?self.operation,
                    rows = table.len(),
                    affected,
                    "Applied table rows"
                );
                Ok(affected)
            }
            .boxed()
        })
    }

    fn wrong_operation(&self, action: &str) -> DbError {
        DbError::invalid_input(format!(
            "A {:?} table command cannot {action}",
            self.operation
        ))
    }
}

impl<S: QueryState> CommandFactory<S> {
    /// Shorthand for `TableCommand::select(self).fill_table(table)`.
    pub fn fill_table(self, table: Table) -> Queries<Table, S> {
        TableCommand::select(self).fill_table(table)
    }
}
