#![allow(dead_code)]

use derrick::{
    AsValue, DatabaseClient, EntitySchema, Entity, FieldSource, IsolationLevel, NativeTransaction,
    Parameter, Result, Row, RowLabeled, RowNames, Value,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct Department {
    pub id: i32,
    pub name: String,
}

impl Entity for Department {
    fn schema() -> EntitySchema {
        EntitySchema::new("Departments")
            .identity("DepartmentId", i32::as_empty_value())
            .scalar("Name", String::as_empty_value())
    }

    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.take("DepartmentId")?,
            name: fields.take("Name")?,
        })
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("DepartmentId", self.id.as_value()),
            ("Name", self.name.clone().as_value()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub department_id: Option<i32>,
    pub department: Option<Department>,
}

impl Person {
    pub fn sample(name: &str, age: i32) -> Self {
        Self {
            id: 0,
            name: name.into(),
            age,
            department_id: None,
            department: None,
        }
    }
}

impl Entity for Person {
    fn schema() -> EntitySchema {
        EntitySchema::new("People")
            .identity("PersonId", i32::as_empty_value())
            .scalar("Name", String::as_empty_value())
            .scalar("Age", i32::as_empty_value())
            .scalar("DepartmentId", i32::as_empty_value())
            .navigation::<Department>("Department")
    }

    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.take("PersonId")?,
            name: fields.take("Name")?,
            age: fields.take("Age")?,
            department_id: fields.take("DepartmentId")?,
            department: fields.child("Department")?,
        })
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("PersonId", self.id.as_value()),
            ("Name", self.name.clone().as_value()),
            ("Age", self.age.as_value()),
            ("DepartmentId", self.department_id.as_value()),
        ]
    }
}

pub fn logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A labeled row from (column, value) pairs.
pub fn row(pairs: &[(&str, Value)]) -> RowLabeled {
    let labels: RowNames = pairs
        .iter()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>()
        .into();
    let values: Row = pairs
        .iter()
        .map(|(_, value)| value.clone())
        .collect::<Vec<_>>()
        .into();
    RowLabeled::new(labels, values)
}

/// Recording fake client. Every statement lands in `statements`; query
/// results are served from a FIFO of queued rowset groups. Native
/// transactions share the same recorders and log begin/commit/rollback
/// events.
#[derive(Default)]
pub struct MockClient {
    statements: Arc<Mutex<Vec<(String, Vec<Parameter>)>>>,
    results: Arc<Mutex<VecDeque<Vec<Vec<RowLabeled>>>>>,
    events: Arc<Mutex<Vec<String>>>,
    next_transaction: AtomicU64,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_rows(&self, rows: Vec<RowLabeled>) {
        self.results.lock().unwrap().push_back(vec![rows]);
    }

    pub fn queue_rowsets(&self, rowsets: Vec<Vec<RowLabeled>>) {
        self.results.lock().unwrap().push_back(rowsets);
    }

    pub fn recorded_sql(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn recorded(&self) -> Vec<(String, Vec<Parameter>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, params: &[Parameter]) {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }

    fn next_rowsets(&self) -> Vec<Vec<RowLabeled>> {
        self.results.lock().unwrap().pop_front().unwrap_or_default()
    }
}

impl DatabaseClient for MockClient {
    fn execute(&self, sql: &str, params: &[Parameter]) -> Result<u64> {
        self.record(sql, params);
        Ok(1)
    }

    fn query(&self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>> {
        self.record(sql, params);
        Ok(self.next_rowsets().into_iter().next().unwrap_or_default())
    }

    fn query_multi(&self, sql: &str, params: &[Parameter]) -> Result<Vec<Vec<RowLabeled>>> {
        self.record(sql, params);
        Ok(self.next_rowsets())
    }

    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn NativeTransaction>> {
        let id = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        self.events
            .lock()
            .unwrap()
            .push(format!("begin {} {:?}", id, isolation));
        Ok(Box::new(MockTransaction {
            id,
            statements: self.statements.clone(),
            results: self.results.clone(),
            events: self.events.clone(),
        }))
    }
}

pub struct MockTransaction {
    id: u64,
    statements: Arc<Mutex<Vec<(String, Vec<Parameter>)>>>,
    results: Arc<Mutex<VecDeque<Vec<Vec<RowLabeled>>>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl NativeTransaction for MockTransaction {
    fn execute(&mut self, sql: &str, params: &[Parameter]) -> Result<u64> {
        self.statements
            .lock()
            .unwrap()
            .push((format!("tx{}: {}", self.id, sql), params.to_vec()));
        Ok(1)
    }

    fn query(&mut self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>> {
        self.statements
            .lock()
            .unwrap()
            .push((format!("tx{}: {}", self.id, sql), params.to_vec()));
        let group = self.results.lock().unwrap().pop_front().unwrap_or_default();
        Ok(group.into_iter().next().unwrap_or_default())
    }

    fn commit(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(format!("commit {}", self.id));
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("rollback {}", self.id));
        Ok(())
    }
}
