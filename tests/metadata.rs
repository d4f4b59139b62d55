mod common;

use common::{Department, Person};
use derrick::{
    AsValue, Entity, EntitySchema, FieldSource, MAX_NAVIGATION_DEPTH, Result, Value, resolve,
};
use std::sync::Arc;

#[test]
fn descriptor_captures_table_columns_and_identity() {
    let descriptor = resolve::<Person>();
    assert_eq!(descriptor.table, "People");
    let columns: Vec<_> = descriptor.columns.iter().map(|c| c.column.as_str()).collect();
    assert_eq!(columns, vec!["PersonId", "Name", "Age", "DepartmentId"]);
    assert_eq!(descriptor.identity().unwrap().property, "PersonId");
    assert!(descriptor.column("Age").is_some());
    assert!(descriptor.column("Department").is_none());
}

#[test]
fn navigation_uses_the_id_suffix_convention() {
    let descriptor = resolve::<Person>();
    let navigation = descriptor.navigation("Department").unwrap();
    assert_eq!(navigation.foreign_key, "DepartmentId");
    assert_eq!(navigation.child.table, "Departments");
    assert_eq!(navigation.child.identity().unwrap().column, "DepartmentId");
}

struct Product {
    sku: String,
    title: String,
    secret: String,
}

impl Entity for Product {
    fn schema() -> EntitySchema {
        EntitySchema::new("Products")
            .identity("Sku", String::as_empty_value())
            .scalar_as("Title", "DisplayTitle", String::as_empty_value())
            .ignore("Secret")
    }
    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            sku: fields.take("Sku")?,
            title: fields.take("Title")?,
            secret: String::new(),
        })
    }
    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Sku", self.sku.clone().as_value()),
            ("Title", self.title.clone().as_value()),
        ]
    }
}

#[test]
fn naming_overrides_and_ignore_markers_apply() {
    let descriptor = resolve::<Product>();
    assert_eq!(descriptor.column("Title").unwrap().column, "DisplayTitle");
    assert!(descriptor.column("Secret").is_none());
    assert_eq!(descriptor.columns.len(), 2);
}

struct Orphan {
    id: i32,
    department: Option<Department>,
}

impl Entity for Orphan {
    fn schema() -> EntitySchema {
        // No DepartmentId property, so the convention cannot derive a join
        // column.
        EntitySchema::new("Orphans")
            .identity("OrphanId", i32::as_empty_value())
            .navigation::<Department>("Department")
    }
    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.take("OrphanId")?,
            department: fields.child("Department")?,
        })
    }
    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("OrphanId", self.id.as_value())]
    }
}

#[test]
fn navigation_without_a_join_column_is_skipped() {
    let descriptor = resolve::<Orphan>();
    assert!(descriptor.navigations.is_empty());
}

struct Note {
    text: String,
}

impl Entity for Note {
    fn schema() -> EntitySchema {
        EntitySchema::new("Notes").scalar("Text", String::as_empty_value())
    }
    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            text: fields.take("Text")?,
        })
    }
    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("Text", self.text.clone().as_value())]
    }
}

struct Ticket {
    id: i32,
    note_id: Option<i32>,
    note: Option<Note>,
}

impl Entity for Ticket {
    fn schema() -> EntitySchema {
        EntitySchema::new("Tickets")
            .identity("TicketId", i32::as_empty_value())
            .scalar("NoteId", i32::as_empty_value())
            .navigation::<Note>("Note")
    }
    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.take("TicketId")?,
            note_id: fields.take("NoteId")?,
            note: fields.child("Note")?,
        })
    }
    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("TicketId", self.id.as_value()),
            ("NoteId", self.note_id.as_value()),
        ]
    }
}

#[test]
fn navigation_to_an_identity_less_target_is_skipped() {
    let descriptor = resolve::<Ticket>();
    assert!(descriptor.navigations.is_empty());
}

struct Employee {
    id: i32,
    manager_id: Option<i32>,
    manager: Option<Box<Employee>>,
}

impl Entity for Employee {
    fn schema() -> EntitySchema {
        EntitySchema::new("Employees")
            .identity("EmployeeId", i32::as_empty_value())
            .scalar("ManagerId", i32::as_empty_value())
            .navigation_via::<Employee>("Manager", "ManagerId")
    }
    fn from_fields(fields: &mut FieldSource<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.take("EmployeeId")?,
            manager_id: fields.take("ManagerId")?,
            manager: fields.child("Manager")?.map(Box::new),
        })
    }
    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("EmployeeId", self.id.as_value()),
            ("ManagerId", self.manager_id.as_value()),
        ]
    }
}

#[test]
fn cyclic_navigation_terminates_at_the_depth_bound() {
    let mut descriptor = resolve::<Employee>();
    let mut depth = 0;
    loop {
        let Some(child) = descriptor.navigation("Manager").map(|n| n.child.clone()) else {
            break;
        };
        depth += 1;
        descriptor = child;
    }
    assert_eq!(depth, MAX_NAVIGATION_DEPTH);
}

#[test]
fn concurrent_resolution_yields_one_descriptor() {
    let descriptors: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(resolve::<Person>)).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for descriptor in &descriptors[1..] {
        assert!(Arc::ptr_eq(&descriptors[0], descriptor));
    }
}
