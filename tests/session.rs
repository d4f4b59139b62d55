mod common;

use common::{Department, MockClient, Person, row};
use derrick::{Dialect, SelectQuery, Session, Value, lit, param};

fn session(dialect: Dialect) -> Session<MockClient> {
    common::logging();
    Session::new(MockClient::new(), dialect)
}

fn ada_row() -> Vec<(&'static str, Value)> {
    vec![
        ("PersonId", Value::Int32(Some(1))),
        ("Name", Value::Varchar(Some("Ada".into()))),
        ("Age", Value::Int32(Some(41))),
        ("DepartmentId", Value::Int32(Some(2))),
    ]
}

#[test]
fn select_materializes_entities() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![row(&ada_row())]);

    let people: Vec<Person> = session.select(&SelectQuery::new()).unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].name, "Ada");
    assert_eq!(people[0].age, 41);
    assert_eq!(people[0].department_id, Some(2));
    assert!(people[0].department.is_none());
}

#[test]
fn select_materializes_joined_children_from_prefixed_columns() {
    let session = session(Dialect::SqlServer);
    let mut columns = ada_row();
    columns.push(("Department_DepartmentId", Value::Int32(Some(2))));
    columns.push(("Department_Name", Value::Varchar(Some("R&D".into()))));
    session.client().queue_rows(vec![row(&columns)]);

    let people: Vec<Person> = session.select(&SelectQuery::new()).unwrap();
    assert_eq!(
        people[0].department,
        Some(Department {
            id: 2,
            name: "R&D".into()
        })
    );
}

#[test]
fn null_joined_identity_materializes_no_child() {
    let session = session(Dialect::SqlServer);
    let mut columns = ada_row();
    columns.push(("Department_DepartmentId", Value::Int32(None)));
    columns.push(("Department_Name", Value::Varchar(None)));
    session.client().queue_rows(vec![row(&columns)]);

    let people: Vec<Person> = session.select(&SelectQuery::new()).unwrap();
    assert!(people[0].department.is_none());
}

#[test]
fn absent_columns_read_as_null() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![row(&[
        ("PersonId", Value::Int32(Some(1))),
        ("Name", Value::Varchar(Some("Ada".into()))),
        ("Age", Value::Int32(Some(41))),
    ])]);

    let people: Vec<Person> = session.select(&SelectQuery::new()).unwrap();
    assert_eq!(people[0].department_id, None);
}

#[test]
fn select_single_takes_the_first_row() {
    let session = session(Dialect::SqlServer);
    let mut second = ada_row();
    second[1].1 = Value::Varchar(Some("Grace".into()));
    session
        .client()
        .queue_rows(vec![row(&ada_row()), row(&second)]);

    let person: Option<Person> = session
        .select_single(None, param("x").member("Age").gt(lit(40)))
        .unwrap();
    assert_eq!(person.unwrap().name, "Ada");
}

#[test]
fn select_single_narrows_the_columns_through_a_projection() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![row(&ada_row())]);

    let person: Option<Person> = session
        .select_single(
            Some(param("x").member("Name")),
            param("x").member("Age").gt(lit(40)),
        )
        .unwrap();
    assert_eq!(person.unwrap().name, "Ada");

    let recorded = session.client().recorded_sql();
    assert_eq!(
        recorded[0],
        "SELECT t0.[Name] FROM [People] t0 WHERE t0.[Age] > @p0;"
    );
}

#[test]
fn select_single_on_no_rows_is_none() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![]);
    let person: Option<Person> = session
        .select_single(None, param("x").member("Age").gt(lit(200)))
        .unwrap();
    assert!(person.is_none());
}

#[test]
fn insert_identity_converts_the_generated_key() {
    let session = session(Dialect::SqlServer);
    session
        .client()
        .queue_rows(vec![row(&[("", Value::Int64(Some(42)))])]);

    let key: i32 = session.insert_identity(&Person::sample("Ada", 41)).unwrap();
    assert_eq!(key, 42);
}

#[test]
fn insert_identity_on_postgres_reads_the_returning_row() {
    let session = session(Dialect::Postgres);
    session
        .client()
        .queue_rows(vec![row(&[("PersonId", Value::Int32(Some(9)))])]);

    let key: i64 = session.insert_identity(&Person::sample("Ada", 41)).unwrap();
    assert_eq!(key, 9);
    let recorded = session.client().recorded_sql();
    assert!(recorded[0].ends_with("RETURNING \"PersonId\";"));
}

#[test]
fn insert_identity_on_oracle_reads_the_output_parameter() {
    let session = session(Dialect::Oracle);
    session
        .client()
        .queue_rows(vec![row(&[(":p3", Value::Int32(Some(7)))])]);

    let key: i64 = session.insert_identity(&Person::sample("Ada", 41)).unwrap();
    assert_eq!(key, 7);
}

#[test]
fn insert_identity_without_a_key_row_is_an_error() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![]);
    let result: derrick::Result<i32> = session.insert_identity(&Person::sample("Ada", 41));
    assert!(format!("{}", result.unwrap_err()).contains("no generated key"));
}

#[test]
fn insert_range_runs_one_statement_per_chunk() {
    let session = session(Dialect::Oracle);
    let people: Vec<Person> = (0..1200).map(|_| Person::sample("n", 30)).collect();
    let affected = session.insert_range(&people).unwrap();
    assert_eq!(affected, 3);
    assert_eq!(session.client().recorded_sql().len(), 3);
}

#[test]
fn select_paged_returns_rows_and_total() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rowsets(vec![
        vec![row(&ada_row())],
        vec![row(&[("", Value::Int64(Some(57)))])],
    ]);

    let page = session
        .select_paged::<Person>(
            &SelectQuery::new()
                .order_by(param("x").member("Name").asc())
                .offset(10)
                .fetch(5),
        )
        .unwrap();
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.total, 57);
}

#[test]
fn select_paged_without_a_count_rowset_is_an_error() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rowsets(vec![vec![row(&ada_row())]]);
    let result = session.select_paged::<Person>(&SelectQuery::new());
    assert!(format!("{}", result.unwrap_err()).contains("rowsets"));
}

#[test]
fn logged_statements_truncate_on_a_char_boundary() {
    let mut sql = "a".repeat(496);
    sql.push('é');
    sql.push_str(&"b".repeat(100));

    let shown = format!("{}", derrick::truncate_long!(sql));
    assert_eq!(shown, format!("{}...", "a".repeat(496)));

    let short = "SELECT 'déjà';".to_string();
    assert_eq!(format!("{}", derrick::truncate_long!(short)), short);
}

#[tokio::test]
async fn async_entry_points_share_the_sync_pipeline() {
    let session = session(Dialect::SqlServer);
    session.client().queue_rows(vec![row(&ada_row())]);

    let affected = session.insert_async(&Person::sample("Ada", 41)).await.unwrap();
    assert_eq!(affected, 1);

    let people: Vec<Person> = session.select_async(&SelectQuery::new()).await.unwrap();
    assert_eq!(people[0].name, "Ada");

    let recorded = session.client().recorded_sql();
    assert!(recorded[0].starts_with("INSERT INTO [People]"));
    assert!(recorded[1].starts_with("SELECT"));
}

#[tokio::test]
async fn async_statements_join_an_open_transaction() {
    let session = session(Dialect::SqlServer);
    let token = session.begin(derrick::IsolationLevel::default()).unwrap();
    session
        .delete_where_async::<Person>(&param("x").member("Age").lt(lit(0)))
        .await
        .unwrap();
    session.commit(token).unwrap();

    let recorded = session.client().recorded_sql();
    assert!(recorded[0].starts_with("tx0: DELETE FROM"));
}
