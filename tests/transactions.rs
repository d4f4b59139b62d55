mod common;

use common::{MockClient, Person};
use derrick::{Dialect, IsolationLevel, Session, lit, param};

fn session() -> Session<MockClient> {
    Session::new(MockClient::new(), Dialect::SqlServer)
}

#[test]
fn nested_transactions_complete_innermost_first() {
    let session = session();
    let outer = session.begin(IsolationLevel::default()).unwrap();
    let inner = session.begin(IsolationLevel::Serializable).unwrap();
    assert_eq!(session.transaction_depth(), 2);

    session.commit(inner).unwrap();
    session.commit(outer).unwrap();
    assert_eq!(session.transaction_depth(), 0);
    assert_eq!(
        session.client().events(),
        vec![
            "begin 0 ReadCommitted",
            "begin 1 Serializable",
            "commit 1",
            "commit 0",
        ]
    );
}

#[test]
fn completing_the_outer_transaction_early_is_an_error() {
    let session = session();
    let outer = session.begin(IsolationLevel::default()).unwrap();
    let _inner = session.begin(IsolationLevel::default()).unwrap();

    let error = session.commit(outer).unwrap_err();
    assert!(
        format!("{}", error).contains("nested transaction is still open"),
        "{}",
        error
    );
    assert_eq!(session.transaction_depth(), 2);
}

#[test]
fn completing_a_closed_transaction_is_a_no_op() {
    let session = session();
    let token = session.begin(IsolationLevel::default()).unwrap();
    session.commit(token).unwrap();
    session.commit(token).unwrap();
    session.rollback(token).unwrap();
    assert_eq!(session.client().events(), vec!["begin 0 ReadCommitted", "commit 0"]);
}

#[test]
fn rollback_reaches_the_native_transaction() {
    let session = session();
    let token = session.begin(IsolationLevel::default()).unwrap();
    session.rollback(token).unwrap();
    assert_eq!(session.client().events(), vec!["begin 0 ReadCommitted", "rollback 0"]);
}

#[test]
fn statements_join_the_innermost_open_transaction() {
    let session = session();
    session.insert(&Person::sample("before", 1)).unwrap();

    let outer = session.begin(IsolationLevel::default()).unwrap();
    session.insert(&Person::sample("outer", 2)).unwrap();

    let inner = session.begin(IsolationLevel::default()).unwrap();
    session.insert(&Person::sample("inner", 3)).unwrap();
    session.commit(inner).unwrap();

    session.insert(&Person::sample("outer again", 4)).unwrap();
    session.commit(outer).unwrap();

    session.insert(&Person::sample("after", 5)).unwrap();

    let recorded = session.client().recorded_sql();
    assert!(recorded[0].starts_with("INSERT INTO"));
    assert!(recorded[1].starts_with("tx0: INSERT INTO"));
    assert!(recorded[2].starts_with("tx1: INSERT INTO"));
    assert!(recorded[3].starts_with("tx0: INSERT INTO"));
    assert!(recorded[4].starts_with("INSERT INTO"));
}

#[test]
fn queries_inside_a_transaction_use_its_connection() {
    let session = session();
    let token = session.begin(IsolationLevel::default()).unwrap();
    session
        .select::<Person>(&derrick::SelectQuery::new().filter(param("x").member("Age").gt(lit(1))))
        .unwrap();
    session.commit(token).unwrap();

    let recorded = session.client().recorded_sql();
    assert!(recorded[0].starts_with("tx0: SELECT"));
}
