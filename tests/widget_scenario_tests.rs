use std::cell::Cell;
use std::rc::Rc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rowkeep::{
    Clock, LifecycleState, MemoryConnection, PersistError, Repository, Value, entity_type,
};
use serde_json::json;

entity_type! {
    pub struct Widget {
        table: "widget",
        columns: [id, name, created_at, updated_at, deleted_at],
    }
}

/// Clock the test moves forward by hand.
#[derive(Clone)]
struct ManualClock {
    now: Rc<Cell<NaiveDateTime>>,
}

impl ManualClock {
    fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    fn advance(&self, by: Duration) -> NaiveDateTime {
        self.now.set(self.now.get() + by);
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }
}

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn widget_repo(clock: &ManualClock) -> Repository<Widget, MemoryConnection> {
    let conn = MemoryConnection::mysql().with_table("widget", "id");
    Repository::new(conn).unwrap().with_clock(clock.clone())
}

#[test]
fn widget_insert_update_delete_scenario() {
    let clock = ManualClock::starting_at(start());
    let mut repo = widget_repo(&clock);

    let mut widget = repo.new_entity();
    widget.set("name", "Foo").unwrap();
    repo.insert(&mut widget).unwrap();

    assert_eq!(widget.id(), Some(&Value::Integer(1)));
    assert_eq!(widget.get("created_at"), Some(&Value::Timestamp(start())));
    assert_eq!(widget.get("updated_at"), Some(&Value::Timestamp(start())));
    assert_eq!(
        widget.last_diff().to_json(),
        json!({
            "id": [null, 1],
            "name": [null, "Foo"],
            "created_at": [null, "2024-03-01 10:00:00"],
            "updated_at": [null, "2024-03-01 10:00:00"],
        })
    );
    assert!(widget.is_inserted().unwrap());

    let insert = repo.connection().executed().last().unwrap().clone();
    assert_eq!(
        insert.sql,
        "INSERT INTO `widget` (`name`, `created_at`, `updated_at`) VALUES (:name, :created_at, :updated_at)"
    );

    let later = clock.advance(Duration::minutes(5));
    widget.set("name", "Bar").unwrap();
    repo.save(&mut widget, false).unwrap();

    let update = repo.connection().executed().last().unwrap().clone();
    assert_eq!(
        update.sql,
        "UPDATE `widget` SET `name` = :name, `updated_at` = :updated_at WHERE `id` = :id"
    );
    assert_eq!(update.params.get("name"), Some(&Value::from("Bar")));
    assert_eq!(update.params.get("updated_at"), Some(&Value::Timestamp(later)));
    assert_eq!(update.params.get("id"), Some(&Value::Integer(1)));
    assert!(!widget.is_inserted().unwrap());

    clock.advance(Duration::minutes(5));
    let writes_before = repo.connection().writes().count();
    repo.delete(&mut widget).unwrap();

    assert!(widget.is_deleted());
    assert_eq!(widget.state(), LifecycleState::SoftDeleted);
    assert_eq!(repo.connection().writes().count(), writes_before + 1);
    let delete = repo.connection().executed().last().unwrap();
    assert_eq!(delete.verb(), "UPDATE");
    assert!(delete.params.get("deleted_at").is_some());

    let stored = repo.connection().row("widget", &Value::Integer(1)).unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("Bar")));
    assert!(!stored.get("deleted_at").unwrap().is_null());
}

#[test]
fn second_delete_is_a_no_op() {
    let clock = ManualClock::starting_at(start());
    let mut repo = widget_repo(&clock);

    let mut widget = repo.new_entity();
    widget.set("name", "Foo").unwrap();
    repo.insert(&mut widget).unwrap();
    repo.delete(&mut widget).unwrap();

    let writes = repo.connection().writes().count();
    clock.advance(Duration::hours(1));
    repo.delete(&mut widget).unwrap();
    assert_eq!(repo.connection().writes().count(), writes);
}

#[test]
fn delete_without_date_triggers_still_sets_deleted_at() {
    let clock = ManualClock::starting_at(start());
    let mut repo = widget_repo(&clock);

    let mut widget = repo.new_entity();
    widget.disable_date_triggers();
    widget.set("name", "Foo").unwrap();
    repo.insert(&mut widget).unwrap();
    assert_eq!(widget.get("created_at"), None);

    repo.delete(&mut widget).unwrap();
    assert!(widget.is_deleted());
    let update = repo.connection().executed().last().unwrap();
    assert_eq!(
        update.sql,
        "UPDATE `widget` SET `deleted_at` = :deleted_at WHERE `id` = :id"
    );
}

#[test]
fn same_instant_update_skips_unchanged_timestamp() {
    let clock = ManualClock::starting_at(start());
    let mut repo = widget_repo(&clock);

    let mut widget = repo.new_entity();
    widget.set("name", "Foo").unwrap();
    repo.insert(&mut widget).unwrap();

    widget.set("name", "Baz").unwrap();
    repo.save(&mut widget, false).unwrap();
    let update = repo.connection().executed().last().unwrap();
    assert_eq!(
        update.sql,
        "UPDATE `widget` SET `name` = :name WHERE `id` = :id"
    );
}

#[test]
fn pgsql_driver_quotes_with_double_quotes() {
    let clock = ManualClock::starting_at(start());
    let conn = MemoryConnection::pgsql().with_table("widget", "id");
    let mut repo = Repository::<Widget, _>::new(conn)
        .unwrap()
        .with_clock(clock.clone());

    let mut widget = repo.new_entity();
    widget.set("name", "Foo").unwrap();
    repo.insert(&mut widget).unwrap();
    clock.advance(Duration::seconds(1));
    widget.set("name", "Bar").unwrap();
    repo.save(&mut widget, false).unwrap();

    let sql: Vec<&str> = repo
        .connection()
        .executed()
        .iter()
        .map(|s| s.sql.as_str())
        .collect();
    assert_eq!(
        sql,
        vec![
            "INSERT INTO \"widget\" (\"name\", \"created_at\", \"updated_at\") VALUES (:name, :created_at, :updated_at)",
            "UPDATE \"widget\" SET \"name\" = :name, \"updated_at\" = :updated_at WHERE \"id\" = :id",
        ]
    );
}

#[test]
fn unknown_driver_is_a_configuration_error() {
    let conn = MemoryConnection::new("oracle").with_table("widget", "id");
    match Repository::<Widget, _>::new(conn) {
        Err(PersistError::Configuration(message)) => {
            assert_eq!(message, "Not supported database: oracle")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("oracle should not be accepted"),
    }
}
