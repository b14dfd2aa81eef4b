use std::sync::Arc;

use sqlrecord::prelude::*;

const SCHEMA: &str = "
CREATE TABLE topics (
    id INTEGER PRIMARY KEY,
    title VARCHAR(255),
    author_name VARCHAR(255),
    author_email_address VARCHAR(255),
    approved BOOLEAN DEFAULT 't',
    replies_count INTEGER DEFAULT 0,
    type VARCHAR(255)
);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    login VARCHAR(255),
    password VARCHAR(255),
    role VARCHAR(255)
);
";

fn topics() -> (Session, Arc<ModelClass>, Arc<ModelClass>) {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic").build(&session).unwrap();
    let reply = ModelBuilder::new("Reply").inherits(&topic).build(&session).unwrap();
    for (title, author) in [("First", "David"), ("Second", "Mary"), ("Third", "David")] {
        session
            .create_strict(&topic, attributes! { "title" => title, "author_name" => author })
            .unwrap();
    }
    (session, topic, reply)
}

fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("title").as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn find_by_id_and_ids() {
    let (session, topic, _) = topics();
    assert_eq!(session.find(&topic, 1).unwrap().get("title"), &Value::from("First"));
    assert_eq!(titles(&session.find_many(&topic, [3, 1]).unwrap()), ["First", "Third"]);

    let err = session.find(&topic, 99).unwrap_err();
    assert!(matches!(&err, Error::NotFound(e) if e.id.as_deref() == Some("99")));

    let err = session.find_many(&topic, [1, 99]).unwrap_err();
    assert!(matches!(&err, Error::NotFound(e) if e.id.as_deref() == Some("(1, 99)")));

    assert_eq!(titles(&session.find_many(&topic, [2, 2]).unwrap()), ["Second"]);

    assert!(session.exists(&topic, 2).unwrap());
    assert!(!session.exists(&topic, 42).unwrap());
}

#[test]
fn find_all_with_conditions_order_and_limit() {
    let (session, topic, _) = topics();
    let davids = session
        .find_all(
            &topic,
            FindOptions::new()
                .conditions(Condition::eq("author_name", "David"))
                .order("id DESC"),
        )
        .unwrap();
    assert_eq!(titles(&davids), ["Third", "First"]);

    let page = session
        .find_all(&topic, FindOptions::new().order("id").limit(1).offset(1))
        .unwrap();
    assert_eq!(titles(&page), ["Second"]);

    let first = session
        .find_first(&topic, FindOptions::new().conditions("author_name = 'Mary'"))
        .unwrap()
        .unwrap();
    assert_eq!(first.get("title"), &Value::from("Second"));
    assert!(
        session
            .find_first(&topic, FindOptions::new().conditions(Condition::eq("title", "None")))
            .unwrap()
            .is_none()
    );
}

#[test]
fn find_by_sql_and_counting() {
    let (session, topic, _) = topics();
    let found = session
        .find_by_sql(
            &topic,
            "SELECT * FROM topics WHERE author_name = ? ORDER BY id",
            &[Value::from("David")],
        )
        .unwrap();
    assert_eq!(titles(&found), ["First", "Third"]);
    assert_eq!(session.count(&topic, None).unwrap(), 3);
    assert_eq!(
        session
            .count(&topic, Some(Condition::eq("author_name", "Mary")))
            .unwrap(),
        1
    );
}

#[test]
fn bulk_updates_and_deletes() {
    let (session, topic, _) = topics();
    let changed = session
        .update_all(&topic, "approved = 0", Some(Condition::eq("author_name", "David")))
        .unwrap();
    assert_eq!(changed, 2);
    assert_eq!(session.find(&topic, 1).unwrap().get("approved"), &Value::Bool(false));
    assert_eq!(session.find(&topic, 2).unwrap().get("approved"), &Value::Bool(true));

    session.increment_counter(&topic, "replies_count", 1).unwrap();
    session.increment_counter(&topic, "replies_count", 1).unwrap();
    session.decrement_counter(&topic, "replies_count", 1).unwrap();
    assert_eq!(session.find(&topic, 1).unwrap().get("replies_count"), &Value::Int(1));

    assert_eq!(session.delete_all(&topic, Some(Condition::eq("id", 2))).unwrap(), 1);
    assert_eq!(session.destroy_all(&topic, None).unwrap(), 2);
    assert_eq!(session.count(&topic, None).unwrap(), 0);
}

#[test]
fn subclass_rows_come_back_as_the_subclass() {
    let (session, topic, reply) = topics();
    let created = session
        .create_strict(&reply, attributes! { "title" => "Re: First" })
        .unwrap();
    assert_eq!(created.get("type"), &Value::from("Reply"));

    let loaded = session.find(&topic, created.id()).unwrap();
    assert_eq!(loaded.class().name(), "Reply");
    assert!(loaded.class().is_a("Topic"));

    assert_eq!(session.count(&reply, None).unwrap(), 1);
    assert_eq!(session.count(&topic, None).unwrap(), 4);
    assert!(session.find(&reply, 1).unwrap_err().is_not_found());
}

#[test]
fn subclass_update_all_leaves_parent_rows_alone() {
    let (session, topic, reply) = topics();
    let created = session
        .create_strict(&reply, attributes! { "title" => "Re: First" })
        .unwrap();

    assert_eq!(session.update_all(&reply, "approved = 0", None).unwrap(), 1);
    assert_eq!(session.find(&topic, created.id()).unwrap().get("approved"), &Value::Bool(false));
    assert_eq!(session.find(&topic, 1).unwrap().get("approved"), &Value::Bool(true));
}

#[test]
fn unknown_subclass_in_type_column_is_a_config_error() {
    let (session, topic, _) = topics();
    session
        .update_all(&topic, "type = 'Ghost'", Some(Condition::eq("id", 1)))
        .unwrap();
    let err = session.find(&topic, 1).unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownClass));
}

fn users(validations: Vec<Validation>) -> (Session, Arc<ModelClass>) {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let mut builder = ModelBuilder::new("User");
    for validation in validations {
        builder = builder.validates(validation).unwrap();
    }
    let user = builder.build(&session).unwrap();
    (session, user)
}

#[test]
fn presence_failure_keeps_the_record_unsaved() {
    let (session, user) = users(vec![Validation::presence_of(&["login", "password"])]);
    let mut record = session
        .create(&user, attributes! { "login" => "david" })
        .unwrap();
    assert!(record.is_new_record());
    assert_eq!(record.errors().on("password"), ["can't be empty"]);
    assert_eq!(record.errors().full_messages(), ["Password can't be empty"]);

    record.set("password", "secret").unwrap();
    assert!(session.save(&mut record).unwrap());
    assert!(record.errors().is_empty());
}

#[test]
fn length_format_and_inclusion() {
    let (session, user) = users(vec![
        Validation::length_of(&["login"]).within(3, 8),
        Validation::format_of(&["login"], r"^[a-z]+$").message("only lowercase letters"),
        Validation::inclusion_of(&["role"], [Value::from("admin"), Value::from("member")])
            .allow_nil(true),
    ]);

    let mut record = session
        .new_record(&user, attributes! { "login" => "Ab" })
        .unwrap();
    assert!(!session.is_valid(&mut record).unwrap());
    assert_eq!(
        record.errors().on("login"),
        ["is too short (min is 3 characters)", "only lowercase letters"]
    );

    record.set("login", "david").unwrap();
    assert!(session.is_valid(&mut record).unwrap());

    record.set("role", "owner").unwrap();
    assert!(!session.save(&mut record).unwrap(), "role outside the list");
    assert_eq!(record.errors().on("role"), ["is not included in the list"]);
}

#[test]
fn uniqueness_ignores_the_record_itself() {
    let (session, user) = users(vec![Validation::uniqueness_of(&["login"])]);
    let mut first = session
        .create_strict(&user, attributes! { "login" => "david" })
        .unwrap();
    assert!(session.save(&mut first).unwrap());

    let duplicate = session
        .create(&user, attributes! { "login" => "david" })
        .unwrap();
    assert_eq!(duplicate.errors().on("login"), ["has already been taken"]);
    assert_eq!(session.count(&user, None).unwrap(), 1);
}

#[test]
fn confirmation_and_acceptance_use_virtual_attributes() {
    let (session, user) = users(vec![
        Validation::confirmation_of(&["password"]),
        Validation::acceptance_of(&["terms_of_service"]).on(ValidationContext::Create),
    ]);
    let mut record = session
        .new_record(
            &user,
            attributes! {
                "password" => "secret",
                "password_confirmation" => "other",
                "terms_of_service" => "0",
            },
        )
        .unwrap();
    assert!(!session.save(&mut record).unwrap());
    assert_eq!(record.errors().on("password"), ["doesn't match confirmation"]);
    assert_eq!(record.errors().on("terms_of_service"), ["must be accepted"]);

    record.set("password_confirmation", "secret").unwrap();
    record.set("terms_of_service", "1").unwrap();
    assert!(session.save(&mut record).unwrap());
}

#[test]
fn context_limits_when_a_validation_runs() {
    let (session, user) = users(vec![
        Validation::presence_of(&["role"]).on(ValidationContext::Update),
    ]);
    let mut record = session
        .create_strict(&user, attributes! { "login" => "david" })
        .unwrap();
    assert!(!session.save(&mut record).unwrap());
    assert_eq!(record.errors().on("role"), ["can't be empty"]);

    // update_attribute skips validation.
    session.update_attribute(&mut record, "login", "dhh").unwrap();
    assert_eq!(session.find(&user, record.id()).unwrap().get("login"), &Value::from("dhh"));
}

#[test]
fn each_validation_runs_a_closure() {
    let (session, user) = users(vec![Validation::each(&["login"], |_, attribute, value, errors| {
        if value.as_str().is_some_and(|v| v.starts_with("admin")) {
            errors.add(attribute, "is reserved");
        }
    })]);
    let record = session
        .create(&user, attributes! { "login" => "administrator" })
        .unwrap();
    assert_eq!(record.errors().on("login"), ["is reserved"]);
}

#[test]
fn malformed_validation_declarations_are_rejected() {
    let err = ModelBuilder::new("User")
        .validates(Validation::format_of(&["login"], "(unclosed"))
        .err()
        .unwrap();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidDeclaration));
}
