use std::sync::{Arc, Mutex};

use sqlrecord::prelude::*;

const SCHEMA: &str = "
CREATE TABLE firms (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255),
    clients_count INTEGER DEFAULT 0
);
CREATE TABLE clients (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255),
    firm_id INTEGER
);
CREATE TABLE accounts (
    id INTEGER PRIMARY KEY,
    firm_id INTEGER,
    credit_limit INTEGER
);
CREATE TABLE notes (
    id INTEGER PRIMARY KEY,
    firm_id INTEGER,
    body TEXT
);
";

fn setup(destroyed: &Arc<Mutex<Vec<String>>>) -> Session {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    ModelBuilder::new("Firm")
        .has_many("clients", json!({"dependent": true, "counter_cache": true}))
        .unwrap()
        .has_many("notes", json!({"exclusively_dependent": true}))
        .unwrap()
        .has_one("account", json!({"dependent": true}))
        .unwrap()
        .build(&session)
        .unwrap();
    let log = Arc::clone(destroyed);
    ModelBuilder::new("Client")
        .belongs_to("firm", json!({}))
        .unwrap()
        .before_destroy(Callback::closure(|record, _| {
            if record.get("name").as_str() == Some("locked") {
                Err(Error::aborted("client is locked"))
            } else {
                Ok(())
            }
        }))
        .after_destroy(Callback::closure(move |record, _| {
            let name = record.get("name").as_str().unwrap_or_default().to_string();
            log.lock().unwrap().push(name);
            Ok(())
        }))
        .build(&session)
        .unwrap();
    ModelBuilder::new("Account").build(&session).unwrap();
    let log = Arc::clone(destroyed);
    ModelBuilder::new("Note")
        .after_destroy(Callback::closure(move |_, _| {
            log.lock().unwrap().push("note".into());
            Ok(())
        }))
        .build(&session)
        .unwrap();
    session
}

fn firm_with_children(session: &Session, client_names: &[&str]) -> Record {
    let mut firm = session
        .create_strict("Firm", attributes! { "name" => "Firm" })
        .unwrap();
    for name in client_names {
        session
            .has_many(&mut firm, "clients")
            .unwrap()
            .create(attributes! { "name" => *name })
            .unwrap();
    }
    session
        .has_many(&mut firm, "notes")
        .unwrap()
        .create(attributes! { "body" => "remember" })
        .unwrap();
    session
        .has_one(&mut firm, "account")
        .unwrap()
        .create(attributes! { "credit_limit" => 50 })
        .unwrap();
    firm
}

#[test]
fn destroy_cascades_through_dependents() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &["Summit", "Apex"]);

    session.destroy(&mut firm).unwrap();
    assert!(firm.is_destroyed());
    assert_eq!(session.count("Firm", None).unwrap(), 0);
    assert_eq!(session.count("Client", None).unwrap(), 0);
    assert_eq!(session.count("Note", None).unwrap(), 0);
    assert_eq!(session.count("Account", None).unwrap(), 0);

    // Dependent children run their callbacks; exclusively dependent ones
    // are deleted in one statement.
    assert_eq!(*destroyed.lock().unwrap(), ["Summit", "Apex"]);
}

#[test]
fn vetoed_child_destroy_undoes_the_whole_cascade() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &["Summit", "locked"]);

    let err = session.destroy(&mut firm).unwrap_err();
    assert!(err.is_aborted());
    assert!(!firm.is_destroyed());
    assert!(firm.is_persisted());
    assert!(!session.in_transaction());

    assert_eq!(session.count("Firm", None).unwrap(), 1);
    assert_eq!(session.count("Client", None).unwrap(), 2);
    assert_eq!(session.count("Note", None).unwrap(), 1);
    assert_eq!(session.count("Account", None).unwrap(), 1);

    // The record is still usable after the failed destroy.
    session.update_attribute(&mut firm, "name", "Renamed").unwrap();
    assert_eq!(
        session.find("Firm", firm.id()).unwrap().get("name"),
        &Value::from("Renamed")
    );
}

#[test]
fn collection_destroy_all_runs_callbacks() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &["Summit", "Apex"]);

    let mut clients = session.has_many(&mut firm, "clients").unwrap();
    clients.all().unwrap();
    clients.destroy_all().unwrap();
    assert!(clients.all().unwrap().is_empty());
    drop(clients);

    assert_eq!(firm.get("clients_count"), &Value::Int(0));
    assert_eq!(destroyed.lock().unwrap().len(), 2);
    assert_eq!(session.count("Firm", None).unwrap(), 1);
}

#[test]
fn dependent_remove_destroys_the_child() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &["Summit"]);

    let mut clients = session.has_many(&mut firm, "clients").unwrap();
    let summit = clients.all().unwrap()[0].clone();
    clients.remove([&summit]).unwrap();
    assert_eq!(clients.count().unwrap(), 0);
    assert!(!session.exists("Client", summit.id()).unwrap());
    assert_eq!(*destroyed.lock().unwrap(), ["Summit"]);
}

#[test]
fn exclusively_dependent_clear_skips_callbacks() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &[]);

    session.has_many(&mut firm, "notes").unwrap().clear().unwrap();
    assert_eq!(session.count("Note", None).unwrap(), 0);
    assert!(destroyed.lock().unwrap().is_empty());
}

#[test]
fn dependent_has_one_replacement_destroys_the_old_target() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut firm = firm_with_children(&session, &[]);

    session
        .has_one(&mut firm, "account")
        .unwrap()
        .create(attributes! { "credit_limit" => 100 })
        .unwrap();
    let accounts = session.find_all("Account", FindOptions::new()).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].get("credit_limit"), &Value::Int(100));
}

#[test]
fn child_writes_outside_the_collection_keep_the_counter() {
    let destroyed = Arc::default();
    let session = setup(&destroyed);
    let mut first = firm_with_children(&session, &["Summit"]);
    let second = session
        .create_strict("Firm", attributes! { "name" => "Second" })
        .unwrap();
    let stored_count = |id: Value| session.find("Firm", id).unwrap().get("clients_count").clone();

    let mut client = session
        .create_strict("Client", attributes! { "name" => "Apex", "firm_id" => first.id() })
        .unwrap();
    assert_eq!(stored_count(first.id()), Value::Int(2));

    session
        .update_attribute(&mut client, "firm_id", second.id())
        .unwrap();
    assert_eq!(stored_count(first.id()), Value::Int(1));
    assert_eq!(stored_count(second.id()), Value::Int(1));

    session.destroy(&mut client).unwrap();
    assert_eq!(stored_count(second.id()), Value::Int(0));

    session.reload(&mut first).unwrap();
    let mut clients = session.has_many(&mut first, "clients").unwrap();
    assert_eq!(clients.len().unwrap(), 1);
    assert_eq!(clients.count().unwrap(), 1);
}
