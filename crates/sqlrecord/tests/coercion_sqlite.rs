use sqlrecord::prelude::*;

const SCHEMA: &str = "
CREATE TABLE topics (
    id INTEGER PRIMARY KEY,
    title VARCHAR(255),
    author_name VARCHAR(255),
    written_on DATETIME,
    last_read DATE,
    content TEXT,
    approved BOOLEAN DEFAULT 't',
    replies_count INTEGER DEFAULT 0,
    rating FLOAT DEFAULT 2.5
);
CREATE INDEX index_topics_on_title ON topics (title);
";

fn setup() -> (Session, std::sync::Arc<ModelClass>) {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic").build(&session).unwrap();
    (session, topic)
}

#[test]
fn new_record_carries_coerced_defaults() {
    let (session, topic) = setup();
    let record = session.new_record(&topic, attributes! {}).unwrap();

    assert_eq!(record.get("replies_count"), &Value::Int(0));
    assert_eq!(record.get("approved"), &Value::Bool(true));
    assert_eq!(record.get("rating"), &Value::Float(2.5));
    assert!(record.get("title").is_null());
    assert!(record.id().is_null());
    assert!(record.is_new_record());
}

#[test]
fn assignments_are_coerced_through_the_column() {
    let (session, topic) = setup();
    let mut record = session.new_record(&topic, attributes! {}).unwrap();

    record.set("replies_count", "12 replies").unwrap();
    assert_eq!(record.get("replies_count"), &Value::Int(12));
    record.set("replies_count", "none").unwrap();
    assert_eq!(record.get("replies_count"), &Value::Int(0));

    record.set("approved", "f").unwrap();
    assert_eq!(record.get("approved"), &Value::Bool(false));
    record.set("approved", 1).unwrap();
    assert_eq!(record.get("approved"), &Value::Bool(true));

    record.set("last_read", "0000-00-00").unwrap();
    assert!(record.get("last_read").is_null());
    record.set("written_on", "not a date").unwrap();
    assert!(record.get("written_on").is_null());
}

#[test]
fn dates_and_timestamps_survive_a_round_trip() {
    let (session, topic) = setup();
    let mut record = session
        .create_strict(
            &topic,
            attributes! {
                "title" => "The First Topic",
                "written_on" => "2003-07-16 15:28:11",
                "last_read" => "2004-04-15",
            },
        )
        .unwrap();

    let found = session.find(&topic, record.id()).unwrap();
    assert_eq!(
        found.get("written_on").as_timestamp().map(|t| t.to_string()),
        Some("2003-07-16 15:28:11".to_string())
    );
    assert_eq!(
        found.get("last_read").as_date().map(|d| d.to_string()),
        Some("2004-04-15".to_string())
    );

    session.reload(&mut record).unwrap();
    assert_eq!(record.get("written_on"), found.get("written_on"));
}

#[test]
fn serialized_text_comes_back_structured() {
    let (session, topic) = setup();
    let payload = json!({"tags": ["rails", "ruby"], "score": 3});
    let record = session
        .create_strict(&topic, attributes! { "content" => payload.clone() })
        .unwrap();

    let stored = session
        .connection()
        .unwrap()
        .select_value("SELECT content FROM topics WHERE id = ?", &[record.id()])
        .unwrap()
        .unwrap();
    assert!(stored.as_str().unwrap().starts_with("--- "));

    let found = session.find(&topic, record.id()).unwrap();
    assert_eq!(found.get("content"), &Value::Json(payload));
}

#[test]
fn unknown_attribute_is_rejected() {
    let (session, topic) = setup();
    let err = session
        .new_record(&topic, attributes! { "titel" => "typo" })
        .unwrap_err();
    assert!(matches!(err, Error::UnknownAttribute { ref attribute, .. } if attribute == "titel"));
}

#[test]
fn connection_must_be_established_first() {
    let session = sqlrecord::session(SessionConfig::default());
    let err = session.connection().err().unwrap();
    assert_eq!(
        err.config_kind(),
        Some(ConfigErrorKind::ConnectionNotEstablished)
    );
    let err = ModelBuilder::new("Topic").build(&session).unwrap_err();
    assert_eq!(
        err.config_kind(),
        Some(ConfigErrorKind::ConnectionNotEstablished)
    );
}

#[test]
fn establish_connection_through_registered_adapter() {
    let mut session = sqlrecord::connect("sqlite::memory:").unwrap();
    assert!(session.is_connected());
    assert_eq!(session.connection().unwrap().adapter_name(), "sqlite");

    let config = session.remove_connection().unwrap();
    assert_eq!(config.adapter.as_deref(), Some("sqlite"));
    assert!(!session.is_connected());
}

#[test]
fn unknown_adapter_is_a_config_error() {
    let mut session = sqlrecord::session(SessionConfig::default());
    let err = session
        .establish_connection(ConnectionConfig::new("oracle"))
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::AdapterNotFound));
}

#[test]
fn structure_dump_lists_the_schema() {
    let (session, _topic) = setup();
    let dump = session.structure_dump().unwrap();
    assert!(dump.starts_with("CREATE TABLE topics"));
    assert!(dump.contains("CREATE INDEX index_topics_on_title"));
}
