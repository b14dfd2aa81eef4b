use std::sync::{Arc, Mutex};

use sqlrecord::prelude::*;

const SCHEMA: &str = "
CREATE TABLE topics (
    id INTEGER PRIMARY KEY,
    title VARCHAR(255),
    type VARCHAR(255),
    replies_count INTEGER DEFAULT 0
);
";

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn logging(log: &Log, entry: &str) -> Callback {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    Callback::closure(move |_, _| {
        log.lock().unwrap().push(entry.clone());
        Ok(())
    })
}

struct TopicHooks {
    log: Log,
}

impl LifecycleHooks for TopicHooks {
    fn after_find(&self, _record: &mut Record, _session: &Session) -> Result<()> {
        self.log.lock().unwrap().push("hooks after_find".into());
        Ok(())
    }

    fn after_initialize(&self, _record: &mut Record, _session: &Session) -> Result<()> {
        self.log.lock().unwrap().push("hooks after_initialize".into());
        Ok(())
    }

    fn before_save(&self, _record: &mut Record, _session: &Session) -> Result<()> {
        self.log.lock().unwrap().push("hooks before_save".into());
        Ok(())
    }

    fn validate(&self, record: &mut Record, _session: &Session) -> Result<()> {
        if record.get("title").as_str() == Some("invalid") {
            record.errors_mut().add("title", "is reserved");
        }
        Ok(())
    }
}

struct Audit {
    log: Log,
}

impl Observer for Audit {
    fn notify(&self, event: CallbackEvent, _record: &mut Record) -> Result<()> {
        self.log.lock().unwrap().push(format!("observer {event}"));
        Ok(())
    }
}

fn setup(log: &Log) -> (Session, Arc<ModelClass>, Arc<ModelClass>) {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic")
        .before_save(logging(log, "topic before_save"))
        .after_save(Callback::method("note_saved"))
        .method("note_saved", {
            let log = Arc::clone(log);
            move |_: &mut Record, _: &Session| {
                log.lock().unwrap().push("topic note_saved".into());
                Ok(())
            }
        })
        .hooks(TopicHooks {
            log: Arc::clone(log),
        })
        .build(&session)
        .unwrap();
    let reply = ModelBuilder::new("Reply")
        .inherits(&topic)
        .before_save(logging(log, "reply before_save"))
        .build(&session)
        .unwrap();
    (session, topic, reply)
}

#[test]
fn subclass_callbacks_run_after_inherited_ones() {
    let log = Log::default();
    let (session, _topic, reply) = setup(&log);
    session.observe("Topic", Arc::new(Audit { log: Arc::clone(&log) }));

    session
        .create_strict(&reply, attributes! { "title" => "Re: first" })
        .unwrap();

    let saves: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.ends_with("before_save"))
        .collect();
    assert_eq!(
        saves,
        [
            "topic before_save",
            "reply before_save",
            "hooks before_save",
            "observer before_save",
        ]
    );
    assert!(entries(&log).contains(&"topic note_saved".to_string()));
}

#[test]
fn observer_sees_the_whole_create_sequence() {
    let log = Log::default();
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic").build(&session).unwrap();
    session.observe("Topic", Arc::new(Audit { log: Arc::clone(&log) }));

    let mut record = session
        .create_strict(&topic, attributes! { "title" => "sequence" })
        .unwrap();
    assert_eq!(
        entries(&log),
        [
            "observer after_initialize",
            "observer before_validation",
            "observer before_validation_on_create",
            "observer after_validation",
            "observer after_validation_on_create",
            "observer before_save",
            "observer before_create",
            "observer after_create",
            "observer after_save",
        ]
    );

    log.lock().unwrap().clear();
    session.destroy(&mut record).unwrap();
    assert_eq!(
        entries(&log),
        ["observer before_destroy", "observer after_destroy"]
    );
}

#[test]
fn before_create_veto_rolls_back() {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic")
        .before_create(Callback::closure(|record, _| {
            if record.get("title").as_str() == Some("veto") {
                Err(Error::aborted("vetoed by before_create"))
            } else {
                Ok(())
            }
        }))
        .build(&session)
        .unwrap();

    let mut record = session
        .new_record(&topic, attributes! { "title" => "veto" })
        .unwrap();
    let err = session.save(&mut record).unwrap_err();
    assert!(err.is_aborted());
    assert!(record.is_new_record());
    assert!(record.id().is_null());
    assert_eq!(session.count(&topic, None).unwrap(), 0);
    assert!(!session.in_transaction());

    record.set("title", "accepted").unwrap();
    assert!(session.save(&mut record).unwrap());
    assert_eq!(session.count(&topic, None).unwrap(), 1);
}

#[test]
fn after_save_failure_undoes_the_insert() {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic")
        .after_save(Callback::closure(|_, _| Err(Error::aborted("late veto"))))
        .build(&session)
        .unwrap();

    let mut record = session
        .new_record(&topic, attributes! { "title" => "late" })
        .unwrap();
    assert!(session.save(&mut record).unwrap_err().is_aborted());
    assert!(record.is_new_record());
    assert_eq!(session.count(&topic, None).unwrap(), 0);
}

#[test]
fn unknown_method_callback_fails_when_fired() {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic")
        .before_save(Callback::method("no_such_method"))
        .build(&session)
        .unwrap();

    let err = session
        .create(&topic, attributes! { "title" => "x" })
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidCallback));
    assert_eq!(session.count(&topic, None).unwrap(), 0);
}

#[test]
fn find_and_initialize_cannot_be_queued() {
    let err = ModelBuilder::new("Topic")
        .callback(CallbackEvent::AfterFind, Callback::closure(|_, _| Ok(())))
        .err()
        .unwrap();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidCallback));

    let err = ModelBuilder::new("Topic")
        .callback(CallbackEvent::AfterInitialize, Callback::closure(|_, _| Ok(())))
        .err()
        .unwrap();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidCallback));

    assert!(
        ModelBuilder::new("Topic")
            .callback(CallbackEvent::BeforeSave, Callback::closure(|_, _| Ok(())))
            .is_ok()
    );
}

#[test]
fn loading_fires_after_find_then_after_initialize() {
    let log = Log::default();
    let (session, topic, _reply) = setup(&log);
    let created = session
        .create_strict(&topic, attributes! { "title" => "found" })
        .unwrap();

    log.lock().unwrap().clear();
    session.find(&topic, created.id()).unwrap();
    assert_eq!(
        entries(&log),
        ["hooks after_find", "hooks after_initialize"]
    );
}

#[test]
fn validate_hook_rejects_the_record() {
    let log = Log::default();
    let (session, topic, _reply) = setup(&log);

    let record = session
        .create(&topic, attributes! { "title" => "invalid" })
        .unwrap();
    assert!(record.is_new_record());
    assert_eq!(record.errors().on("title"), ["is reserved"]);
    assert!(!entries(&log).contains(&"hooks before_save".to_string()));

    let mut strict = session
        .new_record(&topic, attributes! { "title" => "invalid" })
        .unwrap();
    let err = session.save_strict(&mut strict).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn delegate_callback_invokes_the_matching_hook() {
    let log = Log::default();
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic")
        .before_save(Callback::delegate(TopicHooks {
            log: Arc::clone(&log),
        }))
        .build(&session)
        .unwrap();

    session
        .create_strict(&topic, attributes! { "title" => "delegated" })
        .unwrap();
    assert_eq!(entries(&log), ["hooks before_save"]);
}

#[test]
fn destroyed_record_is_frozen() {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let topic = ModelBuilder::new("Topic").build(&session).unwrap();
    let mut record = session
        .create_strict(&topic, attributes! { "title" => "gone" })
        .unwrap();

    session.destroy(&mut record).unwrap();
    assert!(record.is_destroyed());
    assert!(matches!(
        session.save(&mut record).unwrap_err(),
        Error::Frozen { .. }
    ));
    assert!(session.find(&topic, record.id()).unwrap_err().is_not_found());
}
