use std::sync::Arc;

use sqlrecord::prelude::*;

const SCHEMA: &str = "
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255),
    balance INTEGER DEFAULT 0,
    address_street VARCHAR(255),
    address_city VARCHAR(255),
    address_country VARCHAR(255)
);
";

#[derive(Debug, PartialEq)]
struct Money {
    amount: i64,
}

impl ValueObject for Money {
    fn compose(values: Vec<Value>) -> Self {
        Money {
            amount: values.first().and_then(Value::as_i64).unwrap_or(0),
        }
    }

    fn attribute(&self, name: &str) -> Value {
        match name {
            "amount" => Value::Int(self.amount),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, PartialEq)]
struct Address {
    street: String,
    city: String,
    country: String,
}

impl ValueObject for Address {
    fn compose(values: Vec<Value>) -> Self {
        let text = |i: usize| {
            values
                .get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Address {
            street: text(0),
            city: text(1),
            country: text(2),
        }
    }

    fn attribute(&self, name: &str) -> Value {
        match name {
            "street" => Value::from(self.street.as_str()),
            "city" => Value::from(self.city.as_str()),
            "country" => Value::from(self.country.as_str()),
            _ => Value::Null,
        }
    }
}

fn setup() -> (Session, Arc<ModelClass>) {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let customer = ModelBuilder::new("Customer")
        .composed_of::<Money>("balance", json!({"class_name": "Money", "mapping": ["balance", "amount"]}))
        .unwrap()
        .composed_of::<Address>(
            "address",
            json!({"mapping": [
                ["address_street", "street"],
                ["address_city", "city"],
                ["address_country", "country"]
            ]}),
        )
        .unwrap()
        .build(&session)
        .unwrap();
    (session, customer)
}

#[test]
fn composition_round_trips_through_the_columns() {
    let (session, customer) = setup();
    let mut david = session
        .create_strict(
            &customer,
            attributes! {
                "name" => "David",
                "balance" => 50,
                "address_street" => "Funny Street",
                "address_city" => "Scary Town",
                "address_country" => "Loony Land",
            },
        )
        .unwrap();

    assert_eq!(*david.aggregate::<Money>("balance").unwrap(), Money { amount: 50 });
    let address = david.aggregate::<Address>("address").unwrap();
    assert_eq!(address.city, "Scary Town");

    david
        .set_aggregate::<Money>("balance", Money { amount: 100 })
        .unwrap();
    assert_eq!(david.get("balance"), &Value::Int(100));
    session.save_strict(&mut david).unwrap();

    let mut found = session.find(&customer, david.id()).unwrap();
    assert_eq!(*found.aggregate::<Money>("balance").unwrap(), Money { amount: 100 });
    assert_eq!(*found.aggregate::<Address>("address").unwrap(), *address);
}

#[test]
fn aggregate_is_shared_and_frozen() {
    let (session, customer) = setup();
    let mut david = session
        .create_strict(&customer, attributes! { "balance" => 50 })
        .unwrap();

    let first = david.aggregate::<Money>("balance").unwrap();
    let mut second = david.aggregate::<Money>("balance").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::get_mut(&mut second).is_none());

    let assigned = david
        .set_aggregate::<Money>("balance", Money { amount: 75 })
        .unwrap();
    let mut read = david.aggregate::<Money>("balance").unwrap();
    assert!(Arc::ptr_eq(&assigned, &read));
    assert!(Arc::get_mut(&mut read).is_none());

    // Equality is by value.
    assert_eq!(*read, Money { amount: 75 });
    assert_ne!(*first, *read);
}

#[test]
fn reload_aggregate_rebuilds_from_columns() {
    let (session, customer) = setup();
    let mut david = session
        .create_strict(&customer, attributes! { "balance" => 50 })
        .unwrap();

    let cached = david.aggregate::<Money>("balance").unwrap();
    david.set("balance", 60).unwrap();
    assert_eq!(david.aggregate::<Money>("balance").unwrap().amount, 50);
    assert_eq!(david.reload_aggregate::<Money>("balance").unwrap().amount, 60);
    assert_eq!(cached.amount, 50);
}

#[test]
fn wrong_value_type_is_a_config_error() {
    let (session, customer) = setup();
    let mut david = session.new_record(&customer, attributes! {}).unwrap();
    let err = david.aggregate::<Address>("balance").unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::TypeMismatch));
}

#[test]
fn misspelled_composition_option_fails_at_declaration() {
    let err = ModelBuilder::new("Customer")
        .composed_of::<Money>("balance", json!({"mappping": ["balance", "amount"]}))
        .err()
        .unwrap();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownOption));
}

#[test]
fn mapping_to_a_missing_column_fails_at_build() {
    let session = sqlrecord::memory_session(SCHEMA).unwrap();
    let err = ModelBuilder::new("Customer")
        .composed_of::<Money>("balance", json!({"mapping": ["balance_cents", "amount"]}))
        .unwrap()
        .build(&session)
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidDeclaration));
}
