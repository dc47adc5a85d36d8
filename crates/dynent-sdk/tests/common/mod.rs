#![allow(dead_code)]

use std::sync::Arc;

use dynent_sdk::{
    ContainerKind, DocPath, DocSchema, DocValue, Engine, InMemoryStoreDriver, PrimaryKey, Scalar,
    SchemaDescriptor, SchemaNode, StoreDriver, ValueKind,
};

pub const PERSON_DOC: &str = "person-doc";

/// An engine with a document-backed `Person` and a plain `Team`, loading
/// from `driver`.
pub fn engine(driver: &Arc<InMemoryStoreDriver>) -> Engine {
    let engine = Engine::new().with_driver(Arc::clone(driver) as Arc<dyn StoreDriver>);
    engine
        .register_type(
            SchemaDescriptor::builder("Person")
                .key("id", ValueKind::Int)
                .attribute("name", ValueKind::Text)
                .reference("manager", "Person")
                .references("reports", "Person", ContainerKind::List)
                .backed_by(PERSON_DOC)
                .build(),
        )
        .unwrap();
    engine
        .register_type(
            SchemaDescriptor::builder("Team")
                .key("code", ValueKind::Text)
                .attribute("name", ValueKind::Text)
                .build(),
        )
        .unwrap();
    engine
        .register_schema(DocSchema::new(
            PERSON_DOC,
            vec![
                SchemaNode::value("id", ValueKind::Int),
                SchemaNode::group(
                    "profile",
                    vec![SchemaNode::value("display_name", ValueKind::Text).bound_to("name")],
                ),
                SchemaNode::element("boss", PERSON_DOC).bound_to("manager"),
                SchemaNode::elements("reports", PERSON_DOC),
            ],
        ))
        .unwrap();
    engine
}

pub fn name_path() -> DocPath {
    DocPath::parse("profile/display_name")
}

/// Store a person record holding just a name.
pub fn store_person(driver: &InMemoryStoreDriver, id: i64, name: &str) {
    driver.insert(
        PERSON_DOC,
        PrimaryKey::from(id),
        name_path(),
        DocValue::Scalar(Scalar::from(name)),
    );
}
