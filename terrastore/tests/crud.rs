mod common;

use common::{CountryChanges, NewCountry, TestDb};
use terrastore::repository::{
    FilterCondition, FindOptions, OrderDirection, RepositoryErrorKind, RepositoryOperation,
    SqlValue,
};
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn create_then_find_one_returns_stored_row() {
    let db = TestDb::new().await;
    let countries = db.countries();

    let created = countries
        .create(NewCountry::new("Test Country", "TC"))
        .await
        .unwrap();
    assert_eq!(created.name, "Test Country");
    assert!(created.deleted_at.is_none());

    let found = countries.find_one(&created.id).await.unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.code, "TC");

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn find_one_missing_id_is_not_found() {
    let db = TestDb::new().await;
    let missing = Uuid::new_v4();

    let err = db.countries().find_one(&missing).await.unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::NotFound);
    assert_eq!(err.operation, RepositoryOperation::FindOne);
    assert_eq!(err.entity_type.as_deref(), Some("Country"));
    assert_eq!(err.entity_id, Some(missing.to_string()));

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn update_changes_fields_and_stamps_updated_at() {
    let db = TestDb::new().await;
    let countries = db.countries();
    let country = db.country("Atlantis", "AT").await;

    let updated = countries
        .update(
            &country.id,
            CountryChanges {
                name: Some("Atlantica".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Atlantica");
    assert_eq!(updated.code, "AT");
    assert!(updated.updated_at >= country.updated_at);
    assert_eq!(updated.created_at, country.created_at);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn update_ignores_payload_updated_at() {
    let db = TestDb::new().await;
    let state = db.state("Ohio", &db.country("Freedonia", "FD").await).await;
    let city = db.city("Dayton", &state).await;

    let stale = chrono::DateTime::parse_from_rfc3339("2001-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let updated = db
        .cities()
        .update(
            &city.id,
            vec![("population", 140_000_i64.into()), ("updated_at", stale.into())],
        )
        .await
        .unwrap();

    assert_eq!(updated.population, Some(140_000));
    assert!(updated.updated_at > stale);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn update_missing_id_is_not_found() {
    let db = TestDb::new().await;

    let err = db
        .countries()
        .update(&Uuid::new_v4(), CountryChanges::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::NotFound);
    assert_eq!(err.operation, RepositoryOperation::Update);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn unknown_column_is_rejected_before_sql() {
    let db = TestDb::new().await;

    let err = db
        .tags()
        .create(vec![("colour", "red".into())])
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::Validation);
    assert!(err.message.contains("colour"));

    let err = db
        .tags()
        .find_all(FindOptions::new().order_by("colour", OrderDirection::Ascending))
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::Validation);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn hard_delete_removes_row() {
    let db = TestDb::new().await;
    let tags = db.tags();
    let tag = db.tag("urgent").await;

    let deleted = tags.delete(&tag.id).await.unwrap();
    assert_eq!(deleted.label, "urgent");

    let err = tags.find_one(&tag.id).await.unwrap_err();
    assert!(err.is_not_found());

    let err = tags.delete(&tag.id).await.unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::NotFound);
    assert_eq!(err.operation, RepositoryOperation::Delete);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn update_without_updated_at_column() {
    let db = TestDb::new().await;
    let tag = db.tag("draft").await;

    let updated = db
        .tags()
        .update(&tag.id, vec![("label", "final".into())])
        .await
        .unwrap();
    assert_eq!(updated.label, "final");

    let unchanged = db.tags().update(&tag.id, Vec::new()).await.unwrap();
    assert_eq!(unchanged.label, "final");

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn find_by_and_find_one_by() {
    let db = TestDb::new().await;
    let country = db.country("Narnia", "NA").await;
    db.state("Archenland", &country).await;
    db.state("Calormen", &country).await;

    let states = db
        .states()
        .find_by(vec![FilterCondition::eq("country_id", country.id)])
        .await
        .unwrap();
    assert_eq!(states.len(), 2);

    let found = db
        .states()
        .find_one_by(vec![FilterCondition::eq("name", "Calormen")])
        .await
        .unwrap();
    assert_eq!(found.map(|s| s.name).as_deref(), Some("Calormen"));

    let none = db
        .states()
        .find_one_by(vec![FilterCondition::eq("name", "Telmar")])
        .await
        .unwrap();
    assert!(none.is_none());

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn count_all_and_exists_by() {
    let db = TestDb::new().await;
    let countries = db.countries();
    let first = db.country("Ruritania", "RU").await;
    db.country("Graustark", "GR").await;

    assert_eq!(countries.count_all(FindOptions::new()).await.unwrap(), 2);
    assert_eq!(
        countries
            .count_all(FindOptions::new().with_filter("code", "GR"))
            .await
            .unwrap(),
        1
    );

    let condition = || vec![FilterCondition::eq("code", "RU")];
    assert!(countries.exists_by(condition(), None).await.unwrap());
    assert!(!countries
        .exists_by(condition(), Some(&first.id))
        .await
        .unwrap());

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn exists_by_ignores_case_of_text_values() {
    let db = TestDb::new().await;
    let contacts = db.contacts();
    let stored = db.contact("Ann", "a@b.com").await;

    for email in ["A@B.COM", "a@b.com", "A@b.Com"] {
        assert!(
            contacts
                .exists_by(vec![FilterCondition::eq("email", email)], None)
                .await
                .unwrap(),
            "{email}"
        );
    }
    assert!(!contacts
        .exists_by(vec![FilterCondition::eq("email", "A@B.COM")], Some(&stored.id))
        .await
        .unwrap());
    assert!(!contacts
        .exists_by(vec![FilterCondition::eq("email", "b@b.com")], None)
        .await
        .unwrap());

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn filter_operators_against_live_rows() {
    let db = TestDb::new().await;
    let state = db.state("Bavaria", &db.country("Germany", "DE").await).await;
    for (name, population) in [("Munich", 1_500_000_i64), ("Augsburg", 300_000), ("Passau", 50_000)] {
        db.cities()
            .create(vec![
                ("name", name.into()),
                ("state_id", state.id.into()),
                ("population", population.into()),
            ])
            .await
            .unwrap();
    }
    db.city("Hamlet", &state).await;
    let cities = db.cities();

    let large = cities
        .find_all(
            FindOptions::new()
                .with_condition(FilterCondition::gte("population", 300_000_i64))
                .order_by("population", OrderDirection::Descending),
        )
        .await
        .unwrap();
    let names: Vec<_> = large.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Munich", "Augsburg"]);

    let listed = cities
        .find_by(vec![FilterCondition::in_list(
            "name",
            vec!["Passau".to_string(), "Munich".to_string()],
        )])
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let unknown_population = cities
        .find_by(vec![FilterCondition::is_null("population")])
        .await
        .unwrap();
    assert_eq!(unknown_population.len(), 1);
    assert_eq!(unknown_population[0].name, "Hamlet");

    let by_null_value = cities
        .find_all(FindOptions::new().with_filter("population", SqlValue::Null))
        .await
        .unwrap();
    assert_eq!(by_null_value.len(), 1);

    let empty_list = cities
        .find_by(vec![FilterCondition::in_list("name", Vec::<String>::new())])
        .await
        .unwrap();
    assert!(empty_list.is_empty());

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn string_filter_on_uuid_column_is_cast() {
    let db = TestDb::new().await;
    let country = db.country("Elbonia", "EL").await;

    let found = db
        .countries()
        .find_all(FindOptions::new().with_filter("id", country.id.to_string()))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn create_with_missing_parent_is_foreign_key_error() {
    let db = TestDb::new().await;

    let err = db
        .states()
        .create(vec![("name", "Nowhere".into()), ("country_id", Uuid::new_v4().into())])
        .await
        .unwrap_err();
    match err.kind {
        RepositoryErrorKind::ForeignKey {
            field,
            reference_table,
        } => {
            assert_eq!(field, "country_id");
            assert_eq!(reference_table, "countries");
        }
        other => panic!("expected foreign key error, got {other:?}"),
    }
    assert_eq!(err.operation, RepositoryOperation::Create);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn duplicate_key_is_translated() {
    let db = TestDb::new().await;
    db.tag("billing").await;

    let err = db
        .tags()
        .create(vec![("label", "billing".into())])
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        RepositoryErrorKind::Duplicate {
            field: Some("label".to_string()),
            value: Some("billing".to_string()),
        }
    );

    db.teardown().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TERRASTORE_TEST_DATABASE_URL)"]
async fn missing_required_column_is_validation_error() {
    let db = TestDb::new().await;

    let err = db
        .contacts()
        .create(vec![("name", "Nameless".into())])
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::Validation);
    assert!(err.message.contains("email"), "{}", err.message);

    db.teardown().await;
}
