//! Shared fixtures for the PostgreSQL integration tests
//!
//! Every test gets its own schema, so tests can run in parallel against one
//! database. Set `TERRASTORE_TEST_DATABASE_URL` and run with `--ignored`.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use terrastore::config::RepositorySettings;
use terrastore::repository::{
    Column, Entity, IntoColumnValues, Repository, RepositoryConfig, RepositoryRegistry, SqlValue,
    Table,
};
use uuid::Uuid;

pub const COUNTRIES: Table = Table::new(
    "countries",
    &[
        Column::uuid("id"),
        Column::text("name"),
        Column::text("code"),
        Column::timestamp("created_at"),
        Column::timestamp("updated_at"),
        Column::timestamp("deleted_at"),
    ],
);

pub const STATES: Table = Table::new(
    "states",
    &[
        Column::uuid("id"),
        Column::text("name"),
        Column::uuid("country_id"),
        Column::timestamp("created_at"),
        Column::timestamp("updated_at"),
        Column::timestamp("deleted_at"),
    ],
);

pub const CITIES: Table = Table::new(
    "cities",
    &[
        Column::uuid("id"),
        Column::text("name"),
        Column::uuid("state_id"),
        Column::big_int("population"),
        Column::timestamp("created_at"),
        Column::timestamp("updated_at"),
        Column::timestamp("deleted_at"),
    ],
);

pub const CONTACTS: Table = Table::new(
    "contacts",
    &[
        Column::uuid("id"),
        Column::text("name"),
        Column::text("email"),
        Column::timestamp("created_at"),
        Column::timestamp("updated_at"),
        Column::timestamp("deleted_at"),
    ],
);

pub const TAGS: Table = Table::new("tags", &[Column::big_int("id"), Column::text("label")])
    .with_updated_at_column(None);

const SCHEMA_DDL: &str = r#"
CREATE TABLE countries (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    name text NOT NULL,
    code text NOT NULL,
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    deleted_at timestamptz
);

CREATE TABLE states (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    name text NOT NULL,
    country_id uuid NOT NULL REFERENCES countries (id),
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    deleted_at timestamptz
);

CREATE TABLE cities (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    name text NOT NULL,
    state_id uuid NOT NULL REFERENCES states (id),
    population bigint,
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    deleted_at timestamptz
);

CREATE TABLE contacts (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    name text NOT NULL,
    email text NOT NULL,
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    deleted_at timestamptz
);

CREATE UNIQUE INDEX contacts_email_key ON contacts (lower(email)) WHERE deleted_at IS NULL;

CREATE TABLE tags (
    id bigserial PRIMARY KEY,
    label text NOT NULL UNIQUE
);
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Country {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub struct NewCountry {
    pub name: String,
    pub code: String,
}

impl NewCountry {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoColumnValues for NewCountry {
    fn into_column_values(self) -> Vec<(&'static str, SqlValue)> {
        vec![("name", self.name.into()), ("code", self.code.into())]
    }
}

#[derive(Default)]
pub struct CountryChanges {
    pub name: Option<String>,
    pub code: Option<String>,
}

impl IntoColumnValues for CountryChanges {
    fn into_column_values(self) -> Vec<(&'static str, SqlValue)> {
        let mut values = Vec::new();
        if let Some(name) = self.name {
            values.push(("name", name.into()));
        }
        if let Some(code) = self.code {
            values.push(("code", code.into()));
        }
        values
    }
}

impl Entity for Country {
    type Id = Uuid;
    type Create = NewCountry;
    type Update = CountryChanges;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct State {
    pub id: Uuid,
    pub name: String,
    pub country_id: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for State {
    type Id = Uuid;
    type Create = Vec<(&'static str, SqlValue)>;
    type Update = Vec<(&'static str, SqlValue)>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct City {
    pub id: Uuid,
    pub name: String,
    pub state_id: Uuid,
    pub population: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for City {
    type Id = Uuid;
    type Create = Vec<(&'static str, SqlValue)>;
    type Update = Vec<(&'static str, SqlValue)>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Contact {
    type Id = Uuid;
    type Create = Vec<(&'static str, SqlValue)>;
    type Update = Vec<(&'static str, SqlValue)>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Entity for Tag {
    type Id = i64;
    type Create = Vec<(&'static str, SqlValue)>;
    type Update = Vec<(&'static str, SqlValue)>;
}

/// A throwaway schema holding the fixture tables
pub struct TestDb {
    pub registry: RepositoryRegistry,
    admin: PgPool,
    schema: String,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_settings(RepositorySettings::default()).await
    }

    pub async fn with_settings(settings: RepositorySettings) -> Self {
        let url = std::env::var("TERRASTORE_TEST_DATABASE_URL")
            .expect("TERRASTORE_TEST_DATABASE_URL must point at a PostgreSQL database");
        let schema = format!("terrastore_test_{}", Uuid::new_v4().simple());

        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("connect admin pool");
        // Concurrent tests may race to create the extension; one of them wins.
        let _ = admin.execute("CREATE EXTENSION IF NOT EXISTS unaccent").await;
        admin
            .execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .expect("create test schema");

        let search_path = format!("SET search_path TO {schema}, public");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .expect("connect test pool");

        sqlx::raw_sql(SCHEMA_DDL)
            .execute(&pool)
            .await
            .expect("create fixture tables");

        Self {
            registry: RepositoryRegistry::new(pool, settings),
            admin,
            schema,
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.registry.pool()
    }

    pub fn countries(&self) -> Repository<Country> {
        self.registry.create_repository(
            COUNTRIES,
            "Country",
            RepositoryConfig::new()
                .with_searchable_fields(["name", "code"])
                .with_soft_delete(true),
        )
    }

    pub fn states(&self) -> Repository<State> {
        self.registry.create_repository(
            STATES,
            "State",
            RepositoryConfig::new()
                .with_searchable_fields(["name"])
                .with_soft_delete(true),
        )
    }

    pub fn cities(&self) -> Repository<City> {
        self.registry.create_repository(
            CITIES,
            "City",
            RepositoryConfig::new()
                .with_searchable_fields(["name"])
                .with_soft_delete(true),
        )
    }

    pub fn contacts(&self) -> Repository<Contact> {
        self.registry.create_repository(
            CONTACTS,
            "Contact",
            RepositoryConfig::new()
                .with_searchable_fields(["name", "email"])
                .with_soft_delete(true),
        )
    }

    pub fn tags(&self) -> Repository<Tag> {
        self.registry
            .create_repository(TAGS, "Tag", RepositoryConfig::new().with_searchable_fields(["label"]))
    }

    pub async fn country(&self, name: &str, code: &str) -> Country {
        self.countries()
            .create(NewCountry::new(name, code))
            .await
            .expect("create country")
    }

    pub async fn state(&self, name: &str, country: &Country) -> State {
        self.states()
            .create(vec![("name", name.into()), ("country_id", country.id.into())])
            .await
            .expect("create state")
    }

    pub async fn city(&self, name: &str, state: &State) -> City {
        self.cities()
            .create(vec![("name", name.into()), ("state_id", state.id.into())])
            .await
            .expect("create city")
    }

    pub async fn contact(&self, name: &str, email: &str) -> Contact {
        self.contacts()
            .create(vec![("name", name.into()), ("email", email.into())])
            .await
            .expect("create contact")
    }

    pub async fn tag(&self, label: &str) -> Tag {
        self.tags()
            .create(vec![("label", label.into())])
            .await
            .expect("create tag")
    }

    /// Drop the schema; call at the end of every test
    pub async fn teardown(self) {
        self.registry.pool().close().await;
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .expect("drop test schema");
        self.admin.close().await;
    }
}
