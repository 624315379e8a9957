//! Command implementations

use anyhow::{Context as _, Result};
use ctxstore_core::{
    Context, Predicate, RecordService, Representable, SortDescriptor, StoreConfiguration,
    StoredRecord,
};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub age: Option<i64>,
}

impl Representable for User {
    const ENTITY: &'static str = "User";

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn from_stored(record: &StoredRecord) -> Self {
        Self {
            id: Some(record.id),
            name: record.text("name"),
            age: record.integer("age"),
        }
    }

    fn to_stored(&self, target: &mut Context) -> StoredRecord {
        let mut record = target.record_for(Self::ENTITY, self.id);
        record.set_opt("name", self.name.clone());
        record.set_opt("age", self.age);
        record
    }
}

fn open(data_dir: &Path, model: &str) -> Result<RecordService> {
    log::info!(
        "event=cli_open module=cli status=start model={} data_dir={}",
        model,
        data_dir.display()
    );
    let config = StoreConfiguration::sqlite_file(model, data_dir);
    RecordService::open(&config).context("Failed to open store")
}

pub fn ping() -> Result<()> {
    println!("ctxstore_core ping={}", ctxstore_core::ping());
    println!("ctxstore_core version={}", ctxstore_core::core_version());
    Ok(())
}

pub fn insert(data_dir: &Path, model: &str, name: String, age: Option<i64>) -> Result<()> {
    let service = open(data_dir, model)?;
    let id = service
        .insert_model(&User {
            id: None,
            name: Some(name),
            age,
        })
        .context("Failed to insert user")?;
    println!("{id}");
    Ok(())
}

pub fn list(data_dir: &Path, model: &str, contains: Option<String>) -> Result<()> {
    let service = open(data_dir, model)?;
    let users = service
        .fetch_models::<User>(
            contains.map(|needle| Predicate::contains("name", needle)),
            Some(vec![SortDescriptor::ascending("name")]),
        )
        .context("Failed to fetch users")?;

    for user in &users {
        let id = user.id.map(|id| id.to_string()).unwrap_or_default();
        let name = user.name.as_deref().unwrap_or("-");
        match user.age {
            Some(age) => println!("{id}  {name}  {age}"),
            None => println!("{id}  {name}"),
        }
    }
    println!("{} user(s)", users.len());
    Ok(())
}

pub fn delete(data_dir: &Path, model: &str, id: Uuid) -> Result<()> {
    let service = open(data_dir, model)?;
    service
        .delete_record(User::ENTITY, id)
        .context("Failed to delete user")?;
    println!("deleted {id}");
    Ok(())
}
