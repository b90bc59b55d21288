//! Basic example of the Tazriq DI engine.

use std::sync::Arc;

use tazriq::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let module = Module::new();

    module.set_constant(Config {
        database_url: "postgres://localhost".to_string(),
    })?;

    module.set_constant(Arc::new(ConsoleLogger) as Arc<dyn Logger>)?;

    module.singleton(Recipe::new(
        Signature::new([
            param::<Config>("config"),
            param::<Arc<dyn Logger>>("logger"),
        ]),
        |args| {
            let config = args.get::<Config>("config")?;
            let logger = args.get::<Arc<dyn Logger>>("logger")?;
            Ok(Database {
                url: config.database_url.clone(),
                logger: logger.as_ref().clone(),
            })
        },
    ))?;

    module.injectable(Recipe::new(
        Signature::new([param::<Database>("db")]),
        |args| {
            let db = args.get::<Database>("db")?;
            Ok(UserRepository { db })
        },
    ))?;

    let repo: Arc<UserRepository> = module.find_instance()?;
    println!("{}", repo.find_user(7));

    Ok(())
}
