use sentrygrid::db::Db;
use std::sync::Arc;

#[rocket::launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "sentrygrid.db".into());
    let database = Arc::new(Db::new(&db_path).expect("Failed to initialize database"));

    sentrygrid::build_rocket(database)
}
