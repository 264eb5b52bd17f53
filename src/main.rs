#[macro_use] extern crate lazy_static;


mod account_route;
mod admin_route;
mod aggregate;
mod auth_sys;
mod config;
mod db;
mod error;
mod image_store;
mod logger;
mod pdf_export;
mod report_kind;
mod report_route;
mod report_sys;
mod task_scheduler;
mod util;


use std::{error::Error, fs};

use log::info;
use rocket::{
    catch, catchers, fs::FileServer, get, http::Status, response::status::Custom, routes,
    serde::json::Json, Build, Request, Rocket, State,
};
use serde_json::{json, Value};

use crate::config::Config;
use crate::db::Db;
use crate::error::AppResult;
use crate::logger::Logger;
use crate::report_sys::SummaryCache;
use crate::task_scheduler::TaskSchedulerBuilder;


#[get("/")]
fn index(config: &State<Config>) -> String {
    config.ministry_name.clone()
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Custom<Json<Value>> {
    let msg = match status.code {
        401 => "Authentication required",
        403 => "Permission denied",
        404 => "Not found",
        422 => "Malformed request body",
        _ => status.reason().unwrap_or("Request failed"),
    };

    Custom(status, Json(json!({ "error": msg })))
}


pub fn build_rocket(config: Config) -> AppResult<Rocket<Build>> {
    fs::create_dir_all(config.image_public_dir())?;
    fs::create_dir_all(&config.upload_dir)?;

    let db = Db::open(&config.database_url, config.db_pool_size)?;
    auth_sys::bootstrap_admin(&db, &config)?;

    let static_dir = config.static_dir.clone();

    Ok(rocket::build()
        .manage(config)
        .manage(db)
        .manage(SummaryCache::new())
        .mount("/", routes![index])
        .mount("/static", FileServer::from(static_dir))
        .mount("/", routes![
            auth_sys::post_login,
            auth_sys::post_logout,
            auth_sys::get_session,
        ])
        .mount("/", routes![
            report_route::post_upload_image,
            report_route::post_report,
            report_route::put_report,
            report_route::delete_report,
            report_route::get_reports,
            report_route::get_report,
            report_route::get_province_totals,
            report_route::get_my_reports,
            report_route::get_summary,
        ])
        .mount("/", routes![
            admin_route::get_overview,
            admin_route::get_export,
            admin_route::delete_all_reports,
        ])
        .mount("/", routes![
            account_route::get_accounts,
            account_route::get_account,
            account_route::post_account,
            account_route::put_account,
            account_route::post_password,
            account_route::delete_account,
        ])
        .register("/", catchers![default_catcher]))
}


#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    Logger::init(config::log_level()?)?;

    let config = Config::load()?;
    let rocket = build_rocket(config.clone())?;

    let scheduler = if config.background_jobs {
        let db = rocket.state::<Db>().ok_or("Database is not managed")?.clone();
        let cache = rocket.state::<SummaryCache>().ok_or("Summary cache is not managed")?.clone();

        let mut builder = TaskSchedulerBuilder::new();
        auth_sys::init_auth_sys(&mut builder, &db);
        report_sys::init_report_sys(&mut builder, &db, &config, &cache);

        Some(builder.build())
    }
    else {
        info!("Background jobs disabled");
        None
    };

    let result = rocket.launch().await;

    if let Some(scheduler) = scheduler {
        scheduler.join();
    }

    result?;
    Ok(())
}


#[cfg(test)]
pub(crate) mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::blocking::Client;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use super::*;
    use crate::image_store::tests::PNG_URI;

    pub const DELEGATE_PASSWORD: &str = "delegate-pass";

    /// Client over a fresh database and file tree; keep the dir alive for the test.
    pub fn test_client() -> (Client, TempDir) {
        let root = tempfile::tempdir().unwrap();
        let config = Config::for_tests(root.path());
        let client = Client::tracked(build_rocket(config).unwrap()).unwrap();
        (client, root)
    }

    pub fn login(client: &Client, username: &str, password: &str) {
        let res = client.post("/login")
            .header(ContentType::Form)
            .body(format!("identifier={}&password={}", username, password))
            .dispatch();
        assert_eq!(res.status(), Status::Ok, "login as {}", username);
    }

    /// Signs in as the admin and creates a delegate; the admin stays signed in.
    pub fn create_delegate(client: &Client, username: &str, province: &str) -> i32 {
        login(client, "MASSAH", "admin-secret");

        let mut display_name: Vec<char> = username.chars().collect();
        if let Some(first) = display_name.first_mut() {
            *first = first.to_ascii_uppercase();
        }
        let display_name = format!("{} Delegate", display_name.into_iter().collect::<String>());

        let res = client.post("/admin/accounts")
            .header(ContentType::JSON)
            .body(json!({
                "username": username,
                "email": format!("{}@portal.local", username),
                "display_name": display_name,
                "province": province,
                "role": "delegate",
                "password": DELEGATE_PASSWORD,
            }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Created);

        let account: Value = res.into_json().unwrap();
        account["id"].as_i64().unwrap() as i32
    }

    pub fn upload_image(client: &Client) -> String {
        let res = client.post("/upload-image")
            .header(ContentType::Plain)
            .body(PNG_URI)
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        res.into_string().unwrap()
    }

    #[test]
    fn index_names_the_portal() {
        let (client, _root) = test_client();
        let res = client.get("/").dispatch();
        assert_eq!(res.status(), Status::Ok);
        assert!(res.into_string().unwrap().starts_with("Ministère"));
    }

    #[test]
    fn unknown_routes_answer_json() {
        let (client, _root) = test_client();
        let res = client.get("/nowhere").dispatch();
        assert_eq!(res.status(), Status::NotFound);

        let body: Value = res.into_json().unwrap();
        assert_eq!(body["error"], "Not found");
    }

    #[test]
    fn admin_routes_need_a_session() {
        let (client, _root) = test_client();
        let res = client.get("/admin/overview").dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        let body: Value = res.into_json().unwrap();
        assert_eq!(body["error"], "Authentication required");
    }
}
