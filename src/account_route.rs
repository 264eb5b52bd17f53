use chrono::Local;
use diesel::Connection;
use log::info;
use rocket::{
    delete, get, post, put,
    http::Status,
    response::status::Custom,
    serde::json::Json,
    State,
};
use serde::Deserialize;

use crate::auth_sys::{self, AdminUser};
use crate::config::Config;
use crate::db::{accounts, models::{Account, AccountChanges, NewAccount, Role}, Db};
use crate::error::{AppError, AppResult};
use crate::report_kind::is_known_province;


const MAX_NAME_LEN: usize = 64;


#[derive(Deserialize)]
pub struct AccountForm {
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    province: String,
    role: Role,
    #[serde(default)]
    password: String,
}

impl AccountForm {
    fn verify_error(&self, creating: bool) -> Option<&'static str> {
        if self.username.find(char::is_whitespace).is_some() {
            Some("The username can not contain spaces")
        }
        else if self.username.len() < 2 {
            Some("Username must be at least 2 characters")
        }
        else if self.username.len() > MAX_NAME_LEN {
            Some("Username can not be longer than 64 characters")
        }
        else if creating && !self.email.contains('@') {
            Some("Invalid email")
        }
        else if self.display_name.chars().count() > 256 {
            Some("Display name can not be longer than 256 characters")
        }
        else if !self.province.is_empty() && !is_known_province(&self.province) {
            Some("Unknown province")
        }
        else if self.role == Role::Delegate && self.province.is_empty() {
            Some("A delegate must belong to a province")
        }
        else if creating {
            auth_sys::verify_password_rule(&self.password)
        }
        else {
            None
        }
    }

    fn display_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        }
        else {
            self.display_name.trim()
        }
    }
}

#[derive(Deserialize)]
pub struct PasswordForm {
    password: String,
}


#[get("/admin/accounts")]
pub fn get_accounts(_admin: AdminUser, db: &State<Db>) -> AppResult<Json<Vec<Account>>> {
    let mut conn = db.conn()?;
    Ok(Json(accounts::get_accounts(&mut conn)?))
}

#[get("/admin/accounts/<id>")]
pub fn get_account(id: i32, _admin: AdminUser, db: &State<Db>) -> AppResult<Json<Account>> {
    let mut conn = db.conn()?;
    Ok(Json(accounts::get_account(&mut conn, id)?))
}

#[post("/admin/accounts", format = "json", data = "<form>")]
pub fn post_account(form: Json<AccountForm>, admin: AdminUser,
    db: &State<Db>, config: &State<Config>) -> AppResult<Custom<Json<Account>>> {

    if let Some(err) = form.verify_error(true) {
        return Err(AppError::invalid(err));
    }

    let password_hash = auth_sys::hash_password(config, &form.password)?;

    let mut conn = db.conn()?;
    let account = accounts::insert_account(&mut conn, &NewAccount {
        username: &form.username,
        email: &form.email.trim().to_lowercase(),
        display_name: form.display_name(),
        province: &form.province,
        role: form.role.as_str(),
        password_hash: &password_hash,
        created_at: Local::now().naive_local(),
    })?;

    info!("{} created account {}", admin.account.username, account.username);

    Ok(Custom(Status::Created, Json(account)))
}

#[put("/admin/accounts/<id>", format = "json", data = "<form>")]
pub fn put_account(id: i32, form: Json<AccountForm>, admin: AdminUser, db: &State<Db>)
    -> AppResult<Json<Account>> {

    if let Some(err) = form.verify_error(false) {
        return Err(AppError::invalid(err));
    }

    if id == admin.account.id && form.role != Role::Admin {
        return Err(AppError::invalid("You can not remove your own admin role"));
    }

    let mut conn = db.conn()?;
    let account = accounts::update_account(&mut conn, id, &AccountChanges {
        username: &form.username,
        display_name: form.display_name(),
        province: &form.province,
        role: form.role.as_str(),
    })?;

    Ok(Json(account))
}

/// Sets a new password and signs the account out everywhere.
#[post("/admin/accounts/<id>/password", format = "json", data = "<form>")]
pub fn post_password(id: i32, form: Json<PasswordForm>, admin: AdminUser,
    db: &State<Db>, config: &State<Config>) -> AppResult<Status> {

    if let Some(err) = auth_sys::verify_password_rule(&form.password) {
        return Err(AppError::invalid(err));
    }

    let password_hash = auth_sys::hash_password(config, &form.password)?;

    let mut conn = db.conn()?;
    let closed = conn.transaction::<_, AppError, _>(|conn| {
        if accounts::update_password(conn, id, &password_hash)? == 0 {
            return Err(AppError::NotFound);
        }
        Ok(accounts::delete_account_sessions(conn, id)?)
    })?;

    info!("{} reset the password of account {} ({} sessions closed)",
        admin.account.username, id, closed);

    Ok(Status::NoContent)
}

#[delete("/admin/accounts/<id>")]
pub fn delete_account(id: i32, admin: AdminUser, db: &State<Db>) -> AppResult<Status> {
    if id == admin.account.id {
        return Err(AppError::invalid("You can not delete your own account"));
    }

    let mut conn = db.conn()?;
    match accounts::delete_account(&mut conn, id)? {
        0 => Err(AppError::NotFound),
        _ => {
            info!("{} deleted account {}", admin.account.username, id);
            Ok(Status::NoContent)
        },
    }
}
