use std::time::Duration as StdDuration;

use chrono::{Duration, Local};
use log::{info, warn};
use rocket::{
    form::{Form, FromForm},
    get,
    http::{Cookie, CookieJar, SameSite, Status},
    outcome::try_outcome,
    post,
    request::{self, FromRequest, Outcome, Request},
    response::Redirect,
    serde::json::Json,
    State,
};
use serde::Serialize;

use crate::config::Config;
use crate::db::{accounts, models::{Account, NewAccount, Role, Session}, Db};
use crate::error::{AppError, AppResult};
use crate::task_scheduler::{Task, TaskSchedulerBuilder};
use crate::util;


pub const SESSION_COOKIE: &str = "portal_session";
const TOKEN_LEN: usize = 48;


#[derive(FromForm)]
pub struct LoginForm {
    identifier: String,
    password: String,
}

impl LoginForm {
    fn verify_error(&self) -> Option<&'static str> {
        if self.identifier.trim().is_empty() {
            Some("Username or email is required")
        }
        else if self.password.is_empty() {
            Some("Password is required")
        }
        else {
            None
        }
    }
}


/// What the client is told about the signed-in account.
#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub province: String,
    pub role: Role,
}

impl From<&Account> for Profile {
    fn from(account: &Account) -> Self {
        Profile {
            id: account.id,
            username: account.username.clone(),
            display_name: account.display_name.clone(),
            province: account.province.clone(),
            role: account.role(),
        }
    }
}


/// Account behind a valid session cookie.
pub struct CurrentUser {
    pub account: Account,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.account.is_admin()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match req.cookies().get_private(SESSION_COOKIE) {
            Some(cookie) => cookie.value().to_owned(),
            None => return Outcome::Error((Status::Unauthorized, AppError::Unauthenticated)),
        };

        let db = match req.rocket().state::<Db>() {
            Some(db) => db,
            None => {
                let err = AppError::Init("Database not managed".into());
                return Outcome::Error((err.status(), err));
            },
        };

        match find_session_account(db, &token) {
            Ok(Some(account)) => Outcome::Success(CurrentUser { account }),
            Ok(None) => {
                req.cookies().remove_private(SESSION_COOKIE);
                Outcome::Error((Status::Unauthorized, AppError::Unauthenticated))
            },
            Err(err) => Outcome::Error((err.status(), err)),
        }
    }
}

/// A signed-in account with the admin role.
pub struct AdminUser {
    pub account: Account,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user = try_outcome!(req.guard::<CurrentUser>().await);

        if user.is_admin() {
            Outcome::Success(AdminUser { account: user.account })
        }
        else {
            warn!("{} tried to reach {}", user.account.username, req.uri());
            Outcome::Error((Status::Forbidden, AppError::Forbidden))
        }
    }
}


pub fn hash_password(config: &Config, password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, config.password_cost)?)
}

pub fn verify_password_rule(password: &str) -> Option<&'static str> {
    if password.chars().count() < 6 {
        Some("Password must be at least 6 characters")
    }
    else if password.len() > 72 {
        Some("Password can not be longer than 72 bytes")
    }
    else {
        None
    }
}

fn find_session_account(db: &Db, token: &str) -> AppResult<Option<Account>> {
    let mut conn = db.conn()?;
    Ok(accounts::get_session_account(&mut conn, token, Local::now().naive_local())?)
}

/// Checks the credentials and opens a new session for the account.
pub fn authenticate(db: &Db, config: &Config, identifier: &str, password: &str)
    -> AppResult<(Account, String)> {

    let mut conn = db.conn()?;

    let account = accounts::find_by_identifier(&mut conn, identifier.trim())?
        .ok_or(AppError::BadCredentials)?;

    if !bcrypt::verify(password, &account.password_hash)? {
        return Err(AppError::BadCredentials);
    }

    let now = Local::now().naive_local();
    let session = Session {
        token: util::generate_rand_id(TOKEN_LEN),
        account_id: account.id,
        created_at: now,
        expires_at: now + Duration::hours(config.session_ttl_hours),
    };
    accounts::insert_session(&mut conn, &session)?;

    Ok((account, session.token))
}

/// Creates the configured admin account unless an admin already exists.
pub fn bootstrap_admin(db: &Db, config: &Config) -> AppResult<()> {
    let admin = match &config.admin {
        Some(admin) => admin,
        None => return Ok(()),
    };

    let mut conn = db.conn()?;
    if accounts::has_admin(&mut conn)? {
        return Ok(());
    }

    let password_hash = hash_password(config, &admin.password)?;
    let account = accounts::insert_account(&mut conn, &NewAccount {
        username: &admin.username,
        email: &admin.email.to_lowercase(),
        display_name: &admin.username,
        province: "",
        role: Role::Admin.as_str(),
        password_hash: &password_hash,
        created_at: Local::now().naive_local(),
    })?;

    info!("Created admin account {}", account.username);

    Ok(())
}

pub fn purge_expired_sessions(db: &Db) -> AppResult<usize> {
    let mut conn = db.conn()?;
    Ok(accounts::delete_expired_sessions(&mut conn, Local::now().naive_local())?)
}

pub fn init_auth_sys(scheduler: &mut TaskSchedulerBuilder, db: &Db) {
    let t_db = db.clone();
    scheduler.add_task(Task::new("session purge", move || {
        match purge_expired_sessions(&t_db) {
            Ok(cnt) if cnt > 0 => info!("Purged {} expired sessions", cnt),
            Ok(_) => (),
            Err(err) => warn!("Fail to purge sessions: {}", err),
        }
        StdDuration::new(10 * 60, 0)
    }, StdDuration::new(60, 0)));
}


#[post("/login", data = "<form>")]
pub fn post_login(form: Form<LoginForm>, cookies: &CookieJar<'_>,
    db: &State<Db>, config: &State<Config>) -> AppResult<Json<Profile>> {

    if let Some(err) = form.verify_error() {
        return Err(AppError::invalid(err));
    }

    let (account, token) = authenticate(db, config, &form.identifier, &form.password)
        .map_err(|err| {
            if let AppError::BadCredentials = err {
                info!("Failed login for {}", form.identifier.trim());
            }
            err
        })?;

    cookies.add_private(Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax));

    info!("{} signed in", account.username);

    Ok(Json(Profile::from(&account)))
}

#[post("/logout")]
pub fn post_logout(cookies: &CookieJar<'_>, db: &State<Db>) -> AppResult<Redirect> {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        let mut conn = db.conn()?;
        accounts::delete_session(&mut conn, cookie.value())?;
        cookies.remove_private(SESSION_COOKIE);
    }

    Ok(Redirect::to("/"))
}

#[get("/session")]
pub fn get_session(user: CurrentUser) -> Json<Profile> {
    Json(Profile::from(&user.account))
}
