use chrono::NaiveDateTime;
use diesel::{prelude::*, sqlite::SqliteConnection};

use super::models::*;
use super::schema::{accounts::dsl as a_dsl, sessions::dsl as s_dsl};
use super::schema;


pub fn get_accounts(conn: &mut SqliteConnection) -> QueryResult<Vec<Account>> {
    a_dsl::accounts
        .select(Account::as_select())
        .order(a_dsl::username.asc())
        .load(conn)
}

pub fn get_account(conn: &mut SqliteConnection, id: i32) -> QueryResult<Account> {
    a_dsl::accounts
        .find(id)
        .select(Account::as_select())
        .first(conn)
}

/// Looks an account up by username, or by email ignoring case.
pub fn find_by_identifier(conn: &mut SqliteConnection, identifier: &str) -> QueryResult<Option<Account>> {
    a_dsl::accounts
        .filter(a_dsl::username.eq(identifier)
            .or(a_dsl::email.eq(identifier.to_lowercase())))
        .select(Account::as_select())
        .first(conn)
        .optional()
}

pub fn has_admin(conn: &mut SqliteConnection) -> QueryResult<bool> {
    let cnt: i64 = a_dsl::accounts
        .filter(a_dsl::role.eq(Role::Admin.as_str()))
        .count()
        .get_result(conn)?;
    Ok(cnt > 0)
}

pub fn insert_account(conn: &mut SqliteConnection, account: &NewAccount) -> QueryResult<Account> {
    diesel::insert_into(schema::accounts::table)
        .values(account)
        .returning(Account::as_returning())
        .get_result(conn)
}

pub fn update_account(conn: &mut SqliteConnection, id: i32, changes: &AccountChanges)
    -> QueryResult<Account> {

    diesel::update(a_dsl::accounts.find(id))
        .set(changes)
        .returning(Account::as_returning())
        .get_result(conn)
}

pub fn update_password(conn: &mut SqliteConnection, id: i32, password_hash: &str) -> QueryResult<usize> {
    diesel::update(a_dsl::accounts.find(id))
        .set(a_dsl::password_hash.eq(password_hash))
        .execute(conn)
}

pub fn delete_account(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
    diesel::delete(a_dsl::accounts.find(id)).execute(conn)
}


pub fn insert_session(conn: &mut SqliteConnection, session: &Session) -> QueryResult<usize> {
    diesel::insert_into(schema::sessions::table)
        .values(session)
        .execute(conn)
}

/// Account owning an unexpired session.
pub fn get_session_account(conn: &mut SqliteConnection, token: &str, now: NaiveDateTime)
    -> QueryResult<Option<Account>> {

    s_dsl::sessions
        .inner_join(a_dsl::accounts)
        .filter(s_dsl::token.eq(token))
        .filter(s_dsl::expires_at.gt(now))
        .select(Account::as_select())
        .first(conn)
        .optional()
}

pub fn delete_session(conn: &mut SqliteConnection, token: &str) -> QueryResult<usize> {
    diesel::delete(s_dsl::sessions.find(token)).execute(conn)
}

pub fn delete_account_sessions(conn: &mut SqliteConnection, account_id: i32) -> QueryResult<usize> {
    diesel::delete(s_dsl::sessions.filter(s_dsl::account_id.eq(account_id))).execute(conn)
}

pub fn delete_expired_sessions(conn: &mut SqliteConnection, now: NaiveDateTime) -> QueryResult<usize> {
    diesel::delete(s_dsl::sessions.filter(s_dsl::expires_at.le(now))).execute(conn)
}
