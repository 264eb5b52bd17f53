use chrono::{Local, NaiveDate, NaiveDateTime};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::{Sqlite, SqliteValue},
};
use serde::{Deserialize, Serialize};

use super::schema::{
    accounts, aid_distributions, cholera_reports, floods, humanitarian_affairs, news, sessions,
    social_actions,
};


const MAX_TEXT_LEN: usize = 256;
const MAX_DESCRIPTION_LEN: usize = 65536;

pub const AID_BENEFICIARIES: [&str; 3] = ["Réfugiés", "Citoyens", "Tous"];
pub const HUMANITARIAN_AID_TYPES: [&str; 5] = ["nourriture", "medicale", "abris", "eau", "autre"];
pub const HUMANITARIAN_BENEFICIARY_TYPES: [&str; 3] = ["refugies", "citoyens", "rapatries"];
pub const HUMANITARIAN_WORK_TYPES: [&str; 4] = ["toussensibilisation", "mise_en_oeuvre", "suivi", "evaluation"];
pub const SOCIAL_ACTION_TYPES: [&str; 5] = ["sensibilisation", "formation", "assistance", "plaidoyer", "autre"];


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Delegate,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Delegate => "delegate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "delegate" => Some(Role::Delegate),
            _ => None,
        }
    }
}


#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = accounts, check_for_backend(Sqlite))]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub province: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

impl Account {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Delegate)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub display_name: &'a str,
    pub province: &'a str,
    pub role: &'a str,
    pub password_hash: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(AsChangeset)]
#[diesel(table_name = accounts)]
pub struct AccountChanges<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub province: &'a str,
    pub role: &'a str,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = sessions, check_for_backend(Sqlite))]
pub struct Session {
    pub token: String,
    pub account_id: i32,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}


/// Public image URLs of a report, stored as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct ImageList(pub Vec<String>);

impl ImageList {
    pub fn contains(&self, url: &str) -> bool {
        self.0.iter().any(|u| u == url)
    }
}

impl FromSql<Text, Sqlite> for ImageList {
    fn from_sql(bytes: SqliteValue<'_, '_, '_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(ImageList(serde_json::from_str(&raw)?))
    }
}

impl ToSql<Text, Sqlite> for ImageList {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}


fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn check_common(description: &str, signer: &str) -> Option<&'static str> {
    if description.chars().count() >= MAX_DESCRIPTION_LEN {
        Some("The maximum length of the description is 65536")
    }
    else if signer.chars().count() > MAX_TEXT_LEN {
        Some("Signer can not be longer than 256 characters")
    }
    else {
        None
    }
}

fn check_location(prefecture: &str, city: &str) -> Option<&'static str> {
    if prefecture.trim().is_empty() {
        Some("Department is required")
    }
    else if city.trim().is_empty() {
        Some("City is required")
    }
    else if prefecture.chars().count() > MAX_TEXT_LEN || city.chars().count() > MAX_TEXT_LEN {
        Some("Location names can not be longer than 256 characters")
    }
    else {
        None
    }
}

fn check_counts(counts: &[i32]) -> Option<&'static str> {
    if counts.iter().any(|&n| n < 0) {
        Some("Counts can not be negative")
    }
    else {
        None
    }
}

fn check_choice(value: &str, choices: &[&str], err: &'static str) -> Option<&'static str> {
    if value.is_empty() || choices.iter().any(|&c| c == value) {
        None
    }
    else {
        Some(err)
    }
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = floods, check_for_backend(Sqlite))]
pub struct FloodFields {
    #[serde(default)]
    pub province: String,
    pub prefecture: String,
    #[serde(default)]
    pub sub_prefecture: String,
    pub city: String,
    pub report_date: NaiveDate,
    #[serde(default)]
    pub affected: i32,
    #[serde(default)]
    pub households: i32,
    #[serde(default)]
    pub missing: i32,
    #[serde(default)]
    pub injured: i32,
    #[serde(default)]
    pub deaths: i32,
    #[serde(default)]
    pub displaced: i32,
    #[serde(default)]
    pub houses_destroyed: i32,
    #[serde(default)]
    pub houses_damaged: i32,
    #[serde(default)]
    pub livestock_lost: i32,
    #[serde(default)]
    pub livestock_dead: i32,
    #[serde(default)]
    pub flooded_area: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl FloodFields {
    pub fn check(&self) -> Option<&'static str> {
        check_location(&self.prefecture, &self.city)
            .or_else(|| check_counts(&[
                self.affected, self.households, self.missing, self.injured, self.deaths,
                self.displaced, self.houses_destroyed, self.houses_damaged,
                self.livestock_lost, self.livestock_dead,
            ]))
            .or_else(|| {
                if !self.flooded_area.is_finite() || self.flooded_area < 0.0 {
                    Some("Invalid flooded area")
                }
                else {
                    None
                }
            })
            .or_else(|| check_common(&self.description, &self.signer))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = floods, check_for_backend(Sqlite))]
pub struct Flood {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: FloodFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = cholera_reports, check_for_backend(Sqlite))]
pub struct CholeraFields {
    #[serde(default)]
    pub province: String,
    pub prefecture: String,
    #[serde(default)]
    pub sub_prefecture: String,
    pub city: String,
    pub report_date: NaiveDate,
    #[serde(default)]
    pub cases: i32,
    #[serde(default)]
    pub deaths: i32,
    #[serde(default)]
    pub recovered: i32,
    #[serde(default)]
    pub hospitalized: i32,
    #[serde(default)]
    pub vaccinated: i32,
    #[serde(default)]
    pub discharged: i32,
    #[serde(default)]
    pub patients_in_bed: i32,
    #[serde(default)]
    pub community_deaths: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl CholeraFields {
    pub fn check(&self) -> Option<&'static str> {
        check_location(&self.prefecture, &self.city)
            .or_else(|| check_counts(&[
                self.cases, self.deaths, self.recovered, self.hospitalized, self.vaccinated,
                self.discharged, self.patients_in_bed, self.community_deaths,
            ]))
            .or_else(|| check_common(&self.description, &self.signer))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = cholera_reports, check_for_backend(Sqlite))]
pub struct Cholera {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: CholeraFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = aid_distributions, check_for_backend(Sqlite), treat_none_as_null = true)]
pub struct AidFields {
    #[serde(default)]
    pub province: String,
    pub prefecture: String,
    #[serde(default)]
    pub sub_prefecture: String,
    pub city: String,
    pub report_date: NaiveDate,
    pub aid_type: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub beneficiary_count: i32,
    #[serde(default)]
    pub beneficiaries: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl AidFields {
    pub fn check(&self) -> Option<&'static str> {
        check_location(&self.prefecture, &self.city)
            .or_else(|| {
                if self.aid_type.trim().is_empty() {
                    Some("Aid type is required")
                }
                else {
                    None
                }
            })
            .or_else(|| check_counts(&[self.beneficiary_count]))
            .or_else(|| check_choice(&self.beneficiaries, &AID_BENEFICIARIES, "Invalid beneficiaries"))
            .or_else(|| match self.amount {
                Some(amount) if !amount.is_finite() || amount < 0.0 => Some("Invalid amount"),
                _ => None,
            })
            .or_else(|| check_common(&self.description, &self.signer))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = aid_distributions, check_for_backend(Sqlite))]
pub struct Aid {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: AidFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = humanitarian_affairs, check_for_backend(Sqlite))]
pub struct HumanitarianFields {
    #[serde(default)]
    pub province: String,
    pub prefecture: String,
    pub city: String,
    pub report_date: NaiveDate,
    pub aid_type: String,
    #[serde(default)]
    pub beneficiaries_men: i32,
    #[serde(default)]
    pub beneficiaries_women: i32,
    #[serde(default)]
    pub beneficiary_type: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub work_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl HumanitarianFields {
    pub fn check(&self) -> Option<&'static str> {
        check_location(&self.prefecture, &self.city)
            .or_else(|| {
                if self.aid_type.is_empty() {
                    Some("Aid type is required")
                }
                else {
                    check_choice(&self.aid_type, &HUMANITARIAN_AID_TYPES, "Invalid aid type")
                }
            })
            .or_else(|| check_counts(&[self.beneficiaries_men, self.beneficiaries_women]))
            .or_else(|| check_choice(&self.beneficiary_type, &HUMANITARIAN_BENEFICIARY_TYPES,
                "Invalid beneficiary type"))
            .or_else(|| check_choice(&self.work_type, &HUMANITARIAN_WORK_TYPES, "Invalid work type"))
            .or_else(|| check_common(&self.description, &self.signer))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = humanitarian_affairs, check_for_backend(Sqlite))]
pub struct Humanitarian {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: HumanitarianFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = social_actions, check_for_backend(Sqlite))]
pub struct SocialActionFields {
    #[serde(default)]
    pub province: String,
    pub prefecture: String,
    #[serde(default)]
    pub sub_prefecture: String,
    pub city: String,
    pub report_date: NaiveDate,
    pub action_type: String,
    #[serde(default)]
    pub themes: String,
    #[serde(default)]
    pub participants_men: i32,
    #[serde(default)]
    pub participants_women: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl SocialActionFields {
    pub fn check(&self) -> Option<&'static str> {
        check_location(&self.prefecture, &self.city)
            .or_else(|| {
                if self.action_type.is_empty() {
                    Some("Action type is required")
                }
                else {
                    check_choice(&self.action_type, &SOCIAL_ACTION_TYPES, "Invalid action type")
                }
            })
            .or_else(|| check_counts(&[self.participants_men, self.participants_women]))
            .or_else(|| check_common(&self.description, &self.signer))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = social_actions, check_for_backend(Sqlite))]
pub struct SocialAction {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: SocialActionFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}


#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = news, check_for_backend(Sqlite))]
pub struct NewsFields {
    #[serde(default)]
    pub province: String,
    #[serde(default = "today")]
    pub report_date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signer: String,
}

impl NewsFields {
    pub fn check(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("Title is required")
        }
        else if self.title.chars().count() > MAX_TEXT_LEN {
            Some("Title can not be longer than 256 characters")
        }
        else {
            check_common(&self.description, &self.signer)
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = news, check_for_backend(Sqlite))]
pub struct News {
    pub id: i32,
    #[diesel(embed)]
    #[serde(flatten)]
    pub fields: NewsFields,
    pub images: ImageList,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}
