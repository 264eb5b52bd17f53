use chrono::{NaiveDate, NaiveDateTime};
use diesel::{prelude::*, sqlite::SqliteConnection};
use serde::{de::DeserializeOwned, Serialize};

use crate::report_kind::ReportKind;
use super::models::*;
use super::schema;


#[derive(Debug, Default, Clone)]
pub struct ReportFilter {
    pub province: Option<String>,
    pub created_by: Option<i32>,
    pub limit: Option<i64>,
}


/// Editable columns of a report row.
pub trait ReportFields: DeserializeOwned + Serialize + Clone + Send {
    fn province(&self) -> &str;
    fn set_province(&mut self, province: String);
    fn signer(&self) -> &str;
    fn set_signer(&mut self, signer: String);
    fn report_date(&self) -> NaiveDate;
    fn verify_error(&self) -> Option<&'static str>;
}

/// A report model bound to its own table.
pub trait ReportTable: Sized + Serialize {
    type Fields: ReportFields;
    const KIND: ReportKind;

    fn id(&self) -> i32;
    fn fields(&self) -> &Self::Fields;
    fn images(&self) -> &ImageList;
    fn created_by(&self) -> i32;

    fn insert(conn: &mut SqliteConnection, fields: &Self::Fields, images: &ImageList,
        created_by: i32, created_at: NaiveDateTime) -> QueryResult<Self>;
    fn update(conn: &mut SqliteConnection, id: i32, fields: &Self::Fields, images: &ImageList)
        -> QueryResult<Self>;
    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Self>;
    fn list(conn: &mut SqliteConnection, filter: &ReportFilter) -> QueryResult<Vec<Self>>;
    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize>;
    fn clear(conn: &mut SqliteConnection) -> QueryResult<usize>;
    fn count(conn: &mut SqliteConnection) -> QueryResult<i64>;
}


macro_rules! report_fields {
    ($fields:ty) => {
        impl ReportFields for $fields {
            fn province(&self) -> &str {
                &self.province
            }

            fn set_province(&mut self, province: String) {
                self.province = province;
            }

            fn signer(&self) -> &str {
                &self.signer
            }

            fn set_signer(&mut self, signer: String) {
                self.signer = signer;
            }

            fn report_date(&self) -> NaiveDate {
                self.report_date
            }

            fn verify_error(&self) -> Option<&'static str> {
                self.check()
            }
        }
    };
}

macro_rules! report_table {
    ($row:ty, $fields:ty, $table:ident, $kind:expr) => {
        report_fields!($fields);

        impl ReportTable for $row {
            type Fields = $fields;
            const KIND: ReportKind = $kind;

            fn id(&self) -> i32 {
                self.id
            }

            fn fields(&self) -> &Self::Fields {
                &self.fields
            }

            fn images(&self) -> &ImageList {
                &self.images
            }

            fn created_by(&self) -> i32 {
                self.created_by
            }

            fn insert(conn: &mut SqliteConnection, fields: &Self::Fields, images: &ImageList,
                created_by: i32, created_at: NaiveDateTime) -> QueryResult<Self> {

                use schema::$table::dsl;

                diesel::insert_into(schema::$table::table)
                    .values((
                        fields,
                        dsl::images.eq(images),
                        dsl::created_by.eq(created_by),
                        dsl::created_at.eq(created_at),
                    ))
                    .returning(<$row>::as_returning())
                    .get_result(conn)
            }

            fn update(conn: &mut SqliteConnection, id: i32, fields: &Self::Fields, images: &ImageList)
                -> QueryResult<Self> {

                use schema::$table::dsl;

                diesel::update(dsl::$table.find(id))
                    .set((fields, dsl::images.eq(images)))
                    .returning(<$row>::as_returning())
                    .get_result(conn)
            }

            fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Self> {
                use schema::$table::dsl;

                dsl::$table
                    .find(id)
                    .select(<$row>::as_select())
                    .first(conn)
            }

            fn list(conn: &mut SqliteConnection, filter: &ReportFilter) -> QueryResult<Vec<Self>> {
                use schema::$table::dsl;

                let mut query = dsl::$table
                    .select(<$row>::as_select())
                    .order((dsl::report_date.desc(), dsl::id.desc()))
                    .into_boxed();

                if let Some(province) = &filter.province {
                    query = query.filter(dsl::province.eq(province.clone()));
                }
                if let Some(owner) = filter.created_by {
                    query = query.filter(dsl::created_by.eq(owner));
                }
                if let Some(limit) = filter.limit {
                    query = query.limit(limit);
                }

                query.load(conn)
            }

            fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
                use schema::$table::dsl;

                diesel::delete(dsl::$table.find(id)).execute(conn)
            }

            fn clear(conn: &mut SqliteConnection) -> QueryResult<usize> {
                diesel::delete(schema::$table::table).execute(conn)
            }

            fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
                schema::$table::table.count().get_result(conn)
            }
        }
    };
}

report_table!(Flood, FloodFields, floods, ReportKind::Flood);
report_table!(Cholera, CholeraFields, cholera_reports, ReportKind::Cholera);
report_table!(Aid, AidFields, aid_distributions, ReportKind::Aid);
report_table!(Humanitarian, HumanitarianFields, humanitarian_affairs, ReportKind::Humanitarian);
report_table!(SocialAction, SocialActionFields, social_actions, ReportKind::SocialAction);
report_table!(News, NewsFields, news, ReportKind::News);


/// Runs `$body` with `$t` aliased to the model type of `$kind`.
#[macro_export]
macro_rules! with_report_table {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            $crate::report_kind::ReportKind::Flood => {
                type $t = $crate::db::models::Flood;
                $body
            },
            $crate::report_kind::ReportKind::Cholera => {
                type $t = $crate::db::models::Cholera;
                $body
            },
            $crate::report_kind::ReportKind::Aid => {
                type $t = $crate::db::models::Aid;
                $body
            },
            $crate::report_kind::ReportKind::Humanitarian => {
                type $t = $crate::db::models::Humanitarian;
                $body
            },
            $crate::report_kind::ReportKind::SocialAction => {
                type $t = $crate::db::models::SocialAction;
                $body
            },
            $crate::report_kind::ReportKind::News => {
                type $t = $crate::db::models::News;
                $body
            },
        }
    };
}
