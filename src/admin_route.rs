use chrono::Local;
use log::info;
use rocket::{
    delete, get,
    http::Header,
    serde::json::Json,
    Responder, State,
};
use serde_json::{json, Value};

use crate::aggregate::{self, MonthGroup, YearMonth};
use crate::auth_sys::AdminUser;
use crate::config::Config;
use crate::db::{reports::ReportFilter, Db};
use crate::error::{AppError, AppResult};
use crate::pdf_export::{self, ExportAssets};
use crate::report_kind::ReportKind;
use crate::report_sys::{self, SummaryCache};


#[derive(Responder)]
#[response(content_type = "pdf")]
pub struct PdfFile {
    bytes: Vec<u8>,
    disposition: Header<'static>,
}


fn parse_kinds(kind: Option<&str>) -> AppResult<Vec<ReportKind>> {
    match kind.filter(|k| !k.is_empty()) {
        Some(slug) => ReportKind::from_slug(slug)
            .map(|kind| vec![kind])
            .ok_or_else(|| AppError::Invalid(format!("Unknown report type: {}", slug))),
        None => Ok(ReportKind::ALL.to_vec()),
    }
}

fn month_json(group: &MonthGroup) -> Value {
    let kinds: Vec<Value> = group.by_kind().into_iter()
        .map(|(kind, records)| json!({
            "kind": kind,
            "label": kind.label(),
            "totals": aggregate::totals(kind, records.iter().copied()),
            "reports": records.iter().map(|r| Value::Object(r.values.clone())).collect::<Vec<_>>(),
        }))
        .collect();

    json!({
        "month": group.month,
        "label": group.month.label(),
        "kinds": kinds,
    })
}


/// Every report grouped by province then month, with per-type totals.
#[get("/admin/overview?<kind>")]
pub fn get_overview(kind: Option<String>, _admin: AdminUser, db: &State<Db>) -> AppResult<Json<Value>> {
    let kinds = parse_kinds(kind.as_deref())?;

    let mut conn = db.conn()?;
    let records = aggregate::load_records(&mut conn, &kinds, &ReportFilter::default())?;

    let provinces: Vec<Value> = aggregate::group_records(records).iter()
        .map(|group| json!({
            "province": group.province,
            "months": group.months.iter().map(month_json).collect::<Vec<_>>(),
        }))
        .collect();

    Ok(Json(json!({ "provinces": provinces })))
}

#[get("/admin/export?<province>&<month>&<kind>")]
pub fn get_export(province: String, month: String, kind: Option<String>, admin: AdminUser,
    db: &State<Db>, config: &State<Config>) -> AppResult<PdfFile> {

    let month: YearMonth = month.parse().map_err(AppError::invalid)?;
    let kinds = parse_kinds(kind.as_deref())?;

    let mut conn = db.conn()?;
    let records = aggregate::load_records(&mut conn, &kinds, &ReportFilter::default())?;
    drop(conn);

    let group = MonthGroup {
        month,
        records: records.into_iter()
            .filter(|r| r.province == province && r.month() == month)
            .collect(),
    };

    let assets = ExportAssets::load(config)?;
    let pdf = pdf_export::render(&assets, &province, &group, Local::now().naive_local())?;

    info!("{} exported {}", admin.account.username, pdf.filename);

    Ok(PdfFile {
        bytes: pdf.bytes,
        disposition: Header::new("Content-Disposition",
            format!("attachment; filename=\"{}\"", pdf.filename)),
    })
}

/// Deletes every report of every type.
#[delete("/admin/reports")]
pub fn delete_all_reports(admin: AdminUser, db: &State<Db>, config: &State<Config>,
    cache: &State<SummaryCache>) -> AppResult<Json<Value>> {

    let cnt = report_sys::clear_all(db, config)?;
    cache.invalidate();

    info!("{} cleared all reports ({} rows)", admin.account.username, cnt);

    Ok(Json(json!({ "deleted": cnt })))
}
