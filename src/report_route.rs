use rocket::{
    data::{Data, ToByteUnit},
    delete, get, post, put,
    http::Status,
    response::status::Custom,
    serde::json::Json,
    State,
};
use log::info;
use serde_json::Value;

use crate::auth_sys::{AdminUser, CurrentUser};
use crate::config::Config;
use crate::db::{reports::{ReportFilter, ReportTable}, Db};
use crate::error::{AppError, AppResult};
use crate::image_store;
use crate::report_kind::ReportKind;
use crate::report_sys::{self, SummaryCache};


const MAX_LIST_LIMIT: i64 = 1000;


fn known_kind(kind: Result<ReportKind, &str>) -> AppResult<ReportKind> {
    kind.map_err(|slug| {
        info!("Unknown report type: {}", slug);
        AppError::NotFound
    })
}


#[post("/upload-image", format = "plain", data = "<data>")]
pub async fn post_upload_image(data: Data<'_>, _user: CurrentUser, config: &State<Config>)
    -> AppResult<String> {

    // Read base64 encoded string.
    let data_uri = data.open(config.upload_limit.bytes()).into_string().await?;
    if !data_uri.is_complete() {
        return Err(AppError::invalid("The file is too large"));
    }

    image_store::stage_data_uri(config, &data_uri)
}

#[post("/reports/<kind>", format = "json", data = "<body>")]
pub fn post_report(kind: Result<ReportKind, &str>, body: Json<Value>, user: CurrentUser,
    db: &State<Db>, config: &State<Config>, cache: &State<SummaryCache>)
    -> AppResult<Custom<Json<Value>>> {

    let kind = known_kind(kind)?;

    let row = crate::with_report_table!(kind, T => {
        let input = report_sys::parse_input::<<T as ReportTable>::Fields>(body.into_inner())?;
        serde_json::to_value(report_sys::submit::<T>(db, config, &user.account, input)?)?
    });

    cache.invalidate();

    Ok(Custom(Status::Created, Json(row)))
}

#[put("/reports/<kind>/<id>", format = "json", data = "<body>")]
pub fn put_report(kind: Result<ReportKind, &str>, id: i32, body: Json<Value>, user: CurrentUser,
    db: &State<Db>, config: &State<Config>, cache: &State<SummaryCache>)
    -> AppResult<Json<Value>> {

    let kind = known_kind(kind)?;

    let row = crate::with_report_table!(kind, T => {
        serde_json::to_value(report_sys::edit::<T>(db, config, &user.account, id, body.into_inner())?)?
    });

    cache.invalidate();

    Ok(Json(row))
}

#[delete("/reports/<kind>/<id>")]
pub fn delete_report(kind: Result<ReportKind, &str>, id: i32, admin: AdminUser,
    db: &State<Db>, config: &State<Config>, cache: &State<SummaryCache>) -> AppResult<Status> {

    let kind = known_kind(kind)?;

    crate::with_report_table!(kind, T => report_sys::delete::<T>(db, config, id)?);

    cache.invalidate();
    info!("{} deleted {} report {}", admin.account.username, kind, id);

    Ok(Status::NoContent)
}

#[get("/reports/<kind>?<province>&<limit>")]
pub fn get_reports(kind: Result<ReportKind, &str>, province: Option<String>, limit: Option<i64>,
    db: &State<Db>) -> AppResult<Json<Value>> {

    let kind = known_kind(kind)?;

    let filter = ReportFilter {
        province: province.filter(|p| !p.is_empty()),
        created_by: None,
        limit: Some(limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
    };

    let rows = crate::with_report_table!(kind, T => {
        serde_json::to_value(report_sys::list::<T>(db, &filter)?)?
    });

    Ok(Json(rows))
}

#[get("/reports/<kind>/<id>", rank = 2)]
pub fn get_report(kind: Result<ReportKind, &str>, id: i32, db: &State<Db>) -> AppResult<Json<Value>> {
    let kind = known_kind(kind)?;
    let row = crate::with_report_table!(kind, T => {
        serde_json::to_value(report_sys::find::<T>(db, id)?)?
    });

    Ok(Json(row))
}

#[get("/reports/<kind>/provinces")]
pub fn get_province_totals(kind: Result<ReportKind, &str>, db: &State<Db>) -> AppResult<Json<Value>> {
    let kind = known_kind(kind)?;
    Ok(Json(report_sys::province_totals(db, kind)?))
}

/// Rows filed by the signed-in delegate, or every row for an admin.
#[get("/my-reports/<kind>")]
pub fn get_my_reports(kind: Result<ReportKind, &str>, user: CurrentUser, db: &State<Db>) -> AppResult<Json<Value>> {
    let kind = known_kind(kind)?;
    let filter = ReportFilter {
        created_by: if user.is_admin() { None } else { Some(user.account.id) },
        ..Default::default()
    };

    let rows = crate::with_report_table!(kind, T => {
        serde_json::to_value(report_sys::list::<T>(db, &filter)?)?
    });

    Ok(Json(rows))
}

#[get("/summary")]
pub fn get_summary(db: &State<Db>, cache: &State<SummaryCache>) -> AppResult<Json<Value>> {
    Ok(Json(cache.get(db)?))
}


#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::blocking::Client;
    use serde_json::{json, Value};

    use crate::config::Config;
    use crate::image_store;
    use crate::tests::{create_delegate, login, test_client, upload_image};

    fn flood_body(province: &str, deaths: i32, images: Vec<String>) -> String {
        json!({
            "province": province,
            "prefecture": "Bol",
            "city": "Bol",
            "report_date": "2025-08-14",
            "deaths": deaths,
            "flooded_area": 2.5,
            "images": images,
        }).to_string()
    }

    fn submit(client: &Client, kind: &str, body: String) -> (Status, Value) {
        let res = client.post(format!("/reports/{}", kind))
            .header(ContentType::JSON)
            .body(body)
            .dispatch();
        let status = res.status();
        let value = res.into_json::<Value>().unwrap_or(Value::Null);
        (status, value)
    }

    fn image_urls(row: &Value) -> Vec<String> {
        row["images"].as_array().unwrap().iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn three_images_land_on_one_row() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let keys: Vec<_> = (0..3).map(|_| upload_image(&client)).collect();
        let (status, row) = submit(&client, "inondations", flood_body("LAC", 1, keys));
        assert_eq!(status, Status::Created);

        let urls = image_urls(&row);
        assert_eq!(urls.len(), 3);

        let config = client.rocket().state::<Config>().unwrap();
        for url in &urls {
            assert!(url.starts_with("/static/images/inondations/"));
            assert!(image_store::url_to_path(config, url).unwrap().is_file());
        }

        let res = client.get(urls[0].as_str()).dispatch();
        assert_eq!(res.status(), Status::Ok);
    }

    #[test]
    fn fourth_image_is_rejected() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let keys: Vec<_> = (0..4).map(|_| upload_image(&client)).collect();
        let (status, _) = submit(&client, "inondations", flood_body("LAC", 1, keys));
        assert_eq!(status, Status::BadRequest);

        let rows: Value = client.get("/reports/inondations").dispatch().into_json().unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 0);
    }

    #[test]
    fn editing_drops_removed_images() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let keys: Vec<_> = (0..3).map(|_| upload_image(&client)).collect();
        let (_, row) = submit(&client, "inondations", flood_body("LAC", 1, keys));
        let urls = image_urls(&row);

        let kept = vec![urls[0].clone(), urls[2].clone()];
        let res = client.put(format!("/reports/inondations/{}", row["id"]))
            .header(ContentType::JSON)
            .body(flood_body("LAC", 4, kept.clone()))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);

        let edited: Value = res.into_json().unwrap();
        assert_eq!(image_urls(&edited), kept);
        assert_eq!(edited["deaths"], 4);

        let config = client.rocket().state::<Config>().unwrap();
        assert!(!image_store::url_to_path(config, &urls[1]).unwrap().exists());
        assert!(image_store::url_to_path(config, &urls[0]).unwrap().exists());
    }

    #[test]
    fn editing_can_add_images_in_place() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let (_, row) = submit(&client, "inondations", flood_body("LAC", 1, vec![upload_image(&client)]));
        let old = image_urls(&row);
        let new_key = upload_image(&client);

        let res = client.put(format!("/reports/inondations/{}", row["id"]))
            .header(ContentType::JSON)
            .body(flood_body("LAC", 1, vec![new_key.clone(), old[0].clone()]))
            .dispatch();
        let edited: Value = res.into_json().unwrap();
        let urls = image_urls(&edited);

        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with(&new_key));
        assert_eq!(urls[1], old[0]);
    }

    #[test]
    fn foreign_urls_can_not_be_attached() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let (_, row) = submit(&client, "inondations", flood_body("LAC", 1, vec![]));
        let res = client.put(format!("/reports/inondations/{}", row["id"]))
            .header(ContentType::JSON)
            .body(flood_body("LAC", 1, vec!["/static/images/aides/other.png".into()]))
            .dispatch();
        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn delegates_file_under_their_own_province() {
        let (client, _root) = test_client();
        create_delegate(&client, "ali", "LAC");
        client.post("/logout").dispatch();
        login(&client, "ali", "delegate-pass");

        let (status, row) = submit(&client, "inondations", flood_body("SALAMAT", 1, vec![]));
        assert_eq!(status, Status::Created);
        assert_eq!(row["province"], "LAC");
        assert_eq!(row["signer"], "Ali Delegate");
    }

    #[test]
    fn admins_may_pick_any_known_province() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let (status, row) = submit(&client, "inondations", flood_body("KANEM", 1, vec![]));
        assert_eq!(status, Status::Created);
        assert_eq!(row["province"], "KANEM");
        assert_eq!(row["signer"], "MASSAH");

        let (status, _) = submit(&client, "inondations", flood_body("ATLANTIS", 1, vec![]));
        assert_eq!(status, Status::BadRequest);

        let (status, _) = submit(&client, "inondations", flood_body("", 1, vec![]));
        assert_eq!(status, Status::BadRequest);
    }

    #[test]
    fn news_may_skip_the_province() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let (status, row) = submit(&client, "actualites", json!({
            "title": "Distribution de vivres",
            "description": "Une distribution a eu lieu.",
        }).to_string());
        assert_eq!(status, Status::Created);
        assert_eq!(row["province"], "");
    }

    #[test]
    fn anonymous_submissions_are_refused() {
        let (client, _root) = test_client();

        let (status, _) = submit(&client, "inondations", flood_body("LAC", 1, vec![]));
        assert_eq!(status, Status::Unauthorized);
    }

    #[test]
    fn delegates_can_only_touch_their_own_rows() {
        let (client, _root) = test_client();
        create_delegate(&client, "ali", "LAC");
        create_delegate(&client, "moussa", "KANEM");
        let (_, admin_row) = submit(&client, "inondations", flood_body("BATHA", 1, vec![]));
        client.post("/logout").dispatch();

        login(&client, "ali", "delegate-pass");
        let (_, own_row) = submit(&client, "inondations", flood_body("LAC", 1, vec![]));

        let res = client.put(format!("/reports/inondations/{}", admin_row["id"]))
            .header(ContentType::JSON)
            .body(flood_body("LAC", 9, vec![]))
            .dispatch();
        assert_eq!(res.status(), Status::Forbidden);

        let res = client.put(format!("/reports/inondations/{}", own_row["id"]))
            .header(ContentType::JSON)
            .body(flood_body("LAC", 9, vec![]))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);

        let res = client.delete(format!("/reports/inondations/{}", own_row["id"])).dispatch();
        assert_eq!(res.status(), Status::Forbidden);

        let mine: Value = client.get("/my-reports/inondations").dispatch().into_json().unwrap();
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert_eq!(mine[0]["id"], own_row["id"]);
    }

    #[test]
    fn province_totals_match_the_rows() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        for deaths in [2, 3, 5] {
            submit(&client, "inondations", flood_body("LAC", deaths, vec![]));
        }
        submit(&client, "inondations", flood_body("BATHA", 7, vec![]));

        let totals: Value = client.get("/reports/inondations/provinces").dispatch().into_json().unwrap();
        let provinces = totals["provinces"].as_array().unwrap();
        assert_eq!(provinces[0]["province"], "BATHA");
        assert_eq!(provinces[1]["province"], "LAC");
        assert_eq!(provinces[1]["totals"]["count"], 3);

        let sums = provinces[1]["totals"]["sums"].as_array().unwrap();
        let deaths = sums.iter().find(|s| s["key"] == "deaths").unwrap();
        assert_eq!(deaths["sum"], 10.0);
        let area = sums.iter().find(|s| s["key"] == "flooded_area").unwrap();
        assert_eq!(area["sum"], 7.5);
    }

    #[test]
    fn admin_delete_removes_row_and_images() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let (_, row) = submit(&client, "inondations", flood_body("LAC", 1, vec![upload_image(&client)]));
        let urls = image_urls(&row);

        let res = client.delete(format!("/reports/inondations/{}", row["id"])).dispatch();
        assert_eq!(res.status(), Status::NoContent);

        let config = client.rocket().state::<Config>().unwrap();
        assert!(!image_store::url_to_path(config, &urls[0]).unwrap().exists());
        let res = client.get(format!("/reports/inondations/{}", row["id"])).dispatch();
        assert_eq!(res.status(), Status::NotFound);
    }

    #[test]
    fn summary_follows_new_reports() {
        let (client, _root) = test_client();
        login(&client, "MASSAH", "admin-secret");

        let before: Value = client.get("/summary").dispatch().into_json().unwrap();
        assert_eq!(before["kinds"][0]["count"], 0);

        submit(&client, "inondations", flood_body("LAC", 1, vec![]));

        let after: Value = client.get("/summary").dispatch().into_json().unwrap();
        assert_eq!(after["kinds"][0]["kind"], "inondations");
        assert_eq!(after["kinds"][0]["count"], 1);
        assert_eq!(after["kinds"][0]["latest"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn uploads_need_a_session_and_an_image() {
        let (client, _root) = test_client();

        let res = client.post("/upload-image")
            .header(ContentType::Plain)
            .body(crate::image_store::tests::PNG_URI)
            .dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        login(&client, "MASSAH", "admin-secret");
        let res = client.post("/upload-image")
            .header(ContentType::Plain)
            .body("data:text/plain;base64,aGVsbG8=")
            .dispatch();
        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn unknown_kinds_are_not_found() {
        let (client, _root) = test_client();
        assert_eq!(client.get("/reports/volcans").dispatch().status(), Status::NotFound);
        assert_eq!(client.get("/reports/volcans/3").dispatch().status(), Status::NotFound);
        assert_eq!(client.get("/reports/volcans/provinces").dispatch().status(), Status::NotFound);

        login(&client, "MASSAH", "admin-secret");
        let res = client.post("/reports/volcans")
            .header(ContentType::JSON)
            .body("{}")
            .dispatch();
        assert_eq!(res.status(), Status::NotFound);
        assert_eq!(client.get("/my-reports/volcans").dispatch().status(), Status::NotFound);
    }
}
