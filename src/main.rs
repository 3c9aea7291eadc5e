#[macro_use]
extern crate rocket;

mod config;
mod credentials;
mod db;
mod error;
mod export;
mod ledger;
mod models;
mod report;

use chrono::{Local, NaiveDate};
use config::AppConfig;
use db::DbPool;
use error::{LedgerError, LedgerResult};
use log::{error, info};
use models::{Category, CategoryTotal, ExpenseDraft, ExpenseRecord, MonthTotal, User};
use report::{CategoryFilter, ExpenseFilter};
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::form::Form;
use rocket::fs::FileServer;
use rocket::http::{ContentType, Cookie, CookieJar, Header, SameSite};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::Template;
use rusqlite::Connection;
use serde::Serialize;

const SESSION_COOKIE: &str = "session";

#[derive(FromForm)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(FromForm)]
struct SignupForm {
    username: String,
    password: String,
    confirm_password: String,
}

#[derive(FromForm)]
struct ExpenseForm {
    date: String,
    category: String,
    amount: String,
    note: Option<String>,
}

impl ExpenseForm {
    fn draft(&self) -> LedgerResult<ExpenseDraft> {
        ledger::parse_draft(
            &self.date,
            &self.category,
            &self.amount,
            self.note.as_deref(),
            today(),
        )
    }
}

#[derive(FromForm, Default)]
struct FilterQuery {
    category: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

impl FilterQuery {
    fn to_filter(&self) -> LedgerResult<ExpenseFilter> {
        Ok(ExpenseFilter {
            category: CategoryFilter::parse(self.category.as_deref().unwrap_or_default())?,
            start: parse_date_param(self.start.as_deref())?,
            end: parse_date_param(self.end.as_deref())?,
        })
    }
}

#[derive(Serialize)]
struct ExpenseView {
    id: i64,
    date: String,
    category: &'static str,
    emoji: &'static str,
    amount: String,
    note: String,
}

#[derive(Serialize)]
struct CategoryTotalView {
    category: &'static str,
    emoji: &'static str,
    amount: String,
    /// Bar width in percent of the largest row.
    share: i64,
}

#[derive(Serialize)]
struct MonthTotalView {
    month: String,
    amount: String,
    share: i64,
}

#[derive(Responder)]
struct Download {
    body: Vec<u8>,
    content_type: ContentType,
    disposition: Header<'static>,
}

impl Download {
    fn attachment(body: Vec<u8>, content_type: ContentType, filename: &str) -> Self {
        Self {
            body,
            content_type,
            disposition: Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            ),
        }
    }
}

fn format_money(symbol: &str, amount: i64) -> String {
    format!("{symbol}{amount}")
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn bar_share(amount: i64, largest: i64) -> i64 {
    if largest <= 0 {
        return 0;
    }
    (i128::from(amount) * 100 / i128::from(largest)) as i64
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date_param(value: Option<&str>) -> LedgerResult<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| LedgerError::InvalidInput(format!("Invalid date: {value}"))),
    }
}

/// Message shown to the user; internal failures are logged and replaced by
/// a generic one.
fn user_message(err: &LedgerError) -> String {
    if err.is_user_error() {
        err.to_string()
    } else {
        error!("{err}");
        "Something went wrong, please try again".to_string()
    }
}

fn with_conn<T>(
    pool: &DbPool,
    f: impl FnOnce(&Connection) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let conn = pool.get()?;
    f(&conn)
}

fn require_user(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Result<User, Redirect> {
    current_user(pool, cookies).ok_or_else(|| Redirect::to("/login"))
}

/// Like `require_user`, with a flash message for form posts and downloads.
fn require_login(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Result<User, Flash<Redirect>> {
    require_user(pool, cookies).map_err(|redirect| Flash::error(redirect, "Please log in"))
}

fn current_user(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Option<User> {
    let token = cookies.get(SESSION_COOKIE)?.value().to_string();
    match with_conn(pool, |conn| credentials::session_user(conn, &token)) {
        Ok(user) => user,
        Err(err) => {
            error!("session lookup failed: {err}");
            None
        }
    }
}

fn set_session_cookie(cookies: &CookieJar<'_>, token: String) {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookies.add(cookie);
}

fn flash_context(flash: Option<FlashMessage<'_>>) -> serde_json::Value {
    match flash {
        Some(flash) => serde_json::json!({
            "kind": flash.kind(),
            "message": flash.message(),
        }),
        None => serde_json::Value::Null,
    }
}

fn render_login(error: Option<&str>, flash: serde_json::Value) -> Template {
    Template::render(
        "login",
        serde_json::json!({
            "error": error,
            "flash": flash,
        }),
    )
}

fn render_signup(error: Option<&str>) -> Template {
    Template::render(
        "signup",
        serde_json::json!({
            "error": error,
            "flash": null,
        }),
    )
}

fn category_names() -> Vec<&'static str> {
    Category::ALL.iter().map(|category| category.as_str()).collect()
}

#[get("/signup")]
fn signup(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Result<Template, Redirect> {
    if current_user(pool, cookies).is_some() {
        return Err(Redirect::to("/"));
    }
    Ok(render_signup(None))
}

#[post("/signup", data = "<form>")]
fn signup_post(pool: &State<DbPool>, form: Form<SignupForm>) -> Result<Flash<Redirect>, Template> {
    let form = form.into_inner();
    with_conn(pool, |conn| {
        credentials::register(conn, &form.username, &form.password, &form.confirm_password)
    })
    .map(|_| Flash::success(Redirect::to("/login"), "Account created! Please log in."))
    .map_err(|err| render_signup(Some(&user_message(&err))))
}

#[get("/login")]
fn login(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Redirect> {
    if current_user(pool, cookies).is_some() {
        return Err(Redirect::to("/"));
    }
    Ok(render_login(None, flash_context(flash)))
}

#[post("/login", data = "<form>")]
fn login_post(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Form<LoginForm>,
) -> Result<Redirect, Template> {
    let form = form.into_inner();
    let token = with_conn(pool, |conn| {
        let user_id = credentials::authenticate(conn, &form.username, &form.password)?;
        credentials::open_session(conn, user_id, config.max_sessions)
    })
    .map_err(|err| render_login(Some(&user_message(&err)), serde_json::Value::Null))?;

    info!("{} logged in", form.username.trim());
    set_session_cookie(cookies, token);
    Ok(Redirect::to("/"))
}

#[get("/logout")]
fn logout(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Redirect {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        let token = cookie.value().to_string();
        if let Err(err) = with_conn(pool, |conn| credentials::close_session(conn, &token)) {
            error!("failed to close session: {err}");
        }
    }
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);
    Redirect::to("/login")
}

#[get("/?<filter..>")]
fn dashboard(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    flash: Option<FlashMessage<'_>>,
    filter: FilterQuery,
) -> Result<Template, Redirect> {
    let user = require_user(pool, cookies)?;
    let symbol = config.currency_symbol.as_str();
    let mut error = None;

    let records = with_conn(pool, |conn| ledger::list_by_owner(conn, user.id))
        .unwrap_or_else(|err| {
            error = Some(user_message(&err));
            Vec::new()
        });
    let expense_filter = filter.to_filter().unwrap_or_else(|err| {
        error = Some(user_message(&err));
        ExpenseFilter::default()
    });

    let top = report::top_category(&records);
    let recent = report::recent(&records, config.recent_count);
    let filtered = report::filter(&records, &expense_filter);
    let bounds = report::date_bounds(&records);
    let start = expense_filter.start.or(bounds.map(|(min, _)| min)).map(ymd);
    let end = expense_filter.end.or(bounds.map(|(_, max)| max)).map(ymd);

    let export_query = format!(
        "category={}&start={}&end={}",
        expense_filter.category.label(),
        start.as_deref().unwrap_or_default(),
        end.as_deref().unwrap_or_default(),
    );

    let recent_views: Vec<ExpenseView> =
        recent.iter().map(|record| expense_view(record, symbol)).collect();
    let expense_views: Vec<ExpenseView> =
        filtered.iter().map(|record| expense_view(record, symbol)).collect();
    let category_totals = report::by_category(&filtered);
    let largest_category = category_totals.iter().map(|c| c.amount).max().unwrap_or(0);
    let category_views: Vec<CategoryTotalView> = category_totals
        .into_iter()
        .map(|summary| category_total_view(summary, largest_category, symbol))
        .collect();
    let month_totals = report::monthly(&filtered);
    let largest_month = month_totals.iter().map(|m| m.amount).max().unwrap_or(0);
    let month_views: Vec<MonthTotalView> = month_totals
        .into_iter()
        .map(|month| month_total_view(month, largest_month, symbol))
        .collect();

    let context = serde_json::json!({
        "username": user.username,
        "flash": flash_context(flash),
        "error": error,
        "today": ymd(today()),
        "categories": category_names(),
        "has_expenses": !records.is_empty(),
        "total": format_money(symbol, report::total(&records)),
        "top_category": top.map_or("N/A", Category::as_str),
        "top_emoji": top.unwrap_or(Category::Other).emoji(),
        "recent": recent_views,
        "filter": {
            "category": expense_filter.category.label(),
            "start": start,
            "end": end,
        },
        "expenses": expense_views,
        "filtered_total": format_money(symbol, report::total(&filtered)),
        "category_summary": category_views,
        "monthly": month_views,
        "export_query": export_query,
    });
    Ok(Template::render("dashboard", &context))
}

#[post("/expenses", data = "<form>")]
fn add_expense(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    form: Form<ExpenseForm>,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    let form = form.into_inner();
    let result = with_conn(pool, |conn| ledger::add(conn, user.id, &form.draft()?));
    Ok(match result {
        Ok(_) => Flash::success(Redirect::to("/"), "Expense added successfully!"),
        Err(err) => Flash::error(Redirect::to("/"), user_message(&err)),
    })
}

#[get("/expenses/<id>/edit")]
fn edit_expense(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    let record = with_conn(pool, |conn| ledger::get(conn, user.id, id))
        .map_err(|err| Flash::error(Redirect::to("/"), user_message(&err)))?;

    let context = serde_json::json!({
        "username": user.username,
        "flash": flash_context(flash),
        "error": null,
        "categories": category_names(),
        "expense": {
            "id": record.id,
            "date": ymd(record.date),
            "category": record.category.as_str(),
            "amount": record.amount,
            "note": record.note,
        },
    });
    Ok(Template::render("edit", &context))
}

#[post("/expenses/<id>", data = "<form>")]
fn update_expense(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    id: i64,
    form: Form<ExpenseForm>,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    let form = form.into_inner();
    let result = with_conn(pool, |conn| ledger::update(conn, user.id, id, &form.draft()?));
    Ok(match result {
        Ok(()) => Flash::success(Redirect::to("/"), "Expense updated!"),
        Err(err @ (LedgerError::NotFound(_) | LedgerError::Forbidden(_))) => {
            Flash::error(Redirect::to("/"), user_message(&err))
        }
        Err(err) => Flash::error(Redirect::to(uri!(edit_expense(id))), user_message(&err)),
    })
}

#[post("/expenses/<id>/delete")]
fn delete_expense(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    id: i64,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    Ok(match with_conn(pool, |conn| ledger::delete(conn, user.id, id)) {
        Ok(()) => Flash::warning(Redirect::to("/"), format!("Deleted expense ID {id}")),
        Err(err) => Flash::error(Redirect::to("/"), user_message(&err)),
    })
}

fn filtered_records(pool: &DbPool, user: &User, filter: &FilterQuery) -> LedgerResult<Vec<ExpenseRecord>> {
    let expense_filter = filter.to_filter()?;
    let records = with_conn(pool, |conn| ledger::list_by_owner(conn, user.id))?;
    Ok(report::filter(&records, &expense_filter))
}

#[get("/export/csv?<filter..>")]
fn export_csv(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    filter: FilterQuery,
) -> Result<Download, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    filtered_records(pool, &user, &filter)
        .and_then(|records| export::to_csv(&records))
        .map(|body| Download::attachment(body, ContentType::CSV, "expenses.csv"))
        .map_err(|err| Flash::error(Redirect::to("/"), user_message(&err)))
}

#[get("/export/xlsx?<filter..>")]
fn export_xlsx(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    filter: FilterQuery,
) -> Result<Download, Flash<Redirect>> {
    let user = require_login(pool, cookies)?;
    let content_type = ContentType::new(
        "application",
        "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    );
    filtered_records(pool, &user, &filter)
        .and_then(|records| export::to_xlsx(&records))
        .map(|body| Download::attachment(body, content_type, "expenses.xlsx"))
        .map_err(|err| Flash::error(Redirect::to("/"), user_message(&err)))
}

fn expense_view(record: &ExpenseRecord, symbol: &str) -> ExpenseView {
    ExpenseView {
        id: record.id,
        date: ymd(record.date),
        category: record.category.as_str(),
        emoji: record.category.emoji(),
        amount: format_money(symbol, record.amount),
        note: record.note.clone(),
    }
}

fn category_total_view(summary: CategoryTotal, largest: i64, symbol: &str) -> CategoryTotalView {
    CategoryTotalView {
        category: summary.category.as_str(),
        emoji: summary.category.emoji(),
        amount: format_money(symbol, summary.amount),
        share: bar_share(summary.amount, largest),
    }
}

fn month_total_view(month: MonthTotal, largest: i64, symbol: &str) -> MonthTotalView {
    MonthTotalView {
        month: month.month,
        amount: format_money(symbol, month.amount),
        share: bar_share(month.amount, largest),
    }
}

fn build(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(AdHoc::config::<AppConfig>())
        .attach(AdHoc::try_on_ignite("Expense ledger", |rocket| async move {
            let Some(path) = rocket
                .state::<AppConfig>()
                .map(|config| config.database_path.clone())
            else {
                error!("application config missing");
                return Err(rocket);
            };
            match db::init_db(&path) {
                Ok(pool) => {
                    info!("opened ledger at {}", path.display());
                    Ok(rocket.manage(pool))
                }
                Err(err) => {
                    error!("failed to open ledger at {}: {err}", path.display());
                    Err(rocket)
                }
            }
        }))
        .mount(
            "/",
            routes![
                signup,
                signup_post,
                login,
                login_post,
                logout,
                dashboard,
                add_expense,
                edit_expense,
                update_expense,
                delete_expense,
                export_csv,
                export_xlsx
            ],
        )
        .mount("/static", FileServer::from("static"))
        .attach(Template::fairing())
}

#[launch]
fn rocket() -> _ {
    build(rocket::Config::figment())
}
